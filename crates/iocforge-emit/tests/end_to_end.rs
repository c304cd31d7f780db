//! End-to-end scenarios: a fake support tree is declared, instantiated,
//! and emitted, and the output files are checked literally.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use iocforge_core::{InstanceGraph, PrefixNaming};
use iocforge_dbd::RecordTypeRegistry;
use iocforge_emit::{emit_ioc, write_database, write_substitutions, ScriptOptions};
use iocforge_registry::{ModuleRegistry, ModuleSpec};
use iocforge_targets::{Architecture, Configuration};
use iocforge_template::scan_template;

/// Lay out a support root with two modules:
/// - `asyn`, auto-instantiable, with one DBD declaring `ai` and an
///   initialisation hook;
/// - `motor`, depending on `Asyn`, with a two-argument template.
fn fake_support(root: &Path) {
    let asyn = root.join("asyn/4-41");
    std::fs::create_dir_all(asyn.join("dbd")).unwrap();
    std::fs::create_dir_all(asyn.join("etc")).unwrap();
    std::fs::write(
        asyn.join("dbd/asyn.dbd"),
        r#"
recordtype(ai) {
    field(VAL, DBF_DOUBLE) { prompt("Value") }
    field(INP, DBF_INLINK) { prompt("Input") }
}
"#,
    )
    .unwrap();
    std::fs::write(
        asyn.join("etc/builder.toml"),
        r#"
[[device]]
name = "Asyn"
auto-instantiate = true
libraries = ["lib/libasyn.so"]
binaries = ["bin/asyn.munch"]
dbd-files = ["asyn.dbd"]

[[device.phase]]
at = 0
once = ["asynInit"]
each = ["asynPortConfigure(\"$(PORT)\")"]
"#,
    )
    .unwrap();

    let motor = root.join("motor/6-9");
    std::fs::create_dir_all(motor.join("db")).unwrap();
    std::fs::create_dir_all(motor.join("etc")).unwrap();
    std::fs::write(
        motor.join("db/motor.template"),
        "record(ai, \"$(P):M$(N)\")\n",
    )
    .unwrap();
    std::fs::write(
        motor.join("etc/builder.toml"),
        r#"
[[device]]
name = "Motor"
dependencies = ["Asyn"]
binaries = ["bin/motor.munch"]

[[device.phase]]
at = 0
each = ["motorConfigure(\"$(CARD)\")"]

[[template]]
name = "motor"
file = "db/motor.template"
arguments = ["P", "N"]
"#,
    )
    .unwrap();
}

struct Build {
    _support: tempfile::TempDir,
    config: Configuration,
    modules: ModuleRegistry,
    graph: InstanceGraph,
    records: RecordTypeRegistry,
}

fn build(arch: &str) -> Build {
    let support = tempfile::tempdir().unwrap();
    fake_support(support.path());
    let config = Configuration::new(
        support.path().to_path_buf(),
        support.path().to_path_buf(),
        Architecture::parse(arch).unwrap(),
    );
    let vector_base = u16::from(config.architecture.vector_base());
    Build {
        config: config.clone(),
        modules: ModuleRegistry::new(config),
        graph: InstanceGraph::new(vector_base),
        records: RecordTypeRegistry::with_native(),
        _support: support,
    }
}

fn declare(build: &mut Build, name: &str, version: &str) {
    build
        .modules
        .declare_module(
            ModuleSpec::new(name).version(version),
            &mut build.graph,
            &mut build.records,
        )
        .unwrap();
}

fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn scenario_single_record_database() {
    let mut build = build("vxWorks-ppc604");
    declare(&mut build, "asyn", "4-41");
    build.graph.set_naming(Box::new(PrefixNaming::new("TS")));
    let record = build.records.record_type("ai").unwrap();
    assert_eq!(record.device, "Asyn");

    let rec = build.graph.new_record(&build.records, "ai", "X").unwrap();
    rec.set_field(&build.records, "VAL", "1.0").unwrap();

    assert_eq!(
        write_database(&build.graph),
        "record(ai, \"TS:X\")\n{\n    field(VAL, \"1.0\")\n}\n\n"
    );
}

#[test]
fn scenario_dependency_auto_instantiated_and_loaded_first() {
    let mut build = build("vxWorks-ppc604");
    declare(&mut build, "asyn", "4-41");
    declare(&mut build, "motor", "6-9");

    // Motor is instantiated without Asyn; Asyn auto-instantiates first.
    build
        .graph
        .instantiate("Motor", params(&[("CARD", "0")]))
        .unwrap();
    let order: Vec<&str> = build
        .graph
        .instances()
        .iter()
        .map(|i| i.definition.as_str())
        .collect();
    assert_eq!(order, vec!["Asyn", "Motor"]);

    let dir = tempfile::tempdir().unwrap();
    let report = emit_ioc(
        &build.config,
        &build.graph,
        &build.records,
        &build.modules,
        dir.path(),
        "TS",
        "TS-01",
        &ScriptOptions::default(),
    )
    .unwrap();

    let script =
        std::fs::read_to_string(report.path.join("iocBoot/iocTS-01/stTS-01.cmd")).unwrap();
    let asyn_block = script.find("# Asyn").unwrap();
    let motor_block = script.find("# Motor").unwrap();
    assert!(asyn_block < motor_block);
    assert!(script.contains("ld < bin/asyn.munch"));
}

#[test]
fn scenario_once_per_class_hook_appears_once() {
    let mut build = build("vxWorks-ppc604");
    declare(&mut build, "asyn", "4-41");
    build
        .graph
        .instantiate("Asyn", params(&[("PORT", "L0")]))
        .unwrap();
    build
        .graph
        .instantiate("Asyn", params(&[("PORT", "L1")]))
        .unwrap();

    let plan = iocforge_core::plan(&build.graph).unwrap();
    let once = plan.body.iter().filter(|l| *l == "asynInit").count();
    assert_eq!(once, 1);
    assert_eq!(
        plan.body,
        vec![
            "asynInit".to_string(),
            "asynPortConfigure(\"L0\")".to_string(),
            "asynPortConfigure(\"L1\")".to_string(),
        ]
    );
}

#[test]
fn scenario_interrupt_vector_blocks() {
    let mut build = build("vxWorks-ppc604");
    let vectors = build.graph.vectors();
    assert_eq!(vectors.allocate(1).unwrap(), 0xC0);
    assert_eq!(vectors.allocate(4).unwrap(), 0xC1);
    assert_eq!(vectors.allocate(1).unwrap(), 0xC5);
    assert!(vectors.allocate(256).is_err());
}

#[test]
fn scenario_substitutions_file() {
    let mut build = build("vxWorks-ppc604");
    declare(&mut build, "asyn", "4-41");
    declare(&mut build, "motor", "6-9");

    build
        .graph
        .add_substitution("motor", params(&[("P", "A"), ("N", "1")]))
        .unwrap();
    build
        .graph
        .add_substitution("motor", params(&[("P", "A"), ("N", "2")]))
        .unwrap();

    let file = write_substitutions(&build.graph).unwrap();
    assert!(file.text.contains("pattern { P, N }"));
    assert!(file.text.contains("{ \"A\", \"1\" }"));
    assert!(file.text.contains("{ \"A\", \"2\" }"));
    // One block only.
    assert_eq!(file.text.matches("pattern").count(), 1);
}

#[test]
fn scenario_template_auto_scan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.template");
    std::fs::write(
        &path,
        "#% macro, P, prefix\n#  continued\n$(P) $(N=10)\n#% optional, OPT\n$(OPT)\n",
    )
    .unwrap();
    let scan = scan_template(&path).unwrap();
    assert_eq!(scan.required, vec!["P".to_string()]);
    assert_eq!(scan.defaulted, vec![("N".to_string(), "10".to_string())]);
    assert_eq!(scan.optional, vec!["OPT".to_string()]);
    assert_eq!(
        scan.descriptions.get("P").map(String::as_str),
        Some("prefix\ncontinued")
    );
}

#[test]
fn full_tree_layout_and_release() {
    let mut build = build("vxWorks-ppc604");
    declare(&mut build, "asyn", "4-41");
    declare(&mut build, "motor", "6-9");
    build
        .graph
        .instantiate("Motor", params(&[("CARD", "0")]))
        .unwrap();
    build.graph.set_naming(Box::new(PrefixNaming::new("TS")));
    let rec = build.graph.new_record(&build.records, "ai", "X").unwrap();
    rec.set_field(&build.records, "VAL", "1.0").unwrap();
    build
        .graph
        .add_substitution("motor", params(&[("P", "TS"), ("N", "1")]))
        .unwrap();
    build
        .graph
        .add_data_file(iocforge_core::DataFile::from_bytes(
            "lookup.tab",
            b"0 1\n".to_vec(),
        ))
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let report = emit_ioc(
        &build.config,
        &build.graph,
        &build.records,
        &build.modules,
        dir.path(),
        "TS",
        "TS-01",
        &ScriptOptions::default(),
    )
    .unwrap();

    for file in [
        "configure/CONFIG",
        "configure/CONFIG_APP",
        "configure/Makefile",
        "configure/RULES",
        "configure/RULES_DIRS",
        "configure/RULES.ioc",
        "configure/RULES_TOP",
        "configure/RELEASE",
        "iocBoot/iocTS-01/stTS-01.cmd",
        "iocBoot/iocTS-01/Makefile",
        "TS-01App/Db/TS-01.db",
        "TS-01App/Db/TS-01.expanded.substitutions",
        "TS-01App/Db/Makefile",
        "TS-01App/src/Makefile",
        "dbd/TS-01.dbd",
        "data/lookup.tab",
        "Makefile",
    ] {
        assert!(report.path.join(file).is_file(), "missing {file}");
    }

    // RELEASE names referenced modules by macro identifier and path.
    let release = std::fs::read_to_string(report.path.join("configure/RELEASE")).unwrap();
    assert!(release.contains("ASYN = "));
    assert!(release.contains("MOTOR = "));
    assert!(release.contains("asyn/4-41"));

    // Reverse dependency order: Motor's libraries before Asyn's.
    let makefile = std::fs::read_to_string(report.path.join("TS-01App/src/Makefile")).unwrap();
    let asyn_lib = makefile.find("lib/libasyn.so").unwrap();
    let prod = makefile.find("PROD_IOC").unwrap();
    assert!(prod < asyn_lib);

    let dbd = std::fs::read_to_string(report.path.join("dbd/TS-01.dbd")).unwrap();
    assert_eq!(dbd, "include \"base.dbd\"\ninclude \"asyn.dbd\"\n");
}

#[test]
fn emission_is_deterministic() {
    fn run(root: &Path) -> PathBuf {
        let mut build = build("vxWorks-ppc604");
        declare(&mut build, "asyn", "4-41");
        declare(&mut build, "motor", "6-9");
        build
            .graph
            .instantiate("Motor", params(&[("CARD", "0")]))
            .unwrap();
        build.graph.set_naming(Box::new(PrefixNaming::new("TS")));
        let rec = build.graph.new_record(&build.records, "ai", "X").unwrap();
        rec.set_field(&build.records, "VAL", "1.0").unwrap();
        build
            .graph
            .add_substitution("motor", params(&[("P", "TS"), ("N", "1")]))
            .unwrap();

        emit_ioc(
            &build.config,
            &build.graph,
            &build.records,
            &build.modules,
            root,
            "TS",
            "TS-01",
            &ScriptOptions::default(),
        )
        .unwrap()
        .path
    }

    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = run(dir_a.path());
    let b = run(dir_b.path());

    // RELEASE and the substitutions file embed absolute module paths,
    // which differ per run's temporary support root; compare the
    // location-free files.
    for file in [
        "iocBoot/iocTS-01/stTS-01.cmd",
        "TS-01App/Db/TS-01.db",
        "TS-01App/src/Makefile",
        "dbd/TS-01.dbd",
    ] {
        assert_eq!(
            std::fs::read(a.join(file)).unwrap(),
            std::fs::read(b.join(file)).unwrap(),
            "{file} differs between runs"
        );
    }
}

#[test]
fn rewriting_over_foreign_content_is_refused() {
    let build = build("vxWorks-ppc604");
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("TS/TS-01/precious")).unwrap();
    let result = emit_ioc(
        &build.config,
        &build.graph,
        &build.records,
        &build.modules,
        dir.path(),
        "TS",
        "TS-01",
        &ScriptOptions::default(),
    );
    assert!(result.is_err());
    assert!(dir.path().join("TS/TS-01/precious").exists());
}

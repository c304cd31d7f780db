//! Database-file emission.

use iocforge_core::InstanceGraph;

/// Render every record of the graph as a database file.
///
/// Records are sorted by full name and fields alphabetically, so identical
/// graphs render byte-identically.
pub fn write_database(graph: &InstanceGraph) -> String {
    let mut records: Vec<_> = graph.records().collect();
    records.sort_by(|a, b| a.full_name.cmp(&b.full_name));

    let mut out = String::new();
    for record in records {
        out.push_str(&format!(
            "record({}, \"{}\")\n{{\n",
            record.record_type, record.full_name
        ));
        let mut fields: Vec<_> = record.fields().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        for (name, value) in fields {
            out.push_str(&format!("    field({}, \"{}\")\n", name, value.render()));
        }
        out.push_str("}\n\n");
    }
    out
}

//! Hand-written parser for the textual DBD grammar.
//!
//! Handles `recordtype`, `menu`, and `include` statements plus the field
//! attribute blocks that matter for reflection (`prompt`, `menu`). Other
//! statement kinds (`device`, `driver`, `registrar`, ...) are accepted and
//! skipped: they register runtime support, not descriptor structure.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::{DbdError, Result};
use crate::staticdb::{FieldInfo, FieldKind, StaticDatabase};

/// Statement keywords accepted and skipped without interpretation.
const SKIPPED_STATEMENTS: &[&str] = &[
    "device",
    "driver",
    "registrar",
    "variable",
    "function",
    "breaktable",
    "path",
    "addpath",
    "alias",
];

/// A record-type declaration: its fields in declaration order.
#[derive(Debug, Clone, Default)]
struct RecordTypeDecl {
    fields: IndexMap<String, FieldInfo>,
}

/// Native descriptor database parsing the DBD text directly.
///
/// The database accumulates: reading a second file adds its record types
/// and menus to those already present. Re-reading a file is idempotent.
#[derive(Debug, Default)]
pub struct NativeDbd {
    record_types: IndexMap<String, RecordTypeDecl>,
    menus: IndexMap<String, Vec<String>>,
}

impl NativeDbd {
    /// Create an empty descriptor database.
    pub fn new() -> Self {
        NativeDbd::default()
    }

    fn read_file(&mut self, directory: &Path, filename: &str) -> Result<()> {
        let path = directory.join(filename);
        if !path.is_file() {
            return Err(DbdError::FileNotFound { path });
        }
        let text = std::fs::read_to_string(&path)?;
        let mut scanner = Scanner::new(&text, filename);

        loop {
            scanner.skip_trivia();
            if scanner.at_end() {
                return Ok(());
            }
            let keyword = scanner.ident()?;
            match keyword.as_str() {
                "recordtype" => self.parse_recordtype(&mut scanner)?,
                "menu" => self.parse_menu(&mut scanner)?,
                "include" => {
                    let included = scanner.quoted()?;
                    self.read_file(directory, &included)?;
                }
                kw if SKIPPED_STATEMENTS.contains(&kw) => {
                    scanner.skip_statement()?;
                }
                other => {
                    return Err(scanner.error(format!("unexpected keyword {other:?}")));
                }
            }
        }
    }

    fn parse_recordtype(&mut self, scanner: &mut Scanner<'_>) -> Result<()> {
        let name = scanner.parenthesised_ident()?;
        let mut decl = RecordTypeDecl::default();
        scanner.expect('{')?;
        loop {
            scanner.skip_trivia();
            if scanner.consume('}') {
                break;
            }
            let keyword = scanner.ident()?;
            match keyword.as_str() {
                "field" => {
                    let field = self.parse_field(scanner)?;
                    // The synthetic NAME field is not a settable field.
                    if field.name != "NAME" {
                        decl.fields.insert(field.name.clone(), field);
                    }
                }
                "include" => {
                    // Field includes appear inside vendor record types; the
                    // native grammar keeps every field inline.
                    let _ = scanner.quoted()?;
                }
                other => {
                    return Err(scanner.error(format!(
                        "unexpected {other:?} inside recordtype({name})"
                    )));
                }
            }
        }
        // First declaration wins; a re-read of the same file is a no-op.
        self.record_types.entry(name).or_insert(decl);
        Ok(())
    }

    fn parse_field(&mut self, scanner: &mut Scanner<'_>) -> Result<FieldInfo> {
        scanner.expect('(')?;
        let name = scanner.ident()?;
        scanner.expect(',')?;
        let dbf = scanner.ident()?;
        scanner.expect(')')?;
        let kind = FieldKind::from_dbf(&dbf)
            .ok_or_else(|| scanner.error(format!("unknown field type {dbf}")))?;

        let mut info = FieldInfo {
            name,
            kind,
            prompt: None,
            menu: None,
        };

        scanner.skip_trivia();
        if scanner.consume('{') {
            loop {
                scanner.skip_trivia();
                if scanner.consume('}') {
                    break;
                }
                let attr = scanner.ident()?;
                let argument = scanner.raw_arguments()?;
                match attr.as_str() {
                    "prompt" => info.prompt = Some(unquote(&argument)),
                    "menu" => info.menu = Some(unquote(&argument)),
                    _ => {}
                }
            }
        }
        Ok(info)
    }

    fn parse_menu(&mut self, scanner: &mut Scanner<'_>) -> Result<()> {
        let name = scanner.parenthesised_ident()?;
        let mut choices = Vec::new();
        scanner.expect('{')?;
        loop {
            scanner.skip_trivia();
            if scanner.consume('}') {
                break;
            }
            let keyword = scanner.ident()?;
            if keyword != "choice" {
                return Err(scanner.error(format!("unexpected {keyword:?} inside menu({name})")));
            }
            scanner.expect('(')?;
            let _identifier = scanner.ident()?;
            scanner.expect(',')?;
            scanner.skip_trivia();
            let text = scanner.quoted()?;
            scanner.expect(')')?;
            choices.push(text);
        }
        self.menus.entry(name).or_insert(choices);
        Ok(())
    }
}

impl StaticDatabase for NativeDbd {
    fn read_database(&mut self, directory: &Path, filename: &str) -> Result<()> {
        self.read_file(directory, filename)
    }

    fn record_type_names(&self) -> Vec<String> {
        self.record_types.keys().cloned().collect()
    }

    fn fields(&self, record_type: &str) -> Result<Vec<FieldInfo>> {
        let decl = self
            .record_types
            .get(record_type)
            .ok_or_else(|| DbdError::UnknownRecordType {
                name: record_type.to_string(),
            })?;
        Ok(decl.fields.values().cloned().collect())
    }

    fn menu_choices(&self, record_type: &str, field: &str) -> Option<Vec<String>> {
        let menu = self
            .record_types
            .get(record_type)?
            .fields
            .get(field)?
            .menu
            .as_deref()?;
        self.menus.get(menu).cloned()
    }

    fn verify(
        &self,
        record_type: &str,
        field: &str,
        value: &str,
    ) -> std::result::Result<(), String> {
        let decl = match self.record_types.get(record_type) {
            Some(d) => d,
            None => return Err(format!("unknown record type {record_type}")),
        };
        let info = match decl.fields.get(field) {
            Some(f) => f,
            None => return Err(format!("unknown field {field}")),
        };
        match info.kind {
            FieldKind::String | FieldKind::Link => Ok(()),
            FieldKind::Integer => parse_integer(value)
                .map(|_| ())
                .ok_or_else(|| format!("{value:?} is not a valid integer value")),
            FieldKind::Real => value
                .parse::<f64>()
                .map(|_| ())
                .map_err(|_| format!("{value:?} is not a valid floating point value")),
            FieldKind::Menu => {
                let menu = info.menu.as_deref().unwrap_or_default();
                let choices = self.menus.get(menu).cloned().unwrap_or_default();
                if choices.iter().any(|c| c == value) {
                    return Ok(());
                }
                // A bare index selects the choice positionally.
                if let Some(index) = parse_integer(value) {
                    if index >= 0 && (index as usize) < choices.len() {
                        return Ok(());
                    }
                }
                Err(format!("{value:?} is not a choice of menu {menu}"))
            }
            FieldKind::NoAccess => Err(format!("field {field} is not modifiable")),
        }
    }
}

/// Parse a decimal or `0x` hexadecimal integer.
fn parse_integer(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()
    } else {
        trimmed.parse::<i64>().ok()
    }
}

/// Strip one level of surrounding double quotes if present.
fn unquote(text: &str) -> String {
    let trimmed = text.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_string()
}

/// Character-level scanner over one DBD file.
struct Scanner<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    file: &'a str,
}

impl<'a> Scanner<'a> {
    fn new(text: &str, file: &'a str) -> Scanner<'a> {
        Scanner {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
            file,
        }
    }

    fn error(&self, detail: String) -> DbdError {
        DbdError::Parse {
            file: self.file.to_string(),
            line: self.line,
            detail,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        if c == '\n' {
            self.line += 1;
        }
        self.pos += 1;
        Some(c)
    }

    /// Skip whitespace and `#` comments.
    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn consume(&mut self, expected: char) -> bool {
        self.skip_trivia();
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        if self.consume(expected) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {expected:?}, found {:?}",
                self.peek().map(String::from).unwrap_or_default()
            )))
        }
    }

    fn ident(&mut self) -> Result<String> {
        self.skip_trivia();
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if out.is_empty() {
            return Err(self.error("expected identifier".to_string()));
        }
        Ok(out)
    }

    fn quoted(&mut self) -> Result<String> {
        self.skip_trivia();
        if self.peek() != Some('"') {
            return Err(self.error("expected quoted string".to_string()));
        }
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => {
                    if let Some(escaped) = self.bump() {
                        out.push(escaped);
                    }
                }
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string".to_string())),
            }
        }
    }

    /// `(<ident>)`.
    fn parenthesised_ident(&mut self) -> Result<String> {
        self.expect('(')?;
        let name = self.ident()?;
        self.expect(')')?;
        Ok(name)
    }

    /// Raw text of one `( ... )` argument list, nested parens and quoted
    /// strings respected.
    fn raw_arguments(&mut self) -> Result<String> {
        self.expect('(')?;
        let mut depth = 1usize;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('(') => {
                    depth += 1;
                    out.push('(');
                }
                Some(')') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                    out.push(')');
                }
                Some('"') => {
                    out.push('"');
                    loop {
                        match self.bump() {
                            Some('\\') => {
                                out.push('\\');
                                if let Some(escaped) = self.bump() {
                                    out.push(escaped);
                                }
                            }
                            Some('"') => {
                                out.push('"');
                                break;
                            }
                            Some(c) => out.push(c),
                            None => {
                                return Err(self.error("unterminated string".to_string()));
                            }
                        }
                    }
                }
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated argument list".to_string())),
            }
        }
    }

    /// Skip a statement we accept but do not interpret: an argument list
    /// optionally followed by a block.
    fn skip_statement(&mut self) -> Result<()> {
        self.skip_trivia();
        if self.peek() == Some('(') {
            self.raw_arguments()?;
        } else if self.peek() == Some('"') {
            self.quoted()?;
        }
        self.skip_trivia();
        if self.peek() == Some('{') {
            self.bump();
            let mut depth = 1usize;
            while depth > 0 {
                match self.bump() {
                    Some('{') => depth += 1,
                    Some('}') => depth -= 1,
                    Some(_) => {}
                    None => return Err(self.error("unterminated block".to_string())),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AI_DBD: &str = r#"
# analogue input
menu(menuYesNo) {
    choice(menuYesNoNO, "NO")
    choice(menuYesNoYES, "YES")
}
recordtype(ai) {
    field(NAME, DBF_STRING) {
        prompt("Record Name")
    }
    field(VAL, DBF_DOUBLE) {
        prompt("Current EGU Value")
    }
    field(DESC, DBF_STRING) {
        prompt("Descriptor")
    }
    field(INP, DBF_INLINK) {
        prompt("Input Specification")
    }
    field(SIMM, DBF_MENU) {
        prompt("Simulation Mode")
        menu(menuYesNo)
    }
    field(RVAL, DBF_LONG) {
        prompt("Current Raw Value")
    }
}
device(ai, CONSTANT, devAiSoft, "Soft Channel")
registrar(aiRegistrar)
"#;

    fn write_dbd(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    fn loaded_ai() -> NativeDbd {
        let dir = tempfile::tempdir().unwrap();
        write_dbd(dir.path(), "ai.dbd", AI_DBD);
        let mut db = NativeDbd::new();
        db.read_database(dir.path(), "ai.dbd").unwrap();
        db
    }

    #[test]
    fn record_type_and_fields_enumerated() {
        let db = loaded_ai();
        assert_eq!(db.record_type_names(), vec!["ai".to_string()]);

        let fields = db.fields("ai").unwrap();
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        // NAME is synthetic and excluded; the rest keep declaration order.
        assert_eq!(names, vec!["VAL", "DESC", "INP", "SIMM", "RVAL"]);
        assert_eq!(fields[0].kind, FieldKind::Real);
        assert_eq!(fields[0].prompt.as_deref(), Some("Current EGU Value"));
        assert_eq!(fields[3].menu.as_deref(), Some("menuYesNo"));
    }

    #[test]
    fn menu_choices_materialised_in_order() {
        let db = loaded_ai();
        let choices = db.menu_choices("ai", "SIMM").unwrap();
        assert_eq!(choices, vec!["NO".to_string(), "YES".to_string()]);
        assert!(db.menu_choices("ai", "VAL").is_none());
    }

    #[test]
    fn verify_scalar_values() {
        let db = loaded_ai();
        assert!(db.verify("ai", "VAL", "1.0").is_ok());
        assert!(db.verify("ai", "VAL", "not-a-number").is_err());
        assert!(db.verify("ai", "RVAL", "42").is_ok());
        assert!(db.verify("ai", "RVAL", "0x2A").is_ok());
        assert!(db.verify("ai", "RVAL", "4.2").is_err());
        assert!(db.verify("ai", "DESC", "anything goes").is_ok());
    }

    #[test]
    fn verify_menu_values() {
        let db = loaded_ai();
        assert!(db.verify("ai", "SIMM", "YES").is_ok());
        assert!(db.verify("ai", "SIMM", "1").is_ok());
        assert!(db.verify("ai", "SIMM", "MAYBE").is_err());
        assert!(db.verify("ai", "SIMM", "2").is_err());
        let diagnostic = db.verify("ai", "SIMM", "MAYBE").unwrap_err();
        assert!(diagnostic.contains("menuYesNo"));
    }

    #[test]
    fn includes_resolve_relative_to_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_dbd(dir.path(), "menus.dbd", "menu(menuYesNo) { choice(a, \"NO\") }");
        write_dbd(
            dir.path(),
            "top.dbd",
            "include \"menus.dbd\"\nrecordtype(bo) { field(ZNAM, DBF_MENU) { menu(menuYesNo) } }",
        );
        let mut db = NativeDbd::new();
        db.read_database(dir.path(), "top.dbd").unwrap();
        assert!(db.menu_choices("bo", "ZNAM").is_some());
        assert_eq!(db.record_type_names(), vec!["bo".to_string()]);
    }

    #[test]
    fn rereading_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_dbd(dir.path(), "ai.dbd", AI_DBD);
        let mut db = NativeDbd::new();
        db.read_database(dir.path(), "ai.dbd").unwrap();
        db.read_database(dir.path(), "ai.dbd").unwrap();
        assert_eq!(db.record_type_names().len(), 1);
        assert_eq!(db.fields("ai").unwrap().len(), 5);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = NativeDbd::new();
        assert!(matches!(
            db.read_database(dir.path(), "absent.dbd"),
            Err(DbdError::FileNotFound { .. })
        ));
    }

    #[test]
    fn parse_error_carries_location() {
        let dir = tempfile::tempdir().unwrap();
        write_dbd(dir.path(), "bad.dbd", "recordtype(ai) {\n    bogus(VAL)\n}\n");
        let mut db = NativeDbd::new();
        let err = db.read_database(dir.path(), "bad.dbd").unwrap_err();
        match err {
            DbdError::Parse { file, line, .. } => {
                assert_eq!(file, "bad.dbd");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

//! Dialect selection plus the rendering knobs shared by SQL-family
//! generators: identifier/literal quoting, join keywords, clause support.

use crate::plan::JoinKind;

/// Target textual query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Analytical SQL (DuckDB-flavored ANSI).
    DuckDb,
    /// Relational-algebra pipeline notation.
    Pure,
}

pub trait SqlDialect {
    fn name(&self) -> &'static str;

    /// Identifiers stay bare when they are plain; anything else is quoted.
    fn quote_ident(&self, ident: &str) -> String {
        let plain = !ident.is_empty()
            && ident.chars().enumerate().all(|(i, c)| {
                c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit())
            });
        if plain {
            ident.to_string()
        } else {
            format!("\"{}\"", ident.replace('"', "\"\""))
        }
    }

    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    fn emit_bool(&self, value: bool) -> String {
        if value { "TRUE" } else { "FALSE" }.to_string()
    }

    fn emit_null(&self) -> String {
        "NULL".to_string()
    }

    fn join_keyword(&self, kind: JoinKind) -> &'static str {
        match kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL OUTER JOIN",
            JoinKind::AsOf => "ASOF JOIN",
        }
    }

    fn supports_qualify(&self) -> bool {
        true
    }
}

pub struct DuckDbDialect;

impl SqlDialect for DuckDbDialect {
    fn name(&self) -> &'static str {
        "duckdb"
    }
}

//! Statement kind detection from SQL text.

use crate::named;

/// Kind of statement, judged by its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// DDL, transaction control, and anything else.
    Other,
}

impl StatementKind {
    /// Detect the statement kind.
    ///
    /// For CTEs (`WITH ...`), looks past the CTE definitions to find the
    /// statement the CTEs feed.
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = strip_sql_prefix(sql);
        if starts_with_keyword(trimmed, "SELECT") || starts_with_keyword(trimmed, "VALUES") {
            StatementKind::Select
        } else if starts_with_keyword(trimmed, "INSERT") {
            StatementKind::Insert
        } else if starts_with_keyword(trimmed, "UPDATE") {
            StatementKind::Update
        } else if starts_with_keyword(trimmed, "DELETE") {
            StatementKind::Delete
        } else if starts_with_keyword(trimmed, "WITH") {
            Self::detect_cte_main(trimmed)
        } else {
            StatementKind::Other
        }
    }

    pub fn is_insert(self) -> bool {
        self == StatementKind::Insert
    }

    /// The main statement is the first top-level token after a closed paren
    /// that does not continue the CTE list (`,`, `AS`, `[NOT] MATERIALIZED`).
    fn detect_cte_main(sql: &str) -> Self {
        let bytes = sql.as_bytes();
        let mut depth = 0usize;
        let mut i = 0;
        while i < bytes.len() {
            if let Some(next) = named::skip_non_code(bytes, i) {
                i = next;
                continue;
            }
            match bytes[i] {
                b'(' => depth += 1,
                b')' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        let rest = strip_sql_prefix(&sql[i + 1..]);
                        if !continues_cte_list(rest) {
                            return Self::main_kind(rest);
                        }
                    }
                }
                _ => {}
            }
            i += 1;
        }
        StatementKind::Select
    }

    fn main_kind(sql: &str) -> Self {
        if starts_with_keyword(sql, "INSERT") {
            StatementKind::Insert
        } else if starts_with_keyword(sql, "UPDATE") {
            StatementKind::Update
        } else if starts_with_keyword(sql, "DELETE") {
            StatementKind::Delete
        } else {
            StatementKind::Select
        }
    }
}

fn continues_cte_list(rest: &str) -> bool {
    rest.starts_with(',')
        || ["AS", "NOT", "MATERIALIZED"]
            .iter()
            .any(|kw| starts_with_keyword(rest, kw))
}

/// Skip leading whitespace, comments and opening parens.
fn strip_sql_prefix(sql: &str) -> &str {
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => i += 1,
            b if b.is_ascii_whitespace() => i += 1,
            b'-' | b'/' => match named::skip_non_code(bytes, i) {
                Some(next) => i = next,
                None => break,
            },
            _ => break,
        }
    }
    &sql[i..]
}

fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    match s.get(0..keyword.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(keyword) => s
            .as_bytes()
            .get(keyword.len())
            .is_none_or(|b| !(b.is_ascii_alphanumeric() || *b == b'_')),
        _ => false,
    }
}

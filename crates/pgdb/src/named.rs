//! Named placeholder rewriting.
//!
//! Queries are written with `:name` placeholders; Postgres only understands
//! positional `$n`. [`rewrite`] walks the SQL once, skipping string literals,
//! quoted identifiers, dollar-quoted bodies, comments and `::` casts, and assigns
//! one position per distinct name. A name used twice reuses its position.

/// A query with its named placeholders resolved to positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedQuery {
    /// SQL sent to the server, with `$n` placeholders.
    pub sql: String,
    /// Placeholder names in position order (`names[0]` is `$1`).
    pub names: Vec<String>,
}

impl NamedQuery {
    /// Zero-based position of a placeholder. Accepts `name` or `:name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        let name = name.strip_prefix(':').unwrap_or(name);
        self.names.iter().position(|n| n == name)
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Returns the index just past a quoted run that started at `start`
/// (which holds the opening `quote`). Doubled quotes are escapes.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Returns the tag length (including both `$`) if a dollar-quote opener
/// (`$$` or `$tag$`) starts at `start`.
fn dollar_tag_len(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if bytes.get(i).is_some_and(|b| is_ident_start(*b)) {
        while bytes.get(i).is_some_and(|b| is_ident_char(*b)) {
            i += 1;
        }
    }
    (bytes.get(i) == Some(&b'$')).then_some(i + 1 - start)
}

fn find_from(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// If a string literal, quoted identifier, dollar-quoted body or comment
/// starts at `i`, returns the index just past it.
pub(crate) fn skip_non_code(bytes: &[u8], i: usize) -> Option<usize> {
    match bytes[i] {
        b'\'' | b'"' => Some(skip_quoted(bytes, i, bytes[i])),
        b'-' if bytes.get(i + 1) == Some(&b'-') => {
            Some(find_from(bytes, i, b"\n").map_or(bytes.len(), |p| p + 1))
        }
        b'/' if bytes.get(i + 1) == Some(&b'*') => {
            Some(find_from(bytes, i + 2, b"*/").map_or(bytes.len(), |p| p + 2))
        }
        b'$' => dollar_tag_len(bytes, i).map(|len| {
            let tag = &bytes[i..i + len];
            find_from(bytes, i + len, tag).map_or(bytes.len(), |p| p + len)
        }),
        _ => None,
    }
}

/// Rewrite `:name` placeholders to `$n`.
pub fn rewrite(sql: &str) -> NamedQuery {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    // Start of the pending verbatim run.
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(next) = skip_non_code(bytes, i) {
            i = next;
            continue;
        }
        match bytes[i] {
            b':' if bytes.get(i + 1) == Some(&b':') => i += 2,
            b':' if bytes.get(i + 1).is_some_and(|b| is_ident_start(*b))
                && (i == 0 || !is_ident_char(bytes[i - 1])) =>
            {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && is_ident_char(bytes[end]) {
                    end += 1;
                }
                let name = &sql[start..end];
                let position = match names.iter().position(|n| n == name) {
                    Some(p) => p,
                    None => {
                        names.push(name.to_string());
                        names.len() - 1
                    }
                };
                out.push_str(&sql[copied..i]);
                out.push('$');
                out.push_str(&(position + 1).to_string());
                copied = end;
                i = end;
            }
            _ => i += 1,
        }
    }
    out.push_str(&sql[copied..]);

    NamedQuery { sql: out, names }
}

//! SQL and identifier sanitization.
//!
//! Pure validation functions with no I/O. Every piece of user-influenced
//! text passes through here before it can reach the database: full query
//! text through [`sanitize_query`], identifiers through
//! [`sanitize_identifier`], and free-form fragments (WHERE clauses, ORDER BY
//! lists, interval literals) through their dedicated validators.
//!
//! Identifiers cannot be bound as query parameters, so they are whitelisted
//! syntactically; every other user value must travel as a bound parameter.

use crate::config::AccessMode;
use crate::error::{ServerError, ServerResult};
use once_cell::sync::Lazy;
use regex::Regex;

/// Statement keywords allowed in read-only mode.
const READ_ONLY_KEYWORDS: &[&str] = &["SELECT", "EXPLAIN", "WITH"];

/// Additional keywords allowed in read-write mode.
const READ_WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP", "TRUNCATE", "VACUUM", "ANALYZE",
    "REINDEX",
];

/// Compile a hardcoded pattern. These are constants verified by tests, so a
/// failure here is a programming error caught at first use.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern)
        .unwrap_or_else(|e| panic!("invalid built-in regex pattern '{}': {}", pattern, e))
}

/// Dangerous substrings rejected regardless of statement kind.
static DANGEROUS_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            compile(
                r"(?i);\s*(DROP|DELETE|TRUNCATE|ALTER|INSERT|UPDATE|CREATE|GRANT|REVOKE|EXEC|EXECUTE)\b",
            ),
            "stacked statement after semicolon",
        ),
        (compile(r"--"), "SQL line comment"),
        (compile(r"/\*"), "SQL block comment open"),
        (compile(r"\*/"), "SQL block comment close"),
        (compile(r"(?i)\bxp_\w+"), "extended stored procedure"),
        (
            compile(r"(?i)\bUNION\s+(ALL\s+)?SELECT\b"),
            "UNION SELECT injection",
        ),
    ]
});

/// Narrower pattern set for WHERE/condition/ORDER BY fragments. Fragments
/// are never allowed to introduce a new statement or comment.
static FRAGMENT_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (compile(r";"), "semicolon in fragment"),
        (compile(r"--"), "SQL line comment"),
        (compile(r"/\*"), "SQL block comment open"),
        (compile(r"\*/"), "SQL block comment close"),
        (compile(r"(?i)\bxp_\w+"), "extended stored procedure"),
        (
            compile(r"(?i)\bUNION\s+(ALL\s+)?SELECT\b"),
            "UNION SELECT injection",
        ),
        (
            compile(r"(?i)\b(DROP|TRUNCATE|GRANT|REVOKE|EXEC|EXECUTE)\b"),
            "disallowed keyword in fragment",
        ),
    ]
});

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| compile(r"^[A-Za-z_][A-Za-z0-9_]*$"));

static INTERVAL_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"^\d+\s+(second|minute|hour|day|week|month|year)s?$"));

static ORDER_BY_RE: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)^[A-Za-z_][A-Za-z0-9_]*(\s+(ASC|DESC))?(\s*,\s*[A-Za-z_][A-Za-z0-9_]*(\s+(ASC|DESC))?)*$")
});

/// Validate a full SQL statement against the active access mode.
///
/// Checks, in order: non-empty text, leading keyword in the mode's
/// allow-list, no dangerous pattern match, and no semicolon anywhere except
/// as the final character. Returns nothing on success; the contract is
/// validation-only.
pub fn sanitize_query(query: &str, mode: AccessMode) -> ServerResult<()> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(ServerError::validation("query is empty"));
    }

    let keyword = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    let allowed = match mode {
        AccessMode::ReadOnly => READ_ONLY_KEYWORDS.contains(&keyword.as_str()),
        AccessMode::ReadWrite => {
            READ_ONLY_KEYWORDS.contains(&keyword.as_str())
                || READ_WRITE_KEYWORDS.contains(&keyword.as_str())
        }
    };
    if !allowed {
        return Err(ServerError::validation(format!(
            "statement kind '{}' is not allowed in {} mode",
            keyword, mode
        )));
    }

    for (pattern, label) in DANGEROUS_PATTERNS.iter() {
        if pattern.is_match(trimmed) {
            return Err(ServerError::validation(format!(
                "query contains a dangerous pattern: {}",
                label
            )));
        }
    }

    // A semicolon may only terminate the statement.
    if let Some(pos) = trimmed.find(';') {
        if pos != trimmed.len() - 1 {
            return Err(ServerError::validation(
                "semicolon is only allowed as the final character",
            ));
        }
    }

    Ok(())
}

/// Validate an identifier (table, schema, column, index name).
///
/// Returns the identifier unchanged on success. This is the single
/// chokepoint every name must pass before being interpolated into SQL text.
pub fn sanitize_identifier(id: &str) -> ServerResult<&str> {
    if IDENTIFIER_RE.is_match(id) {
        Ok(id)
    } else {
        Err(ServerError::validation(format!(
            "invalid identifier '{}': must match [A-Za-z_][A-Za-z0-9_]*",
            id
        )))
    }
}

/// Quote an identifier for interpolation, doubling embedded double quotes.
///
/// Callers must run [`sanitize_identifier`] first; quoting alone is not a
/// safety boundary.
pub fn escape_identifier(id: &str) -> String {
    format!("\"{}\"", id.replace('"', "\"\""))
}

/// Drop an optional leading `WHERE` keyword from a user-supplied clause,
/// returning the bare condition.
pub fn strip_where_keyword(clause: &str) -> &str {
    let trimmed = clause.trim();
    match trimmed.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("where ") => trimmed[6..].trim_start(),
        _ => trimmed,
    }
}

/// Validate a user-supplied WHERE clause, with or without the leading
/// `WHERE` keyword. Returns the bare condition, ready to splice after a
/// `WHERE` the caller writes itself.
pub fn validate_where_clause(clause: &str) -> ServerResult<&str> {
    let condition = strip_where_keyword(clause);
    validate_condition(condition)?;
    Ok(condition)
}

/// Validate a boolean condition fragment (no leading keyword).
pub fn validate_condition(condition: &str) -> ServerResult<()> {
    let trimmed = condition.trim();
    if trimmed.is_empty() {
        return Err(ServerError::validation("condition is empty"));
    }
    for (pattern, label) in FRAGMENT_PATTERNS.iter() {
        if pattern.is_match(trimmed) {
            return Err(ServerError::validation(format!(
                "condition contains a dangerous pattern: {}",
                label
            )));
        }
    }
    if !balanced(trimmed, '(', ')') {
        return Err(ServerError::validation(
            "condition has unbalanced parentheses",
        ));
    }
    if trimmed.matches('\'').count() % 2 != 0 {
        return Err(ServerError::validation("condition has unbalanced quotes"));
    }
    Ok(())
}

/// Validate an ORDER BY column list: comma-separated identifiers, each with
/// an optional ASC/DESC suffix.
pub fn validate_order_by(order_by: &str) -> ServerResult<()> {
    let trimmed = order_by.trim();
    if trimmed.is_empty() {
        return Err(ServerError::validation("ORDER BY list is empty"));
    }
    if ORDER_BY_RE.is_match(trimmed) {
        Ok(())
    } else {
        Err(ServerError::validation(format!(
            "invalid ORDER BY list '{}'",
            trimmed
        )))
    }
}

/// Validate a PostgreSQL interval literal such as `5 minutes` or `1 day`.
pub fn validate_interval(interval: &str) -> ServerResult<()> {
    let trimmed = interval.trim();
    if INTERVAL_RE.is_match(trimmed) {
        Ok(())
    } else {
        Err(ServerError::validation(format!(
            "invalid interval '{}': expected '<n> <unit>' with unit in \
             second/minute/hour/day/week/month/year",
            trimmed
        )))
    }
}

fn balanced(s: &str, open: char, close: char) -> bool {
    let mut depth: i32 = 0;
    for c in s.chars() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth < 0 {
                return false;
            }
        }
    }
    depth == 0
}

//! Syntactic read-only guard.
//!
//! Last line of defense on top of the connection-level read-only attribute
//! (which not every driver honors). The check is an allow-list, not a SQL
//! parser: after stripping leading whitespace and comments, a statement must
//! begin with a read keyword, and no statement separator may be followed by
//! a mutating verb. A stored procedure invoked through an allowed verb can
//! still write; the connection-level attribute is the backstop for that.

use crate::error::{DatabaseError, DbResult};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Leading keywords that are allowed on a read-only connection.
const READ_KEYWORDS: &[&str] = &["SELECT", "WITH", "EXPLAIN", "SHOW", "DESCRIBE", "PRAGMA"];

/// Line comments (`-- ...`) up to end of line.
static LINE_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"--[^\n]*").expect("Invalid regex: line comment pattern"));

/// Block comments (`/* ... */`), non-greedy, spanning lines.
static BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("Invalid regex: block comment pattern"));

/// A statement separator followed by a mutating verb anywhere in the text.
static SEPARATED_MUTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i);\s*(INSERT|UPDATE|DELETE|DROP|ALTER|CREATE|TRUNCATE|MERGE|GRANT|REVOKE|EXEC|EXECUTE|CALL|SET|USE)\b",
    )
    .expect("Invalid regex: separated mutation pattern")
});

/// The assignment form of PRAGMA (`PRAGMA name = value`), which writes.
/// The bare and call forms (`PRAGMA name`, `PRAGMA table_info(t)`) read.
static PRAGMA_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*PRAGMA\s[^(;]*=").expect("Invalid regex: pragma assignment pattern")
});

/// Statement-shape check for read-only connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyGuard;

impl ReadOnlyGuard {
    pub fn new() -> Self {
        Self
    }

    /// Reject any statement that is not shaped like a read.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::WriteNotAllowed`] when the leading keyword is not on
    /// the allow-list or a separator is followed by a mutating verb. The
    /// rejected statement never reaches the driver.
    pub fn check(&self, sql: &str) -> DbResult<()> {
        let stripped = strip_comments(sql);
        let trimmed = stripped.trim_start();

        let leading = trimmed
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .find(|s| !s.is_empty())
            .unwrap_or("")
            .to_uppercase();

        if !READ_KEYWORDS.contains(&leading.as_str()) {
            warn!(keyword = %leading, "Rejected non-read statement");
            return Err(DatabaseError::WriteNotAllowed(offending(sql)));
        }

        if leading == "PRAGMA" && PRAGMA_ASSIGNMENT.is_match(trimmed) {
            warn!("Rejected PRAGMA assignment");
            return Err(DatabaseError::WriteNotAllowed(offending(sql)));
        }

        if SEPARATED_MUTATION.is_match(&stripped) {
            warn!("Rejected multi-statement payload with mutating verb");
            return Err(DatabaseError::WriteNotAllowed(offending(sql)));
        }

        Ok(())
    }
}

/// Remove line and block comments so a comment prefix cannot hide the real
/// leading keyword.
fn strip_comments(sql: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(sql, " ");
    LINE_COMMENT.replace_all(&without_blocks, " ").to_string()
}

/// The offending SQL, shortened for the error message.
fn offending(sql: &str) -> String {
    const MAX: usize = 120;
    let trimmed = sql.trim();
    if trimmed.len() <= MAX {
        trimmed.to_string()
    } else {
        let cut = trimmed
            .char_indices()
            .take_while(|(i, _)| *i < MAX)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &trimmed[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(sql: &str) -> bool {
        matches!(
            ReadOnlyGuard::new().check(sql),
            Err(DatabaseError::WriteNotAllowed(_))
        )
    }

    #[test]
    fn test_reads_allowed() {
        let guard = ReadOnlyGuard::new();
        assert!(guard.check("SELECT * FROM customers").is_ok());
        assert!(guard.check("  select id from t").is_ok());
        assert!(
            guard
                .check("WITH cte AS (SELECT 1) SELECT * FROM cte")
                .is_ok()
        );
        assert!(guard.check("EXPLAIN SELECT 1").is_ok());
        assert!(guard.check("-- leading comment\nSELECT 1").is_ok());
        assert!(guard.check("/* hi */ SELECT 1").is_ok());
    }

    #[test]
    fn test_mutations_rejected() {
        for sql in [
            "INSERT INTO t VALUES (1)",
            "update t set x = 1",
            "DELETE FROM customers",
            "DROP TABLE t",
            "ALTER TABLE t ADD c INT",
            "CREATE TABLE t (id INT)",
            "TRUNCATE TABLE t",
            "MERGE INTO t USING s ON 1=1",
            "EXEC sp_do_things",
            "GRANT ALL ON t TO u",
        ] {
            assert!(rejected(sql), "should reject: {sql}");
        }
    }

    #[test]
    fn test_leading_whitespace_and_comments_do_not_bypass() {
        assert!(rejected("   \n\t DELETE FROM t"));
        assert!(rejected("-- harmless\nDROP TABLE t"));
        assert!(rejected("/* select */ UPDATE t SET x = 1"));
        assert!(rejected("/* a */ /* b */ insert into t values (1)"));
    }

    #[test]
    fn test_pragma_reads_allowed_assignments_rejected() {
        let guard = ReadOnlyGuard::new();
        assert!(guard.check("PRAGMA table_info(customers)").is_ok());
        assert!(guard.check("PRAGMA user_version").is_ok());

        assert!(rejected("PRAGMA user_version = 7"));
        assert!(rejected("pragma journal_mode=DELETE"));
        assert!(rejected("  PRAGMA main.user_version = 7"));
    }

    #[test]
    fn test_multi_statement_payloads_rejected() {
        assert!(rejected("SELECT 1; DROP TABLE customers"));
        assert!(rejected("select * from a; exec bad_proc"));
        assert!(rejected("SELECT 1 ;\n  truncate table t"));
    }

    #[test]
    fn test_trailing_semicolon_alone_is_fine() {
        assert!(ReadOnlyGuard::new().check("SELECT 1;").is_ok());
    }

    #[test]
    fn test_error_carries_offending_sql() {
        let err = ReadOnlyGuard::new().check("DELETE FROM t").unwrap_err();
        match err {
            DatabaseError::WriteNotAllowed(sql) => assert!(sql.contains("DELETE FROM t")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

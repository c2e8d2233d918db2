//! Query result shapes and catalog descriptors.
//!
//! Everything here is transport-neutral: rows are positional, values are
//! normalized to a small portable type set, and nothing references a native
//! driver type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Portable column type reported alongside every column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortableType {
    Text,
    Integer,
    Float,
    /// Exact numerics are carried as text to avoid precision loss.
    Decimal,
    Boolean,
    DateTime,
    Binary,
    Unknown,
}

/// Column metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Type name as reported by the driver, for diagnostics.
    pub declared_type: String,
    pub portable_type: PortableType,
}

impl Column {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        let declared_type = declared_type.into();
        let portable_type = PortableType::from_declared(&declared_type);
        Self {
            name: name.into(),
            declared_type,
            portable_type,
        }
    }
}

impl PortableType {
    /// Map a driver-reported type name onto the portable set.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.to_uppercase();
        match upper.as_str() {
            _ if upper.contains("CHAR") || upper.contains("TEXT") || upper.contains("CLOB") => {
                Self::Text
            }
            _ if upper.contains("INT") => Self::Integer,
            _ if upper.contains("BOOL") || upper == "BIT" => Self::Boolean,
            _ if upper.contains("FLOAT")
                || upper.contains("DOUBLE")
                || upper.contains("REAL") =>
            {
                Self::Float
            }
            _ if upper.contains("DEC") || upper.contains("NUMERIC") || upper.contains("MONEY") => {
                Self::Decimal
            }
            _ if upper.contains("DATE") || upper.contains("TIME") => Self::DateTime,
            _ if upper.contains("BINARY") || upper.contains("BLOB") || upper.contains("IMAGE") => {
                Self::Binary
            }
            _ => Self::Unknown,
        }
    }
}

/// One scalar cell, normalized to the portable type set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Exact numeric rendered as text.
    Decimal(String),
    DateTime(DateTime<Utc>),
    /// Binary payload, opaque to callers.
    Bytes(Vec<u8>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Decimal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<()> for CellValue {
    fn from(_: ()) -> Self {
        Self::Null
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Option<String>> for CellValue {
    fn from(v: Option<String>) -> Self {
        match v {
            Some(s) => Self::Text(s),
            None => Self::Null,
        }
    }
}

/// Raw fetch outcome from a driver session, before the executor shapes it.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<CellValue>>,
    /// True when the cursor had rows past the fetch limit.
    pub more_rows: bool,
}

/// Final result of one executed query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<CellValue>>,
    pub row_count: usize,
    /// True when the row limit was hit before the driver exhausted results.
    /// A normal outcome, not a failure.
    pub truncated: bool,
    pub elapsed_ms: u64,
}

impl QueryResult {
    pub fn new(outcome: FetchOutcome, elapsed_ms: u64) -> Self {
        let row_count = outcome.rows.len();
        Self {
            columns: outcome.columns,
            rows: outcome.rows,
            row_count,
            truncated: outcome.more_rows,
            elapsed_ms,
        }
    }
}

/// A table visible in the catalog. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub catalog: String,
    pub schema: String,
    pub name: String,
    pub table_type: String,
}

impl TableDescriptor {
    /// `schema.name`, or bare name when no schema applies.
    pub fn qualified_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }
}

/// One column in a table schema. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
    pub ordinal: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portable_type_mapping() {
        assert_eq!(PortableType::from_declared("VARCHAR"), PortableType::Text);
        assert_eq!(
            PortableType::from_declared("integer"),
            PortableType::Integer
        );
        assert_eq!(
            PortableType::from_declared("NUMERIC(10,2)"),
            PortableType::Decimal
        );
        assert_eq!(PortableType::from_declared("BIT"), PortableType::Boolean);
        assert_eq!(
            PortableType::from_declared("TIMESTAMP"),
            PortableType::DateTime
        );
        assert_eq!(
            PortableType::from_declared("VARBINARY"),
            PortableType::Binary
        );
        assert_eq!(PortableType::from_declared("XML"), PortableType::Unknown);
    }

    #[test]
    fn test_query_result_from_outcome() {
        let outcome = FetchOutcome {
            columns: vec![Column::new("id", "INTEGER")],
            rows: vec![vec![CellValue::Int(1)], vec![CellValue::Int(2)]],
            more_rows: true,
        };
        let result = QueryResult::new(outcome, 12);
        assert_eq!(result.row_count, 2);
        assert!(result.truncated);
        assert_eq!(result.elapsed_ms, 12);
    }

    #[test]
    fn test_cell_value_conversions() {
        let null: CellValue = ().into();
        assert!(null.is_null());

        let int: CellValue = 42i64.into();
        assert_eq!(int.as_i64(), Some(42));

        let text: CellValue = "hello".into();
        assert_eq!(text.as_str(), Some("hello"));
    }

    #[test]
    fn test_qualified_name() {
        let t = TableDescriptor {
            catalog: String::new(),
            schema: "dbo".into(),
            name: "customers".into(),
            table_type: "TABLE".into(),
        };
        assert_eq!(t.qualified_name(), "dbo.customers");
    }
}

//! Row values moved from the source cursor to the target insert.
//!
//! Values are owned so batches can cross the reader/writer channel without
//! borrowing from driver buffers. No value is transformed on the way: the
//! variant is chosen from the source column type and written back as-is.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Signed integer of any width (tinyint .. bigint).
    Int(i64),

    /// Unsigned integer of any width.
    UInt(u64),

    /// Single precision float.
    Float(f32),

    /// Double precision float.
    Double(f64),

    /// Exact decimal.
    Decimal(Decimal),

    /// Character data (char, varchar, text, enum, set, json).
    Text(String),

    /// Binary data (binary, varbinary, blob, bit, spatial types).
    Bytes(Vec<u8>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time of day.
    Time(NaiveTime),

    /// Datetime or timestamp.
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::UInt(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// A batch of rows fetched by one cursor cycle.
#[derive(Debug)]
pub struct Batch {
    /// Rows in column order of the read request.
    pub rows: Vec<Vec<SqlValue>>,

    /// Whether the cursor is exhausted after this batch.
    pub is_last: bool,
}

impl Batch {
    /// Create a new batch with the given rows.
    pub fn new(rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            rows,
            is_last: false,
        }
    }

    /// Create an empty final batch.
    pub fn empty_final() -> Self {
        Self {
            rows: Vec::new(),
            is_last: true,
        }
    }

    /// Mark this as the final batch.
    pub fn mark_final(mut self) -> Self {
        self.is_last = true;
        self
    }

    /// Get the number of rows in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_is_null() {
        assert!(SqlValue::Null.is_null());
        assert!(!SqlValue::Int(42).is_null());
        assert!(SqlValue::from(None::<i64>).is_null());
    }

    #[test]
    fn test_batch_operations() {
        let batch = Batch::new(vec![
            vec![SqlValue::Int(1), SqlValue::from("a")],
            vec![SqlValue::Int(2), SqlValue::from("b")],
        ]);

        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        assert!(!batch.is_last);

        let final_batch = batch.mark_final();
        assert!(final_batch.is_last);
        assert!(Batch::empty_final().is_empty());
    }

    #[test]
    fn test_from_implementations() {
        assert_eq!(SqlValue::from(42i64), SqlValue::Int(42));
        assert_eq!(SqlValue::from(7u64), SqlValue::UInt(7));
        assert_eq!(
            SqlValue::from("hello".to_string()),
            SqlValue::Text("hello".to_string())
        );
    }
}

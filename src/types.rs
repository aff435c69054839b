use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Values that can be bound as statement parameters or read back from a row.
///
/// Repositories build their parameter lists from this enum so they never touch driver types:
/// ```rust
/// use portfolio_store::prelude::*;
/// use rust_decimal::Decimal;
///
/// let params = vec![
///     RowValues::Text("buy".into()),
///     RowValues::Decimal(Decimal::new(1525, 2)),
///     RowValues::Null,
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit), narrowed on bind for `int2`/`int4` columns
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Exact decimal for `numeric` columns
    Decimal(Decimal),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// UUID value
    Uuid(Uuid),
    /// NULL value
    Null,
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let RowValues::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        if let RowValues::Bool(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    /// Decimal view of a numeric value; integers widen losslessly.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            RowValues::Decimal(value) => Some(*value),
            RowValues::Int(value) => Some(Decimal::from(*value)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_uuid(&self) -> Option<Uuid> {
        if let RowValues::Uuid(value) = self {
            Some(*value)
        } else {
            None
        }
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<Decimal> for RowValues {
    fn from(value: Decimal) -> Self {
        RowValues::Decimal(value)
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

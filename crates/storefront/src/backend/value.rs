//! Document field values.
//!
//! Mirrors the value kinds a remote document can hold. Services read fields
//! through the lenient accessors here so a mistyped field degrades to a
//! default instead of failing the whole document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

/// Field map of a document or nested map value.
pub type Fields = BTreeMap<String, Value>;

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    Timestamp(DateTime<Utc>),
    String(String),
    Array(Vec<Value>),
    Map(Fields),
}

impl Value {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view. Doubles with no fractional part are accepted.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // guarded by the fract/range check
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Double(d)
                if d.fract() == 0.0 && *d >= i64::MIN as f64 && *d <= i64::MAX as f64 =>
            {
                Some(*d as i64)
            }
            _ => None,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Decimal view of a numeric field. Strings holding a number are accepted
    /// because hand-edited documents sometimes store prices as text.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Integer(i) => Some(Decimal::from(*i)),
            Self::Double(d) => Decimal::from_f64(*d),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_map(&self) -> Option<&Fields> {
        match self {
            Self::Map(fields) => Some(fields),
            _ => None,
        }
    }

    /// Equality used by equality filters: integers and doubles compare by
    /// numeric value, everything else structurally.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(_) | Self::Double(_), Self::Integer(_) | Self::Double(_)) => {
                self.as_f64() == other.as_f64()
            }
            _ => self == other,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<Decimal> for Value {
    /// Whole amounts are stored as integers, anything else as a double.
    fn from(d: Decimal) -> Self {
        if d.fract().is_zero()
            && let Some(i) = d.to_i64()
        {
            return Self::Integer(i);
        }
        d.to_f64().map_or(Self::Null, Self::Double)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

impl From<Vec<Self>> for Value {
    fn from(values: Vec<Self>) -> Self {
        Self::Array(values)
    }
}

impl From<Fields> for Value {
    fn from(fields: Fields) -> Self {
        Self::Map(fields)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Lenient typed reads over a field map.
pub trait FieldsExt {
    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str;
    fn opt_string(&self, key: &str) -> Option<String>;
    fn decimal_or_zero(&self, key: &str) -> Decimal;
    fn f64_or_zero(&self, key: &str) -> f64;
    fn u32_or_zero(&self, key: &str) -> u32;
    fn timestamp(&self, key: &str) -> Option<DateTime<Utc>>;
    fn array(&self, key: &str) -> &[Value];
}

impl FieldsExt for Fields {
    /// String field, falling back to `default` when missing, mistyped or empty.
    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
    }

    fn opt_string(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_owned)
    }

    fn decimal_or_zero(&self, key: &str) -> Decimal {
        self.get(key)
            .and_then(Value::as_decimal)
            .unwrap_or(Decimal::ZERO)
    }

    fn f64_or_zero(&self, key: &str) -> f64 {
        self.get(key)
            .and_then(Value::as_f64)
            .filter(|f| f.is_finite())
            .unwrap_or(0.0)
    }

    /// Non-negative integer field; negatives and overflow read as zero.
    fn u32_or_zero(&self, key: &str) -> u32 {
        self.get(key)
            .and_then(Value::as_i64)
            .and_then(|i| u32::try_from(i).ok())
            .unwrap_or(0)
    }

    fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get(key).and_then(Value::as_timestamp)
    }

    fn array(&self, key: &str) -> &[Value] {
        self.get(key).and_then(Value::as_array).unwrap_or(&[])
    }
}

/// Build a [`Fields`] map from `key => value` pairs.
///
/// ```rust,ignore
/// let fields = fields! { "name" => "Vase", "quantity" => 3_u32 };
/// ```
#[macro_export]
macro_rules! fields {
    () => { $crate::backend::Fields::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::backend::Fields::new();
        $(map.insert(::std::string::String::from($key), $crate::backend::Value::from($value));)+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_conversion_prefers_integers() {
        assert_eq!(Value::from(Decimal::from(250_000)), Value::Integer(250_000));
        assert_eq!(Value::from(Decimal::new(15, 1)), Value::Double(1.5));
    }

    #[test]
    fn test_as_i64_accepts_integral_doubles() {
        assert_eq!(Value::Double(12.0).as_i64(), Some(12));
        assert_eq!(Value::Double(12.5).as_i64(), None);
        assert_eq!(Value::from("12").as_i64(), None);
    }

    #[test]
    fn test_numeric_match_across_kinds() {
        assert!(Value::Integer(3).matches(&Value::Double(3.0)));
        assert!(!Value::Integer(3).matches(&Value::from("3")));
        assert!(Value::from("ceramics").matches(&Value::from("ceramics")));
    }

    #[test]
    fn test_lenient_reads() {
        let fields = fields! {
            "name" => "",
            "price" => "120000",
            "quantity" => -4_i64,
            "rating" => 4.5,
        };
        assert_eq!(fields.str_or("name", "fallback"), "fallback");
        assert_eq!(fields.decimal_or_zero("price"), Decimal::from(120_000));
        assert_eq!(fields.u32_or_zero("quantity"), 0);
        assert!((fields.f64_or_zero("rating") - 4.5).abs() < f64::EPSILON);
        assert!(fields.array("wishlist").is_empty());
    }
}

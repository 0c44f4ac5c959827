//! Plain storage values.
//!
//! [`Value`] is the backend-agnostic representation of one attribute. Numbers
//! read back from the store arrive as [`Value::Decimal`], an exact decimal
//! literal; floats are only ever persisted in that form.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

/// An ordered mapping from attribute name to value.
pub type Item = BTreeMap<String, Value>;

/// One attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact decimal literal, e.g. `"3.14"`.
    Decimal(String),
    String(String),
    Binary(Vec<u8>),
    List(Vec<Value>),
    Map(Item),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for the values that are never persisted: `Null` and `""`.
    ///
    /// Zero and `false` are real values and are not considered empty.
    pub fn is_absent(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Item> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Canonical text of a scalar, used to compare key attributes.
    ///
    /// Numeric variants share one canonical form so that `Int(5)` and
    /// `Decimal("5")` identify the same key. Returns `None` for non-scalars.
    pub fn key_text(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(format!("S:{s}")),
            Value::Int(i) => Some(format!("N:{i}")),
            Value::Float(f) => Some(format!("N:{}", normalize_decimal(&format_float(*f)))),
            Value::Decimal(d) => Some(format!("N:{}", normalize_decimal(d))),
            Value::Bool(b) => Some(format!("B:{b}")),
            Value::Binary(b) => Some(format!("X:{b:?}")),
            _ => None,
        }
    }

    /// Converts to JSON for display purposes. Decimals become JSON numbers
    /// when they parse, strings otherwise.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Decimal(d) => {
                if let Ok(i) = d.parse::<i64>() {
                    serde_json::Value::from(i)
                } else if let Some(n) = d
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                {
                    serde_json::Value::Number(n)
                } else {
                    serde_json::Value::String(d.clone())
                }
            }
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Binary(b) => {
                serde_json::Value::Array(b.iter().map(|x| serde_json::Value::from(*x)).collect())
            }
            Value::List(l) => serde_json::Value::Array(l.iter().map(Value::to_json).collect()),
            Value::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Builds a value from JSON. Integral numbers become `Int`, other numbers
    /// keep their exact text as `Decimal`.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Decimal(n.to_string()),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(a) => Value::List(a.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(o) => Value::Map(
                o.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s:?}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

/// Serializes as the JSON form of [`Value::to_json`].
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Shortest decimal text that round-trips to the same `f64`.
///
/// `3.14` becomes `"3.14"`, not the binary expansion
/// `3.140000000000000124344978758017532527446746826171875`.
pub fn format_float(value: f64) -> String {
    format!("{value}")
}

/// Rewrites a decimal literal in plain positional form without redundant
/// zeros, so equal decimals compare equal as text. Works on the digits
/// alone and never rounds. Text that is not a decimal literal is returned
/// trimmed.
fn normalize_decimal(text: &str) -> String {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (mantissa, exponent) = match body.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => match exponent.parse::<i64>() {
            Ok(exponent) if exponent.abs() <= MAX_EXPONENT => (mantissa, exponent),
            _ => return text.to_string(),
        },
        None => (body, 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if (whole.is_empty() && fraction.is_empty())
        || !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit())
    {
        return text.to_string();
    }

    let digits = format!("{whole}{fraction}");
    let significant = digits.trim_start_matches('0');
    // Position of the decimal point, counted from the first significant digit.
    let point = whole.len() as i64 + exponent - (digits.len() - significant.len()) as i64;
    let significant = significant.trim_end_matches('0');
    if significant.is_empty() {
        return "0".to_string();
    }

    let len = significant.len() as i64;
    let plain = if point <= 0 {
        format!("0.{}{significant}", "0".repeat(point.unsigned_abs() as usize))
    } else if point >= len {
        format!("{significant}{}", "0".repeat((point - len) as usize))
    } else {
        let (head, tail) = significant.split_at(point as usize);
        format!("{head}.{tail}")
    };
    if negative {
        format!("-{plain}")
    } else {
        plain
    }
}

/// Exponents beyond this are left as written rather than expanded.
const MAX_EXPONENT: i64 = 400;

/// Builds a key item from `(attribute, value)` pairs.
///
/// ```
/// use tablekit_core::model::{key, Value};
///
/// let k = key([("id", 5)]);
/// assert_eq!(k.get("id"), Some(&Value::Int(5)));
/// ```
pub fn key<I, K, V>(pairs: I) -> Item
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// True when every attribute of `key` is present in `item` with the same
/// scalar value.
pub fn key_matches(key: &Item, item: &Item) -> bool {
    key.iter().all(|(name, expected)| match item.get(name) {
        Some(actual) => match (expected.key_text(), actual.key_text()) {
            (Some(a), Some(b)) => a == b,
            _ => expected == actual,
        },
        None => false,
    })
}

/// Canonical text for a whole key, stable across numeric representations.
pub fn key_fingerprint(key: &Item) -> String {
    key.iter()
        .map(|(name, value)| {
            let text = value.key_text().unwrap_or_else(|| value.to_string());
            format!("{name}={text}")
        })
        .collect::<Vec<_>>()
        .join("|")
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::String(v.clone())
    }
}

impl From<Item> for Value {
    fn from(v: Item) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

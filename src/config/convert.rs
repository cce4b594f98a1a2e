//! Typed conversions out of [`Value`].
//!
//! Each target type defines which stored values it accepts; everything else
//! is a [`ConversionError`]. The rules are:
//!
//! | Target | Accepts |
//! |---|---|
//! | `String` | strings as-is, booleans and numbers via their display form |
//! | integers | integers (range checked), floats without fraction, booleans as `1`/`0`, trimmed base-10 strings |
//! | `f64`, `f32` | floats, integers, strings that parse as floats |
//! | `bool` | booleans, integers `0`/`1`, strings `true`/`false`/`1`/`0` (any case) |
//! | `Duration` | non-negative numbers as seconds, strings such as `90s`, `1h30m`, `250ms` or a bare number of seconds |
//! | `Vec<T>` | sequences element-wise, strings split on whitespace |
//! | `BTreeMap<String, T>` | mappings value-wise |
//! | `Option<T>` | `null` as `None`, anything else through `T` |

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::value::Value;

/// A stored value could not be converted into the requested type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    expected: &'static str,
    found: String,
}

impl ConversionError {
    pub fn new(expected: &'static str, value: &Value) -> Self {
        Self {
            expected,
            found: describe(value),
        }
    }

    pub fn expected(&self) -> &'static str {
        self.expected
    }

    pub fn found(&self) -> &str {
        &self.found
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.found)
    }
}

impl std::error::Error for ConversionError {}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean `{b}`"),
        Value::Integer(i) => format!("integer `{i}`"),
        Value::Float(f) => format!("float `{f}`"),
        Value::String(s) => format!("string {s:?}"),
        Value::Sequence(_) | Value::Map(_) => value.kind().to_string(),
    }
}

/// Types that can be produced from a stored [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ConversionError>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Bool(_) | Value::Integer(_) | Value::Float(_) => Ok(value.to_string()),
            _ => Err(ConversionError::new("string", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            Value::String(s) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case("true") || s == "1" {
                    Ok(true)
                } else if s.eq_ignore_ascii_case("false") || s == "0" {
                    Ok(false)
                } else {
                    Err(ConversionError::new("boolean", value))
                }
            }
            _ => Err(ConversionError::new("boolean", value)),
        }
    }
}

/// Widest integer view of a value; narrowing happens per target type.
pub(crate) fn to_i128(value: &Value, expected: &'static str) -> Result<i128, ConversionError> {
    match value {
        Value::Integer(i) => Ok(i128::from(*i)),
        Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Ok(*f as i128),
        Value::Bool(b) => Ok(i128::from(*b)),
        Value::String(s) => s
            .trim()
            .parse::<i128>()
            .map_err(|_| ConversionError::new(expected, value)),
        _ => Err(ConversionError::new(expected, value)),
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self, ConversionError> {
                    let expected = stringify!($ty);
                    let wide = to_i128(value, expected)?;
                    <$ty>::try_from(wide).map_err(|_| ConversionError::new(expected, value))
                }
            }
        )*
    };
}

impl_from_value_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Integer(i) => Ok(*i as f64),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| ConversionError::new("float", value)),
            _ => Err(ConversionError::new("float", value)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for Duration {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        let parsed = match value {
            Value::Integer(i) => u64::try_from(*i).ok().map(Duration::from_secs),
            Value::Float(f) => Duration::try_from_secs_f64(*f).ok(),
            Value::String(s) => parse_duration(s),
            _ => None,
        };
        parsed.ok_or_else(|| ConversionError::new("duration", value))
    }
}

/// Parses `1h30m`, `1.5s`, `250ms` or a bare number of seconds.
pub(crate) fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(secs) = input.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }

    let is_numeric = |c: char| c.is_ascii_digit() || c == '.';
    let mut nanos = 0.0_f64;
    let mut rest = input;

    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !is_numeric(c)).unwrap_or(rest.len());
        if number_end == 0 {
            return None;
        }
        let number: f64 = rest[..number_end].parse().ok()?;
        rest = &rest[number_end..];

        let unit_end = rest.find(is_numeric).unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        nanos += (number * nanos_per_unit).round();
        rest = &rest[unit_end..];
    }

    if nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(nanos as u64))
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Sequence(items) => items.iter().map(T::from_value).collect(),
            Value::String(s) => s
                .split_whitespace()
                .map(|part| T::from_value(&Value::String(part.to_string())))
                .collect(),
            _ => Err(ConversionError::new("sequence", value)),
        }
    }
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Map(map) => map
                .iter()
                .map(|(key, item)| Ok((key.clone(), T::from_value(item)?)))
                .collect(),
            _ => Err(ConversionError::new("mapping", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Map;

    #[test]
    fn test_string_from_scalars() {
        assert_eq!(String::from_value(&Value::from("x")).unwrap(), "x");
        assert_eq!(String::from_value(&Value::Integer(8080)).unwrap(), "8080");
        assert_eq!(String::from_value(&Value::Bool(true)).unwrap(), "true");
        assert!(String::from_value(&Value::Null).is_err());
        assert!(String::from_value(&Value::Sequence(vec![])).is_err());
    }

    #[test]
    fn test_integer_from_string() {
        assert_eq!(i64::from_value(&Value::from(" 8080 ")).unwrap(), 8080);
        assert_eq!(u16::from_value(&Value::from("8080")).unwrap(), 8080);
    }

    #[test]
    fn test_integer_rejects_non_numeric_string() {
        let err = i64::from_value(&Value::from("eighty")).unwrap_err();
        assert_eq!(err.expected(), "i64");
        assert_eq!(err.found(), "string \"eighty\"");
    }

    #[test]
    fn test_integer_range_checked() {
        assert!(u8::from_value(&Value::Integer(256)).is_err());
        assert!(u32::from_value(&Value::Integer(-1)).is_err());
        assert_eq!(i8::from_value(&Value::Integer(-128)).unwrap(), -128);
    }

    #[test]
    fn test_integer_from_float_and_bool() {
        assert_eq!(i64::from_value(&Value::Float(3.0)).unwrap(), 3);
        assert!(i64::from_value(&Value::Float(3.5)).is_err());
        assert_eq!(i64::from_value(&Value::Bool(true)).unwrap(), 1);
    }

    #[test]
    fn test_bool_rules() {
        for truthy in ["true", "TRUE", "True", "1", " true "] {
            assert!(bool::from_value(&Value::from(truthy)).unwrap(), "{truthy}");
        }
        for falsy in ["false", "FALSE", "0"] {
            assert!(!bool::from_value(&Value::from(falsy)).unwrap(), "{falsy}");
        }
        assert!(bool::from_value(&Value::from("yes")).is_err());
        assert!(bool::from_value(&Value::Integer(2)).is_err());
        assert!(bool::from_value(&Value::Integer(1)).unwrap());
    }

    #[test]
    fn test_float_rules() {
        assert_eq!(f64::from_value(&Value::Integer(2)).unwrap(), 2.0);
        assert_eq!(f64::from_value(&Value::from("2.5")).unwrap(), 2.5);
        assert!(f64::from_value(&Value::Bool(true)).is_err());
    }

    #[test]
    fn test_duration_rules() {
        assert_eq!(
            Duration::from_value(&Value::Integer(30)).unwrap(),
            Duration::from_secs(30)
        );
        assert_eq!(
            Duration::from_value(&Value::from("1h30m")).unwrap(),
            Duration::from_secs(5400)
        );
        assert_eq!(
            Duration::from_value(&Value::from("250ms")).unwrap(),
            Duration::from_millis(250)
        );
        assert_eq!(
            Duration::from_value(&Value::from("1.5s")).unwrap(),
            Duration::from_millis(1500)
        );
        assert_eq!(
            Duration::from_value(&Value::from("45")).unwrap(),
            Duration::from_secs(45)
        );
        assert!(Duration::from_value(&Value::Integer(-1)).is_err());
        assert!(Duration::from_value(&Value::from("-5s")).is_err());
        assert!(Duration::from_value(&Value::from("5 fortnights")).is_err());
        assert!(Duration::from_value(&Value::from("")).is_err());
    }

    #[test]
    fn test_vec_from_sequence_and_string() {
        let seq = Value::from(vec!["a", "b"]);
        assert_eq!(Vec::<String>::from_value(&seq).unwrap(), vec!["a", "b"]);

        let words = Value::from("a b  c");
        assert_eq!(
            Vec::<String>::from_value(&words).unwrap(),
            vec!["a", "b", "c"]
        );

        let ports = Value::from(vec!["80", "443"]);
        assert_eq!(Vec::<u16>::from_value(&ports).unwrap(), vec![80, 443]);
        assert!(Vec::<String>::from_value(&Value::Integer(1)).is_err());
    }

    #[test]
    fn test_option_maps_null_to_none() {
        assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
        assert_eq!(
            Option::<i64>::from_value(&Value::from("7")).unwrap(),
            Some(7)
        );
    }

    #[test]
    fn test_map_conversion() {
        let mut map = Map::new();
        map.insert("a".into(), Value::Integer(1));
        map.insert("b".into(), Value::from("2"));
        let converted = BTreeMap::<String, i64>::from_value(&Value::Map(map)).unwrap();
        assert_eq!(converted["a"], 1);
        assert_eq!(converted["b"], 2);
    }
}

//! Serde decoding of configuration trees.
//!
//! Decoding is weakly typed: scalars go through the same conversions as
//! [`FromValue`], so a stored `"8080"` decodes into a `u16`. Struct fields and
//! enum variants match configuration keys case-insensitively. Errors carry
//! the path of the first field that failed.

use std::collections::btree_map;
use std::fmt;
use std::vec;

use serde::de::{
    self, DeserializeOwned, DeserializeSeed, Deserializer, EnumAccess, MapAccess, SeqAccess,
    Unexpected, VariantAccess, Visitor,
};

use super::convert::{to_i128, FromValue};
use super::value::{Map, Value};

/// Decoding failed at `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    path: Vec<String>,
    message: String,
}

impl DecodeError {
    /// Dotted path of the offending field, relative to the decoded tree.
    pub fn path(&self) -> String {
        self.path.join(".")
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn within(mut self, segment: impl Into<String>) -> Self {
        self.path.insert(0, segment.into());
        self
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "field '{}': {}", self.path(), self.message)
        }
    }
}

impl std::error::Error for DecodeError {}

impl de::Error for DecodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self {
            path: Vec::new(),
            message: msg.to_string(),
        }
    }
}

/// Decodes `value` into `T`.
///
/// With `exact`, keys that no field of `T` consumes are rejected.
pub(crate) fn decode<T: DeserializeOwned>(value: Value, exact: bool) -> Result<T, DecodeError> {
    T::deserialize(ValueDeserializer { value, exact })
}

struct ValueDeserializer {
    value: Value,
    exact: bool,
}

impl ValueDeserializer {
    fn convert<T: FromValue>(&self) -> Result<T, DecodeError> {
        T::from_value(&self.value).map_err(de::Error::custom)
    }

    fn invalid_type(&self, expected: &dyn de::Expected) -> DecodeError {
        de::Error::invalid_type(unexpected(&self.value), expected)
    }
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Integer(i) => Unexpected::Signed(*i),
        Value::Float(f) => Unexpected::Float(*f),
        Value::String(s) => Unexpected::Str(s),
        Value::Sequence(_) => Unexpected::Seq,
        Value::Map(_) => Unexpected::Map,
    }
}

/// Returns the candidate spelled like `name` ignoring case, or `name` itself.
fn match_name(name: String, candidates: &'static [&'static str]) -> String {
    candidates
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(&name))
        .map_or(name, |candidate| (*candidate).to_string())
}

fn match_fields(map: Map, fields: &'static [&'static str]) -> Map {
    map.into_iter()
        .map(|(key, value)| (match_name(key, fields), value))
        .collect()
}

fn visit_sequence<'de, V: Visitor<'de>>(
    items: Vec<Value>,
    exact: bool,
    visitor: V,
) -> Result<V::Value, DecodeError> {
    let len = items.len();
    let mut seq = SeqDeserializer {
        iter: items.into_iter(),
        index: 0,
        exact,
    };
    let value = visitor.visit_seq(&mut seq)?;
    if seq.iter.len() == 0 {
        Ok(value)
    } else {
        Err(de::Error::invalid_length(len, &"fewer elements in sequence"))
    }
}

fn visit_mapping<'de, V: Visitor<'de>>(
    map: Map,
    exact: bool,
    visitor: V,
) -> Result<V::Value, DecodeError> {
    visitor.visit_map(MapDeserializer {
        iter: map.into_iter(),
        pending: None,
        exact,
    })
}

macro_rules! deserialize_signed {
    ($($method:ident),*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
                let n = self.convert::<i64>()?;
                visitor.visit_i64(n)
            }
        )*
    };
}

macro_rules! deserialize_unsigned {
    ($($method:ident),*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
                let n = self.convert::<u64>()?;
                visitor.visit_u64(n)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for ValueDeserializer {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Integer(i) => visitor.visit_i64(i),
            Value::Float(f) => visitor.visit_f64(f),
            Value::String(s) => visitor.visit_string(s),
            Value::Sequence(items) => visit_sequence(items, self.exact, visitor),
            Value::Map(map) => visit_mapping(map, self.exact, visitor),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let b = self.convert::<bool>()?;
        visitor.visit_bool(b)
    }

    deserialize_signed!(deserialize_i8, deserialize_i16, deserialize_i32, deserialize_i64);
    deserialize_unsigned!(deserialize_u8, deserialize_u16, deserialize_u32, deserialize_u64);

    fn deserialize_i128<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let n = to_i128(&self.value, "i128").map_err(de::Error::custom)?;
        visitor.visit_i128(n)
    }

    fn deserialize_u128<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let n = to_i128(&self.value, "u128").map_err(de::Error::custom)?;
        let n = u128::try_from(n).map_err(|_| self.invalid_type(&"an unsigned integer"))?;
        visitor.visit_u128(n)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_f64(visitor)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let f = self.convert::<f64>()?;
        visitor.visit_f64(f)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_string(visitor)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_string(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::String(s) => visitor.visit_string(s),
            _ => {
                let s = self.convert::<String>()?;
                visitor.visit_string(s)
            }
        }
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_any(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_any(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            _ => Err(self.invalid_type(&visitor)),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_newtype_struct(self)
    }

    /// Null decodes as an empty sequence and a lone scalar as a sequence of one.
    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::Sequence(items) => visit_sequence(items, self.exact, visitor),
            Value::Null => visit_sequence(Vec::new(), self.exact, visitor),
            Value::Map(_) => Err(self.invalid_type(&visitor)),
            scalar => visit_sequence(vec![scalar], self.exact, visitor),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::Map(map) => visit_mapping(map, self.exact, visitor),
            Value::Null => visit_mapping(Map::new(), self.exact, visitor),
            _ => Err(self.invalid_type(&visitor)),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        match self.value {
            Value::Map(map) => visit_mapping(match_fields(map, fields), self.exact, visitor),
            Value::Null => visit_mapping(Map::new(), self.exact, visitor),
            _ => Err(self.invalid_type(&visitor)),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        let exact = self.exact;
        match self.value {
            Value::String(name) => visitor.visit_enum(EnumDeserializer {
                variant: match_name(name, variants),
                value: None,
                exact,
            }),
            Value::Map(map) if map.len() == 1 => {
                let mut entries = map.into_iter();
                match entries.next() {
                    Some((name, value)) => visitor.visit_enum(EnumDeserializer {
                        variant: match_name(name, variants),
                        value: Some(value),
                        exact,
                    }),
                    None => Err(de::Error::custom("empty enum mapping")),
                }
            }
            other => Err(de::Error::invalid_type(unexpected(&other), &"enum variant")),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_string(visitor)
    }

    /// Reached for keys no field consumes.
    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        if self.exact {
            Err(de::Error::custom("unknown configuration key"))
        } else {
            visitor.visit_unit()
        }
    }
}

struct SeqDeserializer {
    iter: vec::IntoIter<Value>,
    index: usize,
    exact: bool,
}

impl<'de> SeqAccess<'de> for SeqDeserializer {
    type Error = DecodeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, DecodeError> {
        let Some(value) = self.iter.next() else {
            return Ok(None);
        };
        let index = self.index;
        self.index += 1;
        seed.deserialize(ValueDeserializer {
            value,
            exact: self.exact,
        })
        .map(Some)
        .map_err(|e| e.within(index.to_string()))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct MapDeserializer {
    iter: btree_map::IntoIter<String, Value>,
    pending: Option<(String, Value)>,
    exact: bool,
}

impl<'de> MapAccess<'de> for MapDeserializer {
    type Error = DecodeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, DecodeError> {
        let Some((key, value)) = self.iter.next() else {
            return Ok(None);
        };
        let decoded = seed
            .deserialize(ValueDeserializer {
                value: Value::String(key.clone()),
                exact: self.exact,
            })
            .map_err(|e| e.within(key.clone()))?;
        self.pending = Some((key, value));
        Ok(Some(decoded))
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, DecodeError> {
        let (key, value) = self
            .pending
            .take()
            .ok_or_else(|| de::Error::custom("value requested before key"))?;
        seed.deserialize(ValueDeserializer {
            value,
            exact: self.exact,
        })
        .map_err(|e| e.within(key))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct EnumDeserializer {
    variant: String,
    value: Option<Value>,
    exact: bool,
}

impl<'de> EnumAccess<'de> for EnumDeserializer {
    type Error = DecodeError;
    type Variant = VariantDeserializer;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, VariantDeserializer), DecodeError> {
        let variant = seed.deserialize(ValueDeserializer {
            value: Value::String(self.variant),
            exact: self.exact,
        })?;
        Ok((
            variant,
            VariantDeserializer {
                value: self.value,
                exact: self.exact,
            },
        ))
    }
}

struct VariantDeserializer {
    value: Option<Value>,
    exact: bool,
}

impl<'de> VariantAccess<'de> for VariantDeserializer {
    type Error = DecodeError;

    fn unit_variant(self) -> Result<(), DecodeError> {
        match self.value {
            None | Some(Value::Null) => Ok(()),
            Some(other) => Err(de::Error::invalid_type(unexpected(&other), &"unit variant")),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, DecodeError> {
        match self.value {
            Some(value) => seed.deserialize(ValueDeserializer {
                value,
                exact: self.exact,
            }),
            None => Err(de::Error::invalid_type(
                Unexpected::UnitVariant,
                &"newtype variant",
            )),
        }
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, DecodeError> {
        match self.value {
            Some(Value::Sequence(items)) => visit_sequence(items, self.exact, visitor),
            Some(other) => Err(de::Error::invalid_type(unexpected(&other), &"tuple variant")),
            None => Err(de::Error::invalid_type(
                Unexpected::UnitVariant,
                &"tuple variant",
            )),
        }
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        match self.value {
            Some(Value::Map(map)) => visit_mapping(match_fields(map, fields), self.exact, visitor),
            Some(other) => Err(de::Error::invalid_type(unexpected(&other), &"struct variant")),
            None => Err(de::Error::invalid_type(
                Unexpected::UnitVariant,
                &"struct variant",
            )),
        }
    }
}

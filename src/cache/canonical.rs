//! Canonical encoding of call arguments
//!
//! A serde serializer producing a `serde_json::Value` that keeps apart every
//! pair of distinct values of the same Rust type:
//!
//! | serde data model             | encoding                 |
//! |------------------------------|--------------------------|
//! | `None`                       | `null`                   |
//! | `Some(v)`                    | `[v]`                    |
//! | `()` and unit structs        | `[]` (the empty tuple)   |
//! | unit variant                 | `"Variant"`              |
//! | newtype/tuple/struct variant | `{"Variant": ...}`       |
//! | maps and structs             | object with sorted keys  |
//! | non-finite floats            | rejected                 |
//!
//! Map keys that do not encode to a string use their compact JSON text.

use crate::error::{CacheError, Result};
use serde::ser::{self, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Encode `value` canonically
pub(crate) fn to_canonical<T>(value: &T) -> Result<Value>
where
    T: Serialize + ?Sized,
{
    value.serialize(Canonical)
}

struct Canonical;

fn float(v: f64) -> Result<Value> {
    Number::from_f64(v).map(Value::Number).ok_or_else(|| {
        CacheError::SerializationError(format!("{} cannot be part of a cache key", v))
    })
}

fn tagged(variant: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(variant.to_owned(), value);
    Value::Object(map)
}

fn map_key(key: Value) -> String {
    match key {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

impl Serializer for Canonical {
    type Ok = Value;
    type Error = CacheError;

    type SerializeSeq = SeqEncoder;
    type SerializeTuple = SeqEncoder;
    type SerializeTupleStruct = SeqEncoder;
    type SerializeTupleVariant = VariantEncoder<SeqEncoder>;
    type SerializeMap = MapEncoder;
    type SerializeStruct = MapEncoder;
    type SerializeStructVariant = VariantEncoder<MapEncoder>;

    fn serialize_bool(self, v: bool) -> Result<Value> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_i128(self, v: i128) -> Result<Value> {
        match i64::try_from(v) {
            Ok(small) => self.serialize_i64(small),
            Err(_) => Ok(Value::String(v.to_string())),
        }
    }

    fn serialize_u8(self, v: u8) -> Result<Value> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u128(self, v: u128) -> Result<Value> {
        match u64::try_from(v) {
            Ok(small) => self.serialize_u64(small),
            Err(_) => Ok(Value::String(v.to_string())),
        }
    }

    fn serialize_f32(self, v: f32) -> Result<Value> {
        float(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value> {
        float(v)
    }

    fn serialize_char(self, v: char) -> Result<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value> {
        Ok(Value::String(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value> {
        Ok(Value::Array(v.iter().map(|b| Value::from(*b)).collect()))
    }

    fn serialize_none(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T>(self, value: &T) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        Ok(Value::Array(vec![value.serialize(Canonical)?]))
    }

    fn serialize_unit(self) -> Result<Value> {
        Ok(Value::Array(Vec::new()))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value> {
        Ok(Value::String(variant.to_owned()))
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        Ok(tagged(variant, value.serialize(Canonical)?))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqEncoder> {
        Ok(SeqEncoder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqEncoder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqEncoder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantEncoder<SeqEncoder>> {
        Ok(VariantEncoder {
            variant,
            inner: self.serialize_seq(Some(len))?,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapEncoder> {
        Ok(MapEncoder::default())
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<MapEncoder> {
        Ok(MapEncoder::default())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantEncoder<MapEncoder>> {
        Ok(VariantEncoder {
            variant,
            inner: MapEncoder::default(),
        })
    }
}

struct SeqEncoder {
    items: Vec<Value>,
}

impl SeqEncoder {
    fn push<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.items.push(value.serialize(Canonical)?);
        Ok(())
    }
}

impl ser::SerializeSeq for SeqEncoder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqEncoder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTupleStruct for SeqEncoder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Array(self.items))
    }
}

#[derive(Default)]
struct MapEncoder {
    entries: BTreeMap<String, Value>,
    pending_key: Option<String>,
}

impl MapEncoder {
    fn insert<T>(&mut self, key: String, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.entries.insert(key, value.serialize(Canonical)?);
        Ok(())
    }

    /// Sorted by key, whatever map ordering serde_json was compiled with
    fn finish(self) -> Value {
        Value::Object(self.entries.into_iter().collect())
    }
}

impl ser::SerializeMap for MapEncoder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.pending_key = Some(map_key(key.serialize(Canonical)?));
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let key = self.pending_key.take().ok_or_else(|| {
            CacheError::SerializationError("map value serialized without a key".to_string())
        })?;
        self.insert(key, value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeStruct for MapEncoder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.insert(key.to_owned(), value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

struct VariantEncoder<E> {
    variant: &'static str,
    inner: E,
}

impl ser::SerializeTupleVariant for VariantEncoder<SeqEncoder> {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.inner.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(tagged(self.variant, Value::Array(self.inner.items)))
    }
}

impl ser::SerializeStructVariant for VariantEncoder<MapEncoder> {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.inner.insert(key.to_owned(), value)
    }

    fn end(self) -> Result<Value> {
        Ok(tagged(self.variant, self.inner.finish()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Serialize)]
    enum Units {
        Metric,
        Custom(String),
        Scaled(f64, f64),
        Named { label: String },
    }

    #[test]
    fn test_plain_values_match_json() {
        assert_eq!(to_canonical(&("Berlin", 3, true)).unwrap(), json!(["Berlin", 3, true]));
        assert_eq!(to_canonical(&1.5f64).unwrap(), json!(1.5));
    }

    #[test]
    fn test_options_and_units_stay_apart() {
        assert_eq!(to_canonical(&None::<Vec<u8>>).unwrap(), json!(null));
        assert_eq!(to_canonical(&Some(Vec::<u8>::new())).unwrap(), json!([[]]));
        assert_eq!(to_canonical(&Some(())).unwrap(), json!([[]]));
        assert_eq!(to_canonical(&Some(None::<u8>)).unwrap(), json!([null]));
        assert_eq!(to_canonical(&()).unwrap(), json!([]));
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let result = to_canonical(&(v,));
            assert!(matches!(result, Err(CacheError::SerializationError(_))));
        }
        assert!(to_canonical(&Some(f32::NAN)).is_err());
    }

    #[test]
    fn test_enum_variants() {
        assert_eq!(to_canonical(&Units::Metric).unwrap(), json!("Metric"));
        assert_eq!(
            to_canonical(&Units::Custom("kn".to_string())).unwrap(),
            json!({"Custom": "kn"})
        );
        assert_eq!(
            to_canonical(&Units::Scaled(1.0, 2.0)).unwrap(),
            json!({"Scaled": [1.0, 2.0]})
        );
        assert_eq!(
            to_canonical(&Units::Named { label: "x".to_string() }).unwrap(),
            json!({"Named": {"label": "x"}})
        );
    }

    #[test]
    fn test_map_keys() {
        let mut by_pair = HashMap::new();
        by_pair.insert((1, 2), "a");
        by_pair.insert((2, 1), "b");

        assert_eq!(
            to_canonical(&by_pair).unwrap(),
            json!({"[1,2]": "a", "[2,1]": "b"})
        );
    }

    #[test]
    fn test_wide_integers() {
        assert_eq!(to_canonical(&7u128).unwrap(), json!(7));
        assert_eq!(to_canonical(&u128::MAX).unwrap(), json!(u128::MAX.to_string()));
    }
}

//! Core value types for the framesql engine
//!
//! This module defines the fundamental types shared by every layer:
//! - `Value`: a tagged union over the scalar kinds a record column can hold
//! - `ValueType`: the declared logical type of a column or index key
//! - `compare_values`: the total order used by indexes and the executor
//!
//! Hot comparisons dispatch via direct variant extraction rather than
//! generic visitation; `as_i64`/`as_f64` are the two coercion funnels.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single column value decoded from a record payload
///
/// `Null` signals a missing or undecodable field; extractors never fail,
/// they return `Null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Check for the null variant
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Widen any integer variant into i64
    ///
    /// `U64` wraps into the i64 domain, matching the storage affinity of
    /// the index layer (SQLite INTEGER is a signed 64-bit column).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I32(v) => Some(*v as i64),
            Value::I64(v) => Some(*v),
            Value::U32(v) => Some(*v as i64),
            Value::U64(v) => Some(*v as i64),
            Value::I16(v) => Some(*v as i64),
            Value::U16(v) => Some(*v as i64),
            Value::I8(v) => Some(*v as i64),
            Value::U8(v) => Some(*v as i64),
            Value::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Widen any numeric variant into f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Borrow the string variant
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the byte-sequence variant
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The logical type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::I8(_) => ValueType::Int8,
            Value::I16(_) => ValueType::Int16,
            Value::I32(_) => ValueType::Int32,
            Value::I64(_) => ValueType::Int64,
            Value::U8(_) => ValueType::UInt8,
            Value::U16(_) => ValueType::UInt16,
            Value::U32(_) => ValueType::UInt32,
            Value::U64(_) => ValueType::UInt64,
            Value::F32(_) => ValueType::Float32,
            Value::F64(_) => ValueType::Float64,
            Value::Str(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
        }
    }

    /// Stable ordinal of the variant, used as the last-resort tiebreak
    /// when two values have incompatible types
    fn type_ordinal(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::I8(_) => 2,
            Value::I16(_) => 3,
            Value::I32(_) => 4,
            Value::I64(_) => 5,
            Value::U8(_) => 6,
            Value::U16(_) => 7,
            Value::U32(_) => 8,
            Value::U64(_) => 9,
            Value::F32(_) => 10,
            Value::F64(_) => 11,
            Value::Str(_) => 12,
            Value::Bytes(_) => 13,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::I8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "[{} bytes]", v.len()),
        }
    }
}

/// Declared logical type of a column or index key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Null,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    Bytes,
}

impl ValueType {
    /// Whether this type stores as a 64-bit integer
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ValueType::Int8
                | ValueType::Int16
                | ValueType::Int32
                | ValueType::Int64
                | ValueType::UInt8
                | ValueType::UInt16
                | ValueType::UInt32
                | ValueType::UInt64
                | ValueType::Bool
        )
    }

    /// Whether this type stores as a float
    pub fn is_float(&self) -> bool {
        matches!(self, ValueType::Float32 | ValueType::Float64)
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Int8 => "int8",
            ValueType::Int16 => "int16",
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
            ValueType::UInt8 => "uint8",
            ValueType::UInt16 => "uint16",
            ValueType::UInt32 => "uint32",
            ValueType::UInt64 => "uint64",
            ValueType::Float32 => "float32",
            ValueType::Float64 => "float64",
            ValueType::String => "string",
            ValueType::Bytes => "bytes",
        };
        write!(f, "{}", name)
    }
}

/// Total order over values with numeric coercion
///
/// Rules, in order:
/// 1. Null sorts before every non-null; two nulls are equal.
/// 2. Two integers (any width or sign) compare as i64.
/// 3. Any two numerics compare as f64.
/// 4. Strings compare byte-wise (UTF-8 scalar order).
/// 5. Byte sequences compare byte-wise.
/// 6. Booleans: false < true.
/// 7. Incompatible types compare by a stable variant ordinal.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }

    if let (Some(ai), Some(bi)) = (a.as_i64(), b.as_i64()) {
        return ai.cmp(&bi);
    }

    if let (Some(af), Some(bf)) = (a.as_f64(), b.as_f64()) {
        return af.partial_cmp(&bf).unwrap_or(Ordering::Equal);
    }

    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.type_ordinal().cmp(&b.type_ordinal()),
    }
}

/// Equality under the coercion rules of `compare_values`
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sorts_first() {
        assert_eq!(compare_values(&Value::Null, &Value::Null), Ordering::Equal);
        assert_eq!(compare_values(&Value::Null, &Value::I32(-100)), Ordering::Less);
        assert_eq!(
            compare_values(&Value::Str("".into()), &Value::Null),
            Ordering::Greater
        );
    }

    #[test]
    fn test_mixed_width_integer_compare() {
        assert_eq!(compare_values(&Value::I8(5), &Value::I64(5)), Ordering::Equal);
        assert_eq!(compare_values(&Value::U16(4), &Value::I32(5)), Ordering::Less);
        assert_eq!(
            compare_values(&Value::U64(10), &Value::I32(9)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_int_float_coercion() {
        assert_eq!(compare_values(&Value::I32(2), &Value::F64(2.0)), Ordering::Equal);
        assert_eq!(compare_values(&Value::F32(1.5), &Value::I32(2)), Ordering::Less);
    }

    #[test]
    fn test_string_byte_order() {
        assert_eq!(
            compare_values(&Value::Str("abc".into()), &Value::Str("abd".into())),
            Ordering::Less
        );
        // Byte order of UTF-8, not collation
        assert_eq!(
            compare_values(&Value::Str("Z".into()), &Value::Str("a".into())),
            Ordering::Less
        );
    }

    #[test]
    fn test_blob_prefix_order() {
        let a = Value::Bytes(vec![1, 2]);
        let b = Value::Bytes(vec![1, 2, 0]);
        assert_eq!(compare_values(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_bool_order() {
        assert_eq!(
            compare_values(&Value::Bool(false), &Value::Bool(true)),
            Ordering::Less
        );
    }

    #[test]
    fn test_incompatible_types_ordinal() {
        // String vs bytes: neither numeric, ordinal decides and is stable
        let a = Value::Str("x".into());
        let b = Value::Bytes(vec![0xff]);
        assert_eq!(compare_values(&a, &b), Ordering::Less);
        assert_eq!(compare_values(&b, &a), Ordering::Greater);
    }

    #[test]
    fn test_as_i64_widening() {
        assert_eq!(Value::I8(-3).as_i64(), Some(-3));
        assert_eq!(Value::U32(7).as_i64(), Some(7));
        assert_eq!(Value::Str("7".into()).as_i64(), None);
    }
}

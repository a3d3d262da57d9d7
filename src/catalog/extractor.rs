//! Record extractors
//!
//! The engine never parses record payloads itself; decoding a field out
//! of the wire format is delegated to a caller-supplied extractor
//! registered per table. Extractors must be pure and must not retain the
//! payload borrow past the call (the lifetimes enforce this).
//!
//! Three levels of the contract, from convenient to fast:
//!
//! - `extract`: decode one named field into a [`Value`]. Used to
//!   populate indexes and as the general fallback.
//! - `extract_row`: decode all declared columns in order. The default
//!   implementation loops over `extract`.
//! - `write_column`: optional zero-allocation path that writes a column
//!   straight into a [`ColumnSink`] (e.g. a borrowed `&str` rather than
//!   an owned [`Value`]). Returning `false` means "not handled" and the
//!   caller falls back to `extract`.
//!
//! Plain closures `Fn(&[u8], &str) -> Value` implement the trait
//! directly, which is the common registration path.

use crate::catalog::Column;
use crate::value::Value;

/// Receives column values without forcing them through the tagged union
pub trait ColumnSink {
    fn push_null(&mut self);
    fn push_bool(&mut self, v: bool);
    fn push_i64(&mut self, v: i64);
    fn push_f64(&mut self, v: f64);
    fn push_str(&mut self, v: &str);
    fn push_bytes(&mut self, v: &[u8]);

    /// Route an already-materialised value
    fn push_value(&mut self, v: Value) {
        match v {
            Value::Null => self.push_null(),
            Value::Bool(b) => self.push_bool(b),
            Value::Str(s) => self.push_str(&s),
            Value::Bytes(b) => self.push_bytes(&b),
            Value::F32(f) => self.push_f64(f as f64),
            Value::F64(f) => self.push_f64(f),
            other => match other.as_i64() {
                Some(i) => self.push_i64(i),
                None => self.push_null(),
            },
        }
    }
}

/// The materialising sink: collects values into a row vector
impl ColumnSink for Vec<Value> {
    fn push_null(&mut self) {
        self.push(Value::Null);
    }
    fn push_bool(&mut self, v: bool) {
        self.push(Value::Bool(v));
    }
    fn push_i64(&mut self, v: i64) {
        self.push(Value::I64(v));
    }
    fn push_f64(&mut self, v: f64) {
        self.push(Value::F64(v));
    }
    fn push_str(&mut self, v: &str) {
        self.push(Value::Str(v.to_owned()));
    }
    fn push_bytes(&mut self, v: &[u8]) {
        self.push(Value::Bytes(v.to_owned()));
    }
}

/// Decodes fields out of one table's payloads
pub trait RecordExtractor {
    /// Decode a single named field. Missing or undecodable fields are
    /// `Value::Null`, never an error.
    fn extract(&self, payload: &[u8], field: &str) -> Value;

    /// Decode all declared columns in order, appending to `out`
    fn extract_row(&self, payload: &[u8], columns: &[Column], out: &mut Vec<Value>) {
        for column in columns {
            out.push(self.extract(payload, &column.name));
        }
    }

    /// Optional fast path: write column `column_index` straight into the
    /// sink. Return `false` to fall back to [`extract`](Self::extract).
    fn write_column(&self, payload: &[u8], column_index: usize, sink: &mut dyn ColumnSink) -> bool {
        let _ = (payload, column_index, sink);
        false
    }
}

impl<F> RecordExtractor for F
where
    F: Fn(&[u8], &str) -> Value,
{
    fn extract(&self, payload: &[u8], field: &str) -> Value {
        self(payload, field)
    }
}

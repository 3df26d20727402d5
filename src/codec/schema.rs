//! Declarative return-value shapes
//!
//! Every Move view function returns a fixed tuple of BCS values. Each slot is
//! described once as a `Schema` constant and decoded by the generic routine in
//! [`super::decode`], so a new return shape is a data change, not new code.

use move_core_types::account_address::AccountAddress;

use super::DecodeError;

/// Shape of one BCS-encoded return slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    U8,
    /// Little-endian, 8 bytes.
    U64,
    /// Little-endian, 16 bytes.
    U128,
    /// Single byte, 0 or 1.
    Bool,
    /// 32-byte object id or account address.
    Address,
    /// ULEB128 length prefix followed by that many elements.
    Vector(&'static Schema),
    /// Move `VecSet<T>`: encoded as a vector, elements must be distinct.
    Set(&'static Schema),
    /// Move `Option<T>`: a vector of length 0 or 1.
    Option(&'static Schema),
    /// Fields concatenated in declaration order.
    Struct(&'static [Schema]),
}

impl Schema {
    /// Smallest number of bytes a value of this shape can occupy.
    ///
    /// Used to reject a length prefix that could never fit in the remaining
    /// buffer before allocating anything for it.
    pub fn min_width(&self) -> usize {
        match self {
            Schema::U8 | Schema::Bool => 1,
            Schema::U64 => 8,
            Schema::U128 => 16,
            Schema::Address => AccountAddress::LENGTH,
            Schema::Vector(_) | Schema::Set(_) | Schema::Option(_) => 1,
            Schema::Struct(fields) => fields.iter().map(Schema::min_width).sum(),
        }
    }
}

/// A decoded BCS value.
///
/// Raw on-chain integers only; scaling to human units happens in the query layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    U8(u8),
    U64(u64),
    U128(u128),
    Bool(bool),
    Address(AccountAddress),
    Vector(Vec<Value>),
    /// Elements in ledger order.
    Set(Vec<Value>),
    Option(Option<Box<Value>>),
    Struct(Vec<Value>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::U8(_) => "u8",
            Value::U64(_) => "u64",
            Value::U128(_) => "u128",
            Value::Bool(_) => "bool",
            Value::Address(_) => "address",
            Value::Vector(_) => "vector",
            Value::Set(_) => "set",
            Value::Option(_) => "option",
            Value::Struct(_) => "struct",
        }
    }

    fn mismatch(&self, expected: &'static str) -> DecodeError {
        DecodeError::UnexpectedValue {
            expected,
            found: self.kind(),
        }
    }

    pub fn as_u8(&self) -> Result<u8, DecodeError> {
        match self {
            Value::U8(v) => Ok(*v),
            other => Err(other.mismatch("u8")),
        }
    }

    pub fn as_u64(&self) -> Result<u64, DecodeError> {
        match self {
            Value::U64(v) => Ok(*v),
            other => Err(other.mismatch("u64")),
        }
    }

    pub fn as_u128(&self) -> Result<u128, DecodeError> {
        match self {
            Value::U128(v) => Ok(*v),
            other => Err(other.mismatch("u128")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, DecodeError> {
        match self {
            Value::Bool(v) => Ok(*v),
            other => Err(other.mismatch("bool")),
        }
    }

    pub fn as_address(&self) -> Result<AccountAddress, DecodeError> {
        match self {
            Value::Address(v) => Ok(*v),
            other => Err(other.mismatch("address")),
        }
    }

    /// Elements of a vector or set.
    pub fn into_elements(self) -> Result<Vec<Value>, DecodeError> {
        match self {
            Value::Vector(items) | Value::Set(items) => Ok(items),
            other => Err(other.mismatch("vector")),
        }
    }

    pub fn into_u64s(self) -> Result<Vec<u64>, DecodeError> {
        self.into_elements()?.iter().map(Value::as_u64).collect()
    }

    pub fn into_u128s(self) -> Result<Vec<u128>, DecodeError> {
        self.into_elements()?.iter().map(Value::as_u128).collect()
    }

    pub fn into_option(self) -> Result<Option<Value>, DecodeError> {
        match self {
            Value::Option(inner) => Ok(inner.map(|boxed| *boxed)),
            other => Err(other.mismatch("option")),
        }
    }

    /// Field values of a struct, in declaration order.
    pub fn into_fields(self) -> Result<Vec<Value>, DecodeError> {
        match self {
            Value::Struct(fields) => Ok(fields),
            other => Err(other.mismatch("struct")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static U64: Schema = Schema::U64;
    static PAIR: [Schema; 2] = [Schema::U64, Schema::Bool];

    #[test]
    fn test_min_width() {
        assert_eq!(Schema::U64.min_width(), 8);
        assert_eq!(Schema::Address.min_width(), 32);
        assert_eq!(Schema::Vector(&U64).min_width(), 1);
        assert_eq!(Schema::Struct(&PAIR).min_width(), 9);
    }

    #[test]
    fn test_accessor_mismatch() {
        let err = Value::Bool(true).as_u64().unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnexpectedValue {
                expected: "u64",
                found: "bool"
            }
        );
    }

    #[test]
    fn test_into_u64s_accepts_sets() {
        let value = Value::Set(vec![Value::U64(3), Value::U64(1)]);
        assert_eq!(value.into_u64s().unwrap(), vec![3, 1]);
    }
}

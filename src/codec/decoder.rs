//! Strict BCS decoding against a [`Schema`]

use std::collections::HashSet;

use move_core_types::account_address::AccountAddress;

use super::{DecodeError, Schema, Value};

/// Decode a single return buffer.
///
/// The buffer must be consumed exactly: short reads and trailing bytes both fail.
pub fn decode(bytes: &[u8], schema: &Schema) -> Result<Value, DecodeError> {
    let mut reader = Reader { bytes, pos: 0 };
    let value = reader.read_value(schema)?;

    let remaining = reader.remaining();
    if remaining != 0 {
        return Err(DecodeError::TrailingBytes { remaining });
    }

    Ok(value)
}

/// Decode the return slots of one call, in declaration order.
pub fn decode_slots(slots: &[Vec<u8>], schemas: &[Schema]) -> Result<Vec<Value>, DecodeError> {
    if slots.len() != schemas.len() {
        return Err(DecodeError::ReturnCount {
            expected: schemas.len(),
            found: slots.len(),
        });
    }

    slots
        .iter()
        .zip(schemas)
        .map(|(bytes, schema)| decode(bytes, schema))
        .collect()
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(DecodeError::UnexpectedEnd { needed, remaining });
        }
        let slice = &self.bytes[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// BCS lengths are canonical ULEB128 bounded by `u32::MAX`.
    fn read_uleb128(&mut self) -> Result<usize, DecodeError> {
        let mut result = 0u64;
        let mut shift = 0;

        loop {
            let [b] = self.take_array::<1>()?;
            result |= ((b & 0x7f) as u64) << shift;

            if b & 0x80 == 0 {
                if shift > 0 && b == 0 {
                    return Err(DecodeError::InvalidUleb128);
                }
                break;
            }

            shift += 7;
            if shift > 28 {
                return Err(DecodeError::InvalidUleb128);
            }
        }

        if result > u32::MAX as u64 {
            return Err(DecodeError::InvalidUleb128);
        }
        Ok(result as usize)
    }

    fn read_length(&mut self, element: &Schema) -> Result<usize, DecodeError> {
        let declared = self.read_uleb128()?;
        let remaining = self.remaining();
        if declared.saturating_mul(element.min_width()) > remaining {
            return Err(DecodeError::LengthOverrun {
                declared,
                remaining,
            });
        }
        Ok(declared)
    }

    fn read_elements(&mut self, element: &Schema) -> Result<Vec<Value>, DecodeError> {
        let len = self.read_length(element)?;
        let mut items = Vec::with_capacity(len.min(self.remaining()));
        for _ in 0..len {
            items.push(self.read_value(element)?);
        }
        Ok(items)
    }

    fn read_value(&mut self, schema: &Schema) -> Result<Value, DecodeError> {
        Ok(match schema {
            Schema::U8 => Value::U8(self.take_array::<1>()?[0]),
            Schema::U64 => Value::U64(u64::from_le_bytes(self.take_array()?)),
            Schema::U128 => Value::U128(u128::from_le_bytes(self.take_array()?)),
            Schema::Bool => match self.take_array::<1>()?[0] {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => return Err(DecodeError::InvalidBool(other)),
            },
            Schema::Address => Value::Address(AccountAddress::new(self.take_array()?)),
            Schema::Vector(element) => Value::Vector(self.read_elements(element)?),
            Schema::Set(element) => {
                let items = self.read_elements(element)?;
                let mut seen = HashSet::with_capacity(items.len());
                if !items.iter().all(|item| seen.insert(item)) {
                    return Err(DecodeError::DuplicateSetElement);
                }
                Value::Set(items)
            }
            Schema::Option(element) => {
                let len = self.read_uleb128()?;
                match len {
                    0 => Value::Option(None),
                    1 => Value::Option(Some(Box::new(self.read_value(element)?))),
                    other => return Err(DecodeError::InvalidOption(other)),
                }
            }
            Schema::Struct(fields) => Value::Struct(
                fields
                    .iter()
                    .map(|field| self.read_value(field))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static U64: Schema = Schema::U64;
    static U128: Schema = Schema::U128;
    static ADDRESS: Schema = Schema::Address;
    static BALANCES: [Schema; 3] = [Schema::U64, Schema::U64, Schema::U64];

    #[test]
    fn test_decode_u64() {
        let value = decode(&[0x64, 0, 0, 0, 0, 0, 0, 0], &Schema::U64).unwrap();
        assert_eq!(value, Value::U64(100));
    }

    #[test]
    fn test_decode_is_deterministic() {
        let bytes = 0xdead_beef_u64.to_le_bytes();
        let first = decode(&bytes, &Schema::U64).unwrap();
        let second = decode(&bytes, &Schema::U64).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_u64().unwrap(), 0xdead_beef);
    }

    #[test]
    fn test_decode_u128() {
        let raw = (1u128 << 127) | (42u128 << 64) | 7;
        let value = decode(&raw.to_le_bytes(), &Schema::U128).unwrap();
        assert_eq!(value.as_u128().unwrap(), raw);
    }

    #[test]
    fn test_decode_bool() {
        assert_eq!(decode(&[1], &Schema::Bool).unwrap(), Value::Bool(true));
        assert_eq!(decode(&[0], &Schema::Bool).unwrap(), Value::Bool(false));
        assert_eq!(
            decode(&[2], &Schema::Bool).unwrap_err(),
            DecodeError::InvalidBool(2)
        );
    }

    #[test]
    fn test_decode_address() {
        let mut bytes = [0u8; 32];
        bytes[31] = 6;
        let value = decode(&bytes, &Schema::Address).unwrap();
        assert_eq!(
            value.as_address().unwrap(),
            AccountAddress::from_hex_literal("0x6").unwrap()
        );
    }

    #[test]
    fn test_short_buffer_fails() {
        let err = decode(&[1, 2, 3], &Schema::U64).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnexpectedEnd {
                needed: 8,
                remaining: 3
            }
        );
    }

    #[test]
    fn test_trailing_bytes_fail() {
        let err = decode(&[1, 0, 0, 0, 0, 0, 0, 0, 9], &Schema::U64).unwrap_err();
        assert_eq!(err, DecodeError::TrailingBytes { remaining: 1 });
    }

    #[test]
    fn test_decode_vector() {
        let bytes = bcs::to_bytes(&vec![5u64, 6, 7]).unwrap();
        let value = decode(&bytes, &Schema::Vector(&U64)).unwrap();
        assert_eq!(value.into_u64s().unwrap(), vec![5, 6, 7]);
    }

    #[test]
    fn test_empty_vector() {
        let value = decode(&[0], &Schema::Vector(&U64)).unwrap();
        assert_eq!(value, Value::Vector(vec![]));
    }

    #[test]
    fn test_length_prefix_overrun_fails() {
        // Declares 4 u64 elements but carries only one.
        let mut bytes = vec![4u8];
        bytes.extend_from_slice(&1u64.to_le_bytes());
        let err = decode(&bytes, &Schema::Vector(&U64)).unwrap_err();
        assert_eq!(
            err,
            DecodeError::LengthOverrun {
                declared: 4,
                remaining: 8
            }
        );
    }

    #[test]
    fn test_huge_length_prefix_fails_without_allocating() {
        // u32::MAX as ULEB128
        let bytes = [0xff, 0xff, 0xff, 0xff, 0x0f];
        let err = decode(&bytes, &Schema::Vector(&ADDRESS)).unwrap_err();
        assert!(matches!(err, DecodeError::LengthOverrun { .. }));
    }

    #[test]
    fn test_uleb128_multi_byte_length() {
        let items: Vec<u64> = (0..200).collect();
        let bytes = bcs::to_bytes(&items).unwrap();
        assert_eq!(&bytes[..2], &[0xc8, 0x01]);
        let value = decode(&bytes, &Schema::Vector(&U64)).unwrap();
        assert_eq!(value.into_u64s().unwrap(), items);
    }

    #[test]
    fn test_uleb128_non_canonical_fails() {
        let err = decode(&[0x80, 0x00], &Schema::Vector(&U64)).unwrap_err();
        assert_eq!(err, DecodeError::InvalidUleb128);
    }

    #[test]
    fn test_uleb128_overflow_fails() {
        let err = decode(&[0xff; 6], &Schema::Vector(&U64)).unwrap_err();
        assert_eq!(err, DecodeError::InvalidUleb128);
    }

    #[test]
    fn test_decode_set() {
        let ids = vec![3u128, 1, 2];
        let bytes = bcs::to_bytes(&ids).unwrap();
        let value = decode(&bytes, &Schema::Set(&U128)).unwrap();
        assert_eq!(value.into_u128s().unwrap(), ids);
    }

    #[test]
    fn test_set_with_duplicates_fails() {
        let bytes = bcs::to_bytes(&vec![9u128, 9u128]).unwrap();
        let err = decode(&bytes, &Schema::Set(&U128)).unwrap_err();
        assert_eq!(err, DecodeError::DuplicateSetElement);
    }

    #[test]
    fn test_decode_option() {
        let none = decode(&[0], &Schema::Option(&ADDRESS)).unwrap();
        assert_eq!(none.into_option().unwrap(), None);

        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&[7u8; 32]);
        let some = decode(&bytes, &Schema::Option(&ADDRESS)).unwrap();
        assert_eq!(
            some.into_option().unwrap(),
            Some(Value::Address(AccountAddress::new([7u8; 32])))
        );

        let err = decode(&[2], &Schema::Option(&ADDRESS)).unwrap_err();
        assert_eq!(err, DecodeError::InvalidOption(2));
    }

    #[test]
    fn test_decode_struct() {
        let bytes = bcs::to_bytes(&(10u64, 20u64, 30u64)).unwrap();
        let value = decode(&bytes, &Schema::Struct(&BALANCES)).unwrap();
        let fields = value.into_fields().unwrap();
        assert_eq!(fields, vec![Value::U64(10), Value::U64(20), Value::U64(30)]);
    }

    #[test]
    fn test_decode_slots_in_order() {
        let slots = vec![
            bcs::to_bytes(&1u64).unwrap(),
            bcs::to_bytes(&2u64).unwrap(),
            bcs::to_bytes(&3u64).unwrap(),
        ];
        let values = decode_slots(&slots, &BALANCES).unwrap();
        assert_eq!(values, vec![Value::U64(1), Value::U64(2), Value::U64(3)]);
    }

    #[test]
    fn test_decode_slots_count_mismatch() {
        let slots = vec![bcs::to_bytes(&1u64).unwrap()];
        let err = decode_slots(&slots, &BALANCES).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ReturnCount {
                expected: 3,
                found: 1
            }
        );
    }
}

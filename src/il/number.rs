//! IL immediate values
//!
//! [`Number`] is the tagged union carried by constant operands. Folding
//! follows native two's-complement wrap for integer add/sub/mul, IEEE 754 for
//! half/float/double, arithmetic shifts for signed kinds and logical shifts
//! for unsigned kinds. Integer division and modulus by zero never fold (the
//! algebraic simplifier rewrites those sites and reports a diagnostic).
//!
//! Two numbers compare equal iff their kind and bit pattern match; this is
//! also the equality the CSE pass keys on, so `PartialEq`/`Hash` are
//! implemented over bit patterns rather than IEEE semantics.

use super::instructions::OpCode;
use half::f16;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Numeric kind discriminant for [`Number`] and scalar [`super::IlTypeId`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum NumberKind {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Half,
    Float,
    Double,
    Bool,
}

impl NumberKind {
    pub const ALL: [NumberKind; 12] = [
        NumberKind::Int8,
        NumberKind::Int16,
        NumberKind::Int32,
        NumberKind::Int64,
        NumberKind::UInt8,
        NumberKind::UInt16,
        NumberKind::UInt32,
        NumberKind::UInt64,
        NumberKind::Half,
        NumberKind::Float,
        NumberKind::Double,
        NumberKind::Bool,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn is_signed_int(self) -> bool {
        matches!(
            self,
            NumberKind::Int8 | NumberKind::Int16 | NumberKind::Int32 | NumberKind::Int64
        )
    }

    pub fn is_unsigned_int(self) -> bool {
        matches!(
            self,
            NumberKind::UInt8 | NumberKind::UInt16 | NumberKind::UInt32 | NumberKind::UInt64
        )
    }

    pub fn is_integer(self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    pub fn is_float(self) -> bool {
        matches!(self, NumberKind::Half | NumberKind::Float | NumberKind::Double)
    }
}

impl fmt::Display for NumberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NumberKind::Int8 => "i8",
            NumberKind::Int16 => "i16",
            NumberKind::Int32 => "i32",
            NumberKind::Int64 => "i64",
            NumberKind::UInt8 => "u8",
            NumberKind::UInt16 => "u16",
            NumberKind::UInt32 => "u32",
            NumberKind::UInt64 => "u64",
            NumberKind::Half => "f16",
            NumberKind::Float => "f32",
            NumberKind::Double => "f64",
            NumberKind::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// An immediate IL value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Number {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Half(f16),
    Float(f32),
    Double(f64),
    Bool(bool),
}

impl Number {
    pub fn kind(&self) -> NumberKind {
        match self {
            Number::Int8(_) => NumberKind::Int8,
            Number::Int16(_) => NumberKind::Int16,
            Number::Int32(_) => NumberKind::Int32,
            Number::Int64(_) => NumberKind::Int64,
            Number::UInt8(_) => NumberKind::UInt8,
            Number::UInt16(_) => NumberKind::UInt16,
            Number::UInt32(_) => NumberKind::UInt32,
            Number::UInt64(_) => NumberKind::UInt64,
            Number::Half(_) => NumberKind::Half,
            Number::Float(_) => NumberKind::Float,
            Number::Double(_) => NumberKind::Double,
            Number::Bool(_) => NumberKind::Bool,
        }
    }

    /// The zero value of a kind.
    pub fn zero(kind: NumberKind) -> Self {
        Number::Int64(0).cast(kind)
    }

    /// The one value of a kind.
    pub fn one(kind: NumberKind) -> Self {
        Number::Int64(1).cast(kind)
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            Number::Int8(v) => v == 0,
            Number::Int16(v) => v == 0,
            Number::Int32(v) => v == 0,
            Number::Int64(v) => v == 0,
            Number::UInt8(v) => v == 0,
            Number::UInt16(v) => v == 0,
            Number::UInt32(v) => v == 0,
            Number::UInt64(v) => v == 0,
            Number::Half(v) => v == f16::from_f32(0.0),
            Number::Float(v) => v == 0.0,
            Number::Double(v) => v == 0.0,
            Number::Bool(_) => false,
        }
    }

    pub fn is_one(&self) -> bool {
        match *self {
            Number::Int8(v) => v == 1,
            Number::Int16(v) => v == 1,
            Number::Int32(v) => v == 1,
            Number::Int64(v) => v == 1,
            Number::UInt8(v) => v == 1,
            Number::UInt16(v) => v == 1,
            Number::UInt32(v) => v == 1,
            Number::UInt64(v) => v == 1,
            Number::Half(v) => v == f16::from_f32(1.0),
            Number::Float(v) => v == 1.0,
            Number::Double(v) => v == 1.0,
            Number::Bool(_) => false,
        }
    }

    pub fn is_negative(&self) -> bool {
        match *self {
            Number::Int8(v) => v < 0,
            Number::Int16(v) => v < 0,
            Number::Int32(v) => v < 0,
            Number::Int64(v) => v < 0,
            Number::Half(v) => v.to_f32() < 0.0,
            Number::Float(v) => v < 0.0,
            Number::Double(v) => v < 0.0,
            _ => false,
        }
    }

    /// Truthiness: any non-zero value is true.
    pub fn to_bool(&self) -> bool {
        match *self {
            Number::Bool(v) => v,
            _ => !self.is_zero(),
        }
    }

    /// The value as a non-negative integer magnitude, if this is an integer
    /// kind holding a non-negative value. Used by strength reduction.
    pub fn as_unsigned(&self) -> Option<u64> {
        match *self {
            Number::Int8(v) if v >= 0 => Some(v as u64),
            Number::Int16(v) if v >= 0 => Some(v as u64),
            Number::Int32(v) if v >= 0 => Some(v as u64),
            Number::Int64(v) if v >= 0 => Some(v as u64),
            Number::UInt8(v) => Some(v as u64),
            Number::UInt16(v) => Some(v as u64),
            Number::UInt32(v) => Some(v as u64),
            Number::UInt64(v) => Some(v),
            _ => None,
        }
    }

    fn to_i128(self) -> i128 {
        match self {
            Number::Int8(v) => v as i128,
            Number::Int16(v) => v as i128,
            Number::Int32(v) => v as i128,
            Number::Int64(v) => v as i128,
            Number::UInt8(v) => v as i128,
            Number::UInt16(v) => v as i128,
            Number::UInt32(v) => v as i128,
            Number::UInt64(v) => v as i128,
            Number::Half(v) => v.to_f32() as i128,
            Number::Float(v) => v as i128,
            Number::Double(v) => v as i128,
            Number::Bool(v) => v as i128,
        }
    }

    fn to_f64(self) -> f64 {
        match self {
            Number::Int8(v) => v as f64,
            Number::Int16(v) => v as f64,
            Number::Int32(v) => v as f64,
            Number::Int64(v) => v as f64,
            Number::UInt8(v) => v as f64,
            Number::UInt16(v) => v as f64,
            Number::UInt32(v) => v as f64,
            Number::UInt64(v) => v as f64,
            Number::Half(v) => v.to_f64(),
            Number::Float(v) => v as f64,
            Number::Double(v) => v,
            Number::Bool(v) => v as u8 as f64,
        }
    }

    /// Convert to a target kind with standard narrowing/widening rules.
    pub fn cast(self, target: NumberKind) -> Number {
        if self.kind() == target {
            return self;
        }
        match target {
            NumberKind::Int8 => Number::Int8(if self.kind().is_float() {
                self.to_f64() as i8
            } else {
                self.to_i128() as i8
            }),
            NumberKind::Int16 => Number::Int16(if self.kind().is_float() {
                self.to_f64() as i16
            } else {
                self.to_i128() as i16
            }),
            NumberKind::Int32 => Number::Int32(if self.kind().is_float() {
                self.to_f64() as i32
            } else {
                self.to_i128() as i32
            }),
            NumberKind::Int64 => Number::Int64(if self.kind().is_float() {
                self.to_f64() as i64
            } else {
                self.to_i128() as i64
            }),
            NumberKind::UInt8 => Number::UInt8(if self.kind().is_float() {
                self.to_f64() as u8
            } else {
                self.to_i128() as u8
            }),
            NumberKind::UInt16 => Number::UInt16(if self.kind().is_float() {
                self.to_f64() as u16
            } else {
                self.to_i128() as u16
            }),
            NumberKind::UInt32 => Number::UInt32(if self.kind().is_float() {
                self.to_f64() as u32
            } else {
                self.to_i128() as u32
            }),
            NumberKind::UInt64 => Number::UInt64(if self.kind().is_float() {
                self.to_f64() as u64
            } else {
                self.to_i128() as u64
            }),
            NumberKind::Half => Number::Half(f16::from_f64(self.to_f64())),
            NumberKind::Float => Number::Float(self.to_f64() as f32),
            NumberKind::Double => Number::Double(self.to_f64()),
            NumberKind::Bool => Number::Bool(self.to_bool()),
        }
    }

    /// Fold a unary operation; `None` when the operation does not apply to
    /// this kind.
    pub fn fold_unary(self, opcode: OpCode) -> Option<Number> {
        match opcode {
            OpCode::Negate => match self {
                Number::Int8(v) => Some(Number::Int8(v.wrapping_neg())),
                Number::Int16(v) => Some(Number::Int16(v.wrapping_neg())),
                Number::Int32(v) => Some(Number::Int32(v.wrapping_neg())),
                Number::Int64(v) => Some(Number::Int64(v.wrapping_neg())),
                Number::UInt8(v) => Some(Number::UInt8(v.wrapping_neg())),
                Number::UInt16(v) => Some(Number::UInt16(v.wrapping_neg())),
                Number::UInt32(v) => Some(Number::UInt32(v.wrapping_neg())),
                Number::UInt64(v) => Some(Number::UInt64(v.wrapping_neg())),
                Number::Half(v) => Some(Number::Half(-v)),
                Number::Float(v) => Some(Number::Float(-v)),
                Number::Double(v) => Some(Number::Double(-v)),
                Number::Bool(_) => None,
            },
            OpCode::LogicalNot => Some(Number::Bool(!self.to_bool())),
            OpCode::BitwiseNot => match self {
                Number::Int8(v) => Some(Number::Int8(!v)),
                Number::Int16(v) => Some(Number::Int16(!v)),
                Number::Int32(v) => Some(Number::Int32(!v)),
                Number::Int64(v) => Some(Number::Int64(!v)),
                Number::UInt8(v) => Some(Number::UInt8(!v)),
                Number::UInt16(v) => Some(Number::UInt16(!v)),
                Number::UInt32(v) => Some(Number::UInt32(!v)),
                Number::UInt64(v) => Some(Number::UInt64(!v)),
                Number::Bool(v) => Some(Number::Bool(!v)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Fold a binary operation over two immediates of the same kind.
    ///
    /// Returns `None` when the kinds differ, the operation does not apply to
    /// the kind, or an integer division/modulus has a zero divisor.
    pub fn fold_binary(lhs: Number, rhs: Number, opcode: OpCode) -> Option<Number> {
        if lhs.kind() != rhs.kind() {
            return None;
        }

        macro_rules! int_arith {
            ($op:ident) => {
                match (lhs, rhs) {
                    (Number::Int8(a), Number::Int8(b)) => Some(Number::Int8(a.$op(b))),
                    (Number::Int16(a), Number::Int16(b)) => Some(Number::Int16(a.$op(b))),
                    (Number::Int32(a), Number::Int32(b)) => Some(Number::Int32(a.$op(b))),
                    (Number::Int64(a), Number::Int64(b)) => Some(Number::Int64(a.$op(b))),
                    (Number::UInt8(a), Number::UInt8(b)) => Some(Number::UInt8(a.$op(b))),
                    (Number::UInt16(a), Number::UInt16(b)) => Some(Number::UInt16(a.$op(b))),
                    (Number::UInt32(a), Number::UInt32(b)) => Some(Number::UInt32(a.$op(b))),
                    (Number::UInt64(a), Number::UInt64(b)) => Some(Number::UInt64(a.$op(b))),
                    _ => None,
                }
            };
        }

        macro_rules! float_arith {
            ($op:tt) => {
                match (lhs, rhs) {
                    (Number::Half(a), Number::Half(b)) => {
                        Some(Number::Half(f16::from_f32(a.to_f32() $op b.to_f32())))
                    }
                    (Number::Float(a), Number::Float(b)) => Some(Number::Float(a $op b)),
                    (Number::Double(a), Number::Double(b)) => Some(Number::Double(a $op b)),
                    _ => None,
                }
            };
        }

        macro_rules! bitwise {
            ($op:tt) => {
                match (lhs, rhs) {
                    (Number::Int8(a), Number::Int8(b)) => Some(Number::Int8(a $op b)),
                    (Number::Int16(a), Number::Int16(b)) => Some(Number::Int16(a $op b)),
                    (Number::Int32(a), Number::Int32(b)) => Some(Number::Int32(a $op b)),
                    (Number::Int64(a), Number::Int64(b)) => Some(Number::Int64(a $op b)),
                    (Number::UInt8(a), Number::UInt8(b)) => Some(Number::UInt8(a $op b)),
                    (Number::UInt16(a), Number::UInt16(b)) => Some(Number::UInt16(a $op b)),
                    (Number::UInt32(a), Number::UInt32(b)) => Some(Number::UInt32(a $op b)),
                    (Number::UInt64(a), Number::UInt64(b)) => Some(Number::UInt64(a $op b)),
                    (Number::Bool(a), Number::Bool(b)) => Some(Number::Bool(a $op b)),
                    _ => None,
                }
            };
        }

        macro_rules! compare {
            ($op:tt) => {
                match (lhs, rhs) {
                    (Number::Int8(a), Number::Int8(b)) => Some(Number::Bool(a $op b)),
                    (Number::Int16(a), Number::Int16(b)) => Some(Number::Bool(a $op b)),
                    (Number::Int32(a), Number::Int32(b)) => Some(Number::Bool(a $op b)),
                    (Number::Int64(a), Number::Int64(b)) => Some(Number::Bool(a $op b)),
                    (Number::UInt8(a), Number::UInt8(b)) => Some(Number::Bool(a $op b)),
                    (Number::UInt16(a), Number::UInt16(b)) => Some(Number::Bool(a $op b)),
                    (Number::UInt32(a), Number::UInt32(b)) => Some(Number::Bool(a $op b)),
                    (Number::UInt64(a), Number::UInt64(b)) => Some(Number::Bool(a $op b)),
                    (Number::Half(a), Number::Half(b)) => Some(Number::Bool(a.to_f32() $op b.to_f32())),
                    (Number::Float(a), Number::Float(b)) => Some(Number::Bool(a $op b)),
                    (Number::Double(a), Number::Double(b)) => Some(Number::Bool(a $op b)),
                    _ => None,
                }
            };
        }

        match opcode {
            OpCode::Add => int_arith!(wrapping_add).or_else(|| float_arith!(+)),
            OpCode::Subtract => int_arith!(wrapping_sub).or_else(|| float_arith!(-)),
            OpCode::Multiply => int_arith!(wrapping_mul).or_else(|| float_arith!(*)),
            OpCode::Divide => {
                if rhs.kind().is_integer() && rhs.is_zero() {
                    return None;
                }
                int_arith!(wrapping_div).or_else(|| float_arith!(/))
            }
            OpCode::Modulus => {
                if rhs.kind().is_integer() && rhs.is_zero() {
                    return None;
                }
                int_arith!(wrapping_rem).or_else(|| float_arith!(%))
            }
            OpCode::BitwiseAnd => bitwise!(&),
            OpCode::BitwiseOr => bitwise!(|),
            OpCode::BitwiseXor => bitwise!(^),
            OpCode::ShiftLeft => {
                let amount = rhs.as_unsigned()? as u32;
                match lhs {
                    Number::Int8(a) => Some(Number::Int8(a.wrapping_shl(amount))),
                    Number::Int16(a) => Some(Number::Int16(a.wrapping_shl(amount))),
                    Number::Int32(a) => Some(Number::Int32(a.wrapping_shl(amount))),
                    Number::Int64(a) => Some(Number::Int64(a.wrapping_shl(amount))),
                    Number::UInt8(a) => Some(Number::UInt8(a.wrapping_shl(amount))),
                    Number::UInt16(a) => Some(Number::UInt16(a.wrapping_shl(amount))),
                    Number::UInt32(a) => Some(Number::UInt32(a.wrapping_shl(amount))),
                    Number::UInt64(a) => Some(Number::UInt64(a.wrapping_shl(amount))),
                    _ => None,
                }
            }
            // Arithmetic shift for signed kinds, logical for unsigned.
            OpCode::ShiftRight => {
                let amount = rhs.as_unsigned()? as u32;
                match lhs {
                    Number::Int8(a) => Some(Number::Int8(a.wrapping_shr(amount))),
                    Number::Int16(a) => Some(Number::Int16(a.wrapping_shr(amount))),
                    Number::Int32(a) => Some(Number::Int32(a.wrapping_shr(amount))),
                    Number::Int64(a) => Some(Number::Int64(a.wrapping_shr(amount))),
                    Number::UInt8(a) => Some(Number::UInt8(a.wrapping_shr(amount))),
                    Number::UInt16(a) => Some(Number::UInt16(a.wrapping_shr(amount))),
                    Number::UInt32(a) => Some(Number::UInt32(a.wrapping_shr(amount))),
                    Number::UInt64(a) => Some(Number::UInt64(a.wrapping_shr(amount))),
                    _ => None,
                }
            }
            OpCode::AndAnd => Some(Number::Bool(lhs.to_bool() && rhs.to_bool())),
            OpCode::OrOr => Some(Number::Bool(lhs.to_bool() || rhs.to_bool())),
            // IEEE equality for floats (0.0 == -0.0, NaN != NaN), value
            // equality elsewhere.
            OpCode::Equal => compare!(==).or_else(|| match (lhs, rhs) {
                (Number::Bool(a), Number::Bool(b)) => Some(Number::Bool(a == b)),
                _ => None,
            }),
            OpCode::NotEqual => compare!(!=).or_else(|| match (lhs, rhs) {
                (Number::Bool(a), Number::Bool(b)) => Some(Number::Bool(a != b)),
                _ => None,
            }),
            OpCode::LessThan => compare!(<),
            OpCode::LessThanOrEqual => compare!(<=),
            OpCode::GreaterThan => compare!(>),
            OpCode::GreaterThanOrEqual => compare!(>=),
            _ => None,
        }
    }

    fn bits(&self) -> u64 {
        match *self {
            Number::Int8(v) => v as u8 as u64,
            Number::Int16(v) => v as u16 as u64,
            Number::Int32(v) => v as u32 as u64,
            Number::Int64(v) => v as u64,
            Number::UInt8(v) => v as u64,
            Number::UInt16(v) => v as u64,
            Number::UInt32(v) => v as u64,
            Number::UInt64(v) => v,
            Number::Half(v) => v.to_bits() as u64,
            Number::Float(v) => v.to_bits() as u64,
            Number::Double(v) => v.to_bits(),
            Number::Bool(v) => v as u64,
        }
    }
}

// Bit-pattern equality: kind and bits must match exactly.
impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.bits() == other.bits()
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        self.bits().hash(state);
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int8(v) => write!(f, "{}i8", v),
            Number::Int16(v) => write!(f, "{}i16", v),
            Number::Int32(v) => write!(f, "{}i32", v),
            Number::Int64(v) => write!(f, "{}i64", v),
            Number::UInt8(v) => write!(f, "{}u8", v),
            Number::UInt16(v) => write!(f, "{}u16", v),
            Number::UInt32(v) => write!(f, "{}u32", v),
            Number::UInt64(v) => write!(f, "{}u64", v),
            Number::Half(v) => write!(f, "{}f16", v),
            Number::Float(v) => write!(f, "{}f32", v),
            Number::Double(v) => write!(f, "{}f64", v),
            Number::Bool(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_wrapping() {
        let max = Number::Int32(i32::MAX);
        let one = Number::Int32(1);
        assert_eq!(
            Number::fold_binary(max, one, OpCode::Add),
            Some(Number::Int32(i32::MIN))
        );
        assert_eq!(
            Number::fold_binary(Number::UInt8(200), Number::UInt8(100), OpCode::Add),
            Some(Number::UInt8(44))
        );
    }

    #[test]
    fn test_division_by_zero_never_folds() {
        let a = Number::Int32(10);
        let z = Number::Int32(0);
        assert_eq!(Number::fold_binary(a, z, OpCode::Divide), None);
        assert_eq!(Number::fold_binary(a, z, OpCode::Modulus), None);
        // Float division by zero is IEEE, not a trap.
        let fz = Number::fold_binary(Number::Float(1.0), Number::Float(0.0), OpCode::Divide);
        assert_eq!(fz, Some(Number::Float(f32::INFINITY)));
    }

    #[test]
    fn test_kind_mismatch_never_folds() {
        assert_eq!(
            Number::fold_binary(Number::Int32(1), Number::Int64(1), OpCode::Add),
            None
        );
    }

    #[test]
    fn test_shift_signedness() {
        assert_eq!(
            Number::fold_binary(Number::Int32(-8), Number::Int32(1), OpCode::ShiftRight),
            Some(Number::Int32(-4))
        );
        assert_eq!(
            Number::fold_binary(Number::UInt32(0x8000_0000), Number::UInt32(1), OpCode::ShiftRight),
            Some(Number::UInt32(0x4000_0000))
        );
    }

    #[test]
    fn test_bit_pattern_equality() {
        assert_eq!(Number::Float(1.5), Number::Float(1.5));
        // -0.0 and 0.0 have different bit patterns.
        assert_ne!(Number::Float(-0.0), Number::Float(0.0));
        // Same value, different kind.
        assert_ne!(Number::Int32(1), Number::Int64(1));
    }

    #[test]
    fn test_cast() {
        assert_eq!(Number::Int32(-1).cast(NumberKind::UInt8), Number::UInt8(255));
        assert_eq!(Number::Float(3.7).cast(NumberKind::Int32), Number::Int32(3));
        assert_eq!(Number::Int32(2).cast(NumberKind::Double), Number::Double(2.0));
        assert_eq!(Number::Int32(0).cast(NumberKind::Bool), Number::Bool(false));
        assert_eq!(
            Number::Double(1.0).cast(NumberKind::Half),
            Number::Half(f16::from_f32(1.0))
        );
    }

    #[test]
    fn test_unary_folds() {
        assert_eq!(
            Number::Int32(5).fold_unary(OpCode::Negate),
            Some(Number::Int32(-5))
        );
        assert_eq!(
            Number::Int32(0).fold_unary(OpCode::LogicalNot),
            Some(Number::Bool(true))
        );
        assert_eq!(
            Number::UInt8(0xF0).fold_unary(OpCode::BitwiseNot),
            Some(Number::UInt8(0x0F))
        );
        assert_eq!(Number::Float(1.0).fold_unary(OpCode::BitwiseNot), None);
    }

    #[test]
    fn test_as_unsigned() {
        assert_eq!(Number::Int32(8).as_unsigned(), Some(8));
        assert_eq!(Number::Int32(-8).as_unsigned(), None);
        assert_eq!(Number::UInt64(u64::MAX).as_unsigned(), Some(u64::MAX));
        assert_eq!(Number::Float(8.0).as_unsigned(), None);
    }
}

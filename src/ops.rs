//! Operator implementations over [`Value`]s.
//!
//! Each operator matches on both operands at once and spells out every ordering
//! it supports, so nothing is retried with the operands swapped. Combinations
//! with no meaning (pointer arithmetic, operations on `Never`, aggregates)
//! produce `Value::Never`.

use std::cmp::Ordering;

use crate::env::{read_primitive, Environment};
use crate::errors::EnvError;
use crate::types::{common_type, mask_pointer_bits, DirectHandle, Primitive, Type, TypeInfo};
use crate::value::{VArray, VPointer, VPrimitive, VStruct, Value};

pub fn op1_plus(v: Value) -> Value {
    match v {
        Value::Primitive(p) => p.into(),
        _ => Value::Never,
    }
}

pub fn op1_minus(v: Value) -> Value {
    match v {
        Value::Primitive(p) => p.with_bits(p.bits.wrapping_neg()).into(),
        _ => Value::Never,
    }
}

/// Logical not, `!x`.
pub fn op1_not(v: Value) -> Value {
    match v {
        Value::Primitive(p) => VPrimitive::truth(p.is_zero()).into(),
        Value::Pointer(VPointer { bits, .. }) => VPrimitive::truth(bits == 0).into(),
        _ => Value::Never,
    }
}

/// Bitwise complement, `~x`.
pub fn op1_negate(v: Value) -> Value {
    match v {
        Value::Primitive(p) => p.with_bits(!p.bits).into(),
        _ => Value::Never,
    }
}

/// Promote both sides to their common type and apply `op` to the 64 bit
/// representations. `op` returning `None` means the result is undefined.
fn arith<F>(lhs: Value, rhs: Value, op: F) -> Value
where
    F: FnOnce(Primitive, u64, u64) -> Option<u64>,
{
    match (lhs, rhs) {
        (Value::Primitive(l), Value::Primitive(r)) => {
            let common = common_type(l.ty, r.ty);
            let (l, r) = (l.promote(common), r.promote(common));
            match op(common, l.bits, r.bits) {
                Some(bits) => VPrimitive::from(common, bits).into(),
                None => Value::Never,
            }
        }
        // no pointer arithmetic, in either operand order
        (Value::Pointer(_) | Value::Array(_), Value::Primitive(_))
        | (Value::Primitive(_), Value::Pointer(_) | Value::Array(_)) => Value::Never,
        _ => Value::Never,
    }
}

pub fn op2_add(lhs: Value, rhs: Value) -> Value {
    arith(lhs, rhs, |_, l, r| Some(l.wrapping_add(r)))
}

pub fn op2_sub(lhs: Value, rhs: Value) -> Value {
    arith(lhs, rhs, |_, l, r| Some(l.wrapping_sub(r)))
}

pub fn op2_mul(lhs: Value, rhs: Value) -> Value {
    arith(lhs, rhs, |_, l, r| Some(l.wrapping_mul(r)))
}

pub fn op2_div(lhs: Value, rhs: Value) -> Value {
    arith(lhs, rhs, |ty, l, r| {
        if r == 0 {
            None
        } else if ty.is_unsigned() {
            Some(l / r)
        } else {
            Some((l as i64).wrapping_div(r as i64) as u64)
        }
    })
}

pub fn op2_mod(lhs: Value, rhs: Value) -> Value {
    arith(lhs, rhs, |ty, l, r| {
        if r == 0 {
            None
        } else if ty.is_unsigned() {
            Some(l % r)
        } else {
            Some((l as i64).wrapping_rem(r as i64) as u64)
        }
    })
}

pub fn op2_bsl(lhs: Value, rhs: Value) -> Value {
    arith(lhs, rhs, |_, l, r| Some(if r >= 64 { 0 } else { l << r }))
}

pub fn op2_bsr(lhs: Value, rhs: Value) -> Value {
    arith(lhs, rhs, |ty, l, r| {
        let r = r.min(63) as u32;
        if ty.is_unsigned() {
            Some(l.checked_shr(r).unwrap_or(0))
        } else {
            Some(((l as i64) >> r) as u64)
        }
    })
}

pub fn op2_bitand(lhs: Value, rhs: Value) -> Value {
    arith(lhs, rhs, |_, l, r| Some(l & r))
}

pub fn op2_bitor(lhs: Value, rhs: Value) -> Value {
    arith(lhs, rhs, |_, l, r| Some(l | r))
}

pub fn op2_bitxor(lhs: Value, rhs: Value) -> Value {
    arith(lhs, rhs, |_, l, r| Some(l ^ r))
}

/// Three-way comparison every ordering operator is built from. Primitives are
/// compared in their common type, pointers only against pointers of the same type.
pub fn compare(lhs: Value, rhs: Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Primitive(l), Value::Primitive(r)) => {
            let common = common_type(l.ty, r.ty);
            let (l, r) = (l.promote(common), r.promote(common));
            if common.is_unsigned() {
                Some(l.as_u64().cmp(&r.as_u64()))
            } else {
                Some(l.as_i64().cmp(&r.as_i64()))
            }
        }
        (Value::Pointer(l), Value::Pointer(r)) if l.ty == r.ty => Some(l.bits.cmp(&r.bits)),
        _ => None,
    }
}

fn compare_with(lhs: Value, rhs: Value, accept: fn(Ordering) -> bool) -> Value {
    match compare(lhs, rhs) {
        Some(ord) => VPrimitive::truth(accept(ord)).into(),
        None => Value::Never,
    }
}

pub fn op2_lt(lhs: Value, rhs: Value) -> Value {
    compare_with(lhs, rhs, Ordering::is_lt)
}

pub fn op2_le(lhs: Value, rhs: Value) -> Value {
    compare_with(lhs, rhs, Ordering::is_le)
}

pub fn op2_eq(lhs: Value, rhs: Value) -> Value {
    compare_with(lhs, rhs, Ordering::is_eq)
}

pub fn op2_ne(lhs: Value, rhs: Value) -> Value {
    compare_with(lhs, rhs, Ordering::is_ne)
}

pub fn op2_ge(lhs: Value, rhs: Value) -> Value {
    compare_with(lhs, rhs, Ordering::is_ge)
}

pub fn op2_gt(lhs: Value, rhs: Value) -> Value {
    compare_with(lhs, rhs, Ordering::is_gt)
}

/// Reinterpret `from` as type `to`. Primitives convert between widths with
/// truncation and extension, and may become an address-carrying aggregate.
#[track_caller]
pub fn op2_typecast(info: &TypeInfo, from: Value, to: DirectHandle) -> Value {
    let from = match from {
        Value::Primitive(p) => p,
        _ => return Value::Never,
    };

    if let Some(p) = to.as_primitive() {
        return from.promote(p).into();
    }

    match info.get_direct(to) {
        Type::Never | Type::Primitive(_) => Value::Never,
        Type::Pointer { pointer_size, .. } => Value::Pointer(VPointer {
            ty: to,
            bits: mask_pointer_bits(pointer_size, from.bits),
        }),
        Type::Array { pointer_size, .. } => Value::Array(VArray {
            ty: to,
            bits: mask_pointer_bits(pointer_size, from.bits),
        }),
        Type::Struct { pointer_size, .. } => Value::Struct(VStruct {
            ty: to,
            bits: mask_pointer_bits(pointer_size, from.bits),
        }),
    }
}

/// Load a value of type `ty` stored at `address`. Aggregates are not loaded,
/// the result just carries their address.
pub fn read_typed(env: &dyn Environment, ty: DirectHandle, address: u64) -> Result<Value, EnvError> {
    let address32 = address as u32;
    if let Some(p) = ty.as_primitive() {
        return Ok(read_primitive(env, p, address32)?.into());
    }

    let value = match env.type_info().get_direct(ty) {
        Type::Never | Type::Primitive(_) => Value::Never,
        Type::Pointer { pointer_size, .. } => {
            let bits = match pointer_size {
                1 => env.read_mem_u8(address32)? as u64,
                2 => env.read_mem_u16(address32)? as u64,
                _ => env.read_mem_u32(address32)? as u64,
            };
            Value::Pointer(VPointer { ty, bits })
        }
        Type::Array { pointer_size, .. } => Value::Array(VArray {
            ty,
            bits: mask_pointer_bits(pointer_size, address),
        }),
        Type::Struct { pointer_size, .. } => Value::Struct(VStruct {
            ty,
            bits: mask_pointer_bits(pointer_size, address),
        }),
    };

    Ok(value)
}

/// `*address`. A bare integer address reads one 16 bit word, a typed pointer or
/// array reads whatever it points at.
pub fn op1_dereference(env: &dyn Environment, address: Value) -> Result<Value, EnvError> {
    match address {
        Value::Primitive(p) => {
            Ok(read_primitive(env, Primitive::U16, p.as_u64() as u32)?.into())
        }
        Value::Pointer(VPointer { ty, bits }) => match env.type_info().get_direct(ty) {
            Type::Pointer { to, .. } => read_typed(env, to, bits),
            _ => Ok(Value::Never),
        },
        Value::Array(VArray { ty, bits }) => match env.type_info().get_direct(ty) {
            Type::Array { of, .. } => read_typed(env, of, bits),
            _ => Ok(Value::Never),
        },
        Value::Never | Value::Struct(_) => Ok(Value::Never),
    }
}

/// `base.field` and `base->field`. Only struct values have members.
pub fn op2_member(env: &dyn Environment, base: Value, field: &str) -> Result<Value, EnvError> {
    let VStruct { ty, bits } = match base {
        Value::Struct(s) => s,
        _ => return Ok(Value::Never),
    };

    let member = match env.type_info().get_direct(ty).member(field) {
        Some(m) => m.clone(),
        None => return Ok(Value::Never),
    };

    read_typed(env, member.ty, bits.wrapping_add(member.offset as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{FlatEnvironment, ZeroEnvironment};
    use crate::types::Member;

    fn prim(ty: Primitive, v: i64) -> Value {
        VPrimitive::from(ty, v as u64).into()
    }

    #[test]
    fn promotes_to_common_type() {
        let sum = op2_add(prim(Primitive::I16, 257), prim(Primitive::U8, 255));
        assert_eq!(sum, prim(Primitive::I16, 512));

        let wrapped = op2_add(prim(Primitive::U16, 0xffff), prim(Primitive::I16, 1));
        assert_eq!(wrapped, prim(Primitive::U16, 0));
    }

    #[test]
    fn signed_division_and_shifts() {
        assert_eq!(
            op2_div(prim(Primitive::I16, -7), prim(Primitive::I16, 2)),
            prim(Primitive::I16, -3)
        );
        assert_eq!(
            op2_mod(prim(Primitive::I16, -7), prim(Primitive::I16, 2)),
            prim(Primitive::I16, -1)
        );
        assert_eq!(
            op2_bsr(prim(Primitive::I8, -8), prim(Primitive::I8, 1)),
            prim(Primitive::I8, -4)
        );
        assert_eq!(
            op2_bsr(prim(Primitive::U8, 0x80), prim(Primitive::U8, 7)),
            prim(Primitive::U8, 1)
        );
        assert_eq!(
            op2_bsl(prim(Primitive::U8, 1), prim(Primitive::U8, 9)),
            prim(Primitive::U8, 0)
        );
    }

    #[test]
    fn division_by_zero_is_never() {
        assert_eq!(op2_div(prim(Primitive::I16, 1), prim(Primitive::I16, 0)), Value::Never);
        assert_eq!(op2_mod(prim(Primitive::U8, 1), prim(Primitive::U8, 0)), Value::Never);
    }

    #[test]
    fn unary_operators() {
        assert_eq!(op1_minus(prim(Primitive::I16, 4)), prim(Primitive::I16, -4));
        assert_eq!(op1_minus(prim(Primitive::U8, 1)), prim(Primitive::U8, 255));
        assert_eq!(op1_negate(prim(Primitive::U8, 0x0f)), prim(Primitive::U8, 0xf0));
        assert_eq!(op1_not(prim(Primitive::I16, 5)), prim(Primitive::U8, 0));
        assert_eq!(op1_not(prim(Primitive::I16, 0)), prim(Primitive::U8, 1));
        assert_eq!(op1_plus(Value::Never), Value::Never);
    }

    #[test]
    fn comparisons_are_truth_values() {
        let (a, b) = (prim(Primitive::I16, -1), prim(Primitive::I16, 2));
        assert_eq!(op2_lt(a, b), prim(Primitive::U8, 1));
        assert_eq!(op2_ge(a, b), prim(Primitive::U8, 0));
        assert_eq!(op2_ne(a, b), prim(Primitive::U8, 1));
        assert_eq!(op2_eq(b, b), prim(Primitive::U8, 1));
        // -1 becomes 0xffff once the unsigned side wins
        assert_eq!(op2_gt(a, prim(Primitive::U16, 2)), prim(Primitive::U8, 1));
        assert_eq!(op2_le(Value::Never, b), Value::Never);
    }

    #[test]
    fn no_pointer_arithmetic() {
        let info = TypeInfo::new();
        let ptr_t = info.pointer_to(2, info.type_from(Primitive::U8));
        let p = op2_typecast(&info, prim(Primitive::U16, 0x10), ptr_t);
        assert!(matches!(p, Value::Pointer(_)));
        assert_eq!(op2_add(p, prim(Primitive::I16, 1)), Value::Never);
        assert_eq!(op2_add(prim(Primitive::I16, 1), p), Value::Never);
        assert_eq!(op2_sub(p, prim(Primitive::I16, 1)), Value::Never);
    }

    #[test]
    fn casts() {
        let info = TypeInfo::new();
        let to_i8 = DirectHandle::primitive(Primitive::I8);
        assert_eq!(
            op2_typecast(&info, prim(Primitive::I16, 513), to_i8),
            prim(Primitive::I8, 1)
        );
        assert_eq!(op2_typecast(&info, Value::Never, to_i8), Value::Never);
        assert_eq!(
            op2_typecast(&info, prim(Primitive::I16, 1), DirectHandle::NEVER),
            Value::Never
        );
    }

    #[test]
    fn dereference_reads_memory() {
        let env = FlatEnvironment::default();
        env.fill(7);
        assert_eq!(
            op1_dereference(&env, prim(Primitive::I16, 0)),
            Ok(prim(Primitive::U16, 0x0707))
        );

        let info = env.type_info();
        let ptr_t = info.pointer_to(2, info.type_from(Primitive::I8));
        env.write_mem_u8(0x20, 0xff).unwrap();
        let p = op2_typecast(info, prim(Primitive::U16, 0x20), ptr_t);
        assert_eq!(op1_dereference(&env, p), Ok(prim(Primitive::I8, -1)));

        assert_eq!(op1_dereference(&ZeroEnvironment::new(), Value::Never), Ok(Value::Never));
    }

    #[test]
    fn member_reads_at_offset() {
        let env = FlatEnvironment::default();
        let info = env.type_info();
        let s = info.register_direct(Type::Struct {
            pointer_size: 2,
            members: vec![
                Member {
                    name: "a".into(),
                    ty: info.type_from(Primitive::I16),
                    offset: 0,
                },
                Member {
                    name: "b".into(),
                    ty: info.type_from(Primitive::U8),
                    offset: 2,
                },
            ],
        });
        env.write_mem_u16(0x100, 0xfffd).unwrap();
        env.write_mem_u8(0x102, 9).unwrap();

        let base = op2_typecast(info, prim(Primitive::U16, 0x100), s);
        assert_eq!(op2_member(&env, base, "a"), Ok(prim(Primitive::I16, -3)));
        assert_eq!(op2_member(&env, base, "b"), Ok(prim(Primitive::U8, 9)));
        assert_eq!(op2_member(&env, base, "c"), Ok(Value::Never));
        assert_eq!(op2_member(&env, prim(Primitive::U16, 0x100), "a"), Ok(Value::Never));
    }

    #[test]
    fn memory_errors_propagate() {
        let env = FlatEnvironment::with_config(&crate::config::Config {
            memory_size: 2,
            ..Default::default()
        });
        assert_eq!(
            op1_dereference(&env, prim(Primitive::I16, 8)),
            Err(EnvError::MemoryUnavailable { address: 8 })
        );
    }
}

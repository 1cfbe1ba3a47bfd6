use std::fmt::Display;

use crate::types::{DirectHandle, Primitive, TypeInfo};

/// An integer value of one of the primitive widths.
///
/// `bits` is always held sign or zero extended out to 64 bits according to `ty`,
/// so two primitives of the same type compare equal iff their bits do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VPrimitive {
    pub ty: Primitive,
    pub bits: u64,
}

impl VPrimitive {
    pub fn from(ty: Primitive, bits: u64) -> VPrimitive {
        VPrimitive {
            ty,
            bits: ty.normalize(bits),
        }
    }

    /// Same type as `self`, new contents.
    pub fn with_bits(self, bits: u64) -> VPrimitive {
        VPrimitive::from(self.ty, bits)
    }

    pub fn promote(self, to: Primitive) -> VPrimitive {
        if self.ty == to {
            self
        } else {
            VPrimitive::from(to, self.bits)
        }
    }

    pub fn truth(b: bool) -> VPrimitive {
        VPrimitive::from(Primitive::U8, b as u64)
    }

    pub fn i16(v: i16) -> VPrimitive {
        VPrimitive::from(Primitive::I16, v as u64)
    }

    pub fn as_i64(self) -> i64 {
        self.bits as i64
    }

    pub fn as_u64(self) -> u64 {
        self.bits
    }

    pub fn is_zero(self) -> bool {
        self.bits == 0
    }

    pub fn type_handle(self) -> DirectHandle {
        DirectHandle::primitive(self.ty)
    }
}

impl Display for VPrimitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ty.is_unsigned() {
            write!(f, "{}", self.bits)
        } else {
            write!(f, "{}", self.bits as i64)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VPointer {
    pub ty: DirectHandle,
    pub bits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VArray {
    pub ty: DirectHandle,
    pub bits: u64,
}

/// Structs are carried by address; `bits` is where the struct starts in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VStruct {
    pub ty: DirectHandle,
    pub bits: u64,
}

/// The result of evaluating a term. `Never` is the "no value" outcome of any
/// operation that has no meaning for its operands, and must be shown as unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Never,
    Primitive(VPrimitive),
    Pointer(VPointer),
    Array(VArray),
    Struct(VStruct),
}

impl Default for Value {
    fn default() -> Self {
        Value::Never
    }
}

impl From<VPrimitive> for Value {
    fn from(v: VPrimitive) -> Self {
        Value::Primitive(v)
    }
}

impl Value {
    pub fn is_never(&self) -> bool {
        matches!(self, Value::Never)
    }

    pub fn type_handle(&self) -> DirectHandle {
        match self {
            Value::Never => DirectHandle::NEVER,
            Value::Primitive(p) => p.type_handle(),
            Value::Pointer(VPointer { ty, .. })
            | Value::Array(VArray { ty, .. })
            | Value::Struct(VStruct { ty, .. }) => *ty,
        }
    }

    pub fn bits(&self) -> u64 {
        match self {
            Value::Never => 0,
            Value::Primitive(p) => p.bits,
            Value::Pointer(VPointer { bits, .. })
            | Value::Array(VArray { bits, .. })
            | Value::Struct(VStruct { bits, .. }) => *bits,
        }
    }

    pub fn as_primitive(&self) -> Option<VPrimitive> {
        match self {
            Value::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    /// Name of this value's type, for a watch list's type column.
    pub fn type_name(&self, info: &TypeInfo) -> String {
        match self {
            Value::Never => "<unknown>".to_owned(),
            Value::Primitive(p) => p.ty.to_string(),
            other => info.display(other.type_handle()),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Never => write!(f, "<unknown>"),
            Value::Primitive(p) => write!(f, "{p}"),
            Value::Pointer(VPointer { bits, .. })
            | Value::Array(VArray { bits, .. })
            | Value::Struct(VStruct { bits, .. }) => write!(f, "0x{bits:04x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_extend_on_construction() {
        let v = VPrimitive::from(Primitive::I8, 0x80);
        assert_eq!(v.as_i64(), -128);
        assert_eq!(v.to_string(), "-128");

        let u = VPrimitive::from(Primitive::U8, 0x1_80);
        assert_eq!(u.as_u64(), 0x80);
        assert_eq!(u.to_string(), "128");
    }

    #[test]
    fn promote_keeps_value() {
        let v = VPrimitive::from(Primitive::U8, 255);
        let p = v.promote(Primitive::I16);
        assert_eq!(p.ty, Primitive::I16);
        assert_eq!(p.as_i64(), 255);
        assert_eq!(v.ty, Primitive::U8);

        let neg = VPrimitive::i16(-1).promote(Primitive::U16);
        assert_eq!(neg.as_u64(), 0xffff);
    }

    #[test]
    fn never_renders_unknown() {
        assert_eq!(Value::Never.to_string(), "<unknown>");
        assert_eq!(Value::default(), Value::Never);
        assert_eq!(Value::Never.type_handle(), DirectHandle::NEVER);
    }

    #[test]
    fn truth_is_u8() {
        assert_eq!(VPrimitive::truth(true), VPrimitive::from(Primitive::U8, 1));
        assert!(VPrimitive::truth(false).is_zero());
    }
}

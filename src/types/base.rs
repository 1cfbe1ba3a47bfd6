use std::fmt::{Debug, Display};

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString};

/// The integer widths a watch expression can name directly, either through a
/// literal suffix (`_u8`) or a prefix cast (`(i32)`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, StrumDisplay, EnumString, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum Primitive {
    I8 = 0,
    U8 = 1,
    I16 = 2,
    U16 = 3,
    I32 = 4,
    U32 = 5,
}

impl Primitive {
    pub fn is_unsigned(self) -> bool {
        match self {
            Primitive::I8 | Primitive::I16 | Primitive::I32 => false,
            Primitive::U8 | Primitive::U16 | Primitive::U32 => true,
        }
    }

    pub fn bitness(self) -> u32 {
        match self {
            Primitive::I8 | Primitive::U8 => 8,
            Primitive::I16 | Primitive::U16 => 16,
            Primitive::I32 | Primitive::U32 => 32,
        }
    }

    pub fn bytes(self) -> u16 {
        (self.bitness() / 8) as u16
    }

    /// Truncate `bits` to this width, then sign or zero extend back out to 64 bits.
    pub fn normalize(self, bits: u64) -> u64 {
        match self {
            Primitive::I8 => bits as i8 as i64 as u64,
            Primitive::U8 => bits as u8 as u64,
            Primitive::I16 => bits as i16 as i64 as u64,
            Primitive::U16 => bits as u16 as u64,
            Primitive::I32 => bits as i32 as i64 as u64,
            Primitive::U32 => bits as u32 as u64,
        }
    }
}

/// Usual arithmetic conversion between two primitives.
///
/// Equal signedness widens to the larger of the two. Mixed signedness prefers the
/// unsigned type unless the signed operand is strictly wider.
pub fn common_type(lhs: Primitive, rhs: Primitive) -> Primitive {
    if lhs == rhs {
        return lhs;
    }

    let (lhs_bits, rhs_bits) = (lhs.bitness(), rhs.bitness());

    match (lhs.is_unsigned(), rhs.is_unsigned()) {
        (a, b) if a == b => {
            if lhs_bits > rhs_bits {
                lhs
            } else {
                rhs
            }
        }
        (true, false) => {
            if lhs_bits >= rhs_bits {
                lhs
            } else {
                rhs
            }
        }
        (false, true) => {
            if rhs_bits >= lhs_bits {
                rhs
            } else {
                lhs
            }
        }
        _ => unreachable!(),
    }
}

pub fn mask_pointer_bits(pointer_size: u8, bits: u64) -> u64 {
    match pointer_size {
        1 => bits & 0xff,
        2 => bits & 0xffff,
        4 => bits & 0xffff_ffff,
        _ => bits,
    }
}

/// Stable identity of a structural type inside a [`TypeInfo`](super::TypeInfo).
///
/// Index 0 is `Never` and indices 1..=6 are the primitives, in declaration order,
/// so these can be built without a registry at hand.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DirectHandle(u32);

impl DirectHandle {
    pub const NEVER: DirectHandle = DirectHandle(0);

    pub const fn primitive(p: Primitive) -> DirectHandle {
        DirectHandle(1 + p as u32)
    }

    pub(crate) fn from_index(index: usize) -> DirectHandle {
        DirectHandle(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn as_primitive(self) -> Option<Primitive> {
        use Primitive::*;
        match self.0 {
            1 => Some(I8),
            2 => Some(U8),
            3 => Some(I16),
            4 => Some(U16),
            5 => Some(I32),
            6 => Some(U32),
            _ => None,
        }
    }
}

impl Debug for DirectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_primitive() {
            Some(p) => write!(f, "D({p})"),
            None => write!(f, "D#{}", self.0),
        }
    }
}

/// Name-keyed, rebindable type slot. The type it refers to may change, which is
/// tracked through the slot's version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndirectHandle(u32);

impl IndirectHandle {
    pub(crate) fn from_index(index: usize) -> IndirectHandle {
        IndirectHandle(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What an indirect slot resolved to at some moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionedType {
    pub ty: DirectHandle,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Member {
    pub name: String,
    pub ty: DirectHandle,
    pub offset: u16,
}

/// Discriminant of [`Type`], in the order used when comparing unlike types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetaType {
    Never,
    Primitive,
    Pointer,
    Array,
    Struct,
}

/// A structural type. Nested types are referred to by their interned handle, so two
/// types compare equal exactly when their shapes do.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    Never,
    Primitive(Primitive),
    Pointer {
        pointer_size: u8,
        to: DirectHandle,
    },
    Array {
        pointer_size: u8,
        len: u16,
        of: DirectHandle,
    },
    Struct {
        pointer_size: u8,
        members: Vec<Member>,
    },
}

impl Type {
    pub fn meta(&self) -> MetaType {
        match self {
            Type::Never => MetaType::Never,
            Type::Primitive(_) => MetaType::Primitive,
            Type::Pointer { .. } => MetaType::Pointer,
            Type::Array { .. } => MetaType::Array,
            Type::Struct { .. } => MetaType::Struct,
        }
    }

    pub fn is_unsigned(&self) -> bool {
        match self {
            Type::Primitive(p) => p.is_unsigned(),
            Type::Pointer { .. } => true,
            _ => false,
        }
    }

    /// Width of the value in bits when it is held in a register. Aggregates are
    /// carried by address, so they report their pointer width.
    pub fn bitness(&self) -> u32 {
        match self {
            Type::Never => 0,
            Type::Primitive(p) => p.bitness(),
            Type::Pointer { pointer_size, .. }
            | Type::Array { pointer_size, .. }
            | Type::Struct { pointer_size, .. } => *pointer_size as u32 * 8,
        }
    }

    pub fn pointer_size(&self) -> Option<u8> {
        match self {
            Type::Pointer { pointer_size, .. }
            | Type::Array { pointer_size, .. }
            | Type::Struct { pointer_size, .. } => Some(*pointer_size),
            _ => None,
        }
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        match self {
            Type::Struct { members, .. } => members.iter().find(|m| m.name == name),
            _ => None,
        }
    }
}

impl From<Primitive> for Type {
    fn from(p: Primitive) -> Self {
        Type::Primitive(p)
    }
}

impl Display for VersionedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}@v{}", self.ty, self.version)
    }
}

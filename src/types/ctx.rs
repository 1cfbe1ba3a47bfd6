use std::fmt::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;
use strum::IntoEnumIterator;

use super::base::*;

struct IndirectSlot {
    name: String,
    ty: DirectHandle,
    version: u32,
}

#[derive(Default)]
struct Tables {
    direct: Vec<Type>,
    direct_index: FxHashMap<Type, DirectHandle>,

    indirect: Vec<IndirectSlot>,
    indirect_index: FxHashMap<String, IndirectHandle>,
}

impl Tables {
    fn intern(&mut self, ty: Type) -> DirectHandle {
        if let Some(&existing) = self.direct_index.get(&ty) {
            return existing;
        }

        let handle = DirectHandle::from_index(self.direct.len());
        self.direct.push(ty.clone());
        let prior = self.direct_index.insert(ty, handle);
        assert!(prior.is_none(), "interned a type twice");

        handle
    }

    #[track_caller]
    fn direct(&self, handle: DirectHandle) -> &Type {
        match self.direct.get(handle.index()) {
            Some(ty) => ty,
            None => panic!("direct handle {handle:?} is out of range for this registry"),
        }
    }

    #[track_caller]
    fn slot(&self, handle: IndirectHandle) -> &IndirectSlot {
        match self.indirect.get(handle.index()) {
            Some(slot) => slot,
            None => panic!("indirect handle {handle:?} was never registered"),
        }
    }

    #[track_caller]
    fn slot_mut(&mut self, handle: IndirectHandle) -> &mut IndirectSlot {
        match self.indirect.get_mut(handle.index()) {
            Some(slot) => slot,
            None => panic!("indirect handle {handle:?} was never registered"),
        }
    }

    fn display_into(&self, handle: DirectHandle, out: &mut String) {
        match self.direct(handle) {
            Type::Never => out.push_str("<never>"),
            Type::Primitive(p) => {
                let _ = write!(out, "{p}");
            }
            Type::Pointer { to, .. } => {
                self.display_into(*to, out);
                out.push('*');
            }
            Type::Array { len, of, .. } => {
                self.display_into(*of, out);
                let _ = write!(out, "[{len}]");
            }
            Type::Struct { members, .. } => {
                out.push_str("struct{");
                for (i, m) in members.iter().enumerate() {
                    if i != 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{}:", m.name);
                    self.display_into(m.ty, out);
                    let _ = write!(out, "@{}", m.offset);
                }
                out.push('}');
            }
        }
    }
}

/// Runtime type information for one debug session.
///
/// Holds two handle families: direct handles, which intern structural types, and
/// indirect handles, which name a slot that can later be rebound to a different
/// direct type. Every table sits behind one lock, and no method calls back into
/// the registry while holding it.
pub struct TypeInfo {
    tables: Mutex<Tables>,
}

impl Default for TypeInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.lock();
        f.debug_struct("TypeInfo")
            .field("direct", &tables.direct.len())
            .field("indirect", &tables.indirect.len())
            .finish()
    }
}

impl TypeInfo {
    pub fn new() -> TypeInfo {
        let mut tables = Tables::default();

        // the layout here is what lets DirectHandle::primitive skip the registry
        let never = tables.intern(Type::Never);
        assert_eq!(never, DirectHandle::NEVER);
        for p in Primitive::iter() {
            let h = tables.intern(Type::Primitive(p));
            assert_eq!(h, DirectHandle::primitive(p));
        }

        TypeInfo {
            tables: Mutex::new(tables),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Intern `ty`, returning the existing handle if a structurally equal type
    /// was already registered.
    pub fn register_direct(&self, ty: Type) -> DirectHandle {
        self.lock().intern(ty)
    }

    #[track_caller]
    pub fn get_direct(&self, handle: DirectHandle) -> Type {
        self.lock().direct(handle).clone()
    }

    pub fn type_from(&self, p: Primitive) -> DirectHandle {
        DirectHandle::primitive(p)
    }

    pub fn pointer_to(&self, pointer_size: u8, to: DirectHandle) -> DirectHandle {
        self.register_direct(Type::Pointer { pointer_size, to })
    }

    pub fn array_of(&self, pointer_size: u8, of: DirectHandle, len: u16) -> DirectHandle {
        self.register_direct(Type::Array {
            pointer_size,
            len,
            of,
        })
    }

    /// Returns `(true, handle)` when the slot is new, `(false, handle)` if `name`
    /// already had one. A new slot starts out bound to `Never` at version 0.
    pub fn register_indirect(&self, name: &str) -> (bool, IndirectHandle) {
        let mut tables = self.lock();
        if let Some(&existing) = tables.indirect_index.get(name) {
            return (false, existing);
        }

        let handle = IndirectHandle::from_index(tables.indirect.len());
        tables.indirect.push(IndirectSlot {
            name: name.to_owned(),
            ty: DirectHandle::NEVER,
            version: 0,
        });
        tables.indirect_index.insert(name.to_owned(), handle);

        tracing::debug!("registered indirect type slot '{name}' as {handle:?}");

        (true, handle)
    }

    pub fn get_indirect(&self, name: &str) -> Option<IndirectHandle> {
        self.lock().indirect_index.get(name).copied()
    }

    /// Rebind a slot. Returns whether the binding changed, in which case the
    /// slot's version went up by one.
    #[track_caller]
    pub fn set_indirect_type(&self, handle: IndirectHandle, ty: DirectHandle) -> bool {
        let mut tables = self.lock();
        // validate before taking the slot mutably
        tables.direct(ty);

        let slot = tables.slot_mut(handle);
        if slot.ty == ty {
            return false;
        }

        slot.ty = ty;
        slot.version += 1;
        tracing::debug!(
            "rebound indirect type '{}' to {ty:?}, now at version {}",
            slot.name,
            slot.version
        );

        true
    }

    #[track_caller]
    pub fn indirect_type(&self, handle: IndirectHandle) -> VersionedType {
        let tables = self.lock();
        let slot = tables.slot(handle);
        VersionedType {
            ty: slot.ty,
            version: slot.version,
        }
    }

    #[track_caller]
    pub fn indirect_name(&self, handle: IndirectHandle) -> String {
        self.lock().slot(handle).name.clone()
    }

    /// Unbind every indirect slot, as happens when the debuggee is reloaded.
    /// Handles stay valid; slots that were bound to something move to a new version.
    pub fn clear_indirect_types(&self) {
        let mut tables = self.lock();
        let mut rebound = 0;
        for slot in tables.indirect.iter_mut() {
            if slot.ty != DirectHandle::NEVER {
                slot.ty = DirectHandle::NEVER;
                slot.version += 1;
                rebound += 1;
            }
        }

        tracing::debug!("cleared {rebound} indirect type slots");
    }

    pub fn direct_count(&self) -> usize {
        self.lock().direct.len()
    }

    #[track_caller]
    pub fn display(&self, handle: DirectHandle) -> String {
        let tables = self.lock();
        let mut out = String::new();
        tables.display_into(handle, &mut out);
        out
    }
}

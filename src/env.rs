use std::sync::{PoisonError, RwLock};

use dashmap::DashMap;
use lasso::{Key, Spur, ThreadedRodeo};

use crate::config::{Config, WordOrder};
use crate::errors::EnvError;
use crate::types::{Primitive, TypeInfo};
use crate::value::{VPrimitive, Value};

/// What the host simulator provides to evaluation.
///
/// Every call is synchronous. Failures are reported as [`EnvError`] and handed
/// back to the caller of `evaluate`.
pub trait Environment {
    fn resolve_named_value(&self, name: &str) -> Result<Value, EnvError>;

    /// Turn a `$name` into a handle once, so later lookups skip the string.
    fn cache_debug_variable_name(&self, name: &str) -> u32;
    fn resolve_debug_value(&self, handle: u32) -> Result<Value, EnvError>;

    fn read_mem_u8(&self, address: u32) -> Result<u8, EnvError>;
    fn read_mem_u16(&self, address: u32) -> Result<u16, EnvError>;

    fn read_mem_u32(&self, address: u32) -> Result<u32, EnvError> {
        let hi = self.read_mem_u16(address)? as u32;
        let lo = self.read_mem_u16(address.wrapping_add(2))? as u32;
        Ok(hi << 16 | lo)
    }

    fn type_info(&self) -> &TypeInfo;
}

/// Every name resolves to zero and all of memory reads as zero.
#[derive(Debug, Default)]
pub struct ZeroEnvironment {
    info: TypeInfo,
}

impl ZeroEnvironment {
    pub fn new() -> ZeroEnvironment {
        Self::default()
    }
}

impl Environment for ZeroEnvironment {
    fn resolve_named_value(&self, _name: &str) -> Result<Value, EnvError> {
        Ok(VPrimitive::i16(0).into())
    }

    fn cache_debug_variable_name(&self, _name: &str) -> u32 {
        0
    }

    fn resolve_debug_value(&self, _handle: u32) -> Result<Value, EnvError> {
        Ok(VPrimitive::i16(0).into())
    }

    fn read_mem_u8(&self, _address: u32) -> Result<u8, EnvError> {
        Ok(0)
    }

    fn read_mem_u16(&self, _address: u32) -> Result<u16, EnvError> {
        Ok(0)
    }

    fn type_info(&self) -> &TypeInfo {
        &self.info
    }
}

/// A flat byte-addressed memory with named program values and debugger variables
/// layered on top. Used by the demo binary and tests in place of a simulator.
pub struct FlatEnvironment {
    memory: RwLock<Vec<u8>>,
    word_order: WordOrder,

    names: DashMap<String, Value>,

    debug_names: ThreadedRodeo<Spur>,
    debug_values: DashMap<u32, Value>,

    info: TypeInfo,
}

impl Default for FlatEnvironment {
    fn default() -> Self {
        Self::with_config(&Config::default())
    }
}

impl FlatEnvironment {
    pub fn with_config(config: &Config) -> FlatEnvironment {
        FlatEnvironment {
            memory: RwLock::new(vec![0; config.memory_size]),
            word_order: config.word_order,
            names: DashMap::new(),
            debug_names: ThreadedRodeo::new(),
            debug_values: DashMap::new(),
            info: TypeInfo::new(),
        }
    }

    pub fn memory_size(&self) -> usize {
        self.memory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn fill(&self, byte: u8) {
        let mut mem = self.memory.write().unwrap_or_else(PoisonError::into_inner);
        mem.iter_mut().for_each(|b| *b = byte);
    }

    pub fn write_mem_u8(&self, address: u32, byte: u8) -> Result<(), EnvError> {
        let mut mem = self.memory.write().unwrap_or_else(PoisonError::into_inner);
        match mem.get_mut(address as usize) {
            Some(slot) => {
                *slot = byte;
                Ok(())
            }
            None => Err(EnvError::MemoryUnavailable { address }),
        }
    }

    pub fn write_mem_u16(&self, address: u32, word: u16) -> Result<(), EnvError> {
        let bytes = match self.word_order {
            WordOrder::Big => word.to_be_bytes(),
            WordOrder::Little => word.to_le_bytes(),
        };
        self.write_mem_u8(address, bytes[0])?;
        self.write_mem_u8(address.wrapping_add(1), bytes[1])
    }

    pub fn set_named_value<V: Into<Value>>(&self, name: &str, value: V) {
        self.names.insert(name.to_owned(), value.into());
    }

    pub fn remove_named_value(&self, name: &str) {
        self.names.remove(name);
    }

    pub fn set_debug_value<V: Into<Value>>(&self, name: &str, value: V) {
        let handle = self.cache_debug_variable_name(name);
        self.debug_values.insert(handle, value.into());
    }
}

impl Environment for FlatEnvironment {
    fn resolve_named_value(&self, name: &str) -> Result<Value, EnvError> {
        Ok(self
            .names
            .get(name)
            .map(|v| *v.value())
            .unwrap_or(Value::Never))
    }

    fn cache_debug_variable_name(&self, name: &str) -> u32 {
        self.debug_names.get_or_intern(name).into_usize() as u32
    }

    fn resolve_debug_value(&self, handle: u32) -> Result<Value, EnvError> {
        Ok(self
            .debug_values
            .get(&handle)
            .map(|v| *v.value())
            .unwrap_or(Value::Never))
    }

    fn read_mem_u8(&self, address: u32) -> Result<u8, EnvError> {
        let mem = self.memory.read().unwrap_or_else(PoisonError::into_inner);
        mem.get(address as usize)
            .copied()
            .ok_or(EnvError::MemoryUnavailable { address })
    }

    fn read_mem_u16(&self, address: u32) -> Result<u16, EnvError> {
        let a = self.read_mem_u8(address)?;
        let b = self.read_mem_u8(address.wrapping_add(1))?;
        Ok(match self.word_order {
            WordOrder::Big => u16::from_be_bytes([a, b]),
            WordOrder::Little => u16::from_le_bytes([a, b]),
        })
    }

    fn read_mem_u32(&self, address: u32) -> Result<u32, EnvError> {
        let hi = self.read_mem_u16(address)? as u32;
        let lo = self.read_mem_u16(address.wrapping_add(2))? as u32;
        Ok(match self.word_order {
            WordOrder::Big => hi << 16 | lo,
            WordOrder::Little => lo << 16 | hi,
        })
    }

    fn type_info(&self) -> &TypeInfo {
        &self.info
    }
}

/// Read a primitive of type `ty` stored at `address`.
pub fn read_primitive(
    env: &dyn Environment,
    ty: Primitive,
    address: u32,
) -> Result<VPrimitive, EnvError> {
    let bits = match ty.bytes() {
        1 => env.read_mem_u8(address)? as u64,
        2 => env.read_mem_u16(address)? as u64,
        _ => env.read_mem_u32(address)? as u64,
    };
    Ok(VPrimitive::from(ty, bits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_words() {
        let env = FlatEnvironment::default();
        env.fill(7);
        assert_eq!(env.read_mem_u16(0), Ok(0x0707));
        env.write_mem_u8(0, 8).unwrap();
        assert_eq!(env.read_mem_u16(0), Ok(0x0807));
        env.write_mem_u16(4, 0x1234).unwrap();
        env.write_mem_u16(6, 0x5678).unwrap();
        assert_eq!(env.read_mem_u32(4), Ok(0x1234_5678));
    }

    #[test]
    fn little_endian_words() {
        let config = Config {
            word_order: WordOrder::Little,
            ..Config::default()
        };
        let env = FlatEnvironment::with_config(&config);
        env.write_mem_u8(0, 0x34).unwrap();
        env.write_mem_u8(1, 0x12).unwrap();
        assert_eq!(env.read_mem_u16(0), Ok(0x1234));
        env.write_mem_u16(2, 0x5678).unwrap();
        assert_eq!(env.read_mem_u32(0), Ok(0x5678_1234));
    }

    #[test]
    fn out_of_range_is_an_error() {
        let config = Config {
            memory_size: 4,
            ..Config::default()
        };
        let env = FlatEnvironment::with_config(&config);
        assert_eq!(
            env.read_mem_u16(3),
            Err(EnvError::MemoryUnavailable { address: 4 })
        );
        assert!(env.write_mem_u8(9, 1).is_err());
    }

    #[test]
    fn names_and_debug_values() {
        let env = FlatEnvironment::default();
        assert_eq!(env.resolve_named_value("x"), Ok(Value::Never));
        env.set_named_value("x", VPrimitive::i16(-3));
        assert_eq!(env.resolve_named_value("x"), Ok(VPrimitive::i16(-3).into()));

        let h = env.cache_debug_variable_name("sp");
        assert_eq!(env.cache_debug_variable_name("sp"), h);
        assert_eq!(env.resolve_debug_value(h), Ok(Value::Never));
        env.set_debug_value("sp", VPrimitive::from(Primitive::U16, 0xfb8f));
        assert_eq!(
            env.resolve_debug_value(h),
            Ok(VPrimitive::from(Primitive::U16, 0xfb8f).into())
        );
    }

    #[test]
    fn read_typed_primitive() {
        let env = FlatEnvironment::default();
        env.write_mem_u16(0, 0xfffe).unwrap();
        assert_eq!(read_primitive(&env, Primitive::I16, 0).unwrap().as_i64(), -2);
        assert_eq!(read_primitive(&env, Primitive::U8, 1).unwrap().as_u64(), 0xfe);
    }
}

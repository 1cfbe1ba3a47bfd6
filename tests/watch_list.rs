use std::cell::Cell;

use watchexpr::value::VPrimitive;
use watchexpr::{CachePolicy, Config, EnvError, Environment, FlatEnvironment, TypeInfo, Value, WatchList};

/// Counts reads of named values, leaving the rest to a flat environment.
#[derive(Default)]
struct CountingEnvironment {
    inner: FlatEnvironment,
    reads: Cell<usize>,
}

impl Environment for CountingEnvironment {
    fn resolve_named_value(&self, name: &str) -> Result<Value, EnvError> {
        self.reads.set(self.reads.get() + 1);
        self.inner.resolve_named_value(name)
    }

    fn cache_debug_variable_name(&self, name: &str) -> u32 {
        self.inner.cache_debug_variable_name(name)
    }

    fn resolve_debug_value(&self, handle: u32) -> Result<Value, EnvError> {
        self.inner.resolve_debug_value(handle)
    }

    fn read_mem_u8(&self, address: u32) -> Result<u8, EnvError> {
        self.inner.read_mem_u8(address)
    }

    fn read_mem_u16(&self, address: u32) -> Result<u16, EnvError> {
        self.inner.read_mem_u16(address)
    }

    fn type_info(&self) -> &TypeInfo {
        self.inner.type_info()
    }
}

fn values(list: &WatchList) -> Vec<String> {
    list.items().iter().map(|i| i.value_text()).collect()
}

#[test]
fn stepping_a_program() {
    let config = Config::default();
    let env = FlatEnvironment::with_config(&config);
    env.set_named_value("pc", VPrimitive::from(watchexpr::types::Primitive::U16, 0x100));
    env.set_debug_value("cycles", VPrimitive::i16(0));

    let mut list = WatchList::with_config(&config);
    list.add_item("pc + 2", &env);
    list.add_item("$cycles * 4", &env);
    list.add_item("*pc", &env);
    list.add_item("0x10 << 2", &env);
    assert_eq!(values(&list), vec!["258", "0", "0", "64"]);

    list.update_volatile_values(&env);
    list.update_volatile_values(&env);
    assert!(list.dirty_roots().is_empty());

    // one simulated step: the instruction at pc retired and the clock moved
    env.write_mem_u16(0x100, 0xbeef).unwrap();
    env.set_debug_value("cycles", VPrimitive::i16(3));
    list.update_volatile_values(&env);

    assert_eq!(list.dirty_roots(), vec![1, 2]);
    assert_eq!(values(&list), vec!["258", "12", "48879", "64"]);
    assert_eq!(list.items()[2].type_text(env.type_info()), "u16");
}

#[test]
fn edits_keep_the_list_consistent() {
    let env = FlatEnvironment::default();
    env.set_named_value("a", VPrimitive::i16(2));

    let mut list = WatchList::new();
    list.add_item("a * a", &env);
    list.add_item("(a", &env);
    assert_eq!(values(&list), vec!["4", "<invalid>"]);
    assert_eq!(list.items()[1].expression_text(), "(a");

    assert!(list.edit_term(1, "(a)", &env));
    assert!(list.edit_term(0, "-a", &env));
    assert_eq!(values(&list), vec!["-2", "2"]);

    // `a * a` and nothing else has gone
    assert_eq!(list.cache().len(), 3);

    env.set_named_value("a", VPrimitive::i16(5));
    list.update_volatile_values(&env);
    assert_eq!(values(&list), vec!["-5", "5"]);
    assert_eq!(list.dirty_roots(), vec![0, 1]);
}

#[test]
fn clean_policy_relies_on_dirty_marks() {
    let config = Config {
        refresh_policy: CachePolicy::UseIfClean,
        ..Config::default()
    };
    let env = FlatEnvironment::with_config(&config);
    env.set_named_value("x", VPrimitive::i16(1));
    env.set_named_value("y", VPrimitive::i16(1));

    let mut list = WatchList::with_config(&config);
    list.add_item("x + 100", &env);
    list.add_item("y + 100", &env);

    env.set_named_value("x", VPrimitive::i16(2));
    env.set_named_value("y", VPrimitive::i16(2));
    list.update_volatile_values(&env);

    // both leaves changed, so both rows were marked and recomputed
    assert_eq!(values(&list), vec!["102", "102"]);
}

#[test]
fn each_refresh_reads_a_shared_variable_once() {
    let env = CountingEnvironment::default();
    env.inner.set_named_value("x", VPrimitive::i16(3));

    let mut list = WatchList::new();
    list.add_item("x + 1", &env);
    list.add_item("x * 2", &env);
    list.add_item("(x + 1) * (x + 1)", &env);
    env.reads.set(0);

    list.update_volatile_values(&env);
    assert_eq!(env.reads.get(), 1);
    assert_eq!(values(&list), vec!["4", "6", "16"]);

    env.inner.set_named_value("x", VPrimitive::i16(4));
    list.update_volatile_values(&env);
    assert_eq!(env.reads.get(), 2);
    assert_eq!(values(&list), vec!["5", "8", "25"]);
    assert_eq!(list.dirty_roots(), vec![0, 1, 2]);
}

use std::sync::atomic::{AtomicU64, Ordering};

use strum_macros::{Display, EnumString};

use super::term::{BinaryOp, Term, TermKind, TermRef, UnaryOp};
use crate::env::Environment;
use crate::errors::EnvError;
use crate::ops;
use crate::value::Value;

/// When a node may hand back its cached value instead of recomputing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum CachePolicy {
    /// Always recompute.
    #[strum(serialize = "never")]
    UseNever,
    /// Reuse if the node is clean and nothing under it reads live state.
    #[strum(serialize = "non-volatile")]
    UseNonVolatiles,
    /// Reuse if the node is clean.
    #[strum(serialize = "clean")]
    UseIfClean,
    /// Reuse whatever is there, dirty or not.
    #[strum(serialize = "always")]
    UseAlways,
}

impl CachePolicy {
    pub fn permits_reuse(self, dirty: bool, depends_on_volatiles: bool) -> bool {
        match self {
            CachePolicy::UseNever => false,
            CachePolicy::UseNonVolatiles => !dirty && !depends_on_volatiles,
            CachePolicy::UseIfClean => !dirty,
            CachePolicy::UseAlways => true,
        }
    }
}

/// One pass of evaluation, e.g. a single root, or every root of one watch list
/// refresh. The environment is assumed not to change during a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Round(u64);

static NEXT_ROUND: AtomicU64 = AtomicU64::new(1);

impl Round {
    pub fn next() -> Round {
        Round(NEXT_ROUND.fetch_add(1, Ordering::Relaxed))
    }
}

/// Per-node evaluation state: the last value, a version that goes up each time
/// that value changes, and whether something under the node is known to have changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationCache {
    pub value: Option<Value>,
    pub version: u32,
    pub dirty: bool,
    pub(super) round: Option<Round>,
}

impl Term {
    pub fn mark_dirty(&self) {
        self.state.borrow_mut().dirty = true;
    }

    pub fn dirty(&self) -> bool {
        self.state.borrow().dirty
    }

    pub fn cache(&self) -> EvaluationCache {
        *self.state.borrow()
    }

    pub fn evaluator(self: &TermRef) -> CachedEvaluator {
        CachedEvaluator::new(self.clone())
    }

    /// Whether an indirect cast saw a different binding of its slot last time
    /// it ran than the one current now.
    fn indirect_stale(&self, env: &dyn Environment) -> bool {
        match self.kind() {
            TermKind::IndirectCast { to, .. } => {
                let current = env.type_info().indirect_type(*to).version;
                self.indirect_version.get() != Some(current)
            }
            _ => false,
        }
    }

    /// Evaluate this node, reusing cached results where `policy` allows. Each
    /// call is a fresh [`Round`].
    ///
    /// Environment failures are returned as-is and leave the node's cache
    /// untouched. Anything the operators can't make sense of comes back as
    /// `Value::Never`.
    pub fn evaluate(&self, policy: CachePolicy, env: &dyn Environment) -> Result<Value, EnvError> {
        self.evaluate_in(Round::next(), policy, env)
    }

    /// Evaluate as part of `round`. A node already computed in `round` answers
    /// from that computation whatever the policy, so a child shared by several
    /// parents is only forced once.
    pub fn evaluate_in(
        &self,
        round: Round,
        policy: CachePolicy,
        env: &dyn Environment,
    ) -> Result<Value, EnvError> {
        {
            let mut state = self.state.borrow_mut();
            if let Some(cached) = state.value {
                if state.round == Some(round) {
                    state.dirty = false;
                    return Ok(cached);
                }

                if policy.permits_reuse(state.dirty, self.depends_on_volatiles())
                    && !self.indirect_stale(env)
                {
                    return Ok(cached);
                }
            }
        }

        let value = self.compute(round, policy, env)?;

        let mut state = self.state.borrow_mut();
        if state.value != Some(value) {
            state.version = state.version.wrapping_add(1);
        }
        state.value = Some(value);
        state.dirty = false;
        state.round = Some(round);

        Ok(value)
    }

    /// Handles from `cache_debug_variable_name` only mean something to the
    /// environment that gave them out, which is told apart by its address.
    fn debug_handle(&self, env: &dyn Environment, name: &str) -> u32 {
        let key = env as *const dyn Environment as *const () as usize;

        if let Some(&(_, handle)) = self.debug_handles.borrow().iter().find(|(k, _)| *k == key) {
            return handle;
        }

        let handle = env.cache_debug_variable_name(name);
        self.debug_handles.borrow_mut().push((key, handle));
        handle
    }

    fn compute(&self, round: Round, policy: CachePolicy, env: &dyn Environment) -> Result<Value, EnvError> {
        let eval = |t: &TermRef| t.evaluate_in(round, policy, env);

        let value = match self.kind() {
            TermKind::Variable { name } => env.resolve_named_value(name)?,
            TermKind::DebuggerVariable { name } => {
                let handle = self.debug_handle(env, name);
                env.resolve_debug_value(handle)?
            }
            TermKind::Constant { value, .. } => Value::Primitive(*value),
            TermKind::UnaryPrefix { op, arg } => match op {
                // only `&*address` has an address to give back
                UnaryOp::AddressOf => match arg.kind() {
                    TermKind::MemoryRead { address } => eval(address)?,
                    _ => Value::Never,
                },
                UnaryOp::Plus => ops::op1_plus(eval(arg)?),
                UnaryOp::Minus => ops::op1_minus(eval(arg)?),
                UnaryOp::Not => ops::op1_not(eval(arg)?),
                UnaryOp::Negate => ops::op1_negate(eval(arg)?),
            },
            TermKind::BinaryInfix { op, lhs, rhs } => {
                let l = eval(lhs)?;
                let r = eval(rhs)?;
                apply_binary(*op, l, r)
            }
            TermKind::MemberAccess { lhs, field, .. } => {
                let base = eval(lhs)?;
                ops::op2_member(env, base, field)?
            }
            TermKind::MemoryRead { address } => {
                let address = eval(address)?;
                ops::op1_dereference(env, address)?
            }
            TermKind::Parenthesized { inner } => eval(inner)?,
            TermKind::DirectCast { to, arg, .. } => {
                let v = eval(arg)?;
                ops::op2_typecast(env.type_info(), v, *to)
            }
            TermKind::IndirectCast { to, arg, .. } => {
                let v = eval(arg)?;
                let bound = env.type_info().indirect_type(*to);
                self.indirect_version.set(Some(bound.version));
                ops::op2_typecast(env.type_info(), v, bound.ty)
            }
        };

        Ok(value)
    }
}

pub fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Value {
    match op {
        BinaryOp::Multiply => ops::op2_mul(lhs, rhs),
        BinaryOp::Divide => ops::op2_div(lhs, rhs),
        BinaryOp::Modulo => ops::op2_mod(lhs, rhs),
        BinaryOp::Add => ops::op2_add(lhs, rhs),
        BinaryOp::Subtract => ops::op2_sub(lhs, rhs),
        BinaryOp::ShiftLeft => ops::op2_bsl(lhs, rhs),
        BinaryOp::ShiftRight => ops::op2_bsr(lhs, rhs),
        BinaryOp::Less => ops::op2_lt(lhs, rhs),
        BinaryOp::LessOrEqual => ops::op2_le(lhs, rhs),
        BinaryOp::Equal => ops::op2_eq(lhs, rhs),
        BinaryOp::NotEqual => ops::op2_ne(lhs, rhs),
        BinaryOp::Greater => ops::op2_gt(lhs, rhs),
        BinaryOp::GreaterOrEqual => ops::op2_ge(lhs, rhs),
        BinaryOp::BitAnd => ops::op2_bitand(lhs, rhs),
        BinaryOp::BitOr => ops::op2_bitor(lhs, rhs),
        BinaryOp::BitXor => ops::op2_bitxor(lhs, rhs),
    }
}

/// Mark `term` dirty, then walk up through its dependents marking each of them.
/// A dependent that is already dirty has been walked before and is skipped,
/// which also keeps a node reachable along two paths from being visited twice.
pub fn mark_parents_dirty(term: &Term) {
    term.mark_dirty();

    for parent in term.dependents() {
        if !parent.dirty() {
            mark_parents_dirty(&parent);
        }
    }
}

/// A term together with the cache as it looked the last time *this* evaluator
/// ran it. The term's own cache may move on in the meantime, when other roots
/// share it, so comparing against the snapshot tells whether the value changed
/// from this observer's point of view.
#[derive(Debug, Clone)]
pub struct CachedEvaluator {
    term: TermRef,
    cache: EvaluationCache,
}

impl CachedEvaluator {
    pub fn new(term: TermRef) -> CachedEvaluator {
        CachedEvaluator {
            cache: term.cache(),
            term,
        }
    }

    pub fn term(&self) -> &TermRef {
        &self.term
    }

    pub fn cache(&self) -> EvaluationCache {
        self.cache
    }

    /// Dirty if the term is, or its value moved on since we last looked.
    pub fn dirty(&self) -> bool {
        self.term.dirty() || self.term.cache().version != self.cache.version
    }

    pub fn evaluate(&mut self, policy: CachePolicy, env: &dyn Environment) -> Result<Value, EnvError> {
        self.evaluate_in(Round::next(), policy, env)
    }

    pub fn evaluate_in(
        &mut self,
        round: Round,
        policy: CachePolicy,
        env: &dyn Environment,
    ) -> Result<Value, EnvError> {
        let value = self.term.evaluate_in(round, policy, env)?;
        self.cache = self.term.cache();
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::ast::ExpressionCache;
    use crate::env::{FlatEnvironment, ZeroEnvironment};
    use crate::lex::ConstantFormat;
    use crate::types::{Primitive, TypeInfo};
    use crate::value::VPrimitive;

    /// Counts how often named values are read.
    #[derive(Default)]
    struct CountingEnvironment {
        inner: FlatEnvironment,
        reads: Cell<usize>,
    }

    impl CountingEnvironment {
        fn take_reads(&self) -> usize {
            self.reads.replace(0)
        }
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

    fn i16c(cache: &ExpressionCache, v: i16) -> TermRef {
        cache.constant(VPrimitive::i16(v), ConstantFormat::Dec)
    }

    #[test]
    fn reuse_table() {
        use CachePolicy::*;
        assert!(!UseNever.permits_reuse(false, false));
        assert!(UseNonVolatiles.permits_reuse(false, false));
        assert!(!UseNonVolatiles.permits_reuse(false, true));
        assert!(!UseNonVolatiles.permits_reuse(true, false));
        assert!(UseIfClean.permits_reuse(false, true));
        assert!(!UseIfClean.permits_reuse(true, false));
        assert!(UseAlways.permits_reuse(true, true));
    }

    #[test]
    fn version_bumps_only_on_change() {
        let cache = ExpressionCache::new();
        let env = FlatEnvironment::default();
        let x = cache.variable("x");

        env.set_named_value("x", VPrimitive::i16(1));
        x.evaluate(CachePolicy::UseNever, &env).unwrap();
        assert_eq!(x.cache().version, 1);

        x.evaluate(CachePolicy::UseNever, &env).unwrap();
        assert_eq!(x.cache().version, 1);

        env.set_named_value("x", VPrimitive::i16(2));
        x.evaluate(CachePolicy::UseNever, &env).unwrap();
        assert_eq!(x.cache().version, 2);
    }

    #[test]
    fn dirty_is_cleared_by_evaluation_only() {
        let cache = ExpressionCache::new();
        let env = ZeroEnvironment::new();
        let x = cache.variable("x");
        let top = cache.binary(BinaryOp::Add, x.clone(), i16c(&cache, 1));
        top.evaluate(CachePolicy::UseNonVolatiles, &env).unwrap();

        mark_parents_dirty(&x);
        assert!(top.dirty());
        top.evaluate(CachePolicy::UseAlways, &env).unwrap();
        // reused the dirty value, so nothing was recomputed
        assert!(top.dirty());
        top.evaluate(CachePolicy::UseIfClean, &env).unwrap();
        assert!(!top.dirty());
        assert!(!x.dirty());
    }

    #[test]
    fn recursive_dirtying() {
        // mirrors `m * x + -b` with b changing
        let cache = ExpressionCache::new();
        let env = ZeroEnvironment::new();
        let m = cache.variable("m");
        let x = cache.variable("x");
        let b = cache.variable("b");
        let mx = cache.binary(BinaryOp::Multiply, m.clone(), x.clone());
        let negb = cache.unary(UnaryOp::Minus, b.clone());
        let top = cache.binary(BinaryOp::Add, mx.clone(), negb.clone());
        top.evaluate(CachePolicy::UseNever, &env).unwrap();

        b.mark_dirty();
        assert!(b.dirty());
        assert!(!negb.dirty());
        assert!(!top.dirty());

        mark_parents_dirty(&b);
        assert!(b.dirty() && negb.dirty() && top.dirty());
        assert!(!m.dirty() && !x.dirty() && !mx.dirty());

        top.evaluate(CachePolicy::UseNever, &env).unwrap();
        assert!(!top.dirty() && !negb.dirty() && !b.dirty());
    }

    #[test]
    fn memory_policies() {
        let cache = ExpressionCache::new();
        let env = FlatEnvironment::default();
        env.fill(7);
        let read = cache.memory_read(i16c(&cache, 0));

        let first = read.evaluate(CachePolicy::UseNonVolatiles, &env).unwrap();
        assert_eq!(first.bits(), 0x0707);

        env.write_mem_u8(0, 8).unwrap();
        assert_eq!(
            read.evaluate(CachePolicy::UseAlways, &env).unwrap().bits(),
            0x0707
        );
        assert_eq!(
            read.evaluate(CachePolicy::UseNonVolatiles, &env).unwrap().bits(),
            0x0807
        );
    }

    #[test]
    fn address_of_memory_read() {
        let cache = ExpressionCache::new();
        let env = FlatEnvironment::default();
        let addr = i16c(&cache, 0x10);
        let taken = cache.unary(UnaryOp::AddressOf, cache.memory_read(addr));
        assert_eq!(
            taken.evaluate(CachePolicy::UseNever, &env),
            Ok(VPrimitive::i16(0x10).into())
        );

        let not_an_lvalue = cache.unary(UnaryOp::AddressOf, cache.variable("x"));
        assert_eq!(
            not_an_lvalue.evaluate(CachePolicy::UseNever, &env),
            Ok(Value::Never)
        );
    }

    #[test]
    fn indirect_cast_tracks_rebinding() {
        let cache = ExpressionCache::new();
        let env = FlatEnvironment::default();
        let info = env.type_info();
        let (_, slot) = info.register_indirect("T");
        info.set_indirect_type(slot, info.type_from(Primitive::U8));

        let cast = cache.indirect_cast(slot, "T", i16c(&cache, 300));
        assert_eq!(
            cast.evaluate(CachePolicy::UseAlways, &env),
            Ok(VPrimitive::from(Primitive::U8, 44).into())
        );

        info.set_indirect_type(slot, info.type_from(Primitive::I16));
        // even the most permissive policy notices the rebinding
        assert_eq!(
            cast.evaluate(CachePolicy::UseAlways, &env),
            Ok(VPrimitive::i16(300).into())
        );
    }

    #[test]
    fn env_errors_propagate() {
        let cache = ExpressionCache::new();
        let env = FlatEnvironment::with_config(&crate::config::Config {
            memory_size: 1,
            ..Default::default()
        });
        let read = cache.memory_read(i16c(&cache, 0));
        let top = cache.binary(BinaryOp::Add, read, i16c(&cache, 1));
        assert_eq!(
            top.evaluate(CachePolicy::UseNever, &env),
            Err(EnvError::MemoryUnavailable { address: 1 })
        );
        assert_eq!(top.cache().value, None);
    }

    #[test]
    fn cached_evaluator_snapshots() {
        let cache = ExpressionCache::new();
        let env = FlatEnvironment::default();
        let x = cache.variable("x");
        env.set_named_value("x", VPrimitive::i16(5));

        let mut ev = x.evaluator();
        ev.evaluate(CachePolicy::UseNonVolatiles, &env).unwrap();
        assert!(!ev.dirty());

        // someone else observes a new value
        env.set_named_value("x", VPrimitive::i16(6));
        x.evaluate(CachePolicy::UseNever, &env).unwrap();
        assert!(ev.dirty());
        assert_eq!(ev.cache().value, Some(VPrimitive::i16(5).into()));

        ev.evaluate(CachePolicy::UseNonVolatiles, &env).unwrap();
        assert!(!ev.dirty());
    }

    #[test]
    fn shared_children_are_read_once_per_round() {
        let cache = ExpressionCache::new();
        let env = CountingEnvironment::default();
        env.inner.set_named_value("x", VPrimitive::i16(3));

        let x = cache.variable("x");
        let square = cache.binary(BinaryOp::Multiply, x.clone(), x.clone());
        assert_eq!(
            square.evaluate(CachePolicy::UseNonVolatiles, &env),
            Ok(VPrimitive::i16(9).into())
        );
        assert_eq!(env.take_reads(), 1);

        // `(x + 1) * (x + 1)` shares the whole parenthesized sum
        let sum = cache.parenthesized(cache.binary(BinaryOp::Add, x.clone(), i16c(&cache, 1)));
        let product = cache.binary(BinaryOp::Multiply, sum.clone(), sum);
        assert_eq!(
            product.evaluate(CachePolicy::UseNonVolatiles, &env),
            Ok(VPrimitive::i16(16).into())
        );
        assert_eq!(env.take_reads(), 1);

        // a new round reads again
        env.inner.set_named_value("x", VPrimitive::i16(4));
        assert_eq!(
            product.evaluate(CachePolicy::UseNever, &env),
            Ok(VPrimitive::i16(25).into())
        );
        assert_eq!(env.take_reads(), 1);
    }

    #[test]
    fn roots_in_one_round_share_reads() {
        let cache = ExpressionCache::new();
        let env = CountingEnvironment::default();
        env.inner.set_named_value("x", VPrimitive::i16(2));

        let x = cache.variable("x");
        let a = cache.binary(BinaryOp::Add, x.clone(), i16c(&cache, 1));
        let b = cache.binary(BinaryOp::Multiply, x.clone(), i16c(&cache, 5));

        let round = Round::next();
        let mut first = a.evaluator();
        first.evaluate_in(round, CachePolicy::UseNonVolatiles, &env).unwrap();
        b.evaluate_in(round, CachePolicy::UseNonVolatiles, &env).unwrap();
        assert_eq!(env.take_reads(), 1);

        // a dirty mark inside the round doesn't force a second read
        mark_parents_dirty(&x);
        assert_eq!(
            a.evaluate_in(round, CachePolicy::UseIfClean, &env),
            Ok(VPrimitive::i16(3).into())
        );
        assert_eq!(env.take_reads(), 0);
        assert!(!a.dirty());
        assert!(!first.dirty());
    }

    #[test]
    fn debug_handles_belong_to_their_environment() {
        let cache = ExpressionCache::new();
        let first = FlatEnvironment::default();
        let second = FlatEnvironment::default();

        // `a` gets a different handle in each environment
        first.set_debug_value("cycles", VPrimitive::i16(0));
        first.set_debug_value("a", VPrimitive::i16(1));
        second.set_debug_value("a", VPrimitive::i16(2));

        let a = cache.debugger_variable("a");
        assert_eq!(
            a.evaluate(CachePolicy::UseNever, &first),
            Ok(VPrimitive::i16(1).into())
        );
        assert_eq!(
            a.evaluate(CachePolicy::UseNever, &second),
            Ok(VPrimitive::i16(2).into())
        );
        assert_eq!(
            a.evaluate(CachePolicy::UseNever, &first),
            Ok(VPrimitive::i16(1).into())
        );
    }
}

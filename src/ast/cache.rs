use std::borrow::Borrow;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::rc::Rc;

use super::term::{BinaryOp, MemberOp, Term, TermKind, TermRef, UnaryOp};
use crate::lex::ConstantFormat;
use crate::types::{DirectHandle, IndirectHandle};
use crate::value::VPrimitive;

/// Index entry; orders by the structure of the term it holds.
struct Interned(TermRef);

impl Borrow<Term> for Interned {
    fn borrow(&self) -> &Term {
        &self.0
    }
}

impl PartialEq for Interned {
    fn eq(&self, other: &Self) -> bool {
        *self.0 == *other.0
    }
}

impl Eq for Interned {}

impl PartialOrd for Interned {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Interned {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// Owns every term built for one debug session and hands out shared references.
///
/// Building a term that is structurally equal to one already held returns the
/// existing node, so identical text compiles to the identical tree. Terms that
/// nothing outside the cache refers to any more are only released by
/// [`collect_garbage`](ExpressionCache::collect_garbage).
#[derive(Default)]
pub struct ExpressionCache {
    terms: RefCell<BTreeSet<Interned>>,
}

impl ExpressionCache {
    pub fn new() -> ExpressionCache {
        Self::default()
    }

    /// Return the interned node for `kind`, creating and linking it if it is new.
    pub fn add_or_return(&self, kind: TermKind) -> TermRef {
        let candidate = Term::new(kind);

        if let Some(existing) = self.terms.borrow().get(&candidate) {
            tracing::trace!("expression cache hit for {candidate}");
            return existing.0.clone();
        }

        tracing::trace!("expression cache miss for {candidate}");

        let term = Rc::new(candidate);
        term.link();
        self.terms.borrow_mut().insert(Interned(term.clone()));

        term
    }

    /// Drop every term that only the cache itself still holds. Removing a term
    /// can orphan its children, so this repeats until nothing more goes away.
    /// Returns how many terms were released.
    pub fn collect_garbage(&self) -> usize {
        let mut terms = self.terms.borrow_mut();
        let before = terms.len();

        loop {
            let round_start = terms.len();
            terms.retain(|t| Rc::strong_count(&t.0) > 1);
            if terms.len() == round_start {
                break;
            }
        }

        for t in terms.iter() {
            t.0.prune_dependents();
        }

        let released = before - terms.len();
        tracing::debug!(
            "expression cache released {released} terms, {} remain",
            terms.len()
        );

        released
    }

    pub fn len(&self) -> usize {
        self.terms.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.borrow().is_empty()
    }

    pub fn contains(&self, term: &Term) -> bool {
        self.terms
            .borrow()
            .get(term)
            .map(|t| std::ptr::eq(&*t.0, term))
            .unwrap_or(false)
    }

    pub fn variable(&self, name: &str) -> TermRef {
        self.add_or_return(TermKind::Variable { name: name.into() })
    }

    pub fn debugger_variable(&self, name: &str) -> TermRef {
        self.add_or_return(TermKind::DebuggerVariable { name: name.into() })
    }

    pub fn constant(&self, value: VPrimitive, format: ConstantFormat) -> TermRef {
        self.add_or_return(TermKind::Constant { value, format })
    }

    pub fn unary(&self, op: UnaryOp, arg: TermRef) -> TermRef {
        self.add_or_return(TermKind::UnaryPrefix { op, arg })
    }

    pub fn binary(&self, op: BinaryOp, lhs: TermRef, rhs: TermRef) -> TermRef {
        self.add_or_return(TermKind::BinaryInfix { op, lhs, rhs })
    }

    pub fn member(&self, op: MemberOp, lhs: TermRef, field: &str) -> TermRef {
        self.add_or_return(TermKind::MemberAccess {
            op,
            lhs,
            field: field.into(),
        })
    }

    pub fn memory_read(&self, address: TermRef) -> TermRef {
        self.add_or_return(TermKind::MemoryRead { address })
    }

    pub fn parenthesized(&self, inner: TermRef) -> TermRef {
        self.add_or_return(TermKind::Parenthesized { inner })
    }

    /// `label` is what the cast prints as, e.g. `u8` for `(u8)x`.
    pub fn direct_cast(&self, to: DirectHandle, label: &str, arg: TermRef) -> TermRef {
        self.add_or_return(TermKind::DirectCast {
            to,
            label: label.into(),
            arg,
        })
    }

    pub fn indirect_cast(&self, to: IndirectHandle, name: &str, arg: TermRef) -> TermRef {
        self.add_or_return(TermKind::IndirectCast {
            to,
            name: name.into(),
            arg,
        })
    }
}

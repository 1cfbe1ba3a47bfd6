use rustc_hash::FxHashSet;

use crate::ast::{CvQualifiers, Term, TermKind, TermRef, UnaryOp};

/// What a visitor wants to happen after seeing a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Continue,
    SkipChildren,
    Stop,
}

pub trait TermVisitor {
    fn visit(&mut self, term: &TermRef) -> Walk;
}

/// Pre-order walk over `root`, children left to right. Shared subterms are
/// visited once per path that reaches them; visitors that care dedup themselves.
pub fn walk(root: &TermRef, visitor: &mut dyn TermVisitor) {
    let mut stack = vec![root.clone()];

    while let Some(term) = stack.pop() {
        match visitor.visit(&term) {
            Walk::Stop => return,
            Walk::SkipChildren => continue,
            Walk::Continue => {
                // reversed so the leftmost child comes off the stack first
                for child in term.children().into_iter().rev() {
                    stack.push(child.clone());
                }
            }
        }
    }
}

#[derive(Default)]
struct VolatileGatherer {
    seen: FxHashSet<*const Term>,
    found: Vec<TermRef>,
}

impl TermVisitor for VolatileGatherer {
    fn visit(&mut self, term: &TermRef) -> Walk {
        if !self.seen.insert(TermRef::as_ptr(term)) {
            return Walk::SkipChildren;
        }

        if term.cv_qualifiers().contains(CvQualifiers::VOLATILE) {
            self.found.push(term.clone());
        }

        if term.depends_on_volatiles() {
            Walk::Continue
        } else {
            Walk::SkipChildren
        }
    }
}

/// Every volatile subterm reachable from `roots`, each exactly once, in the
/// order first met.
pub fn gather_volatiles<'a, I>(roots: I) -> Vec<TermRef>
where
    I: IntoIterator<Item = &'a TermRef>,
{
    let mut gatherer = VolatileGatherer::default();
    for root in roots {
        walk(root, &mut gatherer);
    }

    gatherer.found
}

struct ConstantChecker {
    constant: bool,
}

impl TermVisitor for ConstantChecker {
    fn visit(&mut self, term: &TermRef) -> Walk {
        let live = match term.kind() {
            TermKind::Variable { .. }
            | TermKind::DebuggerVariable { .. }
            | TermKind::MemoryRead { .. }
            | TermKind::MemberAccess { .. }
            | TermKind::IndirectCast { .. } => true,
            TermKind::UnaryPrefix { op, .. } => *op == UnaryOp::AddressOf,
            TermKind::Constant { .. }
            | TermKind::BinaryInfix { .. }
            | TermKind::Parenthesized { .. }
            | TermKind::DirectCast { .. } => false,
        };

        if live {
            self.constant = false;
            Walk::Stop
        } else {
            Walk::Continue
        }
    }
}

/// Whether `term` folds to the same value no matter what the debuggee does.
pub fn is_constant_expression(term: &TermRef) -> bool {
    let mut checker = ConstantChecker { constant: true };
    walk(term, &mut checker);
    checker.constant
}

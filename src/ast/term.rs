use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Write};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use strum_macros::Display as StrumDisplay;

use super::eval::EvaluationCache;
use crate::lex::ConstantFormat;
use crate::types::{DirectHandle, IndirectHandle, Primitive};
use crate::value::VPrimitive;

pub type TermRef = Rc<Term>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, StrumDisplay)]
pub enum TermType {
    Variable,
    DebuggerVariable,
    Constant,
    UnaryPrefix,
    BinaryInfix,
    MemberAccess,
    MemoryRead,
    Parenthesized,
    DirectCast,
    IndirectCast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, StrumDisplay)]
pub enum UnaryOp {
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "&")]
    AddressOf,
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "~")]
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, StrumDisplay)]
pub enum BinaryOp {
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "<<")]
    ShiftLeft,
    #[strum(serialize = ">>")]
    ShiftRight,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessOrEqual,
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterOrEqual,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "^")]
    BitXor,
}

/// `.` and `->` evaluate identically and only differ in how they print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, StrumDisplay)]
pub enum MemberOp {
    #[strum(serialize = ".")]
    Dot,
    #[strum(serialize = "->")]
    Arrow,
}

/// The shape of one node. Children are held strongly; the derived ordering
/// compares the variant first and then each field in turn, with children compared
/// structurally. That ordering is what the expression cache deduplicates by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum TermKind {
    Variable {
        name: Rc<str>,
    },
    DebuggerVariable {
        name: Rc<str>,
    },
    Constant {
        value: VPrimitive,
        format: ConstantFormat,
    },
    UnaryPrefix {
        op: UnaryOp,
        arg: TermRef,
    },
    BinaryInfix {
        op: BinaryOp,
        lhs: TermRef,
        rhs: TermRef,
    },
    MemberAccess {
        op: MemberOp,
        lhs: TermRef,
        field: Rc<str>,
    },
    MemoryRead {
        address: TermRef,
    },
    Parenthesized {
        inner: TermRef,
    },
    DirectCast {
        to: DirectHandle,
        label: Rc<str>,
        arg: TermRef,
    },
    IndirectCast {
        to: IndirectHandle,
        name: Rc<str>,
        arg: TermRef,
    },
}

impl TermKind {
    pub fn term_type(&self) -> TermType {
        match self {
            TermKind::Variable { .. } => TermType::Variable,
            TermKind::DebuggerVariable { .. } => TermType::DebuggerVariable,
            TermKind::Constant { .. } => TermType::Constant,
            TermKind::UnaryPrefix { .. } => TermType::UnaryPrefix,
            TermKind::BinaryInfix { .. } => TermType::BinaryInfix,
            TermKind::MemberAccess { .. } => TermType::MemberAccess,
            TermKind::MemoryRead { .. } => TermType::MemoryRead,
            TermKind::Parenthesized { .. } => TermType::Parenthesized,
            TermKind::DirectCast { .. } => TermType::DirectCast,
            TermKind::IndirectCast { .. } => TermType::IndirectCast,
        }
    }

    pub fn children(&self) -> SmallVec<[&TermRef; 2]> {
        let mut v = SmallVec::new();
        match self {
            TermKind::Variable { .. }
            | TermKind::DebuggerVariable { .. }
            | TermKind::Constant { .. } => {}
            TermKind::UnaryPrefix { arg, .. }
            | TermKind::DirectCast { arg, .. }
            | TermKind::IndirectCast { arg, .. } => v.push(arg),
            TermKind::MemberAccess { lhs, .. } => v.push(lhs),
            TermKind::MemoryRead { address } => v.push(address),
            TermKind::Parenthesized { inner } => v.push(inner),
            TermKind::BinaryInfix { lhs, rhs, .. } => {
                v.push(lhs);
                v.push(rhs);
            }
        }
        v
    }

    /// Whether this node reads live state by itself, regardless of its children.
    fn reads_live_state(&self) -> bool {
        matches!(
            self,
            TermKind::Variable { .. }
                | TermKind::DebuggerVariable { .. }
                | TermKind::MemoryRead { .. }
                | TermKind::MemberAccess { .. }
                | TermKind::IndirectCast { .. }
        )
    }

    /// Whether this node could fold to a constant, given that all of its
    /// children do.
    fn foldable(&self) -> bool {
        match self {
            TermKind::Constant { .. }
            | TermKind::BinaryInfix { .. }
            | TermKind::Parenthesized { .. }
            | TermKind::DirectCast { .. } => true,
            TermKind::UnaryPrefix { op, .. } => *op != UnaryOp::AddressOf,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CvQualifiers(u8);

impl CvQualifiers {
    pub const NONE: CvQualifiers = CvQualifiers(0);
    /// May change without the evaluator being involved.
    pub const VOLATILE: CvQualifiers = CvQualifiers(1);
    /// Folds to a value with no external input.
    pub const CONSTANT: CvQualifiers = CvQualifiers(2);

    pub fn contains(self, other: CvQualifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: CvQualifiers) -> CvQualifiers {
        CvQualifiers(self.0 | other.0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl Debug for CvQualifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if self.contains(CvQualifiers::VOLATILE) {
            parts.push("volatile");
        }
        if self.contains(CvQualifiers::CONSTANT) {
            parts.push("constant");
        }
        write!(f, "CvQualifiers({})", parts.join("|"))
    }
}

/// One node of a watch expression.
///
/// Nodes are immutable once built and shared between every expression that
/// contains them. Only the evaluation state and the list of dependents change,
/// and the dependents are filled in exactly once by [`Term::link`].
pub struct Term {
    kind: TermKind,
    cv: CvQualifiers,
    depends_on_volatiles: bool,
    depth: u16,

    pub(super) state: RefCell<EvaluationCache>,
    pub(super) indirect_version: Cell<Option<u32>>,
    /// `$name` handles, per environment that issued them.
    pub(super) debug_handles: RefCell<SmallVec<[(usize, u32); 1]>>,

    dependents: RefCell<SmallVec<[Weak<Term>; 2]>>,
    linked: Cell<bool>,
}

impl Term {
    pub fn new(kind: TermKind) -> Term {
        let children = kind.children();

        let depth = children
            .iter()
            .map(|c| c.depth + 1)
            .max()
            .unwrap_or(0);

        let depends_on_volatiles =
            kind.reads_live_state() || children.iter().any(|c| c.depends_on_volatiles);

        let mut cv = CvQualifiers::NONE;
        if kind.reads_live_state() {
            cv = cv.union(CvQualifiers::VOLATILE);
        }
        if kind.foldable()
            && children
                .iter()
                .all(|c| c.cv.contains(CvQualifiers::CONSTANT))
        {
            cv = cv.union(CvQualifiers::CONSTANT);
        }

        drop(children);

        Term {
            kind,
            cv,
            depends_on_volatiles,
            depth,
            state: RefCell::new(EvaluationCache::default()),
            indirect_version: Cell::new(None),
            debug_handles: RefCell::new(SmallVec::new()),
            dependents: RefCell::new(SmallVec::new()),
            linked: Cell::new(false),
        }
    }

    pub fn kind(&self) -> &TermKind {
        &self.kind
    }

    pub fn term_type(&self) -> TermType {
        self.kind.term_type()
    }

    pub fn depth(&self) -> u16 {
        self.depth
    }

    pub fn cv_qualifiers(&self) -> CvQualifiers {
        self.cv
    }

    pub fn depends_on_volatiles(&self) -> bool {
        self.depends_on_volatiles
    }

    pub fn children(&self) -> SmallVec<[&TermRef; 2]> {
        self.kind.children()
    }

    /// Register `self` as a dependent of each of its children. Happens once, when
    /// the node is first interned.
    pub fn link(self: &Rc<Self>) {
        let already = self.linked.replace(true);
        assert!(!already, "term {self} was linked twice");

        for child in self.kind.children() {
            child.dependents.borrow_mut().push(Rc::downgrade(self));
        }
    }

    pub fn is_linked(&self) -> bool {
        self.linked.get()
    }

    /// Every live term that has `self` as a direct child.
    pub fn dependents(&self) -> Vec<TermRef> {
        self.dependents
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// True iff `parent` uses `self` as a direct child.
    pub fn dependency_of(&self, parent: &Term) -> bool {
        self.dependents
            .borrow()
            .iter()
            .any(|w| std::ptr::eq(w.as_ptr(), parent))
    }

    /// Drop back references to terms that no longer exist.
    pub(super) fn prune_dependents(&self) {
        self.dependents
            .borrow_mut()
            .retain(|w| w.strong_count() > 0);
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Term {}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        if std::ptr::eq(self, other) {
            // interned subtrees are usually the very same node
            Ordering::Equal
        } else {
            self.kind.cmp(&other.kind)
        }
    }
}

impl Debug for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({self})", self.term_type())
    }
}

fn render_constant(f: &mut std::fmt::Formatter<'_>, value: VPrimitive, format: ConstantFormat) -> std::fmt::Result {
    match format {
        ConstantFormat::Hex => {
            let mask = match value.ty.bitness() {
                64 => u64::MAX,
                n => (1u64 << n) - 1,
            };
            write!(f, "0x{:x}", value.bits & mask)?;
        }
        ConstantFormat::Dec => write!(f, "{value}")?,
    }

    match value.ty {
        Primitive::I16 => Ok(()),
        other => write!(f, "_{other}"),
    }
}

/// Canonical text of an expression. Parsing it again gives back an equal term.
impl Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TermKind::Variable { name } => write!(f, "{name}"),
            TermKind::DebuggerVariable { name } => write!(f, "${name}"),
            TermKind::Constant { value, format } => render_constant(f, *value, *format),
            TermKind::UnaryPrefix { op, arg } => {
                let inner = arg.to_string();
                // keep `- 4` from reading back as the literal `-4`
                let glued = inner.starts_with(|c: char| c.is_ascii_digit() || c == '+' || c == '-');
                if glued && matches!(op, UnaryOp::Plus | UnaryOp::Minus) {
                    write!(f, "{op} {inner}")
                } else {
                    write!(f, "{op}{inner}")
                }
            }
            TermKind::BinaryInfix { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
            TermKind::MemberAccess { op, lhs, field } => write!(f, "{lhs}{op}{field}"),
            TermKind::MemoryRead { address } => {
                f.write_char('*')?;
                write!(f, "{address}")
            }
            TermKind::Parenthesized { inner } => write!(f, "({inner})"),
            TermKind::DirectCast { label, arg, .. } => write!(f, "({label}){arg}"),
            TermKind::IndirectCast { name, arg, .. } => write!(f, "({name}){arg}"),
        }
    }
}

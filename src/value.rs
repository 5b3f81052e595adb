//! Values of the semantic domain.
//!
//! A [`Value`] is what a [`Term`](crate::Term) evaluates to. It mirrors the
//! term language, except that every binder is represented by a [`Closure`]
//! capturing the environment it was evaluated in; applying the closure
//! re-enters the evaluator, which performs β-reduction transparently.
//! A value with no closures left to apply and no redexes left to fire is in
//! normal form; a value stuck on a free variable or an unsaturated builtin
//! is neutral.

use crate::term::{Builtin, Double, FieldMap, Integer, Label, Natural, OpCode, Term, TextLit, Var};
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;
use im::Vector;

/// Pointer to a shared value.
#[derive(Clone, Debug)]
pub struct RValue(Rc<Value>);

impl RValue {
    /// Create a value pointer from a value.
    pub fn new(v: Value) -> Self {
        Self(Rc::new(v))
    }

    /// Compare the memory addresses of two value pointers.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl core::ops::Deref for RValue {
    type Target = Value;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Value> for RValue {
    fn from(v: Value) -> Self {
        Self::new(v)
    }
}

/// Evaluation environment: for each label, the stack of values bound to it,
/// innermost first, so that `Var { name, index }` resolves to `env[name][index]`.
///
/// The immutable map makes the clone captured by every [`Closure`] cheap.
pub type Env = im::HashMap<Label, Vector<RValue>, fnv::FnvBuildHasher>;

/// Extend an environment with one binding, shadowing earlier ones.
pub(crate) fn env_insert(env: &Env, label: &str, v: RValue) -> Env {
    let mut stack = env.get(label).cloned().unwrap_or_default();
    stack.push_front(v);
    env.update(label.into(), stack)
}

/// Look up a variable; `None` means the variable is free.
pub(crate) fn env_lookup(env: &Env, var: &Var) -> Option<RValue> {
    env.get(&var.name).and_then(|stack| stack.get(var.index)).cloned()
}

/// Body of a binder, suspended together with its captured environment.
///
/// Entering the closure extends the environment with the argument under
/// `label` and re-runs the evaluator on the body.
#[derive(Clone, Debug)]
pub struct Closure {
    pub(crate) label: Label,
    pub(crate) env: Env,
    pub(crate) body: Rc<Term>,
    pub(crate) alpha: bool,
}

impl Closure {
    pub(crate) fn new(label: impl Into<Label>, env: Env, body: Rc<Term>, alpha: bool) -> Self {
        let label = label.into();
        Self {
            label,
            env,
            body,
            alpha,
        }
    }

    /// β-reduce: bind the argument and evaluate the suspended body.
    pub fn apply(&self, arg: RValue) -> Value {
        let env = env_insert(&self.env, &self.label, arg);
        crate::kernel::eval_with(&self.body, &env, self.alpha)
    }
}

/// Value of the semantic domain.
#[derive(Clone, Debug)]
pub enum Value {
    Universe(crate::Universe),
    /// Builtin constant, or a primitive function awaiting its first argument.
    Builtin(Builtin),
    /// Free variable (neutral).
    Var(Var),
    /// Type-checking variable (neutral).
    LocalVar(Var),
    /// Fresh variable standing for a bound variable at a given de Bruijn
    /// *level*; introduced only while quoting or comparing closures.
    QuoteVar(Var),
    Lam {
        /// Binder label as it should be read back; `_` under alpha-normalization.
        label: Label,
        domain: RValue,
        closure: Closure,
    },
    Pi {
        label: Label,
        domain: RValue,
        range: Closure,
    },
    /// Application whose function is stuck (neutral).
    App(RValue, RValue),
    BoolLit(bool),
    NaturalLit(Natural),
    IntegerLit(Integer),
    DoubleLit(Double),
    TextLit(TextLit<RValue>),
    /// `if` whose condition is stuck (neutral).
    If(RValue, RValue, RValue),
    /// Operator application with at least one stuck operand (neutral).
    Op(OpCode, RValue, RValue),
    EmptyList(RValue),
    NonEmptyList(Vec<RValue>),
    Some(RValue),
    RecordType(FieldMap<RValue>),
    RecordLit(FieldMap<RValue>),
    UnionType(FieldMap<Option<RValue>>),
    Field(RValue, Label),
    Project(RValue, Vec<Label>),
    ToMap(RValue, Option<RValue>),
    Merge(RValue, RValue, Option<RValue>),
    Assert(RValue),
}

impl Value {
    pub fn rc(self) -> RValue {
        RValue::new(self)
    }

    /// Head and arguments of a stuck application spine, if the head is a builtin.
    pub(crate) fn builtin_spine(&self) -> Option<(Builtin, Vec<RValue>)> {
        match self {
            Self::Builtin(b) => Some((*b, Vec::new())),
            Self::App(f, arg) => {
                let (b, mut args) = f.builtin_spine()?;
                args.push(arg.clone());
                Some((b, args))
            }
            _ => None,
        }
    }
}

impl From<Builtin> for Value {
    fn from(b: Builtin) -> Self {
        Self::Builtin(b)
    }
}

impl From<crate::Universe> for Value {
    fn from(u: crate::Universe) -> Self {
        Self::Universe(u)
    }
}

impl fmt::Display for Value {
    /// Values are displayed by reading them back into terms.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        crate::kernel::quote(self).fmt(f)
    }
}

impl fmt::Display for RValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (**self).fmt(f)
    }
}

//! Common error type.

use crate::term::{Label, OpCode, Term, Var};
use alloc::vec::Vec;
use core::fmt::{self, Display};

/// Common error type.
#[derive(Debug)]
pub enum Error {
    /// Duplicate label at expression construction.
    DuplicateField(Label),
    Typing(TypeError),
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Self::Typing(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::DuplicateField(l) => write!(f, "duplicate field {}", l),
            Self::Typing(err) => err.fmt(f),
        }
    }
}

/// One step of the path from the root of the offending expression down to
/// the sub-term a type error originates from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Crumb {
    FnOf,
    ArgOf,
    DomainOf(Label),
    BodyOf(Label),
    LetValue(Label),
    LetAnnot(Label),
    AnnotatedExpr,
    Annotation,
    Condition,
    ThenBranch,
    ElseBranch,
    OpLeft(OpCode),
    OpRight(OpCode),
    ListElement(usize),
    SomeArg,
    TextChunk(usize),
    FieldType(Label),
    RecordField(Label),
    UnionAlt(Label),
    AccessedRecord,
    ProjectedRecord,
    Selector,
    ToMapRecord,
    MergeHandler,
    MergeUnion,
    AssertAnnot,
}

impl Display for Crumb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::FnOf => write!(f, "function"),
            Self::ArgOf => write!(f, "argument"),
            Self::DomainOf(l) => write!(f, "domain of {}", l),
            Self::BodyOf(l) => write!(f, "body of {}", l),
            Self::LetValue(l) => write!(f, "value of let {}", l),
            Self::LetAnnot(l) => write!(f, "annotation of let {}", l),
            Self::AnnotatedExpr => write!(f, "annotated expression"),
            Self::Annotation => write!(f, "annotation"),
            Self::Condition => write!(f, "if condition"),
            Self::ThenBranch => write!(f, "then branch"),
            Self::ElseBranch => write!(f, "else branch"),
            Self::OpLeft(op) => write!(f, "left of {}", op),
            Self::OpRight(op) => write!(f, "right of {}", op),
            Self::ListElement(i) => write!(f, "list element {}", i),
            Self::SomeArg => write!(f, "argument of Some"),
            Self::TextChunk(i) => write!(f, "text interpolation {}", i),
            Self::FieldType(l) => write!(f, "type of field {}", l),
            Self::RecordField(l) => write!(f, "field {}", l),
            Self::UnionAlt(l) => write!(f, "alternative {}", l),
            Self::AccessedRecord => write!(f, "accessed expression"),
            Self::ProjectedRecord => write!(f, "projected expression"),
            Self::Selector => write!(f, "projection selector"),
            Self::ToMapRecord => write!(f, "toMap argument"),
            Self::MergeHandler => write!(f, "merge handlers"),
            Self::MergeUnion => write!(f, "merge argument"),
            Self::AssertAnnot => write!(f, "assert annotation"),
        }
    }
}

/// Why type inference failed.
#[derive(Debug)]
pub enum TypeErrorKind {
    UnboundVariable(Var),
    TypeMismatch { expected: Term, actual: Term },
    NotAFunction { actual: Term },
    NotARecord { actual: Term },
    NotAUnion { actual: Term },
    InvalidAnnotation {
        annotation: Option<Term>,
        actual: Term,
    },
    MissingField(Label),
    DuplicateField(Label),
    HandlerMismatch(Label),
    UnequivalentAssertion { left: Term, right: Term },
    UniverseMismatch,
    InvalidListElement(usize),
}

impl Display for TypeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnboundVariable(v) => write!(f, "unbound variable {}", v),
            Self::TypeMismatch { expected, actual } => {
                write!(f, "expected type {}, found {}", expected, actual)
            }
            Self::NotAFunction { actual } => write!(f, "not a function: {}", actual),
            Self::NotARecord { actual } => write!(f, "not a record: {}", actual),
            Self::NotAUnion { actual } => write!(f, "not a union: {}", actual),
            Self::InvalidAnnotation {
                annotation: Some(annotation),
                actual,
            } => {
                write!(
                    f,
                    "annotation {} does not match inferred type {}",
                    annotation, actual
                )
            }
            Self::InvalidAnnotation {
                annotation: None,
                actual,
            } => {
                write!(f, "an annotation is required here (inferred {})", actual)
            }
            Self::MissingField(l) => write!(f, "missing field {}", l),
            Self::DuplicateField(l) => write!(f, "duplicate field {}", l),
            Self::HandlerMismatch(l) => write!(f, "handler mismatch for alternative {}", l),
            Self::UnequivalentAssertion { left, right } => {
                write!(f, "assertion failed: {} is not equivalent to {}", left, right)
            }
            Self::UniverseMismatch => write!(f, "expression is not a universe"),
            Self::InvalidListElement(i) => {
                write!(f, "list element {} differs in type from the first", i)
            }
        }
    }
}

/// Type inference failure, carrying the path to the offending sub-term.
///
/// The path is collected while the error bubbles up, so its first element is
/// the innermost position; [`Display`] prints it outermost first.
#[derive(Debug)]
pub struct TypeError {
    pub kind: TypeErrorKind,
    pub path: Vec<Crumb>,
}

impl TypeError {
    pub fn new(kind: TypeErrorKind) -> Self {
        Self {
            kind,
            path: Vec::new(),
        }
    }

    /// Record that the error occurred below the given position.
    pub fn within(mut self, crumb: Crumb) -> Self {
        self.path.push(crumb);
        self
    }
}

impl From<TypeErrorKind> for TypeError {
    fn from(kind: TypeErrorKind) -> Self {
        Self::new(kind)
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for crumb in self.path.iter().rev() {
            write!(f, "in {}: ", crumb)?;
        }
        self.kind.fmt(f)
    }
}

#![no_std]
#![forbid(unsafe_code)]

//! Type checking and normalization for the Dhall configuration language.
//!
//! This library is the kernel of a Dhall implementation: it consumes an
//! already parsed, import-free [`Term`] and provides
//! type inference ([`kernel::type_of`]),
//! normalization by evaluation ([`kernel::eval`]),
//! judgmental equality ([`kernel::convertible`]), and
//! reading values back into terms ([`kernel::quote`]).
//! Parsing, binary encoding, and import resolution live in other crates;
//! the binary codec is reached only through the [`binary::TermCodec`]
//! trait, which the kernel uses to compute content hashes of normal forms
//! ([`binary::semantic_hash`]).
//!
//! # Usage
//!
//! Terms are built (by a parser, usually) from the constructors in
//! [`Term`], type checked, and evaluated:
//!
//! ~~~
//! use dhall_kernel::{kernel, Builtin, OpCode, Term};
//!
//! // (λ(x : Natural) → x + 1) 4
//! let term = Term::app(
//!     Term::lam(
//!         "x",
//!         Term::Builtin(Builtin::Natural),
//!         Term::op(OpCode::Plus, Term::var("x"), Term::NaturalLit(1)),
//!     ),
//!     Term::NaturalLit(4),
//! );
//!
//! // type checking comes first; evaluation is total only on checked terms
//! let ty = kernel::type_of(&term)?;
//! assert!(kernel::convertible(&ty, &kernel::eval(&Term::Builtin(Builtin::Natural))));
//!
//! // normalization by evaluation, then reading the normal form back
//! assert_eq!(kernel::quote(&kernel::eval(&term)), Term::NaturalLit(5));
//! # Ok::<_, dhall_kernel::error::TypeError>(())
//! ~~~
//!
//! # Organisation
//!
//! * [`term`](Term) and [`value`](Value) are the two data models: terms are
//!   the syntax tree, values the semantic domain with environments captured
//!   in [`Closure`]s,
//! * the [`kernel`] module holds everything that gives them meaning, and
//! * [`binary`] declares the codec interface expected from the outside.
//!
//! The kernel does no I/O, keeps no global state, and — with fixed-width
//! `u64`/`i64` numbers, documented in [`Natural`] and [`Integer`] — needs
//! only `core` and `alloc`.

extern crate alloc;
#[macro_use]
extern crate log;

#[cfg(test)]
extern crate std;

pub mod binary;
pub mod error;
pub mod kernel;
mod term;
mod value;

pub use error::Error;
pub use term::{
    Binding, Builtin, Chunk, Double, FieldMap, Integer, Label, Natural, OpCode, Term, TextLit,
    Universe, Var,
};
pub use value::{Closure, Env, RValue, Value};

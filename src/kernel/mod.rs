//! The kernel: evaluation, quoting, convertibility, and type inference.
//!
//! Data flows through the kernel in one direction: a [`Term`](crate::Term)
//! is checked by [`type_of`], reduced to a [`Value`](crate::Value) by
//! [`eval`], compared with [`convertible`], and read back by [`quote`].

mod builtin;
pub mod convertible;
pub mod eval;
pub mod quote;
mod subst;
pub mod typing;

pub use convertible::convertible;
pub use eval::{alpha_beta_eval, eval};
pub use quote::quote;
pub use typing::type_of;

pub(crate) use eval::eval_with;

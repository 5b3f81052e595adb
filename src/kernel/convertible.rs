//! Judgmental equality of values.

use crate::term::Var;
use crate::value::{Closure, RValue, Value};

/// Return true if two values are judgmentally equal: structurally equal up
/// to alpha-renaming of binders, with β/δ-reduction already performed by
/// evaluation.
///
/// Functions are compared extensionally: both closures are applied to a
/// fresh variable and the results compared one binder deeper.
///
/// ~~~
/// # use dhall_kernel::{kernel, Builtin, Term};
/// let natural = Term::Builtin(Builtin::Natural);
/// let id_x = kernel::eval(&Term::lam("x", natural.clone(), Term::var("x")));
/// let id_y = kernel::eval(&Term::lam("y", natural.clone(), Term::var("y")));
/// assert!(kernel::convertible(&id_x, &id_y));
/// ~~~
pub fn convertible(l: &Value, r: &Value) -> bool {
    conv(0, l, r)
}

/// Apply both closures to a fresh variable at `level` and compare the
/// results one level deeper.
fn conv_closures(level: usize, l: &Closure, r: &Closure) -> bool {
    let fresh = Value::QuoteVar(Var::new("_", level)).rc();
    conv(level + 1, &l.apply(fresh.clone()), &r.apply(fresh))
}

fn conv_option(level: usize, l: &Option<RValue>, r: &Option<RValue>) -> bool {
    match (l, r) {
        (None, None) => true,
        (Some(l), Some(r)) => conv(level, l, r),
        _ => false,
    }
}

fn conv(level: usize, l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Universe(a), Value::Universe(b)) => a == b,
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        (Value::Var(a), Value::Var(b))
        | (Value::LocalVar(a), Value::LocalVar(b))
        | (Value::QuoteVar(a), Value::QuoteVar(b)) => a == b,
        (Value::BoolLit(a), Value::BoolLit(b)) => a == b,
        (Value::NaturalLit(a), Value::NaturalLit(b)) => a == b,
        (Value::IntegerLit(a), Value::IntegerLit(b)) => a == b,
        // IEEE equality plus the sign bit: +0.0 and -0.0 differ, and NaN
        // stays unequal to itself
        (Value::DoubleLit(a), Value::DoubleLit(b)) => {
            a.0 == b.0 && a.0.is_sign_negative() == b.0.is_sign_negative()
        }
        (
            Value::Lam {
                domain: d1,
                closure: c1,
                ..
            },
            Value::Lam {
                domain: d2,
                closure: c2,
                ..
            },
        ) => conv(level, d1, d2) && conv_closures(level, c1, c2),
        (
            Value::Pi {
                domain: d1,
                range: r1,
                ..
            },
            Value::Pi {
                domain: d2,
                range: r2,
                ..
            },
        ) => conv(level, d1, d2) && conv_closures(level, r1, r2),
        (Value::App(f1, a1), Value::App(f2, a2)) => {
            conv(level, f1, f2) && conv(level, a1, a2)
        }
        (Value::TextLit(a), Value::TextLit(b)) => {
            a.suffix == b.suffix
                && a.chunks.len() == b.chunks.len()
                && a.chunks.iter().zip(&b.chunks).all(|(x, y)| {
                    x.prefix == y.prefix && conv(level, &x.expr, &y.expr)
                })
        }
        (Value::If(c1, t1, e1), Value::If(c2, t2, e2)) => {
            conv(level, c1, c2) && conv(level, t1, t2) && conv(level, e1, e2)
        }
        (Value::Op(o1, l1, r1), Value::Op(o2, l2, r2)) => {
            o1 == o2 && conv(level, l1, l2) && conv(level, r1, r2)
        }
        (Value::EmptyList(a), Value::EmptyList(b)) => conv(level, a, b),
        (Value::NonEmptyList(xs), Value::NonEmptyList(ys)) => {
            xs.len() == ys.len()
                && xs.iter().zip(ys).all(|(x, y)| conv(level, x, y))
        }
        (Value::Some(a), Value::Some(b)) => conv(level, a, b),
        (Value::RecordType(a), Value::RecordType(b))
        | (Value::RecordLit(a), Value::RecordLit(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, x)| match b.get(k) {
                    Some(y) => conv(level, x, y),
                    None => false,
                })
        }
        // both sides must agree on which alternatives carry no payload
        (Value::UnionType(a), Value::UnionType(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, x)| match b.get(k) {
                    Some(y) => conv_option(level, x, y),
                    None => false,
                })
        }
        (Value::Field(r1, n1), Value::Field(r2, n2)) => {
            n1 == n2 && conv(level, r1, r2)
        }
        (Value::Project(r1, ns1), Value::Project(r2, ns2)) => {
            ns1 == ns2 && conv(level, r1, r2)
        }
        (Value::ToMap(r1, t1), Value::ToMap(r2, t2)) => {
            conv(level, r1, r2) && conv_option(level, t1, t2)
        }
        (Value::Merge(h1, u1, t1), Value::Merge(h2, u2, t2)) => {
            conv(level, h1, h2) && conv(level, u1, u2) && conv_option(level, t1, t2)
        }
        (Value::Assert(a), Value::Assert(b)) => conv(level, a, b),
        _ => false,
    }
}

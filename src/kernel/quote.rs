//! Reading values back into terms.

use crate::term::{Chunk, FieldMap, Label, Term, TextLit, Var};
use crate::value::Value;
use alloc::boxed::Box;

/// Number of binders quoted so far, per label. A [`Value::QuoteVar`] carries
/// the level at which it was introduced; subtracting it from the count of
/// binders of the same name gives back the de Bruijn index.
type Levels = im::HashMap<Label, usize, fnv::FnvBuildHasher>;

/// Read a value back into a term.
///
/// Inverse of evaluation on closed, well-typed input: for any value `v`,
/// `eval(quote(v))` is judgmentally equal to `v`, and normalization is
/// idempotent.
///
/// ~~~
/// # use dhall_kernel::{kernel, Builtin, Term};
/// let id = Term::lam("x", Term::Builtin(Builtin::Natural), Term::var("x"));
/// assert_eq!(kernel::quote(&kernel::eval(&id)), id);
/// ~~~
pub fn quote(v: &Value) -> Term {
    quote_with(&Levels::default(), v)
}

fn quote_option(levels: &Levels, v: &Option<crate::value::RValue>) -> Option<Box<Term>> {
    v.as_ref().map(|v| Box::new(quote_with(levels, v)))
}

fn quote_with(levels: &Levels, v: &Value) -> Term {
    let quote = |v: &Value| quote_with(levels, v);
    match v {
        Value::Universe(u) => Term::Universe(*u),
        Value::Builtin(b) => Term::Builtin(*b),
        Value::Var(v) => Term::Var(v.clone()),
        Value::LocalVar(v) => Term::LocalVar(v.clone()),
        Value::QuoteVar(v) => {
            // levels[name] binders of this name enclose the occurrence
            let outer = levels.get(&v.name).copied().unwrap_or(0);
            Term::Var(Var::new(v.name.clone(), outer - v.index - 1))
        }
        Value::Lam {
            label,
            domain,
            closure,
        } => {
            let level = levels.get(label).copied().unwrap_or(0);
            let fresh = Value::QuoteVar(Var::new(label.clone(), level)).rc();
            let inner = levels.update(label.clone(), level + 1);
            Term::Lam {
                label: label.clone(),
                domain: Box::new(quote(domain)),
                body: Box::new(quote_with(&inner, &closure.apply(fresh))),
            }
        }
        Value::Pi {
            label,
            domain,
            range,
        } => {
            let level = levels.get(label).copied().unwrap_or(0);
            let fresh = Value::QuoteVar(Var::new(label.clone(), level)).rc();
            let inner = levels.update(label.clone(), level + 1);
            Term::Pi {
                label: label.clone(),
                domain: Box::new(quote(domain)),
                body: Box::new(quote_with(&inner, &range.apply(fresh))),
            }
        }
        Value::App(f, arg) => Term::app(quote(f), quote(arg)),
        Value::BoolLit(b) => Term::BoolLit(*b),
        Value::NaturalLit(n) => Term::NaturalLit(*n),
        Value::IntegerLit(i) => Term::IntegerLit(*i),
        Value::DoubleLit(d) => Term::DoubleLit(*d),
        Value::TextLit(text) => Term::TextLit(TextLit {
            chunks: text
                .chunks
                .iter()
                .map(|c| Chunk {
                    prefix: c.prefix.clone(),
                    expr: quote(&c.expr),
                })
                .collect(),
            suffix: text.suffix.clone(),
        }),
        Value::If(c, t, e) => Term::If(
            Box::new(quote(c)),
            Box::new(quote(t)),
            Box::new(quote(e)),
        ),
        Value::Op(code, l, r) => Term::op(*code, quote(l), quote(r)),
        Value::EmptyList(ty) => Term::EmptyList(Box::new(quote(ty))),
        Value::NonEmptyList(xs) => {
            Term::NonEmptyList(xs.iter().map(|x| quote(x)).collect())
        }
        Value::Some(x) => Term::Some(Box::new(quote(x))),
        Value::RecordType(fields) => Term::RecordType(FieldMap(
            fields.iter().map(|(k, v)| (k.clone(), quote(v))).collect(),
        )),
        Value::RecordLit(fields) => Term::RecordLit(FieldMap(
            fields.iter().map(|(k, v)| (k.clone(), quote(v))).collect(),
        )),
        Value::UnionType(alts) => Term::UnionType(FieldMap(
            alts.iter()
                .map(|(k, v)| (k.clone(), v.as_ref().map(|ty| quote(ty))))
                .collect(),
        )),
        Value::Field(r, name) => Term::Field(Box::new(quote(r)), name.clone()),
        Value::Project(r, names) => Term::Project(Box::new(quote(r)), names.clone()),
        Value::ToMap(r, ty) => Term::ToMap(Box::new(quote(r)), quote_option(levels, ty)),
        Value::Merge(h, u, ty) => Term::Merge(
            Box::new(quote(h)),
            Box::new(quote(u)),
            quote_option(levels, ty),
        ),
        Value::Assert(ty) => Term::Assert(Box::new(quote(ty))),
    }
}

//! Shifting and substitution on terms.
//!
//! The evaluator never substitutes; β-reduction happens through closures.
//! These traversals serve the type checker, which replaces bound variables
//! with fresh [`LocalVar`](Term::LocalVar)s before descending under a binder
//! and rebinds them when reading an inferred type back, and they implement
//! standalone alpha-normalization.

use crate::term::{Binding, Chunk, FieldMap, Label, Term, TextLit, Var};
use alloc::boxed::Box;
use alloc::vec::Vec;

impl Term {
    /// Add `delta` to the index of every free occurrence of `name` whose
    /// index is at least `cutoff`.
    pub(crate) fn shift(&self, delta: isize, name: &str, cutoff: usize) -> Term {
        match self {
            Self::Var(v) => {
                if v.name == name && v.index >= cutoff {
                    let index = (v.index as isize + delta) as usize;
                    Self::Var(Var::new(v.name.clone(), index))
                } else {
                    self.clone()
                }
            }
            Self::Lam {
                label,
                domain,
                body,
            } => {
                let inner = cutoff + usize::from(label == name);
                Self::Lam {
                    label: label.clone(),
                    domain: Box::new(domain.shift(delta, name, cutoff)),
                    body: Box::new(body.shift(delta, name, inner)),
                }
            }
            Self::Pi {
                label,
                domain,
                body,
            } => {
                let inner = cutoff + usize::from(label == name);
                Self::Pi {
                    label: label.clone(),
                    domain: Box::new(domain.shift(delta, name, cutoff)),
                    body: Box::new(body.shift(delta, name, inner)),
                }
            }
            Self::Let(bindings, body) => {
                let mut cutoff = cutoff;
                let bindings = bindings
                    .iter()
                    .map(|b| {
                        let binding = Binding {
                            variable: b.variable.clone(),
                            annotation: b.annotation.as_ref().map(|a| a.shift(delta, name, cutoff)),
                            value: b.value.shift(delta, name, cutoff),
                        };
                        cutoff += usize::from(b.variable == name);
                        binding
                    })
                    .collect();
                Self::Let(bindings, Box::new(body.shift(delta, name, cutoff)))
            }
            _ => self.map_subterms(&|t| t.shift(delta, name, cutoff)),
        }
    }

    /// Capture-avoiding substitution of `var` by `repl`.
    ///
    /// Indices above `var` are left alone; callers wanting the usual
    /// "substitute and drop the binder" behaviour follow up with
    /// [`shift`](Self::shift)`(-1, var.name, 0)`, after having pre-shifted
    /// `repl` up by one.
    pub(crate) fn subst(&self, var: &Var, repl: &Term) -> Term {
        match self {
            Self::Var(v) => {
                if *v == *var {
                    repl.clone()
                } else {
                    self.clone()
                }
            }
            Self::Lam {
                label,
                domain,
                body,
            } => {
                let (inner, repl2) = descend(var, repl, label);
                Self::Lam {
                    label: label.clone(),
                    domain: Box::new(domain.subst(var, repl)),
                    body: Box::new(body.subst(&inner, &repl2)),
                }
            }
            Self::Pi {
                label,
                domain,
                body,
            } => {
                let (inner, repl2) = descend(var, repl, label);
                Self::Pi {
                    label: label.clone(),
                    domain: Box::new(domain.subst(var, repl)),
                    body: Box::new(body.subst(&inner, &repl2)),
                }
            }
            Self::Let(bindings, body) => {
                let mut var = var.clone();
                let mut repl = repl.clone();
                let bindings = bindings
                    .iter()
                    .map(|b| {
                        let binding = Binding {
                            variable: b.variable.clone(),
                            annotation: b.annotation.as_ref().map(|a| a.subst(&var, &repl)),
                            value: b.value.subst(&var, &repl),
                        };
                        let (v2, r2) = descend(&var, &repl, &b.variable);
                        var = v2;
                        repl = r2;
                        binding
                    })
                    .collect();
                Self::Let(bindings, Box::new(body.subst(&var, &repl)))
            }
            _ => self.map_subterms(&|t| t.subst(var, repl)),
        }
    }

    /// Replace every occurrence of the type-checking variable `local` by a
    /// bound variable pointing at the enclosing binder named after it.
    pub(crate) fn rebind(&self, local: &Var) -> Term {
        self.rebind_at(local, 0)
    }

    fn rebind_at(&self, local: &Var, depth: usize) -> Term {
        match self {
            Self::LocalVar(v) if v == local => {
                Self::Var(Var::new(local.name.clone(), depth))
            }
            Self::Lam {
                label,
                domain,
                body,
            } => {
                let inner = depth + usize::from(*label == local.name);
                Self::Lam {
                    label: label.clone(),
                    domain: Box::new(domain.rebind_at(local, depth)),
                    body: Box::new(body.rebind_at(local, inner)),
                }
            }
            Self::Pi {
                label,
                domain,
                body,
            } => {
                let inner = depth + usize::from(*label == local.name);
                Self::Pi {
                    label: label.clone(),
                    domain: Box::new(domain.rebind_at(local, depth)),
                    body: Box::new(body.rebind_at(local, inner)),
                }
            }
            Self::Let(bindings, body) => {
                let mut depth = depth;
                let bindings = bindings
                    .iter()
                    .map(|b| {
                        let binding = Binding {
                            variable: b.variable.clone(),
                            annotation: b.annotation.as_ref().map(|a| a.rebind_at(local, depth)),
                            value: b.value.rebind_at(local, depth),
                        };
                        depth += usize::from(b.variable == local.name);
                        binding
                    })
                    .collect();
                Self::Let(bindings, Box::new(body.rebind_at(local, depth)))
            }
            _ => self.map_subterms(&|t| t.rebind_at(local, depth)),
        }
    }

    /// Rename every binder label to `_`, adjusting variable indices so that
    /// the term keeps its meaning.
    ///
    /// Two terms that differ only in bound variable names alpha-normalize to
    /// the same term. The evaluator can produce alpha-normal output directly
    /// (see [`alpha_beta_eval`](crate::kernel::alpha_beta_eval)); this
    /// traversal normalizes without reducing.
    pub fn alpha_normalize(&self) -> Term {
        match self {
            Self::Lam {
                label,
                domain,
                body,
            } => Self::Lam {
                label: "_".into(),
                domain: Box::new(domain.alpha_normalize()),
                body: Box::new(rename_to_underscore(label, body).alpha_normalize()),
            },
            Self::Pi {
                label,
                domain,
                body,
            } => Self::Pi {
                label: "_".into(),
                domain: Box::new(domain.alpha_normalize()),
                body: Box::new(rename_to_underscore(label, body).alpha_normalize()),
            },
            Self::Let(bindings, body) => {
                let first = &bindings[0];
                let rest = if bindings.len() == 1 {
                    (**body).clone()
                } else {
                    Self::Let(bindings[1..].to_vec(), body.clone())
                };
                let binding = Binding {
                    variable: "_".into(),
                    annotation: first.annotation.as_ref().map(|a| a.alpha_normalize()),
                    value: first.value.alpha_normalize(),
                };
                let mut bindings = Vec::from([binding]);
                match rename_to_underscore(&first.variable, &rest).alpha_normalize() {
                    Self::Let(tail, body) => {
                        bindings.extend(tail);
                        Self::Let(bindings, body)
                    }
                    rest => Self::Let(bindings, Box::new(rest)),
                }
            }
            _ => self.map_subterms(&|t| t.alpha_normalize()),
        }
    }

    /// Apply `f` to every direct sub-term of a non-binding construct.
    ///
    /// Binding constructs (lambda, Pi, let) must be handled by the caller.
    fn map_subterms(&self, f: &dyn Fn(&Term) -> Term) -> Term {
        let fb = |t: &Box<Term>| Box::new(f(t));
        match self {
            Self::Universe(_)
            | Self::Builtin(_)
            | Self::Var(_)
            | Self::LocalVar(_)
            | Self::BoolLit(_)
            | Self::NaturalLit(_)
            | Self::IntegerLit(_)
            | Self::DoubleLit(_) => self.clone(),
            Self::Lam { .. } | Self::Pi { .. } | Self::Let(_, _) => {
                unreachable!("binders are handled by the caller")
            }
            Self::App(fun, arg) => Self::App(fb(fun), fb(arg)),
            Self::Annot(e, t) => Self::Annot(fb(e), fb(t)),
            Self::TextLit(text) => Self::TextLit(TextLit {
                chunks: text
                    .chunks
                    .iter()
                    .map(|c| Chunk {
                        prefix: c.prefix.clone(),
                        expr: f(&c.expr),
                    })
                    .collect(),
                suffix: text.suffix.clone(),
            }),
            Self::If(c, t, e) => Self::If(fb(c), fb(t), fb(e)),
            Self::Op(code, l, r) => Self::Op(*code, fb(l), fb(r)),
            Self::EmptyList(t) => Self::EmptyList(fb(t)),
            Self::NonEmptyList(xs) => Self::NonEmptyList(xs.iter().map(f).collect()),
            Self::Some(x) => Self::Some(fb(x)),
            Self::RecordType(fields) => Self::RecordType(map_fields(fields, f)),
            Self::RecordLit(fields) => Self::RecordLit(map_fields(fields, f)),
            Self::UnionType(alts) => Self::UnionType(FieldMap(
                alts.iter()
                    .map(|(k, v)| (k.clone(), v.as_ref().map(f)))
                    .collect(),
            )),
            Self::Field(r, name) => Self::Field(fb(r), name.clone()),
            Self::Project(r, names) => Self::Project(fb(r), names.clone()),
            Self::ProjectType(r, s) => Self::ProjectType(fb(r), fb(s)),
            Self::ToMap(r, t) => Self::ToMap(fb(r), t.as_ref().map(fb)),
            Self::Merge(h, u, t) => Self::Merge(fb(h), fb(u), t.as_ref().map(fb)),
            Self::Assert(t) => Self::Assert(fb(t)),
        }
    }
}

fn map_fields(fields: &FieldMap<Term>, f: &dyn Fn(&Term) -> Term) -> FieldMap<Term> {
    FieldMap(fields.iter().map(|(k, v)| (k.clone(), f(v))).collect())
}

/// Target variable and replacement after descending under a binder.
fn descend(var: &Var, repl: &Term, label: &Label) -> (Var, Term) {
    let index = var.index + usize::from(*label == var.name);
    (Var::new(var.name.clone(), index), repl.shift(1, label, 0))
}

/// Rewrite the body of a binder originally labelled `label` so that the
/// binder can be relabelled `_`: references to the binder become `_@0`, and
/// leftover references to outer binders of either name stay intact.
fn rename_to_underscore(label: &str, body: &Term) -> Term {
    if label == "_" {
        return body.clone();
    }
    let freed = body.shift(1, "_", 0);
    let renamed = freed.subst(&Var::new(label, 0), &Term::var("_"));
    renamed.shift(-1, label, 0)
}

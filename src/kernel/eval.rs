//! Evaluation of terms to values.
//!
//! Normalization by evaluation: binders become [`Closure`]s, application of
//! a closure re-enters the evaluator, and every β/δ/ι-rule the kernel knows
//! is applied on the way. The result is in β-normal, builtin-reduced form;
//! reading it back is the job of [`quote`](super::quote).
//!
//! Evaluation is total on well-typed terms. On ill-typed terms it may abort,
//! which callers rule out by type checking first.

use super::builtin;
use super::convertible::convertible;
use crate::term::{Builtin, Chunk, FieldMap, Label, OpCode, Term, TextLit};
use crate::value::{env_insert, env_lookup, Closure, Env, RValue, Value};
use alloc::collections::btree_map::BTreeMap;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

/// Evaluate a term in the empty environment.
///
/// ~~~
/// # use dhall_kernel::{kernel, Term, OpCode};
/// let sum = Term::op(OpCode::Plus, Term::NaturalLit(3), Term::NaturalLit(5));
/// assert_eq!(kernel::quote(&kernel::eval(&sum)), Term::NaturalLit(8));
/// ~~~
pub fn eval(t: &Term) -> Value {
    eval_with(t, &Env::default(), false)
}

/// Evaluate a term, renaming every binder label to `_` on the way, so that
/// the quoted result is alpha-normal.
pub fn alpha_beta_eval(t: &Term) -> Value {
    eval_with(t, &Env::default(), true)
}

pub(crate) fn eval_with(t: &Term, env: &Env, alpha: bool) -> Value {
    trace!("eval: {}", t);
    match t {
        Term::Universe(u) => Value::Universe(*u),
        Term::Builtin(Builtin::True) => Value::BoolLit(true),
        Term::Builtin(Builtin::False) => Value::BoolLit(false),
        Term::Builtin(b) => Value::Builtin(*b),
        Term::Var(v) => match env_lookup(env, v) {
            Some(value) => (*value).clone(),
            None => Value::Var(v.clone()),
        },
        Term::LocalVar(v) => Value::LocalVar(v.clone()),
        Term::Lam {
            label,
            domain,
            body,
        } => Value::Lam {
            label: if alpha { "_".into() } else { label.clone() },
            domain: eval_with(domain, env, alpha).rc(),
            closure: Closure::new(label.clone(), env.clone(), Rc::new((**body).clone()), alpha),
        },
        Term::Pi {
            label,
            domain,
            body,
        } => Value::Pi {
            label: if alpha { "_".into() } else { label.clone() },
            domain: eval_with(domain, env, alpha).rc(),
            range: Closure::new(label.clone(), env.clone(), Rc::new((**body).clone()), alpha),
        },
        Term::App(f, arg) => {
            let f = eval_with(f, env, alpha).rc();
            let arg = eval_with(arg, env, alpha).rc();
            apply_val(f, arg, alpha)
        }
        Term::Let(bindings, body) => {
            let mut env = env.clone();
            for b in bindings {
                let value = eval_with(&b.value, &env, alpha).rc();
                env = env_insert(&env, &b.variable, value);
            }
            eval_with(body, &env, alpha)
        }
        Term::Annot(expr, _) => eval_with(expr, env, alpha),
        Term::BoolLit(b) => Value::BoolLit(*b),
        Term::NaturalLit(n) => Value::NaturalLit(*n),
        Term::IntegerLit(i) => Value::IntegerLit(*i),
        Term::DoubleLit(d) => Value::DoubleLit(*d),
        Term::TextLit(text) => eval_text(text, env, alpha),
        Term::If(cond, then, otherwise) => {
            let cond = eval_with(cond, env, alpha);
            match cond {
                Value::BoolLit(true) => eval_with(then, env, alpha),
                Value::BoolLit(false) => eval_with(otherwise, env, alpha),
                cond => {
                    let then = eval_with(then, env, alpha);
                    let otherwise = eval_with(otherwise, env, alpha);
                    match (&then, &otherwise) {
                        (Value::BoolLit(true), Value::BoolLit(false)) => cond,
                        _ if convertible(&then, &otherwise) => then,
                        _ => Value::If(cond.rc(), then.rc(), otherwise.rc()),
                    }
                }
            }
        }
        Term::Op(code, l, r) => eval_op(*code, l, r, env, alpha),
        Term::EmptyList(ty) => Value::EmptyList(eval_with(ty, env, alpha).rc()),
        Term::NonEmptyList(xs) => {
            Value::NonEmptyList(xs.iter().map(|x| eval_with(x, env, alpha).rc()).collect())
        }
        Term::Some(x) => Value::Some(eval_with(x, env, alpha).rc()),
        Term::RecordType(fields) => Value::RecordType(eval_fields(fields, env, alpha)),
        Term::RecordLit(fields) => Value::RecordLit(eval_fields(fields, env, alpha)),
        Term::UnionType(alts) => Value::UnionType(FieldMap(
            alts.iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        v.as_ref().map(|ty| eval_with(ty, env, alpha).rc()),
                    )
                })
                .collect(),
        )),
        Term::ToMap(record, ty) => {
            let record = eval_with(record, env, alpha);
            let ty = ty.as_ref().map(|ty| eval_with(ty, env, alpha).rc());
            match record {
                Value::RecordLit(fields) if fields.is_empty() => {
                    let ty = ty.expect("toMap of an empty record carries an annotation");
                    Value::EmptyList(ty)
                }
                Value::RecordLit(fields) => {
                    let entries = fields
                        .iter()
                        .map(|(k, v)| {
                            Value::RecordLit(FieldMap(BTreeMap::from([
                                (
                                    "mapKey".into(),
                                    Value::TextLit(TextLit::from_str(k.clone())).rc(),
                                ),
                                ("mapValue".into(), v.clone()),
                            ])))
                            .rc()
                        })
                        .collect();
                    Value::NonEmptyList(entries)
                }
                record => Value::ToMap(record.rc(), ty),
            }
        }
        Term::Field(record, name) => eval_field(record, name, env, alpha),
        Term::Project(record, names) => eval_project(record, names, env, alpha),
        Term::ProjectType(record, selector) => {
            // well-typed selectors evaluate to a record type
            let names: Vec<Label> = match eval_with(selector, env, alpha) {
                Value::RecordType(fields) => fields.keys().cloned().collect(),
                selector => panic!("projection selector is not a record type: {}", selector),
            };
            eval_project(record, &names, env, alpha)
        }
        Term::Merge(handlers, union, ty) => {
            let handlers = eval_with(handlers, env, alpha);
            let union = eval_with(union, env, alpha);
            let ty = ty.as_ref().map(|ty| eval_with(ty, env, alpha).rc());
            if let Value::RecordLit(fields) = &handlers {
                match &union {
                    Value::App(f, arg) => {
                        if let Value::Field(_, name) = &**f {
                            if let Some(handler) = fields.get(name) {
                                return apply_val(handler.clone(), arg.clone(), alpha);
                            }
                        }
                    }
                    // empty alternative
                    Value::Field(_, name) => {
                        if let Some(handler) = fields.get(name) {
                            return (**handler).clone();
                        }
                    }
                    _ => {}
                }
            }
            Value::Merge(handlers.rc(), union.rc(), ty)
        }
        Term::Assert(annotation) => Value::Assert(eval_with(annotation, env, alpha).rc()),
    }
}

/// Apply a value to an argument, β-reducing closures and firing builtin
/// δ-rules; anything else becomes a neutral application.
pub(crate) fn apply_val(f: RValue, arg: RValue, alpha: bool) -> Value {
    match &*f {
        Value::Lam { closure, .. } => closure.apply(arg),
        _ => {
            if let Some((b, mut args)) = f.builtin_spine() {
                args.push(arg.clone());
                if let Some(reduced) = builtin::apply(b, &args, alpha) {
                    return reduced;
                }
            }
            Value::App(f, arg)
        }
    }
}

fn eval_fields(fields: &FieldMap<Term>, env: &Env, alpha: bool) -> FieldMap<RValue> {
    FieldMap(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), eval_with(v, env, alpha).rc()))
            .collect(),
    )
}

/// Concatenate adjacent literal text, splice in nested literals, and
/// collapse a bare interpolation `"${e}"` to `e`.
fn eval_text(text: &TextLit<Term>, env: &Env, alpha: bool) -> Value {
    let mut acc = String::new();
    let mut chunks: Vec<Chunk<RValue>> = Vec::new();
    for chunk in &text.chunks {
        acc.push_str(&chunk.prefix);
        match eval_with(&chunk.expr, env, alpha) {
            Value::TextLit(inner) => {
                let mut inner_chunks = inner.chunks.into_iter();
                if let Some(first) = inner_chunks.next() {
                    acc.push_str(&first.prefix);
                    chunks.push(Chunk {
                        prefix: core::mem::take(&mut acc),
                        expr: first.expr,
                    });
                    chunks.extend(inner_chunks);
                }
                acc.push_str(&inner.suffix);
            }
            expr => {
                chunks.push(Chunk {
                    prefix: core::mem::take(&mut acc),
                    expr: expr.rc(),
                });
            }
        }
    }
    acc.push_str(&text.suffix);

    if chunks.len() == 1 && chunks[0].prefix.is_empty() && acc.is_empty() {
        return (*chunks.remove(0).expr).clone();
    }
    Value::TextLit(TextLit {
        chunks,
        suffix: acc,
    })
}

fn eval_op(code: OpCode, lt: &Term, rt: &Term, env: &Env, alpha: bool) -> Value {
    match code {
        // text concatenation is chunk fusion in disguise
        OpCode::TextAppend => {
            let chunks = Vec::from([
                Chunk {
                    prefix: String::new(),
                    expr: lt.clone(),
                },
                Chunk {
                    prefix: String::new(),
                    expr: rt.clone(),
                },
            ]);
            return eval_with(
                &Term::TextLit(TextLit {
                    chunks,
                    suffix: String::new(),
                }),
                env,
                alpha,
            );
        }
        // r::x desugars to (r.default ⫽ x) : r.Type
        OpCode::Complete => {
            let desugared = Term::annot(
                Term::op(
                    OpCode::RightBiasedRecordMerge,
                    Term::field(lt.clone(), "default"),
                    rt.clone(),
                ),
                Term::field(lt.clone(), "Type"),
            );
            return eval_with(&desugared, env, alpha);
        }
        _ => {}
    }

    let l = eval_with(lt, env, alpha);
    let r = eval_with(rt, env, alpha);
    match code {
        OpCode::Or => {
            match l {
                Value::BoolLit(true) => return Value::BoolLit(true),
                Value::BoolLit(false) => return r,
                _ => {}
            }
            match r {
                Value::BoolLit(true) => return Value::BoolLit(true),
                Value::BoolLit(false) => return l,
                _ => {}
            }
            if convertible(&l, &r) {
                return l;
            }
        }
        OpCode::And => {
            match l {
                Value::BoolLit(true) => return r,
                Value::BoolLit(false) => return Value::BoolLit(false),
                _ => {}
            }
            match r {
                Value::BoolLit(true) => return l,
                Value::BoolLit(false) => return Value::BoolLit(false),
                _ => {}
            }
            if convertible(&l, &r) {
                return l;
            }
        }
        OpCode::Eq => {
            if let Value::BoolLit(true) = l {
                return r;
            }
            if let Value::BoolLit(true) = r {
                return l;
            }
            if convertible(&l, &r) {
                return Value::BoolLit(true);
            }
        }
        OpCode::Ne => {
            if let Value::BoolLit(false) = l {
                return r;
            }
            if let Value::BoolLit(false) = r {
                return l;
            }
            if convertible(&l, &r) {
                return Value::BoolLit(false);
            }
        }
        OpCode::Plus => match (&l, &r) {
            (Value::NaturalLit(a), Value::NaturalLit(b)) => {
                let sum = a.checked_add(*b).expect("natural addition overflows");
                return Value::NaturalLit(sum);
            }
            (Value::NaturalLit(0), _) => return r,
            (_, Value::NaturalLit(0)) => return l,
            _ => {}
        },
        OpCode::Times => match (&l, &r) {
            (Value::NaturalLit(a), Value::NaturalLit(b)) => {
                let product = a.checked_mul(*b).expect("natural multiplication overflows");
                return Value::NaturalLit(product);
            }
            (Value::NaturalLit(0), _) | (_, Value::NaturalLit(0)) => {
                return Value::NaturalLit(0)
            }
            (Value::NaturalLit(1), _) => return r,
            (_, Value::NaturalLit(1)) => return l,
            _ => {}
        },
        OpCode::ListAppend => {
            if let Value::EmptyList(_) = l {
                return r;
            }
            if let Value::EmptyList(_) = r {
                return l;
            }
            if let (Value::NonEmptyList(ls), Value::NonEmptyList(rs)) = (&l, &r) {
                let mut xs = ls.clone();
                xs.extend(rs.iter().cloned());
                return Value::NonEmptyList(xs);
            }
        }
        OpCode::RecordMerge => {
            if let (Value::RecordLit(ls), Value::RecordLit(rs)) = (&l, &r) {
                if ls.is_empty() {
                    return r;
                }
                if rs.is_empty() {
                    return l;
                }
                return Value::RecordLit(merge_record_lits(ls, rs));
            }
            if let Value::RecordLit(ls) = &l {
                if ls.is_empty() {
                    return r;
                }
            }
            if let Value::RecordLit(rs) = &r {
                if rs.is_empty() {
                    return l;
                }
            }
        }
        OpCode::RecordTypeMerge => {
            if let (Value::RecordType(ls), Value::RecordType(rs)) = (&l, &r) {
                if ls.is_empty() {
                    return r;
                }
                if rs.is_empty() {
                    return l;
                }
                // type checking rules out mismatches beforehand
                match merge_record_types(ls, rs) {
                    Ok(merged) => return Value::RecordType(merged),
                    Err(label) => panic!("record type merge collides on field {}", label),
                }
            }
            if let Value::RecordType(ls) = &l {
                if ls.is_empty() {
                    return r;
                }
            }
            if let Value::RecordType(rs) = &r {
                if rs.is_empty() {
                    return l;
                }
            }
        }
        OpCode::RightBiasedRecordMerge => {
            if let Value::RecordLit(ls) = &l {
                if ls.is_empty() {
                    return r;
                }
            }
            if let Value::RecordLit(rs) = &r {
                if rs.is_empty() {
                    return l;
                }
            }
            if let (Value::RecordLit(ls), Value::RecordLit(rs)) = (&l, &r) {
                let mut out = ls.0.clone();
                for (k, v) in rs.iter() {
                    out.insert(k.clone(), v.clone());
                }
                return Value::RecordLit(FieldMap(out));
            }
            if convertible(&l, &r) {
                return l;
            }
        }
        // no reduction at the value layer
        OpCode::ImportAlt | OpCode::Equiv => {}
        OpCode::TextAppend | OpCode::Complete => unreachable!("handled above"),
    }
    Value::Op(code, l.rc(), r.rc())
}

/// Deep merge of two record literals, recursing on fields present on both
/// sides. Colliding non-record fields mean the input was ill-typed.
fn merge_record_lits(l: &FieldMap<RValue>, r: &FieldMap<RValue>) -> FieldMap<RValue> {
    let mut out = l.0.clone();
    for (k, rv) in r.iter() {
        let merged = match out.get(k) {
            Some(lv) => match (&**lv, &**rv) {
                (Value::RecordLit(ls), Value::RecordLit(rs)) => {
                    Value::RecordLit(merge_record_lits(ls, rs)).rc()
                }
                _ => panic!("record merge collides on non-record field {}", k),
            },
            None => rv.clone(),
        };
        out.insert(k.clone(), merged);
    }
    FieldMap(out)
}

/// Deep merge of two record types; a collision of non-record field types is
/// reported to the caller.
pub(crate) fn merge_record_types(
    l: &FieldMap<RValue>,
    r: &FieldMap<RValue>,
) -> Result<FieldMap<RValue>, Label> {
    let mut out = l.0.clone();
    for (k, rv) in r.iter() {
        let merged = match out.get(k) {
            Some(lv) => match (&**lv, &**rv) {
                (Value::RecordType(ls), Value::RecordType(rs)) => {
                    Value::RecordType(merge_record_types(ls, rs)?).rc()
                }
                _ => return Err(k.clone()),
            },
            None => rv.clone(),
        };
        out.insert(k.clone(), merged);
    }
    Ok(FieldMap(out))
}

fn singleton(name: &str, v: RValue) -> RValue {
    Value::RecordLit(FieldMap(BTreeMap::from([(Label::from(name), v)]))).rc()
}

/// Field access, pushing the selection through record merges whenever one
/// side already determines (or cannot contain) the field.
fn eval_field(record: &Term, name: &Label, env: &Env, alpha: bool) -> Value {
    let mut record = eval_with(record, env, alpha);
    loop {
        let next = match &record {
            Value::Project(inner, _) => (**inner).clone(),
            Value::Op(OpCode::RecordMerge, l, r) => {
                if let Value::RecordLit(ls) = &**l {
                    if let Some(v) = ls.get(name) {
                        let focused = Value::Op(
                            OpCode::RecordMerge,
                            singleton(name, v.clone()),
                            r.clone(),
                        );
                        return Value::Field(focused.rc(), name.clone());
                    }
                    (**r).clone()
                } else if let Value::RecordLit(rs) = &**r {
                    if let Some(v) = rs.get(name) {
                        let focused = Value::Op(
                            OpCode::RecordMerge,
                            l.clone(),
                            singleton(name, v.clone()),
                        );
                        return Value::Field(focused.rc(), name.clone());
                    }
                    (**l).clone()
                } else {
                    break;
                }
            }
            Value::Op(OpCode::RightBiasedRecordMerge, l, r) => {
                if let Value::RecordLit(rs) = &**r {
                    if let Some(v) = rs.get(name) {
                        return (**v).clone();
                    }
                    (**l).clone()
                } else if let Value::RecordLit(ls) = &**l {
                    if let Some(v) = ls.get(name) {
                        let focused = Value::Op(
                            OpCode::RightBiasedRecordMerge,
                            singleton(name, v.clone()),
                            r.clone(),
                        );
                        return Value::Field(focused.rc(), name.clone());
                    }
                    (**r).clone()
                } else {
                    break;
                }
            }
            _ => break,
        };
        record = next;
    }
    if let Value::RecordLit(fields) = &record {
        let v = fields
            .get(name)
            .unwrap_or_else(|| panic!("missing field {} in record literal", name));
        return (**v).clone();
    }
    Value::Field(record.rc(), name.clone())
}

/// Projection, pushing the label set through a right-biased merge whose
/// right side is known.
fn eval_project(record: &Term, names: &[Label], env: &Env, alpha: bool) -> Value {
    let mut names: Vec<Label> = names.to_vec();
    names.sort();
    let mut record = eval_with(record, env, alpha);
    loop {
        let next = match &record {
            Value::Project(inner, _) => (**inner).clone(),
            Value::Op(OpCode::RightBiasedRecordMerge, l, r) => {
                if let Value::RecordLit(rs) = &**r {
                    let mut overrides = BTreeMap::new();
                    let mut kept = Vec::new();
                    for name in &names {
                        match rs.get(name) {
                            Some(v) => {
                                overrides.insert(name.clone(), v.clone());
                            }
                            None => kept.push(name.clone()),
                        }
                    }
                    let overrides = Value::RecordLit(FieldMap(overrides));
                    if kept.is_empty() {
                        return overrides;
                    }
                    return Value::Op(
                        OpCode::RightBiasedRecordMerge,
                        Value::Project(l.clone(), kept).rc(),
                        overrides.rc(),
                    );
                }
                break;
            }
            _ => break,
        };
        record = next;
    }
    if let Value::RecordLit(fields) = &record {
        let projected = names
            .iter()
            .map(|name| {
                let v = fields
                    .get(name)
                    .unwrap_or_else(|| panic!("missing field {} in record literal", name));
                (name.clone(), v.clone())
            })
            .collect();
        return Value::RecordLit(FieldMap(projected));
    }
    if names.is_empty() {
        return Value::RecordLit(FieldMap::new());
    }
    Value::Project(record.rc(), names)
}

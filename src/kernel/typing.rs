//! Type inference for terms.
//!
//! `infer` synthesizes the type of a term as a value, evaluating type
//! annotations and comparing them with [`convertible`]. Binders are opened
//! by substituting a fresh [`LocalVar`](Term::LocalVar) for the bound
//! variable, and the inferred body type is quoted and rebound into the
//! resulting Π-type's range closure.

use super::builtin::builtin_type;
use super::convertible::convertible;
use super::eval::{self, merge_record_types};
use super::quote::quote;
use crate::error::{Crumb, TypeError, TypeErrorKind};
use crate::term::{Builtin, FieldMap, Label, OpCode, Term, Universe, Var};
use crate::value::{Closure, Env, RValue, Value};
use alloc::collections::{btree_map::BTreeMap, btree_set::BTreeSet};
use alloc::rc::Rc;

type Result<T> = core::result::Result<T, TypeError>;

/// Types of the type-checking variables in scope: for each name, the stack
/// of types, oldest binder first, so that `LocalVar { name, index }` is
/// found at position `index`.
type Ctx = im::HashMap<Label, im::Vector<RValue>, fnv::FnvBuildHasher>;

fn fresh(ctx: &Ctx, name: &Label) -> Var {
    Var::new(name.clone(), ctx.get(name).map_or(0, |stack| stack.len()))
}

fn bind(ctx: &Ctx, name: &Label, ty: RValue) -> Ctx {
    let mut stack = ctx.get(name).cloned().unwrap_or_default();
    stack.push_back(ty);
    ctx.update(name.clone(), stack)
}

fn lookup(ctx: &Ctx, var: &Var) -> Option<RValue> {
    ctx.get(&var.name)
        .and_then(|stack| stack.get(var.index))
        .cloned()
}

/// The universe of a Π-type from its domain and codomain universes.
pub(crate) fn function_check(domain: Universe, codomain: Universe) -> Universe {
    if codomain == Universe::Type {
        Universe::Type
    } else {
        domain.max(codomain)
    }
}

/// Infer the type of a closed term.
///
/// ~~~
/// # use dhall_kernel::{kernel, Builtin, Term, Universe};
/// let list_natural = Term::app(
///     Term::Builtin(Builtin::List),
///     Term::Builtin(Builtin::Natural),
/// );
/// let ty = kernel::type_of(&list_natural)?;
/// assert_eq!(kernel::quote(&ty), Term::Universe(Universe::Type));
/// # Ok::<_, dhall_kernel::error::TypeError>(())
/// ~~~
pub fn type_of(t: &Term) -> Result<Value> {
    infer(&Ctx::default(), t)
}

fn err(kind: TypeErrorKind) -> TypeError {
    TypeError::new(kind)
}

fn mismatch(expected: &Value, actual: &Value) -> TypeError {
    err(TypeErrorKind::TypeMismatch {
        expected: quote(expected),
        actual: quote(actual),
    })
}

fn infer_universe(ctx: &Ctx, t: &Term) -> Result<Universe> {
    match infer(ctx, t)? {
        Value::Universe(u) => Ok(u),
        _ => Err(err(TypeErrorKind::UniverseMismatch)),
    }
}

/// Universe of a type value, determined by inferring the type of its
/// quotation.
fn universe_of(ctx: &Ctx, ty: &Value) -> Result<Universe> {
    infer_universe(ctx, &quote(ty))
}

/// Substitute `repl` for the variable `name@0` in `body` and drop the binder.
fn open(body: &Term, name: &Label, repl: &Term) -> Term {
    body.subst(&Var::new(name.clone(), 0), &repl.shift(1, name, 0))
        .shift(-1, name, 0)
}

/// The element type of a `List a` value.
fn list_element(v: &Value) -> Option<&RValue> {
    if let Value::App(f, a) = v {
        if matches!(&**f, Value::Builtin(Builtin::List)) {
            return Some(a);
        }
    }
    None
}

fn expected_list() -> Term {
    Term::app(Term::Builtin(Builtin::List), Term::var("_"))
}

/// Check that `t` has a type convertible to `expected`.
fn check_operand(ctx: &Ctx, t: &Term, expected: &Value, crumb: Crumb) -> Result<()> {
    let ty = infer(ctx, t).map_err(|e| e.within(crumb.clone()))?;
    if !convertible(&ty, expected) {
        return Err(mismatch(expected, &ty).within(crumb));
    }
    Ok(())
}

fn infer(ctx: &Ctx, t: &Term) -> Result<Value> {
    debug!("infer type of {}", t);
    match t {
        Term::Universe(Universe::Type) => Ok(Value::Universe(Universe::Kind)),
        Term::Universe(Universe::Kind) => Ok(Value::Universe(Universe::Sort)),
        // Sort has no type
        Term::Universe(Universe::Sort) => Err(err(TypeErrorKind::UniverseMismatch)),
        Term::Builtin(b) => Ok(eval::eval(&builtin_type(*b))),
        Term::Var(v) => Err(err(TypeErrorKind::UnboundVariable(v.clone()))),
        Term::LocalVar(v) => match lookup(ctx, v) {
            Some(ty) => Ok((*ty).clone()),
            None => Err(err(TypeErrorKind::UnboundVariable(v.clone()))),
        },
        Term::Lam {
            label,
            domain,
            body,
        } => {
            infer_universe(ctx, domain)
                .map_err(|e| e.within(Crumb::DomainOf(label.clone())))?;
            let dom = eval::eval(domain).rc();
            let local = fresh(ctx, label);
            let body = open(body, label, &Term::LocalVar(local.clone()));
            let ctx_body = bind(ctx, label, dom.clone());
            let body_ty = infer(&ctx_body, &body)
                .map_err(|e| e.within(Crumb::BodyOf(label.clone())))?;
            let body_ty = quote(&body_ty);
            // the Π-type we are about to build must itself be well-typed,
            // which rules out e.g. a body whose type is Sort
            infer_universe(&ctx_body, &body_ty)
                .map_err(|e| e.within(Crumb::BodyOf(label.clone())))?;
            let range = body_ty.rebind(&local);
            Ok(Value::Pi {
                label: label.clone(),
                domain: dom,
                range: Closure::new(label.clone(), Env::default(), Rc::new(range), false),
            })
        }
        Term::Pi {
            label,
            domain,
            body,
        } => {
            let c_domain = infer_universe(ctx, domain)
                .map_err(|e| e.within(Crumb::DomainOf(label.clone())))?;
            let dom = eval::eval(domain).rc();
            let local = fresh(ctx, label);
            let body = open(body, label, &Term::LocalVar(local));
            let c_body = infer_universe(&bind(ctx, label, dom), &body)
                .map_err(|e| e.within(Crumb::BodyOf(label.clone())))?;
            Ok(Value::Universe(function_check(c_domain, c_body)))
        }
        Term::App(f, arg) => {
            let f_ty = infer(ctx, f).map_err(|e| e.within(Crumb::FnOf))?;
            match f_ty {
                Value::Pi { domain, range, .. } => {
                    let arg_ty = infer(ctx, arg).map_err(|e| e.within(Crumb::ArgOf))?;
                    if !convertible(&arg_ty, &domain) {
                        return Err(mismatch(&domain, &arg_ty).within(Crumb::ArgOf));
                    }
                    Ok(range.apply(eval::eval(arg).rc()))
                }
                other => Err(err(TypeErrorKind::NotAFunction {
                    actual: quote(&other),
                })
                .within(Crumb::FnOf)),
            }
        }
        Term::Let(bindings, body) => {
            let binding = &bindings[0];
            let name = &binding.variable;
            let value_ty = infer(ctx, &binding.value)
                .map_err(|e| e.within(Crumb::LetValue(name.clone())))?;
            if let Some(annotation) = &binding.annotation {
                if !matches!(annotation, Term::Universe(Universe::Sort)) {
                    infer(ctx, annotation)
                        .map_err(|e| e.within(Crumb::LetAnnot(name.clone())))?;
                }
                let annot_val = eval::eval(annotation);
                if !convertible(&annot_val, &value_ty) {
                    return Err(err(TypeErrorKind::InvalidAnnotation {
                        annotation: Some(quote(&annot_val)),
                        actual: quote(&value_ty),
                    })
                    .within(Crumb::LetAnnot(name.clone())));
                }
            }
            let rest = if bindings.len() == 1 {
                (**body).clone()
            } else {
                Term::Let(bindings[1..].to_vec(), body.clone())
            };
            // a let-bound value is substituted, not added to the context,
            // so that type-level bindings stay transparent
            infer(ctx, &open(&rest, name, &binding.value))
        }
        Term::Annot(expr, annotation) => {
            if !matches!(&**annotation, Term::Universe(Universe::Sort)) {
                infer(ctx, annotation).map_err(|e| e.within(Crumb::Annotation))?;
            }
            let actual = infer(ctx, expr).map_err(|e| e.within(Crumb::AnnotatedExpr))?;
            let expected = eval::eval(annotation);
            if !convertible(&expected, &actual) {
                return Err(err(TypeErrorKind::InvalidAnnotation {
                    annotation: Some(quote(&expected)),
                    actual: quote(&actual),
                })
                .within(Crumb::Annotation));
            }
            Ok(actual)
        }
        Term::BoolLit(_) => Ok(Value::Builtin(Builtin::Bool)),
        Term::NaturalLit(_) => Ok(Value::Builtin(Builtin::Natural)),
        Term::IntegerLit(_) => Ok(Value::Builtin(Builtin::Integer)),
        Term::DoubleLit(_) => Ok(Value::Builtin(Builtin::Double)),
        Term::TextLit(text) => {
            let text_ty = Value::Builtin(Builtin::Text);
            for (i, chunk) in text.chunks.iter().enumerate() {
                check_operand(ctx, &chunk.expr, &text_ty, Crumb::TextChunk(i))?;
            }
            Ok(text_ty)
        }
        Term::If(cond, then, otherwise) => {
            check_operand(ctx, cond, &Value::Builtin(Builtin::Bool), Crumb::Condition)?;
            let then_ty = infer(ctx, then).map_err(|e| e.within(Crumb::ThenBranch))?;
            let else_ty = infer(ctx, otherwise).map_err(|e| e.within(Crumb::ElseBranch))?;
            // branches must be terms, not types
            if universe_of(ctx, &then_ty)? != Universe::Type {
                return Err(err(TypeErrorKind::UniverseMismatch).within(Crumb::ThenBranch));
            }
            if universe_of(ctx, &else_ty)? != Universe::Type {
                return Err(err(TypeErrorKind::UniverseMismatch).within(Crumb::ElseBranch));
            }
            if !convertible(&then_ty, &else_ty) {
                return Err(mismatch(&then_ty, &else_ty).within(Crumb::ElseBranch));
            }
            Ok(then_ty)
        }
        Term::Op(code, l, r) => infer_op(ctx, *code, l, r),
        Term::EmptyList(annotation) => {
            infer(ctx, annotation).map_err(|e| e.within(Crumb::Annotation))?;
            let ty = eval::eval(annotation);
            if list_element(&ty).is_none() {
                return Err(err(TypeErrorKind::TypeMismatch {
                    expected: expected_list(),
                    actual: quote(&ty),
                })
                .within(Crumb::Annotation));
            }
            Ok(ty)
        }
        Term::NonEmptyList(xs) => {
            let first = xs
                .first()
                .ok_or_else(|| err(TypeErrorKind::InvalidListElement(0)))?;
            let elem_ty = infer(ctx, first).map_err(|e| e.within(Crumb::ListElement(0)))?;
            if universe_of(ctx, &elem_ty)? != Universe::Type {
                return Err(err(TypeErrorKind::UniverseMismatch).within(Crumb::ListElement(0)));
            }
            for (i, x) in xs.iter().enumerate().skip(1) {
                let ty = infer(ctx, x).map_err(|e| e.within(Crumb::ListElement(i)))?;
                if !convertible(&ty, &elem_ty) {
                    return Err(err(TypeErrorKind::InvalidListElement(i)));
                }
            }
            Ok(Value::App(
                Value::Builtin(Builtin::List).rc(),
                elem_ty.rc(),
            ))
        }
        Term::Some(x) => {
            let ty = infer(ctx, x).map_err(|e| e.within(Crumb::SomeArg))?;
            if universe_of(ctx, &ty)? != Universe::Type {
                return Err(err(TypeErrorKind::UniverseMismatch).within(Crumb::SomeArg));
            }
            Ok(Value::App(
                Value::Builtin(Builtin::Optional).rc(),
                ty.rc(),
            ))
        }
        Term::RecordType(fields) => {
            let mut universe = Universe::Type;
            for (label, ty) in fields.iter() {
                let u = infer_universe(ctx, ty)
                    .map_err(|e| e.within(Crumb::FieldType(label.clone())))?;
                universe = universe.max(u);
            }
            Ok(Value::Universe(universe))
        }
        Term::RecordLit(fields) => {
            let mut types = BTreeMap::new();
            for (label, value) in fields.iter() {
                let ty = infer(ctx, value)
                    .map_err(|e| e.within(Crumb::RecordField(label.clone())))?;
                // the resulting record type must be well-formed
                universe_of(ctx, &ty)
                    .map_err(|e| e.within(Crumb::RecordField(label.clone())))?;
                types.insert(label.clone(), ty.rc());
            }
            Ok(Value::RecordType(FieldMap(types)))
        }
        Term::UnionType(alts) => {
            let mut universe = Universe::Type;
            for (label, ty) in alts.iter() {
                if let Some(ty) = ty {
                    let u = infer_universe(ctx, ty)
                        .map_err(|e| e.within(Crumb::UnionAlt(label.clone())))?;
                    universe = universe.max(u);
                }
            }
            Ok(Value::Universe(universe))
        }
        Term::Field(record, name) => {
            let record_ty =
                infer(ctx, record).map_err(|e| e.within(Crumb::AccessedRecord))?;
            if let Value::RecordType(fields) = &record_ty {
                return match fields.get(name) {
                    Some(ty) => Ok((**ty).clone()),
                    None => Err(err(TypeErrorKind::MissingField(name.clone()))),
                };
            }
            // not a record: the accessed expression may be a union type,
            // in which case the field selects a constructor
            let union = eval::eval(record);
            if let Value::UnionType(alts) = &union {
                return match alts.get(name) {
                    None => Err(err(TypeErrorKind::MissingField(name.clone()))),
                    // an empty alternative is a value of the union itself
                    Some(None) => Ok(union.clone()),
                    Some(Some(alt_ty)) => Ok(Value::Pi {
                        label: name.clone(),
                        domain: alt_ty.clone(),
                        range: Closure::new(
                            name.clone(),
                            Env::default(),
                            Rc::new(quote(&union)),
                            false,
                        ),
                    }),
                };
            }
            Err(err(TypeErrorKind::NotARecord {
                actual: quote(&record_ty),
            })
            .within(Crumb::AccessedRecord))
        }
        Term::Project(record, names) => {
            let record_ty =
                infer(ctx, record).map_err(|e| e.within(Crumb::ProjectedRecord))?;
            let fields = match &record_ty {
                Value::RecordType(fields) => fields,
                _ => {
                    return Err(err(TypeErrorKind::NotARecord {
                        actual: quote(&record_ty),
                    })
                    .within(Crumb::ProjectedRecord))
                }
            };
            let mut seen = BTreeSet::new();
            let mut projected = BTreeMap::new();
            for name in names {
                if !seen.insert(name) {
                    return Err(err(TypeErrorKind::DuplicateField(name.clone())));
                }
                match fields.get(name) {
                    Some(ty) => {
                        projected.insert(name.clone(), ty.clone());
                    }
                    None => return Err(err(TypeErrorKind::MissingField(name.clone()))),
                }
            }
            Ok(Value::RecordType(FieldMap(projected)))
        }
        Term::ProjectType(record, selector) => {
            let record_ty =
                infer(ctx, record).map_err(|e| e.within(Crumb::ProjectedRecord))?;
            let fields = match &record_ty {
                Value::RecordType(fields) => fields,
                _ => {
                    return Err(err(TypeErrorKind::NotARecord {
                        actual: quote(&record_ty),
                    })
                    .within(Crumb::ProjectedRecord))
                }
            };
            infer(ctx, selector).map_err(|e| e.within(Crumb::Selector))?;
            let selected = eval::eval(selector);
            let wanted = match &selected {
                Value::RecordType(wanted) => wanted,
                _ => {
                    return Err(err(TypeErrorKind::NotARecord {
                        actual: quote(&selected),
                    })
                    .within(Crumb::Selector))
                }
            };
            for (name, want) in wanted.iter() {
                match fields.get(name) {
                    None => return Err(err(TypeErrorKind::MissingField(name.clone()))),
                    Some(have) => {
                        if !convertible(want, have) {
                            return Err(mismatch(want, have)
                                .within(Crumb::RecordField(name.clone())));
                        }
                    }
                }
            }
            Ok(selected.clone())
        }
        Term::ToMap(record, annotation) => {
            let record_ty =
                infer(ctx, record).map_err(|e| e.within(Crumb::ToMapRecord))?;
            let fields = match &record_ty {
                Value::RecordType(fields) => fields,
                _ => {
                    return Err(err(TypeErrorKind::NotARecord {
                        actual: quote(&record_ty),
                    })
                    .within(Crumb::ToMapRecord))
                }
            };
            let annot_val = match annotation {
                Some(annotation) => {
                    infer(ctx, annotation).map_err(|e| e.within(Crumb::Annotation))?;
                    Some(eval::eval(annotation))
                }
                None => None,
            };
            if fields.is_empty() {
                // an empty record tells us nothing; the annotation must
                let ty = annot_val.ok_or_else(|| {
                    err(TypeErrorKind::InvalidAnnotation {
                        annotation: None,
                        actual: quote(&record_ty),
                    })
                })?;
                if !valid_map_type(&ty) {
                    return Err(err(TypeErrorKind::InvalidAnnotation {
                        annotation: Some(quote(&ty)),
                        actual: quote(&record_ty),
                    })
                    .within(Crumb::Annotation));
                }
                return Ok(ty);
            }
            let mut values = fields.values();
            let entry_ty = values.next().expect("record is non-empty").clone();
            if universe_of(ctx, &entry_ty)? != Universe::Type {
                return Err(err(TypeErrorKind::UniverseMismatch).within(Crumb::ToMapRecord));
            }
            for ty in values {
                if !convertible(ty, &entry_ty) {
                    return Err(mismatch(&entry_ty, ty).within(Crumb::ToMapRecord));
                }
            }
            let entry = Value::RecordType(FieldMap(BTreeMap::from([
                (
                    Label::from("mapKey"),
                    Value::Builtin(Builtin::Text).rc(),
                ),
                (Label::from("mapValue"), entry_ty),
            ])));
            let result = Value::App(Value::Builtin(Builtin::List).rc(), entry.rc());
            if let Some(annot) = &annot_val {
                if !convertible(annot, &result) {
                    return Err(err(TypeErrorKind::InvalidAnnotation {
                        annotation: Some(quote(annot)),
                        actual: quote(&result),
                    })
                    .within(Crumb::Annotation));
                }
            }
            Ok(result)
        }
        Term::Merge(handlers, union, annotation) => {
            let handlers_ty =
                infer(ctx, handlers).map_err(|e| e.within(Crumb::MergeHandler))?;
            let handler_fields = match &handlers_ty {
                Value::RecordType(fields) => fields,
                _ => {
                    return Err(err(TypeErrorKind::NotARecord {
                        actual: quote(&handlers_ty),
                    })
                    .within(Crumb::MergeHandler))
                }
            };
            let union_ty = infer(ctx, union).map_err(|e| e.within(Crumb::MergeUnion))?;
            let alts = match &union_ty {
                Value::UnionType(alts) => alts,
                _ => {
                    return Err(err(TypeErrorKind::NotAUnion {
                        actual: quote(&union_ty),
                    })
                    .within(Crumb::MergeUnion))
                }
            };
            for label in handler_fields.keys() {
                if !alts.contains_key(label) {
                    return Err(err(TypeErrorKind::HandlerMismatch(label.clone())));
                }
            }
            let mut result: Option<RValue> = match annotation {
                Some(annotation) => {
                    infer(ctx, annotation).map_err(|e| e.within(Crumb::Annotation))?;
                    Some(eval::eval(annotation).rc())
                }
                None => None,
            };
            for (label, alt) in alts.iter() {
                let handler = handler_fields
                    .get(label)
                    .ok_or_else(|| err(TypeErrorKind::HandlerMismatch(label.clone())))?;
                let candidate = match alt {
                    // an empty alternative is handled by a plain value
                    None => (**handler).clone(),
                    Some(alt_ty) => match &**handler {
                        Value::Pi { domain, range, .. } => {
                            if !convertible(domain, alt_ty) {
                                return Err(err(TypeErrorKind::HandlerMismatch(
                                    label.clone(),
                                )));
                            }
                            let opaque = Value::LocalVar(fresh(ctx, label));
                            range.apply(opaque.rc())
                        }
                        _ => {
                            return Err(err(TypeErrorKind::HandlerMismatch(label.clone())))
                        }
                    },
                };
                match &result {
                    None => result = Some(candidate.rc()),
                    Some(previous) => {
                        if !convertible(previous, &candidate) {
                            return Err(err(TypeErrorKind::HandlerMismatch(label.clone())));
                        }
                    }
                }
            }
            match result {
                Some(ty) => Ok((*ty).clone()),
                None => Err(err(TypeErrorKind::InvalidAnnotation {
                    annotation: None,
                    actual: quote(&union_ty),
                })),
            }
        }
        Term::Assert(annotation) => {
            let annot_ty =
                infer(ctx, annotation).map_err(|e| e.within(Crumb::AssertAnnot))?;
            if !convertible(&annot_ty, &Value::Universe(Universe::Type)) {
                return Err(err(TypeErrorKind::UniverseMismatch).within(Crumb::AssertAnnot));
            }
            let annot_val = eval::eval(annotation);
            if let Value::Op(OpCode::Equiv, l, r) = &annot_val {
                if !convertible(l, r) {
                    return Err(err(TypeErrorKind::UnequivalentAssertion {
                        left: quote(l),
                        right: quote(r),
                    }));
                }
            } else {
                return Err(err(TypeErrorKind::TypeMismatch {
                    expected: Term::op(OpCode::Equiv, Term::var("_"), Term::var("_")),
                    actual: quote(&annot_val),
                })
                .within(Crumb::AssertAnnot));
            }
            Ok(annot_val)
        }
    }
}

/// A `List { mapKey : Text, mapValue : _ }` type, as required by the
/// annotation of `toMap` on an empty record.
fn valid_map_type(ty: &Value) -> bool {
    let entry = match list_element(ty) {
        Some(entry) => entry,
        None => return false,
    };
    match &**entry {
        Value::RecordType(fields) => {
            fields.len() == 2
                && fields
                    .get("mapKey")
                    .is_some_and(|k| matches!(&**k, Value::Builtin(Builtin::Text)))
                && fields.contains_key("mapValue")
        }
        _ => false,
    }
}

fn infer_op(ctx: &Ctx, code: OpCode, l: &Term, r: &Term) -> Result<Value> {
    let bool_ty = Value::Builtin(Builtin::Bool);
    let natural_ty = Value::Builtin(Builtin::Natural);
    let text_ty = Value::Builtin(Builtin::Text);
    match code {
        OpCode::Or | OpCode::And | OpCode::Eq | OpCode::Ne => {
            check_operand(ctx, l, &bool_ty, Crumb::OpLeft(code))?;
            check_operand(ctx, r, &bool_ty, Crumb::OpRight(code))?;
            Ok(bool_ty)
        }
        OpCode::Plus | OpCode::Times => {
            check_operand(ctx, l, &natural_ty, Crumb::OpLeft(code))?;
            check_operand(ctx, r, &natural_ty, Crumb::OpRight(code))?;
            Ok(natural_ty)
        }
        OpCode::TextAppend => {
            check_operand(ctx, l, &text_ty, Crumb::OpLeft(code))?;
            check_operand(ctx, r, &text_ty, Crumb::OpRight(code))?;
            Ok(text_ty)
        }
        OpCode::ListAppend => {
            let l_ty = infer(ctx, l).map_err(|e| e.within(Crumb::OpLeft(code)))?;
            if list_element(&l_ty).is_none() {
                return Err(err(TypeErrorKind::TypeMismatch {
                    expected: expected_list(),
                    actual: quote(&l_ty),
                })
                .within(Crumb::OpLeft(code)));
            }
            let r_ty = infer(ctx, r).map_err(|e| e.within(Crumb::OpRight(code)))?;
            if list_element(&r_ty).is_none() {
                return Err(err(TypeErrorKind::TypeMismatch {
                    expected: expected_list(),
                    actual: quote(&r_ty),
                })
                .within(Crumb::OpRight(code)));
            }
            if !convertible(&l_ty, &r_ty) {
                return Err(mismatch(&l_ty, &r_ty).within(Crumb::OpRight(code)));
            }
            Ok(l_ty)
        }
        OpCode::RecordMerge => {
            let l_ty = infer(ctx, l).map_err(|e| e.within(Crumb::OpLeft(code)))?;
            let r_ty = infer(ctx, r).map_err(|e| e.within(Crumb::OpRight(code)))?;
            match (&l_ty, &r_ty) {
                (Value::RecordType(ls), Value::RecordType(rs)) => {
                    let merged = merge_record_types(ls, rs)
                        .map_err(|label| err(TypeErrorKind::DuplicateField(label)))?;
                    Ok(Value::RecordType(merged))
                }
                (Value::RecordType(_), other) | (other, _) => {
                    Err(err(TypeErrorKind::NotARecord {
                        actual: quote(other),
                    }))
                }
            }
        }
        OpCode::RecordTypeMerge => {
            let c_l = infer_universe(ctx, l).map_err(|e| e.within(Crumb::OpLeft(code)))?;
            let c_r = infer_universe(ctx, r).map_err(|e| e.within(Crumb::OpRight(code)))?;
            let l_val = eval::eval(l);
            let r_val = eval::eval(r);
            match (&l_val, &r_val) {
                (Value::RecordType(ls), Value::RecordType(rs)) => {
                    // merging must succeed for the combined type to exist
                    merge_record_types(ls, rs)
                        .map_err(|label| err(TypeErrorKind::DuplicateField(label)))?;
                    Ok(Value::Universe(c_l.max(c_r)))
                }
                (Value::RecordType(_), other) | (other, _) => {
                    Err(err(TypeErrorKind::NotARecord {
                        actual: quote(other),
                    }))
                }
            }
        }
        OpCode::RightBiasedRecordMerge => {
            let l_ty = infer(ctx, l).map_err(|e| e.within(Crumb::OpLeft(code)))?;
            let r_ty = infer(ctx, r).map_err(|e| e.within(Crumb::OpRight(code)))?;
            match (&l_ty, &r_ty) {
                (Value::RecordType(ls), Value::RecordType(rs)) => {
                    let mut merged = ls.0.clone();
                    for (k, v) in rs.iter() {
                        merged.insert(k.clone(), v.clone());
                    }
                    Ok(Value::RecordType(FieldMap(merged)))
                }
                (Value::RecordType(_), other) | (other, _) => {
                    Err(err(TypeErrorKind::NotARecord {
                        actual: quote(other),
                    }))
                }
            }
        }
        OpCode::ImportAlt => infer(ctx, l),
        OpCode::Equiv => {
            let l_ty = infer(ctx, l).map_err(|e| e.within(Crumb::OpLeft(code)))?;
            let r_ty = infer(ctx, r).map_err(|e| e.within(Crumb::OpRight(code)))?;
            if universe_of(ctx, &l_ty)? != Universe::Type {
                return Err(err(TypeErrorKind::UniverseMismatch).within(Crumb::OpLeft(code)));
            }
            if !convertible(&l_ty, &r_ty) {
                return Err(mismatch(&l_ty, &r_ty).within(Crumb::OpRight(code)));
            }
            Ok(Value::Universe(Universe::Type))
        }
        OpCode::Complete => {
            let desugared = Term::annot(
                Term::op(
                    OpCode::RightBiasedRecordMerge,
                    Term::field(l.clone(), "default"),
                    r.clone(),
                ),
                Term::field(l.clone(), "Type"),
            );
            infer(ctx, &desugared)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::eval::eval;
    use alloc::borrow::ToOwned;
    use alloc::boxed::Box;
    use alloc::vec::Vec;

    fn b(builtin: Builtin) -> Term {
        Term::Builtin(builtin)
    }

    fn natural() -> Term {
        b(Builtin::Natural)
    }

    fn nat(n: u64) -> Term {
        Term::NaturalLit(n)
    }

    fn ty_type() -> Term {
        Term::Universe(Universe::Type)
    }

    /// Inferred type, read back as a term.
    fn ty(t: &Term) -> Term {
        quote(&type_of(t).unwrap())
    }

    fn fails(t: &Term) -> TypeError {
        type_of(t).unwrap_err()
    }

    #[test]
    fn function_check_table() {
        use Universe::*;
        let cases = [
            (Type, Type, Type),
            (Kind, Type, Type),
            (Sort, Type, Type),
            (Type, Kind, Kind),
            (Kind, Kind, Kind),
            (Sort, Kind, Sort),
            (Type, Sort, Sort),
            (Kind, Sort, Sort),
            (Sort, Sort, Sort),
        ];
        for (domain, codomain, expected) in cases {
            assert_eq!(function_check(domain, codomain), expected);
        }
    }

    #[test]
    fn universes() {
        assert_eq!(ty(&ty_type()), Term::Universe(Universe::Kind));
        assert_eq!(
            ty(&Term::Universe(Universe::Kind)),
            Term::Universe(Universe::Sort)
        );
        // Sort has no type
        assert!(matches!(
            fails(&Term::Universe(Universe::Sort)).kind,
            TypeErrorKind::UniverseMismatch
        ));
    }

    #[test]
    fn builtins_and_literals() {
        assert_eq!(ty(&natural()), ty_type());
        assert_eq!(ty(&b(Builtin::List)), Term::arrow(ty_type(), ty_type()));
        assert_eq!(ty(&nat(3)), natural());
        assert_eq!(ty(&Term::BoolLit(true)), b(Builtin::Bool));
        assert_eq!(ty(&Term::IntegerLit(-3)), b(Builtin::Integer));
        assert_eq!(ty(&Term::double(3.5)), b(Builtin::Double));
        assert_eq!(ty(&Term::text("hi")), b(Builtin::Text));
    }

    #[test]
    fn unbound_variables_are_reported() {
        assert!(matches!(
            fails(&Term::var("x")).kind,
            TypeErrorKind::UnboundVariable(_)
        ));
    }

    #[test]
    fn lambda_types() {
        let id = Term::lam("x", natural(), Term::var("x"));
        assert_eq!(ty(&id), Term::pi("x", natural(), natural()));

        // the bound variable may appear in the inferred body type
        let polymorphic_nil = Term::lam(
            "a",
            ty_type(),
            Term::EmptyList(Box::new(Term::app(b(Builtin::List), Term::var("a")))),
        );
        assert_eq!(
            ty(&polymorphic_nil),
            Term::pi("a", ty_type(), Term::app(b(Builtin::List), Term::var("a")))
        );

        let reflexive = Term::lam(
            "a",
            natural(),
            Term::Assert(Box::new(Term::op(
                OpCode::Equiv,
                Term::var("a"),
                Term::var("a"),
            ))),
        );
        assert_eq!(
            ty(&reflexive),
            Term::pi(
                "a",
                natural(),
                Term::op(OpCode::Equiv, Term::var("a"), Term::var("a"))
            )
        );
    }

    #[test]
    fn pi_types() {
        assert_eq!(ty(&Term::arrow(natural(), natural())), ty_type());
        // the codomain lives in Type, so the whole Π-type does too
        assert_eq!(ty(&Term::pi("a", ty_type(), Term::var("a"))), ty_type());
        // a type-level function space lives in Kind
        assert_eq!(
            ty(&Term::arrow(ty_type(), ty_type())),
            Term::Universe(Universe::Kind)
        );
    }

    #[test]
    fn applications() {
        assert_eq!(ty(&Term::app(b(Builtin::List), natural())), ty_type());

        // the argument flows into the result type
        let reflexive = Term::lam(
            "a",
            natural(),
            Term::Assert(Box::new(Term::op(
                OpCode::Equiv,
                Term::var("a"),
                Term::var("a"),
            ))),
        );
        assert_eq!(
            ty(&Term::app(reflexive, nat(3))),
            Term::op(OpCode::Equiv, nat(3), nat(3))
        );
    }

    #[test]
    fn application_failures() {
        // function that does not typecheck
        assert!(type_of(&Term::app(Term::Universe(Universe::Sort), ty_type())).is_err());
        // argument that does not typecheck
        assert!(type_of(&Term::app(b(Builtin::List), Term::Universe(Universe::Sort))).is_err());
        // argument of the wrong type
        assert!(matches!(
            fails(&Term::app(b(Builtin::List), nat(3))).kind,
            TypeErrorKind::TypeMismatch { .. }
        ));
        // not a function at all
        assert!(matches!(
            fails(&Term::app(natural(), natural())).kind,
            TypeErrorKind::NotAFunction { .. }
        ));
    }

    #[test]
    fn empty_lists() {
        let t = Term::EmptyList(Box::new(Term::app(b(Builtin::List), natural())));
        assert_eq!(ty(&t), Term::app(b(Builtin::List), natural()));

        // not of the form List a
        assert!(matches!(
            fails(&Term::EmptyList(Box::new(natural()))).kind,
            TypeErrorKind::TypeMismatch { .. }
        ));
        // List applied to a non-type
        assert!(type_of(&Term::EmptyList(Box::new(Term::app(b(Builtin::List), nat(3))))).is_err());
    }

    #[test]
    fn list_literals() {
        let t = Term::NonEmptyList(Vec::from([nat(1), nat(2)]));
        assert_eq!(ty(&t), Term::app(b(Builtin::List), natural()));

        let mixed = Term::NonEmptyList(Vec::from([nat(1), Term::BoolLit(true)]));
        assert!(matches!(
            fails(&mixed).kind,
            TypeErrorKind::InvalidListElement(1)
        ));
    }

    #[test]
    fn optionals() {
        assert_eq!(
            ty(&Term::some(nat(1))),
            Term::app(b(Builtin::Optional), natural())
        );
        assert_eq!(
            ty(&Term::app(b(Builtin::None), natural())),
            Term::app(b(Builtin::Optional), natural())
        );
    }

    #[test]
    fn let_substitutes_types_and_values() {
        let t = Term::Let(
            Vec::from([crate::term::Binding {
                variable: "a".to_owned(),
                annotation: None,
                value: natural(),
            }]),
            Box::new(Term::EmptyList(Box::new(Term::app(
                b(Builtin::List),
                Term::var("a"),
            )))),
        );
        assert_eq!(ty(&t), Term::app(b(Builtin::List), natural()));

        let annotated = Term::Let(
            Vec::from([crate::term::Binding {
                variable: "x".to_owned(),
                annotation: Some(natural()),
                value: nat(1),
            }]),
            Box::new(Term::var("x")),
        );
        assert_eq!(ty(&annotated), natural());

        let wrong = Term::Let(
            Vec::from([crate::term::Binding {
                variable: "x".to_owned(),
                annotation: Some(b(Builtin::Bool)),
                value: nat(1),
            }]),
            Box::new(Term::var("x")),
        );
        assert!(matches!(
            fails(&wrong).kind,
            TypeErrorKind::InvalidAnnotation { .. }
        ));
    }

    #[test]
    fn annotations() {
        assert_eq!(ty(&Term::annot(nat(1), natural())), natural());
        assert_eq!(
            ty(&Term::annot(
                Term::Universe(Universe::Kind),
                Term::Universe(Universe::Sort)
            )),
            Term::Universe(Universe::Sort)
        );
        assert!(matches!(
            fails(&Term::annot(nat(1), b(Builtin::Bool))).kind,
            TypeErrorKind::InvalidAnnotation { .. }
        ));
    }

    #[test]
    fn if_expressions() {
        let t = Term::If(
            Box::new(Term::BoolLit(true)),
            Box::new(nat(1)),
            Box::new(nat(2)),
        );
        assert_eq!(ty(&t), natural());

        let not_bool = Term::If(Box::new(nat(1)), Box::new(nat(1)), Box::new(nat(2)));
        assert!(matches!(
            fails(&not_bool).kind,
            TypeErrorKind::TypeMismatch { .. }
        ));

        let mismatched = Term::If(
            Box::new(Term::BoolLit(true)),
            Box::new(nat(1)),
            Box::new(Term::BoolLit(false)),
        );
        assert!(matches!(
            fails(&mismatched).kind,
            TypeErrorKind::TypeMismatch { .. }
        ));

        // branches must be terms, not types
        let type_branch = Term::If(
            Box::new(Term::BoolLit(true)),
            Box::new(natural()),
            Box::new(natural()),
        );
        assert!(matches!(
            fails(&type_branch).kind,
            TypeErrorKind::UniverseMismatch
        ));
    }

    #[test]
    fn operator_types() {
        assert_eq!(
            ty(&Term::op(OpCode::Plus, nat(1), nat(2))),
            natural()
        );
        assert_eq!(
            ty(&Term::op(OpCode::And, Term::BoolLit(true), Term::BoolLit(false))),
            b(Builtin::Bool)
        );
        assert_eq!(
            ty(&Term::op(OpCode::TextAppend, Term::text("a"), Term::text("b"))),
            b(Builtin::Text)
        );
        assert_eq!(
            ty(&Term::op(
                OpCode::ListAppend,
                Term::NonEmptyList(Vec::from([nat(1)])),
                Term::NonEmptyList(Vec::from([nat(2)])),
            )),
            Term::app(b(Builtin::List), natural())
        );
        assert!(matches!(
            fails(&Term::op(OpCode::Plus, nat(1), Term::BoolLit(true))).kind,
            TypeErrorKind::TypeMismatch { .. }
        ));
        assert!(matches!(
            fails(&Term::op(
                OpCode::ListAppend,
                Term::NonEmptyList(Vec::from([nat(1)])),
                Term::NonEmptyList(Vec::from([Term::BoolLit(true)])),
            ))
            .kind,
            TypeErrorKind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn record_types_and_literals() {
        let lit = Term::record_lit([
            ("a".to_owned(), nat(1)),
            ("b".to_owned(), Term::BoolLit(true)),
        ])
        .unwrap();
        let expected = Term::record_type([
            ("a".to_owned(), natural()),
            ("b".to_owned(), b(Builtin::Bool)),
        ])
        .unwrap();
        assert_eq!(ty(&lit), expected);
        assert_eq!(ty(&expected), ty_type());

        // a record type of types lives one universe up
        let kinded = Term::record_type([("a".to_owned(), ty_type())]).unwrap();
        assert_eq!(ty(&kinded), Term::Universe(Universe::Kind));
    }

    #[test]
    fn field_selection() {
        let lit = Term::record_lit([("a".to_owned(), nat(1))]).unwrap();
        assert_eq!(ty(&Term::field(lit.clone(), "a")), natural());
        assert!(matches!(
            fails(&Term::field(lit, "b")).kind,
            TypeErrorKind::MissingField(_)
        ));
        assert!(matches!(
            fails(&Term::field(nat(1), "a")).kind,
            TypeErrorKind::NotARecord { .. }
        ));
    }

    #[test]
    fn projections() {
        let lit = Term::record_lit([
            ("a".to_owned(), nat(1)),
            ("b".to_owned(), Term::BoolLit(true)),
        ])
        .unwrap();
        let t = Term::Project(Box::new(lit.clone()), Vec::from(["a".to_owned()]));
        assert_eq!(
            ty(&t),
            Term::record_type([("a".to_owned(), natural())]).unwrap()
        );

        let missing = Term::Project(Box::new(lit.clone()), Vec::from(["c".to_owned()]));
        assert!(matches!(
            fails(&missing).kind,
            TypeErrorKind::MissingField(_)
        ));

        let duplicated = Term::Project(
            Box::new(lit.clone()),
            Vec::from(["a".to_owned(), "a".to_owned()]),
        );
        assert!(matches!(
            fails(&duplicated).kind,
            TypeErrorKind::DuplicateField(_)
        ));

        let by_type = Term::ProjectType(
            Box::new(lit),
            Box::new(Term::record_type([("a".to_owned(), natural())]).unwrap()),
        );
        assert_eq!(
            ty(&by_type),
            Term::record_type([("a".to_owned(), natural())]).unwrap()
        );
    }

    #[test]
    fn union_constructors() {
        let union = Term::union_type([
            ("A".to_owned(), Some(natural())),
            ("B".to_owned(), None),
        ])
        .unwrap();
        assert_eq!(ty(&union), ty_type());
        // a payload-carrying alternative selects a constructor function
        assert_eq!(
            ty(&Term::field(union.clone(), "A")),
            Term::pi("A", natural(), union.clone())
        );
        // an empty alternative is a value of the union itself
        assert_eq!(ty(&Term::field(union.clone(), "B")), union);
        assert!(matches!(
            fails(&Term::field(union, "C")).kind,
            TypeErrorKind::MissingField(_)
        ));
    }

    #[test]
    fn merge_typing() {
        let union = Term::union_type([
            ("A".to_owned(), Some(natural())),
            ("B".to_owned(), None),
        ])
        .unwrap();
        let handlers = Term::record_lit([
            (
                "A".to_owned(),
                Term::lam(
                    "n",
                    natural(),
                    Term::op(OpCode::Plus, Term::var("n"), nat(1)),
                ),
            ),
            ("B".to_owned(), nat(0)),
        ])
        .unwrap();
        let t = Term::Merge(
            Box::new(handlers.clone()),
            Box::new(Term::app(Term::field(union.clone(), "A"), nat(5))),
            None,
        );
        assert_eq!(ty(&t), natural());

        // handler domain must match the alternative payload
        let wrong = Term::record_lit([
            (
                "A".to_owned(),
                Term::lam("x", b(Builtin::Bool), Term::var("x")),
            ),
            ("B".to_owned(), Term::BoolLit(true)),
        ])
        .unwrap();
        let t = Term::Merge(
            Box::new(wrong),
            Box::new(Term::field(union.clone(), "B")),
            None,
        );
        assert!(matches!(
            fails(&t).kind,
            TypeErrorKind::HandlerMismatch(_)
        ));

        // every alternative needs its handler
        let partial = Term::record_lit([("B".to_owned(), nat(0))]).unwrap();
        let t = Term::Merge(
            Box::new(partial),
            Box::new(Term::field(union, "B")),
            None,
        );
        assert!(matches!(
            fails(&t).kind,
            TypeErrorKind::HandlerMismatch(_)
        ));
    }

    #[test]
    fn to_map_typing() {
        let record = Term::record_lit([
            ("a".to_owned(), nat(1)),
            ("b".to_owned(), nat(2)),
        ])
        .unwrap();
        let expected = Term::app(
            b(Builtin::List),
            Term::record_type([
                ("mapKey".to_owned(), b(Builtin::Text)),
                ("mapValue".to_owned(), natural()),
            ])
            .unwrap(),
        );
        assert_eq!(ty(&Term::ToMap(Box::new(record), None)), expected);

        // empty records need an annotation
        let empty = Term::record_lit([]).unwrap();
        assert!(matches!(
            fails(&Term::ToMap(Box::new(empty.clone()), None)).kind,
            TypeErrorKind::InvalidAnnotation { .. }
        ));
        assert_eq!(
            ty(&Term::ToMap(
                Box::new(empty),
                Some(Box::new(expected.clone()))
            )),
            expected
        );

        // fields must all have the same type
        let mixed = Term::record_lit([
            ("a".to_owned(), nat(1)),
            ("b".to_owned(), Term::BoolLit(true)),
        ])
        .unwrap();
        assert!(matches!(
            fails(&Term::ToMap(Box::new(mixed), None)).kind,
            TypeErrorKind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn record_merge_operators() {
        let l = Term::record_lit([("a".to_owned(), nat(1))]).unwrap();
        let r = Term::record_lit([("b".to_owned(), Term::BoolLit(true))]).unwrap();
        let merged_ty = Term::record_type([
            ("a".to_owned(), natural()),
            ("b".to_owned(), b(Builtin::Bool)),
        ])
        .unwrap();
        assert_eq!(ty(&Term::op(OpCode::RecordMerge, l.clone(), r.clone())), merged_ty);
        assert_eq!(
            ty(&Term::op(OpCode::RightBiasedRecordMerge, l.clone(), r)),
            merged_ty
        );

        // colliding non-record fields cannot merge recursively
        let r = Term::record_lit([("a".to_owned(), nat(2))]).unwrap();
        assert!(matches!(
            fails(&Term::op(OpCode::RecordMerge, l, r)).kind,
            TypeErrorKind::DuplicateField(_)
        ));

        let lt = Term::record_type([("a".to_owned(), natural())]).unwrap();
        let rt = Term::record_type([("b".to_owned(), b(Builtin::Bool))]).unwrap();
        assert_eq!(
            ty(&Term::op(OpCode::RecordTypeMerge, lt.clone(), rt)),
            ty_type()
        );
        let colliding = Term::record_type([("a".to_owned(), b(Builtin::Bool))]).unwrap();
        assert!(matches!(
            fails(&Term::op(OpCode::RecordTypeMerge, lt, colliding)).kind,
            TypeErrorKind::DuplicateField(_)
        ));
    }

    #[test]
    fn equivalence_and_assert() {
        // an equivalence is a type regardless of whether it holds
        assert_eq!(ty(&Term::op(OpCode::Equiv, nat(3), nat(4))), ty_type());

        let holds = Term::Assert(Box::new(Term::op(
            OpCode::Equiv,
            nat(3),
            Term::op(OpCode::Plus, nat(1), nat(2)),
        )));
        assert_eq!(ty(&holds), Term::op(OpCode::Equiv, nat(3), nat(3)));

        let fails_eq = Term::Assert(Box::new(Term::op(OpCode::Equiv, nat(3), nat(4))));
        assert!(matches!(
            fails(&fails_eq).kind,
            TypeErrorKind::UnequivalentAssertion { .. }
        ));

        assert!(matches!(
            fails(&Term::op(OpCode::Equiv, nat(3), Term::BoolLit(true))).kind,
            TypeErrorKind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn complete_typing() {
        let schema = Term::record_lit([
            (
                "default".to_owned(),
                Term::record_lit([("a".to_owned(), nat(1))]).unwrap(),
            ),
            (
                "Type".to_owned(),
                Term::record_type([("a".to_owned(), natural())]).unwrap(),
            ),
        ])
        .unwrap();
        let t = Term::op(
            OpCode::Complete,
            schema,
            Term::record_lit([("a".to_owned(), nat(2))]).unwrap(),
        );
        assert_eq!(
            ty(&t),
            Term::record_type([("a".to_owned(), natural())]).unwrap()
        );
    }

    #[test]
    fn alpha_insensitivity() {
        let f = Term::lam("x", natural(), Term::var("x"));
        let g = Term::lam("y", natural(), Term::var("y"));
        assert!(convertible(
            &type_of(&f).unwrap(),
            &type_of(&g).unwrap()
        ));
        assert_eq!(
            quote(&crate::kernel::alpha_beta_eval(&f)),
            quote(&crate::kernel::alpha_beta_eval(&g))
        );
    }

    #[test]
    fn type_preservation_through_normalization() {
        let terms = [
            Term::app(
                Term::lam(
                    "x",
                    natural(),
                    Term::op(OpCode::Plus, Term::var("x"), nat(1)),
                ),
                nat(4),
            ),
            Term::ToMap(
                Box::new(Term::record_lit([("a".to_owned(), nat(1))]).unwrap()),
                None,
            ),
            Term::lam("x", natural(), Term::op(OpCode::Plus, Term::var("x"), nat(0))),
        ];
        for t in terms {
            let before = type_of(&t).unwrap();
            let after = type_of(&quote(&eval(&t))).unwrap();
            assert!(convertible(&before, &after));
        }
    }

    #[test]
    fn lambda_whose_body_type_has_no_universe_is_rejected() {
        // λ(x : Bool) → Kind would need the type ∀(x : Bool) → Sort,
        // and Sort itself has no type
        let t = Term::lam("x", b(Builtin::Bool), Term::Universe(Universe::Kind));
        assert!(matches!(
            fails(&t).kind,
            TypeErrorKind::UniverseMismatch
        ));
    }
}

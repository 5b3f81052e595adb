//! Types and reduction rules of the built-in constants.

use super::convertible::convertible;
use super::eval::apply_val;
use crate::term::{Builtin, FieldMap, OpCode, Term, TextLit, Universe};
use crate::value::{env_insert, Closure, Env, RValue, Value};
use alloc::collections::btree_map::BTreeMap;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// Number of arguments a builtin must see before its δ-rule can fire.
/// Constants and type formers have arity 0 and never reduce.
fn arity(b: Builtin) -> usize {
    use Builtin::*;
    match b {
        NaturalBuild | NaturalIsZero | NaturalEven | NaturalOdd | NaturalToInteger
        | NaturalShow | IntegerShow | IntegerToDouble | DoubleShow | TextShow => 1,
        NaturalSubtract | ListBuild | ListLength | ListHead | ListLast | ListIndexed
        | ListReverse | OptionalBuild => 2,
        NaturalFold => 4,
        ListFold | OptionalFold => 5,
        _ => 0,
    }
}

/// The type of a builtin, as a closed term.
pub(crate) fn builtin_type(b: Builtin) -> Term {
    use Builtin::*;
    let t = |b| Term::Builtin(b);
    let ty = || Term::Universe(Universe::Type);
    match b {
        Bool | Natural | Integer | Double | Text => ty(),
        List | Optional => Term::arrow(ty(), ty()),
        True | False => t(Bool),
        None => Term::pi("A", ty(), Term::app(t(Optional), Term::var("A"))),
        NaturalBuild => Term::arrow(
            Term::pi(
                "natural",
                ty(),
                Term::arrow(
                    Term::arrow(Term::var("natural"), Term::var("natural")),
                    Term::arrow(Term::var("natural"), Term::var("natural")),
                ),
            ),
            t(Natural),
        ),
        NaturalFold => Term::arrow(
            t(Natural),
            Term::pi(
                "natural",
                ty(),
                Term::arrow(
                    Term::arrow(Term::var("natural"), Term::var("natural")),
                    Term::arrow(Term::var("natural"), Term::var("natural")),
                ),
            ),
        ),
        NaturalIsZero | NaturalEven | NaturalOdd => Term::arrow(t(Natural), t(Bool)),
        NaturalToInteger => Term::arrow(t(Natural), t(Integer)),
        NaturalShow => Term::arrow(t(Natural), t(Text)),
        NaturalSubtract => Term::arrow(t(Natural), Term::arrow(t(Natural), t(Natural))),
        IntegerShow => Term::arrow(t(Integer), t(Text)),
        IntegerToDouble => Term::arrow(t(Integer), t(Double)),
        DoubleShow => Term::arrow(t(Double), t(Text)),
        TextShow => Term::arrow(t(Text), t(Text)),
        ListBuild => Term::pi(
            "a",
            ty(),
            Term::arrow(
                Term::pi(
                    "list",
                    ty(),
                    Term::arrow(
                        Term::arrow(
                            Term::var("a"),
                            Term::arrow(Term::var("list"), Term::var("list")),
                        ),
                        Term::arrow(Term::var("list"), Term::var("list")),
                    ),
                ),
                Term::app(t(List), Term::var("a")),
            ),
        ),
        ListFold => Term::pi(
            "a",
            ty(),
            Term::arrow(
                Term::app(t(List), Term::var("a")),
                Term::pi(
                    "list",
                    ty(),
                    Term::arrow(
                        Term::arrow(
                            Term::var("a"),
                            Term::arrow(Term::var("list"), Term::var("list")),
                        ),
                        Term::arrow(Term::var("list"), Term::var("list")),
                    ),
                ),
            ),
        ),
        ListLength => Term::pi(
            "a",
            ty(),
            Term::arrow(Term::app(t(List), Term::var("a")), t(Natural)),
        ),
        ListHead | ListLast => Term::pi(
            "a",
            ty(),
            Term::arrow(
                Term::app(t(List), Term::var("a")),
                Term::app(t(Optional), Term::var("a")),
            ),
        ),
        ListIndexed => Term::pi(
            "a",
            ty(),
            Term::arrow(
                Term::app(t(List), Term::var("a")),
                Term::app(
                    t(List),
                    Term::RecordType(FieldMap(BTreeMap::from([
                        ("index".to_string(), t(Natural)),
                        ("value".to_string(), Term::var("a")),
                    ]))),
                ),
            ),
        ),
        ListReverse => Term::pi(
            "a",
            ty(),
            Term::arrow(
                Term::app(t(List), Term::var("a")),
                Term::app(t(List), Term::var("a")),
            ),
        ),
        OptionalBuild => Term::pi(
            "a",
            ty(),
            Term::arrow(
                Term::pi(
                    "optional",
                    ty(),
                    Term::arrow(
                        Term::arrow(Term::var("a"), Term::var("optional")),
                        Term::arrow(Term::var("optional"), Term::var("optional")),
                    ),
                ),
                Term::app(t(Optional), Term::var("a")),
            ),
        ),
        OptionalFold => Term::pi(
            "a",
            ty(),
            Term::arrow(
                Term::app(t(Optional), Term::var("a")),
                Term::pi(
                    "optional",
                    ty(),
                    Term::arrow(
                        Term::arrow(Term::var("a"), Term::var("optional")),
                        Term::arrow(Term::var("optional"), Term::var("optional")),
                    ),
                ),
            ),
        ),
    }
}

/// Quote a string the way `Text/show` does.
fn text_show(s: &str) -> String {
    let mut out = String::from("\"");
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\u0024"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&alloc::format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn text_lit(s: String) -> Value {
    Value::TextLit(TextLit::from_str(s))
}

/// A host-made lambda: `display` is the binder label to read back, `label`
/// the one the body refers to, `env` pre-binds any values the body needs.
fn lam(display: &str, label: &str, domain: RValue, env: Env, body: Term, alpha: bool) -> Value {
    Value::Lam {
        label: if alpha { "_".into() } else { display.into() },
        domain,
        closure: Closure::new(label, env, Rc::new(body), alpha),
    }
}

/// Try to fire the δ-rule of `b` on a full argument spine.
///
/// `None` means the rule cannot fire — too few arguments, or an argument
/// that is not concrete enough — and the application stays neutral.
pub(crate) fn apply(b: Builtin, args: &[RValue], alpha: bool) -> Option<Value> {
    use Builtin::*;
    if args.len() != arity(b) {
        return Option::None;
    }
    match b {
        NaturalIsZero => match &*args[0] {
            Value::NaturalLit(n) => Some(Value::BoolLit(*n == 0)),
            _ => Option::None,
        },
        NaturalEven => match &*args[0] {
            Value::NaturalLit(n) => Some(Value::BoolLit(n % 2 == 0)),
            _ => Option::None,
        },
        NaturalOdd => match &*args[0] {
            Value::NaturalLit(n) => Some(Value::BoolLit(n % 2 == 1)),
            _ => Option::None,
        },
        NaturalToInteger => match &*args[0] {
            Value::NaturalLit(n) => Some(Value::IntegerLit(*n as i64)),
            _ => Option::None,
        },
        NaturalShow => match &*args[0] {
            Value::NaturalLit(n) => Some(text_lit(n.to_string())),
            _ => Option::None,
        },
        NaturalSubtract => match (&*args[0], &*args[1]) {
            (Value::NaturalLit(m), Value::NaturalLit(n)) => {
                Some(Value::NaturalLit(n.saturating_sub(*m)))
            }
            (Value::NaturalLit(0), _) => Some((*args[1]).clone()),
            (_, Value::NaturalLit(0)) => Some(Value::NaturalLit(0)),
            (m, n) if convertible(m, n) => Some(Value::NaturalLit(0)),
            _ => Option::None,
        },
        NaturalFold => match &*args[0] {
            Value::NaturalLit(n) => {
                let succ = &args[2];
                let mut acc = args[3].clone();
                for _ in 0..*n {
                    acc = apply_val(succ.clone(), acc, alpha).rc();
                }
                Some((*acc).clone())
            }
            _ => Option::None,
        },
        NaturalBuild => {
            // Natural/build (Natural/fold n) reduces back to n
            if let Some((NaturalFold, inner)) = args[0].builtin_spine() {
                if inner.len() == 1 {
                    return Some((*inner[0]).clone());
                }
            }
            let succ = lam(
                "n",
                "n",
                Value::Builtin(Natural).rc(),
                Env::default(),
                Term::op(OpCode::Plus, Term::var("n"), Term::NaturalLit(1)),
                alpha,
            );
            let g = args[0].clone();
            let g = apply_val(g, Value::Builtin(Natural).rc(), alpha).rc();
            let g = apply_val(g, succ.rc(), alpha).rc();
            Some(apply_val(g, Value::NaturalLit(0).rc(), alpha))
        }
        IntegerShow => match &*args[0] {
            Value::IntegerLit(i) => {
                let s = if *i >= 0 {
                    alloc::format!("+{}", i)
                } else {
                    i.to_string()
                };
                Some(text_lit(s))
            }
            _ => Option::None,
        },
        IntegerToDouble => match &*args[0] {
            Value::IntegerLit(i) => Some(Value::DoubleLit(crate::term::Double(*i as f64))),
            _ => Option::None,
        },
        DoubleShow => match &*args[0] {
            Value::DoubleLit(d) => Some(text_lit(d.to_string())),
            _ => Option::None,
        },
        TextShow => match &*args[0] {
            Value::TextLit(t) => t.as_plain().map(|s| text_lit(text_show(s))),
            _ => Option::None,
        },
        ListLength => match &*args[1] {
            Value::EmptyList(_) => Some(Value::NaturalLit(0)),
            Value::NonEmptyList(xs) => Some(Value::NaturalLit(xs.len() as u64)),
            _ => Option::None,
        },
        ListHead => match &*args[1] {
            Value::EmptyList(_) => Some(Value::App(
                Value::Builtin(None).rc(),
                args[0].clone(),
            )),
            Value::NonEmptyList(xs) => Some(Value::Some(xs[0].clone())),
            _ => Option::None,
        },
        ListLast => match &*args[1] {
            Value::EmptyList(_) => Some(Value::App(
                Value::Builtin(None).rc(),
                args[0].clone(),
            )),
            Value::NonEmptyList(xs) => xs.last().map(|x| Value::Some(x.clone())),
            _ => Option::None,
        },
        ListReverse => match &*args[1] {
            Value::EmptyList(_) => Some((*args[1]).clone()),
            Value::NonEmptyList(xs) => {
                Some(Value::NonEmptyList(xs.iter().rev().cloned().collect()))
            }
            _ => Option::None,
        },
        ListIndexed => match &*args[1] {
            Value::EmptyList(_) => {
                let entry = Value::RecordType(FieldMap(BTreeMap::from([
                    ("index".to_string(), Value::Builtin(Natural).rc()),
                    ("value".to_string(), args[0].clone()),
                ])));
                Some(Value::EmptyList(
                    Value::App(Value::Builtin(List).rc(), entry.rc()).rc(),
                ))
            }
            Value::NonEmptyList(xs) => {
                let indexed = xs
                    .iter()
                    .enumerate()
                    .map(|(i, x)| {
                        Value::RecordLit(FieldMap(BTreeMap::from([
                            ("index".to_string(), Value::NaturalLit(i as u64).rc()),
                            ("value".to_string(), x.clone()),
                        ])))
                        .rc()
                    })
                    .collect();
                Some(Value::NonEmptyList(indexed))
            }
            _ => Option::None,
        },
        ListFold => match &*args[1] {
            Value::EmptyList(_) => Some((*args[4]).clone()),
            Value::NonEmptyList(xs) => {
                let cons = &args[3];
                let mut acc = args[4].clone();
                for x in xs.iter().rev() {
                    let cx = apply_val(cons.clone(), x.clone(), alpha).rc();
                    acc = apply_val(cx, acc, alpha).rc();
                }
                Some((*acc).clone())
            }
            _ => Option::None,
        },
        ListBuild => {
            // List/build a (List/fold a xs) reduces back to xs
            if let Some((ListFold, inner)) = args[1].builtin_spine() {
                if inner.len() == 2 {
                    return Some((*inner[1]).clone());
                }
            }
            let a = args[0].clone();
            let list_a = Value::App(Value::Builtin(List).rc(), a.clone()).rc();
            // the element type is smuggled into the closure environment
            // under "A", a label the body cannot shadow
            let cons_body = Term::lam(
                "as",
                Term::app(Term::Builtin(List), Term::var("A")),
                Term::op(
                    OpCode::ListAppend,
                    Term::NonEmptyList(Vec::from([Term::var("a")])),
                    Term::var("as"),
                ),
            );
            let cons = lam(
                "a",
                "a",
                a.clone(),
                env_insert(&Env::default(), "A", a.clone()),
                cons_body,
                alpha,
            );
            let nil = Value::EmptyList(list_a.clone());
            let g = args[1].clone();
            let g = apply_val(g, list_a, alpha).rc();
            let g = apply_val(g, cons.rc(), alpha).rc();
            Some(apply_val(g, nil.rc(), alpha))
        }
        OptionalFold => match &*args[1] {
            Value::Some(x) => Some(apply_val(args[3].clone(), x.clone(), alpha)),
            v => match v.builtin_spine() {
                Some((None, inner)) if inner.len() == 1 => Some((*args[4]).clone()),
                _ => Option::None,
            },
        },
        OptionalBuild => {
            // Optional/build a (Optional/fold a ox) reduces back to ox
            if let Some((OptionalFold, inner)) = args[1].builtin_spine() {
                if inner.len() == 2 {
                    return Some((*inner[1]).clone());
                }
            }
            let a = args[0].clone();
            let opt_a = Value::App(Value::Builtin(Optional).rc(), a.clone()).rc();
            let some_fn = lam(
                "a",
                "a",
                a.clone(),
                Env::default(),
                Term::some(Term::var("a")),
                alpha,
            );
            let none = Value::App(Value::Builtin(None).rc(), a);
            let g = args[1].clone();
            let g = apply_val(g, opt_a, alpha).rc();
            let g = apply_val(g, some_fn.rc(), alpha).rc();
            Some(apply_val(g, none.rc(), alpha))
        }
        _ => Option::None,
    }
}

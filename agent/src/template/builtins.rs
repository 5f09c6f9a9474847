//! The predefined functions every template can call.
use super::error::{self, TemplateError};
use super::exec::{is_true, render, type_name};
use serde_json::Value;
use std::cmp::Ordering;

pub(crate) const NAMES: &[&str] = &[
    "and", "or", "not", "eq", "ne", "lt", "le", "gt", "ge", "len", "index", "print", "printf",
    "println",
];

pub(crate) fn is_builtin(name: &str) -> bool {
    NAMES.contains(&name)
}

/// Calls a builtin, or returns `None` if `name` is not one. `and` and `or` are evaluated lazily by
/// the executor and only land here when called without operands.
pub(crate) fn call(name: &str, args: &[Value]) -> Option<Result<Value, TemplateError>> {
    let result = match name {
        "and" | "or" => Ok(args.last().cloned().unwrap_or(Value::Null)),
        "not" => arity(name, args, 1).map(|_| Value::Bool(!is_true(&args[0]))),
        "eq" => eq(args),
        "ne" => arity(name, args, 2).map(|_| Value::Bool(!equal(&args[0], &args[1]))),
        "lt" => compare(name, args, |o| o == Ordering::Less),
        "le" => compare(name, args, |o| o != Ordering::Greater),
        "gt" => compare(name, args, |o| o == Ordering::Greater),
        "ge" => compare(name, args, |o| o != Ordering::Less),
        "len" => len(args),
        "index" => index(args),
        "print" => Ok(Value::String(sprint(args))),
        "println" => Ok(Value::String(sprintln(args))),
        "printf" => printf(args),
        _ => return None,
    };
    Some(result)
}

fn fail<T>(function: &str, message: impl Into<String>) -> Result<T, TemplateError> {
    error::CallSnafu {
        function,
        message: message.into(),
    }
    .fail()
}

fn arity(name: &str, args: &[Value], want: usize) -> Result<(), TemplateError> {
    if args.len() != want {
        return fail(
            name,
            format!("wrong number of args: want {} got {}", want, args.len()),
        );
    }
    Ok(())
}

fn equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn eq(args: &[Value]) -> Result<Value, TemplateError> {
    match args.split_first() {
        Some((first, rest)) if !rest.is_empty() => {
            Ok(Value::Bool(rest.iter().any(|other| equal(first, other))))
        }
        _ => fail("eq", "missing argument for comparison"),
    }
}

fn compare(
    name: &str,
    args: &[Value],
    accept: fn(Ordering) -> bool,
) -> Result<Value, TemplateError> {
    arity(name, args, 2)?;
    let ordering = match (&args[0], &args[1]) {
        (Value::Number(x), Value::Number(y)) => x.as_f64().partial_cmp(&y.as_f64()),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (x, y) => {
            return fail(
                name,
                format!(
                    "incompatible types for comparison: {} and {}",
                    type_name(x),
                    type_name(y)
                ),
            )
        }
    };
    match ordering {
        Some(ordering) => Ok(Value::Bool(accept(ordering))),
        None => fail(name, "invalid comparison"),
    }
}

fn len(args: &[Value]) -> Result<Value, TemplateError> {
    arity("len", args, 1)?;
    let n = match &args[0] {
        Value::String(s) => s.len(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        Value::Null => 0,
        other => return fail("len", format!("len of type {}", type_name(other))),
    };
    Ok(Value::from(n))
}

fn index(args: &[Value]) -> Result<Value, TemplateError> {
    let (item, keys) = match args.split_first() {
        Some(split) => split,
        None => return fail("index", "missing argument"),
    };
    let mut current = item.clone();
    for key in keys {
        let next = match (&current, key) {
            (Value::Null, _) => Value::Null,
            (Value::Object(map), Value::String(k)) => map.get(k).cloned().unwrap_or(Value::Null),
            (Value::Array(items), Value::Number(n)) => match n.as_u64() {
                Some(i) if (i as usize) < items.len() => items[i as usize].clone(),
                _ => return fail("index", format!("index out of range: {}", n)),
            },
            (target, key) => {
                return fail(
                    "index",
                    format!(
                        "can't index item of type {} with {}",
                        type_name(target),
                        type_name(key)
                    ),
                )
            }
        };
        current = next;
    }
    Ok(current)
}

/// Spaces are added between operands when neither is a string.
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !args[i - 1].is_string() && !arg.is_string() {
            out.push(' ');
        }
        out.push_str(&render(arg));
    }
    out
}

fn sprintln(args: &[Value]) -> String {
    let mut out = args.iter().map(render).collect::<Vec<_>>().join(" ");
    out.push('\n');
    out
}

fn printf(args: &[Value]) -> Result<Value, TemplateError> {
    let (format, rest) = match args.split_first() {
        Some((Value::String(format), rest)) => (format, rest),
        _ => return fail("printf", "format must be a string"),
    };

    let mut out = String::new();
    let mut operands = rest.iter();
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let verb = match chars.next() {
            Some(verb) => verb,
            None => {
                out.push_str("%!(NOVERB)");
                break;
            }
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let operand = match operands.next() {
            Some(operand) => operand,
            None => {
                out.push_str(&format!("%!{}(MISSING)", verb));
                continue;
            }
        };
        match verb {
            's' | 'v' | 'd' | 't' => out.push_str(&render(operand)),
            'q' => out.push_str(&Value::String(render(operand)).to_string()),
            other => out.push_str(&format!("%!{}({})", other, render(operand))),
        }
    }
    Ok(Value::String(out))
}

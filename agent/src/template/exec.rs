//! Walks a parsed template against a data root and a function map.
use super::error::{self, TemplateError};
use super::parse::{Command, Node, Operand, Pipeline};
use super::FuncMap;
use serde_json::Value;

pub(crate) struct State<'a> {
    name: &'a str,
    funcs: &'a FuncMap,
    vars: Vec<(String, Value)>,
    out: String,
}

impl<'a> State<'a> {
    pub fn new(name: &'a str, funcs: &'a FuncMap, root: &Value) -> Self {
        Self {
            name,
            funcs,
            vars: vec![("$".to_string(), root.clone())],
            out: String::new(),
        }
    }

    pub fn run(mut self, root: &Value, nodes: &[Node]) -> Result<String, TemplateError> {
        self.walk(root, nodes)?;
        Ok(self.out)
    }

    fn fail<T>(&self, line: usize, message: impl Into<String>) -> Result<T, TemplateError> {
        error::ExecSnafu {
            name: self.name,
            line,
            message: message.into(),
        }
        .fail()
    }

    fn walk(&mut self, dot: &Value, nodes: &[Node]) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Action(pipe) => {
                    let value = self.eval_pipeline(dot, pipe)?;
                    if pipe.decl.is_empty() {
                        self.out.push_str(&render(&value));
                    }
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    let mark = self.vars.len();
                    let mut taken = false;
                    for (condition, body) in branches {
                        if is_true(&self.eval_pipeline(dot, condition)?) {
                            self.walk(dot, body)?;
                            taken = true;
                            break;
                        }
                    }
                    if !taken {
                        self.walk(dot, otherwise)?;
                    }
                    self.vars.truncate(mark);
                }
                Node::Range {
                    pipe,
                    body,
                    otherwise,
                } => self.walk_range(dot, pipe, body, otherwise)?,
            }
        }
        Ok(())
    }

    fn walk_range(
        &mut self,
        dot: &Value,
        pipe: &Pipeline,
        body: &[Node],
        otherwise: &[Node],
    ) -> Result<(), TemplateError> {
        let mark = self.vars.len();
        let value = self.eval_commands(dot, pipe)?;
        let items: Vec<(Value, Value)> = match value {
            Value::Array(values) => values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v))
                .collect(),
            Value::Object(map) => {
                // Map keys are visited in sorted order.
                let mut entries: Vec<_> = map.into_iter().collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                entries
                    .into_iter()
                    .map(|(k, v)| (Value::String(k), v))
                    .collect()
            }
            Value::Null => Vec::new(),
            other => {
                return self.fail(
                    pipe.line,
                    format!("range can't iterate over {}", render(&other)),
                )
            }
        };

        if items.is_empty() {
            self.walk(dot, otherwise)?;
        }
        for (key, element) in items {
            match pipe.decl.as_slice() {
                [] => {}
                [single] => self.vars.push((single.clone(), element.clone())),
                [k, v, ..] => {
                    self.vars.push((k.clone(), key));
                    self.vars.push((v.clone(), element.clone()));
                }
            }
            self.walk(&element, body)?;
            self.vars.truncate(mark);
        }
        self.vars.truncate(mark);
        Ok(())
    }

    /// Evaluates a pipeline and applies its declaration, if any.
    fn eval_pipeline(&mut self, dot: &Value, pipe: &Pipeline) -> Result<Value, TemplateError> {
        let value = self.eval_commands(dot, pipe)?;
        for name in &pipe.decl {
            if pipe.assign {
                match self.vars.iter_mut().rev().find(|(var, _)| var == name) {
                    Some((_, slot)) => *slot = value.clone(),
                    None => return self.fail(pipe.line, format!("undefined variable: {}", name)),
                }
            } else {
                self.vars.push((name.clone(), value.clone()));
            }
        }
        Ok(value)
    }

    fn eval_commands(&mut self, dot: &Value, pipe: &Pipeline) -> Result<Value, TemplateError> {
        let mut result = None;
        for cmd in &pipe.cmds {
            result = Some(self.eval_command(dot, cmd, result, pipe.line)?);
        }
        Ok(result.unwrap_or(Value::Null))
    }

    fn eval_command(
        &mut self,
        dot: &Value,
        cmd: &Command,
        last: Option<Value>,
        line: usize,
    ) -> Result<Value, TemplateError> {
        match cmd.args.split_first() {
            Some((Operand::Function(name), rest)) => self.eval_call(dot, name, rest, last, line),
            Some((operand, rest)) => {
                if !rest.is_empty() || last.is_some() {
                    return self.fail(line, "can't give argument to non-function");
                }
                self.eval_operand(dot, operand, line)
            }
            None => self.fail(line, "empty command"),
        }
    }

    fn eval_operand(
        &mut self,
        dot: &Value,
        operand: &Operand,
        line: usize,
    ) -> Result<Value, TemplateError> {
        match operand {
            Operand::Field(chain) => self.resolve(dot, chain, line),
            Operand::Variable(name, chain) => {
                let value = match self.vars.iter().rev().find(|(var, _)| var == name) {
                    Some((_, value)) => value.clone(),
                    None => return self.fail(line, format!("undefined variable: {}", name)),
                };
                self.resolve(&value, chain, line)
            }
            Operand::Function(name) => self.eval_call(dot, name, &[], None, line),
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Nil => Ok(Value::Null),
            Operand::Pipeline(pipe, chain) => {
                let value = self.eval_pipeline(dot, pipe)?;
                self.resolve(&value, chain, line)
            }
        }
    }

    fn resolve(&self, value: &Value, chain: &[String], line: usize) -> Result<Value, TemplateError> {
        let mut current = value.clone();
        for key in chain {
            let next = match &current {
                Value::Null => Value::Null,
                Value::Object(map) => lookup_field(map, key),
                other => {
                    return self.fail(
                        line,
                        format!("can't evaluate field {} in type {}", key, type_name(other)),
                    )
                }
            };
            current = next;
        }
        Ok(current)
    }

    fn eval_call(
        &mut self,
        dot: &Value,
        name: &str,
        operands: &[Operand],
        last: Option<Value>,
        line: usize,
    ) -> Result<Value, TemplateError> {
        // `and` and `or` stop evaluating once the result is known.
        if name == "and" || name == "or" {
            let want = name == "or";
            let mut result = Value::Null;
            for operand in operands {
                result = self.eval_operand(dot, operand, line)?;
                if is_true(&result) == want {
                    return Ok(result);
                }
            }
            if let Some(last) = last {
                result = last;
            }
            return Ok(result);
        }

        let mut args = Vec::with_capacity(operands.len() + 1);
        for operand in operands {
            args.push(self.eval_operand(dot, operand, line)?);
        }
        if let Some(last) = last {
            args.push(last);
        }

        let result = match super::builtins::call(name, &args) {
            Some(result) => result,
            None => match self.funcs.get(name) {
                Some(func) => func(args.as_slice()),
                None => return self.fail(line, format!("function {} not defined", name)),
            },
        };
        match result {
            Ok(value) => Ok(value),
            Err(err) => self.fail(line, format!("error calling {}: {}", name, err)),
        }
    }
}

/// Looks a field up by its exact name, then its lowerCamel form, then case-insensitively, so that
/// `.VMSize` finds the serde field `vmSize`. A missing field is null.
fn lookup_field(map: &serde_json::Map<String, Value>, key: &str) -> Value {
    if let Some(value) = map.get(key) {
        return value.clone();
    }
    let mut chars = key.chars();
    let camel: String = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    };
    if let Some(value) = map.get(&camel) {
        return value.clone();
    }
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.clone())
        .unwrap_or(Value::Null)
}

/// Go template truthiness.
pub(crate) fn is_true(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// The text form of a value when it is emitted by an action.
pub(crate) fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "slice",
        Value::Object(_) => "map",
    }
}

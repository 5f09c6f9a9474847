/*!
A restricted Go-template expander.

Templates are parsed once against a [`FuncMap`] (so a call to an unknown function is a parse error)
and executed against a `serde_json::Value` data root. Supported actions are text substitution,
`if`/`else if`/`else`, `range` (with `else` and `$k, $v :=`), variable declarations, pipelines,
parenthesised pipelines, comments and the `{{-`/`-}}` trim markers. Execution is deterministic and
performs no I/O.
*/
mod builtins;
mod exec;
mod lexer;
mod parse;

use lexer::Lexer;
use parse::{Node, Parser};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A template function. Receives its evaluated arguments, including the piped value last.
pub type Func = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// The named functions a template may call in addition to the builtins.
#[derive(Clone, Default)]
pub struct FuncMap {
    funcs: HashMap<&'static str, Func>,
}

impl FuncMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<F>(&mut self, name: &'static str, func: F)
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.funcs.insert(name, Arc::new(func));
    }

    pub fn get(&self, name: &str) -> Option<&Func> {
        self.funcs.get(name)
    }

    /// Whether `name` can be called from a template, counting builtins.
    pub fn contains(&self, name: &str) -> bool {
        builtins::is_builtin(name) || self.funcs.contains_key(name)
    }

    /// Adds every function of `other`, replacing same-named entries.
    pub fn extend(&mut self, other: FuncMap) {
        self.funcs.extend(other.funcs);
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

impl fmt::Debug for FuncMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.funcs.keys().collect();
        names.sort();
        f.debug_struct("FuncMap").field("funcs", &names).finish()
    }
}

/// A parsed template.
#[derive(Clone, Debug)]
pub struct Template {
    name: String,
    root: Vec<Node>,
}

impl Template {
    pub fn parse(name: &str, src: &str, funcs: &FuncMap) -> Result<Self> {
        let items = Lexer::new(name, src).lex()?;
        let is_function = |function: &str| funcs.contains(function);
        let root = Parser::new(name, items, &is_function).parse()?;
        Ok(Self {
            name: name.to_string(),
            root,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn execute(&self, data: &Value, funcs: &FuncMap) -> Result<String> {
        exec::State::new(&self.name, funcs, data).run(data, &self.root)
    }
}

/// Parses and executes `src` in one step.
pub fn render(name: &str, src: &str, data: &Value, funcs: &FuncMap) -> Result<String> {
    Template::parse(name, src, funcs)?.execute(data, funcs)
}

pub mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum TemplateError {
        #[snafu(display("template: {}:{}: {}", name, line, message))]
        Parse {
            name: String,
            line: usize,
            message: String,
        },

        #[snafu(display("template: {}:{}: function \"{}\" not defined", name, line, function))]
        UndefinedFunction {
            name: String,
            line: usize,
            function: String,
        },

        #[snafu(display("template: {}:{}: {}", name, line, message))]
        Exec {
            name: String,
            line: usize,
            message: String,
        },

        #[snafu(display("{}: {}", function, message))]
        Call { function: String, message: String },
    }
}

pub type Result<T> = std::result::Result<T, TemplateError>;
pub use error::TemplateError;

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn funcs() -> FuncMap {
        let mut funcs = FuncMap::new();
        funcs.insert("Upper", |args| {
            Ok(Value::String(
                args.first()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_uppercase(),
            ))
        });
        funcs.insert("IsSet", |_| Ok(Value::Bool(true)));
        funcs.insert("Fail", |_| {
            error::CallSnafu {
                function: "Fail",
                message: "boom",
            }
            .fail()
        });
        funcs
    }

    #[test]
    fn test_render() {
        let data = json!({
            "name": "pool1",
            "vmSize": "Standard_NC6",
            "zones": ["1", "2"],
            "labels": {"b": "2", "a": "1"},
            "count": 0,
        });
        let test_cases = vec![
            ("{{.Name}}", "pool1"),
            ("{{.VMSize}}", "Standard_NC6"),
            ("{{.missing}}|{{.missing.deeper}}", "|"),
            ("{{.name | Upper}}", "POOL1"),
            ("{{Upper .name | printf \"%s!\"}}", "POOL1!"),
            ("{{if IsSet}}yes{{else}}no{{end}}", "yes"),
            ("{{if .count}}a{{else if .zones}}b{{else}}c{{end}}", "b"),
            ("{{range .zones}}[{{.}}]{{end}}", "[1][2]"),
            ("{{range $k, $v := .labels}}{{$k}}={{$v}},{{end}}", "a=1,b=2,"),
            ("{{range .none}}x{{else}}empty{{end}}", "empty"),
            ("{{$x := .name}}{{$x}}-{{$.vmSize}}", "pool1-Standard_NC6"),
            ("{{$x := 1}}{{$x = 2}}{{$x}}", "2"),
            ("{{(index .zones 1)}}", "2"),
            ("{{if and .name (not .count)}}ok{{end}}", "ok"),
            ("{{or .count .missing \"fallback\"}}", "fallback"),
            ("{{/* ignored */}}a\n  {{- \" b\" }}", "a b"),
            ("{{ \"a\" }}\n\n{{- \"b\" -}}\n\nc", "abc"),
            ("{{len .zones}} {{eq .name \"pool1\"}}", "2 true"),
        ];

        for (src, expected) in test_cases {
            assert_eq!(render("test", src, &data, &funcs()).unwrap(), expected, "{}", src);
        }
    }

    #[test]
    fn test_truthiness() {
        let data = json!({
            "empty": "",
            "zero": 0,
            "half": 0.5,
            "text": "0",
            "list": [],
            "map": {"k": "v"},
            "off": false,
        });
        let test_cases = vec![
            ("empty", "no"),
            ("zero", "no"),
            ("half", "yes"),
            ("text", "yes"),
            ("list", "no"),
            ("map", "yes"),
            ("off", "no"),
            ("missing", "no"),
        ];
        for (field, expected) in test_cases {
            let src = format!("{{{{if .{}}}}}yes{{{{else}}}}no{{{{end}}}}", field);
            assert_eq!(render("test", &src, &data, &funcs()).unwrap(), expected, "{}", field);
            let negated = format!("{{{{if not .{}}}}}no{{{{else}}}}yes{{{{end}}}}", field);
            assert_eq!(render("test", &negated, &data, &funcs()).unwrap(), expected, "{}", field);
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let data = json!({"labels": {"z": 1, "a": 2, "m": 3}});
        let src = "{{range $k, $v := .labels}}{{$k}}{{$v}}{{end}}";
        let first = render("test", src, &data, &funcs()).unwrap();
        for _ in 0..5 {
            assert_eq!(render("test", src, &data, &funcs()).unwrap(), first);
        }
    }

    #[test]
    fn test_render_errors() {
        let data = json!({"name": "pool1"});
        assert!(matches!(
            render("test", "{{Nope}}", &data, &funcs()),
            Err(TemplateError::UndefinedFunction { .. })
        ));
        assert!(matches!(
            render("test", "{{Fail}}", &data, &funcs()),
            Err(TemplateError::Exec { .. })
        ));
        assert!(matches!(
            render("test", "{{.name.first}}", &data, &funcs()),
            Err(TemplateError::Exec { .. })
        ));
        assert!(matches!(
            render("test", "{{$undefined}}", &data, &funcs()),
            Err(TemplateError::Exec { .. })
        ));
        assert!(matches!(
            render("test", "{{.name 1}}", &data, &funcs()),
            Err(TemplateError::Exec { .. })
        ));
    }
}

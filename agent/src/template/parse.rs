//! Builds the node tree of a template from its token stream.
use super::error::{self, TemplateError};
use super::lexer::{Item, Token};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
    If {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    Range {
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Pipeline {
    pub line: usize,
    /// Variables declared (`:=`) or assigned (`=`) by this pipeline.
    pub decl: Vec<String>,
    pub assign: bool,
    pub cmds: Vec<Command>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Command {
    pub args: Vec<Operand>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Operand {
    Field(Vec<String>),
    Variable(String, Vec<String>),
    Function(String),
    Literal(Value),
    Nil,
    Pipeline(Box<Pipeline>, Vec<String>),
}

/// What ended a list of nodes.
enum Stop {
    Eof,
    End,
    Else,
    ElseIf(Pipeline),
}

pub(crate) struct Parser<'a> {
    name: &'a str,
    items: Vec<Item>,
    pos: usize,
    is_function: &'a dyn Fn(&str) -> bool,
}

impl<'a> Parser<'a> {
    pub fn new(name: &'a str, items: Vec<Item>, is_function: &'a dyn Fn(&str) -> bool) -> Self {
        Self {
            name,
            items,
            pos: 0,
            is_function,
        }
    }

    pub fn parse(mut self) -> Result<Vec<Node>, TemplateError> {
        let (nodes, stop) = self.parse_list()?;
        match stop {
            Stop::Eof => Ok(nodes),
            Stop::End => self.fail("unexpected {{end}}"),
            Stop::Else | Stop::ElseIf(_) => self.fail("unexpected {{else}}"),
        }
    }

    fn line(&self) -> usize {
        self.items
            .get(self.pos)
            .or_else(|| self.items.last())
            .map(|item| item.line)
            .unwrap_or(1)
    }

    fn fail<T>(&self, message: impl Into<String>) -> Result<T, TemplateError> {
        error::ParseSnafu {
            name: self.name,
            line: self.line(),
            message: message.into(),
        }
        .fail()
    }

    fn peek(&self) -> Option<&Token> {
        self.items.get(self.pos).map(|item| &item.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.items.get(self.pos + offset).map(|item| &item.token)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.items.get(self.pos).map(|item| item.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, context: &str) -> Result<(), TemplateError> {
        match self.next() {
            Some(ref token) if *token == expected => Ok(()),
            Some(token) => self.fail(format!("unexpected {:?} in {}", token, context)),
            None => self.fail(format!("unexpected EOF in {}", context)),
        }
    }

    fn parse_list(&mut self) -> Result<(Vec<Node>, Stop), TemplateError> {
        let mut nodes = Vec::new();
        loop {
            match self.next() {
                None => return Ok((nodes, Stop::Eof)),
                Some(Token::Text(text)) => nodes.push(Node::Text(text)),
                Some(Token::LeftDelim) => {
                    let keyword = match self.peek() {
                        Some(Token::Identifier(word)) => Some(word.clone()),
                        _ => None,
                    };
                    match keyword.as_deref() {
                        Some("if") => {
                            self.pos += 1;
                            let pipe = self.parse_pipeline("if", false)?;
                            nodes.push(self.parse_if(pipe)?);
                        }
                        Some("range") => {
                            self.pos += 1;
                            let pipe = self.parse_pipeline("range", false)?;
                            nodes.push(self.parse_range(pipe)?);
                        }
                        Some("else") => {
                            self.pos += 1;
                            if let Some(Token::Identifier(word)) = self.peek() {
                                if word == "if" {
                                    self.pos += 1;
                                    let pipe = self.parse_pipeline("else if", false)?;
                                    return Ok((nodes, Stop::ElseIf(pipe)));
                                }
                            }
                            self.expect(Token::RightDelim, "else")?;
                            return Ok((nodes, Stop::Else));
                        }
                        Some("end") => {
                            self.pos += 1;
                            self.expect(Token::RightDelim, "end")?;
                            return Ok((nodes, Stop::End));
                        }
                        _ => {
                            let pipe = self.parse_pipeline("command", false)?;
                            nodes.push(Node::Action(pipe));
                        }
                    }
                }
                Some(token) => return self.fail(format!("unexpected {:?}", token)),
            }
        }
    }

    fn parse_if(&mut self, pipe: Pipeline) -> Result<Node, TemplateError> {
        let mut branches = Vec::new();
        let mut condition = pipe;
        loop {
            let (body, stop) = self.parse_list()?;
            branches.push((condition, body));
            match stop {
                Stop::End => {
                    return Ok(Node::If {
                        branches,
                        otherwise: Vec::new(),
                    })
                }
                Stop::Else => {
                    let (otherwise, stop) = self.parse_list()?;
                    return match stop {
                        Stop::End => Ok(Node::If {
                            branches,
                            otherwise,
                        }),
                        _ => self.fail("expected {{end}} after {{else}}"),
                    };
                }
                Stop::ElseIf(next) => condition = next,
                Stop::Eof => return self.fail("unexpected EOF in if"),
            }
        }
    }

    fn parse_range(&mut self, pipe: Pipeline) -> Result<Node, TemplateError> {
        if pipe.decl.len() > 2 || pipe.assign {
            return self.fail("too many declarations in range");
        }
        let (body, stop) = self.parse_list()?;
        match stop {
            Stop::End => Ok(Node::Range {
                pipe,
                body,
                otherwise: Vec::new(),
            }),
            Stop::Else => {
                let (otherwise, stop) = self.parse_list()?;
                match stop {
                    Stop::End => Ok(Node::Range {
                        pipe,
                        body,
                        otherwise,
                    }),
                    _ => self.fail("expected {{end}} after {{else}}"),
                }
            }
            Stop::ElseIf(_) => self.fail("{{else if}} is not allowed in range"),
            Stop::Eof => self.fail("unexpected EOF in range"),
        }
    }

    /// Parses up to and including the closing delimiter, or up to (not including) the closing
    /// parenthesis when `nested`.
    fn parse_pipeline(&mut self, context: &str, nested: bool) -> Result<Pipeline, TemplateError> {
        let line = self.line();
        let (decl, assign) = self.parse_declarations(context)?;
        let mut cmds = Vec::new();
        loop {
            let cmd = self.parse_command(context)?;
            if cmd.args.is_empty() {
                return self.fail(format!("missing value for {}", context));
            }
            cmds.push(cmd);
            match self.peek() {
                Some(Token::Pipe) => {
                    self.pos += 1;
                }
                Some(Token::RightDelim) if !nested => {
                    self.pos += 1;
                    break;
                }
                Some(Token::RightParen) if nested => break,
                Some(token) => {
                    let token = token.clone();
                    return self.fail(format!("unexpected {:?} in {}", token, context));
                }
                None => return self.fail(format!("unexpected EOF in {}", context)),
            }
        }
        Ok(Pipeline {
            line,
            decl,
            assign,
            cmds,
        })
    }

    fn parse_declarations(&mut self, context: &str) -> Result<(Vec<String>, bool), TemplateError> {
        let single = |token: Option<&Token>| match token {
            Some(Token::Variable(name, chain)) if chain.is_empty() => Some(name.clone()),
            _ => None,
        };
        let first = single(self.peek());
        match (first, self.peek_at(1)) {
            (Some(name), Some(Token::Declare)) => {
                self.pos += 2;
                Ok((vec![name], false))
            }
            (Some(name), Some(Token::Assign)) => {
                self.pos += 2;
                Ok((vec![name], true))
            }
            (Some(first), Some(Token::Comma)) => {
                let second = match single(self.peek_at(2)) {
                    Some(second) => second,
                    None => return self.fail(format!("bad declaration in {}", context)),
                };
                match self.peek_at(3) {
                    Some(Token::Declare) => {
                        self.pos += 4;
                        Ok((vec![first, second], false))
                    }
                    _ => self.fail(format!("bad declaration in {}", context)),
                }
            }
            _ => Ok((Vec::new(), false)),
        }
    }

    fn parse_command(&mut self, context: &str) -> Result<Command, TemplateError> {
        let mut args = Vec::new();
        loop {
            let token = match self.peek() {
                Some(Token::Pipe) | Some(Token::RightDelim) | Some(Token::RightParen) | None => {
                    return Ok(Command { args })
                }
                Some(token) => token.clone(),
            };
            self.pos += 1;
            let operand = match token {
                Token::Field(chain) => Operand::Field(chain),
                Token::Variable(name, chain) => Operand::Variable(name, chain),
                Token::Literal(value) => Operand::Literal(value),
                Token::Identifier(word) if word == "nil" => Operand::Nil,
                Token::Identifier(word) => {
                    if !(self.is_function)(&word) {
                        return error::UndefinedFunctionSnafu {
                            name: self.name,
                            line: self.line(),
                            function: word,
                        }
                        .fail();
                    }
                    Operand::Function(word)
                }
                Token::LeftParen => {
                    let inner = self.parse_pipeline("parenthesized pipeline", true)?;
                    self.expect(Token::RightParen, "parenthesized pipeline")?;
                    let chain = match self.peek() {
                        Some(Token::Chain(chain)) => {
                            let chain = chain.clone();
                            self.pos += 1;
                            chain
                        }
                        _ => Vec::new(),
                    };
                    Operand::Pipeline(Box::new(inner), chain)
                }
                other => return self.fail(format!("unexpected {:?} in {}", other, context)),
            };
            args.push(operand);
        }
    }
}

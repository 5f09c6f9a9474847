//! Splits template source into text runs and the tokens of each `{{ }}` action.
use super::error::{self, TemplateError};
use serde_json::Value;

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const LEFT_COMMENT: &str = "/*";
const RIGHT_COMMENT: &str = "*/";

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    Text(String),
    LeftDelim,
    RightDelim,
    /// A bare word: a keyword, a function name, `true`, `false` or `nil`.
    Identifier(String),
    /// `.`, `.Field` or `.Field.Sub`; an empty chain is the dot itself.
    Field(Vec<String>),
    /// `$` or `$name`, optionally followed by a field chain.
    Variable(String, Vec<String>),
    /// A field chain applied to the result of a parenthesised pipeline, as in `(f).Field`.
    Chain(Vec<String>),
    Literal(Value),
    Pipe,
    LeftParen,
    RightParen,
    Declare,
    Assign,
    Comma,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Item {
    pub token: Token,
    pub line: usize,
}

pub(crate) struct Lexer<'a> {
    name: &'a str,
    src: &'a str,
    pos: usize,
    line: usize,
    items: Vec<Item>,
}

impl<'a> Lexer<'a> {
    pub fn new(name: &'a str, src: &'a str) -> Self {
        Self {
            name,
            src,
            pos: 0,
            line: 1,
            items: Vec::new(),
        }
    }

    pub fn lex(mut self) -> Result<Vec<Item>, TemplateError> {
        let mut trim_next_text = false;
        let src = self.src;
        while self.pos < src.len() {
            let rest = &src[self.pos..];
            let text_end = rest.find(LEFT_DELIM).unwrap_or(rest.len());
            let mut text = &rest[..text_end];
            let after = &rest[text_end..];
            let trim_left = after.starts_with(LEFT_DELIM)
                && after[LEFT_DELIM.len()..].starts_with('-')
                && after[LEFT_DELIM.len() + 1..]
                    .chars()
                    .next()
                    .map(char::is_whitespace)
                    .unwrap_or(false);

            if trim_next_text {
                text = text.trim_start();
            }
            if trim_left {
                text = text.trim_end();
            }
            if !text.is_empty() {
                self.emit(Token::Text(text.to_string()));
            }
            self.advance(text_end);
            if self.pos >= self.src.len() {
                break;
            }

            // Skip the delimiter and any trim marker.
            self.advance(LEFT_DELIM.len());
            if trim_left {
                self.advance(2);
            }
            trim_next_text = self.lex_action()?;
        }
        Ok(self.items)
    }

    fn emit(&mut self, token: Token) {
        self.items.push(Item {
            token,
            line: self.line,
        });
    }

    fn advance(&mut self, n: usize) {
        let consumed = &self.src[self.pos..self.pos + n];
        self.line += consumed.matches('\n').count();
        self.pos += n;
    }

    fn fail<T>(&self, message: impl Into<String>) -> Result<T, TemplateError> {
        error::ParseSnafu {
            name: self.name,
            line: self.line,
            message: message.into(),
        }
        .fail()
    }

    /// Lexes one action after its opening delimiter. Returns whether the action ends with a trim
    /// marker, in which case leading whitespace of the following text is dropped.
    fn lex_action(&mut self) -> Result<bool, TemplateError> {
        let rest = &self.src[self.pos..];
        if rest.trim_start().starts_with(LEFT_COMMENT) {
            return self.lex_comment();
        }

        self.emit(Token::LeftDelim);
        loop {
            let rest = &self.src[self.pos..];
            let c = match rest.chars().next() {
                Some(c) => c,
                None => return self.fail("unclosed action"),
            };

            if rest.starts_with(" -}}") || rest.starts_with("\t-}}") || rest.starts_with("\n-}}") {
                self.advance(4);
                self.emit(Token::RightDelim);
                return Ok(true);
            }
            if rest.starts_with(RIGHT_DELIM) {
                self.advance(RIGHT_DELIM.len());
                self.emit(Token::RightDelim);
                return Ok(false);
            }

            match c {
                c if c.is_whitespace() => self.advance(c.len_utf8()),
                '|' => {
                    self.advance(1);
                    self.emit(Token::Pipe);
                }
                '(' => {
                    self.advance(1);
                    self.emit(Token::LeftParen);
                }
                ')' => {
                    self.advance(1);
                    self.emit(Token::RightParen);
                    let chain = self.lex_field_chain();
                    if !chain.is_empty() {
                        self.emit(Token::Chain(chain));
                    }
                }
                ',' => {
                    self.advance(1);
                    self.emit(Token::Comma);
                }
                ':' if rest.starts_with(":=") => {
                    self.advance(2);
                    self.emit(Token::Declare);
                }
                '=' => {
                    self.advance(1);
                    self.emit(Token::Assign);
                }
                '"' => self.lex_quoted()?,
                '`' => self.lex_raw()?,
                '.' if !rest[1..].starts_with(|c: char| c.is_ascii_digit()) => {
                    let chain = self.lex_field_chain();
                    if chain.is_empty() {
                        self.advance(1);
                    }
                    self.emit(Token::Field(chain));
                }
                '$' => {
                    self.advance(1);
                    let name = self.take_while(is_ident_char);
                    let chain = self.lex_field_chain();
                    self.emit(Token::Variable(format!("${}", name), chain));
                }
                c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.lex_number()?,
                c if is_ident_char(c) => {
                    let word = self.take_while(is_ident_char);
                    let token = match word.as_str() {
                        "true" => Token::Literal(Value::Bool(true)),
                        "false" => Token::Literal(Value::Bool(false)),
                        _ => Token::Identifier(word),
                    };
                    self.emit(token);
                }
                other => return self.fail(format!("unexpected {:?} in action", other)),
            }
        }
    }

    fn lex_comment(&mut self) -> Result<bool, TemplateError> {
        let rest = &self.src[self.pos..];
        let end = match rest.find(RIGHT_COMMENT) {
            Some(end) => end,
            None => return self.fail("unclosed comment"),
        };
        self.advance(end + RIGHT_COMMENT.len());
        let rest = &self.src[self.pos..];
        if rest.starts_with(" -}}") {
            self.advance(4);
            Ok(true)
        } else if rest.starts_with(RIGHT_DELIM) {
            self.advance(RIGHT_DELIM.len());
            Ok(false)
        } else {
            self.fail("comment ends before closing delimiter")
        }
    }

    /// Consumes `.a.b.c` directly at the current position.
    fn lex_field_chain(&mut self) -> Vec<String> {
        let mut chain = Vec::new();
        while self.src[self.pos..].starts_with('.') {
            let next = self.src[self.pos + 1..].chars().next();
            if !next.map(is_ident_char).unwrap_or(false) {
                break;
            }
            self.advance(1);
            chain.push(self.take_while(is_ident_char));
        }
        chain
    }

    fn take_while(&mut self, pred: fn(char) -> bool) -> String {
        let rest = &self.src[self.pos..];
        let end = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        let word = rest[..end].to_string();
        self.advance(end);
        word
    }

    fn lex_quoted(&mut self) -> Result<(), TemplateError> {
        self.advance(1);
        let src = self.src;
        let mut out = String::new();
        let mut chars = src[self.pos..].char_indices();
        loop {
            match chars.next() {
                Some((i, '"')) => {
                    self.advance(i + 1);
                    self.emit(Token::Literal(Value::String(out)));
                    return Ok(());
                }
                Some((_, '\\')) => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, '"')) => out.push('"'),
                    Some((_, other)) => {
                        return self.fail(format!("unknown escape sequence \\{}", other))
                    }
                    None => return self.fail("unterminated quoted string"),
                },
                Some((_, '\n')) | None => return self.fail("unterminated quoted string"),
                Some((_, c)) => out.push(c),
            }
        }
    }

    fn lex_raw(&mut self) -> Result<(), TemplateError> {
        self.advance(1);
        let rest = &self.src[self.pos..];
        let end = match rest.find('`') {
            Some(end) => end,
            None => return self.fail("unterminated raw quoted string"),
        };
        let raw = rest[..end].to_string();
        self.advance(end + 1);
        self.emit(Token::Literal(Value::String(raw)));
        Ok(())
    }

    fn lex_number(&mut self) -> Result<(), TemplateError> {
        let word = self.take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'));
        if let Ok(int) = word.parse::<i64>() {
            self.emit(Token::Literal(Value::from(int)));
            return Ok(());
        }
        match word.parse::<f64>() {
            Ok(float) => {
                self.emit(Token::Literal(Value::from(float)));
                Ok(())
            }
            Err(_) => self.fail(format!("bad number syntax: {:?}", word)),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

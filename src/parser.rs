//! Recursive-descent parser.
//!
//! Consumes the token stream produced by the lexer and builds the executable
//! tree. The parser keeps a table of the classes declared so far: base
//! classes must already be registered, and `Name(args)` in expression
//! position only becomes a new-instance expression for registered names.

use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{Result, anyhow, bail};

use crate::ast::{CompareOp, Statement};
use crate::runtime::{Class, Method};
use crate::token::Token;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    current: Token,
    classes: HashMap<String, Rc<Class>>,
}

/// Parses a whole program into its root `Compound` node.
pub fn parse_tokens(tokens: Vec<Token>) -> Result<Statement> {
    Parser::new(tokens).parse_program()
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token::Eof);
        }
        let current = tokens[0].clone();
        Self {
            tokens,
            pos: 0,
            current,
            classes: HashMap::new(),
        }
    }

    pub fn parse_program(mut self) -> Result<Statement> {
        let mut statements = Vec::new();
        while !matches!(self.current, Token::Eof) {
            if self.consume_newlines() {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Statement::Compound(statements))
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.current {
            Token::Class => {
                self.advance();
                self.parse_class_definition()
            }
            Token::If => self.parse_condition(),
            _ => {
                let statement = self.parse_simple_statement()?;
                self.expect_statement_end()?;
                Ok(statement)
            }
        }
    }

    /// `Id ['(' Id ')'] ':' <suite of defs>`, after the `class` keyword.
    fn parse_class_definition(&mut self) -> Result<Statement> {
        let name = self.expect_id()?;

        let mut parent = None;
        if self.current.is_char('(') {
            self.advance();
            let base = self.expect_id()?;
            self.expect_char(')')?;
            let base_class = self
                .classes
                .get(&base)
                .ok_or_else(|| anyhow!("Base class '{base}' not found for class '{name}'"))?;
            parent = Some(Rc::clone(base_class));
        }

        self.expect_char(':')?;
        self.expect(Token::Newline)?;
        self.expect(Token::Indent)?;
        if !matches!(self.current, Token::Def) {
            return Err(self.error("def"));
        }
        let methods = self.parse_methods()?;
        self.expect_block_end()?;

        if self.classes.contains_key(&name) {
            bail!("Class '{name}' already exists");
        }
        let class = Rc::new(Class::new(name.clone(), methods, parent.as_ref()));
        self.classes.insert(name, Rc::clone(&class));
        Ok(Statement::ClassDefinition(class))
    }

    /// `['def' Id '(' [Id (',' Id)*] ')' ':' Suite]*`
    fn parse_methods(&mut self) -> Result<Vec<Method>> {
        let mut methods = Vec::new();
        while matches!(self.current, Token::Def) {
            self.advance();
            let name = self.expect_id()?;
            self.expect_char('(')?;

            let mut formal_params = Vec::new();
            if matches!(self.current, Token::Id(_)) {
                formal_params.push(self.expect_id()?);
                while self.current.is_char(',') {
                    self.advance();
                    formal_params.push(self.expect_id()?);
                }
            }
            self.expect_char(')')?;
            self.expect_char(':')?;

            let body = Box::new(Statement::MethodBody(Box::new(self.parse_suite()?)));
            methods.push(Method {
                name,
                formal_params,
                body,
            });
        }
        Ok(methods)
    }

    /// `Newline Indent Statement+ Dedent`
    fn parse_suite(&mut self) -> Result<Statement> {
        self.expect(Token::Newline)?;
        self.expect(Token::Indent)?;

        let mut statements = Vec::new();
        while !matches!(self.current, Token::Dedent | Token::Eof) {
            if self.consume_newlines() {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        self.expect_block_end()?;
        Ok(Statement::Compound(statements))
    }

    /// `'if' Test ':' Suite ['else' ':' Suite]`
    fn parse_condition(&mut self) -> Result<Statement> {
        self.expect(Token::If)?;
        let condition = Box::new(self.parse_test()?);
        self.expect_char(':')?;
        let if_body = Box::new(self.parse_suite()?);

        let mut else_body = None;
        if matches!(self.current, Token::Else) {
            self.advance();
            self.expect_char(':')?;
            else_body = Some(Box::new(self.parse_suite()?));
        }

        Ok(Statement::IfElse {
            condition,
            if_body,
            else_body,
        })
    }

    /// `'return' Test | 'print' [TestList] | AssignOrCall`
    fn parse_simple_statement(&mut self) -> Result<Statement> {
        match self.current {
            Token::Return => {
                self.advance();
                Ok(Statement::Return(Box::new(self.parse_test()?)))
            }
            Token::Print => {
                self.advance();
                let args = if matches!(self.current, Token::Newline | Token::Eof) {
                    Vec::new()
                } else {
                    self.parse_test_list()?
                };
                Ok(Statement::Print(args))
            }
            _ => self.parse_assignment_or_call(),
        }
    }

    /// `DottedIds ('=' Test | '(' [TestList] ')')`
    fn parse_assignment_or_call(&mut self) -> Result<Statement> {
        let (prefix, last) = self.parse_dotted_ids()?;

        if self.current.is_char('=') {
            self.advance();
            let value = Box::new(self.parse_test()?);
            if prefix.is_empty() {
                return Ok(Statement::Assignment { name: last, value });
            }
            return Ok(Statement::FieldAssignment {
                object: prefix,
                field: last,
                value,
            });
        }

        self.expect_char('(')?;
        let args = self.parse_call_args()?;

        if prefix.is_empty() {
            if last == "str" {
                return Self::stringify(args);
            }
            bail!("Mython has no functions, only methods: '{last}'");
        }
        Ok(Statement::MethodCall {
            object: Box::new(Statement::VariableValue(prefix)),
            method: last,
            args,
        })
    }

    fn parse_test_list(&mut self) -> Result<Vec<Statement>> {
        let mut tests = vec![self.parse_test()?];
        while self.current.is_char(',') {
            self.advance();
            tests.push(self.parse_test()?);
        }
        Ok(tests)
    }

    /// `AndTest ('or' AndTest)*`
    fn parse_test(&mut self) -> Result<Statement> {
        let mut result = self.parse_and_test()?;
        while matches!(self.current, Token::Or) {
            self.advance();
            result = Statement::Or(Box::new(result), Box::new(self.parse_and_test()?));
        }
        Ok(result)
    }

    /// `NotTest ('and' NotTest)*`
    fn parse_and_test(&mut self) -> Result<Statement> {
        let mut result = self.parse_not_test()?;
        while matches!(self.current, Token::And) {
            self.advance();
            result = Statement::And(Box::new(result), Box::new(self.parse_not_test()?));
        }
        Ok(result)
    }

    /// `'not' NotTest | Comparison`
    fn parse_not_test(&mut self) -> Result<Statement> {
        if matches!(self.current, Token::Not) {
            self.advance();
            return Ok(Statement::Not(Box::new(self.parse_not_test()?)));
        }
        self.parse_comparison()
    }

    /// An additive expression, optionally followed by one comparison.
    fn parse_comparison(&mut self) -> Result<Statement> {
        let lhs = self.parse_additive()?;
        let op = match &self.current {
            t if t.is_char('<') => CompareOp::Less,
            t if t.is_char('>') => CompareOp::Greater,
            Token::Eq => CompareOp::Equal,
            Token::NotEq => CompareOp::NotEqual,
            Token::LessOrEq => CompareOp::LessOrEqual,
            Token::GreaterOrEq => CompareOp::GreaterOrEqual,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(Statement::Comparison {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_additive(&mut self) -> Result<Statement> {
        let mut result = self.parse_multiplicative()?;
        loop {
            if self.current.is_char('+') {
                self.advance();
                result = Statement::Add(Box::new(result), Box::new(self.parse_multiplicative()?));
            } else if self.current.is_char('-') {
                self.advance();
                result = Statement::Sub(Box::new(result), Box::new(self.parse_multiplicative()?));
            } else {
                break;
            }
        }
        Ok(result)
    }

    fn parse_multiplicative(&mut self) -> Result<Statement> {
        let mut result = self.parse_primary()?;
        loop {
            if self.current.is_char('*') {
                self.advance();
                result = Statement::Mult(Box::new(result), Box::new(self.parse_primary()?));
            } else if self.current.is_char('/') {
                self.advance();
                result = Statement::Div(Box::new(result), Box::new(self.parse_primary()?));
            } else {
                break;
            }
        }
        Ok(result)
    }

    fn parse_primary(&mut self) -> Result<Statement> {
        match &self.current {
            t if t.is_char('(') => {
                self.advance();
                let result = self.parse_test()?;
                self.expect_char(')')?;
                Ok(result)
            }
            t if t.is_char('-') => {
                self.advance();
                // Unary minus is multiplication by -1.
                Ok(Statement::Mult(
                    Box::new(self.parse_primary()?),
                    Box::new(Statement::NumericConst(-1)),
                ))
            }
            Token::Number(value) => {
                let value = *value;
                self.advance();
                Ok(Statement::NumericConst(value))
            }
            Token::String(value) => {
                let value = value.clone();
                self.advance();
                Ok(Statement::StringConst(value))
            }
            Token::True => {
                self.advance();
                Ok(Statement::BoolConst(true))
            }
            Token::False => {
                self.advance();
                Ok(Statement::BoolConst(false))
            }
            Token::None => {
                self.advance();
                Ok(Statement::None)
            }
            Token::Id(_) => self.parse_dotted_expression(),
            _ => Err(self.error("expression")),
        }
    }

    /// `DottedIds ['(' [TestList] ')']` in expression position: a variable
    /// lookup, a method call, a new-instance expression for a registered
    /// class name, or `str(...)`.
    fn parse_dotted_expression(&mut self) -> Result<Statement> {
        let (prefix, last) = self.parse_dotted_ids()?;

        if !self.current.is_char('(') {
            let mut ids = prefix;
            ids.push(last);
            return Ok(Statement::VariableValue(ids));
        }
        let args = self.parse_call_args()?;

        if !prefix.is_empty() {
            return Ok(Statement::MethodCallExpr {
                object: Box::new(Statement::VariableValue(prefix)),
                method: last,
                args,
            });
        }
        if let Some(class) = self.classes.get(&last) {
            return Ok(Statement::NewInstance {
                class: Rc::clone(class),
                args,
            });
        }
        if last == "str" {
            return Self::stringify(args);
        }
        bail!("Unknown call to '{last}()'")
    }

    fn stringify(args: Vec<Statement>) -> Result<Statement> {
        match <[Statement; 1]>::try_from(args) {
            Ok([arg]) => Ok(Statement::Stringify(Box::new(arg))),
            Err(args) => bail!("Function str takes exactly one argument, got {}", args.len()),
        }
    }

    /// Consumes `'(' [TestList] ')'`, with the opening parenthesis current.
    fn parse_call_args(&mut self) -> Result<Vec<Statement>> {
        self.expect_char('(')?;
        let args = if self.current.is_char(')') {
            Vec::new()
        } else {
            self.parse_test_list()?
        };
        self.expect_char(')')?;
        Ok(args)
    }

    /// `Id ('.' Id)*` as the leading path plus the final identifier.
    fn parse_dotted_ids(&mut self) -> Result<(Vec<String>, String)> {
        let mut last = self.expect_id()?;
        let mut prefix = Vec::new();
        while self.current.is_char('.') {
            self.advance();
            prefix.push(std::mem::replace(&mut last, self.expect_id()?));
        }
        Ok((prefix, last))
    }

    fn consume_newlines(&mut self) -> bool {
        let mut consumed = false;
        while matches!(self.current, Token::Newline) {
            consumed = true;
            self.advance();
        }
        consumed
    }

    /// Simple statements end at a newline; the lexer trims the final newline
    /// of the source, so end-of-stream is accepted as well.
    fn expect_statement_end(&mut self) -> Result<()> {
        match self.current {
            Token::Newline => {
                self.advance();
                Ok(())
            }
            Token::Eof => Ok(()),
            _ => Err(self.error("newline")),
        }
    }

    /// Suites close with a dedent; trailing dedents trimmed by the lexer
    /// make end-of-stream acceptable too.
    fn expect_block_end(&mut self) -> Result<()> {
        match self.current {
            Token::Dedent => {
                self.advance();
                Ok(())
            }
            Token::Eof => Ok(()),
            _ => Err(self.error("dedent")),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if self.current == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("{expected:?}")))
        }
    }

    fn expect_char(&mut self, c: char) -> Result<()> {
        if self.current.is_char(c) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("'{c}'")))
        }
    }

    fn expect_id(&mut self) -> Result<String> {
        if let Token::Id(name) = &self.current {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error("identifier"))
        }
    }

    fn advance(&mut self) {
        self.pos += 1;
        self.current = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
    }

    fn error(&self, expected: &str) -> anyhow::Error {
        anyhow!("Expected {expected}, got {:?}", self.current)
    }
}

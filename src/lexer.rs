//! Indentation-aware lexer.
//!
//! Turns source text into a flat token stream, synthesizing
//! `Indent`/`Dedent`/`Newline` tokens from leading whitespace. A raw pass
//! measures indentation at the start of every physical line, including blank
//! and comment-only lines; a normalization pass then removes the newline and
//! indentation churn those lines produce. The returned stream carries no
//! trailing `Eof` token; the parser synthesizes one past the end.

use thiserror::Error;

use crate::token::Token;

/// Two spaces per indentation level.
const INDENT_STEP: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("Unexpected character '{character}' at position {position}")]
    UnexpectedCharacter { character: char, position: usize },
    #[error("Invalid integer literal '{literal}' at position {position}")]
    InvalidIntegerLiteral { literal: String, position: usize },
    #[error("Unterminated string literal at position {position}")]
    UnterminatedString { position: usize },
}

pub type LexResult<T> = Result<T, LexError>;

/// Tokenizes a whole Mython source text.
pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    Lexer::new(input).run()
}

/// Characters that can start a keyword or compound operator.
fn is_special_char(c: char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, '=' | '<' | '>' | '!')
}

fn is_operator_char(c: char) -> bool {
    matches!(
        c,
        ':' | '(' | ')' | ',' | '.' | '+' | '-' | '*' | '/' | '!' | '>' | '<' | '='
    )
}

fn keyword_token(word: &str) -> Option<Token> {
    let token = match word {
        "==" => Token::Eq,
        "!=" => Token::NotEq,
        "<=" => Token::LessOrEq,
        ">=" => Token::GreaterOrEq,
        "class" => Token::Class,
        "return" => Token::Return,
        "if" => Token::If,
        "else" => Token::Else,
        "def" => Token::Def,
        "print" => Token::Print,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "None" => Token::None,
        "True" => Token::True,
        "False" => Token::False,
        _ => return None,
    };
    Some(token)
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    nesting: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            nesting: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> LexResult<Vec<Token>> {
        while self.peek().is_some() {
            self.push_indents();
            while let Some(c) = self.peek() {
                match c {
                    '#' => {
                        // Comment to end of line; the newline itself stays.
                        self.consume_while(|c| c != '\n');
                    }
                    '\n' => {
                        self.advance();
                        self.tokens.push(Token::Newline);
                        break;
                    }
                    ' ' => {
                        self.consume_while(|c| c == ' ');
                    }
                    '\'' | '"' => self.read_string(c)?,
                    c if c.is_ascii_digit() => self.read_number()?,
                    c if is_special_char(c) => self.read_keyword_or_fall_through(),
                    c if is_operator_char(c) => {
                        self.advance();
                        self.tokens.push(Token::Char(c));
                    }
                    '_' => self.read_identifier(),
                    _ => {
                        return Err(LexError::UnexpectedCharacter {
                            character: c,
                            position: self.pos,
                        });
                    }
                }
            }
        }
        self.flush_dedents();
        Ok(normalize(self.tokens))
    }

    /// Emits the indentation delta for the line starting at the current
    /// position. Runs on every physical line; blank and comment-only lines
    /// produce churn that `normalize` cancels out afterwards.
    fn push_indents(&mut self) {
        let spaces = self.consume_while(|c| c == ' ');
        let nesting = spaces / INDENT_STEP;
        while nesting > self.nesting {
            self.nesting += 1;
            self.tokens.push(Token::Indent);
        }
        while nesting < self.nesting {
            self.nesting -= 1;
            self.tokens.push(Token::Dedent);
        }
    }

    fn flush_dedents(&mut self) {
        while self.nesting > 0 {
            self.nesting -= 1;
            self.tokens.push(Token::Dedent);
        }
    }

    fn read_string(&mut self, quote: char) -> LexResult<()> {
        let start = self.pos;
        self.advance();
        let content_start = self.pos;
        self.consume_while(|c| c != quote && c != '\n');
        if self.peek() != Some(quote) {
            return Err(LexError::UnterminatedString { position: start });
        }
        let content = self.input[content_start..self.pos].to_string();
        self.advance();
        self.tokens.push(Token::String(content));
        Ok(())
    }

    fn read_number(&mut self) -> LexResult<()> {
        let start = self.pos;
        self.consume_while(|c| c.is_ascii_digit());
        let literal = &self.input[start..self.pos];
        let value = literal
            .parse::<i64>()
            .map_err(|_| LexError::InvalidIntegerLiteral {
                literal: literal.to_string(),
                position: start,
            })?;
        self.tokens.push(Token::Number(value));
        Ok(())
    }

    /// Consumes a maximal run of keyword/compound-operator characters and
    /// matches it against the fixed table. On a miss the whole run is put
    /// back and tokenization falls through to the single-character and
    /// identifier rules.
    fn read_keyword_or_fall_through(&mut self) {
        let start = self.pos;
        self.consume_while(is_special_char);
        if let Some(token) = keyword_token(&self.input[start..self.pos]) {
            self.tokens.push(token);
            return;
        }
        self.pos = start;
        let Some(c) = self.peek() else { return };
        if c.is_ascii_alphabetic() {
            self.read_identifier();
        } else {
            self.advance();
            self.tokens.push(Token::Char(c));
        }
    }

    fn read_identifier(&mut self) {
        let start = self.pos;
        self.consume_while(|c| c.is_ascii_alphanumeric() || c == '_');
        self.tokens
            .push(Token::Id(self.input[start..self.pos].to_string()));
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn consume_while<P>(&mut self, keep: P) -> usize
    where
        P: Fn(char) -> bool,
    {
        let mut count = 0;
        while let Some(c) = self.peek() {
            if !keep(c) {
                break;
            }
            self.advance();
            count += 1;
        }
        count
    }
}

/// Rebuilds the raw stream so that between any two significant tokens at most
/// one `Newline` and only the net indentation change remain. Leading newlines
/// and everything after the last significant token are dropped, so the result
/// starts and ends on a significant token (or is empty).
fn normalize(raw: Vec<Token>) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(raw.len());
    let mut newlines = 0usize;
    let mut delta = 0i64;

    for token in raw {
        match token {
            Token::Newline => newlines += 1,
            Token::Indent => delta += 1,
            Token::Dedent => delta -= 1,
            significant => {
                if newlines > 0 && !tokens.is_empty() {
                    tokens.push(Token::Newline);
                }
                for _ in 0..delta {
                    tokens.push(Token::Indent);
                }
                for _ in delta..0 {
                    tokens.push(Token::Dedent);
                }
                newlines = 0;
                delta = 0;
                tokens.push(significant);
            }
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn tokenize_ok(input: &str) -> Vec<Token> {
        tokenize(input).expect("tokenize should succeed")
    }

    #[test]
    fn tokenizes_class_with_method() {
        let input = indoc! {"
            class Counter:
              def add(step):
                self.value = self.value + step
            c = Counter()
        "};
        let expected = vec![
            Token::Class,
            Token::Id("Counter".to_string()),
            Token::Char(':'),
            Token::Newline,
            Token::Indent,
            Token::Def,
            Token::Id("add".to_string()),
            Token::Char('('),
            Token::Id("step".to_string()),
            Token::Char(')'),
            Token::Char(':'),
            Token::Newline,
            Token::Indent,
            Token::Id("self".to_string()),
            Token::Char('.'),
            Token::Id("value".to_string()),
            Token::Char('='),
            Token::Id("self".to_string()),
            Token::Char('.'),
            Token::Id("value".to_string()),
            Token::Char('+'),
            Token::Id("step".to_string()),
            Token::Newline,
            Token::Dedent,
            Token::Dedent,
            Token::Id("c".to_string()),
            Token::Char('='),
            Token::Id("Counter".to_string()),
            Token::Char('('),
            Token::Char(')'),
        ];
        assert_eq!(tokenize_ok(input), expected);
    }

    #[test]
    fn recognizes_keywords_and_compound_operators() {
        let tokens = tokenize_ok("x = not True and None or False == 1 != 2 <= 3 >= 4\n");
        let expected = vec![
            Token::Id("x".to_string()),
            Token::Char('='),
            Token::Not,
            Token::True,
            Token::And,
            Token::None,
            Token::Or,
            Token::False,
            Token::Eq,
            Token::Number(1),
            Token::NotEq,
            Token::Number(2),
            Token::LessOrEq,
            Token::Number(3),
            Token::GreaterOrEq,
            Token::Number(4),
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn keyword_prefixes_fall_through_to_identifiers() {
        let tokens = tokenize_ok("classes = ifs + 1\n");
        let expected = vec![
            Token::Id("classes".to_string()),
            Token::Char('='),
            Token::Id("ifs".to_string()),
            Token::Char('+'),
            Token::Number(1),
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn reads_string_literals_with_either_quote() {
        let tokens = tokenize_ok("a = 'hello'\nb = \"it's\"\n");
        let expected = vec![
            Token::Id("a".to_string()),
            Token::Char('='),
            Token::String("hello".to_string()),
            Token::Newline,
            Token::Id("b".to_string()),
            Token::Char('='),
            Token::String("it's".to_string()),
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn skips_comments_and_keeps_the_line_break() {
        let tokens = tokenize_ok(indoc! {"
            x = 1  # trailing comment
            # whole-line comment
            y = 2
        "});
        let expected = vec![
            Token::Id("x".to_string()),
            Token::Char('='),
            Token::Number(1),
            Token::Newline,
            Token::Id("y".to_string()),
            Token::Char('='),
            Token::Number(2),
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn blank_lines_do_not_change_indentation() {
        let tokens = tokenize_ok(indoc! {"
            if True:
              x = 1

              y = 2
        "});
        let expected = vec![
            Token::If,
            Token::True,
            Token::Char(':'),
            Token::Newline,
            Token::Indent,
            Token::Id("x".to_string()),
            Token::Char('='),
            Token::Number(1),
            Token::Newline,
            Token::Id("y".to_string()),
            Token::Char('='),
            Token::Number(2),
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn indented_comment_lines_do_not_change_indentation() {
        let tokens = tokenize_ok(indoc! {"
            x = 1
                # indented comment
            y = 2
        "});
        let expected = vec![
            Token::Id("x".to_string()),
            Token::Char('='),
            Token::Number(1),
            Token::Newline,
            Token::Id("y".to_string()),
            Token::Char('='),
            Token::Number(2),
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn comment_only_source_produces_no_tokens() {
        assert_eq!(tokenize_ok("# nothing here\n\n"), Vec::new());
        assert_eq!(tokenize_ok(""), Vec::new());
    }

    #[test]
    fn stream_never_starts_or_ends_with_structure_tokens() {
        let tokens = tokenize_ok(indoc! {"

            if True:
              x = 1
        "});
        assert!(matches!(tokens.first(), Some(Token::If)));
        assert!(matches!(tokens.last(), Some(Token::Number(1))));
        for pair in tokens.windows(2) {
            assert!(!matches!(pair, [Token::Newline, Token::Newline]));
        }
    }

    #[test]
    fn dedents_never_outnumber_indents() {
        let tokens = tokenize_ok(indoc! {"
            class A:
              def f():
                if True:
                  return 1
                return 2

            a = A()
            print a.f()
        "});
        let mut depth = 0i64;
        for token in &tokens {
            match token {
                Token::Indent => depth += 1,
                Token::Dedent => depth -= 1,
                _ => {}
            }
            assert!(depth >= 0, "dedent below the outermost level");
        }
    }

    #[test]
    fn lexing_is_deterministic() {
        let input = indoc! {"
            class A:
              def f():
                return 'x'

            a = A()
            print a.f(), 1 + 2
        "};
        assert_eq!(tokenize_ok(input), tokenize_ok(input));
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("x = 'oops\n").expect_err("expected unterminated string");
        assert_eq!(err, LexError::UnterminatedString { position: 4 });

        let err = tokenize("x = \"oops").expect_err("expected unterminated string");
        assert_eq!(err, LexError::UnterminatedString { position: 4 });
    }

    #[test]
    fn errors_on_integer_overflow() {
        let err = tokenize("n = 99999999999999999999\n").expect_err("expected overflow");
        assert!(err.to_string().contains("Invalid integer literal"));
    }

    #[test]
    fn errors_on_stray_control_character() {
        let err = tokenize("x = 1 @ 2\n").expect_err("expected lexing failure");
        assert!(err.to_string().contains("Unexpected character '@'"));

        let err = tokenize("x =\t1\n").expect_err("expected lexing failure");
        assert_eq!(
            err,
            LexError::UnexpectedCharacter {
                character: '\t',
                position: 3
            }
        );
    }
}

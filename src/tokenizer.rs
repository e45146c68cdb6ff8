//! Lexical analyzer (tokenizer) for the Jack language.
//!
//! Produces the complete token stream for one compilation unit up front.
//! The first lexical error aborts tokenization.

use crate::error::{CompileError, Result};
use crate::token::{Keyword, Span, SpannedToken, Token, is_symbol};

/// Jack language tokenizer.
pub struct Tokenizer {
    chars: Vec<char>,
    pos: usize,
    byte_offset: usize,
    line: usize,
    column: usize,
}

impl Tokenizer {
    /// Create a new tokenizer for the given input.
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            byte_offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the input and return the token stream.
    pub fn tokenize(mut self) -> Result<Vec<SpannedToken>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments();
            let Some(c) = self.peek() else { break };
            tokens.push(self.next_token(c)?);
        }

        Ok(tokens)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    /// Peek at the current character.
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Peek at the next character.
    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    /// Advance to the next character, updating byte offset incrementally.
    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        self.byte_offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Skip whitespace and comments.
    ///
    /// Block comments are consumed atomically, so `//` inside `/* ... */`
    /// is never treated as a line comment. Comments do not nest; the first
    /// `*/` closes the comment, and an unterminated one runs to EOF.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while let Some(c) = self.peek() {
                if c.is_whitespace() {
                    self.advance();
                } else {
                    break;
                }
            }

            if self.peek() == Some('/') {
                if self.peek_next() == Some('/') {
                    // Line comment
                    self.advance();
                    self.advance();
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                    continue;
                } else if self.peek_next() == Some('*') {
                    // Block comment, including /** ... */ doc comments
                    self.advance();
                    self.advance();
                    while !self.is_at_end() {
                        if self.peek() == Some('*') && self.peek_next() == Some('/') {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                    continue;
                }
            }

            break;
        }
    }

    /// Lex the next token, starting at the already-peeked character `c`.
    fn next_token(&mut self, c: char) -> Result<SpannedToken> {
        let start_pos = self.byte_offset;
        let start_line = self.line;
        let start_column = self.column;

        if is_symbol(c) {
            self.advance();
            let span = Span::new(start_pos, self.byte_offset, start_line, start_column);
            return Ok(SpannedToken::new(Token::Symbol(c), span));
        }

        if c.is_ascii_digit() {
            return self.read_integer(start_pos, start_line, start_column);
        }

        if c == '"' {
            return self.read_string(start_pos, start_line, start_column);
        }

        if c.is_alphabetic() || c == '_' {
            return Ok(self.read_identifier(start_pos, start_line, start_column));
        }

        self.advance();
        let span = Span::new(start_pos, self.byte_offset, start_line, start_column);
        Err(CompileError::InvalidCharacter { ch: c, span })
    }

    /// Read an integer constant. The range is 0..=32767; the minus sign is
    /// a unary operator, never part of the literal.
    fn read_integer(
        &mut self,
        start_pos: usize,
        start_line: usize,
        start_column: usize,
    ) -> Result<SpannedToken> {
        let mut value: u32 = 0;

        while let Some(c) = self.peek() {
            if let Some(digit) = c.to_digit(10) {
                self.advance();
                value = value.saturating_mul(10).saturating_add(digit);
            } else {
                break;
            }
        }

        let span = Span::new(start_pos, self.byte_offset, start_line, start_column);

        if value > 32767 {
            return Err(CompileError::IntegerOutOfRange { value, span });
        }

        Ok(SpannedToken::new(
            Token::IntegerConstant(value as u16),
            span,
        ))
    }

    /// Read a string constant. No escape sequences; newlines are not
    /// permitted inside the literal.
    fn read_string(
        &mut self,
        start_pos: usize,
        start_line: usize,
        start_column: usize,
    ) -> Result<SpannedToken> {
        self.advance(); // Opening quote

        let mut value = String::new();

        loop {
            match self.peek() {
                Some('"') => {
                    self.advance();
                    let span = Span::new(start_pos, self.byte_offset, start_line, start_column);
                    return Ok(SpannedToken::new(Token::StringConstant(value), span));
                }
                Some('\n') | None => {
                    let span = Span::new(start_pos, self.byte_offset, start_line, start_column);
                    return Err(CompileError::UnterminatedString { span });
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
    }

    /// Read a keyword or identifier.
    fn read_identifier(
        &mut self,
        start_pos: usize,
        start_line: usize,
        start_column: usize,
    ) -> SpannedToken {
        let mut value = String::new();

        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                value.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let span = Span::new(start_pos, self.byte_offset, start_line, start_column);

        let token = if let Some(keyword) = Keyword::parse_keyword(&value) {
            Token::Keyword(keyword)
        } else {
            Token::Identifier(value)
        };

        SpannedToken::new(token, span)
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Represents the position of a token in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// All token types understood by main scripts
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Integer(i64),
    String(String),
    Boolean(bool),

    Identifier(String),

    // Keywords
    Import,
    Fn,
    Struct,
    Let,
    Return,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Equal,
    EqualEqual,
    NotEqual,
    Less,
    Greater,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Semicolon,
    Colon,
    DoubleColon,
    Arrow,
    Dot,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Integer(n) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "\"{}\"", s),
            TokenKind::Boolean(b) => write!(f, "{}", b),
            TokenKind::Identifier(s) => write!(f, "{}", s),
            TokenKind::Import => f.write_str("'import'"),
            TokenKind::Fn => f.write_str("'fn'"),
            TokenKind::Struct => f.write_str("'struct'"),
            TokenKind::Let => f.write_str("'let'"),
            TokenKind::Return => f.write_str("'return'"),
            TokenKind::Plus => f.write_str("'+'"),
            TokenKind::Minus => f.write_str("'-'"),
            TokenKind::Star => f.write_str("'*'"),
            TokenKind::Slash => f.write_str("'/'"),
            TokenKind::Equal => f.write_str("'='"),
            TokenKind::EqualEqual => f.write_str("'=='"),
            TokenKind::NotEqual => f.write_str("'!='"),
            TokenKind::Less => f.write_str("'<'"),
            TokenKind::Greater => f.write_str("'>'"),
            TokenKind::LeftParen => f.write_str("'('"),
            TokenKind::RightParen => f.write_str("')'"),
            TokenKind::LeftBrace => f.write_str("'{'"),
            TokenKind::RightBrace => f.write_str("'}'"),
            TokenKind::LeftBracket => f.write_str("'['"),
            TokenKind::RightBracket => f.write_str("']'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Semicolon => f.write_str("';'"),
            TokenKind::Colon => f.write_str("':'"),
            TokenKind::DoubleColon => f.write_str("'::'"),
            TokenKind::Arrow => f.write_str("'->'"),
            TokenKind::Dot => f.write_str("'.'"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

/// A token with its kind and position information
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, position: Position) -> Self {
        Self { kind, position }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("Unexpected character '{ch}' at line {}, column {}", .position.line, .position.column)]
    UnexpectedCharacter { ch: char, position: Position },
    #[error("Unterminated string literal starting at line {}, column {}", .position.line, .position.column)]
    UnterminatedString { position: Position },
    #[error("Integer literal '{text}' out of range at line {}, column {}", .position.line, .position.column)]
    IntegerOverflow { text: String, position: Position },
}

impl LexError {
    pub fn position(&self) -> Position {
        match self {
            LexError::UnexpectedCharacter { position, .. }
            | LexError::UnterminatedString { position }
            | LexError::IntegerOverflow { position, .. } => *position,
        }
    }
}

/// Tokenizer for main scripts
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    keywords: HashMap<&'static str, TokenKind>,
    tokens: Vec<Token>,
}

impl Tokenizer {
    pub fn new(input: &str) -> Self {
        let mut keywords = HashMap::new();
        keywords.insert("import", TokenKind::Import);
        keywords.insert("fn", TokenKind::Fn);
        keywords.insert("struct", TokenKind::Struct);
        keywords.insert("let", TokenKind::Let);
        keywords.insert("return", TokenKind::Return);
        keywords.insert("true", TokenKind::Boolean(true));
        keywords.insert("false", TokenKind::Boolean(false));

        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            keywords,
            tokens: Vec::new(),
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        loop {
            self.skip_whitespace_and_comments();
            if self.is_at_end() {
                break;
            }
            self.scan_token()?;
        }
        let eof = Token::new(TokenKind::Eof, self.current_position());
        self.tokens.push(eof);
        Ok(std::mem::take(&mut self.tokens))
    }

    fn scan_token(&mut self) -> Result<(), LexError> {
        let start = self.current_position();
        let ch = self.advance();
        let kind = match ch {
            '+' => TokenKind::Plus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '<' => TokenKind::Less,
            '>' => TokenKind::Greater,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            '-' => {
                if self.match_char('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            ':' => {
                if self.match_char(':') {
                    TokenKind::DoubleColon
                } else {
                    TokenKind::Colon
                }
            }
            '=' => {
                if self.match_char('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                }
            }
            '!' if self.match_char('=') => TokenKind::NotEqual,
            '"' => self.scan_string(start)?,
            c if c.is_ascii_digit() => self.scan_number(c, start)?,
            c if c.is_alphabetic() || c == '_' => self.scan_identifier(c),
            other => {
                return Err(LexError::UnexpectedCharacter {
                    ch: other,
                    position: start,
                });
            }
        };
        self.tokens.push(Token::new(kind, start));
        Ok(())
    }

    fn scan_string(&mut self, start: Position) -> Result<TokenKind, LexError> {
        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(LexError::UnterminatedString { position: start });
            }
            match self.advance() {
                '"' => break,
                '\\' => {
                    if self.is_at_end() {
                        return Err(LexError::UnterminatedString { position: start });
                    }
                    match self.advance() {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        other => value.push(other),
                    }
                }
                '\n' => return Err(LexError::UnterminatedString { position: start }),
                other => value.push(other),
            }
        }
        Ok(TokenKind::String(value))
    }

    fn scan_number(&mut self, first: char, start: Position) -> Result<TokenKind, LexError> {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.advance();
                if c != '_' {
                    text.push(c);
                }
            } else {
                break;
            }
        }
        text.parse::<i64>()
            .map(TokenKind::Integer)
            .map_err(|_| LexError::IntegerOverflow {
                text,
                position: start,
            })
    }

    fn scan_identifier(&mut self, first: char) -> TokenKind {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
                text.push(c);
            } else {
                break;
            }
        }
        self.keywords
            .get(text.as_str())
            .cloned()
            .unwrap_or(TokenKind::Identifier(text))
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else if c == '/' && self.peek_next() == Some('/') {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) -> char {
        let ch = self.input[self.position];
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn current_position(&self) -> Position {
        Position::new(self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Tokenizer::new(source)
            .tokenize()
            .expect("tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn tokenizes_function_reference_and_arrow() {
        assert_eq!(
            kinds("fn f() -> any { return ::g; }"),
            vec![
                TokenKind::Fn,
                TokenKind::Identifier("f".into()),
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::Arrow,
                TokenKind::Identifier("any".into()),
                TokenKind::LeftBrace,
                TokenKind::Return,
                TokenKind::DoubleColon,
                TokenKind::Identifier("g".into()),
                TokenKind::Semicolon,
                TokenKind::RightBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_line_comments() {
        assert_eq!(
            kinds("// header\nlet x = 1; // trailing"),
            vec![
                TokenKind::Let,
                TokenKind::Identifier("x".into()),
                TokenKind::Equal,
                TokenKind::Integer(1),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tracks_positions_across_lines() {
        let tokens = Tokenizer::new("let\n  value").tokenize().expect("tokenize");
        assert_eq!(tokens[1].position, Position::new(2, 3));
    }

    #[test]
    fn reports_unterminated_string() {
        let error = Tokenizer::new("let s = \"open").tokenize().unwrap_err();
        assert_eq!(
            error,
            LexError::UnterminatedString {
                position: Position::new(1, 9)
            }
        );
    }

    #[test]
    fn rejects_stray_bang() {
        let error = Tokenizer::new("!x").tokenize().unwrap_err();
        assert!(matches!(error, LexError::UnexpectedCharacter { ch: '!', .. }));
    }
}

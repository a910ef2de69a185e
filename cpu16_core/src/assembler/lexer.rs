use std::iter::Peekable;
use std::str::CharIndices;

use super::AssemblerError;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TokenKind<'a> {
    Newline,

    // Operators
    Plus,
    Minus,

    // Literals
    IntLiteral(&'a str, i64),
    ChrLiteral(&'a str, char),

    // Punctuation
    Dot,
    Comma,
    Colon,
    Symbol(&'a str),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub line: usize,
    pub column: usize,
    pub width: usize,
}

#[derive(Clone, Debug)]
pub struct Lexer<'a> {
    source: &'a str,
    char_iter: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            char_iter: source.char_indices().peekable(),
            line: 1,
            column: 0,
        }
    }

    fn next_char(&mut self) -> Option<(usize, char)> {
        self.column += 1;
        self.char_iter.next()
    }

    fn skip_whitespace(&mut self) {
        while let Some((_, ' ' | '\t' | '\r')) = self.char_iter.peek() {
            self.next_char();
        }
    }

    fn token(&self, kind: TokenKind<'a>, column: usize, width: usize) -> Token<'a> {
        Token {
            kind,
            line: self.line,
            column,
            width,
        }
    }

    /// Consume characters following `first` (at byte `start`) while `pred`
    /// holds, returning the byte index one past the last consumed character.
    fn take_while(&mut self, start: usize, first: char, pred: impl Fn(char) -> bool) -> usize {
        let mut end = start + first.len_utf8();
        while let Some(&(j, c)) = self.char_iter.peek() {
            if !pred(c) {
                break;
            }
            end = j + c.len_utf8();
            self.next_char();
        }
        end
    }

    fn lex_comment(&mut self, i: usize, first: char) -> Token<'a> {
        let column = self.column;
        let end = self.take_while(i, first, |c| c != '\n');
        // swallow the newline that ends the comment
        if let Some((_, '\n')) = self.char_iter.peek() {
            self.next_char();
        }
        let token = self.token(TokenKind::Newline, column, end - i);
        self.line += 1;
        self.column = 0;
        token
    }

    fn lex_int(&mut self, i: usize, first: char) -> Result<Token<'a>, AssemblerError> {
        let column = self.column;
        let end = self.take_while(i, first, |c| c.is_ascii_alphanumeric() || c == '_');
        let literal = &self.source[i..end];
        let digits = literal.replace('_', "");

        let (radix, body) = match digits.get(..2) {
            Some("0x" | "0X") => (16, &digits[2..]),
            Some("0b" | "0B") => (2, &digits[2..]),
            _ => (10, &digits[..]),
        };

        i64::from_str_radix(body, radix)
            .map(|value| self.token(TokenKind::IntLiteral(literal, value), column, literal.len()))
            .map_err(|_| {
                AssemblerError::new(
                    format!("Invalid integer literal '{literal}'"),
                    self.line,
                    column,
                    literal.len(),
                )
            })
    }

    fn lex_char(&mut self, i: usize) -> Result<Token<'a>, AssemblerError> {
        let column = self.column;
        let unterminated = |lexer: &Self| {
            AssemblerError::new(
                "Unterminated character literal".to_string(),
                lexer.line,
                column,
                1,
            )
        };

        // never run past the end of the line
        let next = |lexer: &mut Self| match lexer.char_iter.peek() {
            Some((_, '\n')) | None => None,
            Some(_) => lexer.next_char(),
        };

        let value = match next(self) {
            Some((_, '\\')) => match next(self) {
                Some((_, 'n')) => '\n',
                Some((_, 'r')) => '\r',
                Some((_, 't')) => '\t',
                Some((_, '0')) => '\0',
                Some((_, c)) => c,
                None => return Err(unterminated(self)),
            },
            Some((_, c)) => c,
            None => return Err(unterminated(self)),
        };

        match next(self) {
            Some((j, '\'')) => {
                let literal = &self.source[i..j + 1];
                Ok(self.token(TokenKind::ChrLiteral(literal, value), column, literal.len()))
            }
            _ => Err(unterminated(self)),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, AssemblerError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();

        let (i, c) = self.next_char()?;
        let column = self.column;
        Some(match c {
            '\n' => {
                let token = self.token(TokenKind::Newline, column, 1);
                self.line += 1;
                self.column = 0;
                Ok(token)
            }
            ';' | '#' => Ok(self.lex_comment(i, c)),
            '+' => Ok(self.token(TokenKind::Plus, column, 1)),
            '-' => Ok(self.token(TokenKind::Minus, column, 1)),
            '.' => Ok(self.token(TokenKind::Dot, column, 1)),
            ',' => Ok(self.token(TokenKind::Comma, column, 1)),
            ':' => Ok(self.token(TokenKind::Colon, column, 1)),
            '\'' => self.lex_char(i),
            '0'..='9' => self.lex_int(i, c),
            c if c.is_alphabetic() || c == '_' => {
                let end = self.take_while(i, c, |c| c.is_alphanumeric() || c == '_');
                let name = &self.source[i..end];
                Ok(self.token(TokenKind::Symbol(name), column, name.len()))
            }
            c => Err(AssemblerError::new(
                format!("Unexpected character '{c}'"),
                self.line,
                column,
                1,
            )),
        })
    }
}

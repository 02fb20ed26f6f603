//! Scanner implementation for the Rill language

use crate::{Token, TokenKind};
use rill_common::{RillError, RillResult};

/// Scanner over a source byte sequence.
///
/// The language surface is ASCII; scanning works on bytes and rejects
/// anything outside the token alphabet with a lexical error.
pub struct Lexer<'a> {
    input: &'a [u8],
    position: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input: input.as_bytes(), position: 0, line: 1 }
    }

    /// Tokenize the entire input into a vector of tokens ending with EOF.
    pub fn tokenize(&mut self) -> RillResult<Vec<Token>> {
        let mut tokens = Vec::new();

        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }

        tokens.push(Token::new(TokenKind::EndOfFile, self.line));
        Ok(tokens)
    }

    /// Get the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> RillResult<Option<Token>> {
        self.skip_whitespace_and_comments();

        if self.is_at_end() {
            return Ok(None);
        }

        let line = self.line;
        let kind = match self.current_byte() {
            b'(' => { self.advance(); TokenKind::LeftParen }
            b')' => { self.advance(); TokenKind::RightParen }
            b'{' => { self.advance(); TokenKind::LeftBrace }
            b'}' => { self.advance(); TokenKind::RightBrace }
            b';' => { self.advance(); TokenKind::Semicolon }
            b',' => { self.advance(); TokenKind::Comma }
            b'.' => { self.advance(); TokenKind::Dot }
            b'"' => { self.advance(); TokenKind::Quote }
            b'+' => { self.advance(); TokenKind::Plus }
            b'-' => { self.advance(); TokenKind::Minus }
            b'*' => { self.advance(); TokenKind::Star }
            b'/' => { self.advance(); TokenKind::Slash }
            b'%' => { self.advance(); TokenKind::Percent }

            b'=' => self.scan_double(b'=', TokenKind::Equal, TokenKind::Assign),
            b'!' => self.scan_double(b'=', TokenKind::NotEqual, TokenKind::Not),
            b'<' => self.scan_double(b'=', TokenKind::LessEqual, TokenKind::Less),
            b'>' => self.scan_double(b'=', TokenKind::GreaterEqual, TokenKind::Greater),
            b'&' => self.scan_double(b'&', TokenKind::And, TokenKind::Ampersand),
            b'|' => {
                if self.peek_byte() == Some(b'|') {
                    self.advance();
                    self.advance();
                    TokenKind::Or
                } else {
                    self.advance();
                    return Err(RillError::lex_error("unrecognized character '|'", line));
                }
            }

            c if c.is_ascii_digit() => self.scan_number()?,
            c if is_ident_start(c) => self.scan_identifier_or_keyword(),

            c => {
                self.advance();
                let printable = if c.is_ascii_graphic() {
                    format!("'{}'", c as char)
                } else {
                    format!("0x{:02x}", c)
                };
                return Err(RillError::lex_error(
                    format!("unrecognized character {}", printable),
                    line,
                ));
            }
        };

        Ok(Some(Token::new(kind, line)))
    }

    fn skip_whitespace_and_comments(&mut self) {
        while !self.is_at_end() {
            match self.current_byte() {
                b' ' | b'\t' | b'\r' => self.advance(),
                b'\n' => {
                    self.position += 1;
                    self.line += 1;
                }
                b'/' if self.peek_byte() == Some(b'/') => self.skip_line_comment(),
                _ => break,
            }
        }
    }

    /// Consume a `//` comment up to (not including) the newline.
    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.current_byte() != b'\n' {
            self.advance();
        }
    }

    /// Two-character operator if the next byte matches, otherwise the
    /// single-character fallback.
    fn scan_double(&mut self, expected: u8, double: TokenKind, single: TokenKind) -> TokenKind {
        self.advance();
        if self.current_opt() == Some(expected) {
            self.advance();
            double
        } else {
            single
        }
    }

    fn scan_number(&mut self) -> RillResult<TokenKind> {
        let start = self.position;
        while !self.is_at_end() && self.current_byte().is_ascii_digit() {
            self.advance();
        }
        let text = std::str::from_utf8(&self.input[start..self.position])
            .expect("digits are valid UTF-8");
        let value: i64 = text.parse().map_err(|_| {
            RillError::lex_error(format!("integer literal '{}' out of range", text), self.line)
        })?;
        Ok(TokenKind::Number(value))
    }

    fn scan_identifier_or_keyword(&mut self) -> TokenKind {
        let start = self.position;
        while !self.is_at_end() && is_ident_continue(self.current_byte()) {
            self.advance();
        }
        let word = std::str::from_utf8(&self.input[start..self.position])
            .expect("identifier bytes are valid UTF-8");

        keyword_kind(word).unwrap_or_else(|| TokenKind::Ident(word.to_string()))
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn current_byte(&self) -> u8 {
        self.input[self.position]
    }

    fn current_opt(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// The fixed keyword map. Identifiers that hit it become keyword tokens.
fn keyword_kind(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "package" => TokenKind::KeywordPackage,
        "import" => TokenKind::KeywordImport,
        "func" => TokenKind::KeywordFunc,
        "var" => TokenKind::KeywordVar,
        "type" => TokenKind::KeywordType,
        "struct" => TokenKind::KeywordStruct,
        "return" => TokenKind::KeywordReturn,
        "if" => TokenKind::KeywordIf,
        "else" => TokenKind::KeywordElse,
        "for" => TokenKind::KeywordFor,
        "true" => TokenKind::KeywordTrue,
        "false" => TokenKind::KeywordFalse,
        "nil" => TokenKind::KeywordNil,
        "fmt" => TokenKind::KeywordFmt,
        "Scan" => TokenKind::KeywordScan,
        "Print" => TokenKind::KeywordPrint,
        "Println" => TokenKind::KeywordPrintln,
        "int" => TokenKind::KeywordInt,
        "bool" => TokenKind::KeywordBool,
        _ => return None,
    };
    Some(kind)
}

/// Convenience entry point: tokenize a whole source string.
pub fn tokenize(source: &str) -> RillResult<Vec<Token>> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn operator_at_end_of_input_takes_the_single_form() {
        assert_eq!(kinds("<"), vec![TokenKind::Less, TokenKind::EndOfFile]);
        assert_eq!(kinds("="), vec![TokenKind::Assign, TokenKind::EndOfFile]);
        assert_eq!(kinds("&"), vec![TokenKind::Ampersand, TokenKind::EndOfFile]);
    }

    #[test]
    fn equality_pairs_are_greedy() {
        assert_eq!(
            kinds("== = != !"),
            vec![
                TokenKind::Equal,
                TokenKind::Assign,
                TokenKind::NotEqual,
                TokenKind::Not,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn underscores_are_identifier_characters() {
        assert_eq!(
            kinds("_tmp x_1"),
            vec![
                TokenKind::Ident("_tmp".to_string()),
                TokenKind::Ident("x_1".to_string()),
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn digits_cannot_start_an_identifier() {
        assert_eq!(
            kinds("1x"),
            vec![
                TokenKind::Number(1),
                TokenKind::Ident("x".to_string()),
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn comment_at_end_of_input_terminates() {
        assert_eq!(kinds("a // no newline after this"), vec![
            TokenKind::Ident("a".to_string()),
            TokenKind::EndOfFile,
        ]);
    }

    #[test]
    fn next_token_streams_until_exhausted() {
        let mut lexer = Lexer::new("a b");
        assert!(lexer.next_token().unwrap().is_some());
        assert!(lexer.next_token().unwrap().is_some());
        assert!(lexer.next_token().unwrap().is_none());
    }

    #[test]
    fn huge_literal_is_rejected() {
        assert!(tokenize("99999999999999999999999999").is_err());
    }

    #[test]
    fn error_carries_the_line_of_the_bad_byte() {
        let error = tokenize("ok\nok\n$\n").unwrap_err();
        assert!(error.to_string().contains("line 3"));
    }
}

//! Token definitions for the Rill language

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token types in the Rill language
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals
    Number(i64),

    // Identifiers
    Ident(String),

    // Keywords
    KeywordPackage,
    KeywordImport,
    KeywordFunc,
    KeywordVar,
    KeywordType,
    KeywordStruct,
    KeywordReturn,
    KeywordIf,
    KeywordElse,
    KeywordFor,
    KeywordTrue,
    KeywordFalse,
    KeywordNil,
    KeywordFmt,
    KeywordScan,
    KeywordPrint,
    KeywordPrintln,
    KeywordInt,
    KeywordBool,

    // Operators
    Plus,              // +
    Minus,             // -
    Star,              // *
    Slash,             // /
    Percent,           // %
    Assign,            // =
    Equal,             // ==
    NotEqual,          // !=
    Less,              // <
    LessEqual,         // <=
    Greater,           // >
    GreaterEqual,      // >=
    And,               // &&
    Or,                // ||
    Not,               // !
    Ampersand,         // &
    Dot,               // .

    // Delimiters
    Comma,             // ,
    Semicolon,         // ;
    Quote,             // "
    LeftParen,         // (
    RightParen,        // )
    LeftBrace,         // {
    RightBrace,        // }

    // Special
    EndOfFile,
}

impl TokenKind {
    /// Human-readable class name, used in the `--lex` table and in
    /// syntax-error messages.
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Number(_) => "number",
            TokenKind::Ident(_) => "identifier",
            TokenKind::KeywordPackage => "package",
            TokenKind::KeywordImport => "import",
            TokenKind::KeywordFunc => "func",
            TokenKind::KeywordVar => "var",
            TokenKind::KeywordType => "type",
            TokenKind::KeywordStruct => "struct",
            TokenKind::KeywordReturn => "return",
            TokenKind::KeywordIf => "if",
            TokenKind::KeywordElse => "else",
            TokenKind::KeywordFor => "for",
            TokenKind::KeywordTrue => "true",
            TokenKind::KeywordFalse => "false",
            TokenKind::KeywordNil => "nil",
            TokenKind::KeywordFmt => "fmt",
            TokenKind::KeywordScan => "Scan",
            TokenKind::KeywordPrint => "Print",
            TokenKind::KeywordPrintln => "Println",
            TokenKind::KeywordInt => "int",
            TokenKind::KeywordBool => "bool",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Assign => "=",
            TokenKind::Equal => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::Less => "<",
            TokenKind::LessEqual => "<=",
            TokenKind::Greater => ">",
            TokenKind::GreaterEqual => ">=",
            TokenKind::And => "&&",
            TokenKind::Or => "||",
            TokenKind::Not => "!",
            TokenKind::Ampersand => "&",
            TokenKind::Dot => ".",
            TokenKind::Comma => "comma",
            TokenKind::Semicolon => "semicolon",
            TokenKind::Quote => "double quotation",
            TokenKind::LeftParen => "left parenthesis",
            TokenKind::RightParen => "right parenthesis",
            TokenKind::LeftBrace => "left brace",
            TokenKind::RightBrace => "right brace",
            TokenKind::EndOfFile => "eof",
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::Percent
                | TokenKind::Assign
                | TokenKind::Equal
                | TokenKind::NotEqual
                | TokenKind::Less
                | TokenKind::LessEqual
                | TokenKind::Greater
                | TokenKind::GreaterEqual
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Not
                | TokenKind::Ampersand
                | TokenKind::Dot
        )
    }

    pub fn is_delimiter(&self) -> bool {
        matches!(
            self,
            TokenKind::Comma
                | TokenKind::Semicolon
                | TokenKind::Quote
                | TokenKind::LeftParen
                | TokenKind::RightParen
                | TokenKind::LeftBrace
                | TokenKind::RightBrace
        )
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::KeywordPackage
                | TokenKind::KeywordImport
                | TokenKind::KeywordFunc
                | TokenKind::KeywordVar
                | TokenKind::KeywordType
                | TokenKind::KeywordStruct
                | TokenKind::KeywordReturn
                | TokenKind::KeywordIf
                | TokenKind::KeywordElse
                | TokenKind::KeywordFor
                | TokenKind::KeywordTrue
                | TokenKind::KeywordFalse
                | TokenKind::KeywordNil
                | TokenKind::KeywordFmt
                | TokenKind::KeywordScan
                | TokenKind::KeywordPrint
                | TokenKind::KeywordPrintln
                | TokenKind::KeywordInt
                | TokenKind::KeywordBool
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A token with its source line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

impl Token {
    pub fn new(kind: TokenKind, line: u32) -> Self {
        Self { kind, line }
    }

    /// The lexeme this token was scanned from.
    pub fn literal(&self) -> String {
        match &self.kind {
            TokenKind::Number(value) => value.to_string(),
            TokenKind::Ident(name) => name.clone(),
            TokenKind::Comma => ",".to_string(),
            TokenKind::Semicolon => ";".to_string(),
            TokenKind::Quote => "\"".to_string(),
            TokenKind::LeftParen => "(".to_string(),
            TokenKind::RightParen => ")".to_string(),
            TokenKind::LeftBrace => "{".to_string(),
            TokenKind::RightBrace => "}".to_string(),
            TokenKind::EndOfFile => "eof".to_string(),
            kind => kind.name().to_string(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.literal())
    }
}

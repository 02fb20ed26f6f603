//! Parser implementation
//!
//! Predictive recursive descent over the token sequence. Two statement
//! prefixes are ambiguous with one token of look-ahead and are handled with
//! pseudo-matching: a second cursor speculatively consumes tokens and either
//! commits (`roll_forward`) or resets to the committed position. The first
//! unrecoverable mismatch aborts parsing with a syntax error.

use crate::ast::*;
use rill_common::{RillError, RillResult};
use rill_lexer::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    pseudo: usize,
}

impl Parser {
    /// The token list must be non-empty and end with EOF, as produced by the
    /// lexer.
    pub fn new(tokens: Vec<Token>) -> Self {
        assert!(
            matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::EndOfFile)),
            "token stream must end with EOF"
        );
        Self { tokens, current: 0, pseudo: 0 }
    }

    pub fn parse_program(&mut self) -> RillResult<Program> {
        let package = self.package_clause()?;
        let import = self.import_clause()?;

        let mut types = Vec::new();
        while self.check(&TokenKind::KeywordType) {
            types.push(self.type_declaration()?);
        }

        let mut declarations = Vec::new();
        while self.check(&TokenKind::KeywordVar) {
            declarations.push(self.declaration()?);
        }

        let mut functions = Vec::new();
        while self.check(&TokenKind::KeywordFunc) {
            functions.push(self.function()?);
        }
        if functions.is_empty() {
            return Err(self.unexpected("at least one function"));
        }

        self.expect_named(&TokenKind::EndOfFile, "end of file")?;

        Ok(Program { package, import, types, declarations, functions })
    }

    // -----------------------------------------------------------------------
    // Token access
    // -----------------------------------------------------------------------

    fn current(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn pseudo_token(&self) -> &Token {
        &self.tokens[self.pseudo]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    /// Advance the committed cursor. The pseudo cursor follows, so committed
    /// consumption and speculation never interleave.
    fn advance(&mut self) {
        if self.current + 1 < self.tokens.len() {
            self.current += 1;
        }
        self.pseudo = self.current;
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> RillResult<u32> {
        self.expect_named(kind, &format!("'{}'", kind.name()))
    }

    fn expect_named(&mut self, kind: &TokenKind, expected: &str) -> RillResult<u32> {
        if self.check(kind) {
            let line = self.current().line;
            self.advance();
            Ok(line)
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> RillResult<(String, u32)> {
        match &self.current().kind {
            TokenKind::Ident(name) => {
                let result = (name.clone(), self.current().line);
                self.advance();
                Ok(result)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn unexpected(&self, expected: &str) -> RillError {
        let token = self.current();
        RillError::syntax_error(format!(
            "found '{}', expected {} on line {}",
            token.literal(),
            expected,
            token.line
        ))
    }

    // -----------------------------------------------------------------------
    // Pseudo-matching
    // -----------------------------------------------------------------------

    /// Speculatively consume one token. On mismatch, optionally reset the
    /// pseudo cursor to the committed position.
    fn pseudo_eat(&mut self, kind: &TokenKind, rollback: bool) -> bool {
        if &self.pseudo_token().kind == kind {
            if self.pseudo + 1 < self.tokens.len() {
                self.pseudo += 1;
            }
            true
        } else {
            if rollback {
                self.pseudo = self.current;
            }
            false
        }
    }

    fn pseudo_eat_ident(&mut self, rollback: bool) -> Option<(String, u32)> {
        match &self.pseudo_token().kind {
            TokenKind::Ident(name) => {
                let result = (name.clone(), self.pseudo_token().line);
                if self.pseudo + 1 < self.tokens.len() {
                    self.pseudo += 1;
                }
                Some(result)
            }
            _ => {
                if rollback {
                    self.pseudo = self.current;
                }
                None
            }
        }
    }

    /// A pseudo-match that has passed the point of no return: mismatch is a
    /// hard syntax error.
    fn pseudo_require(&mut self, kind: &TokenKind) -> RillResult<()> {
        if self.pseudo_eat(kind, false) {
            Ok(())
        } else {
            Err(self.pseudo_unexpected(&format!("'{}'", kind.name())))
        }
    }

    fn pseudo_require_ident(&mut self) -> RillResult<(String, u32)> {
        self.pseudo_eat_ident(false)
            .ok_or_else(|| self.pseudo_unexpected("an identifier"))
    }

    fn pseudo_unexpected(&self, expected: &str) -> RillError {
        let token = self.pseudo_token();
        RillError::syntax_error(format!(
            "found '{}', expected {} on line {}",
            token.literal(),
            expected,
            token.line
        ))
    }

    /// Commit the speculative run.
    fn roll_forward(&mut self) {
        self.current = self.pseudo;
    }

    // -----------------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------------

    fn package_clause(&mut self) -> RillResult<Package> {
        let line = self.expect(&TokenKind::KeywordPackage)?;
        let (name, _) = self.expect_ident("a package name")?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Package { name, line })
    }

    /// Only `import "fmt";` is accepted.
    fn import_clause(&mut self) -> RillResult<Import> {
        let line = self.expect(&TokenKind::KeywordImport)?;
        self.expect(&TokenKind::Quote)?;
        self.expect(&TokenKind::KeywordFmt)?;
        self.expect(&TokenKind::Quote)?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Import { package: "fmt".to_string(), line })
    }

    fn type_declaration(&mut self) -> RillResult<TypeDecl> {
        let line = self.expect(&TokenKind::KeywordType)?;
        let (name, _) = self.expect_ident("a struct name")?;
        self.expect(&TokenKind::KeywordStruct)?;
        self.expect(&TokenKind::LeftBrace)?;

        let mut fields = Vec::new();
        while matches!(self.current().kind, TokenKind::Ident(_)) {
            fields.push(self.field()?);
            self.expect(&TokenKind::Semicolon)?;
        }
        if fields.is_empty() {
            return Err(self.unexpected("at least one field declaration"));
        }

        self.expect(&TokenKind::RightBrace)?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(TypeDecl { name, fields, line })
    }

    fn field(&mut self) -> RillResult<Field> {
        let (name, line) = self.expect_ident("a field name")?;
        let ty = self.type_spec()?;
        Ok(Field { name, ty, line })
    }

    fn type_spec(&mut self) -> RillResult<TypeSpec> {
        if self.eat(&TokenKind::KeywordInt) {
            return Ok(TypeSpec::Int);
        }
        if self.eat(&TokenKind::KeywordBool) {
            return Ok(TypeSpec::Bool);
        }
        if self.eat(&TokenKind::Star) {
            let (name, _) = self.expect_ident("a struct name after '*'")?;
            return Ok(TypeSpec::Pointer(name));
        }
        Err(self.unexpected("a type"))
    }

    fn at_type_spec(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::KeywordInt | TokenKind::KeywordBool | TokenKind::Star
        )
    }

    fn declaration(&mut self) -> RillResult<Declaration> {
        let line = self.expect(&TokenKind::KeywordVar)?;
        let (first, _) = self.expect_ident("a variable name")?;
        let mut names = vec![first];
        while self.eat(&TokenKind::Comma) {
            let (name, _) = self.expect_ident("a variable name")?;
            names.push(name);
        }
        let ty = self.type_spec()?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Declaration { names, ty, line })
    }

    // -----------------------------------------------------------------------
    // Functions
    // -----------------------------------------------------------------------

    fn function(&mut self) -> RillResult<Function> {
        let line = self.expect(&TokenKind::KeywordFunc)?;
        let (name, _) = self.expect_ident("a function name")?;
        let params = self.parameters()?;
        let return_type = if self.at_type_spec() { Some(self.type_spec()?) } else { None };

        self.expect(&TokenKind::LeftBrace)?;
        let mut declarations = Vec::new();
        while self.check(&TokenKind::KeywordVar) {
            declarations.push(self.declaration()?);
        }
        let statements = self.statements()?;
        self.expect(&TokenKind::RightBrace)?;

        Ok(Function { name, params, return_type, declarations, statements, line })
    }

    fn parameters(&mut self) -> RillResult<Vec<Field>> {
        self.expect(&TokenKind::LeftParen)?;
        let mut params = Vec::new();
        if matches!(self.current().kind, TokenKind::Ident(_)) {
            params.push(self.field()?);
            while self.eat(&TokenKind::Comma) {
                params.push(self.field()?);
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(params)
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn statements(&mut self) -> RillResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            let stmt = if self.check(&TokenKind::LeftBrace) {
                Stmt::Block(self.block()?)
            } else if self.check(&TokenKind::KeywordIf) {
                self.conditional()?
            } else if self.check(&TokenKind::KeywordFor) {
                self.loop_stmt()?
            } else if self.check(&TokenKind::KeywordReturn) {
                self.return_stmt()?
            } else if self.check(&TokenKind::KeywordFmt) {
                self.read_or_print()?
            } else if matches!(self.current().kind, TokenKind::Ident(_)) {
                self.assignment_or_invocation()?
            } else {
                break;
            };
            stmts.push(stmt);
        }
        Ok(stmts)
    }

    fn block(&mut self) -> RillResult<Vec<Stmt>> {
        self.expect(&TokenKind::LeftBrace)?;
        let stmts = self.statements()?;
        self.expect(&TokenKind::RightBrace)?;
        Ok(stmts)
    }

    /// `fmt.Scan(&id);`, `fmt.Print(id);` and `fmt.Println(id);` share the
    /// prefix `fmt . IDENT`; pseudo-match past the method name, then commit.
    fn read_or_print(&mut self) -> RillResult<Stmt> {
        let line = self.current().line;
        self.pseudo_eat(&TokenKind::KeywordFmt, true);
        if !self.pseudo_eat(&TokenKind::Dot, true) {
            return Err(self.pseudo_unexpected("'.' after 'fmt'"));
        }

        if self.pseudo_eat(&TokenKind::KeywordScan, false) {
            self.pseudo_require(&TokenKind::LeftParen)?;
            self.pseudo_require(&TokenKind::Ampersand)?;
            let (name, _) = self.pseudo_require_ident()?;
            self.pseudo_require(&TokenKind::RightParen)?;
            self.pseudo_require(&TokenKind::Semicolon)?;
            self.roll_forward();
            return Ok(Stmt::Read(ReadStmt { name, line }));
        }

        let method = if self.pseudo_eat(&TokenKind::KeywordPrint, false) {
            PrintMethod::Print
        } else if self.pseudo_eat(&TokenKind::KeywordPrintln, true) {
            PrintMethod::Println
        } else {
            return Err(self.pseudo_unexpected("'Scan', 'Print' or 'Println'"));
        };
        self.pseudo_require(&TokenKind::LeftParen)?;
        let (name, _) = self.pseudo_require_ident()?;
        self.pseudo_require(&TokenKind::RightParen)?;
        self.pseudo_require(&TokenKind::Semicolon)?;
        self.roll_forward();
        Ok(Stmt::Print(PrintStmt { method, name, line }))
    }

    /// `IDENT …` is an assignment if a dotted chain followed by `=` parses
    /// speculatively; otherwise rewind and parse an invocation.
    fn assignment_or_invocation(&mut self) -> RillResult<Stmt> {
        let line = self.current().line;
        if let Some(lvalue) = self.pseudo_lvalue() {
            if self.pseudo_eat(&TokenKind::Assign, true) {
                self.roll_forward();
                let value = self.expression()?;
                self.expect(&TokenKind::Semicolon)?;
                return Ok(Stmt::Assign(Assignment { lvalue, value, line }));
            }
        }
        self.invocation().map(Stmt::Invocation)
    }

    fn pseudo_lvalue(&mut self) -> Option<LValue> {
        let line = self.pseudo_token().line;
        let (first, _) = self.pseudo_eat_ident(true)?;
        let mut path = vec![first];
        loop {
            if !self.pseudo_eat(&TokenKind::Dot, false) {
                break;
            }
            match self.pseudo_eat_ident(true) {
                Some((name, _)) => path.push(name),
                None => return None,
            }
        }
        Some(LValue { path, line })
    }

    fn invocation(&mut self) -> RillResult<Invocation> {
        let (name, line) = self.expect_ident("a function name")?;
        let arguments = self.arguments()?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Invocation { name, arguments, line })
    }

    fn arguments(&mut self) -> RillResult<Vec<Expression>> {
        self.expect(&TokenKind::LeftParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            args.push(self.expression()?);
            while self.eat(&TokenKind::Comma) {
                args.push(self.expression()?);
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(args)
    }

    fn conditional(&mut self) -> RillResult<Stmt> {
        let line = self.expect(&TokenKind::KeywordIf)?;
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RightParen)?;
        let then_block = self.block()?;
        let else_block = if self.eat(&TokenKind::KeywordElse) {
            Some(self.block()?)
        } else {
            None
        };
        Ok(Stmt::If(Conditional { condition, then_block, else_block, line }))
    }

    fn loop_stmt(&mut self) -> RillResult<Stmt> {
        let line = self.expect(&TokenKind::KeywordFor)?;
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RightParen)?;
        let body = self.block()?;
        Ok(Stmt::Loop(Loop { condition, body, line }))
    }

    fn return_stmt(&mut self) -> RillResult<Stmt> {
        let line = self.expect(&TokenKind::KeywordReturn)?;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::Return(ReturnStmt { value, line }))
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn expression(&mut self) -> RillResult<Expression> {
        let line = self.current().line;
        let left = self.bool_term()?;
        let mut rights = Vec::new();
        while self.eat(&TokenKind::Or) {
            rights.push(self.bool_term()?);
        }
        Ok(Expression { left, rights, line })
    }

    fn bool_term(&mut self) -> RillResult<BoolTerm> {
        let line = self.current().line;
        let left = self.equal_term()?;
        let mut rights = Vec::new();
        while self.eat(&TokenKind::And) {
            rights.push(self.equal_term()?);
        }
        Ok(BoolTerm { left, rights, line })
    }

    fn equal_term(&mut self) -> RillResult<EqualTerm> {
        let line = self.current().line;
        let left = self.relation_term()?;
        let mut rights = Vec::new();
        loop {
            let op = if self.eat(&TokenKind::Equal) {
                EqualOp::Equal
            } else if self.eat(&TokenKind::NotEqual) {
                EqualOp::NotEqual
            } else {
                break;
            };
            rights.push((op, self.relation_term()?));
        }
        Ok(EqualTerm { left, rights, line })
    }

    fn relation_term(&mut self) -> RillResult<RelationTerm> {
        let line = self.current().line;
        let left = self.simple_term()?;
        let mut rights = Vec::new();
        loop {
            let op = if self.eat(&TokenKind::Less) {
                RelationOp::Less
            } else if self.eat(&TokenKind::LessEqual) {
                RelationOp::LessEqual
            } else if self.eat(&TokenKind::Greater) {
                RelationOp::Greater
            } else if self.eat(&TokenKind::GreaterEqual) {
                RelationOp::GreaterEqual
            } else {
                break;
            };
            rights.push((op, self.simple_term()?));
        }
        Ok(RelationTerm { left, rights, line })
    }

    fn simple_term(&mut self) -> RillResult<SimpleTerm> {
        let line = self.current().line;
        let left = self.term()?;
        let mut rights = Vec::new();
        loop {
            let op = if self.eat(&TokenKind::Plus) {
                AddOp::Add
            } else if self.eat(&TokenKind::Minus) {
                AddOp::Sub
            } else {
                break;
            };
            rights.push((op, self.term()?));
        }
        Ok(SimpleTerm { left, rights, line })
    }

    fn term(&mut self) -> RillResult<Term> {
        let line = self.current().line;
        let left = self.unary_term()?;
        let mut rights = Vec::new();
        loop {
            let op = if self.eat(&TokenKind::Star) {
                MulOp::Mul
            } else if self.eat(&TokenKind::Slash) {
                MulOp::Div
            } else {
                break;
            };
            rights.push((op, self.unary_term()?));
        }
        Ok(Term { left, rights, line })
    }

    fn unary_term(&mut self) -> RillResult<UnaryTerm> {
        let line = self.current().line;
        let op = if self.eat(&TokenKind::Not) {
            Some(UnaryOp::Not)
        } else if self.eat(&TokenKind::Minus) {
            Some(UnaryOp::Neg)
        } else {
            None
        };
        let operand = self.selector_term()?;
        Ok(UnaryTerm { op, operand, line })
    }

    fn selector_term(&mut self) -> RillResult<SelectorTerm> {
        let line = self.current().line;
        let factor = self.factor()?;
        let mut fields = Vec::new();
        while self.eat(&TokenKind::Dot) {
            let (name, _) = self.expect_ident("a field name after '.'")?;
            fields.push(name);
        }
        Ok(SelectorTerm { factor, fields, line })
    }

    fn factor(&mut self) -> RillResult<Factor> {
        let line = self.current().line;
        let kind = match self.current().kind.clone() {
            TokenKind::Number(value) => {
                self.advance();
                FactorKind::Int(value)
            }
            TokenKind::KeywordTrue => {
                self.advance();
                FactorKind::Bool(true)
            }
            TokenKind::KeywordFalse => {
                self.advance();
                FactorKind::Bool(false)
            }
            TokenKind::KeywordNil => {
                self.advance();
                FactorKind::Nil
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::LeftParen) {
                    let arguments = self.arguments()?;
                    FactorKind::Call { name, arguments }
                } else {
                    FactorKind::Ident(name)
                }
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(&TokenKind::RightParen)?;
                FactorKind::Paren(Box::new(inner))
            }
            _ => return Err(self.unexpected("an expression")),
        };
        Ok(Factor { kind, line })
    }

}

/// Parse a token sequence into a program AST.
pub fn parse(tokens: Vec<Token>) -> RillResult<Program> {
    Parser::new(tokens).parse_program()
}

/// Parse a source string directly; convenience for tests and the driver.
pub fn parse_source(source: &str) -> RillResult<Program> {
    parse(rill_lexer::tokenize(source)?)
}

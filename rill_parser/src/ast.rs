//! Abstract Syntax Tree definitions for the Rill language
//!
//! Expressions keep the precedence-layered shape of the grammar
//! (`Expression` → `BoolTerm` → … → `Factor`), each layer holding a left
//! operand plus the operator/operand pairs that follow it. Every node
//! remembers its source line for diagnostics.
//!
//! The `Display` impls reconstruct compilable source text; `--ast` mode
//! prints this rendering, and re-parsing a rendering yields the same
//! rendering again.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A complete Rill program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub package: Package,
    pub import: Import,
    pub types: Vec<TypeDecl>,
    pub declarations: Vec<Declaration>,
    pub functions: Vec<Function>,
}

/// The mandatory `package <name>;` clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub line: u32,
}

/// The mandatory `import "fmt";` clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub package: String,
    pub line: u32,
}

/// A `type <name> struct { … };` record declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub fields: Vec<Field>,
    pub line: u32,
}

/// A single `name type;` field, also used for function parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: TypeSpec,
    pub line: u32,
}

/// A source-level type: `int`, `bool`, or `*StructName`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeSpec {
    Int,
    Bool,
    Pointer(String),
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Int => write!(f, "int"),
            TypeSpec::Bool => write!(f, "bool"),
            TypeSpec::Pointer(name) => write!(f, "*{}", name),
        }
    }
}

/// A `var a, b type;` declaration (top-level or function-local)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub names: Vec<String>,
    pub ty: TypeSpec,
    pub line: u32,
}

/// A top-level function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Field>,
    pub return_type: Option<TypeSpec>,
    pub declarations: Vec<Declaration>,
    pub statements: Vec<Stmt>,
    pub line: u32,
}

/// Statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Block(Vec<Stmt>),
    Assign(Assignment),
    Read(ReadStmt),
    Print(PrintStmt),
    If(Conditional),
    Loop(Loop),
    Return(ReturnStmt),
    Invocation(Invocation),
}

/// `lvalue = expression;` where the left side is a dotted identifier chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub lvalue: LValue,
    pub value: Expression,
    pub line: u32,
}

/// A dotted identifier chain `a.b.c…` on the left of an assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LValue {
    pub path: Vec<String>,
    pub line: u32,
}

/// `fmt.Scan(&id);`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadStmt {
    pub name: String,
    pub line: u32,
}

/// `fmt.Print(id);` or `fmt.Println(id);`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintStmt {
    pub method: PrintMethod,
    pub name: String,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrintMethod {
    Print,
    Println,
}

impl fmt::Display for PrintMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrintMethod::Print => write!(f, "Print"),
            PrintMethod::Println => write!(f, "Println"),
        }
    }
}

/// `if (cond) { … }` with an optional else block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditional {
    pub condition: Expression,
    pub then_block: Vec<Stmt>,
    pub else_block: Option<Vec<Stmt>>,
    pub line: u32,
}

/// `for (cond) { … }` — a while loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loop {
    pub condition: Expression,
    pub body: Vec<Stmt>,
    pub line: u32,
}

/// `return;` or `return expr;`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStmt {
    pub value: Option<Expression>,
    pub line: u32,
}

/// A function call in statement position: `f(args);`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub name: String,
    pub arguments: Vec<Expression>,
    pub line: u32,
}

/// `||` chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub left: BoolTerm,
    pub rights: Vec<BoolTerm>,
    pub line: u32,
}

/// `&&` chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoolTerm {
    pub left: EqualTerm,
    pub rights: Vec<EqualTerm>,
    pub line: u32,
}

/// `==` / `!=` chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualTerm {
    pub left: RelationTerm,
    pub rights: Vec<(EqualOp, RelationTerm)>,
    pub line: u32,
}

/// `<` / `<=` / `>` / `>=` chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationTerm {
    pub left: SimpleTerm,
    pub rights: Vec<(RelationOp, SimpleTerm)>,
    pub line: u32,
}

/// `+` / `-` chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleTerm {
    pub left: Term,
    pub rights: Vec<(AddOp, Term)>,
    pub line: u32,
}

/// `*` / `/` chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub left: UnaryTerm,
    pub rights: Vec<(MulOp, UnaryTerm)>,
    pub line: u32,
}

/// Optional prefix `!` or `-`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryTerm {
    pub op: Option<UnaryOp>,
    pub operand: SelectorTerm,
    pub line: u32,
}

/// A factor followed by `.field` selections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorTerm {
    pub factor: Factor,
    pub fields: Vec<String>,
    pub line: u32,
}

/// The atoms of the expression grammar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub kind: FactorKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FactorKind {
    Int(i64),
    Bool(bool),
    Nil,
    Ident(String),
    Call { name: String, arguments: Vec<Expression> },
    Paren(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EqualOp {
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationOp {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MulOp {
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl fmt::Display for EqualOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EqualOp::Equal => write!(f, "=="),
            EqualOp::NotEqual => write!(f, "!="),
        }
    }
}

impl fmt::Display for RelationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationOp::Less => write!(f, "<"),
            RelationOp::LessEqual => write!(f, "<="),
            RelationOp::Greater => write!(f, ">"),
            RelationOp::GreaterEqual => write!(f, ">="),
        }
    }
}

impl fmt::Display for AddOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddOp::Add => write!(f, "+"),
            AddOp::Sub => write!(f, "-"),
        }
    }
}

impl fmt::Display for MulOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MulOp::Mul => write!(f, "*"),
            MulOp::Div => write!(f, "/"),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Neg => write!(f, "-"),
        }
    }
}

// ---------------------------------------------------------------------------
// Source reconstruction
// ---------------------------------------------------------------------------

fn indentation(f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    for _ in 0..indent {
        write!(f, "\t")?;
    }
    Ok(())
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "package {};", self.package.name)?;
        writeln!(f, "import \"{}\";", self.import.package)?;
        for decl in &self.types {
            write!(f, "{}", decl)?;
        }
        for decl in &self.declarations {
            writeln!(f, "{}", decl)?;
        }
        for function in &self.functions {
            write!(f, "{}", function)?;
        }
        Ok(())
    }
}

impl fmt::Display for TypeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "type {} struct {{", self.name)?;
        for field in &self.fields {
            writeln!(f, "\t{};", field)?;
        }
        writeln!(f, "}};")
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.ty)
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var {} {};", self.names.join(", "), self.ty)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func {}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")?;
        if let Some(ret) = &self.return_type {
            write!(f, " {}", ret)?;
        }
        writeln!(f, " {{")?;
        for decl in &self.declarations {
            indentation(f, 1)?;
            writeln!(f, "{}", decl)?;
        }
        for stmt in &self.statements {
            stmt.write(f, 1)?;
        }
        writeln!(f, "}}")
    }
}

impl Stmt {
    fn write(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            Stmt::Block(stmts) => {
                indentation(f, indent)?;
                writeln!(f, "{{")?;
                for stmt in stmts {
                    stmt.write(f, indent + 1)?;
                }
                indentation(f, indent)?;
                writeln!(f, "}}")
            }
            Stmt::Assign(assign) => {
                indentation(f, indent)?;
                writeln!(f, "{} = {};", assign.lvalue, assign.value)
            }
            Stmt::Read(read) => {
                indentation(f, indent)?;
                writeln!(f, "fmt.Scan(&{});", read.name)
            }
            Stmt::Print(print) => {
                indentation(f, indent)?;
                writeln!(f, "fmt.{}({});", print.method, print.name)
            }
            Stmt::If(cond) => {
                indentation(f, indent)?;
                writeln!(f, "if ({}) {{", cond.condition)?;
                for stmt in &cond.then_block {
                    stmt.write(f, indent + 1)?;
                }
                indentation(f, indent)?;
                if let Some(else_block) = &cond.else_block {
                    writeln!(f, "}} else {{")?;
                    for stmt in else_block {
                        stmt.write(f, indent + 1)?;
                    }
                    indentation(f, indent)?;
                }
                writeln!(f, "}}")
            }
            Stmt::Loop(lp) => {
                indentation(f, indent)?;
                writeln!(f, "for ({}) {{", lp.condition)?;
                for stmt in &lp.body {
                    stmt.write(f, indent + 1)?;
                }
                indentation(f, indent)?;
                writeln!(f, "}}")
            }
            Stmt::Return(ret) => {
                indentation(f, indent)?;
                match &ret.value {
                    Some(expr) => writeln!(f, "return {};", expr),
                    None => writeln!(f, "return;"),
                }
            }
            Stmt::Invocation(call) => {
                indentation(f, indent)?;
                write!(f, "{}(", call.name)?;
                for (i, arg) in call.arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                writeln!(f, ");")
            }
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, 0)
    }
}

impl fmt::Display for LValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.join("."))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.left)?;
        for right in &self.rights {
            write!(f, " || {}", right)?;
        }
        Ok(())
    }
}

impl fmt::Display for BoolTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.left)?;
        for right in &self.rights {
            write!(f, " && {}", right)?;
        }
        Ok(())
    }
}

impl fmt::Display for EqualTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.left)?;
        for (op, right) in &self.rights {
            write!(f, " {} {}", op, right)?;
        }
        Ok(())
    }
}

impl fmt::Display for RelationTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.left)?;
        for (op, right) in &self.rights {
            write!(f, " {} {}", op, right)?;
        }
        Ok(())
    }
}

impl fmt::Display for SimpleTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.left)?;
        for (op, right) in &self.rights {
            write!(f, " {} {}", op, right)?;
        }
        Ok(())
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.left)?;
        for (op, right) in &self.rights {
            write!(f, " {} {}", op, right)?;
        }
        Ok(())
    }
}

impl fmt::Display for UnaryTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(op) = &self.op {
            write!(f, "{}", op)?;
        }
        write!(f, "{}", self.operand)
    }
}

impl fmt::Display for SelectorTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.factor)?;
        for field in &self.fields {
            write!(f, ".{}", field)?;
        }
        Ok(())
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FactorKind::Int(value) => write!(f, "{}", value),
            FactorKind::Bool(value) => write!(f, "{}", value),
            FactorKind::Nil => write!(f, "nil"),
            FactorKind::Ident(name) => write!(f, "{}", name),
            FactorKind::Call { name, arguments } => {
                write!(f, "{}(", name)?;
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            FactorKind::Paren(inner) => write!(f, "({})", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse_source;

    fn main_statement_rendering(stmt: &str) -> String {
        let source = format!("package main;\nimport \"fmt\";\nvar x, y int;\nvar b bool;\ntype Pair struct {{ x int; }};\nfunc main() {{ {} }}", stmt);
        let program = parse_source(&source).expect("test statement should parse");
        program.functions[0].statements[0].to_string()
    }

    #[test]
    fn expressions_render_with_their_operators() {
        assert_eq!(main_statement_rendering("x = 1 + 2 * 3;"), "x = 1 + 2 * 3;\n");
        assert_eq!(main_statement_rendering("b = x < 3 && true;"), "b = x < 3 && true;\n");
        assert_eq!(main_statement_rendering("b = !b || x == y;"), "b = !b || x == y;\n");
        assert_eq!(main_statement_rendering("x = -(x - 1);"), "x = -(x - 1);\n");
    }

    #[test]
    fn io_statements_render_in_source_form() {
        assert_eq!(main_statement_rendering("fmt.Scan(&x);"), "fmt.Scan(&x);\n");
        assert_eq!(main_statement_rendering("fmt.Print(x);"), "fmt.Print(x);\n");
        assert_eq!(main_statement_rendering("fmt.Println(x);"), "fmt.Println(x);\n");
    }

    #[test]
    fn type_declarations_render_their_fields() {
        let source = "package main;\nimport \"fmt\";\ntype Pair struct { x int; y *Pair; };\nfunc main() { }";
        let program = parse_source(source).unwrap();
        assert_eq!(
            program.types[0].to_string(),
            "type Pair struct {\n\tx int;\n\ty *Pair;\n};\n"
        );
    }

    #[test]
    fn declarations_render_id_lists() {
        let source = "package main;\nimport \"fmt\";\nvar a, b, c int;\nfunc main() { }";
        let program = parse_source(source).unwrap();
        assert_eq!(program.declarations[0].to_string(), "var a, b, c int;");
    }

    #[test]
    fn functions_render_signature_and_body() {
        let source =
            "package main;\nimport \"fmt\";\nfunc add(a int, b int) int { return a + b; }\nfunc main() { }";
        let program = parse_source(source).unwrap();
        assert_eq!(
            program.functions[0].to_string(),
            "func add(a int, b int) int {\n\treturn a + b;\n}\n"
        );
    }
}

//! Two-pass semantic analysis
//!
//! The declaration pass builds the scope tree and allocates virtual registers
//! for scalars; the type-check pass validates every expression and statement
//! against the rules of the language. Both passes run to completion and
//! collect diagnostics; the driver decides whether to continue.

use crate::symtab::{Entry, ScopeId, SymbolTable};
use crate::types::Ty;
use rill_common::{Diagnostics, Generators};
use rill_parser::*;

/// Calls with more arguments than this cannot be lowered (the first eight
/// arguments travel in `x0..x7`; stack-passed arguments are not supported).
pub const MAX_CALL_ARGUMENTS: usize = 8;

/// The result of semantic analysis: the scope tree and everything the
/// analyser had to say about the program.
#[derive(Debug)]
pub struct Analysis {
    pub table: SymbolTable,
    pub diagnostics: Diagnostics,
}

/// Run both analysis passes over a parsed program.
pub fn analyze(program: &Program, gens: &mut Generators) -> Analysis {
    let mut analyzer = Analyzer {
        table: SymbolTable::new(),
        diagnostics: Diagnostics::new(),
        gens,
    };
    analyzer.build_declarations(program);
    analyzer.check_program(program);
    Analysis { table: analyzer.table, diagnostics: analyzer.diagnostics }
}

struct Analyzer<'a> {
    table: SymbolTable,
    diagnostics: Diagnostics,
    gens: &'a mut Generators,
}

impl Analyzer<'_> {
    // -----------------------------------------------------------------------
    // Pass 1: declarations
    // -----------------------------------------------------------------------

    fn build_declarations(&mut self, program: &Program) {
        for decl in &program.types {
            self.build_struct(decl);
        }
        for decl in &program.declarations {
            self.build_global(decl);
        }
        for function in &program.functions {
            self.build_function(function);
        }
    }

    fn build_struct(&mut self, decl: &TypeDecl) {
        let root = self.table.root();
        if self.table.lookup_local(root, &decl.name).is_some() {
            self.diagnostics.error(
                format!("name '{}' has already been declared", decl.name),
                decl.line,
            );
            return;
        }

        // The definition goes in before the fields are resolved, so a struct
        // may contain pointers to itself.
        let field_scope = self.table.push_scope(format!("Struct:{}", decl.name), root);
        let field_order: Vec<String> = decl.fields.iter().map(|f| f.name.clone()).collect();
        self.table.insert_struct_definition(root, &decl.name, field_scope, field_order);

        for field in &decl.fields {
            let ty = self.resolve_type(&field.ty, field.line);
            if self.table.lookup_local(field_scope, &field.name).is_some() {
                self.diagnostics.error(
                    format!("field '{}' has already been declared in struct '{}'", field.name, decl.name),
                    field.line,
                );
                continue;
            }
            let register = self.gens.fresh_register();
            self.table.insert_scalar(field_scope, &field.name, ty, register);
        }
    }

    fn build_global(&mut self, decl: &Declaration) {
        let root = self.table.root();
        let ty = self.resolve_type(&decl.ty, decl.line);
        for name in &decl.names {
            if self.table.lookup_local(root, name).is_some() {
                self.diagnostics.error(
                    format!("name '{}' has already been declared", name),
                    decl.line,
                );
                continue;
            }
            let register = self.gens.fresh_register();
            self.table.insert_scalar(root, name, ty.clone(), register);
        }
    }

    fn build_function(&mut self, function: &Function) {
        let root = self.table.root();
        if self.table.lookup_local(root, &function.name).is_some() {
            self.diagnostics.error(
                format!("name '{}' has already been declared", function.name),
                function.line,
            );
            return;
        }

        let scope = self.table.push_scope(function.name.clone(), root);

        let mut param_types = Vec::new();
        let mut param_registers = Vec::new();
        for param in &function.params {
            let ty = self.resolve_type(&param.ty, param.line);
            param_types.push(ty.clone());
            if self.table.lookup_local(scope, &param.name).is_some() {
                self.diagnostics.error(
                    format!("parameter '{}' has already been declared", param.name),
                    param.line,
                );
                continue;
            }
            let register = self.gens.fresh_register();
            param_registers.push(register);
            self.table.insert_scalar(scope, &param.name, ty, register);
        }

        let return_type = function
            .return_type
            .as_ref()
            .map(|spec| self.resolve_type(spec, function.line));

        self.table.insert_function(
            root,
            &function.name,
            param_types,
            return_type,
            scope,
            param_registers,
        );

        for decl in &function.declarations {
            let ty = self.resolve_type(&decl.ty, decl.line);
            for name in &decl.names {
                if self.table.lookup_local(scope, name).is_some() {
                    self.diagnostics.error(
                        format!("name '{}' has already been declared", name),
                        decl.line,
                    );
                    continue;
                }
                let register = self.gens.fresh_register();
                self.table.insert_scalar(scope, name, ty.clone(), register);
            }
        }
    }

    /// Map a source type to a descriptor, reporting pointers to structs that
    /// were never declared.
    fn resolve_type(&mut self, spec: &TypeSpec, line: u32) -> Ty {
        match spec {
            TypeSpec::Int => Ty::Int,
            TypeSpec::Bool => Ty::Bool,
            TypeSpec::Pointer(name) => match self.table.lookup_global(name) {
                Some(Entry::StructDef { .. }) => Ty::Struct(name.clone()),
                _ => {
                    self.diagnostics
                        .error(format!("struct '{}' has not been declared", name), line);
                    Ty::Unknown(name.clone())
                }
            },
        }
    }

    // -----------------------------------------------------------------------
    // Pass 2: type checking
    // -----------------------------------------------------------------------

    fn check_program(&mut self, program: &Program) {
        for function in &program.functions {
            let (scope, return_type) = match self.table.lookup_global(&function.name) {
                Some(Entry::Function { scope, return_type, .. }) => {
                    (*scope, return_type.clone())
                }
                _ => continue, // duplicate name; already reported
            };
            self.check_stmts(&function.statements, scope, &return_type);
        }
    }

    fn check_stmts(&mut self, stmts: &[Stmt], scope: ScopeId, return_type: &Option<Ty>) {
        for stmt in stmts {
            self.check_stmt(stmt, scope, return_type);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt, scope: ScopeId, return_type: &Option<Ty>) {
        match stmt {
            Stmt::Block(stmts) => self.check_stmts(stmts, scope, return_type),
            Stmt::Assign(assign) => self.check_assignment(assign, scope),
            Stmt::Read(read) => {
                self.check_declared_variable(&read.name, scope, read.line);
            }
            Stmt::Print(print) => {
                self.check_declared_variable(&print.name, scope, print.line);
            }
            Stmt::If(cond) => {
                self.check_condition(&cond.condition, scope, cond.line);
                self.check_stmts(&cond.then_block, scope, return_type);
                if let Some(else_block) = &cond.else_block {
                    self.check_stmts(else_block, scope, return_type);
                }
            }
            Stmt::Loop(lp) => {
                self.check_condition(&lp.condition, scope, lp.line);
                self.check_stmts(&lp.body, scope, return_type);
            }
            Stmt::Return(ret) => self.check_return(ret, scope, return_type),
            Stmt::Invocation(call) => {
                self.check_call(&call.name, &call.arguments, scope, call.line);
            }
        }
    }

    fn check_assignment(&mut self, assign: &Assignment, scope: ScopeId) {
        let lvalue_ty = self.check_lvalue(&assign.lvalue, scope);
        let value_ty = self.check_expression(&assign.value, scope);
        if lvalue_ty.is_unknown() || value_ty.is_unknown() {
            return;
        }
        if !lvalue_ty.matches(&value_ty) {
            self.diagnostics.error(
                format!(
                    "assignment type mismatch: expected {}, found {}",
                    lvalue_ty, value_ty
                ),
                assign.line,
            );
        }
    }

    /// Resolve a dotted l-value chain to the type of its final component.
    fn check_lvalue(&mut self, lvalue: &LValue, scope: ScopeId) -> Ty {
        let first = &lvalue.path[0];
        let mut ty = match self.table.lookup(scope, first) {
            Some((_, entry)) if entry.is_variable() => entry.ty().clone(),
            Some(_) => {
                self.diagnostics.error(
                    format!("'{}' is not a variable", first),
                    lvalue.line,
                );
                return Ty::Unknown(first.clone());
            }
            None => {
                self.diagnostics.error(
                    format!("'{}' has not been declared", first),
                    lvalue.line,
                );
                return Ty::Unknown(first.clone());
            }
        };

        for field in &lvalue.path[1..] {
            ty = self.select_field(&ty, field, lvalue.line);
            if ty.is_unknown() {
                break;
            }
        }
        ty
    }

    fn check_declared_variable(&mut self, name: &str, scope: ScopeId, line: u32) {
        match self.table.lookup(scope, name) {
            Some((_, entry)) if entry.is_variable() => {}
            Some(_) => {
                self.diagnostics.error(format!("'{}' is not a variable", name), line);
            }
            None => {
                self.diagnostics.error(format!("'{}' has not been declared", name), line);
            }
        }
    }

    fn check_condition(&mut self, condition: &Expression, scope: ScopeId, line: u32) {
        let ty = self.check_expression(condition, scope);
        if !ty.is_unknown() && ty != Ty::Bool {
            self.diagnostics.error(
                format!("condition is not a boolean: found {}", ty),
                line,
            );
        }
    }

    fn check_return(&mut self, ret: &ReturnStmt, scope: ScopeId, return_type: &Option<Ty>) {
        match (return_type, &ret.value) {
            (None, None) => {}
            (None, Some(value)) => {
                self.check_expression(value, scope);
                self.diagnostics
                    .error("void function cannot return a value", ret.line);
            }
            (Some(expected), None) => {
                self.diagnostics.error(
                    format!("missing return value: expected {}", expected),
                    ret.line,
                );
            }
            (Some(expected), Some(value)) => {
                let ty = self.check_expression(value, scope);
                if !ty.is_unknown() && !expected.matches(&ty) {
                    self.diagnostics.error(
                        format!("return type mismatch: expected {}, found {}", expected, ty),
                        ret.line,
                    );
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn check_expression(&mut self, expr: &Expression, scope: ScopeId) -> Ty {
        let mut ty = self.check_bool_term(&expr.left, scope);
        for right in &expr.rights {
            let right_ty = self.check_bool_term(right, scope);
            ty = self.require_booleans("||", &ty, &right_ty, expr.line);
        }
        ty
    }

    fn check_bool_term(&mut self, term: &BoolTerm, scope: ScopeId) -> Ty {
        let mut ty = self.check_equal_term(&term.left, scope);
        for right in &term.rights {
            let right_ty = self.check_equal_term(right, scope);
            ty = self.require_booleans("&&", &ty, &right_ty, term.line);
        }
        ty
    }

    fn check_equal_term(&mut self, term: &EqualTerm, scope: ScopeId) -> Ty {
        let mut ty = self.check_relation_term(&term.left, scope);
        for (op, right) in &term.rights {
            let right_ty = self.check_relation_term(right, scope);
            if !ty.is_unknown() && !right_ty.is_unknown() && !ty.matches(&right_ty) {
                self.diagnostics.error(
                    format!("cannot compare {} with {} using '{}'", ty, right_ty, op),
                    term.line,
                );
            }
            ty = Ty::Bool;
        }
        ty
    }

    fn check_relation_term(&mut self, term: &RelationTerm, scope: ScopeId) -> Ty {
        let mut ty = self.check_simple_term(&term.left, scope);
        for (op, right) in &term.rights {
            let right_ty = self.check_simple_term(right, scope);
            self.require_integers(&op.to_string(), &ty, &right_ty, term.line);
            ty = Ty::Bool;
        }
        ty
    }

    fn check_simple_term(&mut self, term: &SimpleTerm, scope: ScopeId) -> Ty {
        let mut ty = self.check_term(&term.left, scope);
        for (op, right) in &term.rights {
            let right_ty = self.check_term(right, scope);
            self.require_integers(&op.to_string(), &ty, &right_ty, term.line);
            ty = Ty::Int;
        }
        ty
    }

    fn check_term(&mut self, term: &Term, scope: ScopeId) -> Ty {
        let mut ty = self.check_unary_term(&term.left, scope);
        for (op, right) in &term.rights {
            let right_ty = self.check_unary_term(right, scope);
            self.require_integers(&op.to_string(), &ty, &right_ty, term.line);
            ty = Ty::Int;
        }
        ty
    }

    fn check_unary_term(&mut self, term: &UnaryTerm, scope: ScopeId) -> Ty {
        let inner = self.check_selector_term(&term.operand, scope);
        match term.op {
            None => inner,
            Some(UnaryOp::Not) => {
                if !inner.is_unknown() && inner != Ty::Bool {
                    self.diagnostics.error(
                        format!("operand of '!' is not a boolean: found {}", inner),
                        term.line,
                    );
                }
                Ty::Bool
            }
            Some(UnaryOp::Neg) => {
                if !inner.is_unknown() && inner != Ty::Int {
                    self.diagnostics.error(
                        format!("operand of unary '-' is not an integer: found {}", inner),
                        term.line,
                    );
                }
                Ty::Int
            }
        }
    }

    fn check_selector_term(&mut self, term: &SelectorTerm, scope: ScopeId) -> Ty {
        let mut ty = self.check_factor(&term.factor, scope);
        for field in &term.fields {
            if ty.is_unknown() {
                break;
            }
            ty = self.select_field(&ty, field, term.line);
        }
        ty
    }

    fn check_factor(&mut self, factor: &Factor, scope: ScopeId) -> Ty {
        match &factor.kind {
            FactorKind::Int(_) => Ty::Int,
            FactorKind::Bool(_) => Ty::Bool,
            FactorKind::Nil => Ty::Nil,
            FactorKind::Ident(name) => match self.table.lookup(scope, name) {
                Some((_, entry)) => entry.ty().clone(),
                None => {
                    self.diagnostics.error(
                        format!("'{}' has not been declared", name),
                        factor.line,
                    );
                    Ty::Unknown(name.clone())
                }
            },
            FactorKind::Call { name, arguments } => {
                self.check_call(name, arguments, scope, factor.line)
            }
            FactorKind::Paren(inner) => self.check_expression(inner, scope),
        }
    }

    /// Check a call to a user function or to the `new`/`delete` built-ins.
    /// Returns the call's result type.
    fn check_call(
        &mut self,
        name: &str,
        arguments: &[Expression],
        scope: ScopeId,
        line: u32,
    ) -> Ty {
        match name {
            "new" => return self.check_new(arguments, scope, line),
            "delete" => return self.check_delete(arguments, scope, line),
            _ => {}
        }

        let (params, return_type) = match self.table.lookup(scope, name) {
            Some((_, Entry::Function { params, return_type, .. })) => {
                (params.clone(), return_type.clone())
            }
            Some(_) => {
                self.diagnostics
                    .error(format!("'{}' is not a function", name), line);
                return Ty::Unknown(name.to_string());
            }
            None => {
                self.diagnostics
                    .error(format!("function '{}' has not been declared", name), line);
                return Ty::Unknown(name.to_string());
            }
        };

        if arguments.len() > MAX_CALL_ARGUMENTS {
            self.diagnostics.error(
                format!(
                    "call to '{}' passes {} arguments; at most {} are supported",
                    name,
                    arguments.len(),
                    MAX_CALL_ARGUMENTS
                ),
                line,
            );
        }

        if arguments.len() != params.len() {
            self.diagnostics.error(
                format!(
                    "wrong number of arguments to '{}': expected {}, found {}",
                    name,
                    params.len(),
                    arguments.len()
                ),
                line,
            );
        }

        for (index, (argument, param)) in arguments.iter().zip(params.iter()).enumerate() {
            let ty = self.check_expression(argument, scope);
            if !ty.is_unknown() && !param.matches(&ty) {
                self.diagnostics.error(
                    format!(
                        "argument {} of '{}': expected {}, found {}",
                        index + 1,
                        name,
                        param,
                        ty
                    ),
                    line,
                );
            }
        }
        // Arguments beyond the parameter list still need their own checks.
        for argument in arguments.iter().skip(params.len()) {
            self.check_expression(argument, scope);
        }

        match return_type {
            Some(ty) => ty,
            None => Ty::Unknown(name.to_string()),
        }
    }

    fn check_new(&mut self, arguments: &[Expression], _scope: ScopeId, line: u32) -> Ty {
        let type_name = arguments.first().and_then(expression_as_type_name);
        match type_name {
            Some(name) if arguments.len() == 1 => {
                if self.table.struct_fields(name).is_some() {
                    Ty::Struct(name.to_string())
                } else {
                    self.diagnostics
                        .error(format!("struct '{}' has not been declared", name), line);
                    Ty::Unknown(name.to_string())
                }
            }
            _ => {
                self.diagnostics
                    .error("'new' expects a single struct type name", line);
                Ty::Unknown("new".to_string())
            }
        }
    }

    fn check_delete(&mut self, arguments: &[Expression], scope: ScopeId, line: u32) -> Ty {
        if arguments.len() != 1 {
            self.diagnostics.error("'delete' expects a single record", line);
            return Ty::Nil;
        }
        let ty = self.check_expression(&arguments[0], scope);
        if !ty.is_unknown() && !ty.is_struct() {
            self.diagnostics
                .error(format!("'delete' expects a record, found {}", ty), line);
        }
        Ty::Nil
    }

    // -----------------------------------------------------------------------
    // Shared helpers
    // -----------------------------------------------------------------------

    fn select_field(&mut self, ty: &Ty, field: &str, line: u32) -> Ty {
        let struct_name = match ty {
            Ty::Struct(name) => name.clone(),
            other => {
                self.diagnostics.error(
                    format!("type {} has no field '{}'", other, field),
                    line,
                );
                return Ty::Unknown(field.to_string());
            }
        };
        match self.table.struct_field_ty(&struct_name, field) {
            Some(field_ty) => field_ty,
            None => {
                self.diagnostics.error(
                    format!("field '{}' is not in struct '{}'", field, struct_name),
                    line,
                );
                Ty::Unknown(field.to_string())
            }
        }
    }

    fn require_booleans(&mut self, op: &str, left: &Ty, right: &Ty, line: u32) -> Ty {
        for ty in [left, right] {
            if !ty.is_unknown() && *ty != Ty::Bool {
                self.diagnostics.error(
                    format!("operand of '{}' is not a boolean: found {}", op, ty),
                    line,
                );
            }
        }
        Ty::Bool
    }

    fn require_integers(&mut self, op: &str, left: &Ty, right: &Ty, line: u32) {
        for ty in [left, right] {
            if !ty.is_unknown() && *ty != Ty::Int {
                self.diagnostics.error(
                    format!("operand of '{}' is not an integer: found {}", op, ty),
                    line,
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pure type queries
// ---------------------------------------------------------------------------
//
// Lowering runs after a clean type check and needs expression types without
// producing diagnostics; these free functions compute them directly from the
// table.

/// The type of a full expression.
pub fn expression_type(table: &SymbolTable, scope: ScopeId, expr: &Expression) -> Ty {
    if !expr.rights.is_empty() {
        return Ty::Bool;
    }
    bool_term_type(table, scope, &expr.left)
}

fn bool_term_type(table: &SymbolTable, scope: ScopeId, term: &BoolTerm) -> Ty {
    if !term.rights.is_empty() {
        return Ty::Bool;
    }
    equal_term_type(table, scope, &term.left)
}

fn equal_term_type(table: &SymbolTable, scope: ScopeId, term: &EqualTerm) -> Ty {
    if !term.rights.is_empty() {
        return Ty::Bool;
    }
    relation_term_type(table, scope, &term.left)
}

fn relation_term_type(table: &SymbolTable, scope: ScopeId, term: &RelationTerm) -> Ty {
    if !term.rights.is_empty() {
        return Ty::Bool;
    }
    simple_term_type(table, scope, &term.left)
}

fn simple_term_type(table: &SymbolTable, scope: ScopeId, term: &SimpleTerm) -> Ty {
    if !term.rights.is_empty() {
        return Ty::Int;
    }
    term_type(table, scope, &term.left)
}

fn term_type(table: &SymbolTable, scope: ScopeId, term: &Term) -> Ty {
    if !term.rights.is_empty() {
        return Ty::Int;
    }
    unary_term_type(table, scope, &term.left)
}

fn unary_term_type(table: &SymbolTable, scope: ScopeId, term: &UnaryTerm) -> Ty {
    match term.op {
        Some(UnaryOp::Not) => Ty::Bool,
        Some(UnaryOp::Neg) => Ty::Int,
        None => selector_term_type(table, scope, &term.operand),
    }
}

fn selector_term_type(table: &SymbolTable, scope: ScopeId, term: &SelectorTerm) -> Ty {
    let mut ty = factor_type(table, scope, &term.factor);
    for field in &term.fields {
        let struct_name = match &ty {
            Ty::Struct(name) => name.clone(),
            _ => return Ty::Unknown(field.clone()),
        };
        ty = table
            .struct_field_ty(&struct_name, field)
            .unwrap_or_else(|| Ty::Unknown(field.clone()));
    }
    ty
}

/// The type of a factor (atom).
pub fn factor_type(table: &SymbolTable, scope: ScopeId, factor: &Factor) -> Ty {
    match &factor.kind {
        FactorKind::Int(_) => Ty::Int,
        FactorKind::Bool(_) => Ty::Bool,
        FactorKind::Nil => Ty::Nil,
        FactorKind::Ident(name) => match table.lookup(scope, name) {
            Some((_, entry)) => entry.ty().clone(),
            None => Ty::Unknown(name.clone()),
        },
        FactorKind::Call { name, arguments } => match name.as_str() {
            "new" => arguments
                .first()
                .and_then(expression_as_type_name)
                .map(|type_name| Ty::Struct(type_name.to_string()))
                .unwrap_or_else(|| Ty::Unknown(name.clone())),
            "delete" => Ty::Nil,
            _ => match table.lookup(scope, name) {
                Some((_, Entry::Function { return_type, .. })) => return_type
                    .clone()
                    .unwrap_or_else(|| Ty::Unknown(name.clone())),
                _ => Ty::Unknown(name.clone()),
            },
        },
        FactorKind::Paren(inner) => expression_type(table, scope, inner),
    }
}

/// If the expression is a bare identifier, return its name. Used for the
/// `new(TypeName)` built-in, whose argument is a type, not a value.
pub fn expression_as_type_name(expr: &Expression) -> Option<&str> {
    if !expr.rights.is_empty() {
        return None;
    }
    let bool_term = &expr.left;
    if !bool_term.rights.is_empty() {
        return None;
    }
    let equal_term = &bool_term.left;
    if !equal_term.rights.is_empty() {
        return None;
    }
    let relation_term = &equal_term.left;
    if !relation_term.rights.is_empty() {
        return None;
    }
    let simple_term = &relation_term.left;
    if !simple_term.rights.is_empty() {
        return None;
    }
    let term = &simple_term.left;
    if !term.rights.is_empty() {
        return None;
    }
    let unary = &term.left;
    if unary.op.is_some() || !unary.operand.fields.is_empty() {
        return None;
    }
    match &unary.operand.factor.kind {
        FactorKind::Ident(name) => Some(name),
        _ => None,
    }
}

//! AST → IR lowering
//!
//! Walks the validated AST and appends instructions to an ordered fragment
//! list. The current fragment is always the last one; starting a labelled
//! branch target opens a new current fragment, so the list tiles the final
//! assembly in emission order. Any inconsistency found here is an internal
//! compiler error; user errors were reported by the analyser.

use crate::ir::{Cond, FuncFrag, Instr, Operand};
use rill_analysis::{expression_as_type_name, factor_type, Entry, ScopeId, SymbolTable, Ty};
use rill_common::{Generators, RillError, RillResult, VReg};
use rill_parser::*;

/// Label of the synthetic first fragment holding one pseudo-instruction per
/// top-level variable.
pub const GLOBALS_FRAGMENT_LABEL: &str = "Global Variables";

/// Lower a validated program to its fragment list.
pub fn lower(
    program: &Program,
    table: &SymbolTable,
    gens: &mut Generators,
) -> RillResult<Vec<FuncFrag>> {
    let mut lowerer = Lowerer { table, gens, frags: Vec::new() };
    lowerer.lower_program(program)?;
    Ok(lowerer.frags)
}

struct Lowerer<'a> {
    table: &'a SymbolTable,
    gens: &'a mut Generators,
    frags: Vec<FuncFrag>,
}

impl Lowerer<'_> {
    fn lower_program(&mut self, program: &Program) -> RillResult<()> {
        let mut globals = FuncFrag::new(GLOBALS_FRAGMENT_LABEL);
        for decl in &program.declarations {
            for name in &decl.names {
                globals.body.push(Instr::GlobalDecl { name: name.clone() });
            }
        }
        self.frags.push(globals);

        for function in &program.functions {
            self.lower_function(function)?;
        }
        Ok(())
    }

    fn lower_function(&mut self, function: &Function) -> RillResult<()> {
        let scope = match self.table.lookup_global(&function.name) {
            Some(Entry::Function { scope, .. }) => *scope,
            _ => {
                return Err(RillError::internal(format!(
                    "function '{}' has no symbol table entry",
                    function.name
                )))
            }
        };

        self.start_frag(function.name.clone());
        self.lower_stmts(&function.statements, scope)
    }

    fn start_frag(&mut self, label: String) {
        self.frags.push(FuncFrag::new(label));
    }

    fn emit(&mut self, instr: Instr) {
        let last = self.frags.len() - 1;
        self.frags[last].body.push(instr);
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn lower_stmts(&mut self, stmts: &[Stmt], scope: ScopeId) -> RillResult<()> {
        for stmt in stmts {
            self.lower_stmt(stmt, scope)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt, scope: ScopeId) -> RillResult<()> {
        match stmt {
            Stmt::Block(stmts) => self.lower_stmts(stmts, scope),
            Stmt::Assign(assign) => self.lower_assignment(assign, scope),
            Stmt::Read(read) => self.lower_read(read, scope),
            Stmt::Print(print) => self.lower_print(print, scope),
            Stmt::If(cond) => self.lower_conditional(cond, scope),
            Stmt::Loop(lp) => self.lower_loop(lp, scope),
            Stmt::Return(ret) => self.lower_return(ret, scope),
            Stmt::Invocation(call) => {
                self.lower_call(&call.name, &call.arguments, scope)?;
                Ok(())
            }
        }
    }

    fn lower_assignment(&mut self, assign: &Assignment, scope: ScopeId) -> RillResult<()> {
        let value = self.lower_expression(&assign.value, scope)?;
        if assign.lvalue.path.len() == 1 {
            let name = &assign.lvalue.path[0];
            if self.table.resolves_to_global(scope, name) {
                self.emit(Instr::StoreGlobal { src: value, name: name.clone() });
            } else {
                let dest = self.variable_register(scope, name)?;
                self.emit(Instr::Mov {
                    dest,
                    src: Operand::Reg(value),
                    cond: Cond::Al,
                    from_call: false,
                });
            }
            Ok(())
        } else {
            self.lower_field_assignment(&assign.lvalue, value, scope)
        }
    }

    /// `a.b.c = value`: load the base, chase intermediate fields, store into
    /// the last one.
    fn lower_field_assignment(
        &mut self,
        lvalue: &LValue,
        value: VReg,
        scope: ScopeId,
    ) -> RillResult<()> {
        let (mut ty, mut base) = self.read_variable(scope, &lvalue.path[0])?;
        let fields = &lvalue.path[1..];
        for (position, field) in fields.iter().enumerate() {
            let struct_name = self.expect_struct(&ty, field)?;
            let index = self.field_index(&struct_name, field)?;
            if position + 1 == fields.len() {
                self.emit(Instr::StoreField {
                    src: value,
                    base,
                    field: field.clone(),
                    struct_name,
                    index,
                });
            } else {
                let dest = self.gens.fresh_register();
                self.emit(Instr::LoadField {
                    dest,
                    base,
                    field: field.clone(),
                    struct_name: struct_name.clone(),
                    index,
                });
                ty = self.field_ty(&struct_name, field)?;
                base = dest;
            }
        }
        Ok(())
    }

    fn lower_read(&mut self, read: &ReadStmt, scope: ScopeId) -> RillResult<()> {
        if self.table.resolves_to_global(scope, &read.name) {
            let dest = self.gens.fresh_register();
            self.emit(Instr::Read { dest });
            self.emit(Instr::StoreGlobal { src: dest, name: read.name.clone() });
        } else {
            let dest = self.variable_register(scope, &read.name)?;
            self.emit(Instr::Read { dest });
        }
        Ok(())
    }

    fn lower_print(&mut self, print: &PrintStmt, scope: ScopeId) -> RillResult<()> {
        let (_, src) = self.read_variable(scope, &print.name)?;
        match print.method {
            PrintMethod::Print => self.emit(Instr::Print { src }),
            PrintMethod::Println => self.emit(Instr::Println { src }),
        }
        Ok(())
    }

    fn lower_conditional(&mut self, cond: &Conditional, scope: ScopeId) -> RillResult<()> {
        let else_label = self.gens.fresh_label("else");
        let done_label = self.gens.fresh_label("done");

        let condition = self.lower_expression(&cond.condition, scope)?;
        self.emit(Instr::Cmp { lhs: condition, rhs: Operand::Imm(0) });
        let on_false = if cond.else_block.is_some() { &else_label } else { &done_label };
        self.emit(Instr::Branch { cond: Cond::Eq, label: on_false.clone() });

        self.lower_stmts(&cond.then_block, scope)?;
        self.emit(Instr::Branch { cond: Cond::Al, label: done_label.clone() });

        if let Some(else_block) = &cond.else_block {
            self.start_frag(else_label);
            // falls through into the done fragment
            self.lower_stmts(else_block, scope)?;
        }
        self.start_frag(done_label);
        Ok(())
    }

    /// `for` lowers as a while loop with the condition fragment after the
    /// body and a back-edge branch into the body.
    fn lower_loop(&mut self, lp: &Loop, scope: ScopeId) -> RillResult<()> {
        let cond_label = self.gens.fresh_label("cond");
        let body_label = self.gens.fresh_label("body");

        self.emit(Instr::Branch { cond: Cond::Al, label: cond_label.clone() });

        self.start_frag(body_label.clone());
        self.lower_stmts(&lp.body, scope)?;

        self.start_frag(cond_label);
        let condition = self.lower_expression(&lp.condition, scope)?;
        self.emit(Instr::Cmp { lhs: condition, rhs: Operand::Imm(1) });
        self.emit(Instr::Branch { cond: Cond::Eq, label: body_label });
        Ok(())
    }

    fn lower_return(&mut self, ret: &ReturnStmt, scope: ScopeId) -> RillResult<()> {
        let src = match &ret.value {
            Some(expr) => Some(self.lower_expression(expr, scope)?),
            None => None,
        };
        self.emit(Instr::Ret { src });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn lower_expression(&mut self, expr: &Expression, scope: ScopeId) -> RillResult<VReg> {
        let mut reg = self.lower_bool_term(&expr.left, scope)?;
        for right in &expr.rights {
            // Both sides are evaluated; `||` does not short-circuit.
            let rhs = self.lower_bool_term(right, scope)?;
            let dest = self.gens.fresh_register();
            self.emit(Instr::Or { dest, lhs: reg, rhs: Operand::Reg(rhs) });
            reg = dest;
        }
        Ok(reg)
    }

    fn lower_bool_term(&mut self, term: &BoolTerm, scope: ScopeId) -> RillResult<VReg> {
        let mut reg = self.lower_equal_term(&term.left, scope)?;
        for right in &term.rights {
            let rhs = self.lower_equal_term(right, scope)?;
            let dest = self.gens.fresh_register();
            self.emit(Instr::And { dest, lhs: reg, rhs: Operand::Reg(rhs) });
            reg = dest;
        }
        Ok(reg)
    }

    fn lower_equal_term(&mut self, term: &EqualTerm, scope: ScopeId) -> RillResult<VReg> {
        let mut reg = self.lower_relation_term(&term.left, scope)?;
        for (op, right) in &term.rights {
            let rhs = self.lower_relation_term(right, scope)?;
            let cond = match op {
                EqualOp::Equal => Cond::Eq,
                EqualOp::NotEqual => Cond::Ne,
            };
            reg = self.lower_comparison(reg, rhs, cond);
        }
        Ok(reg)
    }

    fn lower_relation_term(&mut self, term: &RelationTerm, scope: ScopeId) -> RillResult<VReg> {
        let mut reg = self.lower_simple_term(&term.left, scope)?;
        for (op, right) in &term.rights {
            let rhs = self.lower_simple_term(right, scope)?;
            let cond = match op {
                RelationOp::Less => Cond::Lt,
                RelationOp::LessEqual => Cond::Le,
                RelationOp::Greater => Cond::Gt,
                RelationOp::GreaterEqual => Cond::Ge,
            };
            reg = self.lower_comparison(reg, rhs, cond);
        }
        Ok(reg)
    }

    /// `mov dest,#0; cmp l,r; mov<cc> dest,#1`
    fn lower_comparison(&mut self, lhs: VReg, rhs: VReg, cond: Cond) -> VReg {
        let dest = self.gens.fresh_register();
        self.emit(Instr::Mov { dest, src: Operand::Imm(0), cond: Cond::Al, from_call: false });
        self.emit(Instr::Cmp { lhs, rhs: Operand::Reg(rhs) });
        self.emit(Instr::Mov { dest, src: Operand::Imm(1), cond, from_call: false });
        dest
    }

    fn lower_simple_term(&mut self, term: &SimpleTerm, scope: ScopeId) -> RillResult<VReg> {
        let mut reg = self.lower_term(&term.left, scope)?;
        for (op, right) in &term.rights {
            let rhs = match term_as_literal(right) {
                Some(value) => Operand::Imm(value),
                None => Operand::Reg(self.lower_term(right, scope)?),
            };
            let dest = self.gens.fresh_register();
            match op {
                AddOp::Add => self.emit(Instr::Add { dest, lhs: reg, rhs }),
                AddOp::Sub => self.emit(Instr::Sub { dest, lhs: reg, rhs }),
            }
            reg = dest;
        }
        Ok(reg)
    }

    fn lower_term(&mut self, term: &Term, scope: ScopeId) -> RillResult<VReg> {
        let mut reg = self.lower_unary_term(&term.left, scope)?;
        for (op, right) in &term.rights {
            let rhs = match unary_term_as_literal(right) {
                Some(value) => Operand::Imm(value),
                None => Operand::Reg(self.lower_unary_term(right, scope)?),
            };
            let dest = self.gens.fresh_register();
            match op {
                MulOp::Mul => self.emit(Instr::Mul { dest, lhs: reg, rhs }),
                MulOp::Div => self.emit(Instr::Div { dest, lhs: reg, rhs }),
            }
            reg = dest;
        }
        Ok(reg)
    }

    fn lower_unary_term(&mut self, term: &UnaryTerm, scope: ScopeId) -> RillResult<VReg> {
        let operand = self.lower_selector_term(&term.operand, scope)?;
        match term.op {
            None => Ok(operand),
            Some(UnaryOp::Not) => {
                let dest = self.gens.fresh_register();
                self.emit(Instr::Not { dest, operand: Operand::Reg(operand) });
                Ok(dest)
            }
            Some(UnaryOp::Neg) => {
                // 0 - x
                let zero = self.gens.fresh_register();
                self.emit(Instr::Mov {
                    dest: zero,
                    src: Operand::Imm(0),
                    cond: Cond::Al,
                    from_call: false,
                });
                let dest = self.gens.fresh_register();
                self.emit(Instr::Sub { dest, lhs: zero, rhs: Operand::Reg(operand) });
                Ok(dest)
            }
        }
    }

    fn lower_selector_term(&mut self, term: &SelectorTerm, scope: ScopeId) -> RillResult<VReg> {
        let mut reg = self.lower_factor(&term.factor, scope)?;
        let mut ty = factor_type(self.table, scope, &term.factor);
        for field in &term.fields {
            let struct_name = self.expect_struct(&ty, field)?;
            let index = self.field_index(&struct_name, field)?;
            let dest = self.gens.fresh_register();
            self.emit(Instr::LoadField {
                dest,
                base: reg,
                field: field.clone(),
                struct_name: struct_name.clone(),
                index,
            });
            ty = self.field_ty(&struct_name, field)?;
            reg = dest;
        }
        Ok(reg)
    }

    fn lower_factor(&mut self, factor: &Factor, scope: ScopeId) -> RillResult<VReg> {
        match &factor.kind {
            FactorKind::Int(value) => Ok(self.materialize(Operand::Imm(*value))),
            FactorKind::Bool(value) => Ok(self.materialize(Operand::Imm(i64::from(*value)))),
            FactorKind::Nil => Ok(self.materialize(Operand::Imm(0))),
            FactorKind::Ident(name) => {
                let (_, reg) = self.read_variable(scope, name)?;
                Ok(reg)
            }
            FactorKind::Call { name, arguments } => {
                self.lower_call(name, arguments, scope)?.ok_or_else(|| {
                    RillError::internal(format!(
                        "call to void function '{}' used as a value",
                        name
                    ))
                })
            }
            FactorKind::Paren(inner) => self.lower_expression(inner, scope),
        }
    }

    fn materialize(&mut self, value: Operand) -> VReg {
        let dest = self.gens.fresh_register();
        self.emit(Instr::Mov { dest, src: value, cond: Cond::Al, from_call: false });
        dest
    }

    /// Lower a call to a user function or the `new`/`delete` built-ins.
    /// Returns the result register, or `None` for results that do not exist
    /// (void calls and `delete`).
    fn lower_call(
        &mut self,
        name: &str,
        arguments: &[Expression],
        scope: ScopeId,
    ) -> RillResult<Option<VReg>> {
        if name == "new" {
            return self.lower_new(arguments).map(Some);
        }
        if name == "delete" {
            let src = self.lower_single_argument(arguments, "delete", scope)?;
            self.emit(Instr::Delete { src });
            return Ok(None);
        }

        let has_result = match self.table.lookup(scope, name) {
            Some((_, Entry::Function { return_type, .. })) => return_type.is_some(),
            _ => {
                return Err(RillError::internal(format!(
                    "call to unknown function '{}'",
                    name
                )))
            }
        };

        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            args.push(self.lower_expression(argument, scope)?);
        }

        self.emit(Instr::Push { args: args.clone(), callee: name.to_string() });
        self.emit(Instr::Call { callee: name.to_string() });
        let result = if has_result {
            let dest = self.gens.fresh_register();
            self.emit(Instr::Mov { dest, src: Operand::Reg(0), cond: Cond::Al, from_call: true });
            Some(dest)
        } else {
            None
        };
        self.emit(Instr::Pop { args, callee: name.to_string() });
        Ok(result)
    }

    fn lower_new(&mut self, arguments: &[Expression]) -> RillResult<VReg> {
        let type_name = arguments
            .first()
            .and_then(expression_as_type_name)
            .ok_or_else(|| RillError::internal("'new' without a struct type name"))?;
        let fields = self.table.struct_field_count(type_name).ok_or_else(|| {
            RillError::internal(format!("'new' of undeclared struct '{}'", type_name))
        })?;
        let dest = self.gens.fresh_register();
        self.emit(Instr::NewRecord { dest, type_name: type_name.to_string(), fields });
        Ok(dest)
    }

    fn lower_single_argument(
        &mut self,
        arguments: &[Expression],
        builtin: &str,
        scope: ScopeId,
    ) -> RillResult<VReg> {
        match arguments {
            [argument] => self.lower_expression(argument, scope),
            _ => Err(RillError::internal(format!(
                "'{}' expects exactly one argument",
                builtin
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Variable and field access
    // -----------------------------------------------------------------------

    /// Read a variable: globals load by name into a fresh register, locals
    /// and parameters reuse their assigned register.
    fn read_variable(&mut self, scope: ScopeId, name: &str) -> RillResult<(Ty, VReg)> {
        match self.table.lookup(scope, name) {
            Some((found_in, Entry::Scalar { ty, register })) => {
                if found_in == self.table.root() {
                    let ty = ty.clone();
                    let dest = self.gens.fresh_register();
                    self.emit(Instr::LoadGlobal { dest, name: name.to_string() });
                    Ok((ty, dest))
                } else {
                    Ok((ty.clone(), *register))
                }
            }
            _ => Err(RillError::internal(format!(
                "'{}' has no variable entry in scope '{}'",
                name,
                self.table.scope_name(scope)
            ))),
        }
    }

    fn variable_register(&self, scope: ScopeId, name: &str) -> RillResult<VReg> {
        match self.table.lookup(scope, name) {
            Some((_, Entry::Scalar { register, .. })) => Ok(*register),
            _ => Err(RillError::internal(format!(
                "'{}' has no variable entry in scope '{}'",
                name,
                self.table.scope_name(scope)
            ))),
        }
    }

    fn expect_struct(&self, ty: &Ty, field: &str) -> RillResult<String> {
        match ty {
            Ty::Struct(name) => Ok(name.clone()),
            other => Err(RillError::internal(format!(
                "field '{}' selected on non-record type {}",
                field, other
            ))),
        }
    }

    fn field_index(&self, struct_name: &str, field: &str) -> RillResult<usize> {
        self.table.struct_field_index(struct_name, field).ok_or_else(|| {
            RillError::internal(format!(
                "field '{}' is not in struct '{}'",
                field, struct_name
            ))
        })
    }

    fn field_ty(&self, struct_name: &str, field: &str) -> RillResult<Ty> {
        self.table.struct_field_ty(struct_name, field).ok_or_else(|| {
            RillError::internal(format!(
                "field '{}' is not in struct '{}'",
                field, struct_name
            ))
        })
    }
}

/// A `+`/`-` right operand that is a plain integer literal becomes an
/// immediate.
fn term_as_literal(term: &Term) -> Option<i64> {
    if !term.rights.is_empty() {
        return None;
    }
    unary_term_as_literal(&term.left)
}

/// A `*`/`/` right operand that is a plain integer literal becomes an
/// immediate.
fn unary_term_as_literal(term: &UnaryTerm) -> Option<i64> {
    if term.op.is_some() || !term.operand.fields.is_empty() {
        return None;
    }
    match &term.operand.factor.kind {
        FactorKind::Int(value) => Some(*value),
        _ => None,
    }
}

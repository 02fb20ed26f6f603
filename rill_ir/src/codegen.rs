//! AArch64 assembly emission
//!
//! The backend is naïve but correct: every virtual register lives in a stack
//! slot relative to `x29`, each instruction loads its sources into scratch
//! registers, computes, and stores its target back. Parameters stay live in
//! `x0..x7` for the whole function body and are never picked as scratch.

use crate::frame::Frame;
use crate::ir::{Cond, FuncFrag, Instr, Operand};
use crate::regalloc::{IoFlags, RegisterPool};
use hashbrown::HashMap;
use rill_analysis::{Entry, SymbolTable};
use rill_common::{Generators, RillError, RillResult, VReg};

/// Emit a complete assembly program for the fragment list.
pub fn emit_program(
    frags: &[FuncFrag],
    table: &SymbolTable,
    gens: &mut Generators,
) -> RillResult<Vec<String>> {
    let mut emitter = AsmEmitter {
        table,
        gens,
        pool: RegisterPool::new(),
        io: IoFlags::default(),
        lines: Vec::new(),
    };
    emitter.emit_program(frags)?;
    Ok(emitter.lines)
}

/// Virtual registers that are parameters, mapped to their ordinal (= the
/// physical register `x{ordinal}` they arrive in).
type ParamMap = HashMap<VReg, usize>;

struct AsmEmitter<'a> {
    table: &'a SymbolTable,
    gens: &'a mut Generators,
    pool: RegisterPool,
    io: IoFlags,
    lines: Vec<String>,
}

impl AsmEmitter<'_> {
    fn emit_program(&mut self, frags: &[FuncFrag]) -> RillResult<()> {
        self.lines.push("\t.arch armv8-a".to_string());

        let globals = frags
            .first()
            .ok_or_else(|| RillError::internal("empty fragment list"))?;
        for instr in &globals.body {
            if let Some(name) = instr.global() {
                self.lines.push(format!("\t.comm {},8,8", name));
            }
        }
        self.lines.push("\t.text".to_string());

        // Group the remaining fragments into functions: a fragment whose
        // label names a function entry starts a new group, branch-target
        // fragments belong to the preceding entry.
        let rest = &frags[1..];
        let mut starts = Vec::new();
        for (index, frag) in rest.iter().enumerate() {
            if matches!(self.table.lookup_global(&frag.label), Some(Entry::Function { .. })) {
                starts.push(index);
            }
        }
        if !rest.is_empty() && starts.first() != Some(&0) {
            return Err(RillError::internal(
                "fragment list does not start with a function entry",
            ));
        }

        for (position, &start) in starts.iter().enumerate() {
            let end = starts.get(position + 1).copied().unwrap_or(rest.len());
            self.emit_function(&rest[start..end])?;
        }

        self.emit_rodata();
        Ok(())
    }

    fn emit_function(&mut self, frags: &[FuncFrag]) -> RillResult<()> {
        let name = frags[0].label.clone();
        let param_registers = match self.table.lookup_global(&name) {
            Some(Entry::Function { param_registers, .. }) => param_registers.clone(),
            _ => {
                return Err(RillError::internal(format!(
                    "no function entry for fragment '{}'",
                    name
                )))
            }
        };

        let frame = Frame::for_function(frags);

        let mut params = ParamMap::new();
        for (ordinal, reg) in param_registers.iter().enumerate() {
            params.insert(*reg, ordinal);
            self.pool.occupy(ordinal);
        }
        if name == "main" {
            self.pool.occupy(0);
        }

        self.lines.push(format!("\t.type {},%function", name));
        self.lines.push(format!("\t.global {}", name));
        self.lines.push("\t.p2align 2".to_string());
        self.lines.push(format!("{}:", name));
        self.emit_prologue(frame.size());

        for (index, frag) in frags.iter().enumerate() {
            if index > 0 {
                self.lines.push(format!("{}:", frag.label));
            }
            for instr in &frag.body {
                self.emit_instr(instr, &frame, &params)?;
            }
        }

        self.emit_epilogue(frame.size());
        self.lines.push(format!("\t.size {},(.-{})", name, name));

        for ordinal in 0..param_registers.len() {
            self.pool.release(ordinal);
        }
        if name == "main" {
            self.pool.release(0);
        }
        Ok(())
    }

    fn emit_prologue(&mut self, frame_size: i64) {
        self.lines.push("\tsub sp,sp,16".to_string());
        self.lines.push("\tstp x29,x30,[sp]".to_string());
        self.lines.push("\tmov x29,sp".to_string());
        self.lines.push(format!("\tsub sp,sp,#{}", frame_size));
    }

    fn emit_epilogue(&mut self, frame_size: i64) {
        self.lines.push(format!("\tadd sp,sp,#{}", frame_size));
        self.lines.push("\tldp x29,x30,[sp]".to_string());
        self.lines.push("\tadd sp,sp,16".to_string());
        self.lines.push("\tret".to_string());
    }

    fn emit_rodata(&mut self) {
        if self.io.print {
            self.lines.push(".PRINT:".to_string());
            self.lines.push("\t.asciz\t\"%ld\"".to_string());
            self.lines.push("\t.size\t.PRINT, 4".to_string());
        }
        if self.io.println {
            self.lines.push(".PRINT_LN:".to_string());
            self.lines.push("\t.asciz\t\"%ld\\n\"".to_string());
            self.lines.push("\t.size\t.PRINT_LN, 5".to_string());
        }
        if self.io.scan {
            self.lines.push(".READ:".to_string());
            self.lines.push("\t.asciz\t\"%ld\"".to_string());
            self.lines.push("\t.size\t.READ, 4".to_string());
        }
    }

    // -----------------------------------------------------------------------
    // Per-instruction lowering
    // -----------------------------------------------------------------------

    fn emit_instr(&mut self, instr: &Instr, frame: &Frame, params: &ParamMap) -> RillResult<()> {
        match instr {
            Instr::Add { dest, lhs, rhs } => self.binary("add", *dest, *lhs, rhs, frame, params),
            Instr::Sub { dest, lhs, rhs } => self.binary("subs", *dest, *lhs, rhs, frame, params),
            Instr::Mul { dest, lhs, rhs } => self.binary("mul", *dest, *lhs, rhs, frame, params),
            Instr::Div { dest, lhs, rhs } => self.binary("sdiv", *dest, *lhs, rhs, frame, params),
            Instr::And { dest, lhs, rhs } => self.binary("and", *dest, *lhs, rhs, frame, params),
            Instr::Or { dest, lhs, rhs } => self.binary("orr", *dest, *lhs, rhs, frame, params),
            Instr::Not { dest, operand } => self.emit_not(*dest, operand, frame, params),
            Instr::Mov { dest, src, cond, from_call } => {
                self.emit_mov(*dest, src, *cond, *from_call, frame, params)
            }
            Instr::Cmp { lhs, rhs } => self.emit_cmp(*lhs, rhs, frame, params),
            Instr::Branch { cond, label } => {
                let line = match cond {
                    Cond::Eq => format!("\tb.eq {}", label),
                    Cond::Ne => format!("\tb.ne {}", label),
                    _ => format!("\tb {}", label),
                };
                self.lines.push(line);
                Ok(())
            }
            Instr::LoadGlobal { dest, name } => self.emit_load_global(*dest, name, frame),
            Instr::StoreGlobal { src, name } => self.emit_store_global(*src, name, frame, params),
            Instr::LoadField { dest, base, index, .. } => {
                self.emit_load_field(*dest, *base, *index, frame, params)
            }
            Instr::StoreField { src, base, index, .. } => {
                self.emit_store_field(*src, *base, *index, frame, params)
            }
            Instr::NewRecord { dest, fields, .. } => {
                self.emit_new_record(*dest, *fields, frame, params)
            }
            Instr::Delete { src } => self.emit_delete(*src, frame, params),
            Instr::Push { args, .. } => self.emit_push(args, frame, params),
            Instr::Pop { args, .. } => self.emit_pop(args),
            Instr::Call { callee } => {
                self.lines.push(format!("\tbl {}", callee));
                Ok(())
            }
            Instr::Read { dest } => self.emit_read(*dest, frame),
            Instr::Print { src } => self.emit_io(*src, ".PRINT", frame, params),
            Instr::Println { src } => self.emit_io(*src, ".PRINT_LN", frame, params),
            Instr::Ret { src } => self.emit_ret(*src, frame, params),
            Instr::GlobalDecl { name } => Err(RillError::internal(format!(
                "global declaration '{}' outside the globals fragment",
                name
            ))),
        }
    }

    /// Bring a virtual-register source into a physical register: parameters
    /// are already live, everything else is loaded from its slot into a
    /// scratch register. Returns `(physical, is_parameter)`.
    fn load_source(
        &mut self,
        reg: VReg,
        frame: &Frame,
        params: &ParamMap,
    ) -> RillResult<(usize, bool)> {
        if let Some(&ordinal) = params.get(&reg) {
            return Ok((ordinal, true));
        }
        let scratch = self.pool.next_available()?;
        self.lines
            .push(format!("\tldr x{},[x29,#{}]", scratch, frame.offset_of(reg)));
        Ok((scratch, false))
    }

    /// Like `load_source` for a register-or-immediate operand.
    fn load_operand(
        &mut self,
        operand: &Operand,
        frame: &Frame,
        params: &ParamMap,
    ) -> RillResult<(usize, bool)> {
        match operand {
            Operand::Reg(reg) => self.load_source(*reg, frame, params),
            Operand::Imm(value) => {
                let scratch = self.pool.next_available()?;
                self.lines.push(format!("\tmov x{},#{}", scratch, value));
                Ok((scratch, false))
            }
        }
    }

    fn release_unless_param(&mut self, physical: usize, is_param: bool) {
        if !is_param {
            self.pool.release(physical);
        }
    }

    /// Hold `x0`/`x1` while setting up a `printf`/`scanf` call, so scratch
    /// allocation cannot hand out the fixed argument registers and the
    /// `mov x1,…; mov x0,…` sequence cannot clobber a live scratch. Returns
    /// which of the two this call actually reserved.
    fn reserve_io_registers(&mut self) -> (bool, bool) {
        let reserve_x0 = self.pool.is_free(0);
        if reserve_x0 {
            self.pool.occupy(0);
        }
        let reserve_x1 = self.pool.is_free(1);
        if reserve_x1 {
            self.pool.occupy(1);
        }
        (reserve_x0, reserve_x1)
    }

    fn release_io_registers(&mut self, reserved: (bool, bool)) {
        if reserved.0 {
            self.pool.release(0);
        }
        if reserved.1 {
            self.pool.release(1);
        }
    }

    fn store_to_slot(&mut self, physical: usize, reg: VReg, frame: &Frame) {
        self.lines
            .push(format!("\tstr x{},[x29,#{}]", physical, frame.offset_of(reg)));
    }

    fn binary(
        &mut self,
        mnemonic: &str,
        dest: VReg,
        lhs: VReg,
        rhs: &Operand,
        frame: &Frame,
        params: &ParamMap,
    ) -> RillResult<()> {
        let (a, a_param) = self.load_source(lhs, frame, params)?;
        let (b, b_param) = self.load_operand(rhs, frame, params)?;
        let target = self.pool.next_available()?;
        self.lines.push(format!("\t{} x{},x{},x{}", mnemonic, target, a, b));
        self.store_to_slot(target, dest, frame);
        self.pool.release(target);
        self.release_unless_param(a, a_param);
        self.release_unless_param(b, b_param);
        Ok(())
    }

    /// Boolean negation as `1 - x`.
    fn emit_not(
        &mut self,
        dest: VReg,
        operand: &Operand,
        frame: &Frame,
        params: &ParamMap,
    ) -> RillResult<()> {
        let (a, a_param) = self.load_operand(operand, frame, params)?;
        let one = self.pool.next_available()?;
        self.lines.push(format!("\tmov x{},#1", one));
        let target = self.pool.next_available()?;
        self.lines.push(format!("\tsubs x{},x{},x{}", target, one, a));
        self.store_to_slot(target, dest, frame);
        self.pool.release(target);
        self.pool.release(one);
        self.release_unless_param(a, a_param);
        Ok(())
    }

    fn emit_mov(
        &mut self,
        dest: VReg,
        src: &Operand,
        cond: Cond,
        from_call: bool,
        frame: &Frame,
        params: &ParamMap,
    ) -> RillResult<()> {
        if cond == Cond::Al {
            if from_call {
                let scratch = self.pool.next_available()?;
                self.lines.push(format!("\tmov x{},x0", scratch));
                self.store_to_slot(scratch, dest, frame);
                self.pool.release(scratch);
                return Ok(());
            }

            let (target, dest_is_param) = match params.get(&dest) {
                Some(&ordinal) => (ordinal, true),
                None => (self.pool.next_available()?, false),
            };
            match src {
                Operand::Reg(reg) => {
                    let (source, src_is_param) = self.load_source(*reg, frame, params)?;
                    self.lines.push(format!("\tmov x{},x{}", target, source));
                    self.release_unless_param(source, src_is_param);
                }
                Operand::Imm(value) => {
                    self.lines.push(format!("\tmov x{},#{}", target, value));
                }
            }
            if !dest_is_param {
                self.store_to_slot(target, dest, frame);
                self.pool.release(target);
            }
            return Ok(());
        }

        // Conditional move as a branch-over: the inverse condition skips the
        // unconditional move to the destination's slot.
        let label = self.gens.fresh_label("skipMov");
        self.lines.push(format!("\tb.{} {}", cond.inverse().suffix(), label));
        let result = self.pool.next_available()?;
        let temp = self.pool.next_available()?;
        match src {
            Operand::Imm(value) => {
                self.lines.push(format!("\tmov x{},#{}", temp, value));
            }
            Operand::Reg(reg) => match params.get(reg) {
                Some(&ordinal) => self.lines.push(format!("\tmov x{},x{}", temp, ordinal)),
                None => self
                    .lines
                    .push(format!("\tldr x{},[x29,#{}]", temp, frame.offset_of(*reg))),
            },
        }
        self.lines.push(format!("\tmov x{},x{}", result, temp));
        self.store_to_slot(result, dest, frame);
        self.lines.push(format!("{}:", label));
        self.pool.release(temp);
        self.pool.release(result);
        Ok(())
    }

    fn emit_cmp(
        &mut self,
        lhs: VReg,
        rhs: &Operand,
        frame: &Frame,
        params: &ParamMap,
    ) -> RillResult<()> {
        let (a, a_param) = self.load_source(lhs, frame, params)?;
        let (b, b_param) = self.load_operand(rhs, frame, params)?;
        self.lines.push(format!("\tcmp x{},x{}", a, b));
        self.release_unless_param(a, a_param);
        self.release_unless_param(b, b_param);
        Ok(())
    }

    fn emit_load_global(&mut self, dest: VReg, name: &str, frame: &Frame) -> RillResult<()> {
        let scratch = self.pool.next_available()?;
        self.lines.push(format!("\tadrp x{},{}", scratch, name));
        self.lines.push(format!("\tadd x{},x{},:lo12:{}", scratch, scratch, name));
        self.lines.push(format!("\tldr x{},[x{}]", scratch, scratch));
        self.store_to_slot(scratch, dest, frame);
        self.pool.release(scratch);
        Ok(())
    }

    fn emit_store_global(
        &mut self,
        src: VReg,
        name: &str,
        frame: &Frame,
        params: &ParamMap,
    ) -> RillResult<()> {
        let (value, value_param) = self.load_source(src, frame, params)?;
        let address = self.pool.next_available()?;
        self.lines.push(format!("\tadrp x{},{}", address, name));
        self.lines.push(format!("\tadd x{},x{},:lo12:{}", address, address, name));
        self.lines.push(format!("\tstr x{},[x{}]", value, address));
        self.pool.release(address);
        self.release_unless_param(value, value_param);
        Ok(())
    }

    fn emit_load_field(
        &mut self,
        dest: VReg,
        base: VReg,
        index: usize,
        frame: &Frame,
        params: &ParamMap,
    ) -> RillResult<()> {
        let (pointer, pointer_param) = self.load_source(base, frame, params)?;
        let target = self.pool.next_available()?;
        self.lines.push(format!("\tldr x{},[x{},#{}]", target, pointer, index * 8));
        self.store_to_slot(target, dest, frame);
        self.pool.release(target);
        self.release_unless_param(pointer, pointer_param);
        Ok(())
    }

    fn emit_store_field(
        &mut self,
        src: VReg,
        base: VReg,
        index: usize,
        frame: &Frame,
        params: &ParamMap,
    ) -> RillResult<()> {
        let (value, value_param) = self.load_source(src, frame, params)?;
        let (pointer, pointer_param) = self.load_source(base, frame, params)?;
        self.lines.push(format!("\tstr x{},[x{},#{}]", value, pointer, index * 8));
        self.release_unless_param(value, value_param);
        self.release_unless_param(pointer, pointer_param);
        Ok(())
    }

    /// `malloc` a record. Parameter registers are caller-saved around the
    /// call through the reserved spill slots at `[x29,#16]` upward.
    fn emit_new_record(
        &mut self,
        dest: VReg,
        fields: usize,
        frame: &Frame,
        params: &ParamMap,
    ) -> RillResult<()> {
        let mut spill = 16;
        for ordinal in 0..params.len() {
            self.lines.push(format!("\tstr x{},[x29,#{}]", ordinal, spill));
            spill += 8;
        }

        self.lines.push(format!("\tmov x0,#{}", fields * 8));
        self.lines.push("\tbl malloc".to_string());
        self.store_to_slot(0, dest, frame);

        let mut restore = 16;
        for ordinal in 0..params.len() {
            self.lines.push(format!("\tldr x{},[x29,#{}]", ordinal, restore));
            restore += 8;
        }
        Ok(())
    }

    fn emit_delete(&mut self, src: VReg, frame: &Frame, params: &ParamMap) -> RillResult<()> {
        let (value, value_param) = self.load_source(src, frame, params)?;
        self.lines.push(format!("\tmov x0,x{}", value));
        self.lines.push("\tbl free".to_string());
        self.release_unless_param(value, value_param);
        Ok(())
    }

    fn call_stack_bytes(args: usize) -> usize {
        let mut bytes = args * 8;
        if bytes % 16 != 0 {
            bytes += 8;
        }
        bytes
    }

    fn emit_push(&mut self, args: &[VReg], frame: &Frame, params: &ParamMap) -> RillResult<()> {
        self.lines.push("\tstr x0,[x29,#24]".to_string());
        self.lines
            .push(format!("\tsub sp,sp,#{}", Self::call_stack_bytes(args.len())));

        for (ordinal, &arg) in args.iter().take(8).enumerate() {
            let (value, value_param) = self.load_source(arg, frame, params)?;
            self.lines.push(format!("\tmov x{},x{}", ordinal, value));
            self.release_unless_param(value, value_param);
            self.pool.occupy(ordinal);
        }
        Ok(())
    }

    fn emit_pop(&mut self, args: &[VReg]) -> RillResult<()> {
        self.lines.push("\tldr x0,[x29,#24]".to_string());
        self.lines
            .push(format!("\tadd sp,sp,#{}", Self::call_stack_bytes(args.len())));
        for ordinal in 1..args.len().min(8) {
            self.pool.release(ordinal);
        }
        Ok(())
    }

    /// `scanf("%ld", &slot)`: the variable's slot address goes in `x1`.
    fn emit_read(&mut self, dest: VReg, frame: &Frame) -> RillResult<()> {
        self.io.scan = true;
        let reserved = self.reserve_io_registers();
        let offset = frame.offset_of(dest);
        let address = self.pool.next_available()?;
        if offset < 0 {
            self.lines.push(format!("\tsub x{},x29,#{}", address, -offset));
        } else {
            self.lines.push(format!("\tadd x{},x29,#{}", address, offset));
        }
        let fmt = self.pool.next_available()?;
        self.lines.push(format!("\tadrp x{},.READ", fmt));
        self.lines.push(format!("\tadd x{},x{},:lo12:.READ", fmt, fmt));
        self.lines.push(format!("\tmov x1,x{}", address));
        self.lines.push(format!("\tmov x0,x{}", fmt));
        self.lines.push("\tbl scanf".to_string());
        self.pool.release(fmt);
        self.pool.release(address);
        self.release_io_registers(reserved);
        Ok(())
    }

    fn emit_io(
        &mut self,
        src: VReg,
        literal: &str,
        frame: &Frame,
        params: &ParamMap,
    ) -> RillResult<()> {
        match literal {
            ".PRINT" => self.io.print = true,
            ".PRINT_LN" => self.io.println = true,
            _ => {}
        }
        let reserved = self.reserve_io_registers();
        let (value, value_param) = self.load_source(src, frame, params)?;
        let fmt = self.pool.next_available()?;
        self.lines.push(format!("\tadrp x{},{}", fmt, literal));
        self.lines.push(format!("\tadd x{},x{},:lo12:{}", fmt, fmt, literal));
        self.lines.push(format!("\tmov x1,x{}", value));
        self.lines.push(format!("\tmov x0,x{}", fmt));
        self.lines.push("\tbl printf".to_string());
        self.pool.release(fmt);
        self.release_unless_param(value, value_param);
        self.release_io_registers(reserved);
        Ok(())
    }

    /// Place the return value in `x0`; control falls into the epilogue.
    fn emit_ret(
        &mut self,
        src: Option<VReg>,
        frame: &Frame,
        params: &ParamMap,
    ) -> RillResult<()> {
        if let Some(reg) = src {
            let (value, value_param) = self.load_source(reg, frame, params)?;
            self.lines.push(format!("\tmov x0,x{}", value));
            self.release_unless_param(value, value_param);
        }
        Ok(())
    }
}

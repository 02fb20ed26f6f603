//! Intermediate representation definitions
//!
//! Instructions operate on virtual registers; the second operand of the
//! arithmetic/logic group may be an immediate. Each instruction can report
//! its target and source registers, its immediate, and any global name it
//! references; `Display` renders the listing shown by `--iloc`.

use rill_common::VReg;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::fmt;

/// Second operand of an instruction: a register or an immediate constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Reg(VReg),
    Imm(i64),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "r{}", reg),
            Operand::Imm(value) => write!(f, "#{}", value),
        }
    }
}

/// Condition flags for `Mov` and `Branch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cond {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    Al,
}

impl Cond {
    /// Suffix used in the ILOC listing ("al" renders as nothing).
    pub fn suffix(&self) -> &'static str {
        match self {
            Cond::Gt => "gt",
            Cond::Lt => "lt",
            Cond::Ge => "ge",
            Cond::Le => "le",
            Cond::Eq => "eq",
            Cond::Ne => "ne",
            Cond::Al => "",
        }
    }

    /// The condition that branches *around* a conditional move.
    pub fn inverse(&self) -> Cond {
        match self {
            Cond::Gt => Cond::Le,
            Cond::Lt => Cond::Ge,
            Cond::Ge => Cond::Lt,
            Cond::Le => Cond::Gt,
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Al => Cond::Al,
        }
    }
}

/// One IR instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    Add { dest: VReg, lhs: VReg, rhs: Operand },
    Sub { dest: VReg, lhs: VReg, rhs: Operand },
    Mul { dest: VReg, lhs: VReg, rhs: Operand },
    Div { dest: VReg, lhs: VReg, rhs: Operand },
    And { dest: VReg, lhs: VReg, rhs: Operand },
    Or { dest: VReg, lhs: VReg, rhs: Operand },
    /// Boolean negation: `dest = 1 - operand`.
    Not { dest: VReg, operand: Operand },
    /// Register/immediate move, optionally conditional. `from_call` marks the
    /// capture of a call result out of `x0`.
    Mov { dest: VReg, src: Operand, cond: Cond, from_call: bool },
    Cmp { lhs: VReg, rhs: Operand },
    Branch { cond: Cond, label: String },
    /// Load a global variable's value by name.
    LoadGlobal { dest: VReg, name: String },
    /// Store a value into a global variable by name.
    StoreGlobal { src: VReg, name: String },
    /// Field read through a record pointer: `dest = base[index]`.
    LoadField { dest: VReg, base: VReg, field: String, struct_name: String, index: usize },
    /// Field write through a record pointer: `base[index] = src`.
    StoreField { src: VReg, base: VReg, field: String, struct_name: String, index: usize },
    /// Heap-allocate a record with `fields` 8-byte slots.
    NewRecord { dest: VReg, type_name: String, fields: usize },
    /// Release a record obtained from `NewRecord`.
    Delete { src: VReg },
    /// Move evaluated arguments into the argument registers before a call.
    Push { args: Vec<VReg>, callee: String },
    /// Undo `Push` after the call returns.
    Pop { args: Vec<VReg>, callee: String },
    /// Branch with link.
    Call { callee: String },
    /// Formatted scan of one integer into the variable behind `dest`.
    Read { dest: VReg },
    Print { src: VReg },
    Println { src: VReg },
    Ret { src: Option<VReg> },
    /// Pseudo-instruction in the globals fragment; carries only the name for
    /// later `.comm` emission.
    GlobalDecl { name: String },
}

impl Instr {
    /// Registers written by this instruction.
    pub fn targets(&self) -> SmallVec<[VReg; 1]> {
        match self {
            Instr::Add { dest, .. }
            | Instr::Sub { dest, .. }
            | Instr::Mul { dest, .. }
            | Instr::Div { dest, .. }
            | Instr::And { dest, .. }
            | Instr::Or { dest, .. }
            | Instr::Not { dest, .. }
            | Instr::Mov { dest, .. }
            | Instr::LoadGlobal { dest, .. }
            | Instr::LoadField { dest, .. }
            | Instr::NewRecord { dest, .. }
            | Instr::Read { dest } => smallvec![*dest],
            _ => SmallVec::new(),
        }
    }

    /// Registers read by this instruction.
    pub fn sources(&self) -> SmallVec<[VReg; 2]> {
        let mut sources = SmallVec::new();
        match self {
            Instr::Add { lhs, rhs, .. }
            | Instr::Sub { lhs, rhs, .. }
            | Instr::Mul { lhs, rhs, .. }
            | Instr::Div { lhs, rhs, .. }
            | Instr::And { lhs, rhs, .. }
            | Instr::Or { lhs, rhs, .. }
            | Instr::Cmp { lhs, rhs } => {
                sources.push(*lhs);
                if let Operand::Reg(reg) = rhs {
                    sources.push(*reg);
                }
            }
            Instr::Not { operand, .. } => {
                if let Operand::Reg(reg) = operand {
                    sources.push(*reg);
                }
            }
            Instr::Mov { src, from_call, .. } => {
                if !from_call {
                    if let Operand::Reg(reg) = src {
                        sources.push(*reg);
                    }
                }
            }
            Instr::StoreGlobal { src, .. } | Instr::Delete { src } => sources.push(*src),
            Instr::LoadField { base, .. } => sources.push(*base),
            Instr::StoreField { src, base, .. } => {
                sources.push(*src);
                sources.push(*base);
            }
            Instr::Push { args, .. } | Instr::Pop { args, .. } => sources.extend(args.iter().copied()),
            Instr::Print { src } | Instr::Println { src } => sources.push(*src),
            Instr::Ret { src: Some(reg) } => sources.push(*reg),
            _ => {}
        }
        sources
    }

    /// The immediate constant, if this instruction carries one.
    pub fn immediate(&self) -> Option<i64> {
        match self {
            Instr::Add { rhs, .. }
            | Instr::Sub { rhs, .. }
            | Instr::Mul { rhs, .. }
            | Instr::Div { rhs, .. }
            | Instr::And { rhs, .. }
            | Instr::Or { rhs, .. }
            | Instr::Cmp { rhs, .. } => match rhs {
                Operand::Imm(value) => Some(*value),
                _ => None,
            },
            Instr::Not { operand, .. } => match operand {
                Operand::Imm(value) => Some(*value),
                _ => None,
            },
            Instr::Mov { src, .. } => match src {
                Operand::Imm(value) => Some(*value),
                _ => None,
            },
            _ => None,
        }
    }

    /// The global symbol this instruction refers to, if any.
    pub fn global(&self) -> Option<&str> {
        match self {
            Instr::LoadGlobal { name, .. }
            | Instr::StoreGlobal { name, .. }
            | Instr::GlobalDecl { name } => Some(name),
            Instr::NewRecord { type_name, .. } => Some(type_name),
            Instr::LoadField { field, .. } | Instr::StoreField { field, .. } => Some(field),
            _ => None,
        }
    }

    /// The branch target label, if any.
    pub fn label(&self) -> Option<&str> {
        match self {
            Instr::Branch { label, .. } => Some(label),
            _ => None,
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Add { dest, lhs, rhs } => write!(f, "add r{},r{},{}", dest, lhs, rhs),
            Instr::Sub { dest, lhs, rhs } => write!(f, "sub r{},r{},{}", dest, lhs, rhs),
            Instr::Mul { dest, lhs, rhs } => write!(f, "mul r{},r{},{}", dest, lhs, rhs),
            Instr::Div { dest, lhs, rhs } => write!(f, "div r{},r{},{}", dest, lhs, rhs),
            Instr::And { dest, lhs, rhs } => write!(f, "and r{},r{},{}", dest, lhs, rhs),
            Instr::Or { dest, lhs, rhs } => write!(f, "or r{},r{},{}", dest, lhs, rhs),
            Instr::Not { dest, operand } => write!(f, "not r{},{}", dest, operand),
            Instr::Mov { dest, src, cond, from_call } => {
                write!(f, "mov{} r{},{}", cond.suffix(), dest, src)?;
                if *from_call {
                    write!(f, " @return")?;
                }
                Ok(())
            }
            Instr::Cmp { lhs, rhs } => write!(f, "cmp r{},{}", lhs, rhs),
            Instr::Branch { cond, label } => write!(f, "b{} {}", cond.suffix(), label),
            Instr::LoadGlobal { dest, name } => write!(f, "ldr r{},{}", dest, name),
            Instr::StoreGlobal { src, name } => write!(f, "str r{},{}", src, name),
            Instr::LoadField { dest, base, field, struct_name, .. } => {
                write!(f, "loadRef r{},r{},@{}[{}]", dest, base, field, struct_name)
            }
            Instr::StoreField { src, base, field, struct_name, .. } => {
                write!(f, "strRef r{},r{},@{}[{}]", src, base, field, struct_name)
            }
            Instr::NewRecord { dest, type_name, .. } => write!(f, "new r{},{}", dest, type_name),
            Instr::Delete { src } => write!(f, "delete r{}", src),
            Instr::Push { args, callee } => {
                write!(f, "push {{")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "r{}", arg)?;
                }
                write!(f, "}} @{}", callee)
            }
            Instr::Pop { args, callee } => {
                write!(f, "pop {{")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "r{}", arg)?;
                }
                write!(f, "}} @{}", callee)
            }
            Instr::Call { callee } => write!(f, "bl {}", callee),
            Instr::Read { dest } => write!(f, "read r{}", dest),
            Instr::Print { src } => write!(f, "print r{}", src),
            Instr::Println { src } => write!(f, "println r{}", src),
            Instr::Ret { src: Some(reg) } => write!(f, "ret r{}", reg),
            Instr::Ret { src: None } => write!(f, "ret"),
            Instr::GlobalDecl { name } => write!(f, "global {}", name),
        }
    }
}

/// A labelled, ordered list of instructions; roughly a basic block, though a
/// fragment may contain internal branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncFrag {
    pub label: String,
    pub body: Vec<Instr>,
}

impl FuncFrag {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), body: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_renders_with_register_and_immediate_operands() {
        let reg = Instr::Add { dest: 2, lhs: 0, rhs: Operand::Reg(1) };
        assert_eq!(reg.to_string(), "add r2,r0,r1");
        let imm = Instr::Sub { dest: 3, lhs: 2, rhs: Operand::Imm(5) };
        assert_eq!(imm.to_string(), "sub r3,r2,#5");
    }

    #[test]
    fn conditional_mov_renders_its_flag() {
        let mov = Instr::Mov { dest: 4, src: Operand::Imm(1), cond: Cond::Lt, from_call: false };
        assert_eq!(mov.to_string(), "movlt r4,#1");
        let plain = Instr::Mov { dest: 4, src: Operand::Imm(0), cond: Cond::Al, from_call: false };
        assert_eq!(plain.to_string(), "mov r4,#0");
    }

    #[test]
    fn call_result_capture_is_marked() {
        let mov = Instr::Mov { dest: 7, src: Operand::Reg(0), cond: Cond::Al, from_call: true };
        assert_eq!(mov.to_string(), "mov r7,r0 @return");
    }

    #[test]
    fn field_accesses_render_field_and_struct() {
        let load = Instr::LoadField {
            dest: 5,
            base: 4,
            field: "x".to_string(),
            struct_name: "Pair".to_string(),
            index: 0,
        };
        assert_eq!(load.to_string(), "loadRef r5,r4,@x[Pair]");
    }

    #[test]
    fn push_lists_argument_registers_and_callee() {
        let push = Instr::Push { args: vec![3, 4], callee: "add".to_string() };
        assert_eq!(push.to_string(), "push {r3,r4} @add");
        let pop = Instr::Pop { args: vec![3, 4], callee: "add".to_string() };
        assert_eq!(pop.to_string(), "pop {r3,r4} @add");
    }

    #[test]
    fn targets_and_sources_report_the_data_flow() {
        let add = Instr::Add { dest: 2, lhs: 0, rhs: Operand::Reg(1) };
        assert_eq!(add.targets().as_slice(), &[2]);
        assert_eq!(add.sources().as_slice(), &[0, 1]);

        let add_imm = Instr::Add { dest: 2, lhs: 0, rhs: Operand::Imm(9) };
        assert_eq!(add_imm.sources().as_slice(), &[0]);
        assert_eq!(add_imm.immediate(), Some(9));

        let store = Instr::StoreField {
            src: 6,
            base: 5,
            field: "y".to_string(),
            struct_name: "Pair".to_string(),
            index: 1,
        };
        assert!(store.targets().is_empty());
        assert_eq!(store.sources().as_slice(), &[6, 5]);
    }

    #[test]
    fn call_result_capture_reads_no_virtual_register() {
        let mov = Instr::Mov { dest: 7, src: Operand::Reg(0), cond: Cond::Al, from_call: true };
        assert!(mov.sources().is_empty());
        assert_eq!(mov.targets().as_slice(), &[7]);
    }

    #[test]
    fn globals_are_reported_by_name() {
        let load = Instr::LoadGlobal { dest: 1, name: "total".to_string() };
        assert_eq!(load.global(), Some("total"));
        let decl = Instr::GlobalDecl { name: "total".to_string() };
        assert_eq!(decl.global(), Some("total"));
        let branch = Instr::Branch { cond: Cond::Eq, label: "else_L0".to_string() };
        assert_eq!(branch.global(), None);
        assert_eq!(branch.label(), Some("else_L0"));
    }

    #[test]
    fn condition_inverses_pair_up() {
        assert_eq!(Cond::Lt.inverse(), Cond::Ge);
        assert_eq!(Cond::Le.inverse(), Cond::Gt);
        assert_eq!(Cond::Eq.inverse(), Cond::Ne);
        assert_eq!(Cond::Gt.inverse(), Cond::Le);
        assert_eq!(Cond::Ge.inverse(), Cond::Lt);
        assert_eq!(Cond::Ne.inverse(), Cond::Eq);
    }
}

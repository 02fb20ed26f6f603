//! Stack-frame layout
//!
//! A function's frame holds one 8-byte slot per distinct virtual register
//! targeted anywhere in the function's fragments, assigned in first-write
//! order at descending offsets from `x29`, padded to 16-byte alignment.

use crate::ir::FuncFrag;
use hashbrown::HashMap;
use rill_common::VReg;

/// The activation-record layout of one function.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    slots: HashMap<VReg, i64>,
    size: i64,
}

impl Frame {
    /// Scan a function's fragments (entry plus its branch targets) and
    /// assign every target register a slot.
    pub fn for_function(frags: &[FuncFrag]) -> Frame {
        let mut slots = HashMap::new();
        let mut offset = 0i64;
        for frag in frags {
            for instr in &frag.body {
                for target in instr.targets() {
                    slots.entry(target).or_insert_with(|| {
                        offset -= 8;
                        offset
                    });
                }
            }
        }
        let mut size = -offset;
        if size % 16 != 0 {
            size += 8;
        }
        Frame { slots, size }
    }

    /// The prologue's `sp` decrement. Always a multiple of 16.
    pub fn size(&self) -> i64 {
        self.size
    }

    /// Frame offset of a virtual register. Registers that are never written
    /// have no slot and read from the frame base; their value is as
    /// undefined as the uninitialised variable they belong to.
    pub fn offset_of(&self, reg: VReg) -> i64 {
        self.slots.get(&reg).copied().unwrap_or(0)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Cond, Instr, Operand};

    fn frag(label: &str, body: Vec<Instr>) -> FuncFrag {
        FuncFrag { label: label.to_string(), body }
    }

    #[test]
    fn slots_are_assigned_in_first_write_order() {
        let frags = vec![frag(
            "f",
            vec![
                Instr::Mov { dest: 4, src: Operand::Imm(1), cond: Cond::Al, from_call: false },
                Instr::Add { dest: 7, lhs: 4, rhs: Operand::Imm(2) },
                Instr::Mov { dest: 4, src: Operand::Reg(7), cond: Cond::Al, from_call: false },
            ],
        )];
        let frame = Frame::for_function(&frags);
        assert_eq!(frame.offset_of(4), -8);
        assert_eq!(frame.offset_of(7), -16);
        assert_eq!(frame.slot_count(), 2);
    }

    #[test]
    fn branch_target_fragments_contribute_slots() {
        let frags = vec![
            frag("f", vec![Instr::Mov {
                dest: 0,
                src: Operand::Imm(1),
                cond: Cond::Al,
                from_call: false,
            }]),
            frag("done_L0", vec![Instr::Mov {
                dest: 1,
                src: Operand::Imm(2),
                cond: Cond::Al,
                from_call: false,
            }]),
        ];
        let frame = Frame::for_function(&frags);
        assert_eq!(frame.offset_of(0), -8);
        assert_eq!(frame.offset_of(1), -16);
        assert_eq!(frame.size(), 16);
    }

    #[test]
    fn size_is_padded_to_sixteen_bytes() {
        let one = vec![frag("f", vec![Instr::Read { dest: 0 }])];
        assert_eq!(Frame::for_function(&one).size(), 16);

        let two = vec![frag("f", vec![Instr::Read { dest: 0 }, Instr::Read { dest: 1 }])];
        assert_eq!(Frame::for_function(&two).size(), 16);

        let three = vec![frag(
            "f",
            vec![
                Instr::Read { dest: 0 },
                Instr::Read { dest: 1 },
                Instr::Read { dest: 2 },
            ],
        )];
        assert_eq!(Frame::for_function(&three).size(), 32);
    }

    #[test]
    fn empty_functions_have_an_empty_frame() {
        let frags = vec![frag("f", vec![])];
        let frame = Frame::for_function(&frags);
        assert_eq!(frame.size(), 0);
        assert_eq!(frame.slot_count(), 0);
    }

    #[test]
    fn unwritten_registers_read_from_the_frame_base() {
        let frags = vec![frag("f", vec![Instr::Print { src: 9 }])];
        let frame = Frame::for_function(&frags);
        assert_eq!(frame.offset_of(9), 0);
    }
}

// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#![cfg_attr(feature = "cargo-clippy", allow(clippy::cast_lossless))]

use bit_field::BitField;

use crate::factory::RegisterDesc;

// Design:
//   The sandbox cpu implements the register file of a 6502 and a small subset of its
//   instructions: enough to execute code that loads, stores, jumps and calls subroutines
//   so checkpoints can be exercised. Decoding lives here, execution is done by the
//   sandbox since every memory access has to be reported to the checkpoint hook.

pub const REG_A: u8 = 0x00;
pub const REG_X: u8 = 0x01;
pub const REG_Y: u8 = 0x02;
pub const REG_PC: u8 = 0x03;
pub const REG_SP: u8 = 0x04;
pub const REG_FL: u8 = 0x05;
pub const REG_LIN: u8 = 0x35;
pub const REG_CYC: u8 = 0x36;
pub const REG_FLAGS: u8 = 0x37;

pub static REGISTERS: [RegisterDesc; 9] = [
    RegisterDesc { id: REG_PC, name: "PC", bits: 16, is_flags: false },
    RegisterDesc { id: REG_A, name: "A", bits: 8, is_flags: false },
    RegisterDesc { id: REG_X, name: "X", bits: 8, is_flags: false },
    RegisterDesc { id: REG_Y, name: "Y", bits: 8, is_flags: false },
    RegisterDesc { id: REG_SP, name: "SP", bits: 8, is_flags: false },
    RegisterDesc { id: REG_FL, name: "FL", bits: 8, is_flags: false },
    RegisterDesc { id: REG_FLAGS, name: "NV-BDIZC", bits: 8, is_flags: true },
    RegisterDesc { id: REG_LIN, name: "LIN", bits: 16, is_flags: false },
    RegisterDesc { id: REG_CYC, name: "CYC", bits: 16, is_flags: false },
];

pub const BRK_VECTOR: u16 = 0xfffe;
pub const RESET_VECTOR: u16 = 0xfffc;
pub const STACK_BASE: u16 = 0x0100;

#[derive(Clone, Copy)]
pub enum Flag {
    Carry = 0,
    Zero = 1,
    IntDisable = 2,
    Decimal = 3,
    Break = 4,
    Reserved = 5,
    Overflow = 6,
    Negative = 7,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub p: u8,
    pub pc: u16,
}

impl Registers {
    pub fn reset(&mut self, pc: u16) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0xfd;
        self.p = 0;
        self.set_flag(Flag::Reserved, true);
        self.set_flag(Flag::IntDisable, true);
        self.pc = pc;
    }

    pub fn get(&self, id: u8) -> Option<u16> {
        match id {
            REG_A => Some(self.a as u16),
            REG_X => Some(self.x as u16),
            REG_Y => Some(self.y as u16),
            REG_PC => Some(self.pc),
            REG_SP => Some(self.sp as u16),
            REG_FL | REG_FLAGS => Some(self.p as u16),
            _ => None,
        }
    }

    pub fn set(&mut self, id: u8, value: u16) -> Result<(), String> {
        match id {
            REG_A => self.a = value as u8,
            REG_X => self.x = value as u8,
            REG_Y => self.y = value as u8,
            REG_PC => self.pc = value,
            REG_SP => self.sp = value as u8,
            REG_FL | REG_FLAGS => self.p = value as u8,
            REG_LIN | REG_CYC => return Err(format!("Register {} is read-only", id)),
            _ => return Err(format!("Invalid register {}", id)),
        }
        Ok(())
    }

    pub fn get_flag(&self, flag: Flag) -> bool {
        self.p.get_bit(flag as usize)
    }

    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        self.p.set_bit(flag as usize, value);
    }

    pub fn update_nz(&mut self, value: u8) {
        self.set_flag(Flag::Zero, value == 0);
        self.set_flag(Flag::Negative, value.get_bit(7));
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Opcode {
    Brk,
    Inx,
    Jam,
    Jmp,
    Jsr,
    LdaAbs,
    LdaImm,
    Nop,
    Rti,
    Rts,
    StaAbs,
}

impl Opcode {
    pub fn decode(opcode: u8) -> Option<Opcode> {
        match opcode {
            0x00 => Some(Opcode::Brk),
            0x20 => Some(Opcode::Jsr),
            0x40 => Some(Opcode::Rti),
            0x4c => Some(Opcode::Jmp),
            0x60 => Some(Opcode::Rts),
            0x8d => Some(Opcode::StaAbs),
            0xa9 => Some(Opcode::LdaImm),
            0xad => Some(Opcode::LdaAbs),
            0xe8 => Some(Opcode::Inx),
            0xea => Some(Opcode::Nop),
            0x02 | 0x12 | 0x22 | 0x32 | 0x42 | 0x52 | 0x62 | 0x72 | 0x92 | 0xb2 | 0xd2
            | 0xf2 => Some(Opcode::Jam),
            _ => None,
        }
    }

    pub fn cycles(self) -> u64 {
        match self {
            Opcode::Brk => 7,
            Opcode::Inx => 2,
            Opcode::Jam => 0,
            Opcode::Jmp => 3,
            Opcode::Jsr => 6,
            Opcode::LdaAbs => 4,
            Opcode::LdaImm => 2,
            Opcode::Nop => 2,
            Opcode::Rti => 6,
            Opcode::Rts => 6,
            Opcode::StaAbs => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_registers() {
        let mut regs = Registers::default();
        regs.a = 0x12;
        regs.reset(0xe000);
        assert_eq!(0, regs.a);
        assert_eq!(0xfd, regs.sp);
        assert_eq!(0xe000, regs.pc);
        assert!(regs.get_flag(Flag::IntDisable));
    }

    #[test]
    fn set_register_truncates_to_width() {
        let mut regs = Registers::default();
        regs.set(REG_X, 0x1ff).unwrap();
        assert_eq!(Some(0xff), regs.get(REG_X));
    }

    #[test]
    fn set_read_only_register() {
        let mut regs = Registers::default();
        assert!(regs.set(REG_LIN, 1).is_err());
        assert!(regs.set(0x7f, 1).is_err());
    }

    #[test]
    fn update_nz_flags() {
        let mut regs = Registers::default();
        regs.update_nz(0x80);
        assert!(regs.get_flag(Flag::Negative));
        assert!(!regs.get_flag(Flag::Zero));
        regs.update_nz(0);
        assert!(regs.get_flag(Flag::Zero));
    }

    #[test]
    fn decode_opcodes() {
        assert_eq!(Some(Opcode::Jsr), Opcode::decode(0x20));
        assert_eq!(Some(Opcode::Jam), Opcode::decode(0x02));
        assert_eq!(None, Opcode::decode(0xff));
    }
}

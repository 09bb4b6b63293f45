// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use crate::factory::BankDesc;

pub const BANK_CPU: u16 = 0;
pub const BANK_RAM: u16 = 1;
pub const BANK_IO: u16 = 2;

pub static COMPUTER_BANKS: [BankDesc; 3] = [
    BankDesc { id: BANK_CPU, name: "cpu" },
    BankDesc { id: BANK_RAM, name: "ram" },
    BankDesc { id: BANK_IO, name: "io" },
];

pub static DRIVE_BANKS: [BankDesc; 2] = [
    BankDesc { id: BANK_CPU, name: "cpu" },
    BankDesc { id: BANK_RAM, name: "ram" },
];

pub const IO_BASE: u16 = 0xd000;
pub const IO_SIZE: usize = 0x1000;

pub const BORDER_COLOR: u16 = 0xd020;
pub const BACKGROUND_COLOR: u16 = 0xd021;
pub const COLOR_RAM: u16 = 0xd800;
pub const CIA1_ICR: u16 = 0xdc0d;

/// 64K of RAM with an optional I/O area overlaid at $d000-$dfff.
/// Reading the CIA interrupt control register through the cpu acknowledges it.
pub struct Memory {
    ram: Vec<u8>,
    io: Option<Vec<u8>>,
}

impl Memory {
    pub fn new(with_io: bool) -> Self {
        Self {
            ram: vec![0x00; 0x10000],
            io: if with_io { Some(vec![0x00; IO_SIZE]) } else { None },
        }
    }

    pub fn clear(&mut self) {
        for byte in self.ram.iter_mut() {
            *byte = 0;
        }
        if let Some(io) = self.io.as_mut() {
            for byte in io.iter_mut() {
                *byte = 0;
            }
        }
    }

    pub fn load(&mut self, data: &[u8], offset: u16) {
        let mut address = offset;
        for byte in data {
            self.ram[address as usize] = *byte;
            address = address.wrapping_add(1);
        }
    }

    pub fn peek(&self, bank: u16, address: u16) -> u8 {
        match self.io_offset(bank, address) {
            Some(offset) => self.io.as_ref().map_or(0, |io| io[offset]),
            None => self.ram[address as usize],
        }
    }

    pub fn read(&mut self, bank: u16, address: u16) -> u8 {
        let value = self.peek(bank, address);
        if address == CIA1_ICR {
            if let Some(offset) = self.io_offset(bank, address) {
                if let Some(io) = self.io.as_mut() {
                    io[offset] = 0;
                }
            }
        }
        value
    }

    pub fn write(&mut self, bank: u16, address: u16, value: u8) {
        match self.io_offset(bank, address) {
            Some(offset) => {
                if let Some(io) = self.io.as_mut() {
                    io[offset] = value;
                }
            }
            None => self.ram[address as usize] = value,
        }
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn io(&self) -> Option<&[u8]> {
        self.io.as_ref().map(|io| io.as_slice())
    }

    pub fn restore(&mut self, ram: &[u8], io: Option<&[u8]>) {
        self.ram.copy_from_slice(ram);
        if let (Some(dst), Some(src)) = (self.io.as_mut(), io) {
            dst.copy_from_slice(src);
        }
    }

    fn io_offset(&self, bank: u16, address: u16) -> Option<usize> {
        let mapped = match bank {
            BANK_CPU | BANK_IO => self.io.is_some(),
            _ => false,
        };
        if mapped && address >= IO_BASE && (address as usize) < IO_BASE as usize + IO_SIZE {
            Some((address - IO_BASE) as usize)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_bank_bypasses_io() {
        let mut mem = Memory::new(true);
        mem.write(BANK_RAM, BORDER_COLOR, 0x11);
        mem.write(BANK_CPU, BORDER_COLOR, 0x02);
        assert_eq!(0x11, mem.peek(BANK_RAM, BORDER_COLOR));
        assert_eq!(0x02, mem.peek(BANK_CPU, BORDER_COLOR));
    }

    #[test]
    fn read_acknowledges_icr() {
        let mut mem = Memory::new(true);
        mem.write(BANK_CPU, CIA1_ICR, 0x81);
        assert_eq!(0x81, mem.peek(BANK_CPU, CIA1_ICR));
        assert_eq!(0x81, mem.read(BANK_CPU, CIA1_ICR));
        assert_eq!(0x00, mem.peek(BANK_CPU, CIA1_ICR));
    }

    #[test]
    fn load_wraps_around() {
        let mut mem = Memory::new(false);
        mem.load(&[1, 2, 3], 0xffff);
        assert_eq!(1, mem.peek(BANK_CPU, 0xffff));
        assert_eq!(2, mem.peek(BANK_CPU, 0x0000));
    }

    #[test]
    fn drive_memory_has_no_io() {
        let mut mem = Memory::new(false);
        mem.write(BANK_CPU, 0xd020, 0x05);
        assert_eq!(0x05, mem.ram()[0xd020]);
        assert!(mem.io().is_none());
    }
}

// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::path::Path;

use super::{MemSpace, MemoryOp};

/// Register exposed by a memspace cpu.
#[derive(Clone, Copy, Debug)]
pub struct RegisterDesc {
    pub id: u8,
    pub name: &'static str,
    /// Register width in bits.
    pub bits: u8,
    /// Pseudo register that only renders the flags of another register.
    pub is_flags: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct BankDesc {
    pub id: u16,
    pub name: &'static str,
}

/// Raster position of the video chip driving a memspace.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LineCycle {
    pub line: u32,
    pub cycle: u32,
    pub half_cycle: Option<u32>,
}

/// Monitor access to a single memspace: its cpu registers and memory banks.
pub trait MonitorInterface {
    // -- Registers
    fn registers(&self) -> &[RegisterDesc];
    fn get_register(&self, id: u8) -> Option<u16>;
    fn set_register(&mut self, id: u8, value: u16) -> Result<(), String>;
    fn get_pc(&self) -> u16;
    fn find_register(&self, name: &str) -> Option<RegisterDesc> {
        self.registers()
            .iter()
            .find(|reg| reg.name.eq_ignore_ascii_case(name))
            .cloned()
    }
    // -- Memory
    fn banks(&self) -> &[BankDesc];
    fn is_valid_bank(&self, bank: u16) -> bool {
        self.banks().iter().any(|desc| desc.id == bank)
    }
    fn find_bank(&self, name: &str) -> Option<u16> {
        self.banks()
            .iter()
            .find(|desc| desc.name.eq_ignore_ascii_case(name))
            .map(|desc| desc.id)
    }
    /// Read byte without triggering any I/O side effects.
    fn peek(&self, bank: u16, address: u16) -> u8;
    /// Read byte the way the cpu would, including I/O side effects.
    fn read(&mut self, bank: u16, address: u16) -> u8;
    fn write(&mut self, bank: u16, address: u16, value: u8);
    // -- Video
    fn get_line_cycle(&self) -> Option<LineCycle> {
        None
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResetKind {
    Soft,
    Hard,
    Drive(MemSpace),
}

impl ResetKind {
    pub fn from_wire(value: u8) -> Option<ResetKind> {
        match value {
            0 => Some(ResetKind::Soft),
            1 => Some(ResetKind::Hard),
            8 => Some(ResetKind::Drive(MemSpace::Disk8)),
            9 => Some(ResetKind::Drive(MemSpace::Disk9)),
            10 => Some(ResetKind::Drive(MemSpace::Disk10)),
            11 => Some(ResetKind::Drive(MemSpace::Disk11)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResourceValue {
    Str(String),
    Int(u32),
}

/// Indexed frame buffer snapshot of the display.
pub struct Screenshot {
    pub debug_width: u16,
    pub debug_height: u16,
    pub offset_x: u16,
    pub offset_y: u16,
    pub inner_width: u16,
    pub inner_height: u16,
    /// One palette index per pixel, `debug_width * debug_height` entries.
    pub pixels: Vec<u8>,
    /// Palette colors as 0xRRGGBB.
    pub palette: Vec<u32>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StepOutcome {
    /// A checkpoint asked execution to stop.
    pub stop: bool,
    pub jam: bool,
}

/// Receiver of memory accesses performed by the cpu while stepping.
pub trait CheckpointHook {
    /// Whether any checkpoint watches `op` in `space`. Gates the
    /// per-access trap so unwatched accesses cost nothing.
    fn is_watching(&self, space: MemSpace, op: MemoryOp) -> bool;
    /// Called on each watched access; returns true if execution must stop.
    fn check(
        &mut self,
        machine: &mut dyn Machine,
        space: MemSpace,
        address: u16,
        last_pc: u16,
        op: MemoryOp,
    ) -> bool;
}

/// The emulated machine as seen by the monitor.
pub trait Machine {
    fn interface(&self, space: MemSpace) -> Option<&dyn MonitorInterface>;
    fn interface_mut(&mut self, space: MemSpace) -> Option<&mut dyn MonitorInterface>;
    fn is_cpu_jam(&self) -> bool;
    /// Decode and execute one instruction of the computer cpu, reporting
    /// memory accesses to the hook. When an exec checkpoint stops, the
    /// instruction is left for the next step, which does not trap it again.
    fn step(&mut self, hook: &mut dyn CheckpointHook) -> StepOutcome;
    fn reset(&mut self, kind: ResetKind);
    // -- Peripherals
    fn keyboard_feed(&mut self, text: &str);
    fn autostart(&mut self, path: &Path, file_index: u16, run: bool) -> Result<(), String>;
    fn screenshot(&self, use_vic: bool) -> Result<Screenshot, String>;
    // -- Snapshots
    fn write_snapshot(&self, path: &Path, save_roms: bool, save_disks: bool)
        -> Result<(), String>;
    fn read_snapshot(&mut self, path: &Path) -> Result<(), String>;
    // -- Resources
    fn resource(&self, name: &str) -> Option<ResourceValue>;
    fn set_resource(&mut self, name: &str, value: ResourceValue) -> Result<(), String>;
}

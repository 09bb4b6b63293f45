// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#![cfg_attr(feature = "cargo-clippy", allow(clippy::cast_lossless))]

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

use crate::factory::{
    BankDesc, CheckpointHook, LineCycle, Machine, MemSpace, MemoryOp, MonitorInterface,
    RegisterDesc, ResetKind, ResourceValue, Screenshot, StepOutcome,
};

use super::cpu::{
    Flag, Opcode, Registers, BRK_VECTOR, REGISTERS, REG_CYC, REG_LIN, RESET_VECTOR,
    STACK_BASE,
};
use super::memory::{
    Memory, BACKGROUND_COLOR, BANK_CPU, BORDER_COLOR, COLOR_RAM, COMPUTER_BANKS, DRIVE_BANKS,
    IO_BASE,
};
use super::snapshot::{Snapshot, SpaceImage};

// Design:
//   Sandbox is a minimal C64 with one attached disk drive. The computer cpu executes from
//   its own memspace and reports every exec, load and store access to the checkpoint hook.
//   The drive cpu is idle but its registers and memory can be inspected and changed.

const CYCLES_PER_LINE: u64 = 63;
const LINES_PER_FRAME: u64 = 312;

const BASIC_START: u16 = 0x0801;
const BASIC_VARTAB: u16 = 0x002d;
const KEYBOARD_BUFFER: u16 = 0x0277;
const KEYBOARD_COUNT: u16 = 0x00c6;
const KEYBOARD_BUFFER_SIZE: usize = 10;
const SCREEN_RAM: u16 = 0x0400;

const KERNAL_IDLE: u16 = 0xe000;
const DRIVE_IDLE: u16 = 0xeaa0;

const DEBUG_WIDTH: u16 = 384;
const DEBUG_HEIGHT: u16 = 272;
const INNER_OFFSET_X: u16 = 32;
const INNER_OFFSET_Y: u16 = 36;
const INNER_WIDTH: u16 = 320;
const INNER_HEIGHT: u16 = 200;

static PALETTE: [u32; 16] = [
    0x000000, 0xffffff, 0x68372b, 0x70a4b2, 0x6f3d86, 0x588d43, 0x352879, 0xb8c76f, 0x6f4f25,
    0x433900, 0x9a6759, 0x444444, 0x6c6c6c, 0x9ad284, 0x6c5eb5, 0x959595,
];

pub struct CpuSpace {
    regs: Registers,
    mem: Memory,
    banks: &'static [BankDesc],
    registers: &'static [RegisterDesc],
    idle: u16,
    cycles: u64,
    has_video: bool,
}

impl CpuSpace {
    fn new(has_video: bool, idle: u16) -> Self {
        let mut space = Self {
            regs: Registers::default(),
            mem: Memory::new(has_video),
            banks: if has_video { &COMPUTER_BANKS[..] } else { &DRIVE_BANKS[..] },
            registers: if has_video { &REGISTERS[..] } else { &REGISTERS[..7] },
            idle,
            cycles: 0,
            has_video,
        };
        space.install_rom();
        space.reset();
        space
    }

    fn install_rom(&mut self) {
        let idle = self.idle;
        self.mem.load(&[0x4c, idle as u8, (idle >> 8) as u8], idle);
        self.mem.load(&[idle as u8, (idle >> 8) as u8], RESET_VECTOR);
        self.mem.load(&[idle as u8, (idle >> 8) as u8], BRK_VECTOR);
    }

    fn reset(&mut self) {
        let pc = self.read_vector(RESET_VECTOR);
        self.regs.reset(pc);
        self.cycles = 0;
    }

    fn read_vector(&self, address: u16) -> u16 {
        let lo = self.mem.peek(BANK_CPU, address) as u16;
        let hi = self.mem.peek(BANK_CPU, address.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn image(&self, space: MemSpace) -> SpaceImage {
        SpaceImage {
            space,
            regs: self.regs,
            cycles: self.cycles,
            ram: self.mem.ram().to_vec(),
            io: self.mem.io().map(|io| io.to_vec()),
        }
    }

    fn restore(&mut self, image: &SpaceImage) {
        self.regs = image.regs;
        self.cycles = image.cycles;
        self.mem.restore(&image.ram, image.io.as_ref().map(|io| io.as_slice()));
    }
}

impl MonitorInterface for CpuSpace {
    fn registers(&self) -> &[RegisterDesc] {
        self.registers
    }

    fn get_register(&self, id: u8) -> Option<u16> {
        match (id, self.get_line_cycle()) {
            (REG_LIN, Some(pos)) => Some(pos.line as u16),
            (REG_CYC, Some(pos)) => Some(pos.cycle as u16),
            _ => self.regs.get(id),
        }
    }

    fn set_register(&mut self, id: u8, value: u16) -> Result<(), String> {
        self.regs.set(id, value)
    }

    fn get_pc(&self) -> u16 {
        self.regs.pc
    }

    fn banks(&self) -> &[BankDesc] {
        self.banks
    }

    fn peek(&self, bank: u16, address: u16) -> u8 {
        self.mem.peek(bank, address)
    }

    fn read(&mut self, bank: u16, address: u16) -> u8 {
        self.mem.read(bank, address)
    }

    fn write(&mut self, bank: u16, address: u16, value: u8) {
        self.mem.write(bank, address, value)
    }

    fn get_line_cycle(&self) -> Option<LineCycle> {
        if self.has_video {
            Some(LineCycle {
                line: ((self.cycles / CYCLES_PER_LINE) % LINES_PER_FRAME) as u32,
                cycle: (self.cycles % CYCLES_PER_LINE) as u32,
                half_cycle: None,
            })
        } else {
            None
        }
    }
}

pub struct Sandbox {
    computer: CpuSpace,
    drive8: Option<CpuSpace>,
    jammed: bool,
    stopped_at: Option<u16>,
    keyboard: VecDeque<u8>,
    resources: HashMap<String, ResourceValue>,
}

impl Default for Sandbox {
    fn default() -> Self {
        Sandbox::new(true)
    }
}

impl Sandbox {
    pub fn new(with_drive: bool) -> Self {
        let mut resources = HashMap::new();
        resources.insert("WarpMode".to_string(), ResourceValue::Int(0));
        resources.insert("Drive8Type".to_string(), ResourceValue::Int(1541));
        resources.insert("VICIIBorderMode".to_string(), ResourceValue::Int(0));
        resources.insert(
            "KernalName".to_string(),
            ResourceValue::Str("kernal".to_string()),
        );
        Self {
            computer: CpuSpace::new(true, KERNAL_IDLE),
            drive8: if with_drive {
                Some(CpuSpace::new(false, DRIVE_IDLE))
            } else {
                None
            },
            jammed: false,
            stopped_at: None,
            keyboard: VecDeque::new(),
            resources,
        }
    }

    pub fn load(&mut self, data: &[u8], address: u16) {
        self.computer.mem.load(data, address);
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.computer.regs.pc = pc;
        self.jammed = false;
    }

    fn feed_keyboard(&mut self) {
        if self.keyboard.is_empty() || self.computer.mem.peek(BANK_CPU, KEYBOARD_COUNT) != 0 {
            return;
        }
        let mut count = 0;
        while count < KEYBOARD_BUFFER_SIZE {
            match self.keyboard.pop_front() {
                Some(key) => {
                    self.computer
                        .mem
                        .write(BANK_CPU, KEYBOARD_BUFFER + count as u16, key);
                    count += 1;
                }
                None => break,
            }
        }
        self.computer.mem.write(BANK_CPU, KEYBOARD_COUNT, count as u8);
    }

    fn fetch_word(&self, address: u16) -> u16 {
        let lo = self.computer.mem.peek(BANK_CPU, address) as u16;
        let hi = self.computer.mem.peek(BANK_CPU, address.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn trap(
        &mut self,
        hook: &mut dyn CheckpointHook,
        address: u16,
        last_pc: u16,
        op: MemoryOp,
    ) -> bool {
        if hook.is_watching(MemSpace::Computer, op) {
            hook.check(self, MemSpace::Computer, address, last_pc, op)
        } else {
            false
        }
    }

    fn load_byte(&mut self, hook: &mut dyn CheckpointHook, address: u16, pc: u16) -> (u8, bool) {
        let stop = self.trap(hook, address, pc, MemoryOp::Load);
        (self.computer.mem.read(BANK_CPU, address), stop)
    }

    fn store_byte(
        &mut self,
        hook: &mut dyn CheckpointHook,
        address: u16,
        value: u8,
        pc: u16,
    ) -> bool {
        let stop = self.trap(hook, address, pc, MemoryOp::Store);
        self.computer.mem.write(BANK_CPU, address, value);
        stop
    }

    fn push(&mut self, hook: &mut dyn CheckpointHook, value: u8, pc: u16) -> bool {
        let address = STACK_BASE | self.computer.regs.sp as u16;
        self.computer.regs.sp = self.computer.regs.sp.wrapping_sub(1);
        self.store_byte(hook, address, value, pc)
    }

    fn pull(&mut self, hook: &mut dyn CheckpointHook, pc: u16) -> (u8, bool) {
        self.computer.regs.sp = self.computer.regs.sp.wrapping_add(1);
        let address = STACK_BASE | self.computer.regs.sp as u16;
        self.load_byte(hook, address, pc)
    }

    fn execute(&mut self, hook: &mut dyn CheckpointHook, opcode: Opcode, pc: u16) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        let operand = self.fetch_word(pc.wrapping_add(1));
        match opcode {
            Opcode::Brk => {
                let ret = pc.wrapping_add(2);
                outcome.stop |= self.push(hook, (ret >> 8) as u8, pc);
                outcome.stop |= self.push(hook, ret as u8, pc);
                let p = self.computer.regs.p | (1 << Flag::Break as u8);
                outcome.stop |= self.push(hook, p, pc);
                self.computer.regs.set_flag(Flag::IntDisable, true);
                self.computer.regs.pc = self.computer.read_vector(BRK_VECTOR);
            }
            Opcode::Inx => {
                let x = self.computer.regs.x.wrapping_add(1);
                self.computer.regs.x = x;
                self.computer.regs.update_nz(x);
                self.computer.regs.pc = pc.wrapping_add(1);
            }
            Opcode::Jam => {
                warn!(target: "machine", "CPU JAM at ${:04x}", pc);
                self.jammed = true;
                outcome.jam = true;
            }
            Opcode::Jmp => {
                self.computer.regs.pc = operand;
            }
            Opcode::Jsr => {
                let ret = pc.wrapping_add(2);
                outcome.stop |= self.push(hook, (ret >> 8) as u8, pc);
                outcome.stop |= self.push(hook, ret as u8, pc);
                self.computer.regs.pc = operand;
            }
            Opcode::LdaAbs => {
                let (value, stop) = self.load_byte(hook, operand, pc);
                outcome.stop |= stop;
                self.computer.regs.a = value;
                self.computer.regs.update_nz(value);
                self.computer.regs.pc = pc.wrapping_add(3);
            }
            Opcode::LdaImm => {
                let value = operand as u8;
                self.computer.regs.a = value;
                self.computer.regs.update_nz(value);
                self.computer.regs.pc = pc.wrapping_add(2);
            }
            Opcode::Nop => {
                self.computer.regs.pc = pc.wrapping_add(1);
            }
            Opcode::Rti => {
                let (p, stop_p) = self.pull(hook, pc);
                let (lo, stop_lo) = self.pull(hook, pc);
                let (hi, stop_hi) = self.pull(hook, pc);
                outcome.stop |= stop_p || stop_lo || stop_hi;
                self.computer.regs.p = p;
                self.computer.regs.pc = ((hi as u16) << 8) | lo as u16;
            }
            Opcode::Rts => {
                let (lo, stop_lo) = self.pull(hook, pc);
                let (hi, stop_hi) = self.pull(hook, pc);
                outcome.stop |= stop_lo || stop_hi;
                self.computer.regs.pc = (((hi as u16) << 8) | lo as u16).wrapping_add(1);
            }
            Opcode::StaAbs => {
                let value = self.computer.regs.a;
                outcome.stop |= self.store_byte(hook, operand, value, pc);
                self.computer.regs.pc = pc.wrapping_add(3);
            }
        }
        self.computer.cycles += opcode.cycles();
        outcome
    }
}

impl Machine for Sandbox {
    fn interface(&self, space: MemSpace) -> Option<&dyn MonitorInterface> {
        match space {
            MemSpace::Computer => Some(&self.computer),
            MemSpace::Disk8 => self.drive8.as_ref().map(|d| d as &dyn MonitorInterface),
            _ => None,
        }
    }

    fn interface_mut(&mut self, space: MemSpace) -> Option<&mut dyn MonitorInterface> {
        match space {
            MemSpace::Computer => Some(&mut self.computer),
            MemSpace::Disk8 => self
                .drive8
                .as_mut()
                .map(|d| d as &mut dyn MonitorInterface),
            _ => None,
        }
    }

    fn is_cpu_jam(&self) -> bool {
        self.jammed
    }

    fn step(&mut self, hook: &mut dyn CheckpointHook) -> StepOutcome {
        if self.jammed {
            return StepOutcome {
                stop: false,
                jam: true,
            };
        }
        self.feed_keyboard();
        let pc = self.computer.regs.pc;
        let resumed = self.stopped_at.take() == Some(pc);
        if !resumed && self.trap(hook, pc, pc, MemoryOp::Exec) {
            self.stopped_at = Some(pc);
            return StepOutcome {
                stop: true,
                jam: false,
            };
        }
        let opcode = self.computer.mem.peek(BANK_CPU, pc);
        match Opcode::decode(opcode) {
            Some(decoded) => self.execute(hook, decoded, pc),
            None => {
                debug!(target: "machine", "Unsupported opcode {:02x} at ${:04x}", opcode, pc);
                self.computer.regs.pc = pc.wrapping_add(1);
                self.computer.cycles += 2;
                StepOutcome::default()
            }
        }
    }

    fn reset(&mut self, kind: ResetKind) {
        info!(target: "machine", "Reset {:?}", kind);
        match kind {
            ResetKind::Soft => {
                self.computer.reset();
                self.jammed = false;
            }
            ResetKind::Hard => {
                self.computer.mem.clear();
                self.computer.install_rom();
                self.computer.reset();
                self.keyboard.clear();
                self.jammed = false;
            }
            ResetKind::Drive(MemSpace::Disk8) if self.drive8.is_some() => {
                if let Some(drive) = self.drive8.as_mut() {
                    drive.reset();
                }
            }
            ResetKind::Drive(space) => {
                warn!(target: "machine", "Drive {} is not attached", space);
            }
        }
    }

    fn keyboard_feed(&mut self, text: &str) {
        for c in text.chars() {
            match c {
                '\n' | '\r' => self.keyboard.push_back(0x0d),
                c if c.is_ascii() => self.keyboard.push_back(c.to_ascii_uppercase() as u8),
                _ => debug!(target: "machine", "Skipping unmapped key {}", c),
            }
        }
    }

    fn autostart(&mut self, path: &Path, file_index: u16, run: bool) -> Result<(), String> {
        if file_index > 1 {
            return Err(format!("Invalid file index {}", file_index));
        }
        let data =
            fs::read(path).map_err(|err| format!("Cannot read {}: {}", path.display(), err))?;
        if data.len() < 2 {
            return Err(format!("Invalid program file {}", path.display()));
        }
        let address = LittleEndian::read_u16(&data[0..2]);
        let body = &data[2..];
        self.computer.mem.load(body, address);
        let end = address.wrapping_add(body.len() as u16);
        self.computer.mem.load(&[end as u8, (end >> 8) as u8], BASIC_VARTAB);
        info!(
            target: "machine",
            "Loaded {} at ${:04x}-${:04x}",
            path.display(),
            address,
            end
        );
        if run {
            if address == BASIC_START {
                self.keyboard_feed("RUN\r");
            } else {
                self.set_pc(address);
            }
        }
        Ok(())
    }

    fn screenshot(&self, use_vic: bool) -> Result<Screenshot, String> {
        if !use_vic {
            debug!(target: "machine", "Only the VIC canvas is available");
        }
        let io = self
            .computer
            .mem
            .io()
            .ok_or_else(|| "Video chip not available".to_string())?;
        let border = io[(BORDER_COLOR - IO_BASE) as usize] & 0x0f;
        let background = io[(BACKGROUND_COLOR - IO_BASE) as usize] & 0x0f;
        let width = DEBUG_WIDTH as usize;
        let mut pixels = vec![border; width * DEBUG_HEIGHT as usize];
        for row in 0..25usize {
            for col in 0..40usize {
                let index = row * 40 + col;
                let code = self.computer.mem.ram()[SCREEN_RAM as usize + index];
                let color = io[(COLOR_RAM - IO_BASE) as usize + index] & 0x0f;
                for y in 0..8usize {
                    for x in 0..8usize {
                        let lit = code != 0x20 && x > 0 && x < 7 && y > 0 && y < 7;
                        let px = INNER_OFFSET_X as usize + col * 8 + x;
                        let py = INNER_OFFSET_Y as usize + row * 8 + y;
                        pixels[py * width + px] = if lit { color } else { background };
                    }
                }
            }
        }
        Ok(Screenshot {
            debug_width: DEBUG_WIDTH,
            debug_height: DEBUG_HEIGHT,
            offset_x: INNER_OFFSET_X,
            offset_y: INNER_OFFSET_Y,
            inner_width: INNER_WIDTH,
            inner_height: INNER_HEIGHT,
            pixels,
            palette: PALETTE.to_vec(),
        })
    }

    fn write_snapshot(
        &self,
        path: &Path,
        save_roms: bool,
        save_disks: bool,
    ) -> Result<(), String> {
        let mut spaces = vec![self.computer.image(MemSpace::Computer)];
        if save_disks {
            if let Some(drive) = self.drive8.as_ref() {
                spaces.push(drive.image(MemSpace::Disk8));
            }
        }
        let snapshot = Snapshot {
            roms: save_roms,
            spaces,
        };
        snapshot
            .save(path)
            .map_err(|err| format!("Cannot write snapshot {}: {}", path.display(), err))?;
        info!(target: "machine", "Saved snapshot {}", path.display());
        Ok(())
    }

    fn read_snapshot(&mut self, path: &Path) -> Result<(), String> {
        let snapshot = Snapshot::load(path)
            .map_err(|err| format!("Cannot read snapshot {}: {}", path.display(), err))?;
        for image in &snapshot.spaces {
            match image.space {
                MemSpace::Computer => self.computer.restore(image),
                MemSpace::Disk8 if self.drive8.is_some() => {
                    if let Some(drive) = self.drive8.as_mut() {
                        drive.restore(image);
                    }
                }
                space => warn!(target: "machine", "Skipping snapshot of drive {}", space),
            }
        }
        self.jammed = false;
        info!(target: "machine", "Loaded snapshot {}", path.display());
        Ok(())
    }

    fn resource(&self, name: &str) -> Option<ResourceValue> {
        self.resources.get(name).cloned()
    }

    fn set_resource(&mut self, name: &str, value: ResourceValue) -> Result<(), String> {
        let current = self
            .resources
            .get_mut(name)
            .ok_or_else(|| format!("Invalid resource {}", name))?;
        let new_value = match (&*current, value) {
            (ResourceValue::Int(_), ResourceValue::Int(v)) => ResourceValue::Int(v),
            (ResourceValue::Int(_), ResourceValue::Str(s)) => {
                let v = s
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| format!("Invalid value {} for resource {}", s, name))?;
                ResourceValue::Int(v)
            }
            (ResourceValue::Str(_), ResourceValue::Str(s)) => ResourceValue::Str(s),
            (ResourceValue::Str(_), ResourceValue::Int(_)) => {
                return Err(format!("Resource {} is not an integer", name));
            }
        };
        *current = new_value;
        Ok(())
    }
}

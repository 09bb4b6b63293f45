// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#![cfg_attr(feature = "cargo-clippy", allow(clippy::cast_lossless))]

use std::mem;

use mon64_core::{
    CheckpointHook, Machine, MemSpace, MemoryOp, MonitorInterface, OpMask, StepOutcome,
};

use crate::checkpoint::{self, CheckpointManager, EvalContext};
use crate::command::{Address, CheckpointKind, Cmd, CommandParser};
use crate::condition::ParseError;

// Design:
//   Monitor is the single owner of checkpoint state. It is installed as the checkpoint
//   hook while the machine runs, and it executes textual commands both for the console
//   and for checkpoint commands and the binary protocol. Text produced by commands is
//   collected in the output channel and drained by the host.

const OPCODE_JSR: u8 = 0x20;
const OPCODE_RTI: u8 = 0x40;
const OPCODE_RTS: u8 = 0x60;

const MEM_DUMP_LENGTH: u16 = 0x60;
const MEM_DUMP_WIDTH: usize = 16;
const STEP_LIMIT: u32 = 0x0010_0000;

/// Text sink for monitor messages.
#[derive(Default)]
pub struct Output {
    buffer: String,
}

impl Output {
    pub fn print(&mut self, text: &str) {
        for line in text.lines() {
            info!(target: "monitor", "{}", line);
        }
        self.buffer.push_str(text);
    }

    pub fn take(&mut self) -> String {
        mem::replace(&mut self.buffer, String::new())
    }
}

pub struct Monitor {
    // Dependencies
    checkpoints: CheckpointManager,
    parser: CommandParser,
    // I/O
    output: Output,
    // Runtime State
    default_space: MemSpace,
    exit_requested: bool,
    quit_requested: bool,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            checkpoints: CheckpointManager::new(),
            parser: CommandParser::new(),
            output: Output::default(),
            default_space: MemSpace::Computer,
            exit_requested: false,
            quit_requested: false,
        }
    }
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn checkpoints_mut(&mut self) -> &mut CheckpointManager {
        &mut self.checkpoints
    }

    pub fn take_output(&mut self) -> String {
        self.output.take()
    }

    // -- Session

    /// Start a monitor session, dropping exit requests raised while running.
    pub fn enter(&mut self) {
        self.exit_requested = false;
        self.checkpoints.take_exit_request();
    }

    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    pub fn request_quit(&mut self) {
        self.quit_requested = true;
        self.exit_requested = true;
    }

    pub fn is_exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn is_quit_requested(&self) -> bool {
        self.quit_requested
    }

    // -- Commands

    /// Parse and execute one command line as if typed by the user.
    pub fn execute_line(&mut self, machine: &mut dyn Machine, line: &str) -> Result<(), String> {
        let line = line.trim_end();
        if line.trim().is_empty() {
            return Ok(());
        }
        debug!(target: "monitor", "Executing {}", line);
        let command = match self.parser.parse(line) {
            Ok(command) => command,
            Err(error) => {
                self.print_parse_error(line, &error);
                return Err(error.message);
            }
        };
        if let Err(error) = self.execute(machine, command) {
            self.output.print(&format!("{}\n", error));
        }
        if self.checkpoints.take_exit_request() {
            self.exit_requested = true;
        }
        Ok(())
    }

    fn execute(&mut self, machine: &mut dyn Machine, command: Cmd) -> Result<(), String> {
        match command {
            // Checkpoint
            Cmd::Checkpoint {
                kind,
                ops,
                range,
                condition,
            } => match range {
                Some((start, end)) => {
                    let ops = ops.unwrap_or_else(|| default_ops(kind));
                    let space = start.space.unwrap_or(self.default_space);
                    let stop = kind != CheckpointKind::Trace;
                    let id = self.checkpoints.add(
                        space,
                        start.address,
                        end,
                        stop,
                        ops,
                        false,
                        true,
                    )?;
                    self.checkpoints.set_condition(id, condition)?;
                    self.print_checkpoint(id);
                    Ok(())
                }
                None => self.cmd_list(),
            },
            Cmd::Until(Some(address)) => {
                let space = address.space.unwrap_or(self.default_space);
                let id = self.checkpoints.add(
                    space,
                    address.address,
                    None,
                    true,
                    MemoryOp::Exec.into(),
                    true,
                    true,
                )?;
                self.print_checkpoint(id);
                Ok(())
            }
            Cmd::Until(None) => self.cmd_list(),
            Cmd::Condition(id, condition) => {
                let text = condition.to_string();
                self.checkpoints.set_condition(id, Some(condition))?;
                self.output
                    .print(&format!("Setting checkpoint {} condition to: {}\n", id, text));
                Ok(())
            }
            Cmd::Command(id, command) => {
                let text = format!("Setting checkpoint {} command to: {}\n", id, command);
                self.checkpoints.set_command(id, Some(command))?;
                self.output.print(&text);
                Ok(())
            }
            Cmd::Delete(Some(id)) => self.checkpoints.delete(id),
            Cmd::Delete(None) => {
                self.checkpoints.delete_all();
                self.output.print("Deleting all checkpoints\n");
                Ok(())
            }
            Cmd::Disable(id) => self.cmd_switch(id, false),
            Cmd::Enable(id) => self.cmd_switch(id, true),
            Cmd::Ignore(id, count) => {
                self.checkpoints.set_ignore_count(id, count)?;
                self.output.print(&format!(
                    "Will ignore the next {} hits of checkpoint #{}\n",
                    count, id
                ));
                Ok(())
            }
            // Machine
            Cmd::Memory(start, end) => self.cmd_memory(&*machine, start, end),
            Cmd::RegRead => self.cmd_reg_read(&*machine),
            Cmd::RegWrite(ops) => self.cmd_reg_write(machine, ops),
            // Monitor
            Cmd::Exit => {
                self.exit_requested = true;
                Ok(())
            }
            Cmd::Quit => {
                self.request_quit();
                Ok(())
            }
            Cmd::Radix(Some(radix)) => {
                self.parser.set_radix(radix);
                self.output.print(&format!("Set radix to {}\n", radix));
                Ok(())
            }
            Cmd::Radix(None) => {
                let text = format!("Current radix is {}\n", self.parser.get_radix());
                self.output.print(&text);
                Ok(())
            }
        }
    }

    fn cmd_list(&mut self) -> Result<(), String> {
        let text = self.checkpoints.print_all();
        self.output.print(&text);
        Ok(())
    }

    fn cmd_switch(&mut self, id: Option<u32>, enabled: bool) -> Result<(), String> {
        self.checkpoints.switch_enabled(id, enabled)?;
        if id.is_none() {
            self.output.print(&format!(
                "Set all checkpoints to state: {}\n",
                if enabled { "enabled" } else { "disabled" }
            ));
        }
        Ok(())
    }

    fn cmd_memory(
        &mut self,
        machine: &dyn Machine,
        start: Option<Address>,
        end: Option<u16>,
    ) -> Result<(), String> {
        let space = start
            .and_then(|address| address.space)
            .unwrap_or(self.default_space);
        let iface = interface(machine, space)?;
        let start = start.map_or_else(|| iface.get_pc(), |address| address.address);
        let end = end.unwrap_or_else(|| start.saturating_add(MEM_DUMP_LENGTH - 1));
        if start > end {
            return Err(format!("Invalid range ${:04x}-${:04x}", start, end));
        }
        let mut buffer = String::new();
        let mut address = start as u32;
        while address <= end as u32 {
            buffer.push_str(format!(">{}:{:04x} ", space, address).as_str());
            for i in 0..MEM_DUMP_WIDTH as u32 {
                if address + i > end as u32 {
                    break;
                }
                if i % 4 == 0 {
                    buffer.push(' ');
                }
                let value = iface.peek(0, (address + i) as u16);
                buffer.push_str(format!("{:02x} ", value).as_str());
            }
            buffer.push('\n');
            address += MEM_DUMP_WIDTH as u32;
        }
        self.output.print(&buffer);
        Ok(())
    }

    fn cmd_reg_read(&mut self, machine: &dyn Machine) -> Result<(), String> {
        let iface = interface(machine, self.default_space)?;
        let text = format_registers(iface);
        self.output.print(&text);
        Ok(())
    }

    fn cmd_reg_write(
        &mut self,
        machine: &mut dyn Machine,
        ops: Vec<(String, u16)>,
    ) -> Result<(), String> {
        let space = self.default_space;
        let iface = machine
            .interface_mut(space)
            .ok_or_else(|| format!("Memspace {} not available", space))?;
        let mut updates = Vec::with_capacity(ops.len());
        for (name, value) in ops {
            let reg = iface
                .find_register(&name)
                .ok_or_else(|| format!("Invalid register {}", name))?;
            updates.push((reg.id, value));
        }
        for (id, value) in updates {
            iface.set_register(id, value)?;
        }
        self.cmd_reg_read(&*machine)
    }

    // -- Execution

    /// Execute `count` instructions, stopping early on a checkpoint or jam.
    pub fn step(&mut self, machine: &mut dyn Machine, count: u16) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        for _ in 0..count {
            outcome = machine.step(self);
            if outcome.stop || outcome.jam {
                break;
            }
        }
        outcome
    }

    /// Like `step` but subroutine calls are executed as a single instruction.
    pub fn next(&mut self, machine: &mut dyn Machine, count: u16) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        for _ in 0..count {
            let pc = computer_pc(&*machine);
            if peek_opcode(&*machine, pc) == OPCODE_JSR {
                let target = pc.wrapping_add(3);
                outcome = self.run_while(machine, |machine| computer_pc(machine) != target);
            } else {
                outcome = machine.step(self);
            }
            if outcome.stop || outcome.jam {
                break;
            }
        }
        outcome
    }

    /// Execute until the current subroutine returns, including the return itself.
    pub fn execute_until_return(&mut self, machine: &mut dyn Machine) -> StepOutcome {
        let outcome = self.run_while(machine, |machine| {
            let opcode = peek_opcode(machine, computer_pc(machine));
            opcode != OPCODE_RTS && opcode != OPCODE_RTI
        });
        if outcome.stop || outcome.jam {
            outcome
        } else {
            machine.step(self)
        }
    }

    fn run_while<F>(&mut self, machine: &mut dyn Machine, predicate: F) -> StepOutcome
    where
        F: Fn(&dyn Machine) -> bool,
    {
        let mut steps = 0;
        while predicate(&*machine) {
            let outcome = machine.step(self);
            if outcome.stop || outcome.jam {
                return outcome;
            }
            steps += 1;
            if steps == STEP_LIMIT {
                warn!(target: "monitor", "Giving up after {} instructions", STEP_LIMIT);
                break;
            }
        }
        StepOutcome::default()
    }

    // -- Helpers

    fn print_checkpoint(&mut self, id: u32) {
        if let Some(cp) = self.checkpoints.find(id) {
            let text = format!("{}\n", cp);
            self.output.print(&text);
        }
    }

    fn print_parse_error(&mut self, line: &str, error: &ParseError) {
        let text = format!(
            "  {}\n  {}^\nERROR -- {}\n",
            line,
            " ".repeat(error.position),
            error.message
        );
        self.output.print(&text);
    }
}

impl EvalContext for Monitor {
    fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    fn checkpoints_mut(&mut self) -> &mut CheckpointManager {
        &mut self.checkpoints
    }

    fn print(&mut self, text: &str) {
        self.output.print(text);
    }

    fn run_command(&mut self, machine: &mut dyn Machine, command: &str) {
        if let Err(error) = self.execute_line(machine, command) {
            debug!(target: "monitor", "Checkpoint command failed: {}", error);
        }
    }
}

impl CheckpointHook for Monitor {
    fn is_watching(&self, space: MemSpace, op: MemoryOp) -> bool {
        self.checkpoints.is_watching(space, op)
    }

    fn check(
        &mut self,
        machine: &mut dyn Machine,
        space: MemSpace,
        address: u16,
        last_pc: u16,
        op: MemoryOp,
    ) -> bool {
        checkpoint::check(self, machine, space, address, last_pc, op)
    }
}

fn default_ops(kind: CheckpointKind) -> OpMask {
    match kind {
        CheckpointKind::Break | CheckpointKind::Trace => MemoryOp::Exec.into(),
        CheckpointKind::Watch => MemoryOp::Load | MemoryOp::Store,
    }
}

fn interface(machine: &dyn Machine, space: MemSpace) -> Result<&dyn MonitorInterface, String> {
    machine
        .interface(space)
        .ok_or_else(|| format!("Memspace {} not available", space))
}

fn computer_pc(machine: &dyn Machine) -> u16 {
    machine
        .interface(MemSpace::Computer)
        .map_or(0, |iface| iface.get_pc())
}

fn peek_opcode(machine: &dyn Machine, pc: u16) -> u8 {
    machine
        .interface(MemSpace::Computer)
        .map_or(0, |iface| iface.peek(0, pc))
}

fn format_registers(iface: &dyn MonitorInterface) -> String {
    let mut names = String::new();
    let mut values = String::new();
    for reg in iface.registers() {
        let value = iface.get_register(reg.id).unwrap_or(0);
        let text = if reg.is_flags {
            format!("{:08b}", value as u8)
        } else if reg.bits > 8 {
            format!("{:04x}", value)
        } else {
            format!("{:02x}", value)
        };
        let width = text.len().max(reg.name.len());
        names.push_str(format!(" {:>width$}", reg.name, width = width).as_str());
        values.push_str(format!(" {:>width$}", text, width = width).as_str());
    }
    format!("{}\n{}\n", names, values)
}

// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use mon64_core::{MemSpace, MemoryOp, OpMask};

use crate::condition::Condition;

use super::{BreakpointType, Checkpoint, CheckpointId, CheckpointStore};

pub struct CheckpointManager {
    store: CheckpointStore,
    next_id: CheckpointId,
    last_stop: Option<CheckpointId>,
    exit_requested: bool,
}

impl Default for CheckpointManager {
    fn default() -> Self {
        Self {
            store: CheckpointStore::new(),
            next_id: 1,
            last_stop: None,
            exit_requested: false,
        }
    }
}

impl CheckpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg_attr(feature = "cargo-clippy", allow(clippy::too_many_arguments))]
    pub fn add(
        &mut self,
        space: MemSpace,
        start: u16,
        end: Option<u16>,
        stop: bool,
        ops: OpMask,
        temporary: bool,
        enabled: bool,
    ) -> Result<CheckpointId, String> {
        let end = end.unwrap_or(start);
        if start > end {
            return Err(format!("Invalid range ${:04x}-${:04x}", start, end));
        }
        if ops.is_empty() {
            return Err("Checkpoint needs at least one of load, store or exec".to_string());
        }
        let id = self.next_id;
        self.next_id += 1;
        let checkpoint = Checkpoint {
            id,
            space,
            start,
            end,
            hit_count: 0,
            ignore_count: 0,
            condition: None,
            command: None,
            stop,
            enabled,
            ops,
            temporary,
        };
        info!(target: "checkpoint", "Added {}", checkpoint);
        self.store.add(checkpoint);
        if temporary {
            self.exit_requested = true;
        }
        Ok(id)
    }

    pub fn delete(&mut self, id: CheckpointId) -> Result<(), String> {
        match self.store.delete(id) {
            Some(_) => {
                if self.last_stop == Some(id) {
                    self.last_stop = None;
                }
                Ok(())
            }
            None => Err(not_valid(id)),
        }
    }

    pub fn delete_all(&mut self) {
        self.store.clear();
        self.last_stop = None;
    }

    /// Enable or disable one checkpoint, or all of them when `id` is `None`.
    pub fn switch_enabled(&mut self, id: Option<CheckpointId>, enabled: bool) -> Result<(), String> {
        match id {
            Some(id) => {
                let cp = self.find_mut(id)?;
                cp.enabled = enabled;
            }
            None => {
                for cp in self.store.iter_mut() {
                    cp.enabled = enabled;
                }
            }
        }
        Ok(())
    }

    pub fn set_ignore_count(&mut self, id: CheckpointId, count: u32) -> Result<(), String> {
        let cp = self.find_mut(id)?;
        cp.ignore_count = count;
        Ok(())
    }

    pub fn set_condition(
        &mut self,
        id: CheckpointId,
        condition: Option<Condition>,
    ) -> Result<(), String> {
        let cp = self.find_mut(id)?;
        cp.condition = condition;
        Ok(())
    }

    pub fn set_command(&mut self, id: CheckpointId, command: Option<String>) -> Result<(), String> {
        let cp = self.find_mut(id)?;
        cp.command = command;
        Ok(())
    }

    pub fn find(&self, id: CheckpointId) -> Option<&Checkpoint> {
        self.store.find_by_id(id)
    }

    pub fn find_mut(&mut self, id: CheckpointId) -> Result<&mut Checkpoint, String> {
        self.store.find_by_id_mut(id).ok_or_else(|| not_valid(id))
    }

    /// All checkpoints in id order.
    pub fn list(&self) -> Vec<&Checkpoint> {
        self.store.iter().collect()
    }

    pub fn print_all(&self) -> String {
        if self.store.is_empty() {
            return "No breakpoints are set\n".to_string();
        }
        let mut buffer = String::new();
        for cp in self.store.iter() {
            buffer.push_str(format!("{}\n", cp).as_str());
        }
        buffer
    }

    pub fn is_watching(&self, space: MemSpace, op: MemoryOp) -> bool {
        self.store.is_active(space, op)
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    // -- Address based breakpoints

    pub fn is(&self, space: MemSpace, address: u16) -> BreakpointType {
        let exec = self
            .exec_at(space, address)
            .and_then(|id| self.store.find_by_id(id));
        match exec {
            Some(cp) if cp.enabled => BreakpointType::Active,
            Some(_) => BreakpointType::Inactive,
            None => BreakpointType::None,
        }
    }

    /// Enable the exec breakpoint at an address, creating it if needed.
    pub fn set_at(&mut self, space: MemSpace, address: u16) -> Result<CheckpointId, String> {
        match self.exec_at(space, address) {
            Some(id) => {
                self.switch_enabled(Some(id), true)?;
                Ok(id)
            }
            None => self.add(space, address, None, true, MemoryOp::Exec.into(), false, true),
        }
    }

    pub fn unset_at(&mut self, space: MemSpace, address: u16) -> Result<(), String> {
        let id = self
            .exec_at(space, address)
            .ok_or_else(|| format!("No breakpoint at ${:04x}", address))?;
        self.delete(id)
    }

    pub fn enable_at(&mut self, space: MemSpace, address: u16) -> Result<(), String> {
        self.switch_enabled_at(space, address, true)
    }

    pub fn disable_at(&mut self, space: MemSpace, address: u16) -> Result<(), String> {
        self.switch_enabled_at(space, address, false)
    }

    fn switch_enabled_at(
        &mut self,
        space: MemSpace,
        address: u16,
        enabled: bool,
    ) -> Result<(), String> {
        let id = self
            .exec_at(space, address)
            .ok_or_else(|| format!("No breakpoint at ${:04x}", address))?;
        self.switch_enabled(Some(id), enabled)
    }

    /// First exec checkpoint whose range covers the address.
    fn exec_at(&self, space: MemSpace, address: u16) -> Option<CheckpointId> {
        self.store.find_first_covering(space, MemoryOp::Exec, address)
    }

    // -- Monitor state

    pub fn note_stop(&mut self, id: CheckpointId) {
        self.last_stop = Some(id);
    }

    /// Checkpoint that most recently stopped execution, if it still exists.
    pub fn last_stop(&self) -> Option<&Checkpoint> {
        self.last_stop.and_then(|id| self.store.find_by_id(id))
    }

    pub fn take_last_stop(&mut self) -> Option<CheckpointId> {
        self.last_stop.take()
    }

    pub fn take_exit_request(&mut self) -> bool {
        let requested = self.exit_requested;
        self.exit_requested = false;
        requested
    }
}

fn not_valid(id: CheckpointId) -> String {
    format!("#{} not a valid checkpoint", id)
}

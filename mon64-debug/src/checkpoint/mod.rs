// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

mod evaluator;
mod manager;
mod store;

use std::fmt;

use mon64_core::{MemSpace, MemoryOp, OpMask};

use crate::condition::Condition;

pub use self::evaluator::{check, EvalContext};
pub use self::manager::CheckpointManager;
pub use self::store::CheckpointStore;

pub type CheckpointId = u32;

/// Breakpoint, watchpoint or tracepoint over an inclusive address range.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub space: MemSpace,
    pub start: u16,
    pub end: u16,
    pub hit_count: u32,
    pub ignore_count: u32,
    pub condition: Option<Condition>,
    pub command: Option<String>,
    pub stop: bool,
    pub enabled: bool,
    pub ops: OpMask,
    pub temporary: bool,
}

impl Checkpoint {
    pub fn covers(&self, address: u16) -> bool {
        self.start <= address && address <= self.end
    }

    fn kind(&self) -> &'static str {
        if !self.stop {
            "TRACE"
        } else if self.ops.contains(MemoryOp::Load) || self.ops.contains(MemoryOp::Store) {
            "WATCH"
        } else if self.temporary {
            "UNTIL"
        } else {
            "BREAK"
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}  {}:${:04x}", self.kind(), self.id, self.space, self.start)?;
        if self.end != self.start {
            write!(f, "-${:04x}", self.end)?;
        }
        write!(f, "  ({}", if self.stop { "Stop on" } else { "Trace" })?;
        for op in self.ops.ops() {
            write!(f, " {}", op)?;
        }
        write!(f, ")")?;
        if !self.enabled {
            write!(f, " disabled")?;
        }
        if let Some(ref condition) = self.condition {
            write!(f, "\n\tCondition: {}", condition)?;
        }
        if let Some(ref command) = self.command {
            write!(f, "\n\tCommand: {}", command)?;
        }
        Ok(())
    }
}

/// Exec checkpoint state of an address, as shown by a disassembly view.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BreakpointType {
    None,
    Inactive,
    Active,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_checkpoint(stop: bool, ops: OpMask, temporary: bool) -> Checkpoint {
        Checkpoint {
            id: 3,
            space: MemSpace::Computer,
            start: 0x1000,
            end: 0x1000,
            hit_count: 0,
            ignore_count: 0,
            condition: None,
            command: None,
            stop,
            enabled: true,
            ops,
            temporary,
        }
    }

    #[test]
    fn covers_inclusive_range() {
        let mut cp = new_checkpoint(true, MemoryOp::Exec.into(), false);
        cp.end = 0x1010;
        assert!(!cp.covers(0x0fff));
        assert!(cp.covers(0x1000));
        assert!(cp.covers(0x1010));
        assert!(!cp.covers(0x1011));
    }

    #[test]
    fn display_breakpoint() {
        let cp = new_checkpoint(true, MemoryOp::Exec.into(), false);
        assert_eq!("BREAK: 3  C:$1000  (Stop on exec)", cp.to_string());
    }

    #[test]
    fn display_watchpoint_range() {
        let mut cp = new_checkpoint(true, MemoryOp::Load | MemoryOp::Store, false);
        cp.end = 0x10ff;
        cp.enabled = false;
        assert_eq!(
            "WATCH: 3  C:$1000-$10ff  (Stop on load store) disabled",
            cp.to_string()
        );
    }

    #[test]
    fn display_trace_with_condition_and_command() {
        let mut cp = new_checkpoint(false, MemoryOp::Exec.into(), false);
        cp.condition = Some(Condition::parse("A == 1", 16).unwrap());
        cp.command = Some("r".to_string());
        assert_eq!(
            "TRACE: 3  C:$1000  (Trace exec)\n\tCondition: A == $01\n\tCommand: r",
            cp.to_string()
        );
    }

    #[test]
    fn display_until() {
        let cp = new_checkpoint(true, MemoryOp::Exec.into(), true);
        assert!(cp.to_string().starts_with("UNTIL: 3"));
    }
}

// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.


use mon64_core::{Machine, MemSpace, MemoryOp};

use super::CheckpointManager;

// Design:
//   The ids covering an access are collected before any side effect runs. Each id is then
//   looked up again because a checkpoint command may delete or change checkpoints, and a
//   temporary checkpoint deletes itself once hit. Every matching checkpoint is processed
//   even after one of them has asked to stop.

/// What the evaluator needs from its owner while processing a hit.
pub trait EvalContext {
    fn checkpoints(&self) -> &CheckpointManager;
    fn checkpoints_mut(&mut self) -> &mut CheckpointManager;
    fn print(&mut self, text: &str);
    /// Execute a checkpoint command as if typed by the user.
    fn run_command(&mut self, machine: &mut dyn Machine, command: &str);
}

pub fn check(
    ctx: &mut dyn EvalContext,
    machine: &mut dyn Machine,
    space: MemSpace,
    address: u16,
    last_pc: u16,
    op: MemoryOp,
) -> bool {
    let ids = ctx.checkpoints().store().candidates(space, op, address);
    let mut must_stop = false;
    for id in ids {
        let passed = match ctx.checkpoints().find(id) {
            Some(cp) if cp.enabled => cp
                .condition
                .as_ref()
                .map_or(true, |cond| cond.eval(&*machine, space)),
            _ => false,
        };
        if !passed {
            continue;
        }
        let (stop, command, temporary) = match ctx.checkpoints_mut().find_mut(id) {
            Ok(cp) => {
                if cp.ignore_count > 0 {
                    cp.ignore_count -= 1;
                    continue;
                }
                cp.hit_count += 1;
                (cp.stop, cp.command.clone(), cp.temporary)
            }
            Err(_) => continue,
        };
        debug!(
            target: "checkpoint",
            "Hit #{} {} ${:04x} from ${:04x}", id, op, address, last_pc
        );
        if stop {
            must_stop = true;
            ctx.checkpoints_mut().note_stop(id);
        }
        let line = hit_line(&*machine, space, id, stop, op, address);
        ctx.print(&line);
        if let Some(command) = command {
            ctx.print(&format!("Executing: {}\n", command));
            ctx.run_command(machine, &command);
        }
        if temporary {
            if let Err(error) = ctx.checkpoints_mut().delete(id) {
                debug!(target: "checkpoint", "{}", error);
            }
        }
    }
    must_stop
}

fn hit_line(
    machine: &dyn Machine,
    space: MemSpace,
    id: u32,
    stop: bool,
    op: MemoryOp,
    address: u16,
) -> String {
    let mut line = format!(
        "#{} ({} {:>5} {:04x})",
        id,
        if stop { "Stop on" } else { "Trace" },
        op.to_string(),
        address
    );
    let pos = machine
        .interface(space)
        .and_then(|iface| iface.get_line_cycle());
    if let Some(pos) = pos {
        line.push_str(&format!(" {:03} {:03}", pos.line, pos.cycle));
        if let Some(half) = pos.half_cycle {
            line.push_str(&format!(" {:02}", half));
        }
    }
    line.push('\n');
    line
}

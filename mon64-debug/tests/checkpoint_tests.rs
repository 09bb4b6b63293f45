// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use mon64_core::system::Sandbox;
use mon64_core::{CheckpointHook, Machine, MemSpace, MemoryOp, MonitorInterface, OpMask};
use mon64_debug::{BreakpointType, CheckpointManager, Monitor};

fn exec_mask() -> OpMask {
    MemoryOp::Exec.into()
}

fn check(monitor: &mut Monitor, machine: &mut Sandbox, address: u16, op: MemoryOp) -> bool {
    monitor.check(machine, MemSpace::Computer, address, address, op)
}

#[test]
fn lists_stay_sorted_by_start() {
    let mut manager = CheckpointManager::new();
    let mut seed = 0x1234u32;
    for _ in 0..64 {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
        let start = (seed >> 8) as u16;
        let len = (seed & 0x0f) as u16;
        manager
            .add(
                MemSpace::Computer,
                start,
                Some(start.saturating_add(len)),
                true,
                MemoryOp::Load | MemoryOp::Exec,
                false,
                true,
            )
            .unwrap();
        for op in &[MemoryOp::Load, MemoryOp::Exec] {
            let starts = manager
                .store()
                .list(MemSpace::Computer, *op)
                .iter()
                .map(|id| manager.find(*id).unwrap().start)
                .collect::<Vec<_>>();
            let mut sorted = starts.clone();
            sorted.sort();
            assert_eq!(sorted, starts);
        }
    }
    assert!(manager
        .store()
        .list(MemSpace::Computer, MemoryOp::Store)
        .is_empty());
}

#[test]
fn ids_are_never_reused() {
    let mut manager = CheckpointManager::new();
    let first = manager
        .add(MemSpace::Computer, 0x1000, None, true, exec_mask(), false, true)
        .unwrap();
    let second = manager
        .add(MemSpace::Disk8, 0x1000, None, true, exec_mask(), false, true)
        .unwrap();
    manager.delete(second).unwrap();
    manager.delete_all();
    let third = manager
        .add(MemSpace::Computer, 0x1000, None, true, exec_mask(), false, true)
        .unwrap();
    assert_eq!(1, first);
    assert_eq!(2, second);
    assert_eq!(3, third);
}

#[test]
fn load_store_checkpoint_is_in_both_lists() {
    let mut manager = CheckpointManager::new();
    let id = manager
        .add(
            MemSpace::Computer,
            0x2000,
            Some(0x2010),
            false,
            MemoryOp::Load | MemoryOp::Store,
            false,
            true,
        )
        .unwrap();
    let store = manager.store();
    assert_eq!(&[id], store.list(MemSpace::Computer, MemoryOp::Load));
    assert_eq!(&[id], store.list(MemSpace::Computer, MemoryOp::Store));
    assert!(store.list(MemSpace::Computer, MemoryOp::Exec).is_empty());
    manager.delete(id).unwrap();
    let store = manager.store();
    assert!(store.find_by_id(id).is_none());
    assert!(store.list(MemSpace::Computer, MemoryOp::Load).is_empty());
    assert!(store.list(MemSpace::Computer, MemoryOp::Store).is_empty());
    assert!(store.candidates(MemSpace::Computer, MemoryOp::Load, 0x2008).is_empty());
}

#[test]
fn ignore_count_skips_first_hits() {
    let mut monitor = Monitor::new();
    let mut machine = Sandbox::new(false);
    let id = monitor
        .checkpoints_mut()
        .add(MemSpace::Computer, 0x1000, None, true, exec_mask(), false, true)
        .unwrap();
    monitor.checkpoints_mut().set_ignore_count(id, 3).unwrap();
    for _ in 0..3 {
        assert!(!check(&mut monitor, &mut machine, 0x1000, MemoryOp::Exec));
        assert_eq!(0, monitor.checkpoints().find(id).unwrap().hit_count);
    }
    assert!(check(&mut monitor, &mut machine, 0x1000, MemoryOp::Exec));
    assert_eq!(1, monitor.checkpoints().find(id).unwrap().hit_count);
}

#[test]
fn temporary_checkpoint_fires_once() {
    let mut monitor = Monitor::new();
    let mut machine = Sandbox::new(false);
    monitor.execute_line(&mut machine, "until 1003").unwrap();
    monitor
        .execute_line(&mut machine, "command 1 \"r x = 7\"")
        .unwrap();
    monitor.take_output();
    assert!(check(&mut monitor, &mut machine, 0x1003, MemoryOp::Exec));
    assert!(monitor.checkpoints().find(1).is_none());
    assert!(!check(&mut monitor, &mut machine, 0x1003, MemoryOp::Exec));
    let output = monitor.take_output();
    assert_eq!(1, output.matches("Executing: r x = 7").count());
    let iface = machine.interface(MemSpace::Computer).unwrap();
    assert_eq!(Some(7), iface.get_register(1));
}

#[test]
fn single_address_breakpoint_scenario() {
    let mut monitor = Monitor::new();
    let mut machine = Sandbox::new(false);
    let id = monitor
        .checkpoints_mut()
        .add(MemSpace::Computer, 0x1000, Some(0x1000), true, exec_mask(), false, true)
        .unwrap();
    assert_eq!(1, id);
    assert!(check(&mut monitor, &mut machine, 0x1000, MemoryOp::Exec));
    assert_eq!(1, monitor.checkpoints().find(id).unwrap().hit_count);
    assert!(!check(&mut monitor, &mut machine, 0x1001, MemoryOp::Exec));
    assert_eq!(1, monitor.checkpoints().find(id).unwrap().hit_count);
}

#[test]
fn delete_watchpoint_scenario() {
    let mut manager = CheckpointManager::new();
    manager
        .add(MemSpace::Computer, 0x1000, None, true, exec_mask(), false, true)
        .unwrap();
    let id = manager
        .add(
            MemSpace::Computer,
            0x2000,
            Some(0x2010),
            false,
            MemoryOp::Load | MemoryOp::Store,
            false,
            true,
        )
        .unwrap();
    assert_eq!(2, id);
    manager.delete(2).unwrap();
    for op in &[MemoryOp::Load, MemoryOp::Store] {
        assert!(!manager
            .store()
            .list(MemSpace::Computer, *op)
            .contains(&2));
    }
    assert!(manager.delete(2).is_err());
}

#[test]
fn overlapping_ranges_all_fire() {
    let mut monitor = Monitor::new();
    let mut machine = Sandbox::new(false);
    monitor.execute_line(&mut machine, "trace 0f00 10ff").unwrap();
    monitor.execute_line(&mut machine, "break 1000").unwrap();
    monitor.execute_line(&mut machine, "trace 1000 1010").unwrap();
    monitor.take_output();
    assert!(check(&mut monitor, &mut machine, 0x1000, MemoryOp::Exec));
    for id in 1..=3 {
        assert_eq!(1, monitor.checkpoints().find(id).unwrap().hit_count);
    }
    let output = monitor.take_output();
    assert_eq!(3, output.lines().count());
}

#[test]
fn disabled_checkpoints_are_skipped() {
    let mut monitor = Monitor::new();
    let mut machine = Sandbox::new(false);
    monitor.execute_line(&mut machine, "break 1000").unwrap();
    monitor.execute_line(&mut machine, "disable 1").unwrap();
    assert!(!check(&mut monitor, &mut machine, 0x1000, MemoryOp::Exec));
    monitor.execute_line(&mut machine, "enable").unwrap();
    assert!(check(&mut monitor, &mut machine, 0x1000, MemoryOp::Exec));
}

#[test]
fn condition_gates_hits() {
    let mut monitor = Monitor::new();
    let mut machine = Sandbox::new(false);
    monitor.execute_line(&mut machine, "break 1000 if X == 3").unwrap();
    assert!(!check(&mut monitor, &mut machine, 0x1000, MemoryOp::Exec));
    assert_eq!(0, monitor.checkpoints().find(1).unwrap().hit_count);
    monitor.execute_line(&mut machine, "r x = 3").unwrap();
    assert!(check(&mut monitor, &mut machine, 0x1000, MemoryOp::Exec));
}

#[test]
fn memspaces_are_independent() {
    let mut monitor = Monitor::new();
    let mut machine = Sandbox::new(true);
    monitor.execute_line(&mut machine, "break 8:1000").unwrap();
    assert!(!check(&mut monitor, &mut machine, 0x1000, MemoryOp::Exec));
    assert!(monitor.check(&mut machine, MemSpace::Disk8, 0x1000, 0x1000, MemoryOp::Exec));
}

#[test]
fn address_classification() {
    let mut manager = CheckpointManager::new();
    assert_eq!(BreakpointType::None, manager.is(MemSpace::Computer, 0x1000));
    manager.set_at(MemSpace::Computer, 0x1000).unwrap();
    assert_eq!(BreakpointType::Active, manager.is(MemSpace::Computer, 0x1000));
    manager.disable_at(MemSpace::Computer, 0x1000).unwrap();
    assert_eq!(BreakpointType::Inactive, manager.is(MemSpace::Computer, 0x1000));
    manager.unset_at(MemSpace::Computer, 0x1000).unwrap();
    assert_eq!(BreakpointType::None, manager.is(MemSpace::Computer, 0x1000));
    assert!(manager.enable_at(MemSpace::Computer, 0x1000).is_err());
}

#[test]
fn address_ops_find_covering_range() {
    let mut manager = CheckpointManager::new();
    let id = manager
        .add(MemSpace::Computer, 0x1000, Some(0x10ff), true, exec_mask(), false, true)
        .unwrap();
    assert_eq!(BreakpointType::Active, manager.is(MemSpace::Computer, 0x1080));
    assert_eq!(BreakpointType::None, manager.is(MemSpace::Computer, 0x1100));
    manager.disable_at(MemSpace::Computer, 0x10ff).unwrap();
    assert_eq!(BreakpointType::Inactive, manager.is(MemSpace::Computer, 0x1080));
    assert_eq!(id, manager.set_at(MemSpace::Computer, 0x1080).unwrap());
    assert_eq!(1, manager.list().len());
    assert!(manager.find(id).unwrap().enabled);
    manager.unset_at(MemSpace::Computer, 0x1080).unwrap();
    assert!(manager.find(id).is_none());
}

#[test]
fn running_program_stops_at_breakpoint() {
    let mut monitor = Monitor::new();
    let mut machine = Sandbox::new(false);
    // INX x5; NOP
    machine.load(&[0xe8, 0xe8, 0xe8, 0xe8, 0xe8, 0xea], 0x1000);
    machine.set_pc(0x1000);
    monitor.execute_line(&mut machine, "break 1005").unwrap();
    let outcome = monitor.step(&mut machine, 100);
    assert!(outcome.stop);
    let iface = machine.interface(MemSpace::Computer).unwrap();
    assert_eq!(0x1005, iface.get_pc());
    assert_eq!(Some(5), iface.get_register(1));
}

// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::collections::BTreeMap;

use mon64_core::{MemSpace, MemoryOp};

use super::{Checkpoint, CheckpointId};

// Design:
//   Checkpoints live in an arena keyed by id. Each memspace keeps one list of ids per
//   operation, ordered by start address, so a lookup can stop at the first checkpoint
//   that starts past the accessed address. A checkpoint watching several operations
//   appears in several lists but is stored once.

const OPS: usize = 3;
const SPACES: usize = 5;

#[derive(Default)]
pub struct CheckpointStore {
    checkpoints: BTreeMap<CheckpointId, Checkpoint>,
    lists: [[Vec<CheckpointId>; OPS]; SPACES],
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the checkpoint and link it into the list of every op it watches.
    pub fn add(&mut self, checkpoint: Checkpoint) {
        let id = checkpoint.id;
        let space = checkpoint.space;
        let ops = checkpoint.ops;
        self.checkpoints.insert(id, checkpoint);
        for op in ops.ops() {
            self.insert(space, op, id);
        }
    }

    /// Unlink the checkpoint from all lists and drop it.
    pub fn delete(&mut self, id: CheckpointId) -> Option<Checkpoint> {
        let (space, ops) = match self.checkpoints.get(&id) {
            Some(cp) => (cp.space, cp.ops),
            None => return None,
        };
        for op in ops.ops() {
            self.remove(space, op, id);
        }
        self.checkpoints.remove(&id)
    }

    pub fn clear(&mut self) {
        self.checkpoints.clear();
        for lists in self.lists.iter_mut() {
            for list in lists.iter_mut() {
                list.clear();
            }
        }
    }

    /// Ordered insertion by start address, after any entries with an equal start.
    pub fn insert(&mut self, space: MemSpace, op: MemoryOp, id: CheckpointId) {
        let start = match self.checkpoints.get(&id) {
            Some(cp) => cp.start,
            None => {
                error!(target: "checkpoint", "Cannot link unknown checkpoint #{}", id);
                return;
            }
        };
        let checkpoints = &self.checkpoints;
        let list = &mut self.lists[space.index()][op.index()];
        let pos = list
            .iter()
            .position(|other| checkpoints.get(other).map_or(false, |cp| cp.start > start))
            .unwrap_or_else(|| list.len());
        list.insert(pos, id);
    }

    pub fn remove(&mut self, space: MemSpace, op: MemoryOp, id: CheckpointId) -> bool {
        let list = &mut self.lists[space.index()][op.index()];
        match list.iter().position(|other| *other == id) {
            Some(pos) => {
                list.remove(pos);
                true
            }
            None => {
                error!(
                    target: "checkpoint",
                    "Checkpoint #{} not found in {} {} list", id, space, op
                );
                false
            }
        }
    }

    pub fn find_first_covering(
        &self,
        space: MemSpace,
        op: MemoryOp,
        address: u16,
    ) -> Option<CheckpointId> {
        self.covering(space, op, address).next()
    }

    /// All checkpoints whose range covers the address, in list order.
    pub fn candidates(&self, space: MemSpace, op: MemoryOp, address: u16) -> Vec<CheckpointId> {
        self.covering(space, op, address).collect()
    }

    pub fn find_by_id(&self, id: CheckpointId) -> Option<&Checkpoint> {
        self.checkpoints.get(&id)
    }

    pub fn find_by_id_mut(&mut self, id: CheckpointId) -> Option<&mut Checkpoint> {
        self.checkpoints.get_mut(&id)
    }

    pub fn list(&self, space: MemSpace, op: MemoryOp) -> &[CheckpointId] {
        &self.lists[space.index()][op.index()]
    }

    pub fn is_active(&self, space: MemSpace, op: MemoryOp) -> bool {
        !self.lists[space.index()][op.index()].is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Checkpoint> {
        self.checkpoints.values_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    fn covering<'a>(
        &'a self,
        space: MemSpace,
        op: MemoryOp,
        address: u16,
    ) -> impl Iterator<Item = CheckpointId> + 'a {
        let checkpoints = &self.checkpoints;
        self.lists[space.index()][op.index()]
            .iter()
            .filter_map(move |id| checkpoints.get(id))
            .take_while(move |cp| cp.start <= address)
            .filter(move |cp| cp.covers(address))
            .map(|cp| cp.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mon64_core::OpMask;

    fn new_checkpoint(id: CheckpointId, start: u16, end: u16, ops: OpMask) -> Checkpoint {
        Checkpoint {
            id,
            space: MemSpace::Computer,
            start,
            end,
            hit_count: 0,
            ignore_count: 0,
            condition: None,
            command: None,
            stop: true,
            enabled: true,
            ops,
            temporary: false,
        }
    }

    fn setup_store(ranges: &[(u16, u16)]) -> CheckpointStore {
        let mut store = CheckpointStore::new();
        for (i, &(start, end)) in ranges.iter().enumerate() {
            store.add(new_checkpoint(i as u32 + 1, start, end, MemoryOp::Exec.into()));
        }
        store
    }

    #[test]
    fn list_sorted_by_start() {
        let store = setup_store(&[(0x3000, 0x3000), (0x1000, 0x1000), (0x2000, 0x2000)]);
        assert_eq!(&[2, 3, 1], store.list(MemSpace::Computer, MemoryOp::Exec));
    }

    #[test]
    fn equal_starts_keep_insertion_order() {
        let store = setup_store(&[(0x1000, 0x1000), (0x1000, 0x10ff), (0x0800, 0x0800)]);
        assert_eq!(&[3, 1, 2], store.list(MemSpace::Computer, MemoryOp::Exec));
    }

    #[test]
    fn find_first_covering() {
        let store = setup_store(&[(0x1000, 0x10ff), (0x1080, 0x1080)]);
        assert_eq!(
            Some(1),
            store.find_first_covering(MemSpace::Computer, MemoryOp::Exec, 0x1080)
        );
        assert_eq!(
            None,
            store.find_first_covering(MemSpace::Computer, MemoryOp::Exec, 0x1100)
        );
        assert_eq!(
            None,
            store.find_first_covering(MemSpace::Computer, MemoryOp::Load, 0x1000)
        );
    }

    #[test]
    fn candidates_skip_ranges_ending_before_address() {
        let store = setup_store(&[(0x0100, 0x0200), (0x0100, 0x1000), (0x0900, 0x0a00)]);
        assert_eq!(
            vec![2],
            store.candidates(MemSpace::Computer, MemoryOp::Exec, 0x0500)
        );
        assert_eq!(
            vec![2, 3],
            store.candidates(MemSpace::Computer, MemoryOp::Exec, 0x0950)
        );
    }

    #[test]
    fn multi_op_checkpoint_in_each_list() {
        let mut store = CheckpointStore::new();
        store.add(new_checkpoint(
            1,
            0x2000,
            0x2000,
            MemoryOp::Load | MemoryOp::Store,
        ));
        assert!(store.is_active(MemSpace::Computer, MemoryOp::Load));
        assert!(store.is_active(MemSpace::Computer, MemoryOp::Store));
        assert!(!store.is_active(MemSpace::Computer, MemoryOp::Exec));
        assert!(!store.is_active(MemSpace::Disk8, MemoryOp::Load));
        assert!(store.delete(1).is_some());
        assert!(!store.is_active(MemSpace::Computer, MemoryOp::Load));
        assert!(!store.is_active(MemSpace::Computer, MemoryOp::Store));
        assert!(store.is_empty());
    }

    #[test]
    fn remove_missing_returns_false() {
        let mut store = setup_store(&[(0x1000, 0x1000)]);
        assert!(!store.remove(MemSpace::Computer, MemoryOp::Exec, 7));
        assert!(!store.remove(MemSpace::Computer, MemoryOp::Load, 1));
        assert_eq!(1, store.list(MemSpace::Computer, MemoryOp::Exec).len());
    }

    #[test]
    fn delete_missing() {
        let mut store = setup_store(&[(0x1000, 0x1000)]);
        assert!(store.delete(2).is_none());
        assert_eq!(1, store.len());
    }

    #[test]
    fn find_by_id() {
        let store = setup_store(&[(0x1000, 0x1000), (0x2000, 0x2000)]);
        assert_eq!(0x2000, store.find_by_id(2).unwrap().start);
        assert!(store.find_by_id(3).is_none());
    }
}

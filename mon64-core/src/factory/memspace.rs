// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::fmt;
use std::ops::BitOr;

use bit_field::BitField;

/// Addressable memory domain seen by the monitor: the computer itself
/// and up to four disk drives on the serial bus.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum MemSpace {
    Computer,
    Disk8,
    Disk9,
    Disk10,
    Disk11,
}

impl MemSpace {
    pub const ALL: [MemSpace; 5] = [
        MemSpace::Computer,
        MemSpace::Disk8,
        MemSpace::Disk9,
        MemSpace::Disk10,
        MemSpace::Disk11,
    ];

    pub fn from_wire(value: u8) -> Option<MemSpace> {
        match value {
            0 => Some(MemSpace::Computer),
            1 => Some(MemSpace::Disk8),
            2 => Some(MemSpace::Disk9),
            3 => Some(MemSpace::Disk10),
            4 => Some(MemSpace::Disk11),
            _ => None,
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<MemSpace> {
        match prefix.to_lowercase().as_str() {
            "c" => Some(MemSpace::Computer),
            "8" => Some(MemSpace::Disk8),
            "9" => Some(MemSpace::Disk9),
            "10" => Some(MemSpace::Disk10),
            "11" => Some(MemSpace::Disk11),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn to_wire(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for MemSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MemSpace::Computer => write!(f, "C"),
            MemSpace::Disk8 => write!(f, "8"),
            MemSpace::Disk9 => write!(f, "9"),
            MemSpace::Disk10 => write!(f, "10"),
            MemSpace::Disk11 => write!(f, "11"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemoryOp {
    Load,
    Store,
    Exec,
}

impl MemoryOp {
    pub const ALL: [MemoryOp; 3] = [MemoryOp::Load, MemoryOp::Store, MemoryOp::Exec];

    pub fn bit(self) -> usize {
        match self {
            MemoryOp::Load => 0,
            MemoryOp::Store => 1,
            MemoryOp::Exec => 2,
        }
    }

    pub fn index(self) -> usize {
        self.bit()
    }
}

impl fmt::Display for MemoryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MemoryOp::Load => write!(f, "load"),
            MemoryOp::Store => write!(f, "store"),
            MemoryOp::Exec => write!(f, "exec"),
        }
    }
}

/// Set of memory operations a checkpoint watches. Bit layout matches the
/// binary protocol: bit 0 load, bit 1 store, bit 2 exec.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OpMask(u8);

impl OpMask {
    pub fn new(load: bool, store: bool, exec: bool) -> Self {
        let mut mask = OpMask(0);
        mask.set(MemoryOp::Load, load);
        mask.set(MemoryOp::Store, store);
        mask.set(MemoryOp::Exec, exec);
        mask
    }

    pub fn from_bits(bits: u8) -> Self {
        OpMask(bits.get_bits(0..3))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, op: MemoryOp) -> bool {
        self.0.get_bit(op.bit())
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn ops(self) -> impl Iterator<Item = MemoryOp> {
        let all: &'static [MemoryOp; 3] = &MemoryOp::ALL;
        all.iter().cloned().filter(move |op| self.contains(*op))
    }

    pub fn set(&mut self, op: MemoryOp, value: bool) {
        self.0.set_bit(op.bit(), value);
    }
}

impl From<MemoryOp> for OpMask {
    fn from(op: MemoryOp) -> Self {
        let mut mask = OpMask(0);
        mask.set(op, true);
        mask
    }
}

impl BitOr<MemoryOp> for OpMask {
    type Output = OpMask;

    fn bitor(self, op: MemoryOp) -> OpMask {
        let mut mask = self;
        mask.set(op, true);
        mask
    }
}

impl BitOr for MemoryOp {
    type Output = OpMask;

    fn bitor(self, other: MemoryOp) -> OpMask {
        OpMask::from(self) | other
    }
}

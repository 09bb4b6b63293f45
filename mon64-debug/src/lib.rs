// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#[macro_use]
extern crate log;

pub mod binary;
pub mod checkpoint;
mod command;
pub mod condition;
mod monitor;

pub use self::checkpoint::{BreakpointType, Checkpoint, CheckpointId, CheckpointManager};
pub use self::command::{Address, CheckpointKind, Cmd, CommandParser};
pub use self::condition::{Condition, ParseError};
pub use self::monitor::Monitor;

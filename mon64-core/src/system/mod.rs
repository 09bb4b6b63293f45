// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

pub mod cpu;
pub mod memory;
mod sandbox;
mod snapshot;

pub use self::sandbox::Sandbox;
pub use self::snapshot::{Snapshot, SpaceImage};

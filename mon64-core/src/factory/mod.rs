// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

mod memspace;
mod types;

pub use self::memspace::{MemSpace, MemoryOp, OpMask};
pub use self::types::*;

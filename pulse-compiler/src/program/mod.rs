// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Compiled programs: the base register compiler, the flux extension and the
//! two executable program kinds.

pub mod base;
pub mod flux;
pub mod sequence;
pub mod sweep;

pub use base::{BaseProgram, IqResults};
pub use flux::BiasMode;
pub use sequence::ExecutePulseSequence;
pub use sweep::ExecuteSweeps;

use crate::Result;

/// Lifecycle callbacks through which a program is compiled: channel and
/// sweep setup first, then the timed element loop.
pub trait TProcProgram {
    fn initialize(&mut self) -> Result<()>;
    fn body(&mut self) -> Result<()>;
}

pub(crate) fn compile<P: TProcProgram + ?Sized>(program: &mut P) -> Result<()> {
    program.initialize()?;
    program.body()
}

// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Compiler for tProcessor-based quantum-control experiments.
//!
//! Takes a platform-independent experiment description — timed
//! drive/flux/readout elements, optional parameter sweeps, per-qubit flux
//! bias — and turns it into the register-level configuration calls of the
//! [`tproc`] runtime: generator/readout declarations, waveform tables,
//! pulse registers, sweep registers and acquisition collection.

pub mod elements;
pub mod experiment;
pub mod mux;
pub mod program;
pub mod waveforms;

pub use elements::{Element, ElementKind, Measurement, Pulse, Shape, StartTime};
pub use experiment::{Config, OperationCode, Parameter, Qubit, Sweeper, reversed_sweepers};
pub use program::base::IqResults;
pub use program::sequence::ExecutePulseSequence;
pub use program::sweep::ExecuteSweeps;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Unsupported shape/type combination. A programmer error, fatal at
    /// compile time and never retried.
    #[error("unsupported configuration: {0}")]
    Configuration(String),
    /// Illegal sweep construction or amplitude overflow, detected before any
    /// register write.
    #[error("invalid experiment: {0}")]
    Validation(String),
    /// Synthesized samples or compiled output exceed a hardware limit.
    #[error("hardware resource exceeded: {0}")]
    Resource(String),
    /// Failure reported by the external runtime, propagated unchanged.
    #[error(transparent)]
    Runtime(#[from] tproc::Error),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Error::Resource(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

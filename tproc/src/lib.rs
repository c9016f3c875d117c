// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Abstraction over the tProcessor timing/waveform runtime.
//!
//! The compiler never talks to firmware directly: every register write,
//! waveform upload and trigger goes through the [`TProcessor`] trait. The
//! runtime owns the instruction set, clock arithmetic and ADC decimation;
//! this crate only models the primitive surface the compiler consumes.

pub mod mock;
pub mod registers;
pub mod sweep;

pub use registers::{
    MuxConfig, OutputSource, PulseProfile, PulseRegisters, RegisterField, RegisterHandle,
    StandbyLevel,
};
pub use sweep::{SweepDimension, SweepRange};

/// Index of a DAC or ADC channel on the firmware.
pub type Channel = u8;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("generator channel {0} is not available on this firmware")]
    UnknownGenerator(Channel),
    #[error("readout channel {0} is not available on this firmware")]
    UnknownReadout(Channel),
    #[error("register file exhausted on generator {0}")]
    RegisterFileExhausted(Channel),
    #[error("sweep ranges must share one point count")]
    MismatchedSweepRanges,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Primitive API of the tProcessor runtime.
///
/// One handle is exclusively borrowed per compiled program; the program
/// declares channels, uploads waveform tables, programs pulse registers and
/// finally runs the acquisition. Unit helpers are part of the trait because
/// cycle and register arithmetic is channel dependent and owned by the
/// runtime, not by the compiler.
pub trait TProcessor {
    /// Maximum DAC gain of a generator channel.
    fn max_gain(&self, dac: Channel) -> Result<i32>;

    /// Sampling rate of a generator channel in MHz.
    fn sampling_rate(&self, dac: Channel) -> Result<f64>;

    /// Number of DAC samples per fabric clock cycle.
    fn samples_per_clock(&self, dac: Channel) -> Result<u32>;

    /// Convert microseconds to clock cycles. `dac = None` uses the tProc
    /// timing clock, otherwise the fabric clock of the given generator.
    fn us_to_cycles(&self, us: f64, dac: Option<Channel>) -> Result<u32>;

    /// Convert a frequency in MHz to a frequency-register value. When an ADC
    /// channel is given the value is rounded for generator/readout matching.
    fn freq_to_register(&self, freq_mhz: f64, dac: Channel, ro_adc: Option<Channel>)
    -> Result<i32>;

    /// Convert a phase in degrees to a phase-register value.
    fn degrees_to_register(&self, degrees: f64, dac: Channel) -> Result<i32>;

    /// Declare a signal generator with its Nyquist zone, optionally with
    /// multiplexed-readout tone configuration.
    fn declare_generator(
        &mut self,
        dac: Channel,
        nyquist_zone: u8,
        mux: Option<&MuxConfig>,
    ) -> Result<()>;

    /// Declare a readout (downconversion) channel.
    fn declare_readout(
        &mut self,
        adc: Channel,
        length_cycles: u32,
        freq_mhz: f64,
        dac: Channel,
    ) -> Result<()>;

    /// Upload a named waveform table to a generator.
    fn add_waveform(
        &mut self,
        dac: Channel,
        name: &str,
        i_samples: &[f64],
        q_samples: &[f64],
    ) -> Result<()>;

    /// Program the pulse registers of a generator channel.
    fn set_pulse_registers(&mut self, dac: Channel, registers: &PulseRegisters) -> Result<()>;

    /// Handle to the existing register backing a pulse field on a channel.
    fn pulse_register(&mut self, dac: Channel, field: RegisterField) -> Result<RegisterHandle>;

    /// Allocate a fresh register on the channel's page.
    fn new_register(
        &mut self,
        dac: Channel,
        field: RegisterField,
        name: Option<&str>,
    ) -> Result<RegisterHandle>;

    /// Register-to-register copy.
    fn copy_register(&mut self, dst: &RegisterHandle, src: &RegisterHandle) -> Result<()>;

    /// Write an immediate value into a register.
    fn write_register(&mut self, dst: &RegisterHandle, value: i32) -> Result<()>;

    /// Declare one merged sweep dimension. Each call adds a loop level; the
    /// runtime iterates dimensions in the reverse order of declaration.
    fn add_sweep(&mut self, dimension: SweepDimension) -> Result<()>;

    /// Fire the programmed pulse of a generator, optionally at an explicit
    /// time in tProc cycles.
    fn fire(&mut self, dac: Channel, time: Option<u32>) -> Result<()>;

    /// Fire the programmed readout pulse and trigger acquisition on the
    /// given ADC channels.
    fn trigger_and_measure(
        &mut self,
        dac: Channel,
        adcs: &[Channel],
        trig_offset: u32,
        wait: bool,
        settle_cycles: u32,
    ) -> Result<()>;

    /// Advance the program timeline by the given number of tProc cycles.
    fn advance_time(&mut self, cycles: u32) -> Result<()>;

    /// Advance the program timeline by the contents of a time register.
    fn sync_to_register(&mut self, register: &RegisterHandle) -> Result<()>;

    /// Block until all fired pulses and measurements have completed.
    fn wait_all(&mut self) -> Result<()>;

    /// Align all channel timelines, then advance by the given delay.
    fn sync_all(&mut self, delay_cycles: u32) -> Result<()>;

    /// Reset all signal generators to their idle state.
    fn reset_generators(&mut self) -> Result<()>;

    /// Run the compiled program: `reps` shots per sweep point, repeated for
    /// `soft_avgs` software averages, filling the accumulation buffers.
    fn acquire(&mut self, reads_per_experiment: u32, reps: u32, soft_avgs: u32) -> Result<()>;

    /// Flat accumulated (I, Q) buffers of an ADC channel after [`acquire`].
    ///
    /// [`acquire`]: TProcessor::acquire
    fn read_accumulated(&self, adc: Channel) -> Result<(Vec<f64>, Vec<f64>)>;
}

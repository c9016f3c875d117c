// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Register-level value types shared between the compiler and the runtime.

use crate::Channel;

/// Pulse fields backed by a dedicated generator register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterField {
    Frequency,
    Gain,
    Phase,
    Time,
}

impl RegisterField {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterField::Frequency => "freq",
            RegisterField::Gain => "gain",
            RegisterField::Phase => "phase",
            RegisterField::Time => "t",
        }
    }
}

/// Handle to one register on a generator's register page.
///
/// Handles are allocated by the runtime and carry no value themselves; the
/// compiler only moves them around (sweep descriptors, copies, time syncs).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegisterHandle {
    pub channel: Channel,
    pub page: u8,
    pub addr: u8,
    pub field: RegisterField,
}

/// Where a generator takes its output samples from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputSource {
    /// Waveform samples modulated by the DDS (the default for RF pulses).
    #[default]
    Product,
    /// Raw waveform samples, bypassing the DDS (flux/bias pulses).
    Input,
}

/// Output level a generator holds after the pulse ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StandbyLevel {
    #[default]
    Zero,
    /// Hold the last sample (used to park a bias line).
    Last,
}

/// Envelope selector of a programmed pulse.
#[derive(Debug, Clone, PartialEq)]
pub enum PulseProfile {
    /// Constant envelope of the given length in fabric cycles.
    Const { length: u32 },
    /// Previously uploaded waveform table.
    Waveform { name: String },
    /// Constant multiplexed envelope firing the masked tones together.
    MuxConst { length: u32, mask: Vec<u8> },
}

/// One full `set_pulse_registers` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseRegisters {
    pub freq: i32,
    pub phase: i32,
    pub gain: i32,
    pub profile: PulseProfile,
    pub output: OutputSource,
    pub standby: StandbyLevel,
}

impl PulseRegisters {
    pub fn constant(freq: i32, phase: i32, gain: i32, length: u32) -> Self {
        PulseRegisters {
            freq,
            phase,
            gain,
            profile: PulseProfile::Const { length },
            output: OutputSource::default(),
            standby: StandbyLevel::default(),
        }
    }

    pub fn waveform(freq: i32, phase: i32, gain: i32, name: impl Into<String>) -> Self {
        PulseRegisters {
            freq,
            phase,
            gain,
            profile: PulseProfile::Waveform { name: name.into() },
            output: OutputSource::default(),
            standby: StandbyLevel::default(),
        }
    }

    /// Multiplexed constant readout pulse; tone frequencies and gains were
    /// fixed at generator declaration, so only length and mask remain.
    pub fn multiplexed(length: u32, mask: Vec<u8>) -> Self {
        PulseRegisters {
            freq: 0,
            phase: 0,
            gain: 0,
            profile: PulseProfile::MuxConst { length, mask },
            output: OutputSource::default(),
            standby: StandbyLevel::default(),
        }
    }

    pub fn with_output(mut self, output: OutputSource) -> Self {
        self.output = output;
        self
    }

    pub fn with_standby(mut self, standby: StandbyLevel) -> Self {
        self.standby = standby;
        self
    }

    /// Style keyword of the runtime call, `"const"` or `"arb"`.
    pub fn style(&self) -> &'static str {
        match self.profile {
            PulseProfile::Const { .. } | PulseProfile::MuxConst { .. } => "const",
            PulseProfile::Waveform { .. } => "arb",
        }
    }
}

/// Tone configuration of a multiplexed readout generator.
#[derive(Debug, Clone, PartialEq)]
pub struct MuxConfig {
    /// One tone frequency (MHz) per demodulation channel.
    pub freqs: Vec<f64>,
    /// One amplitude fraction per demodulation channel.
    pub gains: Vec<f64>,
    pub mixer_freq: f64,
    /// ADC channel used as downconversion reference.
    pub ro_ch: Channel,
}

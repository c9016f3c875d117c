// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! In-memory runtime used by the compiler's tests.
//!
//! Records every primitive call in order and synthesizes deterministic
//! accumulation buffers on acquisition, so tests can assert on register
//! traffic without firmware attached.

use std::collections::HashMap;

use crate::registers::{MuxConfig, PulseRegisters, RegisterField, RegisterHandle};
use crate::sweep::SweepDimension;
use crate::{Channel, Error, Result, TProcessor};

/// Static description of one mock generator channel.
#[derive(Debug, Clone)]
pub struct GeneratorProfile {
    /// DAC sampling rate in MHz.
    pub sampling_rate: f64,
    pub max_gain: i32,
    pub samples_per_clock: u32,
}

impl Default for GeneratorProfile {
    fn default() -> Self {
        GeneratorProfile {
            sampling_rate: 9830.4,
            max_gain: 32766,
            samples_per_clock: 16,
        }
    }
}

/// One recorded primitive call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    DeclareGenerator {
        dac: Channel,
        nyquist_zone: u8,
        mux: Option<MuxConfig>,
    },
    DeclareReadout {
        adc: Channel,
        length_cycles: u32,
        freq_mhz: f64,
        dac: Channel,
    },
    AddWaveform {
        dac: Channel,
        name: String,
        samples: usize,
    },
    SetPulseRegisters {
        dac: Channel,
        registers: PulseRegisters,
    },
    Fire {
        dac: Channel,
        time: Option<u32>,
    },
    TriggerAndMeasure {
        dac: Channel,
        adcs: Vec<Channel>,
        trig_offset: u32,
    },
    AdvanceTime {
        cycles: u32,
    },
    SyncToRegister {
        register: RegisterHandle,
    },
    WaitAll,
    SyncAll {
        delay_cycles: u32,
    },
    ResetGenerators,
    CopyRegister {
        dst: RegisterHandle,
        src: RegisterHandle,
    },
    WriteRegister {
        dst: RegisterHandle,
        value: i32,
    },
    AddSweep {
        registers: Vec<RegisterHandle>,
        expts: u32,
    },
    Acquire {
        reads_per_experiment: u32,
        reps: u32,
        soft_avgs: u32,
    },
}

pub struct MockTProc {
    generators: Vec<GeneratorProfile>,
    tproc_frequency: f64,
    /// Full call log, in issue order.
    pub calls: Vec<Call>,
    next_addr: HashMap<Channel, u8>,
    sweep_points: u32,
    buffers: HashMap<Channel, (Vec<f64>, Vec<f64>)>,
}

impl MockTProc {
    /// Mock with `generator_count` identical default generators.
    pub fn new(generator_count: usize) -> Self {
        MockTProc::with_generators(vec![GeneratorProfile::default(); generator_count])
    }

    pub fn with_generators(generators: Vec<GeneratorProfile>) -> Self {
        MockTProc {
            generators,
            tproc_frequency: 430.08,
            calls: Vec::new(),
            next_addr: HashMap::new(),
            sweep_points: 1,
            buffers: HashMap::new(),
        }
    }

    fn profile(&self, dac: Channel) -> Result<&GeneratorProfile> {
        self.generators
            .get(dac as usize)
            .ok_or(Error::UnknownGenerator(dac))
    }

    fn fabric_frequency(&self, dac: Channel) -> Result<f64> {
        let profile = self.profile(dac)?;
        Ok(profile.sampling_rate / f64::from(profile.samples_per_clock))
    }

    /// Declared (dac, nyquist zone) pairs, in declaration order.
    pub fn generator_declarations(&self) -> Vec<(Channel, u8)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::DeclareGenerator {
                    dac, nyquist_zone, ..
                } => Some((*dac, *nyquist_zone)),
                _ => None,
            })
            .collect()
    }

    /// Names of waveform tables uploaded to a generator.
    pub fn waveform_names(&self, dac: Channel) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::AddWaveform { dac: ch, name, .. } if *ch == dac => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Number of `set_pulse_registers` calls issued to a generator.
    pub fn register_programs(&self, dac: Channel) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::SetPulseRegisters { dac: ch, .. } if *ch == dac))
            .count()
    }

    /// Number of measurement triggers issued.
    pub fn measure_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::TriggerAndMeasure { .. }))
            .count()
    }
}

impl TProcessor for MockTProc {
    fn max_gain(&self, dac: Channel) -> Result<i32> {
        Ok(self.profile(dac)?.max_gain)
    }

    fn sampling_rate(&self, dac: Channel) -> Result<f64> {
        Ok(self.profile(dac)?.sampling_rate)
    }

    fn samples_per_clock(&self, dac: Channel) -> Result<u32> {
        Ok(self.profile(dac)?.samples_per_clock)
    }

    fn us_to_cycles(&self, us: f64, dac: Option<Channel>) -> Result<u32> {
        let clock_mhz = match dac {
            Some(dac) => self.fabric_frequency(dac)?,
            None => self.tproc_frequency,
        };
        Ok((us * clock_mhz).round() as u32)
    }

    fn freq_to_register(
        &self,
        freq_mhz: f64,
        dac: Channel,
        _ro_adc: Option<Channel>,
    ) -> Result<i32> {
        let fs = self.profile(dac)?.sampling_rate;
        Ok(((freq_mhz / fs) * 4294967296.0).round() as i64 as i32)
    }

    fn degrees_to_register(&self, degrees: f64, dac: Channel) -> Result<i32> {
        self.profile(dac)?;
        Ok(((degrees.rem_euclid(360.0) / 360.0) * 4294967296.0).round() as i64 as i32)
    }

    fn declare_generator(
        &mut self,
        dac: Channel,
        nyquist_zone: u8,
        mux: Option<&MuxConfig>,
    ) -> Result<()> {
        self.profile(dac)?;
        self.calls.push(Call::DeclareGenerator {
            dac,
            nyquist_zone,
            mux: mux.cloned(),
        });
        Ok(())
    }

    fn declare_readout(
        &mut self,
        adc: Channel,
        length_cycles: u32,
        freq_mhz: f64,
        dac: Channel,
    ) -> Result<()> {
        self.calls.push(Call::DeclareReadout {
            adc,
            length_cycles,
            freq_mhz,
            dac,
        });
        Ok(())
    }

    fn add_waveform(
        &mut self,
        dac: Channel,
        name: &str,
        i_samples: &[f64],
        _q_samples: &[f64],
    ) -> Result<()> {
        self.profile(dac)?;
        self.calls.push(Call::AddWaveform {
            dac,
            name: name.to_string(),
            samples: i_samples.len(),
        });
        Ok(())
    }

    fn set_pulse_registers(&mut self, dac: Channel, registers: &PulseRegisters) -> Result<()> {
        self.profile(dac)?;
        self.calls.push(Call::SetPulseRegisters {
            dac,
            registers: registers.clone(),
        });
        Ok(())
    }

    fn pulse_register(&mut self, dac: Channel, field: RegisterField) -> Result<RegisterHandle> {
        self.profile(dac)?;
        let addr = match field {
            RegisterField::Frequency => 1,
            RegisterField::Phase => 2,
            RegisterField::Gain => 3,
            RegisterField::Time => 4,
        };
        Ok(RegisterHandle {
            channel: dac,
            page: dac,
            addr,
            field,
        })
    }

    fn new_register(
        &mut self,
        dac: Channel,
        field: RegisterField,
        _name: Option<&str>,
    ) -> Result<RegisterHandle> {
        self.profile(dac)?;
        let addr = self.next_addr.entry(dac).or_insert(10);
        if *addr == u8::MAX {
            return Err(Error::RegisterFileExhausted(dac));
        }
        let handle = RegisterHandle {
            channel: dac,
            page: dac,
            addr: *addr,
            field,
        };
        *addr += 1;
        Ok(handle)
    }

    fn copy_register(&mut self, dst: &RegisterHandle, src: &RegisterHandle) -> Result<()> {
        self.calls.push(Call::CopyRegister {
            dst: dst.clone(),
            src: src.clone(),
        });
        Ok(())
    }

    fn write_register(&mut self, dst: &RegisterHandle, value: i32) -> Result<()> {
        self.calls.push(Call::WriteRegister {
            dst: dst.clone(),
            value,
        });
        Ok(())
    }

    fn add_sweep(&mut self, dimension: SweepDimension) -> Result<()> {
        self.sweep_points *= dimension.expts();
        self.calls.push(Call::AddSweep {
            registers: dimension
                .ranges()
                .iter()
                .map(|range| range.register.clone())
                .collect(),
            expts: dimension.expts(),
        });
        Ok(())
    }

    fn fire(&mut self, dac: Channel, time: Option<u32>) -> Result<()> {
        self.profile(dac)?;
        self.calls.push(Call::Fire { dac, time });
        Ok(())
    }

    fn trigger_and_measure(
        &mut self,
        dac: Channel,
        adcs: &[Channel],
        trig_offset: u32,
        _wait: bool,
        _settle_cycles: u32,
    ) -> Result<()> {
        self.profile(dac)?;
        self.calls.push(Call::TriggerAndMeasure {
            dac,
            adcs: adcs.to_vec(),
            trig_offset,
        });
        Ok(())
    }

    fn advance_time(&mut self, cycles: u32) -> Result<()> {
        self.calls.push(Call::AdvanceTime { cycles });
        Ok(())
    }

    fn sync_to_register(&mut self, register: &RegisterHandle) -> Result<()> {
        self.calls.push(Call::SyncToRegister {
            register: register.clone(),
        });
        Ok(())
    }

    fn wait_all(&mut self) -> Result<()> {
        self.calls.push(Call::WaitAll);
        Ok(())
    }

    fn sync_all(&mut self, delay_cycles: u32) -> Result<()> {
        self.calls.push(Call::SyncAll { delay_cycles });
        Ok(())
    }

    fn reset_generators(&mut self) -> Result<()> {
        self.calls.push(Call::ResetGenerators);
        Ok(())
    }

    fn acquire(&mut self, reads_per_experiment: u32, reps: u32, soft_avgs: u32) -> Result<()> {
        // Size each ADC buffer from the recorded measurement triggers: one
        // accumulated (I, Q) point per co-triggered readout, sweep point and
        // shot. Filled with a ramp so reshaping is observable in tests.
        let mut counts: HashMap<Channel, usize> = HashMap::new();
        for call in &self.calls {
            if let Call::TriggerAndMeasure { adcs, .. } = call {
                for adc in adcs {
                    *counts.entry(*adc).or_insert(0) += 1;
                }
            }
        }
        for (adc, count) in counts {
            let len = count * self.sweep_points as usize * reps as usize;
            let i: Vec<f64> = (0..len).map(|idx| idx as f64).collect();
            let q: Vec<f64> = (0..len).map(|idx| -(idx as f64)).collect();
            self.buffers.insert(adc, (i, q));
        }
        self.calls.push(Call::Acquire {
            reads_per_experiment,
            reps,
            soft_avgs,
        });
        Ok(())
    }

    fn read_accumulated(&self, adc: Channel) -> Result<(Vec<f64>, Vec<f64>)> {
        self.buffers
            .get(&adc)
            .cloned()
            .ok_or(Error::UnknownReadout(adc))
    }
}

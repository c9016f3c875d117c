// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Flux extension of the base program.
//!
//! Every program body runs between a sweetspot bias set and a zero restore:
//! qubits with a flux DAC are parked at their bias fraction before the
//! element loop and released afterwards, with the generators reset so no
//! bias leaks into the next invocation.

use indexmap::IndexMap;
use tproc::{OutputSource, PulseRegisters, StandbyLevel, TProcessor};

use crate::elements::{Element, ElementKind, Pulse, Shape, StartTime};
use crate::program::base::BaseProgram;
use crate::{Error, Result, waveforms};

/// Shortest waveform the generators accept; bias parking uses exactly this.
const BIAS_WAVEFORM_SAMPLES: usize = 48;
/// Settle time after a bias change (µs).
const BIAS_SETTLE_US: f64 = 1.0;

/// Target level of a bias operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasMode {
    /// Park every fluxed qubit at its sweetspot fraction.
    Sweetspot,
    /// Release every fluxed qubit to zero.
    Zero,
}

impl<T: TProcessor> BaseProgram<'_, T> {
    /// Drive every flux line with a non-zero bias to `mode`.
    ///
    /// A DAC with an active bias-sweep register pair is updated through a
    /// register copy (sweetspot) or a zero write instead of a freshly
    /// synthesized waveform.
    pub fn set_bias(&mut self, mode: BiasMode) -> Result<()> {
        let qubits: Vec<_> = self.qubits.clone();
        for qubit in qubits {
            let Some(dac) = qubit.dac else { continue };
            let bias = qubit.bias.unwrap_or(0.0);
            if bias == 0.0 {
                continue;
            }

            if let Some((swept, operating)) = self.bias_sweep_registers.get(&dac).cloned() {
                match mode {
                    BiasMode::Sweetspot => self.soc.copy_register(&operating, &swept)?,
                    BiasMode::Zero => self.soc.write_register(&operating, 0)?,
                }
            } else {
                let max_gain = self.soc.max_gain(dac)?;
                let value = match mode {
                    BiasMode::Sweetspot => (bias * f64::from(max_gain)).trunc(),
                    BiasMode::Zero => 0.0,
                };
                let name = format!("const_{value}_{dac}");
                let i_samples = waveforms::constant(BIAS_WAVEFORM_SAMPLES, value);
                let q_samples = waveforms::constant(BIAS_WAVEFORM_SAMPLES, 0.0);
                self.soc.add_waveform(dac, &name, &i_samples, &q_samples)?;
                let registers = PulseRegisters::waveform(0, 0, max_gain, name)
                    .with_output(OutputSource::Input)
                    .with_standby(StandbyLevel::Last);
                self.soc.set_pulse_registers(dac, &registers)?;
            }
            self.soc.fire(dac, None)?;
        }
        self.soc.wait_all()?;
        let settle = self.soc.us_to_cycles(BIAS_SETTLE_US, None)?;
        self.soc.sync_all(settle)?;
        Ok(())
    }

    /// Synthesize and fire a fast flux pulse.
    pub fn execute_flux_pulse(&mut self, pulse: &Pulse) -> Result<()> {
        let dac = pulse.dac;
        let max_gain = self.soc.max_gain(dac)?;
        let peak = f64::from(max_gain);
        let cycles = self.soc.us_to_cycles(pulse.duration, Some(dac))?;
        let num_samples = (cycles * self.soc.samples_per_clock(dac)?) as usize;

        let i_samples = match &pulse.shape {
            Shape::Rectangular => {
                let amp = (pulse.amplitude * peak).trunc();
                waveforms::predistorted_rectangular(num_samples, amp, pulse.duration, peak)
            }
            Shape::FluxExponential {
                tau,
                upsilon,
                weight,
            } => waveforms::flux_exponential(
                num_samples,
                pulse.amplitude * peak,
                *tau,
                *upsilon,
                *weight,
            ),
            Shape::Arbitrary { i_values, .. } => {
                log::info!("arbitrary flux pulse on DAC {dac}: Q samples are ignored");
                i_values.clone()
            }
            _ => {
                return Err(Error::configuration(
                    "only rectangular, flux-exponential and arbitrary envelopes \
                     are supported for flux pulses",
                ));
            }
        };

        if i_samples.iter().any(|sample| sample.abs() > peak) {
            return Err(Error::resource(format!(
                "flux pulse {} exceeds the maximum gain",
                pulse.name
            )));
        }

        let q_samples = vec![0.0; i_samples.len()];
        self.soc
            .add_waveform(dac, &pulse.name, &i_samples, &q_samples)?;
        let registers = PulseRegisters::waveform(0, 0, max_gain, pulse.name.clone())
            .with_output(OutputSource::Input)
            .with_standby(StandbyLevel::Zero);
        self.soc.set_pulse_registers(dac, &registers)?;
        self.soc.fire(dac, None)?;
        Ok(())
    }

    /// Flux lines always sit in the first Nyquist zone.
    pub fn declare_nqz_flux(&mut self) -> Result<()> {
        let dacs: Vec<_> = self.qubits.iter().filter_map(|qubit| qubit.dac).collect();
        for dac in dacs {
            self.soc.declare_generator(dac, 1, None)?;
        }
        Ok(())
    }

    /// Declare all Nyquist zones and readout frequencies: drives, fluxes and
    /// readout (multiplexed or not).
    pub fn declare_zones_and_ro(&mut self) -> Result<()> {
        self.declare_nqz_zones(ElementKind::Drive)?;
        self.declare_nqz_flux()?;
        if self.multiplexed {
            self.declare_gen_mux_ro()?;
        } else {
            self.declare_nqz_zones(ElementKind::Readout)?;
        }
        self.declare_readout_freq()
    }

    /// Execute the element sequence in time order.
    ///
    /// Advances the timeline by each element's start delay (or syncs to its
    /// time register when the delay is swept), dispatches on the element
    /// kind, then waits for completion, releases the bias and relaxes.
    pub fn body(&mut self) -> Result<()> {
        let mut last_registered: IndexMap<_, Pulse> = IndexMap::new();
        let mut executed: Vec<usize> = Vec::new();
        let mut executed_groups: Vec<usize> = Vec::new();

        self.set_bias(BiasMode::Sweetspot)?;

        for index in 0..self.sequence.len() {
            match self.sequence[index].start_delay().clone() {
                StartTime::Register(register) => self.soc.sync_to_register(&register)?,
                StartTime::Delay(us) => {
                    let cycles = self.soc.us_to_cycles(us, None)?;
                    if cycles != 0 {
                        self.soc.advance_time(cycles)?;
                    }
                }
            }

            match self.sequence[index].kind() {
                ElementKind::Readout => {
                    self.execute_readout_pulse(index, &mut executed, &mut executed_groups)?;
                }
                ElementKind::Drive => {
                    let pulse = self.pulse_at(index, "drive")?;
                    self.execute_drive_pulse(&pulse, &mut last_registered)?;
                }
                ElementKind::Flux => {
                    let pulse = self.pulse_at(index, "flux")?;
                    self.execute_flux_pulse(&pulse)?;
                }
            }
        }

        self.soc.wait_all()?;
        self.set_bias(BiasMode::Zero)?;
        self.soc.reset_generators()?;
        self.soc.sync_all(self.relax_delay)?;
        Ok(())
    }

    fn pulse_at(&self, index: usize, role: &str) -> Result<Pulse> {
        match &self.sequence[index] {
            Element::Pulse(pulse) => Ok(pulse.clone()),
            Element::Measurement(_) => Err(Error::configuration(format!(
                "{role} elements must carry a pulse"
            ))),
        }
    }
}

// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Base register compiler.
//!
//! Owns the per-invocation state of one compiled program: the element
//! sequence, the waveform cache, the mux groups and the bias-sweep register
//! map. Everything is built fresh per invocation and dropped after
//! acquisition; the only shared resource is the exclusively borrowed runtime
//! handle.

use indexmap::{IndexMap, IndexSet};
use ndarray::{ArrayD, Axis, IxDyn};
use tproc::{Channel, MuxConfig, PulseRegisters, RegisterHandle, TProcessor};

use crate::elements::{Element, ElementKind, Pulse, Shape};
use crate::experiment::{Config, Qubit};
use crate::{Error, Result, mux, waveforms};

/// Settle time after channel declaration (µs).
const INITIALIZE_SETTLE_US: f64 = 2.0;

/// Per-readout (I, Q) results, one array per distinct ADC channel in
/// ascending channel order. Shapes are `(readout_count, [sweep_points,]
/// shots)`, with the shot axis reduced away for averaged acquisitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IqResults {
    pub i: Vec<ArrayD<f64>>,
    pub q: Vec<ArrayD<f64>>,
}

impl IqResults {
    /// Reduce the shot axis to its mean.
    pub fn averaged(self) -> Result<IqResults> {
        let reduce = |arrays: Vec<ArrayD<f64>>| -> Result<Vec<ArrayD<f64>>> {
            arrays
                .into_iter()
                .map(|array| {
                    let shots = Axis(array.ndim() - 1);
                    array
                        .mean_axis(shots)
                        .ok_or_else(|| Error::resource("cannot average an empty shot axis"))
                })
                .collect()
        };
        Ok(IqResults {
            i: reduce(self.i)?,
            q: reduce(self.q)?,
        })
    }
}

pub struct BaseProgram<'a, T: TProcessor> {
    pub(crate) soc: &'a mut T,
    pub(crate) sequence: Vec<Element>,
    pub(crate) qubits: Vec<Qubit>,
    pub(crate) reps: u32,
    pub(crate) soft_avgs: u32,
    pub(crate) average: bool,
    pub(crate) adc_trig_offset: u32,
    pub(crate) relax_delay: u32,
    pub(crate) sync_delay: u32,
    pub(crate) init_settle: u32,
    pub(crate) multiplexed: bool,
    pub(crate) readouts_per_experiment: usize,
    pub(crate) mux_groups: Vec<Vec<usize>>,
    pub(crate) pulses_registered: bool,
    pub(crate) registered_waveforms: IndexMap<Channel, IndexSet<String>>,
    pub(crate) bias_sweep_registers: IndexMap<Channel, (RegisterHandle, RegisterHandle)>,
    pub(crate) sweep_points: Option<u32>,
}

impl<'a, T: TProcessor> BaseProgram<'a, T> {
    pub fn new(
        soc: &'a mut T,
        config: &Config,
        sequence: Vec<Element>,
        qubits: Vec<Qubit>,
        multiplexed: bool,
    ) -> Result<Self> {
        let relax_delay = soc.us_to_cycles(config.relaxation_time, None)?;
        let sync_delay = soc.us_to_cycles(0.0, None)?;
        let init_settle = soc.us_to_cycles(INITIALIZE_SETTLE_US, None)?;

        let mut registered_waveforms: IndexMap<Channel, IndexSet<String>> = IndexMap::new();
        for element in &sequence {
            registered_waveforms
                .entry(element.dac())
                .or_insert_with(IndexSet::new);
        }

        let mux_groups = if multiplexed {
            mux::group_mux_ro(&sequence)
        } else {
            Vec::new()
        };
        let readouts_per_experiment = if multiplexed {
            mux_groups.len()
        } else {
            sequence
                .iter()
                .filter(|element| element.kind() == ElementKind::Readout)
                .count()
        };

        Ok(BaseProgram {
            soc,
            sequence,
            qubits,
            reps: config.reps,
            soft_avgs: config.soft_avgs,
            average: config.average,
            adc_trig_offset: config.ro_time_of_flight,
            relax_delay,
            sync_delay,
            init_settle,
            multiplexed,
            readouts_per_experiment,
            mux_groups,
            pulses_registered: false,
            registered_waveforms,
            bias_sweep_registers: IndexMap::new(),
            sweep_points: None,
        })
    }

    /// Declare the Nyquist zone of every DAC used by elements of `kind`,
    /// first occurrence per DAC wins.
    pub fn declare_nqz_zones(&mut self, kind: ElementKind) -> Result<()> {
        let mut declared: Vec<Channel> = Vec::new();
        let channels: Vec<(Channel, f64)> = self
            .sequence
            .iter()
            .filter(|element| element.kind() == kind)
            .map(|element| (element.dac(), element.frequency()))
            .collect();
        for (dac, frequency) in channels {
            if declared.contains(&dac) {
                continue;
            }
            declared.push(dac);
            let sampling_rate = self.soc.sampling_rate(dac)?;
            let zone = if frequency < sampling_rate / 2.0 { 1 } else { 2 };
            self.soc.declare_generator(dac, zone, None)?;
        }
        Ok(())
    }

    /// Declare the downconversion frequency of every ADC used by readout
    /// elements, first occurrence per ADC wins.
    pub fn declare_readout_freq(&mut self) -> Result<()> {
        let mut declared: Vec<Channel> = Vec::new();
        for (adc, dac, duration, frequency) in self.readout_channels()? {
            if declared.contains(&adc) {
                continue;
            }
            declared.push(adc);
            let length = self.soc.us_to_cycles(duration, Some(dac))?;
            self.soc.declare_readout(adc, length, frequency, dac)?;
        }
        Ok(())
    }

    /// Declare the shared multiplexed-readout generator: one tone per
    /// distinct ADC, taken from the first readout on that ADC. No-op when
    /// the sequence carries no readout.
    pub fn declare_gen_mux_ro(&mut self) -> Result<()> {
        let mut adcs_added: Vec<Channel> = Vec::new();
        let mut freqs: Vec<f64> = Vec::new();
        let mut gains: Vec<f64> = Vec::new();
        let mut ro_dac: Option<Channel> = None;
        let mut zone = 1;

        let readouts: Vec<(Channel, Channel, f64, f64)> = self
            .sequence
            .iter()
            .filter(|element| element.kind() == ElementKind::Readout)
            .filter_map(|element| {
                element.adc().map(|adc| {
                    let amplitude = element.as_pulse().map(|pulse| pulse.amplitude);
                    (adc, element.dac(), element.frequency(), amplitude.unwrap_or(0.0))
                })
            })
            .collect();
        for (adc, dac, frequency, amplitude) in readouts {
            ro_dac = Some(dac);
            if adcs_added.contains(&adc) {
                continue;
            }
            adcs_added.push(adc);
            let sampling_rate = self.soc.sampling_rate(dac)?;
            zone = if frequency < sampling_rate / 2.0 { 1 } else { 2 };
            freqs.push(frequency);
            gains.push(amplitude);
        }

        let Some(dac) = ro_dac else { return Ok(()) };
        let mux = MuxConfig {
            freqs,
            gains,
            mixer_freq: 0.0,
            ro_ch: adcs_added[0],
        };
        self.soc.declare_generator(dac, zone, Some(&mux))?;
        Ok(())
    }

    /// Program the pulse registers of a pulse, synthesizing and caching its
    /// waveform table first when the envelope needs one.
    pub fn add_pulse_to_register(&mut self, pulse: &Pulse) -> Result<()> {
        let dac = pulse.dac;
        let max_gain = self.soc.max_gain(dac)?;
        let gain = (pulse.amplitude * f64::from(max_gain)).round() as i32;
        let phase = self.soc.degrees_to_register(pulse.relative_phase, dac)?;
        let freq = self.soc.freq_to_register(pulse.frequency, dac, pulse.adc)?;
        let length = self.soc.us_to_cycles(pulse.duration, Some(dac))?;

        let Some(name) = pulse.waveform_name() else {
            // rectangular: the envelope lives entirely in the length register
            self.soc
                .set_pulse_registers(dac, &PulseRegisters::constant(freq, phase, gain, length))?;
            return Ok(());
        };

        if !self.waveform_registered(dac, &name) {
            let (i_samples, q_samples) = self.synthesize_drive_envelope(pulse, length, max_gain)?;
            self.soc.add_waveform(dac, &name, &i_samples, &q_samples)?;
            self.registered_waveforms
                .entry(dac)
                .or_insert_with(IndexSet::new)
                .insert(name.clone());
        }
        self.soc
            .set_pulse_registers(dac, &PulseRegisters::waveform(freq, phase, gain, name))?;
        Ok(())
    }

    fn synthesize_drive_envelope(
        &self,
        pulse: &Pulse,
        length_cycles: u32,
        max_gain: i32,
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        let dac = pulse.dac;
        let samples_per_clock = self.soc.samples_per_clock(dac)?;
        let num_samples = (length_cycles * samples_per_clock) as usize;
        let peak = f64::from(max_gain);
        match &pulse.shape {
            Shape::Gaussian { rel_sigma } => {
                let sigma = sigma_samples(length_cycles, *rel_sigma, samples_per_clock);
                let i_samples = waveforms::gaussian(num_samples, sigma, peak);
                Ok((i_samples, vec![0.0; num_samples]))
            }
            Shape::Drag { rel_sigma, beta } => {
                let sigma = sigma_samples(length_cycles, *rel_sigma, samples_per_clock);
                let sampling_rate = self.soc.sampling_rate(dac)?;
                // detuning of half the sampling rate, normalized per sample
                let delta = -sampling_rate / 2.0 / sampling_rate;
                Ok(waveforms::drag(num_samples, sigma, delta, *beta, peak))
            }
            Shape::FlatTop { rel_sigma } => {
                let sigma = sigma_samples(length_cycles, *rel_sigma, samples_per_clock);
                let i_samples = waveforms::flat_top(num_samples, sigma, peak);
                Ok((i_samples, vec![0.0; num_samples]))
            }
            Shape::FluxExponential {
                tau,
                upsilon,
                weight,
            } => {
                let amp = pulse.amplitude * peak;
                let i_samples =
                    waveforms::flux_exponential(num_samples, amp, *tau, *upsilon, *weight);
                Ok((i_samples, vec![0.0; num_samples]))
            }
            Shape::Arbitrary { i_values, q_values } => Ok((i_values.clone(), q_values.clone())),
            Shape::Rectangular => Err(Error::configuration(format!(
                "pulse {} carries no waveform table",
                pulse.name
            ))),
        }
    }

    /// Fire a drive pulse, re-programming its registers only when they were
    /// not set up front (sweep mode) and the pulse differs — start time
    /// excluded — from the last one registered on that DAC.
    pub fn execute_drive_pulse(
        &mut self,
        pulse: &Pulse,
        last_registered: &mut IndexMap<Channel, Pulse>,
    ) -> Result<()> {
        let differs = last_registered
            .get(&pulse.dac)
            .is_none_or(|last| last != pulse);
        if !self.pulses_registered && differs {
            self.add_pulse_to_register(pulse)?;
            last_registered.insert(pulse.dac, pulse.clone());
        }
        self.soc.fire(pulse.dac, Some(0))?;
        Ok(())
    }

    /// Trigger a readout. In mux mode the owning group is registered once
    /// and fired as one combined trigger across all its ADCs; otherwise the
    /// single readout is registered (unless pre-registered) and fired with
    /// the configured post-measurement sync delay.
    pub fn execute_readout_pulse(
        &mut self,
        index: usize,
        executed: &mut Vec<usize>,
        executed_groups: &mut Vec<usize>,
    ) -> Result<()> {
        if self.multiplexed {
            if executed.contains(&index) {
                return Ok(());
            }
            let group = self
                .mux_groups
                .iter()
                .position(|members| members.contains(&index))
                .ok_or_else(|| {
                    Error::configuration("readout element belongs to no mux group")
                })?;
            self.add_muxed_readout_to_register(group)?;
            executed_groups.push(group);

            let members = self.mux_groups[group].clone();
            let dac = self.sequence[index].dac();
            let mut adcs = Vec::with_capacity(members.len());
            for member in members {
                adcs.push(self.required_adc(member)?);
                executed.push(member);
            }
            self.soc
                .trigger_and_measure(dac, &adcs, self.adc_trig_offset, false, self.sync_delay)?;
        } else {
            let element = self.sequence[index].clone();
            if !self.pulses_registered {
                if let Element::Pulse(pulse) = &element {
                    self.add_pulse_to_register(pulse)?;
                }
            }
            let adc = self.required_adc(index)?;
            self.soc.trigger_and_measure(
                element.dac(),
                &[adc],
                self.adc_trig_offset,
                false,
                self.sync_delay,
            )?;
        }
        Ok(())
    }

    /// Program the shared generator for one mux group before firing it.
    pub fn add_muxed_readout_to_register(&mut self, group: usize) -> Result<()> {
        let first = *self.mux_groups[group]
            .first()
            .ok_or_else(|| Error::configuration("empty mux group"))?;
        let element = self.sequence[first].clone();
        let pulse = element
            .as_pulse()
            .ok_or_else(|| Error::configuration("multiplexed readout needs a pulse element"))?;
        if pulse.shape != Shape::Rectangular {
            return Err(Error::configuration(
                "only rectangular pulses can be multiplexed",
            ));
        }
        let length = self.soc.us_to_cycles(pulse.duration, Some(pulse.dac))?;
        // readout amplitude is divided by the mask length downstream; the
        // mask stays fixed to keep the per-tone scaling stable
        let mask = vec![0, 1, 2];
        self.soc
            .set_pulse_registers(pulse.dac, &PulseRegisters::multiplexed(length, mask))?;
        Ok(())
    }

    /// Run the acquisition and collect results; called once per program.
    pub fn perform_experiment(&mut self) -> Result<IqResults> {
        let reads_per_experiment = self.readouts_per_experiment.max(1) as u32;
        self.soc
            .acquire(reads_per_experiment, self.reps, self.soft_avgs)?;
        if self.readouts_per_experiment == 0 {
            return Ok(IqResults::default());
        }
        let shots = self.collect_shots()?;
        if self.average { shots.averaged() } else { Ok(shots) }
    }

    /// Reshape the flat accumulation buffers into per-ADC arrays of shape
    /// `(readout_count, [sweep_points,] shots)`, normalized by the
    /// integration-window length.
    pub fn collect_shots(&mut self) -> Result<IqResults> {
        // one entry per readout element, plus the first-seen window length
        // per distinct adc
        let mut adcs: Vec<Channel> = Vec::new();
        let mut windows: IndexMap<Channel, (Channel, f64)> = IndexMap::new();
        for element in &self.sequence {
            if element.kind() != ElementKind::Readout {
                continue;
            }
            let adc = element
                .adc()
                .ok_or_else(|| Error::configuration("readout element without an ADC channel"))?;
            windows
                .entry(adc)
                .or_insert((element.dac(), element.duration()));
            adcs.push(adc);
        }

        let mut distinct: Vec<Channel> = windows.keys().copied().collect();
        distinct.sort_unstable();

        let mut results = IqResults::default();
        for adc in distinct {
            let count = adcs.iter().filter(|&&channel| channel == adc).count();
            let (dac, duration) = windows[&adc];
            let window = f64::from(self.soc.us_to_cycles(duration, Some(dac))?);
            let shape: Vec<usize> = match self.sweep_points {
                Some(points) => vec![count, points as usize, self.reps as usize],
                None => vec![count, self.reps as usize],
            };
            let (i_flat, q_flat) = self.soc.read_accumulated(adc)?;
            let i = ArrayD::from_shape_vec(IxDyn(&shape), i_flat)
                .map_err(|_| Error::resource("accumulation buffer does not match readout count"))?;
            let q = ArrayD::from_shape_vec(IxDyn(&shape), q_flat)
                .map_err(|_| Error::resource("accumulation buffer does not match readout count"))?;
            results.i.push(i.mapv(|value| value / window));
            results.q.push(q.mapv(|value| value / window));
        }
        Ok(results)
    }

    pub(crate) fn sync_initialize(&mut self) -> Result<()> {
        self.soc.sync_all(self.init_settle)?;
        Ok(())
    }

    fn waveform_registered(&self, dac: Channel, name: &str) -> bool {
        self.registered_waveforms
            .get(&dac)
            .is_some_and(|names| names.contains(name))
    }

    fn required_adc(&self, index: usize) -> Result<Channel> {
        self.sequence[index]
            .adc()
            .ok_or_else(|| Error::configuration("readout element without an ADC channel"))
    }

    fn readout_channels(&self) -> Result<Vec<(Channel, Channel, f64, f64)>> {
        self.sequence
            .iter()
            .filter(|element| element.kind() == ElementKind::Readout)
            .map(|element| {
                let adc = element.adc().ok_or_else(|| {
                    Error::configuration("readout element without an ADC channel")
                })?;
                Ok((adc, element.dac(), element.duration(), element.frequency()))
            })
            .collect()
    }
}

fn sigma_samples(length_cycles: u32, rel_sigma: f64, samples_per_clock: u32) -> f64 {
    (f64::from(length_cycles) / rel_sigma) * 2.0_f64.sqrt() * f64::from(samples_per_clock)
}

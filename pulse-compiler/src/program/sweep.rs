// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Sweep extension: hardware register sweeps over pulse parameters and
//! qubit bias lines.
//!
//! Each sweeper becomes one merged sweep dimension on the runtime; all its
//! parameter slots advance together. Sweepers are declared in reverse caller
//! order because the hardware iterates dimensions opposite to declaration.

use tproc::{RegisterField, SweepDimension, SweepRange, TProcessor};

use crate::elements::{Element, ElementKind, StartTime};
use crate::experiment::{Config, Parameter, Qubit, Sweeper, reversed_sweepers};
use crate::program::TProcProgram;
use crate::program::base::{BaseProgram, IqResults};
use crate::{Error, Result};

impl<T: TProcessor> BaseProgram<'_, T> {
    /// Reject illegal sweeps before any register write.
    pub fn validate_sweep(&self, sweeper: &Sweeper) -> Result<()> {
        for (slot, parameter) in sweeper.parameters.iter().enumerate() {
            let target = sweeper.indexes[slot];
            match parameter {
                Parameter::Bias => {
                    if self
                        .sequence
                        .iter()
                        .any(|element| element.kind() == ElementKind::Flux)
                    {
                        return Err(Error::validation(
                            "bias sweeps are not compatible with flux elements",
                        ));
                    }
                    if sweeper
                        .parameters
                        .iter()
                        .any(|other| *other != Parameter::Bias)
                    {
                        return Err(Error::validation(
                            "bias cannot be swept together with other parameters",
                        ));
                    }
                    let qubit = self.swept_qubit(sweeper, slot)?;
                    if qubit.dac.is_none() || qubit.bias.is_none() {
                        return Err(Error::validation(format!(
                            "bias-swept qubit has incomplete flux values: {qubit:?}"
                        )));
                    }
                }
                Parameter::Duration => {
                    return Err(Error::validation("duration sweeps are not supported"));
                }
                _ => {
                    let element = self.sequence.get(target).ok_or_else(|| {
                        Error::validation(format!("sweep target {target} is out of range"))
                    })?;
                    if element.kind() == ElementKind::Flux {
                        return Err(Error::validation(
                            "sweeps on flux pulses are not supported",
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Allocate the hardware registers of one sweeper and declare its merged
    /// dimension on the runtime.
    pub fn add_sweep_info(&mut self, sweeper: &Sweeper) -> Result<()> {
        self.validate_sweep(sweeper)?;

        let mut ranges = Vec::with_capacity(sweeper.parameters.len());
        if sweeper.parameters[0] == Parameter::Bias {
            for slot in 0..sweeper.parameters.len() {
                let qubit = self.swept_qubit(sweeper, slot)?;
                let dac = qubit
                    .dac
                    .ok_or_else(|| Error::validation("bias-swept qubit has no flux DAC"))?;

                // the swept register is distinct from the static gain
                // register; set_bias copies it over at sweetspot time
                let operating = self.soc.pulse_register(dac, RegisterField::Gain)?;
                let swept = self.soc.new_register(
                    dac,
                    RegisterField::Gain,
                    Some(&format!("sweep_bias_{dac}")),
                )?;
                self.bias_sweep_registers
                    .insert(dac, (swept.clone(), operating));

                let max_gain = f64::from(self.soc.max_gain(dac)?);
                ranges.push(SweepRange {
                    register: swept,
                    start: (sweeper.starts[slot] * max_gain).trunc(),
                    stop: (sweeper.stops[slot] * max_gain).trunc(),
                    expts: sweeper.expts,
                });
            }
        } else {
            for slot in 0..sweeper.parameters.len() {
                let parameter = sweeper.parameters[slot];
                let target = sweeper.indexes[slot];
                let dac = self.sequence[target].dac();
                let field = parameter.register_field().ok_or_else(|| {
                    Error::validation(format!("parameter {parameter:?} has no sweep register"))
                })?;

                let (register, start, stop) = match parameter {
                    Parameter::Amplitude => {
                        let register = self.soc.pulse_register(dac, field)?;
                        let max_gain = f64::from(self.soc.max_gain(dac)?);
                        (
                            register,
                            (sweeper.starts[slot] * max_gain).trunc(),
                            (sweeper.stops[slot] * max_gain).trunc(),
                        )
                    }
                    Parameter::Delay => {
                        // a fresh time register replaces the static start
                        // delay; the body syncs to it at execution time
                        let register = self.soc.new_register(dac, field, None)?;
                        self.sequence[target]
                            .set_start_delay(StartTime::Register(register.clone()));
                        (register, sweeper.starts[slot], sweeper.stops[slot])
                    }
                    _ => (
                        self.soc.pulse_register(dac, field)?,
                        sweeper.starts[slot],
                        sweeper.stops[slot],
                    ),
                };
                ranges.push(SweepRange {
                    register,
                    start,
                    stop,
                    expts: sweeper.expts,
                });
            }
        }

        let dimension = SweepDimension::merge(ranges)?;
        self.soc.add_sweep(dimension)?;
        Ok(())
    }

    /// Program every registered pulse up front so the body only fires.
    /// Flux pulses re-register in the body and bare measurements carry no
    /// waveform; in mux mode only drive pulses are pre-registered.
    pub(crate) fn preregister_pulses(&mut self) -> Result<()> {
        let pulses: Vec<_> = self
            .sequence
            .iter()
            .filter_map(|element| element.as_pulse().cloned())
            .collect();
        for pulse in pulses {
            if pulse.kind == ElementKind::Flux {
                continue;
            }
            if self.multiplexed && pulse.kind != ElementKind::Drive {
                continue;
            }
            self.add_pulse_to_register(&pulse)?;
        }
        self.pulses_registered = true;
        Ok(())
    }

    /// Seed the operating gain registers from their swept counterparts.
    pub(crate) fn copy_bias_sweep_registers(&mut self) -> Result<()> {
        let pairs: Vec<_> = self.bias_sweep_registers.values().cloned().collect();
        for (swept, operating) in pairs {
            self.soc.copy_register(&operating, &swept)?;
        }
        Ok(())
    }

    fn swept_qubit(&self, sweeper: &Sweeper, slot: usize) -> Result<Qubit> {
        let target = sweeper.indexes[slot];
        self.qubits.get(target).copied().ok_or_else(|| {
            Error::validation(format!("bias sweep target qubit {target} is out of range"))
        })
    }
}

/// Program executing a pulse sequence under one or more hardware sweeps.
pub struct ExecuteSweeps<'a, T: TProcessor> {
    program: BaseProgram<'a, T>,
    sweepers: Vec<Sweeper>,
}

impl<'a, T: TProcessor> ExecuteSweeps<'a, T> {
    pub fn new(
        soc: &'a mut T,
        config: &Config,
        sequence: Vec<Element>,
        qubits: Vec<Qubit>,
        sweepers: Vec<Sweeper>,
        multiplexed: bool,
    ) -> Result<Self> {
        if sweepers.is_empty() {
            return Err(Error::validation("sweep execution needs at least one sweeper"));
        }
        let sweepers = reversed_sweepers(sweepers);
        let mut program = BaseProgram::new(soc, config, sequence, qubits, multiplexed)?;
        program.sweep_points = Some(sweepers.iter().map(|sweeper| sweeper.expts).product());
        Ok(ExecuteSweeps { program, sweepers })
    }

    /// Compile and run the program, returning per-readout (I, Q) with the
    /// sweep-point axis in place.
    pub fn perform_experiment(mut self) -> Result<IqResults> {
        crate::program::compile(&mut self)?;
        self.program.perform_experiment()
    }
}

impl<T: TProcessor> TProcProgram for ExecuteSweeps<'_, T> {
    fn initialize(&mut self) -> Result<()> {
        self.program.declare_zones_and_ro()?;
        self.program.preregister_pulses()?;
        for sweeper in &self.sweepers {
            self.program.add_sweep_info(sweeper)?;
        }
        self.program.copy_bias_sweep_registers()?;
        self.program.sync_initialize()
    }

    fn body(&mut self) -> Result<()> {
        self.program.body()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{Pulse, Shape};
    use crate::experiment::Config;
    use tproc::mock::{Call, MockTProc};

    fn drive(dac: u8) -> Element {
        Element::Pulse(Pulse {
            kind: ElementKind::Drive,
            frequency: 100.0,
            amplitude: 0.1,
            relative_phase: 0.0,
            start_delay: StartTime::Delay(0.0),
            duration: 0.04,
            name: format!("qd{dac}"),
            dac,
            adc: None,
            shape: Shape::Gaussian { rel_sigma: 5.0 },
        })
    }

    fn readout() -> Element {
        Element::Pulse(Pulse {
            kind: ElementKind::Readout,
            frequency: 100.0,
            amplitude: 0.1,
            relative_phase: 0.0,
            start_delay: StartTime::Delay(0.04),
            duration: 2.0,
            name: "ro0".to_string(),
            dac: 6,
            adc: Some(0),
            shape: Shape::Rectangular,
        })
    }

    fn flux() -> Element {
        Element::Pulse(Pulse {
            kind: ElementKind::Flux,
            frequency: 0.0,
            amplitude: 0.2,
            relative_phase: 0.0,
            start_delay: StartTime::Delay(0.0),
            duration: 0.04,
            name: "fl0".to_string(),
            dac: 2,
            adc: None,
            shape: Shape::Rectangular,
        })
    }

    fn sweeper(parameter: Parameter, target: usize, start: f64, stop: f64) -> Sweeper {
        Sweeper::new(10, vec![parameter], vec![target], vec![start], vec![stop]).unwrap()
    }

    #[test]
    fn bias_sweep_rejects_flux_elements_before_any_register_call() {
        let mut soc = MockTProc::new(8);
        let qubits = vec![Qubit {
            bias: Some(0.3),
            dac: Some(2),
        }];
        let sequence = vec![flux(), readout()];
        let sweepers = vec![sweeper(Parameter::Bias, 0, 0.0, 0.5)];
        let mut sweeps =
            ExecuteSweeps::new(&mut soc, &Config::default(), sequence, qubits, sweepers, false)
                .unwrap();
        let program = &sweeps.program;
        let err = program
            .validate_sweep(&sweeps.sweepers[0])
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = sweeps
            .program
            .add_sweep_info(&sweeps.sweepers[0].clone())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(
            soc.calls
                .iter()
                .all(|call| !matches!(call, Call::AddSweep { .. }))
        );
    }

    #[test]
    fn bias_cannot_mix_with_other_parameters() {
        let mut soc = MockTProc::new(8);
        let qubits = vec![Qubit {
            bias: Some(0.3),
            dac: Some(2),
        }];
        let mixed = Sweeper::new(
            10,
            vec![Parameter::Bias, Parameter::Frequency],
            vec![0, 0],
            vec![0.0, 10.0],
            vec![0.5, 20.0],
        )
        .unwrap();
        let mut program =
            BaseProgram::new(&mut soc, &Config::default(), vec![drive(3)], qubits, false).unwrap();
        let err = program.add_sweep_info(&mixed).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn bias_sweep_needs_complete_qubit_flux_values() {
        let mut soc = MockTProc::new(8);
        let qubits = vec![Qubit {
            bias: None,
            dac: Some(2),
        }];
        let mut program =
            BaseProgram::new(&mut soc, &Config::default(), vec![drive(3)], qubits, false).unwrap();
        let err = program
            .add_sweep_info(&sweeper(Parameter::Bias, 0, 0.0, 0.5))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn duration_sweeps_are_rejected() {
        let mut soc = MockTProc::new(8);
        let mut program =
            BaseProgram::new(&mut soc, &Config::default(), vec![drive(3)], vec![], false).unwrap();
        let err = program
            .add_sweep_info(&sweeper(Parameter::Duration, 0, 0.04, 0.08))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn flux_pulse_targets_are_rejected() {
        let mut soc = MockTProc::new(8);
        let mut program =
            BaseProgram::new(&mut soc, &Config::default(), vec![flux()], vec![], false).unwrap();
        let err = program
            .add_sweep_info(&sweeper(Parameter::Amplitude, 0, 0.0, 0.5))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn delay_sweep_rewrites_the_target_start_time() {
        let mut soc = MockTProc::new(8);
        let mut program = BaseProgram::new(
            &mut soc,
            &Config::default(),
            vec![drive(3), readout()],
            vec![],
            false,
        )
        .unwrap();
        program
            .add_sweep_info(&sweeper(Parameter::Delay, 1, 0.0, 1.0))
            .unwrap();
        assert!(matches!(
            program.sequence[1].start_delay(),
            StartTime::Register(_)
        ));

        // the body now syncs to the register instead of a static delay
        program.body().unwrap();
        assert!(
            soc.calls
                .iter()
                .any(|call| matches!(call, Call::SyncToRegister { .. }))
        );
    }

    #[test]
    fn sweepers_declare_reversed_with_one_dimension_each() {
        let mut soc = MockTProc::new(8);
        let sequence = vec![drive(3), readout()];
        let sweepers = vec![
            sweeper(Parameter::Frequency, 0, 10.0, 20.0),
            sweeper(Parameter::Amplitude, 0, 0.0, 0.5),
        ];
        let mut sweeps = ExecuteSweeps::new(
            &mut soc,
            &Config::default(),
            sequence,
            vec![],
            sweepers,
            false,
        )
        .unwrap();
        sweeps.initialize().unwrap();

        let dimensions: Vec<&Vec<_>> = soc
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::AddSweep { registers, .. } => Some(registers),
                _ => None,
            })
            .collect();
        assert_eq!(dimensions.len(), 2);
        // caller order reversed: amplitude (gain register) first
        assert_eq!(dimensions[0][0].field, RegisterField::Gain);
        assert_eq!(dimensions[1][0].field, RegisterField::Frequency);
    }

    #[test]
    fn bias_sweep_allocates_a_fresh_register_and_seeds_the_gain() {
        let mut soc = MockTProc::new(8);
        let qubits = vec![Qubit {
            bias: Some(0.3),
            dac: Some(2),
        }];
        let sequence = vec![drive(3), readout()];
        let sweepers = vec![sweeper(Parameter::Bias, 0, 0.0, 0.5)];
        let mut sweeps =
            ExecuteSweeps::new(&mut soc, &Config::default(), sequence, qubits, sweepers, false)
                .unwrap();
        sweeps.initialize().unwrap();
        sweeps.body().unwrap();

        let swept = soc
            .calls
            .iter()
            .find_map(|call| match call {
                Call::AddSweep { registers, .. } => Some(registers[0].clone()),
                _ => None,
            })
            .expect("bias sweep declared");
        // fresh register, distinct from the static gain register
        assert!(swept.addr >= 10);

        // the operating register is seeded from the swept one
        assert!(soc.calls.iter().any(|call| matches!(
            call,
            Call::CopyRegister { dst, src } if src == &swept && dst.addr != swept.addr
        )));

        // the body updates bias through registers, not waveforms
        assert!(
            soc.calls
                .iter()
                .any(|call| matches!(call, Call::WriteRegister { value: 0, .. }))
        );
        assert!(soc.waveform_names(2).is_empty());
    }

    #[test]
    fn sweep_acquisition_carries_the_point_axis() {
        let mut soc = MockTProc::new(8);
        let config = Config {
            reps: 4,
            average: false,
            ..Config::default()
        };
        let sequence = vec![drive(3), readout()];
        let sweepers = vec![sweeper(Parameter::Frequency, 0, 10.0, 20.0)];
        let sweeps =
            ExecuteSweeps::new(&mut soc, &config, sequence, vec![], sweepers, false).unwrap();
        let results = sweeps.perform_experiment().unwrap();
        assert_eq!(results.i.len(), 1);
        assert_eq!(results.i[0].shape(), &[1, 10, 4]);
    }

    #[test]
    fn averaged_sweep_reduces_the_shot_axis() {
        let mut soc = MockTProc::new(8);
        let config = Config {
            reps: 4,
            average: true,
            ..Config::default()
        };
        let sequence = vec![drive(3), readout()];
        let sweepers = vec![sweeper(Parameter::Frequency, 0, 10.0, 20.0)];
        let sweeps =
            ExecuteSweeps::new(&mut soc, &config, sequence, vec![], sweepers, false).unwrap();
        let results = sweeps.perform_experiment().unwrap();
        assert_eq!(results.i[0].shape(), &[1, 10]);
    }
}

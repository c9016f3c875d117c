// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Plain pulse-sequence execution, without hardware sweeps.

use tproc::TProcessor;

use crate::Result;
use crate::elements::Element;
use crate::experiment::{Config, Qubit};
use crate::program::TProcProgram;
use crate::program::base::{BaseProgram, IqResults};

/// Program executing one pulse sequence.
///
/// Initialization only declares channels and readouts; pulse registers are
/// programmed lazily in the body, re-using the previous program whenever the
/// next pulse on a DAC is identical up to its start time.
pub struct ExecutePulseSequence<'a, T: TProcessor> {
    program: BaseProgram<'a, T>,
}

impl<'a, T: TProcessor> ExecutePulseSequence<'a, T> {
    pub fn new(
        soc: &'a mut T,
        config: &Config,
        sequence: Vec<Element>,
        qubits: Vec<Qubit>,
        multiplexed: bool,
    ) -> Result<Self> {
        Ok(ExecutePulseSequence {
            program: BaseProgram::new(soc, config, sequence, qubits, multiplexed)?,
        })
    }

    /// Compile and run the program, returning per-readout (I, Q).
    pub fn perform_experiment(mut self) -> Result<IqResults> {
        crate::program::compile(&mut self)?;
        self.program.perform_experiment()
    }
}

impl<T: TProcessor> TProcProgram for ExecutePulseSequence<'_, T> {
    fn initialize(&mut self) -> Result<()> {
        self.program.declare_zones_and_ro()?;
        self.program.sync_initialize()
    }

    fn body(&mut self) -> Result<()> {
        self.program.body()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{ElementKind, Measurement, Pulse, Shape, StartTime};
    use tproc::mock::{Call, MockTProc};

    fn drive() -> Element {
        Element::Pulse(Pulse {
            kind: ElementKind::Drive,
            frequency: 100.0,
            amplitude: 0.1,
            relative_phase: 0.0,
            start_delay: StartTime::Delay(0.0),
            duration: 0.04,
            name: "qd0".to_string(),
            dac: 3,
            adc: None,
            shape: Shape::Gaussian { rel_sigma: 5.0 },
        })
    }

    fn readout(adc: u8, start_delay: f64) -> Element {
        Element::Pulse(Pulse {
            kind: ElementKind::Readout,
            frequency: 100.0,
            amplitude: 0.1,
            relative_phase: 0.0,
            start_delay: StartTime::Delay(start_delay),
            duration: 0.04,
            name: format!("ro{adc}"),
            dac: 6,
            adc: Some(adc),
            shape: Shape::Rectangular,
        })
    }

    #[test]
    fn sequence_declares_zones_and_measures_once() {
        let mut soc = MockTProc::new(8);
        let config = Config {
            reps: 3,
            average: false,
            ..Config::default()
        };
        let sequence = vec![drive(), readout(0, 0.04)];
        let program =
            ExecutePulseSequence::new(&mut soc, &config, sequence, vec![Qubit::default()], false)
                .unwrap();
        let results = program.perform_experiment().unwrap();

        // one zone-1 declaration each for the drive and readout DACs
        assert_eq!(soc.generator_declarations(), vec![(3, 1), (6, 1)]);
        assert_eq!(soc.measure_count(), 1);
        // one readout on one ADC: (readout_count, shots)
        assert_eq!(results.i.len(), 1);
        assert_eq!(results.i[0].shape(), &[1, 3]);
        assert_eq!(results.q[0].shape(), &[1, 3]);
    }

    #[test]
    fn averaged_sequence_reduces_the_shot_axis() {
        let mut soc = MockTProc::new(8);
        let config = Config {
            reps: 3,
            average: true,
            ..Config::default()
        };
        let sequence = vec![drive(), readout(0, 0.04)];
        let program = ExecutePulseSequence::new(&mut soc, &config, sequence, vec![], false).unwrap();
        let results = program.perform_experiment().unwrap();
        assert_eq!(results.i[0].shape(), &[1]);
    }

    #[test]
    fn sequence_without_readouts_returns_empty_results() {
        let mut soc = MockTProc::new(8);
        let program = ExecutePulseSequence::new(
            &mut soc,
            &Config::default(),
            vec![drive()],
            vec![],
            false,
        )
        .unwrap();
        let results = program.perform_experiment().unwrap();
        assert!(results.i.is_empty());
        assert!(results.q.is_empty());

        // the runtime still acquires with one read per repetition
        assert!(soc.calls.iter().any(|call| matches!(
            call,
            Call::Acquire {
                reads_per_experiment: 1,
                ..
            }
        )));
    }

    #[test]
    fn mux_group_fires_one_combined_trigger() {
        let mut soc = MockTProc::new(8);
        let config = Config {
            reps: 2,
            average: false,
            ..Config::default()
        };
        let sequence = vec![drive(), readout(0, 0.04), readout(1, 0.0)];
        let program = ExecutePulseSequence::new(&mut soc, &config, sequence, vec![], true).unwrap();
        let results = program.perform_experiment().unwrap();

        assert_eq!(soc.measure_count(), 1);
        let adcs = soc
            .calls
            .iter()
            .find_map(|call| match call {
                Call::TriggerAndMeasure { adcs, .. } => Some(adcs.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(adcs, vec![0, 1]);
        // one readout per adc, two adcs
        assert_eq!(results.i.len(), 2);
        assert_eq!(results.i[0].shape(), &[1, 2]);
    }

    #[test]
    fn bare_measurement_triggers_without_registering() {
        let mut soc = MockTProc::new(8);
        let config = Config {
            reps: 2,
            average: false,
            ..Config::default()
        };
        let sequence = vec![
            drive(),
            Element::Measurement(Measurement {
                kind: ElementKind::Readout,
                frequency: 100.0,
                start_delay: StartTime::Delay(0.04),
                duration: 2.0,
                dac: 6,
                adc: Some(0),
            }),
        ];
        let program = ExecutePulseSequence::new(&mut soc, &config, sequence, vec![], false).unwrap();
        let results = program.perform_experiment().unwrap();

        assert_eq!(soc.measure_count(), 1);
        // nothing was programmed on the readout DAC
        assert_eq!(soc.register_programs(6), 0);
        assert_eq!(results.i[0].shape(), &[1, 2]);
    }

    #[test]
    fn start_delays_advance_the_timeline() {
        let mut soc = MockTProc::new(8);
        let sequence = vec![drive(), readout(0, 0.5)];
        let program =
            ExecutePulseSequence::new(&mut soc, &Config::default(), sequence, vec![], false)
                .unwrap();
        program.perform_experiment().unwrap();

        // 0.5 µs at the tProc clock of 430.08 MHz
        assert!(
            soc.calls
                .iter()
                .any(|call| matches!(call, Call::AdvanceTime { cycles: 215 }))
        );
    }
}

// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Experiment-level entities: acquisition configuration, qubits, sweeps.

use serde::{Deserialize, Serialize};
use tproc::{Channel, RegisterField};

use crate::{Error, Result};

/// General acquisition configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Time to wait between shots (µs).
    pub relaxation_time: f64,
    /// Time between readout pulse and acquisition (ADC clock ticks).
    pub ro_time_of_flight: u32,
    /// Number of shots.
    pub reps: u32,
    /// Number of software averages.
    pub soft_avgs: u32,
    /// Return integrated results if true.
    pub average: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            relaxation_time: 100.0,
            ro_time_of_flight: 200,
            reps: 1000,
            soft_avgs: 1,
            average: true,
        }
    }
}

/// Operations available on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OperationCode {
    ExecutePulseSequence = 1,
    ExecutePulseSequenceRaw = 2,
    ExecuteSweeps = 3,
}

impl TryFrom<u8> for OperationCode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            1 => Ok(OperationCode::ExecutePulseSequence),
            2 => Ok(OperationCode::ExecutePulseSequenceRaw),
            3 => Ok(OperationCode::ExecuteSweeps),
            _ => Err(Error::validation(format!("unknown operation code {code}"))),
        }
    }
}

/// Qubit object, storing flux information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Qubit {
    /// Amplitude factor of the sweetspot bias.
    #[serde(default)]
    pub bias: Option<f64>,
    /// DAC responsible for flux control.
    #[serde(default)]
    pub dac: Option<Channel>,
}

/// Parameters available for sweeps, with their wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parameter {
    #[serde(rename = "freq")]
    Frequency,
    #[serde(rename = "gain")]
    Amplitude,
    #[serde(rename = "phase")]
    RelativePhase,
    #[serde(rename = "t")]
    Delay,
    #[serde(rename = "bias")]
    Bias,
    #[serde(rename = "duration")]
    Duration,
}

impl Parameter {
    /// Generator register backing the parameter, when one exists.
    pub(crate) fn register_field(self) -> Option<RegisterField> {
        match self {
            Parameter::Frequency => Some(RegisterField::Frequency),
            Parameter::Amplitude => Some(RegisterField::Gain),
            Parameter::RelativePhase => Some(RegisterField::Phase),
            Parameter::Delay => Some(RegisterField::Time),
            Parameter::Bias | Parameter::Duration => None,
        }
    }
}

/// One or more linearly swept parameters over enumerated targets.
///
/// `indexes` point into the pulse list for pulse parameters and into the
/// qubit list for bias sweeps. All parameter slots share one point count and
/// advance together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSweeper")]
pub struct Sweeper {
    /// Number of points of the sweeper.
    pub expts: u32,
    pub parameters: Vec<Parameter>,
    pub indexes: Vec<usize>,
    pub starts: Vec<f64>,
    pub stops: Vec<f64>,
}

impl Sweeper {
    pub fn new(
        expts: u32,
        parameters: Vec<Parameter>,
        indexes: Vec<usize>,
        starts: Vec<f64>,
        stops: Vec<f64>,
    ) -> Result<Self> {
        let slots = parameters.len();
        if slots == 0 {
            return Err(Error::validation("sweeper has no parameters"));
        }
        if indexes.len() != slots || starts.len() != slots || stops.len() != slots {
            return Err(Error::validation(
                "sweeper parameters, indexes, starts and stops must have equal length",
            ));
        }
        for (parameter, stop) in parameters.iter().zip(&stops) {
            if *parameter == Parameter::Amplitude && *stop > 1.0 {
                return Err(Error::validation("amplitude sweep cannot exceed 1"));
            }
        }
        Ok(Sweeper {
            expts,
            parameters,
            indexes,
            starts,
            stops,
        })
    }
}

#[derive(Deserialize)]
struct RawSweeper {
    expts: u32,
    parameters: Vec<Parameter>,
    indexes: Vec<usize>,
    starts: Vec<f64>,
    stops: Vec<f64>,
}

impl TryFrom<RawSweeper> for Sweeper {
    type Error = Error;

    fn try_from(raw: RawSweeper) -> Result<Self> {
        Sweeper::new(
            raw.expts,
            raw.parameters,
            raw.indexes,
            raw.starts,
            raw.stops,
        )
    }
}

/// Reverse the caller's sweeper order: the runtime iterates sweep dimensions
/// in the opposite order of declaration.
pub fn reversed_sweepers(sweepers: impl IntoIterator<Item = Sweeper>) -> Vec<Sweeper> {
    let mut out: Vec<Sweeper> = sweepers.into_iter().collect();
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert_eq!(config.relaxation_time, 100.0);
        assert_eq!(config.ro_time_of_flight, 200);
        assert_eq!(config.reps, 1000);
        assert_eq!(config.soft_avgs, 1);
        assert!(config.average);
    }

    #[test]
    fn operation_codes_round_trip() {
        assert_eq!(
            OperationCode::try_from(3).unwrap(),
            OperationCode::ExecuteSweeps
        );
        assert!(matches!(
            OperationCode::try_from(9),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn amplitude_sweep_is_bounded_by_full_scale() {
        let full = Sweeper::new(
            10,
            vec![Parameter::Amplitude],
            vec![0],
            vec![0.0],
            vec![1.0],
        );
        assert!(full.is_ok());

        let over = Sweeper::new(
            10,
            vec![Parameter::Amplitude],
            vec![0],
            vec![0.0],
            vec![1.01],
        );
        assert!(matches!(over, Err(Error::Validation(_))));
    }

    #[test]
    fn sweeper_arrays_must_agree() {
        let uneven = Sweeper::new(
            10,
            vec![Parameter::Frequency, Parameter::Amplitude],
            vec![0],
            vec![0.0, 0.0],
            vec![1.0, 1.0],
        );
        assert!(matches!(uneven, Err(Error::Validation(_))));
    }

    #[test]
    fn sweepers_decode_with_wire_parameter_names() {
        let json = r#"{"expts": 50, "parameters": ["freq", "gain"],
                       "indexes": [0, 0], "starts": [10.0, 0.0],
                       "stops": [20.0, 0.5]}"#;
        let sweeper: Sweeper = serde_json::from_str(json).unwrap();
        assert_eq!(
            sweeper.parameters,
            vec![Parameter::Frequency, Parameter::Amplitude]
        );

        let over = r#"{"expts": 50, "parameters": ["gain"], "indexes": [0],
                       "starts": [0.0], "stops": [1.5]}"#;
        assert!(serde_json::from_str::<Sweeper>(over).is_err());
    }

    #[test]
    fn sweepers_reverse_to_hardware_order() {
        let first = Sweeper::new(2, vec![Parameter::Frequency], vec![0], vec![0.0], vec![1.0])
            .unwrap();
        let second =
            Sweeper::new(3, vec![Parameter::Delay], vec![1], vec![0.0], vec![1.0]).unwrap();
        let reversed = reversed_sweepers([first.clone(), second.clone()]);
        assert_eq!(reversed, vec![second, first]);
    }
}

// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Element and pulse model.
//!
//! An experiment is an ordered list of [`Element`]s: waveform-carrying
//! [`Pulse`]s and bare-trigger [`Measurement`]s. The registration identity of
//! a pulse excludes its start time — two pulses equal on everything but
//! `start_delay` and sharing a DAC reuse one hardware program, which is what
//! the per-program waveform cache keys on.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use tproc::{Channel, RegisterHandle};

/// Role of an element in the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Drive,
    Flux,
    Readout,
}

/// Start time of an element.
///
/// Elements arrive from the wire with a microsecond delay relative to the
/// previous element. A delay sweep replaces the value with a hardware time
/// register; this is the only in-place mutation the compiler performs on the
/// sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum StartTime {
    /// Delay in microseconds.
    Delay(f64),
    /// Time register consumed at execution time.
    Register(RegisterHandle),
}

impl StartTime {
    pub fn as_delay(&self) -> Option<f64> {
        match self {
            StartTime::Delay(us) => Some(*us),
            StartTime::Register(_) => None,
        }
    }
}

impl Serialize for StartTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StartTime::Delay(us) => serializer.serialize_f64(*us),
            StartTime::Register(_) => Err(serde::ser::Error::custom(
                "a swept start time has no wire representation",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for StartTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(StartTime::Delay)
    }
}

/// Envelope of a pulse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Shape {
    Rectangular,
    Gaussian {
        /// Sigma as a fraction of the pulse duration.
        rel_sigma: f64,
    },
    Drag {
        rel_sigma: f64,
        /// DRAG coefficient of the derivative quadrature.
        beta: f64,
    },
    FlatTop {
        rel_sigma: f64,
    },
    /// Double-exponential flux envelope; computes its own samples.
    FluxExponential {
        tau: f64,
        upsilon: f64,
        weight: f64,
    },
    /// Caller-supplied raw samples.
    Arbitrary {
        i_values: Vec<f64>,
        q_values: Vec<f64>,
    },
}

impl Shape {
    /// Envelope style keyword of the runtime, `"const"` or `"arb"`.
    pub fn style(&self) -> &'static str {
        match self {
            Shape::Rectangular => "const",
            _ => "arb",
        }
    }
}

/// A waveform-carrying element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pulse {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    /// Frequency in MHz.
    pub frequency: f64,
    /// Amplitude as a fraction of the DAC maximum gain.
    pub amplitude: f64,
    /// Relative phase in degrees.
    pub relative_phase: f64,
    pub start_delay: StartTime,
    /// Duration in microseconds.
    pub duration: f64,
    /// Name of the pulse, typically a serial.
    pub name: String,
    /// DAC responsible for firing the pulse.
    pub dac: Channel,
    /// ADC acquiring the pulse back, for readout pulses.
    #[serde(default)]
    pub adc: Option<Channel>,
    #[serde(flatten)]
    pub shape: Shape,
}

impl Pulse {
    /// Deterministic waveform-table key of this pulse on its DAC, or `None`
    /// when no table is needed (rectangular envelopes live entirely in the
    /// length register).
    ///
    /// The key is a pure function of (dac, shape parameters, duration), so
    /// identical pulses at different start times hit the same cache entry.
    pub fn waveform_name(&self) -> Option<String> {
        match &self.shape {
            Shape::Rectangular => None,
            Shape::Gaussian { rel_sigma } => Some(format!(
                "{}_gaussian_{}_{}",
                self.dac, rel_sigma, self.duration
            )),
            Shape::Drag { rel_sigma, beta } => Some(format!(
                "{}_drag_{}_{}_{}",
                self.dac, rel_sigma, beta, self.duration
            )),
            Shape::FlatTop { rel_sigma } => Some(format!(
                "{}_flat_top_{}_{}",
                self.dac, rel_sigma, self.duration
            )),
            Shape::FluxExponential {
                tau,
                upsilon,
                weight,
            } => Some(format!(
                "{}_flux_exponential_{}_{}_{}_{}",
                self.dac, tau, upsilon, weight, self.duration
            )),
            Shape::Arbitrary { .. } => Some(self.name.clone()),
        }
    }

    pub fn style(&self) -> &'static str {
        self.shape.style()
    }
}

// Registration identity: start time excluded.
impl PartialEq for Pulse {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.frequency == other.frequency
            && self.amplitude == other.amplitude
            && self.relative_phase == other.relative_phase
            && self.duration == other.duration
            && self.name == other.name
            && self.dac == other.dac
            && self.adc == other.adc
            && self.shape == other.shape
    }
}

/// A bare-measurement element: triggers acquisition without firing a
/// waveform of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub frequency: f64,
    pub start_delay: StartTime,
    pub duration: f64,
    pub dac: Channel,
    #[serde(default)]
    pub adc: Option<Channel>,
}

impl PartialEq for Measurement {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.frequency == other.frequency
            && self.duration == other.duration
            && self.dac == other.dac
            && self.adc == other.adc
    }
}

/// One event of the experiment sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Element {
    Pulse(Pulse),
    Measurement(Measurement),
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Pulse(pulse) => pulse.kind,
            Element::Measurement(measurement) => measurement.kind,
        }
    }

    pub fn frequency(&self) -> f64 {
        match self {
            Element::Pulse(pulse) => pulse.frequency,
            Element::Measurement(measurement) => measurement.frequency,
        }
    }

    pub fn duration(&self) -> f64 {
        match self {
            Element::Pulse(pulse) => pulse.duration,
            Element::Measurement(measurement) => measurement.duration,
        }
    }

    pub fn dac(&self) -> Channel {
        match self {
            Element::Pulse(pulse) => pulse.dac,
            Element::Measurement(measurement) => measurement.dac,
        }
    }

    pub fn adc(&self) -> Option<Channel> {
        match self {
            Element::Pulse(pulse) => pulse.adc,
            Element::Measurement(measurement) => measurement.adc,
        }
    }

    pub fn start_delay(&self) -> &StartTime {
        match self {
            Element::Pulse(pulse) => &pulse.start_delay,
            Element::Measurement(measurement) => &measurement.start_delay,
        }
    }

    pub fn set_start_delay(&mut self, start_delay: StartTime) {
        match self {
            Element::Pulse(pulse) => pulse.start_delay = start_delay,
            Element::Measurement(measurement) => measurement.start_delay = start_delay,
        }
    }

    pub fn as_pulse(&self) -> Option<&Pulse> {
        match self {
            Element::Pulse(pulse) => Some(pulse),
            Element::Measurement(_) => None,
        }
    }

    /// Waveform-table key; `None` for rectangular pulses and measurements.
    pub fn waveform_name(&self) -> Option<String> {
        match self {
            Element::Pulse(pulse) => pulse.waveform_name(),
            Element::Measurement(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(shape: Shape) -> Pulse {
        Pulse {
            kind: ElementKind::Drive,
            frequency: 100.0,
            amplitude: 0.1,
            relative_phase: 0.0,
            start_delay: StartTime::Delay(0.0),
            duration: 0.04,
            name: "p0".to_string(),
            dac: 3,
            adc: None,
            shape,
        }
    }

    #[test]
    fn waveform_name_is_none_only_for_rectangular() {
        assert!(drive(Shape::Rectangular).waveform_name().is_none());
        let measurement = Element::Measurement(Measurement {
            kind: ElementKind::Readout,
            frequency: 100.0,
            start_delay: StartTime::Delay(0.0),
            duration: 2.0,
            dac: 6,
            adc: Some(0),
        });
        assert!(measurement.waveform_name().is_none());

        let shaped = [
            Shape::Gaussian { rel_sigma: 5.0 },
            Shape::Drag {
                rel_sigma: 5.0,
                beta: 1.0,
            },
            Shape::FlatTop { rel_sigma: 5.0 },
            Shape::FluxExponential {
                tau: 1.0,
                upsilon: 2.0,
                weight: 0.1,
            },
            Shape::Arbitrary {
                i_values: vec![0.0, 1.0],
                q_values: vec![0.0, 0.0],
            },
        ];
        for shape in shaped {
            assert!(drive(shape).waveform_name().is_some());
        }
    }

    #[test]
    fn waveform_name_is_deterministic() {
        let pulse = drive(Shape::Gaussian { rel_sigma: 5.0 });
        assert_eq!(pulse.waveform_name(), pulse.waveform_name());
        assert_eq!(pulse.waveform_name().unwrap(), "3_gaussian_5_0.04");

        // same shape parameters on another dac must not collide
        let mut other = pulse.clone();
        other.dac = 4;
        assert_ne!(pulse.waveform_name(), other.waveform_name());
    }

    #[test]
    fn style_follows_shape() {
        assert_eq!(drive(Shape::Rectangular).style(), "const");
        assert_eq!(drive(Shape::Gaussian { rel_sigma: 5.0 }).style(), "arb");
    }

    #[test]
    fn equality_ignores_start_time() {
        let pulse = drive(Shape::Gaussian { rel_sigma: 5.0 });
        let mut shifted = pulse.clone();
        shifted.start_delay = StartTime::Delay(1.5);
        assert_eq!(pulse, shifted);

        let mut detuned = pulse.clone();
        detuned.frequency += 1.0;
        assert_ne!(pulse, detuned);
    }

    #[test]
    fn elements_decode_from_wire_json() {
        let json = r#"[
            {"type": "drive", "frequency": 100.0, "amplitude": 0.1,
             "relative_phase": 0.0, "start_delay": 0.0, "duration": 0.04,
             "name": "p0", "dac": 3, "adc": null,
             "shape": "gaussian", "rel_sigma": 5.0},
            {"type": "readout", "frequency": 100.0, "amplitude": 0.1,
             "relative_phase": 0.0, "start_delay": 0.0, "duration": 2.0,
             "name": "ro0", "dac": 6, "adc": 0, "shape": "rectangular"},
            {"type": "readout", "frequency": 100.0, "start_delay": 0.0,
             "duration": 2.0, "dac": 6, "adc": 0}
        ]"#;
        let elements: Vec<Element> = serde_json::from_str(json).unwrap();
        assert_eq!(elements.len(), 3);
        assert!(
            matches!(&elements[0], Element::Pulse(p) if matches!(p.shape, Shape::Gaussian { rel_sigma } if rel_sigma == 5.0))
        );
        assert!(matches!(&elements[1], Element::Pulse(p) if p.shape == Shape::Rectangular));
        assert!(matches!(&elements[2], Element::Measurement(_)));
    }
}

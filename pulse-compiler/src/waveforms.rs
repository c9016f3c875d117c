// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Envelope synthesis at DAC sample resolution.
//!
//! The compiler uploads raw sample tables; all envelopes are evaluated here
//! as plain `f64` I/Q vectors, scaled to the target DAC's gain range by the
//! caller-provided peak amplitude.

use std::f64::consts::PI;

/// Gaussian envelope `peak · e^{-(x-µ)²/σ²}` centered in the table.
pub fn gaussian(num_samples: usize, sigma: f64, peak: f64) -> Vec<f64> {
    let mu = (num_samples as f64 - 1.0) / 2.0;
    (0..num_samples)
        .map(|x| {
            let t = x as f64 - mu;
            peak * (-(t * t) / (sigma * sigma)).exp()
        })
        .collect()
}

/// DRAG envelope: gaussian I component plus a derivative Q component
/// `-α · dI/dx / (2π·δ)`, with `delta` the detuning normalized per sample.
pub fn drag(
    num_samples: usize,
    sigma: f64,
    delta: f64,
    alpha: f64,
    peak: f64,
) -> (Vec<f64>, Vec<f64>) {
    let mu = (num_samples as f64 - 1.0) / 2.0;
    let i_samples = gaussian(num_samples, sigma, peak);
    let q_samples = i_samples
        .iter()
        .enumerate()
        .map(|(x, i)| {
            let derivative = -(x as f64 - mu) / (sigma * sigma) * i;
            -alpha * derivative / (2.0 * PI * delta)
        })
        .collect();
    (i_samples, q_samples)
}

/// Flat-top envelope: gaussian rise and fall of 3σ around a constant body.
pub fn flat_top(num_samples: usize, sigma: f64, peak: f64) -> Vec<f64> {
    let edge = ((3.0 * sigma).round() as usize).min(num_samples / 2);
    let ramps = gaussian(2 * edge, sigma, peak);
    let mut samples = vec![peak; num_samples];
    samples[..edge].copy_from_slice(&ramps[..edge]);
    samples[num_samples - edge..].copy_from_slice(&ramps[edge..]);
    samples
}

/// Double-exponential flux envelope
/// `amp · (e^{-t/υ} + w·e^{-t/τ}) / (1 + w)`, `t` in samples.
pub fn flux_exponential(num_samples: usize, amp: f64, tau: f64, upsilon: f64, weight: f64) -> Vec<f64> {
    (0..num_samples)
        .map(|x| {
            let t = x as f64;
            amp * ((-t / upsilon).exp() + weight * (-t / tau).exp()) / (1.0 + weight)
        })
        .collect()
}

/// Predistorted rectangular flux envelope, compensating the known DC and RF
/// filtering of the flux line:
/// `clip(0.9·amp·(0.5·(1 + e^{0.155·t}) + 0.05·e^{-100·t}), ±max_gain)`
/// with `t` in microseconds from the pulse start.
pub fn predistorted_rectangular(
    num_samples: usize,
    amp: f64,
    duration_us: f64,
    max_gain: f64,
) -> Vec<f64> {
    (0..num_samples)
        .map(|x| {
            let t = x as f64 * duration_us / num_samples as f64;
            let dc_compensation = (0.155 * t).exp();
            let rf_compensation = 0.05 * (-100.0 * t).exp();
            let value = 0.9 * amp * (0.5 * (1.0 + dc_compensation) + rf_compensation);
            value.clamp(-max_gain, max_gain)
        })
        .collect()
}

/// Constant table, used to park bias lines.
pub fn constant(num_samples: usize, value: f64) -> Vec<f64> {
    vec![value; num_samples]
}

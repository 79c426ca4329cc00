//! Simulated PV output.
//!
//! Output is zero outside `[SUNRISE_HOUR, SUNSET_HOUR)` local time. Inside
//! that window it follows a single positive cosine lobe scaled by a
//! per-installation amplitude, plus a small uniform noise drawn on every call.

use chrono::{DateTime, Local, Timelike};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Upper bound (exclusive) of the per-installation amplitude.
pub const MAX_POWER_KW: f64 = 4.0;
pub const POWER_NOISE_KW: f64 = 0.01;

pub const SUNRISE_HOUR: u32 = 8;
pub const SUNSET_HOUR: u32 = 20;

// Changing the period or shift constants can push the lobe below zero inside
// the daylight window.
pub const PERIOD_FACTOR: f64 = 1.0 / 15_000.0;
pub const SHIFT_BASE: f64 = 10_000.0;
pub const SHIFT_NOISE_MIN: f64 = -0.05;
pub const SHIFT_NOISE_MAX: f64 = 0.02;

/// Per-installation curve parameters, drawn once and kept for the service's lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarParameters {
    /// kW, in `[0, MAX_POWER_KW)`.
    pub amplitude_factor: f64,
    /// Radians.
    pub phase_shift: f64,
}

impl SolarParameters {
    pub fn new(amplitude_factor: f64, phase_shift: f64) -> Self {
        Self {
            amplitude_factor,
            phase_shift,
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let amplitude_factor = rng.gen::<f64>() * MAX_POWER_KW;
        let phase_shift = SHIFT_BASE + rng.gen::<f64>() * (SHIFT_NOISE_MAX - SHIFT_NOISE_MIN)
            - SHIFT_NOISE_MIN.abs();
        Self {
            amplitude_factor,
            phase_shift,
        }
    }
}

/// Hour of day of `time_s` in the process's local timezone.
pub fn local_hour(time_s: i64) -> Option<u32> {
    DateTime::from_timestamp(time_s, 0).map(|utc| utc.with_timezone(&Local).hour())
}

pub fn is_daylight(hour: u32) -> bool {
    (SUNRISE_HOUR..SUNSET_HOUR).contains(&hour)
}

/// The daylight curve without noise.
pub fn noise_free_power(time_s: i64, amplitude_factor: f64, phase_shift: f64) -> f64 {
    amplitude_factor * (time_s as f64 * PERIOD_FACTOR - phase_shift).cos()
}

fn power_noise<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(-POWER_NOISE_KW..=POWER_NOISE_KW)
}

/// Simulated PV output in kW at `time_s`, with noise drawn from `rng`.
pub fn simulate_with<R: Rng + ?Sized>(
    rng: &mut R,
    time_s: i64,
    amplitude_factor: f64,
    phase_shift: f64,
) -> f64 {
    match local_hour(time_s) {
        Some(hour) if is_daylight(hour) => {
            noise_free_power(time_s, amplitude_factor, phase_shift) + power_noise(rng)
        }
        _ => 0.0,
    }
}

pub fn simulate(time_s: i64, amplitude_factor: f64, phase_shift: f64) -> f64 {
    simulate_with(&mut rand::thread_rng(), time_s, amplitude_factor, phase_shift)
}

/// Source of the PV value paired with each meter reading.
pub trait PowerSource: Send {
    fn power_kw(&mut self, time_s: i64) -> f64;
}

/// One simulated installation: fixed curve parameters and its own noise generator.
pub struct SimulatedPv {
    params: SolarParameters,
    rng: StdRng,
}

impl SimulatedPv {
    pub fn new(params: SolarParameters) -> Self {
        Self {
            params,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_rng(params: SolarParameters, rng: StdRng) -> Self {
        Self { params, rng }
    }

    /// Draws fresh parameters for a new installation.
    pub fn random() -> Self {
        Self::new(SolarParameters::random(&mut rand::thread_rng()))
    }

    pub fn parameters(&self) -> SolarParameters {
        self.params
    }
}

impl PowerSource for SimulatedPv {
    fn power_kw(&mut self, time_s: i64) -> f64 {
        simulate_with(
            &mut self.rng,
            time_s,
            self.params.amplitude_factor,
            self.params.phase_shift,
        )
    }
}

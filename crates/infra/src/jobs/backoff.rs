//! Sinusoidal backoff.
//!
//! The delay grows geometrically with the attempt count and is modulated by a
//! sine wave, so jobs that failed at the same moment drift apart instead of
//! probing the target in lock-step. The result is clipped to `[0, max]`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Deterministic, attempt-indexed retry delay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SineBackoff {
    base: Duration,
    growth: f64,
    amplitude: f64,
    frequency: f64,
    max: Duration,
}

impl Default for SineBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            growth: 1.5,
            amplitude: 0.5,
            frequency: 1.0,
            max: Duration::from_secs(300),
        }
    }
}

impl SineBackoff {
    /// Build a policy. `growth` is raised to at least 1.0 and `amplitude` is
    /// clamped to `[0, 1]`; a non-finite `frequency` is treated as 0.
    pub fn new(base: Duration, growth: f64, amplitude: f64, frequency: f64, max: Duration) -> Self {
        let growth = if growth.is_finite() { growth.max(1.0) } else { 1.0 };
        let amplitude = if amplitude.is_finite() {
            amplitude.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let frequency = if frequency.is_finite() { frequency } else { 0.0 };
        Self {
            base,
            growth,
            amplitude,
            frequency,
            max,
        }
    }

    /// A flat delay with no growth and no oscillation.
    pub fn constant(delay: Duration) -> Self {
        Self::new(delay, 1.0, 0.0, 0.0, delay)
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn growth(&self) -> f64 {
        self.growth
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay to wait before attempt number `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.base.as_secs_f64() * self.growth.powi(exponent);
        let phase = f64::from(attempt) * self.frequency;
        let modulated = scaled * (1.0 + self.amplitude * phase.sin());

        if modulated.is_nan() {
            // 0 * inf
            return Duration::ZERO;
        }
        if !modulated.is_finite() || modulated >= max_secs {
            return self.max;
        }
        if modulated <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(modulated)
    }
}

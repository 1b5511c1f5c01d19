//! Bang-bang heater control with a hysteresis dead-band.

use serde::{Deserialize, Serialize};

use crate::error::SensorFault;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HysteresisConfig {
    /// Heater turns on below `target - hysteresis_low_c`.
    pub hysteresis_low_c: f64,
    /// Heater turns off at or above `target + hysteresis_high_c`.
    pub hysteresis_high_c: f64,
    /// Hard cutoff regardless of target.
    pub max_temperature_c: f64,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            hysteresis_low_c: 1.0,
            hysteresis_high_c: 1.0,
            max_temperature_c: 300.0,
        }
    }
}

impl HysteresisConfig {
    pub fn new(hysteresis_low_c: f64, hysteresis_high_c: f64) -> Self {
        Self {
            hysteresis_low_c,
            hysteresis_high_c,
            ..Default::default()
        }
    }

    /// Negative or non-finite bounds are clamped to zero.
    pub fn sanitized(self) -> Self {
        let non_negative = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
        Self {
            hysteresis_low_c: non_negative(self.hysteresis_low_c),
            hysteresis_high_c: non_negative(self.hysteresis_high_c),
            max_temperature_c: self.max_temperature_c,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Sensor unavailable: always off.
    SensorFault,
    OverTemperature,
    BelowBand,
    AboveBand,
    /// Inside the dead-band, previous state held.
    DeadBand,
    /// Nothing to track (standby).
    NoTarget,
    /// Target is NaN or infinite: always off.
    InvalidTarget,
    /// Profile run completed or aborted.
    RunInactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeaterDecision {
    pub on: bool,
    pub current_c: Option<f64>,
    pub target_c: Option<f64>,
    pub reason: DecisionReason,
}

impl HeaterDecision {
    pub fn off(current_c: Option<f64>, target_c: Option<f64>, reason: DecisionReason) -> Self {
        Self {
            on: false,
            current_c,
            target_c,
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeaterController {
    config: HysteresisConfig,
}

impl HeaterController {
    pub fn new(config: HysteresisConfig) -> Self {
        Self {
            config: config.sanitized(),
        }
    }

    pub fn config(&self) -> &HysteresisConfig {
        &self.config
    }

    pub fn decide(
        &self,
        current: Result<f64, &SensorFault>,
        target_c: f64,
        previous_on: bool,
    ) -> HeaterDecision {
        let current_c = match current {
            Ok(t) if t.is_finite() => t,
            _ => return HeaterDecision::off(None, Some(target_c), DecisionReason::SensorFault),
        };
        if !target_c.is_finite() {
            return HeaterDecision::off(Some(current_c), None, DecisionReason::InvalidTarget);
        }

        if current_c >= self.config.max_temperature_c {
            return HeaterDecision::off(
                Some(current_c),
                Some(target_c),
                DecisionReason::OverTemperature,
            );
        }

        let (on, reason) = if current_c < target_c - self.config.hysteresis_low_c {
            (true, DecisionReason::BelowBand)
        } else if current_c >= target_c + self.config.hysteresis_high_c {
            (false, DecisionReason::AboveBand)
        } else {
            (previous_on, DecisionReason::DeadBand)
        };

        HeaterDecision {
            on,
            current_c: Some(current_c),
            target_c: Some(target_c),
            reason,
        }
    }
}

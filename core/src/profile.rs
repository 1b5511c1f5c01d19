//! Reflow profiles: an ordered list of phases, each ending at a target
//! temperature after a nominal duration.

use serde::{Deserialize, Serialize};

use crate::error::ProfileError;

/// One segment of a profile. The oven is expected to reach
/// `target_temperature_c` at the end of `duration_s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub target_temperature_c: f64,
    pub duration_s: f64,
}

impl Phase {
    pub fn new(target_temperature_c: f64, duration_s: f64) -> Self {
        Phase {
            name: None,
            target_temperature_c,
            duration_s,
        }
    }

    pub fn named(name: &str, target_temperature_c: f64, duration_s: f64) -> Self {
        Phase {
            name: Some(name.to_string()),
            target_temperature_c,
            duration_s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub phases: Vec<Phase>,
}

impl Profile {
    pub fn new(name: &str, phases: Vec<Phase>) -> Self {
        Profile {
            name: name.to_string(),
            phases,
        }
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        if self.phases.is_empty() {
            return Err(ProfileError::EmptyPhases);
        }
        for (index, phase) in self.phases.iter().enumerate() {
            if !phase.target_temperature_c.is_finite() || !phase.duration_s.is_finite() {
                return Err(ProfileError::NonFiniteValue { index });
            }
            if phase.duration_s <= 0.0 {
                return Err(ProfileError::NonPositiveDuration {
                    index,
                    duration_s: phase.duration_s,
                });
            }
        }
        Ok(())
    }

    pub fn total_duration_s(&self) -> f64 {
        self.phases.iter().map(|p| p.duration_s).sum()
    }

    /// Nominal target the run freezes at once every phase is done.
    pub fn final_target_c(&self) -> Option<f64> {
        self.phases.last().map(|p| p.target_temperature_c)
    }

    pub fn from_json(text: &str) -> Result<Profile, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Nominal temperature curve for graphing: each phase ramps from the
    /// previous phase's target (the first from `start_c`), sampled every
    /// `step_s` seconds plus both ends of every phase.
    pub fn nominal_curve(&self, start_c: f64, step_s: f64) -> Vec<CurvePoint> {
        let step_s = if step_s.is_finite() && step_s > 0.0 { step_s } else { 1.0 };
        let mut points = Vec::new();
        let mut from_c = start_c;
        let mut phase_start_s = 0.0;

        for (index, phase) in self.phases.iter().enumerate() {
            let duration_s = phase.duration_s.max(0.0);
            let mut t = 0.0;
            loop {
                let progress = if duration_s > 0.0 { (t / duration_s).min(1.0) } else { 1.0 };
                points.push(CurvePoint {
                    time_s: phase_start_s + t,
                    temperature_c: from_c + (phase.target_temperature_c - from_c) * progress,
                    phase: index,
                });
                if t >= duration_s {
                    break;
                }
                t = (t + step_s).min(duration_s);
            }
            from_c = phase.target_temperature_c;
            phase_start_s += duration_s;
        }
        points
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvePoint {
    pub time_s: f64,
    pub temperature_c: f64,
    pub phase: usize,
}

// --- Built-in profiles, seeded into an empty store ---

const LEAD_FREE_PHASES: &[(&str, f64, f64)] = &[
    ("Preheat", 150.0, 240.0),
    ("Soak", 180.0, 120.0),
    ("Reflow", 245.0, 90.0),
    ("Peak", 245.0, 30.0),
    ("Cooling", 100.0, 145.0),
];

const TEST_PHASES: &[(&str, f64, f64)] = &[
    ("Warm up", 50.0, 120.0),
    ("Hold", 50.0, 60.0),
    ("Cool down", 25.0, 120.0),
];

fn build(name: &str, phases: &[(&str, f64, f64)]) -> Profile {
    Profile::new(
        name,
        phases
            .iter()
            .map(|&(phase, target, duration)| Phase::named(phase, target, duration))
            .collect(),
    )
}

pub fn builtin_profiles() -> Vec<Profile> {
    vec![
        build("Lead-free Reflow", LEAD_FREE_PHASES),
        build("Test Profile", TEST_PHASES),
    ]
}

//! Profile execution: walks a [`Profile`] over elapsed time and yields the
//! instantaneous target temperature.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::error::ProfileError;
use crate::profile::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Aborted,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Aborted)
    }
}

/// Execution cursor. Only [`ProfileRunner`] mutates it; everybody else gets
/// a copy through [`ProfileRunner::status`].
#[derive(Debug, Clone)]
pub struct RunState {
    pub status: RunStatus,
    pub active_profile: Option<Arc<Profile>>,
    pub phase_index: usize,
    pub elapsed_in_phase_s: f64,
    pub started_at: Option<Instant>,
    /// Temperature the current phase ramps from: what the oven actually
    /// read when the phase was entered.
    pub last_known_temperature_c: f64,
    /// Last computed instantaneous target. Frozen once the run stops.
    pub target_c: Option<f64>,
    pub total_elapsed_s: f64,
}

impl RunState {
    fn idle() -> Self {
        RunState {
            status: RunStatus::Idle,
            active_profile: None,
            phase_index: 0,
            elapsed_in_phase_s: 0.0,
            started_at: None,
            last_known_temperature_c: 0.0,
            target_c: None,
            total_elapsed_s: 0.0,
        }
    }

    pub fn profile_name(&self) -> Option<&str> {
        self.active_profile.as_ref().map(|p| p.name.as_str())
    }

    pub fn phase_name(&self) -> Option<&str> {
        let profile = self.active_profile.as_ref()?;
        profile.phases.get(self.phase_index)?.name.as_deref()
    }

    pub fn phase_count(&self) -> usize {
        self.active_profile.as_ref().map_or(0, |p| p.phases.len())
    }

    /// Nominal time left until the last phase ends.
    pub fn remaining_s(&self) -> f64 {
        if self.status != RunStatus::Running {
            return 0.0;
        }
        let Some(profile) = self.active_profile.as_ref() else {
            return 0.0;
        };
        let current = profile
            .phases
            .get(self.phase_index)
            .map_or(0.0, |p| (p.duration_s - self.elapsed_in_phase_s).max(0.0));
        let later: f64 = profile
            .phases
            .iter()
            .skip(self.phase_index + 1)
            .map(|p| p.duration_s)
            .sum();
        current + later
    }

    pub fn progress_percent(&self) -> f64 {
        match (self.status, self.active_profile.as_ref()) {
            (RunStatus::Completed, _) => 100.0,
            (_, Some(profile)) => {
                let total = profile.total_duration_s();
                if total <= 0.0 {
                    return 0.0;
                }
                (self.total_elapsed_s / total * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        }
    }
}

// Phases shorter than this are an instantaneous step to their target.
const STEP_DURATION_S: f64 = 1e-6;

// Linear ramp between the phase entry temperature and the phase target.
fn linear(val_start: f64, val_end: f64, elapsed_s: f64, duration_s: f64) -> f64 {
    if duration_s <= STEP_DURATION_S {
        return val_end;
    }
    let progress = (elapsed_s / duration_s).clamp(0.0, 1.0);
    val_end * progress + val_start * (1.0 - progress)
}

#[derive(Debug, Clone)]
pub struct ProfileRunner {
    state: RunState,
    last_tick: Option<Instant>,
    last_good_temperature_c: Option<f64>,
}

impl Default for ProfileRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileRunner {
    pub fn new() -> Self {
        ProfileRunner {
            state: RunState::idle(),
            last_tick: None,
            last_good_temperature_c: None,
        }
    }

    /// Begin walking `profile` from the oven's current temperature.
    /// An invalid profile is rejected before anything changes.
    pub fn start(
        &mut self,
        profile: Arc<Profile>,
        current_temperature_c: f64,
        now: Instant,
    ) -> Result<f64, ProfileError> {
        profile.validate()?;
        if !current_temperature_c.is_finite() {
            return Err(ProfileError::NonFiniteStart(current_temperature_c));
        }

        info!(
            "Starting profile '{}' ({} phases, {:.0}s) from {:.1}C",
            profile.name,
            profile.phases.len(),
            profile.total_duration_s(),
            current_temperature_c
        );
        self.state = RunState {
            status: RunStatus::Running,
            active_profile: Some(profile),
            phase_index: 0,
            elapsed_in_phase_s: 0.0,
            started_at: Some(now),
            last_known_temperature_c: current_temperature_c,
            target_c: Some(current_temperature_c),
            total_elapsed_s: 0.0,
        };
        self.last_tick = Some(now);
        self.last_good_temperature_c = Some(current_temperature_c);
        Ok(current_temperature_c)
    }

    /// Advance the run to `now`. `current_temperature_c` is `None` while the
    /// sensor is faulted; time still accumulates in that case.
    ///
    /// Returns the instantaneous target, or the frozen one when the runner
    /// is not running (`None` if it never ran).
    pub fn tick(&mut self, current_temperature_c: Option<f64>, now: Instant) -> Option<f64> {
        if self.state.status != RunStatus::Running {
            return self.state.target_c;
        }
        let profile = self.state.active_profile.clone()?;

        if let Some(t) = current_temperature_c.filter(|t| t.is_finite()) {
            self.last_good_temperature_c = Some(t);
        }

        let dt = self
            .last_tick
            .map_or(0.0, |prev| now.saturating_duration_since(prev).as_secs_f64());
        self.last_tick = Some(now);
        self.state.elapsed_in_phase_s += dt;
        self.state.total_elapsed_s += dt;

        let phase = &profile.phases[self.state.phase_index];
        if self.state.elapsed_in_phase_s >= phase.duration_s {
            self.state.last_known_temperature_c = self
                .last_good_temperature_c
                .unwrap_or(phase.target_temperature_c);
            self.state.phase_index += 1;
            self.state.elapsed_in_phase_s = 0.0;

            if self.state.phase_index == profile.phases.len() {
                self.state.status = RunStatus::Completed;
                self.state.target_c = profile.final_target_c();
                info!(
                    "Profile '{}' completed after {:.0}s",
                    profile.name, self.state.total_elapsed_s
                );
                return self.state.target_c;
            }

            info!(
                "Profile '{}': phase {}/{} ({}) from {:.1}C",
                profile.name,
                self.state.phase_index + 1,
                profile.phases.len(),
                self.state.phase_name().unwrap_or("-"),
                self.state.last_known_temperature_c
            );
        }

        let phase = &profile.phases[self.state.phase_index];
        let target = linear(
            self.state.last_known_temperature_c,
            phase.target_temperature_c,
            self.state.elapsed_in_phase_s,
            phase.duration_s,
        );
        self.state.target_c = Some(target);
        Some(target)
    }

    /// Stop the run. Idempotent once the run is already over.
    pub fn abort(&mut self, now: Instant) {
        if self.state.status.is_terminal() {
            return;
        }
        if let Some(prev) = self.last_tick {
            self.state.total_elapsed_s += now.saturating_duration_since(prev).as_secs_f64();
        }
        self.last_tick = Some(now);
        self.state.status = RunStatus::Aborted;
        info!(
            "Profile '{}' aborted after {:.0}s",
            self.state.profile_name().unwrap_or("-"),
            self.state.total_elapsed_s
        );
    }

    pub fn status(&self) -> RunState {
        self.state.clone()
    }

    pub fn run_status(&self) -> RunStatus {
        self.state.status
    }

    pub fn is_running(&self) -> bool {
        self.state.status == RunStatus::Running
    }
}

//! The oven's single owner of "what should be happening right now":
//! standby, a manual setpoint, or a profile run.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::device::{HeaterOutput, TemperatureSource};
use crate::error::{CommandError, SensorFault};
use crate::heater::{DecisionReason, HeaterController, HeaterDecision, HysteresisConfig};
use crate::profile::Profile;
use crate::runner::{ProfileRunner, RunStatus};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OvenConfig {
    #[serde(flatten)]
    pub hysteresis: HysteresisConfig,
    pub min_target_c: f64,
    pub max_target_c: f64,
}

impl Default for OvenConfig {
    fn default() -> Self {
        Self {
            hysteresis: HysteresisConfig::default(),
            min_target_c: 0.0,
            max_target_c: 300.0,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Mode {
    /// No target; heater held off.
    Idle,
    Manual { setpoint_c: f64 },
    ProfileRun(ProfileRunner),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    Idle,
    Manual,
    Profile,
}

impl Mode {
    pub fn kind(&self) -> ModeKind {
        match self {
            Mode::Idle => ModeKind::Idle,
            Mode::Manual { .. } => ModeKind::Manual,
            Mode::ProfileRun(_) => ModeKind::Profile,
        }
    }
}

/// Mode-changing requests. Applied between ticks, never during one.
#[derive(Debug, Clone)]
pub enum Command {
    StartProfile(Profile),
    Stop,
    SetManualTarget(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Started {
        profile: String,
        /// Run that was cut short to make room for this one.
        aborted: Option<String>,
    },
    Stopped,
    TargetSet { target_c: f64 },
}

/// Read-only view handed to displays and the HTTP layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OvenSnapshot {
    pub temperature_c: Option<f64>,
    pub fault: bool,
    pub fault_reason: Option<String>,
    pub target_c: Option<f64>,
    pub heater_on: bool,
    pub decision_reason: DecisionReason,
    pub mode: ModeKind,
    pub run_status: RunStatus,
    pub profile_name: Option<String>,
    pub phase_index: Option<usize>,
    pub phase_name: Option<String>,
    pub phase_count: usize,
    pub elapsed_s: f64,
    pub remaining_s: f64,
    pub progress_percent: f64,
    pub min_target_c: f64,
    pub max_target_c: f64,
}

pub struct OvenSupervisor<S, H> {
    source: S,
    heater: H,
    controller: HeaterController,
    config: OvenConfig,
    mode: Mode,
    heater_on: bool,
    last_reading: Result<f64, SensorFault>,
    last_decision: HeaterDecision,
    snapshot: OvenSnapshot,
}

impl<S: TemperatureSource, H: HeaterOutput> OvenSupervisor<S, H> {
    pub fn new(source: S, mut heater: H, config: OvenConfig) -> Self {
        heater.set(false);
        let last_decision = HeaterDecision::off(None, None, DecisionReason::NoTarget);
        let mut supervisor = OvenSupervisor {
            source,
            heater,
            controller: HeaterController::new(config.hysteresis),
            config,
            mode: Mode::Idle,
            heater_on: false,
            last_reading: Err(SensorFault::Stale),
            last_decision,
            snapshot: OvenSnapshot {
                temperature_c: None,
                fault: true,
                fault_reason: None,
                target_c: None,
                heater_on: false,
                decision_reason: DecisionReason::NoTarget,
                mode: ModeKind::Idle,
                run_status: RunStatus::Idle,
                profile_name: None,
                phase_index: None,
                phase_name: None,
                phase_count: 0,
                elapsed_s: 0.0,
                remaining_s: 0.0,
                progress_percent: 0.0,
                min_target_c: config.min_target_c,
                max_target_c: config.max_target_c,
            },
        };
        supervisor.publish();
        supervisor
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn config(&self) -> &OvenConfig {
        &self.config
    }

    pub fn heater_on(&self) -> bool {
        self.heater_on
    }

    pub fn snapshot(&self) -> OvenSnapshot {
        self.snapshot.clone()
    }

    /// One control cycle: sample, advance the target, decide, actuate,
    /// publish. Never fails; faults end up in the snapshot.
    pub fn tick(&mut self, now: Instant) -> &OvenSnapshot {
        let reading = match self.source.read() {
            Ok(t) if !t.is_finite() => Err(SensorFault::OutOfRange(t)),
            other => other,
        };
        match (&reading, &self.last_reading) {
            (Err(fault), Ok(_)) => warn!("Sensor fault: {}", fault),
            (Ok(t), Err(_)) => info!("Sensor reading restored: {:.1}C", t),
            _ => {}
        }

        let current = reading.as_ref().copied();
        let decision = match &mut self.mode {
            Mode::Idle => HeaterDecision::off(current.ok(), None, DecisionReason::NoTarget),
            Mode::Manual { setpoint_c } => {
                self.controller.decide(current, *setpoint_c, self.heater_on)
            }
            Mode::ProfileRun(runner) => {
                let target = runner.tick(current.ok(), now);
                match target {
                    Some(target_c) if runner.is_running() => {
                        self.controller.decide(current, target_c, self.heater_on)
                    }
                    _ => HeaterDecision::off(current.ok(), target, DecisionReason::RunInactive),
                }
            }
        };

        debug!(
            "tick: current={:?} target={:?} on={} reason={:?}",
            decision.current_c, decision.target_c, decision.on, decision.reason
        );

        self.switch_heater(decision.on);
        self.last_reading = reading;
        self.last_decision = decision;
        self.publish();
        &self.snapshot
    }

    pub fn apply(&mut self, command: Command, now: Instant) -> Result<CommandOutcome, CommandError> {
        let result = match command {
            Command::StartProfile(profile) => self.start_profile(profile, now),
            Command::Stop => Ok(self.stop(now)),
            Command::SetManualTarget(value_c) => self.set_manual_target(value_c, now),
        };
        if let Err(e) = &result {
            warn!("Command rejected ({}): {}", e.code(), e);
        }
        result
    }

    /// Replaces whatever is running. Nothing changes on error.
    pub fn start_profile(
        &mut self,
        profile: Profile,
        now: Instant,
    ) -> Result<CommandOutcome, CommandError> {
        profile.validate().map_err(CommandError::InvalidProfile)?;
        let current = self
            .source
            .read()
            .map_err(|f| CommandError::CannotStart(format!("no temperature reading ({})", f)))?;
        if !current.is_finite() {
            return Err(CommandError::CannotStart(format!(
                "unusable temperature reading {}",
                current
            )));
        }

        let name = profile.name.clone();
        let mut runner = ProfileRunner::new();
        runner
            .start(Arc::new(profile), current, now)
            .map_err(CommandError::InvalidProfile)?;

        let aborted = self.cancel_run(now);
        self.mode = Mode::ProfileRun(runner);
        self.last_reading = Ok(current);
        // The decision reason stays as it was until the first tick of the run.
        self.publish();
        Ok(CommandOutcome::Started {
            profile: name,
            aborted,
        })
    }

    /// Always safe: heater off right away, any run aborted, manual control
    /// dropped to standby.
    pub fn stop(&mut self, now: Instant) -> CommandOutcome {
        self.heater.set(false);
        if self.heater_on {
            info!("Heater OFF (stop)");
        }
        self.heater_on = false;

        let reason = match &mut self.mode {
            Mode::ProfileRun(runner) => {
                runner.abort(now);
                DecisionReason::RunInactive
            }
            Mode::Manual { .. } | Mode::Idle => {
                self.mode = Mode::Idle;
                DecisionReason::NoTarget
            }
        };
        self.last_decision = HeaterDecision::off(self.last_reading.clone().ok(), None, reason);
        self.publish();
        CommandOutcome::Stopped
    }

    pub fn set_manual_target(
        &mut self,
        value_c: f64,
        now: Instant,
    ) -> Result<CommandOutcome, CommandError> {
        let (min, max) = (self.config.min_target_c, self.config.max_target_c);
        if !value_c.is_finite() || value_c < min || value_c > max {
            return Err(CommandError::TargetOutOfRange {
                value: value_c,
                min,
                max,
            });
        }

        if let Some(name) = self.cancel_run(now) {
            info!("Manual target replaces profile '{}'", name);
        }
        info!("Manual target set to {:.1}C", value_c);
        self.mode = Mode::Manual { setpoint_c: value_c };
        self.last_decision.target_c = Some(value_c);
        self.publish();
        Ok(CommandOutcome::TargetSet { target_c: value_c })
    }

    // Aborts a running profile, returning its name.
    fn cancel_run(&mut self, now: Instant) -> Option<String> {
        if let Mode::ProfileRun(runner) = &mut self.mode {
            if runner.is_running() {
                runner.abort(now);
                return runner.status().profile_name().map(str::to_string);
            }
        }
        None
    }

    // Relay commands only on change.
    fn switch_heater(&mut self, on: bool) {
        if on != self.heater_on {
            info!("Heater {}", if on { "ON" } else { "OFF" });
            self.heater.set(on);
            self.heater_on = on;
        }
    }

    fn publish(&mut self) {
        let run = match &self.mode {
            Mode::ProfileRun(runner) => Some(runner.status()),
            _ => None,
        };
        let target_c = match &self.mode {
            Mode::Idle => None,
            Mode::Manual { setpoint_c } => Some(*setpoint_c),
            Mode::ProfileRun(runner) => runner.status().target_c,
        };

        self.snapshot = OvenSnapshot {
            temperature_c: self.last_reading.as_ref().ok().copied(),
            fault: self.last_reading.is_err(),
            fault_reason: self.last_reading.as_ref().err().map(|f| f.to_string()),
            target_c,
            heater_on: self.heater_on,
            decision_reason: self.last_decision.reason,
            mode: self.mode.kind(),
            run_status: run.as_ref().map_or(RunStatus::Idle, |r| r.status),
            profile_name: run
                .as_ref()
                .and_then(|r| r.profile_name().map(str::to_string)),
            // Past the last phase once completed; nothing to point at.
            phase_index: run
                .as_ref()
                .map(|r| r.phase_index)
                .filter(|&i| i < run.as_ref().map_or(0, |r| r.phase_count())),
            phase_name: run.as_ref().and_then(|r| r.phase_name().map(str::to_string)),
            phase_count: run.as_ref().map_or(0, |r| r.phase_count()),
            elapsed_s: run.as_ref().map_or(0.0, |r| r.total_elapsed_s),
            remaining_s: run.as_ref().map_or(0.0, |r| r.remaining_s()),
            progress_percent: run.as_ref().map_or(0.0, |r| r.progress_percent()),
            min_target_c: self.config.min_target_c,
            max_target_c: self.config.max_target_c,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProfileError;
    use crate::profile::Phase;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::time::Duration;

    // Returns scripted readings, repeating the last one.
    #[derive(Clone)]
    struct ScriptedSensor {
        readings: Rc<RefCell<VecDeque<Result<f64, SensorFault>>>>,
        last: Rc<RefCell<Result<f64, SensorFault>>>,
    }

    impl ScriptedSensor {
        fn new(initial: Result<f64, SensorFault>) -> Self {
            ScriptedSensor {
                readings: Rc::new(RefCell::new(VecDeque::new())),
                last: Rc::new(RefCell::new(initial)),
            }
        }

        fn set(&self, reading: Result<f64, SensorFault>) {
            *self.last.borrow_mut() = reading;
        }
    }

    impl TemperatureSource for ScriptedSensor {
        fn read(&mut self) -> Result<f64, SensorFault> {
            if let Some(next) = self.readings.borrow_mut().pop_front() {
                *self.last.borrow_mut() = next;
            }
            self.last.borrow().clone()
        }
    }

    #[derive(Clone, Default)]
    struct RecordingHeater {
        commands: Rc<RefCell<Vec<bool>>>,
    }

    impl HeaterOutput for RecordingHeater {
        fn set(&mut self, on: bool) {
            self.commands.borrow_mut().push(on);
        }
    }

    fn config() -> OvenConfig {
        OvenConfig {
            hysteresis: HysteresisConfig::new(2.0, 2.0),
            ..Default::default()
        }
    }

    fn oven(
        initial: Result<f64, SensorFault>,
    ) -> (
        OvenSupervisor<ScriptedSensor, RecordingHeater>,
        ScriptedSensor,
        RecordingHeater,
    ) {
        let sensor = ScriptedSensor::new(initial);
        let heater = RecordingHeater::default();
        let supervisor = OvenSupervisor::new(sensor.clone(), heater.clone(), config());
        (supervisor, sensor, heater)
    }

    fn reflow() -> Profile {
        Profile::new(
            "reflow",
            vec![
                Phase::named("Preheat", 50.0, 60.0),
                Phase::named("Reflow", 183.0, 120.0),
                Phase::named("Cooling", 25.0, 300.0),
            ],
        )
    }

    fn secs(t0: Instant, s: u64) -> Instant {
        t0 + Duration::from_secs(s)
    }

    #[test]
    fn starts_idle_with_heater_off() {
        let (mut oven, _, heater) = oven(Ok(22.0));
        assert_eq!(*heater.commands.borrow(), vec![false]);

        let snap = oven.tick(Instant::now()).clone();
        assert_eq!(snap.mode, ModeKind::Idle);
        assert_eq!(snap.target_c, None);
        assert!(!snap.heater_on);
        assert_eq!(snap.temperature_c, Some(22.0));
        assert!(!snap.fault);
    }

    #[test]
    fn manual_target_drives_heater_on_change_only() {
        let t0 = Instant::now();
        let (mut oven, sensor, heater) = oven(Ok(20.0));
        oven.apply(Command::SetManualTarget(100.0), t0).unwrap();

        oven.tick(secs(t0, 1));
        oven.tick(secs(t0, 2));
        assert!(oven.heater_on());
        assert_eq!(*heater.commands.borrow(), vec![false, true]);

        sensor.set(Ok(101.0));
        oven.tick(secs(t0, 3));
        assert!(oven.heater_on(), "dead-band holds");

        sensor.set(Ok(102.5));
        oven.tick(secs(t0, 4));
        assert!(!oven.heater_on());
        assert_eq!(*heater.commands.borrow(), vec![false, true, false]);
    }

    #[test]
    fn manual_target_out_of_range_rejected() {
        let (mut oven, _, _) = oven(Ok(20.0));
        let err = oven
            .apply(Command::SetManualTarget(450.0), Instant::now())
            .unwrap_err();
        assert_eq!(err.code(), "target_out_of_range");
        assert_eq!(oven.mode().kind(), ModeKind::Idle);
    }

    #[test]
    fn profile_run_follows_ramp() {
        let t0 = Instant::now();
        let (mut oven, sensor, _) = oven(Ok(25.0));
        let outcome = oven.apply(Command::StartProfile(reflow()), t0).unwrap();
        assert_eq!(
            outcome,
            CommandOutcome::Started {
                profile: "reflow".to_string(),
                aborted: None
            }
        );

        sensor.set(Ok(30.0));
        let snap = oven.tick(secs(t0, 30)).clone();
        assert_eq!(snap.target_c, Some(37.5));
        assert!(snap.heater_on);
        assert_eq!(snap.phase_name.as_deref(), Some("Preheat"));
        assert_eq!(snap.remaining_s, 450.0);

        sensor.set(Ok(50.0));
        let snap = oven.tick(secs(t0, 61)).clone();
        assert_eq!(snap.phase_index, Some(1));
        assert_eq!(snap.target_c, Some(50.0));
    }

    #[test]
    fn completed_run_holds_heater_off() {
        let t0 = Instant::now();
        let (mut oven, sensor, _) = oven(Ok(25.0));
        oven.apply(Command::StartProfile(reflow()), t0).unwrap();
        oven.tick(secs(t0, 60));
        oven.tick(secs(t0, 180));
        sensor.set(Ok(10.0));
        let snap = oven.tick(secs(t0, 480)).clone();
        assert_eq!(snap.run_status, RunStatus::Completed);
        assert_eq!(snap.target_c, Some(25.0));
        assert!(!snap.heater_on);
        assert_eq!(snap.decision_reason, DecisionReason::RunInactive);
        assert_eq!(snap.phase_index, None);
        assert_eq!(snap.phase_count, 3);
    }

    #[test]
    fn aborted_run_keeps_its_phase_index() {
        let t0 = Instant::now();
        let (mut oven, _, _) = oven(Ok(25.0));
        oven.apply(Command::StartProfile(reflow()), t0).unwrap();
        oven.tick(secs(t0, 61));
        oven.apply(Command::Stop, secs(t0, 62)).unwrap();
        assert_eq!(oven.snapshot().phase_index, Some(1));
    }

    #[test]
    fn start_does_not_invent_a_decision() {
        let t0 = Instant::now();
        let (mut oven, _, _) = oven(Ok(25.0));
        oven.tick(t0);
        oven.apply(Command::StartProfile(reflow()), t0).unwrap();
        assert_eq!(oven.snapshot().decision_reason, DecisionReason::NoTarget);

        let snap = oven.tick(secs(t0, 1)).clone();
        assert_eq!(snap.decision_reason, DecisionReason::DeadBand);
    }

    #[test]
    fn non_finite_reading_cannot_start_and_forces_heater_off() {
        let t0 = Instant::now();
        let (mut oven, sensor, heater) = oven(Ok(20.0));
        oven.apply(Command::SetManualTarget(100.0), t0).unwrap();
        oven.tick(secs(t0, 1));
        assert!(oven.heater_on());

        sensor.set(Ok(f64::NAN));
        let err = oven
            .apply(Command::StartProfile(reflow()), secs(t0, 2))
            .unwrap_err();
        assert_eq!(err.code(), "cannot_start");
        assert_eq!(oven.mode().kind(), ModeKind::Manual);

        let snap = oven.tick(secs(t0, 3)).clone();
        assert!(snap.fault);
        assert!(!snap.heater_on);
        assert_eq!(snap.decision_reason, DecisionReason::SensorFault);
        assert_eq!(heater.commands.borrow().last(), Some(&false));
    }

    #[test]
    fn starting_twice_aborts_the_first_run() {
        let t0 = Instant::now();
        let (mut oven, _, _) = oven(Ok(25.0));
        oven.apply(Command::StartProfile(reflow()), t0).unwrap();
        oven.tick(secs(t0, 5));

        let mut other = reflow();
        other.name = "other".to_string();
        let outcome = oven.apply(Command::StartProfile(other), secs(t0, 6)).unwrap();
        assert_eq!(
            outcome,
            CommandOutcome::Started {
                profile: "other".to_string(),
                aborted: Some("reflow".to_string())
            }
        );
        assert_eq!(oven.snapshot().profile_name.as_deref(), Some("other"));
        assert_eq!(oven.snapshot().run_status, RunStatus::Running);
    }

    #[test]
    fn empty_profile_leaves_existing_run_untouched() {
        let t0 = Instant::now();
        let (mut oven, _, _) = oven(Ok(25.0));
        oven.apply(Command::StartProfile(reflow()), t0).unwrap();

        let err = oven
            .apply(Command::StartProfile(Profile::new("empty", vec![])), secs(t0, 1))
            .unwrap_err();
        assert_eq!(err, CommandError::InvalidProfile(ProfileError::EmptyPhases));
        assert_eq!(oven.snapshot().profile_name.as_deref(), Some("reflow"));
        assert_eq!(oven.snapshot().run_status, RunStatus::Running);
    }

    #[test]
    fn cannot_start_without_reading() {
        let (mut oven, _, _) = oven(Err(SensorFault::Disconnected));
        oven.apply(Command::SetManualTarget(60.0), Instant::now())
            .unwrap();

        let err = oven
            .apply(Command::StartProfile(reflow()), Instant::now())
            .unwrap_err();
        assert_eq!(err.code(), "cannot_start");
        assert_eq!(oven.mode().kind(), ModeKind::Manual);
    }

    #[test]
    fn sensor_fault_forces_heater_off_and_marks_snapshot() {
        let t0 = Instant::now();
        let (mut oven, sensor, heater) = oven(Ok(25.0));
        oven.apply(Command::StartProfile(reflow()), t0).unwrap();
        oven.tick(secs(t0, 10));
        assert!(oven.heater_on());

        sensor.set(Err(SensorFault::Timeout));
        let snap = oven.tick(secs(t0, 11)).clone();
        assert!(snap.fault);
        assert_eq!(snap.temperature_c, None);
        assert_eq!(snap.fault_reason.as_deref(), Some("sensor read timed out"));
        assert!(!snap.heater_on);
        assert_eq!(snap.decision_reason, DecisionReason::SensorFault);
        assert_eq!(snap.run_status, RunStatus::Running);
        assert_eq!(snap.elapsed_s, 11.0);
        assert_eq!(heater.commands.borrow().last(), Some(&false));
    }

    #[test]
    fn stop_aborts_and_is_idempotent() {
        let t0 = Instant::now();
        let (mut oven, _, heater) = oven(Ok(25.0));
        oven.apply(Command::StartProfile(reflow()), t0).unwrap();
        oven.tick(secs(t0, 10));
        assert!(oven.heater_on());

        oven.apply(Command::Stop, secs(t0, 11)).unwrap();
        assert!(!oven.heater_on());
        assert_eq!(heater.commands.borrow().last(), Some(&false));
        assert_eq!(oven.snapshot().run_status, RunStatus::Aborted);

        oven.apply(Command::Stop, secs(t0, 12)).unwrap();
        let snap = oven.tick(secs(t0, 13)).clone();
        assert_eq!(snap.run_status, RunStatus::Aborted);
        assert!(!snap.heater_on);
    }

    #[test]
    fn stop_from_manual_returns_to_idle() {
        let t0 = Instant::now();
        let (mut oven, _, _) = oven(Ok(25.0));
        oven.apply(Command::SetManualTarget(80.0), t0).unwrap();
        oven.tick(secs(t0, 1));
        assert!(oven.heater_on());

        oven.apply(Command::Stop, secs(t0, 2)).unwrap();
        let snap = oven.tick(secs(t0, 3)).clone();
        assert_eq!(snap.mode, ModeKind::Idle);
        assert!(!snap.heater_on);
    }

    #[test]
    fn manual_target_cancels_running_profile() {
        let t0 = Instant::now();
        let (mut oven, _, _) = oven(Ok(25.0));
        oven.apply(Command::StartProfile(reflow()), t0).unwrap();
        oven.apply(Command::SetManualTarget(40.0), secs(t0, 3))
            .unwrap();
        let snap = oven.tick(secs(t0, 4)).clone();
        assert_eq!(snap.mode, ModeKind::Manual);
        assert_eq!(snap.target_c, Some(40.0));
        assert_eq!(snap.profile_name, None);
    }
}

//! Reflow oven control core: profiles, the profile runner, hysteresis heater
//! control and the supervisor that ties them to a sensor and a heater.

pub mod device;
pub mod error;
pub mod heater;
pub mod profile;
pub mod relay;
pub mod runner;
pub mod store;
pub mod supervisor;

pub use device::{HeaterOutput, TemperatureSource};
pub use error::{CommandError, ProfileError, SensorFault, StoreError};
pub use heater::{DecisionReason, HeaterController, HeaterDecision, HysteresisConfig};
pub use profile::{CurvePoint, Phase, Profile};
pub use runner::{ProfileRunner, RunState, RunStatus};
pub use store::{JsonProfileStore, MemoryProfileStore, ProfileStore};
pub use supervisor::{Command, CommandOutcome, Mode, ModeKind, OvenConfig, OvenSnapshot, OvenSupervisor};

//! Daemon configuration: a TOML file with per-key defaults, then
//! command-line overrides.

use anyhow::{bail, Context, Result};
use clap::Parser;
use reflow_core::{HysteresisConfig, OvenConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug, Default)]
#[command(version, about = "Reflow oven controller")]
pub struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// HTTP listen address, e.g. 0.0.0.0:8080.
    #[arg(long)]
    pub listen: Option<String>,

    /// Directory holding one JSON file per profile.
    #[arg(long)]
    pub profiles_dir: Option<PathBuf>,

    /// Use the simulated oven for both sensor and heater.
    #[arg(long)]
    pub simulate: bool,

    /// Log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorConfig {
    Simulated,
    /// Kernel hwmon style file holding an integer reading.
    Hwmon {
        path: PathBuf,
        #[serde(default = "default_hwmon_scale")]
        scale: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HeaterConfig {
    Simulated,
    Relay { addr: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,

    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: PathBuf,

    #[serde(default = "default_sensor")]
    pub sensor: SensorConfig,

    #[serde(default = "default_sensor_timeout_ms")]
    pub sensor_timeout_ms: u64,

    /// Samples older than this read as stale.
    #[serde(default = "default_sensor_max_age_ms")]
    pub sensor_max_age_ms: u64,

    #[serde(default = "default_heater")]
    pub heater: HeaterConfig,

    #[serde(default = "default_history_window_s")]
    pub history_window_s: i64,

    #[serde(default = "default_hysteresis")]
    pub hysteresis_low_c: f64,

    #[serde(default = "default_hysteresis")]
    pub hysteresis_high_c: f64,

    #[serde(default = "default_max_temperature_c")]
    pub max_temperature_c: f64,

    #[serde(default)]
    pub min_target_c: f64,

    #[serde(default = "default_max_target_c")]
    pub max_target_c: f64,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_tick_period_ms() -> u64 {
    1000
}

fn default_profiles_dir() -> PathBuf {
    PathBuf::from("profiles")
}

fn default_sensor() -> SensorConfig {
    SensorConfig::Simulated
}

fn default_hwmon_scale() -> f64 {
    0.001 // millidegrees
}

fn default_sensor_timeout_ms() -> u64 {
    500
}

fn default_sensor_max_age_ms() -> u64 {
    3000
}

fn default_heater() -> HeaterConfig {
    HeaterConfig::Simulated
}

fn default_history_window_s() -> i64 {
    3600
}

fn default_hysteresis() -> f64 {
    1.0
}

fn default_max_temperature_c() -> f64 {
    300.0
}

fn default_max_target_c() -> f64 {
    300.0
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: default_listen(),
            tick_period_ms: default_tick_period_ms(),
            profiles_dir: default_profiles_dir(),
            sensor: default_sensor(),
            sensor_timeout_ms: default_sensor_timeout_ms(),
            sensor_max_age_ms: default_sensor_max_age_ms(),
            heater: default_heater(),
            history_window_s: default_history_window_s(),
            hysteresis_low_c: default_hysteresis(),
            hysteresis_high_c: default_hysteresis(),
            max_temperature_c: default_max_temperature_c(),
            min_target_c: 0.0,
            max_target_c: default_max_target_c(),
        }
    }
}

impl Config {
    pub fn parse(text: &str) -> Result<Config> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Config::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// File (if any) first, flags on top.
    pub fn load(args: &Args) -> Result<Config> {
        let mut config = match &args.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(listen) = &args.listen {
            config.listen = listen.clone();
        }
        if let Some(dir) = &args.profiles_dir {
            config.profiles_dir = dir.clone();
        }
        if args.simulate {
            config.sensor = SensorConfig::Simulated;
            config.heater = HeaterConfig::Simulated;
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tick_period_ms == 0 {
            bail!("tick_period_ms must be positive");
        }
        if self.history_window_s <= 0 {
            bail!("history_window_s must be positive");
        }
        if self.sensor_timeout_ms == 0 {
            bail!("sensor_timeout_ms must be positive");
        }
        if self.hysteresis_low_c < 0.0 || self.hysteresis_high_c < 0.0 {
            bail!("hysteresis bounds must not be negative");
        }
        if self.min_target_c > self.max_target_c {
            bail!(
                "min_target_c {} exceeds max_target_c {}",
                self.min_target_c,
                self.max_target_c
            );
        }
        Ok(())
    }

    pub fn oven(&self) -> OvenConfig {
        OvenConfig {
            hysteresis: HysteresisConfig {
                hysteresis_low_c: self.hysteresis_low_c,
                hysteresis_high_c: self.hysteresis_high_c,
                max_temperature_c: self.max_temperature_c,
            },
            min_target_c: self.min_target_c,
            max_target_c: self.max_target_c,
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    pub fn sensor_max_age(&self) -> Duration {
        Duration::from_millis(self.sensor_max_age_ms)
    }
}

//! Concrete sensors and heaters wired up by the daemon.

use rand::Rng;
use reflow_core::relay::UdpRelay;
use reflow_core::{HeaterOutput, SensorFault, TemperatureSource};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::{HeaterConfig, SensorConfig};

const AMBIENT_C: f64 = 25.0;
const STEP: Duration = Duration::from_millis(100);

// Readings outside this range mean a broken or shorted sensor.
const PLAUSIBLE_MIN_C: f64 = -40.0;
const PLAUSIBLE_MAX_C: f64 = 500.0;

/// Two-body oven: the element heats up, then leaks heat into the chamber,
/// which leaks to ambient. The chamber is what the sensor sees.
struct OvenModel {
    element_c: f64,
    chamber_c: f64,
    heater_on: bool,
    updated: Instant,
}

impl OvenModel {
    fn new() -> Self {
        Self {
            element_c: AMBIENT_C,
            chamber_c: AMBIENT_C,
            heater_on: false,
            updated: Instant::now(),
        }
    }

    fn advance(&mut self, now: Instant) {
        while self.updated + STEP <= now {
            self.updated += STEP;
            let dt = STEP.as_secs_f64();
            if self.heater_on {
                self.element_c += 6.0 * dt;
            }
            let mut ambient = AMBIENT_C;
            Self::exchange(&mut self.element_c, 0.5, &mut self.chamber_c, 1.0, 0.2 * dt);
            Self::exchange(&mut self.chamber_c, 1.0, &mut ambient, 1.0, 0.008 * dt);
        }
    }

    fn exchange(t1: &mut f64, weight1: f64, t2: &mut f64, weight2: f64, speed: f64) {
        let exchanged = (*t1 - *t2) * speed;
        *t1 -= exchanged / weight1;
        *t2 += exchanged / weight2;
    }
}

/// Shared oven model; hand out a sensor and an element from the same one.
#[derive(Clone)]
pub struct SimulatedOven {
    model: Arc<Mutex<OvenModel>>,
    noise_c: f64,
}

impl SimulatedOven {
    pub fn new(noise_c: f64) -> Self {
        SimulatedOven {
            model: Arc::new(Mutex::new(OvenModel::new())),
            noise_c,
        }
    }

    pub fn sensor(&self) -> SimulatedSensor {
        SimulatedSensor { oven: self.clone() }
    }

    pub fn element(&self) -> SimulatedElement {
        SimulatedElement { oven: self.clone() }
    }

    pub fn heater_on(&self) -> bool {
        self.model.lock().map(|m| m.heater_on).unwrap_or(false)
    }
}

pub struct SimulatedSensor {
    oven: SimulatedOven,
}

impl TemperatureSource for SimulatedSensor {
    fn read(&mut self) -> Result<f64, SensorFault> {
        let mut model = self
            .oven
            .model
            .lock()
            .map_err(|_| SensorFault::Io("oven model poisoned".to_string()))?;
        model.advance(Instant::now());
        let noise = if self.oven.noise_c > 0.0 {
            rand::thread_rng().gen_range(-self.oven.noise_c..=self.oven.noise_c)
        } else {
            0.0
        };
        Ok(model.chamber_c + noise)
    }
}

pub struct SimulatedElement {
    oven: SimulatedOven,
}

impl HeaterOutput for SimulatedElement {
    fn set(&mut self, on: bool) {
        if let Ok(mut model) = self.oven.model.lock() {
            model.advance(Instant::now());
            model.heater_on = on;
        }
    }
}

/// Integer reading from a sysfs-style file, e.g. `temp1_input` in
/// millidegrees.
pub struct HwmonSensor {
    path: PathBuf,
    scale: f64,
}

impl HwmonSensor {
    pub fn new(path: PathBuf, scale: f64) -> Self {
        HwmonSensor { path, scale }
    }
}

impl TemperatureSource for HwmonSensor {
    fn read(&mut self) -> Result<f64, SensorFault> {
        let text = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SensorFault::Disconnected,
            _ => SensorFault::Io(e.to_string()),
        })?;
        let raw: f64 = text
            .trim()
            .parse()
            .map_err(|_| SensorFault::Io(format!("unparsable reading {:?}", text.trim())))?;
        let t = raw * self.scale;
        if !(PLAUSIBLE_MIN_C..=PLAUSIBLE_MAX_C).contains(&t) {
            return Err(SensorFault::OutOfRange(t));
        }
        Ok(t)
    }
}

pub type BoxedSource = Box<dyn TemperatureSource + Send>;
pub type BoxedHeater = Box<dyn HeaterOutput + Send>;

/// Builds the configured devices. Simulated halves share one oven.
pub fn build(sensor: &SensorConfig, heater: &HeaterConfig) -> (BoxedSource, BoxedHeater) {
    let oven = SimulatedOven::new(0.1);
    let source: BoxedSource = match sensor {
        SensorConfig::Simulated => Box::new(oven.sensor()),
        SensorConfig::Hwmon { path, scale } => Box::new(HwmonSensor::new(path.clone(), *scale)),
    };
    let output: BoxedHeater = match heater {
        HeaterConfig::Simulated => Box::new(oven.element()),
        HeaterConfig::Relay { addr } => Box::new(UdpRelay::new(addr)),
    };
    (source, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oven_model_heats_with_lag_and_cools() {
        let mut model = OvenModel::new();
        let t0 = model.updated;
        model.heater_on = true;
        model.advance(t0 + Duration::from_secs(1));
        assert!(model.element_c > model.chamber_c);
        assert!(model.chamber_c > AMBIENT_C);

        model.advance(t0 + Duration::from_secs(120));
        let hot = model.chamber_c;
        assert!(hot > 100.0, "chamber {:.1}", hot);

        model.heater_on = false;
        model.advance(t0 + Duration::from_secs(600));
        assert!(model.chamber_c < hot);
        assert!(model.chamber_c > AMBIENT_C);
    }

    #[test]
    fn element_drives_sensor() {
        let oven = SimulatedOven::new(0.0);
        let mut sensor = oven.sensor();
        let mut element = oven.element();
        assert_eq!(sensor.read().unwrap(), AMBIENT_C);

        element.set(true);
        assert!(oven.heater_on());
        element.set(false);
        assert!(!oven.heater_on());
    }

    #[test]
    fn hwmon_reads_millidegrees() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp1_input");
        fs::write(&path, "183250\n").unwrap();

        let mut sensor = HwmonSensor::new(path.clone(), 0.001);
        assert!((sensor.read().unwrap() - 183.25).abs() < 1e-9);

        fs::write(&path, "900000\n").unwrap();
        assert!(matches!(sensor.read(), Err(SensorFault::OutOfRange(t)) if t > 899.0));

        fs::write(&path, "garbage").unwrap();
        assert!(matches!(sensor.read(), Err(SensorFault::Io(_))));

        let mut missing = HwmonSensor::new(dir.path().join("nope"), 0.001);
        assert_eq!(missing.read(), Err(SensorFault::Disconnected));
    }
}

//! Seams to the hardware: a polled temperature source and a switched heater.

use crate::error::SensorFault;

/// Latest temperature in °C. Implementations must return within a bounded
/// time and report a fault instead of blocking.
pub trait TemperatureSource {
    fn read(&mut self) -> Result<f64, SensorFault>;
}

/// On/off command for the heating element. Fire and forget.
pub trait HeaterOutput {
    fn set(&mut self, on: bool);
}

impl<T: TemperatureSource + ?Sized> TemperatureSource for Box<T> {
    fn read(&mut self) -> Result<f64, SensorFault> {
        (**self).read()
    }
}

impl<T: HeaterOutput + ?Sized> HeaterOutput for Box<T> {
    fn set(&mut self, on: bool) {
        (**self).set(on)
    }
}

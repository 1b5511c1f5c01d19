//! Background sensor polling. Device reads may block (sysfs, buses), so they
//! run on the blocking pool under a timeout and the control loop only ever
//! looks at the cached result.

use reflow_core::{SensorFault, TemperatureSource};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct Sample {
    at: Instant,
    reading: Result<f64, SensorFault>,
}

/// Latest sample, as seen by the supervisor.
#[derive(Clone)]
pub struct CachedSource {
    latest: Arc<Mutex<Option<Sample>>>,
    max_age: Duration,
}

impl CachedSource {
    pub fn new(max_age: Duration) -> Self {
        CachedSource {
            latest: Arc::new(Mutex::new(None)),
            max_age,
        }
    }

    fn store(&self, reading: Result<f64, SensorFault>) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(Sample {
                at: Instant::now(),
                reading,
            });
        }
    }
}

impl TemperatureSource for CachedSource {
    fn read(&mut self) -> Result<f64, SensorFault> {
        let latest = self
            .latest
            .lock()
            .map_err(|_| SensorFault::Io("sample cache poisoned".to_string()))?;
        match latest.as_ref() {
            Some(sample) if sample.at.elapsed() <= self.max_age => sample.reading.clone(),
            _ => Err(SensorFault::Stale),
        }
    }
}

/// Polls `source` every `period` until the returned task is aborted.
pub fn spawn_sampler<S>(
    source: S,
    cache: CachedSource,
    period: Duration,
    timeout: Duration,
) -> JoinHandle<()>
where
    S: TemperatureSource + Send + 'static,
{
    let source = Arc::new(Mutex::new(source));
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let reading = sample_once(&source, timeout).await;
            debug!("sample: {:?}", reading);
            cache.store(reading);
        }
    })
}

async fn sample_once<S>(source: &Arc<Mutex<S>>, timeout: Duration) -> Result<f64, SensorFault>
where
    S: TemperatureSource + Send + 'static,
{
    let source = source.clone();
    // A read still stuck from an earlier sample holds the lock; report a
    // timeout right away instead of parking another pool thread behind it.
    let read = tokio::task::spawn_blocking(move || match source.try_lock() {
        Ok(mut s) => s.read(),
        Err(TryLockError::WouldBlock) => Err(SensorFault::Timeout),
        Err(TryLockError::Poisoned(_)) => Err(SensorFault::Io("sensor poisoned".to_string())),
    });
    match time::timeout(timeout, read).await {
        Ok(Ok(reading)) => reading,
        Ok(Err(e)) => {
            warn!("Sensor task failed: {}", e);
            Err(SensorFault::Io(e.to_string()))
        }
        Err(_) => Err(SensorFault::Timeout),
    }
}

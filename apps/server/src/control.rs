//! The control loop task. It owns the supervisor outright; everything else
//! talks to it through a command queue and reads the published state.

use chrono::Local;
use reflow_core::{
    Command, CommandError, CommandOutcome, HeaterOutput, OvenSupervisor, TemperatureSource,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, RwLock as AsyncRwLock};
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use crate::web::{ServerState, TemperaturePoint};

const QUEUE_DEPTH: usize = 16;

pub struct ControlRequest {
    command: Command,
    reply: oneshot::Sender<Result<CommandOutcome, CommandError>>,
}

/// Cloneable sender side of the command queue.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlRequest>,
}

impl ControlHandle {
    pub fn channel() -> (ControlHandle, mpsc::Receiver<ControlRequest>) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        (ControlHandle { tx }, rx)
    }

    /// Queues `command` and waits until the loop has applied it.
    pub async fn send(&self, command: Command) -> Result<CommandOutcome, CommandError> {
        let (reply, response) = oneshot::channel();
        let gone = || CommandError::CannotStart("control loop is not running".to_string());
        self.tx
            .send(ControlRequest { command, reply })
            .await
            .map_err(|_| gone())?;
        response.await.map_err(|_| gone())?
    }
}

pub struct ControlLoop<S, H> {
    pub supervisor: OvenSupervisor<S, H>,
    pub state: Arc<AsyncRwLock<ServerState>>,
    pub tick_period: Duration,
    pub history_window_s: i64,
}

impl<S: TemperatureSource, H: HeaterOutput> ControlLoop<S, H> {
    /// Ticks every period, applies queued commands in between, and stops
    /// the oven once `shutdown` resolves.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<ControlRequest>,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut interval = time::interval(self.tick_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.supervisor.tick(Instant::now());
                    self.publish(true).await;
                }
                Some(request) = commands.recv() => {
                    let result = self.supervisor.apply(request.command, Instant::now());
                    self.publish(false).await;
                    if request.reply.send(result).is_err() {
                        warn!("Command issuer went away before the reply");
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutting down, heater off");
                    self.supervisor.stop(Instant::now());
                    self.publish(false).await;
                    break;
                }
            }
        }
    }

    async fn publish(&self, record: bool) {
        let snapshot = self.supervisor.snapshot();
        let mut state = self.state.write().await;
        if record {
            let now = Local::now().timestamp();
            state.temperature_history.push(TemperaturePoint {
                timestamp: now,
                temperature: snapshot.temperature_c,
                target: snapshot.target_c,
                heater_on: snapshot.heater_on,
            });
            let oldest = now - self.history_window_s;
            state
                .temperature_history
                .retain(|point| point.timestamp >= oldest);
        }
        state.snapshot = snapshot;
    }
}

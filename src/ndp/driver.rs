//! Periodic timer driver
//!
//! The only source of time for the engine: every period it calls
//! [`NdpStack::tick`], which advances each interface clock by the
//! configured tick interval.

use super::NdpStack;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Tick `stack` every `period` forever
pub async fn run_tick_driver(stack: Arc<NdpStack>, period: Duration) {
    let mut timer = interval(period);
    // A stalled runtime must not replay a burst of ticks
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    timer.tick().await;

    debug!(period_ms = period.as_millis() as u64, "NDP tick driver started");
    loop {
        timer.tick().await;
        stack.tick();
    }
}

/// Spawn [`run_tick_driver`] on the current runtime using the stack's
/// configured interval
pub fn spawn_tick_driver(stack: Arc<NdpStack>) -> JoinHandle<()> {
    let period = stack.tick_interval();
    tokio::spawn(run_tick_driver(stack, period))
}

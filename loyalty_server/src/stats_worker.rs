use std::time::Duration;

use log::*;
use loyalty_engine::{JobDispatcher, LoyaltyDatabase};
use tokio::task::JoinHandle;

/// Starts the stats reporter, which logs the dispatcher's job statistics every `interval` until the dispatcher shuts
/// down. Returns `None` if `interval` is zero.
pub fn start_stats_worker<B>(dispatcher: JobDispatcher<B>, interval: Duration) -> Option<JoinHandle<()>>
where B: LoyaltyDatabase {
    if interval.is_zero() {
        info!("📊️ Job statistics reporting is off");
        return None;
    }
    let handle = tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        // The first tick completes immediately
        timer.tick().await;
        info!("📊️ Job statistics reporter started");
        loop {
            timer.tick().await;
            if dispatcher.is_shutting_down() {
                break;
            }
            info!("📊️ {}", dispatcher.stats());
        }
        debug!("📊️ Job statistics reporter stopped");
    });
    Some(handle)
}

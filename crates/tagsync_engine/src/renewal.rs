//! Background renewal timer.
//!
//! While the host is in the foreground the timer requests a renewal sync
//! after each backoff step (10s, 60s, 120s, then every 120s). Going to the
//! background disarms it; coming back to the foreground starts the backoff
//! over.

use crate::config::RenewalBackoff;
use crate::scheduler::SyncScheduler;
use crate::transport::SyncTransport;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a running renewal timer. Dropping it stops the timer.
#[derive(Debug)]
pub struct RenewalTimer {
    handle: Option<JoinHandle<()>>,
}

impl RenewalTimer {
    /// Starts the timer.
    ///
    /// `foreground` carries whether the host is active. The timer stops when
    /// its sender is dropped.
    pub fn start<T: SyncTransport + 'static>(
        scheduler: SyncScheduler<T>,
        backoff: RenewalBackoff,
        foreground: watch::Receiver<bool>,
    ) -> Self {
        let handle = tokio::spawn(run(scheduler, backoff, foreground));
        Self {
            handle: Some(handle),
        }
    }

    /// Returns true until the timer is stopped or its signal closes.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the timer and clears any armed delay.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for RenewalTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run<T: SyncTransport + 'static>(
    scheduler: SyncScheduler<T>,
    backoff: RenewalBackoff,
    mut foreground: watch::Receiver<bool>,
) {
    loop {
        loop {
            let active = *foreground.borrow_and_update();
            if active {
                break;
            }
            if foreground.changed().await.is_err() {
                return;
            }
        }

        debug!("foreground, arming renewal timer");
        let mut attempt = 0;
        'armed: loop {
            let sleep = tokio::time::sleep(backoff.delay_for_attempt(attempt));
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    () = &mut sleep => {
                        scheduler.request_sync(true, None);
                        attempt += 1;
                        continue 'armed;
                    }
                    changed = foreground.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let active = *foreground.borrow_and_update();
                        if !active {
                            debug!("background, renewal timer disarmed");
                            break 'armed;
                        }
                    }
                }
            }
        }
    }
}

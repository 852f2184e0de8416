//! Latched safety fault.
//!
//! An alarm or emergency observed during homing, jog or a motion wait trips
//! the latch. While tripped, every command that starts motion is refused
//! with `SafetyFault` until the operator calls `reset_alarm()`.
//! Reaching a soft limit stops motion but does not trip the latch.
//!
//! [`EmergencyWatch`] polls the panel emergency switch on its own thread.
//! A press trips the latch and runs the stop handler; a press still held
//! after an operator reset trips it again.

use parking_lot::Mutex;
use splebo_common::error::{RobotError, RobotResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Sticky fault flag with the reason of the first trip.
#[derive(Debug, Default)]
pub struct SafetyLatch {
    tripped: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl SafetyLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch a fault. Later trips keep the first reason.
    pub fn trip(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut slot = self.reason.lock();
        if slot.is_none() {
            error!(%reason, "Safety fault latched");
            *slot = Some(reason);
        }
        self.tripped.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// `Err(SafetyFault)` while tripped.
    pub fn check(&self) -> RobotResult<()> {
        if !self.is_tripped() {
            return Ok(());
        }
        let reason = self
            .reason()
            .unwrap_or_else(|| "safety fault".to_string());
        Err(RobotError::SafetyFault(format!(
            "{reason}; reset alarm before moving"
        )))
    }

    /// Clear the latch (operator reset).
    pub fn reset(&self) {
        let mut slot = self.reason.lock();
        if slot.take().is_some() {
            info!("Safety fault cleared");
        }
        self.tripped.store(false, Ordering::Release);
    }
}

// ─── Emergency switch watch ─────────────────────────────────────────

/// Background watch of an emergency input. Stops its thread on drop.
pub struct EmergencyWatch {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EmergencyWatch {
    /// Spawn the watch.
    ///
    /// `pressed` returns `Ok(None)` once its source is gone, which ends the
    /// thread. Read errors are logged and the previous state is kept.
    pub fn start<P, S>(
        latch: Arc<SafetyLatch>,
        interval: Duration,
        pressed: P,
        on_press: S,
    ) -> RobotResult<Self>
    where
        P: Fn() -> RobotResult<Option<bool>> + Send + 'static,
        S: Fn() + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("emg-watch".to_string())
            .spawn(move || {
                debug!(?interval, "Emergency watch started");
                let mut was_pressed = false;
                while flag.load(Ordering::Acquire) {
                    match pressed() {
                        Ok(Some(now)) => {
                            if now && (!was_pressed || !latch.is_tripped()) {
                                latch.trip("emergency switch pressed");
                                on_press();
                            }
                            was_pressed = now;
                        }
                        Ok(None) => break,
                        Err(e) => warn!(%e, "Emergency switch read failed"),
                    }
                    thread::sleep(interval);
                }
                debug!("Emergency watch stopped");
            })
            .map_err(|e| RobotError::Configuration(format!("emergency watch thread: {e}")))?;
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Emergency watch thread panicked");
            }
        }
    }
}

impl Drop for EmergencyWatch {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Jog motion with soft-limit monitors.
//!
//! `jog_start` validates the request, submits a `MoveJog` and spawns a
//! monitor thread for the axis. The monitor re-reads the position every
//! poll interval and stops the axis once it reaches the soft limit in the
//! direction of travel, then exits:
//!
//! ```text
//! jog_start ──► MoveJog ──► monitor ──poll──► position ≥ limit? ──yes──► Stop, exit
//!                              ▲                     │ no
//!                              └──── sleep(poll) ◄───┘
//! ```
//!
//! At most one session exists per axis; a new `jog_start` on the same axis
//! cancels the previous monitor first. Monitors never take the session
//! lock, so `jog_stop` can join them while holding nothing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use splebo_common::axis::{AxisId, JogDirection, axis_name, check_axis};
use splebo_common::config::JogConfig;
use splebo_common::consts::AXIS_COUNT;
use splebo_common::error::{RobotError, RobotResult};
use tracing::{debug, info, warn};

use crate::axis::AxisController;

/// Why a monitor ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JogStopReason {
    /// `jog_stop`, `stop_all` or a newer jog on the same axis.
    Cancelled,
    /// Position reached the soft limit.
    SoftLimit,
    /// Alarm or emergency observed.
    SafetyFault,
    /// The position could not be read.
    CommandFailed,
}

/// Public view of an active jog.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JogInfo {
    pub axis: AxisId,
    pub direction: JogDirection,
    /// Requested speed [mm/s].
    pub speed: f64,
}

struct JogSession {
    info: JogInfo,
    cancel: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
}

impl JogSession {
    fn is_active(&self) -> bool {
        self.monitor.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the monitor and wait for it.
    fn cancel(mut self) {
        self.cancel.store(true, Ordering::Release);
        if let Some(handle) = self.monitor.take() {
            if handle.join().is_err() {
                warn!(axis = axis_name(self.info.axis), "jog monitor panicked");
            }
        }
    }
}

/// Jog sessions of every axis.
pub struct JogController {
    axes: Arc<AxisController>,
    config: JogConfig,
    sessions: Mutex<HashMap<AxisId, JogSession>>,
    last_stop: Arc<Mutex<[Option<JogStopReason>; AXIS_COUNT]>>,
}

impl JogController {
    pub fn new(axes: Arc<AxisController>, config: JogConfig) -> Self {
        Self {
            axes,
            config,
            sessions: Mutex::new(HashMap::new()),
            last_stop: Arc::new(Mutex::new([None; AXIS_COUNT])),
        }
    }

    #[inline]
    pub fn config(&self) -> &JogConfig {
        &self.config
    }

    /// Start jogging `axis` at `speed` mm/s.
    ///
    /// # Errors
    /// `Validation` for a bad axis, a speed outside the configured window,
    /// or a position already at or beyond the soft limit in `direction`.
    /// `SafetyFault` while a fault is latched.
    pub fn jog_start(&self, axis: AxisId, direction: JogDirection, speed: f64) -> RobotResult<()> {
        let axis = check_axis(axis)?;
        let cfg = self.axes.motor_config(axis)?.clone();
        let (min, max) = (self.config.speed_min_mm_s, self.config.speed_max_mm_s);
        if !(min..=max).contains(&speed) {
            return Err(RobotError::validation(format!(
                "jog speed {speed} outside [{min}, {max}] mm/s"
            )));
        }
        self.axes.safety().check()?;

        let position = self.axes.position_mm(axis)?;
        let blocked = match direction {
            JogDirection::Ccw => position <= cfg.limit_minus,
            JogDirection::Cw => position >= cfg.limit_plus,
        };
        if blocked {
            return Err(RobotError::validation(format!(
                "axis {} at {position} already at soft limit for {direction} jog",
                axis_name(axis)
            )));
        }

        // One session per axis.
        let previous = self.sessions.lock().remove(&axis);
        if let Some(previous) = previous {
            previous.cancel();
        }

        self.axes
            .start_jog(axis, cfg.speed_to_pps(speed), direction)?;
        self.last_stop.lock()[axis as usize] = None;

        let cancel = Arc::new(AtomicBool::new(false));
        let monitor = Monitor {
            axes: Arc::clone(&self.axes),
            axis,
            direction,
            limit_minus: cfg.limit_minus,
            limit_plus: cfg.limit_plus,
            poll: self.config.poll_interval(),
            cancel: Arc::clone(&cancel),
            last_stop: Arc::clone(&self.last_stop),
        };
        let handle = thread::Builder::new()
            .name(format!("jog-{}", axis_name(axis)))
            .spawn(move || monitor.run());
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                let _ = self.axes.stop(axis);
                return Err(RobotError::Configuration(format!("jog monitor thread: {e}")));
            }
        };

        info!(axis = axis_name(axis), %direction, speed, position, "Jog started");
        self.sessions.lock().insert(
            axis,
            JogSession {
                info: JogInfo {
                    axis,
                    direction,
                    speed,
                },
                cancel,
                monitor: Some(handle),
            },
        );
        Ok(())
    }

    /// Cancel the monitor and stop the axis. Safe without an active jog.
    pub fn jog_stop(&self, axis: AxisId) -> RobotResult<()> {
        let axis = check_axis(axis)?;
        let session = self.sessions.lock().remove(&axis);
        if let Some(session) = session {
            session.cancel();
            self.record_stop(axis, JogStopReason::Cancelled);
        }
        if self.axes.config(axis)?.is_configured() {
            self.axes.stop(axis)?;
        }
        debug!(axis = axis_name(axis), "Jog stopped");
        Ok(())
    }

    /// Cancel every monitor and stop every fitted axis.
    pub fn stop_all(&self) -> RobotResult<()> {
        let sessions: Vec<JogSession> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in sessions {
            let axis = session.info.axis;
            session.cancel();
            self.record_stop(axis, JogStopReason::Cancelled);
        }
        let mut first_err = None;
        for axis in self.axes.configured_axes() {
            if let Err(e) = self.axes.stop(axis) {
                warn!(axis = axis_name(axis), %e, "stop failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Whether `axis` has a running monitor.
    pub fn is_jogging(&self, axis: AxisId) -> bool {
        self.sessions
            .lock()
            .get(&axis)
            .is_some_and(JogSession::is_active)
    }

    /// Active jogs, ascending by axis.
    pub fn active(&self) -> Vec<JogInfo> {
        let mut active: Vec<JogInfo> = self
            .sessions
            .lock()
            .values()
            .filter(|s| s.is_active())
            .map(|s| s.info)
            .collect();
        active.sort_by_key(|j| j.axis);
        active
    }

    /// How the last jog on `axis` ended; `None` while running or never jogged.
    pub fn last_stop(&self, axis: AxisId) -> Option<JogStopReason> {
        self.last_stop.lock().get(axis as usize).copied().flatten()
    }

    fn record_stop(&self, axis: AxisId, reason: JogStopReason) {
        let mut last = self.last_stop.lock();
        if let Some(slot) = last.get_mut(axis as usize) {
            slot.get_or_insert(reason);
        }
    }
}

impl Drop for JogController {
    fn drop(&mut self) {
        for (_, session) in self.sessions.get_mut().drain() {
            session.cancel();
        }
    }
}

// ─── Monitor ────────────────────────────────────────────────────────

struct Monitor {
    axes: Arc<AxisController>,
    axis: AxisId,
    direction: JogDirection,
    limit_minus: f64,
    limit_plus: f64,
    poll: Duration,
    cancel: Arc<AtomicBool>,
    last_stop: Arc<Mutex<[Option<JogStopReason>; AXIS_COUNT]>>,
}

impl Monitor {
    fn run(self) {
        let reason = self.watch();
        if reason != JogStopReason::Cancelled {
            if let Err(e) = self.axes.stop(self.axis) {
                warn!(axis = axis_name(self.axis), %e, "monitor stop failed");
            }
        }
        let mut last = self.last_stop.lock();
        last[self.axis as usize].get_or_insert(reason);
    }

    /// Poll until a reason to stop shows up.
    fn watch(&self) -> JogStopReason {
        let name = axis_name(self.axis);
        loop {
            thread::sleep(self.poll);
            if self.cancel.load(Ordering::Acquire) {
                return JogStopReason::Cancelled;
            }
            let sample = match self.axes.sample(self.axis) {
                Ok(sample) => sample,
                Err(e) => {
                    warn!(axis = name, %e, "jog monitor lost position");
                    return JogStopReason::CommandFailed;
                }
            };
            if self.cancel.load(Ordering::Acquire) {
                return JogStopReason::Cancelled;
            }
            if let Some(fault) = sample.fault() {
                self.axes
                    .safety()
                    .trip(format!("axis {name} {fault} during jog"));
                return JogStopReason::SafetyFault;
            }
            let reached = match self.direction {
                JogDirection::Cw => sample.position >= self.limit_plus,
                JogDirection::Ccw => sample.position <= self.limit_minus,
            };
            if reached {
                info!(axis = name, position = sample.position, "Soft limit reached, jog stopped");
                return JogStopReason::SoftLimit;
            }
        }
    }
}

//! Point sequences: ordered moves through teaching points.
//!
//! A sequence runs on the caller's thread. Other threads may pause it,
//! resume it or request a stop; both take effect between points. A stop
//! also cuts the settle delay short. Halting an axis mid-move is left to
//! `stop_all`.

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use splebo_common::error::{RobotError, RobotResult};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum SequenceState {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    /// Stopped on request before the last point.
    Aborted,
    Failed,
}

/// Progress of the current (or last) sequence.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SequenceProgress {
    pub state: SequenceState,
    /// 1-based index of the point being approached.
    pub step: usize,
    pub total: usize,
    pub point_no: Option<u32>,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct Flags {
    running: bool,
    paused: bool,
    stop: bool,
}

/// Run state shared between the sequence thread and its controllers.
#[derive(Debug, Default)]
pub struct SequenceControl {
    flags: Mutex<Flags>,
    wake: Condvar,
    progress: Mutex<SequenceProgress>,
}

impl SequenceControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visit `points` in order through `move_to`, settling `step_delay`
    /// between points.
    ///
    /// Returns the final progress: `Completed`, or `Aborted` after a stop
    /// request. A failing move ends the run as `Failed` with its error.
    pub fn run<F>(&self, points: &[u32], step_delay: Duration, mut move_to: F) -> RobotResult<SequenceProgress>
    where
        F: FnMut(u32) -> RobotResult<()>,
    {
        if points.is_empty() {
            return Err(RobotError::validation("point sequence is empty"));
        }
        {
            let mut flags = self.flags.lock();
            if flags.running {
                return Err(RobotError::validation("sequence already running"));
            }
            *flags = Flags {
                running: true,
                ..Flags::default()
            };
        }
        *self.progress.lock() = SequenceProgress {
            state: SequenceState::Running,
            total: points.len(),
            ..SequenceProgress::default()
        };
        info!(points = ?points, "Point sequence started");

        for (i, &point_no) in points.iter().enumerate() {
            if !self.wait_unpaused() {
                return Ok(self.finish(SequenceState::Aborted, None));
            }
            {
                let mut progress = self.progress.lock();
                progress.step = i + 1;
                progress.point_no = Some(point_no);
            }
            if let Err(err) = move_to(point_no) {
                warn!(point_no, %err, "Point sequence failed");
                self.finish(SequenceState::Failed, Some(err.to_string()));
                return Err(err);
            }
            let last = i + 1 == points.len();
            if !last && !self.settle(step_delay) {
                return Ok(self.finish(SequenceState::Aborted, None));
            }
        }
        Ok(self.finish(SequenceState::Completed, None))
    }

    /// Request a stop; a paused sequence wakes up to end.
    pub fn stop(&self) {
        let mut flags = self.flags.lock();
        if flags.running {
            flags.stop = true;
            flags.paused = false;
            self.wake.notify_all();
        }
    }

    /// Hold the sequence before its next point. `false` when idle.
    pub fn pause(&self) -> bool {
        let mut flags = self.flags.lock();
        if !flags.running || flags.stop {
            return false;
        }
        flags.paused = true;
        self.progress.lock().state = SequenceState::Paused;
        true
    }

    pub fn resume(&self) {
        let mut flags = self.flags.lock();
        if flags.paused {
            flags.paused = false;
            self.progress.lock().state = SequenceState::Running;
            self.wake.notify_all();
        }
    }

    pub fn is_running(&self) -> bool {
        self.flags.lock().running
    }

    pub fn progress(&self) -> SequenceProgress {
        self.progress.lock().clone()
    }

    /// Block while paused. `false` once a stop is requested.
    fn wait_unpaused(&self) -> bool {
        let mut flags = self.flags.lock();
        self.wake.wait_while(&mut flags, |f| f.paused && !f.stop);
        !flags.stop
    }

    /// Sleep `delay` unless a stop arrives first.
    fn settle(&self, delay: Duration) -> bool {
        let mut flags = self.flags.lock();
        self.wake.wait_while_for(&mut flags, |f| !f.stop, delay);
        !flags.stop
    }

    fn finish(&self, state: SequenceState, error: Option<String>) -> SequenceProgress {
        let mut flags = self.flags.lock();
        *flags = Flags::default();
        let mut progress = self.progress.lock();
        progress.state = state;
        progress.error = error;
        info!(state = ?state, step = progress.step, total = progress.total, "Point sequence ended");
        progress.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn visits_points_in_order() {
        let control = SequenceControl::new();
        let mut visited = Vec::new();
        let progress = control
            .run(&[3, 1, 2], Duration::ZERO, |p| {
                visited.push(p);
                Ok(())
            })
            .unwrap();
        assert_eq!(visited, vec![3, 1, 2]);
        assert_eq!(progress.state, SequenceState::Completed);
        assert_eq!(progress.step, 3);
        assert!(!control.is_running());
    }

    #[test]
    fn failing_move_ends_sequence() {
        let control = SequenceControl::new();
        let mut visited = Vec::new();
        let err = control
            .run(&[1, 2, 3], Duration::ZERO, |p| {
                visited.push(p);
                if p == 2 {
                    Err(RobotError::SafetyFault("alarm".into()))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert!(matches!(err, RobotError::SafetyFault(_)));
        assert_eq!(visited, vec![1, 2]);
        let progress = control.progress();
        assert_eq!(progress.state, SequenceState::Failed);
        assert_eq!(progress.point_no, Some(2));
        assert!(progress.error.is_some());
    }

    #[test]
    fn empty_sequence_is_rejected() {
        let control = SequenceControl::new();
        assert!(matches!(
            control.run(&[], Duration::ZERO, |_| Ok(())),
            Err(RobotError::Validation(_))
        ));
    }

    #[test]
    fn pause_holds_and_stop_aborts() {
        let control = Arc::new(SequenceControl::new());
        let (tx, rx) = mpsc::channel();
        let runner = {
            let control = Arc::clone(&control);
            thread::spawn(move || {
                control.run(&[1, 2, 3], Duration::from_millis(200), |p| {
                    tx.send(p).unwrap();
                    Ok(())
                })
            })
        };

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
        assert!(control.pause());
        // Second request while the first still runs.
        assert!(matches!(
            control.run(&[1], Duration::ZERO, |_| Ok(())),
            Err(RobotError::Validation(_))
        ));
        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
        assert_eq!(control.progress().state, SequenceState::Paused);

        control.resume();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
        control.stop();

        let progress = runner.join().unwrap().unwrap();
        assert_eq!(progress.state, SequenceState::Aborted);
        assert_eq!(progress.step, 2);
        assert!(rx.try_recv().is_err());
        assert!(!control.pause());
    }
}

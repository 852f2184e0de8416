//! Grouped origin return.
//!
//! ## State machine (per axis)
//!
//! ```text
//! MoveStart → MoveCheck ─┬─(sensor Auto)─► ControllerHomeStart → ControllerHomeCheck ─┐
//!                        ├─(sensor On)───► OriginSensorCheck ───────────────────────────┤
//!                        └─(sensor Off)─────────────────────────────────────────────────┤
//!                                                                                       ▼
//!                     ParameterSet ◄── OffsetMoveCheck ◄── OffsetMoveStart ◄─(offset ≠ 0)
//!                          │
//!                          ▼
//!                         End
//! ```
//!
//! ## Scheduling
//!
//! Axes are grouped by `origin_order`. Groups run one after another in
//! ascending order; the current order value is the *turn*. Inside the
//! active group every axis advances one step per scheduler tick, so the
//! axes of a group home concurrently. Unfitted axes are marked homed up
//! front and never scheduled.
//!
//! ## Failure policy
//!
//! | Observed                       | Axis result                  | Error                  |
//! |--------------------------------|------------------------------|------------------------|
//! | alarm or emergency             | End, homed, `homing_error`   | `SafetyFault` (latched)|
//! | origin sensor not active       | continues, `homing_error`    | none                   |
//! | command rejected               | End, `homing_error`          | `HardwareCommandFailure` |
//! | per-axis timeout               | stopped, End, `homing_error` | `CommunicationTimeout` |
//!
//! A failed axis never blocks its siblings. Nothing is retried.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use splebo_common::axis::config::{AxisConfig, OriginSensorMode};
use splebo_common::axis::{AxisId, axis_name, check_axis};
use splebo_common::consts::AXIS_COUNT;
use splebo_common::error::{RobotError, RobotResult};
use tracing::{debug, info, warn};

use crate::axis::AxisController;
use crate::motor::{AxisPort, MotorDriver};

// ─── States ─────────────────────────────────────────────────────────

/// Homing state of one axis.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum HomingState {
    /// Not part of the current run.
    #[default]
    Idle = 0,
    MoveStart = 1,
    MoveCheck = 2,
    ControllerHomeStart = 3,
    ControllerHomeCheck = 4,
    OriginSensorCheck = 5,
    OffsetMoveStart = 6,
    OffsetMoveCheck = 7,
    ParameterSet = 8,
    End = 9,
}

impl HomingState {
    #[inline]
    pub const fn is_end(self) -> bool {
        matches!(self, Self::End)
    }

    /// State after a completed step, given the axis configuration.
    pub fn next(self, cfg: &AxisConfig) -> Self {
        let after_origin = if cfg.origin_offset != 0.0 {
            Self::OffsetMoveStart
        } else {
            Self::ParameterSet
        };
        match self {
            Self::Idle => Self::MoveStart,
            Self::MoveStart => Self::MoveCheck,
            Self::MoveCheck => match cfg.origin_sensor {
                OriginSensorMode::Auto => Self::ControllerHomeStart,
                OriginSensorMode::On => Self::OriginSensorCheck,
                OriginSensorMode::Off => after_origin,
            },
            Self::ControllerHomeStart => Self::ControllerHomeCheck,
            Self::ControllerHomeCheck | Self::OriginSensorCheck => after_origin,
            Self::OffsetMoveStart => Self::OffsetMoveCheck,
            Self::OffsetMoveCheck => Self::ParameterSet,
            Self::ParameterSet | Self::End => Self::End,
        }
    }
}

/// One state transition, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HomingEvent {
    /// Origin order being processed.
    pub turn: u8,
    pub axis: AxisId,
    /// State entered.
    pub state: HomingState,
}

/// Progress of the current (or last) homing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HomingProgress {
    /// Origin order of the active group; `None` when idle.
    pub turn: Option<u8>,
    pub states: [HomingState; AXIS_COUNT],
    /// Fitted axes keyed by origin order.
    pub groups: BTreeMap<u8, Vec<AxisId>>,
    pub events: Vec<HomingEvent>,
    pub running: bool,
}

impl HomingProgress {
    fn enter(&mut self, axis: AxisId, state: HomingState) {
        self.states[axis as usize] = state;
        self.events.push(HomingEvent {
            turn: self.turn.unwrap_or_default(),
            axis,
            state,
        });
    }
}

/// Outcome of a homing run.
#[derive(Debug, Clone, Default)]
pub struct HomingReport {
    /// Axes that reached End without error.
    pub homed: Vec<AxisId>,
    /// Axes that ended with `homing_error`, with the cause when one was raised.
    pub failed: Vec<(AxisId, Option<RobotError>)>,
}

impl HomingReport {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// First raised error, if any.
    pub fn first_error(&self) -> Option<&RobotError> {
        self.failed.iter().find_map(|(_, e)| e.as_ref())
    }

    /// `Err` carrying the first raised error, or a generic one when an axis
    /// failed silently (origin sensor missing).
    pub fn into_result(self) -> RobotResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        if let Some(err) = self.first_error() {
            return Err(err.clone());
        }
        let axes: Vec<&str> = self.failed.iter().map(|(a, _)| axis_name(*a)).collect();
        Err(RobotError::SafetyFault(format!(
            "homing finished with errors on {}",
            axes.join(", ")
        )))
    }
}

/// Result of one step.
enum Step {
    /// Stay in the current state.
    Wait,
    /// Step complete; advance.
    Advance,
    /// Advance but flag the axis (origin sensor not found).
    AdvanceFlagged,
}

// ─── Scheduler ──────────────────────────────────────────────────────

/// A claimed homing run. Dropping it unexecuted releases the claim.
#[must_use = "the claim blocks jog and point moves until executed or dropped"]
pub struct HomingPlan<'a> {
    scheduler: &'a HomingScheduler,
    groups: BTreeMap<u8, Vec<AxisId>>,
    homed: Vec<AxisId>,
}

impl HomingPlan<'_> {
    /// Fitted axes of the run keyed by origin order.
    pub fn groups(&self) -> &BTreeMap<u8, Vec<AxisId>> {
        &self.groups
    }

    /// Run the plan to completion. Blocks until done.
    pub fn execute(mut self) -> RobotResult<HomingReport> {
        let scheduler = self.scheduler;
        let groups = std::mem::take(&mut self.groups);
        let mut report = HomingReport {
            homed: std::mem::take(&mut self.homed),
            failed: Vec::new(),
        };
        for axes in groups.values() {
            for &axis in axes {
                scheduler.axes.update_status(axis, |st| {
                    st.homed = false;
                    st.homing_error = false;
                });
            }
        }

        let result = groups
            .iter()
            .try_for_each(|(&order, axes)| scheduler.run_group(order, axes, &mut report));
        drop(self);

        result?;
        info!(homed = ?report.homed, failed = report.failed.len(), "Homing finished");
        Ok(report)
    }
}

impl Drop for HomingPlan<'_> {
    fn drop(&mut self) {
        self.scheduler.release();
    }
}

/// Runs homing against an [`AxisController`].
pub struct HomingScheduler {
    axes: Arc<AxisController>,
    tick: Duration,
    timeout: Duration,
    progress: Mutex<HomingProgress>,
    cancel: AtomicBool,
}

impl HomingScheduler {
    pub fn new(axes: Arc<AxisController>, tick: Duration, timeout: Duration) -> Self {
        Self {
            axes,
            tick,
            timeout,
            progress: Mutex::new(HomingProgress::default()),
            cancel: AtomicBool::new(false),
        }
    }

    /// Copy of the current progress.
    pub fn progress(&self) -> HomingProgress {
        self.progress.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.progress.lock().running
    }

    /// Ask a running homing to stop at its next tick.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Home every fitted axis, group by group. Blocks until done.
    pub fn home_all(&self) -> RobotResult<HomingReport> {
        self.plan_all()?.execute()
    }

    /// Home a single axis outside the group order.
    pub fn home_axis(&self, axis: AxisId) -> RobotResult<HomingReport> {
        self.plan_axis(axis)?.execute()
    }

    /// Claim a run over every fitted axis. From here on `is_running()`
    /// reports true until the plan is executed or dropped.
    pub fn plan_all(&self) -> RobotResult<HomingPlan<'_>> {
        self.axes.safety().check()?;
        let mut groups: BTreeMap<u8, Vec<AxisId>> = BTreeMap::new();
        let mut unfitted = Vec::new();
        for (idx, cfg) in self.axes.params().axes().iter().enumerate() {
            let axis = idx as AxisId;
            if cfg.is_configured() {
                groups.entry(cfg.origin_order).or_default().push(axis);
            } else {
                unfitted.push(axis);
            }
        }
        let plan = self.claim(groups, Vec::new())?;
        for axis in unfitted {
            self.axes.update_status(axis, |st| {
                st.homed = true;
                st.homing_error = false;
            });
        }
        info!(groups = ?plan.groups, "Homing all axes");
        Ok(plan)
    }

    /// Claim a run over one axis.
    pub fn plan_axis(&self, axis: AxisId) -> RobotResult<HomingPlan<'_>> {
        let axis = check_axis(axis)?;
        self.axes.safety().check()?;
        let cfg = self.axes.config(axis)?;
        if !cfg.is_configured() {
            let plan = self.claim(BTreeMap::new(), vec![axis])?;
            self.axes.update_status(axis, |st| st.homed = true);
            return Ok(plan);
        }
        let plan = self.claim(BTreeMap::from([(cfg.origin_order, vec![axis])]), Vec::new())?;
        info!(axis = axis_name(axis), "Homing single axis");
        Ok(plan)
    }

    fn claim(
        &self,
        groups: BTreeMap<u8, Vec<AxisId>>,
        homed: Vec<AxisId>,
    ) -> RobotResult<HomingPlan<'_>> {
        let mut progress = self.progress.lock();
        if progress.running {
            return Err(RobotError::validation("homing already running"));
        }
        // Only a fresh run forgets an earlier cancel request.
        self.cancel.store(false, Ordering::Release);
        *progress = HomingProgress {
            groups: groups.clone(),
            running: true,
            ..HomingProgress::default()
        };
        Ok(HomingPlan {
            scheduler: self,
            groups,
            homed,
        })
    }

    fn release(&self) {
        let mut progress = self.progress.lock();
        progress.running = false;
        progress.turn = None;
    }

    /// Tick every axis of one group until all reach End.
    fn run_group(&self, order: u8, axes: &[AxisId], report: &mut HomingReport) -> RobotResult<()> {
        info!(turn = order, axes = ?axes, "Homing group started");
        {
            let mut progress = self.progress.lock();
            progress.turn = Some(order);
            for &axis in axes {
                progress.enter(axis, HomingState::MoveStart);
            }
        }
        let started = Instant::now();
        let mut flagged = [false; AXIS_COUNT];

        loop {
            if self.cancel.swap(false, Ordering::AcqRel) {
                for &axis in axes {
                    if !self.state(axis).is_end() {
                        let _ = self.axes.stop(axis);
                        self.finish(axis, true);
                    }
                }
                warn!(turn = order, "Homing cancelled");
                return Err(RobotError::SafetyFault("homing cancelled".to_string()));
            }

            let mut active = false;
            for &axis in axes {
                let state = self.state(axis);
                if state.is_end() {
                    continue;
                }
                active = true;

                if started.elapsed() >= self.timeout {
                    let _ = self.axes.stop(axis);
                    self.finish(axis, true);
                    warn!(axis = axis_name(axis), ?state, "Homing timed out");
                    report.failed.push((
                        axis,
                        Some(RobotError::CommunicationTimeout(format!(
                            "axis {} homing stuck in {state:?} after {:?}",
                            axis_name(axis),
                            self.timeout
                        ))),
                    ));
                    continue;
                }

                match self.step(axis, state) {
                    Ok(Step::Wait) => {}
                    Ok(outcome) => {
                        if matches!(outcome, Step::AdvanceFlagged) {
                            flagged[axis as usize] = true;
                            self.axes.update_status(axis, |st| st.homing_error = true);
                            warn!(axis = axis_name(axis), "Origin sensor not active after homing move");
                        }
                        let cfg = self.axes.config(axis)?;
                        let next = state.next(cfg);
                        self.progress.lock().enter(axis, next);
                        debug!(axis = axis_name(axis), ?next, "Homing step");
                        if next.is_end() {
                            let failed = flagged[axis as usize];
                            self.finish(axis, failed);
                            if failed {
                                report.failed.push((axis, None));
                            } else {
                                report.homed.push(axis);
                            }
                        }
                    }
                    Err(err) => {
                        let _ = self.axes.stop(axis);
                        self.finish(axis, true);
                        warn!(axis = axis_name(axis), ?state, %err, "Homing failed");
                        report.failed.push((axis, Some(err)));
                    }
                }
            }

            if !active {
                break;
            }
            thread::sleep(self.tick);
        }
        info!(turn = order, "Homing group complete");
        Ok(())
    }

    /// Run one state of one axis.
    fn step(&self, axis: AxisId, state: HomingState) -> RobotResult<Step> {
        let driver: &dyn MotorDriver = self.axes.driver(axis)?;
        let port: AxisPort<'_> = self.axes.port(axis)?;

        let sample = self.axes.sample(axis)?;
        if let Some(fault) = sample.fault() {
            self.axes
                .safety()
                .trip(format!("axis {} {fault} during homing", axis_name(axis)));
            return Err(RobotError::SafetyFault(format!(
                "axis {} {fault} during homing",
                axis_name(axis)
            )));
        }

        let done = |finished: bool| if finished { Step::Advance } else { Step::Wait };
        let step = match state {
            HomingState::Idle | HomingState::End => Step::Advance,
            HomingState::MoveStart => {
                driver.home_move_start(&port)?;
                Step::Advance
            }
            HomingState::MoveCheck => done(driver.home_move_check(&port)?),
            HomingState::ControllerHomeStart => {
                driver.controller_home_start(&port)?;
                Step::Advance
            }
            HomingState::ControllerHomeCheck => done(driver.controller_home_check(&port)?),
            HomingState::OriginSensorCheck => {
                if driver.origin_sensor_check(&port)? {
                    Step::Advance
                } else {
                    Step::AdvanceFlagged
                }
            }
            HomingState::OffsetMoveStart => {
                driver.offset_move_start(&port)?;
                Step::Advance
            }
            HomingState::OffsetMoveCheck => done(driver.offset_move_check(&port)?),
            HomingState::ParameterSet => {
                driver.parameter_set(&port)?;
                Step::Advance
            }
        };
        Ok(step)
    }

    fn state(&self, axis: AxisId) -> HomingState {
        self.progress.lock().states[axis as usize]
    }

    /// Mark the axis finished. Failed axes still count as homed so their
    /// group can complete.
    fn finish(&self, axis: AxisId, failed: bool) {
        let mut progress = self.progress.lock();
        if !progress.states[axis as usize].is_end() {
            progress.enter(axis, HomingState::End);
        }
        drop(progress);
        self.axes.update_status(axis, |st| {
            st.homed = true;
            st.homing_error |= failed;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::testing::sim_controller;
    use splebo_common::axis::config::MotorFamily;
    use splebo_common::axis::params::AxisParameterStore;
    use splebo_common::error::ErrorKind;
    use splebo_hal::drivers::simulation::SimulationHandle;

    fn scheduler(
        params: AxisParameterStore,
        timeout: Duration,
    ) -> (HomingScheduler, Arc<AxisController>, SimulationHandle) {
        let (axes, sim) = sim_controller(params);
        let homing = HomingScheduler::new(Arc::clone(&axes), Duration::from_millis(2), timeout);
        (homing, axes, sim)
    }

    #[test]
    fn transitions_follow_sensor_mode_and_offset() {
        let mut cfg = AxisConfig::with_motor(MotorFamily::SteppingMotor, 100.0, 1);
        assert_eq!(HomingState::MoveCheck.next(&cfg), HomingState::ParameterSet);

        cfg.origin_sensor = OriginSensorMode::Auto;
        assert_eq!(
            HomingState::MoveCheck.next(&cfg),
            HomingState::ControllerHomeStart
        );
        assert_eq!(
            HomingState::ControllerHomeCheck.next(&cfg),
            HomingState::ParameterSet
        );

        cfg.origin_sensor = OriginSensorMode::On;
        cfg.origin_offset = 2.5;
        assert_eq!(
            HomingState::MoveCheck.next(&cfg),
            HomingState::OriginSensorCheck
        );
        assert_eq!(
            HomingState::OriginSensorCheck.next(&cfg),
            HomingState::OffsetMoveStart
        );
        assert_eq!(
            HomingState::OffsetMoveCheck.next(&cfg),
            HomingState::ParameterSet
        );
        assert_eq!(HomingState::ParameterSet.next(&cfg), HomingState::End);
    }

    #[test]
    fn unfitted_axes_are_homed_immediately() {
        let (homing, axes, _sim) = scheduler(AxisParameterStore::default(), Duration::from_secs(5));
        let report = homing.home_all().unwrap();
        assert!(report.is_success());
        assert_eq!(report.homed.len(), 3);
        for axis in 0..AXIS_COUNT as AxisId {
            assert!(axes.status(axis).unwrap().homed);
        }
        assert!(!homing.is_running());
    }

    #[test]
    fn second_request_keeps_pending_cancel() {
        let (homing, _axes, sim) = scheduler(AxisParameterStore::default(), Duration::from_secs(5));
        sim.set_position(0, 5_000);
        let plan = homing.plan_all().unwrap();
        assert!(homing.is_running());
        assert_eq!(plan.groups().len(), 2);

        homing.cancel();
        let err = homing.home_all().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(homing.home_axis(2).is_err());

        let err = plan.execute().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SafetyFault);
        assert!(!homing.is_running());
        assert_ne!(sim.position(0), 0);
    }

    #[test]
    fn dropped_plan_releases_claim() {
        let (homing, _axes, _sim) = scheduler(AxisParameterStore::default(), Duration::from_secs(5));
        drop(homing.plan_axis(1).unwrap());
        assert!(!homing.is_running());
        assert!(homing.plan_all().is_ok());
    }

    #[test]
    fn offset_move_lands_on_new_zero() {
        let mut params = AxisParameterStore::default().axes().to_vec();
        params[2].origin_offset = 5.0;
        params[2].origin_sensor = OriginSensorMode::On;
        let (homing, axes, sim) = scheduler(AxisParameterStore::new(params).unwrap(), Duration::from_secs(5));
        sim.set_speed_scale(10.0);
        sim.set_position(2, 3000);

        let report = homing.home_axis(2).unwrap();
        assert!(report.is_success(), "{report:?}");
        let states: Vec<HomingState> = homing
            .progress()
            .events
            .iter()
            .filter(|e| e.axis == 2)
            .map(|e| e.state)
            .collect();
        assert_eq!(
            states,
            vec![
                HomingState::MoveStart,
                HomingState::MoveCheck,
                HomingState::OriginSensorCheck,
                HomingState::OffsetMoveStart,
                HomingState::OffsetMoveCheck,
                HomingState::ParameterSet,
                HomingState::End,
            ]
        );
        // Offset travelled, then declared zero.
        assert_eq!(axes.position_mm(2).unwrap(), 0.0);
        assert!(!axes.status(2).unwrap().homing_error);
    }

    #[test]
    fn auto_origin_for_stepping_axis() {
        let mut params = AxisParameterStore::default().axes().to_vec();
        params[3] = AxisConfig::with_motor(MotorFamily::SteppingMotor, 50.0, 3);
        params[3].origin_sensor = OriginSensorMode::Auto;
        let (homing, _axes, sim) = scheduler(AxisParameterStore::new(params).unwrap(), Duration::from_secs(5));

        let report = homing.home_axis(3).unwrap();
        assert!(report.is_success());
        assert!(homing
            .progress()
            .events
            .iter()
            .any(|e| e.axis == 3 && e.state == HomingState::ControllerHomeCheck));
        assert_eq!(sim.soft_limit(3), (0, 5000));
    }

    #[test]
    fn alarm_marks_axis_and_latches() {
        let (homing, axes, sim) = scheduler(AxisParameterStore::default(), Duration::from_secs(5));
        sim.set_alarm(0, true);

        let report = homing.home_all().unwrap();
        assert_eq!(
            report.first_error().map(RobotError::kind),
            Some(ErrorKind::SafetyFault)
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(
            report.into_result().unwrap_err().kind(),
            ErrorKind::SafetyFault
        );
        let st = axes.status(0).unwrap();
        assert!(st.homed);
        assert!(st.homing_error);
        // Sibling in the same group still finished cleanly.
        let st = axes.status(1).unwrap();
        assert!(st.homed);
        assert!(!st.homing_error);
        assert!(axes.safety().is_tripped());

        // Refused until reset.
        assert_eq!(homing.home_all().unwrap_err().kind(), ErrorKind::SafetyFault);
        axes.reset_alarm().unwrap();
        assert!(homing.home_all().unwrap().is_success());
    }

    #[test]
    fn stalled_homing_times_out() {
        let (homing, axes, sim) =
            scheduler(AxisParameterStore::default(), Duration::from_millis(300));
        sim.set_origin_stall(2, true);
        sim.set_position(2, 4000);

        // The drive never releases STOP2.
        let report = homing.home_axis(2).unwrap();
        assert!(!report.is_success());
        assert_eq!(
            report.first_error().map(RobotError::kind),
            Some(ErrorKind::CommunicationTimeout)
        );
        let st = axes.status(2).unwrap();
        assert!(st.homing_error);
        assert!(st.homed);
        assert!(!sim.is_moving(2));
        assert_eq!(homing.progress().states[2], HomingState::End);
    }
}

//! Robot session: the composition root.
//!
//! A [`RobotSession`] owns one instance of every subsystem and exposes the
//! operations consumed by the service layer. Nothing outside the session
//! holds hardware state.
//!
//! ```text
//! RobotSession
//!  ├── AxisController ── CommandBridge ── MotionDevice (consumer thread)
//!  │     ├── HomingScheduler
//!  │     └── JogController ── monitors (one thread per jog)
//!  ├── CanBus ── CanPoller (poll thread)
//!  │     └── IoExpander
//!  └── PositionTable ── store file
//! ```
//!
//! `ops` serializes homing, jog start/stop, point moves, teaching and I/O
//! writes. It is held while work is claimed or submitted, never while
//! waiting for hardware. A homing run is claimed under it and then runs
//! without it, so `stop_all` can cancel the run; jog start and point moves
//! are refused while the claim is held, and homing is refused while a jog
//! or point move is active.
//!
//! With an I/O expander attached, an emergency watch polls the panel
//! switch and runs the same stop path as `stop_all` on a press.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use splebo_common::axis::params::AxisParameterStore;
use splebo_common::axis::status::AxisStatus;
use splebo_common::axis::{AxisId, JogDirection, axis_name, check_axis};
use splebo_common::config::{JogConfig, RobotConfig};
use splebo_common::consts::AXIS_COUNT;
use splebo_common::error::{RobotError, RobotResult};
use splebo_common::hal::driver::MotionDevice;
use splebo_common::io::ports::{InputPort, OutputPort};
use splebo_hal::drivers::simulation::SimulatedCanNetwork;
use splebo_hal::{CanBus, CanPoller, MotionDeviceRegistry};
use tracing::{debug, error, info, warn};

use crate::axis::AxisController;
use crate::bridge::CommandBridge;
use crate::homing::{HomingPlan, HomingProgress, HomingReport, HomingScheduler};
use crate::io_expander::IoExpander;
use crate::jog::{JogController, JogInfo};
use crate::safety::EmergencyWatch;
use crate::sequence::{SequenceControl, SequenceProgress};
use crate::teaching::{Position, PositionTable};

/// Axis limits as reported by [`RobotSession::get_config`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisLimits {
    pub axis: AxisId,
    pub name: &'static str,
    pub configured: bool,
    pub limit_minus: f64,
    pub limit_plus: f64,
    pub max_speed: f64,
}

/// Operator-facing configuration.
#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    pub jog: JogConfig,
    pub axes: Vec<AxisLimits>,
}

/// Snapshot returned by [`RobotSession::status`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub connected: bool,
    /// Reason of the latched safety fault.
    pub safety_fault: Option<String>,
    pub axes: [AxisStatus; AXIS_COUNT],
    pub homing: HomingProgress,
    pub jogs: Vec<JogInfo>,
    /// Boards still answering polls.
    pub can_boards: Vec<u8>,
}

struct Subsystems {
    axes: Arc<AxisController>,
    homing: HomingScheduler,
    jog: JogController,
    can: Option<Arc<CanBus>>,
    poller: Mutex<Option<CanPoller>>,
    io: Option<IoExpander>,
    emergency: Mutex<Option<EmergencyWatch>>,
    positions: Mutex<PositionTable>,
    /// Point moves submitted and not yet settled.
    point_moves: AtomicUsize,
}

impl Subsystems {
    /// Cancel homing and jogs, stop every fitted axis.
    fn halt(&self) -> RobotResult<()> {
        self.homing.cancel();
        self.jog.stop_all()
    }

    fn stop_axes(&self, axes: &[AxisId]) {
        for &axis in axes {
            if let Err(e) = self.axes.stop(axis) {
                warn!(axis = axis_name(axis), %e, "stop failed");
            }
        }
    }
}

/// Counts a point move until dropped.
struct PointMove<'a>(&'a AtomicUsize);

impl<'a> PointMove<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        Self(count)
    }
}

impl Drop for PointMove<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One connected robot.
pub struct RobotSession {
    config: RobotConfig,
    ops: Mutex<()>,
    parts: RwLock<Option<Arc<Subsystems>>>,
    sequence: SequenceControl,
}

impl RobotSession {
    /// Unconnected session.
    pub fn new(config: RobotConfig) -> Self {
        Self {
            config,
            ops: Mutex::new(()),
            parts: RwLock::new(None),
            sequence: SequenceControl::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.parts.read().is_some()
    }

    fn parts(&self) -> RobotResult<Arc<Subsystems>> {
        self.parts
            .read()
            .clone()
            .ok_or_else(|| RobotError::validation("robot not connected"))
    }

    fn io(parts: &Subsystems) -> RobotResult<&IoExpander> {
        parts
            .io
            .as_ref()
            .ok_or_else(|| RobotError::Configuration("CAN bus not available".to_string()))
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Connect using the configured motion driver and parameter store.
    ///
    /// The simulation driver brings a simulated CAN network with the
    /// configured boards attached.
    pub fn connect(&self) -> RobotResult<()> {
        let params = match &self.config.storage.axis_params {
            Some(path) => AxisParameterStore::load(path)?,
            None => {
                info!("No axis parameter store configured, using defaults");
                AxisParameterStore::default()
            }
        };
        let registry = MotionDeviceRegistry::with_builtin_drivers();
        let device = registry.create_device(&self.config.motion.driver)?;
        let can = if self.config.motion.driver == "simulation" {
            let net = SimulatedCanNetwork::new();
            for &board in &self.config.can.boards {
                net.attach_board(board);
            }
            Some(CanBus::new(Box::new(net.chip()), self.config.can.clone()))
        } else {
            warn!(driver = %self.config.motion.driver, "No CAN transport for driver, I/O disabled");
            None
        };
        self.connect_with(device, can, params)
    }

    /// Connect with explicit hardware channels.
    pub fn connect_with(
        &self,
        device: Box<dyn MotionDevice>,
        can: Option<CanBus>,
        params: AxisParameterStore,
    ) -> RobotResult<()> {
        let mut slot = self.parts.write();
        if slot.is_some() {
            return Err(RobotError::validation("robot already connected"));
        }
        let motion = &self.config.motion;
        let bridge = Arc::new(CommandBridge::start(
            device,
            motion.bridge_capacity,
            motion.bridge_idle(),
        )?);
        let axes = Arc::new(AxisController::new(
            Arc::clone(&bridge),
            Arc::new(params),
            motion,
        ));
        if let Err(e) = axes.initialize_all() {
            bridge.shutdown();
            return Err(e);
        }

        let (can, poller, io) = match can {
            Some(bus) => {
                bus.init()?;
                let bus = Arc::new(bus);
                let poller = bus.start_polling()?;
                let io = IoExpander::new(Arc::clone(&bus), &self.config.io);
                io.initialize_outputs()?;
                (Some(bus), Some(poller), Some(io))
            }
            None => (None, None, None),
        };

        let storage = &self.config.storage;
        let positions = PositionTable::load(&storage.positions, storage.position_format)?;

        let parts = Arc::new(Subsystems {
            homing: HomingScheduler::new(
                Arc::clone(&axes),
                motion.homing_tick(),
                motion.homing_timeout(),
            ),
            jog: JogController::new(Arc::clone(&axes), self.config.jog.clone()),
            axes,
            can,
            poller: Mutex::new(poller),
            io,
            emergency: Mutex::new(None),
            positions: Mutex::new(positions),
            point_moves: AtomicUsize::new(0),
        });
        if parts.io.is_some() {
            let watch = Self::watch_emergency(&parts, self.config.io.emergency_poll())?;
            *parts.emergency.lock() = Some(watch);
        }
        *slot = Some(parts);
        info!(
            service = %self.config.shared.service_name,
            driver = %motion.driver,
            "Robot connected"
        );
        Ok(())
    }

    /// Poll the expander's emergency switch; a press latches the fault and
    /// halts everything.
    fn watch_emergency(parts: &Arc<Subsystems>, interval: Duration) -> RobotResult<EmergencyWatch> {
        let source: Weak<Subsystems> = Arc::downgrade(parts);
        let halt = Weak::clone(&source);
        EmergencyWatch::start(
            Arc::clone(parts.axes.safety()),
            interval,
            move || match source.upgrade().as_deref().and_then(|p| p.io.as_ref()) {
                Some(io) => io.emergency_active().map(Some),
                None => Ok(None),
            },
            move || {
                let Some(parts) = halt.upgrade() else {
                    return;
                };
                error!("Emergency switch pressed, stopping all motion");
                if let Err(e) = parts.halt() {
                    warn!(%e, "Emergency stop incomplete");
                }
            },
        )
    }

    /// Stop all motion, persist unsaved points and release the hardware.
    pub fn close(&self) -> RobotResult<()> {
        let Some(parts) = self.parts.write().take() else {
            return Ok(());
        };
        if let Some(mut watch) = parts.emergency.lock().take() {
            watch.stop();
        }
        let _ops = self.ops.lock();
        if let Err(e) = parts.halt() {
            warn!(%e, "stop_all during close failed");
        }
        if let Some(mut poller) = parts.poller.lock().take() {
            poller.stop();
        }
        let saved = {
            let mut table = parts.positions.lock();
            if table.is_modified() { table.save() } else { Ok(()) }
        };
        parts.axes.bridge().shutdown();
        info!("Robot closed");
        saved
    }

    // ─── Homing ─────────────────────────────────────────────────────

    /// Home every fitted axis in origin order. Blocks until done.
    ///
    /// Refused with `Validation` while a jog or point move is active.
    pub fn home_all(&self) -> RobotResult<HomingReport> {
        let parts = self.parts()?;
        let plan = self.claim_homing(&parts, None)?;
        let report = plan.execute()?.into_result()?;
        info!(homed = ?report.homed, "Homing complete");
        Ok(report)
    }

    pub fn home_axis(&self, axis: AxisId) -> RobotResult<HomingReport> {
        let parts = self.parts()?;
        let plan = self.claim_homing(&parts, Some(axis))?;
        plan.execute()?.into_result()
    }

    fn claim_homing<'a>(
        &self,
        parts: &'a Subsystems,
        axis: Option<AxisId>,
    ) -> RobotResult<HomingPlan<'a>> {
        let _ops = self.ops.lock();
        if let Some(jog) = parts.jog.active().first() {
            return Err(RobotError::validation(format!(
                "jog in progress on axis {}",
                axis_name(jog.axis)
            )));
        }
        if parts.point_moves.load(Ordering::Acquire) > 0 {
            return Err(RobotError::validation("point move in progress"));
        }
        match axis {
            Some(axis) => parts.homing.plan_axis(axis),
            None => parts.homing.plan_all(),
        }
    }

    fn check_not_homing(parts: &Subsystems) -> RobotResult<()> {
        if parts.homing.is_running() {
            return Err(RobotError::validation("homing in progress"));
        }
        Ok(())
    }

    // ─── Jog ────────────────────────────────────────────────────────

    pub fn jog_start(&self, axis: AxisId, direction: JogDirection, speed: f64) -> RobotResult<()> {
        let parts = self.parts()?;
        let _ops = self.ops.lock();
        Self::check_not_homing(&parts)?;
        parts.jog.jog_start(axis, direction, speed)
    }

    /// Idempotent; succeeds without an active jog.
    pub fn jog_stop(&self, axis: AxisId) -> RobotResult<()> {
        let parts = self.parts()?;
        let _ops = self.ops.lock();
        parts.jog.jog_stop(axis)
    }

    /// Cancel homing and jogs, stop every fitted axis. No-op when not
    /// connected.
    pub fn stop_all(&self) -> RobotResult<()> {
        self.sequence.stop();
        let Ok(parts) = self.parts() else {
            debug!("stop_all on unconnected robot");
            return Ok(());
        };
        parts.homing.cancel();
        let _ops = self.ops.lock();
        parts.halt()
    }

    // ─── Motion ─────────────────────────────────────────────────────

    /// Clear drive alarms and the latched safety fault.
    pub fn reset_alarm(&self) -> RobotResult<()> {
        let parts = self.parts()?;
        let _ops = self.ops.lock();
        parts.axes.reset_alarm()
    }

    pub fn servo(&self, axis: AxisId, on: bool) -> RobotResult<()> {
        let parts = self.parts()?;
        let _ops = self.ops.lock();
        parts.axes.servo(axis, on)
    }

    /// Logical coordinate of every axis slot [mm]; unfitted axes read 0.
    pub fn get_positions(&self) -> RobotResult<[f64; AXIS_COUNT]> {
        let parts = self.parts()?;
        let mut positions = [0.0; AXIS_COUNT];
        for axis in parts.axes.configured_axes() {
            positions[axis as usize] = parts.axes.position_mm(axis)?;
        }
        Ok(positions)
    }

    /// Emergency on any fitted axis or on the expander's stop switch.
    pub fn get_emg_status(&self) -> RobotResult<bool> {
        let parts = self.parts()?;
        for axis in parts.axes.configured_axes() {
            if parts.axes.refresh_status(axis)?.emergency {
                return Ok(true);
            }
        }
        match &parts.io {
            Some(io) => io.emergency_active(),
            None => Ok(false),
        }
    }

    /// Jog speed window and per-axis limits.
    pub fn get_config(&self) -> RobotResult<SessionConfig> {
        let parts = self.parts()?;
        let axes = (0..AXIS_COUNT as AxisId)
            .map(|axis| {
                let cfg = parts.axes.config(axis)?;
                Ok(AxisLimits {
                    axis,
                    name: axis_name(axis),
                    configured: cfg.is_configured(),
                    limit_minus: cfg.limit_minus,
                    limit_plus: cfg.limit_plus,
                    max_speed: cfg.max_speed,
                })
            })
            .collect::<RobotResult<Vec<_>>>()?;
        Ok(SessionConfig {
            jog: parts.jog.config().clone(),
            axes,
        })
    }

    pub fn status(&self) -> SessionStatus {
        match self.parts() {
            Ok(parts) => SessionStatus {
                connected: true,
                safety_fault: parts.axes.safety().reason(),
                axes: parts.axes.statuses(),
                homing: parts.homing.progress(),
                jogs: parts.jog.active(),
                can_boards: parts.can.as_ref().map(|c| c.valid_boards()).unwrap_or_default(),
            },
            Err(_) => SessionStatus {
                connected: false,
                safety_fault: None,
                axes: [AxisStatus::default(); AXIS_COUNT],
                homing: HomingProgress::default(),
                jogs: Vec::new(),
                can_boards: Vec::new(),
            },
        }
    }

    // ─── Teaching ───────────────────────────────────────────────────

    /// Store the live X/Y/Z pose as point `point_no`.
    pub fn register_point_from_current(
        &self,
        point_no: u32,
        comment: &str,
    ) -> RobotResult<Position> {
        let parts = self.parts()?;
        let _ops = self.ops.lock();
        let mut pose = [0.0; 3];
        for (axis, value) in pose.iter_mut().enumerate() {
            let axis = axis as AxisId;
            if parts.axes.config(axis)?.is_configured() {
                *value = parts.axes.position_mm(axis)?;
            }
        }
        let mut table = parts.positions.lock();
        table.teach(point_no, &pose, comment)?;
        table.save()?;
        info!(point_no, ?pose, "Point taught");
        table
            .get(point_no)
            .cloned()
            .ok_or_else(|| RobotError::Persistence(format!("point {point_no} lost after save")))
    }

    /// Drive every fitted axis to point `point_no` and wait for completion.
    ///
    /// A failure on any axis, while submitting or waiting, stops every axis
    /// of the move before the error is returned.
    pub fn move_to_point(&self, point_no: u32, speed_rate: f64) -> RobotResult<()> {
        let parts = self.parts()?;
        let target = self.get_position_table_point(point_no)?;
        let axes = parts.axes.configured_axes();
        let _moving = {
            let _ops = self.ops.lock();
            Self::check_not_homing(&parts)?;
            let moving = PointMove::enter(&parts.point_moves);
            for (i, &axis) in axes.iter().enumerate() {
                let value = target.axis(axis);
                let submitted = if target.is_absolute {
                    parts.axes.move_absolute(axis, value, speed_rate)
                } else {
                    parts.axes.move_relative(axis, value, speed_rate)
                };
                if let Err(err) = submitted {
                    parts.stop_axes(&axes[..i]);
                    return Err(err);
                }
            }
            moving
        };
        let timeout = self.config.motion.motion_timeout();
        for &axis in &axes {
            if let Err(err) = parts.axes.wait_motion_complete(axis, timeout) {
                parts.stop_axes(&axes);
                warn!(point_no, %err, "Point move aborted, axes stopped");
                return Err(err);
            }
        }
        info!(point_no, speed_rate, "Moved to point");
        Ok(())
    }

    // ─── Sequences ──────────────────────────────────────────────────

    /// Move through `points` in order, blocking until the last point is
    /// reached, a stop is requested or a move fails. Every point must exist
    /// before the first move starts.
    pub fn run_point_sequence(&self, points: &[u32], speed_rate: f64) -> RobotResult<SequenceProgress> {
        self.parts()?;
        for &point_no in points {
            self.get_position_table_point(point_no)?;
        }
        self.sequence.run(points, self.config.motion.sequence_step_delay(), |point_no| {
            self.move_to_point(point_no, speed_rate)
        })
    }

    /// End the running sequence after its current point. `stop_all` also
    /// halts the point in progress.
    pub fn stop_sequence(&self) {
        self.sequence.stop();
    }

    /// Hold the running sequence before its next point.
    pub fn pause_sequence(&self) -> bool {
        self.sequence.pause()
    }

    pub fn resume_sequence(&self) {
        self.sequence.resume();
    }

    pub fn sequence_progress(&self) -> SequenceProgress {
        self.sequence.progress()
    }

    pub fn get_position_table_all(&self) -> RobotResult<Vec<Position>> {
        let parts = self.parts()?;
        let table = parts.positions.lock();
        Ok(table.all().to_vec())
    }

    pub fn get_position_table_point(&self, point_no: u32) -> RobotResult<Position> {
        let parts = self.parts()?;
        let table = parts.positions.lock();
        table
            .get(point_no)
            .cloned()
            .ok_or_else(|| RobotError::validation(format!("point {point_no} not found")))
    }

    /// Set X/Y/Z and comment of a point, creating it when missing. Other
    /// coordinates and flags are kept.
    pub fn update_position_table_point(
        &self,
        point_no: u32,
        x: f64,
        y: f64,
        z: f64,
        comment: &str,
    ) -> RobotResult<Position> {
        let parts = self.parts()?;
        let _ops = self.ops.lock();
        let mut table = parts.positions.lock();
        let updated = match table.get(point_no) {
            Some(existing) => {
                let mut pos = existing.clone();
                pos.x = x;
                pos.y = y;
                pos.z = z;
                pos.comment = comment.to_string();
                table.update(pos.clone())?;
                pos
            }
            None => {
                let pos = Position::from_coords(point_no, &[x, y, z], comment);
                table.add(pos.clone())?;
                pos
            }
        };
        table.save()?;
        debug!(point_no, "Point updated");
        Ok(updated)
    }

    /// Position store location.
    pub fn positions_path(&self) -> &Path {
        &self.config.storage.positions
    }

    // ─── I/O ────────────────────────────────────────────────────────

    /// Set output port `port` (numbered from 100) on `board`.
    pub fn io_output(&self, board: u8, port: u16, on: bool) -> RobotResult<()> {
        let parts = self.parts()?;
        let output = OutputPort::from_number(port)
            .ok_or_else(|| RobotError::validation(format!("unknown output port {port}")))?;
        let _ops = self.ops.lock();
        let io = Self::io(&parts)?;
        if board == io.board() {
            io.set_output(output, on)
        } else {
            let can = parts
                .can
                .as_ref()
                .ok_or_else(|| RobotError::Configuration("CAN bus not available".to_string()))?;
            Ok(can.set_output(board, output.bit(), on)?)
        }
    }

    /// Read input port `port` on `board` from the last poll.
    pub fn io_input(&self, board: u8, port: u16) -> RobotResult<bool> {
        let parts = self.parts()?;
        let input = InputPort::from_number(port)
            .ok_or_else(|| RobotError::validation(format!("unknown input port {port}")))?;
        let io = Self::io(&parts)?;
        if board == io.board() {
            io.get_input(input)
        } else {
            let can = parts
                .can
                .as_ref()
                .ok_or_else(|| RobotError::Configuration("CAN bus not available".to_string()))?;
            Ok(can.get_input(board, input.bit())?)
        }
    }

    /// Expander of the connected robot, for composite helpers.
    pub fn with_io<R>(&self, f: impl FnOnce(&IoExpander) -> RobotResult<R>) -> RobotResult<R> {
        let parts = self.parts()?;
        f(Self::io(&parts)?)
    }

    /// Wait for a single axis to stop.
    pub fn wait_motion_complete(&self, axis: AxisId, timeout: Duration) -> RobotResult<AxisStatus> {
        let axis = check_axis(axis)?;
        self.parts()?.axes.wait_motion_complete(axis, timeout)
    }
}

impl Drop for RobotSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(%e, "close on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splebo_common::config::{CanConfig, StorageConfig};
    use splebo_common::error::ErrorKind;
    use splebo_hal::drivers::simulation::{SimulatedMotionController, SimulationHandle};

    fn session(dir: &tempfile::TempDir) -> (RobotSession, SimulationHandle, SimulatedCanNetwork) {
        let config = RobotConfig {
            motion: crate::axis::testing::fast_motion(),
            can: CanConfig {
                boards: vec![0],
                poll_interval_ms: 2,
                inter_board_delay_ms: 0,
                ..CanConfig::default()
            },
            storage: StorageConfig {
                positions: dir.path().join("teach.json"),
                ..StorageConfig::default()
            },
            ..RobotConfig::default()
        };
        let dev = SimulatedMotionController::new();
        let sim = dev.handle();
        let net = SimulatedCanNetwork::new();
        net.attach_board(0);
        let can = CanBus::new(Box::new(net.chip()), config.can.clone());
        let session = RobotSession::new(config);
        session
            .connect_with(Box::new(dev), Some(can), AxisParameterStore::default())
            .unwrap();
        (session, sim, net)
    }

    #[test]
    fn unconnected_session_rejects_work_but_stops_quietly() {
        let session = RobotSession::new(RobotConfig::default());
        assert!(!session.is_connected());
        session.stop_all().unwrap();
        session.close().unwrap();
        let err = session.jog_start(0, JogDirection::Cw, 10.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!session.status().connected);
    }

    #[test]
    fn connect_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _sim, _net) = session(&dir);
        assert!(session.is_connected());
        let err = session
            .connect_with(
                Box::new(SimulatedMotionController::new()),
                None,
                AxisParameterStore::default(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        session.close().unwrap();
        assert!(!session.is_connected());
    }

    #[test]
    fn config_reports_limits() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _sim, _net) = session(&dir);
        let cfg = session.get_config().unwrap();
        assert_eq!(cfg.axes.len(), AXIS_COUNT);
        assert_eq!(cfg.axes[2].limit_plus, 100.5);
        assert!(!cfg.axes[3].configured);
        assert_eq!(cfg.jog.speed_max_mm_s, 100.0);
    }

    #[test]
    fn move_to_point_reaches_stored_pose() {
        let dir = tempfile::tempdir().unwrap();
        let (session, sim, _net) = session(&dir);
        sim.set_speed_scale(20.0);
        session
            .update_position_table_point(2, 12.5, 7.0, 3.0, "pick")
            .unwrap();
        session.move_to_point(2, 100.0).unwrap();
        let pos = session.get_positions().unwrap();
        assert_eq!(&pos[..3], &[12.5, 7.0, 3.0]);

        assert!(session.move_to_point(42, 50.0).is_err());
        assert!(session.move_to_point(2, 0.0).is_err());
    }

    #[test]
    fn io_ports_by_number() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _sim, net) = session(&dir);
        session.io_output(0, 115, true).unwrap();
        net.set_input_bit(0, 4, true);
        std::thread::sleep(Duration::from_millis(50));
        assert!(net.output_bit(0, 15));
        assert!(session.io_input(0, 4).unwrap());
        assert!(session.io_output(0, 101, true).is_err());
        assert!(session.io_input(0, 99).is_err());
        assert!(session.with_io(|io| Ok(io.output(OutputPort::Buzzer))).unwrap());
    }

    #[test]
    fn emergency_on_axis_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (session, sim, _net) = session(&dir);
        assert!(!session.get_emg_status().unwrap());
        sim.set_emergency(1, true);
        assert!(session.get_emg_status().unwrap());
    }
}

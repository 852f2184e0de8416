//! Axis controller.
//!
//! Owns the live [`AxisStatus`] table and the per-axis motor driver, and
//! turns mm-level requests into bridged controller commands. Homing and
//! jog build on top of it; nothing above this layer sees pulses.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use splebo_common::axis::config::AxisConfig;
use splebo_common::axis::params::AxisParameterStore;
use splebo_common::axis::status::AxisStatus;
use splebo_common::axis::{AxisId, JogDirection, axis_name, check_axis};
use splebo_common::config::MotionConfig;
use splebo_common::consts::AXIS_COUNT;
use splebo_common::error::{RobotError, RobotResult};
use splebo_common::hal::registers::{
    BitGroup, IO_SIGNAL_P1M, MODE_WR2, MODE_WR2_NO_INPOS_MASK, Rr0, Rr2, Rr3, WR0, clear_command,
};
use tracing::{debug, info, warn};

use crate::bridge::CommandBridge;
use crate::command::{CommandReply, MotionCommand};
use crate::motor::{AxisPort, MotorDriver, driver_for};
use crate::safety::SafetyLatch;

/// Poll interval of `wait_motion_complete`.
const MOTION_POLL: Duration = Duration::from_millis(10);

/// Position and fault bits read in one go.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    /// Logical coordinate [mm].
    pub position: f64,
    pub busy: bool,
    pub alarm: bool,
    pub emergency: bool,
}

impl MotionSample {
    /// Name of the active fault, emergency first.
    pub fn fault(&self) -> Option<&'static str> {
        if self.emergency {
            Some("emergency")
        } else if self.alarm {
            Some("alarm")
        } else {
            None
        }
    }
}

/// All axes of the robot behind one command bridge.
pub struct AxisController {
    bridge: Arc<CommandBridge>,
    params: Arc<AxisParameterStore>,
    drivers: [Option<&'static dyn MotorDriver>; AXIS_COUNT],
    status: RwLock<[AxisStatus; AXIS_COUNT]>,
    safety: Arc<SafetyLatch>,
    command_timeout: Duration,
    clear_pulse: Duration,
}

impl AxisController {
    /// Bind every axis to the driver of its motor family.
    pub fn new(
        bridge: Arc<CommandBridge>,
        params: Arc<AxisParameterStore>,
        motion: &MotionConfig,
    ) -> Self {
        let drivers = std::array::from_fn(|i| {
            params
                .axis(i as AxisId)
                .and_then(|cfg| driver_for(cfg.motor))
        });
        Self {
            bridge,
            params,
            drivers,
            status: RwLock::new([AxisStatus::default(); AXIS_COUNT]),
            safety: Arc::new(SafetyLatch::new()),
            command_timeout: motion.command_timeout(),
            clear_pulse: motion.clear_pulse(),
        }
    }

    #[inline]
    pub fn bridge(&self) -> &Arc<CommandBridge> {
        &self.bridge
    }

    #[inline]
    pub fn params(&self) -> &AxisParameterStore {
        &self.params
    }

    #[inline]
    pub fn safety(&self) -> &Arc<SafetyLatch> {
        &self.safety
    }

    /// Ids of axes with a motor fitted.
    pub fn configured_axes(&self) -> Vec<AxisId> {
        self.params.configured().collect()
    }

    /// Configuration of `axis`, fitted or not.
    pub fn config(&self, axis: AxisId) -> RobotResult<&AxisConfig> {
        let axis = check_axis(axis)?;
        self.params
            .axis(axis)
            .ok_or_else(|| RobotError::validation(format!("axis {axis} has no parameters")))
    }

    /// Configuration of an axis that must have a motor fitted.
    pub fn motor_config(&self, axis: AxisId) -> RobotResult<&AxisConfig> {
        let cfg = self.config(axis)?;
        if !cfg.is_configured() {
            return Err(RobotError::validation(format!(
                "axis {} has no motor configured",
                axis_name(axis)
            )));
        }
        Ok(cfg)
    }

    pub fn driver(&self, axis: AxisId) -> RobotResult<&'static dyn MotorDriver> {
        let axis = check_axis(axis)?;
        self.drivers[axis as usize].ok_or_else(|| {
            RobotError::validation(format!("axis {} has no motor configured", axis_name(axis)))
        })
    }

    pub fn port(&self, axis: AxisId) -> RobotResult<AxisPort<'_>> {
        let cfg = self.motor_config(axis)?;
        Ok(AxisPort::new(axis, cfg, &self.bridge, self.command_timeout))
    }

    /// Submit one command and wait for it.
    pub fn execute(&self, command: MotionCommand) -> RobotResult<CommandReply> {
        self.bridge.execute(command, self.command_timeout)
    }

    // ─── Initialization ─────────────────────────────────────────────

    /// Open the controller and bring every fitted axis up.
    pub fn initialize_all(&self) -> RobotResult<()> {
        self.execute(MotionCommand::Open)?;
        for axis in self.configured_axes() {
            self.initialize(axis)?;
        }
        info!(axes = ?self.configured_axes(), "Axes initialized");
        Ok(())
    }

    /// Mode registers, speeds, soft limits, zeroed coordinates, servo on.
    pub fn initialize(&self, axis: AxisId) -> RobotResult<()> {
        let driver = self.driver(axis)?;
        let port = self.port(axis)?;
        let cfg = port.config;

        let wr2 = if cfg.in_position {
            MODE_WR2
        } else {
            MODE_WR2 & MODE_WR2_NO_INPOS_MASK
        };
        port.run(MotionCommand::SetMode {
            axis,
            wr1: 0,
            wr2,
            wr3: driver.mode_wr3(),
        })?;
        port.run(MotionCommand::SetIoSignal {
            axis,
            p1m: IO_SIGNAL_P1M,
            p2m: 0,
        })?;
        port.set_drive_speed(cfg.speed_to_pps(cfg.max_speed))?;
        port.run(MotionCommand::SetInitialVelocity {
            axis,
            velocity: cfg.speed_to_pps(cfg.start_speed),
        })?;
        port.run(MotionCommand::SetAcceleration {
            axis,
            accel: cfg.speed_to_pps(cfg.max_accel),
        })?;
        port.run(MotionCommand::SetDeceleration {
            axis,
            decel: cfg.speed_to_pps(cfg.max_decel),
        })?;
        let (minus, plus) = cfg.soft_limit_pulses();
        port.set_soft_limit(minus, plus)?;
        port.run(MotionCommand::SetLogicalCoord { axis, pulses: 0 })?;
        port.run(MotionCommand::SetRelativeCoord { axis, pulses: 0 })?;
        driver.servo(&port, true)?;

        self.update_status(axis, |st| *st = AxisStatus::default());
        debug!(axis = axis_name(axis), motor = ?cfg.motor, "Axis initialized");
        Ok(())
    }

    // ─── Status ─────────────────────────────────────────────────────

    /// Snapshot of one axis.
    pub fn status(&self, axis: AxisId) -> RobotResult<AxisStatus> {
        let axis = check_axis(axis)?;
        Ok(self.status.read()[axis as usize])
    }

    /// Snapshot of every axis.
    pub fn statuses(&self) -> [AxisStatus; AXIS_COUNT] {
        *self.status.read()
    }

    /// Mutate one status entry under the table lock.
    pub fn update_status(&self, axis: AxisId, f: impl FnOnce(&mut AxisStatus)) {
        if let Some(st) = self.status.write().get_mut(axis as usize) {
            f(st);
        }
    }

    /// Re-read every register of a fitted axis into the status table.
    ///
    /// Unfitted axes are returned as stored.
    pub fn refresh_status(&self, axis: AxisId) -> RobotResult<AxisStatus> {
        if !self.config(axis)?.is_configured() {
            return self.status(axis);
        }
        let port = self.port(axis)?;
        let cfg = port.config;
        let logical = port.logical_pulses()?;
        let relative = port
            .run(MotionCommand::GetRelativeCoord { axis })?
            .value()
            .unwrap_or_default() as i32;
        let (rr0, rr2, rr3) = (port.rr0()?, port.rr2()?, port.rr3()?);
        let io = port
            .run(MotionCommand::GetGeneralIo { axis })?
            .value()
            .unwrap_or_default() as u16;

        let mut status = self.status.write();
        let st = &mut status[axis as usize];
        st.position = cfg.pulse_to_mm(logical);
        st.relative_position = cfg.pulse_to_mm(relative);
        st.apply_registers(axis, rr0, rr2, rr3);
        st.apply_general_io(io);
        Ok(*st)
    }

    /// Position, drive and fault bits; cheaper than a full refresh.
    pub fn sample(&self, axis: AxisId) -> RobotResult<MotionSample> {
        let port = self.port(axis)?;
        let position = port.config.pulse_to_mm(port.logical_pulses()?);
        let rr0 = Rr0::from_bits_truncate(port.rr0()?);
        let rr2 = Rr2::from_bits_truncate(port.rr2()?);
        let sample = MotionSample {
            position,
            busy: rr0.contains(BitGroup::for_axis(axis).drive_bit()),
            alarm: rr2.contains(Rr2::ALM),
            emergency: rr2.contains(Rr2::EMG),
        };
        self.update_status(axis, |st| {
            st.position = sample.position;
            st.busy = sample.busy;
            st.alarm = sample.alarm;
            st.emergency = sample.emergency;
        });
        Ok(sample)
    }

    /// Current logical coordinate [mm].
    pub fn position_mm(&self, axis: AxisId) -> RobotResult<f64> {
        let port = self.port(axis)?;
        let position = port.config.pulse_to_mm(port.logical_pulses()?);
        self.update_status(axis, |st| st.position = position);
        Ok(position)
    }

    // ─── Motion ─────────────────────────────────────────────────────

    /// Move to `target` mm at `speed_rate` percent of the axis maximum.
    pub fn move_absolute(&self, axis: AxisId, target: f64, speed_rate: f64) -> RobotResult<()> {
        self.safety.check()?;
        let cfg = self.motor_config(axis)?;
        check_speed_rate(speed_rate)?;
        check_target(axis, cfg, target)?;
        self.execute(MotionCommand::MoveAbsolute {
            axis,
            pulses: cfg.mm_to_pulse(target),
            speed: cfg.speed_percent_to_pps(speed_rate),
        })?;
        debug!(axis = axis_name(axis), target, speed_rate, "Absolute move started");
        Ok(())
    }

    /// Move by `distance` mm at `speed_rate` percent of the axis maximum.
    pub fn move_relative(&self, axis: AxisId, distance: f64, speed_rate: f64) -> RobotResult<()> {
        self.safety.check()?;
        let cfg = self.motor_config(axis)?;
        check_speed_rate(speed_rate)?;
        let current = self.position_mm(axis)?;
        check_target(axis, cfg, current + distance)?;
        self.execute(MotionCommand::MoveRelative {
            axis,
            pulses: cfg.mm_to_pulse(distance),
            speed: cfg.speed_percent_to_pps(speed_rate),
        })?;
        debug!(axis = axis_name(axis), distance, speed_rate, "Relative move started");
        Ok(())
    }

    /// Start continuous motion at `speed` pulses per second.
    pub fn start_jog(&self, axis: AxisId, speed: i32, direction: JogDirection) -> RobotResult<()> {
        self.safety.check()?;
        self.motor_config(axis)?;
        self.execute(MotionCommand::MoveJog {
            axis,
            speed,
            ccw: direction.is_ccw(),
        })
        .map(|_| ())
    }

    /// Immediate stop.
    pub fn stop(&self, axis: AxisId) -> RobotResult<()> {
        self.motor_config(axis)?;
        self.execute(MotionCommand::Stop { axis }).map(|_| ())
    }

    pub fn decel_stop(&self, axis: AxisId) -> RobotResult<()> {
        self.motor_config(axis)?;
        self.execute(MotionCommand::DecelStop { axis }).map(|_| ())
    }

    pub fn servo(&self, axis: AxisId, on: bool) -> RobotResult<()> {
        let driver = self.driver(axis)?;
        driver.servo(&self.port(axis)?, on)?;
        info!(axis = axis_name(axis), on, "Servo switched");
        Ok(())
    }

    /// Block until the axis stops driving (and reports in-position when
    /// the axis uses that signal).
    ///
    /// # Errors
    /// `CommunicationTimeout` when `timeout` expires, `SafetyFault` when an
    /// alarm or emergency shows up meanwhile or the safety latch trips.
    pub fn wait_motion_complete(&self, axis: AxisId, timeout: Duration) -> RobotResult<AxisStatus> {
        let port = self.port(axis)?;
        let deadline = Instant::now() + timeout;
        loop {
            // A fault latched elsewhere (emergency switch, sibling axis) ends the wait.
            self.safety.check()?;
            let sample = self.sample(axis)?;
            if let Some(fault) = sample.fault() {
                self.safety
                    .trip(format!("axis {} {fault} during motion", axis_name(axis)));
                return Err(RobotError::SafetyFault(format!(
                    "axis {} {fault}",
                    axis_name(axis)
                )));
            }
            if !sample.busy {
                let settled = !port.config.in_position
                    || Rr3::from_bits_truncate(port.rr3()?).contains(Rr3::INPOS);
                if settled {
                    return self.refresh_status(axis);
                }
            }
            if Instant::now() >= deadline {
                warn!(axis = axis_name(axis), "Motion did not complete in {timeout:?}");
                return Err(RobotError::CommunicationTimeout(format!(
                    "axis {} motion not complete after {timeout:?}",
                    axis_name(axis)
                )));
            }
            thread::sleep(MOTION_POLL);
        }
    }

    /// Clear drive alarms, controller error latches and the safety latch.
    ///
    /// Pulses each fitted axis' fault-clear output for the configured width,
    /// then writes the error-clear command to WR0.
    pub fn reset_alarm(&self) -> RobotResult<()> {
        let axes = self.configured_axes();
        for &axis in &axes {
            self.update_status(axis, |st| st.homing_error = false);
            self.driver(axis)?.fault_clear(&self.port(axis)?, true)?;
        }
        thread::sleep(self.clear_pulse);
        for &axis in &axes {
            let port = self.port(axis)?;
            self.driver(axis)?.fault_clear(&port, false)?;
            port.run(MotionCommand::WriteRegister {
                axis,
                register: WR0,
                value: clear_command(axis),
            })?;
        }
        self.safety.reset();
        info!(axes = ?axes, "Alarms reset");
        Ok(())
    }
}

fn check_speed_rate(speed_rate: f64) -> RobotResult<()> {
    if (1.0..=100.0).contains(&speed_rate) {
        Ok(())
    } else {
        Err(RobotError::validation(format!(
            "speed rate {speed_rate} outside 1..=100 %"
        )))
    }
}

fn check_target(axis: AxisId, cfg: &AxisConfig, target: f64) -> RobotResult<()> {
    if cfg.within_soft_limits(target) {
        Ok(())
    } else {
        Err(RobotError::validation(format!(
            "axis {} target {target} outside soft limits [{}, {}]",
            axis_name(axis),
            cfg.limit_minus,
            cfg.limit_plus
        )))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::sim_controller;
    use super::*;
    use splebo_common::axis::config::MotorFamily;
    use splebo_common::error::ErrorKind;
    use splebo_common::hal::registers::{AxisOutput, MODE_WR3_ACTUATOR_A};

    #[test]
    fn initialize_programs_fitted_axes() {
        let (axes, sim) = sim_controller(AxisParameterStore::default());
        let cfg = axes.config(0).unwrap().clone();
        let setup = sim.setup(0);
        assert_eq!(
            setup.mode,
            [0, MODE_WR2 & MODE_WR2_NO_INPOS_MASK, MODE_WR3_ACTUATOR_A]
        );
        assert_eq!(setup.drive_speed, cfg.speed_to_pps(cfg.max_speed));
        assert_eq!(setup.soft_limit, cfg.soft_limit_pulses());
        assert_eq!(setup.io_signal, (IO_SIGNAL_P1M, 0));
        assert_ne!(sim.outputs(0) & (1 << AxisOutput::Servo as u8), 0);

        // Axis 3 has no motor: untouched.
        assert_eq!(sim.setup(3).drive_speed, 0);
        assert!(axes.driver(3).is_err());
    }

    #[test]
    fn absolute_move_completes() {
        let (axes, sim) = sim_controller(AxisParameterStore::default());
        sim.set_speed_scale(20.0);
        axes.move_absolute(2, 50.0, 100.0).unwrap();
        let st = axes.wait_motion_complete(2, Duration::from_secs(5)).unwrap();
        assert_eq!(st.position, 50.0);
        assert!(!st.busy);
    }

    #[test]
    fn moves_outside_limits_are_rejected() {
        let (axes, sim) = sim_controller(AxisParameterStore::default());
        let err = axes.move_absolute(2, 150.0, 50.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = axes.move_relative(2, -1.0, 50.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = axes.move_absolute(2, 10.0, 0.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = axes.move_absolute(3, 10.0, 50.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!sim.is_moving(2));
    }

    #[test]
    fn wait_times_out_while_moving() {
        let (axes, _sim) = sim_controller(AxisParameterStore::default());
        axes.start_jog(0, 10, JogDirection::Cw).unwrap();
        let err = axes
            .wait_motion_complete(0, Duration::from_millis(50))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommunicationTimeout);
        axes.stop(0).unwrap();
    }

    #[test]
    fn alarm_latches_until_reset() {
        let (axes, sim) = sim_controller(AxisParameterStore::default());
        axes.start_jog(1, 100, JogDirection::Cw).unwrap();
        sim.set_alarm(1, true);

        let err = axes
            .wait_motion_complete(1, Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SafetyFault);
        assert!(axes.safety().is_tripped());
        assert_eq!(
            axes.move_absolute(0, 1.0, 10.0).unwrap_err().kind(),
            ErrorKind::SafetyFault
        );

        axes.reset_alarm().unwrap();
        assert!(!axes.safety().is_tripped());
        assert!(!axes.refresh_status(1).unwrap().alarm);
        assert!(axes.move_absolute(0, 1.0, 10.0).is_ok());
    }

    #[test]
    fn refresh_decodes_registers() {
        let mut params = AxisParameterStore::default().axes().to_vec();
        params[3] = AxisConfig::with_motor(MotorFamily::SteppingMotor, 50.0, 1);
        let (axes, sim) = sim_controller(AxisParameterStore::new(params).unwrap());
        sim.set_position(3, 1234);
        sim.set_inputs(3, 0b0101);

        let st = axes.refresh_status(3).unwrap();
        assert_eq!(st.position, 12.34);
        assert_eq!(st.inputs, 0b0101);
        assert!(st.output(AxisOutput::Servo as u8));
        assert!(!st.origin_sensor);
        assert!(st.in_position);
    }
}

//! Motor-family capabilities.
//!
//! Each axis picks one [`MotorDriver`] from its configured family when the
//! axis is initialized. The homing scheduler and the axis controller only
//! ever talk to the trait.
//!
//! | Step                  | ActuatorA                | SteppingMotor / ActuatorB        |
//! |-----------------------|--------------------------|----------------------------------|
//! | home move start       | homing output pulse      | parameter set                    |
//! | home move check       | STOP2 released           | immediately done                 |
//! | controller home start | drive speed, limits off  | drive speed, origin mode, search |
//! | controller home check | drive idle               | drive idle                       |
//! | origin sensor check   | STOP1 active             | STOP1 active                     |
//!
//! ActuatorB keeps its soft limits during the controller search.

use std::thread;
use std::time::Duration;

use splebo_common::axis::AxisId;
use splebo_common::axis::config::{AxisConfig, MotorFamily, OriginDirection};
use splebo_common::error::{RobotError, RobotResult};
use splebo_common::hal::registers::{
    AxisOutput, BitGroup, MODE_WR3_ACTUATOR_A, MODE_WR3_STEPPING, ORIGIN_H1M, ORIGIN_H1M_REVERSE,
    ORIGIN_H2M, RR0, RR2, RR3, Rr0, Rr3,
};

use crate::bridge::CommandBridge;
use crate::command::{CommandReply, MotionCommand};

/// Width of the homing request pulse sent to ActuatorA drives.
pub const HOMING_PULSE: Duration = Duration::from_millis(100);

// ─── AxisPort ───────────────────────────────────────────────────────

/// One axis' view of the command bridge.
pub struct AxisPort<'a> {
    pub axis: AxisId,
    pub config: &'a AxisConfig,
    bridge: &'a CommandBridge,
    timeout: Duration,
}

impl<'a> AxisPort<'a> {
    pub fn new(
        axis: AxisId,
        config: &'a AxisConfig,
        bridge: &'a CommandBridge,
        timeout: Duration,
    ) -> Self {
        Self {
            axis,
            config,
            bridge,
            timeout,
        }
    }

    /// Submit a command and wait for its reply.
    pub fn run(&self, command: MotionCommand) -> RobotResult<CommandReply> {
        self.bridge.execute(command, self.timeout)
    }

    fn value(&self, command: MotionCommand) -> RobotResult<i64> {
        self.run(command)?
            .value()
            .ok_or_else(|| RobotError::command_failed(command.opcode(), "no value returned"))
    }

    pub fn rr0(&self) -> RobotResult<u32> {
        let value = self.value(MotionCommand::ReadRegister {
            axis: self.axis,
            register: RR0,
        })?;
        Ok(value as u32)
    }

    pub fn rr2(&self) -> RobotResult<u32> {
        let value = self.value(MotionCommand::GetAxisStatus {
            axis: self.axis,
            register: RR2,
        })?;
        Ok(value as u32)
    }

    pub fn rr3(&self) -> RobotResult<u32> {
        let value = self.value(MotionCommand::GetAxisStatus {
            axis: self.axis,
            register: RR3,
        })?;
        Ok(value as u32)
    }

    /// Drive pulse output of this axis' bit group.
    pub fn is_busy(&self) -> RobotResult<bool> {
        let rr0 = Rr0::from_bits_truncate(self.rr0()?);
        Ok(rr0.contains(BitGroup::for_axis(self.axis).drive_bit()))
    }

    /// Logical coordinate in pulses.
    pub fn logical_pulses(&self) -> RobotResult<i32> {
        let value = self.value(MotionCommand::GetLogicalCoord { axis: self.axis })?;
        Ok(value as i32)
    }

    pub fn set_output(&self, output: AxisOutput, on: bool) -> RobotResult<()> {
        self.run(MotionCommand::SetGeneralOutputBit {
            axis: self.axis,
            bit: output as u8,
            on,
        })
        .map(|_| ())
    }

    pub fn set_drive_speed(&self, speed: i32) -> RobotResult<()> {
        self.run(MotionCommand::SetDriveSpeed {
            axis: self.axis,
            speed,
        })
        .map(|_| ())
    }

    pub fn set_soft_limit(&self, minus: i32, plus: i32) -> RobotResult<()> {
        self.run(MotionCommand::SetSoftLimit {
            axis: self.axis,
            minus,
            plus,
        })
        .map(|_| ())
    }
}

// ─── MotorDriver ────────────────────────────────────────────────────

/// Operations whose implementation depends on the motor family.
///
/// `*_start` steps issue commands and return; `*_check` steps report
/// whether the started step has finished.
pub trait MotorDriver: Send + Sync {
    fn family(&self) -> MotorFamily;

    /// WR3 mode register written at axis initialization.
    fn mode_wr3(&self) -> u16 {
        MODE_WR3_STEPPING
    }

    fn home_move_start(&self, port: &AxisPort<'_>) -> RobotResult<()>;

    fn home_move_check(&self, port: &AxisPort<'_>) -> RobotResult<bool>;

    fn controller_home_start(&self, port: &AxisPort<'_>) -> RobotResult<()>;

    fn controller_home_check(&self, port: &AxisPort<'_>) -> RobotResult<bool> {
        Ok(!port.is_busy()?)
    }

    fn origin_sensor_check(&self, port: &AxisPort<'_>) -> RobotResult<bool> {
        Ok(Rr3::from_bits_truncate(port.rr3()?).contains(Rr3::STOP1))
    }

    /// Relative move by the configured origin offset.
    fn offset_move_start(&self, port: &AxisPort<'_>) -> RobotResult<()> {
        let cfg = port.config;
        port.run(MotionCommand::MoveRelative {
            axis: port.axis,
            pulses: cfg.mm_to_pulse(cfg.origin_offset),
            speed: cfg.speed_to_pps(cfg.offset_speed),
        })
        .map(|_| ())
    }

    fn offset_move_check(&self, port: &AxisPort<'_>) -> RobotResult<bool> {
        Ok(!port.is_busy()?)
    }

    /// Restore running parameters and declare the current position zero.
    fn parameter_set(&self, port: &AxisPort<'_>) -> RobotResult<()> {
        let cfg = port.config;
        port.set_drive_speed(cfg.speed_to_pps(cfg.max_speed))?;
        port.run(MotionCommand::SetLogicalCoord {
            axis: port.axis,
            pulses: 0,
        })?;
        port.run(MotionCommand::SetRelativeCoord {
            axis: port.axis,
            pulses: 0,
        })?;
        let (minus, plus) = cfg.soft_limit_pulses();
        port.set_soft_limit(minus, plus)
    }

    fn servo(&self, port: &AxisPort<'_>, on: bool) -> RobotResult<()> {
        port.set_output(AxisOutput::Servo, on)
    }

    fn fault_clear(&self, port: &AxisPort<'_>, on: bool) -> RobotResult<()> {
        port.set_output(AxisOutput::Clear, on)
    }

    fn homing_signal(&self, port: &AxisPort<'_>, on: bool) -> RobotResult<()> {
        port.set_output(AxisOutput::Homing, on)
    }
}

/// Controller-driven origin search shared by the stepping families.
fn start_auto_origin(port: &AxisPort<'_>, disable_limits: bool) -> RobotResult<()> {
    let cfg = port.config;
    let drive = cfg.speed_to_pps(cfg.origin_speed);
    port.set_drive_speed(drive)?;
    if disable_limits {
        port.set_soft_limit(0, 0)?;
    }
    let h1m = match cfg.origin_dir {
        OriginDirection::Ccw => ORIGIN_H1M | ORIGIN_H1M_REVERSE,
        OriginDirection::Cw => ORIGIN_H1M,
    };
    port.run(MotionCommand::SetOriginMode {
        axis: port.axis,
        h1m,
        h2m: ORIGIN_H2M,
    })?;
    port.run(MotionCommand::AutoOrigin {
        axis: port.axis,
        search_speed: (drive - 1).max(1),
        drive_speed: drive,
    })
    .map(|_| ())
}

// ─── Families ───────────────────────────────────────────────────────

/// Servo actuator that homes itself when its homing input is pulsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActuatorA;

impl MotorDriver for ActuatorA {
    fn family(&self) -> MotorFamily {
        MotorFamily::ActuatorA
    }

    fn mode_wr3(&self) -> u16 {
        MODE_WR3_ACTUATOR_A
    }

    fn home_move_start(&self, port: &AxisPort<'_>) -> RobotResult<()> {
        port.set_soft_limit(0, 0)?;
        self.homing_signal(port, true)?;
        thread::sleep(HOMING_PULSE);
        self.homing_signal(port, false)
    }

    /// The drive holds STOP2 while its internal homing runs.
    fn home_move_check(&self, port: &AxisPort<'_>) -> RobotResult<bool> {
        Ok(!Rr3::from_bits_truncate(port.rr3()?).contains(Rr3::STOP2))
    }

    fn controller_home_start(&self, port: &AxisPort<'_>) -> RobotResult<()> {
        let cfg = port.config;
        port.set_drive_speed(cfg.speed_to_pps(cfg.origin_speed))?;
        port.set_soft_limit(0, 0)
    }
}

/// Open-loop stepping motor.
#[derive(Debug, Clone, Copy, Default)]
pub struct SteppingMotor;

impl MotorDriver for SteppingMotor {
    fn family(&self) -> MotorFamily {
        MotorFamily::SteppingMotor
    }

    fn home_move_start(&self, port: &AxisPort<'_>) -> RobotResult<()> {
        self.parameter_set(port)
    }

    fn home_move_check(&self, _port: &AxisPort<'_>) -> RobotResult<bool> {
        Ok(true)
    }

    fn controller_home_start(&self, port: &AxisPort<'_>) -> RobotResult<()> {
        start_auto_origin(port, true)
    }
}

/// Closed-loop stepping actuator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActuatorB;

impl MotorDriver for ActuatorB {
    fn family(&self) -> MotorFamily {
        MotorFamily::ActuatorB
    }

    fn home_move_start(&self, port: &AxisPort<'_>) -> RobotResult<()> {
        self.parameter_set(port)
    }

    fn home_move_check(&self, _port: &AxisPort<'_>) -> RobotResult<bool> {
        Ok(true)
    }

    fn controller_home_start(&self, port: &AxisPort<'_>) -> RobotResult<()> {
        start_auto_origin(port, false)
    }
}

static ACTUATOR_A: ActuatorA = ActuatorA;
static STEPPING_MOTOR: SteppingMotor = SteppingMotor;
static ACTUATOR_B: ActuatorB = ActuatorB;

/// Driver for a motor family; `None` for unpopulated axes.
pub fn driver_for(family: MotorFamily) -> Option<&'static dyn MotorDriver> {
    match family {
        MotorFamily::None => None,
        MotorFamily::ActuatorA => Some(&ACTUATOR_A),
        MotorFamily::SteppingMotor => Some(&STEPPING_MOTOR),
        MotorFamily::ActuatorB => Some(&ACTUATOR_B),
    }
}

//! Hardware commands executed by the bridge consumer.
//!
//! One variant per operation of the vendor motion controller. Coordinates
//! and speeds are in pulses; conversion from mm happens in the axis layer.

use splebo_common::axis::AxisId;
use splebo_common::hal::driver::{HalError, MotionDevice};

/// A motion controller operation with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionCommand {
    Open,
    Close,
    SetMode { axis: AxisId, wr1: u16, wr2: u16, wr3: u16 },
    SetDriveSpeed { axis: AxisId, speed: i32 },
    SetInitialVelocity { axis: AxisId, velocity: i32 },
    SetAcceleration { axis: AxisId, accel: i32 },
    SetDeceleration { axis: AxisId, decel: i32 },
    SetOriginMode { axis: AxisId, h1m: u16, h2m: u16 },
    SetIoSignal { axis: AxisId, p1m: u16, p2m: u16 },
    SetInputFilter { axis: AxisId, filter: u16 },
    AutoOrigin { axis: AxisId, search_speed: i32, drive_speed: i32 },
    SetSoftLimit { axis: AxisId, minus: i32, plus: i32 },
    MoveRelative { axis: AxisId, pulses: i32, speed: i32 },
    MoveAbsolute { axis: AxisId, pulses: i32, speed: i32 },
    MoveJog { axis: AxisId, speed: i32, ccw: bool },
    Stop { axis: AxisId },
    DecelStop { axis: AxisId },
    GetLogicalCoord { axis: AxisId },
    GetRelativeCoord { axis: AxisId },
    SetLogicalCoord { axis: AxisId, pulses: i32 },
    SetRelativeCoord { axis: AxisId, pulses: i32 },
    GetGeneralIo { axis: AxisId },
    SetGeneralOutput { axis: AxisId, value: u8 },
    SetGeneralOutputBit { axis: AxisId, bit: u8, on: bool },
    GetAxisStatus { axis: AxisId, register: u8 },
    WriteRegister { axis: AxisId, register: u8, value: u32 },
    ReadRegister { axis: AxisId, register: u8 },
}

/// Outcome of a successful command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandReply {
    Done,
    Value(i64),
}

impl CommandReply {
    #[inline]
    pub fn value(self) -> Option<i64> {
        match self {
            Self::Done => None,
            Self::Value(v) => Some(v),
        }
    }
}

impl MotionCommand {
    /// Operation name used in logs and errors.
    pub fn opcode(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Close => "Close",
            Self::SetMode { .. } => "SetMode",
            Self::SetDriveSpeed { .. } => "SetDriveSpeed",
            Self::SetInitialVelocity { .. } => "SetInitialVelocity",
            Self::SetAcceleration { .. } => "SetAcceleration",
            Self::SetDeceleration { .. } => "SetDeceleration",
            Self::SetOriginMode { .. } => "SetOriginMode",
            Self::SetIoSignal { .. } => "SetIoSignal",
            Self::SetInputFilter { .. } => "SetInputFilter",
            Self::AutoOrigin { .. } => "AutoOrigin",
            Self::SetSoftLimit { .. } => "SetSoftLimit",
            Self::MoveRelative { .. } => "MoveRelative",
            Self::MoveAbsolute { .. } => "MoveAbsolute",
            Self::MoveJog { .. } => "MoveJog",
            Self::Stop { .. } => "Stop",
            Self::DecelStop { .. } => "DecelStop",
            Self::GetLogicalCoord { .. } => "GetLogicalCoord",
            Self::GetRelativeCoord { .. } => "GetRelativeCoord",
            Self::SetLogicalCoord { .. } => "SetLogicalCoord",
            Self::SetRelativeCoord { .. } => "SetRelativeCoord",
            Self::GetGeneralIo { .. } => "GetGeneralIo",
            Self::SetGeneralOutput { .. } => "SetGeneralOutput",
            Self::SetGeneralOutputBit { .. } => "SetGeneralOutputBit",
            Self::GetAxisStatus { .. } => "GetAxisStatus",
            Self::WriteRegister { .. } => "WriteRegister",
            Self::ReadRegister { .. } => "ReadRegister",
        }
    }

    /// Target axis, if the command addresses one.
    pub fn axis(&self) -> Option<AxisId> {
        match *self {
            Self::Open | Self::Close => None,
            Self::SetMode { axis, .. }
            | Self::SetDriveSpeed { axis, .. }
            | Self::SetInitialVelocity { axis, .. }
            | Self::SetAcceleration { axis, .. }
            | Self::SetDeceleration { axis, .. }
            | Self::SetOriginMode { axis, .. }
            | Self::SetIoSignal { axis, .. }
            | Self::SetInputFilter { axis, .. }
            | Self::AutoOrigin { axis, .. }
            | Self::SetSoftLimit { axis, .. }
            | Self::MoveRelative { axis, .. }
            | Self::MoveAbsolute { axis, .. }
            | Self::MoveJog { axis, .. }
            | Self::Stop { axis }
            | Self::DecelStop { axis }
            | Self::GetLogicalCoord { axis }
            | Self::GetRelativeCoord { axis }
            | Self::SetLogicalCoord { axis, .. }
            | Self::SetRelativeCoord { axis, .. }
            | Self::GetGeneralIo { axis }
            | Self::SetGeneralOutput { axis, .. }
            | Self::SetGeneralOutputBit { axis, .. }
            | Self::GetAxisStatus { axis, .. }
            | Self::WriteRegister { axis, .. }
            | Self::ReadRegister { axis, .. } => Some(axis),
        }
    }

    /// Run on the device. Only the bridge consumer calls this.
    pub fn execute(&self, device: &mut dyn MotionDevice) -> Result<CommandReply, HalError> {
        use CommandReply::{Done, Value};

        match *self {
            Self::Open => device.open().map(|_| Done),
            Self::Close => device.close().map(|_| Done),
            Self::SetMode { axis, wr1, wr2, wr3 } => device.set_mode(axis, wr1, wr2, wr3).map(|_| Done),
            Self::SetDriveSpeed { axis, speed } => device.set_drive_speed(axis, speed).map(|_| Done),
            Self::SetInitialVelocity { axis, velocity } => {
                device.set_initial_velocity(axis, velocity).map(|_| Done)
            }
            Self::SetAcceleration { axis, accel } => device.set_acceleration(axis, accel).map(|_| Done),
            Self::SetDeceleration { axis, decel } => device.set_deceleration(axis, decel).map(|_| Done),
            Self::SetOriginMode { axis, h1m, h2m } => {
                device.set_origin_mode(axis, h1m, h2m).map(|_| Done)
            }
            Self::SetIoSignal { axis, p1m, p2m } => device.set_io_signal(axis, p1m, p2m).map(|_| Done),
            Self::SetInputFilter { axis, filter } => device.set_input_filter(axis, filter).map(|_| Done),
            Self::AutoOrigin {
                axis,
                search_speed,
                drive_speed,
            } => device.auto_origin(axis, search_speed, drive_speed).map(|_| Done),
            Self::SetSoftLimit { axis, minus, plus } => {
                device.set_soft_limit(axis, minus, plus).map(|_| Done)
            }
            Self::MoveRelative { axis, pulses, speed } => {
                device.move_relative(axis, pulses, speed).map(|_| Done)
            }
            Self::MoveAbsolute { axis, pulses, speed } => {
                device.move_absolute(axis, pulses, speed).map(|_| Done)
            }
            Self::MoveJog { axis, speed, ccw } => device.move_jog(axis, speed, ccw).map(|_| Done),
            Self::Stop { axis } => device.stop(axis).map(|_| Done),
            Self::DecelStop { axis } => device.decel_stop(axis).map(|_| Done),
            Self::GetLogicalCoord { axis } => device.logical_coord(axis).map(|v| Value(v.into())),
            Self::GetRelativeCoord { axis } => device.relative_coord(axis).map(|v| Value(v.into())),
            Self::SetLogicalCoord { axis, pulses } => {
                device.set_logical_coord(axis, pulses).map(|_| Done)
            }
            Self::SetRelativeCoord { axis, pulses } => {
                device.set_relative_coord(axis, pulses).map(|_| Done)
            }
            Self::GetGeneralIo { axis } => device.general_io(axis).map(|v| Value(v.into())),
            Self::SetGeneralOutput { axis, value } => {
                device.set_general_output(axis, value).map(|_| Done)
            }
            Self::SetGeneralOutputBit { axis, bit, on } => {
                device.set_general_output_bit(axis, bit, on).map(|_| Done)
            }
            Self::GetAxisStatus { axis, register } => {
                device.axis_status(axis, register).map(|v| Value(v.into()))
            }
            Self::WriteRegister {
                axis,
                register,
                value,
            } => device.write_register(axis, register, value).map(|_| Done),
            Self::ReadRegister { axis, register } => {
                device.read_register(axis, register).map(|v| Value(v.into()))
            }
        }
    }
}

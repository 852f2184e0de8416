//! Simulated motion controller.
//!
//! Each axis integrates its position from wall-clock time at constant
//! velocity (acceleration is not modelled). Hardware soft limits clamp
//! the position and stop the axis, as the real controller does.
//!
//! | Register | Bits reported                                   |
//! |----------|-------------------------------------------------|
//! | RR0      | drive and error bit of the axis' bit group      |
//! | RR2      | SLMT+ 0x01, SLMT- 0x02, ALM 0x10, EMG 0x20      |
//! | RR3      | STOP1 origin, STOP2 actuator homing, INPOS idle |

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use splebo_common::axis::AxisId;
use splebo_common::consts::AXIS_COUNT;
use splebo_common::hal::driver::{HalError, MotionDevice};
use splebo_common::hal::registers::{
    AxisOutput, BitGroup, RR0, RR1, RR2, RR3, Rr2, Rr3, WR0, WR0_CLEAR_CMD,
};
use tracing::{debug, trace};

/// Pulses from zero within which the origin sensor reads active.
const ORIGIN_WINDOW: f64 = 5.0;
/// Speed used when a move is started without one.
const FALLBACK_SPEED: f64 = 1000.0;
const RR2_SLMT_PLUS: u32 = 0x01;
const RR2_SLMT_MINUS: u32 = 0x02;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum Motion {
    #[default]
    Idle,
    /// Signed velocity [pulse/s].
    Jog(f64),
    Move { target: f64, speed: f64 },
    /// Search towards zero. `actuator` marks a drive-internal homing run.
    Origin { speed: f64, actuator: bool },
}

#[derive(Debug, Clone)]
struct SimAxis {
    position: f64,
    relative: f64,
    motion: Motion,
    last_update: Instant,
    drive_speed: i32,
    initial_velocity: i32,
    acceleration: i32,
    deceleration: i32,
    soft_limit: (i32, i32),
    mode: [u16; 3],
    origin_mode: (u16, u16),
    io_signal: (u16, u16),
    input_filter: u16,
    outputs: u8,
    inputs: u8,
    alarm: bool,
    emergency: bool,
    error: bool,
    limit_hit: u32,
    /// Origin searches never finish.
    stall_origin: bool,
    stops: u32,
    jogs: u32,
}

impl Default for SimAxis {
    fn default() -> Self {
        Self {
            position: 0.0,
            relative: 0.0,
            motion: Motion::Idle,
            last_update: Instant::now(),
            drive_speed: 0,
            initial_velocity: 0,
            acceleration: 0,
            deceleration: 0,
            soft_limit: (0, 0),
            mode: [0; 3],
            origin_mode: (0, 0),
            io_signal: (0, 0),
            input_filter: 0,
            outputs: 0,
            inputs: 0,
            alarm: false,
            emergency: false,
            error: false,
            limit_hit: 0,
            stall_origin: false,
            stops: 0,
            jogs: 0,
        }
    }
}

impl SimAxis {
    fn is_moving(&self) -> bool {
        self.motion != Motion::Idle
    }

    fn halt(&mut self) {
        self.motion = Motion::Idle;
    }

    /// Integrate motion up to `now`.
    fn advance(&mut self, now: Instant, scale: f64) {
        let dt = now.saturating_duration_since(self.last_update).as_secs_f64() * scale;
        self.last_update = now;
        if self.alarm || self.emergency {
            self.halt();
            return;
        }

        let start = self.position;
        match self.motion {
            Motion::Idle => return,
            Motion::Jog(v) => self.position += v * dt,
            Motion::Move { target, speed } => {
                let step = speed.abs() * dt;
                if (target - self.position).abs() <= step {
                    self.position = target;
                    self.halt();
                } else {
                    self.position += step.copysign(target - self.position);
                }
            }
            Motion::Origin { speed, actuator } => {
                if self.stall_origin {
                    return;
                }
                let step = speed.abs() * dt;
                if self.position.abs() <= step {
                    self.position = 0.0;
                    self.relative = 0.0;
                    self.halt();
                    trace!(actuator, "origin reached");
                    return;
                }
                self.position -= step.copysign(self.position);
            }
        }
        self.relative += self.position - start;

        let (minus, plus) = self.soft_limit;
        if (minus, plus) == (0, 0) || matches!(self.motion, Motion::Origin { .. }) {
            return;
        }
        let (minus, plus) = (minus as f64, plus as f64);
        if self.position > plus {
            self.relative -= self.position - plus;
            self.position = plus;
            self.limit_hit |= RR2_SLMT_PLUS;
            self.halt();
        } else if self.position < minus {
            self.relative += minus - self.position;
            self.position = minus;
            self.limit_hit |= RR2_SLMT_MINUS;
            self.halt();
        }
    }

    fn origin_sensor(&self) -> bool {
        self.position.abs() <= ORIGIN_WINDOW
    }

    fn actuator_homing(&self) -> bool {
        matches!(self.motion, Motion::Origin { actuator: true, .. })
    }

    fn speed_or_default(&self, speed: i32) -> f64 {
        if speed > 0 {
            speed as f64
        } else if self.drive_speed > 0 {
            self.drive_speed as f64
        } else {
            FALLBACK_SPEED
        }
    }

    fn register(&self, axis: AxisId, register: u8) -> u32 {
        match register {
            RR0 => {
                let group = BitGroup::for_axis(axis);
                let mut bits = 0;
                if self.is_moving() {
                    bits |= group.drive_bit().bits();
                }
                if self.error || self.limit_hit != 0 || self.alarm || self.emergency {
                    bits |= group.error_bit().bits();
                }
                bits
            }
            RR1 => 0,
            RR2 => {
                let mut bits = self.limit_hit;
                if self.alarm {
                    bits |= Rr2::ALM.bits();
                }
                if self.emergency {
                    bits |= Rr2::EMG.bits();
                }
                bits
            }
            RR3 => {
                let mut bits = 0;
                if self.origin_sensor() {
                    bits |= Rr3::STOP1.bits();
                }
                if self.actuator_homing() {
                    bits |= Rr3::STOP2.bits();
                }
                if !self.is_moving() {
                    bits |= Rr3::INPOS.bits();
                }
                bits
            }
            _ => 0,
        }
    }

    fn write_output_bit(&mut self, bit: u8, on: bool) {
        let was = self.outputs & (1 << bit) != 0;
        if on {
            self.outputs |= 1 << bit;
        } else {
            self.outputs &= !(1 << bit);
        }
        if on && !was {
            self.output_rising(bit);
        }
    }

    fn output_rising(&mut self, bit: u8) {
        if bit == AxisOutput::Clear as u8 {
            self.alarm = false;
        } else if bit == AxisOutput::Homing as u8 {
            let speed = self.speed_or_default(0);
            self.motion = Motion::Origin {
                speed,
                actuator: true,
            };
        }
    }
}

#[derive(Debug)]
struct SimState {
    axes: [SimAxis; AXIS_COUNT],
    open: bool,
    speed_scale: f64,
    rejected: HashSet<&'static str>,
    commands: u64,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            axes: std::array::from_fn(|_| SimAxis::default()),
            open: false,
            speed_scale: 1.0,
            rejected: HashSet::new(),
            commands: 0,
        }
    }
}

impl SimState {
    /// Validate, count and bring the axis up to date.
    fn axis(&mut self, op: &'static str, axis: AxisId) -> Result<&mut SimAxis, HalError> {
        if axis as usize >= AXIS_COUNT {
            return Err(HalError::InvalidAxis(axis));
        }
        if !self.open {
            return Err(HalError::CommunicationError(
                "motion controller not open".to_string(),
            ));
        }
        if self.rejected.contains(op) {
            return Err(HalError::DeviceRejected(format!("{op} on axis {axis}")));
        }
        self.commands += 1;
        let scale = self.speed_scale;
        let ax = &mut self.axes[axis as usize];
        ax.advance(Instant::now(), scale);
        Ok(ax)
    }
}

/// Simulated vendor motion controller.
pub struct SimulatedMotionController {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedMotionController {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Handle for observing and disturbing the simulated hardware.
    pub fn handle(&self) -> SimulationHandle {
        SimulationHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for SimulatedMotionController {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionDevice for SimulatedMotionController {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn open(&mut self) -> Result<(), HalError> {
        let mut st = self.state.lock();
        st.open = true;
        let now = Instant::now();
        for ax in st.axes.iter_mut() {
            ax.last_update = now;
        }
        debug!("simulated motion controller opened");
        Ok(())
    }

    fn close(&mut self) -> Result<(), HalError> {
        let mut st = self.state.lock();
        for ax in st.axes.iter_mut() {
            ax.halt();
        }
        st.open = false;
        debug!("simulated motion controller closed");
        Ok(())
    }

    fn set_mode(&mut self, axis: AxisId, wr1: u16, wr2: u16, wr3: u16) -> Result<(), HalError> {
        self.state.lock().axis("set_mode", axis)?.mode = [wr1, wr2, wr3];
        Ok(())
    }

    fn set_drive_speed(&mut self, axis: AxisId, speed: i32) -> Result<(), HalError> {
        self.state.lock().axis("set_drive_speed", axis)?.drive_speed = speed;
        Ok(())
    }

    fn set_initial_velocity(&mut self, axis: AxisId, velocity: i32) -> Result<(), HalError> {
        self.state.lock().axis("set_initial_velocity", axis)?.initial_velocity = velocity;
        Ok(())
    }

    fn set_acceleration(&mut self, axis: AxisId, accel: i32) -> Result<(), HalError> {
        self.state.lock().axis("set_acceleration", axis)?.acceleration = accel;
        Ok(())
    }

    fn set_deceleration(&mut self, axis: AxisId, decel: i32) -> Result<(), HalError> {
        self.state.lock().axis("set_deceleration", axis)?.deceleration = decel;
        Ok(())
    }

    fn set_origin_mode(&mut self, axis: AxisId, h1m: u16, h2m: u16) -> Result<(), HalError> {
        self.state.lock().axis("set_origin_mode", axis)?.origin_mode = (h1m, h2m);
        Ok(())
    }

    fn set_io_signal(&mut self, axis: AxisId, p1m: u16, p2m: u16) -> Result<(), HalError> {
        self.state.lock().axis("set_io_signal", axis)?.io_signal = (p1m, p2m);
        Ok(())
    }

    fn set_input_filter(&mut self, axis: AxisId, filter: u16) -> Result<(), HalError> {
        self.state.lock().axis("set_input_filter", axis)?.input_filter = filter;
        Ok(())
    }

    fn auto_origin(
        &mut self,
        axis: AxisId,
        _search_speed: i32,
        drive_speed: i32,
    ) -> Result<(), HalError> {
        let mut st = self.state.lock();
        let ax = st.axis("auto_origin", axis)?;
        let speed = ax.speed_or_default(drive_speed);
        ax.motion = Motion::Origin {
            speed,
            actuator: false,
        };
        Ok(())
    }

    fn set_soft_limit(&mut self, axis: AxisId, minus: i32, plus: i32) -> Result<(), HalError> {
        let mut st = self.state.lock();
        let ax = st.axis("set_soft_limit", axis)?;
        ax.soft_limit = (minus, plus);
        ax.limit_hit = 0;
        Ok(())
    }

    fn move_relative(&mut self, axis: AxisId, pulses: i32, speed: i32) -> Result<(), HalError> {
        let mut st = self.state.lock();
        let ax = st.axis("move_relative", axis)?;
        if ax.alarm || ax.emergency {
            return Err(HalError::DeviceRejected(format!("axis {axis} faulted")));
        }
        let speed = ax.speed_or_default(speed);
        ax.motion = Motion::Move {
            target: ax.position + pulses as f64,
            speed,
        };
        Ok(())
    }

    fn move_absolute(&mut self, axis: AxisId, pulses: i32, speed: i32) -> Result<(), HalError> {
        let mut st = self.state.lock();
        let ax = st.axis("move_absolute", axis)?;
        if ax.alarm || ax.emergency {
            return Err(HalError::DeviceRejected(format!("axis {axis} faulted")));
        }
        let speed = ax.speed_or_default(speed);
        ax.motion = Motion::Move {
            target: pulses as f64,
            speed,
        };
        Ok(())
    }

    fn move_jog(&mut self, axis: AxisId, speed: i32, ccw: bool) -> Result<(), HalError> {
        let mut st = self.state.lock();
        let ax = st.axis("move_jog", axis)?;
        if ax.alarm || ax.emergency {
            return Err(HalError::DeviceRejected(format!("axis {axis} faulted")));
        }
        let v = ax.speed_or_default(speed);
        ax.motion = Motion::Jog(if ccw { -v } else { v });
        ax.jogs += 1;
        Ok(())
    }

    fn stop(&mut self, axis: AxisId) -> Result<(), HalError> {
        let mut st = self.state.lock();
        let ax = st.axis("stop", axis)?;
        ax.halt();
        ax.stops += 1;
        Ok(())
    }

    fn decel_stop(&mut self, axis: AxisId) -> Result<(), HalError> {
        let mut st = self.state.lock();
        let ax = st.axis("decel_stop", axis)?;
        ax.halt();
        ax.stops += 1;
        Ok(())
    }

    fn logical_coord(&mut self, axis: AxisId) -> Result<i32, HalError> {
        Ok(self.state.lock().axis("logical_coord", axis)?.position.round() as i32)
    }

    fn relative_coord(&mut self, axis: AxisId) -> Result<i32, HalError> {
        Ok(self.state.lock().axis("relative_coord", axis)?.relative.round() as i32)
    }

    fn set_logical_coord(&mut self, axis: AxisId, pulses: i32) -> Result<(), HalError> {
        self.state.lock().axis("set_logical_coord", axis)?.position = pulses as f64;
        Ok(())
    }

    fn set_relative_coord(&mut self, axis: AxisId, pulses: i32) -> Result<(), HalError> {
        self.state.lock().axis("set_relative_coord", axis)?.relative = pulses as f64;
        Ok(())
    }

    fn general_io(&mut self, axis: AxisId) -> Result<u16, HalError> {
        let mut st = self.state.lock();
        let ax = st.axis("general_io", axis)?;
        Ok(ax.outputs as u16 | ((ax.inputs as u16 & 0x0F) << 8))
    }

    fn set_general_output(&mut self, axis: AxisId, value: u8) -> Result<(), HalError> {
        let mut st = self.state.lock();
        let ax = st.axis("set_general_output", axis)?;
        for bit in 0..8 {
            ax.write_output_bit(bit, value & (1 << bit) != 0);
        }
        Ok(())
    }

    fn set_general_output_bit(&mut self, axis: AxisId, bit: u8, on: bool) -> Result<(), HalError> {
        if bit >= 8 {
            return Err(HalError::InvalidBit(bit));
        }
        self.state
            .lock()
            .axis("set_general_output_bit", axis)?
            .write_output_bit(bit, on);
        Ok(())
    }

    fn axis_status(&mut self, axis: AxisId, register: u8) -> Result<u32, HalError> {
        Ok(self.state.lock().axis("axis_status", axis)?.register(axis, register))
    }

    fn write_register(&mut self, axis: AxisId, register: u8, value: u32) -> Result<(), HalError> {
        let mut st = self.state.lock();
        let ax = st.axis("write_register", axis)?;
        if register == WR0 && value & 0xFF == WR0_CLEAR_CMD {
            ax.error = false;
            ax.limit_hit = 0;
        }
        Ok(())
    }

    fn read_register(&mut self, axis: AxisId, register: u8) -> Result<u32, HalError> {
        Ok(self.state.lock().axis("read_register", axis)?.register(axis, register))
    }
}

/// Setup registers of one simulated axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimAxisSetup {
    pub mode: [u16; 3],
    pub drive_speed: i32,
    pub initial_velocity: i32,
    pub acceleration: i32,
    pub deceleration: i32,
    pub origin_mode: (u16, u16),
    pub io_signal: (u16, u16),
    pub input_filter: u16,
    pub soft_limit: (i32, i32),
}

/// Test-side view of a `SimulatedMotionController`.
#[derive(Clone)]
pub struct SimulationHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulationHandle {
    fn with_axis<R>(&self, axis: AxisId, f: impl FnOnce(&mut SimAxis) -> R) -> R {
        let mut st = self.state.lock();
        let scale = st.speed_scale;
        let ax = &mut st.axes[axis as usize % AXIS_COUNT];
        ax.advance(Instant::now(), scale);
        f(ax)
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Multiply every simulated velocity. Speeds up long moves in tests.
    pub fn set_speed_scale(&self, scale: f64) {
        self.state.lock().speed_scale = scale.max(0.0);
    }

    pub fn position(&self, axis: AxisId) -> i32 {
        self.with_axis(axis, |ax| ax.position.round() as i32)
    }

    /// Teleport the axis, leaving any motion running.
    pub fn set_position(&self, axis: AxisId, pulses: i32) {
        self.with_axis(axis, |ax| ax.position = pulses as f64);
    }

    pub fn is_moving(&self, axis: AxisId) -> bool {
        self.with_axis(axis, |ax| ax.is_moving())
    }

    pub fn set_alarm(&self, axis: AxisId, on: bool) {
        self.with_axis(axis, |ax| {
            ax.alarm = on;
            if on {
                ax.halt();
            }
        });
    }

    pub fn set_emergency(&self, axis: AxisId, on: bool) {
        self.with_axis(axis, |ax| {
            ax.emergency = on;
            if on {
                ax.halt();
            }
        });
    }

    /// Discrete inputs 0..3 of the axis.
    pub fn set_inputs(&self, axis: AxisId, inputs: u8) {
        self.with_axis(axis, |ax| ax.inputs = inputs & 0x0F);
    }

    pub fn outputs(&self, axis: AxisId) -> u8 {
        self.with_axis(axis, |ax| ax.outputs)
    }

    /// Origin searches on `axis` never reach the sensor.
    pub fn set_origin_stall(&self, axis: AxisId, stall: bool) {
        self.with_axis(axis, |ax| ax.stall_origin = stall);
    }

    pub fn soft_limit(&self, axis: AxisId) -> (i32, i32) {
        self.with_axis(axis, |ax| ax.soft_limit)
    }

    /// Everything written by the axis setup commands.
    pub fn setup(&self, axis: AxisId) -> SimAxisSetup {
        self.with_axis(axis, |ax| SimAxisSetup {
            mode: ax.mode,
            drive_speed: ax.drive_speed,
            initial_velocity: ax.initial_velocity,
            acceleration: ax.acceleration,
            deceleration: ax.deceleration,
            origin_mode: ax.origin_mode,
            io_signal: ax.io_signal,
            input_filter: ax.input_filter,
            soft_limit: ax.soft_limit,
        })
    }

    /// Stop and decel-stop commands received.
    pub fn stop_count(&self, axis: AxisId) -> u32 {
        self.with_axis(axis, |ax| ax.stops)
    }

    pub fn jog_count(&self, axis: AxisId) -> u32 {
        self.with_axis(axis, |ax| ax.jogs)
    }

    /// Make every call of `op` fail with `DeviceRejected`.
    pub fn reject(&self, op: &'static str) {
        self.state.lock().rejected.insert(op);
    }

    pub fn clear_rejections(&self) {
        self.state.lock().rejected.clear();
    }

    /// Device calls served so far.
    pub fn command_count(&self) -> u64 {
        self.state.lock().commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn opened() -> (SimulatedMotionController, SimulationHandle) {
        let mut dev = SimulatedMotionController::new();
        let handle = dev.handle();
        dev.open().unwrap();
        (dev, handle)
    }

    #[test]
    fn closed_controller_refuses_commands() {
        let mut dev = SimulatedMotionController::new();
        let handle = dev.handle();
        assert!(matches!(
            dev.stop(0),
            Err(HalError::CommunicationError(_))
        ));
        assert!(matches!(dev.open(), Ok(())));
        assert!(matches!(dev.stop(8), Err(HalError::InvalidAxis(8))));
        assert_eq!(handle.command_count(), 0);
        dev.stop(1).unwrap();
        assert_eq!(handle.command_count(), 1);
    }

    #[test]
    fn jog_clamps_at_soft_limit() {
        let (mut dev, handle) = opened();
        handle.set_speed_scale(10.0);
        dev.set_soft_limit(0, 0, 1000).unwrap();
        dev.set_logical_coord(0, 900).unwrap();
        dev.move_jog(0, 10_000, false).unwrap();
        thread::sleep(Duration::from_millis(50));

        assert_eq!(dev.logical_coord(0).unwrap(), 1000);
        assert_eq!(dev.read_register(0, RR0).unwrap() & 0x01, 0);
        assert_eq!(dev.axis_status(0, RR2).unwrap() & RR2_SLMT_PLUS, RR2_SLMT_PLUS);
    }

    #[test]
    fn auto_origin_reaches_sensor() {
        let (mut dev, handle) = opened();
        dev.set_logical_coord(2, 50).unwrap();
        dev.auto_origin(2, 99, 100_000).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(handle.position(2), 0);
        let rr3 = dev.axis_status(2, RR3).unwrap();
        assert_ne!(rr3 & Rr3::STOP1.bits(), 0);
        assert_ne!(rr3 & Rr3::INPOS.bits(), 0);
    }

    #[test]
    fn homing_output_starts_actuator_homing() {
        let (mut dev, handle) = opened();
        handle.set_origin_stall(1, true);
        dev.set_logical_coord(1, 100).unwrap();
        dev.set_general_output_bit(1, AxisOutput::Homing as u8, true).unwrap();
        assert_ne!(dev.read_register(1, RR3).unwrap() & Rr3::STOP2.bits(), 0);

        handle.set_origin_stall(1, false);
        handle.set_speed_scale(1000.0);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(dev.read_register(1, RR3).unwrap() & Rr3::STOP2.bits(), 0);
        assert_eq!(handle.position(1), 0);
    }

    #[test]
    fn alarm_halts_and_clear_output_resets() {
        let (mut dev, handle) = opened();
        dev.move_jog(3, 1000, true).unwrap();
        handle.set_alarm(3, true);
        assert!(!handle.is_moving(3));
        assert!(dev.move_jog(3, 1000, true).is_err());
        assert_ne!(dev.axis_status(3, RR2).unwrap() & Rr2::ALM.bits(), 0);

        dev.set_general_output_bit(3, AxisOutput::Clear as u8, true).unwrap();
        dev.set_general_output_bit(3, AxisOutput::Clear as u8, false).unwrap();
        assert_eq!(dev.axis_status(3, RR2).unwrap() & Rr2::ALM.bits(), 0);
    }

    #[test]
    fn rejection_injection() {
        let (mut dev, handle) = opened();
        handle.reject("move_absolute");
        assert!(matches!(
            dev.move_absolute(0, 10, 10),
            Err(HalError::DeviceRejected(_))
        ));
        handle.clear_rejections();
        assert!(dev.move_absolute(0, 10, 10).is_ok());
    }

    #[test]
    fn general_io_word_layout() {
        let (mut dev, handle) = opened();
        handle.set_inputs(0, 0x0A);
        dev.set_general_output(0, 0x05).unwrap();
        assert_eq!(dev.general_io(0).unwrap(), 0x0A05);
    }
}

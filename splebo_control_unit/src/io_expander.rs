//! Named sensor and actuator ports on the I/O expander board.
//!
//! Thin layer over [`CanBus`]: outputs land in the board's write image and
//! reach the hardware on the next poll; inputs come from the last answered
//! poll. Staleness is bounded by the CAN poll interval.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use splebo_common::config::IoConfig;
use splebo_common::error::RobotResult;
use splebo_common::io::ports::{InputPort, OutputPort};
use splebo_hal::CanBus;
use tracing::{debug, info, warn};

/// Buzzer pulse width.
pub const BUZZER_PULSE: Duration = Duration::from_millis(150);
/// Displacement-sensor timing and reset pulse width.
pub const DS_PULSE: Duration = Duration::from_millis(100);

/// State of one named port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortState {
    pub name: &'static str,
    pub number: u16,
    pub on: bool,
}

/// Snapshot of every named port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IoStatus {
    pub board: u8,
    /// Board still answering polls.
    pub online: bool,
    pub inputs: Vec<PortState>,
    pub outputs: Vec<PortState>,
}

/// The expander board with its output cache.
pub struct IoExpander {
    can: Arc<CanBus>,
    board: u8,
    /// Mirror of output bits 0..31; updated under the same lock as the
    /// board image.
    outputs: Mutex<u32>,
    wait_poll: Duration,
    wait_timeout: Duration,
}

impl IoExpander {
    pub fn new(can: Arc<CanBus>, config: &IoConfig) -> Self {
        Self {
            can,
            board: config.board_id,
            outputs: Mutex::new(0),
            wait_poll: config.wait_poll(),
            wait_timeout: config.wait_timeout(),
        }
    }

    #[inline]
    pub fn board(&self) -> u8 {
        self.board
    }

    // ─── Primitives ─────────────────────────────────────────────────

    pub fn get_input(&self, port: InputPort) -> RobotResult<bool> {
        Ok(self.can.get_input(self.board, port.bit())?)
    }

    /// Set an output in the cache and the board image together.
    pub fn set_output(&self, port: OutputPort, on: bool) -> RobotResult<()> {
        let mut cache = self.outputs.lock();
        let bit = port.bit();
        let word = self.can.with_write_buffer(self.board, |image| {
            let (byte, shift) = ((bit / 8) as usize, bit % 8);
            if on {
                image[byte] |= 1 << shift;
            } else {
                image[byte] &= !(1 << shift);
            }
            u32::from_le_bytes([image[0], image[1], image[2], image[3]])
        })?;
        *cache = word;
        debug!(port = port.label(), on, "Output set");
        Ok(())
    }

    /// Cached output state.
    pub fn output(&self, port: OutputPort) -> bool {
        *self.outputs.lock() & (1 << port.bit()) != 0
    }

    /// Poll `port` until it reads `expected` or `timeout` (default from
    /// config) expires. Never fails: read errors count as "not yet".
    pub fn wait_input(&self, port: InputPort, expected: bool, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(self.wait_timeout);
        let deadline = Instant::now() + timeout;
        loop {
            if matches!(self.get_input(port), Ok(v) if v == expected) {
                return true;
            }
            if Instant::now() >= deadline {
                warn!(port = port.label(), expected, "wait_input timed out after {timeout:?}");
                return false;
            }
            thread::sleep(self.wait_poll);
        }
    }

    fn pulse(&self, port: OutputPort, width: Duration) -> RobotResult<()> {
        self.set_output(port, true)?;
        thread::sleep(width);
        self.set_output(port, false)
    }

    // ─── Composite helpers ──────────────────────────────────────────

    pub fn buzzer_beep(&self) -> RobotResult<()> {
        self.pulse(OutputPort::Buzzer, BUZZER_PULSE)
    }

    /// Blink both start-button LEDs `times` times, ending off.
    pub fn blink_start_leds(&self, times: u32, period: Duration) -> RobotResult<()> {
        let half = period / 2;
        for _ in 0..times {
            self.set_output(OutputPort::StartLeft, true)?;
            self.set_output(OutputPort::StartRight, true)?;
            thread::sleep(half);
            self.set_output(OutputPort::StartLeft, false)?;
            self.set_output(OutputPort::StartRight, false)?;
            thread::sleep(half);
        }
        Ok(())
    }

    /// Latch a displacement-sensor measurement.
    pub fn ds_timing(&self) -> RobotResult<()> {
        self.pulse(OutputPort::DsTiming, DS_PULSE)
    }

    pub fn ds_reset(&self) -> RobotResult<()> {
        self.pulse(OutputPort::DsReset, DS_PULSE)
    }

    pub fn driver_is_up(&self) -> RobotResult<bool> {
        Ok(self.get_input(InputPort::DriverUp)? && !self.get_input(InputPort::DriverDown)?)
    }

    pub fn driver_is_down(&self) -> RobotResult<bool> {
        Ok(self.get_input(InputPort::DriverDown)? && !self.get_input(InputPort::DriverUp)?)
    }

    pub fn screw_guide_is_open(&self) -> RobotResult<bool> {
        Ok(self.get_input(InputPort::ScrewGuideOpen)?
            && !self.get_input(InputPort::ScrewGuideClose)?)
    }

    pub fn screw_guide_is_closed(&self) -> RobotResult<bool> {
        Ok(self.get_input(InputPort::ScrewGuideClose)?
            && !self.get_input(InputPort::ScrewGuideOpen)?)
    }

    pub fn work_is_locked(&self) -> RobotResult<bool> {
        Ok(self.get_input(InputPort::WorkLockLock)? && !self.get_input(InputPort::WorkLockOrg)?)
    }

    /// Both start switches held.
    pub fn start_switches_pressed(&self) -> RobotResult<bool> {
        Ok(self.get_input(InputPort::StartLeftSw)? && self.get_input(InputPort::StartRightSw)?)
    }

    pub fn screw_detected(&self) -> RobotResult<bool> {
        self.get_input(InputPort::ScrewDetect)
    }

    pub fn feeder_has_screw(&self) -> RobotResult<bool> {
        self.get_input(InputPort::FeederScrew)
    }

    pub fn work_present(&self) -> RobotResult<bool> {
        self.get_input(InputPort::WorkEnable)
    }

    pub fn emergency_active(&self) -> RobotResult<bool> {
        self.get_input(InputPort::EmgSw)
    }

    /// Every named port at once.
    pub fn status(&self) -> RobotResult<IoStatus> {
        let inputs = InputPort::ALL
            .iter()
            .map(|&p| {
                Ok(PortState {
                    name: p.label(),
                    number: p.number(),
                    on: self.get_input(p)?,
                })
            })
            .collect::<RobotResult<Vec<_>>>()?;
        let outputs = OutputPort::ALL
            .iter()
            .map(|&p| PortState {
                name: p.label(),
                number: p.number(),
                on: self.output(p),
            })
            .collect();
        Ok(IoStatus {
            board: self.board,
            online: self.can.is_valid(self.board)?,
            inputs,
            outputs,
        })
    }

    /// Switch every named output off.
    pub fn initialize_outputs(&self) -> RobotResult<()> {
        for &port in OutputPort::ALL {
            self.set_output(port, false)?;
        }
        info!(board = self.board, "I/O expander outputs initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splebo_common::config::CanConfig;
    use splebo_hal::drivers::simulation::SimulatedCanNetwork;

    fn expander() -> (SimulatedCanNetwork, Arc<CanBus>, IoExpander) {
        let net = SimulatedCanNetwork::new();
        net.attach_board(0);
        let config = CanConfig {
            boards: vec![0],
            inter_board_delay_ms: 0,
            ..CanConfig::default()
        };
        let bus = Arc::new(CanBus::new(Box::new(net.chip()), config));
        bus.init().unwrap();
        let io = IoExpander::new(
            Arc::clone(&bus),
            &IoConfig {
                wait_poll_ms: 1,
                wait_timeout_ms: 50,
                ..IoConfig::default()
            },
        );
        (net, bus, io)
    }

    #[test]
    fn output_reaches_board_on_next_poll() {
        let (net, bus, io) = expander();
        io.set_output(OutputPort::WorkLock, true).unwrap();
        assert!(io.output(OutputPort::WorkLock));
        assert!(bus.get_output(0, 10).unwrap());
        assert!(!net.output_bit(0, 10));

        bus.poll_cycle();
        assert!(net.output_bit(0, 10));

        io.set_output(OutputPort::WorkLock, false).unwrap();
        assert!(!io.output(OutputPort::WorkLock));
        assert_eq!(bus.output_word(0).unwrap(), 0);
    }

    #[test]
    fn inputs_and_composites() {
        let (net, bus, io) = expander();
        net.set_input_bit(0, InputPort::DriverUp.bit(), true);
        net.set_input_bit(0, InputPort::StartLeftSw.bit(), true);
        net.set_input_bit(0, InputPort::EmgSw.bit(), true);
        bus.poll_cycle();

        assert!(io.driver_is_up().unwrap());
        assert!(!io.driver_is_down().unwrap());
        assert!(!io.start_switches_pressed().unwrap());
        assert!(io.emergency_active().unwrap());

        net.set_input_bit(0, InputPort::StartRightSw.bit(), true);
        bus.poll_cycle();
        assert!(io.start_switches_pressed().unwrap());

        let status = io.status().unwrap();
        assert!(status.online);
        assert_eq!(status.inputs.len(), InputPort::ALL.len());
        assert!(status.inputs.iter().any(|p| p.name == "EMG_SW" && p.on));
    }

    #[test]
    fn guide_lock_and_part_sensing() {
        let (net, bus, io) = expander();
        net.set_input_bit(0, InputPort::ScrewGuideOpen.bit(), true);
        net.set_input_bit(0, InputPort::WorkLockOrg.bit(), true);
        bus.poll_cycle();
        assert!(io.screw_guide_is_open().unwrap());
        assert!(!io.screw_guide_is_closed().unwrap());
        assert!(!io.work_is_locked().unwrap());
        assert!(!io.screw_detected().unwrap());

        net.set_input_bit(0, InputPort::WorkLockOrg.bit(), false);
        net.set_input_bit(0, InputPort::WorkLockLock.bit(), true);
        net.set_input_bit(0, InputPort::ScrewDetect.bit(), true);
        net.set_input_bit(0, InputPort::FeederScrew.bit(), true);
        net.set_input_bit(0, InputPort::WorkEnable.bit(), true);
        bus.poll_cycle();
        assert!(io.work_is_locked().unwrap());
        assert!(io.screw_detected().unwrap());
        assert!(io.feeder_has_screw().unwrap());
        assert!(io.work_present().unwrap());
    }

    #[test]
    fn wait_input_times_out_without_error() {
        let (_net, _bus, io) = expander();
        let started = Instant::now();
        assert!(!io.wait_input(InputPort::ScrewDetect, true, None));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(io.wait_input(InputPort::ScrewDetect, false, None));
    }

    #[test]
    fn pulses_end_low() {
        let (_net, _bus, io) = expander();
        io.set_output(OutputPort::Driver, true).unwrap();
        io.buzzer_beep().unwrap();
        io.ds_timing().unwrap();
        io.ds_reset().unwrap();
        io.blink_start_leds(2, Duration::from_millis(4)).unwrap();
        assert!(!io.output(OutputPort::Buzzer));
        assert!(!io.output(OutputPort::DsTiming));
        assert!(!io.output(OutputPort::DsReset));
        assert!(!io.output(OutputPort::StartLeft));
        assert!(io.output(OutputPort::Driver));

        io.initialize_outputs().unwrap();
        assert!(!io.output(OutputPort::Driver));
    }
}

//! MCP2515 stand-alone CAN controller, register level.
//!
//! Only the subset used by the I/O boards is implemented: TX buffer 0,
//! RX buffer 0 with filters disabled, fixed bit timing.

use std::thread;
use std::time::Duration;

use splebo_common::hal::driver::{HalError, SpiBus};
use tracing::{debug, trace};

use super::frame::{CanFrame, HEADER_LEN, MAX_DATA_LEN};

// ─── SPI instructions ───────────────────────────────────────────────

pub const CMD_RESET: u8 = 0xC0;
pub const CMD_READ: u8 = 0x03;
pub const CMD_WRITE: u8 = 0x02;
pub const CMD_BIT_MODIFY: u8 = 0x05;
/// Read RX buffer; low bits select the start address.
pub const CMD_READ_RX_BUFFER: u8 = 0x90;
/// Load TX buffer; low bits select the buffer.
pub const CMD_LOAD_TX_BUFFER: u8 = 0x40;
/// Request to send; low bits select the buffers.
pub const CMD_RTS: u8 = 0x80;
pub const CMD_READ_STATUS: u8 = 0xA0;
pub const CMD_RX_STATUS: u8 = 0xB0;

/// RX buffer 0 read starting at RXB0SIDH.
const RX0_HEADER: u8 = CMD_READ_RX_BUFFER;
/// RX buffer 0 read starting at RXB0D0.
const RX0_DATA: u8 = CMD_READ_RX_BUFFER | 0x02;

// ─── Registers ──────────────────────────────────────────────────────

pub const REG_CANSTAT: u8 = 0x0E;
pub const REG_CANCTRL: u8 = 0x0F;
pub const REG_CNF3: u8 = 0x28;
pub const REG_CNF2: u8 = 0x29;
pub const REG_CNF1: u8 = 0x2A;
pub const REG_RXB0CTRL: u8 = 0x60;
pub const REG_RXB1CTRL: u8 = 0x70;

/// REQOP / OPMOD field of CANCTRL / CANSTAT.
pub const MODE_MASK: u8 = 0xE0;
/// RXM bits: receive any message, filters off.
pub const RX_ANY: u8 = 0x60;
/// RX status: message in RX buffer 0.
pub const RX_STATUS_RXB0: u8 = 0x40;

/// Bit timing for the I/O board network.
const CNF1: u8 = 0x00;
const CNF2: u8 = 0x80;
const CNF3: u8 = 0x01;

/// Oscillator start-up after reset.
const RESET_SETTLE: Duration = Duration::from_millis(30);
const MODE_POLL: Duration = Duration::from_millis(1);
const MODE_POLL_LIMIT: u32 = 100;

/// Operation mode.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mcp2515Mode {
    Normal = 0,
    Sleep = 1,
    Loopback = 2,
    ListenOnly = 3,
    Configuration = 4,
}

impl Mcp2515Mode {
    /// Mode from the top three bits of CANSTAT.
    pub fn from_canstat(value: u8) -> Option<Self> {
        match (value & MODE_MASK) >> 5 {
            0 => Some(Self::Normal),
            1 => Some(Self::Sleep),
            2 => Some(Self::Loopback),
            3 => Some(Self::ListenOnly),
            4 => Some(Self::Configuration),
            _ => None,
        }
    }

    #[inline]
    const fn bits(self) -> u8 {
        (self as u8) << 5
    }
}

/// MCP2515 behind an SPI bus.
pub struct Mcp2515<B: SpiBus> {
    spi: B,
}

impl<B: SpiBus> Mcp2515<B> {
    pub fn new(spi: B) -> Self {
        Self { spi }
    }

    pub fn reset(&mut self) -> Result<(), HalError> {
        self.spi.transfer(&mut [CMD_RESET])
    }

    pub fn read_register(&mut self, addr: u8) -> Result<u8, HalError> {
        let mut buf = [CMD_READ, addr, 0];
        self.spi.transfer(&mut buf)?;
        Ok(buf[2])
    }

    pub fn write_register(&mut self, addr: u8, value: u8) -> Result<(), HalError> {
        self.spi.transfer(&mut [CMD_WRITE, addr, value])
    }

    /// Change only the bits of `addr` selected by `mask`.
    pub fn bit_modify(&mut self, addr: u8, mask: u8, value: u8) -> Result<(), HalError> {
        self.spi.transfer(&mut [CMD_BIT_MODIFY, addr, mask, value])
    }

    pub fn rx_status(&mut self) -> Result<u8, HalError> {
        let mut buf = [CMD_RX_STATUS, 0];
        self.spi.transfer(&mut buf)?;
        Ok(buf[1])
    }

    pub fn mode(&mut self) -> Result<Option<Mcp2515Mode>, HalError> {
        Ok(Mcp2515Mode::from_canstat(self.read_register(REG_CANSTAT)?))
    }

    /// Request `mode` and wait for CANSTAT to confirm it.
    pub fn set_mode(&mut self, mode: Mcp2515Mode) -> Result<(), HalError> {
        self.bit_modify(REG_CANCTRL, MODE_MASK, mode.bits())?;
        for _ in 0..MODE_POLL_LIMIT {
            if self.mode()? == Some(mode) {
                trace!("MCP2515 in {mode:?} mode");
                return Ok(());
            }
            thread::sleep(MODE_POLL);
        }
        Err(HalError::Timeout(format!(
            "MCP2515 did not enter {mode:?} mode"
        )))
    }

    /// Reset, program bit timing and open both RX buffers, then go on-bus.
    pub fn init(&mut self) -> Result<(), HalError> {
        self.reset()?;
        thread::sleep(RESET_SETTLE);

        self.set_mode(Mcp2515Mode::Configuration)?;
        self.write_register(REG_CNF1, CNF1)?;
        self.write_register(REG_CNF2, CNF2)?;
        self.write_register(REG_CNF3, CNF3)?;
        self.write_register(REG_RXB0CTRL, RX_ANY)?;
        self.write_register(REG_RXB1CTRL, RX_ANY)?;
        self.set_mode(Mcp2515Mode::Normal)?;

        debug!("MCP2515 initialized");
        Ok(())
    }

    /// Load TX buffer 0 and request transmission.
    pub fn transmit(&mut self, frame: &CanFrame) -> Result<(), HalError> {
        let data = frame.data();
        let mut buf = [0u8; 1 + HEADER_LEN + MAX_DATA_LEN];
        buf[0] = CMD_LOAD_TX_BUFFER;
        buf[1..1 + HEADER_LEN].copy_from_slice(&frame.header());
        buf[1 + HEADER_LEN..1 + HEADER_LEN + data.len()].copy_from_slice(data);
        self.spi.transfer(&mut buf[..1 + HEADER_LEN + data.len()])?;
        self.spi.transfer(&mut [CMD_RTS | 0x01])
    }

    /// Read RX buffer 0 if a frame is pending.
    pub fn receive(&mut self) -> Result<Option<CanFrame>, HalError> {
        if self.rx_status()? & RX_STATUS_RXB0 == 0 {
            return Ok(None);
        }

        let mut header = [0u8; 1 + HEADER_LEN];
        header[0] = RX0_HEADER;
        self.spi.transfer(&mut header)?;

        let mut data = [0u8; 1 + MAX_DATA_LEN];
        data[0] = RX0_DATA;
        self.spi.transfer(&mut data)?;

        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&header[1..]);
        let (id, len) = CanFrame::parse_header(&raw);
        CanFrame::new(id, &data[1..1 + len]).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every transfer and answers register reads from a script.
    #[derive(Clone, Default)]
    struct Recorder {
        log: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl SpiBus for Recorder {
        fn transfer(&mut self, buf: &mut [u8]) -> Result<(), HalError> {
            self.log.lock().unwrap().push(buf.to_vec());
            if buf[0] == CMD_READ && buf[1] == REG_CANSTAT {
                // Report whatever mode was last requested.
                let log = self.log.lock().unwrap();
                let requested = log
                    .iter()
                    .rev()
                    .find(|t| t[0] == CMD_BIT_MODIFY && t[1] == REG_CANCTRL)
                    .map(|t| t[3])
                    .unwrap_or(0x80);
                buf[2] = requested;
            }
            Ok(())
        }
    }

    #[test]
    fn transmit_loads_buffer_then_requests_send() {
        let spi = Recorder::default();
        let mut chip = Mcp2515::new(spi.clone());
        let frame = CanFrame::new(0xC1, &[0xAA, 0, 0, 0, 0, 0, 0, 0x55]).unwrap();
        chip.transmit(&frame).unwrap();

        let log = spi.log.lock().unwrap();
        assert_eq!(
            log[0],
            vec![0x40, 0x18, 0x20, 0, 0, 8, 0xAA, 0, 0, 0, 0, 0, 0, 0x55]
        );
        assert_eq!(log[1], vec![0x81]);
    }

    #[test]
    fn init_sequence() {
        let spi = Recorder::default();
        let mut chip = Mcp2515::new(spi.clone());
        chip.init().unwrap();

        let log = spi.log.lock().unwrap();
        assert_eq!(log[0], vec![CMD_RESET]);
        assert_eq!(log[1], vec![CMD_BIT_MODIFY, REG_CANCTRL, MODE_MASK, 0x80]);
        assert!(log.contains(&vec![CMD_WRITE, REG_CNF1, 0x00]));
        assert!(log.contains(&vec![CMD_WRITE, REG_CNF2, 0x80]));
        assert!(log.contains(&vec![CMD_WRITE, REG_CNF3, 0x01]));
        assert!(log.contains(&vec![CMD_WRITE, REG_RXB0CTRL, RX_ANY]));
        assert!(log.contains(&vec![CMD_WRITE, REG_RXB1CTRL, RX_ANY]));
        assert!(log.contains(&vec![CMD_BIT_MODIFY, REG_CANCTRL, MODE_MASK, 0x00]));
    }

    #[test]
    fn receive_without_pending_frame() {
        let mut chip = Mcp2515::new(Recorder::default());
        assert_eq!(chip.receive().unwrap(), None);
    }

    #[test]
    fn mode_decoding() {
        assert_eq!(Mcp2515Mode::from_canstat(0x80), Some(Mcp2515Mode::Configuration));
        assert_eq!(Mcp2515Mode::from_canstat(0x0E), Some(Mcp2515Mode::Normal));
        assert_eq!(Mcp2515Mode::from_canstat(0xE0), None);
    }
}

//! MCP2515 and I/O board simulator.
//!
//! `SimulatedCanChip` implements `SpiBus` and decodes the instruction set
//! the driver uses. Frames sent to `0xC0 + n` reach simulated board `n`,
//! which stores the payload as its outputs and answers with its inputs.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use splebo_common::consts::{CAN_READ_BUFFER_LEN, CAN_WRITE_BUFFER_LEN};
use splebo_common::hal::driver::{HalError, SpiBus};

use crate::can::mcp2515::{
    CMD_BIT_MODIFY, CMD_LOAD_TX_BUFFER, CMD_READ, CMD_READ_RX_BUFFER, CMD_READ_STATUS, CMD_RESET,
    CMD_RTS, CMD_RX_STATUS, CMD_WRITE, MODE_MASK, Mcp2515Mode, REG_CANCTRL, REG_CANSTAT,
    RX_STATUS_RXB0,
};
use crate::can::{BOARD_ID_BASE, CanFrame};

const REGISTER_COUNT: usize = 0x80;
/// Header plus payload of one buffer.
const BUFFER_LEN: usize = 13;

#[derive(Debug, Clone, Default)]
struct SimBoard {
    inputs: [u8; CAN_READ_BUFFER_LEN],
    outputs: [u8; CAN_WRITE_BUFFER_LEN],
    /// Receives frames but never answers.
    silent: bool,
    /// Transfers addressed to it fail at the bus level.
    faulty: bool,
    frames: u64,
}

#[derive(Debug, Default)]
struct NetworkState {
    boards: BTreeMap<u8, SimBoard>,
}

/// The simulated boards, shared between the chip and the test.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCanNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl SimulatedCanNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chip attached to this network.
    pub fn chip(&self) -> SimulatedCanChip {
        SimulatedCanChip {
            net: Arc::clone(&self.state),
            regs: [0; REGISTER_COUNT],
            tx: [0; BUFFER_LEN],
            rx: None,
        }
    }

    pub fn attach_board(&self, board: u8) {
        self.state.lock().boards.entry(board).or_default();
    }

    pub fn set_inputs(&self, board: u8, inputs: [u8; CAN_READ_BUFFER_LEN]) {
        self.state.lock().boards.entry(board).or_default().inputs = inputs;
    }

    pub fn set_input_bit(&self, board: u8, bit: u8, on: bool) {
        let mut state = self.state.lock();
        let b = state.boards.entry(board).or_default();
        let (byte, shift) = ((bit / 8) as usize % CAN_READ_BUFFER_LEN, bit % 8);
        if on {
            b.inputs[byte] |= 1 << shift;
        } else {
            b.inputs[byte] &= !(1 << shift);
        }
    }

    /// Outputs the board last received.
    pub fn outputs(&self, board: u8) -> Option<[u8; CAN_WRITE_BUFFER_LEN]> {
        self.state.lock().boards.get(&board).map(|b| b.outputs)
    }

    pub fn output_bit(&self, board: u8, bit: u8) -> bool {
        self.outputs(board)
            .map(|o| o[(bit / 8) as usize % CAN_WRITE_BUFFER_LEN] & (1 << (bit % 8)) != 0)
            .unwrap_or(false)
    }

    pub fn set_silent(&self, board: u8, silent: bool) {
        self.state.lock().boards.entry(board).or_default().silent = silent;
    }

    pub fn set_faulty(&self, board: u8, faulty: bool) {
        self.state.lock().boards.entry(board).or_default().faulty = faulty;
    }

    /// Frames the board has received.
    pub fn frames(&self, board: u8) -> u64 {
        self.state.lock().boards.get(&board).map_or(0, |b| b.frames)
    }
}

/// Simulated MCP2515 on the SPI bus.
pub struct SimulatedCanChip {
    net: Arc<Mutex<NetworkState>>,
    regs: [u8; REGISTER_COUNT],
    tx: [u8; BUFFER_LEN],
    rx: Option<[u8; BUFFER_LEN]>,
}

impl SimulatedCanChip {
    fn reg(&self, addr: u8) -> u8 {
        self.regs[addr as usize % REGISTER_COUNT]
    }

    fn set_reg(&mut self, addr: u8, value: u8) {
        self.regs[addr as usize % REGISTER_COUNT] = value;
        if addr == REG_CANCTRL {
            // Mode requests take effect immediately.
            let stat = self.reg(REG_CANSTAT);
            self.regs[REG_CANSTAT as usize] = (stat & !MODE_MASK) | (value & MODE_MASK);
        }
    }

    fn reset(&mut self) {
        self.regs = [0; REGISTER_COUNT];
        self.regs[REG_CANCTRL as usize] = 0x87;
        self.regs[REG_CANSTAT as usize] = 0x80;
        self.rx = None;
    }

    fn send(&mut self) -> Result<(), HalError> {
        if Mcp2515Mode::from_canstat(self.reg(REG_CANSTAT)) != Some(Mcp2515Mode::Normal) {
            return Ok(());
        }
        let mut header = [0u8; 5];
        header.copy_from_slice(&self.tx[..5]);
        let (id, len) = CanFrame::parse_header(&header);
        let Some(board) = id.checked_sub(BOARD_ID_BASE).and_then(|b| u8::try_from(b).ok()) else {
            return Ok(());
        };

        let mut net = self.net.lock();
        let Some(state) = net.boards.get_mut(&board) else {
            return Ok(());
        };
        if state.faulty {
            return Err(HalError::CommunicationError(format!(
                "no acknowledge from board {board}"
            )));
        }
        let n = len.min(CAN_WRITE_BUFFER_LEN);
        state.outputs[..n].copy_from_slice(&self.tx[5..5 + n]);
        state.frames += 1;
        if state.silent {
            return Ok(());
        }

        let reply = CanFrame::new(id, &state.inputs)?;
        let mut rx = [0u8; BUFFER_LEN];
        rx[..5].copy_from_slice(&reply.header());
        // Boards always answer with a full 8-byte frame.
        rx[4] = 8;
        rx[5..5 + CAN_READ_BUFFER_LEN].copy_from_slice(&state.inputs);
        self.rx = Some(rx);
        Ok(())
    }
}

impl SpiBus for SimulatedCanChip {
    fn transfer(&mut self, buf: &mut [u8]) -> Result<(), HalError> {
        let Some(&cmd) = buf.first() else {
            return Ok(());
        };
        match cmd {
            CMD_RESET => self.reset(),
            CMD_READ => {
                let addr = buf.get(1).copied().unwrap_or(0);
                for (i, out) in buf.iter_mut().skip(2).enumerate() {
                    *out = self.reg(addr.wrapping_add(i as u8));
                }
            }
            CMD_WRITE => {
                let addr = buf.get(1).copied().unwrap_or(0);
                for (i, &v) in buf.iter().skip(2).enumerate() {
                    self.set_reg(addr.wrapping_add(i as u8), v);
                }
            }
            CMD_BIT_MODIFY => {
                if let &[_, addr, mask, value, ..] = &*buf {
                    let current = self.reg(addr);
                    self.set_reg(addr, (current & !mask) | (value & mask));
                }
            }
            CMD_RX_STATUS => {
                if let Some(out) = buf.get_mut(1) {
                    *out = if self.rx.is_some() { RX_STATUS_RXB0 } else { 0 };
                }
            }
            CMD_READ_STATUS => {
                if let Some(out) = buf.get_mut(1) {
                    *out = u8::from(self.rx.is_some());
                }
            }
            c if c & 0xF8 == CMD_LOAD_TX_BUFFER => {
                let n = (buf.len() - 1).min(BUFFER_LEN);
                self.tx = [0; BUFFER_LEN];
                self.tx[..n].copy_from_slice(&buf[1..1 + n]);
            }
            c if c & 0xF8 == CMD_RTS => {
                if c & 0x01 != 0 {
                    self.send()?;
                }
            }
            c if c & 0xF9 == CMD_READ_RX_BUFFER => {
                let rx = self.rx.unwrap_or([0; BUFFER_LEN]);
                let start = if c & 0x02 != 0 { 5 } else { 0 };
                for (out, v) in buf.iter_mut().skip(1).zip(rx.iter().skip(start)) {
                    *out = *v;
                }
                if start == 5 {
                    self.rx = None;
                }
            }
            other => {
                return Err(HalError::DeviceRejected(format!(
                    "unknown SPI instruction 0x{other:02X}"
                )));
            }
        }
        Ok(())
    }
}

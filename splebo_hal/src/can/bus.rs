//! Board table and background poller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;
use splebo_common::config::CanConfig;
use splebo_common::consts::{CAN_MAX_BIT, CAN_READ_BUFFER_LEN, CAN_WRITE_BUFFER_LEN, MAX_CAN_BOARDS};
use splebo_common::hal::driver::{HalError, SpiBus};
use tracing::{debug, info, warn};

use super::frame::{CanFrame, board_frame_id};
use super::mcp2515::Mcp2515;

/// One addressable I/O board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoardState {
    /// Output image, flushed on every poll.
    pub write: [u8; CAN_WRITE_BUFFER_LEN],
    /// Input image from the last answered poll.
    pub read: [u8; CAN_READ_BUFFER_LEN],
    /// Polled by the background cycle.
    pub valid: bool,
    /// Consecutive polls without an answer.
    pub missed: u32,
    /// Answered polls since start.
    pub answered: u64,
}

/// The CAN bus and its 16 board images.
///
/// The chip lock serializes every SPI transfer. The board lock only guards
/// the in-memory images and is never held across a transfer.
pub struct CanBus {
    chip: Mutex<Mcp2515<Box<dyn SpiBus>>>,
    boards: Mutex<[BoardState; MAX_CAN_BOARDS]>,
    config: CanConfig,
}

#[inline]
fn check_board(board: u8) -> Result<usize, HalError> {
    if (board as usize) < MAX_CAN_BOARDS {
        Ok(board as usize)
    } else {
        Err(HalError::InvalidBoard(board))
    }
}

#[inline]
fn check_bit(bit: u8) -> Result<(usize, u8), HalError> {
    if bit <= CAN_MAX_BIT {
        Ok(((bit / 8) as usize, bit % 8))
    } else {
        Err(HalError::InvalidBit(bit))
    }
}

impl CanBus {
    /// Create the bus. Boards listed in `config.boards` start valid.
    pub fn new(spi: Box<dyn SpiBus>, config: CanConfig) -> Self {
        let mut boards = [BoardState::default(); MAX_CAN_BOARDS];
        for &id in &config.boards {
            if let Some(board) = boards.get_mut(id as usize) {
                board.valid = true;
            }
        }
        Self {
            chip: Mutex::new(Mcp2515::new(spi)),
            boards: Mutex::new(boards),
            config,
        }
    }

    /// Bring the controller chip on-bus.
    pub fn init(&self) -> Result<(), HalError> {
        self.chip.lock().init()?;
        info!(boards = ?self.valid_boards(), "CAN bus initialized");
        Ok(())
    }

    pub fn config(&self) -> &CanConfig {
        &self.config
    }

    // ─── Polling ────────────────────────────────────────────────────

    /// Exchange one frame with `board`.
    ///
    /// Returns `Ok(true)` when the board answered and its input image was
    /// refreshed, `Ok(false)` when nothing came back. A transfer error marks
    /// the board invalid, and so does reaching a non-zero miss limit.
    pub fn poll_board(&self, board: u8) -> Result<bool, HalError> {
        let idx = check_board(board)?;
        let payload = self.boards.lock()[idx].write;
        let frame = CanFrame::new(board_frame_id(board), &payload)?;

        let reply = {
            let mut chip = self.chip.lock();
            chip.transmit(&frame).and_then(|_| chip.receive())
        };

        let mut boards = self.boards.lock();
        let state = &mut boards[idx];
        match reply {
            Ok(Some(rx)) => {
                let n = rx.data().len().min(CAN_READ_BUFFER_LEN);
                state.read[..n].copy_from_slice(&rx.data()[..n]);
                state.missed = 0;
                state.answered += 1;
                Ok(true)
            }
            Ok(None) => {
                state.missed += 1;
                let limit = self.config.miss_limit;
                if state.valid && limit > 0 && state.missed >= limit {
                    state.valid = false;
                    warn!(board, missed = state.missed, "CAN board not answering, marked invalid");
                }
                Ok(false)
            }
            Err(e) => {
                if state.valid {
                    state.valid = false;
                    warn!(board, "CAN board marked invalid: {e}");
                }
                Err(e)
            }
        }
    }

    /// Poll every valid board once. Returns the number that answered.
    pub fn poll_cycle(&self) -> usize {
        let mut answered = 0;
        let boards = self.valid_boards();
        for (i, &board) in boards.iter().enumerate() {
            if i > 0 {
                thread::sleep(self.config.inter_board_delay());
            }
            match self.poll_board(board) {
                Ok(true) => answered += 1,
                Ok(false) => {}
                Err(e) => debug!(board, "poll failed: {e}"),
            }
        }
        answered
    }

    /// Spawn the background poller.
    pub fn start_polling(self: &Arc<Self>) -> Result<CanPoller, HalError> {
        let running = Arc::new(AtomicBool::new(true));
        let bus = Arc::clone(self);
        let flag = Arc::clone(&running);
        let interval = self.config.poll_interval();

        let handle = thread::Builder::new()
            .name("can-poll".to_string())
            .spawn(move || {
                debug!(?interval, "CAN poller started");
                while flag.load(Ordering::Acquire) {
                    let start = Instant::now();
                    bus.poll_cycle();
                    if let Some(rest) = interval.checked_sub(start.elapsed()) {
                        thread::sleep(rest);
                    }
                }
                debug!("CAN poller stopped");
            })
            .map_err(|e| HalError::InitFailed(format!("CAN poll thread: {e}")))?;

        Ok(CanPoller {
            running,
            handle: Some(handle),
        })
    }

    // ─── Board validity ─────────────────────────────────────────────

    pub fn is_valid(&self, board: u8) -> Result<bool, HalError> {
        let idx = check_board(board)?;
        Ok(self.boards.lock()[idx].valid)
    }

    /// Ids of the boards the poll cycle visits, ascending.
    pub fn valid_boards(&self) -> Vec<u8> {
        self.boards
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, b)| b.valid)
            .map(|(id, _)| id as u8)
            .collect()
    }

    pub fn mark_invalid(&self, board: u8) -> Result<(), HalError> {
        let idx = check_board(board)?;
        self.boards.lock()[idx].valid = false;
        warn!(board, "CAN board marked invalid");
        Ok(())
    }

    /// Put a board back into the poll cycle.
    pub fn reactivate_board(&self, board: u8) -> Result<(), HalError> {
        let idx = check_board(board)?;
        let mut boards = self.boards.lock();
        boards[idx].valid = true;
        boards[idx].missed = 0;
        info!(board, "CAN board reactivated");
        Ok(())
    }

    pub fn board_state(&self, board: u8) -> Result<BoardState, HalError> {
        let idx = check_board(board)?;
        Ok(self.boards.lock()[idx])
    }

    // ─── Bit and word access ────────────────────────────────────────

    /// Set one output bit. Reaches the board on the next poll.
    pub fn set_output(&self, board: u8, bit: u8, value: bool) -> Result<(), HalError> {
        let idx = check_board(board)?;
        let (byte, shift) = check_bit(bit)?;
        let mut boards = self.boards.lock();
        let cell = &mut boards[idx].write[byte];
        if value {
            *cell |= 1 << shift;
        } else {
            *cell &= !(1 << shift);
        }
        Ok(())
    }

    /// Output bit as currently buffered.
    pub fn get_output(&self, board: u8, bit: u8) -> Result<bool, HalError> {
        let idx = check_board(board)?;
        let (byte, shift) = check_bit(bit)?;
        Ok(self.boards.lock()[idx].write[byte] & (1 << shift) != 0)
    }

    /// Input bit from the last answered poll.
    pub fn get_input(&self, board: u8, bit: u8) -> Result<bool, HalError> {
        let idx = check_board(board)?;
        let (byte, shift) = check_bit(bit)?;
        Ok(self.boards.lock()[idx].read[byte] & (1 << shift) != 0)
    }

    /// Replace output bits 0..31, little-endian.
    pub fn set_output_word(&self, board: u8, word: u32) -> Result<(), HalError> {
        let idx = check_board(board)?;
        self.boards.lock()[idx].write[..4].copy_from_slice(&word.to_le_bytes());
        Ok(())
    }

    pub fn output_word(&self, board: u8) -> Result<u32, HalError> {
        let idx = check_board(board)?;
        let boards = self.boards.lock();
        let w = &boards[idx].write;
        Ok(u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
    }

    /// Inputs 0..31, little-endian.
    pub fn input_word(&self, board: u8) -> Result<u32, HalError> {
        let idx = check_board(board)?;
        Ok(u32::from_le_bytes(self.boards.lock()[idx].read))
    }

    /// Run `f` on a board's write image under the board lock.
    ///
    /// Lets callers keep their own caches consistent with the image.
    pub fn with_write_buffer<R>(
        &self,
        board: u8,
        f: impl FnOnce(&mut [u8; CAN_WRITE_BUFFER_LEN]) -> R,
    ) -> Result<R, HalError> {
        let idx = check_board(board)?;
        Ok(f(&mut self.boards.lock()[idx].write))
    }
}

/// Handle to the background poll thread. Stops it on drop.
pub struct CanPoller {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CanPoller {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Signal the thread and wait for the current cycle to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("CAN poll thread panicked");
            }
        }
    }
}

impl Drop for CanPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

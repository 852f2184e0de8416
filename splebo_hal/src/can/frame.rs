//! Standard-id CAN frame and its MCP2515 buffer header layout.

use heapless::Vec;
use splebo_common::hal::driver::HalError;
use static_assertions::const_assert;

/// Data bytes in a CAN 2.0 frame.
pub const MAX_DATA_LEN: usize = 8;

/// Identifier of board 0. Board `n` answers on `BOARD_ID_BASE + n`.
pub const BOARD_ID_BASE: u16 = 0xC0;

/// Largest standard (11-bit) identifier.
const MAX_STANDARD_ID: u16 = 0x7FF;

/// Length of the SIDH/SIDL/EID8/EID0/DLC header in a TX/RX buffer.
pub(crate) const HEADER_LEN: usize = 5;

const_assert!(BOARD_ID_BASE as usize + splebo_common::consts::MAX_CAN_BOARDS <= 0x7FF);

/// Frame id used to address `board`.
#[inline]
pub fn board_frame_id(board: u8) -> u16 {
    BOARD_ID_BASE + board as u16
}

/// A standard-identifier data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    id: u16,
    data: Vec<u8, MAX_DATA_LEN>,
}

impl CanFrame {
    /// Build a frame. Fails for ids above 11 bits or more than 8 bytes.
    pub fn new(id: u16, data: &[u8]) -> Result<Self, HalError> {
        if id > MAX_STANDARD_ID {
            return Err(HalError::ConfigError(format!(
                "CAN id 0x{id:X} exceeds 11 bits"
            )));
        }
        let data = Vec::from_slice(data).map_err(|_| {
            HalError::ConfigError(format!(
                "CAN payload of {} bytes exceeds {MAX_DATA_LEN}",
                data.len()
            ))
        })?;
        Ok(Self { id, data })
    }

    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Buffer header: SIDH, SIDL, EID8, EID0, DLC.
    pub fn header(&self) -> [u8; HEADER_LEN] {
        [
            ((self.id & 0x7F8) >> 3) as u8,
            ((self.id & 0x007) << 5) as u8,
            0,
            0,
            self.data.len() as u8,
        ]
    }

    /// Identifier and data length from a received buffer header.
    pub fn parse_header(header: &[u8; HEADER_LEN]) -> (u16, usize) {
        let id = ((header[0] as u16) << 3) | ((header[1] as u16) >> 5);
        let len = ((header[4] & 0x0F) as usize).min(MAX_DATA_LEN);
        (id, len)
    }
}

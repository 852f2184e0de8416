//! CAN bus access to the I/O expansion boards.
//!
//! | Layer            | Type        | Owns                                   |
//! |------------------|-------------|----------------------------------------|
//! | Frame layout     | `CanFrame`  | 11-bit id, up to 8 data bytes           |
//! | Chip protocol    | `Mcp2515`   | the `SpiBus`, register/mode sequencing |
//! | Board table      | `CanBus`    | 16 board buffers, validity, poll loop  |
//!
//! Every SPI transfer goes through the single chip lock inside `CanBus`;
//! board buffers sit behind a second lock so readers never wait on the bus.

mod bus;
mod frame;
pub mod mcp2515;

pub use bus::{BoardState, CanBus, CanPoller};
pub use frame::{BOARD_ID_BASE, CanFrame, MAX_DATA_LEN, board_frame_id};
pub use mcp2515::{Mcp2515, Mcp2515Mode};

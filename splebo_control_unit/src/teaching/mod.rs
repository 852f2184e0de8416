//! Teaching positions: named poses the operator records and replays.
//!
//! | Module       | Contents                                      |
//! |--------------|-----------------------------------------------|
//! | [`position`] | one point: 8 coordinates and flags            |
//! | [`table`]    | sorted table bound to a store file            |
//! | [`codec`]    | JSON and legacy `.pos` text layouts           |
//!
//! The table is always written whole; a failed save leaves the previous
//! file in place.

pub mod codec;
pub mod position;
pub mod table;

pub use codec::{JsonCodec, LegacyCodec, PositionCodec, PositionDocument, codec_for};
pub use position::Position;
pub use table::{HOME_COMMENT, PositionTable};

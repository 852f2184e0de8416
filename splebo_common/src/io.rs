//! I/O expander port map.

pub mod ports;

//! Hardware bindings: the one place `esp-idf-svc` peripheral types meet the
//! host-testable traits in `transceiver`, `bridge` and `ui`.

pub mod board;

pub use board::{Buttons, BoardLeds, DirectTransceiver, Pn532Link, UsbHost};

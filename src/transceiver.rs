//! Transceiver contract and PN532 opcode constants.
//!
//! Grounded on `rfid_execute`'s call sites in the original firmware
//! (`default_keys`/`arc.c`'s `mifare_*` helpers build a command buffer and
//! call through one `execute`-shaped primitive) and shaped, on the Rust
//! side, after the teacher's `MfrcDriver` trait: a small trait abstracting
//! the bus so the algorithm above it is hardware-agnostic and host-testable
//! against an in-memory fake.

/// `InListPassiveTarget` / `InDataExchange` / ... opcode bytes, per the
/// PN532 user manual.
pub mod opcode {
    pub const SAM_CONFIGURATION: u8 = 0x14;
    pub const RF_CONFIGURATION: u8 = 0x32;
    pub const IN_LIST_PASSIVE_TARGET: u8 = 0x4A;
    pub const IN_DATA_EXCHANGE: u8 = 0x40;
}

/// MIFARE target commands carried inside `InDataExchange`.
pub mod mifare_cmd {
    pub const AUTH_WITH_KEY_A: u8 = 0x60;
    pub const READ_16: u8 = 0x30;
    pub const WRITE_16: u8 = 0xA0;
}

#[derive(Debug)]
pub enum TransceiveError {
    /// The transport (SPI/UART/USB) reported a bus-level failure.
    Bus(String),
    /// The controller's IRQ line never asserted before a timeout elapsed.
    Timeout,
}

impl std::fmt::Display for TransceiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransceiveError::Bus(msg) => write!(f, "bus error: {msg}"),
            TransceiveError::Timeout => write!(f, "timed out waiting for controller"),
        }
    }
}

impl std::error::Error for TransceiveError {}

/// Two primitives the clone engine and bridge loop need from the controller
/// link. Implemented for real over SPI in `hal`; implemented in host tests
/// against an in-memory fake that plays back canned responses.
pub trait Transceiver {
    /// Sends `tx_len` bytes of command from `buf` and overwrites `buf` with
    /// up to `buf.len()` bytes of response. Returns `Ok(n)`, the response
    /// length.
    fn execute(&mut self, buf: &mut [u8], tx_len: usize) -> Result<usize, TransceiveError>;

    /// `RFConfiguration(CfgItem=0x01, RF=0x00)`. Must be issued between
    /// every card interaction to let the target fall off the field.
    fn turn_rf_off(&mut self) -> Result<(), TransceiveError>;
}

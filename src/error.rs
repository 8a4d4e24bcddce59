//! Crate-wide error taxonomy.
//!
//! No variant here is fatal to the process: every caller recovers locally
//! (reset a buffer, turn the RF field off, retry) rather than propagating
//! out of the foreground loop. `main`'s setup path uses `anyhow` instead,
//! matching the teacher's `main() -> anyhow::Result<()>` boundary.

use crate::transceiver::TransceiveError;

#[derive(Debug)]
pub enum BadgeError {
    /// Bad LCS/CRC, oversize, or TFI mismatch; the HSM already reset itself.
    FrameMalformed,
    /// The transceiver/transport returned an error.
    Transceive(TransceiveError),
    /// `0x41 0x14` response: MIFARE authentication rejected.
    AuthFailed,
    /// `InListPassiveTarget` returned too few bytes or an unrecognised SAK.
    NoCard,
    /// A `PREFIX_EXT` frame was seen; extended frames are not implemented.
    UnsupportedExtendedFrame,
}

impl std::fmt::Display for BadgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BadgeError::FrameMalformed => write!(f, "malformed PN532 frame"),
            BadgeError::Transceive(e) => write!(f, "transceiver error: {e}"),
            BadgeError::AuthFailed => write!(f, "MIFARE authentication failed"),
            BadgeError::NoCard => write!(f, "no card present"),
            BadgeError::UnsupportedExtendedFrame => write!(f, "extended frame not supported"),
        }
    }
}

impl std::error::Error for BadgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BadgeError::Transceive(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransceiveError> for BadgeError {
    fn from(e: TransceiveError) -> Self {
        BadgeError::Transceive(e)
    }
}

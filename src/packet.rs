//! PN532 host-framing state machine.
//!
//! Consumes one byte at a time and reassembles standard, extended, ACK,
//! NACK and flow-control frames on a noisy half-duplex link. Two independent
//! instances (one per direction, distinguished by `tfi`) demultiplex a
//! bidirectional wire without sharing any state.

use crate::error::BadgeError;

/// Reserved preamble + max payload + trailing framing bytes.
pub const MAX_PACKET_SIZE: usize = 275;

/// TFI discriminant for host -> controller frames.
pub const TFI_HOST_TO_CONTROLLER: u8 = 0xD4;
/// TFI discriminant for controller -> host frames.
pub const TFI_CONTROLLER_TO_HOST: u8 = 0xD5;

/// Internal parser state. Carries no data of its own; all scratch lives on
/// [`PacketBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketState {
    Idle,
    FlowCtrl,
    Prefix,
    PrefixExt,
    Payload,
}

/// Control signal a caller must act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Three-zero HSU wakeup hint (`55 55 00 00 00`) was observed.
    Wakeup,
    /// A long zero run was observed; flush the controller's FIFO.
    FifoFlush,
}

/// Outcome of feeding one byte to [`PacketBuffer::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResult {
    /// Byte absorbed, no externally visible event.
    Progressed,
    /// A complete frame of `len` bytes sits in `data[..len]`.
    Completed(usize),
    /// A control signal the caller must react to.
    Signal(Signal),
}

/// Fixed-capacity scratch buffer plus the HSM's scratch fields.
pub struct PacketBuffer {
    reserved: usize,
    pos: usize,
    expected: usize,
    data_prev: u8,
    wakeup: u8,
    crc: u8,
    tfi: u8,
    state: PacketState,
    pub data: [u8; MAX_PACKET_SIZE],
}

impl PacketBuffer {
    /// `reserved` is the leading byte count preserved for outbound framing
    /// (0 or 1); `tfi` is the frame identifier this instance accepts.
    pub fn new(reserved: usize, tfi: u8) -> Self {
        PacketBuffer {
            reserved,
            pos: 0,
            expected: 0,
            data_prev: 0x01,
            wakeup: 0,
            crc: 0,
            tfi,
            state: PacketState::Idle,
            data: [0; MAX_PACKET_SIZE],
        }
    }

    /// Number of bytes currently buffered for the in-progress frame.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn state(&self) -> PacketState {
        self.state
    }

    /// Resets scratch fields, preserving `(reserved, tfi)`.
    pub fn reset(&mut self) {
        let reserved = self.reserved;
        let tfi = self.tfi;
        *self = PacketBuffer::new(reserved, tfi);
    }

    fn push(&mut self, byte: u8) {
        self.data[self.pos] = byte;
        self.pos += 1;
    }

    /// Consumes one byte, advancing the state machine.
    pub fn put(&mut self, byte: u8) -> PutResult {
        let result = match self.state {
            PacketState::Idle => self.on_idle(byte),
            PacketState::FlowCtrl => self.on_flowctrl(byte),
            PacketState::Prefix => self.on_prefix(byte),
            PacketState::Payload => self.on_payload(byte),
            PacketState::PrefixExt => self.on_prefix_ext(),
        };

        self.data_prev = byte;
        self.state = match result {
            PutResult::Completed(_) => PacketState::Idle,
            PutResult::Progressed => self.state,
            PutResult::Signal(_) => self.state,
        };
        result
    }

    fn on_idle(&mut self, byte: u8) -> PutResult {
        if self.pos != 0 {
            log::debug!("HSM: stale data in IDLE, resetting");
            self.reset();
            return PutResult::Progressed;
        }

        if byte == 0xFF && self.data_prev == 0x00 {
            let preamble = [0x00u8, 0x00, 0xFF];
            self.data[self.reserved..self.reserved + preamble.len()].copy_from_slice(&preamble);
            self.pos = self.reserved + preamble.len();
            self.expected = self.pos + 2;
            self.state = PacketState::FlowCtrl;
            return PutResult::Progressed;
        }

        if byte == 0x55 && self.data_prev == 0x55 {
            self.wakeup = 3;
        } else if self.wakeup != 0 {
            if byte != 0 {
                self.wakeup = 0;
            } else {
                self.wakeup -= 1;
                if self.wakeup == 0 {
                    return PutResult::Signal(Signal::Wakeup);
                }
            }
        }

        PutResult::Progressed
    }

    fn on_flowctrl(&mut self, byte: u8) -> PutResult {
        self.push(byte);
        if self.pos < self.expected {
            return PutResult::Progressed;
        }

        let lcs = self.data[self.pos - 1];
        let len = self.data[self.pos - 2];

        match (len, lcs) {
            (0xFF, 0xFF) => {
                self.expected += 4;
                self.state = PacketState::PrefixExt;
                PutResult::Progressed
            }
            (0xFF, 0x00) | (0x00, 0xFF) => PutResult::Completed(self.pos),
            _ => {
                self.expected += 1;
                self.state = PacketState::Prefix;
                PutResult::Progressed
            }
        }
    }

    fn on_prefix(&mut self, byte: u8) -> PutResult {
        self.push(byte);
        if self.pos < self.expected {
            return PutResult::Progressed;
        }

        let lcs = self.data[self.pos - 2];
        let len = self.data[self.pos - 3];

        if len == 0x01 && lcs == 0xFF {
            self.expected += len as usize;
            self.crc = self.data[self.pos - 1];
            self.state = PacketState::Payload;
            return PutResult::Progressed;
        }

        if len.wrapping_add(lcs) != 0 {
            // Neither a valid short packet nor the degenerate single-byte
            // case: garbage LCS. Reset rather than keep absorbing bytes
            // against a length that will never arrive.
            log::debug!("HSM: {} (bad LCS), resetting", BadgeError::FrameMalformed);
            self.reset();
            return PutResult::Progressed;
        }

        self.expected += len as usize;
        if self.expected > MAX_PACKET_SIZE {
            log::debug!(
                "HSM: {} (oversize, {} bytes), resetting",
                BadgeError::FrameMalformed,
                self.expected
            );
            self.reset();
            return PutResult::Progressed;
        }

        let tfi_byte = self.data[self.pos - 1];
        if tfi_byte != self.tfi {
            self.reset();
            return PutResult::Progressed;
        }

        self.crc = self.tfi;
        self.state = PacketState::Payload;
        PutResult::Progressed
    }

    fn on_payload(&mut self, byte: u8) -> PutResult {
        self.push(byte);
        self.crc = self.crc.wrapping_add(byte);

        if self.pos < self.expected {
            return PutResult::Progressed;
        }

        if self.crc != 0 {
            log::debug!(
                "HSM: {} (bad DCS, crc=0x{:02x}), resetting",
                BadgeError::FrameMalformed,
                self.crc
            );
            self.reset();
            return PutResult::Progressed;
        }

        PutResult::Completed(self.pos)
    }

    fn on_prefix_ext(&mut self) -> PutResult {
        log::warn!("HSM: {}, dropping", BadgeError::UnsupportedExtendedFrame);
        self.reset();
        PutResult::Progressed
    }
}

/// Builds a standard (non-extended) frame around `payload` under `tfi`,
/// writing `00 00 FF LEN LCS TFI payload... DCS 00` into `out` and
/// returning the byte count written. The mirror of what [`PacketBuffer`]
/// unwraps a byte at a time.
pub fn encode_frame(tfi: u8, payload: &[u8], out: &mut [u8]) -> usize {
    let len = payload.len() + 1; // +1 for TFI
    out[0] = 0x00;
    out[1] = 0x00;
    out[2] = 0xFF;
    out[3] = len as u8;
    out[4] = (0u8).wrapping_sub(len as u8);
    out[5] = tfi;
    out[6..6 + payload.len()].copy_from_slice(payload);

    let mut dcs = tfi;
    for &b in payload {
        dcs = dcs.wrapping_add(b);
    }
    out[6 + payload.len()] = (0u8).wrapping_sub(dcs);
    out[7 + payload.len()] = 0x00;

    8 + payload.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(pkt: &mut PacketBuffer, bytes: &[u8]) -> Vec<PutResult> {
        bytes.iter().map(|&b| pkt.put(b)).collect()
    }

    #[test]
    fn short_frame_pattern_one_completes() {
        // `00 00 FF 00 FF 00` -- one of the two fixed short-frame byte
        // patterns (the other being `00 00 FF FF 00 00`); both complete
        // identically regardless of which the wire calls ACK vs NACK.
        let mut pkt = PacketBuffer::new(0, TFI_CONTROLLER_TO_HOST);
        let results = feed(&mut pkt, &[0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00]);
        assert_eq!(
            results,
            vec![
                PutResult::Progressed,
                PutResult::Progressed,
                PutResult::Progressed,
                PutResult::Progressed,
                PutResult::Completed(5),
                PutResult::Progressed,
            ]
        );
        assert_eq!(pkt.state(), PacketState::Idle);
    }

    #[test]
    fn short_frame_pattern_two_completes() {
        let mut pkt = PacketBuffer::new(0, TFI_CONTROLLER_TO_HOST);
        let results = feed(&mut pkt, &[0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00]);
        let completed: Vec<_> = results
            .into_iter()
            .filter(|r| matches!(r, PutResult::Completed(_)))
            .collect();
        assert_eq!(completed, vec![PutResult::Completed(5)]);
    }

    #[test]
    fn firmware_version_response_completes_for_matching_tfi() {
        // TFI D5, payload `03 32 01 06` (GetFirmwareVersion response
        // opcode + IC/Ver/Rev), LEN=5 (TFI+4 payload bytes), LCS=0xFB,
        // DCS=0xEF makes TFI+payload+DCS sum zero mod 256.
        let frame = [
            0x00, 0x00, 0xFF, 0x05, 0xFB, 0xD5, 0x03, 0x32, 0x01, 0x06, 0xEF,
        ];
        let mut pkt = PacketBuffer::new(0, TFI_CONTROLLER_TO_HOST);
        let mut last = PutResult::Progressed;
        for &b in &frame {
            last = pkt.put(b);
        }
        assert_eq!(last, PutResult::Completed(11));
    }

    #[test]
    fn firmware_version_response_discarded_for_mismatched_tfi() {
        let frame = [
            0x00, 0x00, 0xFF, 0x05, 0xFB, 0xD5, 0x03, 0x32, 0x01, 0x06, 0xEF, 0x00,
        ];
        let mut pkt = PacketBuffer::new(0, TFI_HOST_TO_CONTROLLER);
        let mut completed = false;
        for &b in &frame {
            if matches!(pkt.put(b), PutResult::Completed(_)) {
                completed = true;
            }
        }
        assert!(!completed);
    }

    #[test]
    fn hsu_wakeup_hint_emits_signal_once() {
        let mut pkt = PacketBuffer::new(0, TFI_HOST_TO_CONTROLLER);
        let results = feed(&mut pkt, &[0x55, 0x55, 0x00, 0x00, 0x00]);
        let wakeups = results
            .iter()
            .filter(|r| matches!(r, PutResult::Signal(Signal::Wakeup)))
            .count();
        assert_eq!(wakeups, 1);
    }

    #[test]
    fn bad_dcs_resets_without_completing() {
        let frame = [
            0x00, 0x00, 0xFF, 0x02, 0xFE, 0xD5, 0x03, 0x32, 0x01, 0x06, 0xFF,
        ];
        let mut pkt = PacketBuffer::new(0, TFI_CONTROLLER_TO_HOST);
        let mut completed = false;
        for &b in &frame {
            if matches!(pkt.put(b), PutResult::Completed(_)) {
                completed = true;
            }
        }
        assert!(!completed);
        assert_eq!(pkt.pos(), 0);
    }

    #[test]
    fn single_byte_payload_degenerate_case_completes() {
        // len=0x01, lcs=0xFF: the one payload byte lands in the slot that
        // would normally hold the TFI validation byte, so crc seeds from
        // that byte instead of from `tfi`. One further DCS byte, chosen to
        // bring the running sum back to zero, closes the frame.
        let payload_byte = 0xABu8;
        let dcs = (0u8).wrapping_sub(payload_byte);
        let mut pkt = PacketBuffer::new(0, TFI_HOST_TO_CONTROLLER);
        let frame = [0x00u8, 0x00, 0xFF, 0x01, 0xFF, payload_byte, dcs];
        let mut last = PutResult::Progressed;
        for &b in &frame {
            last = pkt.put(b);
        }
        assert_eq!(last, PutResult::Completed(7));
    }

    #[test]
    fn resumable_across_calls_matches_single_stream() {
        let frame = [
            0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00,
        ];

        let mut whole = PacketBuffer::new(0, TFI_CONTROLLER_TO_HOST);
        let whole_results: Vec<_> = frame.iter().map(|&b| whole.put(b)).collect();

        let mut split = PacketBuffer::new(0, TFI_CONTROLLER_TO_HOST);
        let mut split_results = Vec::new();
        for chunk in frame.chunks(3) {
            for &b in chunk {
                split_results.push(split.put(b));
            }
        }

        let completed_whole: Vec<_> = whole_results
            .into_iter()
            .filter(|r| matches!(r, PutResult::Completed(_)))
            .collect();
        let completed_split: Vec<_> = split_results
            .into_iter()
            .filter(|r| matches!(r, PutResult::Completed(_)))
            .collect();
        assert_eq!(completed_whole, completed_split);
    }

    #[test]
    fn stale_pos_in_idle_is_discarded() {
        let mut pkt = PacketBuffer::new(0, TFI_HOST_TO_CONTROLLER);
        // force pos != 0 while state is IDLE by direct manipulation is not
        // possible from outside; instead drive a prefix partway then force
        // a reset path through an oversize frame, exercising reset().
        pkt.put(0x00);
        pkt.put(0xFF); // now in FLOWCTRL with pos=3
        assert_eq!(pkt.state(), PacketState::FlowCtrl);
        pkt.reset();
        assert_eq!(pkt.pos(), 0);
        assert_eq!(pkt.state(), PacketState::Idle);
    }

    #[test]
    fn encode_frame_round_trips_through_put() {
        let payload = [0x4A, 0x01, 0x00];
        let mut out = [0u8; 16];
        let n = encode_frame(TFI_HOST_TO_CONTROLLER, &payload, &mut out);

        let mut pkt = PacketBuffer::new(0, TFI_HOST_TO_CONTROLLER);
        let results = feed(&mut pkt, &out[..n]);
        let completed: Vec<_> = results
            .into_iter()
            .filter(|r| matches!(r, PutResult::Completed(_)))
            .collect();
        // Completes one byte before `n`: the trailing 0x00 written by
        // `encode_frame` is the postamble, absorbed separately as stale
        // IDLE data rather than counted in the frame itself.
        assert_eq!(completed, vec![PutResult::Completed(n - 1)]);
        assert_eq!(&pkt.data[..n - 1], &out[..n - 1]);
    }
}

//! Bridge loop: shuttles PN532 frames between a USB-CDC host and the SPI+IRQ
//! controller link.
//!
//! Grounded on `libnfc.c`'s `loop_libnfc_rfid`. The original talks to SPI
//! and USB registers directly; here both sides are small traits so the
//! loop's logic runs against in-memory doubles in host tests, with
//! `esp-idf-svc`-backed implementations in `hal` supplying the real calls.

use crate::config::{RESET_PULSE_LOW, RESET_SETTLE_HIGH, WAKEUP_SETTLE_DELAY};
use crate::error::BadgeError;
use crate::packet::{PacketBuffer, PutResult, Signal, TFI_CONTROLLER_TO_HOST, TFI_HOST_TO_CONTROLLER};

pub trait HostTransport {
    /// Non-blocking: `None` if nothing is pending.
    fn try_read_byte(&mut self) -> Option<u8>;
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BadgeError>;
    fn flush(&mut self) -> Result<(), BadgeError>;
}

pub trait ControllerTransport {
    fn irq_asserted(&mut self) -> bool;
    fn spi_write(&mut self, bytes: &[u8]) -> Result<(), BadgeError>;
    fn spi_read_byte(&mut self) -> Result<u8, BadgeError>;
    /// Pulses the controller's reset line: low for `RESET_PULSE_LOW`, then
    /// high and settled for `RESET_SETTLE_HIGH`.
    fn pulse_reset(&mut self);
}

/// One iteration's worth of read-then-write, repeated while `still_bridge`
/// holds. Partial frames persist in `get`/`put` across iterations.
pub fn run_bridge(
    controller: &mut impl ControllerTransport,
    host: &mut impl HostTransport,
    mut still_bridge: impl FnMut() -> bool,
) {
    let mut get = PacketBuffer::new(0, TFI_CONTROLLER_TO_HOST);
    let mut put = PacketBuffer::new(1, TFI_HOST_TO_CONTROLLER);

    while still_bridge() {
        if controller.irq_asserted() && controller.spi_write(&[0x03]).is_ok() {
            while controller.irq_asserted() {
                let byte = match controller.spi_read_byte() {
                    Ok(b) => b,
                    Err(_) => break,
                };
                if let PutResult::Completed(len) = get.put(byte) {
                    get.data[len] = 0x00;
                    let frame = &get.data[..len + 1];
                    if host.write_all(frame).is_ok() {
                        let _ = host.flush();
                    }
                }
            }
        }

        while let Some(byte) = host.try_read_byte() {
            match put.put(byte) {
                PutResult::Completed(len) => {
                    put.data[0] = 0x01;
                    put.data[len] = 0x00;
                    let _ = controller.spi_write(&put.data[..len + 1]);
                    break;
                }
                PutResult::Signal(Signal::Wakeup) => {
                    controller.pulse_reset();
                    std::thread::sleep(WAKEUP_SETTLE_DELAY);
                    break;
                }
                PutResult::Signal(Signal::FifoFlush) => {
                    let mut flush = [0u8; 65];
                    flush[0] = 0x01;
                    let _ = controller.spi_write(&flush);
                }
                PutResult::Progressed => {}
            }
        }
    }
}

/// Shared sleep sequence a `ControllerTransport::pulse_reset` implementation
/// should follow: held here so every implementation (and the host-test
/// fake) uses the same timing constants instead of re-deriving them.
pub fn reset_pulse_delays() -> (std::time::Duration, std::time::Duration) {
    (RESET_PULSE_LOW, RESET_SETTLE_HIGH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct FakeHost {
        inbound: VecDeque<u8>,
        outbound: Vec<Vec<u8>>,
    }

    impl HostTransport for FakeHost {
        fn try_read_byte(&mut self) -> Option<u8> {
            self.inbound.pop_front()
        }
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), BadgeError> {
            self.outbound.push(bytes.to_vec());
            Ok(())
        }
        fn flush(&mut self) -> Result<(), BadgeError> {
            Ok(())
        }
    }

    struct FakeController {
        irq_bytes: VecDeque<u8>,
        spi_writes: Vec<Vec<u8>>,
        reset_pulses: usize,
    }

    impl ControllerTransport for FakeController {
        fn irq_asserted(&mut self) -> bool {
            !self.irq_bytes.is_empty()
        }
        fn spi_write(&mut self, bytes: &[u8]) -> Result<(), BadgeError> {
            self.spi_writes.push(bytes.to_vec());
            Ok(())
        }
        fn spi_read_byte(&mut self) -> Result<u8, BadgeError> {
            self.irq_bytes
                .pop_front()
                .ok_or(BadgeError::Transceive(crate::transceiver::TransceiveError::Timeout))
        }
        fn pulse_reset(&mut self) {
            self.reset_pulses += 1;
        }
    }

    #[test]
    fn controller_ack_frame_is_forwarded_to_host_with_trailing_zero() {
        let mut controller = FakeController {
            irq_bytes: VecDeque::from(vec![0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00]),
            spi_writes: Vec::new(),
            reset_pulses: 0,
        };
        let mut host = FakeHost {
            inbound: VecDeque::new(),
            outbound: Vec::new(),
        };

        let mut ticks = 0;
        run_bridge(&mut controller, &mut host, || {
            ticks += 1;
            ticks <= 1
        });

        assert_eq!(
            host.outbound,
            vec![vec![0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0x00]]
        );
    }

    #[test]
    fn host_frame_is_forwarded_to_controller_with_write_prefix() {
        let mut controller = FakeController {
            irq_bytes: VecDeque::new(),
            spi_writes: Vec::new(),
            reset_pulses: 0,
        };
        let frame = [0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00];
        let mut host = FakeHost {
            inbound: VecDeque::from(frame.to_vec()),
            outbound: Vec::new(),
        };

        let mut ticks = 0;
        run_bridge(&mut controller, &mut host, || {
            ticks += 1;
            ticks <= 1
        });

        assert_eq!(
            controller.spi_writes,
            vec![vec![0x01, 0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00]]
        );
    }

    #[test]
    fn hsu_wakeup_from_host_pulses_controller_reset() {
        let mut controller = FakeController {
            irq_bytes: VecDeque::new(),
            spi_writes: Vec::new(),
            reset_pulses: 0,
        };
        let mut host = FakeHost {
            inbound: VecDeque::from(vec![0x55, 0x55, 0x00, 0x00, 0x00]),
            outbound: Vec::new(),
        };

        let mut ticks = 0;
        run_bridge(&mut controller, &mut host, || {
            ticks += 1;
            ticks <= 1
        });

        assert_eq!(controller.reset_pulses, 1);
    }
}

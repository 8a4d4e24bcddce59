//! ESP32 peripheral wiring for the badge.
//!
//! The PN532 sits behind the same SPI + IRQ + RESET trio the original
//! LPC13xx firmware wired it to (`arc.c`'s `rfid_execute`, `irq.c`'s GPIO
//! reads); the host side is the board's USB-CDC-ACM console instead of the
//! original's discrete USB chip. Button and LED pins are this board's own
//! assignment — the original ran on different silicon entirely.
//!
//! ```text
//!                ESP32
//!          ┌───────────────┐
//!  SCK  ───┤ IO12          │
//!  MOSI ───┤ IO11   PN532  │
//!  MISO ───┤ IO13   (SPI)  │
//!  CS   ───┤ IO10          │
//!  IRQ  ───┤ IO9           │
//!  RST  ───┤ IO8           │
//!          │               │
//!  MENU ───┤ IO4  (btn)    │
//!  OK   ───┤ IO5  (btn)    │
//!  PROF ───┤ IO6  (btn)    │
//!  LED_RD──┤ IO15          │
//!  LED_WR──┤ IO16          │
//!          └───────────────┘
//! ```

use esp_idf_svc::hal::gpio::*;
use esp_idf_svc::hal::spi::{SpiDeviceDriver, SpiDriver, SPI2};
use esp_idf_svc::hal::units::FromValueType;
use esp_idf_svc::sys::EspError;

use crate::bridge::ControllerTransport;
use crate::error::BadgeError;
use crate::packet::{PacketBuffer, PutResult, MAX_PACKET_SIZE, TFI_CONTROLLER_TO_HOST, TFI_HOST_TO_CONTROLLER};
use crate::transceiver::{opcode, TransceiveError, Transceiver};
use crate::ui::LedPair;

/// SPI + IRQ + RESET wiring to the PN532, shared by the bridge passthrough
/// and the direct transceiver used by the clone engine.
pub struct Pn532Link<'d> {
    spi: SpiDeviceDriver<'d, SpiDriver<'d>>,
    irq: PinDriver<'d, Gpio9, Input>,
    reset: PinDriver<'d, Gpio8, Output>,
}

impl<'d> Pn532Link<'d> {
    pub fn new(
        spi2: SPI2,
        sck: Gpio12,
        mosi: Gpio11,
        miso: Gpio13,
        cs: Gpio10,
        irq: Gpio9,
        reset: Gpio8,
    ) -> Result<Self, EspError> {
        let driver = SpiDriver::new(
            spi2,
            sck,
            mosi,
            Some(miso),
            &esp_idf_svc::hal::spi::config::DriverConfig::new(),
        )?;
        let spi = SpiDeviceDriver::new(
            driver,
            Some(cs),
            &esp_idf_svc::hal::spi::config::Config::new().baudrate(1.MHz().into()),
        )?;

        let mut irq = PinDriver::input(irq)?;
        irq.set_pull(Pull::Up)?;

        let mut reset = PinDriver::output(reset)?;
        reset.set_high()?;

        Ok(Pn532Link { spi, irq, reset })
    }
}

impl<'d> ControllerTransport for Pn532Link<'d> {
    fn irq_asserted(&mut self) -> bool {
        self.irq.is_low()
    }

    fn spi_write(&mut self, bytes: &[u8]) -> Result<(), BadgeError> {
        self.spi
            .write(bytes)
            .map_err(|e| BadgeError::Transceive(TransceiveError::Bus(e.to_string())))
    }

    fn spi_read_byte(&mut self) -> Result<u8, BadgeError> {
        let mut buf = [0u8; 1];
        self.spi
            .read(&mut buf)
            .map_err(|e| BadgeError::Transceive(TransceiveError::Bus(e.to_string())))?;
        Ok(buf[0])
    }

    fn pulse_reset(&mut self) {
        let (low, high) = crate::bridge::reset_pulse_delays();
        let _ = self.reset.set_low();
        std::thread::sleep(low);
        let _ = self.reset.set_high();
        std::thread::sleep(high);
    }
}

/// Frames a command through `Pn532Link`'s raw SPI/IRQ wiring and blocks
/// until the controller's ACK and response frames both land, unwrapping the
/// response's data payload into `buf`. Stands in for the original's
/// `rfid_execute`, whose own SPI/IRQ polling sat in a file this board's
/// equivalent doesn't keep (`rfid.c` isn't part of this firmware's kept
/// sources) — this rebuilds the same two-frame handshake on top of
/// `packet::PacketBuffer` instead.
pub struct DirectTransceiver<'d> {
    link: Pn532Link<'d>,
}

impl<'d> DirectTransceiver<'d> {
    pub fn new(link: Pn532Link<'d>) -> Self {
        DirectTransceiver { link }
    }

    /// Recovers the underlying link so the worker loop can hand it back to
    /// bridge mode (`ControllerTransport`) after a clone pass.
    pub fn into_link(self) -> Pn532Link<'d> {
        self.link
    }

    fn read_frame(&mut self, pkt: &mut PacketBuffer) -> Result<usize, TransceiveError> {
        loop {
            if !self.link.irq.is_low() {
                std::thread::sleep(std::time::Duration::from_micros(100));
                continue;
            }
            self.link
                .spi
                .write(&[0x03])
                .map_err(|e| TransceiveError::Bus(e.to_string()))?;
            while self.link.irq.is_low() {
                let mut byte = [0u8; 1];
                self.link
                    .spi
                    .read(&mut byte)
                    .map_err(|e| TransceiveError::Bus(e.to_string()))?;
                if let PutResult::Completed(len) = pkt.put(byte[0]) {
                    return Ok(len);
                }
            }
        }
    }
}

impl<'d> Transceiver for DirectTransceiver<'d> {
    fn execute(&mut self, buf: &mut [u8], tx_len: usize) -> Result<usize, TransceiveError> {
        let mut frame = [0u8; MAX_PACKET_SIZE];
        frame[0] = 0x01; // SPI data-write prefix
        let n = crate::packet::encode_frame(TFI_HOST_TO_CONTROLLER, &buf[..tx_len], &mut frame[1..]);

        self.link
            .spi
            .write(&frame[..1 + n])
            .map_err(|e| TransceiveError::Bus(e.to_string()))?;

        let mut ack = PacketBuffer::new(0, TFI_CONTROLLER_TO_HOST);
        let _ = self.read_frame(&mut ack)?;

        let mut resp = PacketBuffer::new(0, TFI_CONTROLLER_TO_HOST);
        let len = self.read_frame(&mut resp)?;
        let payload = &resp.data[6..len - 1];
        buf[..payload.len()].copy_from_slice(payload);
        Ok(payload.len())
    }

    fn turn_rf_off(&mut self) -> Result<(), TransceiveError> {
        std::thread::sleep(crate::config::CLONE_RETRY_DELAY);
        let mut scratch = [opcode::RF_CONFIGURATION, 0x01, 0x00];
        self.execute(&mut scratch, 3).map(|_| ())
    }
}

/// Two LEDs, active-high.
pub struct BoardLeds<'d> {
    read: PinDriver<'d, Gpio15, Output>,
    write: PinDriver<'d, Gpio16, Output>,
}

impl<'d> BoardLeds<'d> {
    pub fn new(read: Gpio15, write: Gpio16) -> Result<Self, EspError> {
        Ok(BoardLeds {
            read: PinDriver::output(read)?,
            write: PinDriver::output(write)?,
        })
    }
}

impl<'d> LedPair for BoardLeds<'d> {
    fn set(&mut self, read_led: bool, write_led: bool) {
        let _ = self.read.set_level(read_led.into());
        let _ = self.write.set_level(write_led.into());
    }
}

/// USB-CDC host link. ESP-IDF's CDC-ACM console is blocking, so a dedicated
/// reader thread feeds bytes into a channel the bridge loop drains
/// non-blockingly — the same "OS thread does the blocking I/O, a channel
/// carries bytes to a cooperative consumer" split the teacher uses for its
/// own button and audio workers (`boards/base.rs::start_btn_worker`).
pub struct UsbHost {
    rx: std::sync::mpsc::Receiver<u8>,
    out: std::io::Stdout,
}

impl UsbHost {
    pub fn spawn() -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::Builder::new()
            .stack_size(4 * 1024)
            .spawn(move || {
                use std::io::Read;
                let mut stdin = std::io::stdin();
                let mut byte = [0u8; 1];
                loop {
                    match stdin.read(&mut byte) {
                        Ok(1) => {
                            if tx.send(byte[0]).is_err() {
                                return;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            log::warn!("usb host read error: {e:?}");
                            return;
                        }
                    }
                }
            })
            .expect("failed to spawn USB host reader thread");

        UsbHost {
            rx,
            out: std::io::stdout(),
        }
    }
}

impl crate::bridge::HostTransport for UsbHost {
    fn try_read_byte(&mut self) -> Option<u8> {
        self.rx.try_recv().ok()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BadgeError> {
        use std::io::Write;
        self.out
            .write_all(bytes)
            .map_err(|e| BadgeError::Transceive(TransceiveError::Bus(e.to_string())))
    }

    fn flush(&mut self) -> Result<(), BadgeError> {
        use std::io::Write;
        self.out
            .flush()
            .map_err(|e| BadgeError::Transceive(TransceiveError::Bus(e.to_string())))
    }
}

/// Button GPIOs, wired the same "pulled-up input, falling/pos edge IRQ"
/// way as `boards/base.rs::start_btn_worker`, but async-driven here since
/// the mode supervisor is the only consumer.
pub struct Buttons<'d> {
    pub menu: PinDriver<'d, Gpio4, Input>,
    pub ok: PinDriver<'d, Gpio5, Input>,
    pub profile: PinDriver<'d, Gpio6, Input>,
}

impl<'d> Buttons<'d> {
    pub fn new(menu: Gpio4, ok: Gpio5, profile: Gpio6) -> Result<Self, EspError> {
        let mut menu = PinDriver::input(menu)?;
        menu.set_pull(Pull::Up)?;
        menu.set_interrupt_type(InterruptType::PosEdge)?;

        let mut ok = PinDriver::input(ok)?;
        ok.set_pull(Pull::Up)?;
        ok.set_interrupt_type(InterruptType::PosEdge)?;

        let mut profile = PinDriver::input(profile)?;
        profile.set_pull(Pull::Up)?;
        profile.set_interrupt_type(InterruptType::PosEdge)?;

        Ok(Buttons { menu, ok, profile })
    }

    /// Spawns the button-watcher task, forwarding presses as `ModeEvent`s
    /// into the supervisor — the `wait_for_*_edge` + `tokio::select!` shape
    /// of `start_btn_worker`, generalized from two buttons to three.
    pub fn spawn_worker(
        mut self,
        rt: &tokio::runtime::Runtime,
        supervisor: std::sync::Arc<crate::mode::ModeSupervisor>,
    ) -> tokio::task::JoinHandle<()> {
        rt.spawn(async move {
            loop {
                tokio::select! {
                    _ = self.menu.wait_for_falling_edge() => {
                        log::info!("Menu button pressed");
                        supervisor.apply(crate::mode::ModeEvent::Menu);
                    }
                    _ = self.ok.wait_for_falling_edge() => {
                        log::info!("OK button pressed");
                        supervisor.apply(crate::mode::ModeEvent::Ok);
                    }
                    _ = self.profile.wait_for_falling_edge() => {
                        log::info!("Profile button pressed");
                        supervisor.apply(crate::mode::ModeEvent::Profile);
                    }
                }
            }
        })
    }
}

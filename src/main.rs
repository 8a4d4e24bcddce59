use std::sync::Arc;

use esp_idf_svc::hal::prelude::Peripherals;

mod bridge;
mod card;
mod clone;
mod config;
mod error;
mod hal;
mod keys;
mod mode;
mod packet;
mod transceiver;
mod ui;

use crate::keys::KeyDictionary;
use crate::mode::{MainMenu, ModeSupervisor, SubMode};

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    let peripherals = Peripherals::take()?;
    log_heap();

    let link = hal::Pn532Link::new(
        peripherals.spi2,
        peripherals.pins.gpio12,
        peripherals.pins.gpio11,
        peripherals.pins.gpio13,
        peripherals.pins.gpio10,
        peripherals.pins.gpio9,
        peripherals.pins.gpio8,
    )?;
    let leds = hal::BoardLeds::new(peripherals.pins.gpio15, peripherals.pins.gpio16)?;
    let buttons = hal::Buttons::new(
        peripherals.pins.gpio4,
        peripherals.pins.gpio5,
        peripherals.pins.gpio6,
    )?;

    let (supervisor, watch_rx) = ModeSupervisor::new();
    let supervisor = Arc::new(supervisor);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let _btn_task = buttons.spawn_worker(&rt, supervisor.clone());
    let _ui_task = rt.spawn(ui::run_ticker(watch_rx, leds));

    let worker_supervisor = supervisor.clone();
    std::thread::Builder::new()
        .stack_size(config::WORKER_STACK_SIZE)
        .spawn(move || rfid_worker(link, worker_supervisor))
        .map_err(|e| anyhow::anyhow!("failed to spawn RFID worker thread: {:?}", e))?;

    rt.block_on(std::future::pending::<()>());
    Ok(())
}

/// Owns the PN532 link for the lifetime of the process, alternating it
/// between bridge passthrough and the direct clone engine as the mode
/// supervisor's state changes. Runs on its own OS thread since both
/// `bridge::run_bridge` and `clone::run_pass` block on SPI transfers.
fn rfid_worker(link: hal::Pn532Link<'static>, supervisor: Arc<ModeSupervisor>) -> ! {
    let mut link = Some(link);
    let mut host = hal::UsbHost::spawn();
    let mut image = card::CardImage::new();
    let dict = KeyDictionary;

    loop {
        if supervisor.take_dump_request() {
            ui::dump_card(&image);
        }

        let state = supervisor.current();
        match state.main_menu {
            MainMenu::Bridge => {
                let mut controller = link.take().expect("link owned by worker");
                bridge::run_bridge(&mut controller, &mut host, || {
                    supervisor.current().main_menu == MainMenu::Bridge
                });
                link = Some(controller);
            }
            MainMenu::Clone => {
                let controller = link.take().expect("link owned by worker");
                let mut xcvr = hal::DirectTransceiver::new(controller);
                let done = clone::run_pass(&mut image, state.submode, &dict, &mut xcvr, || {
                    supervisor.current().main_menu == MainMenu::Clone
                });
                link = Some(xcvr.into_link());

                if state.submode == SubMode::Read {
                    supervisor.set_done(done);
                    if done {
                        ui::dump_card(&image);
                    }
                }
            }
        }
    }
}

pub fn log_heap() {
    unsafe {
        use esp_idf_svc::sys::{heap_caps_get_free_size, MALLOC_CAP_INTERNAL, MALLOC_CAP_SPIRAM};

        log::info!(
            "Free SPIRAM heap size: {}KB",
            heap_caps_get_free_size(MALLOC_CAP_SPIRAM) / 1024
        );
        log::info!(
            "Free INTERNAL heap size: {}KB",
            heap_caps_get_free_size(MALLOC_CAP_INTERNAL) / 1024
        );
    }
}

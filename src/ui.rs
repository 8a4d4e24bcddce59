//! UI feedback: a 10 Hz clock/LED tick plus the card-image dump.
//!
//! Grounded on `irq.c`'s `SysTick_Handler` (the `(main_menu, mode)` → LED
//! pair mapping, clock accumulation) and `arc.c`'s `dump_mifare_card`.
//! Restructured here onto a `tokio::time::interval` task, the shape the
//! teacher uses for its own periodic worker tasks.

use crate::card::CardImage;
use crate::mode::{MainMenu, ModeState, SubMode};

/// Two LED outputs, abstracted so the tick logic is testable without GPIO.
pub trait LedPair {
    fn set(&mut self, read_led: bool, write_led: bool);
}

/// One LED-selection decision for a given mode state, grounded exactly on
/// `SysTick_Handler`'s three-way branch.
pub fn led_state_for(state: ModeState) -> (bool, bool) {
    match (state.main_menu, state.submode) {
        (MainMenu::Clone, SubMode::Write) => (false, true),
        (MainMenu::Clone, SubMode::Read) => (true, false),
        (MainMenu::Bridge, _) => (true, true),
    }
}

/// Runs the 100 ms tick forever, driving `leds` from `mode` and logging a
/// `Clk HH:MM:SS` line once a second, standing in for the original's
/// `SysTick_Handler` accumulating to `clock_1s` every 100th tick.
pub async fn run_ticker(mode: tokio::sync::watch::Receiver<ModeState>, mut leds: impl LedPair) -> ! {
    let mut interval = tokio::time::interval(crate::config::UI_TICK_PERIOD);
    let mut seconds: u64 = 0;
    let mut ticks: u8 = 0;
    loop {
        interval.tick().await;
        let state = *mode.borrow();
        let (read_led, write_led) = led_state_for(state);
        leds.set(read_led, write_led);

        ticks += 1;
        if ticks >= 10 {
            ticks = 0;
            seconds += 1;
            log::info!(
                "Clk {:02}:{:02}:{:02}",
                seconds / 3600,
                (seconds / 60) % 60,
                seconds % 60
            );
        }
    }
}

/// Logs block number, the `readable` flag, and a 16-byte hex row per block.
pub fn dump_card(image: &CardImage) {
    for block in 0..crate::card::BLOCKS {
        log::info!(
            "Block {:2} readable={} {:02x?}",
            block,
            image.readable[block],
            image.block(block)
        );
    }
}

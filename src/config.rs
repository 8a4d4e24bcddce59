//! Compile-time tunables.
//!
//! No persistence layer: §1's Non-goals exclude state surviving a power
//! cycle, so these are `const`s rather than NVS-backed values (contrast
//! the teacher's `Setting::load_from_nvs`, which this firmware has no
//! counterpart to).

use std::time::Duration;

/// Delay between successive clone-engine attempts against the same block.
pub const CLONE_RETRY_DELAY: Duration = Duration::from_millis(5);
/// Delay after observing an HSU wakeup hint, before resuming the USB drain.
pub const WAKEUP_SETTLE_DELAY: Duration = Duration::from_millis(50);
/// Controller reset pulse: held low this long, then released.
pub const RESET_PULSE_LOW: Duration = Duration::from_millis(100);
/// Settle time after releasing the controller reset line.
pub const RESET_SETTLE_HIGH: Duration = Duration::from_millis(400);
/// UI feedback tick period (stands in for the original's SysTick/100).
pub const UI_TICK_PERIOD: Duration = Duration::from_millis(100);

/// Stack size for the dedicated bridge/clone worker thread, matching the
/// teacher's convention of sizing long-running OS threads explicitly
/// (`boards::base::AUDIO_STACK_SIZE`).
pub const WORKER_STACK_SIZE: usize = 8 * 1024;

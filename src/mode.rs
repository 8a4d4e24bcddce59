//! Mode supervisor: owns `(main_menu, submode, done)` behind a mutex plus a
//! `watch` channel for change notification.
//!
//! The original firmware kept these as process-wide globals mutated
//! directly from button ISRs (`irq.c`'s `WAKEUP_IRQHandlerPIO*`,
//! `main.c`'s `main_menu`/`submenu`/`status`). Here a single supervisor
//! task owns the only write access, fed by one `mpsc` channel that three
//! button ISRs push onto — the same "ISR does the least possible work, a
//! channel carries the rest to a cooperative consumer" split the teacher
//! uses for its own button handling (`boards/base.rs::start_btn_worker`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainMenu {
    Bridge,
    Clone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubMode {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeEvent {
    Menu,
    Ok,
    Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeState {
    pub main_menu: MainMenu,
    pub submode: SubMode,
    pub done: bool,
}

impl Default for ModeState {
    fn default() -> Self {
        ModeState {
            main_menu: MainMenu::Bridge,
            submode: SubMode::Read,
            done: false,
        }
    }
}

/// Single writer (the supervisor task, in response to `ModeEvent`s and CLN
/// completions), many readers (the bridge and clone loops).
pub struct ModeSupervisor {
    state: Arc<Mutex<ModeState>>,
    watch_tx: tokio::sync::watch::Sender<ModeState>,
    /// Set by a Profile button press, cleared by the worker once it has
    /// dumped the current card image. §4.6: Profile prints the image with
    /// the mode state unchanged, so this is tracked out-of-band from
    /// `ModeState` rather than as a field the watch channel broadcasts.
    dump_requested: AtomicBool,
}

impl ModeSupervisor {
    pub fn new() -> (Self, tokio::sync::watch::Receiver<ModeState>) {
        let initial = ModeState::default();
        let (watch_tx, watch_rx) = tokio::sync::watch::channel(initial);
        (
            ModeSupervisor {
                state: Arc::new(Mutex::new(initial)),
                watch_tx,
                dump_requested: AtomicBool::new(false),
            },
            watch_rx,
        )
    }

    pub fn current(&self) -> ModeState {
        *self.state.lock().unwrap()
    }

    /// Applies §4.7's transition table for one button event.
    pub fn apply(&self, event: ModeEvent) -> ModeState {
        let mut guard = self.state.lock().unwrap();
        match event {
            ModeEvent::Menu => {
                guard.main_menu = MainMenu::Clone;
                guard.submode = SubMode::Read;
                guard.done = false;
            }
            ModeEvent::Ok => {
                if guard.main_menu == MainMenu::Clone
                    && guard.submode == SubMode::Read
                    && guard.done
                {
                    guard.submode = SubMode::Write;
                } else {
                    guard.main_menu = MainMenu::Bridge;
                }
            }
            ModeEvent::Profile => {
                self.dump_requested.store(true, Ordering::SeqCst);
            }
        }
        let new_state = *guard;
        drop(guard);
        let _ = self.watch_tx.send(new_state);
        new_state
    }

    /// Called by CLN on completion of a full read pass.
    pub fn set_done(&self, done: bool) {
        let mut guard = self.state.lock().unwrap();
        guard.done = done;
        let new_state = *guard;
        drop(guard);
        let _ = self.watch_tx.send(new_state);
    }

    /// Takes and clears a pending Profile-button dump request. The rfid
    /// worker polls this so the image dump happens on the thread that owns
    /// `CardImage`, rather than the button ISR task reaching across threads.
    pub fn take_dump_request(&self) -> bool {
        self.dump_requested.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_always_enters_clone_read() {
        let (sup, _rx) = ModeSupervisor::new();
        sup.apply(ModeEvent::Ok); // no-op transition from default
        let state = sup.apply(ModeEvent::Menu);
        assert_eq!(state.main_menu, MainMenu::Clone);
        assert_eq!(state.submode, SubMode::Read);
    }

    #[test]
    fn ok_enters_write_only_when_read_pass_done() {
        let (sup, _rx) = ModeSupervisor::new();
        sup.apply(ModeEvent::Menu);
        sup.set_done(true);
        let state = sup.apply(ModeEvent::Ok);
        assert_eq!(state.submode, SubMode::Write);
        assert_eq!(state.main_menu, MainMenu::Clone);
    }

    #[test]
    fn ok_falls_back_to_bridge_when_read_pass_not_done() {
        let (sup, _rx) = ModeSupervisor::new();
        sup.apply(ModeEvent::Menu);
        let state = sup.apply(ModeEvent::Ok);
        assert_eq!(state.main_menu, MainMenu::Bridge);
    }

    #[test]
    fn profile_leaves_state_unchanged() {
        let (sup, _rx) = ModeSupervisor::new();
        sup.apply(ModeEvent::Menu);
        let before = sup.current();
        let after = sup.apply(ModeEvent::Profile);
        assert_eq!(before, after);
    }

    #[test]
    fn profile_sets_a_dump_request_the_worker_can_take_once() {
        let (sup, _rx) = ModeSupervisor::new();
        assert!(!sup.take_dump_request());
        sup.apply(ModeEvent::Profile);
        assert!(sup.take_dump_request());
        assert!(!sup.take_dump_request());
    }

    #[test]
    fn watch_channel_observes_transitions() {
        let (sup, rx) = ModeSupervisor::new();
        sup.apply(ModeEvent::Menu);
        assert_eq!(rx.borrow().main_menu, MainMenu::Clone);
    }
}

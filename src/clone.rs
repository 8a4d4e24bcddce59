//! CLN — the clone engine.
//!
//! Grounded on `arc.c`'s `loop_clone_rfid`: acquire a target, rotate the
//! key dictionary against the current block, read or write 16 bytes on a
//! successful authentication, advance. Two bugs in that original are fixed
//! here (see `DESIGN.md`): dictionary exhaustion is now gated on a card
//! still being present, and an exhausted block is marked `unreadable`
//! instead of silently staying zero-filled and indistinguishable from a
//! genuine all-zero card block.

use crate::card::CardImage;
use crate::config::CLONE_RETRY_DELAY;
use crate::error::BadgeError;
use crate::keys::{fabricate_trailer, KeyDictionary};
use crate::mode::SubMode;
use crate::transceiver::{mifare_cmd, opcode, Transceiver};

const SCRATCH_SIZE: usize = 80;

fn sam_configuration(xcvr: &mut impl Transceiver, scratch: &mut [u8]) -> Result<usize, crate::error::BadgeError> {
    scratch[0] = opcode::SAM_CONFIGURATION;
    scratch[1] = 0x01; // normal mode
    Ok(xcvr.execute(scratch, 2)?)
}

fn in_list_passive_target(
    xcvr: &mut impl Transceiver,
    scratch: &mut [u8],
) -> Result<usize, crate::error::BadgeError> {
    scratch[0] = opcode::IN_LIST_PASSIVE_TARGET;
    scratch[1] = 0x01; // MaxTg
    scratch[2] = 0x00; // BrTy: 106 kbps type A
    Ok(xcvr.execute(scratch, 3)?)
}

fn card_present(response: &[u8], len: usize) -> bool {
    len >= 11 && response[4] != 0x00
}

fn extract_uid(response: &[u8]) -> [u8; 4] {
    response[7..11].try_into().expect("checked len >= 11")
}

fn authenticate(
    xcvr: &mut impl Transceiver,
    scratch: &mut [u8],
    block: usize,
    key: [u8; 6],
    uid: [u8; 4],
) -> Result<usize, crate::error::BadgeError> {
    scratch[0] = opcode::IN_DATA_EXCHANGE;
    scratch[1] = 0x01; // target 1
    scratch[2] = mifare_cmd::AUTH_WITH_KEY_A;
    scratch[3] = block as u8;
    scratch[4..10].copy_from_slice(&key);
    scratch[10..14].copy_from_slice(&uid);
    Ok(xcvr.execute(scratch, 14)?)
}

fn read_block(
    xcvr: &mut impl Transceiver,
    scratch: &mut [u8],
    block: usize,
) -> Result<usize, crate::error::BadgeError> {
    scratch[0] = opcode::IN_DATA_EXCHANGE;
    scratch[1] = 0x01;
    scratch[2] = mifare_cmd::READ_16;
    scratch[3] = block as u8;
    Ok(xcvr.execute(scratch, 4)?)
}

fn write_block(
    xcvr: &mut impl Transceiver,
    scratch: &mut [u8],
    block: usize,
    bytes: &[u8; 16],
) -> Result<usize, crate::error::BadgeError> {
    scratch[0] = opcode::IN_DATA_EXCHANGE;
    scratch[1] = 0x01;
    scratch[2] = mifare_cmd::WRITE_16;
    scratch[3] = block as u8;
    scratch[4..20].copy_from_slice(bytes);
    Ok(xcvr.execute(scratch, 20)?)
}

/// Runs one clone pass over the whole 64-block image. `still_active` is
/// polled at the top of every iteration so the pass yields cooperatively to
/// a mode change; returns `image.all_readable()` at the point the loop
/// exits (whether by completion or early exit).
pub fn run_pass(
    image: &mut CardImage,
    submode: SubMode,
    dict: &KeyDictionary,
    xcvr: &mut impl Transceiver,
    mut still_active: impl FnMut() -> bool,
) -> bool {
    let mut scratch = [0u8; SCRATCH_SIZE];
    let mut block = 0usize;
    let mut key_index = 0usize;
    let mut tries = 0usize;
    let mut done = false;

    while block < crate::card::BLOCKS && still_active() {
        if sam_configuration(xcvr, &mut scratch).is_err() {
            let _ = xcvr.turn_rf_off();
            std::thread::sleep(CLONE_RETRY_DELAY);
            continue;
        }

        let target_res = match in_list_passive_target(xcvr, &mut scratch) {
            Ok(n) => n,
            Err(_) => {
                let _ = xcvr.turn_rf_off();
                std::thread::sleep(CLONE_RETRY_DELAY);
                continue;
            }
        };

        if !card_present(&scratch, target_res) {
            log::debug!("CLN: {}", BadgeError::NoCard);
            let _ = xcvr.turn_rf_off();
            std::thread::sleep(CLONE_RETRY_DELAY);
            continue;
        }

        if tries >= dict.len() {
            log::warn!("CLN: block {block} unreadable, dictionary exhausted against a present card");
            image.readable[block] = false;
            block += 1;
            tries = 0;
            let _ = xcvr.turn_rf_off();
            std::thread::sleep(CLONE_RETRY_DELAY);
            continue;
        }

        let uid = extract_uid(&scratch);
        if block == 0 {
            log::info!("CLN: card UID {uid:02x?}");
        }

        let key = dict.get(key_index);
        match authenticate(xcvr, &mut scratch, block, key, uid) {
            Ok(_) if scratch[0] == 0x41 && scratch[1] == 0x00 => {
                tries = 0;
                match submode {
                    SubMode::Read => {
                        if let Ok(n) = read_block(xcvr, &mut scratch, block) {
                            if n == 18 {
                                let bytes: [u8; 16] = scratch[2..18].try_into().unwrap();
                                image.set_block(block, &bytes);
                                image.readable[block] = true;
                                if CardImage::is_trailer(block) {
                                    image.set_block(block, &fabricate_trailer(key));
                                }
                            }
                        }
                    }
                    SubMode::Write => {
                        let bytes: [u8; 16] = *image.block(block);
                        let _ = write_block(xcvr, &mut scratch, block, &bytes);
                    }
                }
                if block == crate::card::BLOCKS - 1 {
                    done = image.all_readable();
                }
                block += 1;
            }
            Ok(_) if scratch[0] == 0x41 && scratch[1] == 0x14 => {
                log::debug!("CLN: {}", BadgeError::AuthFailed);
                key_index = dict.next(key_index);
                tries += 1;
            }
            _ => {
                // transport error or unrecognised response: retry this block
                // with the same key, no bookkeeping change.
            }
        }

        let _ = xcvr.turn_rf_off();
        std::thread::sleep(CLONE_RETRY_DELAY);
    }

    done
}

//! MIFARE Classic card image: 1024 bytes, 64 blocks, 16 sectors.
//!
//! Grounded on `arc.h`'s `MIFARE_CARD_SIZE`/`BLOCKS`/`BLOCK_SIZE`/`SECTORS`
//! constants and `arc.c`'s block/trailer indexing arithmetic
//! (`(block+1) % 4 == 0` picking out trailer blocks).

pub const BLOCK_SIZE: usize = 16;
pub const BLOCKS: usize = 64;
pub const SECTORS: usize = 16;
pub const CARD_SIZE: usize = BLOCK_SIZE * BLOCKS;

pub struct CardImage {
    data: [u8; CARD_SIZE],
    /// Per-block capture flag: `true` once a block has actually been read
    /// from a card, `false` while it is still a zero-filled placeholder
    /// (whether untouched or skipped after dictionary exhaustion).
    pub readable: [bool; BLOCKS],
}

impl CardImage {
    pub fn new() -> Self {
        CardImage {
            data: [0u8; CARD_SIZE],
            readable: [false; BLOCKS],
        }
    }

    pub fn is_trailer(block: usize) -> bool {
        (block + 1) % 4 == 0
    }

    pub fn block(&self, block: usize) -> &[u8; BLOCK_SIZE] {
        self.data[block * BLOCK_SIZE..(block + 1) * BLOCK_SIZE]
            .try_into()
            .expect("slice of BLOCK_SIZE")
    }

    pub fn set_block(&mut self, block: usize, bytes: &[u8; BLOCK_SIZE]) {
        self.data[block * BLOCK_SIZE..(block + 1) * BLOCK_SIZE].copy_from_slice(bytes);
    }

    /// `true` once every block has been captured from a real card (no
    /// unreadable blocks left). The clone engine latches `done` on this.
    pub fn all_readable(&self) -> bool {
        self.readable.iter().all(|&r| r)
    }
}

impl Default for CardImage {
    fn default() -> Self {
        Self::new()
    }
}

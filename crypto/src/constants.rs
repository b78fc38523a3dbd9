pub const BLOCK_SIZE256: usize = 32;
pub const NUM_ROUNDS256: usize = 72;
pub const NUM_WORDS256: usize = 4;
pub const TWEAK_SIZE: usize = 16;
pub const C240: u64 = 0x1bd11bdaa9fc1a22;


pub const KEY_WORDS_COUNT: usize = NUM_WORDS256 + 1;
pub const TWEAK_COUNT: usize = (TWEAK_SIZE / 8) + 1;
pub const ROUND_KEYS_COUNT: usize = (NUM_ROUNDS256 / 4) + 1;


pub const R4: [[u32; 2]; 8] = [
    [14, 16],
    [52, 57],
    [23, 40],
    [5,  37],
    [25, 33],
    [46, 12],
    [58, 22],
    [32, 32],
];

pub const PI4: [usize; NUM_WORDS256] = [0, 3, 2, 1];

// width of the embedded original length
pub const LENGTH_TRAILER: usize = 4;

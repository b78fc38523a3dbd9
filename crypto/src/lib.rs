mod mix;
mod utils;
mod constants;
pub mod secure;
pub mod threefish256;
pub mod cbc;

pub use constants::{BLOCK_SIZE256, TWEAK_SIZE};
pub use utils::{bytes_to_words, words_to_bytes};

use std::fmt;

/// Single-block primitive.
pub trait CipherBlock {
    fn encrypt(&self, src: &[u8], dst: &mut [u8]) -> Result<(), CipherError>;
    fn decrypt(&self, src: &[u8], dst: &mut [u8]) -> Result<(), CipherError>;
    fn get_block_size(&self) -> usize;
}

/// Message-level cipher with owned key and tweak.
pub trait BlockCipher {
    fn encrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, CipherError>;
    fn decrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, CipherError>;
    fn set_key(&mut self, key: &[u8]);
    fn set_tweak(&mut self, tweak: &[u8]) -> Result<(), CipherError>;
}

/// Element-wise XOR; the result is as long as the shorter input.
pub fn xor_arrays(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter()
        .zip(b.iter())
        .map(|(x1, x2)| x1 ^ x2)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Configuration,
    Resource,
    Corruption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherError {
    KeyNotSet,
    TweakNotSet,
    InvalidKeyLength,
    InvalidTweakLength,
    InvalidIVLength,
    InvalidPlaintextLength,
    PlaintextTooLong,
    AllocationFailed,
    RandomSourceFailed,
    InvalidCiphertextLength,
    CorruptLengthTrailer,
}

impl CipherError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CipherError::KeyNotSet
            | CipherError::TweakNotSet
            | CipherError::InvalidKeyLength
            | CipherError::InvalidTweakLength
            | CipherError::InvalidIVLength
            | CipherError::InvalidPlaintextLength
            | CipherError::PlaintextTooLong => FailureKind::Configuration,
            CipherError::AllocationFailed
            | CipherError::RandomSourceFailed => FailureKind::Resource,
            CipherError::InvalidCiphertextLength
            | CipherError::CorruptLengthTrailer => FailureKind::Corruption,
        }
    }
}

impl std::error::Error for CipherError {}

impl fmt::Display for CipherError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CipherError::KeyNotSet => write!(f, "key is not set"),
            CipherError::TweakNotSet => write!(f, "tweak is not set"),
            CipherError::InvalidKeyLength => write!(f, "key must be {} bytes", BLOCK_SIZE256),
            CipherError::InvalidTweakLength => write!(f, "tweak must be {} bytes", TWEAK_SIZE),
            CipherError::InvalidIVLength => write!(f, "initialization vector must match the block size"),
            CipherError::InvalidPlaintextLength => write!(f, "plaintext block has the wrong size"),
            CipherError::PlaintextTooLong => write!(f, "plaintext length does not fit the length trailer"),
            CipherError::AllocationFailed => write!(f, "allocation of cipher buffers failed"),
            CipherError::RandomSourceFailed => write!(f, "random source failed to produce an initialization vector"),
            CipherError::InvalidCiphertextLength => write!(f, "ciphertext is too short or misaligned"),
            CipherError::CorruptLengthTrailer => write!(f, "length trailer is out of range"),
        }
    }
}

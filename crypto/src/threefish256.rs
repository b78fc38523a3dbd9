use super::{constants::*, utils::*, mix::*, CipherError, CipherBlock, BlockCipher};
use super::cbc::CBCProcessor;
use super::secure::{Locked, SecretBytes};

use log::{debug, warn};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

pub type Block = [u64; NUM_WORDS256];

/// Extended key, extended tweak and the 19 subkey groups derived from them.
#[derive(Default, Zeroize)]
struct KeySchedule {
    k:  [u64; KEY_WORDS_COUNT],
    t:  [u64; TWEAK_COUNT],
    ks: [[u64; NUM_WORDS256]; ROUND_KEYS_COUNT],
}

impl KeySchedule {
    fn expand(key: &[u8], tweak: &[u8]) -> Result<Locked<KeySchedule>, CipherError> {
        if key.is_empty() {
            return Err(CipherError::KeyNotSet);
        }

        if tweak.is_empty() {
            return Err(CipherError::TweakNotSet);
        }

        if key.len() != BLOCK_SIZE256 {
            return Err(CipherError::InvalidKeyLength);
        }

        let mut locked: Locked<KeySchedule> = Locked::new()?;
        let s: &mut KeySchedule = &mut locked;

        s.t = calculate_tweak(tweak)?;

        bytes_to_words(&mut s.k[..NUM_WORDS256], key);
        s.k[NUM_WORDS256] = s.k[..NUM_WORDS256]
            .iter()
            .fold(C240, |acc, word| acc ^ word);

        for d in 0..ROUND_KEYS_COUNT {
            for i in 0..NUM_WORDS256 {
                let last_add = if i == NUM_WORDS256 - 3 {
                    s.t[d % 3]
                } else if i == NUM_WORDS256 - 2 {
                    s.t[(d + 1) % 3]
                } else if i == NUM_WORDS256 - 1 {
                    d as u64
                } else {
                    0
                };
                s.ks[d][i] = s.k[(d + i) % KEY_WORDS_COUNT].wrapping_add(last_add);
            }
        }

        Ok(locked)
    }
}

fn add_subkey(v: &mut Block, subkey: &Block) {
    v.iter_mut()
        .zip(subkey.iter())
        .for_each(|(x, k)| *x = x.wrapping_add(*k));
}

fn sub_subkey(v: &mut Block, subkey: &Block) {
    v.iter_mut()
        .zip(subkey.iter())
        .for_each(|(x, k)| *x = x.wrapping_sub(*k));
}

/// Runs the 72 Threefish-256 rounds over one 32-byte block.
pub fn encrypt_block(key: &[u8], tweak: &[u8], src: &[u8], dst: &mut [u8]) -> Result<(), CipherError> {
    let s = KeySchedule::expand(key, tweak)?;

    if src.len() != BLOCK_SIZE256 {
        return Err(CipherError::InvalidPlaintextLength);
    }

    if dst.len() < BLOCK_SIZE256 {
        return Err(CipherError::InvalidCiphertextLength);
    }

    let mut v: Zeroizing<Block> = Zeroizing::new([0; NUM_WORDS256]);
    let mut f: Zeroizing<Block> = Zeroizing::new([0; NUM_WORDS256]);

    bytes_to_words(&mut v[..], src);

    for d in 0..NUM_ROUNDS256 {
        if d % 4 == 0 {
            add_subkey(&mut v, &s.ks[d / 4]);
        }

        for j in 0..NUM_WORDS256 / 2 {
            let mix = Mix::new(d, j);
            (f[2 * j], f[2 * j + 1]) = mix.mix(v[2 * j], v[2 * j + 1]);
        }

        for i in 0..NUM_WORDS256 {
            v[i] = f[PI4[i]];
        }
    }

    add_subkey(&mut v, &s.ks[ROUND_KEYS_COUNT - 1]);
    words_to_bytes(&mut dst[..BLOCK_SIZE256], &v[..]);

    Ok(())
}

/// Inverse of [`encrypt_block`].
pub fn decrypt_block(key: &[u8], tweak: &[u8], src: &[u8], dst: &mut [u8]) -> Result<(), CipherError> {
    let s = KeySchedule::expand(key, tweak)?;

    if src.len() != BLOCK_SIZE256 {
        return Err(CipherError::InvalidCiphertextLength);
    }

    if dst.len() < BLOCK_SIZE256 {
        return Err(CipherError::InvalidPlaintextLength);
    }

    let mut v: Zeroizing<Block> = Zeroizing::new([0; NUM_WORDS256]);
    let mut f: Zeroizing<Block> = Zeroizing::new([0; NUM_WORDS256]);

    bytes_to_words(&mut v[..], src);

    // Subtract the final round key
    sub_subkey(&mut v, &s.ks[ROUND_KEYS_COUNT - 1]);

    for d in (0..NUM_ROUNDS256).rev() {
        // PI4 is its own inverse
        for i in 0..NUM_WORDS256 {
            f[i] = v[PI4[i]];
        }

        for j in 0..NUM_WORDS256 / 2 {
            let mix = Mix::new(d, j);
            (v[2 * j], v[2 * j + 1]) = mix.demix(f[2 * j], f[2 * j + 1]);
        }

        if d % 4 == 0 {
            sub_subkey(&mut v, &s.ks[d / 4]);
        }
    }

    words_to_bytes(&mut dst[..BLOCK_SIZE256], &v[..]);

    Ok(())
}


fn secret_key(key: &[u8]) -> SecretBytes {
    SecretBytes::new(key).unwrap_or_else(|e| {
        warn!("key not stored: {}", e);
        SecretBytes::empty()
    })
}

/// Threefish-256 with a CBC-style chaining mode and embedded length trailer.
///
/// The block length equals the key length. Only 32-byte keys can be used for
/// encryption; any other length makes every operation fail with
/// [`CipherError::InvalidKeyLength`].
#[derive(Debug)]
pub struct Threefish256 {
    key: SecretBytes,
    tweak: Option<[u8; TWEAK_SIZE]>,
}

impl Threefish256 {
    /// A key buffer that cannot be allocated leaves the cipher without a key.
    pub fn new(key: &[u8]) -> Threefish256 {
        Threefish256 {
            key: secret_key(key),
            tweak: None,
        }
    }

    pub fn with_tweak(key: &[u8], tweak: &[u8]) -> Result<Threefish256, CipherError> {
        let mut c = Threefish256 {
            key: SecretBytes::new(key)?,
            tweak: None,
        };
        c.set_tweak(tweak)?;
        Ok(c)
    }

    pub fn key_length(&self) -> usize {
        self.key.len()
    }

    pub fn has_key_locked(&self) -> bool {
        self.key.is_locked()
    }

    fn tweak_bytes(&self) -> &[u8] {
        match &self.tweak {
            Some(t) => &t[..],
            None => &[],
        }
    }

    fn check_ready(&self) -> Result<(), CipherError> {
        if self.key.is_empty() {
            return Err(CipherError::KeyNotSet);
        }

        if self.tweak.is_none() {
            return Err(CipherError::TweakNotSet);
        }

        if self.key.len() != BLOCK_SIZE256 {
            return Err(CipherError::InvalidKeyLength);
        }

        Ok(())
    }

    /// Fresh random IV of one block length.
    fn initialization_vector(&self) -> Result<Vec<u8>, CipherError> {
        let mut iv = vec![0u8; self.key.len()];

        OsRng.try_fill_bytes(&mut iv).map_err(|e| {
            warn!("IV generation failed: {}", e);
            CipherError::RandomSourceFailed
        })?;

        Ok(iv)
    }
}

impl CipherBlock for Threefish256 {
    fn encrypt(&self, src: &[u8], dst: &mut [u8]) -> Result<(), CipherError> {
        encrypt_block(self.key.as_slice(), self.tweak_bytes(), src, dst)
    }

    fn decrypt(&self, src: &[u8], dst: &mut [u8]) -> Result<(), CipherError> {
        decrypt_block(self.key.as_slice(), self.tweak_bytes(), src, dst)
    }

    fn get_block_size(&self) -> usize {
        self.key.len()
    }
}

impl BlockCipher for Threefish256 {
    /// Returns `IV || ciphertext blocks`.
    fn encrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.check_ready()?;

        let iv = self.initialization_vector()?;
        CBCProcessor::new(self).encrypt_blocks(&iv, bytes)
    }

    fn decrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.check_ready()?;

        CBCProcessor::new(self).decrypt_blocks(bytes)
    }

    fn set_key(&mut self, key: &[u8]) {
        // release the old buffer before the new one is allocated
        drop(std::mem::replace(&mut self.key, SecretBytes::empty()));
        self.key = secret_key(key);

        if self.key.len() != BLOCK_SIZE256 {
            debug!("key of {} bytes set; block operations need {}", self.key.len(), BLOCK_SIZE256);
        }
    }

    fn set_tweak(&mut self, tweak: &[u8]) -> Result<(), CipherError> {
        let tweak: [u8; TWEAK_SIZE] = tweak.try_into().map_err(|_| {
            debug!("rejected tweak of {} bytes", tweak.len());
            CipherError::InvalidTweakLength
        })?;

        if let Some(old) = self.tweak.as_mut() {
            old.zeroize();
        }
        self.tweak = Some(tweak);

        Ok(())
    }
}

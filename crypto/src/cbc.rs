use super::constants::LENGTH_TRAILER;
use super::{xor_arrays, CipherBlock, CipherError};

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use zeroize::Zeroizing;

/// CBC chaining over any [`CipherBlock`].
///
/// Output layout is `IV || C_0 || ... || C_n`. The plaintext is zero-padded to
/// at least one full block past its end and the last four bytes of the padded
/// buffer carry the original length as a little-endian `i32`.
pub struct CBCProcessor<'a> {
    block: &'a dyn CipherBlock,
    block_size: usize,
}

impl<'a> CBCProcessor<'a> {
    pub fn new(block: &'a dyn CipherBlock) -> CBCProcessor<'a> {
        CBCProcessor {
            block_size: block.get_block_size(),
            block,
        }
    }

    /// Size of the padded plaintext, trailer included.
    pub fn padded_len(&self, len: usize) -> usize {
        if len == 0 {
            self.block_size
        } else {
            self.block_size * (len.div_ceil(self.block_size) + 1)
        }
    }

    fn check_block_size(&self) -> Result<(), CipherError> {
        if self.block_size < LENGTH_TRAILER {
            return Err(CipherError::InvalidKeyLength);
        }
        Ok(())
    }

    fn pad(&self, src: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        let original_length = i32::try_from(src.len())
            .map_err(|_| CipherError::PlaintextTooLong)?;

        let padded_len = self.padded_len(src.len());
        let mut padded = Zeroizing::new(Vec::new());
        padded.try_reserve_exact(padded_len)
            .map_err(|_| CipherError::AllocationFailed)?;

        padded.extend_from_slice(src);
        padded.resize(padded_len, 0);

        let offset = padded_len - LENGTH_TRAILER;
        LittleEndian::write_i32(&mut padded[offset..], original_length);

        Ok(padded)
    }

    fn chain_encrypt(&self, iv: &[u8], padded: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut dst = Vec::new();
        dst.try_reserve_exact(iv.len() + padded.len())
            .map_err(|_| CipherError::AllocationFailed)?;
        dst.extend_from_slice(iv);

        // chain state is the last emitted ciphertext block
        let mut state = iv.to_vec();

        for (i, src_block) in padded.chunks_exact(self.block_size).enumerate() {
            let input = Zeroizing::new(xor_arrays(&state, src_block));

            self.block.encrypt(&input, &mut state).map_err(|e| {
                debug!("encryption of block {} failed: {}", i, e);
                e
            })?;

            dst.extend_from_slice(&state);
        }

        Ok(dst)
    }

    pub fn encrypt_blocks(&self, iv: &[u8], src: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.check_block_size()?;

        if iv.len() != self.block_size {
            return Err(CipherError::InvalidIVLength);
        }

        let padded = self.pad(src)?;
        self.chain_encrypt(iv, &padded)
    }

    /// A trailing partial block after the last full one is ignored.
    pub fn decrypt_blocks(&self, src: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.check_block_size()?;

        if src.len() < self.block_size {
            return Err(CipherError::InvalidCiphertextLength);
        }

        let (iv, ciphertext) = src.split_at(self.block_size);
        let block_count = ciphertext.len() / self.block_size;

        if block_count == 0 {
            return Err(CipherError::InvalidCiphertextLength);
        }

        let mut dst = Zeroizing::new(Vec::new());
        dst.try_reserve_exact(block_count * self.block_size)
            .map_err(|_| CipherError::AllocationFailed)?;

        let mut raw = Zeroizing::new(vec![0u8; self.block_size]);
        let mut chain = iv;

        for (i, src_block) in ciphertext.chunks_exact(self.block_size).enumerate() {
            self.block.decrypt(src_block, &mut raw).map_err(|e| {
                debug!("decryption of block {} failed: {}", i, e);
                e
            })?;

            dst.extend_from_slice(&Zeroizing::new(xor_arrays(&raw, chain)));
            chain = src_block;
        }

        let offset = dst.len() - LENGTH_TRAILER;
        let original_length = LittleEndian::read_i32(&dst[offset..]);

        let dst_size = match usize::try_from(original_length) {
            Ok(x) if x <= dst.len() => x,
            _ => {
                debug!("length trailer {} outside 0..={}", original_length, dst.len());
                return Err(CipherError::CorruptLengthTrailer);
            }
        };

        dst.truncate(dst_size);
        Ok(std::mem::take(&mut *dst))
    }
}


#[cfg(test)]
mod cbc_encrypter_test {
    use crate::threefish256::Threefish256;
    use super::*;

    fn cipher() -> Threefish256 {
        let tweak: Vec<u8> = (0..16).collect();
        let key: Vec<u8> = (0..32).collect();

        Threefish256::with_tweak(&key, &tweak).unwrap()
    }

    fn iv() -> Vec<u8> {
        (0..32).rev().collect()
    }

    #[test]
    fn new_errors(){
        let c = cipher();
        let cbc = CBCProcessor::new(&c);

        let iv: Vec<u8> = (0..31).rev().collect();
        let r = cbc.encrypt_blocks(&iv, b"abc");

        assert_eq!(r.unwrap_err(), CipherError::InvalidIVLength);
    }

    #[test]
    fn check_correct_length(){
        let c = cipher();
        let cbc = CBCProcessor::new(&c);
        let iv = iv();

        let ciphertext = cbc.encrypt_blocks(&iv, &[]).unwrap();
        assert_eq!(ciphertext.len(), 32 + 32,            "length of p=0 is not equal");

        let p: Vec<u8> = (0..32).collect();
        let ciphertext = cbc.encrypt_blocks(&iv, &p).unwrap();
        assert_eq!(ciphertext.len(), 32 + 32 + 32,       "length of p=32 is not equal");

        let p: Vec<u8> = (0..48).collect();
        let ciphertext = cbc.encrypt_blocks(&iv, &p).unwrap();
        assert_eq!(ciphertext.len(), 32 + 32 + 32 + 32,  "length of p=48 is not equal");

        let p: Vec<u8> = (0..15).collect();
        let ciphertext = cbc.encrypt_blocks(&iv, &p).unwrap();
        assert_eq!(ciphertext.len(), 32 + 32 + 32,       "length of p=15 is not equal");

        let p: Vec<u8> = (0..31).collect();
        let ciphertext = cbc.encrypt_blocks(&iv, &p).unwrap();
        assert_eq!(ciphertext.len(), 32 + 32 + 32,       "length of p=31 is not equal");

        let p: Vec<u8> = (0..58).collect();
        let ciphertext = cbc.encrypt_blocks(&iv, &p).unwrap();
        assert_eq!(ciphertext.len(), 32 + 32 + 32 + 32,  "length of p=58 is not equal");
    }

    #[test]
    fn padded_len_always_adds_block(){
        let c = cipher();
        let cbc = CBCProcessor::new(&c);

        assert_eq!(cbc.padded_len(0), 32);
        assert_eq!(cbc.padded_len(1), 64);
        assert_eq!(cbc.padded_len(32), 64);
        assert_eq!(cbc.padded_len(33), 96);
        assert_eq!(cbc.padded_len(500_000), 32 * (500_000 / 32 + 1));
    }

    #[test]
    fn pad_writes_trailer(){
        let c = cipher();
        let cbc = CBCProcessor::new(&c);

        let padded = cbc.pad(&[0xaa; 40]).unwrap();
        assert_eq!(padded.len(), 96);
        assert_eq!(&padded[..40], &[0xaa; 40][..]);
        assert!(padded[40..92].iter().all(|b| *b == 0));
        assert_eq!(&padded[92..], &[40, 0, 0, 0]);

        let padded = cbc.pad(&[]).unwrap();
        assert_eq!(padded.len(), 32);
        assert_eq!(&padded[..], &[0; 32][..]);
    }

    #[test]
    fn check_res_empty(){
        let c = cipher();
        let cbc = CBCProcessor::new(&c);

        let ciphertext = cbc.encrypt_blocks(&iv(), &[]).unwrap();

        let expected = vec![
            31u8,30,29,28,27,26,25,24,23,22,21,20,19,18,17,16,15,14,13,12,11,10,9,8,7,6,5,4,3,2,1,0,
            214,164,184,160,107,43,168,196,183,21,172,33,82,159,252,203,50,86,50,140,164,70,93,29,244,248,166,149,163,113,7,206,
        ];

        assert_eq!(ciphertext, expected);
    }

    #[test]
    fn check_res(){
        let c = cipher();
        let cbc = CBCProcessor::new(&c);
        let plaintext: Vec<u8> = (0..40).collect();

        let ciphertext = cbc.encrypt_blocks(&iv(), &plaintext).unwrap();

        let expected = vec![
            31u8,30,29,28,27,26,25,24,23,22,21,20,19,18,17,16,15,14,13,12,11,10,9,8,7,6,5,4,3,2,1,0,
            51,245,230,152,166,101,23,167,12,25,121,165,46,156,204,150,41,163,183,133,121,207,164,197,133,123,195,177,140,168,33,93,
            137,188,32,227,166,129,242,57,168,44,19,185,145,60,160,88,168,244,194,231,254,53,119,150,201,84,20,177,168,219,183,249,
            33,10,136,150,75,129,78,142,233,100,93,222,28,239,5,110,237,172,21,116,155,153,132,222,131,1,51,73,95,180,203,170,
        ];

        assert_eq!(ciphertext, expected);
    }

    #[test]
    fn check_res_text(){
        let c = cipher();
        let cbc = CBCProcessor::new(&c);
        let plaintext = b"The pink duck visited the Soap Queen. A happy moment indeed.";

        let ciphertext = cbc.encrypt_blocks(&iv(), plaintext).unwrap();

        let expected = hex::decode(concat!(
            "1f1e1d1c1b1a191817161514131211100f0e0d0c0b0a09080706050403020100",
            "2209962a0ea390829de86b65033055c78433232295845b9bbf8ffc6fa88670b5",
            "3557a7ab8f73e4b793f05c222080c19654f52b0b6ae95f67d71ba128b4cb0b23",
            "b1b18ae9c54a975c48aa543ed8e2c57137c7dca7e468070dc2f4c01d65093b30",
        )).unwrap();

        assert_eq!(ciphertext, expected);
    }
}

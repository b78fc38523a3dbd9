use super::CipherError;
use super::constants::*;

use byteorder::{ByteOrder, LittleEndian};

/// Decodes as many complete little-endian words as both buffers allow.
/// A trailing partial group in `bytes` is ignored.
pub fn bytes_to_words(words: &mut [u64], bytes: &[u8]) {
    words.iter_mut()
        .zip(bytes.chunks_exact(8))
        .for_each(|(word, chunk)| *word = LittleEndian::read_u64(chunk));
}

/// Encodes `words` little-endian, one 8-byte group per word, stopping when
/// `bytes` has no room for another complete group.
pub fn words_to_bytes(bytes: &mut [u8], words: &[u64]) {
    bytes.chunks_exact_mut(8)
        .zip(words.iter())
        .for_each(|(chunk, word)| LittleEndian::write_u64(chunk, *word));
}

pub fn calculate_tweak(tweak: &[u8]) -> Result<[u64; TWEAK_COUNT], CipherError> {
    if tweak.len() != TWEAK_SIZE {
        return Err(CipherError::InvalidTweakLength);
    }

    let mut dst = [0u64; TWEAK_COUNT];
    bytes_to_words(&mut dst[..2], tweak);
    dst[2] = dst[0] ^ dst[1];

    Ok(dst)
}


#[cfg(test)]
mod utils_tests {
    use super::*;

    #[test]
    fn bytes_to_words_check_res() {
        let bytes: Vec<u8> = (1..=16).collect();
        let mut words = [0u64; 2];

        bytes_to_words(&mut words, &bytes);

        assert_eq!(words, [0x0807060504030201, 0x100f0e0d0c0b0a09]);
    }

    #[test]
    fn bytes_to_words_ignores_partial_group() {
        let bytes: Vec<u8> = (1..=13).collect();
        let mut words = [0xffu64; 2];

        bytes_to_words(&mut words, &bytes);

        assert_eq!(words[0], 0x0807060504030201);
        assert_eq!(words[1], 0xff, "partial group must not be decoded");
    }

    #[test]
    fn bytes_to_words_empty_input() {
        let mut words = [7u64; 4];
        bytes_to_words(&mut words, &[]);
        assert_eq!(words, [7; 4]);
    }

    #[test]
    fn bytes_to_words_short_destination() {
        let bytes = [0xaau8; 32];
        let mut words = [0u64; 1];

        bytes_to_words(&mut words, &bytes);

        assert_eq!(words, [0xaaaaaaaaaaaaaaaa]);
    }

    #[test]
    fn words_to_bytes_check_res() {
        let words = [0x0807060504030201u64, 0x100f0e0d0c0b0a09];
        let mut bytes = [0u8; 16];

        words_to_bytes(&mut bytes, &words);

        let expected: Vec<u8> = (1..=16).collect();
        assert_eq!(bytes.to_vec(), expected);
    }

    #[test]
    fn words_to_bytes_bounded_by_destination() {
        let words = [u64::MAX; 4];
        let mut bytes = [0u8; 12];

        words_to_bytes(&mut bytes, &words);

        assert_eq!(&bytes[..8], &[0xff; 8]);
        assert_eq!(&bytes[8..], &[0; 4]);
    }

    #[test]
    fn calculate_tweak_check_error() {
        let v = vec![0x1,0x2,0x3,0x4,0x5,0x6,0x7,0x8,0x1,0x1,0x1,0x1,0x1,0x1,0x1];

        let r = calculate_tweak(&v);

        assert!(r.is_err());
        assert_eq!(r.unwrap_err(), CipherError::InvalidTweakLength);
    }

    #[test]
    fn calculate_tweak_check_res() {
        let v = vec![0x1,0x2,0x3,0x4,0x5,0x6,0x7,0x8,0x1,0x1,0x1,0x1,0x1,0x1,0x1,0x1];
        let r = calculate_tweak(&v).unwrap();

        assert_eq!(r.len(), 3, "length is not equal");
        assert_eq!(r[0], 0x0807060504030201, "r[0] incorrect");
        assert_eq!(r[1], 0x0101010101010101, "r[1] incorrect");
        assert_eq!(r[2], 0x0807060504030201 ^ 0x0101010101010101, "r[2] incorrect");
    }
}

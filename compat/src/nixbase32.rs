//! Implements the slightly odd "base32" encoding that's used in Nix.
//!
//! Nix uses a custom alphabet. Contrary to other implementations (RFC4648),
//! encoding to "nix base32" doesn't use any padding, and reads in characters
//! in reverse order.

use thiserror::Error;

const ALPHABET: &[u8; 32] = b"0123456789abcdfghijklmnpqrsvwxyz";

/// Errors that can occur while decoding nixbase32-encoded data.
#[derive(Debug, Eq, PartialEq, Error)]
pub enum Nixbase32DecodeError {
    #[error("character {0:x} not in alphabet")]
    CharacterNotInAlphabet(u8),
    #[error("nonzero carry")]
    NonzeroCarry(),
    #[error("invalid length")]
    InvalidLength,
}

/// Returns the number of characters needed to encode `len` bytes.
pub const fn encode_len(len: usize) -> usize {
    (len * 8 + 4) / 5
}

/// Returns the number of bytes `len` characters decode to.
pub const fn decode_len(len: usize) -> usize {
    (len * 5) / 8
}

/// Returns encoded input
pub fn encode(input: &[u8]) -> String {
    let output_len = encode_len(input.len());

    (0..output_len)
        .rev()
        .map(|n| {
            let b = n * 5; // bit offset within the entire input
            let i = b / 8; // input byte index
            let j = b % 8; // bit offset within that input byte

            // combine the byte at i with the following one, so bits crossing
            // a byte boundary are picked up too.
            let lo = input[i] as u16;
            let hi = input.get(i + 1).copied().unwrap_or(0) as u16;
            let c = ((lo | (hi << 8)) >> j) & 0x1f;

            ALPHABET[c as usize] as char
        })
        .collect()
}

/// This maps a nixbase32-encoded character to its binary representation, which
/// is also the index of the character in the alphabet.
fn decode_char(encoded_char: u8) -> Option<u8> {
    Some(match encoded_char {
        b'0'..=b'9' => encoded_char - b'0',
        b'a'..=b'd' => encoded_char - b'a' + 10_u8,
        b'f'..=b'n' => encoded_char - b'f' + 14_u8,
        b'p'..=b's' => encoded_char - b'p' + 23_u8,
        b'v'..=b'z' => encoded_char - b'v' + 27_u8,
        _ => return None,
    })
}

/// Returns decoded input
pub fn decode(input: &[u8]) -> Result<Vec<u8>, Nixbase32DecodeError> {
    let output_len = decode_len(input.len());
    let mut output: Vec<u8> = vec![0x00; output_len];

    // characters are stored in reverse, the last one holds the lowest bits.
    for (n, c) in input.iter().rev().enumerate() {
        let digit = decode_char(*c).ok_or(Nixbase32DecodeError::CharacterNotInAlphabet(*c))?;

        let b = n * 5;
        let i = b / 8;
        let j = b % 8;

        let val = (digit as u16) << j;

        // bits that would land past the end of the output make the encoding
        // invalid.
        for (idx, bits) in [(i, (val & 0xff) as u8), (i + 1, (val >> 8) as u8)] {
            match output.get_mut(idx) {
                Some(o) => *o |= bits,
                None if bits != 0 => return Err(Nixbase32DecodeError::NonzeroCarry()),
                None => {}
            }
        }
    }

    Ok(output)
}

/// Decodes into a fixed-size array, failing if the length doesn't match.
pub fn decode_fixed<const N: usize>(
    input: impl AsRef<[u8]>,
) -> Result<[u8; N], Nixbase32DecodeError> {
    let input = input.as_ref();
    if input.len() != encode_len(N) {
        return Err(Nixbase32DecodeError::InvalidLength);
    }

    decode(input)?
        .try_into()
        .map_err(|_| Nixbase32DecodeError::InvalidLength)
}

//! Reversible file-name obfuscation.
//!
//! Archive entries are not stored under their real names. Each name is run
//! through a stateful substitution cipher: every byte is pushed through
//! [`CIPHER_TABLE`] a number of times equal to the current state, and the
//! state then advances from the plain byte. The seed state is stored as the
//! trailing character of the result and a checksum character is prepended,
//! so a hash name is always two characters longer than the plain name.
//!
//! ```text
//! hash := check_char  substituted_and_scrambled_bytes  seed_char
//! ```
//!
//! Names are lowercased before encoding, so decoding yields the lowercase
//! form of the input.

use std::borrow::Cow;

use crate::error::CryptoError;
use crate::shard::ShardId;

/// Substitution table indexed by plain byte. Zero marks characters that are
/// not valid in a file name.
pub const CIPHER_TABLE: [u8; 128] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    103, 32, 0, 38, 119, 44, 108, 78, 88, 79, 0, 55, 46, 37, 101, 0,
    56, 95, 93, 35, 80, 49, 45, 36, 86, 91, 0, 89, 0, 94, 0, 0,
    75, 125, 106, 48, 64, 71, 83, 41, 65, 120, 121, 54, 57, 69, 70, 123,
    87, 98, 61, 82, 118, 116, 104, 50, 52, 77, 40, 107, 0, 109, 97, 43,
    126, 68, 39, 67, 33, 74, 73, 100, 66, 85, 96, 113, 102, 112, 72, 81,
    51, 76, 110, 111, 90, 105, 114, 115, 117, 59, 122, 99, 0, 84, 53, 0,
];

/// Framing characters. The seed state indexes this table for the trailing
/// character and the byte sum modulo 84 for the leading one.
pub const CHAR_TABLE: [u8; 85] = [
    94, 38, 84, 95, 78, 115, 100, 123, 120, 111, 53, 118, 96, 114, 79, 89,
    86, 43, 44, 105, 73, 85, 35, 107, 67, 74, 113, 56, 36, 39, 126, 76,
    48, 80, 93, 70, 101, 66, 110, 45, 65, 117, 40, 112, 88, 72, 90, 104,
    119, 68, 121, 50, 125, 97, 103, 87, 71, 55, 75, 61, 98, 81, 59, 83,
    82, 116, 41, 52, 54, 108, 64, 106, 69, 37, 57, 33, 99, 49, 91, 51,
    102, 109, 77, 122, 0,
];

/// Modulus for the leading checksum character.
const CHECK_MODULUS: u32 = 84;

/// Inverse of [`CIPHER_TABLE`]: the first plain byte mapping to each value,
/// or 0xFF when no byte does.
const INVERSE_TABLE: [u8; 256] = invert(&CIPHER_TABLE);

const fn invert(table: &[u8; 128]) -> [u8; 256] {
    let mut inverse = [0xFF; 256];
    let mut i = table.len();
    // Walk backwards so the lowest index wins for duplicated values.
    while i > 0 {
        i -= 1;
        inverse[table[i] as usize] = i as u8;
    }
    inverse
}

/// Scramble pivots, kept in single precision and widened before use.
const SCRAMBLE_LOW: f32 = 0.33;
const SCRAMBLE_HIGH: f32 = 0.66;

/// Advance the cipher state from a plain byte. The state stays in 1..=32.
const fn next_state(state: i32, plain: u8) -> i32 {
    let next = (state + 1 + 17 * plain as i32) & 31;
    if next == 0 { 32 } else { next }
}

/// Swap positions 0 and 1 with the two pivot positions. Applying it twice
/// restores the original order.
#[allow(clippy::cast_precision_loss)]
fn scramble(bytes: &mut [u8]) {
    let len = bytes.len();
    if len <= 4 {
        return;
    }

    let low = (f64::from(SCRAMBLE_LOW) * len as f64).floor() as usize;
    let high = (f64::from(SCRAMBLE_HIGH) * len as f64).floor() as usize;

    let at_high = bytes[high];
    let at_low = bytes[low];
    bytes[high] = bytes[0];
    bytes[low] = bytes[1];
    bytes[0] = at_high;
    bytes[1] = at_low;
}

/// Name obfuscation cipher.
///
/// All operations are stateless associated functions; the evolving cipher
/// state lives only for the duration of one call.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameCipher;

impl NameCipher {
    /// Encode a plain name into its hash name.
    ///
    /// The name is lowercased first. Names containing non-ASCII bytes cannot
    /// be encoded.
    ///
    /// ```
    /// use rzdata_crypto::NameCipher;
    ///
    /// assert_eq!(NameCipher::encode("a.dds").expect("ascii"), "N M!ccI");
    /// ```
    pub fn encode(plain: &str) -> Result<String, CryptoError> {
        CryptoError::check_ascii(plain)?;
        let plain = plain.to_ascii_lowercase().into_bytes();

        let sum = plain
            .iter()
            .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b) * 17 + 1));
        let seed = match (sum.wrapping_add(plain.len() as u32)) & 31 {
            0 => 32,
            n => n as i32,
        };

        let mut body = Vec::with_capacity(plain.len());
        let mut state = seed;
        for &byte in &plain {
            let mut value = byte;
            for _ in 0..state {
                value = CIPHER_TABLE[usize::from(value)];
            }
            body.push(value);
            state = next_state(state, byte);
        }
        scramble(&mut body);

        let check = body.iter().map(|&b| u32::from(b)).sum::<u32>() % CHECK_MODULUS;

        let mut hash = String::with_capacity(body.len() + 2);
        hash.push(char::from(CHAR_TABLE[check as usize]));
        hash.extend(body.iter().copied().map(char::from));
        hash.push(char::from(CHAR_TABLE[seed as usize]));
        Ok(hash)
    }

    /// Decode a hash name back into its lowercase plain name.
    ///
    /// The empty string decodes to itself. A string that was never produced
    /// by [`encode`](Self::encode) still decodes to *something*; use
    /// [`is_encoded`](Self::is_encoded) to tell the two apart.
    pub fn decode(hash: &str) -> Result<String, CryptoError> {
        if hash.is_empty() {
            return Ok(String::new());
        }
        CryptoError::check_ascii(hash)?;
        let bytes = hash.as_bytes();
        if bytes.len() < 2 {
            return Err(CryptoError::InvalidHashName(hash.to_string()));
        }

        let mut body = bytes[1..bytes.len() - 1].to_vec();
        scramble(&mut body);

        // An unknown seed leaves the body unsubstituted
        let seed_char = bytes[bytes.len() - 1];
        let mut state = CHAR_TABLE
            .iter()
            .position(|&c| c == seed_char)
            .map_or(-1, |p| p as i32);

        let mut plain = String::with_capacity(body.len());
        for &byte in &body {
            let mut value = byte;
            // Values without an inverse decode to U+00FF and stay there
            for _ in 0..state.max(0) {
                value = INVERSE_TABLE[usize::from(value)];
            }
            plain.push(char::from(value));
            state = next_state(state, value);
        }
        Ok(plain)
    }

    /// Whether `value` is a well-formed hash name, i.e. re-encoding its
    /// decoded form reproduces it exactly.
    ///
    /// A few short plain names happen to satisfy this by accident; they are
    /// treated as hash names everywhere, as the on-disk format does.
    pub fn is_encoded(value: &str) -> bool {
        if value.len() < 2 {
            return false;
        }
        Self::decode(value)
            .and_then(|plain| Self::encode(&plain))
            .is_ok_and(|hash| hash == value)
    }

    /// Return `value` unchanged if it is already a hash name, otherwise
    /// encode it.
    pub fn to_hash_name(value: &str) -> Result<Cow<'_, str>, CryptoError> {
        if Self::is_encoded(value) {
            Ok(Cow::Borrowed(value))
        } else {
            Self::encode(value).map(Cow::Owned)
        }
    }

    /// Shard assignment for a plain or hash name.
    ///
    /// A plain name and its hash name always land in the same shard.
    pub fn shard_id(value: &str) -> Result<ShardId, CryptoError> {
        let hash = Self::to_hash_name(value)?;
        let checksum = hash.bytes().fold(0i32, |acc, b| {
            acc.wrapping_mul(31)
                .wrapping_add(i32::from(b.to_ascii_lowercase()))
        });
        Ok(ShardId::from_checksum(checksum.unsigned_abs()))
    }
}

//! Source-text fingerprinting
//!
//! The engine identifies a localized entry's source text with a CRC-32 computed over
//! the string's UTF-16 code units, each widened to four little-endian bytes. Injected
//! translations have to carry that exact value to override a native entry, and the
//! `OriginalHash:` tag stored on remote keys is compared against it to detect edited
//! source texts, so this is a bit-exact port rather than "a" hash.

/// Prefix of the remote tag caching the source-text hash at last upload
pub const KEY_HASH_PREFIX: &str = "OriginalHash:";

/// Prefix of the optional remote tag caching the source text itself
pub const DEFAULT_TEXT_PREFIX: &str = "OriginalText:";

const CRC32_POLY: u32 = 0xEDB8_8320;

const CRC32_TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

#[inline]
fn update(crc: u32, byte: u8) -> u32 {
    (crc >> 8) ^ CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize]
}

/// Hash a source text the way the engine's string table does.
///
/// Deterministic and pure: equal text always yields an equal hash, across calls and
/// across processes. Hashing stops at the first NUL code unit, as the engine works
/// on NUL-terminated buffers. The empty string hashes to 0, which the injector
/// treats as "no hash".
///
/// # Example
///
/// ```ignore
/// use tolgee_sync::translation_hash;
///
/// assert_eq!(translation_hash("hello"), translation_hash("hello"));
/// assert_ne!(translation_hash("hello"), translation_hash("goodbye"));
/// ```
pub fn translation_hash(text: &str) -> u32 {
    let mut crc = !0u32;
    for unit in text.encode_utf16().take_while(|&u| u != 0) {
        let [lo, hi] = unit.to_le_bytes();
        crc = update(crc, lo);
        crc = update(crc, hi);
        crc = update(crc, 0);
        crc = update(crc, 0);
    }
    !crc
}

/// Build the `OriginalHash:<hash>` tag for a source text
pub fn hash_tag(text: &str) -> String {
    hash_value_tag(translation_hash(text))
}

/// Build the `OriginalHash:<hash>` tag for an already computed hash
pub fn hash_value_tag(hash: u32) -> String {
    format!("{}{}", KEY_HASH_PREFIX, hash)
}

/// Build the `OriginalText:<text>` tag for a source text
pub fn text_tag(text: &str) -> String {
    format!("{}{}", DEFAULT_TEXT_PREFIX, text)
}

/// Parse the numeric value of an `OriginalHash:` tag.
///
/// Reads like C `strtoll`: leading whitespace, an optional sign, then as many
/// decimal digits as there are (`"123abc"` is 123, no digits is 0). The signed
/// 64-bit result saturates on overflow and is truncated to 32 bits.
pub fn parse_hash_value(value: &str) -> u32 {
    let value = value.trim_start();
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };

    let magnitude = digits
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .fold(0i64, |acc, digit| acc.saturating_mul(10).saturating_add(i64::from(digit - b'0')));

    let signed = if negative { magnitude.saturating_neg() } else { magnitude };
    signed as u32
}

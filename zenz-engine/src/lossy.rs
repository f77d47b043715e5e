//! Lossy UTF-8 reconstruction for token byte streams
//!
//! A single token's byte fragment may end in the middle of a multi-byte
//! character, so text assembled token by token is not guaranteed to be valid
//! UTF-8 even when the full sequence would be. Everything leaving the engine
//! as text goes through [`reconstruct_lossy`].

/// Marker emitted in place of each invalid byte.
pub const REPLACEMENT_CHAR: char = '\u{FFFD}';

/// Convert arbitrary bytes into a valid `String`.
///
/// ASCII passes through. A multi-byte sequence is decoded only if its
/// lead byte, every continuation byte, its minimal length, and the
/// resulting scalar value (not a surrogate, at most U+10FFFF) are all valid.
/// Otherwise a single [`REPLACEMENT_CHAR`] is emitted and scanning resumes
/// at the very next byte, so `FF 41` becomes `"\u{FFFD}A"`.
pub fn reconstruct_lossy(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let lead = bytes[i];
        if lead.is_ascii() {
            out.push(char::from(lead));
            i += 1;
            continue;
        }

        match decode_sequence(&bytes[i..]) {
            Some((c, len)) => {
                out.push(c);
                i += len;
            }
            None => {
                out.push(REPLACEMENT_CHAR);
                // resync one byte at a time
                i += 1;
            }
        }
    }

    out
}

/// Decode one multi-byte sequence at the start of `bytes`.
///
/// Returns the character and the number of bytes it occupies.
fn decode_sequence(bytes: &[u8]) -> Option<(char, usize)> {
    let lead = *bytes.first()?;
    let (len, initial, min_value) = match lead {
        b if b & 0xE0 == 0xC0 => (2, u32::from(b & 0x1F), 0x80),
        b if b & 0xF0 == 0xE0 => (3, u32::from(b & 0x0F), 0x800),
        b if b & 0xF8 == 0xF0 => (4, u32::from(b & 0x07), 0x1_0000),
        _ => return None,
    };

    let continuation = bytes.get(1..len)?;
    let mut value = initial;
    for &b in continuation {
        if b & 0xC0 != 0x80 {
            return None;
        }
        value = (value << 6) | u32::from(b & 0x3F);
    }

    // overlong
    if value < min_value {
        return None;
    }

    // `from_u32` rejects surrogates and values past U+10FFFF
    char::from_u32(value).map(|c| (c, len))
}

//! Consistent-overhead byte stuffing.
//!
//! Removes every `0x00` from a payload so that `0x00` can delimit frames on
//! the wire. Each block starts with a code byte `n` (1..=255): `n - 1` literal
//! non-zero bytes follow, and unless `n == 0xFF` the block stands for those
//! bytes plus one eliminated zero. The zero implied by the final block is
//! dropped.
//!
//! ```text
//! payload  11 22 00 33
//! frame    03 11 22 02 33 00
//!          ^code    ^code  ^delimiter
//! ```

use bytes::{BufMut, BytesMut};

/// The frame delimiter. Never appears inside an encoded frame.
pub const DELIMITER: u8 = 0x00;

/// Longest run of literal bytes one code byte can describe.
const MAX_RUN: usize = 254;

/// Code byte for a full run, which implies no trailing zero.
const FULL_RUN_CODE: u8 = 0xFF;

/// Upper bound on the encoded size of `len` payload bytes, counting a
/// leading and a trailing delimiter.
pub fn max_encoded_len(len: usize) -> usize {
    len + len / MAX_RUN + 1 + 2
}

/// Encode `payload` into `dst`, always terminating the frame with
/// [`DELIMITER`].
///
/// With `leading_delimiter` set, a delimiter is written first as well. A
/// receiver that lost sync mid-frame then resynchronises on this frame
/// instead of the next one.
pub fn cobs_encode(payload: &[u8], leading_delimiter: bool, dst: &mut BytesMut) {
    dst.reserve(max_encoded_len(payload.len()));
    if leading_delimiter {
        dst.put_u8(DELIMITER);
    }

    let mut code_index = dst.len();
    dst.put_u8(0);
    let mut code: u8 = 1;

    for &byte in payload {
        if byte == DELIMITER {
            dst[code_index] = code;
            code_index = dst.len();
            dst.put_u8(0);
            code = 1;
            continue;
        }

        dst.put_u8(byte);
        code += 1;
        if code == FULL_RUN_CODE {
            dst[code_index] = code;
            code_index = dst.len();
            dst.put_u8(0);
            code = 1;
        }
    }

    dst[code_index] = code;
    dst.put_u8(DELIMITER);
}

/// Decode one frame into `dst`.
///
/// Leading delimiters are skipped and decoding stops at the first delimiter
/// in code position, so both a bare frame body and a delimited frame are
/// accepted. Malformed or truncated input is not an error: whatever prefix
/// could be recovered is left in `dst`.
pub fn cobs_decode(frame: &[u8], dst: &mut BytesMut) {
    dst.reserve(frame.len());

    let mut pos = frame
        .iter()
        .position(|&b| b != DELIMITER)
        .unwrap_or(frame.len());

    while pos < frame.len() {
        let code = frame[pos];
        if code == DELIMITER {
            break;
        }
        pos += 1;

        let run = usize::from(code - 1);
        let end = (pos + run).min(frame.len());
        let block = &frame[pos..end];
        if let Some(stray) = block.iter().position(|&b| b == DELIMITER) {
            dst.put_slice(&block[..stray]);
            return;
        }
        dst.put_slice(block);
        if block.len() < run {
            return;
        }
        pos = end;

        if code != FULL_RUN_CODE && pos < frame.len() && frame[pos] != DELIMITER {
            dst.put_u8(0);
        }
    }
}

//! BigSize variable-length integers
//!
//! | value range            | encoding              |
//! |------------------------|-----------------------|
//! | `< 0xfd`               | 1 byte                |
//! | `0xfd ..= 0xffff`      | `0xfd` + u16 (BE)     |
//! | `0x10000 ..= u32::MAX` | `0xfe` + u32 (BE)     |
//! | larger                 | `0xff` + u64 (BE)     |

use bytes::{Buf, BufMut};

use crate::error::TlvError;

/// Encoded size of `value` in bytes
pub fn bigsize_len(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

pub fn write_bigsize<B: BufMut>(buf: &mut B, value: u64) {
    match value {
        0..=0xfc => buf.put_u8(value as u8),
        0xfd..=0xffff => {
            buf.put_u8(0xfd);
            buf.put_u16(value as u16);
        }
        0x1_0000..=0xffff_ffff => {
            buf.put_u8(0xfe);
            buf.put_u32(value as u32);
        }
        _ => {
            buf.put_u8(0xff);
            buf.put_u64(value);
        }
    }
}

/// Read a BigSize, rejecting non-canonical encodings
pub fn read_bigsize<B: Buf>(buf: &mut B) -> Result<u64, TlvError> {
    ensure_remaining(buf, 1)?;
    let (value, min) = match buf.get_u8() {
        0xfd => {
            ensure_remaining(buf, 2)?;
            (u64::from(buf.get_u16()), 0xfd)
        }
        0xfe => {
            ensure_remaining(buf, 4)?;
            (u64::from(buf.get_u32()), 0x1_0000)
        }
        0xff => {
            ensure_remaining(buf, 8)?;
            (buf.get_u64(), 0x1_0000_0000)
        }
        small => return Ok(u64::from(small)),
    };

    if value < min {
        return Err(TlvError::NonCanonicalBigSize { value });
    }
    Ok(value)
}

fn ensure_remaining<B: Buf>(buf: &B, needed: usize) -> Result<(), TlvError> {
    if buf.remaining() < needed {
        return Err(TlvError::UnexpectedEof {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

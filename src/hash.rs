//! Entry identity and payload hashes used by UOP containers.
//!
//! Entry names are hashed with Bob Jenkins' lookup3 `hashlittle2` (both seeds
//! zero) and stored as `(b << 32) | c`.  The payload hash is Adler-32.

use byteorder::{ByteOrder, LittleEndian};

#[inline]
fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c); *a ^= c.rotate_left(4);  *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a); *b ^= a.rotate_left(6);  *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b); *c ^= b.rotate_left(8);  *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c); *a ^= c.rotate_left(16); *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a); *b ^= a.rotate_left(19); *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b); *c ^= b.rotate_left(4);  *b = b.wrapping_add(*a);
}

#[inline]
fn finish(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b; *c = c.wrapping_sub(b.rotate_left(14));
    *a ^= *c; *a = a.wrapping_sub(c.rotate_left(11));
    *b ^= *a; *b = b.wrapping_sub(a.rotate_left(25));
    *c ^= *b; *c = c.wrapping_sub(b.rotate_left(16));
    *a ^= *c; *a = a.wrapping_sub(c.rotate_left(4));
    *b ^= *a; *b = b.wrapping_sub(a.rotate_left(14));
    *c ^= *b; *c = c.wrapping_sub(b.rotate_left(24));
}

/// lookup3 `hashlittle2` with zero seeds, returning `(c, b)`.
pub fn hashlittle2(key: &[u8]) -> (u32, u32) {
    let init = 0xDEAD_BEEFu32.wrapping_add(key.len() as u32);
    let (mut a, mut b, mut c) = (init, init, init);

    if key.is_empty() {
        return (c, b);
    }

    let mut rest = key;
    while rest.len() > 12 {
        a = a.wrapping_add(LittleEndian::read_u32(&rest[0..4]));
        b = b.wrapping_add(LittleEndian::read_u32(&rest[4..8]));
        c = c.wrapping_add(LittleEndian::read_u32(&rest[8..12]));
        mix(&mut a, &mut b, &mut c);
        rest = &rest[12..];
    }

    // 1..=12 bytes remain; zero padding contributes nothing to the sums.
    let mut tail = [0u8; 12];
    tail[..rest.len()].copy_from_slice(rest);
    a = a.wrapping_add(LittleEndian::read_u32(&tail[0..4]));
    b = b.wrapping_add(LittleEndian::read_u32(&tail[4..8]));
    c = c.wrapping_add(LittleEndian::read_u32(&tail[8..12]));
    finish(&mut a, &mut b, &mut c);

    (c, b)
}

/// Hash of an entry name as stored in the UOP entry table.
///
/// Names are case-insensitive; they are lower-cased before hashing.
pub fn entry_hash(name: &str) -> u64 {
    let lowered = name.to_ascii_lowercase();
    let (c, b) = hashlittle2(lowered.as_bytes());
    (u64::from(b) << 32) | u64::from(c)
}

const ADLER_MOD: u32 = 65_521;
// Largest n such that 255*n*(n+1)/2 + (n+1)*(MOD-1) fits in u32.
const ADLER_NMAX: usize = 5552;

pub fn adler32(data: &[u8]) -> u32 {
    let (mut s1, mut s2) = (1u32, 0u32);
    for chunk in data.chunks(ADLER_NMAX) {
        for &byte in chunk {
            s1 += u32::from(byte);
            s2 += s1;
        }
        s1 %= ADLER_MOD;
        s2 %= ADLER_MOD;
    }
    (s2 << 16) | s1
}

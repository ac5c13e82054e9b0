//! Key hashing and the probe sequence of the index table.

use crate::config::HashType;

/// Seed of the hash that picks the first slot and is stored in the slot.
const PRIMARY_SEED: u32 = 0xbc9f_1d34;

/// Seed of the hash that picks the probe stride.
const STRIDE_SEED: u32 = 0xd0e8_9c7b;

/// FNV-1a over `key`, seeded, followed by the murmur3 64-bit finaliser so
/// that the low bits are as well mixed as the high ones.
fn hash_with_seed(key: &[u8], seed: u32) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut h = FNV_OFFSET_BASIS ^ u64::from(seed);
    for &byte in key {
        h ^= u64::from(byte);
        h = h.wrapping_mul(FNV_PRIME);
    }

    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^ (h >> 33)
}

/// Hash of `key` truncated to the slot width. Never zero: zero marks an
/// empty slot.
///
/// `width` must already be resolved.
pub fn key_hash(key: &[u8], width: HashType) -> u64 {
    let h = hash_with_seed(key, PRIMARY_SEED);
    let h = match width {
        HashType::Hash32 => u64::from(h as u32),
        _ => h,
    };
    if h == 0 {
        1
    } else {
        h
    }
}

/// Second, independent hash of `key` used for the probe stride.
pub fn stride_hash(key: &[u8]) -> u64 {
    hash_with_seed(key, STRIDE_SEED)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Slot indices to try for a key, in order. Visits each of the `slots`
/// slots exactly once.
#[derive(Debug, Clone)]
pub struct Probe {
    slot: u64,
    stride: u64,
    slots: u64,
    left: u64,
}

impl Probe {
    /// Start the probe sequence for `hash` and `stride_hash` over `slots` slots.
    pub fn new(hash: u64, stride_hash: u64, slots: u64) -> Self {
        if slots == 0 {
            return Self { slot: 0, stride: 1, slots, left: 0 };
        }

        let mut stride = if slots > 1 { 1 + stride_hash % (slots - 1) } else { 1 };
        while gcd(stride, slots) != 1 {
            stride += 1;
            if stride >= slots {
                stride = 1;
            }
        }

        Self { slot: hash % slots, stride, slots, left: slots }
    }
}

impl Iterator for Probe {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.left == 0 {
            return None;
        }
        let current = self.slot;
        self.left -= 1;
        // slot and stride are both below `slots`, so this cannot overflow
        // for any table that fits in memory.
        self.slot = (self.slot + self.stride) % self.slots;
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = usize::try_from(self.left).unwrap_or(usize::MAX);
        (left, Some(left))
    }
}

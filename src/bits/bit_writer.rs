// src/bits/bit_writer.rs

//! A bit-level writer used to serialize small header structures.
//!
//! Bits are accumulated MSB-first. Header layouts in this crate are defined
//! in whole bits and padded to a byte boundary before any byte-oriented data
//! (ICC payloads, entropy-coded frame bytes) follows.

use bitvec::prelude::*;

/// Accumulates bits MSB-first and hands out the packed bytes.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bits: BitVec<u8, Msb0>,
}

impl BitWriter {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the low `count` bits of `value`, most significant first.
    pub fn write_bits(&mut self, count: u32, value: u64) {
        debug_assert!(count <= 64);
        debug_assert!(count == 64 || value < (1u64 << count));
        for i in (0..count).rev() {
            self.bits.push((value >> i) & 1 != 0);
        }
    }

    /// Appends a single flag bit.
    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.bits.push(value);
    }

    /// Appends whole bytes. The writer does not need to be aligned; callers
    /// that require alignment pad first.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.bits.extend_from_bitslice(bytes.view_bits::<Msb0>());
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn zero_pad_to_byte(&mut self) {
        while self.bits.len() % 8 != 0 {
            self.bits.push(false);
        }
    }

    /// Total number of bits written so far.
    #[inline]
    pub fn bits_written(&self) -> usize {
        self.bits.len()
    }

    /// Number of bytes the current contents occupy, rounding up.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.bits.len().div_ceil(8)
    }

    #[inline]
    pub fn is_byte_aligned(&self) -> bool {
        self.bits.len() % 8 == 0
    }

    /// Consumes the writer, zero-padding to a byte boundary, and returns the
    /// packed bytes.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.zero_pad_to_byte();
        self.bits.into_vec()
    }
}

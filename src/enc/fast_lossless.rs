//! Streaming fast-path frames.
//!
//! A fast-lossless frame arrives with its body already entropy-coded; only
//! the small frame header depends on stream position (the last-frame bit is
//! known at drain time, not at enqueue time). The provider keeps the body
//! unduplicated and hands out bytes incrementally, so large frames never
//! pass through the encoder's byte queue.

use crate::bits::bit_writer::BitWriter;
use crate::utils::error::{JxlError, Result};

/// A precomputed frame streamed straight into the output.
#[derive(Debug, Clone)]
pub struct FastLosslessFrame {
    pub xsize: u32,
    pub ysize: u32,
    pub num_channels: u32,
    pub bits_per_sample: u32,
    /// Serialized frame header; empty until [`Self::prepare_header`] runs.
    header: Vec<u8>,
    /// Entropy-coded frame body, supplied at construction.
    body: Vec<u8>,
    /// Read position across header + body, advanced by `write_output`.
    pos: usize,
}

impl FastLosslessFrame {
    pub fn new(
        xsize: u32,
        ysize: u32,
        num_channels: u32,
        bits_per_sample: u32,
        body: Vec<u8>,
    ) -> Result<Self> {
        if xsize == 0 || ysize == 0 || xsize >= (1 << 30) || ysize >= (1 << 30) {
            return Err(JxlError::api("invalid fast lossless frame dimensions"));
        }
        if num_channels == 0 || num_channels > 4 {
            return Err(JxlError::api(
                "fast lossless frames carry between 1 and 4 channels",
            ));
        }
        if bits_per_sample == 0 || bits_per_sample > 16 {
            return Err(JxlError::api(
                "fast lossless frames carry at most 16 bits per sample",
            ));
        }
        Ok(Self {
            xsize,
            ysize,
            num_channels,
            bits_per_sample,
            header: Vec::new(),
            body,
            pos: 0,
        })
    }

    /// Finalizes the frame header once the last-frame decision is known.
    /// Called exactly once, when the frame is drained from the input queue.
    pub(crate) fn prepare_header(&mut self, is_last: bool) {
        debug_assert!(self.header.is_empty() && self.pos == 0);
        let mut w = BitWriter::new();
        w.write_bool(is_last);
        w.write_bits(30, u64::from(self.xsize));
        w.write_bits(30, u64::from(self.ysize));
        w.write_bits(4, u64::from(self.num_channels));
        w.write_bits(6, u64::from(self.bits_per_sample));
        self.header = w.into_bytes();
    }

    /// Total number of bytes this frame contributes to its codestream box.
    #[inline]
    pub(crate) fn output_size(&self) -> u64 {
        (self.header.len() + self.body.len()) as u64
    }

    /// Copies the next chunk into `buf`, advancing the read position.
    /// Returns the number of bytes copied; 0 means the frame is exhausted.
    pub(crate) fn write_output(&mut self, buf: &mut [u8]) -> usize {
        let mut written = 0;
        if self.pos < self.header.len() {
            let n = (self.header.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.header[self.pos..self.pos + n]);
            self.pos += n;
            written += n;
        }
        if written < buf.len() && self.pos >= self.header.len() {
            let body_pos = self.pos - self.header.len();
            if body_pos < self.body.len() {
                let n = (self.body.len() - body_pos).min(buf.len() - written);
                buf[written..written + n].copy_from_slice(&self.body[body_pos..body_pos + n]);
                self.pos += n;
                written += n;
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(body: Vec<u8>) -> FastLosslessFrame {
        FastLosslessFrame::new(64, 32, 3, 8, body).unwrap()
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(FastLosslessFrame::new(0, 32, 3, 8, vec![]).is_err());
        assert!(FastLosslessFrame::new(1 << 30, 32, 3, 8, vec![]).is_err());
        assert!(FastLosslessFrame::new(64, 32, 5, 8, vec![]).is_err());
        assert!(FastLosslessFrame::new(64, 32, 3, 17, vec![]).is_err());
    }

    #[test]
    fn header_encodes_dimensions_and_last_bit() {
        let mut f = frame(vec![]);
        f.prepare_header(true);
        // 1 + 30 + 30 + 4 + 6 = 71 bits, padded to 9 bytes.
        assert_eq!(f.output_size(), 9);
        let mut buf = [0u8; 16];
        let n = f.write_output(&mut buf);
        assert_eq!(n, 9);
        // last-frame bit is the first bit
        assert_eq!(buf[0] & 0x80, 0x80);

        let mut f = frame(vec![]);
        f.prepare_header(false);
        let mut buf = [0u8; 16];
        f.write_output(&mut buf);
        assert_eq!(buf[0] & 0x80, 0);
    }

    #[test]
    fn streams_in_arbitrary_chunks() {
        let body: Vec<u8> = (0..100).collect();
        let mut f = frame(body.clone());
        f.prepare_header(true);
        let total = f.output_size() as usize;

        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = f.write_output(&mut buf);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out.len(), total);
        assert_eq!(&out[out.len() - 100..], &body[..]);
    }

    #[test]
    fn exhausted_frame_yields_zero() {
        let mut f = frame(vec![1, 2, 3]);
        f.prepare_header(true);
        let mut buf = [0u8; 64];
        assert!(f.write_output(&mut buf) > 0);
        assert_eq!(f.write_output(&mut buf), 0);
    }
}

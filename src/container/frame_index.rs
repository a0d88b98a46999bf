//! The optional `jxli` frame index: per-frame byte offsets and durations,
//! accumulated while frames are drained and serialized once at stream end.
//!
//! The serialized form is a varint count of indexed frames, two fixed
//! 4-byte tick-rate fields, then one varint triple per indexed frame:
//! offset delta from the previously indexed frame (absolute for the first),
//! time delta in ticks, and the number of frames until the next indexed
//! frame. Offsets are codestream-relative, ignoring box framing.

use crate::bits::varint::encode_varint;
use crate::utils::error::Result;
use byteorder::{BigEndian, WriteBytesExt};

#[derive(Debug, Clone)]
struct FrameIndexEntry {
    /// Codestream byte offset of the frame's first byte.
    offset: u64,
    /// Frame duration in ticks.
    duration: u32,
    to_be_indexed: bool,
}

/// Accumulates per-frame records and serializes the index box payload.
#[derive(Debug, Clone, Default)]
pub struct FrameIndexBox {
    entries: Vec<FrameIndexEntry>,
}

impl FrameIndexBox {
    /// Records one completed frame. Called for every regular frame, whether
    /// or not it is flagged for indexing: unflagged frames still contribute
    /// to the frame-count deltas between indexed ones.
    pub fn add_frame(&mut self, offset: u64, duration: u32, to_be_indexed: bool) {
        self.entries.push(FrameIndexEntry {
            offset,
            duration,
            to_be_indexed,
        });
    }

    /// Whether any frame asked for an index box.
    pub fn wants_index(&self) -> bool {
        self.entries.iter().any(|e| e.to_be_indexed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Serializes the index payload. `tps_numerator` / `tps_denominator`
    /// are the animation tick rate fields stored verbatim.
    ///
    /// Each indexed frame's record is written when the *next* indexed frame
    /// is seen, because the record carries the frame-count to that next
    /// frame; the final record is flushed after the loop.
    pub fn serialize(&self, tps_numerator: u32, tps_denominator: u32) -> Result<Vec<u8>> {
        debug_assert!(!self.entries.is_empty());
        let indexed = self
            .entries
            .iter()
            .enumerate()
            .filter(|(i, e)| *i == 0 || e.to_be_indexed)
            .count();

        let mut out = Vec::new();
        encode_varint(indexed as u64, &mut out);
        out.write_u32::<BigEndian>(tps_numerator)?;
        out.write_u32::<BigEndian>(tps_denominator)?;

        // Offset deltas chain indexed frames together, so the previous and
        // the previous-previous indexed positions are both tracked.
        let mut prev_prev_ix: Option<usize> = None;
        let mut prev_ix = 0usize;
        let mut ticks_prev = 0u64;
        let mut ticks = 0u64;
        for i in 1..self.entries.len() {
            if self.entries[i].to_be_indexed {
                self.write_record(&mut out, prev_ix, prev_prev_ix, ticks_prev, i);
                prev_prev_ix = Some(prev_ix);
                prev_ix = i;
                ticks_prev = ticks;
                ticks += u64::from(self.entries[i].duration);
            }
        }
        // Implicit trailing record for the final frame.
        let end = self.entries.len();
        self.write_record(&mut out, prev_ix, prev_prev_ix, ticks_prev, end);
        Ok(out)
    }

    fn write_record(
        &self,
        out: &mut Vec<u8>,
        prev_ix: usize,
        prev_prev_ix: Option<usize>,
        ticks_prev: u64,
        next_ix: usize,
    ) {
        let mut offset = self.entries[prev_ix].offset;
        if let Some(pp) = prev_prev_ix {
            offset -= self.entries[pp].offset;
        }
        encode_varint(offset, out);
        encode_varint(ticks_prev, out);
        encode_varint((next_ix - prev_ix) as u64, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::varint::decode_varint;

    #[test]
    fn empty_index_not_wanted() {
        let fib = FrameIndexBox::default();
        assert!(!fib.wants_index());
    }

    #[test]
    fn unflagged_frames_do_not_request_index() {
        let mut fib = FrameIndexBox::default();
        fib.add_frame(0, 10, false);
        fib.add_frame(100, 10, false);
        assert!(!fib.wants_index());
    }

    #[test]
    fn single_entry_serialization() {
        let mut fib = FrameIndexBox::default();
        fib.add_frame(42, 10, true);
        let bytes = fib.serialize(10, 1).unwrap();

        let mut pos = 0;
        assert_eq!(decode_varint(&bytes, &mut pos), 1); // one indexed frame
        assert_eq!(&bytes[pos..pos + 4], &10u32.to_be_bytes());
        assert_eq!(&bytes[pos + 4..pos + 8], &1u32.to_be_bytes());
        pos += 8;
        assert_eq!(decode_varint(&bytes, &mut pos), 42); // absolute offset
        assert_eq!(decode_varint(&bytes, &mut pos), 0); // tick delta
        assert_eq!(decode_varint(&bytes, &mut pos), 1); // frames to next
        assert_eq!(pos, bytes.len());
    }

    #[test]
    fn offset_deltas_between_indexed_frames() {
        let mut fib = FrameIndexBox::default();
        fib.add_frame(16, 5, true); // frame 0, codestream starts at 16
        fib.add_frame(300, 5, false); // not indexed, still counted
        fib.add_frame(700, 5, true); // frame 2
        let bytes = fib.serialize(30, 1).unwrap();

        let mut pos = 0;
        assert_eq!(decode_varint(&bytes, &mut pos), 2);
        pos += 8; // tick rate fields
        // record for frame 0: absolute offset, 2 frames until the next
        assert_eq!(decode_varint(&bytes, &mut pos), 16);
        assert_eq!(decode_varint(&bytes, &mut pos), 0);
        assert_eq!(decode_varint(&bytes, &mut pos), 2);
        // trailing record for frame 2: offset delta from frame 0
        assert_eq!(decode_varint(&bytes, &mut pos), 700 - 16);
        assert_eq!(decode_varint(&bytes, &mut pos), 0);
        assert_eq!(decode_varint(&bytes, &mut pos), 1);
        assert_eq!(pos, bytes.len());
    }

    #[test]
    fn clear_resets_state() {
        let mut fib = FrameIndexBox::default();
        fib.add_frame(0, 1, true);
        fib.clear();
        assert!(!fib.wants_index());
    }
}

//! The seam between container assembly and pixel-domain compression.
//!
//! The encoder resolves every header-level decision (blending, durations,
//! last-frame status, reference slots) before calling into the codec, so a
//! codec implementation only turns pixels plus resolved fields into
//! entropy-coded frame bytes. Implementations may use an internal worker
//! pool; the encoder consumes results one frame at a time in queue order.

use crate::enc::frame::{BlendInfo, QueuedFrame};
use crate::enc::metadata::ImageMetadata;
use crate::utils::error::Result;

/// Frame-header fields as resolved by the encoder at drain time. Unlike the
/// caller-facing [`crate::enc::frame::FrameHeader`], these are final: timing
/// fields are already zeroed for still images and the last-frame flag is
/// decided.
#[derive(Debug, Clone)]
pub struct FrameFields {
    pub duration: u32,
    pub timecode: u32,
    pub is_last: bool,
    pub name: String,
    pub blend: BlendInfo,
    /// One entry per extra channel.
    pub ec_blend: Vec<BlendInfo>,
    /// Reference slot, 0..=2, 0 meaning "not saved".
    pub save_as_reference: u32,
    /// Crop origin; (0, 0) when the frame covers the canvas.
    pub origin: (i32, i32),
}

/// One frame's compressed output.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    /// Exact bit count of the frame payload; `bytes` is this rounded up to
    /// whole bytes.
    pub bits_written: u64,
}

/// Compresses one frame's pixel planes into codestream bytes.
pub trait FrameCodec {
    fn encode_frame(
        &self,
        metadata: &ImageMetadata,
        frame: &QueuedFrame,
        fields: &FrameFields,
    ) -> Result<EncodedFrame>;
}

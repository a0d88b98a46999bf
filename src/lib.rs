//! # JPEG XL Container Encoder
//!
//! Incremental assembly of JPEG XL streams: container box framing,
//! codestream header serialization, compliance-level selection, and a
//! pull-based output interface that produces bytes only when the caller
//! asks for them.
//!
//! This library is organized into several modules:
//! - `utils`: Error handling shared across the crate
//! - `bits`: Bit-level serialization and varint encoding
//! - `container`: Box framing, compliance levels, and the frame index
//! - `enc`: The encoder itself, frame/queue types, and the codec seam
//!
//! Pixel-domain compression lives behind the [`FrameCodec`] trait; this
//! crate owns everything from encoded frame bytes to the finished stream.

// Re-export commonly used types at the crate root
pub use utils::error::{JxlError, Result};

// Core modules
pub mod utils {
    pub mod error;
}

pub mod bits {
    pub mod bit_writer;
    pub mod varint;
}

pub mod container {
    pub mod boxes;
    pub mod frame_index;
    pub mod level;
}

pub mod enc {
    pub mod codec;
    pub mod encoder;
    pub mod fast_lossless;
    pub mod frame;
    pub mod metadata;
}

// Public API exports
pub use bits::bit_writer::BitWriter;
pub use container::boxes::{BoxType, CODESTREAM_SIGNATURE, CONTAINER_HEADER};
pub use container::level::{CodestreamLevel, LevelRequirement};
pub use enc::codec::{EncodedFrame, FrameCodec, FrameFields};
pub use enc::encoder::{FillResult, JxlEncoder};
pub use enc::fast_lossless::FastLosslessFrame;
pub use enc::frame::{
    BlendInfo, BlendMode, FrameHeader, FrameSettings, ImagePlane, LayerInfo,
};
pub use enc::metadata::{
    AnimationHeader, BasicInfo, ExtraChannelInfo, ExtraChannelType, ImageMetadata,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signatures() {
        assert_eq!(CODESTREAM_SIGNATURE, [0xFF, 0x0A]);
        assert_eq!(&CONTAINER_HEADER[..4], &[0x00, 0x00, 0x00, 0x0C]);
        assert_eq!(&CONTAINER_HEADER[4..8], b"JXL ");
    }
}

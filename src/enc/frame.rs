//! Per-frame settings, pixel planes, and the queued-input item variants.

use crate::container::boxes::BoxType;
use crate::enc::fast_lossless::FastLosslessFrame;
use crate::utils::error::{JxlError, Result};

/// How a frame (or an extra channel of it) is combined with the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Replace,
    Add,
    Blend,
    MulAdd,
    Mul,
}

/// Blending parameters for a frame or one of its extra channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlendInfo {
    pub mode: BlendMode,
    /// Reference canvas slot to blend against, 0..=3.
    pub source: u32,
    /// Index of the alpha channel used for alpha blending.
    pub alpha: u32,
    pub clamp: bool,
}

/// Placement and reference bookkeeping for one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LayerInfo {
    pub have_crop: bool,
    pub crop_x0: i32,
    pub crop_y0: i32,
    pub xsize: u32,
    pub ysize: u32,
    pub blend_info: BlendInfo,
    /// Reference slot this frame is saved to, 0 meaning "not saved"; must
    /// be below 3.
    pub save_as_reference: u32,
}

/// Caller-facing frame header fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// Duration in animation ticks; ignored unless animation is enabled.
    pub duration: u32,
    /// Timecode; ignored unless animation timecodes are enabled.
    pub timecode: u32,
    pub name: String,
    pub layer_info: LayerInfo,
}

/// Maximum frame name length in bytes.
pub const MAX_FRAME_NAME_LEN: usize = 1071;

/// Everything the caller configures per frame before enqueueing it.
#[derive(Debug, Clone, Default)]
pub struct FrameSettings {
    pub header: FrameHeader,
    pub lossless: bool,
    /// Request a record for this frame in the trailing frame index box.
    pub frame_index_box: bool,
    /// Per-extra-channel blending overrides; when shorter than the number
    /// of extra channels, the frame's own blend info is used for the rest.
    pub extra_channel_blend_info: Vec<BlendInfo>,
}

impl FrameSettings {
    /// Sets the frame name, capped at [`MAX_FRAME_NAME_LEN`] bytes.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        if name.len() > MAX_FRAME_NAME_LEN {
            return Err(JxlError::api(format!(
                "frame name can be at most {MAX_FRAME_NAME_LEN} bytes long"
            )));
        }
        self.header.name = name.to_owned();
        Ok(())
    }
}

/// One image plane of samples in scanline order.
#[derive(Debug, Clone)]
pub struct ImagePlane {
    pub xsize: u32,
    pub ysize: u32,
    pub samples: Vec<f32>,
}

impl ImagePlane {
    pub fn new(xsize: u32, ysize: u32, samples: Vec<f32>) -> Result<Self> {
        if samples.len() != xsize as usize * ysize as usize {
            return Err(JxlError::api(format!(
                "plane sample count {} does not match {}x{}",
                samples.len(),
                xsize,
                ysize
            )));
        }
        Ok(Self {
            xsize,
            ysize,
            samples,
        })
    }

    /// An all-zero plane, used to reserve extra channel slots until the
    /// caller supplies real samples.
    pub fn zeroed(xsize: u32, ysize: u32) -> Self {
        Self {
            xsize,
            ysize,
            samples: vec![0.0; xsize as usize * ysize as usize],
        }
    }
}

/// A pixel frame waiting in the input queue.
#[derive(Debug, Clone)]
pub struct QueuedFrame {
    pub settings: FrameSettings,
    pub color: Vec<ImagePlane>,
    pub extra_channels: Vec<ImagePlane>,
    /// One flag per extra channel; every flag must be set before the frame
    /// may be drained.
    pub ec_initialized: Vec<bool>,
}

/// An opaque metadata box waiting in the input queue.
#[derive(Debug, Clone)]
pub struct QueuedBox {
    pub box_type: BoxType,
    pub contents: Vec<u8>,
    pub compress: bool,
}

/// One unit of queued input. Exactly one production path per item; the
/// variants make that invariant structural.
#[derive(Debug)]
pub enum QueuedItem {
    /// A full pixel frame, to be run through the frame codec.
    Frame(Box<QueuedFrame>),
    /// A precomputed fast-path frame, streamed without re-encoding.
    FastLossless(FastLosslessFrame),
    /// An opaque metadata box.
    Box(QueuedBox),
}

impl QueuedItem {
    /// Whether this item occupies a frame slot (as opposed to a box slot).
    #[inline]
    pub fn is_frame(&self) -> bool {
        matches!(self, QueuedItem::Frame(_) | QueuedItem::FastLossless(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_header_is_still_image_replace() {
        let header = FrameHeader::default();
        assert_eq!(header.duration, 0);
        assert_eq!(header.timecode, 0);
        assert!(header.name.is_empty());
        assert!(!header.layer_info.have_crop);
        assert_eq!(header.layer_info.save_as_reference, 0);
        assert_eq!(header.layer_info.blend_info.mode, BlendMode::Replace);
    }

    #[test]
    fn frame_name_length_cap() {
        let mut settings = FrameSettings::default();
        assert!(settings.set_name(&"x".repeat(MAX_FRAME_NAME_LEN)).is_ok());
        assert!(settings.set_name(&"x".repeat(MAX_FRAME_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn plane_dimension_check() {
        assert!(ImagePlane::new(4, 4, vec![0.0; 16]).is_ok());
        assert!(ImagePlane::new(4, 4, vec![0.0; 15]).is_err());
        let zeroed = ImagePlane::zeroed(3, 2);
        assert_eq!(zeroed.samples.len(), 6);
    }
}

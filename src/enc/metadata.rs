//! Image-wide metadata: basic info, extra channel descriptions, ICC payload,
//! and the codestream header serialization that precedes the first frame.

use crate::bits::bit_writer::BitWriter;
use crate::bits::varint::encode_varint;
use crate::utils::error::{JxlError, Result};

/// Animation timing parameters, valid when `BasicInfo::have_animation` is
/// set. Tick rate is `tps_numerator / tps_denominator` ticks per second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationHeader {
    pub tps_numerator: u32,
    pub tps_denominator: u32,
    pub num_loops: u32,
    pub have_timecodes: bool,
}

impl Default for AnimationHeader {
    fn default() -> Self {
        Self {
            tps_numerator: 10,
            tps_denominator: 1,
            num_loops: 0,
            have_timecodes: false,
        }
    }
}

/// Caller-supplied image-wide settings, set once before any frame is added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicInfo {
    pub xsize: u32,
    pub ysize: u32,
    pub bits_per_sample: u32,
    pub exponent_bits_per_sample: u32,
    /// When false the frames are encoded in the library's internal color
    /// space; when true the original profile is preserved losslessly.
    pub uses_original_profile: bool,
    /// EXIF-style orientation, 1..=8.
    pub orientation: u32,
    /// 1 for grayscale, 3 for RGB.
    pub num_color_channels: u32,
    /// Includes the alpha channel: plain RGBA has exactly one.
    pub num_extra_channels: u32,
    /// Non-zero makes extra channel 0 an alpha channel with this depth.
    pub alpha_bits: u32,
    pub alpha_exponent_bits: u32,
    pub alpha_premultiplied: bool,
    pub have_animation: bool,
    pub animation: AnimationHeader,
    pub intrinsic_xsize: u32,
    pub intrinsic_ysize: u32,
}

impl Default for BasicInfo {
    fn default() -> Self {
        Self {
            xsize: 0,
            ysize: 0,
            bits_per_sample: 8,
            exponent_bits_per_sample: 0,
            uses_original_profile: false,
            orientation: 1,
            num_color_channels: 3,
            num_extra_channels: 0,
            alpha_bits: 0,
            alpha_exponent_bits: 0,
            alpha_premultiplied: false,
            have_animation: false,
            animation: AnimationHeader::default(),
            intrinsic_xsize: 0,
            intrinsic_ysize: 0,
        }
    }
}

/// The semantic role of an extra channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraChannelType {
    Alpha,
    Depth,
    SpotColor,
    SelectionMask,
    /// The K plane of CMYK input. Not allowed at compliance level 5.
    Black,
    Cfa,
    Thermal,
    Unknown,
}

impl ExtraChannelType {
    /// Wire code used in the codestream header.
    pub(crate) fn code(self) -> u8 {
        match self {
            ExtraChannelType::Alpha => 0,
            ExtraChannelType::Depth => 1,
            ExtraChannelType::SpotColor => 2,
            ExtraChannelType::SelectionMask => 3,
            ExtraChannelType::Black => 4,
            ExtraChannelType::Cfa => 5,
            ExtraChannelType::Thermal => 6,
            ExtraChannelType::Unknown => 7,
        }
    }
}

/// Per-channel metadata for one extra channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraChannelInfo {
    pub channel_type: ExtraChannelType,
    pub bits_per_sample: u32,
    pub exponent_bits_per_sample: u32,
    pub dim_shift: u32,
    pub name: String,
    pub alpha_premultiplied: bool,
}

impl ExtraChannelInfo {
    pub fn new(channel_type: ExtraChannelType) -> Self {
        Self {
            channel_type,
            bits_per_sample: 8,
            exponent_bits_per_sample: 0,
            dim_shift: 0,
            name: String::new(),
            alpha_premultiplied: false,
        }
    }
}

/// Aggregated encoder-side metadata derived from the caller's settings.
#[derive(Debug, Clone, Default)]
pub struct ImageMetadata {
    pub basic: BasicInfo,
    pub extra_channels: Vec<ExtraChannelInfo>,
    pub icc_profile: Option<Vec<u8>>,
    /// Whether 16-bit modular buffers suffice for lossless storage of the
    /// declared bit depths; a level-5 requirement.
    pub modular_16_bit_buffer_sufficient: bool,
}

impl ImageMetadata {
    /// Size of the uncompressed ICC profile, 0 when none is attached.
    #[inline]
    pub fn icc_size(&self) -> u64 {
        self.icc_profile.as_ref().map_or(0, |icc| icc.len() as u64)
    }

    #[inline]
    pub fn has_black_channel(&self) -> bool {
        self.extra_channels
            .iter()
            .any(|ec| ec.channel_type == ExtraChannelType::Black)
    }

    /// Serializes the codestream header: signature, dimensions, sample
    /// format, extra channel descriptions, animation parameters, then the
    /// byte-aligned ICC payload. The encoder validates the basic info
    /// (orientation in particular) before this runs.
    pub(crate) fn write_codestream_header(&self, w: &mut BitWriter) {
        w.write_bytes(&crate::container::boxes::CODESTREAM_SIGNATURE);
        w.write_bits(32, u64::from(self.basic.xsize));
        w.write_bits(32, u64::from(self.basic.ysize));
        w.write_bits(8, u64::from(self.basic.bits_per_sample));
        w.write_bits(8, u64::from(self.basic.exponent_bits_per_sample));
        w.write_bits(3, u64::from(self.basic.orientation - 1));
        w.write_bool(self.basic.uses_original_profile);
        w.write_bool(self.basic.have_animation);
        w.write_bool(self.icc_profile.is_some());
        w.write_bits(2, u64::from(self.basic.num_color_channels));
        w.write_bits(16, self.extra_channels.len() as u64);
        for ec in &self.extra_channels {
            w.write_bits(8, u64::from(ec.channel_type.code()));
            w.write_bits(8, u64::from(ec.bits_per_sample));
            w.write_bits(8, u64::from(ec.exponent_bits_per_sample));
            w.write_bits(8, u64::from(ec.dim_shift));
        }
        if self.basic.have_animation {
            w.write_bits(32, u64::from(self.basic.animation.tps_numerator));
            w.write_bits(32, u64::from(self.basic.animation.tps_denominator));
            w.write_bits(32, u64::from(self.basic.animation.num_loops));
            w.write_bool(self.basic.animation.have_timecodes);
        }
        w.zero_pad_to_byte();
        if let Some(icc) = &self.icc_profile {
            let mut len = Vec::new();
            encode_varint(icc.len() as u64, &mut len);
            w.write_bytes(&len);
            w.write_bytes(icc);
        }
    }
}

/// Validates a (bits, exponent bits) sample format pair.
///
/// Integer formats allow 1..=24 bits; float formats need 3..=24+E mantissa
/// range with at most 8 exponent bits.
pub fn check_valid_bit_depth(bits_per_sample: u32, exponent_bits_per_sample: u32) -> Result<()> {
    if exponent_bits_per_sample == 0 {
        if bits_per_sample == 0 || bits_per_sample > 24 {
            return Err(JxlError::api("invalid value for bits_per_sample"));
        }
    } else if exponent_bits_per_sample > 8
        || bits_per_sample > 24 + exponent_bits_per_sample
        || bits_per_sample < 3 + exponent_bits_per_sample
    {
        return Err(JxlError::api("invalid float sample format description"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_depth_validation() {
        assert!(check_valid_bit_depth(8, 0).is_ok());
        assert!(check_valid_bit_depth(24, 0).is_ok());
        assert!(check_valid_bit_depth(0, 0).is_err());
        assert!(check_valid_bit_depth(25, 0).is_err());
        // float16: 11-bit mantissa field, 5 exponent bits
        assert!(check_valid_bit_depth(16, 5).is_ok());
        assert!(check_valid_bit_depth(32, 8).is_ok());
        assert!(check_valid_bit_depth(7, 5).is_err());
        assert!(check_valid_bit_depth(16, 9).is_err());
    }

    #[test]
    fn header_starts_with_codestream_signature() {
        let mut metadata = ImageMetadata::default();
        metadata.basic.xsize = 64;
        metadata.basic.ysize = 64;
        let mut w = BitWriter::new();
        metadata.write_codestream_header(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(&bytes[..2], &[0xFF, 0x0A]);
        assert_eq!(&bytes[2..6], &64u32.to_be_bytes());
    }

    #[test]
    fn header_embeds_icc_after_alignment() {
        let mut metadata = ImageMetadata::default();
        metadata.basic.xsize = 8;
        metadata.basic.ysize = 8;
        metadata.icc_profile = Some(vec![0xAB; 200]);
        let mut w = BitWriter::new();
        metadata.write_codestream_header(&mut w);
        assert!(w.is_byte_aligned());
        let bytes = w.into_bytes();
        // varint 200 = 0xC8 0x01, followed by the raw profile
        let tail = &bytes[bytes.len() - 202..];
        assert_eq!(&tail[..2], &[0xC8, 0x01]);
        assert!(tail[2..].iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn black_channel_detection() {
        let mut metadata = ImageMetadata::default();
        assert!(!metadata.has_black_channel());
        metadata
            .extra_channels
            .push(ExtraChannelInfo::new(ExtraChannelType::Black));
        assert!(metadata.has_black_channel());
    }
}

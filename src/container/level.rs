//! Compliance level verification.
//!
//! The codestream declares a compliance level that bounds what a decoder
//! must be able to handle. Level 5 is the default, compatible profile with
//! tight dimension, ICC, and extra-channel limits; level 10 relaxes them.
//! Content exceeding even the level-10 ceilings cannot be encoded at all.

use crate::enc::metadata::ImageMetadata;
use crate::utils::error::{JxlError, Result};

/// The caller's level request. `Auto` resolves to the minimal compliant
/// level when the first byte is produced and is frozen from then on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodestreamLevel {
    #[default]
    Auto,
    Level5,
    Level10,
}

impl CodestreamLevel {
    /// The wire value written into the `jxll` box, if pinned.
    #[inline]
    pub fn value(self) -> Option<u8> {
        match self {
            CodestreamLevel::Auto => None,
            CodestreamLevel::Level5 => Some(5),
            CodestreamLevel::Level10 => Some(10),
        }
    }
}

/// The minimal level the current metadata can be encoded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelRequirement {
    Level5,
    Level10,
    /// Exceeds even the level-10 ceilings; unencodable.
    Incompatible,
}

/// Outcome of a level check, with the first constraint that failed.
#[derive(Debug, Clone, Copy)]
pub struct LevelCheck {
    pub required: LevelRequirement,
    pub reason: Option<&'static str>,
}

/// Computes the minimal compliant level for the current metadata.
///
/// Level 10 ceilings (beyond which the content is incompatible): each
/// dimension at most 2^30, area at most 2^40, ICC at most 2^28 bytes, at
/// most 256 extra channels. Level 5 additionally requires: 16-bit modular
/// buffers sufficient, dimensions at most 2^18, area at most 2^28, ICC at
/// most 2^22 bytes, at most 4 extra channels, and no black (CMYK) channel.
pub fn verify_level_settings(metadata: &ImageMetadata) -> LevelCheck {
    let xsize = u64::from(metadata.basic.xsize);
    let ysize = u64::from(metadata.basic.ysize);
    let icc_size = metadata.icc_size();
    let num_extra = metadata.extra_channels.len() as u64;

    // Level 10 ceilings.
    if xsize > (1 << 30) || ysize > (1 << 30) || xsize * ysize > (1 << 40) {
        return incompatible("too large image dimensions");
    }
    if icc_size > (1 << 28) {
        return incompatible("too large ICC profile size");
    }
    if num_extra > 256 {
        return incompatible("too many extra channels");
    }

    // Level 5 constraints.
    if !metadata.modular_16_bit_buffer_sufficient {
        return level10("too high modular bit depth");
    }
    if xsize > (1 << 18) || ysize > (1 << 18) || xsize * ysize > (1 << 28) {
        return level10("too large image dimensions");
    }
    if icc_size > (1 << 22) {
        return level10("too large ICC profile");
    }
    if num_extra > 4 {
        return level10("too many extra channels");
    }
    if metadata.has_black_channel() {
        return level10("CMYK channel not allowed");
    }

    LevelCheck {
        required: LevelRequirement::Level5,
        reason: None,
    }
}

/// Rejects metadata that a pinned level cannot carry. Never downgrades or
/// upgrades silently: a level-5 pin with level-10 content is an error, as is
/// incompatible content at any pin.
pub fn check_pinned_level(requested: CodestreamLevel, check: &LevelCheck) -> Result<()> {
    let reason = check.reason.unwrap_or("level constraint violated");
    match (check.required, requested) {
        (LevelRequirement::Incompatible, _) => Err(JxlError::api(format!(
            "codestream level verification for level 10 failed: {reason}"
        ))),
        (LevelRequirement::Level10, CodestreamLevel::Level5) => Err(JxlError::api(format!(
            "codestream level verification for level 5 failed: {reason}"
        ))),
        _ => Ok(()),
    }
}

fn incompatible(reason: &'static str) -> LevelCheck {
    LevelCheck {
        required: LevelRequirement::Incompatible,
        reason: Some(reason),
    }
}

fn level10(reason: &'static str) -> LevelCheck {
    LevelCheck {
        required: LevelRequirement::Level10,
        reason: Some(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enc::metadata::{ExtraChannelInfo, ExtraChannelType};

    fn metadata(xsize: u32, ysize: u32) -> ImageMetadata {
        let mut m = ImageMetadata {
            modular_16_bit_buffer_sufficient: true,
            ..ImageMetadata::default()
        };
        m.basic.xsize = xsize;
        m.basic.ysize = ysize;
        m
    }

    #[test]
    fn small_image_is_level5() {
        let check = verify_level_settings(&metadata(1024, 768));
        assert_eq!(check.required, LevelRequirement::Level5);
        assert!(check.reason.is_none());
    }

    #[test]
    fn wide_image_needs_level10() {
        let check = verify_level_settings(&metadata((1 << 18) + 1, 16));
        assert_eq!(check.required, LevelRequirement::Level10);
    }

    #[test]
    fn area_limit_is_separate_from_dimension_limit() {
        // Each dimension fits in 2^18 but the area exceeds 2^28.
        let check = verify_level_settings(&metadata(1 << 16, 1 << 16));
        assert_eq!(check.required, LevelRequirement::Level10);
    }

    #[test]
    fn oversized_image_is_incompatible() {
        let check = verify_level_settings(&metadata((1 << 30) + 1, 1));
        assert_eq!(check.required, LevelRequirement::Incompatible);
    }

    #[test]
    fn icc_thresholds() {
        let mut m = metadata(64, 64);
        m.icc_profile = Some(vec![0; (1 << 22) + 1]);
        assert_eq!(
            verify_level_settings(&m).required,
            LevelRequirement::Level10
        );
        m.icc_profile = Some(vec![0; (1 << 28) + 1]);
        assert_eq!(
            verify_level_settings(&m).required,
            LevelRequirement::Incompatible
        );
    }

    #[test]
    fn extra_channel_count_thresholds() {
        let mut m = metadata(64, 64);
        for _ in 0..5 {
            m.extra_channels
                .push(ExtraChannelInfo::new(ExtraChannelType::Unknown));
        }
        assert_eq!(
            verify_level_settings(&m).required,
            LevelRequirement::Level10
        );
    }

    #[test]
    fn black_channel_forces_level10() {
        let mut m = metadata(64, 64);
        m.extra_channels
            .push(ExtraChannelInfo::new(ExtraChannelType::Black));
        let check = verify_level_settings(&m);
        assert_eq!(check.required, LevelRequirement::Level10);
        assert!(check_pinned_level(CodestreamLevel::Level5, &check).is_err());
        assert!(check_pinned_level(CodestreamLevel::Level10, &check).is_ok());
        assert!(check_pinned_level(CodestreamLevel::Auto, &check).is_ok());
    }

    #[test]
    fn deep_modular_buffers_force_level10() {
        let mut m = metadata(64, 64);
        m.modular_16_bit_buffer_sufficient = false;
        assert_eq!(
            verify_level_settings(&m).required,
            LevelRequirement::Level10
        );
    }
}

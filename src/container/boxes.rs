// src/container/boxes.rs

//! Box framing for the ISO-BMFF style JPEG XL container.
//!
//! A box is a `[size][4-letter type][payload]` record with big-endian
//! lengths. This module owns the framing rules: the fixed signature and
//! file-type prologue, the level box, the complete-vs-partial codestream
//! decision, the `jxlp` sequence counter, and generic-box (`brob`)
//! compression.

use crate::utils::error::{JxlError, Result};
use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

/// The 4-character type tag of a container box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    /// Complete-codestream box.
    pub const JXLC: BoxType = BoxType(*b"jxlc");
    /// Partial-codestream box (counted).
    pub const JXLP: BoxType = BoxType(*b"jxlp");
    /// Codestream level box.
    pub const JXLL: BoxType = BoxType(*b"jxll");
    /// Frame index box.
    pub const JXLI: BoxType = BoxType(*b"jxli");
    /// JPEG reconstruction data box.
    pub const JBRD: BoxType = BoxType(*b"jbrd");
    /// Compressed generic box wrapper.
    pub const BROB: BoxType = BoxType(*b"brob");

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Type tags starting with "jxl" are reserved for codestream-structural
    /// boxes and may never be wrapped in a `brob` box.
    #[inline]
    pub fn has_reserved_prefix(&self) -> bool {
        self.0.starts_with(b"jxl")
    }
}

impl From<[u8; 4]> for BoxType {
    fn from(tag: [u8; 4]) -> Self {
        BoxType(tag)
    }
}

/// Signature box plus file-type box, emitted once at the head of every
/// container-mode stream: `\0\0\0\x0C JXL \r\n\x87\n` followed by a 20-byte
/// `ftyp` box with brand "jxl ".
pub const CONTAINER_HEADER: [u8; 32] = [
    0x00, 0x00, 0x00, 0x0C, b'J', b'X', b'L', b' ', 0x0D, 0x0A, 0x87, 0x0A, // signature box
    0x00, 0x00, 0x00, 0x14, b'f', b't', b'y', b'p', b'j', b'x', b'l', b' ', // ftyp box
    0x00, 0x00, 0x00, 0x00, b'j', b'x', b'l', b' ',
];

/// Header of the one-byte `jxll` level box; the level byte follows.
pub const LEVEL_BOX_HEADER: [u8; 8] = [0x00, 0x00, 0x00, 0x09, b'j', b'x', b'l', b'l'];

/// First two bytes of a bare (container-less) codestream.
pub const CODESTREAM_SIGNATURE: [u8; 2] = [0xFF, 0x0A];

/// Writes a box header for a payload of `payload_size` bytes.
///
/// The common form is a 4-byte big-endian total size (payload + 8) followed
/// by the type. Payloads too large for that get the extended form: size
/// field 1, then the type, then a 64-bit total size (payload + 16). An
/// unbounded box writes size 0, meaning "runs to end of stream".
pub fn append_box_header<W: Write>(
    w: &mut W,
    box_type: BoxType,
    payload_size: u64,
    unbounded: bool,
) -> Result<()> {
    if unbounded {
        w.write_u32::<BigEndian>(0)?;
        w.write_all(box_type.as_bytes())?;
        return Ok(());
    }
    let box_size = payload_size + 8;
    if box_size <= u64::from(u32::MAX) {
        w.write_u32::<BigEndian>(box_size as u32)?;
        w.write_all(box_type.as_bytes())?;
    } else {
        w.write_u32::<BigEndian>(1)?;
        w.write_all(box_type.as_bytes())?;
        // The extended size field itself adds 8 bytes to the total.
        w.write_u64::<BigEndian>(box_size + 8)?;
    }
    Ok(())
}

/// Writes the 4-byte `jxlp` sequence counter. The high bit marks the final
/// partial-codestream box of the stream.
pub fn append_jxlp_counter<W: Write>(w: &mut W, counter: u32, last: bool) -> Result<()> {
    debug_assert!(counter < 0x8000_0000);
    let value = if last { counter | 0x8000_0000 } else { counter };
    w.write_u32::<BigEndian>(value)?;
    Ok(())
}

/// Which box carries a frame's codestream bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodestreamBoxKind {
    /// One `jxlc` box holding the entire codestream.
    Complete,
    /// A counted `jxlp` box holding one chunk.
    Partial,
}

/// A frame's bytes go into a `jxlc` box only when they are both the first
/// and the last codestream chunk; that saves the 4-byte counter. Any
/// earlier `jxlp` emission, or more codestream to come, forces `jxlp`.
#[inline]
pub fn codestream_box_kind(last_frame: bool, jxlp_counter: u32) -> CodestreamBoxKind {
    if last_frame && jxlp_counter == 0 {
        CodestreamBoxKind::Complete
    } else {
        CodestreamBoxKind::Partial
    }
}

/// Checks whether a user box may be queued with the given compression flag.
///
/// Reserved-prefix types and the JPEG-reconstruction box must stay raw, and
/// a `brob` box may not be wrapped in another `brob` box.
pub fn validate_box_compression(box_type: BoxType, compress: bool) -> Result<()> {
    if !compress {
        return Ok(());
    }
    if box_type.has_reserved_prefix() {
        return Err(JxlError::api(
            "brob box may not contain a type starting with \"jxl\"",
        ));
    }
    if box_type == BoxType::JBRD {
        return Err(JxlError::api("jbrd box may not be brob compressed"));
    }
    if box_type == BoxType::BROB {
        return Err(JxlError::api("a brob box cannot contain another brob box"));
    }
    Ok(())
}

/// Builds the payload of a `brob` box: the original 4-letter type followed
/// by the brotli-compressed contents.
pub fn compress_brob_payload(box_type: BoxType, contents: &[u8], quality: u32) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(4 + contents.len() / 2 + 16);
    payload.extend_from_slice(box_type.as_bytes());
    let mut compressor = brotli::CompressorWriter::new(&mut payload, 4096, quality, 22);
    compressor
        .write_all(contents)
        .map_err(|e| JxlError::encode(format!("brotli compression for brob box failed: {e}")))?;
    drop(compressor); // finalizes the brotli stream
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn container_header_layout() {
        assert_eq!(CONTAINER_HEADER.len(), 32);
        assert_eq!(&CONTAINER_HEADER[4..8], b"JXL ");
        assert_eq!(&CONTAINER_HEADER[12..16], &20u32.to_be_bytes());
        assert_eq!(&CONTAINER_HEADER[16..20], b"ftyp");
        assert_eq!(&CONTAINER_HEADER[20..24], b"jxl ");
        assert_eq!(&LEVEL_BOX_HEADER[4..8], b"jxll");
    }

    #[test]
    fn small_box_header() {
        let mut out = Vec::new();
        append_box_header(&mut out, BoxType::JXLC, 100, false).unwrap();
        assert_eq!(out[..4], 108u32.to_be_bytes());
        assert_eq!(&out[4..8], b"jxlc");
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn extended_box_header() {
        let mut out = Vec::new();
        let payload = u64::from(u32::MAX);
        append_box_header(&mut out, BoxType::JXLC, payload, false).unwrap();
        assert_eq!(out[..4], 1u32.to_be_bytes());
        assert_eq!(&out[4..8], b"jxlc");
        assert_eq!(out[8..16], (payload + 16).to_be_bytes());
    }

    #[test]
    fn unbounded_box_header() {
        let mut out = Vec::new();
        append_box_header(&mut out, BoxType::JXLP, 0, true).unwrap();
        assert_eq!(out[..4], 0u32.to_be_bytes());
        assert_eq!(&out[4..8], b"jxlp");
    }

    #[test]
    fn jxlp_counter_last_bit() {
        let mut out = Vec::new();
        append_jxlp_counter(&mut out, 2, false).unwrap();
        append_jxlp_counter(&mut out, 3, true).unwrap();
        assert_eq!(out[..4], 2u32.to_be_bytes());
        assert_eq!(out[4..8], 0x8000_0003u32.to_be_bytes());
    }

    #[test]
    fn codestream_box_decision() {
        assert_eq!(codestream_box_kind(true, 0), CodestreamBoxKind::Complete);
        assert_eq!(codestream_box_kind(true, 1), CodestreamBoxKind::Partial);
        assert_eq!(codestream_box_kind(false, 0), CodestreamBoxKind::Partial);
        assert_eq!(codestream_box_kind(false, 5), CodestreamBoxKind::Partial);
    }

    #[test]
    fn compression_validation() {
        assert!(validate_box_compression(BoxType(*b"Exif"), true).is_ok());
        assert!(validate_box_compression(BoxType::JBRD, false).is_ok());
        assert!(matches!(
            validate_box_compression(BoxType::JBRD, true),
            Err(JxlError::ApiUsage(_))
        ));
        assert!(matches!(
            validate_box_compression(BoxType::BROB, true),
            Err(JxlError::ApiUsage(_))
        ));
        assert!(matches!(
            validate_box_compression(BoxType(*b"jxlx"), true),
            Err(JxlError::ApiUsage(_))
        ));
    }

    #[test]
    fn brob_payload_roundtrips() {
        let contents = b"some metadata payload, repeated: some metadata payload".to_vec();
        let payload = compress_brob_payload(BoxType(*b"xml "), &contents, 4).unwrap();
        assert_eq!(&payload[..4], b"xml ");

        let mut decompressor = brotli::Decompressor::new(&payload[4..], 4096);
        let mut restored = Vec::new();
        decompressor.read_to_end(&mut restored).unwrap();
        assert_eq!(restored, contents);
    }
}

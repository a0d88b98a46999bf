//! The incremental encoder: input queue, container assembly, and the
//! pull-based output interface.
//!
//! Input (frames and metadata boxes) accumulates in a single ordered queue.
//! Output is produced on demand: [`JxlEncoder::fill`] drains the two output
//! queues into the caller's buffer and, when both run dry, converts the next
//! queued input item into bytes. Nothing is encoded before the caller asks
//! for output, and input items are dropped as soon as their bytes are
//! produced, so memory stays proportional to one frame plus the caller's
//! consumption lag.

use std::collections::VecDeque;

use log::{debug, trace};

use crate::bits::bit_writer::BitWriter;
use crate::container::boxes::{
    self, BoxType, CodestreamBoxKind, CONTAINER_HEADER, LEVEL_BOX_HEADER,
};
use crate::container::frame_index::FrameIndexBox;
use crate::container::level::{
    check_pinned_level, verify_level_settings, CodestreamLevel, LevelRequirement,
};
use crate::enc::codec::{FrameCodec, FrameFields};
use crate::enc::fast_lossless::FastLosslessFrame;
use crate::enc::frame::{FrameSettings, ImagePlane, QueuedBox, QueuedFrame, QueuedItem};
use crate::enc::metadata::{
    check_valid_bit_depth, BasicInfo, ExtraChannelInfo, ExtraChannelType, ImageMetadata,
};
use crate::utils::error::{JxlError, Result};

/// Brotli quality used for `brob` boxes when the caller does not pick one.
const DEFAULT_BROTLI_EFFORT: u32 = 4;

/// Lifecycle of an encoder instance. One-time settings are only writable in
/// `Configuring`; `Streaming` begins when the first output byte is produced;
/// `Closed` means both input channels were closed (output may still be
/// draining).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderPhase {
    Configuring,
    Streaming,
    Closed,
}

/// Outcome of one [`JxlEncoder::fill`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillResult {
    /// Everything currently available was written; `written` may be 0 when
    /// the encoder is starved for input.
    Complete { written: usize },
    /// The buffer filled up with output still pending.
    NeedMoreOutput { written: usize },
}

impl FillResult {
    /// Bytes written into the caller's buffer by this call.
    #[inline]
    pub fn written(&self) -> usize {
        match *self {
            FillResult::Complete { written } | FillResult::NeedMoreOutput { written } => written,
        }
    }
}

/// Incremental container encoder.
pub struct JxlEncoder {
    codec: Box<dyn FrameCodec>,

    metadata: ImageMetadata,
    basic_info_set: bool,
    phase: EncoderPhase,
    header_emitted: bool,

    use_container: bool,
    use_boxes: bool,
    store_jpeg_metadata: bool,
    jpeg_metadata: Option<Vec<u8>>,
    codestream_level: CodestreamLevel,
    resolved_level: Option<u8>,
    brotli_effort: i32,

    input_queue: VecDeque<QueuedItem>,
    num_queued_frames: usize,
    num_queued_boxes: usize,
    frames_closed: bool,
    boxes_closed: bool,

    output_byte_queue: VecDeque<u8>,
    output_fast_frame_queue: VecDeque<FastLosslessFrame>,
    /// Codestream header bytes waiting to be prepended to the first frame's
    /// codestream box (container mode without a standalone header box).
    pending_codestream: Vec<u8>,
    jxlp_counter: u32,

    frame_index_box: FrameIndexBox,
    /// Set as soon as any queued frame asks for an index record; the
    /// trailing `jxli` box needs container framing, so this feeds the
    /// container decision.
    frame_index_requested: bool,
    /// Codestream byte offsets (box framing excluded), maintained across
    /// frames to feed the frame index.
    codestream_bytes_written_end_of_frame: u64,
    codestream_bytes_written_beginning_of_frame: u64,
}

impl JxlEncoder {
    pub fn new(codec: Box<dyn FrameCodec>) -> Self {
        Self {
            codec,
            metadata: ImageMetadata::default(),
            basic_info_set: false,
            phase: EncoderPhase::Configuring,
            header_emitted: false,
            use_container: false,
            use_boxes: false,
            store_jpeg_metadata: false,
            jpeg_metadata: None,
            codestream_level: CodestreamLevel::Auto,
            resolved_level: None,
            brotli_effort: -1,
            input_queue: VecDeque::new(),
            num_queued_frames: 0,
            num_queued_boxes: 0,
            frames_closed: false,
            boxes_closed: false,
            output_byte_queue: VecDeque::new(),
            output_fast_frame_queue: VecDeque::new(),
            pending_codestream: Vec::new(),
            jxlp_counter: 0,
            frame_index_box: FrameIndexBox::default(),
            frame_index_requested: false,
            codestream_bytes_written_end_of_frame: 0,
            codestream_bytes_written_beginning_of_frame: 0,
        }
    }

    /// Returns the encoder to its initial state, keeping only the codec.
    /// Queues, counters, metadata, and all one-time settings are cleared.
    pub fn reset(&mut self) {
        debug!("encoder reset");
        self.metadata = ImageMetadata::default();
        self.basic_info_set = false;
        self.phase = EncoderPhase::Configuring;
        self.header_emitted = false;
        self.use_container = false;
        self.use_boxes = false;
        self.store_jpeg_metadata = false;
        self.jpeg_metadata = None;
        self.codestream_level = CodestreamLevel::Auto;
        self.resolved_level = None;
        self.brotli_effort = -1;
        self.input_queue.clear();
        self.num_queued_frames = 0;
        self.num_queued_boxes = 0;
        self.frames_closed = false;
        self.boxes_closed = false;
        self.output_byte_queue.clear();
        self.output_fast_frame_queue.clear();
        self.pending_codestream.clear();
        self.jxlp_counter = 0;
        self.frame_index_box.clear();
        self.frame_index_requested = false;
        self.codestream_bytes_written_end_of_frame = 0;
        self.codestream_bytes_written_beginning_of_frame = 0;
    }

    fn ensure_configurable(&self) -> Result<()> {
        if self.phase != EncoderPhase::Configuring {
            return Err(JxlError::api(
                "encoder settings cannot be changed after output started or input was closed",
            ));
        }
        Ok(())
    }

    // ----- one-time configuration --------------------------------------

    /// Requests (or declines) container-format output. The container is
    /// forced regardless when boxes, JPEG reconstruction data, or a
    /// non-default codestream level require it.
    pub fn set_use_container(&mut self, use_container: bool) -> Result<()> {
        self.ensure_configurable()?;
        self.use_container = use_container;
        Ok(())
    }

    /// Enables metadata boxes. Must be called before [`Self::add_box`];
    /// implies container output.
    pub fn use_boxes(&mut self) -> Result<()> {
        self.ensure_configurable()?;
        self.use_boxes = true;
        Ok(())
    }

    /// Controls whether the JPEG reconstruction payload (if supplied) is
    /// stored in a `jbrd` box ahead of the frame data.
    pub fn set_store_jpeg_metadata(&mut self, store: bool) -> Result<()> {
        self.ensure_configurable()?;
        self.store_jpeg_metadata = store;
        Ok(())
    }

    /// Supplies a precomputed JPEG reconstruction payload. Emitted in a
    /// `jbrd` box when [`Self::set_store_jpeg_metadata`] is enabled.
    pub fn add_jpeg_metadata(&mut self, payload: Vec<u8>) -> Result<()> {
        self.ensure_configurable()?;
        if payload.is_empty() {
            return Err(JxlError::api("JPEG reconstruction payload is empty"));
        }
        self.jpeg_metadata = Some(payload);
        Ok(())
    }

    /// Pins the codestream level, or restores automatic selection.
    pub fn set_codestream_level(&mut self, level: CodestreamLevel) -> Result<()> {
        self.ensure_configurable()?;
        if self.basic_info_set {
            check_pinned_level(level, &verify_level_settings(&self.metadata))?;
        }
        self.codestream_level = level;
        Ok(())
    }

    /// The minimal level the current settings can be encoded at; `None`
    /// when they exceed even the level-10 ceilings. After streaming starts
    /// this reports the frozen, resolved level.
    pub fn required_codestream_level(&self) -> Option<u8> {
        if let Some(level) = self.resolved_level {
            return Some(level);
        }
        match verify_level_settings(&self.metadata).required {
            LevelRequirement::Level5 => Some(5),
            LevelRequirement::Level10 => Some(10),
            LevelRequirement::Incompatible => None,
        }
    }

    /// Brotli quality for compressed metadata boxes, 0..=11, or -1 for the
    /// default. Applies to boxes drained after the call.
    pub fn set_brotli_effort(&mut self, effort: i32) -> Result<()> {
        if !(-1..=11).contains(&effort) {
            return Err(JxlError::api("brotli effort must be in -1..=11"));
        }
        self.brotli_effort = effort;
        Ok(())
    }

    /// Sets the image-wide parameters. Validates sample formats, animation
    /// timing, and level constraints; on error the previous state is kept.
    pub fn set_basic_info(&mut self, info: BasicInfo) -> Result<()> {
        self.ensure_configurable()?;
        if info.xsize == 0 || info.ysize == 0 {
            return Err(JxlError::api("image dimensions must be at least 1x1"));
        }
        check_valid_bit_depth(info.bits_per_sample, info.exponent_bits_per_sample)?;
        if info.alpha_bits != 0 {
            check_valid_bit_depth(info.alpha_bits, info.alpha_exponent_bits)?;
            if info.num_extra_channels == 0 {
                return Err(JxlError::api(
                    "num_extra_channels must count the alpha channel",
                ));
            }
        }
        if !(1..=8).contains(&info.orientation) {
            return Err(JxlError::api("invalid value for orientation"));
        }
        if info.num_color_channels != 1 && info.num_color_channels != 3 {
            return Err(JxlError::api("num_color_channels must be 1 or 3"));
        }
        if info.have_animation
            && (info.animation.tps_numerator == 0 || info.animation.tps_denominator == 0)
        {
            return Err(JxlError::api(
                "animation ticks per second must be at least 1/1",
            ));
        }

        let mut candidate = ImageMetadata {
            basic: info,
            extra_channels: Vec::new(),
            icc_profile: self.metadata.icc_profile.clone(),
            modular_16_bit_buffer_sufficient: false,
        };
        candidate.modular_16_bit_buffer_sufficient = (!candidate.basic.uses_original_profile
            || candidate.basic.bits_per_sample <= 12)
            && candidate.basic.alpha_bits <= 12;
        for i in 0..candidate.basic.num_extra_channels {
            if i == 0 && candidate.basic.alpha_bits != 0 {
                let mut alpha = ExtraChannelInfo::new(ExtraChannelType::Alpha);
                alpha.bits_per_sample = candidate.basic.alpha_bits;
                alpha.exponent_bits_per_sample = candidate.basic.alpha_exponent_bits;
                alpha.alpha_premultiplied = candidate.basic.alpha_premultiplied;
                candidate.extra_channels.push(alpha);
            } else {
                candidate
                    .extra_channels
                    .push(ExtraChannelInfo::new(ExtraChannelType::Unknown));
            }
        }
        check_pinned_level(self.codestream_level, &verify_level_settings(&candidate))?;

        self.metadata = candidate;
        self.basic_info_set = true;
        Ok(())
    }

    /// Describes one extra channel declared in the basic info. The channel
    /// count itself is fixed by `num_extra_channels`.
    pub fn set_extra_channel_info(&mut self, index: usize, info: ExtraChannelInfo) -> Result<()> {
        self.ensure_configurable()?;
        if !self.basic_info_set {
            return Err(JxlError::api("basic info must be set first"));
        }
        if index >= self.metadata.extra_channels.len() {
            return Err(JxlError::api("extra channel index out of range"));
        }
        check_valid_bit_depth(info.bits_per_sample, info.exponent_bits_per_sample)?;

        let mut candidate = self.metadata.clone();
        candidate.extra_channels[index] = info;
        check_pinned_level(self.codestream_level, &verify_level_settings(&candidate))?;
        self.metadata = candidate;
        Ok(())
    }

    /// Attaches a raw ICC profile, embedded after the codestream header.
    pub fn set_icc_profile(&mut self, icc: Vec<u8>) -> Result<()> {
        self.ensure_configurable()?;
        if !self.basic_info_set {
            return Err(JxlError::api("basic info must be set first"));
        }
        if icc.is_empty() {
            return Err(JxlError::api("ICC profile is empty"));
        }
        let mut candidate = self.metadata.clone();
        candidate.icc_profile = Some(icc);
        check_pinned_level(self.codestream_level, &verify_level_settings(&candidate))?;
        self.metadata = candidate;
        Ok(())
    }

    // ----- input --------------------------------------------------------

    /// Queues one pixel frame. Frames are drained in queue order relative
    /// to every other queued item.
    pub fn add_image_frame(&mut self, settings: FrameSettings, color: Vec<ImagePlane>) -> Result<()> {
        if self.frames_closed {
            return Err(JxlError::api("frame input was already closed"));
        }
        if !self.basic_info_set {
            return Err(JxlError::api("basic info must be set before adding frames"));
        }
        if color.len() != self.metadata.basic.num_color_channels as usize {
            return Err(JxlError::api(format!(
                "expected {} color planes, got {}",
                self.metadata.basic.num_color_channels,
                color.len()
            )));
        }
        let layer = &settings.header.layer_info;
        let (fx, fy) = if layer.have_crop {
            (layer.xsize, layer.ysize)
        } else {
            (self.metadata.basic.xsize, self.metadata.basic.ysize)
        };
        if fx == 0 || fy == 0 {
            return Err(JxlError::api("frame dimensions must be at least 1x1"));
        }
        for plane in &color {
            if plane.xsize != fx || plane.ysize != fy {
                return Err(JxlError::api("color plane dimensions do not match the frame"));
            }
        }
        if settings.frame_index_box {
            // The jxli box needs container framing; once a bare codestream
            // has started there is no place left to put it.
            if self.header_emitted && !self.container_active() {
                return Err(JxlError::api(
                    "frame indexing requires the container, which this stream already omitted",
                ));
            }
            self.frame_index_requested = true;
        }

        let num_ec = self.metadata.extra_channels.len();
        let extra_channels = (0..num_ec).map(|_| ImagePlane::zeroed(fx, fy)).collect();
        self.input_queue.push_back(QueuedItem::Frame(Box::new(QueuedFrame {
            settings,
            color,
            extra_channels,
            ec_initialized: vec![false; num_ec],
        })));
        self.num_queued_frames += 1;
        trace!("queued frame ({} pending)", self.num_queued_frames);
        Ok(())
    }

    /// Supplies the sample buffer for one extra channel of the most
    /// recently queued frame.
    pub fn set_extra_channel_buffer(&mut self, index: usize, plane: ImagePlane) -> Result<()> {
        if self.frames_closed {
            return Err(JxlError::api("frame input was already closed"));
        }
        let Some(QueuedItem::Frame(frame)) = self.input_queue.back_mut() else {
            return Err(JxlError::api(
                "extra channel buffers attach to the most recently queued frame",
            ));
        };
        if index >= frame.ec_initialized.len() {
            return Err(JxlError::api("extra channel index out of range"));
        }
        let reference = &frame.color[0];
        if plane.xsize != reference.xsize || plane.ysize != reference.ysize {
            return Err(JxlError::api(
                "extra channel plane dimensions do not match the frame",
            ));
        }
        frame.extra_channels[index] = plane;
        frame.ec_initialized[index] = true;
        Ok(())
    }

    /// Queues a precomputed fast-lossless frame. Its body bytes are streamed
    /// into the output without another copy.
    pub fn add_fast_lossless_frame(&mut self, frame: FastLosslessFrame) -> Result<()> {
        if self.frames_closed {
            return Err(JxlError::api("frame input was already closed"));
        }
        if !self.basic_info_set {
            return Err(JxlError::api("basic info must be set before adding frames"));
        }
        if frame.xsize != self.metadata.basic.xsize || frame.ysize != self.metadata.basic.ysize {
            return Err(JxlError::api(
                "fast lossless frame dimensions do not match the basic info",
            ));
        }
        self.input_queue.push_back(QueuedItem::FastLossless(frame));
        self.num_queued_frames += 1;
        Ok(())
    }

    /// Queues a metadata box. On a validation error nothing is queued and
    /// no output state changes.
    pub fn add_box(&mut self, box_type: BoxType, contents: Vec<u8>, compress: bool) -> Result<()> {
        if self.boxes_closed {
            return Err(JxlError::api("box input was already closed"));
        }
        if !self.use_boxes {
            return Err(JxlError::api("use_boxes must be enabled before adding boxes"));
        }
        boxes::validate_box_compression(box_type, compress)?;
        self.input_queue.push_back(QueuedItem::Box(QueuedBox {
            box_type,
            contents,
            compress,
        }));
        self.num_queued_boxes += 1;
        trace!("queued box ({} pending)", self.num_queued_boxes);
        Ok(())
    }

    /// Declares that no further frames will be added. Required before the
    /// final frame's output can be framed as last.
    pub fn close_frames(&mut self) {
        self.frames_closed = true;
        self.update_closed_phase();
    }

    /// Declares that no further boxes will be added.
    pub fn close_boxes(&mut self) {
        self.boxes_closed = true;
        self.update_closed_phase();
    }

    /// Closes both input channels.
    pub fn close_input(&mut self) {
        self.close_frames();
        self.close_boxes();
    }

    fn update_closed_phase(&mut self) {
        if self.frames_closed && self.boxes_closed {
            self.phase = EncoderPhase::Closed;
        }
    }

    // ----- output -------------------------------------------------------

    /// Drains available output into `buf`. Returns `NeedMoreOutput` when the
    /// buffer filled up with more pending, `Complete` otherwise; a starved
    /// encoder (no queued input) completes with 0 bytes written.
    pub fn fill(&mut self, buf: &mut [u8]) -> Result<FillResult> {
        let mut written = 0;
        loop {
            if written == buf.len() {
                break;
            }
            if !self.output_byte_queue.is_empty() {
                let n = self.output_byte_queue.len().min(buf.len() - written);
                for (dst, src) in buf[written..written + n]
                    .iter_mut()
                    .zip(self.output_byte_queue.drain(..n))
                {
                    *dst = src;
                }
                written += n;
                continue;
            }
            if let Some(front) = self.output_fast_frame_queue.front_mut() {
                let n = front.write_output(&mut buf[written..]);
                if n == 0 {
                    self.output_fast_frame_queue.pop_front();
                } else {
                    written += n;
                }
                continue;
            }
            if self.has_queued_input() {
                self.refill_output_queue()?;
                continue;
            }
            break;
        }

        if self.has_pending_output() || self.has_queued_input() {
            Ok(FillResult::NeedMoreOutput { written })
        } else {
            Ok(FillResult::Complete { written })
        }
    }

    #[inline]
    fn has_pending_output(&self) -> bool {
        !self.output_byte_queue.is_empty() || !self.output_fast_frame_queue.is_empty()
    }

    #[inline]
    fn has_queued_input(&self) -> bool {
        !self.input_queue.is_empty()
            || (self.frames_closed && !self.pending_codestream.is_empty())
    }

    /// Whether the stream must be wrapped in the ISO-BMFF container.
    fn requires_container(&self, resolved_level: u8) -> bool {
        self.use_container
            || self.use_boxes
            || self.store_jpeg_metadata
            || self.frame_index_requested
            || resolved_level != 5
    }

    /// Whether the stream, once its prologue is out, carries the container.
    #[inline]
    fn container_active(&self) -> bool {
        self.resolved_level
            .is_some_and(|level| self.requires_container(level))
    }

    /// Converts the next unit of queued input into output bytes. Called
    /// only when both output queues are empty. Each invocation commits
    /// either the stream prologue or exactly one input item; on error the
    /// output queues are left unchanged.
    fn refill_output_queue(&mut self) -> Result<()> {
        if !self.header_emitted {
            return self.emit_prologue();
        }

        if self.input_queue.is_empty() {
            // Frames were closed with header bytes still waiting for a
            // codestream box of their own.
            debug_assert!(self.frames_closed && !self.pending_codestream.is_empty());
            let mut staged = Vec::new();
            let pending = std::mem::take(&mut self.pending_codestream);
            self.emit_codestream_box(&mut staged, &pending, true)?;
            self.output_byte_queue.extend(staged);
            return Ok(());
        }

        // Validate the head item before removing it, so a rejected item
        // leaves the queue intact.
        if let Some(QueuedItem::Frame(frame)) = self.input_queue.front() {
            if !frame.ec_initialized.iter().all(|&set| set) {
                return Err(JxlError::api(
                    "all extra channel buffers must be set before the frame can be encoded",
                ));
            }
            if frame.settings.header.layer_info.save_as_reference >= 3 {
                return Err(JxlError::api("save_as_reference must be less than 3"));
            }
        }

        let item = match self.input_queue.pop_front() {
            Some(item) => item,
            None => return Ok(()),
        };
        match item {
            QueuedItem::Frame(frame) => self.drain_frame(*frame),
            QueuedItem::FastLossless(frame) => self.drain_fast_lossless(frame),
            QueuedItem::Box(b) => self.drain_box(b),
        }
    }

    /// Emits the stream prologue: resolves and freezes the codestream
    /// level, serializes the codestream header, and writes the container
    /// signature, level box, and standalone header box where applicable.
    fn emit_prologue(&mut self) -> Result<()> {
        if !self.basic_info_set {
            return Err(JxlError::api(
                "basic info must be set before output can be produced",
            ));
        }
        let check = verify_level_settings(&self.metadata);
        check_pinned_level(self.codestream_level, &check)?;
        let level = self.codestream_level.value().unwrap_or(match check.required {
            LevelRequirement::Level10 => 10,
            _ => 5,
        });
        self.resolved_level = Some(level);

        let mut w = BitWriter::new();
        self.metadata.write_codestream_header(&mut w);
        let header_bytes = w.into_bytes();
        self.codestream_bytes_written_end_of_frame += header_bytes.len() as u64;

        let mut staged = Vec::new();
        if self.requires_container(level) {
            staged.extend_from_slice(&CONTAINER_HEADER);
            if level != 5 {
                staged.extend_from_slice(&LEVEL_BOX_HEADER);
                staged.push(level);
            }
            // JPEG reconstruction data and any leading metadata boxes must
            // precede the frame data, so the codestream header gets a
            // partial box of its own in those streams.
            let box_first = self.use_boxes
                && matches!(self.input_queue.front(), Some(QueuedItem::Box(_)));
            if self.store_jpeg_metadata || box_first {
                boxes::append_box_header(
                    &mut staged,
                    BoxType::JXLP,
                    header_bytes.len() as u64 + 4,
                    false,
                )?;
                boxes::append_jxlp_counter(&mut staged, self.jxlp_counter, false)?;
                staged.extend_from_slice(&header_bytes);
                self.jxlp_counter += 1;
                if self.store_jpeg_metadata {
                    if let Some(payload) = self.jpeg_metadata.as_deref() {
                        boxes::append_box_header(
                            &mut staged,
                            BoxType::JBRD,
                            payload.len() as u64,
                            false,
                        )?;
                        staged.extend_from_slice(payload);
                    }
                }
            } else {
                self.pending_codestream = header_bytes;
            }
        } else {
            staged.extend_from_slice(&header_bytes);
        }

        debug!(
            "stream prologue: level {}, container: {}",
            level,
            self.requires_container(level)
        );
        self.output_byte_queue.extend(staged);
        self.header_emitted = true;
        if self.phase == EncoderPhase::Configuring {
            self.phase = EncoderPhase::Streaming;
        }
        Ok(())
    }

    /// Whether the head frame of the input queue is the stream's final one.
    fn next_frame_is_last(&self) -> bool {
        self.frames_closed && self.num_queued_frames == 1
    }

    fn drain_frame(&mut self, frame: QueuedFrame) -> Result<()> {
        let last_frame = self.next_frame_is_last();
        let animation = &self.metadata.basic.animation;
        let have_animation = self.metadata.basic.have_animation;
        let header = &frame.settings.header;
        let fields = FrameFields {
            duration: if have_animation { header.duration } else { 0 },
            timecode: if have_animation && animation.have_timecodes {
                header.timecode
            } else {
                0
            },
            is_last: last_frame,
            name: header.name.clone(),
            blend: header.layer_info.blend_info,
            ec_blend: frame.settings.extra_channel_blend_info.clone(),
            save_as_reference: header.layer_info.save_as_reference,
            origin: if header.layer_info.have_crop {
                (header.layer_info.crop_x0, header.layer_info.crop_y0)
            } else {
                (0, 0)
            },
        };

        let encoded = self.codec.encode_frame(&self.metadata, &frame, &fields)?;
        self.codestream_bytes_written_beginning_of_frame =
            self.codestream_bytes_written_end_of_frame;
        self.codestream_bytes_written_end_of_frame += encoded.bits_written.div_ceil(8);
        self.frame_index_box.add_frame(
            self.codestream_bytes_written_beginning_of_frame,
            fields.duration,
            frame.settings.frame_index_box,
        );

        let mut staged = Vec::new();
        if self.container_active() {
            let pending = std::mem::take(&mut self.pending_codestream);
            let mut payload = pending;
            payload.extend_from_slice(&encoded.bytes);
            self.emit_codestream_box(&mut staged, &payload, last_frame)?;
            if last_frame && self.frame_index_box.wants_index() {
                self.emit_frame_index(&mut staged)?;
            }
        } else {
            staged.extend_from_slice(&encoded.bytes);
        }

        self.num_queued_frames -= 1;
        debug!(
            "drained frame: {} codestream bytes, last: {last_frame}",
            encoded.bytes.len()
        );
        self.output_byte_queue.extend(staged);
        Ok(())
    }

    fn drain_fast_lossless(&mut self, mut frame: FastLosslessFrame) -> Result<()> {
        let last_frame = self.next_frame_is_last();
        frame.prepare_header(last_frame);
        self.codestream_bytes_written_beginning_of_frame =
            self.codestream_bytes_written_end_of_frame;
        self.codestream_bytes_written_end_of_frame += frame.output_size();

        let mut staged = Vec::new();
        if self.container_active() {
            let pending = std::mem::take(&mut self.pending_codestream);
            let payload_size = pending.len() as u64 + frame.output_size();
            let kind = boxes::codestream_box_kind(last_frame, self.jxlp_counter);
            match kind {
                CodestreamBoxKind::Complete => {
                    boxes::append_box_header(&mut staged, BoxType::JXLC, payload_size, false)?;
                }
                CodestreamBoxKind::Partial => {
                    boxes::append_box_header(&mut staged, BoxType::JXLP, payload_size + 4, false)?;
                    boxes::append_jxlp_counter(&mut staged, self.jxlp_counter, last_frame)?;
                    self.jxlp_counter += 1;
                }
            }
            staged.extend_from_slice(&pending);
        }

        self.num_queued_frames -= 1;
        debug!(
            "drained fast lossless frame: {} codestream bytes, last: {last_frame}",
            frame.output_size()
        );
        if last_frame && self.frame_index_box.wants_index() {
            // The frame index trails the final codestream box, so the body
            // cannot go through the streaming queue here.
            let mut chunk = [0u8; 4096];
            loop {
                let n = frame.write_output(&mut chunk);
                if n == 0 {
                    break;
                }
                staged.extend_from_slice(&chunk[..n]);
            }
            self.emit_frame_index(&mut staged)?;
            self.output_byte_queue.extend(staged);
        } else {
            self.output_byte_queue.extend(staged);
            self.output_fast_frame_queue.push_back(frame);
        }
        Ok(())
    }

    fn drain_box(&mut self, b: QueuedBox) -> Result<()> {
        let mut staged = Vec::new();
        if b.compress {
            let quality = if self.brotli_effort >= 0 {
                self.brotli_effort as u32
            } else {
                DEFAULT_BROTLI_EFFORT
            };
            let payload = boxes::compress_brob_payload(b.box_type, &b.contents, quality)?;
            boxes::append_box_header(&mut staged, BoxType::BROB, payload.len() as u64, false)?;
            staged.extend_from_slice(&payload);
        } else {
            boxes::append_box_header(&mut staged, b.box_type, b.contents.len() as u64, false)?;
            staged.extend_from_slice(&b.contents);
        }

        self.num_queued_boxes -= 1;
        trace!(
            "drained {} box, compressed: {}",
            String::from_utf8_lossy(b.box_type.as_bytes()),
            b.compress
        );
        self.output_byte_queue.extend(staged);
        Ok(())
    }

    /// Frames one codestream chunk as a `jxlc` or counted `jxlp` box.
    fn emit_codestream_box(&mut self, out: &mut Vec<u8>, payload: &[u8], last: bool) -> Result<()> {
        match boxes::codestream_box_kind(last, self.jxlp_counter) {
            CodestreamBoxKind::Complete => {
                boxes::append_box_header(out, BoxType::JXLC, payload.len() as u64, false)?;
            }
            CodestreamBoxKind::Partial => {
                boxes::append_box_header(out, BoxType::JXLP, payload.len() as u64 + 4, false)?;
                boxes::append_jxlp_counter(out, self.jxlp_counter, last)?;
                self.jxlp_counter += 1;
            }
        }
        out.extend_from_slice(payload);
        Ok(())
    }

    /// Serializes and appends the `jxli` frame index box.
    fn emit_frame_index(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let animation = &self.metadata.basic.animation;
        let payload = self
            .frame_index_box
            .serialize(animation.tps_numerator, animation.tps_denominator)?;
        boxes::append_box_header(out, BoxType::JXLI, payload.len() as u64, false)?;
        out.extend_from_slice(&payload);
        debug!("emitted frame index box, {} bytes", payload.len());
        Ok(())
    }
}

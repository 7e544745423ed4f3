use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::compositor::{BackgroundFill, Compositor};
use crate::parser::{DecodeError, FrameDecoder, GlobalHeader, LoopCount};

/// Duration of a frame that carries no delay of its own, in seconds.
pub const DEFAULT_FRAME_DURATION: f64 = 0.05;

/// Shortest time a frame is displayed for, in seconds.
pub const MIN_FRAME_DURATION: f64 = 0.02;

/// Default cap on the RGBA canvas, in bytes.
pub const DEFAULT_MAX_ALLOC: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeOptions {
    /// Duration used when a frame has no graphic control extension or a zero
    /// delay, in seconds.
    pub default_delay: f64,
    pub background: BackgroundFill,
    /// Largest canvas the decoder will allocate, in bytes. `None` lifts the
    /// limit.
    pub max_alloc: Option<u64>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            default_delay: DEFAULT_FRAME_DURATION,
            background: BackgroundFill::default(),
            max_alloc: Some(DEFAULT_MAX_ALLOC),
        }
    }
}

/// A fully composited frame, ready to be displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationFrame {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
    duration: f64,
}

impl AnimationFrame {
    /// `pixels` is RGBA, four bytes per pixel, row by row.
    pub fn new(width: u32, height: u32, pixels: impl Into<Arc<[u8]>>, duration: f64) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
            duration,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Duration in seconds as stored in the stream.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// How long the frame stays on screen, never shorter than
    /// [`MIN_FRAME_DURATION`].
    pub fn display_duration(&self) -> Duration {
        let seconds = if self.duration.is_nan() {
            MIN_FRAME_DURATION
        } else {
            self.duration.clamp(MIN_FRAME_DURATION, f64::from(u32::MAX))
        };
        Duration::from_secs_f64(seconds)
    }
}

/// Lazily decodes a GIF stream into [`AnimationFrame`]s.
///
/// Once an error has been yielded the iterator is exhausted. Creating a new
/// decoder over the same bytes yields the same frames again.
#[derive(Debug)]
pub struct GifDecoder<'a> {
    frames: FrameDecoder<'a>,
    compositor: Compositor,
    options: DecodeOptions,
    finished: bool,
}

impl<'a> GifDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        Self::with_options(bytes, DecodeOptions::default())
    }

    pub fn with_options(bytes: &'a [u8], options: DecodeOptions) -> Result<Self, DecodeError> {
        let frames = FrameDecoder::new(bytes)?;
        check_canvas_size(frames.header(), options.max_alloc)?;
        let compositor = Compositor::new(frames.header(), options.background);

        Ok(Self {
            frames,
            compositor,
            options,
            finished: false,
        })
    }

    pub fn header(&self) -> &GlobalHeader {
        self.frames.header()
    }

    pub fn loop_count(&self) -> Option<LoopCount> {
        self.frames.loop_count()
    }

    fn next_frame(&mut self) -> Result<Option<AnimationFrame>, DecodeError> {
        let Some(frame) = self.frames.next_frame()? else {
            return Ok(None);
        };

        let pixels = self.compositor.composite(&frame)?;
        let duration = match frame.control {
            Some(control) if control.delay_time > 0 => f64::from(control.delay_time) / 100.0,
            _ => self.options.default_delay,
        };

        Ok(Some(AnimationFrame::new(
            self.compositor.width() as u32,
            self.compositor.height() as u32,
            pixels,
            duration,
        )))
    }
}

fn check_canvas_size(header: &GlobalHeader, max_alloc: Option<u64>) -> Result<(), DecodeError> {
    let (width, height) = (header.screen_width, header.screen_height);
    let needed = u64::from(width)
        .checked_mul(u64::from(height))
        .and_then(|pixels| pixels.checked_mul(4));

    match (needed, max_alloc) {
        (Some(needed), Some(limit)) if needed <= limit => Ok(()),
        (Some(_), None) => Ok(()),
        _ => Err(DecodeError::UnsupportedFeature(format!(
            "{width}x{height} canvas exceeds the allocation limit"
        ))),
    }
}

impl Iterator for GifDecoder<'_> {
    type Item = Result<AnimationFrame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let next = self.next_frame().transpose();
        if !matches!(next, Some(Ok(_))) {
            self.finished = true;
        }
        next
    }
}

impl std::iter::FusedIterator for GifDecoder<'_> {}

/// Frames decoded before the first error, and that error.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartialDecode {
    pub frames: Vec<AnimationFrame>,
    pub error: Option<DecodeError>,
}

/// Decodes every frame of `bytes`, failing on the first error.
pub fn decode(bytes: &[u8]) -> Result<Vec<AnimationFrame>, DecodeError> {
    decode_with_options(bytes, DecodeOptions::default())
}

pub fn decode_with_options(
    bytes: &[u8],
    options: DecodeOptions,
) -> Result<Vec<AnimationFrame>, DecodeError> {
    let frames = GifDecoder::with_options(bytes, options)?.collect::<Result<Vec<_>, _>>()?;
    debug!("decoded {} frames", frames.len());
    Ok(frames)
}

/// Decodes as many frames as possible, returning them together with the
/// error that stopped decoding, if any.
pub fn decode_lenient(bytes: &[u8]) -> PartialDecode {
    decode_lenient_with_options(bytes, DecodeOptions::default())
}

pub fn decode_lenient_with_options(bytes: &[u8], options: DecodeOptions) -> PartialDecode {
    let mut result = PartialDecode::default();

    let decoder = match GifDecoder::with_options(bytes, options) {
        Ok(decoder) => decoder,
        Err(err) => {
            result.error = Some(err);
            return result;
        }
    };

    for frame in decoder {
        match frame {
            Ok(frame) => result.frames.push(frame),
            Err(err) => {
                warn!("stopped decoding after {} frames: {}", result.frames.len(), err);
                result.error = Some(err);
                break;
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(duration: f64) -> AnimationFrame {
        AnimationFrame::new(1, 1, vec![0, 0, 0, 0], duration)
    }

    #[test]
    fn display_duration_is_clamped() {
        assert_eq!(frame(0.0).display_duration(), Duration::from_millis(20));
        assert_eq!(frame(0.01).display_duration(), Duration::from_millis(20));
        assert_eq!(frame(-1.0).display_duration(), Duration::from_millis(20));
        assert_eq!(frame(f64::NAN).display_duration(), Duration::from_millis(20));
        assert_eq!(frame(0.1).display_duration(), Duration::from_millis(100));
        assert_eq!(frame(0.01).duration(), 0.01);
    }

    #[test]
    fn frames_share_pixels_on_clone() {
        let original = frame(0.1);
        let copy = original.clone();
        assert!(std::ptr::eq(original.pixels(), copy.pixels()));
    }

    #[test]
    fn empty_input_is_not_a_gif() {
        assert_eq!(decode(&[]), Err(DecodeError::InvalidSignature));

        let partial = decode_lenient(&[]);
        assert!(partial.frames.is_empty());
        assert_eq!(partial.error, Some(DecodeError::InvalidSignature));
    }

    #[test]
    fn canvas_size_against_limit() {
        let header = GlobalHeader {
            screen_width: 100,
            screen_height: 100,
            ..GlobalHeader::default()
        };

        assert!(check_canvas_size(&header, Some(40_000)).is_ok());
        assert!(check_canvas_size(&header, None).is_ok());
        assert!(matches!(
            check_canvas_size(&header, Some(39_999)),
            Err(DecodeError::UnsupportedFeature(_))
        ));
    }
}

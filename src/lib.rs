//! GIF decoding and playback.
//!
//! [`decode`] turns the bytes of a GIF87a/GIF89a file into fully composited
//! RGBA frames with display durations, and [`AnimationScheduler`] plays such
//! frames in a loop through a callback.

mod animation;
mod compositor;
pub mod parser;
mod scheduler;

pub use animation::{
    decode, decode_lenient, decode_lenient_with_options, decode_with_options, AnimationFrame,
    DecodeOptions, GifDecoder, PartialDecode, DEFAULT_FRAME_DURATION, DEFAULT_MAX_ALLOC,
    MIN_FRAME_DURATION,
};
pub use compositor::{BackgroundFill, Compositor};
pub use parser::{DecodeError, DisposalMethod, LoopCount, Malformed};
pub use scheduler::{spawn_decode, AnimationScheduler, STREAM_CHANNEL_CAPACITY};

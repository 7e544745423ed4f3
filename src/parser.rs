mod bit_reader;
mod decoder;
mod lzw;

use thiserror::Error;

pub use decoder::{
    ColorTable, DecodedFrame, FrameDecoder, GlobalHeader, GraphicControlExtension,
    ImageDescriptor, LoopCount, Version,
};
pub use lzw::LzwDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisposalMethod {
    /// No disposal specified, the canvas is left as is.
    #[default]
    Unspecified,
    DoNotDispose,
    RestoreToBackground,
    RestoreToPrevious,
}

impl DisposalMethod {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DisposalMethod::Unspecified),
            1 => Some(DisposalMethod::DoNotDispose),
            2 => Some(DisposalMethod::RestoreToBackground),
            3 => Some(DisposalMethod::RestoreToPrevious),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("signature is invalid, expected GIF87a or GIF89a")]
    InvalidSignature,

    #[error("malformed stream: {0}")]
    MalformedStream(#[from] Malformed),

    #[error("stream ended in the middle of a block")]
    TruncatedData,

    #[error("encountered invalid lzw code {0}")]
    InvalidLzwCode(u16),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Malformed {
    #[error("encountered unexpected label 0x{0:02x}")]
    UnexpectedLabel(u8),

    #[error("frame at ({left}, {top}) sized {width}x{height} exceeds the {screen_width}x{screen_height} logical screen")]
    FrameOutOfBounds {
        left: u16,
        top: u16,
        width: u16,
        height: u16,
        screen_width: u16,
        screen_height: u16,
    },

    #[error("extension with label 0x{label:02x} has block size {size}")]
    ExtensionBlockSize { label: u8, size: u8 },
}

use super::lzw::LzwDecoder;
use super::{DecodeError, DisposalMethod, Malformed};

use log::{debug, warn};

const EXTENSION_INTRODUCER: u8 = 0x21;
const IMAGE_DESCRIPTOR_LABEL: u8 = 0x2c;
const TRAILER_LABEL: u8 = 0x3b;

// Extension labels
const APPLICATION_EXTENSION: u8 = 0xff;
const COMMENT_EXTENSION: u8 = 0xfe;
const GRAPHIC_CONTROL_EXTENSION: u8 = 0xf9;
const PLAIN_TEXT_EXTENSION: u8 = 0x01;

const GRAPHIC_CONTROL_BLOCK_SIZE: u8 = 4;

#[derive(Debug)]
enum ExtensionType {
    Application,
    Comment,
    GraphicControl,
    PlainText,
    Unknown(u8),
}

impl From<u8> for ExtensionType {
    fn from(value: u8) -> Self {
        use ExtensionType::*;

        match value {
            APPLICATION_EXTENSION => Application,
            COMMENT_EXTENSION => Comment,
            GRAPHIC_CONTROL_EXTENSION => GraphicControl,
            PLAIN_TEXT_EXTENSION => PlainText,
            label => Unknown(label),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    V87a,
    #[default]
    V89a,
}

impl TryFrom<&[u8]> for Version {
    type Error = DecodeError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        match value {
            b"87a" => Ok(Version::V87a),
            b"89a" => Ok(Version::V89a),
            _ => Err(DecodeError::InvalidSignature),
        }
    }
}

/// An ordered list of RGB colors, holding a power of two between 2 and 256
/// entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTable {
    entries: Vec<[u8; 3]>,
}

impl ColorTable {
    pub fn from_rgb(bytes: &[u8]) -> Result<Self, DecodeError> {
        let len = bytes.len() / 3;
        if bytes.len() % 3 != 0 || !len.is_power_of_two() || !(2..=256).contains(&len) {
            return Err(DecodeError::UnsupportedFeature(format!(
                "color table of {} bytes",
                bytes.len()
            )));
        }

        let entries = bytes
            .chunks_exact(3)
            .map(|rgb| [rgb[0], rgb[1], rgb[2]])
            .collect();

        Ok(Self { entries })
    }

    pub fn get(&self, index: u8) -> Option<[u8; 3]> {
        self.entries.get(usize::from(index)).copied()
    }

    pub fn entries(&self) -> &[[u8; 3]] {
        &self.entries
    }

    // the size field in a packed byte encodes 2^(n + 1) entries
    fn byte_len(packed_size: u8) -> usize {
        3 * (2 << (packed_size & 0b00000111))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GlobalHeader {
    pub version: Version,
    pub screen_width: u16,
    pub screen_height: u16,
    pub color_resolution: u8,
    pub global_color_table: Option<ColorTable>,
    pub background_color_index: u8,
    pub pixel_aspect_ratio: u8,
}

impl GlobalHeader {
    pub fn has_global_color_table(&self) -> bool {
        self.global_color_table.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphicControlExtension {
    pub disposal_method: DisposalMethod,
    pub user_input: bool,
    /// Delay in hundredths of a second.
    pub delay_time: u16,
    pub transparent_index: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub local_color_table: Option<ColorTable>,
    pub interlaced: bool,
}

impl ImageDescriptor {
    pub fn has_local_color_table(&self) -> bool {
        self.local_color_table.is_some()
    }
}

/// One image of the stream, still as color table indices.
///
/// Rows are in stream order, for interlaced images that is the order of the
/// interlace passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub descriptor: ImageDescriptor,
    pub control: Option<GraphicControlExtension>,
    pub indices: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    Infinite,
    Finite(u16),
}

#[derive(Debug)]
struct PendingFrame {
    control: Option<GraphicControlExtension>,
    descriptor: ImageDescriptor,
}

#[derive(Debug)]
enum ParserState {
    DetermineNextBlock(Option<GraphicControlExtension>),
    ProcessExtension(u8, Option<GraphicControlExtension>),
    ProcessImageDescriptor(Option<GraphicControlExtension>),
    ProcessLocalColorTable(PendingFrame, usize),
    ProcessImageData(PendingFrame),
    ProcessTrailer,

    FrameReady(DecodedFrame),
    Done,
}

/// Walks the block structure of a GIF stream, producing one
/// [`DecodedFrame`] per image descriptor.
#[derive(Debug)]
pub struct FrameDecoder<'a> {
    buf: &'a [u8],
    position: usize,
    header: GlobalHeader,
    loop_count: Option<LoopCount>,
    done: bool,
}

impl<'a> FrameDecoder<'a> {
    /// Parses the header and global color table, leaving the decoder at the
    /// first block.
    pub fn new(buf: &'a [u8]) -> Result<Self, DecodeError> {
        let mut decoder = Self {
            buf,
            position: 0,
            header: GlobalHeader::default(),
            loop_count: None,
            done: false,
        };
        decoder.header = decoder.read_header()?;

        Ok(decoder)
    }

    pub fn header(&self) -> &GlobalHeader {
        &self.header
    }

    /// Loop count announced by a NETSCAPE2.0 application extension, if one
    /// has been read so far.
    pub fn loop_count(&self) -> Option<LoopCount> {
        self.loop_count
    }

    pub fn next_frame(&mut self) -> Result<Option<DecodedFrame>, DecodeError> {
        if self.done {
            return Ok(None);
        }

        let mut state = ParserState::DetermineNextBlock(None);
        loop {
            debug!("begin parsing state {:?}", state);

            match self.process_next_state(state) {
                Ok(ParserState::FrameReady(frame)) => return Ok(Some(frame)),
                Ok(ParserState::Done) => {
                    self.done = true;
                    return Ok(None);
                }
                Ok(next_state) => state = next_state,
                Err(err) => {
                    self.done = true;
                    return Err(err);
                }
            }
        }
    }

    fn read_header(&mut self) -> Result<GlobalHeader, DecodeError> {
        let magic = self
            .read_bytes(6)
            .map_err(|_| DecodeError::InvalidSignature)?;
        if &magic[..3] != b"GIF" {
            return Err(DecodeError::InvalidSignature);
        }
        let version = Version::try_from(&magic[3..])?;
        debug!("processed signature, got {:?}", version);

        let screen_width = self.read_u16()?;
        let screen_height = self.read_u16()?;

        let packed_fields = self.read_byte()?;

        // packed field start
        let global_color_table_flag = packed_fields & 0b10000000 != 0;
        let color_resolution = (packed_fields >> 4) & 0b00000111;
        // packed field end

        let background_color_index = self.read_byte()?;
        let pixel_aspect_ratio = self.read_byte()?;

        let global_color_table = if global_color_table_flag {
            let size = ColorTable::byte_len(packed_fields);
            Some(ColorTable::from_rgb(self.read_bytes(size)?)?)
        } else {
            None
        };

        let header = GlobalHeader {
            version,
            screen_width,
            screen_height,
            color_resolution,
            global_color_table,
            background_color_index,
            pixel_aspect_ratio,
        };
        debug!(
            "processed logical screen descriptor, {}x{}, global color table: {}",
            header.screen_width,
            header.screen_height,
            header.has_global_color_table()
        );

        Ok(header)
    }

    fn process_next_state(&mut self, next_state: ParserState) -> Result<ParserState, DecodeError> {
        use ParserState::*;

        match next_state {
            DetermineNextBlock(graphic_control_extension) => {
                if self.position == self.buf.len() {
                    debug!("stream ended without a trailer");
                    return Ok(Done);
                }

                match self.read_byte()? {
                    // extension introducer means that a label follows determining what exact type
                    // of extension it is.
                    EXTENSION_INTRODUCER => {
                        Ok(ProcessExtension(self.read_byte()?, graphic_control_extension))
                    }
                    IMAGE_DESCRIPTOR_LABEL => Ok(ProcessImageDescriptor(graphic_control_extension)),
                    TRAILER_LABEL => Ok(ProcessTrailer),
                    label => Err(Malformed::UnexpectedLabel(label).into()),
                }
            }
            ProcessExtension(label, graphic_control_extension) => {
                self.process_extension(ExtensionType::from(label), graphic_control_extension)
            }
            ProcessImageDescriptor(graphic_control_extension) => {
                let left = self.read_u16()?;
                let top = self.read_u16()?;

                let width = self.read_u16()?;
                let height = self.read_u16()?;

                let packed_fields = self.read_byte()?;

                let local_color_table_flag = packed_fields & 0b10000000 != 0;
                let interlaced = packed_fields & 0b01000000 != 0;

                let screen_width = self.header.screen_width;
                let screen_height = self.header.screen_height;
                if u32::from(left) + u32::from(width) > u32::from(screen_width)
                    || u32::from(top) + u32::from(height) > u32::from(screen_height)
                {
                    return Err(Malformed::FrameOutOfBounds {
                        left,
                        top,
                        width,
                        height,
                        screen_width,
                        screen_height,
                    }
                    .into());
                }

                let frame = PendingFrame {
                    control: graphic_control_extension,
                    descriptor: ImageDescriptor {
                        left,
                        top,
                        width,
                        height,
                        local_color_table: None,
                        interlaced,
                    },
                };

                let next_state = if local_color_table_flag {
                    ProcessLocalColorTable(frame, ColorTable::byte_len(packed_fields))
                } else {
                    ProcessImageData(frame)
                };

                Ok(next_state)
            }
            ProcessLocalColorTable(mut frame, size) => {
                frame.descriptor.local_color_table = Some(ColorTable::from_rgb(self.read_bytes(size)?)?);

                Ok(ProcessImageData(frame))
            }
            ProcessImageData(frame) => {
                let lzw_code_size = self.read_byte()?;
                let data_stream = self.read_data_sub_blocks()?;

                let indices = LzwDecoder::new(lzw_code_size)?.decode(&data_stream)?;
                debug!(
                    "decoded {} indices for a {}x{} image",
                    indices.len(),
                    frame.descriptor.width,
                    frame.descriptor.height
                );

                Ok(FrameReady(DecodedFrame {
                    descriptor: frame.descriptor,
                    control: frame.control,
                    indices,
                }))
            }
            ProcessTrailer => Ok(Done),
            state @ (FrameReady(_) | Done) => Ok(state),
        }
    }

    fn process_extension(
        &mut self,
        label: ExtensionType,
        graphic_control_extension: Option<GraphicControlExtension>,
    ) -> Result<ParserState, DecodeError> {
        use ExtensionType::*;

        debug!("processing extension type: {:?}", label);
        match label {
            Application => {
                let block_size = self.read_byte()?;
                let identifier = self.read_bytes(block_size.into())?;
                let application_data = self.read_data_sub_blocks()?;

                if identifier == b"NETSCAPE2.0" || identifier == b"ANIMEXTS1.0" {
                    match application_data.as_slice() {
                        [1, low, high, ..] => {
                            self.loop_count = Some(match u16::from_le_bytes([*low, *high]) {
                                0 => LoopCount::Infinite,
                                number => LoopCount::Finite(number),
                            });
                            debug!("processed looping extension, got {:?}", self.loop_count);
                        }
                        data => warn!("ignoring looping extension with {} bytes of data", data.len()),
                    }
                }
            }
            Comment => {
                // sequence of data sub-blocks
                let data = self.read_data_sub_blocks()?;
                debug!("processed comment block, got: {}", String::from_utf8_lossy(&data));
            }
            GraphicControl => {
                let block_size = self.read_byte()?;
                if block_size < GRAPHIC_CONTROL_BLOCK_SIZE {
                    return Err(Malformed::ExtensionBlockSize {
                        label: GRAPHIC_CONTROL_EXTENSION,
                        size: block_size,
                    }
                    .into());
                }

                let packed_fields = self.read_byte()?;
                // packed fields definition
                // XXXYYYZW
                // XXX = reserved, not needed
                // YYY = disposal method, indicates what to do with graphic after displaying
                // Z = user input flag
                // W = transparent color flag
                let disposal_method = DisposalMethod::from_u8((packed_fields >> 2) & 0b00000111)
                    .unwrap_or_default();
                let user_input = packed_fields & 0b00000010 != 0;
                let transparent_color_flag = packed_fields & 0b00000001 != 0;

                let delay_time = self.read_u16()?;
                let transparent_color_index = self.read_byte()?;

                self.read_bytes(usize::from(block_size - GRAPHIC_CONTROL_BLOCK_SIZE))?;
                self.skip_data_sub_blocks()?;

                let extension = GraphicControlExtension {
                    disposal_method,
                    user_input,
                    delay_time,
                    transparent_index: transparent_color_flag.then_some(transparent_color_index),
                };
                debug!("processed GraphicControlExtension: {:?}", extension);

                return Ok(ParserState::DetermineNextBlock(Some(extension)));
            }
            PlainText => {
                // text grid and colors are not rendered
                let block_size = self.read_byte()?;
                self.read_bytes(block_size.into())?;
                self.skip_data_sub_blocks()?;
            }
            Unknown(label) => {
                debug!("skipping unknown extension 0x{:02x}", label);
                self.skip_data_sub_blocks()?;
            }
        }

        Ok(ParserState::DetermineNextBlock(graphic_control_extension))
    }

    fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        let buf = self.buf;
        let end = self
            .position
            .checked_add(count)
            .filter(|end| *end <= buf.len())
            .ok_or(DecodeError::TruncatedData)?;

        let bytes = &buf[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        // GIF89a: unless otherwise stated, multi-byte numeric fields are ordered with the least
        // significant byte first.
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_data_sub_blocks(&mut self) -> Result<Vec<u8>, DecodeError> {
        let mut block_size = self.read_byte()?;

        // there could be more than one block, but we do know we'll at least have 1 sub-block.
        let mut result = Vec::with_capacity(block_size.into());

        while block_size != 0 {
            result.extend_from_slice(self.read_bytes(block_size.into())?);
            block_size = self.read_byte()?;
        }

        Ok(result)
    }

    fn skip_data_sub_blocks(&mut self) -> Result<(), DecodeError> {
        let mut block_size = self.read_byte()?;
        while block_size != 0 {
            self.read_bytes(block_size.into())?;
            block_size = self.read_byte()?;
        }
        Ok(())
    }
}

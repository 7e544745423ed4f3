#![allow(dead_code)]

use weezl::{encode::Encoder as LzwEncoder, BitOrder};

pub const BLACK: [u8; 4] = [0, 0, 0, 0xff];
pub const WHITE: [u8; 4] = [0xff, 0xff, 0xff, 0xff];
pub const RED: [u8; 4] = [0xff, 0, 0, 0xff];
pub const GREEN: [u8; 4] = [0, 0xff, 0, 0xff];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Writes GIF streams block by block.
pub struct GifBuilder {
    bytes: Vec<u8>,
    palette_len: usize,
}

fn size_field(palette: &[[u8; 3]]) -> u8 {
    assert!(palette.len().is_power_of_two() && (2..=256).contains(&palette.len()));
    palette.len().trailing_zeros() as u8 - 1
}

fn min_code_size(palette_len: usize) -> u8 {
    (palette_len.trailing_zeros() as u8).max(2)
}

impl GifBuilder {
    pub fn new(width: u16, height: u16, palette: &[[u8; 3]], background: u8) -> Self {
        let mut bytes = b"GIF89a".to_vec();
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes.push(0x80 | size_field(palette));
        bytes.push(background);
        bytes.push(0);
        for rgb in palette {
            bytes.extend_from_slice(rgb);
        }

        Self {
            bytes,
            palette_len: palette.len(),
        }
    }

    /// A stream without a global color table, version 87a.
    pub fn without_global_table(width: u16, height: u16) -> Self {
        let mut bytes = b"GIF87a".to_vec();
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes.extend_from_slice(&[0, 0, 0]);

        Self {
            bytes,
            palette_len: 0,
        }
    }

    pub fn graphic_control(mut self, disposal: u8, delay: u16, transparent: Option<u8>) -> Self {
        let packed = (disposal << 2) | u8::from(transparent.is_some());
        self.bytes.extend_from_slice(&[0x21, 0xf9, 0x04, packed]);
        self.bytes.extend_from_slice(&delay.to_le_bytes());
        self.bytes.extend_from_slice(&[transparent.unwrap_or(0), 0x00]);
        self
    }

    pub fn comment(mut self, text: &str) -> Self {
        self.bytes.extend_from_slice(&[0x21, 0xfe]);
        self.sub_blocks(text.as_bytes());
        self
    }

    pub fn looping(mut self, count: u16) -> Self {
        self.bytes.extend_from_slice(&[0x21, 0xff, 0x0b]);
        self.bytes.extend_from_slice(b"NETSCAPE2.0");
        self.bytes.extend_from_slice(&[0x03, 0x01]);
        self.bytes.extend_from_slice(&count.to_le_bytes());
        self.bytes.push(0x00);
        self
    }

    pub fn image(self, rect: (u16, u16, u16, u16), indices: &[u8]) -> Self {
        let code_size = min_code_size(self.palette_len);
        self.write_image(rect, 0, None, code_size, indices)
    }

    pub fn interlaced_image(self, rect: (u16, u16, u16, u16), indices: &[u8]) -> Self {
        let code_size = min_code_size(self.palette_len);
        self.write_image(rect, 0x40, None, code_size, indices)
    }

    pub fn image_with_palette(
        self,
        rect: (u16, u16, u16, u16),
        palette: &[[u8; 3]],
        indices: &[u8],
    ) -> Self {
        let code_size = min_code_size(palette.len());
        self.write_image(rect, 0x80 | size_field(palette), Some(palette), code_size, indices)
    }

    fn write_image(
        mut self,
        (left, top, width, height): (u16, u16, u16, u16),
        packed: u8,
        palette: Option<&[[u8; 3]]>,
        code_size: u8,
        indices: &[u8],
    ) -> Self {
        self.bytes.push(0x2c);
        for field in [left, top, width, height] {
            self.bytes.extend_from_slice(&field.to_le_bytes());
        }
        self.bytes.push(packed);
        for rgb in palette.unwrap_or_default() {
            self.bytes.extend_from_slice(rgb);
        }

        let mut encoded = Vec::new();
        LzwEncoder::new(BitOrder::Lsb, code_size)
            .into_vec(&mut encoded)
            .encode_all(indices)
            .status
            .expect("lzw encoding failed");

        self.bytes.push(code_size);
        self.sub_blocks(&encoded);
        self
    }

    fn sub_blocks(&mut self, data: &[u8]) {
        for chunk in data.chunks(255) {
            self.bytes.push(chunk.len() as u8);
            self.bytes.extend_from_slice(chunk);
        }
        self.bytes.push(0x00);
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.bytes.push(0x3b);
        self.bytes
    }

    pub fn finish_without_trailer(self) -> Vec<u8> {
        self.bytes
    }
}

/// Black, white, red, green.
pub fn palette() -> Vec<[u8; 3]> {
    vec![[0, 0, 0], [0xff, 0xff, 0xff], [0xff, 0, 0], [0, 0xff, 0]]
}

pub fn pixel(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let offset = ((y * width + x) * 4) as usize;
    pixels[offset..offset + 4].try_into().unwrap()
}

/// Three frames over a 4x4 screen exercising each disposal method.
pub fn animated() -> Vec<u8> {
    GifBuilder::new(4, 4, &palette(), 1)
        .looping(0)
        .comment("made by hand")
        .graphic_control(2, 10, None)
        .image((0, 0, 4, 4), &[2; 16])
        .graphic_control(3, 20, Some(0))
        .image((1, 1, 2, 2), &[3, 0, 0, 3])
        .graphic_control(1, 0, None)
        .image((0, 0, 2, 1), &[0, 0])
        .finish()
}

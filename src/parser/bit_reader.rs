use super::DecodeError;

pub(crate) const MAX_CODE_WIDTH: u8 = 12;

/// Reads variable width codes, least significant bit first, out of a byte
/// slice.
pub(crate) struct BitReader<'a> {
    buf: &'a [u8],
    // index of the next byte to pull into the accumulator
    position: usize,
    accumulator: u32,
    bits: u8,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            position: 0,
            accumulator: 0,
            bits: 0,
        }
    }

    pub(crate) fn next_code(&mut self, width: u8) -> Result<u16, DecodeError> {
        debug_assert!((1..=MAX_CODE_WIDTH).contains(&width));

        // accumulator never holds more than width - 1 + 8 bits, well below 32
        while self.bits < width {
            let byte = *self.buf.get(self.position).ok_or(DecodeError::TruncatedData)?;
            self.accumulator |= u32::from(byte) << self.bits;
            self.bits += 8;
            self.position += 1;
        }

        let code = (self.accumulator & ((1 << width) - 1)) as u16;
        self.accumulator >>= width;
        self.bits -= width;

        Ok(code)
    }
}

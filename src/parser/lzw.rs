use super::bit_reader::{BitReader, MAX_CODE_WIDTH};
use super::DecodeError;

use log::{debug, trace};

const MAX_TABLE_SIZE: usize = 1 << MAX_CODE_WIDTH;
// roots must fit in a u8 color index
const MAX_MINIMUM_CODE_SIZE: u8 = 8;

#[derive(Debug, Clone, Copy)]
struct Entry {
    // code of the string this entry extends, None for roots and control codes
    prefix: Option<u16>,
    last: u8,
    first: u8,
}

/// GIF flavoured LZW decompressor for a single image data stream.
#[derive(Debug)]
pub struct LzwDecoder {
    minimum_code_size: u8,
    clear_code: u16,
    end_of_information_code: u16,
    code_size: u8,
    table: Vec<Entry>,
    // scratch space used to unwind an entry back to front
    scratch: Vec<u8>,
}

impl LzwDecoder {
    pub fn new(minimum_code_size: u8) -> Result<Self, DecodeError> {
        if !(1..=MAX_MINIMUM_CODE_SIZE).contains(&minimum_code_size) {
            return Err(DecodeError::UnsupportedFeature(format!(
                "lzw minimum code size {minimum_code_size}"
            )));
        }

        let clear_code = 1 << minimum_code_size;
        let mut decoder = Self {
            minimum_code_size,
            clear_code,
            end_of_information_code: clear_code + 1,
            code_size: minimum_code_size + 1,
            table: Vec::with_capacity(MAX_TABLE_SIZE),
            scratch: Vec::new(),
        };
        decoder.reset();

        Ok(decoder)
    }

    fn reset(&mut self) {
        self.code_size = self.minimum_code_size + 1;
        self.table.clear();

        // roots, followed by placeholders for the clear and end codes
        for i in 0..=self.end_of_information_code {
            self.table.push(Entry {
                prefix: None,
                last: i as u8,
                first: i as u8,
            });
        }
    }

    /// Decompresses `data`, the concatenated contents of an image's data
    /// sub-blocks, into color table indices.
    ///
    /// Running out of data before the end of information code is not an
    /// error: everything decoded up to that point is returned.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<u8>, DecodeError> {
        self.reset();

        let mut reader = BitReader::new(data);
        let mut indices = Vec::with_capacity(data.len() * 2);
        let mut previous: Option<u16> = None;

        loop {
            let code = match reader.next_code(self.code_size) {
                Ok(code) => code,
                Err(DecodeError::TruncatedData) => {
                    debug!("lzw data ended without an end of information code");
                    break;
                }
                Err(err) => return Err(err),
            };

            if code == self.clear_code {
                trace!("clear code, resetting table of {} entries", self.table.len());
                self.reset();
                previous = None;
                continue;
            }

            if code == self.end_of_information_code {
                break;
            }

            let Some(prev) = previous else {
                // first code after a clear must be a root
                if code >= self.clear_code {
                    return Err(DecodeError::InvalidLzwCode(code));
                }
                indices.push(code as u8);
                previous = Some(code);
                continue;
            };

            let next_code = self.table.len();
            let first = if usize::from(code) < next_code {
                self.emit(code, &mut indices);
                self.table[usize::from(code)].first
            } else if usize::from(code) == next_code && next_code < MAX_TABLE_SIZE {
                // {CODE-1}+K where K is the first index of {CODE-1}
                let first = self.table[usize::from(prev)].first;
                self.emit(prev, &mut indices);
                indices.push(first);
                first
            } else {
                return Err(DecodeError::InvalidLzwCode(code));
            };

            if next_code < MAX_TABLE_SIZE {
                self.table.push(Entry {
                    prefix: Some(prev),
                    last: first,
                    first: self.table[usize::from(prev)].first,
                });

                if self.table.len() >= 1 << self.code_size && self.code_size < MAX_CODE_WIDTH {
                    self.code_size += 1;
                }
            }

            previous = Some(code);
        }

        Ok(indices)
    }

    fn emit(&mut self, code: u16, indices: &mut Vec<u8>) {
        self.scratch.clear();

        let mut cursor = Some(code);
        while let Some(code) = cursor {
            let entry = self.table[usize::from(code)];
            self.scratch.push(entry.last);
            cursor = entry.prefix;
        }

        indices.extend(self.scratch.iter().rev());
    }
}

#[cfg(test)]
mod tests {
    use super::LzwDecoder;
    use crate::parser::DecodeError;

    use weezl::{encode::Encoder as LzwEncoder, BitOrder};

    fn encode(data: &[u8], minimum_code_size: u8) -> Vec<u8> {
        let mut encoded = Vec::new();
        let mut encoder = LzwEncoder::new(BitOrder::Lsb, minimum_code_size);
        encoder
            .into_vec(&mut encoded)
            .encode_all(data)
            .status
            .expect("reference encoder failed");
        encoded
    }

    #[test]
    fn decodes_reference_encoding() {
        let data: Vec<u8> = [1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 1, 1, 1, 0, 0, 0, 0, 2, 2, 2]
            .iter()
            .copied()
            .cycle()
            .take(200)
            .collect();
        let encoded = encode(&data, 2);

        let decoded = LzwDecoder::new(2).unwrap().decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn decodes_past_a_full_table() {
        // pseudo random bytes fill the 4096 entry table several times over
        let mut state: u32 = 0x1234_5678;
        let data: Vec<u8> = (0..60_000)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect();
        let encoded = encode(&data, 8);

        let decoded = LzwDecoder::new(8).unwrap().decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn decoder_is_reusable() {
        let first: Vec<u8> = (0..64).map(|i| (i % 4) as u8).collect();
        let second: Vec<u8> = (0..64).map(|i| (i / 16) as u8).collect();

        let mut decoder = LzwDecoder::new(2).unwrap();
        assert_eq!(decoder.decode(&encode(&first, 2)).unwrap(), first);
        assert_eq!(decoder.decode(&encode(&second, 2)).unwrap(), second);
    }

    #[test]
    fn missing_end_code_yields_prefix() {
        let data: Vec<u8> = (0..500).map(|i| ((i * 7) % 4) as u8).collect();
        let mut encoded = encode(&data, 2);
        encoded.truncate(encoded.len() - 2);

        let decoded = LzwDecoder::new(2).unwrap().decode(&encoded).unwrap();
        assert!(!decoded.is_empty());
        assert!(data.starts_with(&decoded));
    }

    #[test]
    fn rejects_code_past_next_entry() {
        // clear (4) followed by 7, with minimum code size 2 codes are 3 bits wide
        let encoded = [0b0011_1100];
        let result = LzwDecoder::new(2).unwrap().decode(&encoded);
        assert_eq!(result, Err(DecodeError::InvalidLzwCode(7)));

        // clear (4), 1, then 7 while the next assignable code is 6
        let encoded = [0b1100_1100, 0b0000_0001];
        let result = LzwDecoder::new(2).unwrap().decode(&encoded);
        assert_eq!(result, Err(DecodeError::InvalidLzwCode(7)));
    }

    #[test]
    fn rejects_unsupported_code_size() {
        assert!(matches!(LzwDecoder::new(0), Err(DecodeError::UnsupportedFeature(_))));
        assert!(matches!(LzwDecoder::new(9), Err(DecodeError::UnsupportedFeature(_))));
    }
}

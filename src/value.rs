//! Byte-order and word-order aware conversions between Modbus registers and
//! multi-register scalar values.
//!
//! A 32-bit value occupies two consecutive 16-bit registers and a 64-bit value
//! four. Devices disagree both on the byte order *within* each register and on
//! the order of the registers themselves, so both knobs are exposed and all
//! four combinations are supported.

/// Byte order within each 16-bit register on the wire
///
/// The Modbus default is big-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Endianness {
    /// Most significant byte first (the protocol default)
    #[default]
    BigEndian,
    /// Least significant byte first
    LittleEndian,
}

/// Order of the 16-bit words inside a 32 or 64-bit value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum WordOrder {
    /// Most significant word first
    #[default]
    HighWordFirst,
    /// Least significant word first
    LowWordFirst,
}

/// Combined byte and word order used when marshalling multi-register values
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Encoding {
    /// Byte order within each register
    pub endianness: Endianness,
    /// Order of the registers inside a 32/64-bit value
    pub word_order: WordOrder,
}

impl Encoding {
    /// Create an encoding from its parts
    pub fn new(endianness: Endianness, word_order: WordOrder) -> Self {
        Self {
            endianness,
            word_order,
        }
    }
}

fn word_to_bytes(endianness: Endianness, word: u16) -> [u8; 2] {
    match endianness {
        Endianness::BigEndian => word.to_be_bytes(),
        Endianness::LittleEndian => word.to_le_bytes(),
    }
}

fn word_from_bytes(endianness: Endianness, bytes: [u8; 2]) -> u16 {
    match endianness {
        Endianness::BigEndian => u16::from_be_bytes(bytes),
        Endianness::LittleEndian => u16::from_le_bytes(bytes),
    }
}

/// Convert a single register value to its two wire bytes
pub fn u16_to_bytes(endianness: Endianness, value: u16) -> [u8; 2] {
    word_to_bytes(endianness, value)
}

/// Reassemble a register value from its two wire bytes
pub fn u16_from_bytes(endianness: Endianness, bytes: [u8; 2]) -> u16 {
    word_from_bytes(endianness, bytes)
}

/// Split a 32-bit value into two native words ordered per the encoding, then
/// serialize each word per the encoding's byte order
pub fn u32_to_bytes(encoding: Encoding, value: u32) -> [u8; 4] {
    let high = (value >> 16) as u16;
    let low = value as u16;
    let words = match encoding.word_order {
        WordOrder::HighWordFirst => [high, low],
        WordOrder::LowWordFirst => [low, high],
    };
    let mut out = [0; 4];
    for (chunk, word) in out.chunks_exact_mut(2).zip(words) {
        chunk.copy_from_slice(&word_to_bytes(encoding.endianness, word));
    }
    out
}

/// Inverse of [u32_to_bytes]
pub fn u32_from_bytes(encoding: Encoding, bytes: [u8; 4]) -> u32 {
    let w0 = word_from_bytes(encoding.endianness, [bytes[0], bytes[1]]);
    let w1 = word_from_bytes(encoding.endianness, [bytes[2], bytes[3]]);
    let (high, low) = match encoding.word_order {
        WordOrder::HighWordFirst => (w0, w1),
        WordOrder::LowWordFirst => (w1, w0),
    };
    ((high as u32) << 16) | low as u32
}

/// Split a 64-bit value into four words ordered per the encoding, then
/// serialize each word per the encoding's byte order
pub fn u64_to_bytes(encoding: Encoding, value: u64) -> [u8; 8] {
    let native = [
        (value >> 48) as u16,
        (value >> 32) as u16,
        (value >> 16) as u16,
        value as u16,
    ];
    let words = match encoding.word_order {
        WordOrder::HighWordFirst => native,
        WordOrder::LowWordFirst => [native[3], native[2], native[1], native[0]],
    };
    let mut out = [0; 8];
    for (chunk, word) in out.chunks_exact_mut(2).zip(words) {
        chunk.copy_from_slice(&word_to_bytes(encoding.endianness, word));
    }
    out
}

/// Inverse of [u64_to_bytes]
pub fn u64_from_bytes(encoding: Encoding, bytes: [u8; 8]) -> u64 {
    let mut words = [0u16; 4];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(2)) {
        *word = word_from_bytes(encoding.endianness, [chunk[0], chunk[1]]);
    }
    let ordered = match encoding.word_order {
        WordOrder::HighWordFirst => words,
        WordOrder::LowWordFirst => [words[3], words[2], words[1], words[0]],
    };
    ordered
        .into_iter()
        .fold(0u64, |acc, word| (acc << 16) | word as u64)
}

/// Convert an f32 through its IEEE-754 bit pattern
pub fn f32_to_bytes(encoding: Encoding, value: f32) -> [u8; 4] {
    u32_to_bytes(encoding, value.to_bits())
}

/// Inverse of [f32_to_bytes]
pub fn f32_from_bytes(encoding: Encoding, bytes: [u8; 4]) -> f32 {
    f32::from_bits(u32_from_bytes(encoding, bytes))
}

/// Convert an f64 through its IEEE-754 bit pattern
pub fn f64_to_bytes(encoding: Encoding, value: f64) -> [u8; 8] {
    u64_to_bytes(encoding, value.to_bits())
}

/// Inverse of [f64_to_bytes]
pub fn f64_from_bytes(encoding: Encoding, bytes: [u8; 8]) -> f64 {
    f64::from_bits(u64_from_bytes(encoding, bytes))
}

/// Pack booleans into a bitmap, lsb of the first byte holding the first value
///
/// Unused high bits of the trailing byte are zero, as on the wire.
pub fn bools_to_bytes(values: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; values.len().div_ceil(8)];
    for (i, value) in values.iter().enumerate() {
        if *value {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

/// Unpack `count` booleans from a bitmap written by [bools_to_bytes]
///
/// Returns `None` if the bitmap is too short for the requested count.
pub fn bools_from_bytes(count: u16, bytes: &[u8]) -> Option<Vec<bool>> {
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let byte = bytes.get(i / 8)?;
        out.push((byte >> (i % 8)) & 0x01 == 0x01);
    }
    Some(out)
}

/// Registers arrive from the PDU codec as native u16 values; reconstruct the
/// transmission-order byte stream so the encoding-aware conversions above can
/// reinterpret it
pub(crate) fn registers_to_wire_bytes(registers: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(registers.len() * 2);
    for register in registers {
        out.extend_from_slice(&register.to_be_bytes());
    }
    out
}

/// Inverse of [registers_to_wire_bytes]
pub(crate) fn wire_bytes_to_registers(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoding(endianness: Endianness, word_order: WordOrder) -> Encoding {
        Encoding::new(endianness, word_order)
    }

    #[test]
    fn converts_u32_for_all_order_combinations() {
        let cases: [(Endianness, WordOrder, [u8; 4]); 4] = [
            (
                Endianness::BigEndian,
                WordOrder::HighWordFirst,
                [0x12, 0x34, 0x56, 0x78],
            ),
            (
                Endianness::BigEndian,
                WordOrder::LowWordFirst,
                [0x56, 0x78, 0x12, 0x34],
            ),
            (
                Endianness::LittleEndian,
                WordOrder::HighWordFirst,
                [0x34, 0x12, 0x78, 0x56],
            ),
            (
                Endianness::LittleEndian,
                WordOrder::LowWordFirst,
                [0x78, 0x56, 0x34, 0x12],
            ),
        ];

        for (endianness, word_order, expected) in cases {
            let enc = encoding(endianness, word_order);
            assert_eq!(u32_to_bytes(enc, 0x12345678), expected);
            assert_eq!(u32_from_bytes(enc, expected), 0x12345678);
        }
    }

    #[test]
    fn converts_u64_for_all_order_combinations() {
        let value = 0x0102030405060708;
        let cases: [(Endianness, WordOrder, [u8; 8]); 4] = [
            (
                Endianness::BigEndian,
                WordOrder::HighWordFirst,
                [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08],
            ),
            (
                Endianness::BigEndian,
                WordOrder::LowWordFirst,
                [0x07, 0x08, 0x05, 0x06, 0x03, 0x04, 0x01, 0x02],
            ),
            (
                Endianness::LittleEndian,
                WordOrder::HighWordFirst,
                [0x02, 0x01, 0x04, 0x03, 0x06, 0x05, 0x08, 0x07],
            ),
            (
                Endianness::LittleEndian,
                WordOrder::LowWordFirst,
                [0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01],
            ),
        ];

        for (endianness, word_order, expected) in cases {
            let enc = encoding(endianness, word_order);
            assert_eq!(u64_to_bytes(enc, value), expected);
            assert_eq!(u64_from_bytes(enc, expected), value);
        }
    }

    #[test]
    fn converts_floats_through_bit_patterns() {
        let enc = Encoding::default();
        assert_eq!(f32_to_bytes(enc, 1.0), [0x3F, 0x80, 0x00, 0x00]);
        assert_eq!(f32_from_bytes(enc, [0x3F, 0x80, 0x00, 0x00]), 1.0);
        assert_eq!(
            f64_to_bytes(enc, -2.5),
            [0xC0, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            f64_from_bytes(enc, [0xC0, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]),
            -2.5
        );
    }

    #[test]
    fn packs_bools_lsb_first_with_zeroed_tail() {
        let values = [true, false, true, true, false, false, false, false, true];
        let bytes = bools_to_bytes(&values);
        assert_eq!(bytes, vec![0x0D, 0x01]);
        assert_eq!(
            bools_from_bytes(values.len() as u16, &bytes).unwrap(),
            values.to_vec()
        );
    }

    #[test]
    fn rejects_short_bitmaps() {
        assert!(bools_from_bytes(9, &[0xFF]).is_none());
    }

    #[test]
    fn wire_byte_reconstruction_round_trips() {
        let registers = [0x1234, 0x5678, 0xABCD];
        let bytes = registers_to_wire_bytes(&registers);
        assert_eq!(bytes, vec![0x12, 0x34, 0x56, 0x78, 0xAB, 0xCD]);
        assert_eq!(wire_bytes_to_registers(&bytes), registers.to_vec());
    }
}

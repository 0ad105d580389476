use crate::common::cursor::{ReadCursor, WriteCursor};
use crate::common::traits::{Loggable, Parse, Serialize};
use crate::decode::AppDecodeLevel;
use crate::error::{InternalError, RequestError};
use crate::types::{
    coil_to_u16, AddressRange, BitIterator, BitIteratorDisplay, Indexed, MaskWrite,
    ReadWriteMultiple, RegisterIterator, RegisterIteratorDisplay, WriteMultiple,
};

pub(crate) fn num_bytes_for_bits(count: u16) -> usize {
    (count as usize).div_ceil(8)
}

pub(crate) fn calc_bytes_for_bits(num_bits: usize) -> Result<u8, InternalError> {
    let count = num_bits.div_ceil(8);
    u8::try_from(count).map_err(|_| InternalError::BadByteCount(count))
}

pub(crate) fn calc_bytes_for_registers(num_registers: usize) -> Result<u8, InternalError> {
    let count = 2 * num_registers;
    u8::try_from(count).map_err(|_| InternalError::BadByteCount(count))
}

impl Serialize for AddressRange {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        cursor.write_u16_be(self.start)?;
        cursor.write_u16_be(self.count)?;
        Ok(())
    }
}

impl Loggable for AddressRange {
    fn log(
        &self,
        payload: &[u8],
        level: AppDecodeLevel,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        if level.data_headers() {
            let mut cursor = ReadCursor::new(payload);

            if let Ok(value) = AddressRange::parse(&mut cursor) {
                write!(f, "{value}")?;
            }
        }

        Ok(())
    }
}

impl Serialize for crate::exception::ExceptionCode {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        cursor.write_u8((*self).into())?;
        Ok(())
    }
}

impl Serialize for Indexed<bool> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        cursor.write_u16_be(self.index)?;
        cursor.write_u16_be(coil_to_u16(self.value))?;
        Ok(())
    }
}

impl Loggable for Indexed<bool> {
    fn log(
        &self,
        _payload: &[u8],
        level: AppDecodeLevel,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        if level.data_headers() {
            write!(f, "{self}")?;
        }
        Ok(())
    }
}

impl Serialize for Indexed<u16> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        cursor.write_u16_be(self.index)?;
        cursor.write_u16_be(self.value)?;
        Ok(())
    }
}

impl Loggable for Indexed<u16> {
    fn log(
        &self,
        _payload: &[u8],
        level: AppDecodeLevel,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        if level.data_headers() {
            write!(f, "{self}")?;
        }
        Ok(())
    }
}

impl Serialize for MaskWrite {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        cursor.write_u16_be(self.address)?;
        cursor.write_u16_be(self.and_mask)?;
        cursor.write_u16_be(self.or_mask)?;
        Ok(())
    }
}

impl Loggable for MaskWrite {
    fn log(
        &self,
        _payload: &[u8],
        level: AppDecodeLevel,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        if level.data_headers() {
            write!(f, "{self}")?;
        }
        Ok(())
    }
}

impl Serialize for [bool] {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        // how many bytes should we have?
        let num_bytes = calc_bytes_for_bits(self.len())?;

        cursor.write_u8(num_bytes)?;

        for byte in self.chunks(8) {
            let mut acc: u8 = 0;
            for (count, bit) in byte.iter().enumerate() {
                if *bit {
                    acc |= 1 << count as u8;
                }
            }
            cursor.write_u8(acc)?;
        }

        Ok(())
    }
}

impl Loggable for [bool] {
    fn log(
        &self,
        payload: &[u8],
        level: AppDecodeLevel,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        if !level.data_headers() {
            return Ok(());
        }

        let mut cursor = ReadCursor::new(payload);
        let _ = cursor.read_u8(); // byte count

        if let Ok(count) = u16::try_from(self.len()) {
            if let Ok(range) = AddressRange::try_from(0, count) {
                if let Ok(iterator) = BitIterator::parse_all(range, &mut cursor) {
                    write!(f, "{}", BitIteratorDisplay::new(level, iterator))?;
                }
            }
        }

        Ok(())
    }
}

impl Serialize for [u16] {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        let num_bytes = calc_bytes_for_registers(self.len())?;
        cursor.write_u8(num_bytes)?;

        for value in self {
            cursor.write_u16_be(*value)?
        }

        Ok(())
    }
}

impl Loggable for [u16] {
    fn log(
        &self,
        payload: &[u8],
        level: AppDecodeLevel,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        if !level.data_headers() {
            return Ok(());
        }

        let mut cursor = ReadCursor::new(payload);
        let _ = cursor.read_u8(); // byte count

        if let Ok(count) = u16::try_from(self.len()) {
            if let Ok(range) = AddressRange::try_from(0, count) {
                if let Ok(iterator) = RegisterIterator::parse_all(range, &mut cursor) {
                    write!(f, "{}", RegisterIteratorDisplay::new(level, iterator))?;
                }
            }
        }

        Ok(())
    }
}

impl Serialize for WriteMultiple<bool> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        self.range.serialize(cursor)?;
        self.values.as_slice().serialize(cursor)
    }
}

impl Serialize for WriteMultiple<u16> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        self.range.serialize(cursor)?;
        self.values.as_slice().serialize(cursor)
    }
}

impl Serialize for ReadWriteMultiple {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        self.read_range.serialize(cursor)?;
        self.write_range.serialize(cursor)?;
        self.values.as_slice().serialize(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize_to_vec<T: Serialize + ?Sized>(value: &T, capacity: usize) -> Vec<u8> {
        let mut buffer = vec![0u8; capacity];
        let mut cursor = WriteCursor::new(&mut buffer);
        value.serialize(&mut cursor).unwrap();
        let end = cursor.position();
        buffer.truncate(end);
        buffer
    }

    #[test]
    fn serializes_address_range() {
        let range = AddressRange::try_from(3, 512).unwrap();
        assert_eq!(serialize_to_vec(&range, 4), vec![0x00, 0x03, 0x02, 0x00]);
    }

    #[test]
    fn serializes_bit_slices_with_padded_trailing_byte() {
        let bits = [true, false, true, true, false, false, false, false, true];
        assert_eq!(serialize_to_vec(bits.as_slice(), 8), vec![0x02, 0x0D, 0x01]);
    }

    #[test]
    fn serializes_register_slices_big_endian() {
        let registers = [0xCAFE, 0x0102];
        assert_eq!(
            serialize_to_vec(registers.as_slice(), 8),
            vec![0x04, 0xCA, 0xFE, 0x01, 0x02]
        );
    }

    #[test]
    fn serializes_mask_write() {
        let mask = MaskWrite::new(0x0004, 0x00F2, 0x0025);
        assert_eq!(
            serialize_to_vec(&mask, 8),
            vec![0x00, 0x04, 0x00, 0xF2, 0x00, 0x25]
        );
    }

    #[test]
    fn serializes_read_write_multiple_request() {
        let request = ReadWriteMultiple::new(
            AddressRange::try_from(0x00, 0x05).unwrap(),
            0x00,
            vec![0x0102],
        )
        .unwrap();
        assert_eq!(
            serialize_to_vec(&request, 16),
            vec![0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x01, 0x02, 0x01, 0x02]
        );
    }
}

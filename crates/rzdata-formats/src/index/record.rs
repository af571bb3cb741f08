//! Raw `data.000` record layout

use binrw::{BinRead, BinResult, BinWrite};
use std::io::{Read, Seek, Write};

/// Size of the fixed part of a record: name length, offset, length.
pub const RECORD_OVERHEAD: usize = 1 + 4 + 4;

/// One deciphered index record.
///
/// ```text
/// name_len:u8  name:u8[name_len]  offset:u32le  length:u32le
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    /// Raw name bytes, normally a hash name
    pub name: Vec<u8>,
    /// Byte position within the shard
    pub offset: u32,
    /// Payload length in bytes
    pub length: u32,
}

impl IndexRecord {
    /// Encoded size of this record
    pub fn encoded_len(&self) -> usize {
        RECORD_OVERHEAD + self.name.len()
    }
}

impl BinRead for IndexRecord {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let name_len = u8::read_options(reader, endian, ())?;
        let mut name = vec![0u8; usize::from(name_len)];
        reader.read_exact(&mut name)?;

        let offset = u32::read_options(reader, binrw::Endian::Little, ())?;
        let length = u32::read_options(reader, binrw::Endian::Little, ())?;

        Ok(Self {
            name,
            offset,
            length,
        })
    }
}

impl BinWrite for IndexRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        let name_len = u8::try_from(self.name.len()).map_err(|e| binrw::Error::Custom {
            pos: writer.stream_position().unwrap_or(0),
            err: Box::new(e),
        })?;
        writer.write_all(&[name_len])?;
        writer.write_all(&self.name)?;
        self.offset.write_options(writer, binrw::Endian::Little, ())?;
        self.length.write_options(writer, binrw::Endian::Little, ())?;
        Ok(())
    }
}

impl binrw::meta::ReadEndian for IndexRecord {
    const ENDIAN: binrw::meta::EndianKind = binrw::meta::EndianKind::Endian(binrw::Endian::Little);
}

impl binrw::meta::WriteEndian for IndexRecord {
    const ENDIAN: binrw::meta::EndianKind = binrw::meta::EndianKind::Endian(binrw::Endian::Little);
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use binrw::io::Cursor;

    #[test]
    fn test_record_layout() {
        let record = IndexRecord {
            name: b"abc".to_vec(),
            offset: 0x0102_0304,
            length: 16,
        };

        let mut buffer = Vec::new();
        record.write(&mut Cursor::new(&mut buffer)).expect("write");
        assert_eq!(
            buffer,
            [3, b'a', b'b', b'c', 0x04, 0x03, 0x02, 0x01, 16, 0, 0, 0]
        );
        assert_eq!(record.encoded_len(), buffer.len());

        let parsed = IndexRecord::read(&mut Cursor::new(&buffer)).expect("read");
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_empty_name() {
        let buffer = [0u8, 5, 0, 0, 0, 7, 0, 0, 0];
        let parsed = IndexRecord::read(&mut Cursor::new(&buffer)).expect("read");
        assert!(parsed.name.is_empty());
        assert_eq!((parsed.offset, parsed.length), (5, 7));
    }

    #[test]
    fn test_oversized_name_rejected() {
        let record = IndexRecord {
            name: vec![b'a'; 256],
            offset: 0,
            length: 0,
        };
        let mut buffer = Vec::new();
        assert!(record.write(&mut Cursor::new(&mut buffer)).is_err());
    }

    #[test]
    fn test_short_read_fails() {
        let buffer = [3u8, b'a', b'b'];
        assert!(IndexRecord::read(&mut Cursor::new(&buffer)).is_err());
    }
}

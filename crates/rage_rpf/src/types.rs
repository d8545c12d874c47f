//! Wire records of an RPF7 archive header.

use std::{fmt, io::Cursor};

use binrw::{BinRead, BinWrite};
use byteorder::{ByteOrder, LE};

use crate::error::{Error, Result};

/// Size of an allocation unit inside an archive
pub const BLOCK_SIZE: u64 = 512;

/// `"RPF7"` read as a little-endian `u32`
pub const RPF_IDENT: u32 = 0x52504637;

/// Second word of every directory record
pub const DIRECTORY_IDENT: u32 = 0x7FFFFF00;

/// Size of every record in the entry table
pub const ENTRY_SIZE: usize = 16;

/// Largest value of a 24-bit size or offset field
pub const MAX_U24: u32 = 0xFF_FFFF;

/// Number of blocks needed to hold `bytes`
pub fn block_count(bytes: u64) -> u64 {
    bytes.div_ceil(BLOCK_SIZE)
}

/// Encryption applied to an archive's entry and name tables
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum RpfEncryption {
    None,
    /// Unencrypted tables, as written by OpenIV
    #[default]
    Open,
    Aes,
    Ng,
}

impl RpfEncryption {
    pub const fn value(self) -> u32 {
        match self {
            RpfEncryption::None => 0,
            RpfEncryption::Open => 0x4E45504F,
            RpfEncryption::Aes => 0x0FFFFFF9,
            RpfEncryption::Ng => 0x0FEFFFFF,
        }
    }

    /// Whether tables with this encryption can be read and written
    pub const fn is_supported(self) -> bool {
        matches!(self, RpfEncryption::None | RpfEncryption::Open)
    }
}

impl TryFrom<u32> for RpfEncryption {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(RpfEncryption::None),
            0x4E45504F => Ok(RpfEncryption::Open),
            0x0FFFFFF9 => Ok(RpfEncryption::Aes),
            0x0FEFFFFF => Ok(RpfEncryption::Ng),
            other => Err(Error::UnsupportedEncryption(format!(
                "unknown ({:#010X})",
                other
            ))),
        }
    }
}

impl fmt::Display for RpfEncryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RpfEncryption::None => "NONE",
            RpfEncryption::Open => "OPEN",
            RpfEncryption::Aes => "AES",
            RpfEncryption::Ng => "NG",
        };
        f.write_str(name)
    }
}

/// RPF7 archive header
///
/// Followed by `entry_count` 16-byte records and `names_length` bytes of names.
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(magic = b"7FPR", little)]
pub struct RpfHeader {
    pub entry_count: u32,
    pub names_length: u32,
    /// Raw [`RpfEncryption`] value
    pub encryption: u32,
}

impl RpfHeader {
    pub const SIZE: u64 = 16;
}

/// Directory record, its children are `entries_count` records starting at `entries_index`
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct DirectoryRecord {
    pub name_offset: u32,
    #[brw(magic = 0x7FFFFF00u32)]
    pub entries_index: u32,
    pub entries_count: u32,
}

/// Record shared by binary and resource files
///
/// For binary files `word_8` is the uncompressed size and `word_12` the encryption flag. For
/// resources they are the system and graphics page flags.
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct FileRecord {
    pub name_offset: u16,
    pub file_size: [u8; 3],
    pub file_offset: [u8; 3],
    pub word_8: u32,
    pub word_12: u32,
}

impl FileRecord {
    pub fn size(&self) -> u32 {
        from_u24(self.file_size)
    }

    /// Offset in blocks, with the resource marker bit still set
    pub fn offset(&self) -> u32 {
        from_u24(self.file_offset)
    }
}

pub(crate) fn from_u24(bytes: [u8; 3]) -> u32 {
    bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16
}

pub(crate) fn to_u24(value: u32) -> [u8; 3] {
    [value as u8, (value >> 8) as u8, (value >> 16) as u8]
}

/// One decoded record of the entry table
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum EntryRecord {
    Directory(DirectoryRecord),
    Binary(FileRecord),
    Resource(FileRecord),
}

impl EntryRecord {
    /// Decodes a record, telling the kinds apart by its second word
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ENTRY_SIZE {
            return Err(Error::InvalidArchive(format!(
                "entry record is {} bytes long",
                data.len()
            )));
        }

        let kind = LE::read_u32(&data[4..8]);
        let mut cursor = Cursor::new(&data[..ENTRY_SIZE]);
        if kind == DIRECTORY_IDENT {
            Ok(EntryRecord::Directory(DirectoryRecord::read(&mut cursor)?))
        } else if kind & 0x8000_0000 == 0 {
            Ok(EntryRecord::Binary(FileRecord::read(&mut cursor)?))
        } else {
            Ok(EntryRecord::Resource(FileRecord::read(&mut cursor)?))
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(ENTRY_SIZE));
        match self {
            EntryRecord::Directory(record) => record.write(&mut cursor)?,
            EntryRecord::Binary(record) | EntryRecord::Resource(record) => {
                record.write(&mut cursor)?
            }
        }
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use binrw::{BinRead, BinWrite};
    use pretty_assertions::assert_eq;

    use super::{
        block_count, to_u24, DirectoryRecord, EntryRecord, FileRecord, RpfEncryption, RpfHeader,
    };
    use crate::error::{Error, Result};

    #[test]
    fn read_header() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x37, 0x46, 0x50, 0x52,
            0x03, 0x00, 0x00, 0x00,
            0x10, 0x00, 0x00, 0x00,
            0x4F, 0x50, 0x45, 0x4E,
        ]);

        let header = RpfHeader::read(&mut input)?;
        assert_eq!(
            header,
            RpfHeader {
                entry_count: 3,
                names_length: 16,
                encryption: RpfEncryption::Open.value(),
            }
        );
        assert_eq!(RpfEncryption::try_from(header.encryption)?, RpfEncryption::Open);

        Ok(())
    }

    #[test]
    fn read_header_bad_magic() {
        let mut input = Cursor::new(vec![0x52, 0x53, 0x43, 0x37, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(RpfHeader::read(&mut input).is_err());
    }

    #[test]
    fn unknown_encryption_is_unsupported() {
        assert!(matches!(
            RpfEncryption::try_from(0x1234),
            Err(Error::UnsupportedEncryption(_))
        ));
        assert!(!RpfEncryption::Ng.is_supported());
        assert!(RpfEncryption::None.is_supported());
    }

    #[test]
    fn write_directory_record() -> Result<()> {
        #[rustfmt::skip]
        let expected = vec![
            0x05, 0x00, 0x00, 0x00,
            0x00, 0xFF, 0xFF, 0x7F,
            0x02, 0x00, 0x00, 0x00,
            0x04, 0x00, 0x00, 0x00,
        ];

        let record = DirectoryRecord {
            name_offset: 5,
            entries_index: 2,
            entries_count: 4,
        };

        let mut actual = Vec::new();
        record.write(&mut Cursor::new(&mut actual))?;
        assert_eq!(actual, expected);

        assert_eq!(EntryRecord::parse(&expected)?, EntryRecord::Directory(record));

        Ok(())
    }

    #[test]
    fn parse_binary_record() -> Result<()> {
        #[rustfmt::skip]
        let input = vec![
            0x08, 0x00,
            0x21, 0x00, 0x00,
            0x03, 0x00, 0x00,
            0x05, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
        ];

        let EntryRecord::Binary(record) = EntryRecord::parse(&input)? else {
            panic!("expected a binary record");
        };
        assert_eq!(record.name_offset, 8);
        assert_eq!(record.size(), 0x21);
        assert_eq!(record.offset(), 3);
        assert_eq!(record.word_8, 5);

        Ok(())
    }

    #[test]
    fn parse_resource_record() -> Result<()> {
        #[rustfmt::skip]
        let input = vec![
            0x00, 0x00,
            0x00, 0x10, 0x00,
            0x02, 0x00, 0x80,
            0x00, 0x00, 0x02, 0x20,
            0x00, 0x00, 0x00, 0xB0,
        ];

        let EntryRecord::Resource(record) = EntryRecord::parse(&input)? else {
            panic!("expected a resource record");
        };
        assert_eq!(record.size(), 0x1000);
        assert_eq!(record.offset() & 0x7F_FFFF, 2);
        assert_eq!(record.word_8, 0x20020000);
        assert_eq!(EntryRecord::Resource(record).to_bytes()?, input);

        Ok(())
    }

    #[test]
    fn u24_fields() {
        let record = FileRecord {
            file_size: to_u24(0xABCDEF),
            file_offset: to_u24(0x123456),
            ..Default::default()
        };
        assert_eq!(record.size(), 0xABCDEF);
        assert_eq!(record.offset(), 0x123456);
    }

    #[test]
    fn blocks_round_up() {
        assert_eq!(block_count(0), 0);
        assert_eq!(block_count(1), 1);
        assert_eq!(block_count(512), 1);
        assert_eq!(block_count(513), 2);
    }
}

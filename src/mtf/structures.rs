use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use anyhow::{Result, bail};

/// Descriptor block type, identified by the 4-character tag that opens
/// every block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    MediaHeader,
    SoftFilemark,
    SetStart,
    Volume,
    Directory,
    File,
    EndOfSet,
    EndOfMedia,
    Unknown([u8; 4]),
}

impl BlockType {
    pub fn from_tag(tag: [u8; 4]) -> Self {
        match &tag {
            b"TAPE" => BlockType::MediaHeader,
            b"SFMB" => BlockType::SoftFilemark,
            b"SSET" => BlockType::SetStart,
            b"VOLB" => BlockType::Volume,
            b"DIRB" => BlockType::Directory,
            b"FILE" => BlockType::File,
            b"ESET" => BlockType::EndOfSet,
            b"EOTM" => BlockType::EndOfMedia,
            _ => BlockType::Unknown(tag),
        }
    }
}

/// String encoding declared in a block's common header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringType {
    NoStrings,
    SingleByte,
    Wide,
}

impl StringType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            2 => StringType::Wide,
            1 => StringType::SingleByte,
            _ => StringType::NoStrings,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            StringType::NoStrings => 0,
            StringType::SingleByte => 1,
            StringType::Wide => 2,
        }
    }
}

/// Directory attribute bit: the directory path lives in a `PNAM` sub-stream
/// instead of the inline name field
pub const DIRB_PATH_IN_STREAM_BIT: u32 = 0x0002_0000;
/// File attribute bit: the file name lives in an `FNAM` sub-stream
pub const FILE_NAME_IN_STREAM_BIT: u32 = 0x0002_0000;

/// Sub-stream carrying a directory path
pub const STREAM_DIRECTORY_NAME: [u8; 4] = *b"PNAM";
/// Sub-stream carrying a file name
pub const STREAM_FILE_NAME: [u8; 4] = *b"FNAM";
/// Sub-stream carrying a file's data
pub const STREAM_FILE_DATA: [u8; 4] = *b"STAN";
/// Padding stream terminating a block's stream chain
pub const STREAM_PAD: [u8; 4] = *b"SPAD";

/// Common descriptor block header - 52 bytes
pub struct CommonHeader {
    pub block_type: BlockType,
    pub attributes: u32,
    pub offset_to_first_stream: u16,
    pub displayable_size: u64,
    pub format_logical_address: u64,
    pub control_block_id: u32,
    pub string_type: StringType,
}

impl CommonHeader {
    pub const SIZE: usize = 52;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            bail!("descriptor block header truncated");
        }

        let mut cursor = Cursor::new(data);

        let mut tag = [0u8; 4];
        cursor.read_exact(&mut tag)?;
        let attributes = cursor.read_u32::<LittleEndian>()?;
        let offset_to_first_stream = cursor.read_u16::<LittleEndian>()?;
        let _os_id = cursor.read_u8()?;
        let _os_version = cursor.read_u8()?;
        let displayable_size = cursor.read_u64::<LittleEndian>()?;
        let format_logical_address = cursor.read_u64::<LittleEndian>()?;

        cursor.set_position(36); // skip reserved
        let control_block_id = cursor.read_u32::<LittleEndian>()?;

        cursor.set_position(48); // skip reserved + OS-specific data address
        let string_type = StringType::from_u8(cursor.read_u8()?);

        Ok(Self {
            block_type: BlockType::from_tag(tag),
            attributes,
            offset_to_first_stream,
            displayable_size,
            format_logical_address,
            control_block_id,
            string_type,
        })
    }
}

/// Sub-stream header - 22 bytes
pub struct StreamHeader {
    pub id: [u8; 4],
    pub fs_attributes: u16,
    pub format_attributes: u16,
    pub length: u64,
    pub encryption: u16,
    pub compression: u16,
}

impl StreamHeader {
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            bail!("sub-stream header truncated");
        }

        let mut cursor = Cursor::new(data);

        let mut id = [0u8; 4];
        cursor.read_exact(&mut id)?;

        Ok(Self {
            id,
            fs_attributes: cursor.read_u16::<LittleEndian>()?,
            format_attributes: cursor.read_u16::<LittleEndian>()?,
            length: cursor.read_u64::<LittleEndian>()?,
            encryption: cursor.read_u16::<LittleEndian>()?,
            compression: cursor.read_u16::<LittleEndian>()?,
        })
    }
}

/// A named sub-stream attached to a descriptor block, fully buffered
#[derive(Debug, Clone)]
pub struct DataStream {
    pub id: [u8; 4],
    pub data: Vec<u8>,
}

/// Media header (`TAPE`) body fields the catalog depends on
#[derive(Debug, Clone)]
pub struct MediaHeaderBlock {
    pub media_name: String,
}

/// Set start (`SSET`) body fields
#[derive(Debug, Clone)]
pub struct SetBlock {
    pub set_number: u16,
    pub set_name: String,
}

/// Volume (`VOLB`) body fields
#[derive(Debug, Clone)]
pub struct VolumeBlock {
    pub device_name: String,
}

/// Directory (`DIRB`) body fields
#[derive(Debug, Clone)]
pub struct DirectoryBlock {
    pub attributes: u32,
    pub directory_name: Option<String>,
}

/// File (`FILE`) body fields
#[derive(Debug, Clone)]
pub struct FileBlock {
    pub attributes: u32,
    pub file_name: Option<String>,
}

/// Typed descriptor block body.
///
/// A closed variant set: every block the builder dispatches on has its own
/// arm, anything else decodes as `Other` so the stream keeps advancing.
#[derive(Debug, Clone)]
pub enum BlockBody {
    MediaHeader(MediaHeaderBlock),
    SoftFilemark,
    Set(SetBlock),
    Volume(VolumeBlock),
    Directory(DirectoryBlock),
    File(FileBlock),
    Other(BlockType),
}

/// One fully decoded descriptor block
#[derive(Debug, Clone)]
pub struct DescriptorBlock {
    /// Byte offset of the block in the backup image
    pub offset: u64,
    pub string_type: StringType,
    pub body: BlockBody,
    /// Attached sub-streams in on-tape order, `SPAD` excluded
    pub streams: Vec<DataStream>,
}

impl DescriptorBlock {
    /// Find the first attached sub-stream with the given id
    pub fn stream(&self, id: [u8; 4]) -> Option<&DataStream> {
        self.streams.iter().find(|s| s.id == id)
    }
}

/// Decode string bytes per the declared encoding.
///
/// Wide strings are UTF-16LE; a trailing odd byte is dropped. Decoding is
/// lossy so a damaged name never aborts a catalog pass.
pub fn decode_string(string_type: StringType, bytes: &[u8]) -> String {
    match string_type {
        StringType::Wide => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::from_utf8_lossy(bytes).to_string(),
    }
}

/// Read a `(size, offset)` tape address pair
fn read_tape_address(cursor: &mut Cursor<&[u8]>) -> Result<(u16, u16)> {
    let size = cursor.read_u16::<LittleEndian>()?;
    let offset = cursor.read_u16::<LittleEndian>()?;
    Ok((size, offset))
}

/// Resolve a tape address against the block's descriptor region and decode
/// the referenced string. Size 0 means the field is absent.
fn fetch_string(
    descriptor: &[u8],
    string_type: StringType,
    size: u16,
    offset: u16,
) -> Result<Option<String>> {
    if size == 0 {
        return Ok(None);
    }
    let start = offset as usize;
    let end = start + size as usize;
    if end > descriptor.len() {
        bail!(
            "string reference ({} bytes at offset {}) escapes the descriptor region",
            size,
            offset
        );
    }
    Ok(Some(decode_string(string_type, &descriptor[start..end])))
}

impl MediaHeaderBlock {
    /// Parse from the descriptor region of a `TAPE` block
    pub fn from_descriptor(descriptor: &[u8], string_type: StringType) -> Result<Self> {
        let mut cursor = Cursor::new(descriptor);
        cursor.set_position(68); // media name tape address
        let (size, offset) = read_tape_address(&mut cursor)?;
        let media_name = fetch_string(descriptor, string_type, size, offset)?.unwrap_or_default();
        Ok(Self { media_name })
    }
}

impl SetBlock {
    /// Parse from the descriptor region of an `SSET` block
    pub fn from_descriptor(descriptor: &[u8], string_type: StringType) -> Result<Self> {
        let mut cursor = Cursor::new(descriptor);
        cursor.set_position(62); // data set number
        let set_number = cursor.read_u16::<LittleEndian>()?;
        let (size, offset) = read_tape_address(&mut cursor)?;
        let set_name = fetch_string(descriptor, string_type, size, offset)?.unwrap_or_default();
        Ok(Self {
            set_number,
            set_name,
        })
    }
}

impl VolumeBlock {
    /// Parse from the descriptor region of a `VOLB` block
    pub fn from_descriptor(descriptor: &[u8], string_type: StringType) -> Result<Self> {
        let mut cursor = Cursor::new(descriptor);
        cursor.set_position(56); // device name tape address
        let (size, offset) = read_tape_address(&mut cursor)?;
        let device_name = fetch_string(descriptor, string_type, size, offset)?.unwrap_or_default();
        Ok(Self { device_name })
    }
}

impl DirectoryBlock {
    /// Parse from the descriptor region of a `DIRB` block
    pub fn from_descriptor(descriptor: &[u8], string_type: StringType) -> Result<Self> {
        let mut cursor = Cursor::new(descriptor);
        cursor.set_position(52); // directory attributes
        let attributes = cursor.read_u32::<LittleEndian>()?;
        cursor.set_position(80); // directory name tape address
        let (size, offset) = read_tape_address(&mut cursor)?;
        let directory_name = fetch_string(descriptor, string_type, size, offset)?;
        Ok(Self {
            attributes,
            directory_name,
        })
    }
}

impl FileBlock {
    /// Parse from the descriptor region of a `FILE` block
    pub fn from_descriptor(descriptor: &[u8], string_type: StringType) -> Result<Self> {
        let mut cursor = Cursor::new(descriptor);
        cursor.set_position(52); // file attributes
        let attributes = cursor.read_u32::<LittleEndian>()?;
        cursor.set_position(84); // file name tape address
        let (size, offset) = read_tape_address(&mut cursor)?;
        let file_name = fetch_string(descriptor, string_type, size, offset)?;
        Ok(Self {
            attributes,
            file_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_type_tags() {
        assert_eq!(BlockType::from_tag(*b"TAPE"), BlockType::MediaHeader);
        assert_eq!(BlockType::from_tag(*b"SSET"), BlockType::SetStart);
        assert_eq!(BlockType::from_tag(*b"EOTM"), BlockType::EndOfMedia);
        assert_eq!(BlockType::from_tag(*b"XXXX"), BlockType::Unknown(*b"XXXX"));
    }

    #[test]
    fn decode_single_byte_string() {
        assert_eq!(decode_string(StringType::SingleByte, b"ABC\0"), "ABC\0");
        assert_eq!(decode_string(StringType::SingleByte, b"docs"), "docs");
    }

    #[test]
    fn decode_wide_string_keeps_terminator_as_one_char() {
        // "ABC\0" in UTF-16LE: the terminator is two zero bytes but one char
        let bytes = b"A\0B\0C\0\0\0";
        let decoded = decode_string(StringType::Wide, bytes);
        assert_eq!(decoded.chars().count(), 4);
        assert_eq!(decoded, "ABC\0");
    }

    #[test]
    fn tape_address_out_of_bounds_is_an_error() {
        let descriptor = vec![0u8; 64];
        assert!(fetch_string(&descriptor, StringType::SingleByte, 16, 60).is_err());
    }

    #[test]
    fn absent_tape_address_resolves_to_none() {
        let descriptor = vec![0u8; 64];
        let name = fetch_string(&descriptor, StringType::SingleByte, 0, 0).unwrap();
        assert!(name.is_none());
    }
}

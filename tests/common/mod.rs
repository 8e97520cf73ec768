//! Shared test fixtures: an encoder that writes wire-exact backup images
//! for the parser and catalog tests to consume.

#![allow(dead_code)]

use std::sync::Arc;

use runbkf::catalog::{CatalogBuilder, CatalogError, CatalogNode};
use runbkf::io::MemoryReader;
use runbkf::mtf::BackupStream;

pub const ANSI: u8 = 1;
pub const WIDE: u8 = 2;

const DIRB_PATH_IN_STREAM_BIT: u32 = 0x0002_0000;
const FILE_NAME_IN_STREAM_BIT: u32 = 0x0002_0000;
const COMMON_HEADER_SIZE: usize = 52;

/// Encode text in the given on-tape encoding (single-byte or UTF-16LE).
///
/// Terminators are the caller's business: include `\0` in the input when
/// the field carries one.
pub fn encode_text(text: &str, wide: bool) -> Vec<u8> {
    if wide {
        text.encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect()
    } else {
        text.as_bytes().to_vec()
    }
}

/// One descriptor block under construction
struct Block {
    tag: [u8; 4],
    string_type: u8,
    /// Fixed field region immediately after the common header; offsets in
    /// `put_*` are from the block start, as in the format description
    body: Vec<u8>,
    /// String pool appended after the body; tape addresses point here
    strings: Vec<u8>,
    streams: Vec<([u8; 4], Vec<u8>)>,
}

impl Block {
    fn new(tag: [u8; 4], string_type: u8, body_len: usize) -> Self {
        Self {
            tag,
            string_type,
            body: vec![0u8; body_len],
            strings: Vec::new(),
            streams: Vec::new(),
        }
    }

    fn put_u16(&mut self, block_offset: usize, value: u16) {
        let i = block_offset - COMMON_HEADER_SIZE;
        self.body[i..i + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u32(&mut self, block_offset: usize, value: u32) {
        let i = block_offset - COMMON_HEADER_SIZE;
        self.body[i..i + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Append a string to the pool and point the tape address at
    /// `address_offset` to it
    fn put_string(&mut self, address_offset: usize, text: &str, wide: bool) {
        let bytes = encode_text(text, wide);
        let offset = COMMON_HEADER_SIZE + self.body.len() + self.strings.len();
        self.put_u16(address_offset, bytes.len() as u16);
        self.put_u16(address_offset + 2, offset as u16);
        self.strings.extend_from_slice(&bytes);
    }

    fn stream(&mut self, id: [u8; 4], data: Vec<u8>) {
        self.streams.push((id, data));
    }

    fn encode(&self, out: &mut Vec<u8>) {
        let start = out.len();
        assert_eq!(start % 4, 0, "blocks must start 4-aligned");

        let raw_len = COMMON_HEADER_SIZE + self.body.len() + self.strings.len();
        let descriptor_len = (raw_len + 3) & !3;

        // common header (52 bytes)
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&0u32.to_le_bytes()); // block attributes
        out.extend_from_slice(&(descriptor_len as u16).to_le_bytes());
        out.push(0); // os id
        out.push(0); // os version
        out.extend_from_slice(&0u64.to_le_bytes()); // displayable size
        out.extend_from_slice(&(start as u64).to_le_bytes()); // format logical address
        out.extend_from_slice(&[0u8; 8]); // reserved
        out.extend_from_slice(&0u32.to_le_bytes()); // control block id
        out.extend_from_slice(&[0u8; 4]); // reserved
        out.extend_from_slice(&[0u8; 4]); // os-specific data address
        out.push(self.string_type);
        out.push(0); // reserved
        out.extend_from_slice(&0u16.to_le_bytes()); // header checksum

        // body, string pool, padding up to the stream chain
        out.extend_from_slice(&self.body);
        out.extend_from_slice(&self.strings);
        while out.len() - start < descriptor_len {
            out.push(0);
        }

        // sub-stream chain, SPAD-terminated
        for (id, data) in &self.streams {
            write_stream(out, id, data);
        }
        write_stream(out, b"SPAD", &[]);
    }
}

fn write_stream(out: &mut Vec<u8>, id: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(id);
    out.extend_from_slice(&0u16.to_le_bytes()); // fs attributes
    out.extend_from_slice(&0u16.to_le_bytes()); // format attributes
    out.extend_from_slice(&(data.len() as u64).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // encryption
    out.extend_from_slice(&0u16.to_le_bytes()); // compression
    out.extend_from_slice(&0u16.to_le_bytes()); // checksum
    out.extend_from_slice(data);
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

/// Builds synthetic backup images block by block
pub struct ImageBuilder {
    data: Vec<u8>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Standard preamble: media header + soft filemark
    pub fn preamble(self, media_name: &str) -> Self {
        self.media_header(media_name).soft_filemark()
    }

    pub fn media_header(mut self, name: &str) -> Self {
        let mut block = Block::new(*b"TAPE", ANSI, 20);
        block.put_string(68, name, false);
        block.encode(&mut self.data);
        self
    }

    pub fn soft_filemark(mut self) -> Self {
        Block::new(*b"SFMB", 0, 0).encode(&mut self.data);
        self
    }

    pub fn set(mut self, number: u16, name: &str) -> Self {
        let mut block = Block::new(*b"SSET", ANSI, 16);
        block.put_u16(62, number);
        block.put_string(64, name, false);
        block.encode(&mut self.data);
        self
    }

    pub fn volume(mut self, device: &str) -> Self {
        let mut block = Block::new(*b"VOLB", ANSI, 8);
        block.put_string(56, device, false);
        block.encode(&mut self.data);
        self
    }

    /// Directory with an inline name; the on-tape field carries a trailing
    /// terminator in the declared encoding
    pub fn dir_inline(mut self, name: &str, wide: bool) -> Self {
        let string_type = if wide { WIDE } else { ANSI };
        let mut block = Block::new(*b"DIRB", string_type, 32);
        block.put_string(80, &format!("{}\0", name), wide);
        block.encode(&mut self.data);
        self
    }

    /// Directory whose path lives in a `PNAM` sub-stream; `path` is stored
    /// exactly as given (include the terminator yourself)
    pub fn dir_stream(mut self, path: &str, wide: bool) -> Self {
        let string_type = if wide { WIDE } else { ANSI };
        let mut block = Block::new(*b"DIRB", string_type, 32);
        block.put_u32(52, DIRB_PATH_IN_STREAM_BIT);
        block.stream(*b"PNAM", encode_text(path, wide));
        block.encode(&mut self.data);
        self
    }

    /// Directory claiming a `PNAM` stream that is not actually attached
    pub fn dir_stream_missing(mut self) -> Self {
        let mut block = Block::new(*b"DIRB", ANSI, 32);
        block.put_u32(52, DIRB_PATH_IN_STREAM_BIT);
        block.encode(&mut self.data);
        self
    }

    /// File with an inline name (no terminator) and one `STAN` data stream
    pub fn file_inline(mut self, name: &str, data: &[u8]) -> Self {
        let mut block = Block::new(*b"FILE", ANSI, 36);
        block.put_string(84, name, false);
        block.stream(*b"STAN", data.to_vec());
        block.encode(&mut self.data);
        self
    }

    /// File whose name lives in an `FNAM` sub-stream, stored exactly as
    /// given, plus one `STAN` data stream
    pub fn file_stream(mut self, name: &str, wide: bool, data: &[u8]) -> Self {
        let string_type = if wide { WIDE } else { ANSI };
        let mut block = Block::new(*b"FILE", string_type, 36);
        block.put_u32(52, FILE_NAME_IN_STREAM_BIT);
        block.stream(*b"FNAM", encode_text(name, wide));
        block.stream(*b"STAN", data.to_vec());
        block.encode(&mut self.data);
        self
    }

    /// File with an inline name and an arbitrary stream chain
    pub fn file_with_streams(mut self, name: &str, streams: Vec<([u8; 4], Vec<u8>)>) -> Self {
        let mut block = Block::new(*b"FILE", ANSI, 36);
        block.put_string(84, name, false);
        for (id, data) in streams {
            block.stream(id, data);
        }
        block.encode(&mut self.data);
        self
    }

    /// A block of an unrecognized type; consumed by the builder, no node
    pub fn other(mut self, tag: &[u8; 4]) -> Self {
        Block::new(*tag, 0, 0).encode(&mut self.data);
        self
    }

    pub fn end_of_media(mut self) -> Self {
        Block::new(*b"EOTM", 0, 0).encode(&mut self.data);
        self
    }

    /// Zero-filled tail (the null sentinel some writers pad with)
    pub fn zeros(mut self, count: usize) -> Self {
        self.data.extend(std::iter::repeat_n(0u8, count));
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

/// The §8 scenario image: TAPE1 / Set 1 "Backup" / C: / docs / a.txt
pub fn scenario_image(file_data: &[u8]) -> Vec<u8> {
    ImageBuilder::new()
        .preamble("TAPE1")
        .set(1, "Backup")
        .volume("C:")
        .dir_inline("docs", false)
        .file_inline("a.txt", file_data)
        .end_of_media()
        .build()
}

/// Open an in-memory image as a backup stream
pub fn open_stream(image: Vec<u8>) -> BackupStream<MemoryReader> {
    BackupStream::new(Arc::new(MemoryReader::new(image)))
}

/// Build a catalog from an in-memory image with default options
pub async fn build_catalog(image: Vec<u8>) -> Result<CatalogNode, CatalogError> {
    let mut stream = open_stream(image);
    CatalogBuilder::new().build(&mut stream).await
}

/// Flatten a tree into (kind, name) pairs in pre-order; used for prefix
/// and structure comparisons
pub fn flatten(node: &CatalogNode) -> Vec<(runbkf::NodeKind, String)> {
    let mut out = vec![(node.kind, node.name.clone())];
    for child in &node.children {
        out.extend(flatten(child));
    }
    out
}

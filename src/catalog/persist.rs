//! Sidecar catalog index.
//!
//! A catalog can be saved to a standalone index file and reloaded without
//! re-reading the backup image. The layout is sequential and little-endian,
//! with no magic number, version field or checksum — readers must mirror
//! the writer field for field:
//!
//! 1. length-prefixed string (u32 byte length + UTF-8): path of the backup
//!    image the catalog was built from
//! 2. pre-order node records: `kind` (i32), `name` (length-prefixed
//!    string), `offset` (i64), `child_count` (i32), then `child_count`
//!    nested node records
//!
//! Node summaries are not persisted; a reloaded tree carries names, kinds,
//! offsets and structure only, which is everything extraction needs.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::error::CatalogError;
use super::node::{CatalogNode, NodeKind};

/// Upper bound on a stored string; anything larger is a foreign file, not
/// a catalog index
const MAX_STRING_LEN: u32 = 1 << 24;

/// Save a catalog tree to `path`, recording the image it was built from
pub fn save_catalog(
    path: &Path,
    root: &CatalogNode,
    image_path: &str,
) -> Result<(), CatalogError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_string(&mut writer, image_path)?;
    write_node(&mut writer, root)?;
    writer.flush()?;
    Ok(())
}

/// Load a catalog tree, returning the stored image path and the root node
pub fn load_catalog(path: &Path) -> Result<(String, CatalogNode), CatalogError> {
    let mut reader = BufReader::new(File::open(path)?);
    let image_path = read_string(&mut reader)?;
    let root = read_node(&mut reader)?;
    Ok((image_path, root))
}

/// Read only the backup image path recorded in a catalog index
pub fn read_image_path(path: &Path) -> Result<String, CatalogError> {
    let mut reader = BufReader::new(File::open(path)?);
    read_string(&mut reader)
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<(), CatalogError> {
    writer.write_u32::<LittleEndian>(value.len() as u32)?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

fn write_node<W: Write>(writer: &mut W, node: &CatalogNode) -> Result<(), CatalogError> {
    writer.write_i32::<LittleEndian>(node.kind.as_i32())?;
    write_string(writer, &node.name)?;
    writer.write_i64::<LittleEndian>(node.offset as i64)?;
    writer.write_i32::<LittleEndian>(node.children.len() as i32)?;
    for child in &node.children {
        write_node(writer, child)?;
    }
    Ok(())
}

fn read_string<R: Read>(reader: &mut R) -> Result<String, CatalogError> {
    let len = reader.read_u32::<LittleEndian>()?;
    if len > MAX_STRING_LEN {
        return Err(CatalogError::CatalogFormat(format!(
            "implausible string length {}",
            len
        )));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|_| CatalogError::CatalogFormat("stored name is not valid UTF-8".into()))
}

fn read_node<R: Read>(reader: &mut R) -> Result<CatalogNode, CatalogError> {
    let kind_value = reader.read_i32::<LittleEndian>()?;
    let kind = NodeKind::from_i32(kind_value).ok_or_else(|| {
        CatalogError::CatalogFormat(format!("unknown node kind {}", kind_value))
    })?;
    let name = read_string(reader)?;
    let offset = reader.read_i64::<LittleEndian>()?;
    if offset < 0 {
        return Err(CatalogError::CatalogFormat(format!(
            "negative record offset {}",
            offset
        )));
    }
    let child_count = reader.read_i32::<LittleEndian>()?;
    if child_count < 0 {
        return Err(CatalogError::CatalogFormat(format!(
            "negative child count {}",
            child_count
        )));
    }

    let mut node = CatalogNode::new(kind, name, offset as u64);
    for _ in 0..child_count {
        node.children.push(read_node(reader)?);
    }
    Ok(node)
}

//! Descriptor block stream reader.
//!
//! This module interprets the raw bytes of a backup image as a sequence of
//! descriptor blocks, reading from any source that implements the
//! [`ReadAt`] trait.
//!
//! ## Reading Strategy
//!
//! Unlike archive formats with a trailing directory, a tape image is read
//! front to back:
//! 1. Peek the 4-byte type tag at the current position (non-consuming)
//! 2. Read the 52-byte common header to learn where the stream chain starts
//! 3. Re-read the whole descriptor region and decode the typed body,
//!    resolving tape-address string references inside the region
//! 4. Walk the sub-stream chain until its `SPAD` terminator, buffering
//!    every named stream
//!
//! Each read leaves the position at the start of the next block, so the
//! catalog builder can drive the stream with a plain peek/read loop. The
//! same reader re-enters the image at arbitrary offsets during extraction
//! (`seek` followed by one `read_block`).

use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::{Context, Result, bail};

use super::structures::*;

/// Round up to the next 4-byte boundary; blocks and sub-stream headers are
/// 4-aligned in the image
fn align4(offset: u64) -> u64 {
    (offset + 3) & !3
}

/// Forward reader and random-access decoder for a backup image.
///
/// Holds the current byte position. During a catalog build the position
/// only advances; extraction repositions it per file, so it is not
/// monotonic across the stream's whole life. The two modes must not be
/// interleaved by concurrent callers — the stream has no internal locking.
///
/// ## Example
///
/// ```ignore
/// let mut stream = BackupStream::new(reader);
/// while let Some(block_type) = stream.peek_next_block_type().await? {
///     if block_type == BlockType::EndOfMedia {
///         break;
///     }
///     let block = stream.read_block().await?;
///     // classify block...
/// }
/// ```
pub struct BackupStream<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Current byte position; the next `read_block` decodes here
    pos: u64,
    /// Total size of the image in bytes
    size: u64,
}

impl<R: ReadAt> BackupStream<R> {
    /// Create a new stream positioned at the start of the image.
    ///
    /// # Arguments
    ///
    /// * `reader` - A shared reference to a reader implementing [`ReadAt`]
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self {
            reader,
            pos: 0,
            size,
        }
    }

    /// Current byte position in the image
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Total length of the image in bytes
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Reposition the stream; the next `read_block` decodes at `offset`
    pub fn seek(&mut self, offset: u64) {
        self.pos = offset;
    }

    /// Get a reference to the underlying reader
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    /// Report the type of the next block without consuming it.
    ///
    /// # Returns
    ///
    /// `None` when the stream is exhausted: at end-of-image, or when the
    /// position holds a zeroed tag (the null sentinel left by writers that
    /// pad the image tail).
    ///
    /// # Errors
    ///
    /// Returns an error if the source itself fails to produce bytes.
    pub async fn peek_next_block_type(&self) -> Result<Option<BlockType>> {
        if self.pos + 4 > self.size {
            return Ok(None);
        }

        let mut tag = [0u8; 4];
        self.reader
            .read_exact_at(self.pos, &mut tag)
            .await
            .with_context(|| format!("failed to peek block type at offset {}", self.pos))?;

        if tag == [0u8; 4] {
            return Ok(None);
        }

        Ok(Some(BlockType::from_tag(tag)))
    }

    /// Consume one descriptor block at the current position.
    ///
    /// Decodes the common header, the typed body and the full sub-stream
    /// chain, and advances the position to the start of the next block.
    ///
    /// # Returns
    ///
    /// The decoded [`DescriptorBlock`]. Unrecognized block types decode
    /// with a [`BlockBody::Other`] body so callers can keep the stream
    /// advancing.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes at the current position do not form a
    /// valid block (truncated header, descriptor region out of bounds,
    /// string reference escaping the region, or a stream chain running past
    /// the end of the image).
    pub async fn read_block(&mut self) -> Result<DescriptorBlock> {
        let start = self.pos;

        let mut header_buf = [0u8; CommonHeader::SIZE];
        self.reader
            .read_exact_at(start, &mut header_buf)
            .await
            .with_context(|| format!("failed to read block header at offset {}", start))?;
        let header = CommonHeader::from_bytes(&header_buf)?;

        // The descriptor region spans from the block start to the first
        // stream header and contains every tape-addressed string.
        let descriptor_len = header.offset_to_first_stream as u64;
        if descriptor_len < CommonHeader::SIZE as u64 {
            bail!(
                "descriptor region of {} bytes at offset {} is smaller than the block header",
                descriptor_len,
                start
            );
        }
        if start + descriptor_len > self.size {
            bail!("descriptor region at offset {} runs past end of image", start);
        }

        let mut descriptor = vec![0u8; descriptor_len as usize];
        self.reader.read_exact_at(start, &mut descriptor).await?;

        let body = Self::parse_body(&header, &descriptor)
            .with_context(|| format!("failed to decode block body at offset {}", start))?;

        let (streams, next) = self.read_stream_chain(start + descriptor_len).await?;
        self.pos = next;

        Ok(DescriptorBlock {
            offset: start,
            string_type: header.string_type,
            body,
            streams,
        })
    }

    /// Decode the typed body from the descriptor region
    fn parse_body(header: &CommonHeader, descriptor: &[u8]) -> Result<BlockBody> {
        let st = header.string_type;
        Ok(match header.block_type {
            BlockType::MediaHeader => {
                BlockBody::MediaHeader(MediaHeaderBlock::from_descriptor(descriptor, st)?)
            }
            BlockType::SoftFilemark => BlockBody::SoftFilemark,
            BlockType::SetStart => BlockBody::Set(SetBlock::from_descriptor(descriptor, st)?),
            BlockType::Volume => BlockBody::Volume(VolumeBlock::from_descriptor(descriptor, st)?),
            BlockType::Directory => {
                BlockBody::Directory(DirectoryBlock::from_descriptor(descriptor, st)?)
            }
            BlockType::File => BlockBody::File(FileBlock::from_descriptor(descriptor, st)?),
            other => BlockBody::Other(other),
        })
    }

    /// Walk the sub-stream chain starting at `chain_start`.
    ///
    /// Buffers every named stream until the `SPAD` terminator, whose
    /// payload is skipped without buffering (it only pads out to the next
    /// block).
    ///
    /// # Returns
    ///
    /// The collected streams and the offset of the next block.
    async fn read_stream_chain(&self, chain_start: u64) -> Result<(Vec<DataStream>, u64)> {
        let mut streams = Vec::new();
        let mut pos = chain_start;

        loop {
            let mut header_buf = [0u8; StreamHeader::SIZE];
            self.reader
                .read_exact_at(pos, &mut header_buf)
                .await
                .with_context(|| format!("failed to read sub-stream header at offset {}", pos))?;
            let stream_header = StreamHeader::from_bytes(&header_buf)?;
            pos += StreamHeader::SIZE as u64;

            if stream_header.length > self.size.saturating_sub(pos) {
                bail!(
                    "sub-stream of {} bytes at offset {} runs past end of image",
                    stream_header.length,
                    pos
                );
            }

            if stream_header.id == STREAM_PAD {
                pos = align4(pos + stream_header.length);
                break;
            }

            let mut data = vec![0u8; stream_header.length as usize];
            self.reader.read_exact_at(pos, &mut data).await?;
            pos = align4(pos + stream_header.length);

            streams.push(DataStream {
                id: stream_header.id,
                data,
            });
        }

        Ok((streams, pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(21), 24);
    }
}

//! Single-pass catalog construction.
//!
//! The builder drives a [`BackupStream`] front to back exactly once,
//! classifying each descriptor record and attaching a node for it to the
//! right parent. Attribution is a small amount of mutable state local to
//! one build call: the most recent set, volume and folder, kept as
//! child-index paths into the growing tree.
//!
//! ## Loop Shape
//!
//! After the fixed two-record preamble (media header, soft filemark) the
//! loop peeks the next record type, stops on the end-of-media marker, the
//! stream's null sentinel, or a caller-set cancellation flag, and otherwise
//! consumes the record and dispatches on its typed body. Cancellation and
//! early termination yield a structurally valid prefix catalog, not an
//! error.
//!
//! ## Name Resolution
//!
//! Directory and file records may carry their name inline or in a named
//! sub-stream (`PNAM`/`FNAM`), selected by an attribute bit. Directory
//! names lose exactly one trailing terminator character; file names are
//! taken as stored. A record whose attribute bit promises a name stream
//! that is not present produces no node at all — the record is skipped and
//! attribution state is left untouched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;

use crate::io::ReadAt;
use crate::mtf::{
    BackupStream, BlockBody, BlockType, DIRB_PATH_IN_STREAM_BIT, DescriptorBlock, DirectoryBlock,
    FILE_NAME_IN_STREAM_BIT, FileBlock, STREAM_DIRECTORY_NAME, STREAM_FILE_NAME, decode_string,
};

use super::error::CatalogError;
use super::node::{CatalogNode, NodeKind, RecordSummary};

/// Progress sink, invoked with whole percentages in `[0, 100]`.
///
/// Called synchronously on the build loop's task; it must not block for
/// long, since it delays the parse.
pub type ProgressSink = Box<dyn Fn(u8) + Send + Sync>;

/// Attribution targets threaded through one build pass.
///
/// Paths are child-index chains from the root; they are stable because the
/// tree is append-only during the build.
#[derive(Default)]
struct Attribution {
    set: Option<Vec<usize>>,
    volume: Option<Vec<usize>>,
    folder: Option<Vec<usize>>,
}

/// Builds a catalog tree from a backup image in a single forward pass.
///
/// ## Example
///
/// ```ignore
/// let catalog = CatalogBuilder::new()
///     .with_progress(|pct| eprintln!("{pct}%"))
///     .build(&mut stream)
///     .await?;
/// ```
pub struct CatalogBuilder {
    progress: Option<ProgressSink>,
    cancel: Option<Arc<AtomicBool>>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self {
            progress: None,
            cancel: None,
        }
    }

    /// Install a progress sink, invoked whenever the stream position has
    /// advanced by at least 1% of the image since the last report
    pub fn with_progress(mut self, sink: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(sink));
        self
    }

    /// Install a cancellation flag, polled once per record.
    ///
    /// Setting the flag stops the build cooperatively; the catalog built so
    /// far is returned as a valid, merely incomplete tree.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Read the entire backup image and return the root catalog node.
    ///
    /// The root node carries the media name; backup sets, volumes, folders
    /// and files hang below it in record order.
    ///
    /// # Errors
    ///
    /// [`CatalogError::Decode`] if the image does not start with a media
    /// header or a record cannot be decoded;
    /// [`CatalogError::StructuralViolation`] if a record arrives with no
    /// active parent of the required kind.
    pub async fn build<R: ReadAt>(
        &self,
        stream: &mut BackupStream<R>,
    ) -> Result<CatalogNode, CatalogError> {
        // Fixed two-record preamble: the media header names the root, the
        // soft filemark that follows is consumed unconditionally.
        let header_block = stream.read_block().await?;
        let BlockBody::MediaHeader(media) = &header_block.body else {
            return Err(CatalogError::Decode(anyhow!(
                "backup image does not begin with a media header record"
            )));
        };
        let _soft_filemark = stream.read_block().await?;

        let mut root = CatalogNode::with_summary(
            NodeKind::Root,
            media.media_name.clone(),
            header_block.offset,
            RecordSummary::Media {
                media_name: media.media_name.clone(),
            },
        );

        let mut targets = Attribution::default();

        let total = stream.len();
        let increment = total / 100;
        let mut last_reported = 0u64;

        loop {
            if self.is_cancelled() {
                break;
            }
            let Some(block_type) = stream.peek_next_block_type().await? else {
                break;
            };
            if block_type == BlockType::EndOfMedia {
                break;
            }

            let block = stream.read_block().await?;
            self.dispatch(&block, &mut root, &mut targets)?;

            let position = stream.position();
            if position > last_reported + increment {
                last_reported = position;
                if let Some(sink) = &self.progress {
                    sink((position as u128 * 100 / total.max(1) as u128) as u8);
                }
            }
        }

        Ok(root)
    }

    /// Classify one consumed record and attach its node, updating the
    /// attribution targets
    fn dispatch(
        &self,
        block: &DescriptorBlock,
        root: &mut CatalogNode,
        targets: &mut Attribution,
    ) -> Result<(), CatalogError> {
        match &block.body {
            BlockBody::Set(set) => {
                let name = format!("Set: {} - {}", set.set_number, set.set_name);
                let node = CatalogNode::with_summary(
                    NodeKind::Set,
                    name,
                    block.offset,
                    RecordSummary::Set {
                        set_number: set.set_number,
                        set_name: set.set_name.clone(),
                    },
                );
                let index = root.add_child(node);
                targets.set = Some(vec![index]);
                targets.volume = None;
                targets.folder = None;
            }
            BlockBody::Volume(volume) => {
                let Some(set_path) = targets.set.clone() else {
                    return Err(CatalogError::StructuralViolation {
                        record: "volume",
                        requires: "set",
                    });
                };
                let node = CatalogNode::with_summary(
                    NodeKind::Volume,
                    volume.device_name.clone(),
                    block.offset,
                    RecordSummary::Volume {
                        device_name: volume.device_name.clone(),
                    },
                );
                let index = node_at_mut(root, &set_path).add_child(node);
                let mut volume_path = set_path;
                volume_path.push(index);
                targets.volume = Some(volume_path);
                targets.folder = None;
            }
            BlockBody::Directory(directory) => {
                // A promised-but-missing PNAM stream skips the record
                let Some(name) = resolve_directory_name(block, directory) else {
                    return Ok(());
                };
                let Some(parent_path) =
                    targets.folder.clone().or_else(|| targets.volume.clone())
                else {
                    return Err(CatalogError::StructuralViolation {
                        record: "directory",
                        requires: "volume",
                    });
                };
                let node = CatalogNode::new(NodeKind::Folder, name, block.offset);
                let index = node_at_mut(root, &parent_path).add_child(node);
                let mut folder_path = parent_path;
                folder_path.push(index);
                targets.folder = Some(folder_path);
            }
            BlockBody::File(file) => {
                let Some(name) = resolve_file_name(block, file) else {
                    return Ok(());
                };
                let Some(folder_path) = targets.folder.as_deref() else {
                    return Err(CatalogError::StructuralViolation {
                        record: "file",
                        requires: "folder",
                    });
                };
                let node = CatalogNode::new(NodeKind::File, name, block.offset);
                node_at_mut(root, folder_path).add_child(node);
            }
            // Preamble repeats and unrecognized records are consumed so the
            // stream keeps advancing, but produce no node
            BlockBody::MediaHeader(_) | BlockBody::SoftFilemark | BlockBody::Other(_) => {}
        }
        Ok(())
    }
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Follow a child-index path; paths come from the attribution state and
/// always point at live nodes
fn node_at_mut<'a>(root: &'a mut CatalogNode, path: &[usize]) -> &'a mut CatalogNode {
    let mut node = root;
    for &index in path {
        node = &mut node.children[index];
    }
    node
}

/// Resolve a directory record's display name.
///
/// Prefers the `PNAM` sub-stream whenever the attribute bit says the path
/// lives there, even if an inline name is also present. Exactly one
/// trailing terminator character is stripped.
fn resolve_directory_name(block: &DescriptorBlock, directory: &DirectoryBlock) -> Option<String> {
    let name = if directory.attributes & DIRB_PATH_IN_STREAM_BIT != 0 {
        let stream = block.stream(STREAM_DIRECTORY_NAME)?;
        decode_string(block.string_type, &stream.data)
    } else {
        directory.directory_name.clone()?
    };
    Some(strip_terminator(name))
}

/// Resolve a file record's display name.
///
/// Same stream-vs-inline selection as directories, but file names are
/// stored without a terminator and are not stripped.
fn resolve_file_name(block: &DescriptorBlock, file: &FileBlock) -> Option<String> {
    if file.attributes & FILE_NAME_IN_STREAM_BIT != 0 {
        let stream = block.stream(STREAM_FILE_NAME)?;
        Some(decode_string(block.string_type, &stream.data))
    } else {
        file.file_name.clone()
    }
}

/// Drop exactly one trailing terminator character (one decoded character,
/// not one byte — a wide terminator is two bytes but one unit)
fn strip_terminator(mut name: String) -> String {
    name.pop();
    name
}

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::io::ReadAt;
use crate::mtf::{BackupStream, BlockBody, STREAM_FILE_DATA};

use super::error::CatalogError;
use super::node::{CatalogNode, NodeKind};

/// Materializes catalog subtrees onto a target filesystem.
///
/// File contents are pulled lazily: every file node re-seeks the backup
/// stream to its recorded offset and decodes exactly one record there, so
/// nodes can be extracted in any order or subset without replaying the
/// build pass.
pub struct Extractor<'a, R: ReadAt> {
    stream: &'a mut BackupStream<R>,
}

impl<'a, R: ReadAt> Extractor<'a, R> {
    pub fn new(stream: &'a mut BackupStream<R>) -> Self {
        Self { stream }
    }

    /// Extract `node` and everything below it into `target_dir`.
    ///
    /// Volume nodes extract into `target_dir` itself, folder nodes create
    /// a subdirectory named after them, file nodes become files. Directory
    /// creation is idempotent and existing files are overwritten.
    ///
    /// # Errors
    ///
    /// [`CatalogError::UnsupportedExtraction`] for root and set nodes (no
    /// filesystem mutation is performed); [`CatalogError::Decode`] if a
    /// file node's offset does not hold a file record.
    pub async fn extract(
        &mut self,
        node: &CatalogNode,
        target_dir: &Path,
    ) -> Result<(), CatalogError> {
        if matches!(node.kind, NodeKind::Root | NodeKind::Set) {
            return Err(CatalogError::UnsupportedExtraction(node.kind));
        }

        // Worklist of (node, directory it materializes into); keeps the
        // traversal iterative and in record order per level
        let mut work: VecDeque<(&CatalogNode, PathBuf)> = VecDeque::new();
        work.push_back((node, target_dir.to_path_buf()));

        while let Some((current, dir)) = work.pop_front() {
            match current.kind {
                NodeKind::Root | NodeKind::Set => {
                    return Err(CatalogError::UnsupportedExtraction(current.kind));
                }
                NodeKind::Volume => {
                    fs::create_dir_all(&dir).await?;
                    for child in &current.children {
                        work.push_back((child, dir.clone()));
                    }
                }
                NodeKind::Folder => {
                    let sub = dir.join(&current.name);
                    fs::create_dir_all(&sub).await?;
                    for child in &current.children {
                        work.push_back((child, sub.clone()));
                    }
                }
                NodeKind::File => {
                    fs::create_dir_all(&dir).await?;
                    let data = self.read_file_data(current).await?;
                    let mut file = fs::File::create(dir.join(&current.name)).await?;
                    file.write_all(&data).await?;
                    file.flush().await?;
                }
            }
        }

        Ok(())
    }

    /// Seek to a file node's record and return its data stream bytes.
    ///
    /// Multiple `STAN` streams on one record are concatenated in on-tape
    /// order. Also used by pipe mode to copy a file to stdout.
    pub async fn read_file_data(&mut self, node: &CatalogNode) -> Result<Vec<u8>, CatalogError> {
        self.stream.seek(node.offset);
        let block = self.stream.read_block().await?;

        let BlockBody::File(_) = block.body else {
            return Err(CatalogError::Decode(anyhow!(
                "catalog offset {} for '{}' does not hold a file record",
                node.offset,
                node.name
            )));
        };

        let mut data = Vec::new();
        for stream in &block.streams {
            if stream.id == STREAM_FILE_DATA {
                data.extend_from_slice(&stream.data);
            }
        }
        Ok(data)
    }
}

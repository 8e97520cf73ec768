//! # runbkf
//!
//! A Rust tape-format backup (MTF/NTBackup) catalog reader and extractor
//! with HTTP URL support using Range requests.
//!
//! This library reads the descriptor-block stream of a backup image, builds
//! an in-memory catalog tree of its sets, volumes, folders and files, and
//! extracts selected nodes by seeking back to the byte offsets recorded in
//! the catalog. For remote images it uses HTTP Range requests, so cataloging
//! and selective extraction never download the whole image. The catalog can
//! be persisted as a compact sidecar index and reloaded later without
//! re-scanning the image.
//!
//! ## Features
//!
//! - Catalog backup images from the local filesystem or HTTP/HTTPS URLs
//! - Lazy, offset-indexed extraction of any volume, folder or file node
//! - Sidecar catalog index: scan once, extract many times
//! - Progress reporting and cooperative cancellation during the scan
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use runbkf::{BackupStream, CatalogBuilder, LocalFileReader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Open a local backup image
//!     let reader = Arc::new(LocalFileReader::new(std::path::Path::new("backup.bkf"))?);
//!
//!     // Scan it into a catalog tree
//!     let mut stream = BackupStream::new(reader);
//!     let catalog = CatalogBuilder::new().build(&mut stream).await?;
//!
//!     // List the backup sets on the media
//!     for set in &catalog.children {
//!         println!("{}", set.name);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod cli;
pub mod io;
pub mod mtf;

pub use catalog::{
    CatalogBuilder, CatalogError, CatalogNode, Extractor, NodeKind, RecordSummary, load_catalog,
    read_image_path, save_catalog,
};
pub use cli::Cli;
pub use io::{HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
pub use mtf::{BackupStream, BlockBody, BlockType, DescriptorBlock};

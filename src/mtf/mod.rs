//! Tape-format backup image parsing.
//!
//! This module reads the descriptor-block stream of an MTF/NTBackup-style
//! backup image, from any source that implements [`ReadAt`](crate::io::ReadAt).
//!
//! ## Format Overview
//!
//! A backup image is a forward sequence of variable-length *descriptor
//! blocks*, each starting on a 4-byte boundary:
//!
//! 1. A media header (`TAPE`) naming the media, followed by a soft
//!    filemark (`SFMB`)
//! 2. For each backup set: a set start (`SSET`), volumes (`VOLB`),
//!    directories (`DIRB`) and files (`FILE`)
//! 3. An end-of-media marker (`EOTM`)
//!
//! Every block carries a 52-byte common header (type tag, attributes, string
//! encoding, offset to its stream chain), a type-specific body whose strings
//! are referenced through `(size, offset)` *tape addresses*, and a chain of
//! named sub-streams terminated by a `SPAD` padding stream. Sub-streams carry
//! out-of-line data such as long names (`PNAM`, `FNAM`) and file payloads
//! (`STAN`).
//!
//! ## Access Modes
//!
//! [`BackupStream`] supports two distinct access modes over one resource:
//! the sequential walk used while building a catalog (peek, then read), and
//! random re-entry (`seek` + `read_block`) used during extraction to decode
//! exactly one block at an offset recorded in the catalog.
//!
//! ## Limitations
//!
//! - Header checksums are not verified
//! - Stream payload compression and encryption are not interpreted;
//!   payload bytes are passed through verbatim
//! - Multi-volume media spanning is not supported

mod parser;
mod structures;

pub use parser::BackupStream;
pub use structures::*;

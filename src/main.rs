//! Main entry point for the runbkf CLI application.
//!
//! This binary catalogs tape-format backup images from the local filesystem
//! or remote HTTP URLs, lists their contents, and extracts selected volumes,
//! folders and files.

use anyhow::{Result, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;

use runbkf::{
    BackupStream, CatalogBuilder, CatalogNode, Cli, Extractor, HttpRangeReader, LocalFileReader,
    NodeKind, ReadAt, RecordSummary, load_catalog, read_image_path, save_catalog,
};

/// Application entry point.
///
/// Parses command-line arguments, resolves the backup image reference (from
/// the command line or from a saved catalog index), and dispatches to the
/// appropriate handler based on whether the image is local or remote.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (image_ref, filters) = resolve_inputs(&cli)?;

    if is_http_url(&image_ref) {
        // Handle remote backup image via HTTP Range requests
        let reader = HttpRangeReader::new(image_ref.clone()).await?;
        let transferred_before = reader.transferred_bytes();
        let reader = Arc::new(reader);

        process_backup(reader.clone(), &cli, &image_ref, &filters).await?;

        // Display network transfer statistics for HTTP sources
        if !cli.is_quiet() {
            let transferred = reader.transferred_bytes() - transferred_before;
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
        }
    } else {
        // Handle local backup image
        let reader = Arc::new(LocalFileReader::new(Path::new(&image_ref))?);
        process_backup(reader, &cli, &image_ref, &filters).await?;
    }

    Ok(())
}

/// Resolve the backup image reference and the node selectors.
///
/// With `--catalog` the image path always comes from the saved index and
/// every positional argument selects nodes; otherwise the first positional
/// is the image and the rest select nodes.
fn resolve_inputs(cli: &Cli) -> Result<(String, Vec<String>)> {
    if let Some(catalog_path) = &cli.catalog {
        let stored = read_image_path(Path::new(catalog_path))?;
        let mut filters: Vec<String> = cli.file.clone().into_iter().collect();
        filters.extend(cli.nodes.iter().cloned());
        Ok((stored, filters))
    } else {
        let Some(file) = cli.file.clone() else {
            bail!("either a backup image or a catalog index is required");
        };
        Ok((file, cli.nodes.clone()))
    }
}

fn is_http_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Process a backup image based on CLI options.
///
/// Obtains a catalog (by scanning the image or reusing a saved index),
/// optionally persists it, then handles listing or extraction:
/// - List mode (`-l` or `-v`): display the catalog tree
/// - Extract mode: extract the selected nodes
async fn process_backup<R: ReadAt + 'static>(
    reader: Arc<R>,
    cli: &Cli,
    image_ref: &str,
    filters: &[String],
) -> Result<()> {
    let mut stream = BackupStream::new(reader);

    let catalog = if let Some(catalog_path) = &cli.catalog {
        let (_, root) = load_catalog(Path::new(catalog_path))?;
        root
    } else {
        read_catalog(&mut stream, cli).await?
    };

    if let Some(path) = &cli.save_catalog {
        save_catalog(Path::new(path), &catalog, &canonical_image_ref(image_ref))?;
        if !cli.is_quiet() {
            eprintln!("Catalog index saved to {}", path);
        }
    }

    // List mode: display the catalog and exit
    if cli.list || cli.verbose {
        list_catalog(&catalog, cli.verbose);
        return Ok(());
    }

    extract_nodes(&mut stream, &catalog, cli, filters).await
}

/// Scan the backup image into a catalog tree.
///
/// Progress is rendered in place on stderr unless quiet; Ctrl-C flips the
/// cancellation flag, which ends the scan early with a valid prefix
/// catalog instead of aborting the process.
async fn read_catalog<R: ReadAt>(stream: &mut BackupStream<R>, cli: &Cli) -> Result<CatalogNode> {
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let mut builder = CatalogBuilder::new().with_cancel_flag(cancel.clone());
    if !cli.is_quiet() {
        builder = builder.with_progress(|pct| {
            eprint!("\rReading catalog: {:>3}%", pct);
        });
    }

    let catalog = builder.build(stream).await?;

    if !cli.is_quiet() {
        eprintln!("\rReading catalog: done");
        if cancel.load(Ordering::Relaxed) {
            eprintln!("Scan cancelled; the catalog holds what was read so far");
        }
    }

    Ok(catalog)
}

/// Print the catalog tree.
///
/// Supports two output formats:
/// - Simple format (`-l`): indented node names
/// - Verbose format (`-v`): kind and record offset columns plus per-level
///   details (set number, device name)
fn list_catalog(root: &CatalogNode, verbose: bool) {
    if verbose {
        println!("{:<8}  {:>10}  Name", "Kind", "Offset");
        println!("{}", "-".repeat(60));
    }
    print_node(root, 0, verbose);
}

fn print_node(node: &CatalogNode, depth: usize, verbose: bool) {
    let indent = "  ".repeat(depth);
    if verbose {
        let details = match &node.summary {
            Some(RecordSummary::Set {
                set_number,
                set_name,
            }) => format!("  [set #{} '{}']", set_number, set_name),
            Some(RecordSummary::Volume { device_name }) => {
                format!("  [device '{}']", device_name)
            }
            Some(RecordSummary::Media { .. }) | None => String::new(),
        };
        println!(
            "{:<8}  {:>10}  {}{}{}",
            node.kind, node.offset, indent, node.name, details
        );
    } else {
        println!("{}{}", indent, node.name);
    }

    for child in &node.children {
        print_node(child, depth + 1, verbose);
    }
}

/// Extract the selected catalog nodes.
///
/// Selection rules:
/// 1. With no positional NODES arguments, every volume node is extracted
/// 2. Otherwise nodes are matched by exact name, by `/`-joined catalog
///    path, or by glob pattern; a matching node brings its whole subtree
///
/// Pipe mode (`-p`) writes file node contents to stdout instead of the
/// filesystem and skips non-file selections.
async fn extract_nodes<R: ReadAt>(
    stream: &mut BackupStream<R>,
    catalog: &CatalogNode,
    cli: &Cli,
    filters: &[String],
) -> Result<()> {
    let selected = select_nodes(catalog, filters);
    if selected.is_empty() {
        bail!("no catalog nodes match the requested names");
    }

    let target = PathBuf::from(cli.extract_dir.as_deref().unwrap_or("."));
    let mut extractor = Extractor::new(stream);

    for (path, node) in selected {
        if cli.pipe {
            if node.kind != NodeKind::File {
                if !cli.is_quiet() {
                    eprintln!("Skipping: {} (only file nodes can be piped)", path);
                }
                continue;
            }
            let data = extractor.read_file_data(node).await?;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
            continue;
        }

        if !cli.is_quiet() {
            println!("  extracting: {}", path);
        }
        extractor.extract(node, &target).await?;
    }

    Ok(())
}

/// Select catalog nodes to extract, returning (catalog path, node) pairs.
///
/// A node that matches is selected as a whole; its subtree is not searched
/// further.
fn select_nodes<'a>(root: &'a CatalogNode, filters: &[String]) -> Vec<(String, &'a CatalogNode)> {
    let mut selected = Vec::new();

    if filters.is_empty() {
        // Default: every volume node in record order
        for set in &root.children {
            for volume in &set.children {
                if volume.kind == NodeKind::Volume {
                    selected.push((volume.name.clone(), volume));
                }
            }
        }
        return selected;
    }

    collect_matches(root, "", filters, &mut selected);
    selected
}

fn collect_matches<'a>(
    node: &'a CatalogNode,
    prefix: &str,
    filters: &[String],
    selected: &mut Vec<(String, &'a CatalogNode)>,
) {
    for child in &node.children {
        let path = if prefix.is_empty() {
            child.name.clone()
        } else {
            format!("{}/{}", prefix, child.name)
        };

        if filters.iter().any(|f| matches_filter(f, &child.name, &path)) {
            selected.push((path, child));
        } else {
            collect_matches(child, &path, filters, selected);
        }
    }
}

/// Match a single filter against a node's name and catalog path
fn matches_filter(pattern: &str, name: &str, path: &str) -> bool {
    if has_glob_chars(pattern) {
        glob_match(pattern, name) || glob_match(pattern, path)
    } else {
        pattern == name || pattern == path
    }
}

/// Resolve the image reference recorded in a saved catalog index.
///
/// Local paths are canonicalized so the index stays usable from other
/// working directories; URLs are recorded as given.
fn canonical_image_ref(image_ref: &str) -> String {
    if is_http_url(image_ref) {
        return image_ref.to_string();
    }
    std::fs::canonicalize(image_ref)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| image_ref.to_string())
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// This is a basic implementation for node matching:
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
///
/// # Examples
///
/// ```ignore
/// assert!(glob_match("*.txt", "readme.txt"));
/// assert!(glob_match("docs/file?.dat", "docs/file1.dat"));
/// assert!(!glob_match("*.txt", "readme.md"));
/// ```
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    /// Recursive helper function for glob matching.
    ///
    /// Uses a simple backtracking algorithm to handle `*` wildcards.
    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            // Both exhausted: match successful
            (None, None) => true,
            // Star matches zero or more characters
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            // Question mark matches exactly one character
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            // Literal character match
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            // No match
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

/// Format a byte size into a human-readable string.
///
/// Automatically selects the appropriate unit (bytes, KB, MB, GB)
/// based on the size magnitude.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> CatalogNode {
        let mut root = CatalogNode::new(NodeKind::Root, "TAPE1".into(), 0);
        let mut set = CatalogNode::new(NodeKind::Set, "Set: 1 - Backup".into(), 100);
        let mut volume = CatalogNode::new(NodeKind::Volume, "C:".into(), 200);
        let mut folder = CatalogNode::new(NodeKind::Folder, "docs".into(), 300);
        folder.add_child(CatalogNode::new(NodeKind::File, "a.txt".into(), 400));
        volume.add_child(folder);
        set.add_child(volume);
        root.add_child(set);
        root
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("*.txt", "readme.txt"));
        assert!(glob_match("file?.dat", "file1.dat"));
        assert!(glob_match("*", "anything"));
        assert!(!glob_match("*.txt", "readme.md"));
        assert!(!glob_match("file?.dat", "file12.dat"));
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(500), "500 bytes");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
    }

    #[test]
    fn default_selection_is_all_volumes() {
        let catalog = sample_catalog();
        let selected = select_nodes(&catalog, &[]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0, "C:");
        assert_eq!(selected[0].1.kind, NodeKind::Volume);
    }

    #[test]
    fn selection_by_name_and_path() {
        let catalog = sample_catalog();

        let by_name = select_nodes(&catalog, &["docs".to_string()]);
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].0, "Set: 1 - Backup/C:/docs");

        let by_path = select_nodes(&catalog, &["Set: 1 - Backup/C:/docs/a.txt".to_string()]);
        assert_eq!(by_path.len(), 1);
        assert_eq!(by_path[0].1.kind, NodeKind::File);

        let by_glob = select_nodes(&catalog, &["*.txt".to_string()]);
        assert_eq!(by_glob.len(), 1);
        assert_eq!(by_glob[0].1.name, "a.txt");
    }

    #[test]
    fn matched_subtrees_are_not_searched_further() {
        let catalog = sample_catalog();
        let selected = select_nodes(&catalog, &["docs".to_string(), "a.txt".to_string()]);
        // "docs" matches first and owns its subtree; a.txt is not re-selected
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].1.name, "docs");
    }
}

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "runbkf")]
#[command(version)]
#[command(about = "A Rust tape-format backup catalog reader with HTTP URL support", long_about = None)]
#[command(after_help = "Examples:\n  \
  runbkf -l backup.bkf           list the catalog of backup.bkf\n  \
  runbkf backup.bkf docs         extract the 'docs' folder into the current directory\n  \
  runbkf -s backup.cat backup.bkf -l   scan once, saving the catalog index\n  \
  runbkf -c backup.cat '*.txt' -d out  extract using a saved index, no rescan\n  \
  runbkf -l https://example.com/backup.bkf   catalog a remote image via Range requests")]
pub struct Cli {
    /// Backup image path or HTTP URL; with --catalog the image comes from
    /// the index and positional arguments all select nodes
    #[arg(value_name = "FILE", required_unless_present = "catalog")]
    pub file: Option<String>,

    /// Nodes to extract, by name or catalog path (default: all volumes)
    #[arg(value_name = "NODES")]
    pub nodes: Vec<String>,

    /// List catalog (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely: kind, offset, details
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract file nodes to stdout, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Save the catalog index to a file after scanning
    #[arg(short = 's', long = "save-catalog", value_name = "FILE")]
    pub save_catalog: Option<String>,

    /// Reuse a saved catalog index instead of scanning the image
    #[arg(short = 'c', long = "catalog", value_name = "FILE")]
    pub catalog: Option<String>,

    /// Quiet mode (no progress or per-node messages)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file
            .as_deref()
            .is_some_and(|f| f.starts_with("http://") || f.starts_with("https://"))
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }
}

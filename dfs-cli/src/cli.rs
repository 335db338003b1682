use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dfs::DEFAULT_GRANULARITY;

#[derive(Parser)]
#[command(name = "dfs", version, about = "Format, list and append to DFS disk images")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Format a disk image, creating the file if it does not exist
    Format {
        /// Disk image file
        image: PathBuf,

        /// Partition size (e.g. 32768000, 64M, 1G), a multiple of 4K
        #[arg(long, short, default_value = "32768000", value_parser = parse_size)]
        size: u64,

        /// Bytes tracked by one allocation bitmap bit
        #[arg(long, short, default_value_t = DEFAULT_GRANULARITY)]
        granularity: u16,
    },

    /// List the header and every entry of a disk image
    List {
        /// Disk image file
        image: PathBuf,
    },

    /// Append a host file to a disk image
    Append {
        /// Disk image file
        image: PathBuf,

        /// Host file to copy in
        source: PathBuf,

        /// Name inside the image, defaults to the source's file name
        #[arg(long, short)]
        name: Option<String>,
    },

    /// Print the content of a file stored in a disk image
    Cat {
        /// Disk image file
        image: PathBuf,

        /// Name inside the image
        name: String,

        /// Write to this host file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// Parses a byte count with an optional K, M or G (binary) suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim().to_uppercase();
    let (digits, multiplier) = if let Some(n) = s.strip_suffix('G') {
        (n, 1 << 30)
    } else if let Some(n) = s.strip_suffix('M') {
        (n, 1 << 20)
    } else if let Some(n) = s.strip_suffix('K') {
        (n, 1 << 10)
    } else {
        (s.as_str(), 1)
    };

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| format!("invalid size {:?}", s))
}

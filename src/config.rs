//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "memdedup")]
#[command(about = "Reference-based deduplicating compressor for VM memory snapshots")]
#[command(version)]
pub struct Args {
    /// Enable debug logging.
    #[arg(long, short = 'd', global = true)]
    pub debug: bool,

    /// Minimal logging (errors only).
    #[arg(long, global = true)]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compress a source dump against a reference dump.
    #[command(name = "c")]
    Compress {
        /// Reference dump path.
        reference: PathBuf,
        /// Source dump path.
        source: PathBuf,
        /// Output artifact path.
        out: PathBuf,
        /// Page size in bytes.
        page_size: u32,
        /// Inner compression: gzip, bzip2, 7zip, or 0 to disable.
        inner: String,
        /// 1 enables diffing against same-index reference pages.
        #[arg(value_parser = clap::value_parser!(u8).range(0..=1))]
        diffing: u8,
        /// 1 enables intra-deduplication of new pages.
        #[arg(value_parser = clap::value_parser!(u8).range(0..=1))]
        intra: u8,
    },

    /// Decompress an artifact (needs access to its reference dump).
    #[command(name = "d")]
    Decompress {
        /// Compressed artifact path.
        input: PathBuf,
        /// Output dump path.
        out: PathBuf,
    },

    /// Run as a service on a Unix command socket.
    #[command(name = "s")]
    Serve {
        /// Worker thread count.
        threads: usize,
        /// Path of the command socket to create.
        socket_path: PathBuf,
    },
}

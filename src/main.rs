//! memdedup: reference-based deduplicating compressor for VM memory
//! snapshots.

use clap::Parser;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use memdedup::service::serve;
use memdedup::{
    compress_dump, decompress_dump, Args, Command, DedupResult, DumpCache, InnerCompression,
    MemoryDump, Method,
};

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug {
        Level::DEBUG
    } else if args.silent {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if let Err(e) = run(args.command).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(command: Command) -> DedupResult<()> {
    match command {
        Command::Compress {
            reference,
            source,
            out,
            page_size,
            inner,
            diffing,
            intra,
        } => {
            let method = Method {
                intra: intra == 1,
                diffing: diffing == 1,
                inner: InnerCompression::from_cli_token(&inner)?,
            };

            let refdump = MemoryDump::load(reference, page_size)?;
            let src = MemoryDump::load(source, page_size)?;
            compress_dump(&refdump, &src, &out, method)
        }
        Command::Decompress { input, out } => {
            // a one-shot cache keeps the CLI on the same code path as the
            // service
            let cache = DumpCache::new();
            decompress_dump(&input, &out, &cache)
        }
        Command::Serve {
            threads,
            socket_path,
        } => serve(&socket_path, threads).await,
    }
}

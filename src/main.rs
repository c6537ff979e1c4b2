use clap::{Parser, Subcommand};
use gzblock::codec::DEFAULT_LEVEL;
use gzblock::pipeline::{default_concurrency, inspect_file, Pipeline, PipelineOptions};
use gzblock::{Error, DEFAULT_CHUNK_SIZE};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "gzblock", version, about = "Block-parallel gzip compressor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a framed gzip archive
    Compress {
        source:      PathBuf,
        destination: PathBuf,
        /// Chunk size in KiB (default 1024 = 1 MiB)
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE / 1024)]
        chunk_size: usize,
        /// Worker threads (default: available parallelism, at most 16)
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Gzip level 0-9
        #[arg(short, long, default_value_t = DEFAULT_LEVEL)]
        level: u32,
    },
    /// Restore the original file from an archive
    Decompress {
        source:      PathBuf,
        destination: PathBuf,
        /// Worker threads (default: available parallelism, at most 16)
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Show the frame layout of an archive without decompressing it
    Info {
        archive: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse().command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", e.kind());
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), Error> {
    match command {

        // ── Compress ─────────────────────────────────────────────────────────
        Commands::Compress { source, destination, chunk_size, jobs, level } => {
            require_file(&source)?;
            let pipeline = Pipeline::new(PipelineOptions {
                chunk_size: chunk_size.saturating_mul(1024),
                max_concurrency: jobs.unwrap_or_else(default_concurrency),
                level,
            })?;
            let written = pipeline.compress_file(&source, &destination)?;
            println!("Compressed {written} bytes");
        }

        // ── Decompress ───────────────────────────────────────────────────────
        Commands::Decompress { source, destination, jobs } => {
            require_file(&source)?;
            let pipeline = Pipeline::new(PipelineOptions {
                max_concurrency: jobs.unwrap_or_else(default_concurrency),
                ..PipelineOptions::default()
            })?;
            let written = pipeline.decompress_file(&source, &destination)?;
            println!("Decompressed {written} bytes");
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { archive } => {
            require_file(&archive)?;
            let summary = inspect_file(&archive)?;
            println!("Archive        {}", archive.display());
            println!("  Size         {} B", summary.archive_len);
            println!("  Frames       {}", summary.frames.len());
            println!("  Payload      {} B", summary.payload_bytes());
            if let Some(max) = summary.largest_frame() {
                println!("  Largest      {max} B");
            }
            println!("{:>7} {:>14} {:>12}", "Frame", "Offset", "Payload");
            for f in &summary.frames {
                println!("{:>7} {:>14} {:>12}", f.index, f.offset, f.payload_len);
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Reject a missing source before any pipeline work starts.
fn require_file(path: &Path) -> Result<(), Error> {
    if path.is_file() {
        return Ok(());
    }
    Err(Error::SourceUnavailable {
        path:   path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::NotFound, "file does not exist"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_defaults_follow_library_constants() {
        let cli = Cli::try_parse_from(["gzblock", "compress", "in.bin", "out.gzb"]).unwrap();
        match cli.command {
            Commands::Compress { chunk_size, level, jobs, .. } => {
                assert_eq!(level, DEFAULT_LEVEL);
                assert_eq!(chunk_size * 1024, DEFAULT_CHUNK_SIZE);
                assert!(jobs.is_none());
            }
            _ => panic!("expected compress"),
        }
    }
}

//! `summary` command.

use clap::Args;

use super::common::{self, format_size, Package, VersionArg};
use crate::error::CliError;

/// Arguments for `summary`.
#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// Version id or 'latest'
    pub version: VersionArg,

    /// Show the diff package instead of the content package
    #[arg(long)]
    pub diff: bool,
}

/// Print the package summary of a version.
pub fn run(args: SummaryArgs) -> Result<(), CliError> {
    let config = common::load_config()?;
    let metadata = common::metadata(&config)?;
    let version = args.version.resolve(&metadata)?;

    let package = Package::from_diff_flag(args.diff);

    println!("Version {} ({:?} package)", version, package);
    println!("==========================");

    match package {
        Package::Content => {
            let summary = metadata.content_summary(version)?;
            print_common(
                summary.version.as_deref(),
                summary.size,
                summary.uncompressed_size,
                summary.compression_method.as_deref(),
                summary.encryption_method.as_deref(),
                &summary.hash_code,
            );
            print_chunks(summary.chunks.size, summary.chunks.hashes.as_ref().map(Vec::len));
            println!("  Files:         {}", summary.files.len());
        }
        Package::Diff => {
            let summary = metadata.diff_summary(version)?;
            print_common(
                summary.version.as_deref(),
                summary.size,
                summary.uncompressed_size,
                summary.compression_method.as_deref(),
                summary.encryption_method.as_deref(),
                &summary.hash_code,
            );
            print_chunks(summary.chunks.size, summary.chunks.hashes.as_ref().map(Vec::len));
            println!("  Added:         {}", summary.added_files.len());
            println!("  Modified:      {}", summary.modified_files.len());
            println!("  Removed:       {}", summary.removed_files.len());
        }
    }

    Ok(())
}

fn print_common(
    label: Option<&str>,
    size: u64,
    uncompressed: u64,
    compression: Option<&str>,
    encryption: Option<&str>,
    hash: &str,
) {
    if let Some(label) = label {
        println!("  Label:         {}", label);
    }
    println!("  Size:          {}", format_size(size));
    if uncompressed > 0 {
        println!("  Uncompressed:  {}", format_size(uncompressed));
    }
    println!("  Compression:   {}", compression.unwrap_or("(none)"));
    println!("  Encryption:    {}", encryption.unwrap_or("(none)"));
    println!(
        "  Hash:          {}",
        if hash.is_empty() { "(not set)" } else { hash }
    );
}

fn print_chunks(chunk_size: u64, count: Option<usize>) {
    match count {
        Some(count) if chunk_size > 0 => println!(
            "  Chunks:        {} x {}",
            count,
            format_size(chunk_size)
        ),
        _ => println!("  Chunks:        (none, plain HTTP only)"),
    }
}

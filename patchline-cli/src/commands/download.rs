//! `download` command.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use patchline::download::{
    DownloadProgress, ProgressReporter, ProgressSnapshot, RemoteResourceDownloader,
};
use patchline::http::ReqwestClient;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::common::{self, format_size, Package, VersionArg};
use crate::error::CliError;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({msg})";

/// Arguments for `download`.
#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Version id or 'latest'
    pub version: VersionArg,

    /// Destination file
    pub destination: PathBuf,

    /// Download the diff package instead of the content package
    #[arg(long)]
    pub diff: bool,

    /// License key secret sent to the mirrors endpoint
    #[arg(long)]
    pub key_secret: Option<String>,

    /// Try peer-to-peer before HTTP
    #[arg(long)]
    pub torrent: bool,

    /// Prefer mirrors in this country (overrides config)
    #[arg(long)]
    pub country: Option<String>,
}

/// Download a package.
pub fn run(args: DownloadArgs) -> Result<(), CliError> {
    let config = common::load_config()?;
    let metadata = common::metadata(&config)?;
    let version = args.version.resolve(&metadata)?;
    let package = Package::from_diff_flag(args.diff);

    let mut download_config = config.to_download_config();
    if args.torrent {
        download_config = download_config.with_torrents(true);
    }
    if let Some(country) = &args.country {
        download_config = download_config.with_preferred_country(country.to_uppercase());
    }

    let resource = metadata.resource(
        package.into(),
        version,
        download_config.preferred_country.as_deref(),
        args.key_secret.as_deref(),
    )?;

    println!(
        "Downloading version {} {:?} package ({}, {} mirrors)",
        version,
        package,
        format_size(resource.size),
        resource.urls.len()
    );
    info!(version, ?package, destination = %args.destination.display(), "Starting download");

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Cancelling download...");
        handler_token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let client = Arc::new(ReqwestClient::streaming(download_config.timeout)?);
    let downloader = RemoteResourceDownloader::new(client, download_config);

    let bar = progress_bar(resource.size);
    let progress = Arc::new(DownloadProgress::new());
    let reporter = {
        let bar = bar.clone();
        ProgressReporter::start_default(
            Arc::clone(&progress),
            Box::new(move |snapshot: ProgressSnapshot| render(&bar, snapshot)),
        )
    };

    let result = downloader.download(
        &resource,
        &args.destination,
        Some(&progress.callback()),
        &cancel,
    );
    progress.signal_done();
    reporter.stop();

    match result {
        Ok(transport) => {
            bar.finish_with_message("done");
            println!(
                "Saved {} via {}",
                args.destination.display(),
                transport
            );
            Ok(())
        }
        Err(e) => {
            bar.abandon_with_message("failed");
            Err(e.into())
        }
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

fn render(bar: &ProgressBar, snapshot: ProgressSnapshot) {
    if snapshot.total_bytes > 0 {
        bar.set_length(snapshot.total_bytes);
    }
    bar.set_position(snapshot.bytes_downloaded);
    bar.set_message(format!(
        "{}/s",
        format_size(snapshot.bytes_per_second as u64)
    ));
}

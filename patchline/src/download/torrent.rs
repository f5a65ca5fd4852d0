//! Peer-to-peer downloads through an external torrent client.
//!
//! The client is a helper process driven over stdin/stdout: one command per
//! line (`add-torrent <file> <dir>`, `status`), each answered by a JSON
//! document terminated by `#=end`.

use std::ffi::OsString;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::checksum::ResourceValidator;
use super::config::DownloadConfig;
use super::error::{DownloadError, DownloadResult};
use super::lock::DestinationLock;
use super::progress::ProgressCallback;
use super::strategy::Transport;
use super::stream::{check_status, wait_or_cancel, POLL_INTERVAL};
use crate::http::HttpClient;
use crate::resource::RemoteResource;

/// Marker closing every reply of the torrent client.
const REPLY_TERMINATOR: &[u8] = b"#=end";

/// Client sessions started before giving up on a failing helper process.
const CLIENT_ATTEMPTS: u32 = 3;

/// Progress changes smaller than this do not count as progress.
const PROGRESS_EPSILON: f64 = 0.0001;

/// State of one torrent as reported by the client.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TorrentStatus {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub is_seeding: bool,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub peers: u64,
    #[serde(default)]
    pub seeds: u64,
}

impl TorrentStatus {
    fn failure(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

/// A running torrent client session.
///
/// Dropping the session shuts the client down.
pub trait TorrentClient: Send {
    /// Start downloading the torrent described by `torrent_file` into `download_dir`.
    fn add_torrent(
        &mut self,
        torrent_file: &Path,
        download_dir: &Path,
        cancel: &CancellationToken,
    ) -> DownloadResult<()>;

    /// Status of the single torrent in this session.
    fn status(&mut self, cancel: &CancellationToken) -> DownloadResult<TorrentStatus>;
}

/// Starts a fresh torrent client session.
pub type TorrentClientFactory =
    Arc<dyn Fn() -> DownloadResult<Box<dyn TorrentClient>> + Send + Sync>;

#[derive(Debug, Deserialize)]
struct ClientMessage {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientStatus {
    status: String,
    #[serde(default)]
    data: Option<ClientStatusData>,
}

#[derive(Debug, Deserialize)]
struct ClientStatusData {
    #[serde(default)]
    torrents: Vec<TorrentStatus>,
}

/// Default bound on how long one client command may take to answer.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Output of the helper process, forwarded by its reader thread.
enum Output {
    Data(Vec<u8>),
    Failed(std::io::Error),
    Closed,
}

/// [`TorrentClient`] backed by a helper process.
///
/// The helper's stdout is read on a worker thread, so a silent helper can
/// neither block cancellation nor hold a command past its reply timeout.
/// Either of those kills the helper.
pub struct ProcessTorrentClient {
    child: Child,
    stdin: ChildStdin,
    output: Receiver<Output>,
    pending: Vec<u8>,
    reply_timeout: Duration,
}

impl ProcessTorrentClient {
    /// Start `program` with `args` and talk to it over its standard streams.
    pub fn spawn<I, S>(program: impl AsRef<Path>, args: I) -> DownloadResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let program = program.as_ref();
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        debug!(program = %program.display(), "Starting torrent client");

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                DownloadError::Torrent(format!(
                    "failed to start torrent client {}: {}",
                    program.display(),
                    e
                ))
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                child.kill().ok();
                child.wait().ok();
                return Err(DownloadError::Torrent(
                    "torrent client streams unavailable".to_string(),
                ));
            }
        };

        Ok(Self {
            child,
            stdin,
            output: forward_output(stdout),
            pending: Vec::new(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        })
    }

    /// Give up on a command that has not been answered within `timeout`.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Factory starting `program` for every session.
    pub fn launcher(program: PathBuf, reply_timeout: Duration) -> TorrentClientFactory {
        Arc::new(move || {
            let client = ProcessTorrentClient::spawn(&program, Vec::<OsString>::new())?
                .with_reply_timeout(reply_timeout);
            Ok(Box::new(client) as Box<dyn TorrentClient>)
        })
    }

    fn execute(&mut self, command: &str, cancel: &CancellationToken) -> DownloadResult<String> {
        debug!(command, "Executing torrent client command");
        writeln!(self.stdin, "{}", command)
            .and_then(|_| self.stdin.flush())
            .map_err(|e| DownloadError::Torrent(format!("failed to send command: {}", e)))?;

        let deadline = Instant::now() + self.reply_timeout;
        loop {
            if let Some(reply) = self.take_reply() {
                trace!(reply = %reply, "Torrent client reply");
                return Ok(reply);
            }
            if cancel.is_cancelled() {
                self.stop();
                return Err(DownloadError::Cancelled);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.stop();
                return Err(DownloadError::Torrent(format!(
                    "torrent client did not answer '{}' within {:?}",
                    command, self.reply_timeout
                )));
            }

            match self.output.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok(Output::Data(bytes)) => self.pending.extend_from_slice(&bytes),
                Ok(Output::Failed(e)) => {
                    return Err(DownloadError::Torrent(format!("failed to read reply: {}", e)))
                }
                Ok(Output::Closed) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(DownloadError::Torrent(
                        "torrent client exited unexpectedly".to_string(),
                    ))
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    /// Split the first complete reply off the buffered output.
    fn take_reply(&mut self) -> Option<String> {
        let end = self
            .pending
            .windows(REPLY_TERMINATOR.len())
            .position(|window| window == REPLY_TERMINATOR)?;
        let rest = self.pending.split_off(end + REPLY_TERMINATOR.len());
        let reply = std::mem::replace(&mut self.pending, rest);
        Some(String::from_utf8_lossy(&reply[..end]).trim().to_string())
    }

    fn stop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            debug!("Stopping torrent client");
            self.child.kill().ok();
        }
    }
}

/// Read `stdout` on a worker thread until the helper closes it.
fn forward_output(mut stdout: ChildStdout) -> Receiver<Output> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        loop {
            let output = match stdout.read(&mut buffer) {
                Ok(0) => Output::Closed,
                Ok(n) => Output::Data(buffer[..n].to_vec()),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => Output::Failed(e),
            };
            let last = !matches!(output, Output::Data(_));
            if tx.send(output).is_err() || last {
                break;
            }
        }
    });
    rx
}

/// Escape a path the way the client's command parser expects.
fn client_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").replace(' ', "\\ ")
}

fn parse_reply<'a, T: Deserialize<'a>>(reply: &'a str) -> DownloadResult<T> {
    serde_json::from_str(reply)
        .map_err(|e| DownloadError::Torrent(format!("invalid torrent client reply: {}", e)))
}

impl TorrentClient for ProcessTorrentClient {
    fn add_torrent(
        &mut self,
        torrent_file: &Path,
        download_dir: &Path,
        cancel: &CancellationToken,
    ) -> DownloadResult<()> {
        let command = format!(
            "add-torrent {} {}",
            client_path(torrent_file),
            client_path(download_dir)
        );
        let reply = self.execute(&command, cancel)?;
        let message: ClientMessage = parse_reply(&reply)?;
        if message.status != "ok" {
            return Err(DownloadError::Torrent(format!(
                "add-torrent failed with status {}: {}",
                message.status,
                message.message.unwrap_or_default()
            )));
        }
        Ok(())
    }

    fn status(&mut self, cancel: &CancellationToken) -> DownloadResult<TorrentStatus> {
        let reply = self.execute("status", cancel)?;
        let status: ClientStatus = parse_reply(&reply)?;
        if status.status != "ok" {
            return Err(DownloadError::Torrent(format!(
                "status failed with status {}",
                status.status
            )));
        }

        let mut torrents = status.data.map(|d| d.torrents).unwrap_or_default();
        if torrents.len() != 1 {
            return Err(DownloadError::Torrent(format!(
                "expected one torrent in session, found {}",
                torrents.len()
            )));
        }
        Ok(torrents.remove(0))
    }
}

impl Drop for ProcessTorrentClient {
    fn drop(&mut self) {
        self.stop();
        self.child.wait().ok();
    }
}

/// Temporary files of one torrent download, removed on drop.
struct TorrentWorkspace {
    torrent_file: PathBuf,
    download_dir: PathBuf,
}

impl TorrentWorkspace {
    fn new(destination: &Path) -> Self {
        let with_suffix = |suffix: &str| {
            let mut name = destination.as_os_str().to_os_string();
            name.push(suffix);
            PathBuf::from(name)
        };
        Self {
            torrent_file: with_suffix(".torrent"),
            download_dir: with_suffix(".torrent_dir"),
        }
    }
}

impl Drop for TorrentWorkspace {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.download_dir).ok();
        fs::remove_file(&self.torrent_file).ok();
    }
}

/// Why a client session ended.
enum SessionError {
    /// The helper process misbehaved; a new session may succeed.
    Client(DownloadError),
    /// The torrent itself failed or the caller cancelled.
    Failed(DownloadError),
}

/// Downloads resources through a torrent client.
pub struct TorrentDownloader {
    client: Arc<dyn HttpClient>,
    config: DownloadConfig,
    factory: TorrentClientFactory,
    validator: Arc<dyn ResourceValidator>,
}

impl TorrentDownloader {
    pub fn new(
        client: Arc<dyn HttpClient>,
        config: DownloadConfig,
        factory: TorrentClientFactory,
    ) -> Self {
        Self {
            validator: config.hash_algorithm.validator(),
            client,
            config,
            factory,
        }
    }

    /// Replace the whole-resource validator.
    pub fn with_validator(mut self, validator: Arc<dyn ResourceValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Download `resource` into `destination` over peer-to-peer.
    pub fn download(
        &self,
        resource: &RemoteResource,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> DownloadResult<()> {
        if !resource.has_torrent() {
            return Err(DownloadError::InvalidResource(
                "resource has no torrent URLs".to_string(),
            ));
        }

        let mut lock = DestinationLock::open(destination)?;
        let _guard = lock.try_acquire()?;
        let workspace = TorrentWorkspace::new(destination);

        info!(destination = %destination.display(), "Starting torrent download");
        self.fetch_torrent_file(&resource.torrent_urls, &workspace.torrent_file, cancel)?;
        fs::create_dir_all(&workspace.download_dir).map_err(|e| DownloadError::WriteFailed {
            path: workspace.download_dir.clone(),
            source: e,
        })?;

        let mut attempt = 1;
        loop {
            match self.run_session(resource, &workspace, progress, cancel) {
                Ok(()) => break,
                Err(SessionError::Client(e)) if attempt < CLIENT_ATTEMPTS => {
                    warn!(error = %e, attempt, "Torrent client failed, restarting it");
                    attempt += 1;
                }
                Err(SessionError::Client(e)) | Err(SessionError::Failed(e)) => return Err(e),
            }
        }

        let downloaded = single_file(&workspace.download_dir)?;
        if destination.exists() {
            fs::remove_file(destination).map_err(|e| DownloadError::WriteFailed {
                path: destination.to_path_buf(),
                source: e,
            })?;
        }
        fs::rename(&downloaded, destination).map_err(|e| DownloadError::WriteFailed {
            path: destination.to_path_buf(),
            source: e,
        })?;

        self.validator
            .validate(destination, resource.size, &resource.hash)?;

        info!(destination = %destination.display(), "Torrent download complete");
        Ok(())
    }

    fn fetch_torrent_file(
        &self,
        urls: &[String],
        target: &Path,
        cancel: &CancellationToken,
    ) -> DownloadResult<()> {
        let mut last_error = None;

        for url in urls {
            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            debug!(url = %url, "Fetching torrent file");

            let result = self
                .client
                .get(url, None)
                .map_err(|e| DownloadError::Connection {
                    url: url.clone(),
                    reason: e.to_string(),
                })
                .and_then(|response| {
                    check_status(url, &response)?;
                    response.into_bytes().map_err(|e| DownloadError::Connection {
                        url: url.clone(),
                        reason: e.to_string(),
                    })
                });

            match result {
                Ok(bytes) if !bytes.is_empty() => {
                    return fs::write(target, bytes).map_err(|e| DownloadError::WriteFailed {
                        path: target.to_path_buf(),
                        source: e,
                    });
                }
                Ok(_) => last_error = Some(DownloadError::EmptyStream { url: url.clone() }),
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to fetch torrent file");
                    last_error = Some(e);
                }
            }
        }

        Err(DownloadError::Torrent(format!(
            "could not fetch torrent file: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    fn run_session(
        &self,
        resource: &RemoteResource,
        workspace: &TorrentWorkspace,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        let client_error = |e: DownloadError| match e {
            DownloadError::Cancelled => SessionError::Failed(e),
            other => SessionError::Client(other),
        };

        let mut client = (self.factory)().map_err(client_error)?;
        client
            .add_torrent(&workspace.torrent_file, &workspace.download_dir, cancel)
            .map_err(client_error)?;

        let mut stall = StallTimer::new(checked_status(client.as_mut(), cancel)?.progress);
        if let Some(cb) = progress {
            cb(0, resource.size);
        }

        loop {
            if cancel.is_cancelled() {
                return Err(SessionError::Failed(DownloadError::Cancelled));
            }

            let status = checked_status(client.as_mut(), cancel)?;
            trace!(progress = status.progress, peers = status.peers, "Torrent status");

            if stall.observe(status.progress) >= self.config.torrent_timeout {
                return Err(SessionError::Failed(DownloadError::Torrent(
                    "torrent download timed out without progress".to_string(),
                )));
            }

            if let Some(cb) = progress {
                let fraction = status.progress.clamp(0.0, 1.0);
                cb((resource.size as f64 * fraction) as u64, resource.size);
            }

            if status.is_seeding {
                return Ok(());
            }

            wait_or_cancel(self.config.torrent_poll_interval, cancel)
                .map_err(SessionError::Failed)?;
        }
    }
}

/// Time since the torrent last made progress.
struct StallTimer {
    last_progress: f64,
    last_change: Instant,
}

impl StallTimer {
    fn new(progress: f64) -> Self {
        Self {
            last_progress: progress,
            last_change: Instant::now(),
        }
    }

    /// Record `progress` and return how long it has been flat.
    fn observe(&mut self, progress: f64) -> Duration {
        if progress - self.last_progress > PROGRESS_EPSILON {
            self.last_progress = progress;
            self.last_change = Instant::now();
        }
        self.last_change.elapsed()
    }
}

fn checked_status(
    client: &mut dyn TorrentClient,
    cancel: &CancellationToken,
) -> Result<TorrentStatus, SessionError> {
    let status = client.status(cancel).map_err(|e| match e {
        DownloadError::Cancelled => SessionError::Failed(e),
        other => SessionError::Client(other),
    })?;

    if let Some(error) = status.failure() {
        return Err(SessionError::Failed(DownloadError::Torrent(format!(
            "torrent client reported: {}",
            error
        ))));
    }
    Ok(status)
}

/// The one file a finished torrent leaves in its download directory.
fn single_file(dir: &Path) -> DownloadResult<PathBuf> {
    let entries = fs::read_dir(dir).map_err(|e| DownloadError::ReadFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();

    match files.as_slice() {
        [file] => Ok(file.clone()),
        _ => Err(DownloadError::Torrent(format!(
            "expected one file in {}, found {}",
            dir.display(),
            files.len()
        ))),
    }
}

impl Transport for TorrentDownloader {
    fn name(&self) -> &'static str {
        "torrent"
    }

    fn download(
        &self,
        resource: &RemoteResource,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> DownloadResult<()> {
        TorrentDownloader::download(self, resource, destination, progress, cancel)
    }
}

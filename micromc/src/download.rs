//! Resolver pool executing fetch tasks: parallel batch HTTP(S) download with hash
//! verification, plus local copy and archive unpack tasks sharing the same pool.
//!
//! Every task is idempotent and writes only below its declared target path, so tasks
//! of a batch can run in any order and with any worker count. Downloads are streamed
//! to a `<target>.partial` file while hashing, then atomically renamed into place;
//! leftover partial files from interrupted runs are resumed with HTTP range requests
//! when the server supports them.

use std::io::{self, Seek, SeekFrom, Write, BufWriter, BufReader};
use std::path::{Path, PathBuf};
use std::future::Future;
use std::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::{env, fmt, mem};

use sha1::{Digest, Sha1};

use reqwest::{header, Client, StatusCode};

use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;

use zip::result::ZipError;
use zip::ZipArchive;


/// Default number of resolver workers executing tasks concurrently.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Number of retries after the initial attempt, for connection, timeout and server
/// errors.
const RETRY_COUNT: u32 = 3;

/// Initial retry backoff, doubled after each failed attempt.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Create a single download task from the given URL to the given file, to be executed
/// immediately with [`Single::download`].
pub fn single(url: impl Into<Box<str>>, file: impl Into<Box<Path>>) -> Single {
    Single(Task::new_download(url.into(), file.into()))
}

/// Create a single cached download task. The target file is derived from the URL hash
/// inside a launcher cache directory, and HTTP conditional requests (entity tag, last
/// modified) are used to avoid downloading an up-to-date file again. If the network
/// is unreachable, the cached copy is used as-is.
pub fn single_cached(url: impl Into<Box<str>>) -> Single {
    Single(Task::new_download_cached(url.into()))
}

#[derive(Debug)]
pub struct Single(Task);

impl Single {

    #[inline]
    pub fn file(&self) -> &Path {
        &self.0.target
    }

    #[inline]
    pub fn set_expected_size(&mut self, size: Option<u32>) -> &mut Self {
        self.0.set_expected_size(size);
        self
    }

    #[inline]
    pub fn set_expected_sha1(&mut self, sha1: Option<[u8; 20]>) -> &mut Self {
        self.0.set_expected_sha1(sha1);
        self
    }

    /// Execute this single task with the given client, blocking until it's done.
    ///
    /// This is internally starting an asynchronous Tokio runtime and blocks on it, so
    /// this function will just panic if launched inside another runtime!
    pub fn download(self, client: &Client, mut handler: impl Handler) -> Result<(), TaskError> {

        handler.handle_download_progress(0, 1, self.0.label());
        let res = block_on(execute_task(client.clone(), &self.0));
        handler.handle_download_progress(1, 1, self.0.label());

        res.map_err(|kind| self.0.new_error(kind))

    }

}

/// A list of pending fetch tasks that can be all executed at once by the resolver
/// worker pool.
#[derive(Debug, Default)]
pub struct Batch {
    tasks: Vec<Task>,
}

impl Batch {

    /// Create a new empty batch.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the total number of tasks pushed into this batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Return true if this batch has no task.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Push a new download task to be executed in this batch.
    pub fn push(&mut self, url: impl Into<Box<str>>, file: impl Into<Box<Path>>) -> &mut Task {
        self.tasks.push(Task::new_download(url.into(), file.into()));
        self.tasks.last_mut().unwrap()
    }

    /// Push a new task copying a local file to the target file.
    pub fn push_copy(&mut self, source: impl Into<Box<Path>>, file: impl Into<Box<Path>>) -> &mut Task {
        self.tasks.push(Task::new_copy(source.into(), file.into()));
        self.tasks.last_mut().unwrap()
    }

    /// Push a new task extracting a local ZIP archive below the target directory.
    /// Archive entries matching any of the exclude path prefixes are skipped, as are
    /// directory entries.
    pub fn push_unpack(&mut self, archive: impl Into<Box<Path>>, dir: impl Into<Box<Path>>) -> &mut Task {
        self.tasks.push(Task::new_unpack(archive.into(), dir.into()));
        self.tasks.last_mut().unwrap()
    }

    /// Execute the whole batch with the given client, on a pool of `concurrency`
    /// workers, the batch is left empty afterward. Tasks results are aggregated in
    /// the returned [`BatchResult`]: a failing task never cancels its siblings, the
    /// pool always drains, unless the cancel token is set, in which case workers
    /// stop before starting another task.
    ///
    /// This is internally starting an asynchronous Tokio runtime and blocks on it, so
    /// this function will just panic if launched inside another runtime!
    pub fn execute(&mut self,
        client: &Client,
        concurrency: usize,
        cancel: &CancelToken,
        mut handler: impl Handler,
    ) -> BatchResult {
        let tasks = mem::take(&mut self.tasks);
        block_on(execute_batch(client.clone(), &mut handler, concurrency.max(1), cancel, tasks))
    }

}

/// A single fetch task of a batch.
#[derive(Debug)]
pub struct Task {
    /// How to produce the target file.
    kind: TaskKind,
    /// The target file (or directory for unpack tasks).
    target: Box<Path>,
    /// Optional expected size of the target file.
    expected_size: Option<u32>,
    /// Optional expected SHA-1 of the target file.
    expected_sha1: Option<[u8; 20]>,
    /// Use a sidecar file to keep track of the last-modified and entity tag HTTP
    /// headers, used on the next download to only transfer the data if it changed.
    use_cache: bool,
}

#[derive(Debug)]
enum TaskKind {
    Download {
        url: Box<str>,
    },
    Copy {
        source: Box<Path>,
    },
    Unpack {
        archive: Box<Path>,
        strip_prefix: Option<Box<str>>,
        excludes: Vec<Box<str>>,
    },
}

impl Task {

    fn new_download(url: Box<str>, target: Box<Path>) -> Self {
        Self {
            kind: TaskKind::Download { url },
            target,
            expected_size: None,
            expected_sha1: None,
            use_cache: false,
        }
    }

    fn new_download_cached(url: Box<str>) -> Self {

        let url_digest = {
            let mut sha1 = Sha1::new();
            sha1.update(&*url);
            format!("{:x}", sha1.finalize())
        };

        // Fallback to the tmp directory.
        let mut file = dirs::cache_dir()
            .unwrap_or_else(env::temp_dir);

        file.push(concat!(env!("CARGO_PKG_NAME"), "-cache"));
        file.push(url_digest);

        let mut task = Self::new_download(url, file.into_boxed_path());
        task.use_cache = true;
        task

    }

    fn new_copy(source: Box<Path>, target: Box<Path>) -> Self {
        Self {
            kind: TaskKind::Copy { source },
            target,
            expected_size: None,
            expected_sha1: None,
            use_cache: false,
        }
    }

    fn new_unpack(archive: Box<Path>, target: Box<Path>) -> Self {
        Self {
            kind: TaskKind::Unpack { archive, strip_prefix: None, excludes: Vec::new() },
            target,
            expected_size: None,
            expected_sha1: None,
            use_cache: false,
        }
    }

    #[inline]
    pub fn set_expected_size(&mut self, size: Option<u32>) -> &mut Self {
        self.expected_size = size;
        self
    }

    #[inline]
    pub fn set_expected_sha1(&mut self, sha1: Option<[u8; 20]>) -> &mut Self {
        self.expected_sha1 = sha1;
        self
    }

    /// For unpack tasks, strip the given prefix from every archive entry path before
    /// resolving its target file, entries outside the prefix are skipped.
    pub fn set_strip_prefix(&mut self, prefix: impl Into<Box<str>>) -> &mut Self {
        if let TaskKind::Unpack { strip_prefix, .. } = &mut self.kind {
            *strip_prefix = Some(prefix.into());
        }
        self
    }

    /// For unpack tasks, skip archive entries whose path starts with the given prefix.
    pub fn add_exclude(&mut self, prefix: impl Into<Box<str>>) -> &mut Self {
        if let TaskKind::Unpack { excludes, .. } = &mut self.kind {
            excludes.push(prefix.into());
        }
        self
    }

    /// The label identifying this task in progress reports, its source URL or path.
    fn label(&self) -> &str {
        match &self.kind {
            TaskKind::Download { url } => url,
            TaskKind::Copy { source } => source.to_str().unwrap_or(""),
            TaskKind::Unpack { archive, .. } => archive.to_str().unwrap_or(""),
        }
    }

    fn new_error(&self, kind: TaskErrorKind) -> TaskError {
        TaskError {
            origin: self.label().to_string().into_boxed_str(),
            file: self.target.clone(),
            kind,
        }
    }

}

/// Aggregated result of a batch execution, retaining the error of every failed task.
#[derive(Debug)]
pub struct BatchResult {
    /// Total count of tasks that were part of the batch.
    total: usize,
    /// Each failed task's error.
    errors: Vec<TaskError>,
    /// True if the batch has been interrupted by its cancel token.
    cancelled: bool,
}

impl BatchResult {

    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    #[inline]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    #[inline]
    pub fn errors(&self) -> &[TaskError] {
        &self.errors
    }

    #[inline]
    pub fn into_errors(self) -> Vec<TaskError> {
        self.errors
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

}

/// A shared flag used to cooperatively stop resolver workers: when set, each worker
/// terminates before starting its next task and the batch returns early.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {

    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

}

/// An error of a single failed task, it also acts as a standard error type.
#[derive(thiserror::Error, Debug)]
#[error("{origin}: {kind}")]
pub struct TaskError {
    /// The source URL or path of the failed task.
    origin: Box<str>,
    /// The target file of the failed task.
    file: Box<Path>,
    kind: TaskErrorKind,
}

impl TaskError {

    #[inline]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[inline]
    pub fn file(&self) -> &Path {
        &self.file
    }

    #[inline]
    pub fn kind(&self) -> &TaskErrorKind {
        &self.kind
    }

}

/// The failure cause of a single task.
#[derive(thiserror::Error, Debug)]
pub enum TaskErrorKind {
    /// Invalid size of the fully downloaded file compared to the expected size.
    #[error("invalid size")]
    InvalidSize,
    /// Invalid SHA-1 of the fully downloaded file compared to the expected SHA-1,
    /// after the stale file has been discarded and fetched again once.
    #[error("invalid sha1, expected {}, got {}", HexFmt(.expected), HexFmt(.actual))]
    InvalidSha1 {
        expected: [u8; 20],
        actual: [u8; 20],
    },
    /// Invalid HTTP status code while requesting the file, after retries for server
    /// errors have been exhausted. Client errors (4xx) are never retried.
    #[error("invalid status: {0}")]
    InvalidStatus(u16),
    /// HTTP request error, after retries for connection and timeout errors have been
    /// exhausted.
    #[error("request: {0}")]
    Request(#[source] reqwest::Error),
    /// An I/O error while writing the target file or reading the source file.
    #[error("io: {0}")]
    Io(#[source] io::Error),
    /// A ZIP error while unpacking an archive.
    #[error("zip: {0}")]
    Zip(#[source] ZipError),
    /// The task has not been executed because the batch was cancelled.
    #[error("cancelled")]
    Cancelled,
}

/// Internal helper displaying a byte slice as lower hex.
struct HexFmt<'a>(&'a [u8]);

impl fmt::Display for HexFmt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// A handler for watching batch execution progress. The progress callback is invoked
/// at most once per task transition, the batch should be considered done when `count`
/// is equal to `total_count`.
pub trait Handler {

    fn handle_download_progress(&mut self, count: u32, total_count: u32, label: &str) {
        let _ = (count, total_count, label);
    }

    fn as_download_dyn(&mut self) -> &mut dyn Handler
    where Self: Sized {
        self
    }

}

/// Blanket implementation that does nothing.
impl Handler for () { }

impl<H: Handler + ?Sized> Handler for &'_ mut H {
    fn handle_download_progress(&mut self, count: u32, total_count: u32, label: &str) {
        (*self).handle_download_progress(count, total_count, label)
    }
}

/// Internal batch executor, a bounded pool over a shared task list.
async fn execute_batch(
    client: Client,
    handler: &mut dyn Handler,
    concurrency: usize,
    cancel: &CancelToken,
    tasks: Vec<Task>,
) -> BatchResult {

    // Make it constant and sharable between all workers.
    let tasks = Arc::new(tasks);
    let total = tasks.len();

    // Tasks are popped from the back, keep the original order for determinism of the
    // progress reports, there is no ordering guarantee among tasks themselves.
    let mut indices = (0..total).rev().collect::<Vec<_>>();

    handler.handle_download_progress(0, total as u32, "");

    let mut completed = 0usize;
    let mut errors = Vec::new();
    let mut cancelled = false;
    let mut futures = JoinSet::new();

    while completed < total || !futures.is_empty() {

        if cancel.is_cancelled() && !cancelled {
            cancelled = true;
            // Remaining tasks are recorded as cancelled and not started.
            for index in indices.drain(..) {
                completed += 1;
                errors.push(tasks[index].new_error(TaskErrorKind::Cancelled));
            }
        }

        while futures.len() < concurrency && !indices.is_empty() {
            let index = indices.pop().unwrap();
            let client = client.clone();
            let tasks = Arc::clone(&tasks);
            futures.spawn(async move {
                let res = execute_task(client, &tasks[index]).await;
                (index, res)
            });
        }

        let Some(res) = futures.join_next().await else {
            continue;
        };

        let (index, res) = res.expect("task should not be cancelled nor panicking");
        completed += 1;

        if let Err(kind) = res {
            errors.push(tasks[index].new_error(kind));
        }

        handler.handle_download_progress(completed as u32, total as u32, tasks[index].label());

    }

    BatchResult {
        total,
        errors,
        cancelled,
    }

}

/// Execute a single task of any kind.
async fn execute_task(client: Client, task: &Task) -> Result<(), TaskErrorKind> {

    // If the target is already there with the expected size and hash there is nothing
    // to do. This also makes a duplicated target in a batch a verified no-op for the
    // second completer. Unpack tasks target a directory and are always executed.
    if !matches!(task.kind, TaskKind::Unpack { .. }) {
        if check_file(&task.target, task.expected_size, task.expected_sha1.as_ref())
            .map_err(TaskErrorKind::Io)? {
            return Ok(());
        }
    }

    match &task.kind {
        TaskKind::Download { url } =>
            download_task(client, task, url).await,
        TaskKind::Copy { source } =>
            copy_task(task, source),
        TaskKind::Unpack { archive, strip_prefix, excludes } =>
            unpack_task(task, archive, strip_prefix.as_deref(), excludes),
    }

}

/// Execute a download task: stream the body into `<target>.partial` while hashing,
/// verify, then atomically rename into place. Retries with exponential backoff on
/// connection, timeout and server errors; a failed hash check discards the file and
/// refetches exactly once.
async fn download_task(client: Client, task: &Task, url: &str) -> Result<(), TaskErrorKind> {

    // If we are in cache mode, try checking the sidecar, if the file is locally valid.
    let cache_file = task.use_cache.then(|| {
        sibling_file(&task.target, ".cache")
    });

    let mut cache = None;
    if let Some(cache_file) = cache_file.as_deref() {
        cache = check_download_cache(&task.target, cache_file)
            .map_err(TaskErrorKind::Io)?;
    }

    let partial_file = sibling_file(&task.target, ".partial");

    // Create any parent directory so that we can create the partial file.
    if let Some(parent) = task.target.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(TaskErrorKind::Io)?;
    }

    let mut refetched = false;
    let mut attempt = 0u32;
    let mut backoff = RETRY_BACKOFF;

    loop {

        match download_task_once(&client, task, url, &partial_file, cache.as_ref()).await {
            Ok(outcome) => {

                if let DownloadOutcome::Done { etag, last_modified } = outcome {

                    tokio::fs::rename(&partial_file, &task.target).await
                        .map_err(TaskErrorKind::Io)?;

                    if let Some(cache_file) = cache_file.as_deref() {
                        write_download_cache(&task.target, cache_file, url, etag, last_modified);
                    }

                }

                return Ok(());

            }
            // A wrong hash or size on a freshly downloaded file is refetched once, the
            // server may have served a stale or truncated body. A 416 means the
            // leftover partial file is at least as large as the remote body, discard
            // it and restart from scratch.
            Err(e @ (TaskErrorKind::InvalidSha1 { .. } | TaskErrorKind::InvalidSize | TaskErrorKind::InvalidStatus(416))) => {
                let _ = tokio::fs::remove_file(&partial_file).await;
                if refetched {
                    return Err(e);
                }
                refetched = true;
            }
            Err(e) => {

                let retryable = match &e {
                    TaskErrorKind::InvalidStatus(status) => *status >= 500,
                    TaskErrorKind::Request(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
                    _ => false,
                };

                if !retryable || attempt >= RETRY_COUNT {
                    return Err(e);
                }

                attempt += 1;
                tokio::time::sleep(backoff).await;
                backoff *= 2;

            }
        }

    }

}

enum DownloadOutcome {
    /// The partial file contains the full verified body and should be moved in place.
    Done {
        etag: Option<String>,
        last_modified: Option<String>,
    },
    /// The cached target file is still up-to-date, nothing to move.
    CacheValid,
}

async fn download_task_once(
    client: &Client,
    task: &Task,
    url: &str,
    partial_file: &Path,
    cache: Option<&serde::CacheMeta>,
) -> Result<DownloadOutcome, TaskErrorKind> {

    let mut req = client.get(url);

    // Conditional request headers when a cached copy is present.
    if let Some(cache) = cache {
        if let Some(etag) = cache.etag.as_deref() {
            req = req.header(header::IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = cache.last_modified.as_deref() {
            req = req.header(header::IF_MODIFIED_SINCE, last_modified);
        }
    }

    // A leftover partial file from an interrupted run can be resumed where it
    // stopped, if the server supports range requests.
    let partial_len = match tokio::fs::metadata(partial_file).await {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => return Err(TaskErrorKind::Io(e)),
    };

    if partial_len != 0 {
        req = req.header(header::RANGE, format!("bytes={partial_len}-"));
    }

    let mut res = match req.send().await {
        Ok(res) => res,
        Err(e) if cache.is_some() && (e.is_timeout() || e.is_connect() || e.is_request()) => {
            // Using the cached copy in case of network error.
            return Ok(DownloadOutcome::CacheValid);
        }
        Err(e) => return Err(TaskErrorKind::Request(e)),
    };

    let resume;
    match res.status() {
        StatusCode::NOT_MODIFIED if cache.is_some() => return Ok(DownloadOutcome::CacheValid),
        StatusCode::PARTIAL_CONTENT if partial_len != 0 => resume = true,
        StatusCode::OK => resume = false,
        status => return Err(TaskErrorKind::InvalidStatus(status.as_u16())),
    }

    let mut size;
    let mut sha1 = Sha1::new();

    let mut dst = tokio::fs::File::options()
        .write(true)
        .create(true)
        .append(resume)
        .truncate(!resume)
        .open(partial_file).await
        .map_err(TaskErrorKind::Io)?;

    if resume {
        // The hash is computed over the whole body, so feed the resumed prefix first.
        let mut reader = std::fs::File::open(partial_file).map_err(TaskErrorKind::Io)?;
        io::copy(&mut reader, &mut sha1).map_err(TaskErrorKind::Io)?;
        size = partial_len as usize;
    } else {
        size = 0;
    }

    while let Some(chunk) = res.chunk().await.map_err(TaskErrorKind::Request)? {
        size += chunk.len();
        AsyncWriteExt::write_all(&mut dst, &chunk).await.map_err(TaskErrorKind::Io)?;
        Write::write_all(&mut sha1, &chunk).map_err(TaskErrorKind::Io)?;
    }

    // Ensure the file is fully written before checking and renaming.
    dst.flush().await.map_err(TaskErrorKind::Io)?;
    drop(dst);

    let size = u32::try_from(size).map_err(|_| TaskErrorKind::InvalidSize)?;
    let sha1: [u8; 20] = sha1.finalize().into();

    if let Some(expected_size) = task.expected_size {
        if expected_size != size {
            return Err(TaskErrorKind::InvalidSize);
        }
    }

    if let Some(expected_sha1) = &task.expected_sha1 {
        if *expected_sha1 != sha1 {
            return Err(TaskErrorKind::InvalidSha1 {
                expected: *expected_sha1,
                actual: sha1,
            });
        }
    }

    let header_string = |name: header::HeaderName| res.headers().get(name)
        .and_then(|h| h.to_str().ok().map(str::to_string));

    Ok(DownloadOutcome::Done {
        etag: header_string(header::ETAG),
        last_modified: header_string(header::LAST_MODIFIED),
    })

}

/// Execute a copy task, the target's parent directories are created on demand.
fn copy_task(task: &Task, source: &Path) -> Result<(), TaskErrorKind> {

    if let Some(parent) = task.target.parent() {
        std::fs::create_dir_all(parent).map_err(TaskErrorKind::Io)?;
    }

    std::fs::copy(source, &task.target).map_err(TaskErrorKind::Io)?;
    Ok(())

}

/// Execute an unpack task, extracting the archive below the target directory.
fn unpack_task(
    task: &Task,
    archive: &Path,
    strip_prefix: Option<&str>,
    excludes: &[Box<str>],
) -> Result<(), TaskErrorKind> {

    let reader = std::fs::File::open(archive)
        .map(BufReader::new)
        .map_err(TaskErrorKind::Io)?;

    let mut archive = ZipArchive::new(reader)
        .map_err(TaskErrorKind::Zip)?;

    for i in 0..archive.len() {

        let mut entry = archive.by_index(i).map_err(TaskErrorKind::Zip)?;
        if entry.is_dir() {
            continue;
        }

        let mut name = entry.name();
        if let Some(prefix) = strip_prefix {
            match name.strip_prefix(prefix) {
                Some(stripped) => name = stripped,
                None => continue,
            }
        }

        if excludes.iter().any(|prefix| name.starts_with(&**prefix)) {
            continue;
        }

        // Reject any entry that would escape the target directory.
        let Some(rel_file) = sanitize_entry_path(name) else {
            continue;
        };

        let file = task.target.join(rel_file);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).map_err(TaskErrorKind::Io)?;
        }

        let mut writer = std::fs::File::create(&file).map_err(TaskErrorKind::Io)?;
        io::copy(&mut entry, &mut writer).map_err(TaskErrorKind::Io)?;

        // Shared objects must be executable for the JVM to load them.
        #[cfg(unix)] {
            use std::os::unix::fs::PermissionsExt;
            if matches!(file.extension().and_then(|e| e.to_str()), Some("so" | "dylib")) {
                std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o755))
                    .map_err(TaskErrorKind::Io)?;
            }
        }

    }

    Ok(())

}

/// Block on the given future with a current-thread Tokio runtime with time and I/O
/// enabled, one thread is enough because the pool gets its concurrency from the
/// join set, not from threads.
fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .enable_io()
        .build()
        .unwrap()
        .block_on(future)
}

/// Return the path of `file` with a raw suffix appended to its file name, used for
/// the `.partial` and `.cache` companions of a download target.
fn sibling_file(file: &Path, suffix: &str) -> PathBuf {
    let mut raw = file.to_path_buf().into_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Sanitize a relative archive entry path, returning none if the path is absolute or
/// escapes upward.
fn sanitize_entry_path(name: &str) -> Option<PathBuf> {

    use std::path::Component;

    let path = Path::new(name);
    let mut buf = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => buf.push(part),
            Component::CurDir => (),
            _ => return None,
        }
    }

    (!buf.as_os_str().is_empty()).then_some(buf)

}

/// Check if a file at a given path has the corresponding properties (size and/or
/// SHA-1), returning true if it is valid, so false is returned anyway if the file
/// doesn't exist. Without any size nor SHA-1 the sole existence of the file is enough.
pub(crate) fn check_file(
    file: &Path,
    size: Option<u32>,
    sha1: Option<&[u8; 20]>,
) -> io::Result<bool> {

    if let Some(sha1) = sha1 {
        // If we want to check SHA-1 we need to open the file and compute it...
        match std::fs::File::open(file) {
            Ok(mut reader) => {

                // If relevant, start by checking the actual size of the file.
                if let Some(size) = size {
                    let actual_size = reader.seek(SeekFrom::End(0))?;
                    if size as u64 != actual_size {
                        return Ok(false);
                    }
                    reader.seek(SeekFrom::Start(0))?;
                }

                // Only after we compute the hash...
                let mut digest = Sha1::new();
                io::copy(&mut reader, &mut digest)?;
                Ok(digest.finalize().as_slice() == sha1)

            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    } else {
        match (file.metadata(), size) {
            // File is existing and we want to check size...
            (Ok(metadata), Some(size)) => Ok(metadata.len() == size as u64),
            // File is existing but we don't have size to check, no need to download.
            (Ok(_metadata), None) => Ok(true),
            (Err(e), _) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            (Err(e), _) => Err(e),
        }
    }

}

/// Given a file and its cache sidecar, return the cache metadata only if the file is
/// existing and has not been modified since (size and SHA-1 both match the sidecar).
fn check_download_cache(file: &Path, cache_file: &Path) -> io::Result<Option<serde::CacheMeta>> {

    let cache = match std::fs::File::open(cache_file) {
        Ok(reader) => serde_json::from_reader::<_, serde::CacheMeta>(BufReader::new(reader)).ok(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };

    let Some(cache) = cache else {
        return Ok(None);
    };

    let mut reader = match std::fs::File::open(file) {
        Ok(reader) => reader,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let actual_size = reader.seek(SeekFrom::End(0))?;
    if cache.size as u64 != actual_size {
        return Ok(None);
    }

    reader.rewind()?;

    let mut digest = Sha1::new();
    io::copy(&mut reader, &mut digest)?;
    if cache.sha1.0 != digest.finalize().as_slice() {
        return Ok(None);
    }

    Ok(Some(cache))

}

/// Write the cache sidecar after a successful download, only if a validator header
/// is present, errors are silently ignored because the cache is best-effort.
fn write_download_cache(file: &Path, cache_file: &Path, url: &str, etag: Option<String>, last_modified: Option<String>) {

    if etag.is_none() && last_modified.is_none() {
        return;
    }

    let Ok((size, sha1)) = file_size_and_sha1(file) else {
        return;
    };

    let Ok(writer) = std::fs::File::create(cache_file).map(BufWriter::new) else {
        return;
    };

    let res = serde_json::to_writer(writer, &serde::CacheMeta {
        url: url.to_string(),
        size,
        sha1: crate::serde::HexString(sha1),
        etag,
        last_modified,
    });

    if res.is_err() {
        let _ = std::fs::remove_file(cache_file);
    }

}

fn file_size_and_sha1(file: &Path) -> io::Result<(u32, [u8; 20])> {
    let mut reader = std::fs::File::open(file)?;
    let mut digest = Sha1::new();
    let size = io::copy(&mut reader, &mut digest)?;
    Ok((size as u32, digest.finalize().into()))
}

/// Internal module for serde of the cache sidecar file.
mod serde {

    use crate::serde::HexString;

    #[derive(Debug, serde::Deserialize, serde::Serialize)]
    pub struct CacheMeta {
        /// The full URL of the cached resource, just for information.
        pub url: String,
        /// Size of the cached file, used to verify its validity.
        pub size: u32,
        /// SHA-1 hash of the cached file, used to verify its validity.
        pub sha1: HexString<20>,
        /// The ETag if present.
        pub etag: Option<String>,
        /// Last modified date if present.
        pub last_modified: Option<String>,
    }

}

#[allow(unused_imports)]
#[cfg(test)]
mod tests {

    use std::io::Write as _;
    use std::fs;

    use sha1::{Digest, Sha1};

    use super::{check_file, Batch, CancelToken, TaskErrorKind};

    fn client() -> reqwest::Client {
        crate::http::new_client().unwrap()
    }

    fn sha1_of(data: &[u8]) -> [u8; 20] {
        let mut digest = Sha1::new();
        digest.update(data);
        digest.finalize().into()
    }

    #[test]
    fn check_file_states() {

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.bin");

        assert!(!check_file(&file, None, None).unwrap());

        fs::write(&file, b"hello").unwrap();
        assert!(check_file(&file, None, None).unwrap());
        assert!(check_file(&file, Some(5), None).unwrap());
        assert!(!check_file(&file, Some(4), None).unwrap());
        assert!(check_file(&file, Some(5), Some(&sha1_of(b"hello"))).unwrap());
        assert!(!check_file(&file, Some(5), Some(&sha1_of(b"world"))).unwrap());
        assert!(!check_file(&file, None, Some(&sha1_of(b"world"))).unwrap());

    }

    #[test]
    fn batch_download() {

        let mut server = mockito::Server::new();
        let mock = server.mock("GET", "/data.bin")
            .with_body(b"hello")
            .create();

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sub").join("data.bin");

        let mut batch = Batch::new();
        batch.push(format!("{}/data.bin", server.url()), file.clone().into_boxed_path())
            .set_expected_size(Some(5))
            .set_expected_sha1(Some(sha1_of(b"hello")));

        let result = batch.execute(&client(), 4, &CancelToken::new(), ());
        assert!(!result.has_errors());
        assert_eq!(fs::read(&file).unwrap(), b"hello");
        mock.assert();

        // A second run is a skip: the mock would fail if requested more than once.
        let mut batch = Batch::new();
        batch.push(format!("{}/data.bin", server.url()), file.clone().into_boxed_path())
            .set_expected_sha1(Some(sha1_of(b"hello")));
        let result = batch.execute(&client(), 4, &CancelToken::new(), ());
        assert!(!result.has_errors());

    }

    #[test]
    fn download_refetches_stale_file() {

        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/lib.jar")
            .with_body(b"fresh")
            .create();

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lib.jar");
        fs::write(&file, b"stale").unwrap();

        let mut batch = Batch::new();
        batch.push(format!("{}/lib.jar", server.url()), file.clone().into_boxed_path())
            .set_expected_sha1(Some(sha1_of(b"fresh")));

        let result = batch.execute(&client(), 1, &CancelToken::new(), ());
        assert!(!result.has_errors());
        assert_eq!(fs::read(&file).unwrap(), b"fresh");

    }

    #[test]
    fn download_persistent_mismatch_is_fatal() {

        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/lib.jar")
            .with_body(b"corrupted")
            .expect(2)  // Initial fetch plus the single refetch.
            .create();

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lib.jar");

        let mut batch = Batch::new();
        batch.push(format!("{}/lib.jar", server.url()), file.clone().into_boxed_path())
            .set_expected_sha1(Some(sha1_of(b"expected")));

        let result = batch.execute(&client(), 1, &CancelToken::new(), ());
        assert_eq!(result.errors().len(), 1);
        assert!(matches!(result.errors()[0].kind(), TaskErrorKind::InvalidSha1 { .. }));
        assert!(!file.exists());

    }

    #[test]
    fn copy_tasks() {

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("objects").join("aa").join("aabb");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, b"asset").unwrap();

        let target = dir.path().join("virtual").join("icons").join("icon.png");

        let mut batch = Batch::new();
        batch.push_copy(source.into_boxed_path(), target.clone().into_boxed_path())
            .set_expected_size(Some(5));

        let result = batch.execute(&client(), 2, &CancelToken::new(), ());
        assert!(!result.has_errors());
        assert_eq!(fs::read(&target).unwrap(), b"asset");

    }

    #[test]
    fn unpack_excludes() {

        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("natives.jar");

        {
            let file = fs::File::create(&archive).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("libfoo.so", options).unwrap();
            writer.write_all(b"ELF").unwrap();
            writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
            writer.write_all(b"Manifest-Version: 1.0").unwrap();
            writer.add_directory("META-INF/services/", options).unwrap();
            writer.finish().unwrap();
        }

        let target = dir.path().join("natives");

        let mut batch = Batch::new();
        batch.push_unpack(archive.into_boxed_path(), target.clone().into_boxed_path())
            .add_exclude("META-INF/");

        let result = batch.execute(&client(), 1, &CancelToken::new(), ());
        assert!(!result.has_errors());
        assert!(target.join("libfoo.so").is_file());
        assert!(!target.join("META-INF").exists());

    }

    #[test]
    fn cancelled_batch_reports_remaining() {

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.bin");
        fs::write(&source, b"data").unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();

        let mut batch = Batch::new();
        batch.push_copy(source.into_boxed_path(), dir.path().join("dst.bin").into_boxed_path());

        let result = batch.execute(&client(), 1, &cancel, ());
        assert!(result.is_cancelled());
        assert_eq!(result.errors().len(), 1);
        assert!(matches!(result.errors()[0].kind(), TaskErrorKind::Cancelled));

    }

}

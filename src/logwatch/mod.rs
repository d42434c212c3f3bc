//! Watch a directory of log files for newly appended lines.
//!
//! The watcher polls: every pass it re-lists the directory, reconciles the
//! set of tracked files (new files, deleted files, rotated files), reads
//! whatever was appended since the last pass, and hands the new lines to a
//! callback. There is no inotify/kqueue fast path; a plain poll behaves the
//! same on every host the checks run on.
//!
//! Files are identified by `(device, inode)` rather than by name, so a
//! rename-based rotation shows up as "same path, different file". The lines
//! written to the old file between the last poll and the rotation are read
//! off the still-open handle before the replacement is picked up.
//!
//! In single-shot mode ([`LogWatcher::run_once`]) the watcher records a
//! small offset file per watched log, and the next invocation resumes from
//! it, recovering anything left behind in a rotated-away predecessor first.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::result::Result as StdResult;
use std::thread::sleep;
use std::time::Duration;

use derive_more::From;

mod offsets;
mod rotate;
mod tail;

pub use self::offsets::OffsetRecord;
pub use self::tail::tail;

/// How long [`LogWatcher::run`] sleeps between passes unless told otherwise.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Errors from building or running a [`LogWatcher`].
#[derive(Debug, From)]
pub enum WatchError {
    /// The watch directory is missing or is not a directory. Fatal at
    /// construction, never retried.
    Config(String),
    /// An I/O failure other than a file disappearing out from under us.
    Io(io::Error),
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WatchError::Config(msg) => write!(f, "{}", msg),
            WatchError::Io(err) => write!(f, "{}", err),
        }
    }
}

pub type Result<T> = StdResult<T, WatchError>;

/// Identity of a file on disk, stable across renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    fn of(meta: &fs::Metadata) -> FileId {
        FileId {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }
}

/// Which files to watch and how to start reading them.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Exact base names to watch. When empty, fall back to `extensions`.
    pub file_names: Vec<String>,
    /// Extensions to watch when `file_names` is empty. An empty list here
    /// matches every regular file in the directory.
    pub extensions: Vec<String>,
    /// Deliver the last N existing lines of each file at construction.
    pub tail_lines: usize,
    /// Where `<basename>.offset` resume records are kept.
    pub offset_dir: PathBuf,
    /// Suppress the default watch/unwatch event lines.
    pub quiet: bool,
}

impl Default for WatchOptions {
    fn default() -> WatchOptions {
        WatchOptions {
            file_names: Vec::new(),
            extensions: vec!["log".to_string()],
            tail_lines: 0,
            offset_dir: PathBuf::from("/tmp"),
            quiet: false,
        }
    }
}

impl WatchOptions {
    /// Whether a directory entry with this base name should be watched.
    fn matches(&self, name: &str) -> bool {
        if !self.file_names.is_empty() {
            return self.file_names.iter().any(|want| want == name);
        }
        if self.extensions.is_empty() {
            return true;
        }
        match Path::new(name).extension().and_then(OsStr::to_str) {
            Some(ext) => self.extensions.iter().any(|want| want == ext),
            None => false,
        }
    }
}

/// One tracked file: its path, an open handle, and how far we have read.
///
/// The offset never moves backwards while the same file is tracked; a
/// rotation replaces the whole entry with a fresh one at offset 0.
#[derive(Debug)]
struct WatchedFile {
    path: PathBuf,
    file: File,
    offset: u64,
}

impl WatchedFile {
    /// Read everything between the current offset and EOF as lines.
    fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let mut buf = Vec::new();
        self.file.seek(SeekFrom::Start(self.offset))?;
        self.file.read_to_end(&mut buf)?;
        self.offset += buf.len() as u64;
        Ok(split_lines(&buf))
    }
}

/// Split raw bytes into lines, dropping `\n` / `\r\n` terminators. A
/// trailing segment with no newline yet is returned verbatim; its
/// continuation arrives with a later read.
fn split_lines(buf: &[u8]) -> Vec<String> {
    if buf.is_empty() {
        return Vec::new();
    }
    let mut segments: Vec<&[u8]> = buf.split(|&b| b == b'\n').collect();
    let ends_with_newline = buf.ends_with(b"\n");
    if ends_with_newline {
        // split() leaves an empty segment after the final newline
        segments.pop();
    }
    let last = segments.len().saturating_sub(1);
    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let terminated = ends_with_newline || i < last;
            let segment = if terminated && segment.ends_with(b"\r") {
                &segment[..segment.len() - 1]
            } else {
                segment
            };
            String::from_utf8_lossy(segment).into_owned()
        })
        .collect()
}

/// What happened to a tracked file, judged from a stat snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Transition {
    /// The path is gone; final-read the handle and drop the entry.
    Departed(FileId),
    /// The path now names a different file; the old entry is finished and
    /// the replacement starts from the top.
    Rotated(FileId, PathBuf),
}

/// Decide what to do with each tracked file. The snapshot rows are
/// `(tracked id, path, what stat() currently says about that path)`.
fn plan_transitions(snapshot: &[(FileId, PathBuf, Option<FileId>)]) -> Vec<Transition> {
    let mut plan = Vec::new();
    for (id, path, on_disk) in snapshot {
        match on_disk {
            None => plan.push(Transition::Departed(*id)),
            Some(current) if current != id => plan.push(Transition::Rotated(*id, path.clone())),
            Some(_) => {}
        }
    }
    plan
}

/// Looks for changes in all matching files of a directory and hands new
/// lines to a callback, following files across log rotation.
///
/// ```no_run
/// use maas_plugins::logwatch::{LogWatcher, WatchOptions, DEFAULT_INTERVAL};
///
/// let mut watcher = LogWatcher::new(
///     "/var/log",
///     |filename: &std::path::Path, lines: &[String]| {
///         for line in lines {
///             println!("{}: {}", filename.display(), line);
///         }
///     },
///     WatchOptions::default(),
/// )
/// .unwrap();
/// watcher.run(DEFAULT_INTERVAL).unwrap();
/// ```
pub struct LogWatcher<F: FnMut(&Path, &[String])> {
    folder: PathBuf,
    callback: F,
    options: WatchOptions,
    files: HashMap<FileId, WatchedFile>,
    logger: Box<dyn FnMut(&str)>,
}

impl<F: FnMut(&Path, &[String])> LogWatcher<F> {
    /// Start tracking every matching file under `folder`.
    ///
    /// A file with an offset record resumes where the previous run left
    /// off; if its inode changed since then, any lines left behind in the
    /// rotated-away file are delivered first and the replacement starts at
    /// offset 0. A file without a record starts at end-of-file, so
    /// historical content is not replayed. With `tail_lines > 0` the last N
    /// existing lines of each file are delivered immediately.
    pub fn new<P: AsRef<Path>>(folder: P, callback: F, options: WatchOptions) -> Result<LogWatcher<F>> {
        let folder = fs::canonicalize(folder.as_ref()).map_err(|err| {
            WatchError::Config(format!("{} does not exist: {}", folder.as_ref().display(), err))
        })?;
        if !folder.is_dir() {
            return Err(WatchError::Config(format!(
                "{} is not a directory",
                folder.display()
            )));
        }
        let mut watcher = LogWatcher {
            folder,
            callback,
            options,
            files: HashMap::new(),
            logger: Box::new(|line| println!("{}", line)),
        };
        watcher.update_files()?;
        watcher.resume_from_offsets()?;
        Ok(watcher)
    }

    /// Replace the hook that reports watch/unwatch events. The default
    /// prints them to stdout.
    pub fn set_logger(&mut self, logger: impl FnMut(&str) + 'static) {
        self.logger = Box::new(logger);
    }

    /// The paths currently being tracked.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.files.values().map(|wf| wf.path.clone()).collect()
    }

    /// Poll forever, sleeping `interval` between passes. Only returns on an
    /// I/O error that is not a file departing.
    pub fn run(&mut self, interval: Duration) -> Result<()> {
        loop {
            self.poll()?;
            sleep(interval);
        }
    }

    /// Make exactly one scan-and-read pass, then record the current size
    /// and inode of every tracked file so the next invocation can resume
    /// where this one stopped.
    pub fn run_once(&mut self) -> Result<()> {
        self.poll()?;
        self.persist_offsets()
    }

    /// One scan-and-read pass without persisting anything.
    pub fn poll(&mut self) -> Result<()> {
        self.update_files()?;
        self.read_files()
    }

    /// Reconcile the tracked set against the directory. Departures and
    /// rotations are handled before anything else so a rotated file's
    /// trailing lines are delivered ahead of lines from its replacement.
    fn update_files(&mut self) -> Result<()> {
        let snapshot = self.snapshot_tracked()?;
        for transition in plan_transitions(&snapshot) {
            match transition {
                Transition::Departed(id) => self.unwatch(id),
                Transition::Rotated(id, path) => {
                    self.unwatch(id);
                    self.watch(&path)?;
                }
            }
        }
        for (id, path) in self.list_matching()? {
            if !self.files.contains_key(&id) {
                self.watch(&path)?;
            }
        }
        Ok(())
    }

    /// Stat every tracked path, recording `None` for paths that are gone.
    fn snapshot_tracked(&self) -> Result<Vec<(FileId, PathBuf, Option<FileId>)>> {
        let mut snapshot = Vec::new();
        for (id, wf) in &self.files {
            let on_disk = match fs::metadata(&wf.path) {
                Ok(meta) => Some(FileId::of(&meta)),
                Err(ref err) if err.kind() == io::ErrorKind::NotFound => None,
                Err(err) => return Err(err.into()),
            };
            snapshot.push((*id, wf.path.clone(), on_disk));
        }
        Ok(snapshot)
    }

    /// List the directory and keep the regular files that pass the filter.
    fn list_matching(&self) -> Result<Vec<(FileId, PathBuf)>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.folder)? {
            let entry = entry?;
            let path = entry.path();
            let name = match path.file_name().and_then(OsStr::to_str) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if !self.options.matches(&name) {
                continue;
            }
            let meta = match fs::metadata(&path) {
                Ok(meta) => meta,
                // gone between the listing and the stat
                Err(ref err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            if !meta.is_file() {
                continue;
            }
            found.push((FileId::of(&meta), path));
        }
        Ok(found)
    }

    /// Open `path` and start tracking it from the beginning.
    fn watch(&mut self, path: &Path) -> Result<()> {
        let file = match File::open(path) {
            Ok(file) => file,
            // vanished between the listing and the open; the next pass
            // settles it
            Err(ref err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let meta = file.metadata()?;
        let id = FileId::of(&meta);
        self.log(&format!("watching logfile {}", path.display()));
        self.files.insert(
            id,
            WatchedFile {
                path: path.to_path_buf(),
                file,
                offset: 0,
            },
        );
        Ok(())
    }

    /// Stop tracking a file, first reading anything written to it since
    /// the last pass off the still-open handle.
    fn unwatch(&mut self, id: FileId) {
        let mut wf = match self.files.remove(&id) {
            Some(wf) => wf,
            None => return,
        };
        // The handle may be stale (unlinked or renamed); a failed read
        // here means there was nothing left to collect.
        let lines = wf.read_new_lines().unwrap_or_default();
        self.log(&format!("un-watching logfile {}", wf.path.display()));
        if !lines.is_empty() {
            (self.callback)(&wf.path, &lines);
        }
    }

    /// Deliver new lines from every tracked file.
    fn read_files(&mut self) -> Result<()> {
        let ids: Vec<FileId> = self.files.keys().cloned().collect();
        for id in ids {
            let read = match self.files.get_mut(&id) {
                Some(wf) => wf.read_new_lines().map(|lines| (wf.path.clone(), lines)),
                None => continue,
            };
            match read {
                Ok((path, lines)) => {
                    if !lines.is_empty() {
                        (self.callback)(&path, &lines);
                    }
                }
                // vanished mid-read: same treatment as a failed stat
                Err(ref err) if err.kind() == io::ErrorKind::NotFound => self.unwatch(id),
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Apply each tracked file's offset record, then honor `tail_lines`.
    /// Runs once, at construction.
    fn resume_from_offsets(&mut self) -> Result<()> {
        let ids: Vec<FileId> = self.files.keys().cloned().collect();
        for id in ids {
            let path = match self.files.get(&id) {
                Some(wf) => wf.path.clone(),
                None => continue,
            };
            let offset_path = OffsetRecord::path_for(&self.options.offset_dir, &path);
            let start = match OffsetRecord::load(&offset_path)? {
                Some(record) => {
                    if record.inode != id.ino {
                        // rotated between runs: recover what the previous
                        // run had not read yet, then take the replacement
                        // from the top
                        self.recover_rotated(&path, &record)?;
                        0
                    } else {
                        record.offset
                    }
                }
                None => match fs::metadata(&path) {
                    Ok(meta) => meta.len(),
                    Err(ref err) if err.kind() == io::ErrorKind::NotFound => 0,
                    Err(err) => return Err(err.into()),
                },
            };
            if let Some(wf) = self.files.get_mut(&id) {
                wf.file.seek(SeekFrom::Start(start))?;
                wf.offset = start;
            }
            if self.options.tail_lines > 0 {
                let lines = tail::tail(&path, self.options.tail_lines)?;
                if !lines.is_empty() {
                    (self.callback)(&path, &lines);
                }
            }
        }
        Ok(())
    }

    /// Read and deliver whatever is left in the rotated-away predecessor
    /// of `path`, starting at the offset the previous run recorded. No
    /// recognizable candidate means there is nothing more to recover.
    fn recover_rotated(&mut self, path: &Path, record: &OffsetRecord) -> Result<()> {
        let rotated = match rotate::find_rotated_file(path, record.inode)? {
            Some(rotated) => rotated,
            None => return Ok(()),
        };
        let mut file = match File::open(&rotated) {
            Ok(file) => file,
            Err(ref err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        file.seek(SeekFrom::Start(record.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        let lines = split_lines(&buf);
        if !lines.is_empty() {
            (self.callback)(&rotated, &lines);
        }
        Ok(())
    }

    /// Write an offset record (current size and inode) for every tracked
    /// file.
    fn persist_offsets(&mut self) -> Result<()> {
        for wf in self.files.values() {
            let meta = match fs::metadata(&wf.path) {
                Ok(meta) => meta,
                // departed since the read pass; the next pass unwatches it
                Err(ref err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            let record = OffsetRecord {
                inode: meta.ino(),
                offset: meta.len(),
            };
            record.store(&OffsetRecord::path_for(&self.options.offset_dir, &wf.path))?;
        }
        Ok(())
    }

    fn log(&mut self, line: &str) {
        if !self.options.quiet {
            (self.logger)(line);
        }
    }
}

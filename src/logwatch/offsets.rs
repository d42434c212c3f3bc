//! Sidecar files recording how far into a log the previous run read.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A persisted `(inode, byte offset)` pair for one watched file.
///
/// The on-disk format is two lines of text: the inode, then the offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetRecord {
    pub inode: u64,
    pub offset: u64,
}

impl OffsetRecord {
    /// Where the record for `watched` lives: `<offset_dir>/<basename>.offset`.
    pub fn path_for(offset_dir: &Path, watched: &Path) -> PathBuf {
        let base = watched
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        offset_dir.join(format!("{}.offset", base))
    }

    /// Load a record. A missing, empty, or garbled file counts as no
    /// record at all.
    pub fn load(path: &Path) -> io::Result<Option<OffsetRecord>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(ref err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        let mut fields = contents.lines();
        let inode = fields.next().and_then(|line| line.trim().parse().ok());
        let offset = fields.next().and_then(|line| line.trim().parse().ok());
        match (inode, offset) {
            (Some(inode), Some(offset)) => Ok(Some(OffsetRecord { inode, offset })),
            _ => Ok(None),
        }
    }

    /// Write the record, replacing whatever was there.
    pub fn store(&self, path: &Path) -> io::Result<()> {
        let mut file = fs::File::create(path)?;
        write!(file, "{}\n{}\n", self.inode, self.offset)
    }
}

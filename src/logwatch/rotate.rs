//! Locate the file a rotated log was renamed to.
//!
//! When a watched path's inode changes between runs, the previous file is
//! usually still on disk under a rotation suffix. The probe order covers
//! savelog(8), logrotate(8) with and without `delaycompress`, logrotate's
//! `dateext` scheme, and Python's `TimedRotatingFileHandler`.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Suffixes the known rotation schemes append to the base name, in
    /// probe order.
    static ref ROTATED_SUFFIXES: Vec<Regex> = vec![
        // logrotate dateext, `dateformat -%Y%m%d`, with delaycompress
        Regex::new(r"^-\d{8}$").unwrap(),
        // logrotate dateext, `dateformat -%Y%m%d`, without delaycompress
        Regex::new(r"^-\d{8}\.gz$").unwrap(),
        // logrotate dateext, `dateformat -%Y%m%d-%s`, with delaycompress
        Regex::new(r"^-\d{8}-\d{10}$").unwrap(),
        // logrotate dateext, `dateformat -%Y%m%d-%s`, without delaycompress
        Regex::new(r"^-\d{8}-\d{10}\.gz$").unwrap(),
        // Python TimedRotatingFileHandler
        Regex::new(r"^\.\d{4}-\d{2}-\d{2}$").unwrap(),
    ];
}

/// Find the file `path` was rotated to. A candidate is only accepted while
/// it still has the inode the offset record remembers; anything else means
/// there is nothing left to recover.
pub(crate) fn find_rotated_file(path: &Path, old_inode: u64) -> io::Result<Option<PathBuf>> {
    let candidate = match rotated_candidate(path)? {
        Some(candidate) => candidate,
        None => return Ok(None),
    };
    match fs::metadata(&candidate) {
        Ok(meta) if meta.ino() == old_inode => Ok(Some(candidate)),
        Ok(_) => Ok(None),
        Err(ref err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Check the rotated-filename conventions and return the first match.
fn rotated_candidate(path: &Path) -> io::Result<Option<PathBuf>> {
    // savelog(8): `name.0` is the most recent rotation only while it is
    // newer than `name.1.gz`
    let zero = suffixed(path, ".0");
    let one_gz = suffixed(path, ".1.gz");
    if zero.exists() && one_gz.exists() {
        let zero_mtime = fs::metadata(&zero)?.modified()?;
        let gz_mtime = fs::metadata(&one_gz)?.modified()?;
        if zero_mtime > gz_mtime {
            return Ok(Some(zero));
        }
    }

    // logrotate(8) with delaycompress
    let one = suffixed(path, ".1");
    if one.exists() {
        return Ok(Some(one));
    }
    // and without
    if one_gz.exists() {
        return Ok(Some(one_gz));
    }

    dated_candidate(path)
}

/// Search the directory for date-stamped rotations of `path`; the newest
/// (lexicographically last, which is also chronologically last for these
/// fixed-width stamps) match wins.
fn dated_candidate(path: &Path) -> io::Result<Option<PathBuf>> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let base = match path.file_name().and_then(|name| name.to_str()) {
        Some(base) => base,
        None => return Ok(None),
    };
    for pattern in ROTATED_SUFFIXES.iter() {
        let mut matches: Vec<String> = Vec::new();
        for entry in fs::read_dir(parent)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if name.len() > base.len()
                && name.starts_with(base)
                && pattern.is_match(&name[base.len()..])
            {
                matches.push(name);
            }
        }
        matches.sort();
        if let Some(newest) = matches.pop() {
            return Ok(Some(parent.join(newest)));
        }
    }
    Ok(None)
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::os::unix::fs::MetadataExt;
    use std::thread::sleep;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    fn touch(path: &Path) {
        File::create(path).unwrap();
    }

    #[test]
    fn prefers_dot_one_over_dated_suffixes() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("app.log");
        touch(&dir.path().join("app.log.1"));
        touch(&dir.path().join("app.log-20240101"));

        assert_eq!(
            rotated_candidate(&log).unwrap(),
            Some(dir.path().join("app.log.1"))
        );
    }

    #[test]
    fn falls_back_to_the_compressed_rotation() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("app.log");
        touch(&dir.path().join("app.log.1.gz"));

        assert_eq!(
            rotated_candidate(&log).unwrap(),
            Some(dir.path().join("app.log.1.gz"))
        );
    }

    #[test]
    fn newest_dated_rotation_wins() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("app.log");
        touch(&dir.path().join("app.log-20240101"));
        touch(&dir.path().join("app.log-20240315"));

        assert_eq!(
            rotated_candidate(&log).unwrap(),
            Some(dir.path().join("app.log-20240315"))
        );
    }

    #[test]
    fn recognizes_timed_rotating_file_handler_suffixes() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("app.log");
        touch(&dir.path().join("app.log.2024-03-15"));

        assert_eq!(
            rotated_candidate(&log).unwrap(),
            Some(dir.path().join("app.log.2024-03-15"))
        );
    }

    #[test]
    fn unrelated_names_do_not_match() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("app.log");
        touch(&dir.path().join("app.log.offset"));
        touch(&dir.path().join("app.logx-20240101"));
        touch(&dir.path().join("other.log.1"));

        assert_eq!(rotated_candidate(&log).unwrap(), None);
    }

    #[test]
    fn savelog_zero_needs_to_be_newer_than_the_gz() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("app.log");

        // a lone `.0` is not a recognized rotation
        touch(&dir.path().join("app.log.0"));
        assert_eq!(rotated_candidate(&log).unwrap(), None);

        let dir = TempDir::new().unwrap();
        let log = dir.path().join("app.log");
        touch(&dir.path().join("app.log.1.gz"));
        sleep(Duration::from_millis(20));
        touch(&dir.path().join("app.log.0"));
        assert_eq!(
            rotated_candidate(&log).unwrap(),
            Some(dir.path().join("app.log.0"))
        );
    }

    #[test]
    fn candidates_must_keep_the_recorded_inode() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("app.log");
        let rotated = dir.path().join("app.log.1");
        touch(&rotated);
        let inode = fs::metadata(&rotated).unwrap().ino();

        assert_eq!(
            find_rotated_file(&log, inode).unwrap(),
            Some(rotated.clone())
        );
        assert_eq!(find_rotated_file(&log, inode + 1).unwrap(), None);
    }
}

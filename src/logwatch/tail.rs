//! Read the last N lines of a file by scanning backwards in blocks.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// How much further back each attempt looks.
const BLOCK_SIZE: u64 = 1024;

/// Read the last `window` lines of `path`.
///
/// A file with fewer than `window` lines yields every line it has. A
/// missing file yields no lines at all, the same way the watcher treats a
/// departed file.
pub fn tail(path: &Path, window: usize) -> io::Result<Vec<String>> {
    if window == 0 {
        return Ok(Vec::new());
    }
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(ref err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let size = file.seek(SeekFrom::End(0))?;

    let mut blocks = 1u64;
    let data: String = loop {
        let step = blocks.saturating_mul(BLOCK_SIZE);
        // Once the window reaches the start of the file there is nothing
        // further back to look at: read the whole thing.
        let whole_file = step >= size;
        if whole_file {
            file.seek(SeekFrom::Start(0))?;
        } else {
            file.seek(SeekFrom::End(-(step as i64)))?;
        }
        let chunk = read_lossy(&mut file)?;
        let chunk = chunk.trim();
        if whole_file || chunk.matches('\n').count() >= window {
            break chunk.to_string();
        }
        blocks += 1;
    };

    let all: Vec<&str> = data.lines().collect();
    let start = all.len().saturating_sub(window);
    Ok(all[start..].iter().map(|line| line.to_string()).collect())
}

fn read_lossy(file: &mut File) -> io::Result<String> {
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;

    fn fixture(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("tail.log");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn short_files_yield_everything_they_have() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "one\ntwo\n");
        assert_eq!(tail(&path, 10).unwrap(), vec!["one", "two"]);
    }

    #[test]
    fn yields_exactly_the_requested_window() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "a\nb\nc\nd\ne\n");
        assert_eq!(tail(&path, 2).unwrap(), vec!["d", "e"]);
        assert_eq!(tail(&path, 5).unwrap(), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn walks_back_through_multiple_blocks() {
        let dir = TempDir::new().unwrap();
        let mut contents = String::new();
        for i in 0..500 {
            contents.push_str(&format!("log line number {}\n", i));
        }
        let path = fixture(&dir, &contents);
        assert_eq!(
            tail(&path, 3).unwrap(),
            vec![
                "log line number 497",
                "log line number 498",
                "log line number 499",
            ]
        );
    }

    #[test]
    fn handles_lines_longer_than_a_block() {
        let dir = TempDir::new().unwrap();
        let long = "x".repeat(3 * 1024);
        let path = fixture(&dir, &format!("{}\nend\n", long));
        assert_eq!(tail(&path, 1).unwrap(), vec!["end"]);
    }

    #[test]
    fn no_trailing_newline_still_counts_as_a_line() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "first\nlast");
        assert_eq!(tail(&path, 1).unwrap(), vec!["last"]);
    }

    #[test]
    fn missing_and_empty_files_yield_nothing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            tail(&dir.path().join("absent.log"), 5).unwrap(),
            Vec::<String>::new()
        );
        let path = fixture(&dir, "");
        assert_eq!(tail(&path, 5).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn zero_window_reads_nothing() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "one\ntwo\n");
        assert_eq!(tail(&path, 0).unwrap(), Vec::<String>::new());
    }
}

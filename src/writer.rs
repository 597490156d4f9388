//! Writers for output artifacts and shard files.
//!
//! Array documents are written as:
//!
//! ```text
//! [
//! {"_id":1,...},
//! {"_id":2,...}
//! ]
//! ```
//!
//! one compact record per line, `[]` when empty, UTF-8 with non-ASCII text
//! left literal. Shard files are plain NDJSON.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SplitError};
use crate::record::Record;

const WRITE_BUFFER: usize = 256 * 1024;

// ── ArrayWriter ────────────────────────────────────────────────────

/// Incremental writer for an array-of-records document.
///
/// The document is only valid after `finish()`; a writer dropped earlier
/// leaves a truncated file behind, which callers treat as garbage.
pub struct ArrayWriter {
    out: BufWriter<File>,
    path: PathBuf,
    count: u64,
}

impl ArrayWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| SplitError::io_at(&path, e))?;
        let mut out = BufWriter::with_capacity(WRITE_BUFFER, file);
        out.write_all(b"[")?;
        Ok(Self { out, path, count: 0 })
    }

    pub fn push(&mut self, record: &Record) -> Result<()> {
        let sep: &[u8] = if self.count == 0 { b"\n" } else { b",\n" };
        self.out.write_all(sep)?;
        serde_json::to_writer(&mut self.out, record)?;
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the array, flush and fsync. Returns the record count.
    pub fn finish(mut self) -> Result<u64> {
        let tail: &[u8] = if self.count == 0 { b"]\n" } else { b"\n]\n" };
        self.out.write_all(tail)?;
        let file = self
            .out
            .into_inner()
            .map_err(|e| SplitError::io_at(&self.path, e.into_error()))?;
        file.sync_all().map_err(|e| SplitError::io_at(&self.path, e))?;
        Ok(self.count)
    }
}

// ── LineWriter ─────────────────────────────────────────────────────

/// NDJSON writer: one compact record per line.
pub struct LineWriter {
    out: BufWriter<File>,
    path: PathBuf,
    count: u64,
}

impl LineWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| SplitError::io_at(&path, e))?;
        Ok(Self {
            out: BufWriter::with_capacity(WRITE_BUFFER, file),
            path,
            count: 0,
        })
    }

    pub fn push(&mut self, record: &Record) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.count += 1;
        Ok(())
    }

    /// Flush and close. Returns the path and record count.
    pub fn finish(mut self) -> Result<(PathBuf, u64)> {
        self.out
            .flush()
            .map_err(|e| SplitError::io_at(&self.path, e))?;
        Ok((self.path, self.count))
    }
}

/// Iterate the records of an NDJSON file.
pub fn read_lines(path: &Path) -> Result<impl Iterator<Item = Result<Record>>> {
    let file = File::open(path).map_err(|e| SplitError::io_at(path, e))?;
    let reader = std::io::BufReader::with_capacity(WRITE_BUFFER, file);
    Ok(serde_json::Deserializer::from_reader(reader)
        .into_iter::<Record>()
        .map(|r| r.map_err(SplitError::from)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn rec(id: i64, name: &str) -> Record {
        [("_id", json!(id)), ("name", json!(name))].into_iter().collect()
    }

    #[test]
    fn test_empty_array_is_valid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.json");
        let count = ArrayWriter::create(&path).unwrap().finish().unwrap();
        assert_eq!(count, 0);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "[]\n");
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!([]));
    }

    #[test]
    fn test_array_layout_and_literal_unicode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        let mut w = ArrayWriter::create(&path).unwrap();
        w.push(&rec(1, "Zoë")).unwrap();
        w.push(&rec(2, "東京")).unwrap();
        assert_eq!(w.finish().unwrap(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "[\n{\"_id\":1,\"name\":\"Zoë\"},\n{\"_id\":2,\"name\":\"東京\"}\n]\n"
        );
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_ndjson_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shard.ndjson");
        let mut w = LineWriter::create(&path).unwrap();
        w.push(&rec(1, "a")).unwrap();
        w.push(&rec(2, "b")).unwrap();
        let (written, count) = w.finish().unwrap();
        assert_eq!(written, path);
        assert_eq!(count, 2);

        let back: Vec<Record> = read_lines(&path).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(back, vec![rec(1, "a"), rec(2, "b")]);
    }

    #[test]
    fn test_read_lines_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.ndjson");
        std::fs::write(&path, "{\"_id\":1}\n{oops\n").unwrap();
        let results: Vec<_> = read_lines(&path).unwrap().collect();
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}

//! Sorted key files: the on-disk unit of the membership store.
//!
//! Spilled buffer runs and the frozen per-category indexes share one format,
//! opened through `memmap2` for O(log N) lookups behind a bloom prefilter.
//!
//! # File Layout
//!
//! ```text
//! Offset  Size        Field
//! 0       4           magic: b"GSKF"
//! 4       4           version: u32 = 1
//! 8       1           category tag (0 = load, 1 = update)
//! 9       7           _reserved
//! 16      8           entry_count: u64
//! 24      8           bloom_len: u64
//! 32      16 * N      keys: u128 LE, strictly ascending
//! ...     bloom_len   serialized BloomFilter
//! ```

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{Result, SplitError};
use crate::membership::bloom::BloomFilter;
use crate::record::{Category, VertexKey};

pub const KEYFILE_MAGIC: [u8; 4] = *b"GSKF";
pub const KEYFILE_VERSION: u32 = 1;

const HEADER_SIZE: usize = 32;
const KEY_SIZE: usize = 16;

// ── Writing ────────────────────────────────────────────────────────

/// Write `count` strictly ascending keys to `path` and fsync.
pub fn write_key_file(
    path: &Path,
    category: Category,
    count: u64,
    keys: impl IntoIterator<Item = VertexKey>,
) -> Result<()> {
    let file = File::create(path).map_err(|e| SplitError::io_at(path, e))?;
    let mut out = BufWriter::new(file);
    let mut bloom = BloomFilter::new(count as usize);

    out.write_all(&KEYFILE_MAGIC)?;
    out.write_all(&KEYFILE_VERSION.to_le_bytes())?;
    out.write_all(&[category.tag(), 0, 0, 0, 0, 0, 0, 0])?;
    out.write_all(&count.to_le_bytes())?;
    out.write_all(&(bloom.serialized_size() as u64).to_le_bytes())?;

    let mut written = 0u64;
    let mut last: Option<VertexKey> = None;
    for key in keys {
        if last.is_some_and(|prev| prev >= key) {
            return Err(SplitError::Membership(format!(
                "keys for {} must be strictly ascending",
                path.display()
            )));
        }
        out.write_all(&key.0.to_le_bytes())?;
        bloom.insert(key);
        last = Some(key);
        written += 1;
    }
    if written != count {
        return Err(SplitError::Membership(format!(
            "{}: expected {} keys, got {}",
            path.display(),
            count,
            written
        )));
    }

    bloom.write_to(&mut out)?;
    let file = out
        .into_inner()
        .map_err(|e| SplitError::io_at(path, e.into_error()))?;
    file.sync_all().map_err(|e| SplitError::io_at(path, e))?;
    Ok(())
}

// ── Reading ────────────────────────────────────────────────────────

/// Read-only, memory-mapped key file. `Send + Sync`.
#[derive(Debug)]
pub struct KeyFile {
    path: PathBuf,
    mmap: Mmap,
    category: Category,
    len: usize,
    bloom: BloomFilter,
}

impl KeyFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| SplitError::io_at(path, e))?;
        // SAFETY: key files are written once and never modified while mapped.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| SplitError::io_at(path, e))?;

        if mmap.len() < HEADER_SIZE {
            return Err(SplitError::InvalidFormat(format!(
                "{}: key file header truncated",
                path.display()
            )));
        }
        if mmap[0..4] != KEYFILE_MAGIC {
            return Err(SplitError::InvalidFormat(format!(
                "{}: expected GSKF, got {:?}",
                path.display(),
                &mmap[0..4]
            )));
        }
        let version = u32::from_le_bytes(word::<4>(&mmap, 4));
        if version != KEYFILE_VERSION {
            return Err(SplitError::InvalidFormat(format!(
                "{}: unsupported key file version {}",
                path.display(),
                version
            )));
        }
        let category = Category::from_tag(mmap[8]).ok_or_else(|| {
            SplitError::InvalidFormat(format!("{}: bad category tag {}", path.display(), mmap[8]))
        })?;
        let len = u64::from_le_bytes(word::<8>(&mmap, 16)) as usize;
        let bloom_len = u64::from_le_bytes(word::<8>(&mmap, 24)) as usize;

        let bloom_at = len
            .checked_mul(KEY_SIZE)
            .and_then(|keys| keys.checked_add(HEADER_SIZE));
        let expected = bloom_at.and_then(|at| at.checked_add(bloom_len));
        let (Some(bloom_at), Some(expected)) = (bloom_at, expected) else {
            return Err(SplitError::InvalidFormat(format!(
                "{}: header counts overflow ({} keys, {} bloom bytes)",
                path.display(),
                len,
                bloom_len
            )));
        };
        if mmap.len() != expected {
            return Err(SplitError::InvalidFormat(format!(
                "{}: size {} does not match {} keys + {} bloom bytes",
                path.display(),
                mmap.len(),
                len,
                bloom_len
            )));
        }
        let bloom = BloomFilter::from_bytes(&mmap[bloom_at..])?;

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            category,
            len,
            bloom,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn key_at(&self, i: usize) -> VertexKey {
        VertexKey(u128::from_le_bytes(word::<16>(&self.mmap, HEADER_SIZE + i * KEY_SIZE)))
    }

    /// Bloom-filtered binary search.
    pub fn contains(&self, key: VertexKey) -> bool {
        if !self.bloom.maybe_contains(key) {
            return false;
        }
        let (mut lo, mut hi) = (0usize, self.len);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.key_at(mid).cmp(&key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return true,
            }
        }
        false
    }

    /// Keys in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = VertexKey> + '_ {
        (0..self.len).map(move |i| self.key_at(i))
    }
}

fn word<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(&bytes[at..at + N]);
    buf
}

// ── Merging ────────────────────────────────────────────────────────

/// K-way merge of sorted key files into one ascending, deduplicated stream.
pub fn merge_sorted<'a>(files: &[&'a KeyFile]) -> MergeIter<'a> {
    let mut heap = BinaryHeap::with_capacity(files.len());
    for (idx, file) in files.iter().enumerate() {
        if !file.is_empty() {
            heap.push(Reverse((file.key_at(0), idx)));
        }
    }
    MergeIter {
        files: files.to_vec(),
        cursors: vec![0; files.len()],
        heap,
        last: None,
    }
}

pub struct MergeIter<'a> {
    files: Vec<&'a KeyFile>,
    cursors: Vec<usize>,
    heap: BinaryHeap<Reverse<(VertexKey, usize)>>,
    last: Option<VertexKey>,
}

impl Iterator for MergeIter<'_> {
    type Item = VertexKey;

    fn next(&mut self) -> Option<VertexKey> {
        while let Some(Reverse((key, idx))) = self.heap.pop() {
            self.cursors[idx] += 1;
            let file = self.files[idx];
            if self.cursors[idx] < file.len() {
                self.heap.push(Reverse((file.key_at(self.cursors[idx]), idx)));
            }
            if self.last != Some(key) {
                self.last = Some(key);
                return Some(key);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn keys(range: impl Iterator<Item = u64>) -> Vec<VertexKey> {
        let mut keys: Vec<VertexKey> = range.map(|i| VertexKey::from_text(&i.to_string())).collect();
        keys.sort();
        keys
    }

    fn write(dir: &TempDir, name: &str, cat: Category, keys: &[VertexKey]) -> KeyFile {
        let path = dir.path().join(name);
        write_key_file(&path, cat, keys.len() as u64, keys.iter().copied()).unwrap();
        KeyFile::open(&path).unwrap()
    }

    #[test]
    fn test_write_and_lookup() {
        let dir = TempDir::new().unwrap();
        let present = keys(0..1000);
        let file = write(&dir, "a.keys", Category::Update, &present);

        assert_eq!(file.len(), 1000);
        assert_eq!(file.category(), Category::Update);
        for k in &present {
            assert!(file.contains(*k));
        }
        for k in keys(5000..6000) {
            assert!(!file.contains(k));
        }
        assert_eq!(file.iter().collect::<Vec<_>>(), present);
    }

    #[test]
    fn test_empty_file() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "empty.keys", Category::Load, &[]);
        assert!(file.is_empty());
        assert!(!file.contains(VertexKey::from_text("1")));
    }

    #[test]
    fn test_rejects_unsorted_and_miscounted() {
        let dir = TempDir::new().unwrap();
        let mut ks = keys(0..10);
        ks.reverse();
        let path = dir.path().join("bad.keys");
        assert!(write_key_file(&path, Category::Load, 10, ks).is_err());

        let ks = keys(0..10);
        assert!(write_key_file(&path, Category::Load, 11, ks).is_err());
    }

    #[test]
    fn test_open_rejects_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.keys");
        std::fs::write(&path, b"NOPE0000000000000000000000000000").unwrap();
        let err = KeyFile::open(&path).unwrap_err();
        assert!(matches!(err, SplitError::InvalidFormat(_)));

        let file = write(&dir, "ok.keys", Category::Load, &keys(0..4));
        let mut bytes = std::fs::read(file.path()).unwrap();
        bytes.truncate(bytes.len() - 3);
        let cut = dir.path().join("cut.keys");
        std::fs::write(&cut, bytes).unwrap();
        assert!(KeyFile::open(&cut).is_err());
    }

    #[test]
    fn test_open_rejects_overflowing_counts() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "ok.keys", Category::Load, &keys(0..4));
        let mut bytes = std::fs::read(file.path()).unwrap();
        bytes[16..24].copy_from_slice(&u64::MAX.to_le_bytes());
        let huge = dir.path().join("huge.keys");
        std::fs::write(&huge, &bytes).unwrap();
        assert!(matches!(KeyFile::open(&huge), Err(SplitError::InvalidFormat(_))));

        bytes[16..24].copy_from_slice(&4u64.to_le_bytes());
        bytes[24..32].copy_from_slice(&u64::MAX.to_le_bytes());
        std::fs::write(&huge, &bytes).unwrap();
        assert!(matches!(KeyFile::open(&huge), Err(SplitError::InvalidFormat(_))));
    }

    #[test]
    fn test_merge_sorted_interleaves_and_dedups() {
        let dir = TempDir::new().unwrap();
        let all = keys(0..300);
        let a: Vec<VertexKey> = all.iter().copied().step_by(2).collect();
        let b: Vec<VertexKey> = all.iter().copied().skip(1).step_by(2).collect();
        let c: Vec<VertexKey> = all[..10].to_vec();

        let fa = write(&dir, "a.keys", Category::Load, &a);
        let fb = write(&dir, "b.keys", Category::Load, &b);
        let fc = write(&dir, "c.keys", Category::Load, &c);
        let fe = write(&dir, "e.keys", Category::Load, &[]);

        let merged: Vec<VertexKey> = merge_sorted(&[&fa, &fb, &fc, &fe]).collect();
        assert_eq!(merged, all);
    }
}

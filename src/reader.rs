//! Streaming record reader for graph documents.
//!
//! A graph document is a JSON object holding a `vertices` array and an
//! `edges` array. Neither array is ever materialized: a parser thread drives
//! serde_json over the file and hands records one at a time through a
//! bounded channel, so memory stays proportional to one record plus the
//! channel depth.
//!
//! A `RecordStream` is forward-only and cannot be restarted. Reading a second
//! section means opening a new stream, which scans the file again.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};

use crate::error::{Result, SplitError};
use crate::record::Record;

/// Records buffered between the parser thread and the consumer.
const CHANNEL_DEPTH: usize = 1024;

/// Read buffer for the input file.
const READ_BUFFER: usize = 1 << 20;

/// Error text used when the consumer hangs up mid-stream.
const CONSUMER_GONE: &str = "record stream receiver dropped";

/// Top-level array of a graph document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Vertices,
    Edges,
}

impl Section {
    pub fn key(self) -> &'static str {
        match self {
            Section::Vertices => "vertices",
            Section::Edges => "edges",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ── GraphReader ────────────────────────────────────────────────────

/// Handle on a graph document; each `records()` call is a fresh scan.
#[derive(Debug, Clone)]
pub struct GraphReader {
    path: PathBuf,
}

impl GraphReader {
    /// Check that `path` is readable. Parsing starts lazily per stream.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        File::open(&path).map_err(|e| SplitError::io_at(&path, e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream the records of one section. An absent section yields nothing.
    pub fn records(&self, section: Section) -> Result<RecordStream> {
        RecordStream::spawn(&self.path, Target::Section(section.key()))
    }
}

/// Stream the records of a document whose top level is an array.
pub fn read_array(path: impl AsRef<Path>) -> Result<RecordStream> {
    RecordStream::spawn(path.as_ref(), Target::Array)
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Section(&'static str),
    Array,
}

// ── RecordStream ───────────────────────────────────────────────────

/// Lazy, forward-only sequence of records.
///
/// Yields `Err` at most once: the first parse or I/O error ends the stream.
pub struct RecordStream {
    rx: Receiver<Result<Record>>,
    producer: Option<JoinHandle<()>>,
    label: String,
    done: bool,
}

impl RecordStream {
    fn spawn(path: &Path, target: Target) -> Result<Self> {
        let file = File::open(path).map_err(|e| SplitError::io_at(path, e))?;
        let (tx, rx) = bounded(CHANNEL_DEPTH);
        let label = match target {
            Target::Section(key) => format!("`{}` of {}", key, path.display()),
            Target::Array => path.display().to_string(),
        };

        let producer = std::thread::Builder::new()
            .name("record-reader".to_string())
            .spawn(move || produce(file, target, tx))?;

        Ok(Self {
            rx,
            producer: Some(producer),
            label,
            done: false,
        })
    }
}

impl Iterator for RecordStream {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.rx.recv() {
            Ok(item) => {
                if item.is_err() {
                    self.done = true;
                }
                Some(item)
            }
            Err(_) => {
                // Channel closed: the producer either finished or panicked.
                self.done = true;
                let panicked = self
                    .producer
                    .take()
                    .map(|handle| handle.join().is_err())
                    .unwrap_or(false);
                if panicked {
                    Some(Err(SplitError::ReaderPanicked(self.label.clone())))
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStream")
            .field("label", &self.label)
            .field("done", &self.done)
            .finish()
    }
}

/// Parser thread body.
fn produce(file: File, target: Target, tx: Sender<Result<Record>>) {
    let mut de = serde_json::Deserializer::from_reader(BufReader::with_capacity(READ_BUFFER, file));
    let parsed = match target {
        Target::Section(key) => DocumentSeed { section: key, tx: &tx }.deserialize(&mut de),
        Target::Array => ArraySeed { tx: &tx }.deserialize(&mut de),
    };
    let result = parsed.and_then(|()| de.end());

    if let Err(e) = result {
        // Fails only if the consumer already hung up.
        let _ = tx.send(Err(SplitError::Json(e)));
    }
}

// ── Visitors ───────────────────────────────────────────────────────

/// Walks the top-level object, streaming one key and skipping the rest.
struct DocumentSeed<'a> {
    section: &'static str,
    tx: &'a Sender<Result<Record>>,
}

impl<'de> DeserializeSeed<'de> for DocumentSeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for DocumentSeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a graph document object with a `{}` array", self.section)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<(), A::Error> {
        let mut streamed = false;
        while let Some(key) = map.next_key::<String>()? {
            if !streamed && key == self.section {
                map.next_value_seed(ArraySeed { tx: self.tx })?;
                streamed = true;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

/// Sends every element of an array of objects down the channel.
struct ArraySeed<'a> {
    tx: &'a Sender<Result<Record>>,
}

impl<'de> DeserializeSeed<'de> for ArraySeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ArraySeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of record objects")
    }

    // `"edges": null` reads as an empty section.
    fn visit_unit<E: de::Error>(self) -> std::result::Result<(), E> {
        Ok(())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        while let Some(record) = seq.next_element::<Record>()? {
            self.tx
                .send(Ok(record))
                .map_err(|_| de::Error::custom(CONSUMER_GONE))?;
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────

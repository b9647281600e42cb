//! Ordered fragment handoff between the extraction pipeline and the aggregator

use super::error::AggregateError;
use std::collections::{BTreeMap, VecDeque};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One fragment as produced, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFragment {
    pub sequence: u64,
    pub text: String,
}

impl RawFragment {
    pub fn new(sequence: u64, text: impl Into<String>) -> Self {
        Self {
            sequence,
            text: text.into(),
        }
    }
}

/// An ordered stream of fragments backed by transient storage.
///
/// `next_fragment` yields fragments in emission order. A fragment that
/// cannot be read is reported as `AggregateError::Unreadable` and the stream
/// moves past it; other errors end the stream. Each consumed
/// fragment is acknowledged, which releases its storage; `purge` releases
/// everything left and may be called any number of times.
pub trait FragmentSource {
    fn next_fragment(&mut self) -> Result<Option<RawFragment>, AggregateError>;

    fn acknowledge(&mut self, sequence: u64) -> Result<(), AggregateError>;

    fn purge(&mut self) -> Result<(), AggregateError>;
}

/// Fragments written as numbered files (`0.txt`, `1.txt`, ...) in one
/// directory, consumed in numeric order.
///
/// Files whose names aren't `<n>.txt` are ignored. A missing directory is an
/// empty run. Purging removes the directory.
#[derive(Debug)]
pub struct DirectoryFragments {
    dir: PathBuf,
    pending: VecDeque<(u64, PathBuf)>,
    delivered: BTreeMap<u64, PathBuf>,
}

impl DirectoryFragments {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, AggregateError> {
        let dir = dir.into();
        let mut numbered = Vec::new();

        match std::fs::read_dir(&dir) {
            Ok(entries) => {
                for entry in entries {
                    let path = entry?.path();
                    if let Some(sequence) = fragment_number(&path) {
                        numbered.push((sequence, path));
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "fragment directory absent; empty run");
            }
            Err(e) => return Err(e.into()),
        }

        numbered.sort_by_key(|(sequence, _)| *sequence);
        Ok(Self {
            dir,
            pending: numbered.into(),
            delivered: BTreeMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fragments not yet yielded
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

fn fragment_number(path: &Path) -> Option<u64> {
    if !path.is_file() || path.extension()? != "txt" {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

impl FragmentSource for DirectoryFragments {
    fn next_fragment(&mut self) -> Result<Option<RawFragment>, AggregateError> {
        let Some((sequence, path)) = self.pending.pop_front() else {
            return Ok(None);
        };
        // Invalid UTF-8 is left for the parser to reject as a bad fragment
        let bytes = std::fs::read(&path)
            .map_err(|source| AggregateError::Unreadable { sequence, source })?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        self.delivered.insert(sequence, path);
        Ok(Some(RawFragment { sequence, text }))
    }

    fn acknowledge(&mut self, sequence: u64) -> Result<(), AggregateError> {
        if let Some(path) = self.delivered.remove(&sequence) {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn purge(&mut self) -> Result<(), AggregateError> {
        self.pending.clear();
        self.delivered.clear();
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process ordered queue of fragments.
#[derive(Debug, Default)]
pub struct MemoryFragments {
    queue: VecDeque<RawFragment>,
    acknowledged: Vec<u64>,
    purges: usize,
}

impl MemoryFragments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue texts with sequence numbers 0, 1, 2, ...
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| RawFragment::new(i as u64, text))
            .collect();
        Self {
            queue,
            ..Self::default()
        }
    }

    pub fn push(&mut self, fragment: RawFragment) {
        self.queue.push_back(fragment);
    }

    pub fn acknowledged(&self) -> &[u64] {
        &self.acknowledged
    }

    pub fn purges(&self) -> usize {
        self.purges
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl FragmentSource for MemoryFragments {
    fn next_fragment(&mut self) -> Result<Option<RawFragment>, AggregateError> {
        Ok(self.queue.pop_front())
    }

    fn acknowledge(&mut self, sequence: u64) -> Result<(), AggregateError> {
        self.acknowledged.push(sequence);
        Ok(())
    }

    fn purge(&mut self) -> Result<(), AggregateError> {
        self.queue.clear();
        self.purges += 1;
        Ok(())
    }
}

//! Disk-backed shard buffers
//!
//! Every (category, shard) pair gets its own anonymous temporary file. One
//! worker appends to it during processing; `drain` hands the files back in
//! ascending shard order for a single sequential read. The files disappear
//! when their reader is dropped.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

type SharedSpool = Arc<Mutex<Option<RowSpool>>>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Append-only line buffer for one (category, shard) pair
#[derive(Debug)]
pub struct RowSpool {
    category: String,
    shard: usize,
    writer: BufWriter<File>,
    rows: usize,
}

impl RowSpool {
    pub fn create(category: &str, shard: usize, dir: Option<&PathBuf>) -> Result<Self> {
        let file = match dir {
            Some(dir) => tempfile::tempfile_in(dir),
            None => tempfile::tempfile(),
        }
        .map_err(|source| Error::Spool {
            category: category.to_string(),
            shard,
            source,
        })?;

        Ok(RowSpool {
            category: category.to_string(),
            shard,
            writer: BufWriter::new(file),
            rows: 0,
        })
    }

    /// Append one encoded row; `line` must not contain a trailing newline
    pub fn append_line(&mut self, line: &str) -> Result<()> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .map_err(|source| self.error(source))?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush, rewind and switch to reading
    pub fn into_reader(self) -> Result<SpoolReader> {
        let RowSpool {
            category,
            shard,
            writer,
            rows,
        } = self;

        let mut file = writer.into_inner().map_err(|e| Error::Spool {
            category: category.clone(),
            shard,
            source: e.into_error(),
        })?;
        file.seek(SeekFrom::Start(0)).map_err(|source| Error::Spool {
            category: category.clone(),
            shard,
            source,
        })?;

        Ok(SpoolReader {
            category,
            shard,
            rows,
            reader: BufReader::new(file),
        })
    }

    fn error(&self, source: io::Error) -> Error {
        Error::Spool {
            category: self.category.clone(),
            shard: self.shard,
            source,
        }
    }
}

/// Sequential reader over a finished spool
#[derive(Debug)]
pub struct SpoolReader {
    category: String,
    shard: usize,
    rows: usize,
    reader: BufReader<File>,
}

impl SpoolReader {
    pub fn shard(&self) -> usize {
        self.shard
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Copy the raw buffered bytes into the artifact at `dest`
    pub fn copy_to<W: Write>(&mut self, out: &mut W, dest: &Path) -> Result<()> {
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = match self.reader.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => return Err(self.error(source)),
            };
            out.write_all(&buf[..n]).map_err(|source| Error::Artifact {
                path: dest.to_path_buf(),
                source,
            })?;
        }
    }

    /// Iterate the buffered lines in append order
    pub fn lines(self) -> impl Iterator<Item = Result<String>> {
        let SpoolReader {
            category,
            shard,
            reader,
            ..
        } = self;
        reader.lines().map(move |line| {
            line.map_err(|source| Error::Spool {
                category: category.clone(),
                shard,
                source,
            })
        })
    }

    fn error(&self, source: io::Error) -> Error {
        Error::Spool {
            category: self.category.clone(),
            shard: self.shard,
            source,
        }
    }
}

/// The shard buffers of one category, created lazily on first append
#[derive(Debug)]
pub struct ShardSpools {
    category: String,
    dir: Option<PathBuf>,
    shards: Mutex<BTreeMap<usize, SharedSpool>>,
}

impl ShardSpools {
    pub fn new(category: &str, dir: Option<PathBuf>) -> Self {
        ShardSpools {
            category: category.to_string(),
            dir,
            shards: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn set_category(&mut self, category: &str) {
        self.category = category.to_string();
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Append a line to the buffer of `shard`, creating it on first use
    pub fn append(&self, shard: usize, line: &str) -> Result<()> {
        let spool = self.spool_for(shard)?;
        let mut guard = lock(&spool);
        match guard.as_mut() {
            Some(spool) => spool.append_line(line),
            None => Err(Error::Spool {
                category: self.category.clone(),
                shard,
                source: io::Error::new(io::ErrorKind::Other, "shard buffer already drained"),
            }),
        }
    }

    fn spool_for(&self, shard: usize) -> Result<SharedSpool> {
        let mut shards = lock(&self.shards);
        if let Some(existing) = shards.get(&shard) {
            return Ok(Arc::clone(existing));
        }

        let spool = RowSpool::create(&self.category, shard, self.dir.as_ref())?;
        debug!(category = %self.category, shard, "created shard buffer");
        let shared = Arc::new(Mutex::new(Some(spool)));
        shards.insert(shard, Arc::clone(&shared));
        Ok(shared)
    }

    /// Total rows appended across all shards
    pub fn rows(&self) -> usize {
        lock(&self.shards)
            .values()
            .map(|spool| lock(spool).as_ref().map_or(0, RowSpool::rows))
            .sum()
    }

    /// Take every buffer, in ascending shard order, ready for reading
    pub fn drain(&self) -> Result<Vec<SpoolReader>> {
        let shards = std::mem::take(&mut *lock(&self.shards));
        shards
            .into_values()
            .filter_map(|spool| {
                let taken = lock(&spool).take();
                taken
            })
            .map(RowSpool::into_reader)
            .collect()
    }
}

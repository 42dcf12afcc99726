//! On-disk track cache.
//!
//! The cache is a single flat file of back-to-back binary records (see
//! `record.rs`). Records are only ever appended; updating a track
//! logically deletes its old record and re-appends it at the end.
//! Removing any record other than the last one compacts the file in
//! place by shifting everything after it leftward.
//!
//! The in-memory index maps uri -> byte offset and is the single
//! authority for offsets. Index and file must always mutate together,
//! so every entry point holds the store mutex for its full duration,
//! including the blocking file I/O.
//!
//! Failure policy: a failed append is rolled back by truncation; a
//! failure in the middle of a compaction leaves the file untrustworthy,
//! so the store flags itself for a rebuild from the source directory.
//! The file is always mutated before the index, so a confirmed index
//! state never points past the end of the file.

mod record;


use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use log::{debug, error};

use crate::error::{EngineError, Result};
use crate::track::{Track, TrackHandle};

/// File name of the cache inside the media directory.
pub const CACHE_FILE_NAME: &str = "media.cache";

/// Buffer size of the compaction copy loop.
const COPY_BUF_LEN: usize = 8192;

pub struct CacheStore {
    enabled: bool,
    embed_images: bool,
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    /// uri -> byte offset of the record start. Offsets are unique and,
    /// read in file order, strictly increasing with no gaps.
    index: BTreeMap<String, u64>,
    needs_rebuild: bool,
}

/// `Read` adapter that tracks the absolute offset consumed so far, so the
/// sequential scan can record exact record offsets without re-seeking.
struct CountingReader<R> {
    inner: R,
    pos: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl CacheStore {
    /// Open (creating if missing) the cache file at `path`. A disabled
    /// store never touches the filesystem and turns every operation into
    /// a no-op.
    pub fn open(path: impl Into<PathBuf>, enabled: bool, embed_images: bool) -> Result<Self> {
        let path = path.into();
        if enabled && !path.exists() {
            File::create(&path)?;
        }
        Ok(Self {
            enabled,
            embed_images,
            inner: Mutex::new(StoreInner {
                path,
                index: BTreeMap::new(),
                needs_rebuild: false,
            }),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True once a truncated or malformed record was hit; the caller is
    /// expected to discard the file and repopulate from the source
    /// directory (see [`CacheStore::rebuild_from`]).
    pub fn needs_rebuild(&self) -> bool {
        self.lock().needs_rebuild
    }

    pub fn record_count(&self) -> usize {
        self.lock().index.len()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.lock().index.contains_key(uri)
    }

    /// Byte offset of the record for `uri`, if cached.
    pub fn offset_of(&self, uri: &str) -> Option<u64> {
        self.lock().index.get(uri).copied()
    }

    /// Append one track record. An existing record for the same uri is
    /// removed first, so the record always migrates to the end of the
    /// file.
    pub fn cache(&self, track: &TrackHandle) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut inner = self.lock();
        if inner.index.contains_key(track.uri()) {
            inner.remove_record(track.uri())?;
        }
        inner.append(track, self.embed_images)
    }

    /// Bulk append under a single file handle. Only meant for initial
    /// population and rebuilds; tracks already present are skipped.
    pub fn cache_all(&self, tracks: &[TrackHandle]) -> Result<()> {
        if !self.enabled || tracks.is_empty() {
            return Ok(());
        }
        let mut inner = self.lock();
        let mut file = OpenOptions::new().read(true).write(true).open(&inner.path)?;
        let mut offset = file.seek(SeekFrom::End(0))?;
        for track in tracks {
            if inner.index.contains_key(track.uri()) {
                debug!("cache_all: {} already cached, skipping", track.uri());
                continue;
            }
            let mut buf = Vec::new();
            record::write_record(&mut buf, track.uri(), &track.meta(), self.embed_images)?;
            if let Err(e) = file.write_all(&buf) {
                error!("cache_all: write failed for {}: {e}", track.uri());
                // Drop the partial tail so the confirmed records stay valid.
                if file.set_len(offset).is_err() {
                    inner.needs_rebuild = true;
                }
                return Err(e.into());
            }
            inner.index.insert(track.uri().to_string(), offset);
            offset += buf.len() as u64;
        }
        Ok(())
    }

    /// Remove the record for `uri`, compacting the file when the record
    /// is not the last one. Unknown uris are a no-op.
    pub fn remove(&self, uri: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.lock().remove_record(uri)
    }

    /// Sequentially deserialize the whole file from offset 0, rebuilding
    /// the index as it goes. `progress(processed, total)` is invoked
    /// after each record, with `total` supplied by the caller (usually
    /// a file count of the media directory).
    ///
    /// A truncated or malformed record aborts the scan and flags the
    /// store for rebuild; records read up to that point are still
    /// returned.
    pub fn retrieve_all<F>(&self, total: usize, mut progress: F) -> Result<Vec<TrackHandle>>
    where
        F: FnMut(usize, usize),
    {
        if !self.enabled {
            return Ok(Vec::new());
        }
        let mut inner = self.lock();
        inner.index.clear();

        let file = File::open(&inner.path)?;
        let file_len = file.metadata()?.len();
        let mut reader = CountingReader {
            inner: BufReader::new(file),
            pos: 0,
        };

        let mut tracks = Vec::new();
        while reader.pos < file_len {
            let offset = reader.pos;
            match record::read_record(&mut reader) {
                Ok((uri, meta)) => {
                    inner.index.insert(uri.clone(), offset);
                    tracks.push(Track::new(uri, meta));
                    progress(tracks.len(), total);
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData
                    ) =>
                {
                    error!("cache record at offset {offset} is corrupt, marking for rebuild: {e}");
                    inner.needs_rebuild = true;
                    break;
                }
                Err(e) => {
                    error!("cache scan failed at offset {offset}: {e}");
                    return Err(e.into());
                }
            }
        }
        Ok(tracks)
    }

    /// Look up one record by uri and deserialize it.
    pub fn retrieve(&self, uri: &str) -> Result<TrackHandle> {
        let inner = self.lock();
        let offset = *inner
            .index
            .get(uri)
            .ok_or_else(|| EngineError::NotCached(uri.to_string()))?;
        let mut file = File::open(&inner.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let (read_uri, meta) = record::read_record(&mut BufReader::new(file)).map_err(|e| {
            EngineError::MalformedRecord {
                offset,
                reason: e.to_string(),
            }
        })?;
        if read_uri != uri {
            return Err(EngineError::MalformedRecord {
                offset,
                reason: format!("index points at record for {read_uri}"),
            });
        }
        Ok(Track::new(read_uri, meta))
    }

    /// Truncate the file and drop the index.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.lock();
        if self.enabled {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&inner.path)?;
        }
        inner.index.clear();
        inner.needs_rebuild = false;
        Ok(())
    }

    /// Discard the current file and repopulate it from `tracks`.
    pub fn rebuild_from(&self, tracks: &[TrackHandle]) -> Result<()> {
        self.clear()?;
        self.cache_all(tracks)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StoreInner {
    fn append(&mut self, track: &TrackHandle, embed_images: bool) -> Result<()> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let offset = file.seek(SeekFrom::End(0))?;

        let mut buf = Vec::new();
        record::write_record(&mut buf, track.uri(), &track.meta(), embed_images)?;
        if let Err(e) = file.write_all(&buf) {
            error!("cache append failed for {}: {e}", track.uri());
            if file.set_len(offset).is_err() {
                self.needs_rebuild = true;
            }
            return Err(e.into());
        }
        self.index.insert(track.uri().to_string(), offset);
        Ok(())
    }

    fn remove_record(&mut self, uri: &str) -> Result<()> {
        let Some(offset) = self.index.get(uri).copied() else {
            return Ok(());
        };

        // The record's extent ends at the next record, or at end-of-file
        // when it is the last one.
        let next_offset = self.index.values().copied().filter(|&o| o > offset).min();

        match next_offset {
            None => {
                // Last record: a plain truncation suffices.
                let file = OpenOptions::new().write(true).open(&self.path)?;
                if let Err(e) = file.set_len(offset) {
                    error!("cache truncation failed for {uri}: {e}");
                    self.needs_rebuild = true;
                    return Err(e.into());
                }
                self.index.remove(uri);
                Ok(())
            }
            Some(next) => {
                let delta = next - offset;
                if let Err(e) = self.compact(offset, delta) {
                    // The copy loop may have stopped halfway; nothing
                    // after `offset` can be trusted any more.
                    error!("cache compaction failed for {uri}: {e}");
                    self.needs_rebuild = true;
                    return Err(e.into());
                }
                // File mutation confirmed; now rebase the index.
                self.index.remove(uri);
                for o in self.index.values_mut() {
                    if *o > offset {
                        *o -= delta;
                    }
                }
                Ok(())
            }
        }
    }

    /// Shift every byte after `offset + delta` leftward by `delta` with a
    /// fixed-size buffer, then truncate the file by `delta`.
    fn compact(&self, offset: u64, delta: u64) -> io::Result<()> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let file_len = file.metadata()?.len();

        let mut read_pos = offset + delta;
        let mut write_pos = offset;
        let mut buf = [0u8; COPY_BUF_LEN];
        loop {
            file.seek(SeekFrom::Start(read_pos))?;
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            file.seek(SeekFrom::Start(write_pos))?;
            file.write_all(&buf[..n])?;
            read_pos += n as u64;
            write_pos += n as u64;
        }
        file.set_len(file_len - delta)
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CacheStore")
            .field("path", &inner.path)
            .field("enabled", &self.enabled)
            .field("records", &inner.index.len())
            .field("needs_rebuild", &inner.needs_rebuild)
            .finish()
    }
}

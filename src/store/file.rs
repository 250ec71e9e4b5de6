//! Single-file block store with named roots
//!
//! File format:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("BLOOMTRE")
//!   - version: 4 bytes (u32 LE)
//!   - flags: 4 bytes
//!   - block_count: 8 bytes (u64 LE)
//!   - index_offset: 8 bytes (u64 LE)
//!   - roots_offset: 8 bytes (u64 LE)
//!   - roots_count: 8 bytes (u64 LE)
//!   - reserved: 16 bytes
//!
//! [BLOCKS: variable]
//!   - encoded blocks, concatenated
//!
//! [INDEX: variable]
//!   - (hash, offset, size) entries sorted by hash
//!
//! [ROOTS: variable]
//!   - root names → tree root hashes
//! ```
//!
//! The index and roots are rewritten by [`FileStore::sync`]. New blocks are
//! appended where the index starts, so the first append after opening
//! overwrites the on-disk index while the header still points at it. Until
//! the next sync the file cannot be reopened reliably, and a crash in that window
//! loses the whole index, not only the new blocks.

use super::{verify, Block, BlockStore, Hash, DEFAULT_COMPRESSION_LEVEL};
use crate::{Error, Result, MAGIC, VERSION};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const HEADER_SIZE: u64 = 64;
const INDEX_ENTRY_SIZE: usize = 44;

#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

/// A content-addressed block store backed by a single file
pub struct FileStore {
    path: PathBuf,
    file: RwLock<File>,
    index: RwLock<HashMap<Hash, IndexEntry>>,
    /// Named tree roots (e.g. "seq/todo" → root block)
    roots: RwLock<HashMap<String, Hash>>,
    write_offset: RwLock<u64>,
    level: i32,
}

fn read_u64(header: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&header[at..at + 8]);
    u64::from_le_bytes(buf)
}

impl FileStore {
    /// Create a new store file, truncating any existing one
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&VERSION.to_le_bytes());
        file.write_all(&header)?;
        file.sync_all()?;

        tracing::debug!(path = %path.display(), "created block store");

        Ok(FileStore {
            path,
            file: RwLock::new(file),
            index: RwLock::new(HashMap::new()),
            roots: RwLock::new(HashMap::new()),
            write_offset: RwLock::new(HEADER_SIZE),
            level: DEFAULT_COMPRESSION_LEVEL,
        })
    }

    /// Open an existing store file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)
            .map_err(|_| Error::InvalidFile("Truncated header".into()))?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("Invalid magic bytes".into()));
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&header[8..12]);
        let version = u32::from_le_bytes(version);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }

        let block_count = read_u64(&header, 16);
        let index_offset = read_u64(&header, 24);
        let roots_offset = read_u64(&header, 32);
        let roots_count = read_u64(&header, 40);

        let mut index = HashMap::new();
        if index_offset > 0 && block_count > 0 {
            file.seek(SeekFrom::Start(index_offset))?;
            for _ in 0..block_count {
                let mut entry = [0u8; INDEX_ENTRY_SIZE];
                file.read_exact(&mut entry)?;

                let mut hash_bytes = [0u8; 32];
                hash_bytes.copy_from_slice(&entry[0..32]);
                let offset = read_u64(&entry, 32);
                let mut size = [0u8; 4];
                size.copy_from_slice(&entry[40..44]);

                index.insert(
                    Hash::from_bytes(hash_bytes),
                    IndexEntry {
                        offset,
                        size: u32::from_le_bytes(size),
                    },
                );
            }
        }

        let mut roots = HashMap::new();
        if roots_offset > 0 && roots_count > 0 {
            file.seek(SeekFrom::Start(roots_offset))?;
            for _ in 0..roots_count {
                let mut len_buf = [0u8; 2];
                file.read_exact(&mut len_buf)?;
                let mut name_buf = vec![0u8; u16::from_le_bytes(len_buf) as usize];
                file.read_exact(&mut name_buf)?;
                let name = String::from_utf8(name_buf)
                    .map_err(|_| Error::InvalidFile("Root name is not UTF-8".into()))?;

                let mut hash_buf = [0u8; 32];
                file.read_exact(&mut hash_buf)?;

                roots.insert(name, Hash::from_bytes(hash_buf));
            }
        }

        // Blocks end where the index starts
        let write_offset = if index_offset > 0 {
            index_offset
        } else {
            file.seek(SeekFrom::End(0))?
        };

        tracing::debug!(
            path = %path.display(),
            blocks = index.len(),
            roots = roots.len(),
            "opened block store"
        );

        Ok(FileStore {
            path,
            file: RwLock::new(file),
            index: RwLock::new(index),
            roots: RwLock::new(roots),
            write_offset: RwLock::new(write_offset),
            level: DEFAULT_COMPRESSION_LEVEL,
        })
    }

    /// Open the store if the file exists, otherwise create it
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Set the zstd level used for blocks written from now on
    pub fn with_compression(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    // === Named roots ===

    /// Root hash stored under `name`
    pub fn root(&self, name: &str) -> Option<Hash> {
        self.roots.read().get(name).copied()
    }

    /// Point `name` at a tree root. `Hash::ZERO` records an empty tree.
    pub fn set_root(&self, name: &str, hash: Hash) {
        tracing::debug!(root = name, hash = %hash.short(), "updated root");
        self.roots.write().insert(name.to_string(), hash);
    }

    /// Forget a named root. The blocks it pointed at stay in the file.
    pub fn remove_root(&self, name: &str) -> Result<Hash> {
        self.roots
            .write()
            .remove(name)
            .ok_or_else(|| Error::RootNotFound(name.to_string()))
    }

    /// All named roots, sorted by name
    pub fn list_roots(&self) -> Vec<(String, Hash)> {
        let mut roots: Vec<_> = self
            .roots
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        roots.sort();
        roots
    }

    /// Number of blocks in the store
    pub fn block_count(&self) -> usize {
        self.index.read().len()
    }

    /// Write the index, roots and header so the file can be reopened
    pub fn sync(&self) -> Result<()> {
        let index = self.index.read();
        let roots = self.roots.read();
        let write_offset = *self.write_offset.read();
        let mut file = self.file.write();

        let roots_offset = write_offset + (index.len() * INDEX_ENTRY_SIZE) as u64;

        file.seek(SeekFrom::Start(16))?;
        file.write_all(&(index.len() as u64).to_le_bytes())?;
        file.write_all(&write_offset.to_le_bytes())?;
        file.write_all(&roots_offset.to_le_bytes())?;
        file.write_all(&(roots.len() as u64).to_le_bytes())?;

        file.seek(SeekFrom::Start(write_offset))?;

        let mut entries: Vec<_> = index.iter().collect();
        entries.sort_by_key(|(h, _)| **h);

        for (hash, entry) in entries {
            file.write_all(hash.as_bytes())?;
            file.write_all(&entry.offset.to_le_bytes())?;
            file.write_all(&entry.size.to_le_bytes())?;
        }

        let mut root_list: Vec<_> = roots.iter().collect();
        root_list.sort_by_key(|(name, _)| *name);

        for (name, hash) in root_list {
            let name_bytes = name.as_bytes();
            file.write_all(&(name_bytes.len() as u16).to_le_bytes())?;
            file.write_all(name_bytes)?;
            file.write_all(hash.as_bytes())?;
        }

        // Drop anything left over from a longer previous trailer
        let end = file.stream_position()?;
        file.set_len(end)?;
        file.sync_all()?;

        tracing::debug!(blocks = index.len(), roots = roots.len(), "synced block store");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockStore for FileStore {
    fn put(&self, block: &Block) -> Result<Hash> {
        let (hash, bytes) = block.encode(self.level)?;

        if self.index.read().contains_key(&hash) {
            return Ok(hash);
        }

        let size = bytes.len() as u32;
        let offset = {
            let mut write_offset = self.write_offset.write();
            let offset = *write_offset;

            let mut file = self.file.write();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&bytes)?;

            *write_offset = offset + size as u64;
            offset
        };

        self.index.write().insert(hash, IndexEntry { offset, size });
        tracing::trace!(hash = %hash.short(), kind = ?block.kind, size, "appended block");

        Ok(hash)
    }

    fn get(&self, hash: &Hash) -> Result<Block> {
        let entry = self
            .index
            .read()
            .get(hash)
            .copied()
            .ok_or(Error::NotFound(*hash))?;

        let mut data = vec![0u8; entry.size as usize];
        {
            let mut file = self.file.write();
            file.seek(SeekFrom::Start(entry.offset))?;
            file.read_exact(&mut data)?;
        }

        verify(hash, &data)
    }

    fn contains(&self, hash: &Hash) -> bool {
        self.index.read().contains_key(hash)
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        if let Err(error) = self.sync() {
            tracing::warn!(%error, "failed to sync block store on drop");
        }
    }
}

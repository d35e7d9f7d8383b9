//! Open files and directories.
//!
//! A handle owns its entry, the cluster chain resolved when it was opened,
//! and its own cursor. Handles borrow the [`FileSystem`] immutably, so any
//! number of them can be open at once.

use alloc::vec::Vec;
use blockdev::BlockDev;
use embedded_io::SeekFrom;

use crate::dir::{DirEntry, EntryDecoder, Slot};
use crate::{FileSystem, FsError};
use crate::boot::{DIR_ENTRY_SIZE, FatType};

/// Apply `pos` to a cursor at `cur` in an object of `len` bytes.
fn seek_target(cur: u64, len: u64, pos: SeekFrom) -> Result<u64, FsError> {
    let target = match pos {
        SeekFrom::Start(n) => Some(n),
        SeekFrom::Current(d) => cur.checked_add_signed(d),
        SeekFrom::End(d) => len.checked_add_signed(d),
    };
    target.ok_or(FsError::InvalidSeek)
}

// ─── Files ─────────────────────────────────────────────────────────────────────

pub struct File<'a, D> {
    fs:    &'a FileSystem<D>,
    entry: DirEntry,
    chain: Vec<u32>,
    pos:   u64,
}

impl<'a, D: BlockDev> File<'a, D> {
    pub(crate) fn new(fs: &'a FileSystem<D>, entry: DirEntry) -> Result<Self, FsError> {
        let chain = fs.clusters_for(entry.first_cluster())?;
        Ok(Self { fs, entry, chain, pos: 0 })
    }

    pub fn entry(&self) -> &DirEntry {
        &self.entry
    }

    /// Clusters holding the file's data, in order.
    pub fn clusters(&self) -> &[u32] {
        &self.chain
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Read from the cursor. Returns `Ok(0)` at end of file.
    ///
    /// When the chain is shorter than the file size the bytes before the
    /// gap are returned first and the following call fails with
    /// `CorruptChain`.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        let geo = self.fs.geometry();
        let cluster_bytes = geo.cluster_bytes();
        let size = self.entry.len();
        let mut done = 0;

        while done < buf.len() && self.pos < size {
            let index = (self.pos / cluster_bytes) as usize;
            let within = self.pos % cluster_bytes;
            let Some(&cluster) = self.chain.get(index) else {
                if done > 0 {
                    break;
                }
                return Err(FsError::CorruptChain { index });
            };

            let n = (buf.len() - done)
                .min((cluster_bytes - within) as usize)
                .min((size - self.pos) as usize);
            self.fs
                .device()
                .read_at(geo.cluster_start(cluster) + within, &mut buf[done..done + n])?;
            done += n;
            self.pos += n as u64;
        }
        Ok(done)
    }

    /// Read from the cursor to end of file.
    pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize, FsError> {
        let start = out.len();
        let remaining = self.entry.len().saturating_sub(self.pos) as usize;
        out.resize(start + remaining, 0);
        let mut filled = start;
        while filled < out.len() {
            match self.read(&mut out[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        out.truncate(filled);
        Ok(filled - start)
    }

    /// Move the cursor. Seeking past the end is allowed; reads there return 0.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        self.pos = seek_target(self.pos, self.entry.len(), pos)?;
        Ok(self.pos)
    }
}

// ─── Directories ───────────────────────────────────────────────────────────────

/// Where a directory's slots live.
enum Extent {
    /// The fixed FAT12/16 root region.
    Root { start: u64, len: u64 },
    Chain(Vec<u32>),
}

pub struct Dir<'a, D> {
    fs:      &'a FileSystem<D>,
    entry:   DirEntry,
    extent:  Extent,
    /// Index of the next slot to decode.
    slot:    u64,
    decoder: EntryDecoder,
}

impl<'a, D: BlockDev> Dir<'a, D> {
    /// The root directory: the fixed region on FAT12/16, a chain on FAT32.
    pub(crate) fn root(fs: &'a FileSystem<D>) -> Result<Self, FsError> {
        let geo = fs.geometry();
        let extent = match geo.fat_type {
            FatType::Fat32 => Extent::Chain(fs.clusters_for(geo.root_cluster)?),
            FatType::Fat12 | FatType::Fat16 => {
                Extent::Root { start: geo.root_dir_start, len: geo.root_dir_len }
            }
        };
        Ok(Self::with_extent(fs, fs.root_entry(), extent))
    }

    /// A subdirectory. A first cluster outside the data region gives an
    /// empty directory.
    pub(crate) fn new(fs: &'a FileSystem<D>, entry: DirEntry) -> Result<Self, FsError> {
        let extent = Extent::Chain(fs.clusters_for(entry.first_cluster())?);
        Ok(Self::with_extent(fs, entry, extent))
    }

    fn with_extent(fs: &'a FileSystem<D>, entry: DirEntry, extent: Extent) -> Self {
        let decoder = EntryDecoder::new(fs.geometry().fat_type);
        Self { fs, entry, extent, slot: 0, decoder }
    }

    pub fn entry(&self) -> &DirEntry {
        &self.entry
    }

    /// Bytes of slot storage behind this directory.
    fn storage_len(&self) -> u64 {
        match &self.extent {
            Extent::Root { len, .. } => *len,
            Extent::Chain(chain) => chain.len() as u64 * self.fs.geometry().cluster_bytes(),
        }
    }

    /// Device offset of slot `slot`, or `None` past the end of storage.
    fn slot_offset(&self, slot: u64) -> Option<u64> {
        let off = slot.checked_mul(DIR_ENTRY_SIZE)?;
        match &self.extent {
            Extent::Root { start, len } => (off < *len).then(|| start + off),
            Extent::Chain(chain) => {
                let geo = self.fs.geometry();
                let cluster = *chain.get(usize::try_from(off / geo.cluster_bytes()).ok()?)?;
                Some(geo.cluster_start(cluster) + off % geo.cluster_bytes())
            }
        }
    }

    /// Decode up to `n` further entries (`n == 0`: all remaining).
    ///
    /// An empty result means the directory is exhausted. The cursor stops
    /// on the terminating slot, so later calls keep returning nothing.
    pub fn readdir(&mut self, n: usize) -> Result<Vec<DirEntry>, FsError> {
        let mut out = Vec::new();
        let mut raw = [0u8; DIR_ENTRY_SIZE as usize];
        while let Some(offset) = self.slot_offset(self.slot) {
            self.fs.device().read_at(offset, &mut raw)?;
            match self.decoder.feed(&raw) {
                Slot::End => break,
                Slot::Skip => self.slot += 1,
                Slot::Entry(e) => {
                    self.slot += 1;
                    out.push(e);
                    if out.len() == n {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    /// Move the slot cursor, in bytes. `SeekFrom::Start(0)` rewinds.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        let target = seek_target(self.slot * DIR_ENTRY_SIZE, self.storage_len(), pos)?;
        self.slot = target / DIR_ENTRY_SIZE;
        self.decoder.reset();
        Ok(target)
    }
}

// ─── Either ────────────────────────────────────────────────────────────────────

pub enum Handle<'a, D> {
    File(File<'a, D>),
    Directory(Dir<'a, D>),
}

impl<'a, D: BlockDev> Handle<'a, D> {
    pub(crate) fn open(fs: &'a FileSystem<D>, entry: DirEntry) -> Result<Self, FsError> {
        if entry.is_dir() {
            Ok(Handle::Directory(Dir::new(fs, entry)?))
        } else {
            Ok(Handle::File(File::new(fs, entry)?))
        }
    }

    pub fn entry(&self) -> &DirEntry {
        match self {
            Handle::File(f) => f.entry(),
            Handle::Directory(d) => d.entry(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Handle::Directory(_))
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        match self {
            Handle::File(f) => f.read(buf),
            Handle::Directory(_) => Err(FsError::IsADirectory),
        }
    }

    pub fn readdir(&mut self, n: usize) -> Result<Vec<DirEntry>, FsError> {
        match self {
            Handle::File(_) => Err(FsError::NotADirectory),
            Handle::Directory(d) => d.readdir(n),
        }
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        match self {
            Handle::File(f) => f.seek(pos),
            Handle::Directory(d) => d.seek(pos),
        }
    }

    pub fn into_file(self) -> Result<File<'a, D>, FsError> {
        match self {
            Handle::File(f) => Ok(f),
            Handle::Directory(_) => Err(FsError::IsADirectory),
        }
    }

    pub fn into_dir(self) -> Result<Dir<'a, D>, FsError> {
        match self {
            Handle::File(_) => Err(FsError::NotADirectory),
            Handle::Directory(d) => Ok(d),
        }
    }
}

// ─── embedded-io ───────────────────────────────────────────────────────────────

impl<D: BlockDev> embedded_io::ErrorType for File<'_, D> {
    type Error = FsError;
}

impl<D: BlockDev> embedded_io::Read for File<'_, D> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        File::read(self, buf)
    }
}

impl<D: BlockDev> embedded_io::Seek for File<'_, D> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        File::seek(self, pos)
    }
}

impl<D: BlockDev> embedded_io::ErrorType for Handle<'_, D> {
    type Error = FsError;
}

impl<D: BlockDev> embedded_io::Read for Handle<'_, D> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        Handle::read(self, buf)
    }
}

impl<D: BlockDev> embedded_io::Seek for Handle<'_, D> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        Handle::seek(self, pos)
    }
}

// ─── Unit tests ────────────────────────────────────────────────────────────────

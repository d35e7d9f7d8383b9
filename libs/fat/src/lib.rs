//! Read-only FAT12/16/32 filesystem driver.
//!
//! Mount a volume from any [`BlockDev`], then open files and directories by
//! path. The FAT width is derived from the boot sector once at mount time.
//! Corrupt cluster chains are truncated rather than followed, so reads on a
//! damaged volume always terminate.
//!
//! No_std when not testing; `cargo test -p fat` runs on the host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod boot;
mod dir;
mod error;
mod handle;
pub mod path;
mod table;

#[cfg(test)]
mod testimg;

use alloc::string::String;
use alloc::vec::Vec;
use log::debug;
use spin::Mutex;

pub use blockdev::{BlockDev, BlockError, OffsetDev};
pub use boot::{FatType, Geometry};
pub use dir::{Attributes, DirEntry, DosDateTime, lfn_checksum};
pub use embedded_io::SeekFrom;
pub use error::FsError;
pub use handle::{Dir, File, Handle};
pub use table::fat12_entry;

use boot::BOOT_SECTOR_LEN;

/// Mount-time options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsOptions {
    /// Compare path components byte-for-byte instead of case-insensitively.
    pub case_sensitive: bool,
}

// ─── Filesystem ────────────────────────────────────────────────────────────────

pub struct FileSystem<D> {
    dev:      D,
    geometry: Geometry,
    options:  FsOptions,
    /// Working directory, always absolute and normalized.
    cwd:      Mutex<String>,
}

impl<D: BlockDev> FileSystem<D> {
    /// Read the boot sector of `dev` and derive the volume geometry.
    pub fn mount(dev: D, options: FsOptions) -> Result<Self, FsError> {
        let mut sector = [0u8; BOOT_SECTOR_LEN];
        dev.read_at(0, &mut sector)?;
        let geometry = Geometry::parse(&sector)?;

        debug!(
            "fat: mounted FAT{} volume {:?}: {} clusters of {} bytes, data at {:#x}",
            geometry.fat_type.bits(),
            geometry.label,
            geometry.data_clusters,
            geometry.cluster_bytes(),
            geometry.data_start,
        );

        Ok(Self { dev, geometry, options, cwd: Mutex::new(String::from("/")) })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn options(&self) -> &FsOptions {
        &self.options
    }

    pub fn device(&self) -> &D {
        &self.dev
    }

    pub(crate) fn root_entry(&self) -> DirEntry {
        DirEntry::root(self.geometry.root_cluster)
    }

    pub fn root(&self) -> Result<Dir<'_, D>, FsError> {
        Dir::root(self)
    }

    /// Cluster chain starting at `first`; empty when `first` is not a data cluster.
    pub fn clusters_for(&self, first: u32) -> Result<Vec<u32>, FsError> {
        table::cluster_chain(&self.dev, &self.geometry, first)
    }

    /// Open `path` relative to an explicit working directory.
    pub fn resolve(&self, cwd: &str, path: &str) -> Result<Handle<'_, D>, FsError> {
        let path = path::normalize(cwd, path);
        if path::components(&path).next().is_none() {
            return Ok(Handle::Directory(self.root()?));
        }
        Handle::open(self, path::lookup(self, &path)?)
    }

    pub fn open(&self, path: &str) -> Result<Handle<'_, D>, FsError> {
        let cwd = self.getwd();
        self.resolve(&cwd, path)
    }

    /// Entry for `path`. The root is reported as a directory named `/`.
    pub fn stat(&self, path: &str) -> Result<DirEntry, FsError> {
        let cwd = self.getwd();
        path::lookup(self, &path::normalize(&cwd, path))
    }

    pub fn getwd(&self) -> String {
        self.cwd.lock().clone()
    }

    pub fn chdir(&self, path: &str) -> Result<(), FsError> {
        let target = path::normalize(&self.getwd(), path);
        if !path::lookup(self, &target)?.is_dir() {
            return Err(FsError::NotADirectory);
        }
        *self.cwd.lock() = target;
        Ok(())
    }

    pub fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        self.open(path)?.into_dir()?.readdir(0)
    }

    /// Whole contents of the file at `path`.
    pub fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let mut file = self.open(path)?.into_file()?;
        let mut out = Vec::new();
        file.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Fill `buf` from byte `offset` of the file at `path`. The count is
    /// short only when end of file is reached.
    pub fn read_at(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut file = self.open(path)?.into_file()?;
        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(filled)
    }
}

// ─── Unit tests ────────────────────────────────────────────────────────────────

//! Byte-addressed block device abstraction.
//!
//! Everything that reads a disk image goes through [`BlockDev`], which makes
//! the filesystem code unit-testable against an in-memory `Vec<u8>`.
//! [`OffsetDev`] shifts every address by a constant so a volume that starts
//! behind a bootloader or partition table can be addressed from byte 0.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

use alloc::vec::Vec;
use core::fmt;

// ─── Device trait ──────────────────────────────────────────────────────────────

pub trait BlockDev {
    /// Fill all of `buf` with the bytes starting at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), BlockError>;

    /// Write all of `buf` at `offset`. Devices are read-only unless they say otherwise.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<(), BlockError> {
        let _ = (offset, buf);
        Err(BlockError::ReadOnly)
    }
}

/// Block device error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// The access runs past the end of the device.
    OutOfRange,
    /// The backing store failed.
    Io,
    /// The device does not accept writes.
    ReadOnly,
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlockError::OutOfRange => "access past end of device",
            BlockError::Io => "device i/o error",
            BlockError::ReadOnly => "device is read-only",
        })
    }
}

impl core::error::Error for BlockError {}

// ─── In-memory devices ─────────────────────────────────────────────────────────

impl BlockDev for [u8] {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), BlockError> {
        let start = usize::try_from(offset).map_err(|_| BlockError::OutOfRange)?;
        let end = start.checked_add(buf.len()).ok_or(BlockError::OutOfRange)?;
        let src = self.get(start..end).ok_or(BlockError::OutOfRange)?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

impl BlockDev for Vec<u8> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), BlockError> {
        self.as_slice().read_at(offset, buf)
    }
}

impl<T: BlockDev + ?Sized> BlockDev for &T {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), BlockError> {
        (**self).read_at(offset, buf)
    }
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<(), BlockError> {
        (**self).write_at(offset, buf)
    }
}

// ─── Fixed-offset view ─────────────────────────────────────────────────────────

/// A view of `dev` whose byte 0 is `base` on the underlying device.
pub struct OffsetDev<D> {
    dev:  D,
    base: u64,
}

impl<D: BlockDev> OffsetDev<D> {
    pub fn new(dev: D, base: u64) -> Self {
        Self { dev, base }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn into_inner(self) -> D {
        self.dev
    }

    fn shift(&self, offset: u64) -> Result<u64, BlockError> {
        self.base.checked_add(offset).ok_or(BlockError::OutOfRange)
    }
}

impl<D: BlockDev> BlockDev for OffsetDev<D> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), BlockError> {
        self.dev.read_at(self.shift(offset)?, buf)
    }
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<(), BlockError> {
        self.dev.write_at(self.shift(offset)?, buf)
    }
}

// ─── Host file backend ─────────────────────────────────────────────────────────

#[cfg(feature = "std")]
pub use image_file::ImageFile;

#[cfg(feature = "std")]
mod image_file {
    use super::{BlockDev, BlockError};
    use std::fs::File;
    use std::io::{self, Read, Seek, SeekFrom};
    use std::path::Path;
    use std::sync::Mutex;

    /// A disk image on the host filesystem, opened read-only.
    pub struct ImageFile {
        file: Mutex<File>,
    }

    impl ImageFile {
        pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
            Ok(Self { file: Mutex::new(File::open(path)?) })
        }
    }

    impl BlockDev for ImageFile {
        fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), BlockError> {
            let mut file = self.file.lock().map_err(|_| BlockError::Io)?;
            file.seek(SeekFrom::Start(offset)).map_err(|_| BlockError::Io)?;
            file.read_exact(buf).map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => BlockError::OutOfRange,
                _ => BlockError::Io,
            })
        }
    }
}

// ─── Unit tests ────────────────────────────────────────────────────────────────

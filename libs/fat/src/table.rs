//! Allocation table lookups and cluster chain traversal.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use blockdev::BlockDev;
use log::warn;

use crate::FsError;
use crate::boot::{FatType, Geometry};

const FAT32_MASK: u32 = 0x0FFF_FFFF;

/// Decode a FAT12 entry from the 16 bits read at `cluster + cluster / 2`.
pub fn fat12_entry(cluster: u32, raw: u16) -> u16 {
    if cluster & 1 == 1 { raw >> 4 } else { raw & 0x0FFF }
}

/// Value stored in the active FAT for `cluster`, or `None` when the entry
/// would lie outside the table.
pub(crate) fn fat_entry<D: BlockDev + ?Sized>(
    dev: &D,
    geo: &Geometry,
    cluster: u32,
) -> Result<Option<u32>, FsError> {
    let c = u64::from(cluster);
    let (off, width) = match geo.fat_type {
        FatType::Fat12 => (c + c / 2, 2),
        FatType::Fat16 => (c * 2, 2),
        FatType::Fat32 => (c * 4, 4),
    };
    if off + width > geo.fat_bytes() {
        return Ok(None);
    }

    let mut raw = [0u8; 4];
    dev.read_at(geo.fat_start + off, &mut raw[..width as usize])?;
    let value = match geo.fat_type {
        FatType::Fat12 => u32::from(fat12_entry(cluster, u16::from_le_bytes([raw[0], raw[1]]))),
        FatType::Fat16 => u32::from(u16::from_le_bytes([raw[0], raw[1]])),
        FatType::Fat32 => u32::from_le_bytes(raw) & FAT32_MASK,
    };
    Ok(Some(value))
}

/// Follow the chain starting at `first`.
///
/// The result is truncated (never an error) at a loop, at a link leaving
/// the data region, or at an entry past the end of the table. A cluster is
/// never listed twice: `3→4→5→3` yields `[3, 4, 5]`, where a visited set
/// that skips the first cluster would yield `[3, 4, 5, 3]`.
pub(crate) fn cluster_chain<D: BlockDev + ?Sized>(
    dev: &D,
    geo: &Geometry,
    first: u32,
) -> Result<Vec<u32>, FsError> {
    let mut chain = Vec::new();
    if !geo.is_data_cluster(first) {
        return Ok(chain);
    }

    let mut seen = BTreeSet::new();
    seen.insert(first);
    let mut cur = first;
    loop {
        chain.push(cur);
        let Some(next) = fat_entry(dev, geo, cur)? else {
            warn!("fat: cluster {cur} has no table entry, chain from {first} truncated");
            break;
        };
        if geo.fat_type.is_end_of_chain(next) {
            break;
        }
        if !geo.is_data_cluster(next) {
            warn!("fat: cluster {cur} links to invalid cluster {next:#x}, chain from {first} truncated");
            break;
        }
        if !seen.insert(next) {
            warn!("fat: cluster {cur} links back to {next}, chain from {first} truncated");
            break;
        }
        cur = next;
    }
    Ok(chain)
}

// ─── Unit tests ────────────────────────────────────────────────────────────────

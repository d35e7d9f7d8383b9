//! Byte-exact FAT volume builder for unit tests.
//!
//! `fatfs` produces well-formed volumes; this builder produces the ones it
//! refuses to: looping chains, deleted and hidden slots, out-of-order LFN
//! fragments, disabled FAT mirroring.

extern crate std;

use std::vec;
use std::vec::Vec;

use crate::boot::BOOT_SECTOR_LEN;

pub const SECTOR: usize = 512;

#[derive(Clone, Copy)]
pub struct Layout {
    pub fat_bits:     u8,
    pub reserved:     u16,
    pub num_fats:     u8,
    pub root_entries: u16,
    pub total:        u32,
    pub fat_size:     u32,
}

impl Layout {
    /// 1.44 MB floppy: 2847 data clusters of one sector.
    pub fn fat12() -> Self {
        Self { fat_bits: 12, reserved: 1, num_fats: 2, root_entries: 224, total: 2880, fat_size: 9 }
    }

    /// 4 MB, 8095 data clusters of one sector.
    pub fn fat16() -> Self {
        Self { fat_bits: 16, reserved: 1, num_fats: 2, root_entries: 512, total: 8192, fat_size: 32 }
    }

    /// 512 KB, root directory at cluster 2.
    pub fn fat32() -> Self {
        Self { fat_bits: 32, reserved: 32, num_fats: 2, root_entries: 0, total: 1024, fat_size: 8 }
    }

    fn root_sectors(&self) -> u32 {
        (u32::from(self.root_entries) * 32).div_ceil(SECTOR as u32)
    }

    fn data_sector(&self) -> u32 {
        u32::from(self.reserved) + u32::from(self.num_fats) * self.fat_size + self.root_sectors()
    }
}

pub struct TestImage {
    pub layout: Layout,
    pub bytes:  Vec<u8>,
}

impl TestImage {
    pub fn new(layout: Layout) -> Self {
        let mut img = Self { layout, bytes: vec![0u8; layout.total as usize * SECTOR] };
        img.write_boot_sector();
        let media = 0xF8;
        match layout.fat_bits {
            12 => {
                img.set_fat(0, 0xF00 | media);
                img.set_fat(1, 0xFFF);
            }
            16 => {
                img.set_fat(0, 0xFF00 | media);
                img.set_fat(1, 0xFFFF);
            }
            _ => {
                img.set_fat(0, 0x0FFF_FF00 | media);
                img.set_fat(1, 0x0FFF_FFFF);
                img.set_fat(2, 0x0FFF_FFFF);
            }
        }
        img
    }

    fn write_boot_sector(&mut self) {
        let l = self.layout;
        let b = &mut self.bytes[..BOOT_SECTOR_LEN];
        b[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        b[3..11].copy_from_slice(b"TESTIMG ");
        b[11..13].copy_from_slice(&(SECTOR as u16).to_le_bytes());
        b[13] = 1;
        b[14..16].copy_from_slice(&l.reserved.to_le_bytes());
        b[16] = l.num_fats;
        b[17..19].copy_from_slice(&l.root_entries.to_le_bytes());
        b[21] = 0xF8;
        if l.fat_bits == 32 {
            b[32..36].copy_from_slice(&l.total.to_le_bytes());
            b[36..40].copy_from_slice(&l.fat_size.to_le_bytes());
            b[44..48].copy_from_slice(&2u32.to_le_bytes());
            b[48..50].copy_from_slice(&1u16.to_le_bytes());
            b[50..52].copy_from_slice(&6u16.to_le_bytes());
            b[66] = 0x29;
            b[71..82].copy_from_slice(b"TESTVOL    ");
            b[82..90].copy_from_slice(b"FAT32   ");
        } else {
            b[19..21].copy_from_slice(&(l.total as u16).to_le_bytes());
            b[22..24].copy_from_slice(&(l.fat_size as u16).to_le_bytes());
            b[38] = 0x29;
            b[43..54].copy_from_slice(b"TESTVOL    ");
            b[54..62].copy_from_slice(if l.fat_bits == 12 { b"FAT12   " } else { b"FAT16   " });
        }
        b[510] = 0x55;
        b[511] = 0xAA;
    }

    // ── Allocation table ─────────────────────────────────────────────────────

    fn fat_offset(&self, copy: u8) -> usize {
        (usize::from(self.layout.reserved) + usize::from(copy) * self.layout.fat_size as usize)
            * SECTOR
    }

    /// Store `value` for `cluster` in one FAT copy.
    pub fn set_fat_copy(&mut self, copy: u8, cluster: u32, value: u32) {
        let base = self.fat_offset(copy);
        let c = cluster as usize;
        match self.layout.fat_bits {
            12 => {
                let off = base + c + c / 2;
                let mut raw = u16::from_le_bytes([self.bytes[off], self.bytes[off + 1]]);
                let v = (value & 0xFFF) as u16;
                raw = if c & 1 == 1 { (raw & 0x000F) | (v << 4) } else { (raw & 0xF000) | v };
                self.bytes[off..off + 2].copy_from_slice(&raw.to_le_bytes());
            }
            16 => {
                let off = base + c * 2;
                self.bytes[off..off + 2].copy_from_slice(&(value as u16).to_le_bytes());
            }
            _ => {
                let off = base + c * 4;
                self.bytes[off..off + 4].copy_from_slice(&value.to_le_bytes());
            }
        }
    }

    /// Store `value` for `cluster` in every FAT copy.
    pub fn set_fat(&mut self, cluster: u32, value: u32) {
        for copy in 0..self.layout.num_fats {
            self.set_fat_copy(copy, cluster, value);
        }
    }

    pub fn eoc(&self) -> u32 {
        match self.layout.fat_bits {
            12 => 0xFFF,
            16 => 0xFFFF,
            _ => 0x0FFF_FFFF,
        }
    }

    /// Link `clusters` in order and terminate the chain.
    pub fn chain(&mut self, clusters: &[u32]) {
        for pair in clusters.windows(2) {
            self.set_fat(pair[0], pair[1]);
        }
        if let Some(&last) = clusters.last() {
            let eoc = self.eoc();
            self.set_fat(last, eoc);
        }
    }

    // ── Data region ──────────────────────────────────────────────────────────

    pub fn cluster_offset(&self, cluster: u32) -> usize {
        (self.layout.data_sector() as usize + (cluster as usize - 2)) * SECTOR
    }

    pub fn write_cluster(&mut self, cluster: u32, data: &[u8]) {
        assert!(data.len() <= SECTOR);
        let off = self.cluster_offset(cluster);
        self.bytes[off..off + data.len()].copy_from_slice(data);
    }

    /// Place a 32-byte slot in the root directory (the fixed region on
    /// FAT12/16, cluster 2 on FAT32).
    pub fn put_root(&mut self, slot: usize, entry: &[u8; 32]) {
        let off = if self.layout.fat_bits == 32 {
            self.cluster_offset(2)
        } else {
            (usize::from(self.layout.reserved)
                + usize::from(self.layout.num_fats) * self.layout.fat_size as usize)
                * SECTOR
        };
        let at = off + slot * 32;
        self.bytes[at..at + 32].copy_from_slice(entry);
    }

    /// Place a 32-byte slot in a directory cluster.
    pub fn put_in(&mut self, cluster: u32, slot: usize, entry: &[u8; 32]) {
        assert!(slot < SECTOR / 32);
        let at = self.cluster_offset(cluster) + slot * 32;
        self.bytes[at..at + 32].copy_from_slice(entry);
    }
}

// ── Entry builders ───────────────────────────────────────────────────────────

/// A short entry. `name` is the raw 11-byte 8+3 field.
pub fn short_entry(name: &[u8; 11], attr: u8, cluster: u32, size: u32) -> [u8; 32] {
    let mut e = [0u8; 32];
    e[..11].copy_from_slice(name);
    e[11] = attr;
    e[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
    e[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
    e[28..32].copy_from_slice(&size.to_le_bytes());
    e
}

/// An LFN fragment carrying exactly the 13 given code units.
pub fn lfn_entry(seq: u8, units: &[u16; 13], checksum: u8) -> [u8; 32] {
    let mut e = [0u8; 32];
    e[0] = seq;
    e[11] = 0x0F;
    e[13] = checksum;
    let mut put = |range: core::ops::Range<usize>, src: &[u16]| {
        for (i, u) in range.step_by(2).zip(src) {
            e[i..i + 2].copy_from_slice(&u.to_le_bytes());
        }
    };
    put(1..11, &units[0..5]);
    put(14..26, &units[5..11]);
    put(28..32, &units[11..13]);
    e
}

/// The fragments for `long`, in on-disk order (highest sequence first).
pub fn lfn_entries(long: &str, short: &[u8; 11]) -> Vec<[u8; 32]> {
    let mut units: Vec<u16> = long.encode_utf16().collect();
    if units.len() % 13 != 0 {
        units.push(0);
        while units.len() % 13 != 0 {
            units.push(0xFFFF);
        }
    }
    let sum = crate::dir::lfn_checksum(short);
    let count = units.len() / 13;
    (1..=count)
        .rev()
        .map(|seq| {
            let mut chunk = [0u16; 13];
            chunk.copy_from_slice(&units[(seq - 1) * 13..seq * 13]);
            let flag = if seq == count { 0x40 } else { 0 };
            lfn_entry(seq as u8 | flag, &chunk, sum)
        })
        .collect()
}

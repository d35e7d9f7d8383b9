//! On-disk directory slots and the decoder that turns them into entries.

use alloc::string::String;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::fmt;
use log::debug;

use crate::boot::FatType;

/// First byte of a slot that ends the directory.
const SLOT_END: u8 = 0x00;
/// First byte of a deleted slot.
const SLOT_DELETED: u8 = 0xE5;
/// Stored in place of a leading 0xE5 in a live short name.
const SLOT_KANJI_E5: u8 = 0x05;
/// LFN sequence number bits (bit 6 marks the last fragment).
const LFN_SEQ_MASK: u8 = 0x1F;

/// `S_IFDIR` from `<sys/stat.h>`.
const S_IFDIR: u32 = 0o040000;

bitflags! {
    /// Attribute byte of a directory slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN    = 0x02;
        const SYSTEM    = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE   = 0x20;
        /// All four low bits together mark a long-name fragment.
        const LFN       = Self::READ_ONLY.bits()
                        | Self::HIDDEN.bits()
                        | Self::SYSTEM.bits()
                        | Self::VOLUME_ID.bits();
    }
}

impl Attributes {
    pub fn is_lfn(self) -> bool {
        self.contains(Attributes::LFN)
    }
}

// ─── Raw slots ─────────────────────────────────────────────────────────────────

fn le16(b: &[u8; 32], off: usize) -> u16 {
    u16::from_le_bytes([b[off], b[off + 1]])
}

/// A short (8.3) directory slot.
struct RawDirEntry {
    name:       [u8; 8],
    ext:        [u8; 3],
    attr:       Attributes,
    crt_time:   u16,
    crt_date:   u16,
    acc_date:   u16,
    cluster_hi: u16,
    mod_time:   u16,
    mod_date:   u16,
    cluster_lo: u16,
    size:       u32,
}

impl RawDirEntry {
    fn parse(b: &[u8; 32]) -> Self {
        let mut name = [0u8; 8];
        let mut ext = [0u8; 3];
        name.copy_from_slice(&b[0..8]);
        ext.copy_from_slice(&b[8..11]);
        Self {
            name,
            ext,
            attr:       Attributes::from_bits_retain(b[11]),
            crt_time:   le16(b, 14),
            crt_date:   le16(b, 16),
            acc_date:   le16(b, 18),
            cluster_hi: le16(b, 20),
            mod_time:   le16(b, 22),
            mod_date:   le16(b, 24),
            cluster_lo: le16(b, 26),
            size:       u32::from_le_bytes([b[28], b[29], b[30], b[31]]),
        }
    }

    /// First cluster. Bytes 20..22 only hold the high word on FAT32; older
    /// volumes may keep unrelated data there (OS/2 EA handles).
    fn cluster(&self, fat_type: FatType) -> u32 {
        match fat_type {
            FatType::Fat32 => (u32::from(self.cluster_hi) << 16) | u32::from(self.cluster_lo),
            FatType::Fat12 | FatType::Fat16 => u32::from(self.cluster_lo),
        }
    }

    fn raw_name(&self) -> [u8; 11] {
        let mut out = [0u8; 11];
        out[..8].copy_from_slice(&self.name);
        out[8..].copy_from_slice(&self.ext);
        out
    }

    /// `"HELLO   TXT"` → `"hello.txt"`.
    fn short_name(&self) -> String {
        let mut name = self.name;
        if name[0] == SLOT_KANJI_E5 {
            name[0] = SLOT_DELETED;
        }
        let name_end = name.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
        let ext_end = self.ext.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);

        let mut out = String::with_capacity(12);
        push_lower(&mut out, &name[..name_end]);
        if ext_end > 0 {
            out.push('.');
            push_lower(&mut out, &self.ext[..ext_end]);
        }
        out
    }
}

fn push_lower(out: &mut String, bytes: &[u8]) {
    for &b in bytes {
        out.extend(char::from(b).to_lowercase());
    }
}

/// One long-name fragment: 13 UTF-16 code units of the full name.
struct LfnFragment {
    seq:      u8,
    checksum: u8,
    cluster:  u16,
    units:    [u16; 13],
}

impl LfnFragment {
    fn parse(b: &[u8; 32]) -> Self {
        let mut units = [0u16; 13];
        let offsets = (1..11).step_by(2).chain((14..26).step_by(2)).chain((28..32).step_by(2));
        for (unit, off) in units.iter_mut().zip(offsets) {
            *unit = le16(b, off);
        }
        Self { seq: b[0] & LFN_SEQ_MASK, checksum: b[13], cluster: le16(b, 26), units }
    }

    fn is_usable(&self) -> bool {
        self.cluster == 0 && self.units.iter().any(|&u| u != 0)
    }
}

/// Checksum of an 11-byte short name, stored in each of its LFN fragments.
pub fn lfn_checksum(short: &[u8; 11]) -> u8 {
    short.iter().fold(0u8, |sum, &b| sum.rotate_right(1).wrapping_add(b))
}

// ─── Timestamps ────────────────────────────────────────────────────────────────

/// A DOS packed date and time. The time has two-second resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DosDateTime {
    date: u16,
    time: u16,
}

impl DosDateTime {
    pub fn new(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    pub fn year(&self) -> u16 {
        1980 + (self.date >> 9)
    }
    pub fn month(&self) -> u8 {
        ((self.date >> 5) & 0x0F) as u8
    }
    pub fn day(&self) -> u8 {
        (self.date & 0x1F) as u8
    }
    pub fn hour(&self) -> u8 {
        (self.time >> 11) as u8
    }
    pub fn minute(&self) -> u8 {
        ((self.time >> 5) & 0x3F) as u8
    }
    pub fn second(&self) -> u8 {
        ((self.time & 0x1F) * 2) as u8
    }
}

impl fmt::Display for DosDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

// ─── Materialized entries ──────────────────────────────────────────────────────

/// An owned directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    name:       String,
    attributes: Attributes,
    cluster:    u32,
    size:       u32,
    created:    DosDateTime,
    modified:   DosDateTime,
    accessed:   DosDateTime,
}

impl DirEntry {
    /// The synthetic entry for `/`.
    pub(crate) fn root(cluster: u32) -> Self {
        Self {
            name:       String::from("/"),
            attributes: Attributes::DIRECTORY,
            cluster,
            size:       0,
            created:    DosDateTime::default(),
            modified:   DosDateTime::default(),
            accessed:   DosDateTime::default(),
        }
    }

    fn from_raw(raw: &RawDirEntry, name: String, fat_type: FatType) -> Self {
        Self {
            name,
            attributes: raw.attr,
            cluster:    raw.cluster(fat_type),
            size:       raw.size,
            created:    DosDateTime::new(raw.crt_date, raw.crt_time),
            modified:   DosDateTime::new(raw.mod_date, raw.mod_time),
            accessed:   DosDateTime::new(raw.acc_date, 0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dir(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY) && !self.attributes.is_lfn()
    }

    /// File size in bytes (0 for directories).
    pub fn len(&self) -> u64 {
        u64::from(self.size)
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn first_cluster(&self) -> u32 {
        self.cluster
    }

    pub fn attributes(&self) -> Attributes {
        self.attributes
    }

    pub fn created(&self) -> DosDateTime {
        self.created
    }

    pub fn modified(&self) -> DosDateTime {
        self.modified
    }

    /// Last access; FAT records only the date.
    pub fn accessed(&self) -> DosDateTime {
        self.accessed
    }

    /// Unix-style mode bits.
    pub fn mode(&self) -> u32 {
        let mut mode = 0o777;
        if self.attributes.contains(Attributes::READ_ONLY) {
            mode &= !0o222;
        }
        if self.is_dir() {
            mode |= S_IFDIR;
        }
        mode
    }
}

// ─── Decoder ───────────────────────────────────────────────────────────────────

/// Outcome of feeding one slot to the decoder.
pub(crate) enum Slot {
    /// The directory ends here.
    End,
    /// Nothing to report (deleted, hidden, label, `.`/`..`, or a fragment).
    Skip,
    Entry(DirEntry),
}

enum LfnState {
    Idle,
    Accumulating(Vec<LfnFragment>),
}

/// Consumes slots in directory order and yields completed entries.
pub(crate) struct EntryDecoder {
    fat_type: FatType,
    state:    LfnState,
}

impl EntryDecoder {
    pub fn new(fat_type: FatType) -> Self {
        Self { fat_type, state: LfnState::Idle }
    }

    pub fn reset(&mut self) {
        self.state = LfnState::Idle;
    }

    pub fn feed(&mut self, slot: &[u8; 32]) -> Slot {
        match slot[0] {
            SLOT_END => return Slot::End,
            SLOT_DELETED => {
                self.reset();
                return Slot::Skip;
            }
            _ => {}
        }

        let attr = Attributes::from_bits_retain(slot[11]);
        if attr.is_lfn() {
            let frag = LfnFragment::parse(slot);
            if frag.is_usable() {
                self.state = match core::mem::replace(&mut self.state, LfnState::Idle) {
                    LfnState::Idle => LfnState::Accumulating(alloc::vec![frag]),
                    LfnState::Accumulating(mut frags) => {
                        frags.push(frag);
                        LfnState::Accumulating(frags)
                    }
                };
            }
            return Slot::Skip;
        }
        if attr.intersects(Attributes::HIDDEN | Attributes::VOLUME_ID) {
            self.reset();
            return Slot::Skip;
        }

        let raw = RawDirEntry::parse(slot);
        let pending = core::mem::replace(&mut self.state, LfnState::Idle);
        let short = raw.short_name();
        if short == "." || short == ".." {
            return Slot::Skip;
        }

        let long = match pending {
            LfnState::Idle => String::new(),
            LfnState::Accumulating(frags) => assemble(frags, &raw.raw_name()),
        };
        let name = if long.is_empty() { short } else { long };
        Slot::Entry(DirEntry::from_raw(&raw, name, self.fat_type))
    }
}

fn assemble(mut frags: Vec<LfnFragment>, short: &[u8; 11]) -> String {
    let sum = lfn_checksum(short);
    if frags.iter().any(|f| f.checksum != sum) {
        debug!("fat: long name checksum mismatch for short name {short:?}");
    }
    frags.sort_by_key(|f| f.seq);
    let units: Vec<u16> = frags
        .iter()
        .flat_map(|f| f.units)
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

// ─── Unit tests ────────────────────────────────────────────────────────────────

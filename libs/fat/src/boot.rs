//! Boot sector (BPB) decoding and the volume geometry derived from it.

use alloc::string::String;
use core::fmt;
use num_enum::IntoPrimitive;

use crate::FsError;

/// Bytes of the volume read at mount time.
pub const BOOT_SECTOR_LEN: usize = 512;
/// Size of one directory slot.
pub const DIR_ENTRY_SIZE: u64 = 32;

/// FAT12 volumes have fewer data clusters than this.
const FAT12_MAX_CLUSTERS: u32 = 4087;
/// Extended-flags bit 7: mirroring disabled, one FAT copy is active.
const EXT_FLAG_NO_MIRROR: u16 = 0x80;

/// FAT variant; the discriminant is the table entry width in bits.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
pub enum FatType {
    Fat12 = 12,
    Fat16 = 16,
    Fat32 = 32,
}

impl FatType {
    pub fn bits(self) -> u8 {
        self.into()
    }

    /// Whether a table value terminates a chain for this width.
    pub fn is_end_of_chain(self, value: u32) -> bool {
        match self {
            FatType::Fat12 => value >= 0x0FF7,
            FatType::Fat16 => value >= 0xFFF7,
            FatType::Fat32 => value & 0x0FFF_FFFF >= 0x0FFF_FFF7,
        }
    }
}

// ─── Raw BPB ───────────────────────────────────────────────────────────────────

/// FAT12/16 layout. The first 36 bytes are shared with FAT32.
struct Bpb {
    bytes_per_sector: u16,
    sectors_per_clus: u8,
    reserved_sectors: u16,
    num_fats:         u8,
    root_entry_count: u16,
    total_sectors_16: u16,
    media:            u8,
    fat_size_16:      u16,
    total_sectors_32: u32,
    volume_label:     [u8; 11],
    fs_type:          [u8; 8],
}

/// FAT32 extension that replaces the FAT12/16 tail from offset 36 on.
struct Bpb32 {
    fat_size_32:  u32,
    ext_flags:    u16,
    root_cluster: u32,
    volume_label: [u8; 11],
    fs_type:      [u8; 8],
}

fn le16(b: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([b[off], b[off + 1]])
}

fn le32(b: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}

fn array<const N: usize>(b: &[u8], off: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&b[off..off + N]);
    out
}

impl Bpb {
    fn parse(b: &[u8; BOOT_SECTOR_LEN]) -> Self {
        Self {
            bytes_per_sector: le16(b, 11),
            sectors_per_clus: b[13],
            reserved_sectors: le16(b, 14),
            num_fats:         b[16],
            root_entry_count: le16(b, 17),
            total_sectors_16: le16(b, 19),
            media:            b[21],
            fat_size_16:      le16(b, 22),
            total_sectors_32: le32(b, 32),
            volume_label:     array(b, 43),
            fs_type:          array(b, 54),
        }
    }
}

impl Bpb32 {
    fn parse(b: &[u8; BOOT_SECTOR_LEN]) -> Self {
        Self {
            fat_size_32:  le32(b, 36),
            ext_flags:    le16(b, 40),
            root_cluster: le32(b, 44),
            volume_label: array(b, 71),
            fs_type:      array(b, 82),
        }
    }
}

fn trimmed(raw: &[u8]) -> String {
    let end = raw.iter().rposition(|&b| b != b' ' && b != 0).map_or(0, |i| i + 1);
    raw[..end].iter().map(|&b| char::from(b)).collect()
}

/// Index of the authoritative FAT copy when mirroring is disabled.
///
/// The low nibble is treated as a one-of-four selector: the first set bit
/// wins, and copy 0 is used when none is set.
fn active_fat(ext_flags: u16) -> Option<u8> {
    if ext_flags & EXT_FLAG_NO_MIRROR == 0 {
        return None;
    }
    Some((0..4u8).find(|i| ext_flags & (1 << i) != 0).unwrap_or(0))
}

// ─── Geometry ──────────────────────────────────────────────────────────────────

/// Volume layout, computed once at mount. All `*_start` fields are byte
/// offsets from the start of the volume.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub fat_type:            FatType,
    pub sector_size:         u32,
    pub sectors_per_cluster: u32,
    pub reserved_sectors:    u32,
    /// FAT copies used for addressing (1 when a single copy is active).
    pub fat_count:           u32,
    /// Sectors per FAT copy.
    pub fat_size:            u32,
    pub root_entries:        u32,
    pub total_sectors:       u32,
    pub media:               u8,
    /// Authoritative FAT copy.
    pub fat_start:           u64,
    /// FAT12/16 root directory region (0 on FAT32).
    pub root_dir_start:      u64,
    pub root_dir_len:        u64,
    /// FAT32 root directory cluster (0 on FAT12/16).
    pub root_cluster:        u32,
    pub data_start:          u64,
    pub data_clusters:       u32,
    pub active_fat:          Option<u8>,
    pub label:               String,
    pub fs_type:             String,
}

impl Geometry {
    /// Decode the boot sector of a FAT volume.
    pub fn parse(sector: &[u8; BOOT_SECTOR_LEN]) -> Result<Self, FsError> {
        let bpb = Bpb::parse(sector);

        let sector_size = u32::from(bpb.bytes_per_sector);
        let sectors_per_cluster = u32::from(bpb.sectors_per_clus);
        let reserved_sectors = u32::from(bpb.reserved_sectors);
        let num_fats = u32::from(bpb.num_fats);
        let root_entries = u32::from(bpb.root_entry_count);
        let total_sectors = match bpb.total_sectors_16 {
            0 => bpb.total_sectors_32,
            n => u32::from(n),
        };

        if sector_size == 0 || sector_size as u64 % DIR_ENTRY_SIZE != 0 {
            return Err(FsError::InvalidGeometry("sector size is not a multiple of 32"));
        }
        if sectors_per_cluster == 0 {
            return Err(FsError::InvalidGeometry("cluster size is 0"));
        }

        let ss = u64::from(sector_size);
        let fat_start_sector = u64::from(reserved_sectors);

        let mut geo = if bpb.fat_size_16 != 0 {
            let fat_size = u32::from(bpb.fat_size_16);
            let root_sector = fat_start_sector + u64::from(num_fats) * u64::from(fat_size);
            let root_dir_len = u64::from(root_entries) * DIR_ENTRY_SIZE;
            let root_sectors = root_dir_len.div_ceil(ss);
            Geometry {
                fat_type: FatType::Fat16,
                sector_size,
                sectors_per_cluster,
                reserved_sectors,
                fat_count: num_fats,
                fat_size,
                root_entries,
                total_sectors,
                media: bpb.media,
                fat_start: fat_start_sector * ss,
                root_dir_start: root_sector * ss,
                root_dir_len,
                root_cluster: 0,
                data_start: (root_sector + root_sectors) * ss,
                data_clusters: 0,
                active_fat: None,
                label: trimmed(&bpb.volume_label),
                fs_type: trimmed(&bpb.fs_type),
            }
        } else {
            let ext = Bpb32::parse(sector);
            if ext.fat_size_32 == 0 {
                return Err(FsError::InvalidGeometry("fat size is 0"));
            }
            let fat_size = ext.fat_size_32;
            let data_sector = fat_start_sector + u64::from(num_fats) * u64::from(fat_size);
            let active_fat = active_fat(ext.ext_flags);
            let (fat_count, fat_first) = match active_fat {
                Some(i) => (1, fat_start_sector + u64::from(i) * u64::from(fat_size)),
                None => (num_fats, fat_start_sector),
            };
            Geometry {
                fat_type: FatType::Fat32,
                sector_size,
                sectors_per_cluster,
                reserved_sectors,
                fat_count,
                fat_size,
                root_entries,
                total_sectors,
                media: bpb.media,
                fat_start: fat_first * ss,
                root_dir_start: 0,
                root_dir_len: 0,
                root_cluster: ext.root_cluster,
                data_start: data_sector * ss,
                data_clusters: 0,
                active_fat,
                label: trimmed(&ext.volume_label),
                fs_type: trimmed(&ext.fs_type),
            }
        };

        let data_sector = geo.data_start / ss;
        let data_sectors = u64::from(total_sectors).saturating_sub(data_sector);
        geo.data_clusters = (data_sectors / u64::from(sectors_per_cluster)) as u32;

        if geo.fat_type != FatType::Fat32 && geo.data_clusters < FAT12_MAX_CLUSTERS {
            geo.fat_type = FatType::Fat12;
        }

        Ok(geo)
    }

    pub fn cluster_bytes(&self) -> u64 {
        u64::from(self.sector_size) * u64::from(self.sectors_per_cluster)
    }

    /// Whether `cluster` names an allocatable data cluster on this volume.
    pub fn is_data_cluster(&self, cluster: u32) -> bool {
        cluster >= 2 && u64::from(cluster) < u64::from(self.data_clusters) + 2
    }

    /// Byte offset of the first byte of `cluster`.
    pub fn cluster_start(&self, cluster: u32) -> u64 {
        self.data_start + u64::from(cluster.saturating_sub(2)) * self.cluster_bytes()
    }

    pub fn fat_bytes(&self) -> u64 {
        u64::from(self.fat_size) * u64::from(self.sector_size)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Type:           FAT{}", self.fat_type.bits())?;
        if !self.label.is_empty() {
            writeln!(f, "Label:          {}", self.label)?;
        }
        if !self.fs_type.is_empty() {
            writeln!(f, "FS Type:        {}", self.fs_type)?;
        }
        writeln!(f, "Sector size:    {}", self.sector_size)?;
        writeln!(f, "Cluster size:   {}", self.sectors_per_cluster)?;
        writeln!(f, "Reserved:       {}", self.reserved_sectors)?;
        writeln!(f, "Number of FATs: {}", self.fat_count)?;
        if let Some(i) = self.active_fat {
            writeln!(f, "Active FAT:     {i}")?;
        }
        writeln!(f, "Root entries:   {}", self.root_entries)?;
        writeln!(f, "Volume size:    {}", self.total_sectors)?;
        writeln!(f, "FAT address:    {}", self.fat_start)?;
        writeln!(f, "FAT size:       {}", self.fat_size)?;
        writeln!(f, "Data address:   {}", self.data_start)?;
        writeln!(f, "Root address:   {}", self.root_dir_start)?;
        writeln!(f, "Root cluster:   {}", self.root_cluster)?;
        write!(f, "Data clusters:  {}", self.data_clusters)
    }
}

// ─── Unit tests ────────────────────────────────────────────────────────────────

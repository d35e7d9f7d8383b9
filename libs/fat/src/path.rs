//! Path normalization and lookup.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use blockdev::BlockDev;

use crate::dir::DirEntry;
use crate::handle::Dir;
use crate::{FileSystem, FsError};

/// Entries decoded per directory read during lookup.
pub const LOOKUP_PAGE: usize = 16;

/// Absolute, clean form of `path` interpreted relative to `cwd`.
///
/// `.` and empty components vanish, `..` pops (and stays at `/` when there
/// is nothing left to pop).
pub fn normalize(cwd: &str, path: &str) -> String {
    let joined;
    let full = if path.starts_with('/') {
        path
    } else {
        joined = format!("{cwd}/{path}");
        joined.as_str()
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in full.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }

    let mut out = String::with_capacity(full.len() + 1);
    for part in &parts {
        out.push('/');
        out.push_str(part);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Non-empty components of a normalized path, root to leaf.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

fn names_match(entry: &str, wanted: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        entry == wanted
    } else {
        entry == wanted || entry.to_lowercase() == wanted.to_lowercase()
    }
}

/// Walk `path` (already normalized) from the root directory.
pub(crate) fn lookup<D: BlockDev>(fs: &FileSystem<D>, path: &str) -> Result<DirEntry, FsError> {
    let case_sensitive = fs.options().case_sensitive;
    let mut entry = fs.root_entry();
    let mut at_root = true;

    for wanted in components(path) {
        if !entry.is_dir() {
            return Err(FsError::NotExist);
        }
        let mut dir = if at_root { Dir::root(fs)? } else { Dir::new(fs, entry)? };
        at_root = false;
        entry = loop {
            let page = dir.readdir(LOOKUP_PAGE)?;
            if page.is_empty() {
                return Err(FsError::NotExist);
            }
            if let Some(found) = page.into_iter().find(|e| names_match(e.name(), wanted, case_sensitive)) {
                break found;
            }
        };
    }
    Ok(entry)
}

// ─── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FsOptions;
    use crate::testimg::{Layout, TestImage, lfn_entries, short_entry};

    #[test]
    fn normalize_absolute() {
        assert_eq!(normalize("/ignored", "/a/b/../c/./d//"), "/a/c/d");
        assert_eq!(normalize("/", "/"), "/");
    }

    #[test]
    fn normalize_relative() {
        assert_eq!(normalize("/docs", "notes.txt"), "/docs/notes.txt");
        assert_eq!(normalize("/docs/old", "../new"), "/docs/new");
        assert_eq!(normalize("/docs", ""), "/docs");
        assert_eq!(normalize("/docs", "."), "/docs");
    }

    #[test]
    fn dotdot_stops_at_root() {
        assert_eq!(normalize("/", "../../x"), "/x");
        assert_eq!(normalize("/a", "../../.."), "/");
    }

    #[test]
    fn components_skip_empties() {
        let parts: Vec<&str> = components("/a//b/c").collect();
        assert_eq!(parts, ["a", "b", "c"]);
        assert_eq!(components("/").count(), 0);
    }

    /// FAT16 root: directory `FOO` (cluster 3) holding `bar.txt` (cluster 4).
    fn foo_bar_image() -> TestImage {
        let mut img = TestImage::new(Layout::fat16());
        img.chain(&[3]);
        img.chain(&[4]);
        img.put_root(0, &short_entry(b"FOO        ", 0x10, 3, 0));
        img.put_in(3, 0, &short_entry(b"BAR     TXT", 0x20, 4, 5));
        img.write_cluster(4, b"hello");
        img
    }

    #[test]
    fn case_insensitive_by_default() {
        let fs = FileSystem::mount(foo_bar_image().bytes, FsOptions::default()).unwrap();
        let e = lookup(&fs, "/Foo/BAR.TXT").unwrap();
        assert_eq!(e.name(), "bar.txt");
        assert_eq!(e.len(), 5);
    }

    #[test]
    fn case_sensitive_requires_exact_names() {
        let fs = FileSystem::mount(foo_bar_image().bytes, FsOptions { case_sensitive: true }).unwrap();
        assert_eq!(lookup(&fs, "/Foo/BAR.TXT"), Err(FsError::NotExist));
        assert!(lookup(&fs, "/foo/bar.txt").is_ok());
    }

    #[test]
    fn missing_component() {
        let fs = FileSystem::mount(foo_bar_image().bytes, FsOptions::default()).unwrap();
        assert_eq!(lookup(&fs, "/foo/nope.txt"), Err(FsError::NotExist));
        assert_eq!(lookup(&fs, "/nope/bar.txt"), Err(FsError::NotExist));
    }

    #[test]
    fn descent_through_file_is_not_found() {
        let fs = FileSystem::mount(foo_bar_image().bytes, FsOptions::default()).unwrap();
        assert_eq!(lookup(&fs, "/foo/bar.txt/x"), Err(FsError::NotExist));
    }

    #[test]
    fn root_resolves_to_itself() {
        let fs = FileSystem::mount(foo_bar_image().bytes, FsOptions::default()).unwrap();
        let e = lookup(&fs, "/").unwrap();
        assert!(e.is_dir());
        assert_eq!(e.name(), "/");
    }

    #[test]
    fn match_beyond_first_page() {
        let mut img = TestImage::new(Layout::fat12());
        for i in 0..LOOKUP_PAGE + 5 {
            let mut name = *b"N00     DAT";
            name[1] = b'0' + (i / 10) as u8;
            name[2] = b'0' + (i % 10) as u8;
            img.put_root(i, &short_entry(&name, 0x20, 0, 0));
        }
        let fs = FileSystem::mount(img.bytes, FsOptions::default()).unwrap();
        let last = LOOKUP_PAGE + 4;
        let wanted = format!("/n{}{}.dat", last / 10, last % 10);
        assert_eq!(lookup(&fs, &wanted).unwrap().name(), &wanted[1..]);
    }

    #[test]
    fn long_names_resolve_case_insensitively() {
        let mut img = TestImage::new(Layout::fat12());
        let short = *b"MYDOCU~1TXT";
        let frags = lfn_entries("My Document.txt", &short);
        for (slot, frag) in frags.iter().enumerate() {
            img.put_root(slot, frag);
        }
        img.put_root(frags.len(), &short_entry(&short, 0x20, 0, 0));
        let fs = FileSystem::mount(img.bytes, FsOptions::default()).unwrap();
        assert_eq!(lookup(&fs, "/my document.TXT").unwrap().name(), "My Document.txt");
        assert_eq!(lookup(&fs, "/mydocu~1.txt"), Err(FsError::NotExist));
    }
}

//! Mount a FAT image and print its geometry, optionally listing paths.
//!
//! ```text
//! fatimg [-c] [-o offset] [-v]... image [path...]
//! ```

mod logger;

use std::{env, process};

use blockdev::{BlockDev, ImageFile, OffsetDev};
use fat::{FileSystem, FsError, FsOptions};
use log::info;

/// Where the volume starts in the boot images this tool was written for.
const DEFAULT_OFFSET: u64 = 0x7e00;

const USAGE: &str = "usage: fatimg [-c] [-o offset] [-v]... image [path...]";

#[derive(Debug, PartialEq)]
struct Args {
    case_sensitive: bool,
    offset:         u64,
    verbosity:      u8,
    image:          String,
    paths:          Vec<String>,
}

/// Decimal, or hex with a `0x` prefix.
fn parse_offset(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut args = args.into_iter();
    let mut case_sensitive = false;
    let mut offset = DEFAULT_OFFSET;
    let mut verbosity = 0u8;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" => case_sensitive = true,
            "-v" => verbosity = verbosity.saturating_add(1),
            "-o" => {
                let value = args.next().ok_or("-o needs a value")?;
                offset = parse_offset(&value).ok_or_else(|| format!("bad offset {value:?}"))?;
            }
            "--" => {
                positional.extend(args.by_ref());
            }
            s if s.starts_with("-o") => {
                offset = parse_offset(&s[2..]).ok_or_else(|| format!("bad offset {:?}", &s[2..]))?;
            }
            s if s.starts_with('-') && s.len() > 1 => return Err(format!("unknown flag {s}")),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let image = positional.next().ok_or("missing image")?;
    Ok(Args { case_sensitive, offset, verbosity, image, paths: positional.collect() })
}

/// Print a directory listing or a file size for `path`.
fn show<D: BlockDev>(fs: &FileSystem<D>, path: &str) -> Result<(), FsError> {
    let entry = fs.stat(path)?;
    if !entry.is_dir() {
        println!("{path}: {} bytes", entry.len());
        return Ok(());
    }

    println!("\n{path}:");
    for e in fs.read_dir(path)? {
        let kind = if e.is_dir() { 'd' } else { '-' };
        println!(
            "{kind}{:03o} {:>10} {} {}",
            e.mode() & 0o777,
            e.len(),
            e.modified(),
            e.name()
        );
    }
    Ok(())
}

fn run(args: &Args) -> Result<(), String> {
    let image = ImageFile::open(&args.image).map_err(|e| format!("{}: {e}", args.image))?;
    let options = FsOptions { case_sensitive: args.case_sensitive };
    let fs = FileSystem::mount(OffsetDev::new(image, args.offset), options)
        .map_err(|e| format!("{}: {e}", args.image))?;
    info!("mounted {} at offset {:#x}", args.image, args.offset);

    println!("{}", fs.geometry());
    for path in &args.paths {
        show(&fs, path).map_err(|e| format!("{path}: {e}"))?;
    }
    Ok(())
}

fn main() {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("fatimg: {msg}");
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    if let Err(e) = logger::init(logger::level_for(args.verbosity)) {
        eprintln!("fatimg: {e}");
    }

    if let Err(msg) = run(&args) {
        eprintln!("fatimg: {msg}");
        process::exit(1);
    }
}

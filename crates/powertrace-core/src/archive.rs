//! Bundle analysis outputs into a single `.tar.gz`.
//!
//! Files are stored flat under their base names. Only regular files are
//! written, so a minimal ustar header is all that is needed.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use flate2::Compression;
use flate2::write::GzEncoder;

const BLOCK: usize = 512;

/// Default archive name for a telemetry source file.
pub fn default_archive_name(src: &Path) -> String {
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "telemetry".to_string());
    format!("{stem}-telemetry-plots.tar.gz")
}

/// Write `files` into `out_dir/name` as a gzip-compressed tar archive.
///
/// Paths that do not exist are skipped.
pub fn bundle(out_dir: &Path, files: &[PathBuf], name: &str) -> io::Result<PathBuf> {
    let archive_path = out_dir.join(name);
    let file = File::create(&archive_path)?;
    let mut gz = GzEncoder::new(BufWriter::new(file), Compression::default());

    let mut count = 0usize;
    for path in files {
        if !path.is_file() {
            log::debug!("archive: skipping missing {}", path.display());
            continue;
        }
        append_file(&mut gz, path)?;
        count += 1;
    }
    // End-of-archive marker: two zero blocks.
    gz.write_all(&[0u8; BLOCK * 2])?;
    gz.finish()?.flush()?;

    log::info!("archived {count} file(s) into {}", archive_path.display());
    Ok(archive_path)
}

fn append_file<W: Write>(out: &mut W, path: &Path) -> io::Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let data = fs::read(path)?;
    let mtime = fs::metadata(path)?
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());

    out.write_all(&header(&name, data.len() as u64, mtime)?)?;
    out.write_all(&data)?;
    let pad = (BLOCK - data.len() % BLOCK) % BLOCK;
    out.write_all(&vec![0u8; pad])?;
    Ok(())
}

/// Build a ustar header block for a regular file.
fn header(name: &str, size: u64, mtime: u64) -> io::Result<[u8; BLOCK]> {
    if name.len() > 100 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("file name too long for archive: {name}"),
        ));
    }
    let mut h = [0u8; BLOCK];
    h[..name.len()].copy_from_slice(name.as_bytes());
    put_octal(&mut h[100..108], 0o644);
    put_octal(&mut h[108..116], 0);
    put_octal(&mut h[116..124], 0);
    put_octal(&mut h[124..136], size);
    put_octal(&mut h[136..148], mtime);
    h[156] = b'0';
    h[257..263].copy_from_slice(b"ustar\0");
    h[263..265].copy_from_slice(b"00");

    // Checksum is computed with its own field filled with spaces.
    h[148..156].fill(b' ');
    let sum: u32 = h.iter().map(|&b| u32::from(b)).sum();
    let digits = format!("{sum:06o}");
    h[148..154].copy_from_slice(digits.as_bytes());
    h[154] = 0;
    h[155] = b' ';
    Ok(h)
}

/// Zero-padded octal, NUL-terminated, filling `field`.
fn put_octal(field: &mut [u8], value: u64) {
    let width = field.len() - 1;
    let digits = format!("{value:0width$o}");
    let bytes = digits.as_bytes();
    let start = bytes.len().saturating_sub(width);
    field[..width].copy_from_slice(&bytes[start..]);
    field[width] = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn read_octal(field: &[u8]) -> u64 {
        let s: String = field
            .iter()
            .take_while(|&&b| b != 0 && b != b' ')
            .map(|&b| b as char)
            .collect();
        u64::from_str_radix(&s, 8).unwrap()
    }

    #[test]
    fn default_name_uses_stem() {
        assert_eq!(
            default_archive_name(Path::new("/tmp/power_log_20250730.jsonl")),
            "power_log_20250730-telemetry-plots.tar.gz"
        );
    }

    #[test]
    fn header_checksum_is_valid() {
        let h = header("a.csv", 1234, 1_700_000_000).unwrap();
        let stored = read_octal(&h[148..156]);
        let mut copy = h;
        copy[148..156].fill(b' ');
        let sum: u64 = copy.iter().map(|&b| u64::from(b)).sum();
        assert_eq!(stored, sum);
        assert_eq!(read_octal(&h[124..136]), 1234);
        assert_eq!(&h[257..262], b"ustar");
    }

    #[test]
    fn long_names_are_rejected() {
        let name = "x".repeat(101);
        assert!(header(&name, 0, 0).is_err());
    }

    #[test]
    fn bundle_contains_files_and_skips_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("summary.json");
        let b = tmp.path().join("series.csv");
        std::fs::write(&a, "{\"num_samples\": 1}").unwrap();
        std::fs::write(&b, "x".repeat(700)).unwrap();
        let missing = tmp.path().join("nope.svg");

        let path = bundle(tmp.path(), &[a, b, missing], "out.tar.gz").unwrap();
        let mut raw = Vec::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_end(&mut raw)
            .unwrap();

        // summary.json: header + 1 data block; series.csv: header + 2 data blocks; 2 end blocks.
        assert_eq!(raw.len(), BLOCK * (2 + 3 + 2));
        assert!(raw[..100].starts_with(b"summary.json"));
        assert_eq!(read_octal(&raw[124..136]), 18);
        assert_eq!(&raw[BLOCK..BLOCK + 18], b"{\"num_samples\": 1}");
        let second = BLOCK * 2;
        assert!(raw[second..second + 100].starts_with(b"series.csv"));
        assert_eq!(read_octal(&raw[second + 124..second + 136]), 700);
        assert!(raw[raw.len() - BLOCK * 2..].iter().all(|&b| b == 0));
    }
}

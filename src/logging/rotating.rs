use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Append-only log file that is renamed aside once it reaches `max_bytes`.
///
/// `log.txt` becomes `log_20240101_120000.txt` and a fresh `log.txt` is
/// started. Archived files are never deleted.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    file: File,
    written: u64,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = open_append(&path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            path,
            max_bytes,
            file,
            written,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let archive = archive_path(&self.path, &Local::now().format("%Y%m%d_%H%M%S").to_string());
        fs::rename(&self.path, &archive)?;

        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.max_bytes > 0 && self.written >= self.max_bytes {
            // Keep logging into the oversized file rather than dropping lines
            if let Err(e) = self.rotate() {
                eprintln!("log rotation of {} failed: {}", self.path.display(), e);
            }
        }

        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// `dir/log.txt` + `20240101_120000` -> `dir/log_20240101_120000.txt`,
/// with a numeric suffix if that name is already taken
fn archive_path(path: &Path, stamp: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut candidate = path.with_file_name(format!("{}_{}{}", stem, stamp, ext));
    let mut n = 1;
    while candidate.exists() {
        candidate = path.with_file_name(format!("{}_{}_{}{}", stem, stamp, n, ext));
        n += 1;
    }
    candidate
}

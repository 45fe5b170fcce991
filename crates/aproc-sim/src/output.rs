use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// Run log mirrored from stdout. Set once in main(), read by emit().
static RUN_LOG: OnceLock<Mutex<BufWriter<File>>> = OnceLock::new();

/// Path for this run's JSONL log, creating the directory.
/// Pattern: `<dir>/aproc_<mode>_seed<seed>_<YYYYMMDD-HHMMSS>.jsonl`
pub fn run_log_path(dir: &Path, mode: &str, seed: u64) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let base = format!("aproc_{mode}_seed{seed}_{timestamp}");
    Ok(unused_path(dir, &base))
}

/// First of `base.jsonl`, `base_2.jsonl`, ... that does not exist yet.
fn unused_path(dir: &Path, base: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{base}.jsonl"));
    let mut n = 2;
    while candidate.exists() {
        candidate = dir.join(format!("{base}_{n}.jsonl"));
        n += 1;
    }
    candidate
}

pub fn open_run_log(path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    RUN_LOG
        .set(Mutex::new(BufWriter::new(file)))
        .map_err(|_| io::Error::new(io::ErrorKind::AlreadyExists, "run log already open"))
}

pub fn append_line(line: &str) {
    if let Some(log) = RUN_LOG.get() {
        if let Ok(mut w) = log.lock() {
            let _ = writeln!(w, "{line}");
        }
    }
}

/// Flush buffered lines; called once the run is over.
pub fn flush() {
    if let Some(log) = RUN_LOG.get() {
        if let Ok(mut w) = log.lock() {
            let _ = w.flush();
        }
    }
}

//! Split planning over the `<root>/<MMDD>/<stock>/snapshot.csv` tree.
//!
//! Days are discovered from the root's immediate children in enumeration
//! order; that order also fixes which output writer owns which day. Within
//! a day the stock files are cut into at most `min(8, hardware threads)`
//! runs of consecutive files, and a chunk never crosses a day boundary —
//! the per-day routing downstream depends on that.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use crate::error::{Error, Result};

/// Chunk-count cap per day. The target host runs few physical cores; more
/// chunks than this costs cache locality without adding throughput.
pub const MAX_WORKERS: usize = 8;

const SNAPSHOT_FILE: &str = "snapshot.csv";

/// One trading day: its `MMDD` name and the per-chunk file lists.
#[derive(Debug, Clone)]
pub struct DayPlan {
    pub day: String,
    pub chunks: Vec<Vec<PathBuf>>,
}

impl DayPlan {
    pub fn file_count(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }
}

/// Immutable plan shared by all workers.
#[derive(Debug)]
pub struct SplitPlan {
    pub days: Vec<DayPlan>,
}

impl SplitPlan {
    /// Scan `root` and build per-day chunks sized for `workers` threads.
    pub fn discover(root: &Path, workers: usize) -> Result<Self> {
        let entries = fs::read_dir(root)?;
        let mut days = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                return Err(Error::InvalidInput(format!(
                    "non-UTF-8 entry under input root: {:?}",
                    entry.path()
                )));
            };
            if !is_day_name(name) {
                return Err(Error::InvalidInput(format!(
                    "input root child is not an MMDD day directory: {name}"
                )));
            }
            let files = day_files(&entry.path())?;
            if files.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "trading day {name} has no {SNAPSHOT_FILE} files"
                )));
            }
            days.push(build_day_plan(name.to_string(), files, workers));
        }
        if days.is_empty() {
            return Err(Error::InvalidInput(
                "no trading-day directories under input root".to_string(),
            ));
        }
        Ok(Self { days })
    }

    pub fn chunk_count(&self) -> usize {
        self.days.iter().map(|d| d.chunks.len()).sum()
    }

    pub fn file_count(&self) -> usize {
        self.days.iter().map(|d| d.file_count()).sum()
    }
}

/// Clamp the driver's thread hint to `min(8, hardware parallelism)`.
pub fn effective_workers(hint: Option<usize>) -> usize {
    let hw = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let cap = MAX_WORKERS.min(hw).max(1);
    match hint {
        Some(h) => h.clamp(1, cap),
        None => cap,
    }
}

fn is_day_name(name: &str) -> bool {
    name.len() == 4 && name.bytes().all(|b| b.is_ascii_digit())
}

/// Stock subdirectories in enumeration order; only those that actually
/// carry a snapshot file contribute.
fn day_files(day_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(day_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let candidate = entry.path().join(SNAPSHOT_FILE);
        if candidate.is_file() {
            files.push(candidate);
        }
    }
    Ok(files)
}

fn build_day_plan(day: String, files: Vec<PathBuf>, workers: usize) -> DayPlan {
    let n = files.len();
    let splits = workers.min(n).max(1);
    let chunk_size = (n + splits - 1) / splits;
    let chunks = files
        .chunks(chunk_size)
        .map(|chunk| chunk.to_vec())
        .collect();
    DayPlan { day, chunks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch_snapshot(root: &Path, day: &str, stock: &str) {
        let dir = root.join(day).join(stock);
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join(SNAPSHOT_FILE), "tradingDay\n").expect("write");
    }

    #[test]
    fn chunks_never_cross_days() {
        let dir = tempdir().expect("tempdir");
        for stock in ["000001", "000002", "000003"] {
            touch_snapshot(dir.path(), "0102", stock);
        }
        touch_snapshot(dir.path(), "0103", "000001");

        let plan = SplitPlan::discover(dir.path(), 8).expect("plan");
        assert_eq!(plan.days.len(), 2);
        for day in &plan.days {
            for chunk in &day.chunks {
                for file in chunk {
                    let day_component = file
                        .parent()
                        .and_then(|p| p.parent())
                        .and_then(|p| p.file_name())
                        .and_then(|n| n.to_str())
                        .unwrap();
                    assert_eq!(day_component, day.day);
                }
            }
        }
    }

    #[test]
    fn chunk_sizes_are_ceil_of_even_split() {
        let dir = tempdir().expect("tempdir");
        for i in 0..7 {
            touch_snapshot(dir.path(), "0102", &format!("{i:06}"));
        }
        let plan = SplitPlan::discover(dir.path(), 3).expect("plan");
        let day = &plan.days[0];
        // 7 files over 3 splits: ceil(7/3) = 3, so 3+3+1
        assert_eq!(day.chunks.len(), 3);
        assert_eq!(day.chunks[0].len(), 3);
        assert_eq!(day.chunks[1].len(), 3);
        assert_eq!(day.chunks[2].len(), 1);
        assert_eq!(day.file_count(), 7);
    }

    #[test]
    fn splits_capped_by_file_count() {
        let dir = tempdir().expect("tempdir");
        touch_snapshot(dir.path(), "0102", "000001");
        touch_snapshot(dir.path(), "0102", "000002");
        let plan = SplitPlan::discover(dir.path(), 8).expect("plan");
        assert_eq!(plan.days[0].chunks.len(), 2);
    }

    #[test]
    fn rejects_bad_trees() {
        let dir = tempdir().expect("tempdir");
        assert!(SplitPlan::discover(&dir.path().join("missing"), 4).is_err());

        // root with no day directories
        assert!(SplitPlan::discover(dir.path(), 4).is_err());

        // non-MMDD child
        fs::create_dir_all(dir.path().join("logs")).expect("mkdir");
        assert!(SplitPlan::discover(dir.path(), 4).is_err());
    }

    #[test]
    fn rejects_empty_day() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("0102").join("000001")).expect("mkdir");
        let err = SplitPlan::discover(dir.path(), 4).unwrap_err();
        assert!(err.to_string().contains("0102"));
    }

    #[test]
    fn worker_hint_is_clamped() {
        assert!(effective_workers(None) >= 1);
        assert!(effective_workers(None) <= MAX_WORKERS);
        assert_eq!(effective_workers(Some(1)), 1);
        assert!(effective_workers(Some(64)) <= MAX_WORKERS);
    }
}

//! Driver-facing entry: plan, fan out, shuffle by day, commit.
//!
//! One merger thread is spawned per discovered trading day, each owning a
//! bounded record channel and that day's output file. Worker threads pull
//! chunks off a shared cursor, fold them through the kernel into private
//! accumulators, and forward the drained cells to the owning day's merger.
//! Mergers stage their CSV to a temp file and hold it until every worker
//! has been joined; only a fully successful map phase commits. Channel
//! back-pressure (workers block on a full channel) keeps peak memory
//! bounded when a merger stalls on I/O.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::agg::{FactorTable, VALUE_WIDTH};
use crate::csv_out::DayCsvWriter;
use crate::plan::{self, SplitPlan};
use crate::reduce::{DayMerger, FactorRecord};
use crate::worker;

/// Bound on each worker→merger channel, in records.
pub const CHANNEL_CAPACITY: usize = 4096;

const LEDGER_FILE: &str = "run_ledger.json";

#[derive(Debug, Default, Clone)]
pub struct JobStats {
    pub days: usize,
    pub files: u64,
    pub rows: u64,
    pub emitted: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunLedger {
    pub input_root: String,
    pub output_root: String,
    pub workers: usize,
    pub files: u64,
    pub rows: u64,
    pub emitted: u64,
    pub days: Vec<DayEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DayEntry {
    pub day: String,
    pub rows: u64,
    pub output: String,
}

#[derive(Debug, Default, Clone)]
struct WorkerTotals {
    files: u64,
    rows: u64,
    emitted: u64,
}

struct DayOutcome {
    day: String,
    rows: u64,
    output: String,
}

/// Process the tree rooted at `input_root` and write one CSV per trading
/// day under `output_root`. `threads` is a hint, clamped to
/// `min(8, hardware parallelism)`.
pub fn run(input_root: &Path, output_root: &Path, threads: Option<usize>) -> Result<JobStats> {
    let workers = plan::effective_workers(threads);
    let split_plan = SplitPlan::discover(input_root, workers)
        .with_context(|| format!("scan input root {}", input_root.display()))?;
    log::info!(
        "plan: {} days, {} files, {} chunks, {} workers",
        split_plan.days.len(),
        split_plan.file_count(),
        split_plan.chunk_count(),
        workers
    );
    for day in &split_plan.days {
        log::debug!(
            "day {}: {} files in {} chunks",
            day.day,
            day.file_count(),
            day.chunks.len()
        );
    }

    fs::create_dir_all(output_root)
        .with_context(|| format!("create output root {}", output_root.display()))?;

    let split_plan = Arc::new(split_plan);
    let day_count = split_plan.days.len();

    // one merger per day; records flow in while workers run, the
    // commit/abort decision arrives after the map phase is judged
    let mut record_txs = Vec::with_capacity(day_count);
    let mut decision_txs = Vec::with_capacity(day_count);
    let mut merger_handles = Vec::with_capacity(day_count);
    for day_plan in split_plan.days.iter() {
        let (record_tx, record_rx) = mpsc::sync_channel::<FactorRecord>(CHANNEL_CAPACITY);
        let (decision_tx, decision_rx) = mpsc::channel::<bool>();
        record_txs.push(record_tx);
        decision_txs.push(decision_tx);

        let day = day_plan.day.clone();
        let out_dir = output_root.to_path_buf();
        let handle = thread::Builder::new()
            .name(format!("merge-{day}"))
            .spawn(move || -> Result<Option<DayOutcome>> {
                let mut merger = DayMerger::new();
                while let Ok(record) = record_rx.recv() {
                    merger.absorb(&record);
                }
                let rows = merger.finalize();

                let mut writer = DayCsvWriter::create(&out_dir, &day)
                    .with_context(|| format!("open output for day {day}"))?;
                for row in &rows {
                    writer
                        .write_row(row.sec_of_day, &row.means)
                        .with_context(|| format!("write day {day}"))?;
                }

                let commit = decision_rx.recv().unwrap_or(false);
                if !commit {
                    writer.abort();
                    return Ok(None);
                }
                let output = writer
                    .commit()
                    .with_context(|| format!("commit day {day}"))?;
                log::info!("committed day {day}: {} rows", rows.len());
                Ok(Some(DayOutcome {
                    day,
                    rows: rows.len() as u64,
                    output: output.display().to_string(),
                }))
            })
            .context("spawn merger thread")?;
        merger_handles.push(handle);
    }

    // flat task list over (day, chunk); workers race on a shared cursor
    let tasks: Arc<Vec<(usize, usize)>> = Arc::new(
        split_plan
            .days
            .iter()
            .enumerate()
            .flat_map(|(d, day)| (0..day.chunks.len()).map(move |c| (d, c)))
            .collect(),
    );
    let cursor = Arc::new(AtomicUsize::new(0));
    let worker_count = workers.min(tasks.len()).max(1);

    let mut worker_handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let split_plan = Arc::clone(&split_plan);
        let tasks = Arc::clone(&tasks);
        let cursor = Arc::clone(&cursor);
        let record_txs = record_txs.clone();
        let handle = thread::Builder::new()
            .name(format!("worker-{worker_id}"))
            .spawn(move || -> Result<WorkerTotals> {
                let mut totals = WorkerTotals::default();
                loop {
                    let index = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(&(day_index, chunk_index)) = tasks.get(index) else {
                        break;
                    };
                    let day_plan = &split_plan.days[day_index];
                    let files = &day_plan.chunks[chunk_index];
                    log::debug!(
                        "worker {worker_id}: day {} chunk {chunk_index} ({} files)",
                        day_plan.day,
                        files.len()
                    );

                    let mut table = FactorTable::new();
                    let stats = worker::process_chunk(files, &mut table).with_context(|| {
                        format!("process chunk {chunk_index} of day {}", day_plan.day)
                    })?;
                    totals.files += stats.files;
                    totals.rows += stats.rows;
                    totals.emitted += stats.emitted;

                    for (packed, vals) in table.entries() {
                        let mut sums = [0.0f64; VALUE_WIDTH];
                        sums.copy_from_slice(vals);
                        record_txs[day_index]
                            .send(FactorRecord { packed, sums })
                            .map_err(|_| {
                                anyhow!("merger for day {} hung up", day_plan.day)
                            })?;
                    }
                }
                Ok(totals)
            })
            .context("spawn worker thread")?;
        worker_handles.push(handle);
    }
    drop(record_txs);

    let mut totals = WorkerTotals::default();
    let mut first_error: Option<anyhow::Error> = None;
    for handle in worker_handles {
        match handle.join() {
            Ok(Ok(worker_totals)) => {
                totals.files += worker_totals.files;
                totals.rows += worker_totals.rows;
                totals.emitted += worker_totals.emitted;
            }
            Ok(Err(err)) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
            Err(_) => {
                if first_error.is_none() {
                    first_error = Some(anyhow!("worker thread panicked"));
                }
            }
        }
    }

    // judge the map phase, then release the mergers
    let commit = first_error.is_none();
    for decision_tx in decision_txs {
        let _ = decision_tx.send(commit);
    }

    let mut outcomes = Vec::with_capacity(day_count);
    for handle in merger_handles {
        match handle.join() {
            Ok(Ok(outcome)) => outcomes.extend(outcome),
            Ok(Err(err)) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
            Err(_) => {
                if first_error.is_none() {
                    first_error = Some(anyhow!("merger thread panicked"));
                }
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }

    let ledger = RunLedger {
        input_root: input_root.display().to_string(),
        output_root: output_root.display().to_string(),
        workers: worker_count,
        files: totals.files,
        rows: totals.rows,
        emitted: totals.emitted,
        days: outcomes
            .iter()
            .map(|o| DayEntry {
                day: o.day.clone(),
                rows: o.rows,
                output: o.output.clone(),
            })
            .collect(),
    };
    write_ledger(output_root, &ledger)?;

    log::info!(
        "done: {} days, {} files, {} rows, {} emitted",
        outcomes.len(),
        totals.files,
        totals.rows,
        totals.emitted
    );
    Ok(JobStats {
        days: outcomes.len(),
        files: totals.files,
        rows: totals.rows,
        emitted: totals.emitted,
    })
}

fn write_ledger(output_root: &Path, ledger: &RunLedger) -> Result<()> {
    let data = serde_json::to_vec_pretty(ledger).context("serialize run ledger")?;
    let path = output_root.join(LEDGER_FILE);
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, &path).with_context(|| format!("rename {}", path.display()))?;
    Ok(())
}

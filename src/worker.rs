//! Chunk worker: the map side of the pipeline.
//!
//! A chunk is an ordered list of snapshot files from one trading day. The
//! worker maps each file, scans it line by line, runs the factor kernel on
//! rows inside the emit window, and folds everything into its private
//! [`FactorTable`]. Lag state belongs to one instrument stream: it is
//! cleared at every file boundary and whenever the trade time runs
//! backwards mid-stream.

use std::fs::File;
use std::path::PathBuf;

use memmap2::Mmap;

use crate::agg::{packed_key, FactorTable};
use crate::error::Result;
use crate::factors::{self, Derived, LagState, FACTOR_COUNT};
use crate::parse::{scan_line, RowScratch};

#[derive(Debug, Default, Clone)]
pub struct ChunkStats {
    pub files: u64,
    pub rows: u64,
    pub emitted: u64,
}

/// Process every file of one chunk into `table`.
pub fn process_chunk(files: &[PathBuf], table: &mut FactorTable) -> Result<ChunkStats> {
    let mut stats = ChunkStats::default();
    let mut lag = LagState::new();
    let mut row = RowScratch::default();
    let mut out = [0.0f64; FACTOR_COUNT];

    for path in files {
        lag.reset();
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            stats.files += 1;
            continue;
        }
        let mmap = unsafe { Mmap::map(&file)? };
        for line in mmap.split(|&b| b == b'\n') {
            if !scan_line(line, &mut row) {
                continue;
            }
            stats.rows += 1;

            // a time running backwards means the stream restarted
            if lag.has_prev && row.sec_of_day < lag.prev_trade_time {
                lag.has_prev = false;
            }

            let derived = Derived::from_row(&row);
            if row.in_window {
                factors::compute(&derived, row.t_bid_vol, row.t_ask_vol, &lag, &mut out);
                table.accumulate(packed_key(row.day_id, row.sec_of_day), &out);
                stats.emitted += 1;
            }
            // rows outside the window still become t-1 for the next row
            lag.update(&derived, row.sec_of_day);
        }
        stats.files += 1;
    }

    Ok(stats)
}

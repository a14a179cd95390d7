//! Day merger: the reduce side of the pipeline.
//!
//! Every worker that touched a trading day forwards its drained
//! `(packed key, sum[20], count)` records here. The merger folds them into
//! a second-level [`FactorTable`], then finalizes each cell to the
//! cross-sectional mean, narrowing to `f32` only at that last step. Live
//! slots always carry `count > 0`, so finalize divides unconditionally.

use crate::agg::{sec_of_day, FactorTable, VALUE_WIDTH};
use crate::factors::FACTOR_COUNT;

/// One drained accumulator cell, the unit of the worker→merger shuffle.
#[derive(Debug, Clone)]
pub struct FactorRecord {
    pub packed: i32,
    pub sums: [f64; VALUE_WIDTH],
}

/// Finalized output row for one sampled time.
#[derive(Debug, Clone)]
pub struct MeanRow {
    pub sec_of_day: i32,
    pub means: [f32; FACTOR_COUNT],
}

#[derive(Default)]
pub struct DayMerger {
    table: FactorTable,
}

impl DayMerger {
    pub fn new() -> Self {
        Self {
            table: FactorTable::new(),
        }
    }

    pub fn absorb(&mut self, record: &FactorRecord) {
        self.table.combine(record.packed, &record.sums);
    }

    /// Mean out every live cell and return rows in ascending time order.
    pub fn finalize(self) -> Vec<MeanRow> {
        let mut rows: Vec<MeanRow> = self
            .table
            .entries()
            .map(|(packed, vals)| {
                let inv_count = 1.0 / vals[FACTOR_COUNT];
                let mut means = [0.0f32; FACTOR_COUNT];
                for (i, mean) in means.iter_mut().enumerate() {
                    *mean = (vals[i] * inv_count) as f32;
                }
                MeanRow {
                    sec_of_day: sec_of_day(packed),
                    means,
                }
            })
            .collect();
        rows.sort_unstable_by_key(|row| row.sec_of_day);
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agg::packed_key;

    fn record(packed: i32, base: f64, count: f64) -> FactorRecord {
        let mut sums = [0.0; VALUE_WIDTH];
        for i in 0..FACTOR_COUNT {
            sums[i] = base * (i as f64 + 1.0);
        }
        sums[FACTOR_COUNT] = count;
        FactorRecord { packed, sums }
    }

    #[test]
    fn means_combine_across_workers() {
        let key = packed_key(102, 34_200);
        let mut merger = DayMerger::new();
        // two workers contributed partial sums for the same time
        merger.absorb(&record(key, 10.0, 2.0));
        merger.absorb(&record(key, 5.0, 3.0));

        let rows = merger.finalize();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.sec_of_day, 34_200);
        for i in 0..FACTOR_COUNT {
            let expected = (15.0 * (i as f64 + 1.0) / 5.0) as f32;
            assert_eq!(row.means[i], expected);
        }
    }

    #[test]
    fn rows_sorted_by_time() {
        let mut merger = DayMerger::new();
        merger.absorb(&record(packed_key(102, 53_997), 1.0, 1.0));
        merger.absorb(&record(packed_key(102, 34_200), 2.0, 1.0));
        merger.absorb(&record(packed_key(102, 46_800), 3.0, 1.0));

        let times: Vec<i32> = merger.finalize().iter().map(|r| r.sec_of_day).collect();
        assert_eq!(times, vec![34_200, 46_800, 53_997]);
    }
}

//! Per-day CSV output with commit/abort semantics.
//!
//! Rows are staged in a reusable line buffer and pushed through a large
//! `BufWriter` so the underlying file sees megabyte-sized writes. The file
//! is created as `<MMDD>.csv.tmp` and renamed to `<MMDD>.csv` on commit;
//! dropping an uncommitted writer removes the temp file.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::factors::FACTOR_COUNT;
use crate::ftoa;

/// Worst-case row: 6 time digits plus 20 comma-prefixed shortest floats.
const LINE_BUF_SIZE: usize = 1024;
const OUT_BUF_SIZE: usize = 1 << 20;

fn header_bytes() -> Vec<u8> {
    let mut header = String::with_capacity(256);
    header.push_str("tradeTime");
    for i in 1..=FACTOR_COUNT {
        header.push_str(",alpha_");
        header.push_str(&i.to_string());
    }
    header.push('\n');
    header.into_bytes()
}

pub struct DayCsvWriter {
    out: BufWriter<File>,
    line: [u8; LINE_BUF_SIZE],
    tmp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl DayCsvWriter {
    /// Open `<out_dir>/<day>.csv.tmp` and write the header.
    pub fn create(out_dir: &Path, day: &str) -> Result<Self> {
        let final_path = out_dir.join(format!("{day}.csv"));
        let tmp_path = out_dir.join(format!("{day}.csv.tmp"));
        let file = File::create(&tmp_path)?;
        let mut out = BufWriter::with_capacity(OUT_BUF_SIZE, file);
        out.write_all(&header_bytes())?;
        Ok(Self {
            out,
            line: [0u8; LINE_BUF_SIZE],
            tmp_path,
            final_path,
            committed: false,
        })
    }

    /// Emit one `HHMMSS,alpha_1,…,alpha_20` row.
    pub fn write_row(&mut self, sec_of_day: i32, factors: &[f32; FACTOR_COUNT]) -> Result<()> {
        let mut pos = write_time(&mut self.line, 0, sec_of_day);
        for &f in factors {
            self.line[pos] = b',';
            pos += 1;
            pos = ftoa::write_shortest(f, &mut self.line, pos);
        }
        self.line[pos] = b'\n';
        pos += 1;
        self.out.write_all(&self.line[..pos])?;
        Ok(())
    }

    /// Flush and rename the temp file into place.
    pub fn commit(mut self) -> Result<PathBuf> {
        self.out.flush()?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        self.committed = true;
        Ok(self.final_path.clone())
    }

    /// Discard the output; the temp file is removed.
    pub fn abort(self) {}
}

impl Drop for DayCsvWriter {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

fn write_time(buf: &mut [u8], mut pos: usize, sec_of_day: i32) -> usize {
    let hh = sec_of_day / 3600;
    let rem = sec_of_day - hh * 3600;
    let mm = rem / 60;
    let ss = rem - mm * 60;
    pos = write_two_digits(buf, pos, hh);
    pos = write_two_digits(buf, pos, mm);
    write_two_digits(buf, pos, ss)
}

#[inline(always)]
fn write_two_digits(buf: &mut [u8], pos: usize, v: i32) -> usize {
    let tens = v / 10;
    buf[pos] = b'0' + tens as u8;
    buf[pos + 1] = b'0' + (v - tens * 10) as u8;
    pos + 2
}

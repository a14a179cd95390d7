use criterion::{black_box, criterion_group, criterion_main, Criterion};

use factormill::agg::{packed_key, FactorTable};
use factormill::factors::{self, Derived, LagState, FACTOR_COUNT};
use factormill::ftoa;
use factormill::parse::{scan_line, RowScratch};

fn sample_line() -> String {
    let mut fields: Vec<String> = vec!["20240104".into(), "093000".into()];
    for i in 0..10 {
        fields.push(format!("{}", 7_000 + i));
    }
    fields.push("1957500".into());
    fields.push("5143750".into());
    for i in 0..3 {
        fields.push(format!("{}", 8_000 + i));
    }
    for level in 0..10u32 {
        fields.push(format!("{}", 254_100 - level * 100));
        fields.push(format!("{}", 200 + level * 37));
        fields.push(format!("{}", 254_200 + level * 100));
        fields.push(format!("{}", 12_700 + level * 53));
    }
    fields.join(",")
}

fn bench_scan_line(c: &mut Criterion) {
    let line = sample_line();
    let bytes = line.as_bytes();
    let mut row = RowScratch::default();
    c.bench_function("scan_line", |b| {
        b.iter(|| {
            assert!(scan_line(black_box(bytes), &mut row));
            black_box(row.sec_of_day)
        })
    });
}

fn bench_kernel(c: &mut Criterion) {
    let line = sample_line();
    let mut row = RowScratch::default();
    assert!(scan_line(line.as_bytes(), &mut row));
    let derived = Derived::from_row(&row);
    let mut lag = LagState::new();
    lag.update(&derived, row.sec_of_day - 3);
    let mut out = [0.0f64; FACTOR_COUNT];
    c.bench_function("factor_kernel", |b| {
        b.iter(|| {
            factors::compute(
                black_box(&derived),
                row.t_bid_vol,
                row.t_ask_vol,
                &lag,
                &mut out,
            );
            black_box(out[0])
        })
    });
}

fn bench_accumulate(c: &mut Criterion) {
    let factors = [1.25f64; FACTOR_COUNT];
    c.bench_function("table_accumulate", |b| {
        b.iter(|| {
            let mut table = FactorTable::new();
            for sec in (34_200..41_400).step_by(3) {
                table.accumulate(packed_key(104, sec), black_box(&factors));
            }
            black_box(table.len())
        })
    });
}

fn bench_write_shortest(c: &mut Criterion) {
    let values = [0.00039346805f32, 254_150.0, -0.96899223, 1.5, 69_300.0];
    let mut buf = [0u8; 64];
    c.bench_function("write_shortest", |b| {
        b.iter(|| {
            let mut pos = 0;
            for &v in &values {
                pos = ftoa::write_shortest(black_box(v), &mut buf, 0).max(pos);
            }
            black_box(pos)
        })
    });
}

criterion_group!(
    benches,
    bench_scan_line,
    bench_kernel,
    bench_accumulate,
    bench_write_shortest
);
criterion_main!(benches);

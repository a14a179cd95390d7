//! Twenty-factor order-book kernel.
//!
//! Factors are computed from the top five book levels plus the total
//! bid/ask volumes; alpha_17/18/19 additionally reference the previous
//! snapshot of the same instrument stream (lag-one state). Every division
//! goes through a precomputed `1 / (denom + EPSILON)` inverse so an empty
//! book still yields finite values.

use crate::parse::RowScratch;

pub const FACTOR_COUNT: usize = 20;

const EPSILON: f64 = 1.0e-7;

/// Depth weights `1/i` for levels 1..5. The third entry is pinned to the
/// truncated constant the historical factor series was produced with.
const DEPTH_WEIGHTS: [f64; 5] = [1.0, 0.5, 0.33333333, 0.25, 0.2];

/// Morning session 09:30:00-11:30:00, afternoon session 13:00:00-15:00:00,
/// both inclusive. Rows outside still feed the lag state.
#[inline(always)]
pub fn in_emit_window(sec_of_day: i32) -> bool {
    (34_200..=41_400).contains(&sec_of_day) || (46_800..=54_000).contains(&sec_of_day)
}

/// Lag-one state for one instrument stream. Reset on every file boundary
/// and whenever the trade time runs backwards.
#[derive(Debug, Clone)]
pub struct LagState {
    pub has_prev: bool,
    pub prev_ap1: f64,
    pub prev_bp1: f64,
    pub prev_sum_bid_volumes: f64,
    pub prev_sum_ask_volumes: f64,
    pub prev_trade_time: i32,
}

impl LagState {
    pub fn new() -> Self {
        Self {
            has_prev: false,
            prev_ap1: 0.0,
            prev_bp1: 0.0,
            prev_sum_bid_volumes: 0.0,
            prev_sum_ask_volumes: 0.0,
            prev_trade_time: i32::MIN,
        }
    }

    pub fn reset(&mut self) {
        self.has_prev = false;
        self.prev_trade_time = i32::MIN;
    }

    /// Record the current row as t-1 for the next one.
    pub fn update(&mut self, d: &Derived, sec_of_day: i32) {
        self.has_prev = true;
        self.prev_ap1 = d.ap1;
        self.prev_bp1 = d.bp1;
        self.prev_sum_bid_volumes = d.sum_bid_volumes;
        self.prev_sum_ask_volumes = d.sum_ask_volumes;
        self.prev_trade_time = sec_of_day;
    }
}

impl Default for LagState {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-row aggregates over levels 1..5, computed once and shared by the
/// factor formulas and the lag update.
#[derive(Debug, Clone, Copy)]
pub struct Derived {
    pub bp1: f64,
    pub bv1: f64,
    pub ap1: f64,
    pub av1: f64,
    pub sum_bid_volumes: f64,
    pub sum_ask_volumes: f64,
    pub sum_bid_weighted_price: f64,
    pub sum_ask_weighted_price: f64,
    pub weighted_bid_depth: f64,
    pub weighted_ask_depth: f64,
}

impl Derived {
    pub fn from_row(row: &RowScratch) -> Self {
        let mut d = Derived {
            bp1: row.bp[0] as f64,
            bv1: row.bv[0] as f64,
            ap1: row.ap[0] as f64,
            av1: row.av[0] as f64,
            sum_bid_volumes: 0.0,
            sum_ask_volumes: 0.0,
            sum_bid_weighted_price: 0.0,
            sum_ask_weighted_price: 0.0,
            weighted_bid_depth: 0.0,
            weighted_ask_depth: 0.0,
        };
        for i in 0..5 {
            let bp = row.bp[i] as f64;
            let bv = row.bv[i] as f64;
            let ap = row.ap[i] as f64;
            let av = row.av[i] as f64;
            d.sum_bid_volumes += bv;
            d.sum_ask_volumes += av;
            d.sum_bid_weighted_price += bp * bv;
            d.sum_ask_weighted_price += ap * av;
            d.weighted_bid_depth += bv * DEPTH_WEIGHTS[i];
            d.weighted_ask_depth += av * DEPTH_WEIGHTS[i];
        }
        d
    }
}

/// Fill `out` with alpha_1..alpha_20 for one snapshot. Pure in its inputs;
/// the caller owns the lag update.
pub fn compute(
    d: &Derived,
    t_bid_vol: u32,
    t_ask_vol: u32,
    lag: &LagState,
    out: &mut [f64; FACTOR_COUNT],
) {
    let spread = d.ap1 - d.bp1;
    let mid_price = 0.5 * (d.ap1 + d.bp1);
    let depth_diff = d.sum_bid_volumes - d.sum_ask_volumes;

    let inv_mid = 1.0 / (mid_price + EPSILON);
    let inv_bv_av = 1.0 / ((d.bv1 + d.av1) + EPSILON);
    let inv_depth_sum = 1.0 / ((d.sum_bid_volumes + d.sum_ask_volumes) + EPSILON);
    let inv_sum_ask = 1.0 / (d.sum_ask_volumes + EPSILON);
    let inv_sum_bid = 1.0 / (d.sum_bid_volumes + EPSILON);
    let inv_total_vol = 1.0 / ((t_bid_vol as f64 + t_ask_vol as f64) + EPSILON);
    let inv_weighted_depth_sum = 1.0 / ((d.weighted_bid_depth + d.weighted_ask_depth) + EPSILON);

    out[0] = spread;
    out[1] = spread * inv_mid;
    out[2] = mid_price;
    out[3] = (d.bv1 - d.av1) * inv_bv_av;
    out[4] = depth_diff * inv_depth_sum;
    out[5] = d.sum_bid_volumes;
    out[6] = d.sum_ask_volumes;
    out[7] = depth_diff;
    out[8] = d.sum_bid_volumes * inv_sum_ask;
    out[9] = (t_bid_vol as f64 - t_ask_vol as f64) * inv_total_vol;
    out[10] = d.sum_bid_weighted_price * inv_sum_bid;
    out[11] = d.sum_ask_weighted_price * inv_sum_ask;
    out[12] = (d.sum_bid_weighted_price + d.sum_ask_weighted_price) * inv_depth_sum;
    out[13] = out[11] - out[10];
    out[14] = depth_diff / 5.0;
    out[15] = (d.weighted_bid_depth - d.weighted_ask_depth) * inv_weighted_depth_sum;
    if lag.has_prev {
        out[16] = d.ap1 - lag.prev_ap1;
        out[17] = 0.5 * ((d.ap1 + d.bp1) - (lag.prev_ap1 + lag.prev_bp1));
        let prev_inv_sum_ask = 1.0 / (lag.prev_sum_ask_volumes + EPSILON);
        out[18] = d.sum_bid_volumes * inv_sum_ask - lag.prev_sum_bid_volumes * prev_inv_sum_ask;
    } else {
        out[16] = 0.0;
        out[17] = 0.0;
        out[18] = 0.0;
    }
    out[19] = spread * inv_depth_sum;
}

//! Linear interpolation helpers shared by the boundary resolver and the
//! trigger-level resampling stages.

/// Two-point line evaluated at `ts_final`.
///
/// The line passes through `(ts1, val1)` and `(ts2, val2)`; `ts_final` may lie
/// outside that interval, in which case the line is extrapolated.
pub fn linear_approx(val1: f64, ts1: f64, val2: f64, ts2: f64, ts_final: f64) -> f64 {
    let slope = (val2 - val1) / (ts2 - ts1);
    let intercept = val1 - ts1 * slope;
    ts_final * slope + intercept
}

/// Piecewise-linear interpolation of `(xp, fp)` at every point of `x`.
///
/// Points left of `xp[0]` take `fp[0]` and points right of the last sample
/// take the last value. `xp` must be increasing and the same length as `fp`.
pub fn interp(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    debug_assert_eq!(xp.len(), fp.len());
    if xp.is_empty() {
        return vec![f64::NAN; x.len()];
    }
    let last = xp.len() - 1;

    x.iter()
        .map(|&t| {
            if t <= xp[0] {
                return fp[0];
            }
            if t >= xp[last] {
                return fp[last];
            }
            // First index with xp[i] >= t; 1 <= i <= last here
            let i = xp.partition_point(|&v| v < t);
            if xp[i] == t {
                fp[i]
            } else {
                linear_approx(fp[i - 1], xp[i - 1], fp[i], xp[i], t)
            }
        })
        .collect()
}

/// Interpolated value of `(xp, fp)` at a single point.
pub fn interp_at(t: f64, xp: &[f64], fp: &[f64]) -> f64 {
    interp(&[t], xp, fp)[0]
}

/// `num` evenly spaced points over `[start, end]`, both ends included.
pub fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (num - 1) as f64;
            let mut points: Vec<f64> = (0..num).map(|i| start + step * i as f64).collect();
            points[num - 1] = end;
            points
        }
    }
}

/// Round to a fixed number of decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

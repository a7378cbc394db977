//! Order statistics and dispersion over a group's collected samples.

/// Percentile of `samples` for `fraction` in `[0, 1]`, `None` when there are no samples.
///
/// Uses the `p * (n + 1)` position estimate with linear interpolation between neighbors;
/// positions before the first or past the last sample clamp to that sample. Sorts in place.
pub fn percentile(samples: &mut [f64], fraction: f64) -> Option<f64> {
    let n = samples.len();
    if n == 0 {
        return None;
    }
    samples.sort_by(f64::total_cmp);
    if n == 1 {
        return Some(samples[0]);
    }

    let pos = fraction * (n as f64 + 1.0);
    if pos < 1.0 {
        return Some(samples[0]);
    }
    if pos >= n as f64 {
        return Some(samples[n - 1]);
    }
    let floor = pos.floor();
    let lower = samples[floor as usize - 1];
    let upper = samples[floor as usize];
    Some(lower + (pos - floor) * (upper - lower))
}

pub fn median(samples: &mut [f64]) -> Option<f64> {
    percentile(samples, 0.5)
}

/// Population standard deviation (divides by `n`).
pub fn standard_deviation(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    // Welford.
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for (i, &x) in samples.iter().enumerate() {
        let delta = x - mean;
        mean += delta / (i + 1) as f64;
        m2 += delta * (x - mean);
    }
    Some((m2 / samples.len() as f64).sqrt())
}

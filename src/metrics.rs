use crate::model::SendResult;

/// Compute metrics (mean, median, 25th percentile, 75th percentile) from samples
pub fn compute_metrics(samples: &[f64]) -> Option<(f64, f64, f64, f64)> {
    if samples.len() < 2 {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    let mean = samples.iter().sum::<f64>() / n as f64;
    let median = sorted[n / 2];
    let p25 = sorted[n / 4];
    let p75 = sorted[3 * n / 4];
    Some((mean, median, p25, p75))
}

/// Dispatch round-trip times (ms) of every result that reached the API.
pub fn dispatch_latencies_ms(results: &[SendResult]) -> Vec<f64> {
    results
        .iter()
        .filter_map(|r| r.elapsed_ms)
        .map(|ms| ms as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_two_samples() {
        assert!(compute_metrics(&[]).is_none());
        assert!(compute_metrics(&[3.0]).is_none());
    }

    #[test]
    fn quartiles_from_sorted_positions() {
        let (mean, median, p25, p75) = compute_metrics(&[400.0, 100.0, 300.0, 200.0]).unwrap();
        assert!((mean - 250.0).abs() < 1e-9);
        assert_eq!(median, 300.0);
        assert_eq!(p25, 200.0);
        assert_eq!(p75, 400.0);
    }
}

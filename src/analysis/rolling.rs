/// Trailing simple moving average; `None` until a full window is available.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling(values, window, |slice| {
        slice.iter().sum::<f64>() / slice.len() as f64
    })
}

/// Trailing maximum over `window` values.
pub fn rolling_max(values: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling(values, window, |slice| {
        slice.iter().copied().fold(f64::MIN, f64::max)
    })
}

/// Trailing minimum over `window` values.
pub fn rolling_min(values: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling(values, window, |slice| {
        slice.iter().copied().fold(f64::MAX, f64::min)
    })
}

fn rolling<F>(values: &[f64], window: usize, reduce: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    if window == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|idx| {
            (idx + 1 >= window).then(|| reduce(&values[idx + 1 - window..=idx]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_mean_alignment() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(
            rolling_mean(&values, 3),
            vec![None, None, Some(2.0), Some(3.0), Some(4.0)]
        );
    }

    #[test]
    fn test_rolling_extremes() {
        let values = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0];
        assert_eq!(
            rolling_max(&values, 3),
            vec![None, None, Some(4.0), Some(4.0), Some(5.0), Some(9.0), Some(9.0)]
        );
        assert_eq!(
            rolling_min(&values, 3),
            vec![None, None, Some(1.0), Some(1.0), Some(1.0), Some(1.0), Some(2.0)]
        );
    }

    #[test]
    fn test_window_longer_than_input() {
        assert_eq!(rolling_mean(&[1.0, 2.0], 3), vec![None, None]);
        assert!(rolling_max(&[], 3).is_empty());
        assert_eq!(rolling_min(&[1.0], 0), vec![None]);
    }
}

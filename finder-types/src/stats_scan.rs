//! StatsScan - single pass statistics over floating point pixel data
//!
//! Computes min, max, mean and population variance with Welford's update in
//! one pass. Non-finite values (NaN, ±inf) are skipped and counted rather than
//! poisoning the result, since flux arrays routinely carry masked pixels.
//!
//! Order statistics (`median`, `percentile`) need the data itself and are
//! provided as free functions operating on a scratch slice.

use num_traits::float::Float;
use std::fmt;
use thiserror::Error;

/// Error types for StatsScan operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("No finite data provided ({skipped} non-finite values skipped)")]
    NoData { skipped: usize },
    #[error("Percentile {0} is outside [0, 100]")]
    InvalidPercentile(f64),
}

/// Running statistics over the finite values of a slice.
#[derive(Debug, Clone)]
pub struct StatsScan<T: Float> {
    min_value: Option<T>,
    max_value: Option<T>,
    mean: T,
    m2: T,
    count: usize,
    skipped: usize,
}

impl<T: Float + fmt::Debug> StatsScan<T> {
    /// Scan a slice of values.
    pub fn new(data: &[T]) -> Self {
        Self::from_iter_values(data.iter().copied())
    }

    /// Scan any iterator of values, e.g. `array.iter().copied()` for a
    /// non-contiguous ndarray view.
    pub fn from_iter_values<I: IntoIterator<Item = T>>(values: I) -> Self {
        let mut scan = Self {
            min_value: None,
            max_value: None,
            mean: T::zero(),
            m2: T::zero(),
            count: 0,
            skipped: 0,
        };
        for value in values {
            scan.push(value);
        }
        scan
    }

    /// Fold one more value into the scan.
    pub fn push(&mut self, value: T) {
        if !value.is_finite() {
            self.skipped += 1;
            return;
        }

        self.count += 1;
        // count always fits in any float type we are instantiated with
        let n = T::from(self.count).unwrap_or_else(T::one);
        let delta = value - self.mean;
        self.mean = self.mean + delta / n;
        self.m2 = self.m2 + delta * (value - self.mean);

        self.min_value = Some(match self.min_value {
            Some(min) if min <= value => min,
            _ => value,
        });
        self.max_value = Some(match self.max_value {
            Some(max) if max >= value => max,
            _ => value,
        });
    }

    fn no_data(&self) -> StatsError {
        StatsError::NoData {
            skipped: self.skipped,
        }
    }

    /// Smallest finite value.
    pub fn min(&self) -> Result<T, StatsError> {
        self.min_value.ok_or_else(|| self.no_data())
    }

    /// Largest finite value.
    pub fn max(&self) -> Result<T, StatsError> {
        self.max_value.ok_or_else(|| self.no_data())
    }

    /// Arithmetic mean of the finite values.
    pub fn mean(&self) -> Result<T, StatsError> {
        if self.count == 0 {
            Err(self.no_data())
        } else {
            Ok(self.mean)
        }
    }

    /// Population variance of the finite values.
    pub fn variance(&self) -> Result<T, StatsError> {
        if self.count == 0 {
            return Err(self.no_data());
        }
        let n = T::from(self.count).unwrap_or_else(T::one);
        Ok(self.m2 / n)
    }

    /// Population standard deviation of the finite values.
    pub fn std_dev(&self) -> Result<T, StatsError> {
        Ok(self.variance()?.sqrt())
    }

    /// Number of finite values folded in.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of non-finite values that were skipped.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Median of the finite values in `values`.
///
/// The slice is reordered in place. For an even count the mean of the two
/// central values is returned.
pub fn median<T: Float>(values: &mut [T]) -> Result<T, StatsError> {
    let total = values.len();
    let finite = partition_finite(values);
    let n = finite.len();
    if n == 0 {
        return Err(StatsError::NoData { skipped: total });
    }

    let mid = n / 2;
    let (lower, upper, _) = finite.select_nth_unstable_by(mid, |a, b| {
        a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
    });
    let upper = *upper;
    if n % 2 == 1 {
        return Ok(upper);
    }
    let lower_max = lower
        .iter()
        .copied()
        .fold(T::neg_infinity(), |acc, v| if v > acc { v } else { acc });
    let two = T::one() + T::one();
    Ok((lower_max + upper) / two)
}

/// The `p`-th percentile (0..=100) of the finite values in `values`, using
/// linear interpolation between closest ranks.
///
/// The slice is reordered in place.
pub fn percentile<T: Float>(values: &mut [T], p: f64) -> Result<T, StatsError> {
    if !(0.0..=100.0).contains(&p) {
        return Err(StatsError::InvalidPercentile(p));
    }
    let total = values.len();
    let finite = partition_finite(values);
    if finite.is_empty() {
        return Err(StatsError::NoData { skipped: total });
    }

    finite.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = p / 100.0 * (finite.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = T::from(rank - lo as f64).unwrap_or_else(T::zero);
    Ok(finite[lo] + (finite[hi] - finite[lo]) * frac)
}

/// Move finite values to the front and return that prefix.
fn partition_finite<T: Float>(values: &mut [T]) -> &mut [T] {
    let mut write = 0;
    for read in 0..values.len() {
        if values[read].is_finite() {
            values.swap(write, read);
            write += 1;
        }
    }
    &mut values[..write]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sky_pixel_moments() {
        // Deviations from 100 are +-1, +-3 and 0: variance 4
        let scanner = StatsScan::new(&[101.0_f64, 99.0, 103.0, 97.0, 100.0]);

        assert_eq!(scanner.count(), 5);
        assert_eq!(scanner.min().unwrap(), 97.0);
        assert_eq!(scanner.max().unwrap(), 103.0);
        assert!((scanner.mean().unwrap() - 100.0).abs() < 1e-12);
        assert!((scanner.variance().unwrap() - 4.0).abs() < 1e-12);
        assert!((scanner.std_dev().unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_push_matches_batch_scan() {
        let values = [0.25_f32, -1.5, 8.0, 3.25];
        let mut streamed = StatsScan::<f32>::new(&[]);
        for &v in &values {
            streamed.push(v);
        }
        let batch = StatsScan::new(&values);

        assert_eq!(streamed.count(), batch.count());
        assert_eq!(streamed.min(), batch.min());
        assert_eq!(streamed.max(), batch.max());
        assert!((streamed.mean().unwrap() - 2.5).abs() < 1e-6);
        assert!((streamed.variance().unwrap() - batch.variance().unwrap()).abs() < 1e-5);
    }

    #[test]
    fn test_non_finite_values_are_skipped() {
        let scanner = StatsScan::<f64>::new(&[1.0, f64::NAN, 3.0, f64::INFINITY]);

        assert_eq!(scanner.count(), 2);
        assert_eq!(scanner.skipped(), 2);
        assert_eq!(scanner.max().unwrap(), 3.0);
        assert!((scanner.mean().unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_data() {
        let scanner = StatsScan::<f64>::new(&[]);
        assert_eq!(scanner.mean(), Err(StatsError::NoData { skipped: 0 }));

        let scanner = StatsScan::<f64>::new(&[f64::NAN, f64::NAN]);
        assert_eq!(scanner.min(), Err(StatsError::NoData { skipped: 2 }));
    }

    #[test]
    fn test_f32_scan() {
        let scanner = StatsScan::<f32>::new(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((scanner.mean().unwrap() - 3.0).abs() < 1e-6);
        assert!((scanner.variance().unwrap() - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_median_odd_and_even() {
        let mut odd = [5.0_f64, 1.0, 3.0];
        assert_eq!(median(&mut odd).unwrap(), 3.0);

        let mut even = [4.0_f64, 1.0, 3.0, 2.0];
        assert_eq!(median(&mut even).unwrap(), 2.5);
    }

    #[test]
    fn test_median_ignores_nan() {
        let mut values = [f64::NAN, 7.0, 1.0, f64::NAN, 4.0];
        assert_eq!(median(&mut values).unwrap(), 4.0);
    }

    #[test]
    fn test_percentile_interpolates() {
        let mut values: Vec<f64> = (0..=10).map(|v| v as f64).collect();
        assert_eq!(percentile(&mut values, 0.0).unwrap(), 0.0);
        assert_eq!(percentile(&mut values, 100.0).unwrap(), 10.0);
        assert!((percentile(&mut values, 25.0).unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_rejects_out_of_range() {
        let mut values = [1.0_f64, 2.0];
        assert_eq!(
            percentile(&mut values, 101.0),
            Err(StatsError::InvalidPercentile(101.0))
        );
    }
}

//! Empirical quantiles and distance summaries.
//!
//! Quantiles are read directly on the sorted sample, without interpolation: the `q`-quantile is
//! the first value whose cumulative weight reaches `q × total weight`. With uniform weights, the
//! median of `[1, 2, 3, 4, 5]` is `3`, and the 0/1 quantiles are the sample extremes.
use std::fmt;

/// Weighted empirical quantile of an ascending sample.
///
/// Arguments
/// -----------------
/// * `q` – quantile in `[0, 1]`.
/// * `sorted` – values in ascending order.
/// * `weights` – one non-negative weight per value; `None` for uniform weights.
///
/// Return
/// ----------
/// * The quantile, or `NaN` for an empty sample or a weight count different from the sample size.
pub fn weighted_quantile(q: f64, sorted: &[f64], weights: Option<&[f64]>) -> f64 {
    if sorted.is_empty() || weights.is_some_and(|w| w.len() != sorted.len()) {
        return f64::NAN;
    }
    let weight = |i: usize| weights.map_or(1.0, |w| w[i]);
    let total: f64 = match weights {
        Some(w) => w.iter().sum(),
        None => sorted.len() as f64,
    };
    let target = q * total;

    let mut cumulative = 0.0;
    for (i, &x) in sorted.iter().enumerate() {
        cumulative += weight(i);
        if cumulative >= target {
            return x;
        }
    }
    sorted[sorted.len() - 1]
}

/// Uniform-weight empirical quantile of an ascending sample.
#[inline]
pub fn quantile(q: f64, sorted: &[f64]) -> f64 {
    weighted_quantile(q, sorted, None)
}

/// Sort a sample in place with the IEEE total order: `-NaN`, `-∞`, finite values, `+∞`, `NaN`.
#[inline]
pub fn sort_sample(values: &mut [f64]) {
    values.sort_unstable_by(f64::total_cmp);
}

/// Median and 95% interval of a sample.
///
/// Display
/// -----------------
/// * `{}` – `median=…, q025=…, q975=…`
/// * `{:#}` – multi-line table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub median: f64,
    pub q025: f64,
    pub q975: f64,
}

impl Summary {
    /// Summarize an ascending sample (`NaN` everywhere if empty).
    pub fn from_sorted(sorted: &[f64]) -> Self {
        Summary {
            median: quantile(0.5, sorted),
            q025: quantile(0.025, sorted),
            q975: quantile(0.975, sorted),
        }
    }

    /// Sort a copy of `values` and summarize it.
    pub fn from_values(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sort_sample(&mut sorted);
        Self::from_sorted(&sorted)
    }

    /// Every figure multiplied by `factor` (e.g. radians to kilometres).
    pub fn scaled(&self, factor: f64) -> Self {
        Summary {
            median: self.median * factor,
            q025: self.q025 * factor,
            q975: self.q975 * factor,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Distance summary")?;
            writeln!(f, "----------------")?;
            writeln!(f, "median : {:.6}", self.median)?;
            writeln!(f, "q025   : {:.6}", self.q025)?;
            write!(f, "q975   : {:.6}", self.q975)
        } else {
            write!(
                f,
                "median={:.6}, q025={:.6}, q975={:.6}",
                self.median, self.q025, self.q975
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_quantiles() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(0.5, &x), 3.0);
        assert_eq!(quantile(0.0, &x), 1.0);
        assert_eq!(quantile(1.0, &x), 5.0);
        assert_eq!(quantile(0.2, &x), 1.0);
        assert_eq!(quantile(0.21, &x), 2.0);
    }

    #[test]
    fn test_weighted_quantile() {
        let x = [1.0, 2.0, 3.0];
        let w = [1.0, 0.0, 3.0];
        assert_eq!(weighted_quantile(0.25, &x, Some(&w)), 1.0);
        assert_eq!(weighted_quantile(0.5, &x, Some(&w)), 3.0);
        assert!(weighted_quantile(0.5, &x, Some(&w[..2])).is_nan());
        assert!(weighted_quantile(0.5, &x, Some(&[1.0; 4])).is_nan());
    }

    #[test]
    fn test_empty_sample() {
        assert!(quantile(0.5, &[]).is_nan());
        let s = Summary::from_values(&[]);
        assert!(s.median.is_nan() && s.q025.is_nan() && s.q975.is_nan());
    }

    #[test]
    fn test_summary() {
        let values: Vec<f64> = (1..=100).rev().map(f64::from).collect();
        let s = Summary::from_values(&values);
        assert_eq!(s.median, 50.0);
        assert_eq!(s.q025, 3.0);
        assert_eq!(s.q975, 98.0);

        let k = s.scaled(2.0);
        assert_eq!(k.median, 100.0);

        assert_eq!(
            format!("{}", Summary::from_values(&[2.0; 4])),
            "median=2.000000, q025=2.000000, q975=2.000000"
        );
    }

    #[test]
    fn test_non_finite_values_sort_last() {
        let s = Summary::from_values(&[f64::INFINITY, 1.0, 2.0]);
        assert_eq!(s.median, 2.0);
        assert!(s.q975.is_infinite());

        let mut v = [f64::NAN, 1.0, -f64::NAN, f64::NEG_INFINITY];
        sort_sample(&mut v);
        assert!(v[0].is_nan() && v[0].is_sign_negative());
        assert_eq!(&v[1..3], &[f64::NEG_INFINITY, 1.0]);
        assert!(v[3].is_nan() && v[3].is_sign_positive());
    }
}

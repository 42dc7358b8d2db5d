//! Age-banded parameter lookup shared by demography, pathogenesis comorbidity scaling, and
//! mortality.

use crate::utils::linear_interpolation;

/// A sorted table of `(upper_bound_years, value)` bands. The first/last bands extend to
/// `-infinity`/`+infinity`: lookups outside the table's range return the nearest band's value.
#[derive(Debug, Clone)]
pub struct AgeBandTable {
    upper_bounds: Vec<f64>,
    values: Vec<f64>,
}

impl AgeBandTable {
    /// # Panics
    /// Panics if `bands` is empty or not sorted ascending by upper bound.
    #[must_use]
    pub fn new(bands: &[(f64, f64)]) -> Self {
        assert!(!bands.is_empty(), "age band table must have at least one band");
        let upper_bounds: Vec<f64> = bands.iter().map(|(a, _)| *a).collect();
        assert!(
            upper_bounds.windows(2).all(|w| w[0] <= w[1]),
            "age band upper bounds must be sorted ascending"
        );
        AgeBandTable {
            upper_bounds,
            values: bands.iter().map(|(_, v)| *v).collect(),
        }
    }

    fn band_index(&self, age_years: f64) -> usize {
        self.upper_bounds.partition_point(|&b| b < age_years)
    }

    /// Piecewise-constant lookup: the value of the band containing `age_years`.
    #[must_use]
    pub fn lookup_piecewise_constant(&self, age_years: f64) -> f64 {
        let idx = self.band_index(age_years).min(self.values.len() - 1);
        self.values[idx]
    }

    /// Piecewise-linear lookup between band midpoints; the first and last bands extend as
    /// constants beyond the table's range.
    #[must_use]
    pub fn lookup_piecewise_linear(&self, age_years: f64) -> f64 {
        let n = self.values.len();
        if n == 1 {
            return self.values[0];
        }
        let midpoints: Vec<f64> = (0..n)
            .map(|i| {
                let lower = if i == 0 { self.upper_bounds[0] } else { self.upper_bounds[i - 1] };
                let upper = self.upper_bounds[i];
                f64::midpoint(lower, upper)
            })
            .collect();

        if age_years <= midpoints[0] {
            return self.values[0];
        }
        if age_years >= midpoints[n - 1] {
            return self.values[n - 1];
        }
        let idx = midpoints.partition_point(|&m| m < age_years);
        let i = idx.max(1) - 1;
        linear_interpolation(
            midpoints[i],
            midpoints[i + 1],
            self.values[i],
            self.values[i + 1],
            age_years,
        )
    }

    /// Returns a new table with every value multiplied by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        AgeBandTable {
            upper_bounds: self.upper_bounds.clone(),
            values: self.values.iter().map(|v| v * factor).collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::AgeBandTable;
    use statrs::assert_almost_eq;

    fn sample_table() -> AgeBandTable {
        // bands: [0, 5) -> 1.0, [5, 15) -> 2.0, [15, inf) -> 3.0
        AgeBandTable::new(&[(5.0, 1.0), (15.0, 2.0), (f64::INFINITY, 3.0)])
    }

    #[test]
    fn test_piecewise_constant_within_band() {
        let t = sample_table();
        assert_almost_eq!(t.lookup_piecewise_constant(2.0), 1.0, 0.0);
        assert_almost_eq!(t.lookup_piecewise_constant(10.0), 2.0, 0.0);
        assert_almost_eq!(t.lookup_piecewise_constant(50.0), 3.0, 0.0);
    }

    #[test]
    fn test_piecewise_constant_extrapolates_last_band() {
        let t = sample_table();
        assert_almost_eq!(t.lookup_piecewise_constant(1000.0), 3.0, 0.0);
    }

    #[test]
    fn test_piecewise_linear_extrapolates_as_constant() {
        let t = sample_table();
        assert_almost_eq!(t.lookup_piecewise_linear(-10.0), 1.0, 0.0);
    }

    #[test]
    fn test_scaled_multiplies_all_values() {
        let t = sample_table().scaled(2.0);
        assert_almost_eq!(t.lookup_piecewise_constant(2.0), 2.0, 0.0);
        assert_almost_eq!(t.lookup_piecewise_constant(10.0), 4.0, 0.0);
    }
}

//! AQI calculator.
//!
//! Pure functions over a [`BreakpointTable`]: no I/O, no clock, no state
//! beyond the shared immutable table.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{AqiCategory, AqiResult, Error, Pollutant, PollutantConcentration};
use tracing::debug;

use crate::breakpoints::{Breakpoint, BreakpointTable, PollutantTable};

/// Reject negative or non-finite readings before they reach [`AqiCalculator::compute`].
///
/// Pollutants without a value are skipped, not treated as zero.
pub fn validate_readings(
    readings: &BTreeMap<Pollutant, Option<f64>>,
) -> Result<Vec<PollutantConcentration>, Error> {
    readings
        .iter()
        .filter_map(|(&pollutant, value)| value.map(|v| (pollutant, v)))
        .map(|(pollutant, v)| PollutantConcentration::new(pollutant, v))
        .collect()
}

/// Converts concentrations into sub-indices and an overall index.
#[derive(Debug, Clone)]
pub struct AqiCalculator {
    table: Arc<BreakpointTable>,
}

impl AqiCalculator {
    pub fn new(table: Arc<BreakpointTable>) -> Self {
        Self { table }
    }

    /// Calculator over the built-in EPA tables.
    pub fn standard() -> Self {
        Self::new(Arc::new(BreakpointTable::standard()))
    }

    pub fn table(&self) -> &BreakpointTable {
        &self.table
    }

    /// Sub-index for one pollutant, or `None` when the table has no rows for it.
    ///
    /// Assumes `concentration >= 0`. Values above the last row clamp to
    /// that row's `index_high`.
    pub fn sub_index(&self, pollutant: Pollutant, concentration: f64) -> Option<u32> {
        let table = self.table.get(pollutant)?;
        interpolate(table, concentration)
    }

    /// Overall AQI for whichever pollutants carry a value.
    ///
    /// Callers must have rejected negative input (see [`validate_readings`]).
    pub fn compute(&self, readings: &BTreeMap<Pollutant, Option<f64>>) -> AqiResult {
        let mut sub_indices = BTreeMap::new();

        for (&pollutant, value) in readings {
            let Some(concentration) = *value else {
                continue;
            };
            match self.sub_index(pollutant, concentration) {
                Some(index) => {
                    sub_indices.insert(pollutant, index);
                }
                None => debug!("No breakpoints for {}; skipping", pollutant),
            }
        }

        let index = sub_indices.values().copied().max().unwrap_or(0);

        AqiResult {
            index,
            category: AqiCategory::from_index(index),
            sub_indices,
        }
    }

    /// [`validate_readings`] followed by [`AqiCalculator::compute`].
    pub fn compute_checked(
        &self,
        readings: &BTreeMap<Pollutant, Option<f64>>,
    ) -> Result<AqiResult, Error> {
        validate_readings(readings)?;
        Ok(self.compute(readings))
    }
}

impl Default for AqiCalculator {
    fn default() -> Self {
        Self::standard()
    }
}

fn interpolate(table: &PollutantTable, concentration: f64) -> Option<u32> {
    let last = table.rows.last()?;

    // Inclusive on both ends; the first matching row wins so a value equal
    // to a row's high bound never spills into the next row.
    if let Some(row) = table.rows.iter().find(|r| {
        concentration >= r.concentration_low && concentration <= r.concentration_high
    }) {
        return Some(linear(row, concentration));
    }

    if concentration > last.concentration_high {
        return Some(last.index_high);
    }

    // Between two published rows: truncate to the reporting precision.
    let steps = table.to_steps(concentration);
    for row in &table.rows {
        let (lo, hi) = table.row_steps(row);
        if steps > hi {
            continue;
        }
        if steps < lo {
            // Only reachable with a gapped custom table.
            return Some(row.index_low);
        }
        let clamped = concentration.clamp(row.concentration_low, row.concentration_high);
        return Some(linear(row, clamped));
    }

    Some(last.index_high)
}

/// EPA linear interpolation within one row, rounded half away from zero.
fn linear(row: &Breakpoint, concentration: f64) -> u32 {
    let span_conc = row.concentration_high - row.concentration_low;
    if span_conc <= 0.0 {
        return row.index_high;
    }
    let span_index = f64::from(row.index_high - row.index_low);
    let aqi = span_index / span_conc * (concentration - row.concentration_low)
        + f64::from(row.index_low);
    aqi.round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(pairs: &[(Pollutant, f64)]) -> BTreeMap<Pollutant, Option<f64>> {
        pairs.iter().map(|&(p, v)| (p, Some(v))).collect()
    }

    #[test]
    fn test_pm25_good_upper_bound() {
        let calc = AqiCalculator::standard();
        let result = calc.compute(&readings(&[(Pollutant::Pm25, 12.0)]));
        assert_eq!(result.index, 50);
        assert_eq!(result.category, AqiCategory::Good);
        assert_eq!(result.sub_indices.get(&Pollutant::Pm25), Some(&50));
    }

    #[test]
    fn test_pm25_moderate_lower_bound() {
        let calc = AqiCalculator::standard();
        let result = calc.compute(&readings(&[(Pollutant::Pm25, 12.1)]));
        assert_eq!(result.index, 51);
        assert_eq!(result.category, AqiCategory::Moderate);
    }

    #[test]
    fn test_value_between_published_rows_truncates() {
        let calc = AqiCalculator::standard();
        assert_eq!(calc.sub_index(Pollutant::Pm25, 12.05), Some(50));
        assert_eq!(calc.sub_index(Pollutant::Pm10, 54.9), Some(50));
    }

    #[test]
    fn test_in_row_value_keeps_sub_precision_digits() {
        let calc = AqiCalculator::standard();
        // 49 / 99 * 45.9 + 51 = 73.72
        assert_eq!(calc.sub_index(Pollutant::Pm10, 100.9), Some(74));
        // 49 / 4.9 * 2.49 + 51 = 75.9
        assert_eq!(calc.sub_index(Pollutant::Co, 6.99), Some(76));
        // 49 / 23.3 * 23.25 + 51 = 99.9
        assert_eq!(calc.sub_index(Pollutant::Pm25, 35.35), Some(100));
    }

    #[test]
    fn test_worst_pollutant_drives_overall_index() {
        let calc = AqiCalculator::standard();
        let result = calc.compute(&readings(&[(Pollutant::Pm25, 30.0), (Pollutant::Pm10, 100.0)]));

        let pm25 = result.sub_indices[&Pollutant::Pm25];
        let pm10 = result.sub_indices[&Pollutant::Pm10];
        assert_eq!(pm25, 89);
        assert_eq!(pm10, 73);
        assert_eq!(result.index, pm25);
        assert_eq!(result.category, AqiCategory::Moderate);
        assert_eq!(result.dominant(), Some(Pollutant::Pm25));
    }

    #[test]
    fn test_above_ceiling_clamps_to_500() {
        let calc = AqiCalculator::standard();
        let result = calc.compute(&readings(&[(Pollutant::Pm25, 1000.0)]));
        assert_eq!(result.index, 500);
        assert_eq!(result.category, AqiCategory::Hazardous);
    }

    #[test]
    fn test_high_bound_maps_to_index_high_not_next_row() {
        let calc = AqiCalculator::standard();
        let table = BreakpointTable::standard();
        for pollutant in Pollutant::ALL {
            for row in &table.get(pollutant).unwrap().rows {
                assert_eq!(
                    calc.sub_index(pollutant, row.concentration_high),
                    Some(row.index_high),
                    "{pollutant} at {}",
                    row.concentration_high
                );
                assert_eq!(
                    calc.sub_index(pollutant, row.concentration_low),
                    Some(row.index_low),
                    "{pollutant} at {}",
                    row.concentration_low
                );
            }
        }
    }

    #[test]
    fn test_sub_index_stays_inside_matching_row() {
        let calc = AqiCalculator::standard();
        let table = BreakpointTable::standard();
        let pm10 = table.get(Pollutant::Pm10).unwrap();
        for raw in (0..=604).step_by(7) {
            let value = raw as f64;
            let row = pm10
                .rows
                .iter()
                .find(|r| value >= r.concentration_low && value <= r.concentration_high)
                .expect("integer PM10 values always land in a row");
            let index = calc.sub_index(Pollutant::Pm10, value).unwrap();
            assert!(
                index >= row.index_low && index <= row.index_high,
                "PM10 {value} → {index} outside [{}, {}]",
                row.index_low,
                row.index_high
            );
        }
    }

    #[test]
    fn test_no_concentrations_is_good_and_empty() {
        let calc = AqiCalculator::standard();
        let mut input = BTreeMap::new();
        input.insert(Pollutant::O3, None);
        let result = calc.compute(&input);
        assert_eq!(result, AqiResult::empty());
        assert_eq!(calc.compute(&BTreeMap::new()).index, 0);
    }

    #[test]
    fn test_missing_pollutants_are_excluded_not_zero() {
        let calc = AqiCalculator::standard();
        let mut input = readings(&[(Pollutant::Co, 5.0)]);
        input.insert(Pollutant::Pm25, None);
        let result = calc.compute(&input);
        assert_eq!(result.sub_indices.len(), 1);
        assert!(!result.sub_indices.contains_key(&Pollutant::Pm25));
    }

    #[test]
    fn test_compute_is_deterministic() {
        let calc = AqiCalculator::standard();
        let input = readings(&[(Pollutant::O3, 63.0), (Pollutant::No2, 120.0), (Pollutant::So2, 10.0)]);
        assert_eq!(calc.compute(&input), calc.compute(&input));
    }

    #[test]
    fn test_compute_checked_rejects_negative() {
        let calc = AqiCalculator::standard();
        let err = calc
            .compute_checked(&readings(&[(Pollutant::Pm10, -3.0)]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_validate_readings_skips_absent_values() {
        let mut input = readings(&[(Pollutant::Pm25, 4.0)]);
        input.insert(Pollutant::Co, None);
        let valid = validate_readings(&input).expect("non-negative input is valid");
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].pollutant, Pollutant::Pm25);
    }
}

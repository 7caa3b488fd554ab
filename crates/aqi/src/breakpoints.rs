//! Regulatory breakpoint tables.
//!
//! Each pollutant maps to an ordered list of
//! `(concentration_low, concentration_high, index_low, index_high)` rows
//! expressed in the pollutant's canonical unit (see [`Pollutant::unit`]).
//! Rows are published at a fixed reporting precision, so consecutive rows
//! are contiguous once concentrations are truncated to that precision.
//!
//! Tables are built once at startup and shared immutably.

use std::collections::BTreeMap;

use common::{Error, Pollutant};
use serde::{Deserialize, Serialize};

/// One interpolation segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub concentration_low: f64,
    pub concentration_high: f64,
    pub index_low: u32,
    pub index_high: u32,
}

impl Breakpoint {
    pub const fn new(
        concentration_low: f64,
        concentration_high: f64,
        index_low: u32,
        index_high: u32,
    ) -> Self {
        Self {
            concentration_low,
            concentration_high,
            index_low,
            index_high,
        }
    }
}

/// Rows for a single pollutant plus the precision they are published at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollutantTable {
    /// Reporting step, e.g. 0.1 for PM2.5. A concentration that falls
    /// between two published rows is truncated to a multiple of this.
    pub precision: f64,
    pub rows: Vec<Breakpoint>,
}

impl PollutantTable {
    /// Converts a concentration into whole precision steps, truncating.
    pub(crate) fn to_steps(&self, value: f64) -> i64 {
        // The epsilon absorbs binary representation error (12.1 / 0.1 = 120.999…).
        (value / self.precision + 1e-9).floor() as i64
    }

    /// Row bounds in precision steps.
    pub(crate) fn row_steps(&self, row: &Breakpoint) -> (i64, i64) {
        (
            (row.concentration_low / self.precision).round() as i64,
            (row.concentration_high / self.precision).round() as i64,
        )
    }

    /// Highest index the table can produce.
    pub fn ceiling_index(&self) -> u32 {
        self.rows.last().map(|r| r.index_high).unwrap_or(0)
    }
}

/// Breakpoint tables for every supported pollutant.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointTable {
    tables: BTreeMap<Pollutant, PollutantTable>,
}

/// Standard index bands shared by every pollutant.
const BANDS: [(u32, u32); 7] = [
    (0, 50),
    (51, 100),
    (101, 150),
    (151, 200),
    (201, 300),
    (301, 400),
    (401, 500),
];

fn table(precision: f64, concentrations: [(f64, f64); 7]) -> PollutantTable {
    let rows = concentrations
        .iter()
        .zip(BANDS.iter())
        .map(|(&(c_lo, c_hi), &(i_lo, i_hi))| Breakpoint::new(c_lo, c_hi, i_lo, i_hi))
        .collect();
    PollutantTable { precision, rows }
}

impl BreakpointTable {
    /// US EPA tables.
    ///
    /// Units: PM2.5/PM10 µg/m³ (24-hour), O3 ppb (8-hour, extended with the
    /// 1-hour rows above 200), NO2/SO2 ppb (1-hour), CO ppm (8-hour).
    pub fn standard() -> Self {
        let mut tables = BTreeMap::new();
        tables.insert(
            Pollutant::Pm25,
            table(
                0.1,
                [
                    (0.0, 12.0),
                    (12.1, 35.4),
                    (35.5, 55.4),
                    (55.5, 150.4),
                    (150.5, 250.4),
                    (250.5, 350.4),
                    (350.5, 500.4),
                ],
            ),
        );
        tables.insert(
            Pollutant::Pm10,
            table(
                1.0,
                [
                    (0.0, 54.0),
                    (55.0, 154.0),
                    (155.0, 254.0),
                    (255.0, 354.0),
                    (355.0, 424.0),
                    (425.0, 504.0),
                    (505.0, 604.0),
                ],
            ),
        );
        tables.insert(
            Pollutant::O3,
            table(
                1.0,
                [
                    (0.0, 54.0),
                    (55.0, 70.0),
                    (71.0, 85.0),
                    (86.0, 105.0),
                    (106.0, 200.0),
                    (201.0, 504.0),
                    (505.0, 604.0),
                ],
            ),
        );
        tables.insert(
            Pollutant::No2,
            table(
                1.0,
                [
                    (0.0, 53.0),
                    (54.0, 100.0),
                    (101.0, 360.0),
                    (361.0, 649.0),
                    (650.0, 1249.0),
                    (1250.0, 1649.0),
                    (1650.0, 2049.0),
                ],
            ),
        );
        tables.insert(
            Pollutant::So2,
            table(
                1.0,
                [
                    (0.0, 35.0),
                    (36.0, 75.0),
                    (76.0, 185.0),
                    (186.0, 304.0),
                    (305.0, 604.0),
                    (605.0, 804.0),
                    (805.0, 1004.0),
                ],
            ),
        );
        tables.insert(
            Pollutant::Co,
            table(
                0.1,
                [
                    (0.0, 4.4),
                    (4.5, 9.4),
                    (9.5, 12.4),
                    (12.5, 15.4),
                    (15.5, 30.4),
                    (30.5, 40.4),
                    (40.5, 50.4),
                ],
            ),
        );
        Self { tables }
    }

    /// Standard tables with the pollutants listed in `raw` replaced.
    ///
    /// ```toml
    /// [pm25]
    /// precision = 0.1
    /// rows = [
    ///   { concentration_low = 0.0, concentration_high = 9.0, index_low = 0, index_high = 50 },
    /// ]
    /// ```
    pub fn from_toml_str(raw: &str) -> Result<Self, Error> {
        let overrides: BTreeMap<Pollutant, PollutantTable> = toml::from_str(raw)
            .map_err(|e| Error::Config(format!("Failed to parse breakpoint table: {}", e)))?;

        let mut merged = Self::standard();
        for (pollutant, table) in overrides {
            tracing::info!("Overriding {} breakpoints ({} rows)", pollutant, table.rows.len());
            merged.tables.insert(pollutant, table);
        }
        merged.validate()?;
        Ok(merged)
    }

    pub fn get(&self, pollutant: Pollutant) -> Option<&PollutantTable> {
        self.tables.get(&pollutant)
    }

    /// Check ordering and contiguity of every table, collecting all issues.
    pub fn validate(&self) -> Result<(), Error> {
        let mut issues: Vec<String> = Vec::new();

        for (pollutant, table) in &self.tables {
            if table.precision.is_nan() || table.precision <= 0.0 {
                issues.push(format!("{pollutant}: precision must be > 0"));
                continue;
            }
            if table.rows.is_empty() {
                issues.push(format!("{pollutant}: table has no rows"));
                continue;
            }
            if table.rows[0].concentration_low != 0.0 {
                issues.push(format!("{pollutant}: first row must start at 0"));
            }

            for (i, row) in table.rows.iter().enumerate() {
                if row.concentration_low > row.concentration_high {
                    issues.push(format!("{pollutant} row {i}: concentration_low > concentration_high"));
                }
                if row.index_low > row.index_high {
                    issues.push(format!("{pollutant} row {i}: index_low > index_high"));
                }
            }

            for (i, pair) in table.rows.windows(2).enumerate() {
                let (_, prev_hi) = table.row_steps(&pair[0]);
                let (next_lo, _) = table.row_steps(&pair[1]);
                if next_lo != prev_hi + 1 {
                    issues.push(format!(
                        "{pollutant} rows {i}/{}: concentration ranges are not contiguous at precision {}",
                        i + 1,
                        table.precision
                    ));
                }
                if pair[1].index_low <= pair[0].index_high {
                    issues.push(format!(
                        "{pollutant} rows {i}/{}: index ranges overlap",
                        i + 1
                    ));
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "Invalid breakpoint table:\n - {}",
                issues.join("\n - ")
            )))
        }
    }
}

impl Default for BreakpointTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_is_valid() {
        BreakpointTable::standard()
            .validate()
            .expect("built-in tables must satisfy ordering invariants");
    }

    #[test]
    fn test_standard_table_covers_every_pollutant() {
        let table = BreakpointTable::standard();
        for pollutant in Pollutant::ALL {
            let t = table.get(pollutant).expect("table present");
            assert_eq!(t.ceiling_index(), 500, "{pollutant} ceiling");
        }
    }

    #[test]
    fn test_step_conversion_absorbs_float_error() {
        let table = BreakpointTable::standard();
        let pm25 = table.get(Pollutant::Pm25).unwrap();
        assert_eq!(pm25.to_steps(12.1), 121);
        assert_eq!(pm25.to_steps(12.05), 120);
        assert_eq!(pm25.to_steps(35.4), 354);
        assert_eq!(pm25.row_steps(&pm25.rows[1]), (121, 354));
    }

    #[test]
    fn test_override_replaces_single_pollutant() {
        let raw = r#"
            [pm25]
            precision = 0.1
            rows = [
              { concentration_low = 0.0, concentration_high = 9.0, index_low = 0, index_high = 50 },
              { concentration_low = 9.1, concentration_high = 500.0, index_low = 51, index_high = 500 },
            ]
        "#;
        let table = BreakpointTable::from_toml_str(raw).expect("override should load");
        assert_eq!(table.get(Pollutant::Pm25).unwrap().rows.len(), 2);
        assert_eq!(
            table.get(Pollutant::Pm10),
            BreakpointTable::standard().get(Pollutant::Pm10)
        );
    }

    #[test]
    fn test_override_with_gap_is_rejected() {
        let raw = r#"
            [co]
            precision = 0.1
            rows = [
              { concentration_low = 0.0, concentration_high = 4.4, index_low = 0, index_high = 50 },
              { concentration_low = 5.0, concentration_high = 9.4, index_low = 51, index_high = 100 },
            ]
        "#;
        let err = BreakpointTable::from_toml_str(raw).unwrap_err();
        assert!(err.to_string().contains("not contiguous"), "got: {err}");
    }

    #[test]
    fn test_malformed_override_is_config_error() {
        let err = BreakpointTable::from_toml_str("[pm25]\nprecision = \"fine\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

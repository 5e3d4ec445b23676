use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FrontierError;
use crate::types::{AssetUniverse, ReturnMatrix};
use crate::FrontierResult;

/// Daily (or other periodic) close prices for a universe, one row per date.
/// Missing quotes are `None` (`null` in JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistory {
    pub assets: AssetUniverse,
    pub dates: Vec<NaiveDate>,
    pub prices: Vec<Vec<Option<f64>>>,
}

impl PriceHistory {
    /// Check that dates and rows line up, every row is N wide and dates are
    /// strictly increasing.
    pub fn validate(&self) -> FrontierResult<()> {
        let n = self.assets.len();
        if self.dates.len() != self.prices.len() {
            return Err(FrontierError::MisalignedSeries(format!(
                "{} dates but {} price rows",
                self.dates.len(),
                self.prices.len()
            )));
        }
        for (t, row) in self.prices.iter().enumerate() {
            if row.len() != n {
                return Err(FrontierError::MisalignedSeries(format!(
                    "Price row for {} has {} columns, expected {}",
                    self.dates[t],
                    row.len(),
                    n
                )));
            }
        }
        if let Some(w) = self.dates.windows(2).find(|w| w[1] <= w[0]) {
            return Err(FrontierError::MisalignedSeries(format!(
                "Dates must be strictly increasing: {} followed by {}",
                w[0], w[1]
            )));
        }
        Ok(())
    }

    /// Rows whose date falls within `[start, end]`; an open side is unbounded.
    pub fn within(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> PriceHistory {
        let keep = |d: &NaiveDate| start.map_or(true, |s| *d >= s) && end.map_or(true, |e| *d <= e);
        let (dates, prices) = self
            .dates
            .iter()
            .zip(self.prices.iter())
            .filter(|(d, _)| keep(d))
            .map(|(d, row)| (*d, row.clone()))
            .unzip();
        PriceHistory {
            assets: self.assets.clone(),
            dates,
            prices,
        }
    }
}

/// Period-over-period simple returns, `p_t / p_{t-1} - 1`.
///
/// A return row is dropped when any asset lacks a usable (present, positive,
/// finite) price on either side of the period, so every surviving row is
/// complete.
pub fn simple_returns(history: &PriceHistory) -> FrontierResult<ReturnMatrix> {
    history.validate()?;

    let usable = |p: &Option<f64>| p.filter(|v| v.is_finite() && *v > 0.0);

    let mut rows = Vec::with_capacity(history.prices.len().saturating_sub(1));
    for pair in history.prices.windows(2) {
        let row: Option<Vec<f64>> = pair[0]
            .iter()
            .zip(pair[1].iter())
            .map(|(prev, cur)| Some(usable(cur)? / usable(prev)? - 1.0))
            .collect();
        if let Some(row) = row {
            rows.push(row);
        }
    }

    if rows.len() < 2 {
        return Err(FrontierError::InsufficientData {
            observations: rows.len(),
            required: 2,
        });
    }
    ReturnMatrix::from_rows(rows)
}

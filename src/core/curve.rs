use super::error::ModelError;
use super::solver::{cap_yearly, validate_cap_factor};
use super::types::BracketRates;

/// Annual incomes at which the curve reaches 0 and then each segment's rate.
pub const ANCHOR_INCOMES: [f64; 4] = [0.0, 15_000.0, 55_000.0, 200_000.0];

/// Continuous marginal-rate function of annual income.
///
/// Interpolates linearly in log-income between the anchors, is flat outside
/// them, and returns exactly `1.0` at and above the cap when one is set.
/// Read-only after construction, so it can be shared across threads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxCurve {
    log_incomes: [f64; 4],
    rates: [f64; 4],
    cap_yearly: Option<f64>,
}

impl TaxCurve {
    pub fn build(
        bracket_rates: &BracketRates,
        basic_income_monthly: f64,
        income_cap_factor: Option<f64>,
    ) -> Result<Self, ModelError> {
        validate_cap_factor(income_cap_factor)?;
        let [r1, r2, r3] = bracket_rates.as_array();
        Ok(Self {
            log_incomes: ANCHOR_INCOMES.map(log_income),
            rates: [0.0, r1, r2, r3],
            cap_yearly: income_cap_factor.map(|factor| cap_yearly(basic_income_monthly, factor)),
        })
    }

    pub fn marginal_rate(&self, annual_income: f64) -> f64 {
        if let Some(cap) = self.cap_yearly {
            if annual_income >= cap {
                return 1.0;
            }
        }
        interp_flat(log_income(annual_income), &self.log_incomes, &self.rates)
    }
}

fn log_income(income: f64) -> f64 {
    income.max(1.0).ln()
}

/// Piecewise-linear interpolation that holds the boundary value outside `xs`.
fn interp_flat(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let last = xs.len() - 1;
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[last] {
        return ys[last];
    }
    let idx = xs.partition_point(|v| *v <= x) - 1;
    let (x0, x1) = (xs[idx], xs[idx + 1]);
    let (y0, y1) = (ys[idx], ys[idx + 1]);
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

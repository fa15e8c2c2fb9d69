use serde::Serialize;

/// Fixed global assumptions the solver balances the UBI budget against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EconomyConstants {
    pub population: f64,
    pub world_gdp: f64,
    pub share_90_99: f64,
    pub share_99_999: f64,
    pub share_top001: f64,
}

impl EconomyConstants {
    pub fn world_2024() -> Self {
        Self {
            population: 8.23e9,
            world_gdp: 97.8e12,
            share_90_99: 0.314,
            share_99_999: 0.118,
            share_top001: 0.086,
        }
    }

    pub fn top10_share(&self) -> f64 {
        self.share_90_99 + self.share_99_999 + self.share_top001
    }

    /// Income shares in segment order.
    pub fn segment_shares(&self) -> [f64; 3] {
        [self.share_90_99, self.share_99_999, self.share_top001]
    }
}

/// Free parameters of one scheme. Recomputed from scratch on every change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverInput {
    pub basic_income_monthly: f64,
    pub overhead: f64,
    pub income_cap_factor: Option<f64>,
    pub progression_strength: f64,
}

impl Default for SolverInput {
    fn default() -> Self {
        Self {
            basic_income_monthly: 30.0,
            overhead: 0.10,
            income_cap_factor: None,
            progression_strength: 3.0,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Segment {
    Top90To99,
    Top99To999,
    Top999To100,
}

impl Segment {
    pub const ALL: [Segment; 3] = [Segment::Top90To99, Segment::Top99To999, Segment::Top999To100];

    pub fn label(self) -> &'static str {
        match self {
            Segment::Top90To99 => "90-99%",
            Segment::Top99To999 => "99-99.9%",
            Segment::Top999To100 => "99.9-100%",
        }
    }
}

/// Marginal rates for the three top-decile segments. Not clamped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BracketRates {
    #[serde(rename = "90-99%")]
    pub top_90_99: f64,
    #[serde(rename = "99-99.9%")]
    pub top_99_999: f64,
    #[serde(rename = "99.9-100%")]
    pub top_999_100: f64,
}

impl BracketRates {
    pub fn from_array(rates: [f64; 3]) -> Self {
        Self {
            top_90_99: rates[0],
            top_99_999: rates[1],
            top_999_100: rates[2],
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.top_90_99, self.top_99_999, self.top_999_100]
    }

    pub fn rate(&self, segment: Segment) -> f64 {
        match segment {
            Segment::Top90To99 => self.top_90_99,
            Segment::Top99To999 => self.top_99_999,
            Segment::Top999To100 => self.top_999_100,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Segment, f64)> + '_ {
        Segment::ALL.into_iter().map(|segment| (segment, self.rate(segment)))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverResult {
    pub ubi_yearly: f64,
    pub total_needed: f64,
    pub required_share_gdp: f64,
    pub avg_required_on_top10: f64,
    pub bracket_rates: BracketRates,
    /// Informational only; never fed back into the rate solve.
    pub cap_tax_revenue: f64,
    pub cap_monthly: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalOutcome {
    pub tax_rate_pct: f64,
    pub tax_amount_monthly: f64,
    pub after_tax_income_monthly: f64,
    pub diff_eur_monthly: f64,
    pub diff_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionPoint {
    pub percentile: f64,
    pub gross_monthly: f64,
    pub after_tax_monthly: f64,
    pub tax_monthly: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub solver: SolverResult,
    pub personal: PersonalOutcome,
    pub integrated_top_decile_rate: f64,
    pub distribution: Vec<DistributionPoint>,
}

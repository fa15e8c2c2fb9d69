use tracing::{debug, warn};

use super::error::ModelError;
use super::types::{BracketRates, EconomyConstants, SolverInput, SolverResult};

/// Relative progressivity of the three segments at `progression_strength == 3`.
pub const BASE_MULTIPLIERS: [f64; 3] = [0.35, 1.5, 2.7];

/// Population fraction of the top 0.1% segment.
const TOP001_POPULATION_FRACTION: f64 = 0.001;

pub fn solve_brackets(
    constants: &EconomyConstants,
    input: &SolverInput,
) -> Result<SolverResult, ModelError> {
    validate_constants(constants)?;
    validate_input(input)?;

    let top10_share = constants.top10_share();

    let ubi_yearly = input.basic_income_monthly * 12.0 * constants.population;
    let total_needed = ubi_yearly * (1.0 + input.overhead);

    let required_share_gdp = total_needed / constants.world_gdp;
    let avg_required_on_top10 = required_share_gdp / top10_share;
    if ![ubi_yearly, total_needed, required_share_gdp, avg_required_on_top10]
        .iter()
        .all(|v| v.is_finite())
    {
        return Err(ModelError::Degenerate(
            "funding requirement overflows; basic income or overhead too large",
        ));
    }

    let multipliers = scaled_multipliers(input.progression_strength);
    let weights = constants.segment_shares();
    let weighted_avg = weights
        .iter()
        .zip(multipliers.iter())
        .map(|(w, m)| w * m)
        .sum::<f64>()
        / top10_share;
    if !weighted_avg.is_finite() || weighted_avg == 0.0 {
        return Err(ModelError::Degenerate(
            "weighted multiplier average must be finite and non-zero",
        ));
    }

    let scale_factor = avg_required_on_top10 / weighted_avg;
    let rates = multipliers.map(|m| m * scale_factor);
    if !scale_factor.is_finite() || rates.iter().any(|r| !r.is_finite()) {
        return Err(ModelError::Degenerate("bracket rates must be finite"));
    }
    let bracket_rates = BracketRates::from_array(rates);

    for (segment, rate) in bracket_rates.iter() {
        if !(0.0..=1.0).contains(&rate) {
            warn!(segment = segment.label(), rate, "bracket rate outside [0, 1]");
        }
    }
    debug!(
        avg_required_on_top10,
        rate_90_99 = bracket_rates.top_90_99,
        rate_99_999 = bracket_rates.top_99_999,
        rate_999_100 = bracket_rates.top_999_100,
        "solved bracket rates"
    );

    let cap_tax_revenue = match input.income_cap_factor {
        Some(factor) => cap_revenue(constants, input.basic_income_monthly, factor),
        None => 0.0,
    };

    Ok(SolverResult {
        ubi_yearly,
        total_needed,
        required_share_gdp,
        avg_required_on_top10,
        bracket_rates,
        cap_tax_revenue,
        cap_monthly: input
            .income_cap_factor
            .map(|factor| input.basic_income_monthly * factor),
    })
}

/// Spreads the base shape around 1; strength 0 flattens it, 3 reproduces it.
pub fn scaled_multipliers(progression_strength: f64) -> [f64; 3] {
    BASE_MULTIPLIERS.map(|m| 1.0 + (m - 1.0) * progression_strength / 3.0)
}

pub fn cap_yearly(basic_income_monthly: f64, income_cap_factor: f64) -> f64 {
    basic_income_monthly * income_cap_factor * 12.0
}

fn cap_revenue(constants: &EconomyConstants, basic_income_monthly: f64, factor: f64) -> f64 {
    let cap = cap_yearly(basic_income_monthly, factor);
    let top001_population = constants.population * TOP001_POPULATION_FRACTION;
    let avg_top001_income = constants.world_gdp * constants.share_top001 / top001_population;
    if avg_top001_income > cap {
        let revenue = (avg_top001_income - cap) * top001_population;
        debug!(cap, avg_top001_income, revenue, "income cap revenue");
        revenue
    } else {
        0.0
    }
}

pub fn validate_constants(constants: &EconomyConstants) -> Result<(), ModelError> {
    if !constants.population.is_finite() || constants.population <= 0.0 {
        return Err(ModelError::InvalidConstants("population must be > 0"));
    }
    if !constants.world_gdp.is_finite() || constants.world_gdp <= 0.0 {
        return Err(ModelError::InvalidConstants("world_gdp must be > 0"));
    }
    if constants
        .segment_shares()
        .iter()
        .any(|s| !(0.0..=1.0).contains(s))
    {
        return Err(ModelError::InvalidConstants(
            "each segment share must be between 0 and 1",
        ));
    }
    let top10_share = constants.top10_share();
    if top10_share <= 0.0 || top10_share >= 1.0 {
        return Err(ModelError::InvalidConstants(
            "segment shares must sum to more than 0 and less than 1",
        ));
    }
    Ok(())
}

fn validate_input(input: &SolverInput) -> Result<(), ModelError> {
    if !input.basic_income_monthly.is_finite() || input.basic_income_monthly < 0.0 {
        return Err(ModelError::InvalidInput(
            "basic_income_monthly must be >= 0".to_string(),
        ));
    }
    if !input.overhead.is_finite() || input.overhead < 0.0 {
        return Err(ModelError::InvalidInput("overhead must be >= 0".to_string()));
    }
    if !input.progression_strength.is_finite() {
        return Err(ModelError::InvalidInput(
            "progression_strength must be finite".to_string(),
        ));
    }
    validate_cap_factor(input.income_cap_factor)
}

pub(crate) fn validate_cap_factor(income_cap_factor: Option<f64>) -> Result<(), ModelError> {
    match income_cap_factor {
        Some(factor) if !factor.is_finite() || factor <= 0.0 => Err(ModelError::InvalidInput(
            "income_cap_factor must be > 0".to_string(),
        )),
        _ => Ok(()),
    }
}

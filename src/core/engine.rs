use rayon::prelude::*;
use tracing::debug;

use super::curve::TaxCurve;
use super::error::ModelError;
use super::solver::{cap_yearly, solve_brackets, validate_cap_factor};
use super::types::{DistributionPoint, EconomyConstants, PersonalOutcome, Report, SolverInput};

/// Sample points of the right-endpoint Riemann sum, both ends included.
pub const QUADRATURE_POINTS: usize = 10_000;

pub const DEFAULT_DISTRIBUTION_SAMPLES: usize = 500;

/// Percentile to annual gross income, linearly interpolated between entries.
pub const PERCENTILE_INCOME_ANCHORS: [(f64, f64); 6] = [
    (0.0, 0.0),
    (50.0, 3_000.0),
    (90.0, 15_000.0),
    (99.0, 55_000.0),
    (99.9, 200_000.0),
    (100.0, 1_000_000.0),
];

const TOP_DECILE_PERCENTILE: f64 = 90.0;

pub fn evaluate_personal_outcome(
    monthly_income: f64,
    basic_income_monthly: f64,
    tax_curve: &TaxCurve,
    income_cap_factor: Option<f64>,
) -> Result<PersonalOutcome, ModelError> {
    if !monthly_income.is_finite() || monthly_income < 0.0 {
        return Err(ModelError::InvalidInput(
            "monthly_income must be >= 0".to_string(),
        ));
    }
    if !basic_income_monthly.is_finite() || basic_income_monthly < 0.0 {
        return Err(ModelError::InvalidInput(
            "basic_income_monthly must be >= 0".to_string(),
        ));
    }
    validate_cap_factor(income_cap_factor)?;

    let yearly_income = monthly_income * 12.0;
    let basic_income_yearly = basic_income_monthly * 12.0;
    if !yearly_income.is_finite() || !basic_income_yearly.is_finite() {
        return Err(ModelError::InvalidInput(
            "yearly income overflows; monthly income or basic income too large".to_string(),
        ));
    }
    let cap = income_cap_factor.map(|factor| cap_yearly(basic_income_monthly, factor));

    let taxable_income = match cap {
        Some(cap) => yearly_income.min(cap),
        None => yearly_income,
    };

    let mut tax_amount = integrate_marginal_rate(tax_curve, taxable_income);
    if let Some(cap) = cap {
        if yearly_income > cap {
            tax_amount += yearly_income - cap;
        }
    }

    let mut after_tax_income = yearly_income - tax_amount + basic_income_yearly;
    if let Some(cap) = cap {
        after_tax_income = after_tax_income.min(cap + basic_income_yearly);
    }

    let diff = after_tax_income - yearly_income;
    let (tax_rate_pct, diff_pct) = if yearly_income > 0.0 {
        (
            tax_amount / yearly_income * 100.0,
            diff / yearly_income * 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    let outcome = PersonalOutcome {
        tax_rate_pct,
        tax_amount_monthly: tax_amount / 12.0,
        after_tax_income_monthly: after_tax_income / 12.0,
        diff_eur_monthly: diff / 12.0,
        diff_pct,
    };
    let fields = [
        outcome.tax_rate_pct,
        outcome.tax_amount_monthly,
        outcome.after_tax_income_monthly,
        outcome.diff_eur_monthly,
        outcome.diff_pct,
    ];
    if fields.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::Degenerate("personal outcome must be finite"));
    }
    Ok(outcome)
}

/// Right-endpoint Riemann sum of the curve over `[0, upper]`.
///
/// The grid has `QUADRATURE_POINTS` evenly spaced points with the last one
/// pinned to `upper`; each width is the difference of adjacent grid points.
pub fn integrate_marginal_rate(tax_curve: &TaxCurve, upper: f64) -> f64 {
    if upper <= 0.0 {
        return 0.0;
    }
    let step = upper / (QUADRATURE_POINTS - 1) as f64;
    let mut total = 0.0;
    let mut prev = 0.0;
    for i in 1..QUADRATURE_POINTS {
        let x = if i == QUADRATURE_POINTS - 1 {
            upper
        } else {
            i as f64 * step
        };
        total += (x - prev) * tax_curve.marginal_rate(x);
        prev = x;
    }
    total
}

/// Gross and after-tax monthly income at `samples` evenly spaced percentiles.
pub fn income_distribution(
    tax_curve: &TaxCurve,
    basic_income_monthly: f64,
    income_cap_factor: Option<f64>,
    samples: usize,
) -> Result<Vec<DistributionPoint>, ModelError> {
    if samples < 2 {
        return Err(ModelError::InvalidInput(
            "distribution samples must be >= 2".to_string(),
        ));
    }
    let step = 100.0 / (samples - 1) as f64;
    (0..samples)
        .into_par_iter()
        .map(|i| -> Result<DistributionPoint, ModelError> {
            let percentile = if i == samples - 1 {
                100.0
            } else {
                i as f64 * step
            };
            let gross_monthly = income_at_percentile(percentile) / 12.0;
            let outcome = evaluate_personal_outcome(
                gross_monthly,
                basic_income_monthly,
                tax_curve,
                income_cap_factor,
            )?;
            Ok(DistributionPoint {
                percentile,
                gross_monthly,
                after_tax_monthly: outcome.after_tax_income_monthly,
                tax_monthly: outcome.tax_amount_monthly,
            })
        })
        .collect()
}

pub fn income_at_percentile(percentile: f64) -> f64 {
    let anchors = &PERCENTILE_INCOME_ANCHORS;
    let (first_p, first_income) = anchors[0];
    if percentile <= first_p {
        return first_income;
    }
    for pair in anchors.windows(2) {
        let (p0, y0) = pair[0];
        let (p1, y1) = pair[1];
        if percentile <= p1 {
            return y0 + (y1 - y0) * (percentile - p0) / (p1 - p0);
        }
    }
    anchors[anchors.len() - 1].1
}

/// Curve-integrated tax share of gross income over the top-decile points.
///
/// Only approximates the solver's `avg_required_on_top10`: the solver
/// balances three point rates, while liabilities integrate the smooth curve.
pub fn integrated_top_decile_rate(points: &[DistributionPoint]) -> f64 {
    let (tax, gross) = points
        .iter()
        .filter(|p| p.percentile >= TOP_DECILE_PERCENTILE)
        .fold((0.0, 0.0), |(tax, gross), p| {
            (tax + p.tax_monthly, gross + p.gross_monthly)
        });
    if gross > 0.0 { tax / gross } else { 0.0 }
}

/// Runs the solve, curve and evaluation steps in sequence for one scheme.
pub fn run_report(
    constants: &EconomyConstants,
    input: &SolverInput,
    monthly_income: f64,
    distribution_samples: usize,
) -> Result<Report, ModelError> {
    let solver = solve_brackets(constants, input)?;
    let curve = TaxCurve::build(
        &solver.bracket_rates,
        input.basic_income_monthly,
        input.income_cap_factor,
    )?;
    let personal = evaluate_personal_outcome(
        monthly_income,
        input.basic_income_monthly,
        &curve,
        input.income_cap_factor,
    )?;
    let distribution = income_distribution(
        &curve,
        input.basic_income_monthly,
        input.income_cap_factor,
        distribution_samples,
    )?;
    let integrated_top_decile_rate = integrated_top_decile_rate(&distribution);
    debug!(
        solver_rate = solver.avg_required_on_top10,
        integrated_top_decile_rate, "top decile rate vs solver target"
    );

    Ok(Report {
        solver,
        personal,
        integrated_top_decile_rate,
        distribution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BracketRates;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_rates() -> BracketRates {
        solve_brackets(&EconomyConstants::world_2024(), &SolverInput::default())
            .expect("must solve")
            .bracket_rates
    }

    fn uncapped_curve() -> TaxCurve {
        TaxCurve::build(&sample_rates(), 30.0, None).expect("valid curve")
    }

    fn capped_curve() -> TaxCurve {
        TaxCurve::build(&sample_rates(), 30.0, Some(100.0)).expect("valid curve")
    }

    #[test]
    fn zero_income_keeps_basic_income_and_guards_ratios() {
        let outcome =
            evaluate_personal_outcome(0.0, 30.0, &uncapped_curve(), None).expect("valid outcome");
        assert_eq!(outcome.tax_rate_pct, 0.0);
        assert_eq!(outcome.tax_amount_monthly, 0.0);
        assert_eq!(outcome.after_tax_income_monthly, 30.0);
        assert_eq!(outcome.diff_eur_monthly, 30.0);
        assert_eq!(outcome.diff_pct, 0.0);
    }

    #[test]
    fn median_income_outcome_without_cap() {
        let outcome =
            evaluate_personal_outcome(3_000.0, 30.0, &uncapped_curve(), None).expect("valid");
        assert_approx(outcome.tax_amount_monthly, 114.292_789_185_512_28);
        assert_approx(outcome.tax_rate_pct, 3.809_759_639_517_076);
        assert_approx(outcome.after_tax_income_monthly, 2_915.707_210_814_487_6);
        assert_approx(outcome.diff_eur_monthly, -84.292_789_185_512_45);
        assert_approx(outcome.diff_pct, -2.809_759_639_517_082);
    }

    #[test]
    fn high_income_without_cap_approaches_top_rate() {
        let outcome =
            evaluate_personal_outcome(100_000.0, 30.0, &uncapped_curve(), None).expect("valid");
        assert_approx(outcome.tax_amount_monthly, 16_420.290_883_921_065);
        assert!(outcome.tax_rate_pct < sample_rates().top_999_100 * 100.0);
    }

    #[test]
    fn income_exactly_at_cap_gets_no_surcharge() {
        let curve = capped_curve();
        let at_cap = evaluate_personal_outcome(3_000.0, 30.0, &curve, Some(100.0)).expect("valid");
        assert_approx(at_cap.tax_amount_monthly, 114.571_153_314_571_59);
        assert_approx(at_cap.after_tax_income_monthly, 2_915.428_846_685_428_7);

        let above = evaluate_personal_outcome(3_000.01, 30.0, &curve, Some(100.0)).expect("valid");
        assert_approx(
            above.tax_amount_monthly - at_cap.tax_amount_monthly,
            0.01,
        );
    }

    #[test]
    fn income_above_cap_is_taxed_in_full() {
        let curve = capped_curve();
        let outcome =
            evaluate_personal_outcome(100_000.0, 30.0, &curve, Some(100.0)).expect("valid");
        assert_approx(outcome.tax_amount_monthly, 97_114.571_153_314_57);
        assert_approx(outcome.after_tax_income_monthly, 2_915.428_846_685_429);
        assert!(outcome.after_tax_income_monthly <= 36_000.0 / 12.0 + 30.0);
    }

    #[test]
    fn zero_basic_income_with_cap_taxes_everything() {
        let rates = BracketRates::from_array([0.0, 0.0, 0.0]);
        let curve = TaxCurve::build(&rates, 0.0, Some(100.0)).expect("valid curve");
        let outcome = evaluate_personal_outcome(5_000.0, 0.0, &curve, Some(100.0)).expect("valid");
        assert_approx(outcome.tax_amount_monthly, 5_000.0);
        assert_approx(outcome.tax_rate_pct, 100.0);
        assert_eq!(outcome.after_tax_income_monthly, 0.0);
    }

    #[test]
    fn rejects_negative_income() {
        let err = evaluate_personal_outcome(-1.0, 30.0, &uncapped_curve(), None)
            .expect_err("must reject");
        assert!(matches!(err, ModelError::InvalidInput(_)));
    }

    #[test]
    fn overflowing_monthly_income_is_rejected() {
        let err = evaluate_personal_outcome(1e308, 30.0, &uncapped_curve(), None)
            .expect_err("must reject");
        assert!(matches!(err, ModelError::InvalidInput(_)), "{err:?}");

        let err = evaluate_personal_outcome(1e308, 30.0, &capped_curve(), Some(100.0))
            .expect_err("must reject");
        assert!(matches!(err, ModelError::InvalidInput(_)), "{err:?}");
    }

    #[test]
    fn very_large_but_finite_income_stays_finite() {
        let outcome = evaluate_personal_outcome(1e300, 30.0, &uncapped_curve(), None)
            .expect("finite outcome");
        assert!(outcome.tax_amount_monthly.is_finite());
        assert!(outcome.tax_rate_pct > 0.0 && outcome.tax_rate_pct < 100.0);
    }

    #[test]
    fn run_report_fails_on_overflowing_basic_income() {
        let input = SolverInput {
            basic_income_monthly: 1e300,
            ..SolverInput::default()
        };
        let err = run_report(&EconomyConstants::world_2024(), &input, 3_000.0, 10)
            .expect_err("must fail");
        assert!(matches!(err, ModelError::Degenerate(_)), "{err:?}");
    }

    #[test]
    fn integral_of_empty_interval_is_zero() {
        assert_eq!(integrate_marginal_rate(&uncapped_curve(), 0.0), 0.0);
    }

    #[test]
    fn integral_of_fully_capped_curve_is_the_interval() {
        // Zero basic income puts the cap at 0, so every sample sits at 100%.
        let curve = TaxCurve::build(&sample_rates(), 0.0, Some(100.0)).expect("valid curve");
        assert_approx(integrate_marginal_rate(&curve, 1_000.0), 1_000.0);
    }

    #[test]
    fn percentile_incomes_follow_anchors() {
        assert_eq!(income_at_percentile(0.0), 0.0);
        assert_approx(income_at_percentile(25.0), 1_500.0);
        assert_approx(income_at_percentile(90.0), 15_000.0);
        assert_approx(income_at_percentile(99.95), 600_000.0);
        assert_eq!(income_at_percentile(100.0), 1_000_000.0);
    }

    #[test]
    fn distribution_spans_population_in_order() {
        let curve = uncapped_curve();
        let points = income_distribution(&curve, 30.0, None, DEFAULT_DISTRIBUTION_SAMPLES)
            .expect("valid distribution");
        assert_eq!(points.len(), DEFAULT_DISTRIBUTION_SAMPLES);
        assert_eq!(points[0].percentile, 0.0);
        assert_eq!(points[0].after_tax_monthly, 30.0);
        assert_eq!(points[points.len() - 1].percentile, 100.0);
        assert_approx(points[points.len() - 1].gross_monthly, 1_000_000.0 / 12.0);
        assert_approx(points[points.len() - 1].after_tax_monthly, 69_831.980_435_487_23);
        assert!(points.windows(2).all(|w| w[0].percentile < w[1].percentile));
    }

    #[test]
    fn distribution_matches_sequential_evaluation() {
        let curve = capped_curve();
        let points = income_distribution(&curve, 30.0, Some(100.0), 37).expect("valid");
        for point in points {
            let outcome =
                evaluate_personal_outcome(point.gross_monthly, 30.0, &curve, Some(100.0))
                    .expect("valid");
            assert_eq!(point.after_tax_monthly, outcome.after_tax_income_monthly);
            assert_eq!(point.tax_monthly, outcome.tax_amount_monthly);
        }
    }

    #[test]
    fn distribution_needs_two_samples() {
        assert!(income_distribution(&uncapped_curve(), 30.0, None, 1).is_err());
    }

    #[test]
    fn integrated_top_decile_rate_only_approximates_solver_target() {
        let report = run_report(
            &EconomyConstants::world_2024(),
            &SolverInput::default(),
            3_000.0,
            DEFAULT_DISTRIBUTION_SAMPLES,
        )
        .expect("valid report");
        assert!((report.integrated_top_decile_rate - 0.089_703_700_441_930_75).abs() < 1e-6);
        assert!(
            (report.integrated_top_decile_rate - report.solver.avg_required_on_top10).abs() > 0.01
        );
    }

    #[test]
    fn integrated_top_decile_rate_of_empty_series_is_zero() {
        assert_eq!(integrated_top_decile_rate(&[]), 0.0);
    }

    #[test]
    fn run_report_propagates_invalid_input() {
        let input = SolverInput {
            income_cap_factor: Some(f64::NAN),
            ..SolverInput::default()
        };
        let err = run_report(&EconomyConstants::world_2024(), &input, 3_000.0, 10)
            .expect_err("must reject");
        assert!(matches!(err, ModelError::InvalidInput(_)));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_after_tax_income_bounded_by_cap(
            basic_income in 1u32..=200,
            cap_factor in 1u32..=3000,
            monthly_income in 0u32..2_000_000
        ) {
            let basic_income = basic_income as f64;
            let cap_factor = cap_factor as f64;
            let curve = TaxCurve::build(&sample_rates(), basic_income, Some(cap_factor))
                .expect("valid curve");
            let outcome = evaluate_personal_outcome(
                monthly_income as f64,
                basic_income,
                &curve,
                Some(cap_factor),
            ).expect("valid outcome");
            let bound = cap_yearly(basic_income, cap_factor) / 12.0 + basic_income;
            prop_assert!(outcome.after_tax_income_monthly <= bound * (1.0 + 1e-12));
        }

        #[test]
        fn prop_tax_non_decreasing_without_cap(
            lo in 0u32..200_000,
            delta in 0u32..200_000
        ) {
            let curve = uncapped_curve();
            let a = evaluate_personal_outcome(lo as f64, 30.0, &curve, None).expect("valid");
            let b = evaluate_personal_outcome((lo + delta) as f64, 30.0, &curve, None)
                .expect("valid");
            let tol = 1e-9 * a.tax_amount_monthly.max(1.0);
            prop_assert!(b.tax_amount_monthly + tol >= a.tax_amount_monthly);
            prop_assert!(a.tax_amount_monthly >= 0.0);
        }

        #[test]
        fn prop_evaluation_is_bit_identical_on_repeat(
            monthly_income in 0u32..500_000,
            cap in proptest::option::of(1u32..=3000)
        ) {
            let cap = cap.map(f64::from);
            let curve = TaxCurve::build(&sample_rates(), 30.0, cap).expect("valid curve");
            let first = evaluate_personal_outcome(monthly_income as f64, 30.0, &curve, cap)
                .expect("valid");
            let second = evaluate_personal_outcome(monthly_income as f64, 30.0, &curve, cap)
                .expect("valid");
            prop_assert_eq!(first.tax_amount_monthly.to_bits(), second.tax_amount_monthly.to_bits());
            prop_assert_eq!(
                first.after_tax_income_monthly.to_bits(),
                second.after_tax_income_monthly.to_bits()
            );
            prop_assert_eq!(first.diff_pct.to_bits(), second.diff_pct.to_bits());
        }
    }
}

/// Neutral fallback when a 1X2 price set is unusable.
pub const NEUTRAL_1X2: (f64, f64, f64) = (1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0);
/// Neutral fallback for a single binary market (over/under, BTTS yes/no).
pub const NEUTRAL_BINARY: f64 = 0.5;

pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Margin-free (home, draw, away) probabilities from decimal prices.
///
/// Any price that is missing, non-finite or not above 1.0 makes the whole set
/// unusable and yields [`NEUTRAL_1X2`].
pub fn normalize_implied_probs(
    home: Option<f64>,
    draw: Option<f64>,
    away: Option<f64>,
) -> (f64, f64, f64) {
    let (Some(home), Some(draw), Some(away)) = (home, draw, away) else {
        return NEUTRAL_1X2;
    };
    if [home, draw, away]
        .iter()
        .any(|p| !p.is_finite() || *p <= 1.0)
    {
        return NEUTRAL_1X2;
    }
    let ih = 1.0 / home;
    let id = 1.0 / draw;
    let ia = 1.0 / away;
    let sum = ih + id + ia;
    if sum <= 0.0 {
        return NEUTRAL_1X2;
    }
    (ih / sum, id / sum, ia / sum)
}

/// Implied probability of one leg of a binary market when only that leg is
/// quoted.
pub fn implied_binary_prob(price: Option<f64>) -> Option<f64> {
    price
        .filter(|p| p.is_finite() && *p > 1.0)
        .map(|p| 1.0 / p)
}

/// `P(X > line)` for `X ~ Poisson(lambda)`, i.e. `1 - CDF(floor(line))`.
pub fn poisson_over(lambda: f64, line: f64) -> f64 {
    if !lambda.is_finite() || lambda <= 0.0 {
        return 0.0;
    }
    if !line.is_finite() || line < 0.0 {
        return 1.0;
    }
    let k_max = line.floor() as u32;
    let mut term = (-lambda).exp();
    let mut cdf = term;
    for k in 1..=k_max {
        term *= lambda / k as f64;
        cdf += term;
    }
    (1.0 - cdf).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::{NEUTRAL_1X2, implied_binary_prob, logistic, normalize_implied_probs, poisson_over};

    #[test]
    fn logistic_is_centered() {
        assert!((logistic(0.0) - 0.5).abs() < 1e-12);
        assert!(logistic(4.0) > 0.98);
        assert!(logistic(-4.0) < 0.02);
    }

    #[test]
    fn implied_probs_sum_to_one() {
        let (h, d, a) = normalize_implied_probs(Some(1.80), Some(3.40), Some(4.20));
        assert!((h + d + a - 1.0).abs() < 1e-9);
        assert!(h > d && d > a);
    }

    #[test]
    fn implied_probs_fall_back_on_bad_prices() {
        assert_eq!(normalize_implied_probs(Some(2.0), None, Some(3.0)), NEUTRAL_1X2);
        assert_eq!(
            normalize_implied_probs(Some(2.0), Some(0.0), Some(3.0)),
            NEUTRAL_1X2
        );
        assert_eq!(
            normalize_implied_probs(Some(-1.5), Some(3.0), Some(3.0)),
            NEUTRAL_1X2
        );
    }

    #[test]
    fn binary_price_must_exceed_one() {
        assert_eq!(implied_binary_prob(Some(1.0)), None);
        assert_eq!(implied_binary_prob(None), None);
        assert!((implied_binary_prob(Some(2.0)).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn poisson_over_matches_closed_form() {
        let lam = 2.4_f64;
        let expected = 1.0 - (-lam).exp() * (1.0 + lam);
        assert!((poisson_over(lam, 1.5) - expected).abs() < 1e-12);
        assert_eq!(poisson_over(0.0, 1.5), 0.0);
    }
}

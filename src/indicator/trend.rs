use chrono::Datelike;

use crate::indicator::{mean, population_std_dev};
use crate::model::PricePoint;

/// Number of trailing points the trend is fitted over.
pub const TREND_WINDOW: usize = 60;

/// Least-squares slope of close against calendar day.
///
/// The time axis is days since the Common Era, so weekend and holiday gaps
/// stretch the axis instead of being collapsed.
pub fn ols_slope(points: &[PricePoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    let xs: Vec<f64> = points
        .iter()
        .map(|p| p.date.num_days_from_ce() as f64)
        .collect();
    let ys: Vec<f64> = points.iter().map(|p| p.close).collect();
    let (Some(x_mean), Some(y_mean)) = (mean(&xs), mean(&ys)) else {
        return 0.0;
    };

    let (num, den) = xs
        .iter()
        .zip(&ys)
        .fold((0.0, 0.0), |(num, den), (&x, &y)| {
            (num + (x - x_mean) * (y - y_mean), den + (x - x_mean).powi(2))
        });

    if den == 0.0 { 0.0 } else { num / den }
}

/// Slope divided by the population standard deviation of the closes.
///
/// A flat window (zero deviation) is normalized by 1. The divisor is never
/// negative, so the score keeps the sign of the raw slope.
pub fn trend_score(points: &[PricePoint]) -> f64 {
    let slope = ols_slope(points);
    let closes: Vec<f64> = points.iter().map(|p| p.close).collect();

    let scale = match (population_std_dev(&closes), mean(&closes)) {
        (Some(std_dev), Some(m)) if std_dev > f64::EPSILON * m.abs() => std_dev,
        _ => 1.0,
    };

    slope / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn daily(closes: &[f64]) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PricePoint::new(start + chrono::Duration::days(i as i64), c))
            .collect()
    }

    #[test]
    fn flat_window_scores_zero() {
        let points = daily(&[100.0; TREND_WINDOW]);
        assert_eq!(ols_slope(&points), 0.0);
        assert_eq!(trend_score(&points), 0.0);
    }

    #[test]
    fn too_few_points_score_zero() {
        assert_eq!(trend_score(&[]), 0.0);
        assert_eq!(trend_score(&daily(&[5.0])), 0.0);
    }

    #[test]
    fn known_slope_and_score() {
        let points = daily(&[1.0, 2.0, 3.0]);
        assert!((ols_slope(&points) - 1.0).abs() < 1e-12);
        // population std dev of 1,2,3 is sqrt(2/3)
        let expected = 1.0 / (2.0_f64 / 3.0).sqrt();
        assert!((trend_score(&points) - expected).abs() < 1e-12);
    }

    #[test]
    fn calendar_gaps_stretch_time_axis() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let points: Vec<PricePoint> = [(0, 1.0), (2, 2.0), (4, 3.0)]
            .iter()
            .map(|&(d, c)| PricePoint::new(start + chrono::Duration::days(d), c))
            .collect();
        assert!((ols_slope(&points) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn score_sign_matches_raw_slope() {
        let cases: [Vec<f64>; 4] = [
            (0..60).map(|i| 100.0 + i as f64).collect(),
            (0..60).map(|i| 100.0 - i as f64 * 0.3).collect(),
            (0..60).map(|i| 50.0 + ((i * 13) % 7) as f64).collect(),
            (0..60).map(|i| 0.01 + i as f64 * 1e-6).collect(),
        ];
        for closes in cases {
            let points = daily(&closes);
            let slope = ols_slope(&points);
            let score = trend_score(&points);
            assert_eq!(slope.signum(), score.signum(), "closes: {closes:?}");
        }
    }

    #[test]
    fn score_is_scale_invariant() {
        let base: Vec<f64> = (0..60).map(|i| 10.0 + i as f64 * 0.2).collect();
        let scaled: Vec<f64> = base.iter().map(|c| c * 1000.0).collect();
        let a = trend_score(&daily(&base));
        let b = trend_score(&daily(&scaled));
        assert!((a - b).abs() < 1e-9);
    }
}

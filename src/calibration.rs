// Scoring-rule metrics for binary win-probability predictions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

/// Brier, log loss, and accuracy for p(win) predictions against realized
/// outcomes. Mismatched or empty inputs score as zero samples.
pub fn evaluate_probs(predictions: &[f64], outcomes: &[bool]) -> Metrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return Metrics {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        };
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, won) in predictions.iter().zip(outcomes) {
        let p = p.clamp(0.0, 1.0);
        let y = if *won { 1.0 } else { 0.0 };
        brier_sum += (p - y) * (p - y);

        let actual_prob = if *won { p } else { 1.0 - p };
        log_loss_sum += -actual_prob.clamp(1e-12, 1.0).ln();

        if (p >= 0.5) == *won {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

/// Reliability table: probability bucket -> empirical win frequency.
pub fn calibration_bins(
    predictions: &[f64],
    outcomes: &[bool],
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, won) in predictions.iter().zip(outcomes) {
        let p = p.clamp(0.0, 1.0);
        let idx = ((p * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += p;
        if *won {
            actual_sum[idx] += 1.0;
        }
    }

    let mut out = Vec::with_capacity(bins);
    for i in 0..bins {
        let count = counts[i];
        let (avg_pred, actual_rate) = if count > 0 {
            (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
        } else {
            (0.0, 0.0)
        };
        out.push(CalibrationBin {
            bucket_start: i as f64 / bins as f64,
            bucket_end: (i + 1) as f64 / bins as f64,
            count,
            avg_pred,
            actual_rate,
        });
    }
    out
}

pub fn mean_absolute_error(predictions: &[f64], actuals: &[f64]) -> f64 {
    if predictions.is_empty() || predictions.len() != actuals.len() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(actuals)
        .map(|(p, a)| (p - a).abs())
        .sum::<f64>()
        / predictions.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions_have_zero_brier() {
        let m = evaluate_probs(&[1.0, 0.0, 1.0], &[true, false, true]);
        assert_eq!(m.samples, 3);
        assert!(m.brier < 1e-12);
        assert_eq!(m.accuracy, 1.0);
    }

    #[test]
    fn coin_flip_brier_is_a_quarter() {
        let m = evaluate_probs(&[0.5, 0.5, 0.5, 0.5], &[true, false, true, false]);
        assert!((m.brier - 0.25).abs() < 1e-12);
    }

    #[test]
    fn bins_accumulate_counts_and_rates() {
        let predictions = vec![0.05, 0.08, 0.92, 0.95];
        let outcomes = vec![false, false, true, true];
        let bins = calibration_bins(&predictions, &outcomes, 10);
        assert_eq!(bins.len(), 10);
        assert_eq!(bins[0].count, 2);
        assert_eq!(bins[0].actual_rate, 0.0);
        assert_eq!(bins[9].count, 2);
        assert_eq!(bins[9].actual_rate, 1.0);
    }

    #[test]
    fn mae_over_mismatched_lengths_is_zero() {
        assert_eq!(mean_absolute_error(&[1.0], &[1.0, 2.0]), 0.0);
        assert!((mean_absolute_error(&[10.0, 12.0], &[8.0, 16.0]) - 3.0).abs() < 1e-12);
    }
}

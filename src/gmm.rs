// 1-D Gaussian mixture fitting by EM.
//
// Fixed at three components (cold / normal / hot). Restarts are seeded from
// the caller so repeated fits over the same scores reproduce bit-identical
// mixtures on any machine.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

const EM_MAX_ITER: usize = 100;
const EM_TOL: f64 = 1e-6;
const EM_RESTARTS: usize = 4;
const VARIANCE_FLOOR: f64 = 1e-3;
const WEIGHT_FLOOR: f64 = 1e-6;
const MEAN_SEPARATION_EPS: f64 = 1e-4;

pub const N_COMPONENTS: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Component {
    pub weight: f64,
    pub mean: f64,
    pub variance: f64,
}

/// Three components sorted by mean ascending: index 0 = cold, 1 = normal,
/// 2 = hot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mixture {
    pub components: Vec<Component>,
}

#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub mixture: Mixture,
    /// True when EM failed numerically and the mixture was rebuilt from the
    /// sample moments instead.
    pub degraded: bool,
}

impl Mixture {
    pub fn cold(&self) -> &Component {
        &self.components[0]
    }

    pub fn normal(&self) -> &Component {
        &self.components[1]
    }

    pub fn hot(&self) -> &Component {
        &self.components[2]
    }

    pub fn weights_sum(&self) -> f64 {
        self.components.iter().map(|c| c.weight).sum()
    }

    /// Index of the component with the highest posterior mass at `x`.
    pub fn most_likely_component(&self, x: f64) -> usize {
        let mut best = 1;
        let mut best_score = f64::NEG_INFINITY;
        for (idx, c) in self.components.iter().enumerate() {
            let score = c.weight * normal_pdf(x, c.mean, c.variance);
            if score > best_score {
                best_score = score;
                best = idx;
            }
        }
        best
    }

    /// One draw from the full mixture.
    pub fn sample(&self, rng: &mut ChaCha8Rng) -> f64 {
        let u: f64 = rng.r#gen();
        let mut acc = 0.0;
        for c in &self.components {
            acc += c.weight;
            if u <= acc {
                return sample_normal(rng, c.mean, c.variance.sqrt());
            }
        }
        let last = self.components[N_COMPONENTS - 1];
        sample_normal(rng, last.mean, last.variance.sqrt())
    }

    /// One draw from a single component by index.
    pub fn sample_component(&self, idx: usize, rng: &mut ChaCha8Rng) -> f64 {
        let c = self.components[idx.min(N_COMPONENTS - 1)];
        sample_normal(rng, c.mean, c.variance.sqrt())
    }
}

/// Fit a three-component mixture. Falls back to a moment-based mixture when
/// EM degenerates (collapsed weight, underflowed variance, non-finite
/// likelihood, or coincident means).
pub fn fit(scores: &[f64], seed: u64) -> FitOutcome {
    debug_assert!(scores.len() >= N_COMPONENTS);

    let mut best: Option<(f64, Mixture)> = None;
    for restart in 0..EM_RESTARTS {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(restart as u64));
        if let Some((ll, mixture)) = em_once(scores, &mut rng) {
            let replace = match &best {
                Some((best_ll, _)) => ll > *best_ll,
                None => true,
            };
            if replace {
                best = Some((ll, mixture));
            }
        }
    }

    match best {
        Some((_, mut mixture)) => {
            mixture
                .components
                .sort_by(|a, b| a.mean.partial_cmp(&b.mean).unwrap_or(std::cmp::Ordering::Equal));
            if well_separated(&mixture) {
                FitOutcome {
                    mixture,
                    degraded: false,
                }
            } else {
                FitOutcome {
                    mixture: moment_fallback(scores),
                    degraded: true,
                }
            }
        }
        None => FitOutcome {
            mixture: moment_fallback(scores),
            degraded: true,
        },
    }
}

fn em_once(scores: &[f64], rng: &mut ChaCha8Rng) -> Option<(f64, Mixture)> {
    let n = scores.len();
    let (_, sample_var) = moments(scores);
    let sample_var = sample_var.max(VARIANCE_FLOOR);

    // Spread the initial means over the sample range with a little jitter so
    // restarts explore different basins.
    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = (max - min).max(1.0);
    let mut components: Vec<Component> = (0..N_COMPONENTS)
        .map(|k| {
            let base = min + span * (k as f64 + 0.5) / N_COMPONENTS as f64;
            let jitter = (rng.r#gen::<f64>() - 0.5) * span * 0.2;
            Component {
                weight: 1.0 / N_COMPONENTS as f64,
                mean: base + jitter,
                variance: sample_var,
            }
        })
        .collect();

    let mut responsibilities = vec![[0.0_f64; N_COMPONENTS]; n];
    let mut last_ll = f64::NEG_INFINITY;

    for _ in 0..EM_MAX_ITER {
        // E step.
        let mut ll = 0.0;
        for (i, &x) in scores.iter().enumerate() {
            let mut total = 0.0;
            let mut row = [0.0_f64; N_COMPONENTS];
            for (k, c) in components.iter().enumerate() {
                let p = c.weight * normal_pdf(x, c.mean, c.variance);
                row[k] = p;
                total += p;
            }
            if !total.is_finite() || total <= 0.0 {
                return None;
            }
            for value in row.iter_mut() {
                *value /= total;
            }
            responsibilities[i] = row;
            ll += total.ln();
        }

        // M step.
        for k in 0..N_COMPONENTS {
            let nk: f64 = responsibilities.iter().map(|r| r[k]).sum();
            if nk < WEIGHT_FLOOR * n as f64 {
                return None;
            }
            let mean = scores
                .iter()
                .zip(responsibilities.iter())
                .map(|(&x, r)| r[k] * x)
                .sum::<f64>()
                / nk;
            let variance = scores
                .iter()
                .zip(responsibilities.iter())
                .map(|(&x, r)| r[k] * (x - mean) * (x - mean))
                .sum::<f64>()
                / nk;
            components[k] = Component {
                weight: nk / n as f64,
                mean,
                variance: variance.max(VARIANCE_FLOOR),
            };
        }

        if !ll.is_finite() {
            return None;
        }
        if (ll - last_ll).abs() < EM_TOL {
            last_ll = ll;
            break;
        }
        last_ll = ll;
    }

    // Renormalize against floating drift; a mixture is only usable when its
    // weights still form a distribution.
    let total_weight: f64 = components.iter().map(|c| c.weight).sum();
    if !(0.5..=1.5).contains(&total_weight) {
        return None;
    }
    for c in components.iter_mut() {
        c.weight /= total_weight;
    }

    Some((last_ll, Mixture { components }))
}

fn well_separated(mixture: &Mixture) -> bool {
    mixture
        .components
        .windows(2)
        .all(|pair| pair[1].mean - pair[0].mean > MEAN_SEPARATION_EPS)
}

/// Single-Gaussian fallback expanded into three offset components so the
/// artifact shape stays uniform for every trained player.
pub fn moment_fallback(scores: &[f64]) -> Mixture {
    let (mean, variance) = moments(scores);
    let variance = variance.max(VARIANCE_FLOOR);
    let offset = (variance.sqrt() * 0.5).max(0.5);
    Mixture {
        components: vec![
            Component {
                weight: 0.25,
                mean: mean - offset,
                variance,
            },
            Component {
                weight: 0.50,
                mean,
                variance,
            },
            Component {
                weight: 0.25,
                mean: mean + offset,
                variance,
            },
        ],
    }
}

pub fn moments(scores: &[f64]) -> (f64, f64) {
    if scores.is_empty() {
        return (0.0, 0.0);
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    (mean, variance)
}

pub fn normal_pdf(x: f64, mean: f64, variance: f64) -> f64 {
    let variance = variance.max(VARIANCE_FLOOR);
    let z = (x - mean) * (x - mean) / (2.0 * variance);
    (-z).exp() / (2.0 * std::f64::consts::PI * variance).sqrt()
}

/// Box-Muller draw.
pub fn sample_normal(rng: &mut ChaCha8Rng, mean: f64, std: f64) -> f64 {
    let u1: f64 = rng.r#gen::<f64>().max(1e-12);
    let u2: f64 = rng.r#gen();
    let radius = (-2.0 * u1.ln()).sqrt();
    let theta = 2.0 * std::f64::consts::PI * u2;
    mean + std * radius * theta.cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trimodal_scores() -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let mut scores = Vec::new();
        for _ in 0..40 {
            scores.push(sample_normal(&mut rng, 5.0, 1.0));
            scores.push(sample_normal(&mut rng, 14.0, 1.2));
            scores.push(sample_normal(&mut rng, 24.0, 1.5));
        }
        scores
    }

    #[test]
    fn fit_recovers_three_increasing_means() {
        let scores = trimodal_scores();
        let outcome = fit(&scores, 7);
        assert!(!outcome.degraded);
        let m = &outcome.mixture;
        assert_eq!(m.components.len(), 3);
        assert!((m.weights_sum() - 1.0).abs() < 1e-6);
        assert!(m.cold().mean < m.normal().mean);
        assert!(m.normal().mean < m.hot().mean);
        for c in &m.components {
            assert!(c.variance > 0.0);
        }
        assert!((m.cold().mean - 5.0).abs() < 2.0);
        assert!((m.hot().mean - 24.0).abs() < 2.0);
    }

    #[test]
    fn fit_is_deterministic_per_seed() {
        let scores = trimodal_scores();
        let a = fit(&scores, 42).mixture;
        let b = fit(&scores, 42).mixture;
        for (x, y) in a.components.iter().zip(b.components.iter()) {
            assert_eq!(x.mean.to_bits(), y.mean.to_bits());
            assert_eq!(x.variance.to_bits(), y.variance.to_bits());
            assert_eq!(x.weight.to_bits(), y.weight.to_bits());
        }
    }

    #[test]
    fn constant_scores_degrade_to_moment_fallback() {
        let scores = vec![10.0; 8];
        let outcome = fit(&scores, 3);
        assert!(outcome.degraded);
        let m = &outcome.mixture;
        assert_eq!(m.components.len(), 3);
        assert!((m.weights_sum() - 1.0).abs() < 1e-9);
        assert!(m.cold().mean < m.normal().mean && m.normal().mean < m.hot().mean);
    }

    #[test]
    fn posterior_assigns_extreme_observations_to_edge_components() {
        let scores = trimodal_scores();
        let m = fit(&scores, 11).mixture;
        assert_eq!(m.most_likely_component(4.0), 0);
        assert_eq!(m.most_likely_component(25.0), 2);
    }

    #[test]
    fn normal_sampler_matches_target_moments() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let draws: Vec<f64> = (0..20_000)
            .map(|_| sample_normal(&mut rng, 12.0, 3.0))
            .collect();
        let (mean, variance) = moments(&draws);
        assert!((mean - 12.0).abs() < 0.1);
        assert!((variance.sqrt() - 3.0).abs() < 0.1);
    }
}

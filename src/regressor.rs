use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::features::FeatureMatrix;

const ETA_MIN: f64 = -10.0;
const ETA_MAX: f64 = 4.0;
const STD_FLOOR: f64 = 1e-6;
const IMPROVEMENT_EPS: f64 = 1e-7;
const PATIENCE: usize = 10;
const MIN_RATE: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressorParams {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    pub batch_size: usize,
}

impl Default for RegressorParams {
    fn default() -> Self {
        Self {
            epochs: 100,
            learning_rate: 0.1,
            l2: 1e-3,
            batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub samples: usize,
    pub epochs_run: usize,
    pub train_deviance: Option<f64>,
    pub eval_deviance: Option<f64>,
}

/// Log-link Poisson GLM over standardized features.
///
/// Standardization statistics are frozen at the first fit; later fits
/// continue from the stored coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoissonRegressor {
    pub params: RegressorParams,
    pub seed: Option<u64>,
    pub feature_names: Vec<String>,
    pub feature_means: Vec<f64>,
    pub feature_stds: Vec<f64>,
    pub intercept: f64,
    pub coeffs: Vec<f64>,
    pub fits: u32,
    pub samples_seen: usize,
    pub train_deviance: Option<f64>,
    pub eval_deviance: Option<f64>,
}

impl PoissonRegressor {
    pub fn new(params: RegressorParams, seed: Option<u64>) -> Self {
        Self {
            params,
            seed,
            feature_names: Vec::new(),
            feature_means: Vec::new(),
            feature_stds: Vec::new(),
            intercept: 0.0,
            coeffs: Vec::new(),
            fits: 0,
            samples_seen: 0,
            train_deviance: None,
            eval_deviance: None,
        }
    }

    pub fn constant(feature_names: Vec<String>, rate: f64) -> Self {
        let width = feature_names.len();
        Self {
            feature_names,
            feature_means: vec![0.0; width],
            feature_stds: vec![1.0; width],
            intercept: rate.max(MIN_RATE).ln(),
            coeffs: vec![0.0; width],
            ..Self::new(RegressorParams::default(), None)
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.feature_names.is_empty()
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let z = self.standardize(row);
        linear(self.intercept, &self.coeffs, &z).exp()
    }

    pub fn fit(
        &mut self,
        x: &FeatureMatrix,
        y: &[u32],
        eval: Option<(&FeatureMatrix, &[u32])>,
    ) -> FitReport {
        let n = x.n_rows().min(y.len());
        if n == 0 {
            return FitReport {
                samples: 0,
                epochs_run: 0,
                train_deviance: None,
                eval_deviance: None,
            };
        }

        if !self.is_fitted() {
            self.initialize(x, &y[..n]);
        }
        let train_z = self.standardize_matrix(&x.conform(&self.feature_names));
        let train_z = &train_z[..n];
        let train_y = &y[..n];
        let eval_data = eval
            .filter(|(ex, ey)| ex.n_rows() > 0 && !ey.is_empty())
            .map(|(ex, ey)| {
                let z = self.standardize_matrix(&ex.conform(&self.feature_names));
                let m = z.len().min(ey.len());
                (z[..m].to_vec(), ey[..m].to_vec())
            });

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(self.fits))),
            None => StdRng::from_entropy(),
        };

        let mut intercept = self.intercept;
        let mut coeffs = self.coeffs.clone();
        let mut best = (intercept, coeffs.clone());
        let mut best_eval = eval_data
            .as_ref()
            .map(|(z, ey)| mean_deviance(intercept, &coeffs, z, ey))
            .unwrap_or(f64::INFINITY);
        let mut no_improve = 0usize;
        let mut order = (0..n).collect::<Vec<_>>();
        let batch_size = self.params.batch_size.max(1);
        let mut epochs_run = 0usize;

        for epoch in 0..self.params.epochs {
            epochs_run = epoch + 1;
            order.shuffle(&mut rng);
            let lr = self.params.learning_rate / (1.0 + epoch as f64 * 0.01);

            for batch in order.chunks(batch_size) {
                let mut grad_b = 0.0;
                let mut grad = vec![0.0; coeffs.len()];
                for &i in batch {
                    let mu = linear(intercept, &coeffs, &train_z[i]).exp();
                    let residual = mu - f64::from(train_y[i]);
                    grad_b += residual;
                    for (g, z) in grad.iter_mut().zip(&train_z[i]) {
                        *g += residual * z;
                    }
                }
                let scale = batch.len() as f64;
                intercept -= lr * grad_b / scale;
                for (w, g) in coeffs.iter_mut().zip(&grad) {
                    *w -= lr * (g / scale + self.params.l2 * *w);
                }
            }

            if let Some((z, ey)) = eval_data.as_ref() {
                let current = mean_deviance(intercept, &coeffs, z, ey);
                if current + IMPROVEMENT_EPS < best_eval {
                    best_eval = current;
                    best = (intercept, coeffs.clone());
                    no_improve = 0;
                } else {
                    no_improve = no_improve.saturating_add(1);
                    if no_improve >= PATIENCE {
                        break;
                    }
                }
            }
        }

        if eval_data.is_some() {
            (intercept, coeffs) = best;
        }
        self.intercept = intercept;
        self.coeffs = coeffs;
        self.fits = self.fits.saturating_add(1);
        self.samples_seen = self.samples_seen.saturating_add(n);

        let train_deviance = finite(mean_deviance(
            self.intercept,
            &self.coeffs,
            train_z,
            train_y,
        ));
        let eval_deviance = eval_data
            .as_ref()
            .and_then(|(z, ey)| finite(mean_deviance(self.intercept, &self.coeffs, z, ey)));
        self.train_deviance = train_deviance;
        self.eval_deviance = eval_deviance;

        FitReport {
            samples: n,
            epochs_run,
            train_deviance,
            eval_deviance,
        }
    }

    fn initialize(&mut self, x: &FeatureMatrix, y: &[u32]) {
        let width = x.n_cols();
        let n = x.n_rows() as f64;
        let mut means = vec![0.0; width];
        for row in &x.rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let mut stds = vec![0.0; width];
        for row in &x.rows {
            for ((s, v), m) in stds.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2) / n;
            }
        }
        for s in stds.iter_mut() {
            *s = s.sqrt();
            if *s < STD_FLOOR {
                *s = 1.0;
            }
        }

        let mean_y = y.iter().map(|v| f64::from(*v)).sum::<f64>() / y.len().max(1) as f64;
        self.feature_names = x.columns.clone();
        self.feature_means = means;
        self.feature_stds = stds;
        self.intercept = mean_y.max(MIN_RATE).ln();
        self.coeffs = vec![0.0; width];
    }

    fn standardize(&self, row: &[f64]) -> Vec<f64> {
        self.feature_means
            .iter()
            .zip(&self.feature_stds)
            .enumerate()
            .map(|(j, (mean, std))| (row.get(j).copied().unwrap_or(0.0) - mean) / std)
            .collect()
    }

    fn standardize_matrix(&self, x: &FeatureMatrix) -> Vec<Vec<f64>> {
        x.rows.iter().map(|row| self.standardize(row)).collect()
    }
}

fn linear(intercept: f64, coeffs: &[f64], z: &[f64]) -> f64 {
    let eta = intercept + coeffs.iter().zip(z).map(|(w, v)| w * v).sum::<f64>();
    if eta.is_nan() {
        return ETA_MIN;
    }
    eta.clamp(ETA_MIN, ETA_MAX)
}

pub fn mean_deviance(intercept: f64, coeffs: &[f64], z: &[Vec<f64>], y: &[u32]) -> f64 {
    if z.is_empty() || y.is_empty() {
        return f64::INFINITY;
    }
    let mut sum = 0.0;
    for (row, target) in z.iter().zip(y) {
        let mu = linear(intercept, coeffs, row).exp();
        let t = f64::from(*target);
        let term = if t > 0.0 { t * (t / mu).ln() } else { 0.0 };
        sum += 2.0 * (term - (t - mu));
    }
    sum / z.len().min(y.len()) as f64
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::{PoissonRegressor, RegressorParams, mean_deviance};
    use crate::features::FeatureMatrix;

    fn matrix(rows: Vec<Vec<f64>>) -> FeatureMatrix {
        FeatureMatrix {
            columns: vec!["a".to_string()],
            rows,
        }
    }

    #[test]
    fn constant_model_predicts_its_rate() {
        let model = PoissonRegressor::constant(vec!["a".to_string()], 2.5);
        assert!((model.predict(&[10.0]) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn fit_learns_increasing_rate() {
        let xs = (0..200).map(|i| vec![(i % 4) as f64]).collect::<Vec<_>>();
        let ys = (0..200).map(|i| (i % 4) as u32).collect::<Vec<_>>();
        let mut model = PoissonRegressor::new(RegressorParams::default(), Some(7));
        let report = model.fit(&matrix(xs), &ys, None);
        assert_eq!(report.samples, 200);
        assert!(model.predict(&[3.0]) > model.predict(&[0.0]));
        assert_eq!(model.fits, 1);
    }

    #[test]
    fn seeded_fits_are_deterministic() {
        let xs = (0..50).map(|i| vec![(i % 5) as f64]).collect::<Vec<_>>();
        let ys = (0..50).map(|i| (i % 3) as u32).collect::<Vec<_>>();
        let mut a = PoissonRegressor::new(RegressorParams::default(), Some(42));
        let mut b = PoissonRegressor::new(RegressorParams::default(), Some(42));
        a.fit(&matrix(xs.clone()), &ys, None);
        b.fit(&matrix(xs), &ys, None);
        assert_eq!(a.coeffs, b.coeffs);
        assert_eq!(a.intercept, b.intercept);
    }

    #[test]
    fn deviance_is_zero_for_exact_rate_and_infinite_when_empty() {
        let z = vec![vec![0.0]];
        assert!(mean_deviance(2.0f64.ln(), &[0.0], &z, &[2]).abs() < 1e-9);
        assert!(mean_deviance(0.0, &[0.0], &[], &[]).is_infinite());
    }
}

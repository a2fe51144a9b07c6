//! Generic, model-agnostic RANSAC implementation.
//!
//! Implement the [`Estimator`] trait for a model and call [`ransac`] with a
//! slice of data and some [`RansacOptions`]. Minimal solvers may produce
//! several candidate models per sample (P3P yields up to four); every
//! candidate is scored against the full data set.
//!
//! The loop never panics on failure: when no consensus is found, [`ransac`]
//! returns a [`RansacResult`] with `success == false` and `model == None`.

use rand::prelude::IndexedRandom;
use rand::{rngs::StdRng, SeedableRng};

/// Configuration parameters for the generic RANSAC engine.
#[derive(Debug, Clone)]
pub struct RansacOptions {
    /// Maximum number of RANSAC iterations.
    pub max_iters: usize,
    /// Inlier residual threshold.
    pub thresh: f64,
    /// Minimum number of inliers required to accept a model.
    pub min_inliers: usize,
    /// Desired confidence level in `[0, 1]` for finding a good model.
    pub confidence: f64,
    /// Random-number generator seed (for reproducibility).
    pub seed: u64,
    /// If `true`, refit the model on all inliers before scoring.
    pub refit_on_inliers: bool,
}

impl Default for RansacOptions {
    fn default() -> Self {
        Self {
            max_iters: 1024,
            thresh: 4.0,
            min_inliers: 4,
            confidence: 0.999,
            seed: 1_234_567,
            refit_on_inliers: true,
        }
    }
}

/// Output of a RANSAC run.
#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    /// Whether a consensus set satisfying the options was found.
    pub success: bool,
    /// Best model found (if any).
    pub model: Option<M>,
    /// Indices of inlier data points, ascending.
    pub inliers: Vec<usize>,
    /// Root-mean-square residual over inliers.
    pub inlier_rms: f64,
    /// Number of iterations actually performed.
    pub iters: usize,
}

impl<M> Default for RansacResult<M> {
    fn default() -> Self {
        Self {
            success: false,
            model: None,
            inliers: Vec::new(),
            inlier_rms: f64::INFINITY,
            iters: 0,
        }
    }
}

impl<M> RansacResult<M> {
    /// Per-datum inlier flags for a data set of `n` elements.
    pub fn inlier_mask(&self, n: usize) -> Vec<bool> {
        let mut mask = vec![false; n];
        for &i in &self.inliers {
            if i < n {
                mask[i] = true;
            }
        }
        mask
    }
}

/// Generic estimator for RANSAC-like methods.
pub trait Estimator {
    type Datum;
    type Model;

    /// Minimal number of samples needed to estimate a model.
    const MIN_SAMPLES: usize;

    /// Fit candidate models from a subset of data indices.
    ///
    /// Return an empty vector if the subset is degenerate or fitting fails.
    fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Vec<Self::Model>;

    /// Non-negative residual for one datum, in the units of `opts.thresh`.
    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64;

    /// Optional degeneracy check on the sample subset.
    fn is_degenerate(_data: &[Self::Datum], _sample_indices: &[usize]) -> bool {
        false
    }

    /// Optional refit on the full inlier set. Default: keep the sample model.
    fn refit(_data: &[Self::Datum], _inliers: &[usize]) -> Option<Self::Model> {
        None
    }
}

fn rms(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::INFINITY;
    }
    let ss: f64 = vals.iter().map(|&v| v * v).sum();
    (ss / (vals.len() as f64)).sqrt()
}

/// Adaptive iteration bound from the current inlier ratio.
fn calculate_iterations(
    confidence: f64,
    inlier_ratio: f64,
    min_samples: usize,
    iters_so_far: usize,
    max_iters: usize,
) -> usize {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return max_iters;
    }

    let denom = (1.0 - inlier_ratio.powi(min_samples as i32)).max(1e-12).ln();
    if denom >= 0.0 {
        return max_iters;
    }

    let n_iter = ((1.0 - confidence).ln() / denom).ceil() as usize;
    n_iter.clamp(iters_so_far, max_iters)
}

fn collect_inliers<E: Estimator>(
    model: &E::Model,
    data: &[E::Datum],
    thresh: f64,
    inliers: &mut Vec<usize>,
    residuals: &mut Vec<f64>,
) {
    inliers.clear();
    residuals.clear();
    for (i, datum) in data.iter().enumerate() {
        let r = E::residual(model, datum);
        if r <= thresh {
            inliers.push(i);
            residuals.push(r);
        }
    }
}

/// Run a generic RANSAC loop for a given [`Estimator`] implementation.
///
/// A model beats the current best when it has more inliers, or as many
/// inliers with a lower RMS.
pub fn ransac<E: Estimator>(data: &[E::Datum], opts: &RansacOptions) -> RansacResult<E::Model> {
    let mut best: RansacResult<E::Model> = RansacResult::default();

    if data.len() < E::MIN_SAMPLES || E::MIN_SAMPLES == 0 {
        return best;
    }

    let all_indices: Vec<usize> = (0..data.len()).collect();
    let mut sample_idxs = vec![0usize; E::MIN_SAMPLES];
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut dynamic_max_iters = opts.max_iters;

    let mut inliers = Vec::<usize>::with_capacity(data.len());
    let mut residuals = Vec::<f64>::with_capacity(data.len());

    let mut num_iters = 0;
    while num_iters < dynamic_max_iters {
        num_iters += 1;
        all_indices
            .as_slice()
            .choose_multiple(&mut rng, E::MIN_SAMPLES)
            .enumerate()
            .for_each(|(k, &idx)| sample_idxs[k] = idx);

        if E::is_degenerate(data, &sample_idxs) {
            continue;
        }

        for candidate in E::fit(data, &sample_idxs) {
            collect_inliers::<E>(&candidate, data, opts.thresh, &mut inliers, &mut residuals);
            if inliers.len() < opts.min_inliers {
                continue;
            }

            let mut model = candidate;
            if opts.refit_on_inliers {
                if let Some(refit) = E::refit(data, &inliers) {
                    model = refit;
                    collect_inliers::<E>(&model, data, opts.thresh, &mut inliers, &mut residuals);
                    if inliers.len() < opts.min_inliers {
                        continue;
                    }
                }
            }

            let score_rms = rms(&residuals);
            let better = !best.success
                || inliers.len() > best.inliers.len()
                || (inliers.len() == best.inliers.len() && score_rms < best.inlier_rms);
            if better {
                best.success = true;
                best.model = Some(model);
                best.inliers = inliers.clone();
                best.inlier_rms = score_rms;
                dynamic_max_iters = calculate_iterations(
                    opts.confidence,
                    best.inliers.len() as f64 / data.len() as f64,
                    E::MIN_SAMPLES,
                    num_iters,
                    opts.max_iters,
                );
            }
        }
    }

    best.iters = num_iters;
    best
}

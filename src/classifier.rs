//! Facet classifier: weighted, class-balanced logistic regression.
//!
//! Training minimizes
//!
//! ```text
//! (sum_i s_i * logloss(y_i, sigmoid(w . x_i + b)) + ||w||^2 / (2C)) / sum_i s_i
//! ```
//!
//! where `s_i` is the row's sample weight multiplied by the "balanced" class
//! weight `n_rows / (2 * class_count)`. Dividing by the total weight leaves
//! the minimizer unchanged and keeps the gradient tolerance independent of
//! how many rows were labelled. The intercept is not regularized.
//! The optimizer is a deterministic L-BFGS started from zero, so the same
//! training set always produces the same model.

use std::collections::{HashSet, VecDeque};

use candle_core::{Device, Tensor};
use rayon::prelude::*;

use crate::{
    corpus::EmbeddingMatrix,
    error::{Error, Result},
};

/// Rows per partial sum when evaluating the objective. Fixed so the
/// floating-point summation order does not depend on the thread pool.
const ROWS_PER_CHUNK: usize = 256;

/// L-BFGS correction pairs kept.
const HISTORY: usize = 10;

const MAX_LINE_SEARCH: usize = 50;

/// Armijo sufficient-decrease constant.
const ARMIJO: f64 = 1e-4;

/// Relative objective decrease below which training counts as converged.
const FTOL: f64 = 64.0 * f64::EPSILON;

/// Positive and negative uuids for a single training round.
#[derive(Debug, Clone)]
pub struct LabelSet {
    positives: Vec<usize>,
    negatives: Vec<usize>,
    members: HashSet<usize>,
}

impl LabelSet {
    pub fn new(positives: Vec<usize>, negatives: Vec<usize>) -> Self {
        let members = positives.iter().chain(&negatives).copied().collect();
        Self {
            positives,
            negatives,
            members,
        }
    }

    pub fn positives(&self) -> &[usize] {
        &self.positives
    }

    pub fn negatives(&self) -> &[usize] {
        &self.negatives
    }

    /// Whether `uuid` was used for training, with either label.
    pub fn contains(&self, uuid: usize) -> bool {
        self.members.contains(&uuid)
    }

    pub fn len(&self) -> usize {
        self.positives.len() + self.negatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Knobs for [`train`].
#[derive(Debug, Clone)]
pub struct TrainOptions {
    /// Inverse L2 regularization strength.
    pub regularization: f64,
    pub max_iter: usize,
    /// Stop once every gradient component is at most this large.
    pub tolerance: f64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            regularization: 1.0,
            max_iter: 100_000,
            tolerance: 1e-4,
        }
    }
}

/// Embeddings, labels, and per-row sample weights ready for fitting.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    dimension: usize,
    /// Row-major, `labels.len()` rows.
    features: Vec<f32>,
    labels: Vec<bool>,
    sample_weights: Vec<f64>,
}

impl TrainingSet {
    /// Build the training set for a label set: positive rows first, then
    /// negative rows.
    ///
    /// Each row gets `example_weight` as its sample weight, from one weight
    /// vector per class so the lengths always match the row counts.
    pub fn from_labels(
        embeddings: &EmbeddingMatrix,
        labels: &LabelSet,
        example_weight: f64,
    ) -> Result<Self> {
        let positives = labels.positives();
        let negatives = labels.negatives();
        if positives.is_empty() || negatives.is_empty() {
            return Err(Error::DegenerateTrainingSet {
                positives: positives.len(),
                negatives: negatives.len(),
            });
        }

        let mut features = embeddings.gather(positives);
        features.extend(embeddings.gather(negatives));

        let mut targets = vec![true; positives.len()];
        targets.resize(positives.len() + negatives.len(), false);

        let positive_weights = vec![example_weight; positives.len()];
        let negative_weights = vec![example_weight; negatives.len()];
        let mut sample_weights = positive_weights;
        sample_weights.extend(negative_weights);

        Self::new(embeddings.dimension(), features, targets, sample_weights)
    }

    pub fn new(
        dimension: usize,
        features: Vec<f32>,
        labels: Vec<bool>,
        sample_weights: Vec<f64>,
    ) -> Result<Self> {
        if dimension == 0 || features.len() != labels.len() * dimension {
            return Err(Error::Config(format!(
                "training features hold {} values, expected {} rows x {dimension}",
                features.len(),
                labels.len()
            )));
        }
        if sample_weights.len() != labels.len() {
            return Err(Error::Config(format!(
                "{} sample weights for {} training rows",
                sample_weights.len(),
                labels.len()
            )));
        }
        Ok(Self {
            dimension,
            features,
            labels,
            sample_weights,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Count of (positive, negative) rows.
    pub fn class_counts(&self) -> (usize, usize) {
        let positives = self.labels.iter().filter(|&&y| y).count();
        (positives, self.labels.len() - positives)
    }

    /// Balanced class weights `(positive, negative)`.
    pub fn class_weights(&self) -> (f64, f64) {
        let (p, n) = self.class_counts();
        let total = self.labels.len() as f64;
        (total / (2.0 * p as f64), total / (2.0 * n as f64))
    }

    /// Sample weight times class weight, per row.
    fn effective_weights(&self) -> Vec<f64> {
        let (wp, wn) = self.class_weights();
        self.labels
            .iter()
            .zip(&self.sample_weights)
            .map(|(&y, &s)| s * if y { wp } else { wn })
            .collect()
    }
}

/// A fitted linear facet model.
#[derive(Debug, Clone)]
pub struct FacetModel {
    weights: Vec<f32>,
    bias: f32,
    iterations: usize,
    converged: bool,
}

/// Fit a facet model. Pure: nothing outside the arguments is read or
/// written.
pub fn train(set: &TrainingSet, options: &TrainOptions) -> Result<FacetModel> {
    let (positives, negatives) = set.class_counts();
    if positives == 0 || negatives == 0 {
        return Err(Error::DegenerateTrainingSet {
            positives,
            negatives,
        });
    }
    if options.regularization <= 0.0 {
        return Err(Error::Config(
            "regularization must be positive".into(),
        ));
    }

    let objective = Objective::new(set, options.regularization);

    let fit = lbfgs(&objective, options);
    if !fit.converged {
        tracing::warn!(
            iterations = fit.iterations,
            "facet classifier did not converge"
        );
    }
    tracing::debug!(
        iterations = fit.iterations,
        loss = fit.loss,
        converged = fit.converged,
        "trained facet classifier"
    );

    let d = set.dimension;
    Ok(FacetModel {
        weights: fit.params[..d].iter().map(|&v| v as f32).collect(),
        bias: fit.params[d] as f32,
        iterations: fit.iterations,
        converged: fit.converged,
    })
}

impl FacetModel {
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Probability of the positive class for every row of `embeddings`.
    ///
    /// Rows are scored `batch_size` at a time to bound the tensor copy.
    pub fn predict_proba(
        &self,
        embeddings: &EmbeddingMatrix,
        batch_size: usize,
    ) -> Result<Vec<f32>> {
        let d = embeddings.dimension();
        if d != self.weights.len() {
            return Err(Error::Config(format!(
                "model expects {}-dimensional embeddings, corpus has {d}",
                self.weights.len()
            )));
        }

        let device = Device::Cpu;
        let w = Tensor::from_slice(&self.weights, (d, 1), &device)
            .map_err(map_candle_err)?;
        let bias = self.bias as f64;

        let mut scores = Vec::with_capacity(embeddings.rows());
        for batch in embeddings.as_slice().chunks(batch_size.max(1) * d) {
            let rows = batch.len() / d;
            let logits = Tensor::from_slice(batch, (rows, d), &device)
                .and_then(|x| x.matmul(&w))
                .and_then(|z| z.flatten_all())
                .and_then(|z| z.to_vec1::<f32>())
                .map_err(map_candle_err)?;
            scores.extend(
                logits.into_iter().map(|z| sigmoid(z as f64 + bias) as f32),
            );
        }

        Ok(scores)
    }
}

fn map_candle_err(e: candle_core::Error) -> Error {
    Error::Config(format!("tensor computation error: {e}"))
}

struct Objective<'a> {
    set: &'a TrainingSet,
    /// Effective per-row weights.
    weights: Vec<f64>,
    inv_c: f64,
    /// `1 / sum(weights)`.
    scale: f64,
}

impl<'a> Objective<'a> {
    fn new(set: &'a TrainingSet, regularization: f64) -> Self {
        let weights = set.effective_weights();
        let total: f64 = weights.iter().sum();
        Self {
            set,
            weights,
            inv_c: 1.0 / regularization,
            scale: 1.0 / total,
        }
    }

    /// Loss and gradient at `params` (`dimension` weights then the bias).
    fn evaluate(&self, params: &[f64]) -> (f64, Vec<f64>) {
        let d = self.set.dimension;
        let (w, b) = params.split_at(d);
        let b = b[0];

        let partials: Vec<(f64, Vec<f64>)> = self
            .set
            .features
            .par_chunks(ROWS_PER_CHUNK * d)
            .enumerate()
            .map(|(chunk_idx, chunk)| {
                let first_row = chunk_idx * ROWS_PER_CHUNK;
                let mut loss = 0.0;
                let mut grad = vec![0.0; d + 1];
                for (offset, x) in chunk.chunks_exact(d).enumerate() {
                    let row = first_row + offset;
                    let weight = self.weights[row];
                    let z = dot_mixed(x, w) + b;
                    let (row_loss, residual) = if self.set.labels[row] {
                        (softplus(-z), sigmoid(z) - 1.0)
                    } else {
                        (softplus(z), sigmoid(z))
                    };
                    loss += weight * row_loss;
                    let coef = weight * residual;
                    for (g, &xj) in grad[..d].iter_mut().zip(x) {
                        *g += coef * xj as f64;
                    }
                    grad[d] += coef;
                }
                (loss, grad)
            })
            .collect();

        let mut loss = 0.5 * self.inv_c * dot(w, w);
        let mut grad: Vec<f64> = w.iter().map(|&v| v * self.inv_c).collect();
        grad.push(0.0);
        for (partial_loss, partial_grad) in partials {
            loss += partial_loss;
            for (g, p) in grad.iter_mut().zip(partial_grad) {
                *g += p;
            }
        }
        grad.iter_mut().for_each(|g| *g *= self.scale);
        (loss * self.scale, grad)
    }
}

struct Fit {
    params: Vec<f64>,
    loss: f64,
    iterations: usize,
    converged: bool,
}

fn lbfgs(objective: &Objective<'_>, options: &TrainOptions) -> Fit {
    let n = objective.set.dimension + 1;
    let mut x = vec![0.0; n];
    let (mut f, mut g) = objective.evaluate(&x);
    let mut history: VecDeque<(Vec<f64>, Vec<f64>, f64)> =
        VecDeque::with_capacity(HISTORY);
    let mut converged = false;
    let mut iterations = 0;

    while iterations < options.max_iter {
        if max_abs(&g) <= options.tolerance {
            converged = true;
            break;
        }
        iterations += 1;

        let mut direction = two_loop(&g, &history);
        let mut slope = dot(&g, &direction);
        if slope >= 0.0 {
            // Curvature pairs went stale; restart from steepest descent.
            history.clear();
            direction = two_loop(&g, &history);
            slope = dot(&g, &direction);
        }

        let mut step = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_LINE_SEARCH {
            let candidate: Vec<f64> = x
                .iter()
                .zip(&direction)
                .map(|(xi, di)| xi + step * di)
                .collect();
            let (f_new, g_new) = objective.evaluate(&candidate);
            if f_new <= f + ARMIJO * step * slope {
                accepted = Some((candidate, f_new, g_new));
                break;
            }
            step *= 0.5;
        }

        let Some((x_new, f_new, g_new)) = accepted else {
            tracing::debug!(iterations, "line search made no progress");
            break;
        };

        let s: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > 1e-10 {
            if history.len() == HISTORY {
                history.pop_front();
            }
            history.push_back((s, y, 1.0 / sy));
        }

        let decrease = (f - f_new) / f.abs().max(f_new.abs()).max(1.0);
        x = x_new;
        f = f_new;
        g = g_new;
        if decrease <= FTOL {
            converged = true;
            break;
        }
    }

    Fit {
        params: x,
        loss: f,
        iterations,
        converged,
    }
}

/// L-BFGS two-loop recursion: returns the search direction `-H g`.
fn two_loop(g: &[f64], history: &VecDeque<(Vec<f64>, Vec<f64>, f64)>) -> Vec<f64> {
    let mut q = g.to_vec();
    let mut alphas = Vec::with_capacity(history.len());
    for (s, y, rho) in history.iter().rev() {
        let alpha = rho * dot(s, &q);
        axpy(-alpha, y, &mut q);
        alphas.push(alpha);
    }

    let gamma = match history.back() {
        Some((s, y, _)) => dot(s, y) / dot(y, y),
        // First step has unit length.
        None => 1.0 / dot(g, g).sqrt().max(f64::MIN_POSITIVE),
    };
    q.iter_mut().for_each(|v| *v *= gamma);

    for ((s, y, rho), alpha) in history.iter().zip(alphas.iter().rev()) {
        let beta = rho * dot(y, &q);
        axpy(alpha - beta, s, &mut q);
    }

    q.iter_mut().for_each(|v| *v = -*v);
    q
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn dot_mixed(x: &[f32], w: &[f64]) -> f64 {
    x.iter().zip(w).map(|(&a, &b)| a as f64 * b).sum()
}

fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |m, x| m.max(x.abs()))
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^t)` without overflow.
fn softplus(t: f64) -> f64 {
    if t > 0.0 {
        t + (-t).exp().ln_1p()
    } else {
        t.exp().ln_1p()
    }
}

//! Metric formulas over paired arrays.
//!
//! Classification and regression functions reject NaN input outright.
//! Statistical functions (correlation, divergence) follow a `NanPolicy`.

use crate::nan::NanPolicy;
use evalkit_core::{AppError, AppResult};

fn validate_paired(name: &str, x: &[f64], y: &[f64], min_len: usize) -> AppResult<()> {
    if x.len() != y.len() {
        return Err(AppError::validation(format!(
            "{name}: inputs differ in length ({} vs {})",
            x.len(),
            y.len()
        )));
    }
    if x.len() < min_len {
        return Err(AppError::validation(format!(
            "{name}: need at least {min_len} observations, got {}",
            x.len()
        )));
    }
    Ok(())
}

fn reject_nan(x: &[f64], y: &[f64]) -> AppResult<()> {
    if x.iter().chain(y).any(|v| v.is_nan()) {
        return Err(AppError::numeric("Input contains NaN"));
    }
    Ok(())
}

// ── classification ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccuracyCounts {
    pub correct: usize,
    pub total: usize,
}

impl AccuracyCounts {
    pub fn accuracy(&self) -> f64 {
        self.correct as f64 / self.total as f64
    }

    pub fn incorrect(&self) -> usize {
        self.total - self.correct
    }
}

pub fn accuracy_counts(y_true: &[f64], y_pred: &[f64]) -> AppResult<AccuracyCounts> {
    validate_paired("accuracy", y_true, y_pred, 1)?;
    reject_nan(y_true, y_pred)?;
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    Ok(AccuracyCounts {
        correct,
        total: y_true.len(),
    })
}

/// Cells of a 2x2 confusion matrix with `1.0` as the positive label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinaryCounts {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl BinaryCounts {
    pub fn from_labels(y_true: &[f64], y_pred: &[f64]) -> AppResult<Self> {
        validate_paired("binary classification", y_true, y_pred, 1)?;
        reject_nan(y_true, y_pred)?;
        let mut counts = BinaryCounts::default();
        for (t, p) in y_true.iter().zip(y_pred) {
            match (as_binary(*t)?, as_binary(*p)?) {
                (true, true) => counts.tp += 1,
                (false, true) => counts.fp += 1,
                (false, false) => counts.tn += 1,
                (true, false) => counts.fn_ += 1,
            }
        }
        Ok(counts)
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    /// Positives in the ground truth.
    pub fn support(&self) -> usize {
        self.tp + self.fn_
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn specificity(&self) -> f64 {
        ratio(self.tn, self.tn + self.fp)
    }

    pub fn f1(&self) -> f64 {
        ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_)
    }

    pub fn jaccard(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp + self.fn_)
    }
}

fn as_binary(v: f64) -> AppResult<bool> {
    if v == 1.0 {
        Ok(true)
    } else if v == 0.0 {
        Ok(false)
    } else {
        Err(AppError::validation(format!(
            "binary labels must be 0 or 1, got {v}"
        )))
    }
}

// Zero denominators yield 0.0.
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    labels: Vec<f64>,
    /// Row-major, rows are true labels.
    counts: Vec<usize>,
}

impl ConfusionMatrix {
    pub fn from_labels(y_true: &[f64], y_pred: &[f64]) -> AppResult<Self> {
        validate_paired("confusion matrix", y_true, y_pred, 1)?;
        reject_nan(y_true, y_pred)?;
        let mut labels: Vec<f64> = y_true.iter().chain(y_pred).copied().collect();
        labels.sort_by(f64::total_cmp);
        labels.dedup();
        let n = labels.len();
        let mut counts = vec![0; n * n];
        for (t, p) in y_true.iter().zip(y_pred) {
            let row = index_of(&labels, *t)?;
            let col = index_of(&labels, *p)?;
            counts[row * n + col] += 1;
        }
        Ok(Self { labels, counts })
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn size(&self) -> usize {
        self.labels.len()
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        self.counts[actual * self.size() + predicted]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

fn index_of(labels: &[f64], value: f64) -> AppResult<usize> {
    labels
        .binary_search_by(|edge| edge.total_cmp(&value))
        .map_err(|_| AppError::internal(format!("label {value} missing from label set")))
}

// ── regression ─────────────────────────────────────────────────────────────

fn regression_inputs(name: &str, y_true: &[f64], y_pred: &[f64]) -> AppResult<()> {
    validate_paired(name, y_true, y_pred, 1)?;
    reject_nan(y_true, y_pred)
}

pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> AppResult<f64> {
    regression_inputs("mae", y_true, y_pred)?;
    let sum: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum();
    Ok(sum / y_true.len() as f64)
}

pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> AppResult<f64> {
    regression_inputs("mse", y_true, y_pred)?;
    let sum: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    Ok(sum / y_true.len() as f64)
}

/// Coefficient of determination. A constant target scores 1.0 on a perfect
/// fit and 0.0 otherwise.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> AppResult<f64> {
    regression_inputs("r2", y_true, y_pred)?;
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

pub fn max_error(y_true: &[f64], y_pred: &[f64]) -> AppResult<f64> {
    regression_inputs("max_error", y_true, y_pred)?;
    Ok(y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).abs())
        .fold(0.0, f64::max))
}

// ── correlation ────────────────────────────────────────────────────────────

/// Applies `policy` and reports whether the result must be NaN.
fn apply_policy(
    name: &str,
    x: &[f64],
    y: &[f64],
    policy: NanPolicy,
    min_len: usize,
) -> AppResult<Option<(Vec<f64>, Vec<f64>)>> {
    if x.len() != y.len() {
        return Err(AppError::validation(format!(
            "{name}: inputs differ in length ({} vs {})",
            x.len(),
            y.len()
        )));
    }
    if policy.check(&[x, y])? && policy == NanPolicy::Propagate {
        return Ok(None);
    }
    let (x, y) = policy.prepare(x, y);
    validate_paired(name, &x, &y, min_len)?;
    Ok(Some((x, y)))
}

/// Pearson correlation; NaN when either series is constant.
pub fn pearson(x: &[f64], y: &[f64], policy: NanPolicy) -> AppResult<f64> {
    let Some((x, y)) = apply_policy("pearson", x, y, policy, 2)? else {
        return Ok(f64::NAN);
    };
    Ok(pearson_unchecked(&x, &y))
}

fn pearson_unchecked(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

pub fn spearman(x: &[f64], y: &[f64], policy: NanPolicy) -> AppResult<f64> {
    let Some((x, y)) = apply_policy("spearman", x, y, policy, 2)? else {
        return Ok(f64::NAN);
    };
    Ok(pearson_unchecked(&average_ranks(&x), &average_ranks(&y)))
}

/// Kendall's tau-b, which corrects for ties.
pub fn kendall_tau(x: &[f64], y: &[f64], policy: NanPolicy) -> AppResult<f64> {
    let Some((x, y)) = apply_policy("kendall_tau", x, y, policy, 2)? else {
        return Ok(f64::NAN);
    };
    let n = x.len();
    let (mut concordant, mut discordant) = (0i64, 0i64);
    let (mut ties_x, mut ties_y) = (0u64, 0u64);
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];
            if dx == 0.0 {
                ties_x += 1;
            }
            if dy == 0.0 {
                ties_y += 1;
            }
            if dx != 0.0 && dy != 0.0 {
                if (dx > 0.0) == (dy > 0.0) {
                    concordant += 1;
                } else {
                    discordant += 1;
                }
            }
        }
    }
    let pairs = (n as u64) * (n as u64 - 1) / 2;
    let denom = tau_b_denominator(pairs, ties_x, ties_y);
    if denom == 0.0 {
        return Ok(f64::NAN);
    }
    Ok((concordant - discordant) as f64 / denom)
}

/// `sqrt((pairs - ties_x) * (pairs - ties_y))` in floating point; the integer
/// product overflows `i64` past roughly 78k observations.
fn tau_b_denominator(pairs: u64, ties_x: u64, ties_y: u64) -> f64 {
    let untied_x = pairs.saturating_sub(ties_x) as f64;
    let untied_y = pairs.saturating_sub(ties_y) as f64;
    (untied_x * untied_y).sqrt()
}

/// 1-based ranks; ties share the mean of their positions.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));
    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for idx in &order[start..end] {
            ranks[*idx] = rank;
        }
        start = end;
    }
    ranks
}

// ── divergence ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<f64>,
}

impl Histogram {
    /// Histograms of `a` and `b` over the same equal-width bins spanning both.
    /// NaN values are not counted.
    pub fn shared(a: &[f64], b: &[f64], bins: usize) -> AppResult<(Histogram, Histogram)> {
        if bins == 0 {
            return Err(AppError::validation("histogram: bins must be > 0"));
        }
        let finite = a.iter().chain(b).filter(|v| v.is_finite());
        let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
        if lo > hi {
            return Err(AppError::validation("histogram: no finite values"));
        }
        let (lo, hi) = if lo == hi { (lo - 0.5, hi + 0.5) } else { (lo, hi) };
        let width = (hi - lo) / bins as f64;
        let edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();
        let count = |values: &[f64]| {
            let mut counts = vec![0.0; bins];
            for v in values.iter().filter(|v| v.is_finite()) {
                let idx = (((v - lo) / width) as usize).min(bins - 1);
                counts[idx] += 1.0;
            }
            Histogram {
                edges: edges.clone(),
                counts,
            }
        };
        Ok((count(a), count(b)))
    }

    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
    }

    pub fn probabilities(&self) -> Vec<f64> {
        let total: f64 = self.counts.iter().sum();
        if total == 0.0 {
            return vec![0.0; self.counts.len()];
        }
        self.counts.iter().map(|c| c / total).collect()
    }
}

/// KL(p || q) in nats. Infinite where q is zero and p is not.
pub fn kl_divergence(p: &[f64], q: &[f64]) -> f64 {
    p.iter()
        .zip(q)
        .filter(|(pi, _)| **pi > 0.0)
        .map(|(pi, qi)| {
            if *qi == 0.0 {
                f64::INFINITY
            } else {
                pi * (pi / qi).ln()
            }
        })
        .sum()
}

pub fn js_distance(p: &[f64], q: &[f64]) -> f64 {
    let m: Vec<f64> = p.iter().zip(q).map(|(a, b)| (a + b) / 2.0).collect();
    let js = 0.5 * kl_divergence(p, &m) + 0.5 * kl_divergence(q, &m);
    js.max(0.0).sqrt()
}

/// First Wasserstein distance between two empirical distributions.
pub fn wasserstein(u: &[f64], v: &[f64], policy: NanPolicy) -> AppResult<f64> {
    if policy.check(&[u, v])? && policy == NanPolicy::Propagate {
        return Ok(f64::NAN);
    }
    let mut u: Vec<f64> = u.iter().copied().filter(|x| !x.is_nan()).collect();
    let mut v: Vec<f64> = v.iter().copied().filter(|x| !x.is_nan()).collect();
    if u.is_empty() || v.is_empty() {
        return Err(AppError::validation("wasserstein: empty distribution"));
    }
    u.sort_by(f64::total_cmp);
    v.sort_by(f64::total_cmp);
    let mut all: Vec<f64> = u.iter().chain(&v).copied().collect();
    all.sort_by(f64::total_cmp);
    let cdf = |sorted: &[f64], t: f64| sorted.partition_point(|x| *x <= t) as f64 / sorted.len() as f64;
    Ok(all
        .windows(2)
        .map(|w| (cdf(&u, w[0]) - cdf(&v, w[0])).abs() * (w[1] - w[0]))
        .sum())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Divergence {
    pub kl: f64,
    pub js: f64,
    pub wasserstein: f64,
}

/// Divergences of the prediction distribution from the ground truth
/// distribution, histogrammed over `bins` shared bins.
pub fn divergence(y_true: &[f64], y_pred: &[f64], bins: usize, policy: NanPolicy) -> AppResult<Divergence> {
    let Some((t, p)) = apply_policy("divergence", y_true, y_pred, policy, 1)? else {
        return Ok(Divergence {
            kl: f64::NAN,
            js: f64::NAN,
            wasserstein: f64::NAN,
        });
    };
    let (ht, hp) = Histogram::shared(&t, &p, bins)?;
    let (pt, pp) = (ht.probabilities(), hp.probabilities());
    Ok(Divergence {
        kl: kl_divergence(&pt, &pp),
        js: js_distance(&pt, &pp),
        wasserstein: wasserstein(&t, &p, policy)?,
    })
}

//! Goodness-of-fit statistics and robust scale helpers.

use nalgebra::DMatrix;

/// `Σ((y - f)/σy)²`, or NaN unless every `σy` is strictly positive.
pub fn chi_squared(y: &[f64], y_fit: &[f64], sigma_y: &[f64]) -> f64 {
    if sigma_y.is_empty() || sigma_y.iter().any(|s| !(*s > 0.0)) {
        return f64::NAN;
    }
    y.iter()
        .zip(y_fit)
        .zip(sigma_y)
        .map(|((yi, fi), si)| {
            let r = (yi - fi) / si;
            r * r
        })
        .sum()
}

/// `χ² / (n - p)` when there are spare degrees of freedom and `χ²` is finite.
pub fn reduced_chi_squared(chi2: f64, n: usize, p: usize) -> Option<f64> {
    (n > p && chi2.is_finite()).then(|| chi2 / (n - p) as f64)
}

/// Coefficient of determination `1 - ss_res/ss_tot`.
///
/// For constant `y` (`ss_tot` at rounding level): `1.0` if the model reproduces
/// it exactly, otherwise NaN.
pub fn r_squared(y: &[f64], y_fit: &[f64]) -> f64 {
    if y.is_empty() {
        return f64::NAN;
    }
    let mean = y.iter().sum::<f64>() / y.len() as f64;
    let ss_tot: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
    let ss_res: f64 = y.iter().zip(y_fit).map(|(v, f)| (v - f).powi(2)).sum();

    // A mean off by one ulp leaves ss_tot near 1e-33 rather than 0 for
    // constants such as 0.1.
    let tol = 1e-24 * y.iter().map(|v| v * v).sum::<f64>().max(f64::MIN_POSITIVE);
    if ss_tot <= tol {
        return if ss_res <= tol { 1.0 } else { f64::NAN };
    }
    1.0 - ss_res / ss_tot
}

pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Robust residual scale `median(|r|) / 0.6745`, floored at `1e-12`.
pub fn mad_scale(residuals: &[f64]) -> f64 {
    let mut abs: Vec<f64> = residuals.iter().map(|r| r.abs()).filter(|v| v.is_finite()).collect();
    let mad = median_mut(&mut abs).unwrap_or(0.0);
    (mad / 0.6745).max(1e-12)
}

/// Huber weights: `w0` inside `k·scale`, shrunk by `cutoff/|r|` outside.
pub fn huber_reweight(w_base: &[f64], residuals: &[f64], k: f64) -> Vec<f64> {
    let cutoff = k.max(1e-6) * mad_scale(residuals);
    let min_factor = 1e-3;
    w_base
        .iter()
        .zip(residuals)
        .map(|(&w0, &r)| {
            let ar = r.abs();
            let factor = if ar <= cutoff || !ar.is_finite() { 1.0 } else { cutoff / ar };
            (w0 * factor).max(w0 * min_factor)
        })
        .collect()
}

/// Sample mean, standard deviation and covariance (n-1 denominator) of
/// parameter draws. Each draw has the same length `p`.
pub fn sample_moments(draws: &[Vec<f64>], p: usize) -> (Vec<f64>, Vec<f64>, DMatrix<f64>) {
    let m = draws.len();
    let mut mean = vec![0.0; p];
    for d in draws {
        for (acc, v) in mean.iter_mut().zip(d) {
            *acc += v;
        }
    }
    if m > 0 {
        for v in &mut mean {
            *v /= m as f64;
        }
    }

    let mut cov = DMatrix::<f64>::zeros(p, p);
    if m > 1 {
        for d in draws {
            for a in 0..p {
                for b in a..p {
                    cov[(a, b)] += (d[a] - mean[a]) * (d[b] - mean[b]);
                }
            }
        }
        for a in 0..p {
            for b in a..p {
                cov[(a, b)] /= (m - 1) as f64;
                cov[(b, a)] = cov[(a, b)];
            }
        }
    } else {
        cov.fill(f64::NAN);
    }
    let std = (0..p).map(|j| cov[(j, j)].sqrt()).collect();
    (mean, std, cov)
}

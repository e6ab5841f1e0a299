//! Small statistics toolkit shared by the comparator and the sentiment
//! validator. P-values use the normal approximation of the t distribution,
//! which is what the backtest sample sizes here can support anyway.

/// Arithmetic mean. Returns `None` for an empty slice.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Sample standard deviation (ddof = 1). Returns `None` below two points.
pub fn sample_stdev(data: &[f64]) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    let m = mean(data)?;
    let var = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    Some(var.sqrt())
}

/// Pearson correlation coefficient. `None` below two pairs or when either
/// side has zero variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        var_x += (x - mx).powi(2);
        var_y += (y - my).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x * var_y).sqrt())
}

/// Standard normal CDF via the Abramowitz & Stegun erf approximation
/// (max absolute error ~1.5e-7, far below anything that matters here).
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

/// One-sample test of `data` against a zero population mean.
/// Returns `(t_statistic, two_tailed_p)`, or `None` when the sample is too
/// small or has zero variance to test at all.
pub fn one_sample_t(data: &[f64]) -> Option<(f64, f64)> {
    let n = data.len();
    if n < 2 {
        return None;
    }
    let m = mean(data)?;
    let sd = sample_stdev(data)?;
    if sd == 0.0 {
        return None;
    }
    let se = sd / (n as f64).sqrt();
    let t = m / se;
    let p = 2.0 * (1.0 - normal_cdf(t.abs()));
    Some((t, p.clamp(0.0, 1.0)))
}

/// Two-tailed p-value for a Pearson coefficient `r` over `n` pairs, using
/// t = r * sqrt((n-2) / (1-r^2)).
pub fn correlation_p_value(r: f64, n: usize) -> Option<f64> {
    if n < 3 || r.abs() >= 1.0 {
        return None;
    }
    let t = r * ((n - 2) as f64 / (1.0 - r * r)).sqrt();
    let p = 2.0 * (1.0 - normal_cdf(t.abs()));
    Some(p.clamp(0.0, 1.0))
}

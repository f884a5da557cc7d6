use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use log::debug;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::error::PipelineError;
use super::model::{Column, TrackTable};

// ---------------------------------------------------------------------------
// Filter selection
// ---------------------------------------------------------------------------

/// Noise-reduction strategy applied to one numeric channel.
///
/// Track-geometry defects have different wavelength signatures, hence three
/// strategies: a rolling mean as the cheap baseline, a zero-phase Butterworth
/// low-pass for frequency-domain noise rejection, and Savitzky-Golay
/// smoothing which preserves local peak/valley shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Rolling,
    Butterworth,
    SavGol,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::Rolling => write!(f, "rolling"),
            FilterKind::Butterworth => write!(f, "butterworth"),
            FilterKind::SavGol => write!(f, "savgol"),
        }
    }
}

impl FromStr for FilterKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rolling" => Ok(FilterKind::Rolling),
            "butterworth" => Ok(FilterKind::Butterworth),
            "savgol" => Ok(FilterKind::SavGol),
            other => Err(PipelineError::InvalidParameter(format!(
                "unknown filter kind '{other}' (expected rolling, butterworth or savgol)"
            ))),
        }
    }
}

/// Parameters for one filter application. `order` is ignored by the rolling
/// mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub kind: FilterKind,
    /// Window length in samples; the Butterworth cutoff is `1/window` of the
    /// Nyquist frequency.
    pub window: usize,
    /// Polynomial / filter order (Butterworth, Savitzky-Golay).
    pub order: usize,
}

impl FilterSpec {
    pub fn new(kind: FilterKind, window: usize, order: usize) -> Self {
        Self { kind, window, order }
    }

    /// Validate parameters, returning the effective `(window, order)`.
    ///
    /// Savitzky-Golay self-corrects: an even window is bumped to the next odd
    /// value and `order >= window` clamps to `window - 1`. All other
    /// inconsistencies are rejected with [`PipelineError::InvalidParameter`].
    pub fn effective_params(&self) -> Result<(usize, usize), PipelineError> {
        if self.window < 3 {
            return Err(PipelineError::InvalidParameter(format!(
                "window {} is too small (minimum 3)",
                self.window
            )));
        }
        match self.kind {
            FilterKind::Rolling => Ok((self.window, 0)),
            FilterKind::Butterworth => {
                if self.order < 1 {
                    return Err(PipelineError::InvalidParameter(
                        "butterworth order must be at least 1".to_string(),
                    ));
                }
                if self.window < self.order + 2 {
                    return Err(PipelineError::InvalidParameter(format!(
                        "butterworth needs window >= order + 2 (window {}, order {})",
                        self.window, self.order
                    )));
                }
                Ok((self.window, self.order))
            }
            FilterKind::SavGol => {
                let mut window = self.window;
                let mut order = self.order;
                if window % 2 == 0 {
                    window += 1;
                    debug!("savgol window bumped to odd value {window}");
                }
                if order >= window {
                    order = window - 1;
                    debug!("savgol order clamped to {order}");
                }
                Ok((window, order))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Filter application
// ---------------------------------------------------------------------------

/// Apply `spec` to the named numeric column, appending a `{column}_filtered`
/// sibling. The source column is left untouched; row count and chainage are
/// never altered.
///
/// Missing entries enter the arithmetic as `NaN` (filter the table after
/// imputation to avoid this); non-finite results come back out as missing.
pub fn apply_filter(
    mut table: TrackTable,
    column: &str,
    spec: &FilterSpec,
) -> Result<TrackTable, PipelineError> {
    let (window, order) = spec.effective_params()?;
    let series: Vec<f64> = table
        .numeric(column)
        .ok_or_else(|| PipelineError::UnknownColumn(column.to_string()))?
        .iter()
        .map(|c| c.unwrap_or(f64::NAN))
        .collect();

    let filtered = match spec.kind {
        FilterKind::Rolling => rolling_mean(&series, window),
        FilterKind::Butterworth => butterworth_zero_phase(&series, order, window)?,
        FilterKind::SavGol => savgol(&series, window, order)?,
    };

    debug!("applied {} filter to '{column}' (window {window}, order {order})", spec.kind);
    table.insert_column(
        format!("{column}_filtered"),
        Column::Numeric(filtered.into_iter().map(|v| v.is_finite().then_some(v)).collect()),
    )?;
    Ok(table)
}

// ---------------------------------------------------------------------------
// Rolling mean
// ---------------------------------------------------------------------------

/// Centered moving average. Positions without a full window keep the original
/// sample (no partial-window average).
fn rolling_mean(x: &[f64], window: usize) -> Vec<f64> {
    let left = (window - 1) / 2;
    let right = window / 2;
    x.iter()
        .enumerate()
        .map(|(i, &xi)| {
            if i >= left && i + right < x.len() {
                let sum: f64 = x[i - left..=i + right].iter().sum();
                sum / window as f64
            } else {
                xi
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Butterworth low-pass, zero phase
// ---------------------------------------------------------------------------

/// Digital Butterworth low-pass with normalized cutoff `1/window` (fraction
/// of Nyquist), applied forward-backward so the output has no phase lag.
fn butterworth_zero_phase(
    x: &[f64],
    order: usize,
    window: usize,
) -> Result<Vec<f64>, PipelineError> {
    let (b, a) = butter_lowpass(order, 1.0 / window as f64);
    filtfilt(&b, &a, x)
}

/// Design an order-`n` low-pass Butterworth filter with cutoff `wn` as a
/// fraction of the Nyquist frequency. Analog prototype poles, low-pass
/// frequency scaling, then the bilinear transform; returns `(b, a)` with
/// `a[0] == 1`.
fn butter_lowpass(n: usize, wn: f64) -> (Vec<f64>, Vec<f64>) {
    // Prototype poles, evenly spaced on the left half of the unit circle.
    let prototype: Vec<Complex64> = (0..n)
        .map(|k| {
            let theta = PI * (2 * k + n + 1) as f64 / (2 * n) as f64;
            Complex64::new(theta.cos(), theta.sin())
        })
        .collect();

    // Pre-warp the cutoff and scale (sampling rate fixed at 2 so the Nyquist
    // frequency is 1).
    let fs = 2.0;
    let warped = 2.0 * fs * (PI * wn / fs).tan();
    let poles: Vec<Complex64> = prototype.iter().map(|&p| p * warped).collect();
    let gain = warped.powi(n as i32);

    // Bilinear transform: s = 2*fs*(z-1)/(z+1).
    let fs2 = 2.0 * fs;
    let z_poles: Vec<Complex64> = poles
        .iter()
        .map(|&p| (Complex64::new(fs2, 0.0) + p) / (Complex64::new(fs2, 0.0) - p))
        .collect();
    let mut k_digital = Complex64::new(gain, 0.0);
    for &p in &poles {
        k_digital /= Complex64::new(fs2, 0.0) - p;
    }
    let k_digital = k_digital.re;

    // Numerator: all n zeros at z = -1, so k * (z + 1)^n → binomial row.
    let mut b = vec![0.0; n + 1];
    let mut binom = 1.0;
    for (j, slot) in b.iter_mut().enumerate() {
        *slot = k_digital * binom;
        binom = binom * (n - j) as f64 / (j + 1) as f64;
    }

    let a: Vec<f64> = poly_from_roots(&z_poles).iter().map(|c| c.re).collect();
    (b, a)
}

/// Expand `prod (z - r_i)` into descending-power coefficients (leading 1).
fn poly_from_roots(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for &r in roots {
        coeffs.push(Complex64::new(0.0, 0.0));
        for j in (1..coeffs.len()).rev() {
            let prev = coeffs[j - 1];
            coeffs[j] -= r * prev;
        }
    }
    coeffs
}

/// Forward-backward IIR filtering with odd-extension padding, initial
/// conditions matched to the first sample of each pass. Output has the same
/// length as the input and zero phase shift.
fn filtfilt(b: &[f64], a: &[f64], x: &[f64]) -> Result<Vec<f64>, PipelineError> {
    let pad = 3 * b.len().max(a.len());
    if x.len() <= pad {
        return Err(PipelineError::InvalidParameter(format!(
            "series of {} samples is too short for zero-phase filtering (needs more than {pad})",
            x.len()
        )));
    }

    // Odd extension at both ends damps startup transients.
    let first = x[0];
    let last = x[x.len() - 1];
    let mut ext = Vec::with_capacity(x.len() + 2 * pad);
    for i in (1..=pad).rev() {
        ext.push(2.0 * first - x[i]);
    }
    ext.extend_from_slice(x);
    for i in (x.len() - pad - 1..x.len() - 1).rev() {
        ext.push(2.0 * last - x[i]);
    }

    let zi = lfilter_zi(b, a);

    let forward = lfilter(b, a, &ext, &zi);
    let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
    let backward = lfilter(b, a, &reversed, &zi);
    reversed = backward.into_iter().rev().collect();

    Ok(reversed[pad..pad + x.len()].to_vec())
}

/// Direct-form II transposed IIR filter; `zi` (steady-state unit-step
/// initial conditions) is scaled by the first sample.
fn lfilter(b: &[f64], a: &[f64], x: &[f64], zi: &[f64]) -> Vec<f64> {
    let scale = x.first().copied().unwrap_or(0.0);
    let mut z: Vec<f64> = zi.iter().map(|v| v * scale).collect();
    let n = z.len();

    let mut y = Vec::with_capacity(x.len());
    for &xi in x {
        let yi = b[0] * xi + z.first().copied().unwrap_or(0.0);
        for j in 0..n.saturating_sub(1) {
            z[j] = b[j + 1] * xi + z[j + 1] - a[j + 1] * yi;
        }
        if n > 0 {
            z[n - 1] = b[n] * xi - a[n] * yi;
        }
        y.push(yi);
    }
    y
}

/// Initial filter state that makes the step response start in steady state:
/// solves `(I - Aᵀ) zi = B` for the companion-form state matrix.
fn lfilter_zi(b: &[f64], a: &[f64]) -> Vec<f64> {
    let n = a.len().max(b.len());
    if n < 2 {
        return Vec::new();
    }

    // (I - Aᵀ) where A is the companion matrix of `a`.
    let mut m = vec![vec![0.0; n - 1]; n - 1];
    for i in 0..n - 1 {
        m[i][i] += 1.0;
        m[i][0] += a[i + 1];
        if i + 1 < n - 1 {
            m[i][i + 1] -= 1.0;
        }
    }
    let rhs: Vec<f64> = (0..n - 1).map(|i| b[i + 1] - a[i + 1] * b[0]).collect();

    solve_linear(m, rhs).unwrap_or_else(|| vec![0.0; n - 1])
}

// ---------------------------------------------------------------------------
// Savitzky-Golay
// ---------------------------------------------------------------------------

/// Savitzky-Golay smoothing: least-squares polynomial convolution for the
/// interior, with edge values replaced by a polynomial fit over the first and
/// last full window evaluated in place.
fn savgol(x: &[f64], window: usize, order: usize) -> Result<Vec<f64>, PipelineError> {
    if x.len() < window {
        return Err(PipelineError::InvalidParameter(format!(
            "series of {} samples is shorter than the savgol window {window}",
            x.len()
        )));
    }

    let half = window / 2;
    let weights = savgol_weights(window, order).ok_or_else(|| {
        PipelineError::InvalidParameter(format!(
            "savgol design is singular for window {window}, order {order}"
        ))
    })?;

    let mut out = vec![0.0; x.len()];
    for i in half..x.len() - half {
        let mut acc = 0.0;
        for (j, w) in weights.iter().enumerate() {
            acc += w * x[i - half + j];
        }
        out[i] = acc;
    }

    // Edges: fit a polynomial to the first/last window and evaluate it at the
    // uncovered positions.
    let left_fit = polyfit(&x[..window], order).ok_or_else(|| {
        PipelineError::InvalidParameter(format!(
            "savgol edge fit is singular for window {window}, order {order}"
        ))
    })?;
    for (i, slot) in out.iter_mut().take(half).enumerate() {
        *slot = polyval(&left_fit, i as f64);
    }
    let right_start = x.len() - window;
    let right_fit = polyfit(&x[right_start..], order).ok_or_else(|| {
        PipelineError::InvalidParameter(format!(
            "savgol edge fit is singular for window {window}, order {order}"
        ))
    })?;
    for i in x.len() - half..x.len() {
        out[i] = polyval(&right_fit, (i - right_start) as f64);
    }

    Ok(out)
}

/// Convolution weights for the central point of an odd window: row zero of
/// `(AᵀA)⁻¹Aᵀ` for the centered Vandermonde design matrix.
fn savgol_weights(window: usize, order: usize) -> Option<Vec<f64>> {
    let half = (window / 2) as i64;
    let terms = order + 1;

    // Gram matrix G[j][k] = Σ_t t^(j+k) over t = -half..=half.
    let mut gram = vec![vec![0.0; terms]; terms];
    for j in 0..terms {
        for k in 0..terms {
            gram[j][k] = (-half..=half)
                .map(|t| (t as f64).powi((j + k) as i32))
                .sum();
        }
    }
    let mut rhs = vec![0.0; terms];
    rhs[0] = 1.0;
    let d = solve_linear(gram, rhs)?;

    // Weight for sample offset t is the polynomial with coefficients d at t.
    Some(
        (-half..=half)
            .map(|t| {
                d.iter()
                    .enumerate()
                    .map(|(j, dj)| dj * (t as f64).powi(j as i32))
                    .sum()
            })
            .collect(),
    )
}

/// Least-squares polynomial fit over `y` at positions `0..y.len()`;
/// coefficients in ascending power order.
fn polyfit(y: &[f64], order: usize) -> Option<Vec<f64>> {
    let terms = order + 1;
    let mut gram = vec![vec![0.0; terms]; terms];
    let mut rhs = vec![0.0; terms];
    for (i, &yi) in y.iter().enumerate() {
        let xi = i as f64;
        for j in 0..terms {
            rhs[j] += yi * xi.powi(j as i32);
            for k in 0..terms {
                gram[j][k] += xi.powi((j + k) as i32);
            }
        }
    }
    solve_linear(gram, rhs)
}

/// Evaluate ascending-power coefficients at `x` (Horner).
fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Gaussian elimination with partial pivoting; `None` on a singular system.
fn solve_linear(mut m: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Option<Vec<f64>> {
    let n = rhs.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        rhs.swap(col, pivot);
        for row in col + 1..n {
            let factor = m[row][col] / m[col][col];
            for k in col..n {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut acc = rhs[row];
        for k in row + 1..n {
            acc -= m[row][k] * x[k];
        }
        x[row] = acc / m[row][row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table_with_series(name: &str, values: &[f64]) -> TrackTable {
        let mut table = TrackTable::new();
        let chainage: Vec<Option<f64>> = (0..values.len()).map(|i| Some(i as f64)).collect();
        table
            .insert_column("chainage", Column::Numeric(chainage))
            .unwrap();
        table
            .insert_column(name, Column::Numeric(values.iter().map(|&v| Some(v)).collect()))
            .unwrap();
        table
    }

    #[test]
    fn rolling_constant_series_is_unchanged() {
        let x = vec![4.2; 20];
        assert_eq!(rolling_mean(&x, 5), x);
    }

    #[test]
    fn rolling_edges_fall_back_to_original() {
        let x = vec![1.0, 1.0, 4.0, 1.0, 1.0];
        assert_eq!(rolling_mean(&x, 3), vec![1.0, 2.0, 2.0, 2.0, 1.0]);
    }

    #[test]
    fn savgol_even_window_is_bumped() {
        let spec = FilterSpec::new(FilterKind::SavGol, 6, 2);
        assert_eq!(spec.effective_params().unwrap(), (7, 2));
    }

    #[test]
    fn savgol_order_is_clamped_below_window() {
        let spec = FilterSpec::new(FilterKind::SavGol, 5, 7);
        assert_eq!(spec.effective_params().unwrap(), (5, 4));
    }

    #[test]
    fn savgol_reproduces_a_quadratic_exactly() {
        let x: Vec<f64> = (0..25).map(|i| {
            let t = i as f64;
            0.5 * t * t - 3.0 * t + 2.0
        }).collect();
        let smoothed = savgol(&x, 7, 2).unwrap();
        for (raw, fit) in x.iter().zip(&smoothed) {
            assert!((raw - fit).abs() < 1e-8, "{raw} vs {fit}");
        }
    }

    #[test]
    fn butterworth_constant_series_is_unchanged() {
        let x = vec![7.5; 60];
        let y = butterworth_zero_phase(&x, 3, 5).unwrap();
        assert_eq!(y.len(), x.len());
        for v in y {
            assert!((v - 7.5).abs() < 1e-8, "{v}");
        }
    }

    #[test]
    fn butterworth_dc_gain_is_unity() {
        let (b, a) = butter_lowpass(4, 0.2);
        let num: f64 = b.iter().sum();
        let den: f64 = a.iter().sum();
        assert!((num / den - 1.0).abs() < 1e-10);
    }

    #[test]
    fn butterworth_rejects_short_series() {
        let x = vec![1.0; 8];
        let err = butterworth_zero_phase(&x, 3, 5).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter(_)));
    }

    #[test]
    fn small_window_is_rejected() {
        let spec = FilterSpec::new(FilterKind::Rolling, 2, 0);
        assert!(matches!(
            spec.effective_params(),
            Err(PipelineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn butterworth_needs_window_above_order() {
        let spec = FilterSpec::new(FilterKind::Butterworth, 4, 3);
        assert!(matches!(
            spec.effective_params(),
            Err(PipelineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn apply_filter_adds_sibling_and_preserves_source() {
        let values = vec![1.0, 1.0, 4.0, 1.0, 1.0];
        let table = table_with_series("gauge", &values);
        let spec = FilterSpec::new(FilterKind::Rolling, 3, 0);
        let out = apply_filter(table, "gauge", &spec).unwrap();

        assert_eq!(out.len(), values.len());
        assert_eq!(
            out.numeric("gauge").unwrap(),
            values.iter().map(|&v| Some(v)).collect::<Vec<_>>().as_slice()
        );
        assert_eq!(
            out.numeric("gauge_filtered").unwrap(),
            &[Some(1.0), Some(2.0), Some(2.0), Some(2.0), Some(1.0)]
        );
    }

    #[test]
    fn apply_filter_unknown_column_errors() {
        let table = table_with_series("gauge", &[1.0, 2.0, 3.0]);
        let spec = FilterSpec::new(FilterKind::Rolling, 3, 0);
        let err = apply_filter(table, "twist", &spec).unwrap_err();
        assert_eq!(err, PipelineError::UnknownColumn("twist".to_string()));
    }

    proptest! {
        #[test]
        fn rolling_mean_stays_within_input_bounds(
            values in proptest::collection::vec(-1e3..1e3f64, 3..64),
            window in 3usize..9,
        ) {
            let out = rolling_mean(&values, window);
            prop_assert_eq!(out.len(), values.len());
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            for v in out {
                prop_assert!(v >= min - 1e-9 && v <= max + 1e-9);
            }
        }

        #[test]
        fn savgol_effective_window_is_always_odd(
            window in 3usize..32,
            order in 0usize..40,
        ) {
            let spec = FilterSpec::new(FilterKind::SavGol, window, order);
            let (w, o) = spec.effective_params().unwrap();
            prop_assert!(w % 2 == 1);
            prop_assert!(o < w);
        }
    }
}

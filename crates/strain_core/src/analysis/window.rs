//! Tapering windows.

use std::f64::consts::PI;

/// Symmetric Tukey (tapered cosine) window of `n` points.
///
/// `alpha` is the fraction of the window inside the cosine tapers:
/// `0` gives a rectangular window and `1` a Hann window.
pub fn tukey(n: usize, alpha: f64) -> Vec<f64> {
    match n {
        0 => return Vec::new(),
        1 => return vec![1.0],
        _ => {}
    }
    if alpha <= 0.0 {
        return vec![1.0; n];
    }
    let alpha = alpha.min(1.0);

    let span = (n - 1) as f64;
    let width = (alpha * span / 2.0).floor() as usize;

    (0..n)
        .map(|i| {
            let x = i as f64;
            if i <= width {
                0.5 * (1.0 + (PI * (-1.0 + 2.0 * x / alpha / span)).cos())
            } else if i >= n - width - 1 {
                0.5 * (1.0 + (PI * (-2.0 / alpha + 1.0 + 2.0 * x / alpha / span)).cos())
            } else {
                1.0
            }
        })
        .collect()
}

/// Multiply samples by a window of the same length.
pub(crate) fn apply_window(samples: &[f64], window: &[f64]) -> Vec<f64> {
    samples.iter().zip(window).map(|(x, w)| x * w).collect()
}

use crate::SearchError;

/// Digit base of the reference VI-CBF counter encoding. Counters are
/// incremented by values taken in `[l, 2l-1]`.
pub const DEFAULT_DIGIT_BASE: f64 = 4.0;

#[inline(always)]
/// real valued `x choose 2`, defined for non integer `x`
fn binom2(x: f64) -> f64 {
    x * (x - 1.0) / 2.0
}

#[inline]
/// Analytic false positive probability of a VI-CBF holding `n` entries in `m`
/// slots with `k` hash functions and digit base `l`.
///
/// The formula is evaluated literally: degenerate inputs (`m <= 0`,
/// `n * k < 2` with `m == 1` ...) yield whatever IEEE arithmetic gives,
/// including NaN or infinities. Use [try_estimate_fpr] to get those
/// reported as errors.
///
/// # Example
///
/// ```
/// use vicbf_params::{estimate_fpr, DEFAULT_DIGIT_BASE};
///
/// let p = estimate_fpr(1000.0, 6082.0, DEFAULT_DIGIT_BASE, 7.0);
/// assert!((p - 0.0011).abs() < 0.0001);
/// ```
pub fn estimate_fpr(n: f64, m: f64, l: f64, k: f64) -> f64 {
    let p = 1.0 / m;
    // operations are kept in this order so that results are bit exact with
    // the reference figures
    let zero = (1.0 - p).powf(n * k);
    let one = ((l - 1.0) / l) * n * k * p * (1.0 - p).powf(n * k - 1.0);
    let two = (((l - 1.0) * (l + 1.0)) / (6.0 * l.powf(2.0)))
        * binom2(n * k)
        * p.powf(2.0)
        * (1.0 - p).powf(n * k - 2.0);
    (1.0 - zero - one - two).powf(k)
}

#[inline]
/// Same as [estimate_fpr] but fails when the number of slots is not positive
/// or when the estimate is not a finite number.
pub fn try_estimate_fpr(n: f64, m: f64, l: f64, k: f64) -> Result<f64, SearchError> {
    if m <= 0.0 || m.is_nan() {
        return Err(SearchError::DivisionByZero { slots: m as i64 });
    }

    let fpr = estimate_fpr(n, m, l, k);
    if !fpr.is_finite() {
        return Err(SearchError::NumericDegenerate {
            hash_functions: k as u64,
            slots: m as i64,
            fpr,
        });
    }

    Ok(fpr)
}

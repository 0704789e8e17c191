/// Log-space addition: log(exp(a) + exp(b)), computed with the max-trick.
///
/// `f32::NEG_INFINITY` is the absorbing zero of log-space, so adding it to
/// anything returns the other operand unchanged (and never produces NaN).
#[inline]
pub fn log_add(a: f32, b: f32) -> f32 {
    if a == f32::NEG_INFINITY {
        return b;
    }
    if b == f32::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// Numerically stable log(sum(exp(xs))) over a slice, factoring out the max.
pub fn logsumexp(xs: &[f32]) -> f32 {
    let max = xs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        return f32::NEG_INFINITY;
    }
    let sum: f32 = xs.iter().map(|&x| (x - max).exp()).sum();
    max + sum.ln()
}

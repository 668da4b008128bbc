/// Root of `func` inside `[low, high]`.
///
/// `func` returns the value and the derivative at its argument. Newton steps are taken while
/// they stay inside the current bracket and shrink it fast enough, bisection otherwise, so the
/// iteration cannot leave the bracket (Numerical Recipes 2nd edition, `rtsafe`, p. 366).
///
/// Returns `None` if the interval does not bracket a sign change.
pub(crate) fn root<F>(func: F, low: f64, high: f64) -> Option<f64>
where
    F: Fn(f64) -> (f64, f64),
{
    const MAX_ITERATIONS: usize = 200;

    let (f_low, _) = func(low);
    let (f_high, _) = func(high);
    if f_low == 0.0 {
        return Some(low);
    }
    if f_high == 0.0 {
        return Some(high);
    }
    if !(f_low * f_high).is_finite() || f_low.signum() == f_high.signum() {
        return None;
    }

    // Orient the bracket so that func(negative) < 0 < func(positive).
    let (mut negative, mut positive) = if f_low < 0.0 { (low, high) } else { (high, low) };
    let mut x = 0.5 * (low + high);
    let mut previous_step = (high - low).abs();
    let mut step = previous_step;
    let (mut value, mut derivative) = func(x);

    for _ in 0..MAX_ITERATIONS {
        let newton_leaves_bracket =
            ((x - positive) * derivative - value) * ((x - negative) * derivative - value) > 0.0;
        let newton_too_slow = 2.0 * value.abs() > (previous_step * derivative).abs();
        previous_step = step;
        let next = if newton_leaves_bracket || newton_too_slow {
            step = 0.5 * (positive - negative);
            negative + step
        } else {
            step = value / derivative;
            x - step
        };
        if next == x || next == negative || next == positive {
            return Some(next);
        }
        x = next;

        (value, derivative) = func(x);
        if value < 0.0 {
            negative = x;
        } else {
            positive = x;
        }
    }
    Some(x)
}

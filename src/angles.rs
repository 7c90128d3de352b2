//! Angle helpers shared by every heading estimator.
//!
//! All public headings are degrees in [0, 360), clockwise from north.

/// Wrap any angle into [0, 360).
pub fn normalize_deg(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wrap any angle into (-180, 180].
pub fn wrap_180(angle: f64) -> f64 {
    let wrapped = normalize_deg(angle);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `from` to `to` in degrees.
pub fn shortest_delta(from: f64, to: f64) -> f64 {
    wrap_180(to - from)
}

/// Unsigned angular separation in [0, 180].
pub fn separation(a: f64, b: f64) -> f64 {
    shortest_delta(a, b).abs()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CircularMean {
    /// Mean direction in [0, 360)
    pub mean: f64,
    /// Length of the weighted mean unit vector, 0 (no direction) to 1 (all aligned)
    pub resultant_length: f64,
    pub total_weight: f64,
}

/// Weighted circular mean over `(angle_deg, weight)` pairs.
///
/// Accumulates `Σw·cos`, `Σw·sin` and takes `atan2`. Non-finite angles and
/// non-positive weights are skipped. Returns `None` when nothing carries weight.
pub fn weighted_circular_mean<I>(samples: I) -> Option<CircularMean>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut sum_cos = 0.0;
    let mut sum_sin = 0.0;
    let mut total_weight = 0.0;

    for (angle, weight) in samples {
        if !angle.is_finite() || !weight.is_finite() || weight <= 0.0 {
            continue;
        }
        let rad = angle.to_radians();
        sum_cos += weight * rad.cos();
        sum_sin += weight * rad.sin();
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        return None;
    }

    let resultant_length = (sum_cos.hypot(sum_sin) / total_weight).clamp(0.0, 1.0);
    let mean = normalize_deg(sum_sin.atan2(sum_cos).to_degrees());

    Some(CircularMean {
        mean,
        resultant_length,
        total_weight,
    })
}

/// Circular standard deviation in degrees, `sqrt(-2 ln R)`.
pub fn circular_std_dev<I>(angles: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let stats = weighted_circular_mean(angles.into_iter().map(|a| (a, 1.0)))?;
    let r = stats.resultant_length.max(1e-12);
    Some((-2.0 * r.ln()).max(0.0).sqrt().to_degrees())
}

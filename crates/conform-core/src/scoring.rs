//! Score arithmetic.
//!
//! Every function here is total and returns a value in `[0, 1]`. The
//! validator decides *what* to count; this module decides *how much* it is
//! worth.

/// Fraction of required fields that are present and correctly typed.
///
/// A section that declares no required fields is complete by definition.
pub fn completeness_ratio(satisfied: usize, declared: usize) -> f64 {
    if declared == 0 {
        return 1.0;
    }
    clamp_unit(satisfied as f64 / declared as f64)
}

/// Penalty factor for an observed count against an inclusive range.
///
/// Inside `[min, max]` the factor is 1.0. Outside it decays linearly with the
/// distance to the nearest bound, relative to the range width
/// `max - min + 1`, and bottoms out at 0.0.
pub fn cardinality_factor(observed: usize, min: usize, max: usize) -> f64 {
    let distance = if observed < min {
        min - observed
    } else if observed > max {
        observed - max
    } else {
        return 1.0;
    };

    let width = max.saturating_sub(min) + 1;
    (1.0 - distance as f64 / width as f64).max(0.0)
}

/// Penalty factor for duplicate values among `entries` list entries.
pub fn duplicate_factor(duplicates: usize, entries: usize) -> f64 {
    if duplicates == 0 || entries == 0 {
        return 1.0;
    }
    (1.0 - duplicates as f64 / entries as f64).max(0.0)
}

/// Mean of a set of factors; an empty set means "no rule applies".
pub fn mean_factor(factors: &[f64]) -> f64 {
    if factors.is_empty() {
        return 1.0;
    }
    clamp_unit(factors.iter().sum::<f64>() / factors.len() as f64)
}

/// Section score: completeness scaled by the cardinality factor.
pub fn section_score(completeness: f64, cardinality_factor: f64) -> f64 {
    clamp_unit(completeness * cardinality_factor)
}

/// Weighted aggregate of `(score, weight)` pairs.
///
/// Normalized by the weight sum so that a perfect document scores exactly
/// 1.0 even when the weights only sum to 1.0 within tolerance.
pub fn aggregate<I>(scores: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (weighted, total) = scores
        .into_iter()
        .fold((0.0, 0.0), |(weighted, total), (score, weight)| {
            (weighted + clamp_unit(score) * weight, total + weight)
        });

    if total <= 0.0 {
        return 0.0;
    }
    clamp_unit(weighted / total)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

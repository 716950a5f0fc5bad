use crate::error::AnalysisError;

/// Largest accepted tempo multiplier.
pub const MAX_MULTIPLIER: f64 = 16.0;

/// Shift and re-densify a beat list.
///
/// Steps, in order: add `offset` to every beat; for `multiplier > 1` insert
/// `floor(multiplier) - 1` points between each consecutive pair at fractions
/// `j / multiplier`; for `multiplier < 1` keep every `floor(1 / multiplier)`-th
/// beat from the first; finally drop beats before 0. Ordering is not
/// re-checked. Multipliers above [`MAX_MULTIPLIER`] are rejected.
pub fn adjust_beats(beats: &[f64], offset: f64, multiplier: f64) -> Result<Vec<f64>, AnalysisError> {
    if !offset.is_finite() {
        return Err(AnalysisError::Validation(format!(
            "offset must be finite, got {}",
            offset
        )));
    }
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return Err(AnalysisError::Validation(format!(
            "multiplier must be a positive number, got {}",
            multiplier
        )));
    }
    if multiplier > MAX_MULTIPLIER {
        return Err(AnalysisError::Validation(format!(
            "multiplier must be at most {}, got {}",
            MAX_MULTIPLIER, multiplier
        )));
    }
    if beats.iter().any(|b| !b.is_finite()) {
        return Err(AnalysisError::Validation(
            "beat times must be finite".to_string(),
        ));
    }

    let shifted: Vec<f64> = beats.iter().map(|b| b + offset).collect();

    let scaled = if multiplier > 1.0 {
        densify(&shifted, multiplier)
    } else if multiplier < 1.0 {
        let stride = (1.0 / multiplier).floor() as usize;
        shifted.iter().step_by(stride.max(1)).copied().collect()
    } else {
        shifted
    };

    Ok(scaled.into_iter().filter(|&b| b >= 0.0).collect())
}

fn densify(beats: &[f64], multiplier: f64) -> Vec<f64> {
    let steps = multiplier.floor() as usize;
    let mut out = Vec::with_capacity(beats.len().saturating_mul(steps));

    for pair in beats.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        out.push(start);
        for j in 1..steps {
            out.push(start + (end - start) * j as f64 / multiplier);
        }
    }
    if let Some(&last) = beats.last() {
        out.push(last);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let beats = vec![0.5, 1.0, 1.5, 2.0];
        assert_eq!(adjust_beats(&beats, 0.0, 1.0).unwrap(), beats);
    }

    #[test]
    fn test_double_time() {
        let beats = adjust_beats(&[0.0, 1.0, 2.0], 0.0, 2.0).unwrap();
        assert_eq!(beats, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_half_time_keeps_every_other_beat() {
        let beats = adjust_beats(&[0.0, 0.5, 1.0, 1.5, 2.0], 0.0, 0.5).unwrap();
        assert_eq!(beats, vec![0.0, 1.0, 2.0]);

        // ceil(n / 2) beats for odd and even n
        let even = adjust_beats(&[0.0, 0.5, 1.0, 1.5], 0.0, 0.5).unwrap();
        assert_eq!(even, vec![0.0, 1.0]);
    }

    #[test]
    fn test_offset_drops_negative_beats() {
        let beats = adjust_beats(&[1.0, 2.0, 3.0], -1.5, 1.0).unwrap();
        assert_eq!(beats, vec![0.5, 1.5]);

        let beats = adjust_beats(&[1.0, 2.0], 0.25, 1.0).unwrap();
        assert_eq!(beats, vec![1.25, 2.25]);
    }

    #[test]
    fn test_offset_applies_before_multiplier() {
        // Shifted to [-1, 0, 1], densified, then negatives dropped
        let beats = adjust_beats(&[0.0, 1.0, 2.0], -1.0, 2.0).unwrap();
        assert_eq!(beats, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_fractional_multiplier() {
        // floor(2.5) - 1 = 1 inserted point at 1 / 2.5 of each gap
        let beats = adjust_beats(&[0.0, 1.0], 0.0, 2.5).unwrap();
        assert_eq!(beats.len(), 3);
        assert!((beats[1] - 0.4).abs() < 1e-12);

        // floor(1 / 0.4) = 2
        let beats = adjust_beats(&[0.0, 1.0, 2.0, 3.0], 0.0, 0.4).unwrap();
        assert_eq!(beats, vec![0.0, 2.0]);
    }

    #[test]
    fn test_short_inputs() {
        assert!(adjust_beats(&[], 0.5, 2.0).unwrap().is_empty());
        assert_eq!(adjust_beats(&[3.0], 0.0, 4.0).unwrap(), vec![3.0]);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            adjust_beats(&[1.0], f64::NAN, 1.0),
            Err(AnalysisError::Validation(_))
        ));
        assert!(matches!(
            adjust_beats(&[1.0], 0.0, 0.0),
            Err(AnalysisError::Validation(_))
        ));
        assert!(matches!(
            adjust_beats(&[1.0], 0.0, -2.0),
            Err(AnalysisError::Validation(_))
        ));
        assert!(matches!(
            adjust_beats(&[f64::INFINITY], 0.0, 1.0),
            Err(AnalysisError::Validation(_))
        ));
    }

    #[test]
    fn test_huge_multiplier_rejected() {
        assert!(matches!(
            adjust_beats(&[0.0, 1.0], 0.0, 1e300),
            Err(AnalysisError::Validation(_))
        ));
        assert!(matches!(
            adjust_beats(&[0.0, 1.0], 0.0, MAX_MULTIPLIER + 0.5),
            Err(AnalysisError::Validation(_))
        ));
        assert_eq!(
            adjust_beats(&[0.0, 1.0], 0.0, MAX_MULTIPLIER).unwrap().len(),
            17
        );
    }
}

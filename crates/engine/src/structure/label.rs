//! Position and repetition based section labels.

use super::cluster::KMeans;
use crate::outcome::Outcome;
use crate::types::SectionLabel;

/// Segments needed before repetition clustering is attempted.
const MIN_SEGMENTS_FOR_CLUSTERING: usize = 3;

/// Label segments from their mean feature vectors and boundary times.
///
/// `bound_times` has one more entry than `means`. With three or more segments
/// the means are clustered; the most repeated cluster becomes the chorus and
/// the runner-up the verse. Position decides the rest. Count ties go to the
/// cluster heard first.
pub fn label_segments(
    means: &[Vec<f32>],
    bound_times: &[f64],
    duration: f64,
    kmeans: &KMeans,
    max_clusters: usize,
) -> Outcome<Vec<SectionLabel>> {
    let n = means.len();
    let mut labels = vec![SectionLabel::Unknown; n];
    if n == 0 || bound_times.len() != n + 1 {
        return Outcome::Primary(labels);
    }

    let singletons: Vec<usize> = (0..n).collect();
    let (clusters, fallback) = if n >= MIN_SEGMENTS_FOR_CLUSTERING {
        match kmeans.fit_predict(means, max_clusters.min(n)) {
            Ok(clusters) => (clusters, None),
            Err(e) => {
                log::warn!("Segment clustering failed, treating segments as distinct: {}", e);
                (singletons, Some(e.to_string()))
            }
        }
    } else {
        (singletons, None)
    };

    // Cluster sizes in order of first appearance
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for &cluster in &clusters {
        match counts.iter_mut().find(|(c, _)| *c == cluster) {
            Some((_, count)) => *count += 1,
            None => counts.push((cluster, 1)),
        }
    }
    let mut by_size = counts.clone();
    // Stable, so equal counts keep appearance order
    by_size.sort_by(|a, b| b.1.cmp(&a.1));
    let most_common = by_size.first().copied();
    let second_common = by_size.get(1).copied();

    if bound_times[0] < duration * 0.1 {
        labels[0] = SectionLabel::Intro;
    }
    if bound_times[n - 1] > duration * 0.85 {
        labels[n - 1] = SectionLabel::Outro;
    }

    for (label, &cluster) in labels.iter_mut().zip(&clusters) {
        if *label != SectionLabel::Unknown {
            continue;
        }
        match (most_common, second_common) {
            (Some((c, count)), _) if c == cluster && count > 1 => *label = SectionLabel::Chorus,
            (_, Some((c, count))) if c == cluster && count > 1 => *label = SectionLabel::Verse,
            _ => {}
        }
    }

    for (i, label) in labels.iter_mut().enumerate() {
        if *label != SectionLabel::Unknown {
            continue;
        }
        let pos = (bound_times[i] + bound_times[i + 1]) / 2.0 / duration;
        *label = if pos < 0.15 {
            SectionLabel::Intro
        } else if pos > 0.9 {
            SectionLabel::Outro
        } else if pos > 0.4 && pos < 0.6 {
            SectionLabel::Bridge
        } else {
            SectionLabel::Verse
        };
    }

    match fallback {
        Some(reason) => Outcome::fallback(labels, reason),
        None => Outcome::Primary(labels),
    }
}

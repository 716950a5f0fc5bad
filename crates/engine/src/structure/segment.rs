//! Boundary detection by adjacency-constrained agglomerative clustering.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::AnalysisError;
use crate::outcome::Outcome;

/// Split frames into `target` contiguous segments.
///
/// Returns frame boundaries `[0, b1, ..., n]`. If the clustering cannot run,
/// falls back to equal-width segments.
pub fn segment(columns: &[Vec<f32>], target: usize) -> Outcome<Vec<usize>> {
    match agglomerative(columns, target) {
        Ok(boundaries) => Outcome::Primary(boundaries),
        Err(e) => {
            log::warn!("Agglomerative segmentation failed, using uniform segments: {}", e);
            Outcome::fallback(uniform_boundaries(columns.len(), target), e.to_string())
        }
    }
}

/// `floor(i * n / k)` for `i = 0..=k`, with repeated frames removed.
pub fn uniform_boundaries(num_frames: usize, target: usize) -> Vec<usize> {
    let k = target.max(1);
    let mut boundaries: Vec<usize> = (0..=k).map(|i| i * num_frames / k).collect();
    boundaries.dedup();
    if boundaries.len() < 2 {
        boundaries = vec![0, num_frames];
    }
    boundaries
}

/// Candidate merge of two neighbouring clusters.
#[derive(Debug)]
struct Merge {
    cost: f64,
    left: usize,
    right: usize,
    left_version: u32,
    right_version: u32,
}

impl PartialEq for Merge {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Merge {}

impl PartialOrd for Merge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Merge {
    // Reversed so the max-heap pops the cheapest merge, leftmost first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.left.cmp(&self.left))
    }
}

/// Contiguous run of frames with running feature sums.
struct Cluster {
    sum: Vec<f64>,
    count: usize,
    next: Option<usize>,
    prev: Option<usize>,
    version: u32,
    alive: bool,
}

/// Ward-linkage clustering where only neighbouring segments may merge.
///
/// Every frame starts as its own segment; the pair whose merge least increases
/// the within-segment variance is merged until `target` segments remain.
pub fn agglomerative(columns: &[Vec<f32>], target: usize) -> Result<Vec<usize>, AnalysisError> {
    let n = columns.len();
    if target == 0 {
        return Err(AnalysisError::Analysis(
            "target section count must be positive".to_string(),
        ));
    }
    if n < target {
        return Err(AnalysisError::Analysis(format!(
            "{} frames cannot form {} segments",
            n, target
        )));
    }
    let dims = columns[0].len();
    if dims == 0 || columns.iter().any(|c| c.len() != dims) {
        return Err(AnalysisError::Analysis(
            "feature columns are empty or ragged".to_string(),
        ));
    }
    if columns.iter().flatten().any(|v| !v.is_finite()) {
        return Err(AnalysisError::Analysis(
            "non-finite feature values".to_string(),
        ));
    }

    let mut clusters: Vec<Cluster> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| Cluster {
            sum: column.iter().map(|&v| v as f64).collect(),
            count: 1,
            next: (i + 1 < n).then_some(i + 1),
            prev: i.checked_sub(1),
            version: 0,
            alive: true,
        })
        .collect();

    let mut heap = BinaryHeap::with_capacity(n);
    for left in 0..n.saturating_sub(1) {
        heap.push(merge_candidate(&clusters, left, left + 1));
    }

    let mut remaining = n;
    while remaining > target {
        let Some(merge) = heap.pop() else {
            break;
        };

        let (left, right) = (merge.left, merge.right);
        let stale = !clusters[left].alive
            || !clusters[right].alive
            || clusters[left].next != Some(right)
            || clusters[left].version != merge.left_version
            || clusters[right].version != merge.right_version;
        if stale {
            continue;
        }

        // Left absorbs right, so a cluster's id stays its first frame
        let absorbed = std::mem::take(&mut clusters[right].sum);
        for (acc, v) in clusters[left].sum.iter_mut().zip(&absorbed) {
            *acc += v;
        }
        clusters[left].count += clusters[right].count;
        clusters[left].next = clusters[right].next;
        clusters[left].version += 1;
        clusters[right].alive = false;
        if let Some(next) = clusters[left].next {
            clusters[next].prev = Some(left);
        }
        remaining -= 1;

        if let Some(prev) = clusters[left].prev {
            heap.push(merge_candidate(&clusters, prev, left));
        }
        if let Some(next) = clusters[left].next {
            heap.push(merge_candidate(&clusters, left, next));
        }
    }

    let mut boundaries: Vec<usize> = clusters
        .iter()
        .enumerate()
        .filter(|(_, c)| c.alive)
        .map(|(i, _)| i)
        .collect();
    boundaries.push(n);
    Ok(boundaries)
}

fn merge_candidate(clusters: &[Cluster], left: usize, right: usize) -> Merge {
    let a = &clusters[left];
    let b = &clusters[right];
    let (na, nb) = (a.count as f64, b.count as f64);

    let distance: f64 = a
        .sum
        .iter()
        .zip(&b.sum)
        .map(|(sa, sb)| (sa / na - sb / nb).powi(2))
        .sum();

    Merge {
        cost: na * nb / (na + nb) * distance,
        left,
        right,
        left_version: a.version,
        right_version: b.version,
    }
}

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::AnalysisError;

/// Seeded k-means with k-means++ initialisation.
///
/// Runs `n_init` times from one random stream and keeps the run with the
/// lowest inertia, so identical input and seed give identical labels.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub seed: u64,
    pub n_init: usize,
    pub max_iter: usize,
}

impl Default for KMeans {
    fn default() -> Self {
        Self {
            seed: 42,
            n_init: 10,
            max_iter: 300,
        }
    }
}

struct Fit {
    labels: Vec<usize>,
    inertia: f64,
}

impl KMeans {
    pub fn new(seed: u64, n_init: usize, max_iter: usize) -> Self {
        Self {
            seed,
            n_init,
            max_iter,
        }
    }

    /// Cluster `data` into `k` groups and return each row's cluster index.
    pub fn fit_predict(&self, data: &[Vec<f32>], k: usize) -> Result<Vec<usize>, AnalysisError> {
        if k == 0 || k > data.len() {
            return Err(AnalysisError::Analysis(format!(
                "cannot form {} clusters from {} vectors",
                k,
                data.len()
            )));
        }
        let dims = data[0].len();
        if data.iter().any(|row| row.len() != dims) {
            return Err(AnalysisError::Analysis("ragged input vectors".to_string()));
        }
        if data.iter().flatten().any(|v| !v.is_finite()) {
            return Err(AnalysisError::Analysis(
                "non-finite input vectors".to_string(),
            ));
        }

        let points: Vec<Vec<f64>> = data
            .iter()
            .map(|row| row.iter().map(|&v| v as f64).collect())
            .collect();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<Fit> = None;
        for _ in 0..self.n_init.max(1) {
            let centroids = init_plus_plus(&points, k, &mut rng);
            let fit = lloyd(&points, centroids, self.max_iter);
            if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }

        best.map(|fit| fit.labels)
            .ok_or_else(|| AnalysisError::Analysis("k-means produced no fit".to_string()))
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index and distance of the nearest centroid; ties go to the lower index.
fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(point, c)))
        .fold((0, f64::INFINITY), |best, (i, d)| if d < best.1 { (i, d) } else { best })
}

fn init_plus_plus(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut chosen = vec![rng.random_range(0..points.len())];

    while chosen.len() < k {
        let centroids: Vec<Vec<f64>> = chosen.iter().map(|&i| points[i].clone()).collect();
        let weights: Vec<f64> = points.iter().map(|p| nearest(p, &centroids).1).collect();
        let total: f64 = weights.iter().sum();

        let next = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            weights
                .iter()
                .position(|&w| {
                    cumulative += w;
                    cumulative > target
                })
                .unwrap_or_else(|| {
                    // Rounding left target at the very end
                    weights.iter().rposition(|&w| w > 0.0).unwrap_or(0)
                })
        } else {
            // Every point coincides with a chosen centroid
            (0..points.len())
                .find(|i| !chosen.contains(i))
                .unwrap_or(0)
        };
        chosen.push(next);
    }

    chosen.iter().map(|&i| points[i].clone()).collect()
}

fn lloyd(points: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, max_iter: usize) -> Fit {
    let dims = points[0].len();
    let mut labels: Vec<usize> = points.iter().map(|p| nearest(p, &centroids).0).collect();

    for _ in 0..max_iter {
        let mut sums = vec![vec![0.0f64; dims]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for (point, &label) in points.iter().zip(&labels) {
            counts[label] += 1;
            for (acc, v) in sums[label].iter_mut().zip(point) {
                *acc += v;
            }
        }
        for ((centroid, sum), &count) in centroids.iter_mut().zip(sums).zip(&counts) {
            // Empty clusters keep their previous centroid
            if count > 0 {
                *centroid = sum.into_iter().map(|s| s / count as f64).collect();
            }
        }

        let updated: Vec<usize> = points.iter().map(|p| nearest(p, &centroids).0).collect();
        if updated == labels {
            break;
        }
        labels = updated;
    }

    let inertia = points
        .iter()
        .zip(&labels)
        .map(|(p, &l)| squared_distance(p, &centroids[l]))
        .sum();

    Fit { labels, inertia }
}

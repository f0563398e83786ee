//! Clustering over a finished condensed matrix.
//!
//! This is the consumer side of the farm: it only needs the symmetric
//! lookup [`CondensedMatrix::get_distance`].

use crate::condensed::CondensedMatrix;
use crate::farm_error::FarmError;
use crate::sequence::SeriesMeta;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Greedy k-medoids seeded with the first `k` series.
    KMedoids { k: usize, max_iter: usize },
    /// Density-based clustering; a point counts itself as a neighbor.
    Dbscan { eps: f64, min_pts: usize },
    /// Agglomerative, average linkage, stopped at `k` clusters.
    Hierarchical { k: usize },
}

/// Cluster assignment for every series. `None` marks DBSCAN noise.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub labels: Vec<Option<usize>>,
    /// Medoid of each cluster, indexed by label.
    pub medoids: Vec<usize>,
}

impl Clustering {
    pub fn num_clusters(&self) -> usize {
        self.medoids.len()
    }

    /// Members of each cluster, in series order.
    pub fn groups(&self) -> Vec<Vec<usize>> {
        let mut groups = vec![Vec::new(); self.num_clusters()];
        for (i, label) in self.labels.iter().enumerate() {
            if let Some(c) = label {
                groups[*c].push(i);
            }
        }
        groups
    }

    /// Labels of each cluster's members, for reporting.
    pub fn named_groups<'m>(&self, meta: &'m [SeriesMeta]) -> Vec<Vec<&'m str>> {
        self.groups()
            .into_iter()
            .map(|g| g.into_iter().map(|i| meta[i].label.as_str()).collect())
            .collect()
    }
}

/// Cluster `num_series` series from their condensed distances.
pub fn run(
    num_series: usize,
    matrix: &CondensedMatrix,
    meta: &[SeriesMeta],
    algorithm: Algorithm,
) -> Result<Clustering, FarmError> {
    if meta.len() != num_series {
        return Err(FarmError::Cluster(format!(
            "{} metadata entries for {num_series} series",
            meta.len()
        )));
    }
    let dist = Lookup::new(num_series, matrix)?;
    log::info!("clustering {num_series} series with {algorithm:?}");
    match algorithm {
        Algorithm::KMedoids { k, max_iter } => k_medoids(&dist, k, max_iter),
        Algorithm::Dbscan { eps, min_pts } => Ok(dbscan(&dist, eps, min_pts)),
        Algorithm::Hierarchical { k } => hierarchical(&dist, k),
    }
}

/// Dense copy of the symmetric matrix; every pair must be present.
struct Lookup {
    n: usize,
    d: Vec<f64>,
}

impl Lookup {
    fn new(n: usize, matrix: &CondensedMatrix) -> Result<Self, FarmError> {
        let mut d = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let v = matrix.get_distance(i, j).ok_or_else(|| {
                    FarmError::Cluster(format!("matrix has no distance for ({i}, {j})"))
                })?;
                d[i * n + j] = v;
                d[j * n + i] = v;
            }
        }
        Ok(Self { n, d })
    }

    #[inline]
    fn get(&self, i: usize, j: usize) -> f64 {
        self.d[i * self.n + j]
    }

    /// Member of `members` with the smallest summed distance to the rest.
    fn medoid_of(&self, members: &[usize]) -> Option<usize> {
        members
            .iter()
            .map(|&i| (i, members.iter().map(|&j| self.get(i, j)).sum::<f64>()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }
}

fn k_medoids(dist: &Lookup, k: usize, max_iter: usize) -> Result<Clustering, FarmError> {
    let n = dist.n;
    if k == 0 || k >= n {
        return Err(FarmError::Cluster(format!(
            "k must be in 1..{n} for {n} series, got {k}"
        )));
    }
    let mut medoids: Vec<usize> = (0..k).collect();
    let mut labels: Vec<Option<usize>> = vec![None; n];

    for _ in 0..max_iter.max(1) {
        let mut changed = false;
        for (i, label) in labels.iter_mut().enumerate() {
            let best = medoids
                .iter()
                .enumerate()
                .map(|(m, &med)| (m, dist.get(i, med)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(m, _)| m);
            if *label != best {
                *label = best;
                changed = true;
            }
        }
        for (m, medoid) in medoids.iter_mut().enumerate() {
            let members: Vec<usize> = (0..n).filter(|&i| labels[i] == Some(m)).collect();
            // an emptied cluster keeps its previous medoid
            if let Some(best) = dist.medoid_of(&members) {
                *medoid = best;
            }
        }
        if !changed {
            break;
        }
    }
    Ok(Clustering { labels, medoids })
}

fn dbscan(dist: &Lookup, eps: f64, min_pts: usize) -> Clustering {
    let n = dist.n;
    let neighbors =
        |i: usize| -> Vec<usize> { (0..n).filter(|&j| dist.get(i, j) <= eps).collect() };

    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut clusters = 0usize;

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let seeds = neighbors(i);
        if seeds.len() < min_pts {
            continue; // noise unless a later core point claims it
        }
        let c = clusters;
        clusters += 1;
        labels[i] = Some(c);
        let mut queue: VecDeque<usize> = seeds.into();
        while let Some(j) = queue.pop_front() {
            if labels[j].is_none() {
                labels[j] = Some(c);
            }
            if visited[j] {
                continue;
            }
            visited[j] = true;
            let more = neighbors(j);
            if more.len() >= min_pts {
                queue.extend(more);
            }
        }
    }

    let mut groups = vec![Vec::new(); clusters];
    for (i, l) in labels.iter().enumerate() {
        if let Some(c) = l {
            groups[*c].push(i);
        }
    }
    let medoids = groups
        .iter()
        .filter_map(|g| dist.medoid_of(g))
        .collect();
    Clustering { labels, medoids }
}

fn hierarchical(dist: &Lookup, k: usize) -> Result<Clustering, FarmError> {
    let n = dist.n;
    if k == 0 || k > n {
        return Err(FarmError::Cluster(format!(
            "k must be in 1..={n} for {n} series, got {k}"
        )));
    }
    let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let linkage = |a: &[usize], b: &[usize]| -> f64 {
        let sum: f64 = a.iter().flat_map(|&i| b.iter().map(move |&j| dist.get(i, j))).sum();
        sum / (a.len() * b.len()) as f64
    };

    while clusters.len() > k {
        let mut best = (0, 1, f64::INFINITY);
        for a in 0..clusters.len() {
            for b in (a + 1)..clusters.len() {
                let d = linkage(&clusters[a], &clusters[b]);
                if d < best.2 {
                    best = (a, b, d);
                }
            }
        }
        let (a, b, _) = best;
        let merged = clusters.swap_remove(b);
        clusters[a].extend(merged);
    }

    for c in clusters.iter_mut() {
        c.sort_unstable();
    }
    clusters.sort_by_key(|c| c[0]);

    let mut labels = vec![None; n];
    for (label, members) in clusters.iter().enumerate() {
        for &i in members {
            labels[i] = Some(label);
        }
    }
    let medoids = clusters
        .iter()
        .filter_map(|c| dist.medoid_of(c))
        .collect();
    Ok(Clustering { labels, medoids })
}

//! Agglomerative (bottom-up hierarchical) clustering.
//!
//! Every point starts in its own cluster, and the two closest clusters are merged repeatedly
//! until `k` clusters remain. How "closest" is defined depends on the [`Linkage`].
//!
//! The full merge tree is computed first, and then cut at `k` clusters
//! by applying the `n - k` cheapest merges.
//! Ward, complete, and average linkage build the tree with the nearest-neighbor chain algorithm:
//!
//! Müllner, D. Modern hierarchical, agglomerative clustering algorithms.
//! arXiv:1109.2378, 2011.
//!
//! Single linkage builds a minimum spanning tree with Prim's algorithm instead.
//!
//! Ward and single linkage only need memory linear in the number of points.
//! Complete and average linkage keep the full pairwise distance matrix,
//! which is quadratic in the number of points and checked against a byte limit up front.

use super::{squared_euclidean_distance, Assignment};
use crate::{ClusterCount, InvalidParameter, SegmentError};

use std::{cell::RefCell, fmt, str::FromStr};

use log::debug;
use ordered_float::OrderedFloat;

/// The default limit on the size of the pairwise distance matrix: 1 GiB.
///
/// This admits complete and average linkage on up to 23,170 pixels.
pub const DEFAULT_MAX_MATRIX_BYTES: u64 = 1 << 30;

/// The method name used in errors and logs.
const NAME: &str = "hierarchical";

/// The criterion used to measure the distance between two clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Linkage {
    /// Merge the pair of clusters that least increases the total within-cluster variance.
    #[default]
    Ward,
    /// The distance between two clusters is the largest distance between their members.
    Complete,
    /// The distance between two clusters is the mean distance between their members.
    Average,
    /// The distance between two clusters is the smallest distance between their members.
    Single,
}

impl Linkage {
    /// All supported linkage criteria.
    pub const ALL: [Self; 4] = [Self::Ward, Self::Complete, Self::Average, Self::Single];

    /// The lowercase name of the linkage, as accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Linkage::Ward => "ward",
            Linkage::Complete => "complete",
            Linkage::Average => "average",
            Linkage::Single => "single",
        }
    }

    /// Whether this linkage needs the full pairwise distance matrix.
    #[must_use]
    pub const fn needs_distance_matrix(self) -> bool {
        matches!(self, Linkage::Complete | Linkage::Average)
    }
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Linkage {
    type Err = InvalidParameter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|linkage| linkage.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| InvalidParameter::UnknownLinkage(s.to_owned()))
    }
}

/// A merge of the two clusters containing the points `a` and `b`.
#[derive(Debug, Clone, Copy)]
struct Merge {
    /// A point in the first cluster.
    a: u32,
    /// A point in the second cluster.
    b: u32,
    /// The linkage distance at which the clusters were merged.
    distance: f64,
}

/// A disjoint-set forest over point indices.
struct UnionFind {
    /// The parent of each node, roots are their own parent.
    parent: Vec<u32>,
    /// The size of the tree rooted at each node (only meaningful for roots).
    size: Vec<u32>,
}

impl UnionFind {
    #[allow(clippy::cast_possible_truncation)]
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n as u32).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let grandparent = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grandparent;
            x = grandparent;
        }
        x
    }

    /// Joins the sets of `a` and `b`, returning whether they were disjoint.
    fn union(&mut self, a: u32, b: u32) -> bool {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return false;
        }
        let (large, small) = if self.size[a as usize] >= self.size[b as usize] {
            (a, b)
        } else {
            (b, a)
        };
        self.parent[small as usize] = large;
        self.size[large as usize] += self.size[small as usize];
        true
    }
}

/// Runs the nearest-neighbor chain algorithm over `n` clusters.
///
/// `distance(a, b)` returns the current linkage distance between active clusters `a` and `b`,
/// and `merge(a, b)` combines cluster `a` into `b`, after which `a` is never queried again.
/// Returns the merges in the order they were performed.
fn nn_chain(
    n: usize,
    mut distance: impl FnMut(usize, usize) -> f64,
    mut merge: impl FnMut(usize, usize),
) -> Vec<Merge> {
    let mut active = vec![true; n];
    let mut merges = Vec::with_capacity(n.saturating_sub(1));
    let mut chain = Vec::<usize>::with_capacity(n);
    let mut first_active = 0;

    while merges.len() + 1 < n {
        if chain.is_empty() {
            while !active[first_active] {
                first_active += 1;
            }
            chain.push(first_active);
        }

        let a = chain[chain.len() - 1];
        let previous = chain.len().checked_sub(2).map(|i| chain[i]);

        // prefer the previous chain element on ties, otherwise the chain may cycle
        let (mut nearest, mut min_distance) = match previous {
            Some(p) => (p, distance(a, p)),
            None => (usize::MAX, f64::INFINITY),
        };
        for c in (0..n).filter(|&c| active[c] && c != a) {
            let d = distance(a, c);
            if d < min_distance || nearest == usize::MAX {
                nearest = c;
                min_distance = d;
            }
        }

        if Some(nearest) == previous {
            chain.truncate(chain.len() - 2);
            let (from, into) = (a.max(nearest), a.min(nearest));
            // cluster slot `i` always contains point `i`
            #[allow(clippy::cast_possible_truncation)]
            merges.push(Merge { a: from as u32, b: into as u32, distance: min_distance });
            merge(from, into);
            active[from] = false;
        } else {
            chain.push(nearest);
        }
    }

    merges
}

/// Builds the merge tree for Ward linkage from cluster centroids and sizes.
///
/// The Ward distance between clusters `A` and `B` is the increase in the sum of squared errors
/// caused by merging them: `|A| |B| / (|A| + |B|) * ||c_A - c_B||^2`.
fn ward<const N: usize>(points: &[[f32; N]]) -> Vec<Merge> {
    let centroids = points
        .iter()
        .map(|point| point.map(f64::from))
        .collect::<Vec<_>>();
    let sizes = vec![1.0f64; points.len()];
    let clusters = RefCell::new((centroids, sizes));

    nn_chain(
        points.len(),
        |a, b| {
            let clusters = clusters.borrow();
            let (centroids, sizes) = &*clusters;
            let (x, y) = (centroids[a], centroids[b]);
            let mut dist = 0.0;
            for c in 0..N {
                let d = x[c] - y[c];
                dist += d * d;
            }
            sizes[a] * sizes[b] / (sizes[a] + sizes[b]) * dist
        },
        |from, into| {
            let mut clusters = clusters.borrow_mut();
            let (centroids, sizes) = &mut *clusters;
            let (sa, sb) = (sizes[from], sizes[into]);
            let total = sa + sb;
            let (x, y) = (centroids[from], centroids[into]);
            centroids[into] = std::array::from_fn(|c| (sa * x[c] + sb * y[c]) / total);
            sizes[into] = total;
        },
    )
}

/// Returns the number of bytes needed for the pairwise distance matrix of `n` points.
fn matrix_bytes(n: usize) -> u64 {
    let n = n as u64;
    n * n.saturating_sub(1) / 2 * std::mem::size_of::<f32>() as u64
}

/// Returns the index of the pair `(i, j)` with `i < j` in a condensed distance matrix.
#[inline]
fn condensed_index(n: usize, i: usize, j: usize) -> usize {
    debug_assert!(i < j && j < n);
    n * i - i * (i + 1) / 2 + (j - i - 1)
}

/// Builds the merge tree for complete or average linkage from the pairwise distance matrix,
/// updating distances with the Lance-Williams formula after each merge.
///
/// # Errors
/// Returns [`SegmentError::ResourceExhaustion`] if the matrix would take more than
/// `max_matrix_bytes` or cannot be allocated.
fn matrix_linkage<const N: usize>(
    points: &[[f32; N]],
    linkage: Linkage,
    max_matrix_bytes: u64,
) -> Result<Vec<Merge>, SegmentError> {
    let n = points.len();
    let bytes = matrix_bytes(n);
    let exhausted = || SegmentError::ResourceExhaustion {
        method: NAME,
        samples: n,
        bytes,
        limit: max_matrix_bytes,
    };

    if bytes > max_matrix_bytes {
        return Err(exhausted());
    }

    let len = n * (n - 1) / 2;
    let mut matrix = Vec::new();
    matrix.try_reserve_exact(len).map_err(|_| exhausted())?;
    for (i, &x) in points.iter().enumerate() {
        matrix.extend(points[(i + 1)..].iter().map(|&y| squared_euclidean_distance(x, y).sqrt()));
    }
    debug!("computed {len} pairwise distances for {linkage} linkage");

    let mut sizes = vec![1u32; n];
    let matrix = RefCell::new(matrix);

    let merges = nn_chain(
        n,
        |a, b| {
            let (i, j) = (a.min(b), a.max(b));
            f64::from(matrix.borrow()[condensed_index(n, i, j)])
        },
        |from, into| {
            let mut matrix = matrix.borrow_mut();
            let (sa, sb) = (sizes[from], sizes[into]);
            for c in (0..n).filter(|&c| c != from && c != into && sizes[c] > 0) {
                let fc = condensed_index(n, from.min(c), from.max(c));
                let ic = condensed_index(n, into.min(c), into.max(c));
                let (d_from, d_into) = (matrix[fc], matrix[ic]);
                matrix[ic] = match linkage {
                    Linkage::Complete => d_from.max(d_into),
                    #[allow(clippy::cast_precision_loss)]
                    _ => (sa as f32 * d_from + sb as f32 * d_into) / (sa + sb) as f32,
                };
            }
            sizes[into] = sa + sb;
            sizes[from] = 0;
        },
    );

    Ok(merges)
}

/// Builds the merge tree for single linkage from a minimum spanning tree (Prim's algorithm).
///
/// Each tree edge is a merge at its length. Squared distances are used,
/// which give the same tree and the same merge order.
fn single<const N: usize>(points: &[[f32; N]]) -> Vec<Merge> {
    let n = points.len();
    let mut in_tree = vec![false; n];
    let mut closest = vec![f32::INFINITY; n];
    let mut parent = vec![0u32; n];
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        let mut next = usize::MAX;
        let mut next_distance = f32::INFINITY;
        for v in 0..n {
            if in_tree[v] {
                continue;
            }
            let d = squared_euclidean_distance(points[current], points[v]);
            if d < closest[v] {
                closest[v] = d;
                #[allow(clippy::cast_possible_truncation)]
                {
                    parent[v] = current as u32;
                }
            }
            if closest[v] < next_distance || next == usize::MAX {
                next = v;
                next_distance = closest[v];
            }
        }

        in_tree[next] = true;
        #[allow(clippy::cast_possible_truncation)]
        merges.push(Merge {
            a: parent[next],
            b: next as u32,
            distance: f64::from(next_distance),
        });
        current = next;
    }

    merges
}

/// Cuts the merge tree at `k` clusters by applying the `n - k` cheapest merges.
///
/// Labels are numbered in order of first appearance in `0..n`.
#[allow(clippy::cast_possible_truncation)]
fn cut(n: usize, mut merges: Vec<Merge>, k: usize) -> Vec<u8> {
    // stable, so equal distances keep the order in which the merges were found
    merges.sort_by_key(|merge| OrderedFloat(merge.distance));

    let mut sets = UnionFind::new(n);
    for merge in &merges[..(n - k)] {
        sets.union(merge.a, merge.b);
    }

    let mut root_labels = vec![u16::MAX; n];
    let mut next_label = 0;
    (0..n as u32)
        .map(|i| {
            let root = sets.find(i) as usize;
            if root_labels[root] == u16::MAX {
                root_labels[root] = next_label;
                next_label += 1;
            }
            // the tree has n - 1 edges, so exactly k <= 256 sets remain
            root_labels[root] as u8
        })
        .collect()
}

/// Clusters `points` into `k` clusters using agglomerative clustering with the given `linkage`.
///
/// `max_matrix_bytes` limits the size of the pairwise distance matrix
/// used by [`Linkage::Complete`] and [`Linkage::Average`].
///
/// The returned [`Assignment`] has no centroids, and its labels are numbered
/// in order of first appearance.
///
/// # Errors
/// Returns [`SegmentError::InvalidParameter`] if there are not more points than clusters,
/// or [`SegmentError::ResourceExhaustion`] if the distance matrix is too large.
pub fn assign<const N: usize>(
    points: &[[f32; N]],
    k: ClusterCount,
    linkage: Linkage,
    max_matrix_bytes: u64,
) -> Result<Assignment<N>, SegmentError> {
    k.check_samples(points.len())?;
    if u32::try_from(points.len()).is_err() {
        return Err(SegmentError::ResourceExhaustion {
            method: NAME,
            samples: points.len(),
            bytes: matrix_bytes(points.len()),
            limit: max_matrix_bytes,
        });
    }

    let merges = match linkage {
        Linkage::Ward => ward(points),
        Linkage::Single => single(points),
        Linkage::Complete | Linkage::Average => matrix_linkage(points, linkage, max_matrix_bytes)?,
    };

    debug!("built {linkage} linkage tree over {} points", points.len());

    Ok(Assignment {
        labels: cut(points.len(), merges, k.as_usize()),
        centroids: None,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{features::color_features, tests::*};

    fn k(k: u16) -> ClusterCount {
        ClusterCount::try_from(k).unwrap()
    }

    fn run<const N: usize>(points: &[[f32; N]], clusters: u16, linkage: Linkage) -> Vec<u8> {
        assign(points, k(clusters), linkage, DEFAULT_MAX_MATRIX_BYTES)
            .unwrap()
            .labels
    }

    /// Relabels in order of first appearance, so partitions can be compared directly.
    fn canonical(labels: &[usize]) -> Vec<u8> {
        let mut seen = Vec::new();
        labels
            .iter()
            .map(|label| {
                let index = seen.iter().position(|l| l == label).unwrap_or_else(|| {
                    seen.push(*label);
                    seen.len() - 1
                });
                u8::try_from(index).unwrap()
            })
            .collect()
    }

    /// Straightforward cubic agglomerative clustering.
    #[allow(clippy::cast_precision_loss)]
    fn naive<const N: usize>(points: &[[f32; N]], k: usize, linkage: Linkage) -> Vec<u8> {
        let dist = |a: usize, b: usize| f64::from(squared_euclidean_distance(points[a], points[b])).sqrt();
        let linkage_distance = |x: &[usize], y: &[usize]| -> f64 {
            let pairs = x.iter().flat_map(|&a| y.iter().map(move |&b| (a, b)));
            match linkage {
                Linkage::Single => pairs.map(|(a, b)| dist(a, b)).fold(f64::INFINITY, f64::min),
                Linkage::Complete => pairs.map(|(a, b)| dist(a, b)).fold(0.0, f64::max),
                Linkage::Average => {
                    pairs.map(|(a, b)| dist(a, b)).sum::<f64>() / (x.len() * y.len()) as f64
                }
                Linkage::Ward => {
                    let centroid = |set: &[usize]| -> [f64; N] {
                        std::array::from_fn(|c| {
                            set.iter().map(|&i| f64::from(points[i][c])).sum::<f64>() / set.len() as f64
                        })
                    };
                    let (cx, cy) = (centroid(x), centroid(y));
                    let d = (0..N).map(|c| (cx[c] - cy[c]).powi(2)).sum::<f64>();
                    (x.len() * y.len()) as f64 / (x.len() + y.len()) as f64 * d
                }
            }
        };

        let mut clusters = (0..points.len()).map(|i| vec![i]).collect::<Vec<_>>();
        while clusters.len() > k {
            let mut best = (0, 1, f64::INFINITY);
            for i in 0..clusters.len() {
                for j in (i + 1)..clusters.len() {
                    let d = linkage_distance(&clusters[i], &clusters[j]);
                    if d < best.2 {
                        best = (i, j, d);
                    }
                }
            }
            let merged = clusters.swap_remove(best.1);
            clusters[best.0].extend(merged);
        }

        let mut labels = vec![0; points.len()];
        for (label, cluster) in clusters.iter().enumerate() {
            for &i in cluster {
                labels[i] = label;
            }
        }
        canonical(&labels)
    }

    #[test]
    fn parse_linkage() {
        for linkage in Linkage::ALL {
            assert_eq!(linkage.to_string().parse::<Linkage>(), Ok(linkage));
        }
        assert_eq!("Ward".parse::<Linkage>(), Ok(Linkage::Ward));
        assert_eq!(
            "median".parse::<Linkage>(),
            Err(InvalidParameter::UnknownLinkage("median".to_owned()))
        );
        assert_eq!(Linkage::default(), Linkage::Ward);
    }

    #[test]
    fn condensed_indices_are_dense() {
        let n = 7;
        let mut expected = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                assert_eq!(condensed_index(n, i, j), expected);
                expected += 1;
            }
        }
        assert_eq!(u64::try_from(expected * 4).unwrap(), matrix_bytes(n));
    }

    #[test]
    fn union_find() {
        let mut sets = UnionFind::new(5);
        assert!(sets.union(0, 3));
        assert!(sets.union(4, 3));
        assert!(!sets.union(0, 4));
        assert_eq!(sets.find(0), sets.find(4));
        assert_ne!(sets.find(1), sets.find(0));
    }

    #[test]
    fn separates_two_groups() {
        let points = color_features(&red_blue_row(4));
        for linkage in Linkage::ALL {
            assert_eq!(run(&points, 2, linkage), vec![0, 0, 1, 1]);
        }
    }

    #[test]
    fn identical_points() {
        let points = color_features(&solid_image(2, 2, RED));
        for linkage in Linkage::ALL {
            let labels = run(&points, 2, linkage);
            assert_eq!(labels.len(), 4);
            assert!(labels.iter().all(|&label| label < 2));
            assert_eq!(labels[0], 0);
        }
    }

    #[test]
    fn finds_quadrants() {
        let points = color_features(&noisy_quadrants(8, 8));
        for linkage in Linkage::ALL {
            let labels = run(&points, 4, linkage);
            for y in 0..8 {
                for x in 0..8 {
                    let quadrant = usize::from(x >= 4) + 2 * usize::from(y >= 4);
                    let expected = [0, 1, 2, 3][quadrant];
                    assert_eq!(labels[y * 8 + x], expected, "{linkage} at ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn labels_in_order_of_first_appearance() {
        let points = color_features(&random_image(9, 9, 2));
        for linkage in Linkage::ALL {
            let labels = run(&points, 6, linkage);
            let mut next = 0;
            for &label in &labels {
                assert!(label <= next);
                if label == next {
                    next += 1;
                }
            }
            assert_eq!(next, 6);
        }
    }

    #[test]
    fn naive_agglomerative_oracle() {
        let points = color_features(&random_image(6, 4, 11));
        for linkage in Linkage::ALL {
            for clusters in [2, 3, 5, 9] {
                assert_eq!(
                    run(&points, clusters, linkage),
                    naive(&points, usize::from(clusters), linkage),
                    "{linkage} with {clusters} clusters"
                );
            }
        }
    }

    #[test]
    fn matrix_limit() {
        let points = color_features(&random_image(10, 10, 3));
        for linkage in Linkage::ALL {
            let result = assign(&points, k(3), linkage, 1000);
            if linkage.needs_distance_matrix() {
                assert!(matches!(
                    result,
                    Err(SegmentError::ResourceExhaustion { samples: 100, bytes: 19800, limit: 1000, .. })
                ));
            } else {
                assert!(result.is_ok());
            }
        }
    }

    #[test]
    fn default_matrix_limit() {
        assert!(matrix_bytes(23_170) <= DEFAULT_MAX_MATRIX_BYTES);
        assert!(matrix_bytes(23_171) > DEFAULT_MAX_MATRIX_BYTES);

        // rejected before anything is allocated
        let points = vec![[0.0f32; 3]; 40_000];
        for linkage in [Linkage::Complete, Linkage::Average] {
            assert!(matches!(
                assign(&points, k(2), linkage, DEFAULT_MAX_MATRIX_BYTES),
                Err(SegmentError::ResourceExhaustion { samples: 40_000, limit: DEFAULT_MAX_MATRIX_BYTES, .. })
            ));
        }
    }

    #[test]
    fn rejects_too_many_clusters() {
        let points = [[0.0f32; 3]; 3];
        assert!(matches!(
            assign(&points, k(3), Linkage::Ward, DEFAULT_MAX_MATRIX_BYTES),
            Err(SegmentError::InvalidParameter(_))
        ));
    }
}

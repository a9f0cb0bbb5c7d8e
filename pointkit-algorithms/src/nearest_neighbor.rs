//! Nearest neighbor search implementations

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use pointkit_core::{is_finite_point, Error, NearestNeighborSearch, Point3f, PointCloud, Result};
use tracing::debug;

/// Maximum number of points stored in a leaf before it is split
const LEAF_SIZE: usize = 16;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        start: usize,
        end: usize,
    },
    Split {
        axis: usize,
        value: f32,
        left: usize,
        right: usize,
    },
}

/// KD-Tree over a fixed snapshot of points
///
/// The tree copies the points it is built from, so later changes to the source
/// cloud are not seen; build a new tree instead. Once built the tree is
/// read-only and can be shared between threads.
///
/// Nodes split at the median along the axis of largest extent, which keeps the
/// tree balanced for collinear and coplanar inputs. A range whose points all
/// coincide becomes a single leaf whatever its size.
#[derive(Debug, Clone)]
pub struct KdTree {
    points: Vec<Point3f>,
    order: Vec<usize>,
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl KdTree {
    /// Build a tree from a slice of points
    ///
    /// Fails with [`Error::IndexBuildFailure`] if any coordinate is NaN or
    /// infinite. An empty slice builds an empty tree.
    pub fn new(points: &[Point3f]) -> Result<Self> {
        if let Some(bad) = points.iter().position(|p| !is_finite_point(p)) {
            return Err(Error::IndexBuildFailure(format!(
                "point {} has a non-finite coordinate",
                bad
            )));
        }

        let mut tree = Self {
            points: points.to_vec(),
            order: (0..points.len()).collect(),
            nodes: Vec::new(),
            root: None,
        };
        if !points.is_empty() {
            let root = tree.build_node(0, points.len());
            tree.root = Some(root);
        }

        debug!(points = points.len(), nodes = tree.nodes.len(), "built kd-tree");
        Ok(tree)
    }

    /// Build a tree from a point cloud
    pub fn from_cloud(cloud: &PointCloud<Point3f>) -> Result<Self> {
        Self::new(&cloud.points)
    }

    /// Number of indexed points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The indexed points, in their original order
    pub fn points(&self) -> &[Point3f] {
        &self.points
    }

    fn build_node(&mut self, start: usize, end: usize) -> usize {
        let count = end - start;
        let (axis, extent) = self.widest_axis(start, end);

        if count <= LEAF_SIZE || extent <= 0.0 {
            self.nodes.push(Node::Leaf { start, end });
            return self.nodes.len() - 1;
        }

        let mid = start + count / 2;
        let points = &self.points;
        self.order[start..end].select_nth_unstable_by(count / 2, |&a, &b| {
            points[a][axis]
                .total_cmp(&points[b][axis])
                .then(a.cmp(&b))
        });
        let value = self.points[self.order[mid]][axis];

        // Reserve the slot so children land after their parent
        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf { start, end });
        let left = self.build_node(start, mid);
        let right = self.build_node(mid, end);
        self.nodes[slot] = Node::Split { axis, value, left, right };
        slot
    }

    fn widest_axis(&self, start: usize, end: usize) -> (usize, f32) {
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for &i in &self.order[start..end] {
            let p = &self.points[i];
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        (0..3)
            .map(|axis| (axis, max[axis] - min[axis]))
            .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best })
    }

    /// Indices of the `k` nearest points, closest first
    pub fn knn_indices(&self, query: &Point3f, k: usize) -> Vec<usize> {
        self.k_nearest_squared(query, k)
            .into_iter()
            .map(|c| c.index)
            .collect()
    }

    /// Radius search that reports a non-positive or non-finite radius as an error
    pub fn radius_search_checked(&self, query: &Point3f, radius: f32) -> Result<Vec<(usize, f32)>> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(Error::invalid_config(format!(
                "search radius must be positive and finite, got {}",
                radius
            )));
        }
        Ok(self.find_radius_neighbors(query, radius))
    }

    fn k_nearest_squared(&self, query: &Point3f, k: usize) -> Vec<Candidate> {
        let root = match self.root {
            Some(root) if k > 0 && is_finite_point(query) => root,
            _ => return Vec::new(),
        };

        let mut heap = BinaryHeap::with_capacity(k.min(self.points.len()) + 1);
        self.search_knn(root, query, k, &mut heap);
        heap.into_sorted_vec()
    }

    fn search_knn(&self, node: usize, query: &Point3f, k: usize, heap: &mut BinaryHeap<Candidate>) {
        match self.nodes[node] {
            Node::Leaf { start, end } => {
                for &index in &self.order[start..end] {
                    let candidate = Candidate {
                        dist_sq: (self.points[index] - query).norm_squared(),
                        index,
                    };
                    if heap.len() < k {
                        heap.push(candidate);
                    } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                        heap.pop();
                        heap.push(candidate);
                    }
                }
            }
            Node::Split { axis, value, left, right } => {
                let diff = query[axis] - value;
                let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };
                self.search_knn(near, query, k, heap);

                // Equal distances still need a visit so ties resolve by index
                let must_visit = heap.len() < k
                    || heap.peek().is_some_and(|worst| diff * diff <= worst.dist_sq);
                if must_visit {
                    self.search_knn(far, query, k, heap);
                }
            }
        }
    }

    fn search_radius(&self, node: usize, query: &Point3f, radius_sq: f32, out: &mut Vec<Candidate>) {
        match self.nodes[node] {
            Node::Leaf { start, end } => {
                for &index in &self.order[start..end] {
                    let dist_sq = (self.points[index] - query).norm_squared();
                    if dist_sq <= radius_sq {
                        out.push(Candidate { dist_sq, index });
                    }
                }
            }
            Node::Split { axis, value, left, right } => {
                let diff = query[axis] - value;
                let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };
                self.search_radius(near, query, radius_sq, out);
                if diff * diff <= radius_sq {
                    self.search_radius(far, query, radius_sq, out);
                }
            }
        }
    }
}

impl NearestNeighborSearch for KdTree {
    /// Returns `min(k, n)` neighbors sorted by distance; equal distances are
    /// ordered by ascending point index. A NaN query returns nothing.
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        self.k_nearest_squared(query, k)
            .into_iter()
            .map(|c| (c.index, c.dist_sq.sqrt()))
            .collect()
    }

    /// Returns every point with `distance <= radius`, sorted by distance then
    /// index. A radius that is not positive and finite returns nothing; use
    /// [`KdTree::radius_search_checked`] to get an error instead.
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        let root = match self.root {
            Some(root) if radius.is_finite() && radius > 0.0 && is_finite_point(query) => root,
            _ => return Vec::new(),
        };

        let mut found = Vec::new();
        self.search_radius(root, query, radius * radius, &mut found);
        found.sort_unstable();
        found.into_iter().map(|c| (c.index, c.dist_sq.sqrt())).collect()
    }
}

/// A neighbor candidate ordered by squared distance, then index
#[derive(Debug, Clone, Copy)]
struct Candidate {
    dist_sq: f32,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist_sq
            .total_cmp(&other.dist_sq)
            .then(self.index.cmp(&other.index))
    }
}

/// Simple brute force nearest neighbor search for small datasets
///
/// Same ordering contract as [`KdTree`]; used as the reference the tree is
/// checked against.
pub struct BruteForceSearch {
    points: Vec<Point3f>,
}

impl BruteForceSearch {
    pub fn new(points: &[Point3f]) -> Self {
        Self {
            points: points.to_vec(),
        }
    }

    fn all_sorted(&self, query: &Point3f) -> Vec<Candidate> {
        let mut all: Vec<Candidate> = self.points
            .iter()
            .enumerate()
            .map(|(index, point)| Candidate {
                dist_sq: (point - query).norm_squared(),
                index,
            })
            .collect();
        all.sort_unstable();
        all
    }
}

impl NearestNeighborSearch for BruteForceSearch {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        if !is_finite_point(query) {
            return Vec::new();
        }
        self.all_sorted(query)
            .into_iter()
            .take(k)
            .map(|c| (c.index, c.dist_sq.sqrt()))
            .collect()
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        if !(radius.is_finite() && radius > 0.0) || !is_finite_point(query) {
            return Vec::new();
        }
        let radius_sq = radius * radius;
        self.all_sorted(query)
            .into_iter()
            .take_while(|c| c.dist_sq <= radius_sq)
            .map(|c| (c.index, c.dist_sq.sqrt()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(n: usize, seed: u64) -> Vec<Point3f> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                Point3f::new(
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                )
            })
            .collect()
    }

    #[test]
    fn test_knn_returns_expected_neighbors() {
        let points = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(2.0, 0.0, 0.0),
            Point3f::new(10.0, 0.0, 0.0),
        ];
        let tree = KdTree::new(&points).unwrap();
        let result = tree.find_k_nearest(&Point3f::new(0.2, 0.0, 0.0), 2);
        assert_eq!(result.iter().map(|r| r.0).collect::<Vec<_>>(), vec![0, 1]);
        assert!((result[0].1 - 0.2).abs() < 1e-6);
        assert!((result[1].1 - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_knn_k_larger_than_cloud() {
        let points = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(2.0, 0.0, 0.0),
        ];
        let tree = KdTree::new(&points).unwrap();
        assert_eq!(tree.find_k_nearest(&Point3f::origin(), 100).len(), 3);
    }

    #[test]
    fn test_knn_k_zero_and_empty() {
        let tree = KdTree::new(&[Point3f::new(1.0, 2.0, 3.0)]).unwrap();
        assert!(tree.find_k_nearest(&Point3f::origin(), 0).is_empty());

        let empty = KdTree::new(&[]).unwrap();
        assert!(empty.is_empty());
        assert!(empty.find_k_nearest(&Point3f::origin(), 5).is_empty());
        assert!(empty.find_radius_neighbors(&Point3f::origin(), 5.0).is_empty());
    }

    #[test]
    fn test_knn_nan_query() {
        let tree = KdTree::new(&[Point3f::new(1.0, 2.0, 3.0)]).unwrap();
        let query = Point3f::new(f32::NAN, 0.0, 0.0);
        assert!(tree.find_k_nearest(&query, 1).is_empty());
    }

    #[test]
    fn test_build_rejects_non_finite() {
        let points = vec![Point3f::new(0.0, 0.0, 0.0), Point3f::new(f32::INFINITY, 0.0, 0.0)];
        match KdTree::new(&points) {
            Err(Error::IndexBuildFailure(msg)) => assert!(msg.contains("point 1")),
            other => panic!("expected IndexBuildFailure, got {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn test_all_identical_points() {
        let points = vec![Point3f::new(1.0, 1.0, 1.0); 500];
        let tree = KdTree::new(&points).unwrap();
        let result = tree.find_k_nearest(&Point3f::new(1.0, 1.0, 1.0), 5);
        // Ties resolve to the lowest indices
        assert_eq!(result.iter().map(|r| r.0).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert!(result.iter().all(|r| r.1 == 0.0));
        assert_eq!(tree.find_radius_neighbors(&Point3f::origin(), 2.0).len(), 500);
    }

    #[test]
    fn test_collinear_points_match_brute_force() {
        let points: Vec<Point3f> = (0..300).map(|i| Point3f::new(i as f32 * 0.5, 0.0, 0.0)).collect();
        let tree = KdTree::new(&points).unwrap();
        let brute = BruteForceSearch::new(&points);
        let query = Point3f::new(37.3, 1.0, 0.0);
        assert_eq!(tree.find_k_nearest(&query, 12), brute.find_k_nearest(&query, 12));
    }

    #[test]
    fn test_duplicate_ties_break_by_index() {
        // Two copies at equal distance on opposite sides of the split
        let mut points = random_points(100, 3);
        points.push(Point3f::new(20.0, 0.0, 0.0));
        points.push(Point3f::new(-20.0, 0.0, 0.0));
        points.push(Point3f::new(20.0, 0.0, 0.0));
        let tree = KdTree::new(&points).unwrap();
        let brute = BruteForceSearch::new(&points);
        let query = Point3f::new(0.0, 30.0, 0.0);
        assert_eq!(tree.find_k_nearest(&query, 3), brute.find_k_nearest(&query, 3));
    }

    #[test]
    fn test_knn_matches_brute_force_random() {
        let points = random_points(2000, 42);
        let tree = KdTree::new(&points).unwrap();
        let brute = BruteForceSearch::new(&points);

        for query in random_points(50, 7) {
            for k in [1, 3, 10, 40] {
                assert_eq!(tree.find_k_nearest(&query, k), brute.find_k_nearest(&query, k));
            }
        }
    }

    #[test]
    fn test_radius_matches_brute_force_random() {
        let points = random_points(2000, 11);
        let tree = KdTree::new(&points).unwrap();
        let brute = BruteForceSearch::new(&points);

        for query in random_points(30, 5) {
            let expected = brute.find_radius_neighbors(&query, 2.5);
            let got = tree.find_radius_neighbors(&query, 2.5);
            assert_eq!(got, expected);
            assert!(got.windows(2).all(|w| w[0].1 <= w[1].1));
        }
    }

    #[test]
    fn test_radius_search_exact_boundary() {
        let points = vec![Point3f::new(1.0, 0.0, 0.0), Point3f::new(5.0, 0.0, 0.0)];
        let tree = KdTree::new(&points).unwrap();
        let found = tree.find_radius_neighbors(&Point3f::origin(), 1.0);
        assert_eq!(found, vec![(0, 1.0)]);
    }

    #[test]
    fn test_radius_search_invalid_radius() {
        let tree = KdTree::new(&[Point3f::origin()]).unwrap();
        assert!(tree.find_radius_neighbors(&Point3f::origin(), 0.0).is_empty());
        assert!(tree.find_radius_neighbors(&Point3f::origin(), -1.0).is_empty());
        assert!(matches!(
            tree.radius_search_checked(&Point3f::origin(), 0.0),
            Err(Error::InvalidConfig(_))
        ));
        assert_eq!(tree.radius_search_checked(&Point3f::origin(), 1.0).unwrap().len(), 1);
    }

    #[test]
    fn test_tree_is_a_snapshot() {
        let mut cloud = PointCloud::from_points(vec![Point3f::origin(), Point3f::new(1.0, 0.0, 0.0)]);
        let tree = KdTree::from_cloud(&cloud).unwrap();
        cloud[1] = Point3f::new(100.0, 0.0, 0.0);
        assert_eq!(tree.points()[1], Point3f::new(1.0, 0.0, 0.0));
        assert_eq!(tree.knn_indices(&Point3f::new(0.9, 0.0, 0.0), 1), vec![1]);
    }
}

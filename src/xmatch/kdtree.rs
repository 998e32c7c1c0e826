//! KD-tree over unit vectors for nearest-neighbour sky matching.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    /// Index into the point list the tree was built from.
    pub index: usize,
    /// Squared chord length to the query.
    pub dist_sq: f64,
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        axis: usize,
        value: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        start: usize,
        end: usize,
    },
}

const LEAF_SIZE: usize = 16;

pub struct KdTree {
    nodes: Vec<Node>,
    points: Vec<[f64; 3]>,
    ids: Vec<usize>,
}

impl KdTree {
    pub fn build(points: &[[f64; 3]]) -> Self {
        let mut order: Vec<usize> = (0..points.len()).collect();
        let mut tree = KdTree {
            nodes: Vec::new(),
            points: Vec::with_capacity(points.len()),
            ids: Vec::with_capacity(points.len()),
        };
        if !points.is_empty() {
            tree.split(points, &mut order, 0);
        }
        tree
    }

    /// Recursively partition `order`, appending leaves in tree order.
    fn split(&mut self, source: &[[f64; 3]], order: &mut [usize], offset: usize) -> usize {
        let node = self.nodes.len();
        if order.len() <= LEAF_SIZE {
            for &i in order.iter() {
                self.points.push(source[i]);
                self.ids.push(i);
            }
            self.nodes.push(Node::Leaf {
                start: offset,
                end: offset + order.len(),
            });
            return node;
        }

        let axis = widest_axis(source, order);
        let mid = order.len() / 2;
        order.select_nth_unstable_by(mid, |&a, &b| source[a][axis].total_cmp(&source[b][axis]));
        let value = source[order[mid]][axis];

        self.nodes.push(Node::Leaf { start: 0, end: 0 });
        let (lo, hi) = order.split_at_mut(mid);
        let left = self.split(source, lo, offset);
        let right = self.split(source, hi, offset + mid);
        self.nodes[node] = Node::Split {
            axis,
            value,
            left,
            right,
        };
        node
    }

    /// Closest point with squared chord length at most `max_dist_sq`.
    pub fn nearest_within(&self, query: &[f64; 3], max_dist_sq: f64) -> Option<Neighbour> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut best: Option<Neighbour> = None;
        let mut bound = max_dist_sq;
        self.search(0, query, &mut bound, &mut best);
        best
    }

    fn search(&self, node: usize, q: &[f64; 3], bound: &mut f64, best: &mut Option<Neighbour>) {
        match self.nodes[node] {
            Node::Leaf { start, end } => {
                for i in start..end {
                    let d = dist_sq(q, &self.points[i]);
                    let closer = match best {
                        Some(b) => d < b.dist_sq || (d == b.dist_sq && self.ids[i] < b.index),
                        None => d <= *bound,
                    };
                    if closer {
                        *bound = d;
                        *best = Some(Neighbour {
                            index: self.ids[i],
                            dist_sq: d,
                        });
                    }
                }
            }
            Node::Split {
                axis,
                value,
                left,
                right,
            } => {
                let diff = q[axis] - value;
                let (near, far) = if diff <= 0.0 { (left, right) } else { (right, left) };
                self.search(near, q, bound, best);
                if diff * diff <= *bound {
                    self.search(far, q, bound, best);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn widest_axis(points: &[[f64; 3]], order: &[usize]) -> usize {
    (0..3)
        .map(|axis| {
            let (lo, hi) = order.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                (lo.min(points[i][axis]), hi.max(points[i][axis]))
            });
            (axis, hi - lo)
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map_or(0, |(axis, _)| axis)
}

#[inline]
fn dist_sq(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (0..3).map(|i| (a[i] - b[i]) * (a[i] - b[i])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_brute_force() {
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut rng = || -> f64 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state as f64) / (u64::MAX as f64) * 2.0 - 1.0
        };

        let points: Vec<[f64; 3]> = (0..700).map(|_| [rng(), rng(), rng()]).collect();
        let tree = KdTree::build(&points);
        assert_eq!(tree.len(), 700);

        for _ in 0..200 {
            let q = [rng(), rng(), rng()];
            let radius_sq = 0.05;
            let brute = points
                .iter()
                .enumerate()
                .map(|(i, p)| (i, dist_sq(&q, p)))
                .filter(|(_, d)| *d <= radius_sq)
                .min_by(|a, b| a.1.total_cmp(&b.1));
            let found = tree.nearest_within(&q, radius_sq);
            assert_eq!(found.map(|n| n.index), brute.map(|b| b.0));
        }
    }

    #[test]
    fn empty_tree_finds_nothing() {
        let tree = KdTree::build(&[]);
        assert!(tree.is_empty());
        assert!(tree.nearest_within(&[1.0, 0.0, 0.0], 1.0).is_none());
    }
}

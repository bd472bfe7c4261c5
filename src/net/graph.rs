//! # Layer Graph Traversal
//!
//! The dumped graph is an adjacency matrix over layer indices. Walking it
//! depth-first from the input layer yields the order in which layers are
//! written and the parent each layer reads from.

use super::NetError;
use ndarray::{Array2, ArrayD, Ix2};

/// Directed layer graph. `has_edge(v, w)` means layer `v` feeds layer `w`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjacencyMatrix {
    edges: Array2<bool>,
}

/// A layer attached to the network during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub node: usize,
    /// The node whose output blob this node reads.
    pub parent: usize,
}

/// Result of a traversal from node 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Attached nodes in preorder. Node 0 is not included.
    pub attachments: Vec<Attachment>,
    /// Nodes never reached from node 0, in index order.
    pub unreachable: Vec<usize>,
}

// One level of the explicit DFS stack.
struct Frame {
    node: usize,
    next_child: usize,
}

impl AdjacencyMatrix {
    /// Builds the graph from a loaded array. An entry counts as an edge
    /// only when it is exactly `1`.
    pub fn from_array(array: &ArrayD<f64>) -> Result<Self, NetError> {
        let matrix = array
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| NetError::NotSquare(array.shape().to_vec()))?;
        if matrix.nrows() != matrix.ncols() {
            return Err(NetError::NotSquare(array.shape().to_vec()));
        }
        Ok(AdjacencyMatrix {
            edges: matrix.mapv(|x| x == 1.0),
        })
    }

    /// Builds a graph of `size` nodes from an edge list.
    pub fn from_edges(size: usize, edges: &[(usize, usize)]) -> Result<Self, NetError> {
        let mut matrix = Array2::from_elem((size, size), false);
        for &(v, w) in edges {
            if v >= size || w >= size {
                return Err(NetError::EdgeOutOfRange { from: v, to: w, size });
            }
            matrix[[v, w]] = true;
        }
        Ok(AdjacencyMatrix { edges: matrix })
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.edges.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        self.edges.get([from, to]).copied().unwrap_or(false)
    }

    /// Successors of `node` in increasing index order.
    pub fn children(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(move |&w| self.has_edge(node, w))
    }

    /// Depth-first traversal from node 0.
    ///
    /// A node is marked when entered. Its children are scanned in index
    /// order, and a child is taken only if it is still unmarked when the
    /// scan reaches it, so the subtree of an earlier sibling is complete
    /// before a later sibling is considered. A node with several parents
    /// is attached to the first one that reaches it.
    pub fn plan(&self) -> Plan {
        let n = self.len();
        let mut plan = Plan::default();
        if n == 0 {
            return plan;
        }

        let mut marked = vec![false; n];
        marked[0] = true;
        let mut stack = vec![Frame { node: 0, next_child: 0 }];

        while let Some(frame) = stack.last_mut() {
            let v = frame.node;
            let next = (frame.next_child..n).find(|&w| self.edges[[v, w]] && !marked[w]);
            match next {
                Some(w) => {
                    frame.next_child = w + 1;
                    marked[w] = true;
                    plan.attachments.push(Attachment { node: w, parent: v });
                    stack.push(Frame { node: w, next_child: 0 });
                }
                None => {
                    stack.pop();
                }
            }
        }

        plan.unreachable = (0..n).filter(|&v| !marked[v]).collect();
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn nodes(plan: &Plan) -> Vec<(usize, usize)> {
        plan.attachments.iter().map(|a| (a.node, a.parent)).collect()
    }

    #[test]
    fn test_chain() {
        let g = AdjacencyMatrix::from_edges(4, &[(0, 1), (1, 2), (2, 3)]).unwrap();
        let plan = g.plan();
        assert_eq!(nodes(&plan), vec![(1, 0), (2, 1), (3, 2)]);
        assert!(plan.unreachable.is_empty());
    }

    #[test]
    fn test_earlier_sibling_subtree_first() {
        // 0 -> 1 -> 3, 0 -> 2: node 3 is reached through 1 before 2 is scanned.
        let g = AdjacencyMatrix::from_edges(4, &[(0, 1), (0, 2), (1, 3)]).unwrap();
        assert_eq!(nodes(&g.plan()), vec![(1, 0), (3, 1), (2, 0)]);
    }

    #[test]
    fn test_shared_child_attaches_to_first_parent() {
        // Diamond 0 -> {1, 2} -> 3.
        let g = AdjacencyMatrix::from_edges(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]).unwrap();
        assert_eq!(nodes(&g.plan()), vec![(1, 0), (3, 1), (2, 0)]);
    }

    #[test]
    fn test_child_marked_by_sibling_is_skipped() {
        // 0 -> {1, 2}, 1 -> 2: node 2 is entered from 1, then skipped from 0.
        let g = AdjacencyMatrix::from_edges(3, &[(0, 1), (0, 2), (1, 2)]).unwrap();
        assert_eq!(nodes(&g.plan()), vec![(1, 0), (2, 1)]);
    }

    #[test]
    fn test_unreachable_and_cycles() {
        let g = AdjacencyMatrix::from_edges(4, &[(0, 1), (1, 0), (1, 1), (3, 2)]).unwrap();
        let plan = g.plan();
        assert_eq!(nodes(&plan), vec![(1, 0)]);
        assert_eq!(plan.unreachable, vec![2, 3]);
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let n = 5_000;
        let edges: Vec<(usize, usize)> = (0..n - 1).map(|i| (i, i + 1)).collect();
        let g = AdjacencyMatrix::from_edges(n, &edges).unwrap();
        assert_eq!(g.plan().attachments.len(), n - 1);
    }

    #[test]
    fn test_from_array_only_ones_are_edges() {
        let array = ArrayD::from_shape_vec(IxDyn(&[3, 3]), vec![0., 1., 2., 0., 0., 1., 0.5, 0., 0.]).unwrap();
        let g = AdjacencyMatrix::from_array(&array).unwrap();
        assert!(g.has_edge(0, 1));
        assert!(!g.has_edge(0, 2));
        assert!(g.has_edge(1, 2));
        assert!(!g.has_edge(2, 0));
        assert_eq!(g.children(0).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_from_array_rejects_non_square() {
        let array = ArrayD::<f64>::zeros(IxDyn(&[2, 3]));
        assert!(matches!(AdjacencyMatrix::from_array(&array), Err(NetError::NotSquare(_))));
        let array = ArrayD::<f64>::zeros(IxDyn(&[4]));
        assert!(AdjacencyMatrix::from_array(&array).is_err());
    }
}

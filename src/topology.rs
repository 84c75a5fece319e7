//! # Time-calibrated tree topology
//!
//! The Sample Index does not know how nodes are connected: topology questions are answered by a
//! [`TreeLookup`], keyed by the normalized tree name and the tree-local node id used in the
//! sample tables.
//!
//! [`TimeTree`] and [`TreeSet`] provide an in-memory implementation, loadable from a TSV table
//! with the fields `tree`, `node`, `parent`, `age` (a negative parent marks the root).
use std::collections::{BTreeMap, VecDeque};
use std::io::Read;

use tracing::info;

use crate::constants::{normalize_tree_name, FastHashMap, NodeId, Years};
use crate::stochmap_errors::StochMapError;
use crate::tsv::{tsv_reader, HeaderIndex};

/// Read-only topology queries.
pub trait TreeLookup: Sync {
    fn has_tree(&self, tree: &str) -> bool;

    fn has_node(&self, tree: &str, node: NodeId) -> bool;

    fn root(&self, tree: &str) -> Option<NodeId>;

    fn is_root(&self, tree: &str, node: NodeId) -> bool {
        self.root(tree) == Some(node)
    }

    fn parent(&self, tree: &str, node: NodeId) -> Option<NodeId>;

    fn children(&self, tree: &str, node: NodeId) -> &[NodeId];

    /// Age of the node, in years.
    fn node_age(&self, tree: &str, node: NodeId) -> Option<Years>;

    /// Duration of the branch leading to `node` (years), `None` for the root.
    fn branch_length(&self, tree: &str, node: NodeId) -> Option<Years> {
        let parent = self.parent(tree, node)?;
        Some(self.node_age(tree, parent)? - self.node_age(tree, node)?)
    }

    /// Nodes in post-order (children before parents).
    fn post_order(&self, tree: &str) -> Vec<NodeId> {
        let Some(root) = self.root(tree) else {
            return Vec::new();
        };
        let mut order = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((n, expanded)) = stack.pop() {
            if expanded {
                order.push(n);
                continue;
            }
            stack.push((n, true));
            for &c in self.children(tree, n).iter().rev() {
                stack.push((c, false));
            }
        }
        order
    }
}

#[derive(Debug, Clone)]
struct TreeNode {
    parent: Option<NodeId>,
    age: Years,
    children: Vec<NodeId>,
}

/// A single time-calibrated tree.
#[derive(Debug, Clone)]
pub struct TimeTree {
    name: String,
    root: NodeId,
    nodes: BTreeMap<NodeId, TreeNode>,
}

impl TimeTree {
    /// Start a tree with its root node.
    pub fn new(name: &str, root: NodeId, root_age: Years) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            root,
            TreeNode {
                parent: None,
                age: root_age,
                children: Vec::new(),
            },
        );
        TimeTree {
            name: normalize_tree_name(name),
            root,
            nodes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Add a node below an existing parent.
    ///
    /// Return
    /// ----------
    /// * `Err(StochMapError::InvalidTopology)` if the node already exists, the parent is
    ///   unknown, or the node is older than its parent.
    pub fn add_node(
        &mut self,
        id: NodeId,
        parent: NodeId,
        age: Years,
    ) -> Result<(), StochMapError> {
        if self.nodes.contains_key(&id) {
            return Err(StochMapError::InvalidTopology(format!(
                "tree {}: node {id} already defined",
                self.name
            )));
        }
        let p = self.nodes.get_mut(&parent).ok_or_else(|| {
            StochMapError::InvalidTopology(format!(
                "tree {}: parent {parent} of node {id} not found",
                self.name
            ))
        })?;
        if age > p.age {
            return Err(StochMapError::InvalidTopology(format!(
                "tree {}: node {id} ({age}) older than its parent {parent} ({})",
                self.name, p.age
            )));
        }
        p.children.push(id);
        self.nodes.insert(
            id,
            TreeNode {
                parent: Some(parent),
                age,
                children: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }
}

/// Collection of trees keyed by normalized name.
#[derive(Debug, Clone, Default)]
pub struct TreeSet {
    trees: FastHashMap<String, TimeTree>,
}

impl TreeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tree: TimeTree) {
        self.trees.insert(tree.name.clone(), tree);
    }

    pub fn get(&self, name: &str) -> Option<&TimeTree> {
        self.trees.get(name)
    }

    /// Tree names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.trees.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Read a topology table (`tree`, `node`, `parent`, `age`).
    ///
    /// Rows may come in any order; a negative `parent` marks the root of a tree.
    pub fn from_reader<R: Read>(r: R, source_name: &str) -> Result<Self, StochMapError> {
        let mut rdr = tsv_reader(r);
        let head = HeaderIndex::new(&mut rdr, source_name)?;
        let tree_col = head.require("tree")?;
        let node_col = head.require("node")?;
        let parent_col = head.require("parent")?;
        let age_col = head.require("age")?;

        // tree -> node -> (parent, age)
        let mut raw: BTreeMap<String, BTreeMap<NodeId, (i64, Years)>> = BTreeMap::new();
        let mut rec = csv::StringRecord::new();
        while rdr.read_record(&mut rec)? {
            let name = normalize_tree_name(head.cell(&rec, tree_col));
            if name.is_empty() {
                continue;
            }
            let node: NodeId = head.parse(&rec, node_col, "node")?;
            let parent: i64 = head.parse(&rec, parent_col, "parent")?;
            let age: Years = head.parse(&rec, age_col, "age")?;
            raw.entry(name).or_default().insert(node, (parent, age));
        }

        let mut set = TreeSet::new();
        for (name, nodes) in raw {
            let roots: Vec<NodeId> = nodes
                .iter()
                .filter(|(_, (p, _))| *p < 0)
                .map(|(&n, _)| n)
                .collect();
            let [root] = roots[..] else {
                return Err(StochMapError::InvalidTopology(format!(
                    "{source_name}: tree {name}: expecting a single root, found {}",
                    roots.len()
                )));
            };
            let mut tree = TimeTree::new(&name, root, nodes[&root].1);

            // children by increasing id
            let mut children: FastHashMap<i64, Vec<NodeId>> = FastHashMap::default();
            for (&n, &(parent, _)) in &nodes {
                if parent >= 0 {
                    children.entry(parent).or_default().push(n);
                }
            }

            // attach nodes breadth-first so parents always exist
            let mut queue = VecDeque::from([root]);
            while let Some(p) = queue.pop_front() {
                for &n in children.get(&(p as i64)).map_or(&[][..], Vec::as_slice) {
                    tree.add_node(n, p, nodes[&n].1)?;
                    queue.push_back(n);
                }
            }
            if tree.len() != nodes.len() {
                return Err(StochMapError::InvalidTopology(format!(
                    "{source_name}: tree {name}: {} nodes not connected to the root",
                    nodes.len() - tree.len()
                )));
            }
            set.insert(tree);
        }

        info!(source = source_name, trees = set.trees.len(), "trees loaded");
        Ok(set)
    }
}

impl TreeLookup for TreeSet {
    fn has_tree(&self, tree: &str) -> bool {
        self.trees.contains_key(tree)
    }

    fn has_node(&self, tree: &str, node: NodeId) -> bool {
        self.get(tree).is_some_and(|t| t.nodes.contains_key(&node))
    }

    fn root(&self, tree: &str) -> Option<NodeId> {
        self.get(tree).map(|t| t.root)
    }

    fn parent(&self, tree: &str, node: NodeId) -> Option<NodeId> {
        self.get(tree)?.nodes.get(&node)?.parent
    }

    fn children(&self, tree: &str, node: NodeId) -> &[NodeId] {
        self.get(tree)
            .and_then(|t| t.nodes.get(&node))
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    fn node_age(&self, tree: &str, node: NodeId) -> Option<Years> {
        self.get(tree)?.nodes.get(&node).map(|n| n.age)
    }
}

//! Sponsor-chain and team traversal over an in-memory snapshot.

use std::collections::{HashMap, HashSet};

use crate::domain::entities::Node;

/// Guest purchases attribute commissions this many hops up.
pub const DEFAULT_UPLINE_DEPTH: usize = 3;

/// Upper bound for partner purchases in extended mode.
pub const MAX_UPLINE_DEPTH: usize = 5;

/// id → node lookup over a snapshot. The first record wins when ids collide.
#[derive(Debug)]
pub struct GraphIndex<'a> {
    by_id: HashMap<&'a str, &'a Node>,
}

impl<'a> GraphIndex<'a> {
    pub fn new(nodes: &'a [Node]) -> Self {
        let mut by_id = HashMap::with_capacity(nodes.len());
        for node in nodes {
            by_id.entry(node.id.as_str()).or_insert(node);
        }
        Self { by_id }
    }

    pub fn get(&self, id: &str) -> Option<&'a Node> {
        self.by_id.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.by_id.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Ancestor ids of `node_id`, nearest first, at most `max_depth` long.
    ///
    /// Stops at the first missing or unresolvable sponsor and at the first id
    /// already seen (the start node included), so corrupted input cannot loop.
    pub fn upline(&self, node_id: &str, max_depth: usize) -> Vec<String> {
        let mut chain = Vec::new();
        let Some(mut current) = self.get(node_id) else {
            return chain;
        };
        let mut seen: HashSet<&str> = HashSet::from([current.id.as_str()]);

        while chain.len() < max_depth {
            let Some(sponsor_id) = current.sponsor_id.as_deref() else {
                break;
            };
            if !seen.insert(sponsor_id) {
                break;
            }
            let Some(sponsor) = self.get(sponsor_id) else {
                break;
            };
            chain.push(sponsor.id.clone());
            current = sponsor;
        }
        chain
    }

    /// Team of `node_id` as a tree, `max_depth` levels deep.
    ///
    /// Unknown team entries are skipped; an id is expanded at most once.
    pub fn downline(&self, node_id: &str, max_depth: usize) -> Option<Downline> {
        let root = self.get(node_id)?;
        let mut seen = HashSet::from([root.id.as_str()]);
        Some(self.expand(root, max_depth, &mut seen))
    }

    fn expand(&self, node: &'a Node, depth_left: usize, seen: &mut HashSet<&'a str>) -> Downline {
        let mut children = Vec::new();
        if depth_left > 0 {
            for child_id in &node.team {
                let Some(child) = self.get(child_id) else {
                    continue;
                };
                if !seen.insert(child.id.as_str()) {
                    continue;
                }
                children.push(self.expand(child, depth_left - 1, seen));
            }
        }
        Downline {
            id: node.id.clone(),
            children,
        }
    }
}

/// A node and its (bounded) team subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downline {
    pub id: String,
    pub children: Vec<Downline>,
}

impl Downline {
    /// Number of nodes below this one.
    pub fn size(&self) -> usize {
        self.children.iter().map(|c| 1 + c.size()).sum()
    }
}

/// Ancestor chain of `node_id` in `nodes`, at most `max_depth` ids.
pub fn find_upline(node_id: &str, nodes: &[Node], max_depth: usize) -> Vec<String> {
    GraphIndex::new(nodes).upline(node_id, max_depth)
}

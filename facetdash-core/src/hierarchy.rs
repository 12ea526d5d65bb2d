//! Three-level taxonomy tree with union-count rollups.
//!
//! Nodes live in an arena ([`FacetTaxonomy::node`] by [`NodeId`]); a parent is
//! always stored before its children, which lets leaf sets be computed in a
//! single reverse pass.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::counts::{CountIndex, Postings};
use crate::filtering::FilterState;
use crate::models::TaxonomyRow;
use crate::tokens::{normalize_key, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Level {
    L1,
    L2,
    L3,
}

impl Level {
    fn child(self) -> Option<Level> {
        match self {
            Level::L1 => Some(Level::L2),
            Level::L2 => Some(Level::L3),
            Level::L3 => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::L1 => write!(f, "L1"),
            Level::L2 => write!(f, "L2"),
            Level::L3 => write!(f, "L3"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxonomyNode {
    pub level: Level,
    pub name: String,
    pub key: String,
    /// First description seen for this node in the reference table.
    pub description: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Leaf tokens summarized by this node: itself when it has no children,
    /// otherwise the union of its descendants' leaves.
    pub leaf_tokens: Vec<Token>,
}

impl TaxonomyNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn leaf_keys(&self) -> impl Iterator<Item = &str> {
        self.leaf_tokens.iter().map(|t| t.key.as_str())
    }
}

/// Where per-leaf incidence comes from.
#[derive(Debug, Clone, Copy)]
pub enum Incidence<'a> {
    /// Entity-ID sets per leaf; rollups are exact union counts.
    Postings(&'a Postings),
    /// Leaf counts only; rollups sum them and may overcount entities that
    /// carry several leaves under the same node.
    Totals(&'a CountIndex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RollupCount {
    pub count: usize,
    /// False when the count is a sum over leaves that may double count.
    pub exact: bool,
}

/// How much of a node's leaf set is currently selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSelection {
    None,
    Partial,
    All,
}

#[derive(Debug, Clone, Default)]
pub struct FacetTaxonomy {
    nodes: Vec<TaxonomyNode>,
    roots: Vec<NodeId>,
    index: HashMap<(Option<NodeId>, String), NodeId>,
}

impl FacetTaxonomy {
    /// Build the L1 → L2 → L3 tree from flat reference rows.
    ///
    /// Rows with a blank L1 are skipped. An L3 cell without an L2 is attached
    /// directly under L1 as a second-level node.
    pub fn from_rows(rows: &[TaxonomyRow]) -> Self {
        let mut taxonomy = FacetTaxonomy::default();

        for row in rows {
            if normalize_key(&row.l1).is_empty() {
                tracing::warn!(row = ?row, "skipping taxonomy row without L1");
                continue;
            }

            let cells: Vec<&str> = [Some(row.l1.as_str()), row.l2.as_deref(), row.l3.as_deref()]
                .into_iter()
                .flatten()
                .filter(|c| !normalize_key(c).is_empty())
                .collect();

            let mut parent: Option<NodeId> = None;
            let mut level = Level::L1;
            for (depth, name) in cells.iter().enumerate() {
                let id = taxonomy.find_or_insert(parent, level, name);
                if depth + 1 == cells.len() {
                    taxonomy.describe(id, row.description.as_deref());
                }
                parent = Some(id);
                match level.child() {
                    Some(next) => level = next,
                    None => break,
                }
            }
        }

        taxonomy.compute_leaf_tokens();
        tracing::debug!(
            nodes = taxonomy.nodes.len(),
            roots = taxonomy.roots.len(),
            "built taxonomy"
        );
        taxonomy
    }

    fn find_or_insert(&mut self, parent: Option<NodeId>, level: Level, name: &str) -> NodeId {
        let key = normalize_key(name);
        if let Some(id) = self.index.get(&(parent, key.clone())) {
            return *id;
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(TaxonomyNode {
            level,
            name: name.split_whitespace().collect::<Vec<_>>().join(" "),
            key: key.clone(),
            description: None,
            parent,
            children: Vec::new(),
            leaf_tokens: Vec::new(),
        });
        self.index.insert((parent, key), id);

        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    fn describe(&mut self, id: NodeId, description: Option<&str>) {
        let node = &mut self.nodes[id.0];
        if node.description.is_none() {
            node.description = description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string);
        }
    }

    fn compute_leaf_tokens(&mut self) {
        for i in (0..self.nodes.len()).rev() {
            let leaves = if self.nodes[i].children.is_empty() {
                Token::new(&self.nodes[i].name).into_iter().collect()
            } else {
                let mut seen = HashSet::new();
                let mut leaves = Vec::new();
                for child in &self.nodes[i].children {
                    for token in &self.nodes[child.0].leaf_tokens {
                        if seen.insert(token.key.clone()) {
                            leaves.push(token.clone());
                        }
                    }
                }
                leaves
            };
            self.nodes[i].leaf_tokens = leaves;
        }
    }

    pub fn node(&self, id: NodeId) -> &TaxonomyNode {
        &self.nodes[id.0]
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find a node by name, preferring shallower levels.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        let key = normalize_key(name);
        [Level::L1, Level::L2, Level::L3].into_iter().find_map(|level| {
            self.nodes
                .iter()
                .position(|n| n.level == level && n.key == key)
                .map(NodeId)
        })
    }

    /// Find a node by its full path from L1, e.g. `["Animation", "2D Animation"]`.
    pub fn find_path(&self, path: &[&str]) -> Option<NodeId> {
        let mut parent = None;
        for name in path {
            let id = *self.index.get(&(parent, normalize_key(name)))?;
            parent = Some(id);
        }
        parent
    }

    /// Every distinct leaf token in the taxonomy, in tree order.
    pub fn leaves(&self) -> Vec<Token> {
        let mut seen = HashSet::new();
        self.roots
            .iter()
            .flat_map(|r| self.nodes[r.0].leaf_tokens.iter())
            .filter(|t| seen.insert(t.key.clone()))
            .cloned()
            .collect()
    }

    /// Entity count of a node.
    ///
    /// With postings this is the size of the union of the leaves' entity
    /// sets. With totals only it falls back to the sum of leaf counts, which
    /// is exact only for single-leaf nodes.
    pub fn rollup(&self, id: NodeId, incidence: Incidence<'_>) -> RollupCount {
        let node = self.node(id);
        match incidence {
            Incidence::Postings(postings) => RollupCount {
                count: postings.union_count(node.leaf_keys()),
                exact: true,
            },
            Incidence::Totals(counts) => RollupCount {
                count: node.leaf_keys().map(|k| counts.count(k)).sum(),
                exact: node.leaf_tokens.len() <= 1,
            },
        }
    }

    /// Depth-first `(node, depth)` pairs, roots at depth 0.
    pub fn flatten(&self) -> Vec<(NodeId, usize)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for root in &self.roots {
            self.flatten_node(*root, 0, &mut out);
        }
        out
    }

    fn flatten_node(&self, id: NodeId, depth: usize, out: &mut Vec<(NodeId, usize)>) {
        out.push((id, depth));
        for child in &self.nodes[id.0].children {
            self.flatten_node(*child, depth + 1, out);
        }
    }

    /// Toggle a node's selection.
    ///
    /// Internal nodes toggle their whole leaf set as one unit; leaves toggle
    /// only their own token.
    pub fn toggle_node(&self, id: NodeId, filters: &mut FilterState, facet: &str) {
        let node = self.node(id);
        if node.is_leaf() {
            filters.toggle(facet, &node.name);
        } else {
            filters.toggle_group(facet, node.leaf_keys());
        }
    }

    pub fn selection(&self, id: NodeId, filters: &FilterState, facet: &str) -> NodeSelection {
        let node = self.node(id);
        let selected = node
            .leaf_keys()
            .filter(|k| filters.is_selected(facet, k))
            .count();

        if selected == 0 {
            NodeSelection::None
        } else if selected == node.leaf_tokens.len() {
            NodeSelection::All
        } else {
            NodeSelection::Partial
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Entity;
    use pretty_assertions::assert_eq;

    fn rows() -> Vec<TaxonomyRow> {
        vec![
            TaxonomyRow::new("Animation", "2D Animation", "").with_description("Flat work"),
            TaxonomyRow::new("Animation", "Rigging", "").with_description("Character setup"),
            TaxonomyRow::new("Post", "Color", "Grading"),
            TaxonomyRow::new("Post", "Color", "Conform"),
            TaxonomyRow::new("Post", "Editorial", "").with_description("Offline edit"),
            TaxonomyRow::new("post", "editorial", "").with_description("Ignored later copy"),
        ]
    }

    fn animation_entities() -> Vec<Entity> {
        // 5 use 2D Animation, 4 use Rigging, 2 use both
        let mut entities = Vec::new();
        for i in 0..3 {
            entities.push(Entity::new(format!("a{}", i)).with_field("services", "2D Animation"));
        }
        for i in 0..2 {
            entities.push(Entity::new(format!("r{}", i)).with_field("services", "Rigging"));
        }
        for i in 0..2 {
            entities.push(
                Entity::new(format!("b{}", i)).with_field("services", "2D Animation, Rigging"),
            );
        }
        entities
    }

    #[test]
    fn test_tree_shape() {
        let taxonomy = FacetTaxonomy::from_rows(&rows());

        assert_eq!(taxonomy.roots().len(), 2);
        assert_eq!(taxonomy.len(), 8);

        let post = taxonomy.find("post").unwrap();
        assert_eq!(taxonomy.node(post).level, Level::L1);
        assert_eq!(taxonomy.node(post).children.len(), 2);

        let grading = taxonomy.find_path(&["Post", "Color", "Grading"]).unwrap();
        assert_eq!(taxonomy.node(grading).level, Level::L3);
        assert!(taxonomy.find_path(&["Post", "Grading"]).is_none());
    }

    #[test]
    fn test_first_description_wins() {
        let taxonomy = FacetTaxonomy::from_rows(&rows());
        let editorial = taxonomy.find("Editorial").unwrap();
        assert_eq!(
            taxonomy.node(editorial).description.as_deref(),
            Some("Offline edit")
        );
    }

    #[test]
    fn test_leaf_tokens() {
        let taxonomy = FacetTaxonomy::from_rows(&rows());

        let post = taxonomy.node(taxonomy.find("Post").unwrap());
        let leaves: Vec<_> = post.leaf_tokens.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(leaves, vec!["Grading", "Conform", "Editorial"]);

        // L2 without L3 children is its own leaf
        let rigging = taxonomy.node(taxonomy.find("Rigging").unwrap());
        assert!(rigging.is_leaf());
        assert_eq!(rigging.leaf_tokens[0].key, "rigging");
    }

    #[test]
    fn test_union_rollup_does_not_double_count() {
        let taxonomy = FacetTaxonomy::from_rows(&rows());
        let entities = animation_entities();
        let postings = Postings::build(&entities, "services");
        let counts = CountIndex::build(&entities, "services");
        let animation = taxonomy.find("Animation").unwrap();

        let exact = taxonomy.rollup(animation, Incidence::Postings(&postings));
        assert_eq!(exact, RollupCount { count: 7, exact: true });

        let approx = taxonomy.rollup(animation, Incidence::Totals(&counts));
        assert_eq!(approx, RollupCount { count: 9, exact: false });
    }

    #[test]
    fn test_single_leaf_sum_is_exact() {
        let taxonomy = FacetTaxonomy::from_rows(&rows());
        let counts = CountIndex::build(&animation_entities(), "services");
        let rigging = taxonomy.find("Rigging").unwrap();

        let rollup = taxonomy.rollup(rigging, Incidence::Totals(&counts));
        assert_eq!(rollup, RollupCount { count: 4, exact: true });
    }

    #[test]
    fn test_l3_without_l2_is_promoted() {
        let mut row = TaxonomyRow::new("Games", "", "");
        row.l3 = Some("Cinematics".to_string());
        let taxonomy = FacetTaxonomy::from_rows(&[row]);

        let cinematics = taxonomy.find("Cinematics").unwrap();
        assert_eq!(taxonomy.node(cinematics).level, Level::L2);
    }

    #[test]
    fn test_blank_l1_rows_are_skipped() {
        let taxonomy = FacetTaxonomy::from_rows(&[TaxonomyRow::new("  ", "Orphan", "")]);
        assert!(taxonomy.is_empty());
    }

    #[test]
    fn test_group_toggle_round_trip() {
        let taxonomy = FacetTaxonomy::from_rows(&rows());
        let post = taxonomy.find("Post").unwrap();
        let mut filters = FilterState::new();
        filters.toggle("services", "Rigging");
        let before = filters.clone();

        taxonomy.toggle_node(post, &mut filters, "services");
        assert_eq!(taxonomy.selection(post, &filters, "services"), NodeSelection::All);

        taxonomy.toggle_node(post, &mut filters, "services");
        assert_eq!(filters, before);
    }

    #[test]
    fn test_partial_group_selects_remaining() {
        let taxonomy = FacetTaxonomy::from_rows(&rows());
        let color = taxonomy.find("Color").unwrap();
        let grading = taxonomy.find("Grading").unwrap();
        let mut filters = FilterState::new();

        taxonomy.toggle_node(grading, &mut filters, "services");
        assert_eq!(
            taxonomy.selection(color, &filters, "services"),
            NodeSelection::Partial
        );

        taxonomy.toggle_node(color, &mut filters, "services");
        assert!(filters.is_selected("services", "grading"));
        assert!(filters.is_selected("services", "conform"));
    }

    #[test]
    fn test_flatten_is_depth_first() {
        let taxonomy = FacetTaxonomy::from_rows(&rows());
        let names: Vec<_> = taxonomy
            .flatten()
            .into_iter()
            .map(|(id, depth)| (taxonomy.node(id).name.clone(), depth))
            .collect();

        assert_eq!(names[0], ("Animation".to_string(), 0));
        assert_eq!(names[1], ("2D Animation".to_string(), 1));
        assert_eq!(names[4], ("Color".to_string(), 1));
        assert_eq!(names[5], ("Grading".to_string(), 2));
    }

    #[test]
    fn test_leaves_are_distinct() {
        let taxonomy = FacetTaxonomy::from_rows(&rows());
        assert_eq!(taxonomy.leaves().len(), 5);
    }
}

use serde::{Deserialize, Serialize};

/// Default pass weight for vote-sign stages when the node declares none.
pub const DEFAULT_PASS_WEIGHT: i32 = 50;

/// Node variants of a process definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Initiator,
    Approver,
    Cc,
    Condition,
    End,
}

/// Multi-actor coordination mode for a node's tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerformType {
    /// No coordination: one task, actors share it.
    #[default]
    Plain,
    /// Any one actor completing the shared task closes the stage.
    OrSign,
    /// Sequential: actors act one after another in list order.
    Sort,
    /// All actors must finish their own task before the stage closes.
    Countersign,
    /// Weighted vote: the stage closes once enough weight has approved.
    VoteSign,
}

/// Static assignee declared on a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeAssignee {
    pub id: String,
    pub name: String,
    pub weight: Option<i32>,
}

/// Stable index of a node inside its model's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef(pub(crate) usize);

/// One guarded branch owned by a condition node.
///
/// The wrapper itself is not part of the parent chain: the branch
/// subtree root points back at the owning condition node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionBranch {
    pub expression: Option<String>,
    pub priority: i32,
    pub child: Option<NodeRef>,
}

/// One vertex of the parsed process graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub node_type: NodeType,
    pub user_list: Vec<NodeAssignee>,
    pub role_list: Vec<NodeAssignee>,
    pub perform_type: PerformType,
    pub pass_weight: Option<i32>,
    pub parent: Option<NodeRef>,
    pub child: Option<NodeRef>,
    pub branches: Vec<ConditionBranch>,
}

impl Node {
    pub fn is_condition(&self) -> bool {
        self.node_type == NodeType::Condition
    }

    /// Effective vote threshold, defaulting to [`DEFAULT_PASS_WEIGHT`].
    pub fn pass_weight(&self) -> i32 {
        self.pass_weight.unwrap_or(DEFAULT_PASS_WEIGHT)
    }
}

/// Immutable, parsed process definition.
///
/// Nodes live in an arena and reference each other by [`NodeRef`], so
/// the graph carries both owning (parent to child) and back (child to
/// parent) links without ownership cycles. Safe to share behind `Arc`
/// and read concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessModel {
    pub name: String,
    nodes: Vec<Node>,
    root: NodeRef,
}

impl ProcessModel {
    pub(crate) fn new(name: String, nodes: Vec<Node>, root: NodeRef) -> Self {
        Self { name, nodes, root }
    }

    pub fn root(&self) -> NodeRef {
        self.root
    }

    pub fn node(&self, node_ref: NodeRef) -> &Node {
        &self.nodes[node_ref.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find a node by its unique name.
    pub fn node_by_name(&self, name: &str) -> Option<NodeRef> {
        self.nodes
            .iter()
            .position(|n| n.name == name)
            .map(NodeRef)
    }

    /// Next node to execute once `node_ref`'s own children are exhausted.
    ///
    /// Bubbles up the parent chain until a condition convergence point
    /// is found or the chain runs out. A condition parent whose
    /// straight-through child differs from the branch being exited is a
    /// convergence point; a condition parent without any
    /// straight-through child ends the path.
    pub fn next_node(&self, node_ref: NodeRef) -> Option<NodeRef> {
        let mut current = node_ref;
        loop {
            let parent_ref = self.node(current).parent?;
            let parent = self.node(parent_ref);
            if parent.node_type == NodeType::Initiator {
                return None;
            }
            if parent.is_condition() && parent.child != Some(current) {
                return parent.child;
            }
            current = parent_ref;
        }
    }
}

use crate::cache::ModelCache;
use crate::error::EngineError;
use crate::model::{
    ConditionBranch, Node, NodeAssignee, NodeRef, NodeType, PerformType, ProcessModel,
};
use crate::Result;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Cache key prefix for parsed models.
pub const MODEL_CACHE_KEY: &str = "PROCESS_MODEL:";

/// Raw process document, camelCase JSON as produced by model designers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawModel {
    name: String,
    node_config: Option<RawNode>,
}

impl Default for RawModel {
    fn default() -> Self {
        Self {
            name: String::new(),
            node_config: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawNode {
    node_name: String,
    node_type: Option<NodeType>,
    node_user_list: Vec<NodeAssignee>,
    node_role_list: Vec<NodeAssignee>,
    perform_type: PerformType,
    pass_weight: Option<i32>,
    condition_nodes: Vec<RawBranch>,
    child_node: Option<Box<RawNode>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawBranch {
    expression: Option<String>,
    priority: i32,
    child_node: Option<Box<RawNode>>,
}

/// Parses process documents into immutable [`ProcessModel`] arenas.
///
/// Cheap to clone; the cache is shared. When a process id is given and
/// `redeploy` is false, repeated lookups are served from the cache
/// without re-parsing.
#[derive(Clone)]
pub struct ModelParser {
    cache: Arc<dyn ModelCache>,
}

impl ModelParser {
    pub fn new(cache: Arc<dyn ModelCache>) -> Self {
        Self { cache }
    }

    /// Parse `content`, consulting the model cache under
    /// `"PROCESS_MODEL:" + process_id` unless redeploying.
    pub fn parse(
        &self,
        content: &str,
        process_id: Option<&str>,
        redeploy: bool,
    ) -> Result<Arc<ProcessModel>> {
        let Some(process_id) = process_id.filter(|id| !id.is_empty()) else {
            return Ok(Arc::new(Self::parse_content(content)?));
        };
        let key = format!("{MODEL_CACHE_KEY}{process_id}");
        if redeploy {
            let model = Arc::new(Self::parse_content(content)?);
            self.cache.put(&key, model.clone());
            return Ok(model);
        }
        if let Some(model) = self.cache.get(&key) {
            tracing::debug!(key, "process model cache hit");
            return Ok(model);
        }
        let model = Arc::new(Self::parse_content(content)?);
        self.cache.put(&key, model.clone());
        Ok(model)
    }

    /// Drop the cached model of `process_id`.
    pub fn invalidate(&self, process_id: &str) {
        self.cache.remove(&format!("{MODEL_CACHE_KEY}{process_id}"));
    }

    /// Parse without touching the cache.
    pub fn parse_content(content: &str) -> Result<ProcessModel> {
        if content.trim().is_empty() {
            return Err(EngineError::parse("model content is empty"));
        }
        let raw: RawModel = serde_json::from_str(content)
            .map_err(|e| EngineError::parse(format!("invalid model document: {e}")))?;
        let root_raw = raw
            .node_config
            .ok_or_else(|| EngineError::parse("process model has no start node"))?;
        if root_raw.node_type != Some(NodeType::Initiator) {
            return Err(EngineError::parse(
                "process model root must be an INITIATOR node",
            ));
        }

        let mut nodes = Vec::new();
        let mut seen = HashSet::new();
        let root = flatten(root_raw, None, &mut nodes, &mut seen)?;
        tracing::debug!(name = %raw.name, nodes = nodes.len(), "parsed process model");
        Ok(ProcessModel::new(raw.name, nodes, root))
    }
}

/// Flatten the nested document into the arena, wiring parent links in
/// the same pass. Branch subtree roots get the owning condition node as
/// parent; the branch wrapper itself never appears in the chain.
fn flatten(
    raw: RawNode,
    parent: Option<NodeRef>,
    nodes: &mut Vec<Node>,
    seen: &mut HashSet<String>,
) -> Result<NodeRef> {
    if raw.node_name.is_empty() {
        return Err(EngineError::parse("node without a name"));
    }
    if !seen.insert(raw.node_name.clone()) {
        return Err(EngineError::parse(format!(
            "duplicate node name: {}",
            raw.node_name
        )));
    }
    let node_type = raw.node_type.ok_or_else(|| {
        EngineError::parse(format!("node [{}] has no type", raw.node_name))
    })?;

    let node_ref = NodeRef(nodes.len());
    nodes.push(Node {
        name: raw.node_name,
        node_type,
        user_list: raw.node_user_list,
        role_list: raw.node_role_list,
        perform_type: raw.perform_type,
        pass_weight: raw.pass_weight,
        parent,
        child: None,
        branches: Vec::new(),
    });

    let mut branches = Vec::with_capacity(raw.condition_nodes.len());
    for raw_branch in raw.condition_nodes {
        let child = match raw_branch.child_node {
            Some(child_raw) => Some(flatten(*child_raw, Some(node_ref), nodes, seen)?),
            None => None,
        };
        branches.push(ConditionBranch {
            expression: raw_branch.expression,
            priority: raw_branch.priority,
            child,
        });
    }
    nodes[node_ref.0].branches = branches;

    if let Some(child_raw) = raw.child_node {
        let child = flatten(*child_raw, Some(node_ref), nodes, seen)?;
        nodes[node_ref.0].child = Some(child);
    }
    Ok(node_ref)
}

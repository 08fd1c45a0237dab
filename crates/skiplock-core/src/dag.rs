//! A small dynamic-dispatch graph runtime with conditional, parallel-fanout,
//! and per-item (foreach) edges. Does the same depth-first-with-parallel-fanout
//! traversal over a name-keyed node map that inspired it.
//!
//! Node values flow as `serde_json::Value` rather than a generic type
//! parameter: a node's output becomes the next node's input and the graph is
//! built dynamically at runtime, so there is no single static type to thread
//! through — this is the same role `interface{}`/`any` played in the source,
//! just made explicit instead of erased.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub type NodeFn = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;
pub type ConditionFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

#[derive(Debug, Error)]
pub enum DagError {
    #[error("node '{0}' not found")]
    NodeNotFound(String),
    #[error("foreach edge requires an array value, got {0}")]
    NotASequence(&'static str),
    #[error(transparent)]
    Node(#[from] anyhow::Error),
}

/// Wraps a synchronous transform as a [`NodeFn`] for nodes that don't need to
/// await anything — most of a DAG's decision nodes fall in this category.
pub fn sync_node<F>(f: F) -> NodeFn
where
    F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(move |input| {
        let out = f(input);
        Box::pin(async move { out })
    })
}

/// An outgoing edge from a node. `condition` filters whether the edge fires
/// at all; `foreach` decomposes the current value into a sequence and
/// invokes the downstream traversal once per element.
pub struct Edge {
    pub to: String,
    pub condition: Option<ConditionFn>,
    pub foreach: bool,
}

impl Edge {
    pub fn to(to: impl Into<String>) -> Self {
        Edge {
            to: to.into(),
            condition: None,
            foreach: false,
        }
    }

    pub fn when(mut self, cond: ConditionFn) -> Self {
        self.condition = Some(cond);
        self
    }

    pub fn foreach(mut self) -> Self {
        self.foreach = true;
        self
    }
}

pub struct Node {
    pub id: String,
    pub run: Option<NodeFn>,
    pub sub_dag: Option<Dag>,
    pub edges: Vec<Edge>,
}

impl Node {
    pub fn new(id: impl Into<String>) -> Self {
        Node {
            id: id.into(),
            run: None,
            sub_dag: None,
            edges: Vec::new(),
        }
    }

    pub fn with_run(mut self, run: NodeFn) -> Self {
        self.run = Some(run);
        self
    }

    pub fn with_sub_dag(mut self, dag: Dag) -> Self {
        self.sub_dag = Some(dag);
        self
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }
}

/// A graph of [`Node`]s reachable from `start`.
pub struct Dag {
    nodes: HashMap<String, Node>,
    start: String,
}

impl Dag {
    pub fn new(start: Node) -> Self {
        let start_id = start.id.clone();
        let mut nodes = HashMap::new();
        nodes.insert(start_id.clone(), start);
        Dag {
            nodes,
            start: start_id,
        }
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub async fn execute(&self, input: Value) -> Result<Value, DagError> {
        self.execute_from(&self.start, input).await
    }

    fn execute_from<'a>(&'a self, id: &'a str, input: Value) -> BoxFuture<'a, Result<Value, DagError>> {
        Box::pin(async move {
            let node = self
                .nodes
                .get(id)
                .ok_or_else(|| DagError::NodeNotFound(id.to_string()))?;

            let data = if let Some(sub) = &node.sub_dag {
                sub.execute(input).await?
            } else if let Some(run) = &node.run {
                run(input).await?
            } else {
                input
            };

            let surviving: Vec<&Edge> = node
                .edges
                .iter()
                .filter(|e| e.condition.as_ref().map_or(true, |c| c(&data)))
                .collect();

            if surviving.is_empty() {
                return Ok(data);
            }

            // Fan out in parallel; the node's result is whichever branch
            // finishes *last*, not a collected multi-result — callers with
            // more than one surviving edge are relying on completion order,
            // not list order.
            let mut pending: FuturesUnordered<_> = surviving
                .into_iter()
                .map(|edge| self.run_edge(edge, data.clone()))
                .collect();

            let mut last = None;
            while let Some(res) = pending.next().await {
                last = Some(res?);
            }
            Ok(last.unwrap_or(Value::Null))
        })
    }

    async fn run_edge(&self, edge: &Edge, data: Value) -> Result<Value, DagError> {
        if edge.foreach {
            let items = data
                .as_array()
                .ok_or(DagError::NotASequence(json_type_name(&data)))?
                .clone();

            let mut out = Value::Null;
            for item in items {
                out = self.execute_from(&edge.to, item).await?;
            }
            Ok(out)
        } else {
            self.execute_from(&edge.to, data).await
        }
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

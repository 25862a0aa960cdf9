//! Computation graphs run by workers.

use crate::error::{WorkerError, WorkerResult};
use crate::store::ResultStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smdflow_protocol::{DataType, Value};
use std::sync::Arc;

/// A user computation executed once per event.
///
/// Updates are staged by [`Graph::update`] and take effect at the next
/// [`Graph::configure`], which the worker only calls between batches.
pub trait Graph: Send {
    /// Applies the staged specification and resets any state.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Graph`] if the staged specification is invalid.
    fn configure(&mut self) -> WorkerResult<()>;

    /// Stages a new specification.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Graph`] if the specification is rejected.
    fn update(&mut self, spec: GraphSpec) -> WorkerResult<()>;

    /// Runs the graph over the current store contents.
    ///
    /// # Errors
    ///
    /// Returns any error raised by a node.
    fn execute(&mut self, store: &mut ResultStore) -> WorkerResult<()>;
}

/// A graph shared between a worker and its listener.
pub type SharedGraph = Arc<Mutex<Box<dyn Graph>>>;

/// Wraps a graph for sharing.
pub fn shared<G: Graph + 'static>(graph: G) -> SharedGraph {
    Arc::new(Mutex::new(Box::new(graph)))
}

/// Reduction applied by an accumulate node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduce {
    /// Running sum.
    Sum,
    /// Number of values seen.
    Count,
    /// Running mean.
    Mean,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Most recent value.
    Last,
}

/// One node: reduce `input` into `output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Store entry read on every event.
    pub input: String,
    /// Store entry written on every event.
    pub output: String,
    /// Reduction.
    pub op: Reduce,
}

/// Serializable description of an [`AccumulateGraph`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSpec {
    /// Nodes, executed in order.
    pub nodes: Vec<NodeSpec>,
}

impl GraphSpec {
    /// Parses a JSON specification.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Config`] for malformed JSON.
    pub fn from_json(json: &str) -> WorkerResult<Self> {
        serde_json::from_str(json).map_err(|e| WorkerError::config(format!("graph spec: {e}")))
    }

    /// Adds a node.
    #[must_use]
    pub fn node(mut self, input: impl Into<String>, output: impl Into<String>, op: Reduce) -> Self {
        self.nodes.push(NodeSpec {
            input: input.into(),
            output: output.into(),
            op,
        });
        self
    }

    fn validate(&self) -> WorkerResult<()> {
        for node in &self.nodes {
            if node.input == node.output {
                return Err(WorkerError::graph(format!(
                    "node reads and writes {}",
                    node.input
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl Accumulator {
    fn push(&mut self, x: f64) {
        if self.count == 0 {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }
        self.count += 1;
        self.sum += x;
        self.last = x;
    }

    fn result(&self, op: Reduce) -> Value {
        match op {
            Reduce::Sum => Value::Float(self.sum),
            Reduce::Count => Value::Int(self.count as i64),
            Reduce::Mean => Value::Float(self.sum / self.count as f64),
            Reduce::Min => Value::Float(self.min),
            Reduce::Max => Value::Float(self.max),
            Reduce::Last => Value::Float(self.last),
        }
    }
}

fn output_type(op: Reduce) -> DataType {
    match op {
        Reduce::Count => DataType::Int,
        _ => DataType::Float,
    }
}

/// A graph of independent reductions over numeric store entries.
///
/// Scalars contribute their value, float arrays the sum of their elements.
/// Entries that are unset are skipped for that event.
#[derive(Debug, Default)]
pub struct AccumulateGraph {
    active: GraphSpec,
    staged: Option<GraphSpec>,
    state: Vec<Accumulator>,
}

impl AccumulateGraph {
    /// Creates a graph running `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Graph`] if the specification is invalid.
    pub fn new(spec: GraphSpec) -> WorkerResult<Self> {
        spec.validate()?;
        Ok(Self {
            state: vec![Accumulator::default(); spec.nodes.len()],
            active: spec,
            staged: None,
        })
    }

    /// The specification currently executed.
    pub fn spec(&self) -> &GraphSpec {
        &self.active
    }

    /// Returns true if an update waits for the next configure.
    pub fn has_staged(&self) -> bool {
        self.staged.is_some()
    }
}

impl Graph for AccumulateGraph {
    fn configure(&mut self) -> WorkerResult<()> {
        if let Some(spec) = self.staged.take() {
            self.active = spec;
        }
        self.state = vec![Accumulator::default(); self.active.nodes.len()];
        Ok(())
    }

    fn update(&mut self, spec: GraphSpec) -> WorkerResult<()> {
        spec.validate()?;
        self.staged = Some(spec);
        Ok(())
    }

    fn execute(&mut self, store: &mut ResultStore) -> WorkerResult<()> {
        for (node, acc) in self.active.nodes.iter().zip(self.state.iter_mut()) {
            let Some(value) = store.get(&node.input)? else {
                continue;
            };
            let x = match value {
                Value::Int(v) => *v as f64,
                Value::Float(v) => *v,
                Value::FloatArray(v) => v.iter().sum(),
                other => {
                    return Err(WorkerError::graph(format!(
                        "{} is {}, not numeric",
                        node.input,
                        other.dtype()
                    )))
                }
            };
            acc.push(x);
            store.put(&node.output, output_type(node.op), acc.result(node.op))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn store() -> ResultStore {
        ResultStore::new(Box::new(MemorySink::new()))
    }

    #[test]
    fn accumulates_over_events() {
        let spec = GraphSpec::default()
            .node("laser", "laser_sum", Reduce::Sum)
            .node("laser", "laser_n", Reduce::Count)
            .node("laser", "laser_mean", Reduce::Mean)
            .node("laser", "laser_max", Reduce::Max);
        let mut graph = AccumulateGraph::new(spec).unwrap();
        let mut store = store();
        store.create("laser", DataType::Int).unwrap();

        graph.execute(&mut store).unwrap();
        assert!(matches!(store.get("laser_sum"), Err(WorkerError::NotFound(_))));

        for v in [1, 2, 6] {
            store.put("laser", DataType::Int, Value::Int(v)).unwrap();
            graph.execute(&mut store).unwrap();
        }

        assert_eq!(store.get("laser_sum").unwrap(), Some(&Value::Float(9.0)));
        assert_eq!(store.get("laser_n").unwrap(), Some(&Value::Int(3)));
        assert_eq!(store.get("laser_mean").unwrap(), Some(&Value::Float(3.0)));
        assert_eq!(store.get("laser_max").unwrap(), Some(&Value::Float(6.0)));
    }

    #[test]
    fn arrays_reduce_to_their_sum() {
        let mut graph =
            AccumulateGraph::new(GraphSpec::default().node("img", "img_last", Reduce::Last)).unwrap();
        let mut store = store();
        store
            .put("img", DataType::FloatArray, Value::FloatArray(vec![1.0, 2.5]))
            .unwrap();
        graph.execute(&mut store).unwrap();
        assert_eq!(store.get("img_last").unwrap(), Some(&Value::Float(3.5)));
    }

    #[test]
    fn text_input_fails() {
        let mut graph =
            AccumulateGraph::new(GraphSpec::default().node("name", "out", Reduce::Sum)).unwrap();
        let mut store = store();
        store.put("name", DataType::Text, Value::Text("x".into())).unwrap();
        assert!(matches!(graph.execute(&mut store), Err(WorkerError::Graph(_))));
    }

    #[test]
    fn update_applies_on_configure() {
        let mut graph =
            AccumulateGraph::new(GraphSpec::default().node("a", "a_sum", Reduce::Sum)).unwrap();
        graph
            .update(GraphSpec::default().node("a", "a_min", Reduce::Min))
            .unwrap();
        assert!(graph.has_staged());
        assert_eq!(graph.spec().nodes[0].output, "a_sum");

        graph.configure().unwrap();
        assert!(!graph.has_staged());
        assert_eq!(graph.spec().nodes[0].output, "a_min");
    }

    #[test]
    fn invalid_spec_rejected() {
        assert!(AccumulateGraph::new(GraphSpec::default().node("a", "a", Reduce::Sum)).is_err());
    }

    #[test]
    fn spec_from_json() {
        let spec = GraphSpec::from_json(
            r#"{"nodes": [{"input": "laser", "output": "laser_sum", "op": "sum"}]}"#,
        )
        .unwrap();
        assert_eq!(spec.nodes[0].op, Reduce::Sum);
        assert!(GraphSpec::from_json("{").is_err());
    }
}

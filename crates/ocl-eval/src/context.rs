//! Per-evaluation state: variable bindings and the node trace.

use crate::error::{EvalError, EvalResult};
use crate::value::Value;
use ocl_ir::Expr;
use ocl_types::Type;
use std::collections::VecDeque;
use std::fmt;
use tracing::trace;

/// Observer of the evaluation walk, called in tree pre-order and post-order.
pub trait TraceListener {
    fn on_enter(&mut self, expr: &Expr);
    fn on_exit(&mut self, expr: &Expr, result: &Value);
}

/// One evaluated node.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    /// Nesting depth; the root is 0.
    pub depth: usize,
    /// The node rendered as OCL text.
    pub expr: String,
    pub ty: Type,
    pub result: Value,
}

impl TraceEntry {
    /// A Boolean node that did not evaluate to `true`.
    pub fn is_failure(&self) -> bool {
        self.ty == Type::Boolean && self.result.as_bool() != Some(true)
    }
}

/// A node that has been entered and not yet exited.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenNode {
    pub label: &'static str,
    pub ty: Type,
}

impl fmt::Display for OpenNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.label, self.ty)
    }
}

/// Render an open-node path outermost first, e.g. `forAll : Boolean / call : Integer`.
pub fn render_path(nodes: &[OpenNode]) -> String {
    nodes
        .iter()
        .map(OpenNode::to_string)
        .collect::<Vec<_>>()
        .join(" / ")
}

/// Evaluated nodes in post-order (children before their parent).
#[derive(Debug, Clone, Default)]
pub struct EvalTrace {
    entries: VecDeque<TraceEntry>,
    dropped: usize,
}

impl EvalTrace {
    pub fn entries(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries discarded because of the entry limit.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// The entry for the outermost node, once it has been exited.
    pub fn root(&self) -> Option<&TraceEntry> {
        self.entries.back().filter(|e| e.depth == 0)
    }

    /// The deepest failing Boolean sub-expressions: entries that are false
    /// or Undefined and have no failing Boolean descendant.
    pub fn failing_leaves(&self) -> Vec<&TraceEntry> {
        let mut failing_below: Vec<bool> = Vec::new();
        let mut leaves = Vec::new();
        for entry in &self.entries {
            let d = entry.depth;
            let child_failing = failing_below.get(d + 1).copied().unwrap_or(false);
            failing_below.resize(d + 1, false);
            let failing = entry.is_failure();
            if failing && !child_failing {
                leaves.push(entry);
            }
            failing_below[d] |= failing || child_failing;
        }
        leaves
    }

    fn push(&mut self, entry: TraceEntry, limit: usize) {
        if limit > 0 && self.entries.len() >= limit {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(entry);
    }
}

/// Evaluation state, created fresh for each top-level evaluation.
///
/// Bindings form a stack searched innermost-first. A frame (pushed for a
/// query operation call) hides everything bound outside it.
///
/// The entered nodes form a second stack, outermost first. When a node
/// fails with an [`EvalError`], the stack at that point is kept as the
/// failure path.
pub struct EvalContext<'l> {
    bindings: Vec<(String, Value)>,
    frames: Vec<usize>,
    open: Vec<OpenNode>,
    failure_path: Option<Vec<OpenNode>>,
    listener: Option<&'l mut dyn TraceListener>,
    trace: Option<EvalTrace>,
    max_trace_entries: usize,
    log_nodes: bool,
}

impl<'l> EvalContext<'l> {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
            frames: Vec::new(),
            open: Vec::new(),
            failure_path: None,
            listener: None,
            trace: None,
            max_trace_entries: 0,
            log_nodes: false,
        }
    }

    pub fn with_listener(mut self, listener: &'l mut dyn TraceListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Record a trace of exited nodes, keeping at most `max_entries`
    /// (0 = unlimited).
    pub fn recording(mut self, max_entries: usize) -> Self {
        self.trace = Some(EvalTrace::default());
        self.max_trace_entries = max_entries;
        self
    }

    pub fn logging_nodes(mut self, enabled: bool) -> Self {
        self.log_nodes = enabled;
        self
    }

    // === Bindings ===

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.push((name.into(), value));
    }

    /// Remove the most recent binding.
    pub fn unbind(&mut self) {
        let base = self.frame_base();
        if self.bindings.len() > base {
            self.bindings.pop();
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(self.bindings.len());
    }

    pub fn pop_frame(&mut self) {
        if let Some(base) = self.frames.pop() {
            self.bindings.truncate(base);
        }
    }

    fn frame_base(&self) -> usize {
        self.frames.last().copied().unwrap_or(0)
    }

    pub fn lookup(&self, name: &str) -> EvalResult<&Value> {
        self.bindings[self.frame_base()..]
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| EvalError::UnboundVariable {
                name: name.to_string(),
            })
    }

    // === Trace hook ===

    /// Current nesting depth (number of entered, not yet exited nodes).
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Entered, not yet exited nodes, outermost first.
    pub fn open_nodes(&self) -> &[OpenNode] {
        &self.open
    }

    pub fn enter(&mut self, expr: &Expr) {
        if self.log_nodes {
            trace!(depth = self.open.len(), ty = %expr.ty, "enter {}", expr);
        }
        if let Some(listener) = self.listener.as_deref_mut() {
            listener.on_enter(expr);
        }
        self.open.push(OpenNode {
            label: expr.kind.label(),
            ty: expr.ty.clone(),
        });
    }

    pub fn exit(&mut self, expr: &Expr, result: &Value) {
        self.open.pop();
        let depth = self.open.len();
        if self.log_nodes {
            trace!(depth, %result, "exit {}", expr);
        }
        if let Some(listener) = self.listener.as_deref_mut() {
            listener.on_exit(expr, result);
        }
        if let Some(trace) = self.trace.as_mut() {
            let entry = TraceEntry {
                depth,
                expr: expr.to_string(),
                ty: expr.ty.clone(),
                result: result.clone(),
            };
            trace.push(entry, self.max_trace_entries);
        }
    }

    /// Keep the current open-node stack as the failure path. Only the first
    /// call has an effect, so the innermost failing node is what remains.
    pub fn record_failure(&mut self) {
        if self.failure_path.is_none() {
            self.failure_path = Some(self.open.clone());
        }
    }

    pub fn failure_path(&self) -> Option<&[OpenNode]> {
        self.failure_path.as_deref()
    }

    /// Take the recorded trace, if recording was enabled.
    pub fn take_trace(&mut self) -> Option<EvalTrace> {
        self.trace.take()
    }
}

impl Default for EvalContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocl_ir::ExprBuilder;
    use ocl_types::EmptySchema;

    fn entry(depth: usize, expr: &str, result: Value) -> TraceEntry {
        let ty = match result {
            Value::Integer(_) => Type::Integer,
            _ => Type::Boolean,
        };
        TraceEntry {
            depth,
            expr: expr.to_string(),
            ty,
            result,
        }
    }

    #[test]
    fn test_lookup_innermost_first() {
        let mut ctx = EvalContext::new();
        ctx.bind("x", Value::integer(1));
        ctx.bind("x", Value::integer(2));
        assert_eq!(ctx.lookup("x"), Ok(&Value::integer(2)));
        ctx.unbind();
        assert_eq!(ctx.lookup("x"), Ok(&Value::integer(1)));
        assert!(matches!(
            ctx.lookup("y"),
            Err(EvalError::UnboundVariable { .. })
        ));
    }

    #[test]
    fn test_frames_hide_outer_bindings() {
        let mut ctx = EvalContext::new();
        ctx.bind("x", Value::integer(1));
        ctx.push_frame();
        assert!(ctx.lookup("x").is_err());
        ctx.bind("x", Value::integer(5));
        assert_eq!(ctx.lookup("x"), Ok(&Value::integer(5)));
        ctx.pop_frame();
        assert_eq!(ctx.lookup("x"), Ok(&Value::integer(1)));
    }

    #[test]
    fn test_open_nodes_follow_enter_and_exit() {
        let b = ExprBuilder::new(&EmptySchema);
        let one = b.integer(1);
        let sum = b.binary(b.integer(1), "+", b.integer(2)).unwrap();
        let test = b.binary(sum.clone(), ">", b.integer(0)).unwrap();

        let mut ctx = EvalContext::new();
        ctx.enter(&test);
        ctx.enter(&sum);
        ctx.enter(&one);
        assert_eq!(ctx.depth(), 3);
        let labels: Vec<&str> = ctx.open_nodes().iter().map(|n| n.label).collect();
        assert_eq!(labels, vec!["call", "call", "literal"]);
        assert_eq!(ctx.open_nodes()[0].ty, Type::Boolean);

        ctx.record_failure();
        ctx.exit(&one, &Value::Undefined);
        ctx.record_failure();
        ctx.exit(&sum, &Value::Undefined);
        assert_eq!(ctx.open_nodes().len(), 1);
        let path = ctx.failure_path().map(render_path);
        assert_eq!(
            path.as_deref(),
            Some("call : Boolean / call : Integer / literal : Integer")
        );

        ctx.exit(&test, &Value::Undefined);
        assert!(ctx.open_nodes().is_empty());
    }

    #[test]
    fn test_failing_leaves_picks_deepest() {
        // (a and (b or c)) where a = true, b = false, c = false
        let mut trace = EvalTrace::default();
        let f = Value::Boolean(false);
        let t = Value::Boolean(true);
        for e in [
            entry(1, "a", t),
            entry(2, "b", f.clone()),
            entry(2, "c", f.clone()),
            entry(1, "b or c", f.clone()),
            entry(0, "a and (b or c)", f),
        ] {
            trace.push(e, 0);
        }
        let leaves: Vec<&str> = trace
            .failing_leaves()
            .iter()
            .map(|e| e.expr.as_str())
            .collect();
        assert_eq!(leaves, vec!["b", "c"]);
        assert_eq!(trace.root().map(|e| e.expr.as_str()), Some("a and (b or c)"));
    }

    #[test]
    fn test_undefined_counts_as_failure() {
        let mut trace = EvalTrace::default();
        trace.push(entry(1, "x", Value::integer(3)), 0);
        trace.push(entry(0, "x > y", Value::Undefined), 0);
        let leaves = trace.failing_leaves();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].expr, "x > y");
    }

    #[test]
    fn test_entry_limit_drops_oldest() {
        let mut trace = EvalTrace::default();
        for i in 0..5 {
            trace.push(entry(0, &i.to_string(), Value::Boolean(true)), 3);
        }
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.dropped(), 2);
        assert_eq!(trace.entries().next().map(|e| e.expr.as_str()), Some("2"));
    }
}

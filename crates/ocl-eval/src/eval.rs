//! Tree-walking evaluator.
//!
//! Evaluation is a recursive descent over node kinds. Every node goes
//! through [`Evaluator::eval`], which wraps the node-specific logic in the
//! context's enter/exit hook. Semantic failures produce `Value::Undefined`;
//! only an inconsistent tree produces an [`EvalError`].

use crate::builtins::{self, short_circuit};
use crate::context::{render_path, EvalContext, EvalTrace, TraceListener};
use crate::error::{EvalError, EvalResult};
use crate::model::ObjectModel;
use crate::value::Value;
use ocl_ir::{Accumulator, Callee, CollectionPart, Expr, ExprKind, Literal, LoopKind, Property, TypeTestKind};
use ocl_types::{ancestors, CollectionKind, Type, TypeSystem};
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::{debug, warn};

/// Evaluator configuration.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Record an [`EvalTrace`] of every evaluated node.
    pub record_trace: bool,
    /// Maximum number of recorded trace entries (0 = unlimited). The oldest
    /// entries are dropped first.
    pub max_trace_entries: usize,
    /// Emit a `trace!` event when each node is entered and exited.
    pub log_nodes: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            record_trace: false,
            max_trace_entries: 10_000,
            log_nodes: false,
        }
    }
}

/// Evaluates expression trees against an object model snapshot.
///
/// The evaluator holds no per-evaluation state; one instance can evaluate
/// any number of trees.
pub struct Evaluator<'m, M: ObjectModel> {
    model: &'m M,
    config: EvalConfig,
}

/// Evaluate `expr` with the given initial bindings.
pub fn evaluate<M: ObjectModel>(
    expr: &Expr,
    bindings: &HashMap<String, Value>,
    model: &M,
) -> EvalResult<Value> {
    Evaluator::new(model).evaluate(expr, bindings)
}

impl<'m, M: ObjectModel> Evaluator<'m, M> {
    pub fn new(model: &'m M) -> Self {
        Self {
            model,
            config: EvalConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EvalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    fn context<'l>(&self) -> EvalContext<'l> {
        let ctx = EvalContext::new().logging_nodes(self.config.log_nodes);
        if self.config.record_trace {
            ctx.recording(self.config.max_trace_entries)
        } else {
            ctx
        }
    }

    pub fn evaluate(&self, expr: &Expr, bindings: &HashMap<String, Value>) -> EvalResult<Value> {
        self.run(expr, bindings, self.context())
            .map(|(value, _)| value)
    }

    /// Evaluate and return the recorded trace, regardless of
    /// [`EvalConfig::record_trace`].
    pub fn evaluate_with_trace(
        &self,
        expr: &Expr,
        bindings: &HashMap<String, Value>,
    ) -> EvalResult<(Value, EvalTrace)> {
        let ctx = EvalContext::new()
            .logging_nodes(self.config.log_nodes)
            .recording(self.config.max_trace_entries);
        let (value, trace) = self.run(expr, bindings, ctx)?;
        Ok((value, trace.unwrap_or_default()))
    }

    /// Evaluate, reporting every node entry and exit to `listener`.
    pub fn evaluate_with_listener(
        &self,
        expr: &Expr,
        bindings: &HashMap<String, Value>,
        listener: &mut dyn TraceListener,
    ) -> EvalResult<Value> {
        let ctx = self.context().with_listener(listener);
        self.run(expr, bindings, ctx).map(|(value, _)| value)
    }

    fn run(
        &self,
        expr: &Expr,
        bindings: &HashMap<String, Value>,
        mut ctx: EvalContext<'_>,
    ) -> EvalResult<(Value, Option<EvalTrace>)> {
        for (name, value) in bindings {
            ctx.bind(name.clone(), value.clone());
        }
        debug!(expr = %expr, "evaluating");
        match self.eval(expr, &mut ctx) {
            Ok(value) => {
                debug!(result = %value, "evaluated");
                Ok((value, ctx.take_trace()))
            }
            Err(e) => {
                let path = ctx.failure_path().map(render_path).unwrap_or_default();
                warn!(error = %e, expr = %expr, %path, "evaluation aborted");
                Err(e)
            }
        }
    }

    /// Evaluate one node inside the enter/exit hook.
    pub fn eval(&self, expr: &Expr, ctx: &mut EvalContext<'_>) -> EvalResult<Value> {
        ctx.enter(expr);
        let result = self.eval_node(expr, ctx);
        match &result {
            Ok(value) => ctx.exit(expr, value),
            Err(_) => {
                ctx.record_failure();
                ctx.exit(expr, &Value::Undefined)
            }
        }
        result
    }

    fn eval_node(&self, expr: &Expr, ctx: &mut EvalContext<'_>) -> EvalResult<Value> {
        match &expr.kind {
            ExprKind::Const(literal) => Ok(literal_value(literal)),

            ExprKind::Variable(name) => ctx.lookup(name).cloned(),

            ExprKind::Navigation {
                source,
                property,
                shorthand,
            } => {
                let src = self.eval(source, ctx)?;
                if !*shorthand {
                    return self.read_property(&src, property);
                }
                let Some(coll) = src.as_collection() else {
                    return Ok(Value::Undefined);
                };
                let mut elems = Vec::with_capacity(coll.len());
                for elem in coll.iter() {
                    match self.read_property(elem, property)? {
                        Value::Collection(inner) => elems.extend(inner.iter().cloned()),
                        other => elems.push(other),
                    }
                }
                let kind = expr.ty.collection_kind().unwrap_or(CollectionKind::Bag);
                Ok(Value::collection(kind, element_type(&expr.ty), elems))
            }

            ExprKind::OperationCall {
                name,
                callee,
                source,
                args,
            } => match callee {
                Callee::Builtin(op) if op.is_connective() => {
                    let left = self.eval(source, ctx)?;
                    if let Some(decided) = short_circuit(*op, left.as_bool()) {
                        return Ok(Value::Boolean(decided));
                    }
                    let right = match args.first() {
                        Some(arg) => self.eval(arg, ctx)?,
                        None => return Err(malformed(format!("{} without operand", name))),
                    };
                    Ok(builtins::apply(*op, &left, &[right], &expr.ty))
                }
                Callee::Builtin(op) => {
                    let recv = self.eval(source, ctx)?;
                    let arg_values = self.eval_all(args, ctx)?;
                    Ok(builtins::apply(*op, &recv, &arg_values, &expr.ty))
                }
                Callee::User => {
                    let recv = self.eval(source, ctx)?;
                    let arg_values = self.eval_all(args, ctx)?;
                    self.call_user_operation(name, recv, arg_values, ctx)
                }
            },

            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => match self.eval(cond, ctx)?.as_bool() {
                Some(true) => self.eval(then_branch, ctx),
                Some(false) => self.eval(else_branch, ctx),
                None => Ok(Value::Undefined),
            },

            ExprKind::Let { name, value, body } => {
                let bound = self.eval(value, ctx)?;
                ctx.bind(name.clone(), bound);
                let result = self.eval(body, ctx);
                ctx.unbind();
                result
            }

            ExprKind::Loop {
                kind,
                source,
                iterators,
                body,
                accumulator,
            } => {
                let src = self.eval(source, ctx)?;
                let Some(coll) = src.as_collection() else {
                    return Ok(Value::Undefined);
                };
                let elems = coll.elements();
                match (kind, accumulator) {
                    (LoopKind::Iterate, Some(acc)) => {
                        self.eval_iterate(elems, iterators, acc, body, ctx)
                    }
                    (LoopKind::Iterate, None) => Err(malformed("iterate without accumulator")),
                    (kind, _) => {
                        self.eval_loop(expr, *kind, coll.kind(), elems, iterators, body, ctx)
                    }
                }
            }

            ExprKind::AllInstances(class) => {
                let objects = self.model.all_instances_of(class);
                Ok(Value::set(
                    Type::object(class.as_str()),
                    objects.into_iter().map(Value::Object).collect(),
                ))
            }

            ExprKind::TypeTest {
                kind,
                source,
                target,
            } => {
                let value = self.eval(source, ctx)?;
                Ok(self.type_test(*kind, value, target))
            }

            ExprKind::CollectionLiteral { kind, parts } => {
                let mut elems = Vec::new();
                for part in parts {
                    match part {
                        CollectionPart::Item(e) => elems.push(self.eval(e, ctx)?),
                        CollectionPart::Range(lo, hi) => {
                            let lo = self.eval(lo, ctx)?;
                            let hi = self.eval(hi, ctx)?;
                            match (lo.as_integer(), hi.as_integer()) {
                                (Some(lo), Some(hi)) => elems.extend((lo..=hi).map(Value::Integer)),
                                _ => return Ok(Value::Undefined),
                            }
                        }
                    }
                }
                Ok(Value::collection(*kind, element_type(&expr.ty), elems))
            }

            ExprKind::TupleLiteral(fields) => {
                let mut values = Vec::with_capacity(fields.len());
                for (name, e) in fields {
                    values.push((name.clone(), self.eval(e, ctx)?));
                }
                Ok(Value::tuple(values))
            }
        }
    }

    fn eval_all(&self, exprs: &[Expr], ctx: &mut EvalContext<'_>) -> EvalResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e, ctx)).collect()
    }

    /// Evaluate `body` with `name` bound to `value`.
    fn eval_with(
        &self,
        body: &Expr,
        name: &str,
        value: &Value,
        ctx: &mut EvalContext<'_>,
    ) -> EvalResult<Value> {
        ctx.bind(name, value.clone());
        let result = self.eval(body, ctx);
        ctx.unbind();
        result
    }

    // === Navigation ===

    fn read_property(&self, value: &Value, property: &Property) -> EvalResult<Value> {
        match (value, property) {
            (Value::Undefined, _) => Ok(Value::Undefined),
            (Value::Object(obj), Property::Attribute(name)) => {
                Ok(self.model.get_attribute(obj, name))
            }
            (Value::Object(obj), Property::AssociationEnd { role, .. }) => {
                Ok(self.model.get_association_end(obj, role))
            }
            (Value::Tuple(fields), Property::TupleField(name)) => {
                Ok(fields.get(name).cloned().unwrap_or(Value::Undefined))
            }
            (other, property) => Err(malformed(format!(
                "cannot read {} from {}",
                property.name(),
                other
            ))),
        }
    }

    // === Query operations ===

    fn call_user_operation(
        &self,
        name: &str,
        recv: Value,
        args: Vec<Value>,
        ctx: &mut EvalContext<'_>,
    ) -> EvalResult<Value> {
        let class = match &recv {
            Value::Undefined => return Ok(Value::Undefined),
            Value::Object(obj) => obj.class.clone(),
            other => return Err(malformed(format!("{} called on {}", name, other))),
        };

        // Most specific definition along the receiver's dynamic class.
        let found = ancestors(self.model, &class).into_iter().find_map(|c| {
            let body = self.model.operation_body(&c, name)?;
            let sig = self.model.operation(&c, name)?;
            Some((body, sig))
        });
        let Some((body, sig)) = found else {
            debug!(class = %class, operation = name, "no operation body; result is undefined");
            return Ok(Value::Undefined);
        };
        if sig.params.len() != args.len() {
            return Err(malformed(format!(
                "{}::{} expects {} arguments, got {}",
                class,
                name,
                sig.params.len(),
                args.len()
            )));
        }

        ctx.push_frame();
        ctx.bind("self", recv);
        for ((param, _), value) in sig.params.iter().zip(args) {
            ctx.bind(param.clone(), value);
        }
        let result = self.eval(&body, ctx);
        ctx.pop_frame();
        result
    }

    // === Loops ===

    fn eval_iterate(
        &self,
        elems: &[Value],
        iterators: &[String],
        acc: &Accumulator,
        body: &Expr,
        ctx: &mut EvalContext<'_>,
    ) -> EvalResult<Value> {
        let Some(iterator) = iterators.first() else {
            return Err(malformed("iterate without iterator variable"));
        };
        let mut value = self.eval(&acc.init, ctx)?;
        for elem in elems {
            ctx.bind(iterator.clone(), elem.clone());
            ctx.bind(acc.name.clone(), value);
            let result = self.eval(body, ctx);
            ctx.unbind();
            ctx.unbind();
            value = result?;
        }
        Ok(value)
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_loop(
        &self,
        expr: &Expr,
        kind: LoopKind,
        source_kind: CollectionKind,
        elems: &[Value],
        iterators: &[String],
        body: &Expr,
        ctx: &mut EvalContext<'_>,
    ) -> EvalResult<Value> {
        if let LoopKind::ForAll | LoopKind::Exists = kind {
            let universal = kind == LoopKind::ForAll;
            let result = self.quantify(universal, elems, iterators, body, ctx)?;
            return Ok(result.map_or(Value::Undefined, Value::Boolean));
        }

        let Some(iterator) = iterators.first() else {
            return Err(malformed(format!("{} without iterator variable", kind.name())));
        };
        let elem_ty = element_type(&expr.ty);

        match kind {
            LoopKind::One => {
                let mut matches = 0;
                for elem in elems {
                    match self.eval_with(body, iterator, elem, ctx)?.as_bool() {
                        None => return Ok(Value::Undefined),
                        Some(true) => {
                            matches += 1;
                            if matches > 1 {
                                return Ok(Value::Boolean(false));
                            }
                        }
                        Some(false) => {}
                    }
                }
                Ok(Value::Boolean(matches == 1))
            }

            LoopKind::Any => {
                for elem in elems {
                    match self.eval_with(body, iterator, elem, ctx)?.as_bool() {
                        Some(true) => return Ok(elem.clone()),
                        Some(false) => {}
                        None => return Ok(Value::Undefined),
                    }
                }
                Ok(Value::Undefined)
            }

            LoopKind::Select | LoopKind::Reject => {
                let keep = kind == LoopKind::Select;
                let mut kept = Vec::new();
                for elem in elems {
                    match self.eval_with(body, iterator, elem, ctx)?.as_bool() {
                        Some(b) if b == keep => kept.push(elem.clone()),
                        Some(_) => {}
                        None => return Ok(Value::Undefined),
                    }
                }
                Ok(Value::collection(source_kind, elem_ty, kept))
            }

            LoopKind::Collect | LoopKind::CollectNested => {
                let flatten = kind == LoopKind::Collect;
                let mut out = Vec::with_capacity(elems.len());
                for elem in elems {
                    match self.eval_with(body, iterator, elem, ctx)? {
                        Value::Collection(inner) if flatten => out.extend(inner.iter().cloned()),
                        other => out.push(other),
                    }
                }
                Ok(Value::bag(elem_ty, out))
            }

            LoopKind::IsUnique => {
                let mut results = Vec::with_capacity(elems.len());
                for elem in elems {
                    results.push(self.eval_with(body, iterator, elem, ctx)?);
                }
                let total = results.len();
                results.sort();
                results.dedup();
                Ok(Value::Boolean(results.len() == total))
            }

            LoopKind::SortedBy => {
                let mut keyed = Vec::with_capacity(elems.len());
                for elem in elems {
                    let key = self.eval_with(body, iterator, elem, ctx)?;
                    if key.is_undefined() {
                        return Ok(Value::Undefined);
                    }
                    keyed.push((key, elem.clone()));
                }
                // Stable: ties keep source order.
                keyed.sort_by(|a, b| a.0.cmp(&b.0));
                let kind = if source_kind.is_unique() {
                    CollectionKind::OrderedSet
                } else {
                    CollectionKind::Sequence
                };
                Ok(Value::collection(
                    kind,
                    elem_ty,
                    keyed.into_iter().map(|(_, v)| v).collect(),
                ))
            }

            LoopKind::Closure => {
                let mut reached: Vec<Value> = Vec::new();
                let mut seen: BTreeSet<Value> = BTreeSet::new();
                let mut pending: VecDeque<Value> = elems.iter().cloned().collect();
                while let Some(elem) = pending.pop_front() {
                    let next = self.eval_with(body, iterator, &elem, ctx)?;
                    let children = match &next {
                        Value::Collection(c) => c.elements().to_vec(),
                        Value::Undefined => Vec::new(),
                        other => vec![other.clone()],
                    };
                    for child in children {
                        if !child.is_undefined() && seen.insert(child.clone()) {
                            reached.push(child.clone());
                            pending.push_back(child);
                        }
                    }
                }
                let kind = if source_kind.is_ordered() {
                    CollectionKind::OrderedSet
                } else {
                    CollectionKind::Set
                };
                Ok(Value::collection(kind, elem_ty, reached))
            }

            LoopKind::ForAll | LoopKind::Exists | LoopKind::Iterate => {
                Err(malformed(format!("unexpected {} loop", kind.name())))
            }
        }
    }

    /// `forAll` / `exists` over the cartesian product of the iterators.
    /// Stops at the first decisive or Undefined body result.
    fn quantify(
        &self,
        universal: bool,
        elems: &[Value],
        iterators: &[String],
        body: &Expr,
        ctx: &mut EvalContext<'_>,
    ) -> EvalResult<Option<bool>> {
        let Some((first, rest)) = iterators.split_first() else {
            return Ok(self.eval(body, ctx)?.as_bool());
        };
        for elem in elems {
            ctx.bind(first.clone(), elem.clone());
            let result = self.quantify(universal, elems, rest, body, ctx);
            ctx.unbind();
            match result? {
                None => return Ok(None),
                Some(b) if b != universal => return Ok(Some(b)),
                Some(_) => {}
            }
        }
        Ok(Some(universal))
    }

    // === Type tests ===

    fn type_test(&self, kind: TypeTestKind, value: Value, target: &Type) -> Value {
        if value.is_undefined() {
            return Value::Undefined;
        }
        let ts = TypeSystem::new(self.model);
        let dynamic = value.dynamic_type();
        match kind {
            TypeTestKind::IsTypeOf => Value::Boolean(dynamic == *target),
            TypeTestKind::IsKindOf => Value::Boolean(ts.conforms_to(&dynamic, target)),
            TypeTestKind::AsType => {
                if !ts.conforms_to(&dynamic, target) {
                    return Value::Undefined;
                }
                match (value, target) {
                    (Value::Integer(n), Type::Real) => Value::real(n as f64),
                    (value, _) => value,
                }
            }
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Integer(n) => Value::Integer(*n),
        Literal::UnlimitedNatural(Some(n)) => {
            i64::try_from(*n).map_or(Value::Undefined, Value::Integer)
        }
        Literal::UnlimitedNatural(None) => Value::Unlimited,
        Literal::Real(r) => Value::real(*r),
        Literal::String(s) => Value::string(s.as_str()),
        Literal::Date(d) => Value::Date(*d),
        Literal::Undefined => Value::Undefined,
    }
}

fn element_type(ty: &Type) -> Type {
    ty.element_type().cloned().unwrap_or(Type::OclAny)
}

fn malformed(detail: impl Into<String>) -> EvalError {
    EvalError::MalformedNode {
        detail: detail.into(),
    }
}

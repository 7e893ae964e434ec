//! In-memory object model and helpers for the end-to-end OCL tests.

use ocl_eval::{EvalTrace, Evaluator, ObjectModel, ObjectRef, Value};
use ocl_ir::{Expr, ExprBuilder};
use ocl_types::{
    ancestors, AssociationEnd, CollectionKind, ModelSchema, OperationSig, Type, TypeResult,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Default)]
struct ClassDef {
    superclasses: Vec<String>,
    attributes: BTreeMap<String, Type>,
    ends: BTreeMap<String, AssociationEnd>,
    operations: BTreeMap<String, OperationSig>,
}

#[derive(Debug)]
struct ObjectRecord {
    obj: ObjectRef,
    attributes: HashMap<String, Value>,
}

/// A small mutable object model: classes with attributes, association ends
/// and query operations, plus objects and links between them.
#[derive(Debug, Default)]
pub struct FixtureModel {
    classes: BTreeMap<String, ClassDef>,
    objects: Vec<ObjectRecord>,
    links: HashMap<(u64, String), Vec<u64>>,
    bodies: HashMap<(String, String), Arc<Expr>>,
}

impl FixtureModel {
    pub fn new() -> Self {
        Self::default()
    }

    // === Schema ===

    pub fn add_class(&mut self, name: &str, superclasses: &[&str]) -> &mut Self {
        let def = self.classes.entry(name.to_string()).or_default();
        def.superclasses = superclasses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn add_attribute(&mut self, class: &str, name: &str, ty: Type) -> &mut Self {
        self.classes
            .entry(class.to_string())
            .or_default()
            .attributes
            .insert(name.to_string(), ty);
        self
    }

    pub fn add_association_end(&mut self, class: &str, role: &str, end: AssociationEnd) -> &mut Self {
        self.classes
            .entry(class.to_string())
            .or_default()
            .ends
            .insert(role.to_string(), end);
        self
    }

    pub fn add_operation(
        &mut self,
        class: &str,
        name: &str,
        params: &[(&str, Type)],
        result: Type,
    ) -> &mut Self {
        let sig = OperationSig {
            params: params
                .iter()
                .map(|(p, ty)| (p.to_string(), ty.clone()))
                .collect(),
            result,
        };
        self.classes
            .entry(class.to_string())
            .or_default()
            .operations
            .insert(name.to_string(), sig);
        self
    }

    /// Attach a body to a declared operation.
    pub fn set_operation_body(&mut self, class: &str, name: &str, body: Expr) {
        self.bodies
            .insert((class.to_string(), name.to_string()), Arc::new(body));
    }

    // === Instances ===

    pub fn create_object(&mut self, class: &str, name: &str) -> ObjectRef {
        let obj = ObjectRef::new(self.objects.len() as u64, class, name);
        self.objects.push(ObjectRecord {
            obj: obj.clone(),
            attributes: HashMap::new(),
        });
        obj
    }

    pub fn set_attribute(&mut self, obj: &ObjectRef, name: &str, value: Value) {
        if let Some(record) = self.objects.get_mut(obj.id as usize) {
            record.attributes.insert(name.to_string(), value);
        }
    }

    /// Add a link from `from` to `to` through `role`. Links through one
    /// role keep insertion order.
    pub fn link(&mut self, from: &ObjectRef, role: &str, to: &ObjectRef) {
        self.links
            .entry((from.id, role.to_string()))
            .or_default()
            .push(to.id);
    }

    fn lookup_in_hierarchy<T: Clone>(
        &self,
        class: &str,
        get: impl Fn(&ClassDef) -> Option<&T>,
    ) -> Option<T> {
        ancestors(self, class)
            .iter()
            .filter_map(|c| self.classes.get(c))
            .find_map(|def| get(def).cloned())
    }
}

impl ModelSchema for FixtureModel {
    fn resolve_class(&self, name: &str) -> Option<String> {
        self.classes.contains_key(name).then(|| name.to_string())
    }

    fn superclasses(&self, class: &str) -> Vec<String> {
        self.classes
            .get(class)
            .map(|def| def.superclasses.clone())
            .unwrap_or_default()
    }

    fn attribute_type(&self, class: &str, name: &str) -> Option<Type> {
        self.lookup_in_hierarchy(class, |def| def.attributes.get(name))
    }

    fn association_end(&self, class: &str, role: &str) -> Option<AssociationEnd> {
        self.lookup_in_hierarchy(class, |def| def.ends.get(role))
    }

    fn operation(&self, class: &str, name: &str) -> Option<OperationSig> {
        self.lookup_in_hierarchy(class, |def| def.operations.get(name))
    }
}

impl ObjectModel for FixtureModel {
    fn get_attribute(&self, object: &ObjectRef, name: &str) -> Value {
        self.objects
            .get(object.id as usize)
            .and_then(|record| record.attributes.get(name).cloned())
            .unwrap_or(Value::Undefined)
    }

    fn get_association_end(&self, object: &ObjectRef, role: &str) -> Value {
        let Some(end) = self.association_end(&object.class, role) else {
            return Value::Undefined;
        };
        let targets: Vec<Value> = self
            .links
            .get(&(object.id, role.to_string()))
            .into_iter()
            .flatten()
            .filter_map(|id| self.objects.get(*id as usize))
            .map(|record| Value::object(record.obj.clone()))
            .collect();
        if !end.many {
            return targets.into_iter().next().unwrap_or(Value::Undefined);
        }
        let kind = if end.ordered {
            CollectionKind::OrderedSet
        } else {
            CollectionKind::Set
        };
        Value::collection(kind, Type::object(end.target.as_str()), targets)
    }

    fn all_instances_of(&self, class: &str) -> Vec<ObjectRef> {
        self.objects
            .iter()
            .filter(|record| self.class_conforms_to(&record.obj.class, class))
            .map(|record| record.obj.clone())
            .collect()
    }

    fn operation_body(&self, class: &str, name: &str) -> Option<Arc<Expr>> {
        self.bodies
            .get(&(class.to_string(), name.to_string()))
            .cloned()
    }
}

// === Helpers ===

/// Bindings map from `(name, value)` pairs.
pub fn bindings(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Build an expression with no free variables and evaluate it against an
/// empty model.
pub fn eval_closed<F>(build: F) -> Result<Value, String>
where
    F: FnOnce(&mut ExprBuilder<'_>) -> TypeResult<Expr>,
{
    let model = FixtureModel::new();
    let expr = {
        let mut b = ExprBuilder::new(&model);
        build(&mut b).map_err(|e| e.to_string())?
    };
    Evaluator::new(&model)
        .evaluate(&expr, &HashMap::new())
        .map_err(|e| e.to_string())
}

/// Evaluate against `model` with `self` bound to `obj`.
pub fn eval_on(model: &FixtureModel, obj: &ObjectRef, expr: &Expr) -> Result<Value, String> {
    Evaluator::new(model)
        .evaluate(expr, &bindings(&[("self", Value::object(obj.clone()))]))
        .map_err(|e| e.to_string())
}

/// Like [`eval_on`], also returning the evaluation trace.
pub fn trace_on(
    model: &FixtureModel,
    obj: &ObjectRef,
    expr: &Expr,
) -> Result<(Value, EvalTrace), String> {
    Evaluator::new(model)
        .evaluate_with_trace(expr, &bindings(&[("self", Value::object(obj.clone()))]))
        .map_err(|e| e.to_string())
}

/// Company fixture used across the scenario tests.
///
/// Person(name: String, age: Integer, salary: Real) with `employer`
/// (single Company), `friends` (many Person), `children` (ordered Person)
/// and `manager` (single Person). Employee specializes Person with
/// `badge: Integer`. Company(name: String) has `employees` (many Person).
/// Person declares `isOlderThan(other: Person): Boolean` and
/// `describe(): String` (body supplied by [`company`]).
pub fn company_schema() -> FixtureModel {
    let mut m = FixtureModel::new();
    m.add_class("Person", &[])
        .add_class("Employee", &["Person"])
        .add_class("Company", &[])
        .add_attribute("Person", "name", Type::String)
        .add_attribute("Person", "age", Type::Integer)
        .add_attribute("Person", "salary", Type::Real)
        .add_attribute("Employee", "badge", Type::Integer)
        .add_attribute("Company", "name", Type::String)
        .add_association_end("Person", "employer", AssociationEnd::single("Company"))
        .add_association_end("Person", "friends", AssociationEnd::many("Person"))
        .add_association_end("Person", "children", AssociationEnd::ordered("Person"))
        .add_association_end("Person", "manager", AssociationEnd::single("Person"))
        .add_association_end("Company", "employees", AssociationEnd::many("Person"))
        .add_operation(
            "Person",
            "isOlderThan",
            &[("other", Type::object("Person"))],
            Type::Boolean,
        )
        .add_operation("Person", "describe", &[], Type::String);
    m
}

/// Objects of the company fixture.
pub struct Company {
    pub model: FixtureModel,
    pub acme: ObjectRef,
    pub ada: ObjectRef,
    pub bob: ObjectRef,
    pub cy: ObjectRef,
    pub dee: ObjectRef,
}

/// Populated company fixture:
///
/// - ada (Employee, 36, badge 7) works at acme, friends bob and cy,
///   children [dee, cy]
/// - bob (Person, 41) works at acme, friend ada, manager ada
/// - cy (Person, 12), no employer, no salary
/// - dee (Person, 8), no employer, manager bob
pub fn company() -> TypeResult<Company> {
    let mut model = company_schema();

    let describe = {
        let mut b = ExprBuilder::new(&model);
        b.declare("self", Type::object("Person"));
        let name = b.navigate(b.variable("self")?, "name")?;
        let age = b.navigate(b.variable("self")?, "age")?;
        let adult = b.binary(age, ">=", b.integer(18))?;
        let kind = b.if_then_else(adult, b.string(" (adult)"), b.string(" (minor)"))?;
        b.binary(name, "+", kind)?
    };
    let older = {
        let mut b = ExprBuilder::new(&model);
        b.declare("self", Type::object("Person"));
        b.declare("other", Type::object("Person"));
        let mine = b.navigate(b.variable("self")?, "age")?;
        let theirs = b.navigate(b.variable("other")?, "age")?;
        b.binary(mine, ">", theirs)?
    };
    model.set_operation_body("Person", "describe", describe);
    model.set_operation_body("Person", "isOlderThan", older);

    let acme = model.create_object("Company", "acme");
    let ada = model.create_object("Employee", "ada");
    let bob = model.create_object("Person", "bob");
    let cy = model.create_object("Person", "cy");
    let dee = model.create_object("Person", "dee");

    model.set_attribute(&acme, "name", Value::string("Acme"));
    for (obj, name, age) in [(&ada, "Ada", 36), (&bob, "Bob", 41), (&cy, "Cy", 12), (&dee, "Dee", 8)] {
        model.set_attribute(obj, "name", Value::string(name));
        model.set_attribute(obj, "age", Value::integer(age));
    }
    model.set_attribute(&ada, "salary", Value::real(5200.0));
    model.set_attribute(&bob, "salary", Value::real(4100.5));
    model.set_attribute(&dee, "salary", Value::real(0.0));
    model.set_attribute(&ada, "badge", Value::integer(7));

    model.link(&ada, "employer", &acme);
    model.link(&bob, "employer", &acme);
    model.link(&acme, "employees", &ada);
    model.link(&acme, "employees", &bob);
    model.link(&ada, "friends", &bob);
    model.link(&ada, "friends", &cy);
    model.link(&bob, "friends", &ada);
    model.link(&ada, "children", &dee);
    model.link(&ada, "children", &cy);
    model.link(&bob, "manager", &ada);
    model.link(&dee, "manager", &bob);

    Ok(Company {
        model,
        acme,
        ada,
        bob,
        cy,
        dee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy_lookup() {
        let m = company_schema();
        assert_eq!(m.attribute_type("Employee", "age"), Some(Type::Integer));
        assert_eq!(m.attribute_type("Person", "badge"), None);
        assert!(m.class_conforms_to("Employee", "Person"));
        assert!(!m.class_conforms_to("Person", "Employee"));
        assert!(m.operation("Employee", "describe").is_some());
    }

    #[test]
    fn test_association_end_values() {
        let c = company().unwrap();
        let friends = c.model.get_association_end(&c.ada, "friends");
        assert_eq!(friends.as_collection().map(|c| c.len()), Some(2));
        assert!(c.model.get_association_end(&c.cy, "manager").is_undefined());
        let children = c.model.get_association_end(&c.ada, "children");
        assert_eq!(children.to_string(), "OrderedSet{@dee, @cy}");
    }

    #[test]
    fn test_all_instances_includes_subclasses() {
        let c = company().unwrap();
        assert_eq!(c.model.all_instances_of("Person").len(), 4);
        assert_eq!(c.model.all_instances_of("Employee").len(), 1);
        assert_eq!(c.model.all_instances_of("Company").len(), 1);
    }
}

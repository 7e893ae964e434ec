//! Navigation, type tests, query operations and traces against the company
//! fixture.

use ocl_eval::{EvalConfig, Evaluator, Value};
use ocl_ir::{CollectionPart, Expr, ExprBuilder, LoopKind, TypeTestKind};
use ocl_soundness::{bindings, company, eval_on, init_tracing, trace_on, Company};
use ocl_types::{CollectionKind, Type, TypeError, TypeResult};

fn person_builder(c: &Company) -> ExprBuilder<'_> {
    let mut b = ExprBuilder::new(&c.model);
    b.declare("self", Type::object("Person"));
    b
}

fn path(b: &ExprBuilder<'_>, steps: &[&str]) -> TypeResult<Expr> {
    let mut e = b.variable("self")?;
    for step in steps {
        e = b.navigate(e, step)?;
    }
    Ok(e)
}

fn names(v: &Value) -> Vec<String> {
    v.as_collection()
        .map(|c| {
            c.iter()
                .filter_map(|e| e.as_object().map(|o| o.name.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn attribute_and_single_end() {
    let c = company().unwrap();
    let b = person_builder(&c);
    let name = path(&b, &["name"]).unwrap();
    assert_eq!(eval_on(&c.model, &c.ada, &name).unwrap(), Value::string("Ada"));

    let employer_name = path(&b, &["employer", "name"]).unwrap();
    assert_eq!(employer_name.ty, Type::String);
    assert_eq!(
        eval_on(&c.model, &c.bob, &employer_name).unwrap(),
        Value::string("Acme")
    );
    // No employer: the whole path is Undefined.
    assert!(eval_on(&c.model, &c.cy, &employer_name)
        .unwrap()
        .is_undefined());
}

#[test]
fn to_many_ends() {
    let c = company().unwrap();
    let b = person_builder(&c);
    let friends = path(&b, &["friends"]).unwrap();
    assert_eq!(friends.ty, Type::set(Type::object("Person")));
    let value = eval_on(&c.model, &c.ada, &friends).unwrap();
    assert_eq!(names(&value), vec!["bob", "cy"]);

    let children = path(&b, &["children"]).unwrap();
    assert_eq!(children.ty, Type::ordered_set(Type::object("Person")));
    let first = b.call(children, "first", vec![]).unwrap();
    let first_name = b.navigate(first, "name").unwrap();
    assert_eq!(
        eval_on(&c.model, &c.ada, &first_name).unwrap(),
        Value::string("Dee")
    );
}

#[test]
fn shorthand_collect() {
    let c = company().unwrap();
    let b = person_builder(&c);

    let ages = path(&b, &["friends", "age"]).unwrap();
    assert_eq!(ages.ty, Type::bag(Type::Integer));
    assert_eq!(
        eval_on(&c.model, &c.ada, &ages).unwrap(),
        Value::bag(Type::Integer, vec![Value::integer(12), Value::integer(41)])
    );

    let child_names = path(&b, &["children", "name"]).unwrap();
    assert_eq!(child_names.ty, Type::sequence(Type::String));
    assert_eq!(
        eval_on(&c.model, &c.ada, &child_names).unwrap().to_string(),
        "Sequence{'Dee', 'Cy'}"
    );

    // to-many ends are flattened: Bag of people, not Bag of Sets.
    let coworkers_friends = path(&b, &["employer", "employees", "friends"]).unwrap();
    assert_eq!(coworkers_friends.ty, Type::bag(Type::object("Person")));
    let value = eval_on(&c.model, &c.ada, &coworkers_friends).unwrap();
    assert_eq!(value.as_collection().map(|c| c.len()), Some(3));
}

#[test]
fn all_instances_respects_hierarchy() {
    let c = company().unwrap();
    let b = person_builder(&c);
    let people = b.all_instances("Person").unwrap();
    let count = b.call(people, "size", vec![]).unwrap();
    assert_eq!(eval_on(&c.model, &c.ada, &count).unwrap(), Value::integer(4));

    let employees = b.all_instances("Employee").unwrap();
    assert_eq!(
        names(&eval_on(&c.model, &c.ada, &employees).unwrap()),
        vec!["ada"]
    );
}

#[test]
fn type_tests_use_dynamic_class() {
    let c = company().unwrap();
    let b = person_builder(&c);
    let me = || b.variable("self").unwrap();

    let kind_of = b
        .type_test(TypeTestKind::IsKindOf, me(), Type::object("Person"))
        .unwrap();
    let type_of = b
        .type_test(TypeTestKind::IsTypeOf, me(), Type::object("Person"))
        .unwrap();
    assert_eq!(eval_on(&c.model, &c.ada, &kind_of).unwrap(), Value::Boolean(true));
    assert_eq!(eval_on(&c.model, &c.ada, &type_of).unwrap(), Value::Boolean(false));
    assert_eq!(eval_on(&c.model, &c.bob, &type_of).unwrap(), Value::Boolean(true));

    let cast = b
        .type_test(TypeTestKind::AsType, me(), Type::object("Employee"))
        .unwrap();
    let badge = b.navigate(cast, "badge").unwrap();
    assert_eq!(eval_on(&c.model, &c.ada, &badge).unwrap(), Value::integer(7));
    // A failed cast is Undefined, not an error.
    assert!(eval_on(&c.model, &c.bob, &badge).unwrap().is_undefined());
}

#[test]
fn unrelated_cast_is_rejected_at_build_time() {
    let c = company().unwrap();
    let b = person_builder(&c);
    let err = b
        .type_test(
            TypeTestKind::AsType,
            b.variable("self").unwrap(),
            Type::object("Company"),
        )
        .unwrap_err();
    assert!(matches!(err, TypeError::InvalidCast { .. }));
}

#[test]
fn query_operations() {
    let c = company().unwrap();
    let b = person_builder(&c);
    let describe = b
        .call(b.variable("self").unwrap(), "describe", vec![])
        .unwrap();
    assert_eq!(describe.ty, Type::String);
    assert_eq!(
        eval_on(&c.model, &c.ada, &describe).unwrap(),
        Value::string("Ada (adult)")
    );
    assert_eq!(
        eval_on(&c.model, &c.cy, &describe).unwrap(),
        Value::string("Cy (minor)")
    );

    // Person.allInstances()->select(p | self.isOlderThan(p))
    let mut b = person_builder(&c);
    let people = b.all_instances("Person").unwrap();
    let younger = b
        .loop_expr(LoopKind::Select, people, &["p"], |b| {
            b.call(b.variable("self")?, "isOlderThan", vec![b.variable("p")?])
        })
        .unwrap();
    let value = eval_on(&c.model, &c.ada, &younger).unwrap();
    let mut found = names(&value);
    found.sort();
    assert_eq!(found, vec!["cy", "dee"]);
}

#[test]
fn query_operation_arguments_are_checked() {
    let c = company().unwrap();
    let b = person_builder(&c);
    let err = b
        .call(
            b.variable("self").unwrap(),
            "isOlderThan",
            vec![b.integer(3)],
        )
        .unwrap_err();
    assert!(matches!(err, TypeError::TypeMismatch { .. }));
}

#[test]
fn unset_attribute_propagates() {
    let c = company().unwrap();
    let b = person_builder(&c);
    let salary = path(&b, &["salary"]).unwrap();
    let positive = b.binary(salary, ">=", b.real(0.0)).unwrap();
    assert!(eval_on(&c.model, &c.cy, &positive).unwrap().is_undefined());
    assert_eq!(
        eval_on(&c.model, &c.dee, &positive).unwrap(),
        Value::Boolean(true)
    );
}

#[test]
fn closure_over_managers() {
    let c = company().unwrap();
    let mut b = person_builder(&c);
    let me = b.variable("self").unwrap();
    let start = b
        .collection(CollectionKind::Set, vec![CollectionPart::Item(me)], None)
        .unwrap();
    let chain = b
        .loop_expr(LoopKind::Closure, start, &["p"], |b| {
            b.navigate(b.variable("p")?, "manager")
        })
        .unwrap();
    assert_eq!(chain.ty, Type::set(Type::object("Person")));
    let value = eval_on(&c.model, &c.dee, &chain).unwrap();
    assert_eq!(names(&value), vec!["ada", "bob"]);
}

#[test]
fn failing_leaves_point_at_the_violation() {
    init_tracing();
    let c = company().unwrap();
    let mut b = person_builder(&c);

    // self.friends->forAll(f | f.age >= 18)
    let friends = path(&b, &["friends"]).unwrap();
    let inv = b
        .loop_expr(LoopKind::ForAll, friends, &["f"], |b| {
            let age = b.navigate(b.variable("f")?, "age")?;
            b.binary(age, ">=", b.integer(18))
        })
        .unwrap();

    let (value, trace) = trace_on(&c.model, &c.ada, &inv).unwrap();
    assert_eq!(value, Value::Boolean(false));
    let leaves: Vec<&str> = trace
        .failing_leaves()
        .iter()
        .map(|e| e.expr.as_str())
        .collect();
    assert_eq!(leaves, vec!["f.age >= 18"]);
    let cy_age = trace
        .entries()
        .find(|e| e.expr == "f.age" && e.result == Value::integer(12));
    assert!(cy_age.is_some());
    assert_eq!(trace.root().map(|e| e.result.clone()), Some(Value::Boolean(false)));

    let (value, trace) = trace_on(&c.model, &c.bob, &inv).unwrap();
    assert_eq!(value, Value::Boolean(true));
    assert!(trace.failing_leaves().is_empty());
}

#[test]
fn configured_trace_recording() {
    let c = company().unwrap();
    let b = person_builder(&c);
    let e = path(&b, &["employer", "name"]).unwrap();
    let evaluator = Evaluator::new(&c.model).with_config(EvalConfig {
        max_trace_entries: 2,
        log_nodes: true,
        ..EvalConfig::default()
    });
    let (value, trace) = evaluator
        .evaluate_with_trace(&e, &bindings(&[("self", Value::object(c.ada.clone()))]))
        .unwrap();
    assert_eq!(value, Value::string("Acme"));
    assert_eq!(trace.len(), 2);
    assert_eq!(trace.dropped(), 1);
    assert_eq!(
        trace.root().map(|e| e.expr.as_str()),
        Some("self.employer.name")
    );
}

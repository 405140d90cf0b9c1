//! End-to-end tests of the annotation pipeline: parse, expand, evaluate,
//! inspect through the public API.

use jsight::{Analyzer, ContextKind, ExcKind, Payload, ValueKind};

fn annotate(code: &str) -> Analyzer {
    let mut analyzer = Analyzer::new(code);
    analyzer.annotate().expect("source should analyze");
    analyzer
}

fn annotate_with_precode(code: &str, precode: &str) -> Analyzer {
    let mut analyzer = Analyzer::new(code);
    analyzer.augment(precode);
    analyzer.annotate().expect("source should analyze");
    analyzer
}

#[test]
fn literal_addition() {
    let analyzer = annotate("var x = 1 + 2;");
    let analysis = analyzer.analysis().unwrap();
    let x = analysis.lookup("x").expect("x is declared");
    let value = analysis.get(x).value().expect("x has a value");
    assert_eq!(value.items().len(), 1);
    assert_eq!(value.items()[0].kind, ValueKind::Int);
    assert_eq!(value.items()[0].payload, Payload::Int(3));
    assert_eq!(value.items()[0].condition, None);
}

#[test]
fn jsdoc_random_influences_return() {
    let analyzer = annotate_with_precode(
        "var x = randomNumber();",
        "/** @returns {random} */\nfunction randomNumber() { return 0; }",
    );
    let analysis = analyzer.analysis().unwrap();
    let x = analysis.lookup("x").expect("x is declared");
    let context = analysis.get(x);
    // The declared-type annotation comes from the callee's @returns.
    assert_eq!(context.annotation().ty.as_deref(), Some("random"));
    let value = context.value().expect("x has a value");
    assert_eq!(value.items().len(), 1);
    assert_eq!(value.items()[0].kind, ValueKind::Random);
    assert_eq!(value.items()[0].payload, Payload::FloatSpan(0.0, 1.0));
}

#[test]
fn dead_branch_is_pruned() {
    let analyzer = annotate("var x = 0; if (false) { x = 1; }");
    let analysis = analyzer.analysis().unwrap();
    let x = analysis.lookup("x").unwrap();
    let value = analysis.get(x).value().unwrap();
    assert_eq!(value.items().len(), 1);
    assert_eq!(value.items()[0].kind, ValueKind::Int);
    assert_eq!(value.items()[0].payload, Payload::Int(0));
    assert_eq!(value.items()[0].condition, None);
}

#[test]
fn class_instantiation_counts() {
    let analyzer = annotate(
        "class Sprite { constructor() {} }
         function createSprite() { return new Sprite(); }
         createSprite();
         createSprite();",
    );
    let analysis = analyzer.analysis().unwrap();
    let sprite = analysis.lookup("Sprite").unwrap();
    assert_eq!(analysis.get(sprite).instanced(), 2);
    let create = analysis.lookup("createSprite").unwrap();
    assert_eq!(analysis.get(create).called(), 2);
}

#[test]
fn unknown_receiver_raises() {
    let analyzer = annotate("missing.doIt();");
    let analysis = analyzer.analysis().unwrap();
    let raised = analysis
        .raises()
        .get(&ExcKind::ReferenceError)
        .expect("a ReferenceError was observed");
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].message, "missing is not defined");
    assert_eq!(raised[0].condition, None);
}

#[test]
fn conditional_call_tally() {
    let analyzer = annotate(
        "function f() {}
         function g(k) { if (k === \"right\") { f(); } }
         g(\"right\");",
    );
    let analysis = analyzer.analysis().unwrap();
    let f = analysis.lookup("f").unwrap();
    let context = analysis.get(f);
    assert_eq!(context.called(), 0);
    let tally = context.tally().unwrap();
    assert_eq!(tally.called_when().len(), 1);
    let conditional = tally.called_when().values().next().unwrap();
    assert_eq!(conditional.count, 1);
    assert!(conditional.condition.is_true());
    let g = analysis.lookup("g").unwrap();
    assert_eq!(analysis.get(g).called(), 1);
}

#[test]
fn direct_construction_bubbles_to_root() {
    let analyzer = annotate(
        "class Sprite { constructor() {} }
         new Sprite();
         new Sprite();",
    );
    let analysis = analyzer.analysis().unwrap();
    let sprite = analysis.lookup("Sprite").unwrap();
    assert_eq!(analysis.get(sprite).instanced(), 2);
    let root_scope = analysis.get(analysis.root()).scope().unwrap();
    assert_eq!(root_scope.instantiates().get(&sprite), Some(&2));
}

#[test]
fn callee_tallies_propagate_instantiations_to_callers() {
    // The callee's captured tally is applied at the call site before the
    // body runs, so the root sees the counts from earlier calls only.
    let analyzer = annotate(
        "class Sprite { constructor() {} }
         function createSprite() { return new Sprite(); }
         createSprite();
         createSprite();",
    );
    let analysis = analyzer.analysis().unwrap();
    let sprite = analysis.lookup("Sprite").unwrap();
    let create = analysis.lookup("createSprite").unwrap();
    let create_scope = analysis.get(create).scope().unwrap();
    assert_eq!(create_scope.instantiates().get(&sprite), Some(&2));
    let root_scope = analysis.get(analysis.root()).scope().unwrap();
    assert_eq!(root_scope.instantiates().get(&sprite), Some(&1));
}

#[test]
fn constructor_result_is_the_reference() {
    let analyzer = annotate(
        "class Sprite { constructor() { return 42; } }
         var s = new Sprite();",
    );
    let analysis = analyzer.analysis().unwrap();
    let s = analysis.lookup("s").unwrap();
    let value = analysis.get(s).value().unwrap();
    assert_eq!(value.items().len(), 1);
    assert_eq!(value.items()[0].kind, ValueKind::Reference);
    assert_eq!(value.kinds(analysis.contexts()), vec!["@Sprite"]);
}

#[test]
fn constructor_property_assignment_lands_on_instance() {
    let analyzer = annotate(
        "class Thing { constructor(size) { this.size = size; } }
         var t = new Thing(5);",
    );
    let analysis = analyzer.analysis().unwrap();
    let t = analysis.lookup("t").unwrap();
    let value = analysis.get(t).value().unwrap();
    let Payload::Reference(reference) = value.items()[0].payload else {
        panic!("t should hold a reference");
    };
    // Lookup through the variable pierces into the reference's properties.
    let size = analysis.contexts().lookup_in(t, "size", false).expect("size exists");
    let size_value = analysis.get(size).value().expect("size has a value");
    assert_eq!(size_value.items()[0].payload, Payload::Int(5));
    // And the reference context records it directly.
    let ContextKind::Reference { properties, .. } = analysis.get(reference).kind() else {
        panic!("expected a reference context");
    };
    assert!(properties.contains_key("size"));
}

#[test]
fn accessor_members_become_properties() {
    let analyzer = annotate(
        "class Box {
           get size() { return 1; }
           set size(s) { }
         }",
    );
    let analysis = analyzer.analysis().unwrap();
    let class = analysis.lookup("Box").unwrap();
    let property = analysis.contexts().lookup_in(class, "size", false).expect("size exists");
    let ContextKind::Property {
        readable,
        writable,
        getter,
        setter,
    } = analysis.get(property).kind()
    else {
        panic!("size should be a property");
    };
    assert!(*readable);
    assert!(*writable);
    assert!(getter.is_some());
    assert!(setter.is_some());
}

#[test]
fn assignment_shadows_accessor_property() {
    let analyzer = annotate(
        "class Box {
           constructor() { this.size = 3; }
           get size() { return 1; }
           set size(s) { }
         }
         var b = new Box();",
    );
    let analysis = analyzer.analysis().unwrap();
    let b = analysis.lookup("b").unwrap();
    // The instance now answers with the shadowing variable, not the
    // accessor property.
    let size = analysis.contexts().lookup_in(b, "size", false).expect("size exists");
    assert!(matches!(analysis.get(size).kind(), ContextKind::Variable { .. }));
    assert_eq!(analysis.get(size).value().unwrap().items()[0].payload, Payload::Int(3));
}

#[test]
fn instance_method_calls_tally_per_reference() {
    let analyzer = annotate(
        "class Counter { constructor() {} tick() { return 1; } }
         var c = new Counter();
         c.tick();
         c.tick();",
    );
    let analysis = analyzer.analysis().unwrap();
    let c = analysis.lookup("c").unwrap();
    let Payload::Reference(reference) = analysis.get(c).value().unwrap().items()[0].payload else {
        panic!("c should hold a reference");
    };
    let ContextKind::Reference { methods, .. } = analysis.get(reference).kind() else {
        panic!("expected a reference context");
    };
    assert_eq!(methods.get("tick").map(jsight::CallTally::called), Some(2));

    let rendered = analysis.render_reference(reference, "");
    assert!(rendered.contains("tick()"));
    assert!(rendered.contains("called 2 times"));
}

#[test]
fn static_method_call() {
    let analyzer = annotate(
        "class MathUtil { static twice(x) { return x * 2; } }
         var y = MathUtil.twice(21);",
    );
    let analysis = analyzer.analysis().unwrap();
    let y = analysis.lookup("y").unwrap();
    assert_eq!(analysis.get(y).value().unwrap().items()[0].payload, Payload::Int(42));

    let class = analysis.lookup("MathUtil").unwrap();
    let twice = analysis.contexts().lookup_in(class, "twice", false).unwrap();
    assert!(matches!(analysis.get(twice).kind(), ContextKind::Function { .. }));
    assert_eq!(analysis.get(twice).called(), 1);

    // No instance tallies were touched: the class has no references.
    let ContextKind::Class { .. } = analysis.get(class).kind() else {
        panic!("expected a class");
    };
}

#[test]
fn method_return_flows_through_member_call() {
    let analyzer = annotate(
        "class Pair { constructor() {} sum() { return 3 + 4; } }
         var p = new Pair();
         var total = p.sum();",
    );
    let analysis = analyzer.analysis().unwrap();
    let total = analysis.lookup("total").unwrap();
    assert_eq!(analysis.get(total).value().unwrap().items()[0].payload, Payload::Int(7));
}

#[test]
fn raised_operand_contaminates_expression() {
    let analyzer = annotate("var z = missing.doIt() + 1;");
    let analysis = analyzer.analysis().unwrap();
    let z = analysis.lookup("z").unwrap();
    let value = analysis.get(z).value().unwrap();
    assert!(value.has_raised());
    assert!(!value.is_true());
    // The raise also bubbled to the program root.
    assert!(analysis.raises().contains_key(&ExcKind::ReferenceError));
}

#[test]
fn unconditional_return_short_circuits() {
    // With an always-true test, the conditional return dominates: the
    // combine scan stops at the first item whose condition holds.
    let analyzer = annotate(
        "function pick(k) { if (k > 10) { return 1; } return 2; }
         var r = pick(20);",
    );
    let analysis = analyzer.analysis().unwrap();
    let r = analysis.lookup("r").unwrap();
    let value = analysis.get(r).value().unwrap();
    assert_eq!(value.items().len(), 1);
    assert_eq!(value.items()[0].payload, Payload::Int(1));
    assert!(value.items()[0].condition.is_some());
}

#[test]
fn pruned_branch_leaves_fallthrough_return() {
    let analyzer = annotate(
        "function pick(k) { if (k > 10) { return 1; } return 2; }
         var r = pick(5);",
    );
    let analysis = analyzer.analysis().unwrap();
    let r = analysis.lookup("r").unwrap();
    let value = analysis.get(r).value().unwrap();
    assert_eq!(value.items().len(), 1);
    assert_eq!(value.items()[0].payload, Payload::Int(2));
    assert_eq!(value.items()[0].condition, None);
}

#[test]
fn precode_conditional_function() {
    // The precode function is only expanded, never annotated on its own;
    // its body is evaluated at the call site with the bound argument.
    let mut analyzer = Analyzer::new("var went = keyWentDown(\"right\");");
    analyzer.augment(
        "function keyWentDown(key) {
           if (key === \"right\") { return true; }
           return false;
         }",
    );
    let analysis = analyzer.annotate().expect("source should analyze");
    let went = analysis.lookup("went").unwrap();
    let value = analysis.get(went).value().unwrap();
    assert_eq!(value.items().len(), 1);
    assert_eq!(value.items()[0].kind, ValueKind::Bool);
    assert_eq!(value.items()[0].payload, Payload::Bool(true));
}

#[test]
fn reannotation_is_reproducible() {
    let mut analyzer = Analyzer::new(
        "class Sprite { constructor() {} }
         function createSprite() { return new Sprite(); }
         createSprite();
         createSprite();",
    );
    analyzer.annotate().expect("first run");
    let first = {
        let analysis = analyzer.analysis().unwrap();
        let sprite = analysis.lookup("Sprite").unwrap();
        (analysis.get(sprite).instanced(), analysis.contexts().len())
    };
    analyzer.annotate().expect("second run");
    let analysis = analyzer.analysis().unwrap();
    let sprite = analysis.lookup("Sprite").unwrap();
    assert_eq!((analysis.get(sprite).instanced(), analysis.contexts().len()), first);
}

#[test]
fn augment_invalidates_precode_cache() {
    let mut analyzer = Analyzer::new("var x = stub();");
    analyzer.augment("function stub() { return 1; }");
    analyzer.annotate().expect("first run");
    assert!(analyzer.analysis().unwrap().lookup("extra").is_none());

    analyzer.augment("function extra() { return 2; }");
    let analysis = analyzer.annotate().expect("second run");
    assert!(analysis.lookup("extra").is_some());
    // The earlier precode is still present.
    assert!(analysis.lookup("stub").is_some());
}

#[test]
fn recursion_is_bounded() {
    let analyzer = annotate("function again() { return again(); } again();");
    let analysis = analyzer.analysis().unwrap();
    let again = analysis.lookup("again").unwrap();
    // Two distinct call sites: the top-level one and the one in the body.
    assert_eq!(analysis.get(again).called(), 2);
}

#[test]
fn condition_stacks_are_balanced_after_annotation() {
    let analyzer = annotate(
        "function f(k) {
           if (k > 0) {
             if (k > 1) { return 2; }
             return 1;
           }
           return 0;
         }
         f(5);
         f(0);",
    );
    let analysis = analyzer.analysis().unwrap();
    for id in analysis.contexts().ids() {
        assert_eq!(analysis.get(id).condition_depth(), 0, "unbalanced condition stack");
    }
}

#[test]
fn unsupported_statements_do_not_derail_analysis() {
    let analyzer = annotate(
        "var x = 1;
         for (i = 0; i < 10; i = i + 1) { x = i; }
         var y = x + 1;",
    );
    let analysis = analyzer.analysis().unwrap();
    let y = analysis.lookup("y").unwrap();
    assert_eq!(analysis.get(y).value().unwrap().items()[0].payload, Payload::Int(2));
}

#[test]
fn assignment_expression_yields_its_value() {
    let analyzer = annotate("var x = 0; var y = x = 5;");
    let analysis = analyzer.analysis().unwrap();
    let x = analysis.lookup("x").unwrap();
    let y = analysis.lookup("y").unwrap();
    assert_eq!(analysis.get(x).value().unwrap().items()[0].payload, Payload::Int(5));
    assert_eq!(analysis.get(y).value().unwrap().items()[0].payload, Payload::Int(5));
}

#[test]
fn member_read_returns_current_value() {
    let analyzer = annotate(
        "class Thing { constructor() { this.n = 9; } }
         var t = new Thing();
         var n = t.n;",
    );
    let analysis = analyzer.analysis().unwrap();
    let n = analysis.lookup("n").unwrap();
    assert_eq!(analysis.get(n).value().unwrap().items()[0].payload, Payload::Int(9));
}

#[test]
fn conditional_assignment_tags_the_stored_value() {
    let analyzer = annotate("var x = 0; if (1 < 2) { x = 7; }");
    let analysis = analyzer.analysis().unwrap();
    let x = analysis.lookup("x").unwrap();
    let value = analysis.get(x).value().unwrap();
    assert_eq!(value.items().len(), 1);
    assert_eq!(value.items()[0].payload, Payload::Int(7));
    let condition = value.items()[0].condition.as_ref().expect("stored under a condition");
    assert!(condition.is_true());
}

#[test]
fn unbound_parameters_are_variants() {
    let analyzer = annotate("function id(v) { return v; } var out = id();");
    let analysis = analyzer.analysis().unwrap();
    let out = analysis.lookup("out").unwrap();
    let value = analysis.get(out).value().unwrap();
    assert_eq!(value.items()[0].kind, ValueKind::Variant);
    assert_eq!(value.items()[0].payload, Payload::Variant);
}

//! Tests of the textual tree rendering and the JSON report mirror.

use jsight::Analyzer;
use pretty_assertions::assert_eq;

const SOURCE: &str = "\
class Sprite {
  constructor() {}
  update() { return 1; }
  get width() { return 10; }
}
function makeSprite() { return new Sprite(); }
var s = makeSprite();
var n = 1 + 1;
";

#[test]
fn renders_the_annotated_tree() {
    let mut analyzer = Analyzer::new(SOURCE);
    let analysis = analyzer.annotate().expect("source should analyze");
    let expected = "\
class Sprite:
  constructed: 1 times
  constructor()
    called 0 times
  update()
    called 0 times
  get width
var s: [@Sprite]
var n: [int]
fn makeSprite()
  called 1 times
";
    assert_eq!(analysis.render(), expected);
    // Display mirrors render().
    assert_eq!(analysis.to_string(), expected);
}

#[test]
fn renders_conditional_call_tallies() {
    let mut analyzer = Analyzer::new(
        "function f() {}
         function g(k) { if (k === \"go\") { f(); } }
         g(\"go\");",
    );
    let analysis = analyzer.annotate().expect("source should analyze");
    let rendered = analysis.render();
    assert!(rendered.contains("fn f()"));
    assert!(rendered.contains("called 0 times"));
    assert!(rendered.contains("called 1 times when"));
}

#[test]
fn report_mirrors_the_tree() {
    let mut analyzer = Analyzer::new(SOURCE);
    let analysis = analyzer.annotate().expect("source should analyze");
    let report = serde_json::to_value(analysis.report()).expect("report serializes");

    assert_eq!(report["classes"][0]["name"], "Sprite");
    assert_eq!(report["classes"][0]["instanced"], 1);
    assert_eq!(report["classes"][0]["methods"][0]["name"], "constructor");
    assert_eq!(report["classes"][0]["methods"][1]["name"], "update");
    assert_eq!(report["classes"][0]["properties"][0]["name"], "width");
    assert_eq!(report["classes"][0]["properties"][0]["readable"], true);
    assert_eq!(report["classes"][0]["properties"][0]["writable"], false);

    assert_eq!(report["variables"][0]["name"], "s");
    assert_eq!(report["variables"][0]["types"][0], "@Sprite");
    assert_eq!(report["variables"][1]["name"], "n");
    assert_eq!(report["variables"][1]["values"][0], "2");

    assert_eq!(report["functions"][0]["name"], "makeSprite");
    assert_eq!(report["functions"][0]["called"], 1);
    assert!(report["raises"].as_array().unwrap().is_empty());
}

#[test]
fn report_carries_raises() {
    let mut analyzer = Analyzer::new("missing.doIt();");
    let analysis = analyzer.annotate().expect("source should analyze");
    let report = serde_json::to_value(analysis.report()).expect("report serializes");
    assert_eq!(report["raises"][0]["exception"], "ReferenceError");
    assert_eq!(report["raises"][0]["message"], "missing is not defined");
}

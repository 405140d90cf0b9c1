use std::fmt::Write;

use serde::Serialize;

use crate::context::{CallTally, ContextId, ContextKind, Contexts};

/// Renders the semantic tree under a root scope as an indented listing:
/// classes first, then variables with their witnessed kinds, functions
/// with call tallies, and the scope's instantiation counts.
pub(crate) fn render_program(contexts: &Contexts, root: ContextId) -> String {
    let mut out = String::new();
    render_scope(contexts, root, "", &mut out);
    out
}

fn render_scope(contexts: &Contexts, ctx: ContextId, indent: &str, out: &mut String) {
    let Some(scope) = contexts.get(ctx).scope() else {
        return;
    };
    let nested = format!("{indent}  ");

    for (name, &class) in scope.classes() {
        let _ = writeln!(out, "{indent}class {name}:");
        render_class(contexts, class, &nested, out);
    }
    for (name, &variable) in scope.variables() {
        match contexts.get(variable).value() {
            Some(value) => {
                let _ = writeln!(out, "{indent}var {name}: [{}]", value.kinds(contexts).join(", "));
            }
            None => {
                let _ = writeln!(out, "{indent}var {name}: ?");
            }
        }
    }
    for (name, &function) in scope.functions() {
        render_callable_line(contexts, function, name, "fn ", "()", indent, out);
    }
    for (&class, &count) in scope.instantiates() {
        let class_name = contexts.get(class).name().unwrap_or("{}");
        let _ = writeln!(out, "{indent}instantiates {class_name}: {count}");
    }
}

fn render_class(contexts: &Contexts, class: ContextId, indent: &str, out: &mut String) {
    let ContextKind::Class {
        scope,
        methods,
        properties,
        instanced,
    } = &contexts.get(class).kind
    else {
        return;
    };
    let _ = writeln!(out, "{indent}constructed: {instanced} times");

    for (name, &function) in scope.functions() {
        render_callable_line(contexts, function, name, "static ", "()", indent, out);
    }
    for (name, &method) in methods {
        render_callable_line(contexts, method, name, "", "()", indent, out);
    }
    for (name, &property) in properties {
        if let ContextKind::Property {
            readable, writable, ..
        } = &contexts.get(property).kind
        {
            let mut access = Vec::new();
            if *readable {
                access.push("get");
            }
            if *writable {
                access.push("set");
            }
            let _ = writeln!(out, "{indent}{} {name}", access.join("/"));
        }
    }
}

fn render_callable_line(
    contexts: &Contexts,
    callable: ContextId,
    name: &str,
    prefix: &str,
    suffix: &str,
    indent: &str,
    out: &mut String,
) {
    match &contexts.get(callable).annotation().returns {
        Some(returns) => {
            let _ = writeln!(out, "{indent}{prefix}{name}{suffix} -> {returns}");
        }
        None => {
            let _ = writeln!(out, "{indent}{prefix}{name}{suffix}");
        }
    }
    if let Some(tally) = contexts.get(callable).tally() {
        render_tally(tally, &format!("{indent}  "), out);
    }
}

fn render_tally(tally: &CallTally, indent: &str, out: &mut String) {
    let _ = writeln!(out, "{indent}called {} times", tally.called());
    for conditional in tally.called_when().values() {
        let _ = writeln!(
            out,
            "{indent}called {} times when {}",
            conditional.count, conditional.condition
        );
    }
}

/// Renders one abstract instance: the instance's own method tallies (in
/// the class's method order) and its witnessed property values. Names
/// with a `_` prefix are treated as private and skipped.
pub(crate) fn render_reference(contexts: &Contexts, reference: ContextId, indent: &str) -> String {
    let mut out = String::new();
    let ContextKind::Reference {
        class,
        methods,
        properties,
    } = &contexts.get(reference).kind
    else {
        return out;
    };

    if let ContextKind::Class {
        methods: class_methods,
        ..
    } = &contexts.get(*class).kind
    {
        for name in class_methods.keys() {
            if let Some(tally) = methods.get(name) {
                let _ = writeln!(out, "{indent}{name}()");
                render_tally(tally, &format!("{indent}  "), &mut out);
            }
        }
    }
    for (name, &property) in properties {
        if name.starts_with('_') {
            continue;
        }
        let payloads: Vec<String> = contexts
            .get(property)
            .value()
            .map(|value| value.items().iter().map(|item| item.payload.to_string()).collect())
            .unwrap_or_default();
        let _ = writeln!(out, "{indent}{name}: [{}]", payloads.join(", "));
    }
    out
}

// === machine-readable mirror ===

/// A serializable summary of an analysis, mirroring the rendered tree.
#[derive(Debug, Serialize)]
pub struct Report {
    pub classes: Vec<ClassReport>,
    pub variables: Vec<VariableReport>,
    pub functions: Vec<FunctionReport>,
    pub instantiates: Vec<InstantiatesReport>,
    pub raises: Vec<RaisedReport>,
}

impl Report {
    /// Pretty-printed JSON form of the report.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("report serialization cannot fail")
    }
}

#[derive(Debug, Serialize)]
pub struct ClassReport {
    pub name: String,
    pub instanced: u32,
    pub statics: Vec<FunctionReport>,
    pub methods: Vec<FunctionReport>,
    pub properties: Vec<PropertyReport>,
}

#[derive(Debug, Serialize)]
pub struct FunctionReport {
    pub name: String,
    pub returns: Option<String>,
    pub called: u32,
    pub called_when: Vec<ConditionalReport>,
}

#[derive(Debug, Serialize)]
pub struct ConditionalReport {
    pub condition: String,
    pub count: u32,
}

#[derive(Debug, Serialize)]
pub struct PropertyReport {
    pub name: String,
    pub readable: bool,
    pub writable: bool,
}

#[derive(Debug, Serialize)]
pub struct VariableReport {
    pub name: String,
    pub types: Vec<String>,
    pub values: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct InstantiatesReport {
    pub class: String,
    pub count: u32,
}

#[derive(Debug, Serialize)]
pub struct RaisedReport {
    pub exception: String,
    pub message: String,
}

pub(crate) fn build_report(contexts: &Contexts, root: ContextId) -> Report {
    let mut report = Report {
        classes: Vec::new(),
        variables: Vec::new(),
        functions: Vec::new(),
        instantiates: Vec::new(),
        raises: Vec::new(),
    };
    let Some(scope) = contexts.get(root).scope() else {
        return report;
    };

    for (name, &class) in scope.classes() {
        if let ContextKind::Class {
            scope: class_scope,
            methods,
            properties,
            instanced,
        } = &contexts.get(class).kind
        {
            report.classes.push(ClassReport {
                name: name.clone(),
                instanced: *instanced,
                statics: class_scope
                    .functions()
                    .iter()
                    .map(|(name, &id)| function_report(contexts, id, name))
                    .collect(),
                methods: methods
                    .iter()
                    .map(|(name, &id)| function_report(contexts, id, name))
                    .collect(),
                properties: properties
                    .iter()
                    .filter_map(|(name, &id)| match &contexts.get(id).kind {
                        ContextKind::Property {
                            readable, writable, ..
                        } => Some(PropertyReport {
                            name: name.clone(),
                            readable: *readable,
                            writable: *writable,
                        }),
                        _ => None,
                    })
                    .collect(),
            });
        }
    }
    for (name, &variable) in scope.variables() {
        let context = contexts.get(variable);
        report.variables.push(VariableReport {
            name: name.clone(),
            types: context.value().map(|value| value.kinds(contexts)).unwrap_or_default(),
            values: context
                .value()
                .map(|value| value.items().iter().map(|item| item.payload.to_string()).collect())
                .unwrap_or_default(),
        });
    }
    for (name, &function) in scope.functions() {
        report.functions.push(function_report(contexts, function, name));
    }
    for (&class, &count) in scope.instantiates() {
        report.instantiates.push(InstantiatesReport {
            class: contexts.get(class).name().unwrap_or("{}").to_owned(),
            count,
        });
    }
    for raised_list in contexts.get(root).raised().values() {
        for raised in raised_list {
            report.raises.push(RaisedReport {
                exception: raised.exception.to_string(),
                message: raised.message.clone(),
            });
        }
    }
    report
}

fn function_report(contexts: &Contexts, id: ContextId, name: &str) -> FunctionReport {
    let context = contexts.get(id);
    FunctionReport {
        name: name.to_owned(),
        returns: context.annotation().returns.clone(),
        called: context.called(),
        called_when: context
            .tally()
            .map(|tally| {
                tally
                    .called_when()
                    .values()
                    .map(|conditional| ConditionalReport {
                        condition: conditional.condition.to_string(),
                        count: conditional.count,
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

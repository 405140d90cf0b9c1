use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::{
    ast::{self, Span},
    raised::{ExcKind, Raised},
    value::{Payload, Value},
};

/// Unique identifier for a node in the context graph.
///
/// Contexts are arena-allocated: children hold owning entries in the arena
/// and every cross-reference (parent links, reference payloads, class
/// back-pointers) is an id, so the parent/child cycle never becomes an
/// ownership cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ContextId(u32);

impl ContextId {
    fn new(index: usize) -> Self {
        Self(index.try_into().expect("context id overflow"))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Annotation attached to a declaration: the JSDoc return type for
/// callables, the inferred declared type for variables.
#[derive(Debug, Clone, Default)]
pub struct Annotation {
    pub returns: Option<String>,
    pub ty: Option<String>,
}

/// A lexical scope's tables. Iteration order is declaration order, which
/// the renderer relies on.
#[derive(Debug, Default)]
pub struct Scope {
    variables: IndexMap<String, ContextId>,
    functions: IndexMap<String, ContextId>,
    classes: IndexMap<String, ContextId>,
    declarations: Vec<ContextId>,
    raises: Vec<Raised>,
    /// Classes this scope may instantiate, with how often. Bubbles upward;
    /// function contexts capture it so callers can re-apply their tally.
    instantiates: IndexMap<ContextId, u32>,
}

impl Scope {
    pub fn variables(&self) -> &IndexMap<String, ContextId> {
        &self.variables
    }

    pub fn functions(&self) -> &IndexMap<String, ContextId> {
        &self.functions
    }

    pub fn classes(&self) -> &IndexMap<String, ContextId> {
        &self.classes
    }

    pub fn declarations(&self) -> &[ContextId] {
        &self.declarations
    }

    pub fn raises(&self) -> &[Raised] {
        &self.raises
    }

    pub fn instantiates(&self) -> &IndexMap<ContextId, u32> {
        &self.instantiates
    }
}

/// Call bookkeeping for a declared callable.
///
/// Sites are deduplicated by span so a call site reached again (a body
/// re-annotated for a later call) counts once. Conditional tallies bucket
/// by the condition's render string; the condition Value itself is kept
/// beside the count for inspection.
#[derive(Debug, Default)]
pub struct CallTally {
    sites: AHashSet<Span>,
    called: u32,
    called_when: IndexMap<String, ConditionalCalls>,
}

#[derive(Debug)]
pub struct ConditionalCalls {
    pub condition: Value,
    pub count: u32,
}

impl CallTally {
    fn add(&mut self, site: Span, condition: Option<&Value>) {
        if !self.sites.insert(site) {
            return;
        }
        match condition {
            None => self.called += 1,
            Some(condition) => {
                self.called_when
                    .entry(condition.fingerprint())
                    .or_insert_with(|| ConditionalCalls {
                        condition: condition.clone(),
                        count: 0,
                    })
                    .count += 1;
            }
        }
    }

    /// Unconditional call count.
    pub fn called(&self) -> u32 {
        self.called
    }

    /// Condition-keyed call counts.
    pub fn called_when(&self) -> &IndexMap<String, ConditionalCalls> {
        &self.called_when
    }
}

/// What a context is. Every variant shares the common protocol on
/// [`Context`]; lookup and aggregation specialize per variant.
#[derive(Debug)]
pub enum ContextKind {
    /// The root scope; owns everything reachable from the program.
    Program { scope: Scope },
    /// A nested lexical block.
    Block { scope: Scope },
    /// The top-level block of one function activation; collects the
    /// return values observed while its body is evaluated.
    FunctionBlock { scope: Scope, returns: Vec<Value> },
    /// A declared function (or a class's static method).
    Function {
        scope: Scope,
        def: Rc<ast::Function>,
        tally: CallTally,
    },
    /// An instance method; calls through an instance tally on that
    /// instance's reference, not here.
    Method {
        scope: Scope,
        def: Rc<ast::Function>,
        tally: CallTally,
    },
    /// A declared class: instance methods, accessor properties, static
    /// functions (in the scope), and an instantiation count.
    Class {
        scope: Scope,
        methods: IndexMap<String, ContextId>,
        properties: IndexMap<String, ContextId>,
        instanced: u32,
    },
    /// One abstract instance of a class: per-instance method tallies and
    /// property bindings. Name lookup falls through to the class.
    Reference {
        class: ContextId,
        methods: IndexMap<String, CallTally>,
        properties: IndexMap<String, ContextId>,
    },
    /// A binding with a current abstract value.
    Variable { value: Option<Value> },
    /// An accessor-backed member: up to one getter and one setter method.
    Property {
        readable: bool,
        writable: bool,
        getter: Option<ContextId>,
        setter: Option<ContextId>,
    },
}

impl ContextKind {
    pub(crate) fn scope(&self) -> Option<&Scope> {
        match self {
            Self::Program { scope }
            | Self::Block { scope }
            | Self::FunctionBlock { scope, .. }
            | Self::Function { scope, .. }
            | Self::Method { scope, .. }
            | Self::Class { scope, .. } => Some(scope),
            _ => None,
        }
    }

    fn scope_mut(&mut self) -> Option<&mut Scope> {
        match self {
            Self::Program { scope }
            | Self::Block { scope }
            | Self::FunctionBlock { scope, .. }
            | Self::Function { scope, .. }
            | Self::Method { scope, .. }
            | Self::Class { scope, .. } => Some(scope),
            _ => None,
        }
    }
}

/// One node of the semantic tree: the common protocol every variant
/// shares (parent link, children by source range, condition stack, raise
/// aggregation) plus its [`ContextKind`] specialization.
#[derive(Debug)]
pub struct Context {
    span: Span,
    name: Option<String>,
    parent: Option<ContextId>,
    annotation: Annotation,
    children: AHashMap<Span, ContextId>,
    conditions: Vec<Option<Value>>,
    condition: Option<Value>,
    raised: IndexMap<ExcKind, Vec<Raised>>,
    pub(crate) kind: ContextKind,
}

impl Context {
    pub fn span(&self) -> Span {
        self.span
    }

    /// The declared name, where the context has one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parent(&self) -> Option<ContextId> {
        self.parent
    }

    pub fn annotation(&self) -> &Annotation {
        &self.annotation
    }

    pub fn kind(&self) -> &ContextKind {
        &self.kind
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.kind.scope()
    }

    /// Current path condition (the AND of every enclosing truthy branch).
    pub fn condition(&self) -> Option<&Value> {
        self.condition.as_ref()
    }

    /// Depth of the condition stack; zero once every branch has been left.
    pub fn condition_depth(&self) -> usize {
        self.conditions.len()
    }

    /// Exceptions observed at or below this context, keyed by name.
    pub fn raised(&self) -> &IndexMap<ExcKind, Vec<Raised>> {
        &self.raised
    }

    /// Exceptions this scope itself generated.
    pub fn raises(&self) -> &[Raised] {
        self.scope().map_or(&[], Scope::raises)
    }

    /// A variable's current value.
    pub fn value(&self) -> Option<&Value> {
        match &self.kind {
            ContextKind::Variable { value } => value.as_ref(),
            _ => None,
        }
    }

    pub fn tally(&self) -> Option<&CallTally> {
        match &self.kind {
            ContextKind::Function { tally, .. } | ContextKind::Method { tally, .. } => Some(tally),
            _ => None,
        }
    }

    /// Unconditional call count of a callable (zero elsewhere).
    pub fn called(&self) -> u32 {
        self.tally().map_or(0, CallTally::called)
    }

    /// Instantiation count of a class (zero elsewhere).
    pub fn instanced(&self) -> u32 {
        match &self.kind {
            ContextKind::Class { instanced, .. } => *instanced,
            _ => 0,
        }
    }

    /// Return values collected by a function block.
    pub fn returns(&self) -> &[Value] {
        match &self.kind {
            ContextKind::FunctionBlock { returns, .. } => returns,
            _ => &[],
        }
    }
}

/// The arena owning every context of one analysis.
///
/// All cross-node operations (lookup, raise bubbling, instantiation
/// tallies, condition stacking) are arena methods taking ids, so parent
/// walks never fight the borrow checker.
#[derive(Debug, Default)]
pub struct Contexts {
    nodes: Vec<Context>,
}

impl Contexts {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allocates a context, registering it as a child of its parent under
    /// its span and inheriting the parent's current path condition.
    pub(crate) fn alloc(
        &mut self,
        parent: Option<ContextId>,
        span: Span,
        name: Option<String>,
        annotation: Annotation,
        kind: ContextKind,
    ) -> ContextId {
        let condition = parent.and_then(|p| self.nodes[p.index()].condition.clone());
        let id = ContextId::new(self.nodes.len());
        self.nodes.push(Context {
            span,
            name,
            parent,
            annotation,
            children: AHashMap::new(),
            conditions: Vec::new(),
            condition,
            raised: IndexMap::new(),
            kind,
        });
        if let Some(parent) = parent {
            self.nodes[parent.index()].children.insert(span, id);
        }
        id
    }

    pub fn get(&self, id: ContextId) -> &Context {
        &self.nodes[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: ContextId) -> &mut Context {
        &mut self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every context id in the arena, in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = ContextId> + '_ {
        (0..self.nodes.len()).map(ContextId::new)
    }

    /// The child context registered at an AST range, if any.
    pub fn find_child(&self, parent: ContextId, span: Span) -> Option<ContextId> {
        self.get(parent).children.get(&span).copied()
    }

    // === conditions ===

    /// Enters a branch: the current condition becomes the AND of the
    /// previous one and `value`, and the previous one is stacked.
    pub(crate) fn add_condition(&mut self, id: ContextId, value: Value) {
        let node = self.get_mut(id);
        let combined = match node.condition.take() {
            None => {
                node.conditions.push(None);
                value
            }
            Some(prev) => {
                let combined = prev.and(&value);
                node.conditions.push(Some(prev));
                combined
            }
        };
        node.condition = Some(combined);
    }

    /// Leaves a branch, restoring the previous condition.
    pub(crate) fn pop_condition(&mut self, id: ContextId) -> Option<Value> {
        let node = self.get_mut(id);
        node.condition = node.conditions.pop().flatten();
        node.condition.clone()
    }

    /// Re-seeds a context's condition from its parent's current one, for
    /// block contexts reused across passes.
    pub(crate) fn inherit_condition(&mut self, id: ContextId) {
        let condition = self
            .get(id)
            .parent
            .and_then(|parent| self.get(parent).condition.clone());
        self.get_mut(id).condition = condition;
    }

    // === raises ===

    /// Records an observed exception on this context and every ancestor,
    /// so the program root always sees the full raise set.
    pub(crate) fn add_raised(&mut self, id: ContextId, raised: &Raised) {
        let mut cursor = Some(id);
        while let Some(id) = cursor {
            let node = self.get_mut(id);
            node.raised
                .entry(raised.exception)
                .or_default()
                .push(raised.clone());
            cursor = node.parent;
        }
    }

    /// Creates a raise under the context's current condition, records it
    /// on the nearest enclosing scope, and bubbles it to the root.
    pub(crate) fn add_raises(&mut self, id: ContextId, exception: ExcKind, message: impl Into<String>) -> Raised {
        let raised = Raised::new(exception, message, self.get(id).condition());
        let mut scope_at = id;
        while self.get(scope_at).scope().is_none() {
            match self.get(scope_at).parent {
                Some(parent) => scope_at = parent,
                None => break,
            }
        }
        if let Some(scope) = self.get_mut(scope_at).kind.scope_mut() {
            scope.raises.push(raised.clone());
        }
        self.add_raised(id, &raised);
        raised
    }

    // === lookup ===

    /// Resolves a name from a context, walking the lexical parent chain.
    pub fn lookup(&self, id: ContextId, name: &str) -> Option<ContextId> {
        self.lookup_in(id, name, true)
    }

    /// Per-variant resolution: scopes check variables, then functions,
    /// then classes; classes check methods and properties first;
    /// references check their own properties then fall through to the
    /// class; variables pierce through the references in their value.
    pub fn lookup_in(&self, id: ContextId, name: &str, recurse: bool) -> Option<ContextId> {
        let node = self.get(id);
        match &node.kind {
            ContextKind::Program { scope }
            | ContextKind::Block { scope }
            | ContextKind::FunctionBlock { scope, .. }
            | ContextKind::Function { scope, .. }
            | ContextKind::Method { scope, .. } => {
                if let Some(hit) = scope_hit(scope, name) {
                    return Some(hit);
                }
            }
            ContextKind::Class {
                scope,
                methods,
                properties,
                ..
            } => {
                if let Some(&hit) = methods.get(name).or_else(|| properties.get(name)) {
                    return Some(hit);
                }
                if let Some(hit) = scope_hit(scope, name) {
                    return Some(hit);
                }
            }
            ContextKind::Reference {
                class, properties, ..
            } => {
                if let Some(&hit) = properties.get(name) {
                    return Some(hit);
                }
                return self.lookup_in(*class, name, recurse);
            }
            ContextKind::Variable { value } => {
                if let Some(value) = value {
                    for item in value.items() {
                        if let Payload::Reference(reference) = item.payload {
                            if let Some(hit) = self.lookup_in(reference, name, true) {
                                return Some(hit);
                            }
                        }
                    }
                }
            }
            ContextKind::Property { .. } => {}
        }
        if recurse {
            if let Some(parent) = node.parent {
                return self.lookup_in(parent, name, true);
            }
        }
        None
    }

    // === declarations ===

    pub(crate) fn add_variable(&mut self, ctx: ContextId, name: &str, variable: ContextId) {
        let scope = self.scope_mut_of(ctx);
        scope.variables.insert(name.to_owned(), variable);
        scope.declarations.push(variable);
    }

    pub(crate) fn add_function(&mut self, ctx: ContextId, name: &str, function: ContextId) {
        let scope = self.scope_mut_of(ctx);
        scope.functions.insert(name.to_owned(), function);
        scope.declarations.push(function);
    }

    pub(crate) fn add_class(&mut self, ctx: ContextId, name: &str, class: ContextId) {
        let scope = self.scope_mut_of(ctx);
        scope.classes.insert(name.to_owned(), class);
        scope.declarations.push(class);
    }

    /// Registers an instance method on a class; the first definition of a
    /// name wins.
    pub(crate) fn add_method(&mut self, class: ContextId, name: &str, method: ContextId) {
        if let ContextKind::Class { methods, .. } = &mut self.get_mut(class).kind {
            methods.entry(name.to_owned()).or_insert(method);
        }
    }

    /// Installs a member binding on an owner. A variable owner dispatches
    /// to every reference in its value; reference and class owners insert
    /// only when the name is absent.
    pub(crate) fn add_property(&mut self, owner: ContextId, name: &str, property: ContextId) {
        let references = match &self.get(owner).kind {
            ContextKind::Variable { value } => Some(reference_ids(value.as_ref())),
            _ => None,
        };
        if let Some(references) = references {
            for reference in references {
                self.add_property(reference, name, property);
            }
            return;
        }
        if let ContextKind::Reference { properties, .. } | ContextKind::Class { properties, .. } =
            &mut self.get_mut(owner).kind
        {
            properties.entry(name.to_owned()).or_insert(property);
        }
    }

    // === calls ===

    /// Tallies a call on a declared callable: unconditional when the
    /// caller's condition is empty, condition-keyed otherwise.
    pub(crate) fn add_function_call(&mut self, callee: ContextId, site: Span, condition: Option<&Value>) {
        if let ContextKind::Function { tally, .. } | ContextKind::Method { tally, .. } =
            &mut self.get_mut(callee).kind
        {
            tally.add(site, condition);
        }
    }

    /// Tallies a member call on a receiver. A variable receiver dispatches
    /// to every reference in its value (per-instance tallies); a class
    /// receiver forwards to its static function.
    pub(crate) fn add_receiver_call(&mut self, owner: ContextId, name: &str, site: Span, condition: Option<&Value>) {
        enum Target {
            References(Vec<ContextId>),
            Static(ContextId),
            Instance,
            None,
        }
        let target = match &self.get(owner).kind {
            ContextKind::Variable { value } => Target::References(reference_ids(value.as_ref())),
            ContextKind::Class { scope, .. } => scope
                .functions
                .get(name)
                .map_or(Target::None, |&function| Target::Static(function)),
            ContextKind::Reference { .. } => Target::Instance,
            _ => Target::None,
        };
        match target {
            Target::References(references) => {
                for reference in references {
                    self.add_receiver_call(reference, name, site, condition);
                }
            }
            Target::Static(function) => self.add_function_call(function, site, condition),
            Target::Instance => {
                if let ContextKind::Reference { methods, .. } = &mut self.get_mut(owner).kind {
                    methods.entry(name.to_owned()).or_default().add(site, condition);
                }
            }
            Target::None => {}
        }
    }

    // === instantiation tallies ===

    /// Notes that evaluation at `from` instantiates `class` `count`
    /// times. The note bubbles up the parent chain until a function
    /// context captures it (so callers can re-apply it per call) or the
    /// root records it.
    pub(crate) fn add_instantiation(&mut self, from: ContextId, class: ContextId, count: u32) {
        let mut cursor = from;
        loop {
            let node = self.get(cursor);
            if matches!(node.kind, ContextKind::Function { .. }) || node.parent.is_none() {
                break;
            }
            cursor = node.parent.expect("non-root context has a parent");
        }
        if let Some(scope) = self.get_mut(cursor).kind.scope_mut() {
            *scope.instantiates.entry(class).or_insert(0) += count;
        }
    }

    /// Re-applies a callee's captured instantiation tally at a call site.
    pub(crate) fn apply_instantiations(&mut self, ctx: ContextId, callee: ContextId) {
        let entries: Vec<(ContextId, u32)> = self
            .get(callee)
            .scope()
            .map(|scope| scope.instantiates.iter().map(|(&class, &count)| (class, count)).collect())
            .unwrap_or_default();
        for (class, count) in entries {
            self.add_instantiation(ctx, class, count);
        }
    }

    /// Counts one instance of a class and bubbles the tally from the
    /// instantiating context.
    pub(crate) fn add_instance(&mut self, class: ContextId, ctx: ContextId) {
        if let ContextKind::Class { instanced, .. } = &mut self.get_mut(class).kind {
            *instanced += 1;
        }
        self.add_instantiation(ctx, class, 1);
    }

    // === returns ===

    /// Records a possible return value on the nearest enclosing function
    /// block.
    pub(crate) fn add_return(&mut self, ctx: ContextId, value: Value) {
        let mut cursor = Some(ctx);
        while let Some(id) = cursor {
            if let ContextKind::FunctionBlock { returns, .. } = &mut self.get_mut(id).kind {
                returns.push(value);
                return;
            }
            cursor = self.get(id).parent;
        }
    }

    // === variables ===

    pub(crate) fn set_value(&mut self, variable: ContextId, value: Option<Value>) {
        if let ContextKind::Variable { value: slot } = &mut self.get_mut(variable).kind {
            *slot = value;
        }
    }

    /// The class name behind a reference context, for `@ClassName` kind
    /// rendering.
    pub fn reference_class_name(&self, reference: ContextId) -> &str {
        if let ContextKind::Reference { class, .. } = &self.get(reference).kind {
            return self.get(*class).name().unwrap_or("{}");
        }
        "{}"
    }

    fn scope_mut_of(&mut self, ctx: ContextId) -> &mut Scope {
        self.get_mut(ctx)
            .kind
            .scope_mut()
            .expect("declaration target context has a scope")
    }
}

fn scope_hit(scope: &Scope, name: &str) -> Option<ContextId> {
    scope
        .variables
        .get(name)
        .or_else(|| scope.functions.get(name))
        .or_else(|| scope.classes.get(name))
        .copied()
}

fn reference_ids(value: Option<&Value>) -> Vec<ContextId> {
    let mut ids = Vec::new();
    if let Some(value) = value {
        for item in value.items() {
            if let Payload::Reference(id) = item.payload {
                ids.push(id);
            }
        }
    }
    ids
}

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    annotate::Annotator,
    ast::{self, Expr},
    context::{Annotation, ContextId, ContextKind, Scope},
    raised::ExcKind,
    value::{Payload, Value, ValueKind},
};

/// Bound on inter-procedural call depth. Calls past the bound evaluate to
/// an unconditional `variant` instead of descending, so recursive user
/// functions terminate.
pub const MAX_CALL_DEPTH: u32 = 64;

impl Annotator<'_> {
    /// Evaluates a call expression: resolves the callee, tallies the call,
    /// and dispatches on what was found (class construction, function or
    /// static call, instance method call).
    pub(crate) fn eval_call(&mut self, call: &ast::Call, ctx: ContextId) -> Option<Value> {
        let condition = self.contexts.get(ctx).condition().cloned();

        let (callee, receiver) = match &call.callee {
            Expr::Member(member) => {
                let object_name = match &member.object {
                    Expr::Ident(ident) => ident.name.as_str(),
                    Expr::This(_) => "this",
                    _ => return None,
                };
                let Some(owner) = self.contexts.lookup(ctx, object_name) else {
                    // Unknown receiver: always a runtime error on this path.
                    let raised = self.contexts.add_raises(
                        ctx,
                        ExcKind::ReferenceError,
                        format!("{object_name} is not defined"),
                    );
                    return Some(Value::single(
                        ValueKind::Raised,
                        Payload::Raised(raised),
                        condition.as_ref(),
                    ));
                };
                let callee = self.contexts.lookup_in(owner, &member.property.name, true);
                // A static function call leaves instance tallies alone;
                // everything else counts against the receiver's instances.
                let is_static = callee
                    .is_some_and(|id| matches!(self.contexts.get(id).kind, ContextKind::Function { .. }));
                if !is_static {
                    self.contexts
                        .add_receiver_call(owner, &member.property.name, call.span, condition.as_ref());
                }
                (callee, Some(owner))
            }
            Expr::Ident(ident) => (self.contexts.lookup(ctx, &ident.name), None),
            _ => (None, None),
        };
        let callee = callee?;

        enum Dispatch {
            Construct,
            Function,
            Method,
            Other,
        }
        let dispatch = match self.contexts.get(callee).kind {
            ContextKind::Class { .. } => Dispatch::Construct,
            ContextKind::Function { .. } => Dispatch::Function,
            ContextKind::Method { .. } => Dispatch::Method,
            _ => Dispatch::Other,
        };
        match dispatch {
            Dispatch::Construct => self.eval_construct(call, callee, ctx, condition.as_ref()),
            Dispatch::Function => {
                self.contexts
                    .add_function_call(callee, call.callee.span(), condition.as_ref());
                self.contexts.apply_instantiations(ctx, callee);
                self.eval_body(call, callee, ctx, None)
            }
            Dispatch::Method => {
                // Bind `this` when the call path supplied a receiver whose
                // value is known; an unbound method call runs without one.
                let this = receiver.and_then(|owner| self.contexts.get(owner).value().cloned());
                self.eval_body(call, callee, ctx, this)
            }
            Dispatch::Other => None,
        }
    }

    /// A call whose callee is a class: creates a fresh reference, counts
    /// the instance, and runs the constructor if there is one. The call's
    /// value is always the reference, never the constructor's result.
    fn eval_construct(
        &mut self,
        call: &ast::Call,
        class: ContextId,
        ctx: ContextId,
        condition: Option<&Value>,
    ) -> Option<Value> {
        let reference = self.contexts.alloc(
            Some(class),
            call.span,
            None,
            Annotation::default(),
            ContextKind::Reference {
                class,
                methods: IndexMap::new(),
                properties: IndexMap::new(),
            },
        );
        self.contexts.add_instance(class, ctx);
        let this = Value::single(ValueKind::Reference, Payload::Reference(reference), condition);

        if let Some(constructor) = self.contexts.lookup(class, "constructor") {
            if matches!(
                self.contexts.get(constructor).kind,
                ContextKind::Method { .. } | ContextKind::Function { .. }
            ) {
                self.eval_body(call, constructor, ctx, Some(this.clone()));
            }
        }
        Some(this)
    }

    /// Runs a callable's body for one call site: a fresh function block
    /// parented to the callee, `this` and parameters bound as variables,
    /// the body annotated recursively, and the collected returns combined
    /// (first unconditional return short-circuits) under the callee's
    /// annotated return type.
    fn eval_body(&mut self, call: &ast::Call, callee: ContextId, ctx: ContextId, this: Option<Value>) -> Option<Value> {
        let def = match &self.contexts.get(callee).kind {
            ContextKind::Function { def, .. } | ContextKind::Method { def, .. } => Rc::clone(def),
            _ => return None,
        };
        let ret_type = self.contexts.get(callee).annotation().returns.clone();

        if self.depth >= MAX_CALL_DEPTH {
            return Some(Value::variant());
        }

        let block = self.contexts.alloc(
            Some(callee),
            def.span,
            None,
            Annotation::default(),
            ContextKind::FunctionBlock {
                scope: Scope::default(),
                returns: Vec::new(),
            },
        );
        if let Some(this) = this {
            let variable = self.contexts.alloc(
                Some(block),
                def.span,
                Some("this".to_owned()),
                Annotation::default(),
                ContextKind::Variable { value: Some(this) },
            );
            self.contexts.add_variable(block, "this", variable);
        }
        for (index, param) in def.params.iter().enumerate() {
            // Arguments are evaluated in the caller's context; a missing
            // argument binds the unknown.
            let value = match call.arguments.get(index) {
                Some(argument) => self.eval(argument, ctx),
                None => Some(Value::variant()),
            };
            let variable = self.contexts.alloc(
                Some(block),
                param.span,
                Some(param.name.clone()),
                Annotation::default(),
                ContextKind::Variable { value },
            );
            self.contexts.add_variable(block, &param.name, variable);
        }

        self.depth += 1;
        self.annotate_block(&def.body, block);
        self.depth -= 1;

        let returns = self.contexts.get(block).returns().to_vec();
        Some(Value::combine(ret_type.as_deref(), &returns, true))
    }
}

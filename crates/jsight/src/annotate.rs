use crate::{
    ast::{self, Expr, Lit, Stmt},
    context::{Annotation, ContextId, ContextKind, Contexts, Scope},
    value::{Payload, Value, ValueKind},
};

/// The evaluation pass: walks the main AST performing abstract
/// interpretation over the context graph the structural pass built.
///
/// Expression results are [`Value`]s; statement results are side effects
/// on the graph (variable values, call tallies, returns, raises,
/// instantiation counts). Call evaluation re-enters function bodies, so
/// the annotator carries a depth counter as the recursion bound.
pub(crate) struct Annotator<'a> {
    pub contexts: &'a mut Contexts,
    pub depth: u32,
}

impl Annotator<'_> {
    pub fn annotate_program(&mut self, program: &ast::Program, root: ContextId) {
        for stmt in &program.body {
            self.annotate_stmt(stmt, root);
        }
    }

    pub fn annotate_stmt(&mut self, stmt: &Stmt, ctx: ContextId) {
        match stmt {
            Stmt::Var(decl) => {
                for declarator in &decl.declarators {
                    self.annotate_declarator(declarator, ctx);
                }
            }
            Stmt::Block(block) => {
                self.annotate_block(block, ctx);
            }
            Stmt::Return(ret) => {
                if let Some(argument) = &ret.argument {
                    if let Some(value) = self.eval(argument, ctx) {
                        self.contexts.add_return(ctx, value);
                    }
                }
            }
            Stmt::If(stmt) => self.annotate_if(stmt, ctx),
            Stmt::Expr(stmt) => {
                self.eval(&stmt.expr, ctx);
            }
            // Declarations were registered by the structural pass.
            Stmt::Function(_) | Stmt::Class(_) | Stmt::Empty(_) => {}
        }
    }

    /// Evaluates a block, reusing the context already registered at its
    /// range (from expansion or an earlier pass) or creating one.
    pub fn annotate_block(&mut self, block: &ast::Block, ctx: ContextId) {
        let id = match self.contexts.find_child(ctx, block.span) {
            Some(existing) if matches!(self.contexts.get(existing).kind, ContextKind::Block { .. }) => {
                // A reused block re-inherits the current path condition.
                self.contexts.inherit_condition(existing);
                existing
            }
            _ => self.contexts.alloc(
                Some(ctx),
                block.span,
                None,
                Annotation::default(),
                ContextKind::Block {
                    scope: Scope::default(),
                },
            ),
        };
        for stmt in &block.body {
            self.annotate_stmt(stmt, id);
        }
    }

    /// Path-sensitive branch handling: an unevaluable or raising test is
    /// skipped, an always-false test prunes the branch as dead code, and
    /// anything else stacks the test as the path condition around the
    /// consequent. The `else` branch is not descended.
    fn annotate_if(&mut self, stmt: &ast::If, ctx: ContextId) {
        let Some(test) = self.eval(&stmt.test, ctx) else {
            return;
        };
        if test.has_raised() || test.is_false() {
            return;
        }
        self.contexts.add_condition(ctx, test);
        self.annotate_stmt(&stmt.consequent, ctx);
        self.contexts.pop_condition(ctx);
    }

    /// Declares a variable, inferring its declared-type annotation from a
    /// call initializer's annotated return type, then evaluates and stores
    /// the initial value.
    fn annotate_declarator(&mut self, declarator: &ast::Declarator, ctx: ContextId) {
        let annotation = self.declared_type(declarator, ctx);
        let variable = self.contexts.alloc(
            Some(ctx),
            declarator.span,
            Some(declarator.id.name.clone()),
            annotation,
            ContextKind::Variable { value: None },
        );
        self.contexts.add_variable(ctx, &declarator.id.name, variable);
        if let Some(init) = &declarator.init {
            let value = self.eval(init, ctx);
            self.contexts.set_value(variable, value);
        }
    }

    fn declared_type(&self, declarator: &ast::Declarator, ctx: ContextId) -> Annotation {
        if let Some(Expr::Call(call)) = &declarator.init {
            if let Expr::Ident(callee) = &call.callee {
                if let Some(target) = self.contexts.lookup(ctx, &callee.name) {
                    if let Some(returns) = &self.contexts.get(target).annotation().returns {
                        return Annotation {
                            returns: None,
                            ty: Some(returns.clone()),
                        };
                    }
                }
            }
        }
        Annotation::default()
    }

    // === expressions ===

    /// Evaluates an expression to its abstract value. `None` means the
    /// expression is outside the modeled language (or a lookup failed);
    /// callers treat it as silence, never as an error.
    pub fn eval(&mut self, expr: &Expr, ctx: ContextId) -> Option<Value> {
        match expr {
            Expr::Literal(literal) => Some(self.eval_literal(literal, ctx)),
            Expr::Ident(ident) => self.eval_name(&ident.name, ctx),
            Expr::This(_) => self.eval_name("this", ctx),
            Expr::Assign(assign) => self.eval_assign(assign, ctx),
            Expr::Member(member) => self.eval_member(member, ctx),
            Expr::Unary(unary) => {
                let argument = self.eval(&unary.argument, ctx)?;
                Some(argument.unary(unary.op))
            }
            Expr::Binary(binary) => {
                let left = self.eval(&binary.left, ctx)?;
                let right = self.eval(&binary.right, ctx)?;
                Some(left.binary(&right, binary.op))
            }
            Expr::Call(call) => self.eval_call(call, ctx),
            Expr::Unsupported(_) => None,
        }
    }

    fn eval_literal(&self, literal: &ast::Literal, ctx: ContextId) -> Value {
        let condition = self.contexts.get(ctx).condition();
        let (kind, payload) = match &literal.value {
            Lit::Int(n) => (ValueKind::Int, Payload::Int(*n)),
            Lit::Float(f) => (ValueKind::Float, Payload::Float(*f)),
            Lit::Str(s) => (ValueKind::Str, Payload::Str(s.clone())),
            Lit::Bool(b) => (ValueKind::Bool, Payload::Bool(*b)),
            Lit::Null => (ValueKind::Variant, Payload::Variant),
        };
        Value::single(kind, payload, condition)
    }

    fn eval_name(&self, name: &str, ctx: ContextId) -> Option<Value> {
        let binding = self.contexts.lookup(ctx, name)?;
        self.contexts.get(binding).value().cloned()
    }

    /// Resolves the context a member expression's object names: a plain
    /// identifier or `this`. Deeper chains are not modeled.
    fn resolve_object(&self, object: &Expr, ctx: ContextId) -> Option<ContextId> {
        match object {
            Expr::Ident(ident) => self.contexts.lookup(ctx, &ident.name),
            Expr::This(_) => self.contexts.lookup(ctx, "this"),
            _ => None,
        }
    }

    fn eval_member(&mut self, member: &ast::Member, ctx: ContextId) -> Option<Value> {
        let owner = self.resolve_object(&member.object, ctx)?;
        let binding = self.contexts.lookup_in(owner, &member.property.name, true)?;
        self.contexts.get(binding).value().cloned()
    }

    /// Assignment: resolve the target first, evaluate the right-hand side,
    /// store it, and yield it as the expression's value.
    ///
    /// A missing member target is created on the owner; an accessor-backed
    /// member is shadowed by a fresh variable (the setter is recorded, not
    /// executed).
    fn eval_assign(&mut self, assign: &ast::Assign, ctx: ContextId) -> Option<Value> {
        match &assign.target {
            Expr::Member(member) => {
                let owner = self.resolve_object(&member.object, ctx);
                // Member resolution stays on the owner: falling back to the
                // lexical chain here would capture unrelated bindings that
                // happen to share the member's name.
                let existing = owner.and_then(|owner| self.contexts.lookup_in(owner, &member.property.name, false));
                let value = self.eval(&assign.value, ctx);
                let Some(owner) = owner else {
                    return value;
                };
                let name = &member.property.name;
                let target = match existing {
                    Some(binding)
                        if !matches!(self.contexts.get(binding).kind, ContextKind::Property { .. }) =>
                    {
                        binding
                    }
                    _ => {
                        let variable = self.contexts.alloc(
                            Some(owner),
                            member.property.span,
                            Some(name.clone()),
                            Annotation::default(),
                            ContextKind::Variable { value: None },
                        );
                        self.contexts.add_property(owner, name, variable);
                        variable
                    }
                };
                self.contexts.set_value(target, value.clone());
                value
            }
            Expr::Ident(ident) => {
                let existing = self.contexts.lookup(ctx, &ident.name);
                let value = self.eval(&assign.value, ctx);
                let target = match existing {
                    Some(binding) if matches!(self.contexts.get(binding).kind, ContextKind::Variable { .. }) => {
                        binding
                    }
                    // Assigning over a function or class binding is not
                    // modeled; the expression still has the assigned value.
                    Some(_) => return value,
                    None => {
                        let variable = self.contexts.alloc(
                            Some(ctx),
                            ident.span,
                            Some(ident.name.clone()),
                            Annotation::default(),
                            ContextKind::Variable { value: None },
                        );
                        self.contexts.add_variable(ctx, &ident.name, variable);
                        variable
                    }
                };
                self.contexts.set_value(target, value.clone());
                value
            }
            _ => self.eval(&assign.value, ctx),
        }
    }
}

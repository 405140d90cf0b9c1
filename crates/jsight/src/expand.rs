use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    ast::{self, MethodKind, Span, Stmt},
    context::{Annotation, CallTally, ContextId, ContextKind, Contexts, Scope},
    jsdoc::JsdocParser,
};

/// The structural pass: walks an AST registering every declaration into
/// the context graph, without evaluating anything.
///
/// Precode and main code are both expanded into the same program root, so
/// the annotation pass sees every declared symbol. Function and method
/// bodies are walked with the callable itself as the scope, which makes
/// nested declarations visible through the lexical parent chain when the
/// body is evaluated at a call site.
pub(crate) struct Expander<'a> {
    pub contexts: &'a mut Contexts,
    pub program: &'a ast::Program,
    pub src: &'a str,
    pub jsdoc: &'a JsdocParser,
}

impl Expander<'_> {
    pub fn expand(&mut self, root: ContextId) {
        for stmt in &self.program.body {
            self.expand_stmt(stmt, root);
        }
    }

    fn expand_stmt(&mut self, stmt: &Stmt, ctx: ContextId) {
        match stmt {
            Stmt::Function(decl) => self.expand_function(decl, ctx),
            Stmt::Class(decl) => self.expand_class(decl, ctx),
            Stmt::Block(block) => self.expand_block(block, ctx),
            // Variables are registered by the annotation pass, when their
            // initializers can be evaluated.
            _ => {}
        }
    }

    fn expand_block(&mut self, block: &ast::Block, ctx: ContextId) {
        let id = self.contexts.alloc(
            Some(ctx),
            block.span,
            None,
            Annotation::default(),
            ContextKind::Block {
                scope: Scope::default(),
            },
        );
        for stmt in &block.body {
            self.expand_stmt(stmt, id);
        }
    }

    fn expand_function(&mut self, decl: &ast::FunctionDecl, ctx: ContextId) {
        let annotation = self.annotation_for(decl.span);
        let id = self.contexts.alloc(
            Some(ctx),
            decl.span,
            Some(decl.id.name.clone()),
            annotation,
            ContextKind::Function {
                scope: Scope::default(),
                def: Rc::clone(&decl.function),
                tally: CallTally::default(),
            },
        );
        self.contexts.add_function(ctx, &decl.id.name, id);
        for stmt in &decl.function.body.body {
            self.expand_stmt(stmt, id);
        }
    }

    fn expand_class(&mut self, decl: &ast::ClassDecl, ctx: ContextId) {
        let id = self.contexts.alloc(
            Some(ctx),
            decl.span,
            Some(decl.id.name.clone()),
            Annotation::default(),
            ContextKind::Class {
                scope: Scope::default(),
                methods: IndexMap::new(),
                properties: IndexMap::new(),
                instanced: 0,
            },
        );
        self.contexts.add_class(ctx, &decl.id.name, id);
        for method in &decl.body {
            self.expand_method(method, id);
        }
    }

    /// Classifies a class member: accessors become (or augment) a
    /// `Property`, static members become a `Function` in the class scope,
    /// and everything else (the constructor included) becomes a `Method`.
    fn expand_method(&mut self, method: &ast::Method, class: ContextId) {
        let annotation = self.annotation_for(method.span);
        let name = &method.key.name;
        match method.kind {
            MethodKind::Get | MethodKind::Set => {
                let accessor = self.contexts.alloc(
                    Some(class),
                    method.span,
                    Some(name.clone()),
                    annotation,
                    ContextKind::Method {
                        scope: Scope::default(),
                        def: Rc::clone(&method.function),
                        tally: CallTally::default(),
                    },
                );
                self.install_accessor(class, name, accessor, method.kind == MethodKind::Get, method.span);
                for stmt in &method.function.body.body {
                    self.expand_stmt(stmt, accessor);
                }
            }
            MethodKind::Method | MethodKind::Constructor if method.is_static => {
                let id = self.contexts.alloc(
                    Some(class),
                    method.span,
                    Some(name.clone()),
                    annotation,
                    ContextKind::Function {
                        scope: Scope::default(),
                        def: Rc::clone(&method.function),
                        tally: CallTally::default(),
                    },
                );
                self.contexts.add_function(class, name, id);
                for stmt in &method.function.body.body {
                    self.expand_stmt(stmt, id);
                }
            }
            MethodKind::Method | MethodKind::Constructor => {
                let id = self.contexts.alloc(
                    Some(class),
                    method.span,
                    Some(name.clone()),
                    annotation,
                    ContextKind::Method {
                        scope: Scope::default(),
                        def: Rc::clone(&method.function),
                        tally: CallTally::default(),
                    },
                );
                self.contexts.add_method(class, name, id);
                for stmt in &method.function.body.body {
                    self.expand_stmt(stmt, id);
                }
            }
        }
    }

    /// Wires a getter or setter into the class's property of that name,
    /// creating the property when the first accessor appears.
    fn install_accessor(&mut self, class: ContextId, name: &str, accessor: ContextId, is_get: bool, span: Span) {
        let existing = match &self.contexts.get(class).kind {
            ContextKind::Class { properties, .. } => properties.get(name).copied(),
            _ => None,
        };
        let property = match existing {
            Some(id) if matches!(self.contexts.get(id).kind, ContextKind::Property { .. }) => id,
            _ => {
                let id = self.contexts.alloc(
                    Some(class),
                    span,
                    Some(name.to_owned()),
                    Annotation::default(),
                    ContextKind::Property {
                        readable: false,
                        writable: false,
                        getter: None,
                        setter: None,
                    },
                );
                self.contexts.add_property(class, name, id);
                id
            }
        };
        if let ContextKind::Property {
            readable,
            writable,
            getter,
            setter,
        } = &mut self.contexts.get_mut(property).kind
        {
            if is_get {
                *readable = true;
                *getter = Some(accessor);
            } else {
                *writable = true;
                *setter = Some(accessor);
            }
        }
    }

    /// The annotation carried by the comment that ends directly before a
    /// declaration: a comment belongs to the declaration whose start is
    /// the first non-whitespace offset after it.
    fn annotation_for(&self, decl: Span) -> Annotation {
        let bytes = self.src.as_bytes();
        for comment in &self.program.comments {
            let mut end = comment.span.end as usize;
            while bytes.get(end).is_some_and(u8::is_ascii_whitespace) {
                end += 1;
            }
            if end == decl.start as usize {
                if let Some(returns) = self.jsdoc.parse(&comment.text).returns {
                    return Annotation {
                        returns: returns.ty,
                        ty: None,
                    };
                }
            }
        }
        Annotation::default()
    }
}

use std::fmt;

use indexmap::IndexMap;

use crate::{
    annotate::Annotator,
    ast,
    context::{Annotation, Context, ContextId, ContextKind, Contexts, Scope},
    expand::Expander,
    jsdoc::JsdocParser,
    parse::{ParseError, parse},
    raised::{ExcKind, Raised},
    render::{self, Report},
};

/// The analysis driver.
///
/// Owns the main source, any number of appended precode sources, and the
/// parsed AST caches. [`Analyzer::annotate`] runs the full pipeline:
/// parse (cached), structural expansion of precode then main code into one
/// program root, then abstract interpretation of the main code.
#[derive(Debug)]
pub struct Analyzer {
    code: String,
    precode: Vec<String>,
    precode_src: String,
    precode_ast: Option<ast::Program>,
    ast: Option<ast::Program>,
    jsdoc: JsdocParser,
    analysis: Option<Analysis>,
}

impl Analyzer {
    /// Creates an analyzer over the primary source.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            precode: Vec::new(),
            precode_src: String::new(),
            precode_ast: None,
            ast: None,
            jsdoc: JsdocParser::new(),
            analysis: None,
        }
    }

    /// Appends precode: auxiliary source that declares the symbols the
    /// main code depends on. Invalidates the cached precode AST.
    pub fn augment(&mut self, code: &str) {
        self.precode.push(code.to_owned());
        self.precode_ast = None;
    }

    /// Runs the pipeline against the cached ASTs, parsing whatever is not
    /// cached yet. The context graph is rebuilt from scratch on every
    /// call, so re-annotation is reproducible.
    pub fn annotate(&mut self) -> Result<&Analysis, ParseError> {
        self.annotate_with(false)
    }

    /// Like [`Analyzer::annotate`], but `reparse` drops the AST caches
    /// first.
    pub fn annotate_with(&mut self, reparse: bool) -> Result<&Analysis, ParseError> {
        if reparse {
            self.precode_ast = None;
            self.ast = None;
        }
        if self.precode_ast.is_none() {
            self.precode_src = self.precode.concat();
            self.precode_ast = Some(parse(&self.precode_src)?);
        }
        if self.ast.is_none() {
            self.ast = Some(parse(&self.code)?);
        }
        let precode_ast = self.precode_ast.as_ref().expect("precode AST is cached");
        let main_ast = self.ast.as_ref().expect("main AST is cached");

        let mut contexts = Contexts::new();
        let root = contexts.alloc(
            None,
            main_ast.span,
            None,
            Annotation::default(),
            ContextKind::Program {
                scope: Scope::default(),
            },
        );

        Expander {
            contexts: &mut contexts,
            program: precode_ast,
            src: &self.precode_src,
            jsdoc: &self.jsdoc,
        }
        .expand(root);
        Expander {
            contexts: &mut contexts,
            program: main_ast,
            src: &self.code,
            jsdoc: &self.jsdoc,
        }
        .expand(root);

        Annotator {
            contexts: &mut contexts,
            depth: 0,
        }
        .annotate_program(main_ast, root);

        self.analysis = Some(Analysis { contexts, root });
        Ok(self.analysis.as_ref().expect("analysis was just stored"))
    }

    /// The most recent analysis, if [`Analyzer::annotate`] has run.
    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }
}

/// The result of one annotation run: the program root and the arena of
/// every context reachable from it.
#[derive(Debug)]
pub struct Analysis {
    contexts: Contexts,
    root: ContextId,
}

impl Analysis {
    pub fn root(&self) -> ContextId {
        self.root
    }

    pub fn contexts(&self) -> &Contexts {
        &self.contexts
    }

    pub fn get(&self, id: ContextId) -> &Context {
        self.contexts.get(id)
    }

    /// Resolves a name from the program root.
    pub fn lookup(&self, name: &str) -> Option<ContextId> {
        self.contexts.lookup(self.root, name)
    }

    /// Every exception observed anywhere in the program, keyed by name.
    pub fn raises(&self) -> &IndexMap<ExcKind, Vec<Raised>> {
        self.contexts.get(self.root).raised()
    }

    /// The indented textual tree of the annotated program.
    pub fn render(&self) -> String {
        render::render_program(&self.contexts, self.root)
    }

    /// Renders one abstract instance (a reference context).
    pub fn render_reference(&self, reference: ContextId, indent: &str) -> String {
        render::render_reference(&self.contexts, reference, indent)
    }

    /// A serializable summary mirroring the rendered tree.
    pub fn report(&self) -> Report {
        render::build_report(&self.contexts, self.root)
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

use std::{error::Error, fmt, rc::Rc};

use crate::{
    ast::{
        Assign, Binary, BinaryOp, Block, Call, ClassDecl, Comment, DeclKind, Declarator, Expr, ExprStmt, Function,
        FunctionDecl, Ident, If, Lit, Literal, Member, Method, MethodKind, Program, Return, Span, Stmt, Unary,
        UnaryOp, VarDecl,
    },
    lexer::{Lexer, Punct, Token, TokenKind},
};

/// A fatal parse failure with its source position.
///
/// The parser is tolerant: statements it cannot model are skipped with
/// brace-aware recovery, so this error only surfaces for input that cannot
/// be tokenized or re-synchronized (unterminated literals, an unclosed
/// block at end of input).
#[derive(Debug, Clone)]
pub struct ParseError {
    message: String,
    offset: u32,
    line: u32,
    column: u32,
}

impl ParseError {
    pub(crate) fn at(src: &str, offset: u32, message: impl Into<String>) -> Self {
        let prefix = &src[..(offset as usize).min(src.len())];
        let line = prefix.bytes().filter(|&b| b == b'\n').count() as u32 + 1;
        let column = prefix.rfind('\n').map_or(offset, |nl| offset - nl as u32 - 1) + 1;
        Self {
            message: message.into(),
            offset,
            line,
            column,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Byte offset into the source where the failure was detected.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at {}:{}: {}", self.line, self.column, self.message)
    }
}

impl Error for ParseError {}

/// Parses a source buffer into a [`Program`].
pub(crate) fn parse(src: &str) -> Result<Program, ParseError> {
    let (tokens, comments) = Lexer::new(src).tokenize()?;
    Parser {
        src,
        tokens,
        pos: 0,
    }
    .parse_program(comments)
}

/// Internal failure mode: `Recover` re-synchronizes at the statement level,
/// `Fatal` aborts the parse.
enum Fail {
    Recover,
    Fatal(ParseError),
}

type PResult<T> = Result<T, Fail>;

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn parse_program(mut self, comments: Vec<Comment>) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        while !self.at_eof() {
            let before = self.pos;
            match self.parse_stmt() {
                Ok(Some(stmt)) => body.push(stmt),
                Ok(None) => {}
                Err(Fail::Recover) => self.recover_statement(),
                Err(Fail::Fatal(err)) => return Err(err),
            }
            // A stray closer recovery refuses to consume must not stall the
            // top-level loop.
            if self.pos == before {
                self.bump();
            }
        }
        Ok(Program {
            body,
            comments,
            span: Span::new(0, self.src.len() as u32),
        })
    }

    // === statements ===

    /// Parses one statement. `Ok(None)` means the statement was recognized
    /// and deliberately skipped (unsupported construct, stray token).
    fn parse_stmt(&mut self) -> PResult<Option<Stmt>> {
        match &self.peek().kind {
            TokenKind::Punct(Punct::Semi) => {
                let span = self.bump().span;
                Ok(Some(Stmt::Empty(span)))
            }
            TokenKind::Punct(Punct::LBrace) => Ok(Some(Stmt::Block(self.parse_block()?))),
            TokenKind::Ident(name) => match name.as_str() {
                "var" | "let" | "const" => Ok(Some(Stmt::Var(self.parse_var_decl()?))),
                "function" => Ok(Some(Stmt::Function(self.parse_function_decl()?))),
                "class" => Ok(Some(Stmt::Class(self.parse_class_decl()?))),
                "return" => Ok(Some(Stmt::Return(self.parse_return()?))),
                "if" => Ok(Some(Stmt::If(self.parse_if()?))),
                // Recognized but unmodeled statement forms: skip them whole.
                "for" | "while" | "do" | "switch" | "try" | "throw" | "break" | "continue" | "with" | "debugger"
                | "import" | "export" => Err(Fail::Recover),
                _ => self.parse_expr_stmt().map(Some),
            },
            TokenKind::Unknown(_) => {
                self.bump();
                Ok(None)
            }
            _ => self.parse_expr_stmt().map(Some),
        }
    }

    fn parse_expr_stmt(&mut self) -> PResult<Stmt> {
        let expr = self.parse_expr()?;
        let span = expr.span().to(self.eat_semi(expr.span()));
        Ok(Stmt::Expr(ExprStmt { expr, span }))
    }

    fn parse_var_decl(&mut self) -> PResult<VarDecl> {
        let keyword = self.bump();
        let kind = match &keyword.kind {
            TokenKind::Ident(name) if name == "let" => DeclKind::Let,
            TokenKind::Ident(name) if name == "const" => DeclKind::Const,
            _ => DeclKind::Var,
        };
        let mut declarators = Vec::new();
        loop {
            let id = self.expect_ident()?;
            let mut span = id.span;
            let init = if self.peek().kind.is_punct(Punct::Assign) {
                self.bump();
                let expr = self.parse_expr()?;
                span = span.to(expr.span());
                Some(expr)
            } else {
                None
            };
            declarators.push(Declarator { id, init, span });
            if self.peek().kind.is_punct(Punct::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        let last = declarators.last().map_or(keyword.span, |d| d.span);
        let span = keyword.span.to(self.eat_semi(last));
        Ok(VarDecl {
            kind,
            declarators,
            span,
        })
    }

    fn parse_function_decl(&mut self) -> PResult<FunctionDecl> {
        let keyword = self.bump();
        let id = self.expect_ident()?;
        let function = self.parse_function_rest(keyword.span)?;
        let span = keyword.span.to(function.span);
        Ok(FunctionDecl {
            id,
            function: Rc::new(function),
            span,
        })
    }

    /// Parses `( params ) { body }`, the shared tail of declarations,
    /// methods, and accessors.
    fn parse_function_rest(&mut self, start: Span) -> PResult<Function> {
        self.expect_punct(Punct::LParen)?;
        let mut params = Vec::new();
        if !self.peek().kind.is_punct(Punct::RParen) {
            loop {
                params.push(self.expect_ident()?);
                if self.peek().kind.is_punct(Punct::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen)?;
        let body = self.parse_block()?;
        let span = start.to(body.span);
        Ok(Function { params, body, span })
    }

    fn parse_class_decl(&mut self) -> PResult<ClassDecl> {
        let keyword = self.bump();
        let id = self.expect_ident()?;
        self.expect_punct(Punct::LBrace)?;
        let mut body = Vec::new();
        loop {
            match &self.peek().kind {
                TokenKind::Punct(Punct::RBrace) => break,
                TokenKind::Punct(Punct::Semi) => {
                    self.bump();
                }
                TokenKind::Eof => {
                    return Err(self.fatal("unexpected end of input in class body"));
                }
                _ => match self.parse_method() {
                    Ok(method) => body.push(method),
                    Err(Fail::Fatal(err)) => return Err(Fail::Fatal(err)),
                    Err(Fail::Recover) => self.recover_statement(),
                },
            }
        }
        let close = self.bump();
        Ok(ClassDecl {
            id,
            body,
            span: keyword.span.to(close.span),
        })
    }

    fn parse_method(&mut self) -> PResult<Method> {
        let start = self.peek().span;
        let mut is_static = false;
        if self.peek().kind.is_ident("static") && self.looks_like_member_name(1) {
            self.bump();
            is_static = true;
        }
        let mut kind = MethodKind::Method;
        if (self.peek().kind.is_ident("get") || self.peek().kind.is_ident("set")) && self.looks_like_member_name(1) {
            kind = if self.peek().kind.is_ident("get") {
                MethodKind::Get
            } else {
                MethodKind::Set
            };
            self.bump();
        }
        let key = self.expect_ident()?;
        if kind == MethodKind::Method && !is_static && key.name == "constructor" {
            kind = MethodKind::Constructor;
        }
        let function = self.parse_function_rest(start)?;
        let span = start.to(function.span);
        Ok(Method {
            key,
            kind,
            is_static,
            function: Rc::new(function),
            span,
        })
    }

    /// True when the token `ahead` positions away can start a member name,
    /// which disambiguates `static f() {}` / `get x() {}` from methods
    /// actually named `static`, `get`, or `set`.
    fn looks_like_member_name(&self, ahead: usize) -> bool {
        matches!(
            self.tokens.get(self.pos + ahead).map(|t| &t.kind),
            Some(TokenKind::Ident(_))
        )
    }

    fn parse_return(&mut self) -> PResult<Return> {
        let keyword = self.bump();
        let argument = match &self.peek().kind {
            TokenKind::Punct(Punct::Semi | Punct::RBrace) | TokenKind::Eof => None,
            _ => Some(self.parse_expr()?),
        };
        let last = argument.as_ref().map_or(keyword.span, Expr::span);
        let span = keyword.span.to(self.eat_semi(last));
        Ok(Return { argument, span })
    }

    fn parse_if(&mut self) -> PResult<If> {
        let keyword = self.bump();
        self.expect_punct(Punct::LParen)?;
        let test = self.parse_expr()?;
        self.expect_punct(Punct::RParen)?;
        let consequent = self.parse_nested_stmt()?;
        let mut span = keyword.span.to(consequent.span());
        let alternate = if self.peek().kind.is_ident("else") {
            self.bump();
            let stmt = self.parse_nested_stmt()?;
            span = span.to(stmt.span());
            Some(Box::new(stmt))
        } else {
            None
        };
        Ok(If {
            test,
            consequent: Box::new(consequent),
            alternate,
            span,
        })
    }

    /// A statement in branch position; a skipped statement degrades to an
    /// empty one so the `if` node itself survives.
    fn parse_nested_stmt(&mut self) -> PResult<Stmt> {
        let span = self.peek().span;
        match self.parse_stmt() {
            Ok(Some(stmt)) => Ok(stmt),
            Ok(None) => Ok(Stmt::Empty(span)),
            Err(Fail::Fatal(err)) => Err(Fail::Fatal(err)),
            Err(Fail::Recover) => {
                self.recover_statement();
                Ok(Stmt::Empty(span))
            }
        }
    }

    fn parse_block(&mut self) -> PResult<Block> {
        let open = self.expect_punct(Punct::LBrace)?;
        let mut body = Vec::new();
        loop {
            match &self.peek().kind {
                TokenKind::Punct(Punct::RBrace) => break,
                TokenKind::Eof => return Err(self.fatal("unexpected end of input, unclosed block")),
                _ => match self.parse_stmt() {
                    Ok(Some(stmt)) => body.push(stmt),
                    Ok(None) => {}
                    Err(Fail::Recover) => self.recover_statement(),
                    Err(Fail::Fatal(err)) => return Err(Fail::Fatal(err)),
                },
            }
        }
        let close = self.bump();
        Ok(Block {
            body,
            span: open.to(close.span),
        })
    }

    // === expressions ===

    fn parse_expr(&mut self) -> PResult<Expr> {
        let left = self.parse_binary(0)?;
        if self.peek().kind.is_punct(Punct::Assign) {
            self.bump();
            let value = self.parse_expr()?;
            let span = left.span().to(value.span());
            return Ok(Expr::Assign(Box::new(Assign {
                target: left,
                value,
                span,
            })));
        }
        Ok(left)
    }

    fn parse_binary(&mut self, min_bp: u8) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        while let TokenKind::Punct(punct) = self.peek().kind {
            let Some((bp, op)) = binary_op(punct) else { break };
            if bp < min_bp {
                break;
            }
            self.bump();
            // `**` is right-associative; everything else is left.
            let next_bp = if op == BinaryOp::Pow { bp } else { bp + 1 };
            let right = self.parse_binary(next_bp)?;
            let span = left.span().to(right.span());
            left = Expr::Binary(Box::new(Binary {
                left,
                op,
                right,
                span,
            }));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Punct(Punct::Minus) => Some(UnaryOp::Neg),
            TokenKind::Punct(Punct::Plus) => Some(UnaryOp::Pos),
            TokenKind::Punct(Punct::Tilde) => Some(UnaryOp::BitNot),
            TokenKind::Punct(Punct::Bang) => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let token = self.bump();
            let argument = self.parse_unary()?;
            let span = token.span.to(argument.span());
            return Ok(Expr::Unary(Box::new(Unary { op, argument, span })));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek().kind {
                TokenKind::Punct(Punct::Dot) => {
                    self.bump();
                    let property = self.expect_ident()?;
                    let span = expr.span().to(property.span);
                    expr = Expr::Member(Box::new(Member {
                        object: expr,
                        property,
                        span,
                    }));
                }
                TokenKind::Punct(Punct::LParen) => {
                    let (arguments, close) = self.parse_arguments()?;
                    let span = expr.span().to(close);
                    expr = Expr::Call(Box::new(Call {
                        callee: expr,
                        arguments,
                        is_new: false,
                        span,
                    }));
                }
                // Computed member access is not modeled; the index
                // expression is still consumed so parsing stays in sync.
                TokenKind::Punct(Punct::LBracket) => {
                    self.bump();
                    if !self.peek().kind.is_punct(Punct::RBracket) {
                        self.parse_expr()?;
                    }
                    let close = self.expect_punct(Punct::RBracket)?;
                    expr = Expr::Unsupported(expr.span().to(close));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Int(value) => {
                self.bump();
                Ok(Expr::Literal(Literal {
                    value: Lit::Int(value),
                    span: token.span,
                }))
            }
            TokenKind::Float(value) => {
                self.bump();
                Ok(Expr::Literal(Literal {
                    value: Lit::Float(value),
                    span: token.span,
                }))
            }
            TokenKind::Str(value) => {
                self.bump();
                Ok(Expr::Literal(Literal {
                    value: Lit::Str(value),
                    span: token.span,
                }))
            }
            TokenKind::Ident(name) => match name.as_str() {
                "true" | "false" => {
                    self.bump();
                    Ok(Expr::Literal(Literal {
                        value: Lit::Bool(name == "true"),
                        span: token.span,
                    }))
                }
                "null" | "undefined" => {
                    self.bump();
                    Ok(Expr::Literal(Literal {
                        value: Lit::Null,
                        span: token.span,
                    }))
                }
                "this" => {
                    self.bump();
                    Ok(Expr::This(token.span))
                }
                "new" => self.parse_new(),
                // Anonymous function expressions are consumed whole but not
                // modeled.
                "function" => {
                    self.bump();
                    if matches!(self.peek().kind, TokenKind::Ident(_)) {
                        self.bump();
                    }
                    let function = self.parse_function_rest(token.span)?;
                    Ok(Expr::Unsupported(token.span.to(function.span)))
                }
                _ => {
                    self.bump();
                    Ok(Expr::Ident(Ident {
                        name,
                        span: token.span,
                    }))
                }
            },
            TokenKind::Punct(Punct::LParen) => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect_punct(Punct::RParen)?;
                Ok(expr)
            }
            // Array literals: consumed, not modeled.
            TokenKind::Punct(Punct::LBracket) => {
                self.bump();
                if !self.peek().kind.is_punct(Punct::RBracket) {
                    loop {
                        self.parse_expr()?;
                        if self.peek().kind.is_punct(Punct::Comma) {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                let close = self.expect_punct(Punct::RBracket)?;
                Ok(Expr::Unsupported(token.span.to(close)))
            }
            // Object literals: skipped with brace matching, not modeled.
            TokenKind::Punct(Punct::LBrace) => {
                let close = self.skip_balanced_braces()?;
                Ok(Expr::Unsupported(token.span.to(close)))
            }
            _ => Err(Fail::Recover),
        }
    }

    fn parse_new(&mut self) -> PResult<Expr> {
        let keyword = self.bump();
        let mut callee = self.parse_primary()?;
        while self.peek().kind.is_punct(Punct::Dot) {
            self.bump();
            let property = self.expect_ident()?;
            let span = callee.span().to(property.span);
            callee = Expr::Member(Box::new(Member {
                object: callee,
                property,
                span,
            }));
        }
        let (arguments, end) = if self.peek().kind.is_punct(Punct::LParen) {
            self.parse_arguments()?
        } else {
            (Vec::new(), callee.span())
        };
        let span = keyword.span.to(end);
        Ok(Expr::Call(Box::new(Call {
            callee,
            arguments,
            is_new: true,
            span,
        })))
    }

    /// Parses `( expr, ... )`; the opening paren is the current token.
    /// Returns the arguments and the span of the closing paren.
    fn parse_arguments(&mut self) -> PResult<(Vec<Expr>, Span)> {
        self.expect_punct(Punct::LParen)?;
        let mut arguments = Vec::new();
        if !self.peek().kind.is_punct(Punct::RParen) {
            loop {
                arguments.push(self.parse_expr()?);
                if self.peek().kind.is_punct(Punct::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        let close = self.expect_punct(Punct::RParen)?;
        Ok((arguments, close))
    }

    // === token plumbing ===

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn expect_ident(&mut self) -> PResult<Ident> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let ident = Ident {
                    name: name.clone(),
                    span: self.peek().span,
                };
                self.bump();
                Ok(ident)
            }
            TokenKind::Eof => Err(self.fatal("unexpected end of input, expected a name")),
            _ => Err(Fail::Recover),
        }
    }

    fn expect_punct(&mut self, punct: Punct) -> PResult<Span> {
        if self.peek().kind.is_punct(punct) {
            Ok(self.bump().span)
        } else if self.at_eof() {
            Err(self.fatal("unexpected end of input"))
        } else {
            Err(Fail::Recover)
        }
    }

    fn fatal(&self, message: &str) -> Fail {
        Fail::Fatal(ParseError::at(self.src, self.peek().span.start, message))
    }

    /// Skips tokens until the current statement plausibly ends: a `;` at
    /// nesting depth zero, the close of a brace group the statement opened,
    /// or the close of the enclosing block (left unconsumed).
    fn recover_statement(&mut self) {
        let mut depth = 0u32;
        loop {
            match self.peek().kind {
                TokenKind::Eof => return,
                TokenKind::Punct(Punct::Semi) if depth == 0 => {
                    self.bump();
                    return;
                }
                TokenKind::Punct(Punct::LBrace | Punct::LParen | Punct::LBracket) => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::Punct(Punct::RBrace) => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    self.bump();
                    if depth == 0 {
                        return;
                    }
                }
                TokenKind::Punct(Punct::RParen | Punct::RBracket) => {
                    depth = depth.saturating_sub(1);
                    self.bump();
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Consumes balanced `{ ... }` starting at the current `{`; returns the
    /// closing brace's span.
    fn skip_balanced_braces(&mut self) -> PResult<Span> {
        let mut depth = 0u32;
        loop {
            match self.peek().kind {
                TokenKind::Eof => return Err(self.fatal("unexpected end of input, unclosed brace")),
                TokenKind::Punct(Punct::LBrace) => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::Punct(Punct::RBrace) => {
                    depth -= 1;
                    let close = self.bump();
                    if depth == 0 {
                        return Ok(close.span);
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Consumes an optional trailing `;`, returning the span the statement
    /// should extend to.
    fn eat_semi(&mut self, last: Span) -> Span {
        if self.peek().kind.is_punct(Punct::Semi) {
            self.bump().span
        } else {
            last
        }
    }
}

/// Binding power and domain operator for an infix token.
fn binary_op(punct: Punct) -> Option<(u8, BinaryOp)> {
    Some(match punct {
        Punct::PipePipe => (1, BinaryOp::Or),
        Punct::AmpAmp => (2, BinaryOp::And),
        Punct::Pipe => (3, BinaryOp::Or),
        Punct::Caret => (4, BinaryOp::Xor),
        Punct::Amp => (5, BinaryOp::And),
        Punct::EqEq | Punct::EqEqEq => (6, BinaryOp::Eq),
        Punct::NotEq | Punct::NotEqEq => (6, BinaryOp::Ne),
        Punct::Lt => (7, BinaryOp::Lt),
        Punct::Gt => (7, BinaryOp::Gt),
        Punct::Le => (7, BinaryOp::Le),
        Punct::Ge => (7, BinaryOp::Ge),
        Punct::Shl => (8, BinaryOp::Shl),
        Punct::Shr | Punct::UShr => (8, BinaryOp::Shr),
        Punct::Plus => (9, BinaryOp::Add),
        Punct::Minus => (9, BinaryOp::Sub),
        Punct::Star => (10, BinaryOp::Mul),
        Punct::Slash => (10, BinaryOp::Div),
        Punct::Percent => (10, BinaryOp::Mod),
        Punct::StarStar => (11, BinaryOp::Pow),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        parse(src).expect("source should parse")
    }

    #[test]
    fn var_decl_with_init() {
        let program = parse_ok("var x = 1 + 2;");
        assert_eq!(program.body.len(), 1);
        let Stmt::Var(decl) = &program.body[0] else {
            panic!("expected var declaration");
        };
        assert_eq!(decl.kind, DeclKind::Var);
        assert_eq!(decl.declarators.len(), 1);
        assert_eq!(decl.declarators[0].id.name, "x");
        let Some(Expr::Binary(binary)) = &decl.declarators[0].init else {
            panic!("expected binary init");
        };
        assert_eq!(binary.op, BinaryOp::Add);
    }

    #[test]
    fn precedence_mul_over_add() {
        let program = parse_ok("var x = 1 + 2 * 3;");
        let Stmt::Var(decl) = &program.body[0] else {
            panic!("expected var declaration");
        };
        let Some(Expr::Binary(add)) = &decl.declarators[0].init else {
            panic!("expected binary init");
        };
        assert_eq!(add.op, BinaryOp::Add);
        let Expr::Binary(mul) = &add.right else {
            panic!("expected nested multiply");
        };
        assert_eq!(mul.op, BinaryOp::Mul);
    }

    #[test]
    fn class_with_members() {
        let program = parse_ok(
            "class Sprite {
                constructor(x) { this.x = x; }
                static zero() { return 0; }
                get width() { return 10; }
                set width(w) { this.w = w; }
                update() { return this.x; }
            }",
        );
        let Stmt::Class(class) = &program.body[0] else {
            panic!("expected class declaration");
        };
        assert_eq!(class.id.name, "Sprite");
        let kinds: Vec<_> = class.body.iter().map(|m| (m.key.name.as_str(), m.kind, m.is_static)).collect();
        assert_eq!(
            kinds,
            vec![
                ("constructor", MethodKind::Constructor, false),
                ("zero", MethodKind::Method, true),
                ("width", MethodKind::Get, false),
                ("width", MethodKind::Set, false),
                ("update", MethodKind::Method, false),
            ]
        );
    }

    #[test]
    fn new_expression_lowers_to_call() {
        let program = parse_ok("var s = new Sprite(1, 2);");
        let Stmt::Var(decl) = &program.body[0] else {
            panic!("expected var declaration");
        };
        let Some(Expr::Call(call)) = &decl.declarators[0].init else {
            panic!("expected call init");
        };
        assert!(call.is_new);
        assert_eq!(call.arguments.len(), 2);
        let Expr::Ident(callee) = &call.callee else {
            panic!("expected identifier callee");
        };
        assert_eq!(callee.name, "Sprite");
    }

    #[test]
    fn strict_equality_lowers_to_eq() {
        let program = parse_ok("if (k === \"right\") { k; }");
        let Stmt::If(stmt) = &program.body[0] else {
            panic!("expected if statement");
        };
        let Expr::Binary(test) = &stmt.test else {
            panic!("expected binary test");
        };
        assert_eq!(test.op, BinaryOp::Eq);
    }

    #[test]
    fn unsupported_statement_is_skipped() {
        let program = parse_ok("var x = 1; for (i = 0; i < 10; i = i + 1) { x = i; } var y = 2;");
        let names: Vec<_> = program
            .body
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Var(decl) => Some(decl.declarators[0].id.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn comments_are_collected_with_spans() {
        let src = "// leading\nvar x = 1; /* block */ var y = 2;";
        let program = parse_ok(src);
        assert_eq!(program.comments.len(), 2);
        assert!(!program.comments[0].block);
        assert_eq!(program.comments[0].text, " leading");
        assert!(program.comments[1].block);
        let span = program.comments[1].span;
        assert_eq!(&src[span.start as usize..span.end as usize], "/* block */");
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let err = parse("var x = \"oops").unwrap_err();
        assert!(err.message().contains("unterminated string"));
        assert_eq!(err.line(), 1);
    }

    #[test]
    fn unclosed_block_is_fatal() {
        let err = parse("function f() { return 1;").unwrap_err();
        assert!(err.message().contains("unclosed block"));
    }
}

//! Owned abstract-syntax-tree node families for Lox.
//!
//! Both node families are closed tagged variants: the parser, resolver and
//! interpreter are each a single exhaustive `match` over a finite, stable set
//! of node kinds.  A parent node owns its children exclusively, with one
//! exception: function declarations sit behind an [`Rc`] so that a runtime
//! function value can share the declaration (parameters and body) instead of
//! deep-cloning it at definition time.

use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::token::Token;

static NEXT_EXPR_ID: AtomicUsize = AtomicUsize::new(0);

/// Process-unique identity of a variable-binding expression occurrence
/// (`Variable`, `Assign`, `This`, `Super`).
///
/// The resolver keys its scope-hop side table by this id; uniqueness across
/// the whole process keeps annotations from distinct REPL lines from
/// colliding inside the long-lived interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(usize);

impl ExprId {
    /// Mint a fresh id.  Called by the parser for every binding occurrence.
    pub fn fresh() -> Self {
        ExprId(NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A **literal constant** that appears directly in the source code.
///
/// These variants are the *terminal leaves* of the expression tree and
/// therefore do **not** retain a reference to the originating [`Token`]:
/// the parser converts the value at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// Numeric literal, stored as IEEE-754 `f64`.
    /// Integral lexemes such as `"3"` are still parsed as `3.0`.
    Number(f64),

    /// String literal without surrounding quotes.
    Str(String),

    /// The boolean constant `true`.
    True,

    /// The boolean constant `false`.
    False,

    /// The `nil` literal.
    Nil,
}

/// AST node representing every kind of *expression* in Lox.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A literal constant: number, string, `true`, `false`, or `nil`.
    Literal(LiteralValue),

    /// Parenthesised sub-expression: `"(" expression ")"`.
    Grouping(Box<Expr>),

    /// Prefix unary operator expression, e.g. `!isReady` or `-42`.
    Unary {
        /// The operator token (`!` or `-`).
        operator: Token,
        right: Box<Expr>,
    },

    /// Infix binary operator expression, e.g. `a + b`, `x <= y`.
    Binary {
        left: Box<Expr>,
        /// Operator token such as `+`, `*`, `==`, …
        operator: Token,
        right: Box<Expr>,
    },

    /// Short-circuiting logical operators `and` / `or`.
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },

    /// Variable access.
    Variable { name: Token, id: ExprId },

    /// Assignment expression: `identifier "=" expression`.
    Assign {
        name: Token,
        value: Box<Expr>,
        id: ExprId,
    },

    /// Function, method or class-constructor call.
    Call {
        /// Expression that evaluates to a callable.
        callee: Box<Expr>,
        /// The closing `)` token, retained for error reporting.
        paren: Token,
        /// Argument list (may be empty).
        arguments: Vec<Expr>,
    },

    /// `object.property`
    Get { object: Box<Expr>, name: Token },

    /// `object.property = value`
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },

    /// The `this` keyword inside a method.
    This { keyword: Token, id: ExprId },

    /// `super.method` inside a subclass method.
    Super {
        keyword: Token,
        method: Token,
        id: ExprId,
    },
}

/// A named function or method declaration: shared between the statement that
/// declared it and every closure value created from it.
#[derive(Debug)]
pub struct FunctionDecl {
    pub name: Token,

    /// Parameter name tokens (arity ≤ 255).
    pub params: Vec<Token>,

    /// Body executed when the function is called.
    pub body: Vec<Stmt>,
}

/// A class declaration: name, optional superclass reference, methods.
///
/// The superclass is kept as a [`Expr::Variable`] so the resolver and the
/// interpreter treat it like any other variable reference.
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: Token,
    pub superclass: Option<Expr>,
    pub methods: Vec<Rc<FunctionDecl>>,
}

/// AST node for *statements* (complete executable constructs).  A program is
/// a sequence of these nodes returned by the parser.
///
/// There is no `for` node: for-loops are desugared into while-loops at parse
/// time.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// Stand-alone expression terminated by a semicolon.
    Expression(Expr),

    /// `print` statement.
    Print(Expr),

    /// Variable declaration: `"var" IDENT ("=" initializer)? ";"`.
    Var {
        name: Token,
        initializer: Option<Expr>,
    },

    /// Braced scope containing zero or more declarations/statements.
    Block(Vec<Stmt>),

    /// `if` / `else` conditional.
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    /// `while` loop.
    While { condition: Expr, body: Box<Stmt> },

    /// Function declaration: becomes a first-class callable value.
    Function(Rc<FunctionDecl>),

    /// `return` statement inside a function body.
    Return {
        /// The `return` keyword token (for error locations).
        keyword: Token,

        /// Optional expression to return.  Absent ⇒ `nil` is returned.
        value: Option<Expr>,
    },

    /// Class declaration.
    Class(ClassDecl),
}

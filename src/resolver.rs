/*!
Static variable resolution pass.

Walks the AST between parsing and interpretation, mirroring the block
structure as a stack of lexical scopes.  For every variable reference it can
place, it tells the interpreter how many scopes separate the use from the
declaration; references it cannot place are left for dynamic lookup in the
global environment, which is what lets top-level declarations refer to each
other in any order.

The same walk rejects the statically detectable misuses: reading a local in
its own initializer, redeclaring a name in the same local scope, `return`
outside a function, returning a value from `init`, `this`/`super` outside a
class, `super` without a superclass, and a class inheriting from itself.

All errors are accumulated; the pass never stops at the first one.
*/

use std::collections::HashMap;

use log::debug;

use crate::ast::{ClassDecl, Expr, ExprId, FunctionDecl, Stmt};
use crate::error::LoxError;
use crate::interpreter::Interpreter;
use crate::token::Token;

/// What kind of function body the walk is currently inside.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FunctionType {
    None,
    Function,
    Method,
    Initializer,
}

/// Whether the walk is currently inside a class body, and if so whether the
/// class has a superclass.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

pub struct Resolver<'a> {
    interpreter: &'a mut Interpreter,

    /// One map per open lexical scope, innermost last.  The bool tracks
    /// whether the binding's initializer has finished (declared vs defined).
    scopes: Vec<HashMap<String, bool>>,

    current_function: FunctionType,
    current_class: ClassType,

    errors: Vec<LoxError>,
}

impl<'a> Resolver<'a> {
    pub fn new(interpreter: &'a mut Interpreter) -> Self {
        Self {
            interpreter,
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            errors: Vec::new(),
        }
    }

    /// Resolves a whole program (or one REPL line), returning every static
    /// error found.  An empty Vec means the program may be interpreted.
    pub fn resolve(mut self, statements: &[Stmt]) -> Vec<LoxError> {
        debug!("Resolving {} statements", statements.len());

        self.resolve_statements(statements);

        self.errors
    }

    fn resolve_statements(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            self.resolve_statement(stmt);
        }
    }

    fn resolve_statement(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression(expr) | Stmt::Print(expr) => self.resolve_expression(expr),

            Stmt::Var { name, initializer } => {
                self.declare(name);

                if let Some(initializer) = initializer {
                    self.resolve_expression(initializer);
                }

                self.define(name);
            }

            Stmt::Block(statements) => {
                self.begin_scope();
                self.resolve_statements(statements);
                self.end_scope();
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expression(condition);
                self.resolve_statement(then_branch);

                if let Some(else_branch) = else_branch {
                    self.resolve_statement(else_branch);
                }
            }

            Stmt::While { condition, body } => {
                self.resolve_expression(condition);
                self.resolve_statement(body);
            }

            Stmt::Function(decl) => {
                // Defined before the body resolves so the function can
                // recurse.
                self.declare(&decl.name);
                self.define(&decl.name);

                self.resolve_function(decl, FunctionType::Function);
            }

            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.error(keyword, "Cannot return from top-level code");
                }

                if let Some(value) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.error(keyword, "Cannot return a value from an initializer");
                    }

                    self.resolve_expression(value);
                }
            }

            Stmt::Class(decl) => self.resolve_class(decl),
        }
    }

    fn resolve_class(&mut self, decl: &ClassDecl) {
        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;

        self.declare(&decl.name);
        self.define(&decl.name);

        if let Some(superclass) = &decl.superclass {
            if let Expr::Variable { name, .. } = superclass {
                if name.lexeme == decl.name.lexeme {
                    self.error(name, "A class cannot inherit from itself");
                }
            }

            self.current_class = ClassType::Subclass;
            self.resolve_expression(superclass);

            // The scope binding `super`, mirroring the environment the
            // interpreter wraps methods in.
            self.begin_scope();
            self.scope_define("super");
        }

        // The scope binding `this`.
        self.begin_scope();
        self.scope_define("this");

        for method in &decl.methods {
            let function_type = if method.name.lexeme == "init" {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };

            self.resolve_function(method, function_type);
        }

        self.end_scope();

        if decl.superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    fn resolve_function(&mut self, decl: &FunctionDecl, function_type: FunctionType) {
        let enclosing_function = self.current_function;
        self.current_function = function_type;

        self.begin_scope();

        for param in &decl.params {
            self.declare(param);
            self.define(param);
        }

        self.resolve_statements(&decl.body);

        self.end_scope();

        self.current_function = enclosing_function;
    }

    fn resolve_expression(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => self.resolve_expression(inner),

            Expr::Unary { right, .. } => self.resolve_expression(right),

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expression(left);
                self.resolve_expression(right);
            }

            Expr::Variable { name, id } => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme) == Some(&false) {
                        self.error(name, "Cannot read local variable in its own initializer");
                    }
                }

                self.resolve_local(name, *id);
            }

            Expr::Assign { name, value, id } => {
                self.resolve_expression(value);
                self.resolve_local(name, *id);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expression(callee);

                for argument in arguments {
                    self.resolve_expression(argument);
                }
            }

            Expr::Get { object, .. } => self.resolve_expression(object),

            Expr::Set { object, value, .. } => {
                self.resolve_expression(value);
                self.resolve_expression(object);
            }

            Expr::This { keyword, id } => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Cannot use 'this' outside of a class");

                    return;
                }

                self.resolve_local(keyword, *id);
            }

            Expr::Super { keyword, id, .. } => {
                match self.current_class {
                    ClassType::None => {
                        self.error(keyword, "Cannot use 'super' outside of a class");

                        return;
                    }

                    ClassType::Class => {
                        self.error(keyword, "Cannot use 'super' in a class with no superclass");

                        return;
                    }

                    ClassType::Subclass => {}
                }

                self.resolve_local(keyword, *id);
            }
        }
    }

    /// Annotate the reference with the number of scopes between its use and
    /// the innermost scope declaring `name`.  No enclosing scope declaring
    /// it means the name is (presumed) global and stays unannotated.
    fn resolve_local(&mut self, name: &Token, id: ExprId) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                debug!("Resolved '{}' at depth {}", name.lexeme, depth);

                self.interpreter.note_local(id, depth);

                return;
            }
        }
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    /// Mark `name` as declared but not yet initialized in the current scope.
    fn declare(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };

        if scope.contains_key(&name.lexeme) {
            self.errors.push(LoxError::resolve(
                name,
                "Already a variable with this name in this scope",
            ));
        }

        scope.insert(name.lexeme.clone(), false);
    }

    /// Mark `name` as fully initialized and usable.
    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    /// Define an implicit binding (`this`, `super`) in the current scope.
    fn scope_define(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), true);
        }
    }

    fn error<S: Into<String>>(&mut self, token: &Token, message: S) {
        self.errors.push(LoxError::resolve(token, message));
    }
}

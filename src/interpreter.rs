/*!
Tree-walking evaluator for Lox.

The interpreter executes a statement sequence against one long-lived global
environment (process lifetime; REPL state survives between prompts) and
produces runtime values and side effects.  Evaluation is single-threaded and
strictly synchronous: side effects occur in left-to-right, depth-first order.

Control flow
------------

Statement execution returns `Result<Signal, LoxError>`:

* `Ok(Signal::Normal)`: the statement ran to completion.
* `Ok(Signal::Return(value))`: a `return` is unwinding; every
  statement-executing call site checks and propagates it upward until the
  frame that initiated the current function call turns it into that call's
  result.
* `Err(_)`: a runtime error; evaluation halts at the first one.

Scope addressing
----------------

Variable references resolved by the resolver carry a scope-hop count in the
`locals` side table (keyed by [`ExprId`]); unannotated references fall back
to dynamic lookup in the global environment, which is what permits forward
references between top-level declarations.
*/

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use chrono::Utc;
use log::{debug, info};

use crate::ast::{ClassDecl, Expr, ExprId, LiteralValue, Stmt};
use crate::callable::{Callable, LoxFunction, NativeFn, NativeFunction};
use crate::class::{LoxClass, LoxInstance};
use crate::environment::{EnvRef, Environment};
use crate::error::{LoxError, Result};
use crate::token::{Token, TokenType};
use crate::value::Value;

/// Outcome of executing a single statement.
#[derive(Debug)]
pub enum Signal {
    /// Fell off the end; continue with the next statement.
    Normal,

    /// A `return` statement is unwinding with its value.
    Return(Value),
}

/// Shared handle to the interpreter's print sink.
pub type OutputRef = Rc<RefCell<dyn Write>>;

pub struct Interpreter {
    globals: EnvRef,
    environment: EnvRef,
    locals: HashMap<ExprId, usize>,
    output: OutputRef,
}

impl Interpreter {
    /// Creates a new Interpreter printing to stdout, with the `clock` and
    /// `clock_ms` natives pre-registered.
    pub fn new() -> Self {
        Self::with_output(Rc::new(RefCell::new(io::stdout())))
    }

    /// Creates a new Interpreter printing to the given sink.  Embedders and
    /// tests use this to capture `print` output.
    pub fn with_output(output: OutputRef) -> Self {
        info!("Initializing Interpreter");

        let globals: EnvRef = Rc::new(RefCell::new(Environment::new()));

        let mut interpreter = Self {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            output,
        };

        interpreter.define_native("clock", 0, |_args| {
            Ok(Value::Number(Utc::now().timestamp_millis() as f64 / 1000.0))
        });

        interpreter.define_native("clock_ms", 0, |_args| {
            Ok(Value::Number(Utc::now().timestamp_millis() as f64))
        });

        interpreter
    }

    /// Register a host-provided callable in the global environment.  Call
    /// sites treat it identically to a user-defined function.
    pub fn define_native(&mut self, name: &str, arity: usize, func: NativeFn) {
        debug!("Defining native function '{}' (arity {})", name, arity);

        let native = NativeFunction {
            name: name.to_string(),
            arity,
            func,
        };

        self.globals
            .borrow_mut()
            .define(name, Value::NativeFunction(Rc::new(native)));
    }

    /// Record a resolver annotation: the reference with identity `id` lives
    /// `depth` scopes out from its use site.  Globals get no entry.
    pub fn note_local(&mut self, id: ExprId, depth: usize) {
        self.locals.insert(id, depth);
    }

    /// Interprets a statement sequence (a program, or one REPL line).
    ///
    /// Returns the value of the final statement when it is an expression
    /// statement, `nil` otherwise, giving the driver a displayable result.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<Value> {
        debug!("Interpreting {} statements", statements.len());

        let mut result: Value = Value::Nil;

        for stmt in statements {
            match stmt {
                Stmt::Expression(expr) => {
                    result = self.evaluate(expr)?;
                }

                other => {
                    result = Value::Nil;

                    // The resolver rejects top-level `return`, so no Return
                    // signal can surface here.
                    self.execute(other)?;
                }
            }
        }

        info!("Interpretation completed successfully");

        Ok(result)
    }

    // ───────────────────────── statement execution ─────────────────────────

    /// Executes a single statement.
    pub fn execute(&mut self, stmt: &Stmt) -> Result<Signal> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;

                Ok(Signal::Normal)
            }

            Stmt::Print(expr) => {
                let value: Value = self.evaluate(expr)?;

                debug!("Printing value: {}", value);

                writeln!(self.output.borrow_mut(), "{}", value)?;

                Ok(Signal::Normal)
            }

            Stmt::Var { name, initializer } => {
                let value: Value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                debug!("Defining variable '{}' = {}", name.lexeme, value);

                self.environment.borrow_mut().define(&name.lexeme, value);

                Ok(Signal::Normal)
            }

            Stmt::Block(statements) => {
                let scope = Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
                    &self.environment,
                ))));

                self.execute_block(statements, scope)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(Signal::Normal)
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    match self.execute(body)? {
                        Signal::Normal => {}

                        // Propagate the unwind past the loop.
                        signal @ Signal::Return(_) => return Ok(signal),
                    }
                }

                Ok(Signal::Normal)
            }

            Stmt::Function(decl) => {
                debug!("Defining function '{}'", decl.name.lexeme);

                let function = LoxFunction::new(Rc::clone(decl), Rc::clone(&self.environment), false);

                self.environment
                    .borrow_mut()
                    .define(&decl.name.lexeme, Value::Function(Rc::new(function)));

                Ok(Signal::Normal)
            }

            Stmt::Return { value, .. } => {
                let value: Value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                debug!("Return unwind with value: {}", value);

                Ok(Signal::Return(value))
            }

            Stmt::Class(decl) => self.execute_class(decl),
        }
    }

    /// Executes `statements` under `environment`, restoring the previous
    /// environment afterwards even when execution stops early.
    pub fn execute_block(&mut self, statements: &[Stmt], environment: EnvRef) -> Result<Signal> {
        let previous: EnvRef = std::mem::replace(&mut self.environment, environment);

        let mut result: Result<Signal> = Ok(Signal::Normal);

        for stmt in statements {
            match self.execute(stmt) {
                Ok(Signal::Normal) => {}

                other => {
                    result = other;
                    break;
                }
            }
        }

        self.environment = previous;

        result
    }

    fn execute_class(&mut self, decl: &ClassDecl) -> Result<Signal> {
        debug!("Defining class '{}'", decl.name.lexeme);

        let superclass: Option<Rc<LoxClass>> = match &decl.superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(class) => Some(class),

                _ => {
                    // The superclass clause is always a variable reference.
                    let token: &Token = match expr {
                        Expr::Variable { name, .. } => name,
                        _ => &decl.name,
                    };

                    return Err(LoxError::runtime(token, "Superclass must be a class"));
                }
            },

            None => None,
        };

        self.environment
            .borrow_mut()
            .define(&decl.name.lexeme, Value::Nil);

        // Methods close over an extra scope binding `super` when inheriting.
        let mut method_env: EnvRef = Rc::clone(&self.environment);

        if let Some(superclass) = &superclass {
            method_env = Rc::new(RefCell::new(Environment::with_enclosing(method_env)));

            method_env
                .borrow_mut()
                .define("super", Value::Class(Rc::clone(superclass)));
        }

        let mut methods: HashMap<String, Rc<LoxFunction>> = HashMap::new();

        for method in &decl.methods {
            let is_initializer: bool = method.name.lexeme == "init";

            let function =
                LoxFunction::new(Rc::clone(method), Rc::clone(&method_env), is_initializer);

            methods.insert(method.name.lexeme.clone(), Rc::new(function));
        }

        let class = LoxClass::new(decl.name.lexeme.clone(), superclass, methods);

        self.environment
            .borrow_mut()
            .assign(&decl.name, Value::Class(Rc::new(class)))?;

        Ok(Signal::Normal)
    }

    // ───────────────────────── expression evaluation ───────────────────────

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(literal) => Ok(self.evaluate_literal(literal)),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => self.evaluate_logical(left, operator, right),

            Expr::Variable { name, id } => self.look_up_variable(name, *id),

            Expr::Assign { name, value, id } => {
                let value: Value = self.evaluate(value)?;

                match self.locals.get(id) {
                    Some(&distance) => Environment::assign_at(
                        &self.environment,
                        distance,
                        name,
                        value.clone(),
                    )?,

                    None => self.globals.borrow_mut().assign(name, value.clone())?,
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => self.evaluate_call(callee, paren, arguments),

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => LoxInstance::get(&instance, name),

                _ => Err(LoxError::runtime(name, "Only instances have properties")),
            },

            Expr::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object)? else {
                    return Err(LoxError::runtime(name, "Only instances have fields"));
                };

                let value: Value = self.evaluate(value)?;

                instance.borrow_mut().set(name, value.clone());

                Ok(value)
            }

            Expr::This { keyword, id } => self.look_up_variable(keyword, *id),

            Expr::Super {
                keyword,
                method,
                id,
            } => self.evaluate_super(keyword, method, *id),
        }
    }

    fn evaluate_literal(&self, literal: &LiteralValue) -> Value {
        match literal {
            LiteralValue::Number(n) => Value::Number(*n),
            LiteralValue::Str(s) => Value::String(s.clone()),
            LiteralValue::True => Value::Bool(true),
            LiteralValue::False => Value::Bool(false),
            LiteralValue::Nil => Value::Nil,
        }
    }

    fn evaluate_unary(&mut self, operator: &Token, right: &Expr) -> Result<Value> {
        let right: Value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::MINUS => match right {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(LoxError::runtime(operator, "Operand must be a number")),
            },

            TokenType::BANG => Ok(Value::Bool(!right.is_truthy())),

            _ => Err(LoxError::runtime(operator, "Invalid unary operator")),
        }
    }

    /// Short-circuit evaluation: the result is whichever operand value
    /// decided the outcome, not forced to boolean.
    fn evaluate_logical(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Result<Value> {
        let left: Value = self.evaluate(left)?;

        let decided: bool = match operator.token_type {
            TokenType::OR => left.is_truthy(),
            _ => !left.is_truthy(), // AND
        };

        if decided {
            Ok(left)
        } else {
            self.evaluate(right)
        }
    }

    fn evaluate_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Result<Value> {
        let left: Value = self.evaluate(left)?;
        let right: Value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::PLUS => match (left, right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),

                _ => Err(LoxError::runtime(
                    operator,
                    "Operands must be two numbers or two strings",
                )),
            },

            TokenType::MINUS => {
                let (a, b) = numeric_operands(operator, left, right)?;

                Ok(Value::Number(a - b))
            }

            TokenType::STAR => {
                let (a, b) = numeric_operands(operator, left, right)?;

                Ok(Value::Number(a * b))
            }

            TokenType::SLASH => {
                let (a, b) = numeric_operands(operator, left, right)?;

                if b == 0.0 {
                    return Err(LoxError::runtime(operator, "Division by zero"));
                }

                Ok(Value::Number(a / b))
            }

            TokenType::GREATER => {
                let (a, b) = numeric_operands(operator, left, right)?;

                Ok(Value::Bool(a > b))
            }

            TokenType::GREATER_EQUAL => {
                let (a, b) = numeric_operands(operator, left, right)?;

                Ok(Value::Bool(a >= b))
            }

            TokenType::LESS => {
                let (a, b) = numeric_operands(operator, left, right)?;

                Ok(Value::Bool(a < b))
            }

            TokenType::LESS_EQUAL => {
                let (a, b) = numeric_operands(operator, left, right)?;

                Ok(Value::Bool(a <= b))
            }

            // Equality never errors: cross-type comparisons are unequal.
            TokenType::EQUAL_EQUAL => Ok(Value::Bool(left == right)),
            TokenType::BANG_EQUAL => Ok(Value::Bool(left != right)),

            _ => Err(LoxError::runtime(operator, "Invalid binary operator")),
        }
    }

    /// Evaluates the callee, then the arguments left-to-right, then invokes
    /// the callable after an exact arity check.
    fn evaluate_call(&mut self, callee: &Expr, paren: &Token, arguments: &[Expr]) -> Result<Value> {
        let callee: Value = self.evaluate(callee)?;

        let mut argument_values: Vec<Value> = Vec::with_capacity(arguments.len());

        for argument in arguments {
            argument_values.push(self.evaluate(argument)?);
        }

        let callable: &dyn Callable = match &callee {
            Value::Function(function) => function.as_ref(),
            Value::NativeFunction(native) => native.as_ref(),
            Value::Class(class) => class,

            _ => {
                return Err(LoxError::runtime(
                    paren,
                    "Can only call functions and classes",
                ));
            }
        };

        if argument_values.len() != callable.arity() {
            return Err(LoxError::runtime(
                paren,
                format!(
                    "Expected {} arguments but got {}",
                    callable.arity(),
                    argument_values.len()
                ),
            ));
        }

        callable.call(self, argument_values, paren.line)
    }

    /// `super.method` starts the lookup one level above the enclosing class
    /// in the inheritance chain, still bound to the current `this`.
    fn evaluate_super(&mut self, keyword: &Token, method: &Token, id: ExprId) -> Result<Value> {
        let distance: usize = match self.locals.get(&id) {
            Some(&distance) => distance,

            None => {
                return Err(LoxError::runtime(
                    keyword,
                    "Cannot use 'super' outside of a class",
                ));
            }
        };

        let superclass: Rc<LoxClass> =
            match Environment::get_at(&self.environment, distance, "super", keyword.line)? {
                Value::Class(class) => class,

                _ => return Err(LoxError::runtime(keyword, "'super' is not a class")),
            };

        // `this` sits one scope inside the one binding `super`.
        let object: Value =
            Environment::get_at(&self.environment, distance - 1, "this", keyword.line)?;

        let found: Rc<LoxFunction> = superclass.find_method(&method.lexeme).ok_or_else(|| {
            LoxError::runtime(method, format!("Undefined property '{}'", method.lexeme))
        })?;

        Ok(Value::Function(Rc::new(found.bind(object))))
    }

    fn look_up_variable(&self, name: &Token, id: ExprId) -> Result<Value> {
        match self.locals.get(&id) {
            Some(&distance) => {
                Environment::get_at(&self.environment, distance, &name.lexeme, name.line)
            }

            None => self.globals.borrow().get(name),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn numeric_operands(operator: &Token, left: Value, right: Value) -> Result<(f64, f64)> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((a, b)),
        _ => Err(LoxError::runtime(operator, "Operands must be numbers")),
    }
}

//! The callable capability and its two function-shaped implementors.
//!
//! A call site in the interpreter only sees `dyn Callable`: user-defined
//! functions, native (host-provided) functions, and classes acting as
//! constructors (see `class.rs`) are invoked identically after an exact
//! arity check.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::ast::FunctionDecl;
use crate::environment::{EnvRef, Environment};
use crate::error::{LoxError, Result};
use crate::interpreter::{Interpreter, Signal};
use crate::value::Value;

/// Anything invocable with `(args)`.
pub trait Callable {
    /// Exact number of arguments this callable requires.
    fn arity(&self) -> usize;

    /// Invoke with already-evaluated arguments.  `line` is the source line
    /// of the call site, used for diagnostics only.
    fn call(&self, interpreter: &mut Interpreter, arguments: Vec<Value>, line: usize)
        -> Result<Value>;
}

/// Signature of a host-provided function body.
pub type NativeFn = fn(&[Value]) -> std::result::Result<Value, String>;

/// A host-provided callable with a fixed arity, implemented outside the
/// language (e.g. reading the wall clock).
pub struct NativeFunction {
    pub name: String,
    pub arity: usize,
    pub func: NativeFn,
}

impl Callable for NativeFunction {
    fn arity(&self) -> usize {
        self.arity
    }

    fn call(
        &self,
        _interpreter: &mut Interpreter,
        arguments: Vec<Value>,
        line: usize,
    ) -> Result<Value> {
        debug!("Calling native function '{}'", self.name);

        (self.func)(&arguments).map_err(|message| LoxError::runtime_at(line, message))
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

/// A user-defined function value: the shared declaration plus the
/// environment captured at its definition point.
///
/// Calling binds parameters into a fresh child of the captured environment,
/// which is how a closure sees the world it was created in rather than the
/// world it is called from.
pub struct LoxFunction {
    decl: Rc<FunctionDecl>,
    closure: EnvRef,
    is_initializer: bool,
}

impl LoxFunction {
    pub fn new(decl: Rc<FunctionDecl>, closure: EnvRef, is_initializer: bool) -> Self {
        Self {
            decl,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> &str {
        &self.decl.name.lexeme
    }

    /// Produce a bound method: same declaration, but the captured scope
    /// additionally binds `this` to `instance`.
    pub fn bind(&self, instance: Value) -> LoxFunction {
        let environment = Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
            &self.closure,
        ))));

        environment.borrow_mut().define("this", instance);

        LoxFunction::new(Rc::clone(&self.decl), environment, self.is_initializer)
    }
}

impl Callable for LoxFunction {
    fn arity(&self) -> usize {
        self.decl.params.len()
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
        line: usize,
    ) -> Result<Value> {
        debug!("Calling function '{}'", self.name());

        let environment = Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
            &self.closure,
        ))));

        for (param, argument) in self.decl.params.iter().zip(arguments) {
            environment.borrow_mut().define(&param.lexeme, argument);
        }

        let signal: Signal = interpreter.execute_block(&self.decl.body, environment)?;

        // An initializer always yields the instance, whatever the body's
        // return statements said.
        if self.is_initializer {
            return Environment::get_at(&self.closure, 0, "this", line);
        }

        match signal {
            Signal::Return(value) => Ok(value),
            Signal::Normal => Ok(Value::Nil),
        }
    }
}

impl fmt::Debug for LoxFunction {
    // Closures can be self-referential through their captured environment;
    // never derive Debug here.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.name())
    }
}

//! Class and instance runtime types.
//!
//! A class is a callable whose invocation constructs an instance and runs
//! the `init` method when one exists.  Method lookup walks the inheritance
//! chain (own class, then superclass, and so on); a found method is bound to
//! the receiving instance before being returned.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::callable::{Callable, LoxFunction};
use crate::error::{LoxError, Result};
use crate::interpreter::Interpreter;
use crate::token::Token;
use crate::value::Value;

pub struct LoxClass {
    pub name: String,
    superclass: Option<Rc<LoxClass>>,
    methods: HashMap<String, Rc<LoxFunction>>,
}

impl LoxClass {
    pub fn new(
        name: String,
        superclass: Option<Rc<LoxClass>>,
        methods: HashMap<String, Rc<LoxFunction>>,
    ) -> Self {
        Self {
            name,
            superclass,
            methods,
        }
    }

    /// Look a method up on this class, then up the inheritance chain.
    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        if let Some(method) = self.methods.get(name) {
            return Some(Rc::clone(method));
        }

        self.superclass
            .as_ref()
            .and_then(|superclass| superclass.find_method(name))
    }
}

/// Class-as-constructor: calling a class builds an instance and, when an
/// `init` method exists, runs it bound to the new instance.
impl Callable for Rc<LoxClass> {
    fn arity(&self) -> usize {
        self.find_method("init").map_or(0, |init| init.arity())
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
        line: usize,
    ) -> Result<Value> {
        debug!("Constructing instance of '{}'", self.name);

        let instance = Value::Instance(Rc::new(RefCell::new(LoxInstance::new(Rc::clone(self)))));

        if let Some(init) = self.find_method("init") {
            init.bind(instance.clone()).call(interpreter, arguments, line)?;
        }

        Ok(instance)
    }
}

impl fmt::Debug for LoxClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class {}>", self.name)
    }
}

/// A mutable bag of fields attached to a class.  Fields are created on
/// first assignment; there is no declared field list.
pub struct LoxInstance {
    class: Rc<LoxClass>,
    fields: HashMap<String, Value>,
}

impl LoxInstance {
    pub fn new(class: Rc<LoxClass>) -> Self {
        Self {
            class,
            fields: HashMap::new(),
        }
    }

    pub fn class(&self) -> &Rc<LoxClass> {
        &self.class
    }

    /// Property read: the instance's own fields win over methods; a found
    /// method is returned bound to `instance`.
    pub fn get(instance: &Rc<RefCell<LoxInstance>>, name: &Token) -> Result<Value> {
        let field: Option<Value> = instance.borrow().fields.get(&name.lexeme).cloned();

        if let Some(value) = field {
            return Ok(value);
        }

        let method: Option<Rc<LoxFunction>> =
            instance.borrow().class.find_method(&name.lexeme);

        if let Some(method) = method {
            let bound = method.bind(Value::Instance(Rc::clone(instance)));

            return Ok(Value::Function(Rc::new(bound)));
        }

        Err(LoxError::runtime(
            name,
            format!("Undefined property '{}'", name.lexeme),
        ))
    }

    /// Property write: always straight into the field map, creating the
    /// field if absent, even when a method of the same name exists.
    pub fn set(&mut self, name: &Token, value: Value) {
        self.fields.insert(name.lexeme.clone(), value);
    }
}

impl fmt::Debug for LoxInstance {
    // Fields may refer back to the instance; never derive Debug here.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} instance", self.class.name)
    }
}

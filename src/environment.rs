//! Chained scope store backing lexical scoping and closures.
//!
//! Environments form a singly-linked chain of reference-counted,
//! interior-mutable cells rooted at one persistent global environment.
//! Closures keep the chain alive: a scope lives exactly as long as any
//! closure or nested scope still references it, and mutations through one
//! alias are visible through all aliases.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{LoxError, Result};
use crate::token::Token;
use crate::value::Value;

/// Shared handle to an environment cell.
pub type EnvRef = Rc<RefCell<Environment>>;

#[derive(Debug)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<EnvRef>,
}

impl Environment {
    /// A root environment with no enclosing scope.
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    /// A child scope of `enclosing`.
    pub fn with_enclosing(enclosing: EnvRef) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Introduce (or overwrite) a binding in *this* scope, shadowing any
    /// same-named binding in an enclosing scope without destroying it.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    /// Dynamic lookup: walk the chain outward until the name is found.
    /// Used for names the resolver left unannotated (globals).
    pub fn get(&self, name: &Token) -> Result<Value> {
        if let Some(value) = self.values.get(&name.lexeme) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            Err(LoxError::runtime(
                name,
                format!("Undefined variable '{}'", name.lexeme),
            ))
        }
    }

    /// Dynamic assignment: walks the chain like [`get`](Self::get).  Fails
    /// rather than implicitly creating a binding; that is reserved for
    /// `var` declarations and field sets.
    pub fn assign(&mut self, name: &Token, value: Value) -> Result<()> {
        if self.values.contains_key(&name.lexeme) {
            self.values.insert(name.lexeme.clone(), value);

            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(LoxError::runtime(
                name,
                format!("Undefined variable '{}'", name.lexeme),
            ))
        }
    }

    /// Hop-addressed lookup: read `name` after walking exactly `distance`
    /// enclosing links.  Must match exactly what the resolver computed for
    /// the same syntactic occurrence.
    pub fn get_at(env: &EnvRef, distance: usize, name: &str, line: usize) -> Result<Value> {
        let target: EnvRef = Environment::ancestor(env, distance);

        let value: Option<Value> = target.borrow().values.get(name).cloned();

        value.ok_or_else(|| LoxError::runtime_at(line, format!("Undefined variable '{name}'")))
    }

    /// Hop-addressed assignment counterpart of [`get_at`](Self::get_at).
    pub fn assign_at(env: &EnvRef, distance: usize, name: &Token, value: Value) -> Result<()> {
        let target: EnvRef = Environment::ancestor(env, distance);
        let mut scope = target.borrow_mut();

        if scope.values.contains_key(&name.lexeme) {
            scope.values.insert(name.lexeme.clone(), value);

            Ok(())
        } else {
            Err(LoxError::runtime(
                name,
                format!("Undefined variable '{}'", name.lexeme),
            ))
        }
    }

    /// Walk `distance` enclosing links.  Stops at the root if the chain is
    /// shorter; the subsequent lookup then reports the missing name.
    fn ancestor(env: &EnvRef, distance: usize) -> EnvRef {
        let mut current: EnvRef = Rc::clone(env);

        for _ in 0..distance {
            let next: Option<EnvRef> = current.borrow().enclosing.as_ref().map(Rc::clone);

            match next {
                Some(enclosing) => current = enclosing,
                None => break,
            }
        }

        current
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

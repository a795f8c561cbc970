//! Variables shared between the host and the interpreter.
//!
//! [`VarCache`] hands out one [`Variable`] per full name (`name` or
//! `name(index)`, namespace qualifiers included).  Registering a name that is
//! already cached returns the same `Rc`.  A handle stays usable until it is
//! released, which also unsets the native variable; releasing twice, or
//! unregistering a name that is not cached, is a [`BridgeError::Variable`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::interp::Interpreter;
use crate::native::ObjRef;
use crate::value::Value;

/// Cache key / display form of a variable.
fn full_name(name: &str, index: Option<&str>) -> String {
    match index {
        Some(i) => format!("{name}({i})"),
        None => name.to_owned(),
    }
}

/// Handle on one native variable or array element.
pub struct Variable {
    interp: Rc<Interpreter>,
    name: String,
    index: Option<String>,
    released: Cell<bool>,
}

impl Variable {
    /// Bind to `name`, creating it as an empty string if it does not exist.
    fn bind(interp: Rc<Interpreter>, name: &str, index: Option<&str>) -> Result<Self> {
        if !interp.var_exists(name, index) {
            interp.set_var(name, index, &Value::Empty)?;
        }
        Ok(Self {
            interp,
            name: name.to_owned(),
            index: index.map(str::to_owned),
            released: Cell::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// `name` or `name(index)`, as scripts refer to it.
    pub fn full_name(&self) -> String {
        full_name(&self.name, self.index())
    }

    pub fn is_released(&self) -> bool {
        self.released.get()
    }

    fn check_live(&self) -> Result<()> {
        if self.is_released() {
            return Err(BridgeError::variable(self.full_name(), "handle has been released"));
        }
        Ok(())
    }

    fn fetch(&self) -> Result<ObjRef> {
        self.check_live()?;
        self.interp.get_var(&self.name, self.index())
    }

    pub fn as_string(&self) -> Result<String> {
        let obj = self.fetch()?;
        Ok(self.interp.get_string(obj))
    }

    /// The empty string reads as `false`.
    pub fn as_bool(&self) -> Result<bool> {
        let obj = self.fetch()?;
        if self.interp.get_string(obj).is_empty() {
            return Ok(false);
        }
        self.interp.get_bool(obj)
    }

    pub fn as_int(&self) -> Result<i64> {
        let obj = self.fetch()?;
        self.interp.get_int(obj)
    }

    pub fn as_float(&self) -> Result<f64> {
        let obj = self.fetch()?;
        self.interp.get_float(obj)
    }

    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        self.check_live()?;
        self.interp.set_var(&self.name, self.index(), &value.into())?;
        Ok(())
    }

    /// Unset the native variable and retire the handle.
    pub fn release(&self) -> Result<()> {
        if self.released.replace(true) {
            return Err(BridgeError::variable(self.full_name(), "already released"));
        }
        if self.interp.var_exists(&self.name, self.index()) {
            self.interp.unset_var(&self.name, self.index())?;
        }
        debug!(name = %self.full_name(), "variable released");
        Ok(())
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("released", &self.released.get())
            .finish()
    }
}

// ── Cache ─────────────────────────────────────────────────────────────────────

/// One handle per registered variable.
pub struct VarCache {
    interp: Rc<Interpreter>,
    vars: RefCell<HashMap<String, Rc<Variable>>>,
}

impl VarCache {
    pub fn new(interp: Rc<Interpreter>) -> Self {
        Self { interp, vars: RefCell::new(HashMap::new()) }
    }

    pub fn register(&self, name: &str) -> Result<Rc<Variable>> {
        self.register_slot(name, None)
    }

    /// Register one element of an array variable.
    pub fn register_element(&self, name: &str, index: &str) -> Result<Rc<Variable>> {
        self.register_slot(name, Some(index))
    }

    fn register_slot(&self, name: &str, index: Option<&str>) -> Result<Rc<Variable>> {
        let key = full_name(name, index);
        if let Some(var) = self.vars.borrow().get(&key) {
            return Ok(var.clone());
        }
        let var = Rc::new(Variable::bind(self.interp.clone(), name, index)?);
        self.vars.borrow_mut().insert(key.clone(), var.clone());
        debug!(name = %key, "variable registered");
        Ok(var)
    }

    pub fn unregister(&self, name: &str) -> Result<()> {
        self.unregister_slot(name, None)
    }

    pub fn unregister_element(&self, name: &str, index: &str) -> Result<()> {
        self.unregister_slot(name, Some(index))
    }

    fn unregister_slot(&self, name: &str, index: Option<&str>) -> Result<()> {
        let key = full_name(name, index);
        let var = self
            .vars
            .borrow_mut()
            .remove(&key)
            .ok_or_else(|| BridgeError::variable(key.as_str(), "not registered"))?;
        var.release()
    }

    pub fn get(&self, full_name: &str) -> Option<Rc<Variable>> {
        self.vars.borrow().get(full_name).cloned()
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.vars.borrow().contains_key(full_name)
    }

    pub fn len(&self) -> usize {
        self.vars.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.borrow().is_empty()
    }

    /// Release every cached handle.  All of them are attempted; the first
    /// error is returned.
    pub fn release_all(&self) -> Result<()> {
        let drained: Vec<_> = self.vars.borrow_mut().drain().collect();
        let mut first = None;
        for (_, var) in drained {
            if let Err(e) = var.release() {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::mini::MiniTcl;

    fn setup() -> (Rc<Interpreter>, VarCache) {
        let interp = Rc::new(Interpreter::create(Rc::new(MiniTcl::new())).unwrap());
        interp.init().unwrap();
        let cache = VarCache::new(interp.clone());
        (interp, cache)
    }

    #[test]
    fn register_twice_returns_same_handle() {
        let (interp, cache) = setup();
        let a = cache.register("v").unwrap();
        let b = cache.register("v").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        interp.delete().unwrap();
    }

    #[test]
    fn unregister_twice_fails_second_time() {
        let (interp, cache) = setup();
        cache.register("v").unwrap();
        cache.unregister("v").unwrap();
        match cache.unregister("v").unwrap_err() {
            BridgeError::Variable { name, reason } => {
                assert_eq!(name, "v");
                assert_eq!(reason, "not registered");
            }
            other => panic!("unexpected: {other:?}"),
        }
        interp.delete().unwrap();
    }

    #[test]
    fn unregister_without_register_fails() {
        let (interp, cache) = setup();
        assert!(matches!(cache.unregister("never"), Err(BridgeError::Variable { .. })));
        interp.delete().unwrap();
    }

    #[test]
    fn binding_creates_missing_variable_and_keeps_existing() {
        let (interp, cache) = setup();
        interp.eval("set kept hello").unwrap();
        let kept = cache.register("kept").unwrap();
        assert_eq!(kept.as_string().unwrap(), "hello");
        let fresh = cache.register("fresh").unwrap();
        assert_eq!(fresh.as_string().unwrap(), "");
        assert!(!fresh.as_bool().unwrap());
        interp.delete().unwrap();
    }

    #[test]
    fn set_is_visible_to_scripts_and_back() {
        let (interp, cache) = setup();
        let v = cache.register("count").unwrap();
        v.set(41).unwrap();
        assert_eq!(interp.eval("incr count").unwrap(), "42");
        assert_eq!(v.as_int().unwrap(), 42);
        v.set(true).unwrap();
        assert!(v.as_bool().unwrap());
        v.set(0.5).unwrap();
        assert_eq!(v.as_float().unwrap(), 0.5);
        assert!(v.set(vec!["a", "b"]).unwrap_err().is_conversion());
        interp.delete().unwrap();
    }

    #[test]
    fn element_form_is_distinct() {
        let (interp, cache) = setup();
        let whole = cache.register("arr_name").unwrap();
        let slot = cache.register_element("arr", "first").unwrap();
        assert!(!Rc::ptr_eq(&whole, &slot));
        assert_eq!(slot.to_string(), "arr(first)");
        slot.set("array value").unwrap();
        assert_eq!(interp.eval("set arr(first)").unwrap(), "array value");
        assert!(Rc::ptr_eq(&slot, &cache.register_element("arr", "first").unwrap()));
        cache.unregister_element("arr", "first").unwrap();
        assert!(cache.unregister_element("arr", "first").is_err());
        interp.delete().unwrap();
    }

    #[test]
    fn namespace_qualified_names_are_separate_keys() {
        let (interp, cache) = setup();
        let q = cache.register("::g").unwrap();
        let u = cache.register("g").unwrap();
        assert!(!Rc::ptr_eq(&q, &u));
        q.set("in the global").unwrap();
        assert_eq!(u.as_string().unwrap(), "in the global");
        interp.delete().unwrap();
    }

    #[test]
    fn released_handle_rejects_use() {
        let (interp, cache) = setup();
        let v = cache.register("gone").unwrap();
        cache.unregister("gone").unwrap();
        assert!(v.is_released());
        assert!(!interp.var_exists("gone", None));
        assert!(matches!(v.as_string(), Err(BridgeError::Variable { .. })));
        assert!(matches!(v.release(), Err(BridgeError::Variable { reason: "already released", .. })));
        interp.delete().unwrap();
    }

    #[test]
    fn release_all_empties_cache() {
        let (interp, cache) = setup();
        let a = cache.register("a").unwrap();
        cache.register_element("b", "1").unwrap();
        cache.release_all().unwrap();
        assert!(cache.is_empty());
        assert!(a.is_released());
        interp.delete().unwrap();
    }
}

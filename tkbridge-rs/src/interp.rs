//! Interpreter session: the one owner of a native interpreter handle.
//!
//! The handle is created in [`Interpreter::create`] and released exactly once
//! by [`Interpreter::delete`].  Every operation checks for the handle first,
//! so evaluating against a deleted interpreter is an error instead of a
//! dangling native call.
//!
//! Only one live session may exist per thread; the native library is not
//! thread-safe and keeps per-thread state of its own.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::codec::{self, FromNative};
use crate::error::{BridgeError, Result};
use crate::native::{CommandFn, InterpPtr, NativeApi, ObjRef, TCL_ALL_EVENTS, TCL_DONT_WAIT, TCL_OK};
use crate::value::Value;

thread_local! {
    static LIVE_SESSION: Cell<bool> = const { Cell::new(false) };
}

pub struct Interpreter {
    api: Rc<dyn NativeApi>,
    handle: Cell<Option<InterpPtr>>,
}

impl Interpreter {
    /// Create the native interpreter.  Fails if this thread already has a
    /// live session or the native library refuses.
    pub fn create(api: Rc<dyn NativeApi>) -> Result<Self> {
        if LIVE_SESSION.with(|live| live.replace(true)) {
            return Err(BridgeError::interp(
                "create interpreter",
                "another interpreter session is live on this thread",
            ));
        }
        match api.create_interp() {
            Some(handle) => {
                debug!(backend = api.name(), "interpreter created");
                Ok(Self { api, handle: Cell::new(Some(handle)) })
            }
            None => {
                LIVE_SESSION.with(|live| live.set(false));
                Err(BridgeError::interp("create interpreter", "native library returned no handle"))
            }
        }
    }

    /// Run the library's own initialisation.
    pub fn init(&self) -> Result<()> {
        let handle = self.handle()?;
        if self.api.init_interp(handle) != TCL_OK {
            return Err(BridgeError::interp("init interpreter", self.result_message(handle)));
        }
        Ok(())
    }

    /// Initialise the windowing toolkit.
    pub fn init_toolkit(&self) -> Result<()> {
        let handle = self.handle()?;
        if self.api.init_toolkit(handle) != TCL_OK {
            return Err(BridgeError::interp("init toolkit", self.result_message(handle)));
        }
        Ok(())
    }

    /// Release the native handle.  A second call is an error.
    pub fn delete(&self) -> Result<()> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| BridgeError::interp("delete interpreter", "already deleted"))?;
        self.api.delete_interp(handle);
        LIVE_SESSION.with(|live| live.set(false));
        debug!("interpreter deleted");
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.handle.get().is_none()
    }

    pub fn api(&self) -> &dyn NativeApi {
        self.api.as_ref()
    }

    fn handle(&self) -> Result<InterpPtr> {
        self.handle
            .get()
            .ok_or_else(|| BridgeError::interp("use interpreter", "interpreter has been deleted"))
    }

    fn result_message(&self, handle: InterpPtr) -> String {
        self.api.get_string(self.api.obj_result(handle))
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    /// Evaluate a fully composed script and return its string result.
    pub fn eval(&self, script: &str) -> Result<String> {
        let handle = self.handle()?;
        debug!(script, "eval");
        let status = self.api.eval(handle, script);
        let result = self.result_message(handle);
        if status != TCL_OK {
            return Err(BridgeError::Eval { script: script.to_owned(), message: result });
        }
        Ok(result)
    }

    /// Result of the last evaluation as a string.
    pub fn string_result(&self) -> Result<String> {
        Ok(self.result_message(self.handle()?))
    }

    /// Result of the last evaluation read as a flat list of strings.
    pub fn list_result(&self) -> Result<Vec<String>> {
        let handle = self.handle()?;
        let obj = self.api.obj_result(handle);
        let len = self.api.list_length(handle, obj).ok_or_else(|| BridgeError::Conversion {
            kind: "list",
            source_repr: self.api.get_string(obj),
        })?;
        (0..len)
            .map(|i| {
                self.api
                    .list_index(handle, obj, i)
                    .map(|elem| self.api.get_string(elem))
                    .ok_or_else(|| BridgeError::Conversion {
                        kind: "list element",
                        source_repr: self.api.get_string(obj),
                    })
            })
            .collect()
    }

    pub fn obj_result(&self) -> Result<ObjRef> {
        Ok(self.api.obj_result(self.handle()?))
    }

    // ── Typed extraction ──────────────────────────────────────────────────────

    pub fn get<T: FromNative>(&self, obj: ObjRef) -> Result<T> {
        codec::decode(self.api.as_ref(), self.handle()?, obj)
    }

    pub fn get_int(&self, obj: ObjRef) -> Result<i64> {
        self.get(obj)
    }

    pub fn get_bool(&self, obj: ObjRef) -> Result<bool> {
        self.get(obj)
    }

    pub fn get_float(&self, obj: ObjRef) -> Result<f64> {
        self.get(obj)
    }

    pub fn get_string(&self, obj: ObjRef) -> String {
        self.api.get_string(obj)
    }

    pub fn to_obj(&self, value: &Value) -> Result<ObjRef> {
        codec::encode(self.api.as_ref(), value)
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    pub fn create_command(&self, name: &str, proc_: CommandFn) -> Result<()> {
        let handle = self.handle()?;
        if !self.api.create_command(handle, name, proc_) {
            return Err(BridgeError::interp("create command", self.result_message(handle)));
        }
        debug!(name, "command created");
        Ok(())
    }

    pub fn delete_command(&self, name: &str) -> Result<()> {
        let handle = self.handle()?;
        if self.api.delete_command(handle, name) != TCL_OK {
            return Err(BridgeError::interp("delete command", format!("no command named \"{name}\"")));
        }
        debug!(name, "command deleted");
        Ok(())
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    pub fn get_var(&self, name: &str, index: Option<&str>) -> Result<ObjRef> {
        let handle = self.handle()?;
        self.api
            .get_var(handle, name, index)
            .ok_or_else(|| BridgeError::interp("get variable", self.result_message(handle)))
    }

    pub fn set_var(&self, name: &str, index: Option<&str>, value: &Value) -> Result<ObjRef> {
        let handle = self.handle()?;
        let obj = self.to_obj(value)?;
        self.api
            .set_var(handle, name, index, obj)
            .ok_or_else(|| BridgeError::interp("set variable", self.result_message(handle)))
    }

    pub fn unset_var(&self, name: &str, index: Option<&str>) -> Result<()> {
        let handle = self.handle()?;
        if self.api.unset_var(handle, name, index) != TCL_OK {
            return Err(BridgeError::interp("unset variable", self.result_message(handle)));
        }
        Ok(())
    }

    pub fn var_exists(&self, name: &str, index: Option<&str>) -> bool {
        match self.handle() {
            Ok(handle) => self.api.get_var(handle, name, index).is_some(),
            Err(_) => false,
        }
    }

    // ── Events ────────────────────────────────────────────────────────────────

    /// Process at most one pending native event without blocking.
    pub fn do_one_event(&self) -> bool {
        !self.is_deleted() && self.api.do_one_event(TCL_ALL_EVENTS | TCL_DONT_WAIT)
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        if !self.is_deleted() {
            warn!("interpreter dropped without explicit delete");
            let _ = self.delete();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::mini::MiniTcl;

    fn session() -> Interpreter {
        let interp = Interpreter::create(Rc::new(MiniTcl::new())).unwrap();
        interp.init().unwrap();
        interp
    }

    #[test]
    fn eval_returns_string_result() {
        let interp = session();
        assert_eq!(interp.eval("set x 5").unwrap(), "5");
        assert_eq!(interp.string_result().unwrap(), "5");
        interp.delete().unwrap();
    }

    #[test]
    fn eval_error_carries_script_and_message() {
        let interp = session();
        match interp.eval("nosuch 1 2").unwrap_err() {
            BridgeError::Eval { script, message } => {
                assert_eq!(script, "nosuch 1 2");
                assert_eq!(message, "invalid command name \"nosuch\"");
            }
            other => panic!("unexpected: {other:?}"),
        }
        interp.delete().unwrap();
    }

    #[test]
    fn list_result_is_flat() {
        let interp = session();
        interp.eval("list a {b c} {}").unwrap();
        assert_eq!(interp.list_result().unwrap(), vec!["a", "b c", ""]);
        interp.eval("list").unwrap();
        assert!(interp.list_result().unwrap().is_empty());
        interp.eval("set bad \"a {b\"").unwrap();
        assert!(interp.list_result().unwrap_err().is_conversion());
        interp.delete().unwrap();
    }

    #[test]
    fn typed_getters() {
        let interp = session();
        interp.eval("set n 42").unwrap();
        let obj = interp.obj_result().unwrap();
        assert_eq!(interp.get_int(obj).unwrap(), 42);
        assert_eq!(interp.get_float(obj).unwrap(), 42.0);
        assert!(interp.get_bool(obj).unwrap());
        interp.eval("set s hello").unwrap();
        let obj = interp.obj_result().unwrap();
        let err = interp.get_int(obj).unwrap_err();
        assert!(err.is_conversion());
        assert_eq!(err.to_string(), "expected integer but got \"hello\"");
        interp.delete().unwrap();
    }

    #[test]
    fn variables_round_trip() {
        let interp = session();
        interp.set_var("v", None, &Value::Int(3)).unwrap();
        assert!(interp.var_exists("v", None));
        let obj = interp.get_var("v", None).unwrap();
        assert_eq!(interp.get_int(obj).unwrap(), 3);
        interp.unset_var("v", None).unwrap();
        assert!(!interp.var_exists("v", None));
        assert!(interp.unset_var("v", None).is_err());
        assert!(interp.set_var("v", None, &Value::from(vec![1i64])).unwrap_err().is_conversion());
        interp.delete().unwrap();
    }

    #[test]
    fn delete_is_exactly_once() {
        let interp = session();
        interp.delete().unwrap();
        assert!(interp.is_deleted());
        assert!(interp.delete().is_err());
        assert!(matches!(interp.eval("set x 1"), Err(BridgeError::Interpreter { .. })));
        assert!(!interp.do_one_event());
    }

    #[test]
    fn one_live_session_per_thread() {
        let first = session();
        let second = Interpreter::create(Rc::new(MiniTcl::new()));
        assert!(matches!(second, Err(BridgeError::Interpreter { .. })));
        first.delete().unwrap();
        let third = Interpreter::create(Rc::new(MiniTcl::new())).unwrap();
        third.delete().unwrap();
    }

    #[test]
    fn drop_without_delete_releases_slot() {
        drop(session());
        let again = session();
        again.delete().unwrap();
    }

    #[test]
    fn commands_can_be_created_and_deleted() {
        let interp = session();
        let proc_: CommandFn = Rc::new(|args: &[String]| Ok(args.join("+")));
        interp.create_command("join", proc_).unwrap();
        assert_eq!(interp.eval("join a b").unwrap(), "a+b");
        interp.delete_command("join").unwrap();
        assert!(interp.delete_command("join").is_err());
        interp.delete().unwrap();
    }
}

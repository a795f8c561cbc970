//! Callback registry and the single native dispatch command.
//!
//! One native command, [`HANDLER_NAME`], is installed at session start.
//! Scripts call it as `tkbridge_handler <token> ?arg ...?`; the registry looks
//! the token up and calls the host closure with the owner and the remaining
//! words.
//!
//! The table is only borrowed long enough to clone the matching entry, so a
//! callback may evaluate scripts that dispatch again, or register and
//! unregister tokens (its own included), while it runs.
//!
//! Owners are held weakly.  An owner that goes away without unregistering
//! makes its tokens fail to dispatch instead of keeping it alive.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::{debug, error};

use crate::error::{BridgeError, Result};
use crate::interp::Interpreter;
use crate::native::CommandFn;
use crate::quote::compose;
use crate::value::Value;
use crate::widget::Widget;

/// Name of the fan-out command.
pub const HANDLER_NAME: &str = "tkbridge_handler";

/// Host closure invoked with the owner and the words following the token.
pub type Callback = Rc<dyn Fn(&dyn Widget, &[String]) -> Result<String>>;

struct Entry {
    owner: Weak<dyn Widget>,
    callback: Callback,
}

#[derive(Default)]
pub struct CallbackRegistry {
    entries: RefCell<HashMap<String, Rc<Entry>>>,
}

impl CallbackRegistry {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Install the fan-out command in `interp`.
    ///
    /// The command holds the registry weakly; once the registry is gone it
    /// answers with an error.
    pub fn install(self: &Rc<Self>, interp: &Interpreter) -> Result<()> {
        let registry = Rc::downgrade(self);
        let proc_: CommandFn = Rc::new(move |args: &[String]| {
            let registry = registry.upgrade().ok_or("callback registry has been dropped")?;
            let Some((token, rest)) = args.split_first() else {
                return Err(format!("wrong # args: should be \"{HANDLER_NAME} token ?arg ...?\""));
            };
            registry.dispatch(token, rest).map_err(|e| {
                error!(token = %token, error = %e, "callback failed");
                e.to_string()
            })
        });
        interp.create_command(HANDLER_NAME, proc_)
    }

    /// Remove the fan-out command.
    pub fn uninstall(&self, interp: &Interpreter) -> Result<()> {
        interp.delete_command(HANDLER_NAME)
    }

    /// Token for a callback owned by the widget at `path`.
    pub fn token_for(path: &str, discriminator: Option<&str>) -> String {
        match discriminator {
            Some(d) if !d.is_empty() => format!("{path}-{d}"),
            _ => path.to_owned(),
        }
    }

    /// Store `callback` under `token` and return the script fragment that
    /// invokes it, `tkbridge_handler <token> <extra_args...>`.
    pub fn register<W, F>(
        &self,
        token: &str,
        owner: &Rc<W>,
        callback: F,
        extra_args: &[Value],
    ) -> String
    where
        W: Widget + 'static,
        F: Fn(&dyn Widget, &[String]) -> Result<String> + 'static,
    {
        self.insert(token, owner, Rc::new(callback));
        let mut words = vec![Value::from(HANDLER_NAME), Value::from(token)];
        words.extend_from_slice(extra_args);
        compose(&words)
    }

    /// Store a callback without building a fragment.  Replaces any entry
    /// already registered under `token`.
    pub fn insert<W: Widget + 'static>(&self, token: &str, owner: &Rc<W>, callback: Callback) {
        let owner: Weak<W> = Rc::downgrade(owner);
        let owner: Weak<dyn Widget> = owner;
        let entry = Rc::new(Entry { owner, callback });
        let replaced = self.entries.borrow_mut().insert(token.to_owned(), entry);
        debug!(token, replaced = replaced.is_some(), "callback registered");
    }

    /// Remove `token`.  Absent tokens are ignored; returns whether one was
    /// removed.
    pub fn unregister(&self, token: &str) -> bool {
        // The entry is dropped after the borrow ends; its closure may own
        // values whose drop touches the registry.
        let removed = self.entries.borrow_mut().remove(token);
        let found = removed.is_some();
        drop(removed);
        if found {
            debug!(token, "callback unregistered");
        }
        found
    }

    /// Invoke the callback registered under `token`.
    pub fn dispatch(&self, token: &str, args: &[String]) -> Result<String> {
        let entry = self
            .entries
            .borrow()
            .get(token)
            .cloned()
            .ok_or_else(|| BridgeError::dispatch(token, "no callback registered"))?;
        let owner = entry
            .owner
            .upgrade()
            .ok_or_else(|| BridgeError::dispatch(token, "owner has been dropped"))?;
        debug!(token, ?args, "dispatch");
        (entry.callback)(owner.as_ref(), args)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.entries.borrow().contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Forget every entry.
    pub fn clear(&self) {
        let drained: Vec<_> = self.entries.borrow_mut().drain().collect();
        debug!(count = drained.len(), "callback registry cleared");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

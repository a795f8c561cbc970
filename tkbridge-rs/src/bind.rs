//! Event bindings on top of the callback registry.
//!
//! Binding `(tag, event)` creates a native command named
//! `tkbridge_bind_<tag with '.' → '_'>_<event>` that forwards to the callback
//! registry under the same name, then installs
//! `bind <tag> <event> {<command> <placeholders>}`.
//!
//! | Tag        | Placeholders                                  | Callback args           |
//! |------------|-----------------------------------------------|-------------------------|
//! | `.`        | `%x %y %w %h`                                 | x, y, width, height     |
//! | any other  | `"[%W canvasx %x]" "[%W canvasy %y]"`         | x, y in content space   |
//!
//! Bindings are keyed by tag and bare event, so `Configure` and
//! `<Configure>` name the same binding; binding it again replaces it.  Every
//! binding owns a distinct command, even when two paths flatten to the same
//! name.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, error};

use crate::dispatch::CallbackRegistry;
use crate::error::Result;
use crate::interp::Interpreter;
use crate::native::CommandFn;
use crate::quote::{compose, quote_string};
use crate::value::Value;
use crate::widget::Widget;

/// Prefix of generated binding commands.
pub const COMMAND_PREFIX: &str = "tkbridge_bind";

const ROOT_PLACEHOLDERS: &str = "%x %y %w %h";
const POINTER_PLACEHOLDERS: &str = "\"[%W canvasx %x]\" \"[%W canvasy %y]\"";

/// Wrap `event` in `<` `>` unless it already is.
pub fn normalize_event(event: &str) -> String {
    if event.starts_with('<') && event.ends_with('>') {
        event.to_owned()
    } else {
        format!("<{event}>")
    }
}

/// `<Configure>` → `Configure`; virtual events keep their inner brackets.
fn bare_event(event: &str) -> &str {
    event
        .strip_prefix('<')
        .and_then(|e| e.strip_suffix('>'))
        .unwrap_or(event)
}

/// Name of the native command generated for `(tag, event)`.
pub fn command_name(tag: &str, event: &str) -> String {
    let event: String = bare_event(event)
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{COMMAND_PREFIX}_{}_{event}", tag.replace('.', "_"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingEntry {
    pub tag: String,
    pub event: String,
    pub command: String,
}

pub struct Bindings {
    interp: Rc<Interpreter>,
    registry: Rc<CallbackRegistry>,
    entries: RefCell<HashMap<(String, String), BindingEntry>>,
}

impl Bindings {
    pub fn new(interp: Rc<Interpreter>, registry: Rc<CallbackRegistry>) -> Self {
        Self { interp, registry, entries: RefCell::new(HashMap::new()) }
    }

    /// Bind `event` on `owner` to `callback`; returns the generated command
    /// name.
    pub fn bind_widget<W, F>(&self, owner: &Rc<W>, event: &str, callback: F) -> Result<String>
    where
        W: Widget + 'static,
        F: Fn(&dyn Widget, &[String]) -> Result<String> + 'static,
    {
        let tag = owner.path().to_owned();
        let event = normalize_event(event);
        let key = (tag.clone(), bare_event(&event).to_owned());
        let command = self.command_for(&key, &event);

        self.registry.insert(&command, owner, Rc::new(callback));
        if let Err(e) = self.install(&tag, &event, &command) {
            self.registry.unregister(&command);
            let _ = self.interp.delete_command(&command);
            // A previous binding of `key` shared this command and is gone too.
            self.entries.borrow_mut().remove(&key);
            return Err(e);
        }

        let entry = BindingEntry { tag, event, command: command.clone() };
        debug!(tag = %entry.tag, event = %entry.event, command = %entry.command, "bound");
        self.entries.borrow_mut().insert(key, entry);
        Ok(command)
    }

    /// The command already bound to `key`, or a fresh name no other binding
    /// uses.  Distinct paths such as `.a_b` and `.a.b` share a base name; the
    /// later one gets a numeric suffix.
    fn command_for(&self, key: &(String, String), event: &str) -> String {
        let entries = self.entries.borrow();
        if let Some(entry) = entries.get(key) {
            return entry.command.clone();
        }
        let base = command_name(&key.0, event);
        let taken = |name: &str| entries.values().any(|e| e.command == name);
        let mut command = base.clone();
        let mut n = 1;
        while taken(&command) {
            command = format!("{base}_{n}");
            n += 1;
        }
        command
    }

    fn install(&self, tag: &str, event: &str, command: &str) -> Result<()> {
        let registry = Rc::downgrade(&self.registry);
        let token = command.to_owned();
        let proc_: CommandFn = Rc::new(move |args: &[String]| {
            let registry = registry.upgrade().ok_or("callback registry has been dropped")?;
            registry.dispatch(&token, args).map_err(|e| {
                error!(command = %token, error = %e, "binding callback failed");
                e.to_string()
            })
        });
        self.interp.create_command(command, proc_)?;

        let placeholders = if tag == "." { ROOT_PLACEHOLDERS } else { POINTER_PLACEHOLDERS };
        let script = compose(&[
            Value::from("bind"),
            Value::from(tag),
            Value::from(event),
            Value::from(quote_string(&format!("{command} {placeholders}"))),
        ]);
        self.interp.eval(&script)?;
        Ok(())
    }

    /// Remove the binding of `event` on `owner`.  Returns `false` when there
    /// was none.
    pub fn unbind_widget(&self, owner: &dyn Widget, event: &str) -> Result<bool> {
        let event = normalize_event(event);
        let key = (owner.path().to_owned(), bare_event(&event).to_owned());
        let Some(entry) = self.entries.borrow_mut().remove(&key) else {
            return Ok(false);
        };
        let reset = compose(&[
            Value::from("bind"),
            Value::from(entry.tag.as_str()),
            Value::from(entry.event.as_str()),
            Value::Empty,
        ]);
        // The widget may already be destroyed, taking its bindings with it.
        if let Err(e) = self.interp.eval(&reset) {
            debug!(tag = %entry.tag, error = %e, "binding reset skipped");
        }
        let deleted = self.interp.delete_command(&entry.command);
        self.registry.unregister(&entry.command);
        debug!(tag = %entry.tag, event = %entry.event, "unbound");
        deleted?;
        Ok(true)
    }

    pub fn is_bound(&self, tag: &str, event: &str) -> bool {
        let event = normalize_event(event);
        self.entries.borrow().contains_key(&(tag.to_owned(), bare_event(&event).to_owned()))
    }

    pub fn entry(&self, tag: &str, event: &str) -> Option<BindingEntry> {
        let event = normalize_event(event);
        self.entries.borrow().get(&(tag.to_owned(), bare_event(&event).to_owned())).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Delete the command of every remaining binding.  All are attempted;
    /// the first error is returned.
    pub fn dispose(&self) -> Result<()> {
        let drained: Vec<_> = self.entries.borrow_mut().drain().map(|(_, e)| e).collect();
        let mut first = None;
        for entry in drained {
            self.registry.unregister(&entry.command);
            if let Err(e) = self.interp.delete_command(&entry.command) {
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
    use crate::error::BridgeError;
    use crate::native::mini::MiniTcl;
    use crate::widget::Tag;

    struct Fixture {
        interp: Rc<Interpreter>,
        registry: Rc<CallbackRegistry>,
        bindings: Bindings,
    }

    impl Fixture {
        fn new() -> Self {
            let interp = Rc::new(Interpreter::create(Rc::new(MiniTcl::new())).unwrap());
            interp.init().unwrap();
            interp.init_toolkit().unwrap();
            let registry = CallbackRegistry::new();
            registry.install(&interp).unwrap();
            let bindings = Bindings::new(interp.clone(), registry.clone());
            Self { interp, registry, bindings }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = self.interp.delete();
        }
    }

    fn recorder() -> (Rc<RefCell<Vec<Vec<String>>>>, impl Fn(&dyn Widget, &[String]) -> Result<String>)
    {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        (calls, move |_: &dyn Widget, args: &[String]| {
            sink.borrow_mut().push(args.to_vec());
            Ok(String::new())
        })
    }

    #[test]
    fn event_names() {
        assert_eq!(normalize_event("Configure"), "<Configure>");
        assert_eq!(normalize_event("<Configure>"), "<Configure>");
        assert_eq!(normalize_event("<<Custom>>"), "<<Custom>>");
        assert_eq!(command_name(".", "<Configure>"), "tkbridge_bind___Configure");
        assert_eq!(command_name(".w0.c", "<ButtonPress>"), "tkbridge_bind__w0_c_ButtonPress");
        assert_eq!(command_name(".w0", "<Button-1>"), "tkbridge_bind__w0_Button-1");
    }

    #[test]
    fn root_binding_uses_geometry_placeholders() {
        let fx = Fixture::new();
        let (calls, cb) = recorder();
        let root = Rc::new(Tag::root());
        fx.bindings.bind_widget(&root, "Configure", cb).unwrap();
        assert_eq!(
            fx.interp.eval("bind . <Configure>").unwrap(),
            "tkbridge_bind___Configure %x %y %w %h"
        );
        fx.interp
            .eval("event generate . <Configure> -x 1 -y 2 -width 300 -height 200")
            .unwrap();
        assert_eq!(calls.borrow().as_slice(), [vec!["1", "2", "300", "200"]]);
    }

    #[test]
    fn widget_binding_uses_pointer_placeholders() {
        let fx = Fixture::new();
        fx.interp.eval("canvas .c").unwrap();
        let (calls, cb) = recorder();
        let canvas = Rc::new(Tag::new(".c"));
        fx.bindings.bind_widget(&canvas, "<ButtonPress>", cb).unwrap();
        let script = fx.interp.eval("bind .c <ButtonPress>").unwrap();
        assert!(script.contains("canvasx %x") && script.contains("canvasy %y"));
        assert!(!script.contains("%w"));
        fx.interp.eval("event generate .c <ButtonPress> -x 3 -y 4").unwrap();
        assert_eq!(calls.borrow().as_slice(), [vec!["3.0", "4.0"]]);
    }

    #[test]
    fn unbind_removes_command_and_binding() {
        let fx = Fixture::new();
        let (calls, cb) = recorder();
        let root = Rc::new(Tag::root());
        let command = fx.bindings.bind_widget(&root, "Configure", cb).unwrap();
        assert!(fx.bindings.is_bound(".", "<Configure>"));
        assert!(fx.bindings.unbind_widget(root.as_ref(), "<Configure>").unwrap());
        assert_eq!(fx.interp.eval("bind . <Configure>").unwrap(), "");
        assert!(fx.interp.eval(&command).is_err());
        assert!(!fx.registry.contains(&command));
        fx.interp.eval("event generate . <Configure>").unwrap();
        assert!(calls.borrow().is_empty());
        assert!(!fx.bindings.unbind_widget(root.as_ref(), "Configure").unwrap());
    }

    #[test]
    fn rebinding_replaces() {
        let fx = Fixture::new();
        let root = Rc::new(Tag::root());
        let (first, cb1) = recorder();
        let (second, cb2) = recorder();
        fx.bindings.bind_widget(&root, "Configure", cb1).unwrap();
        fx.bindings.bind_widget(&root, "<Configure>", cb2).unwrap();
        assert_eq!(fx.bindings.len(), 1);
        fx.interp.eval("event generate . <Configure>").unwrap();
        assert!(first.borrow().is_empty());
        assert_eq!(second.borrow().len(), 1);
    }

    #[test]
    fn failed_bind_rolls_back() {
        let fx = Fixture::new();
        let (_, cb) = recorder();
        let missing = Rc::new(Tag::new(".missing"));
        let err = fx.bindings.bind_widget(&missing, "ButtonPress", cb).unwrap_err();
        assert!(matches!(err, BridgeError::Eval { .. }));
        assert!(fx.bindings.is_empty());
        assert!(!fx.registry.contains(&command_name(".missing", "<ButtonPress>")));
        assert!(fx.interp.eval("tkbridge_bind__missing_ButtonPress").is_err());
    }

    #[test]
    fn flattened_paths_keep_separate_commands() {
        let fx = Fixture::new();
        fx.interp.eval("canvas .a_b").unwrap();
        fx.interp.eval("frame .a").unwrap();
        fx.interp.eval("canvas .a.b").unwrap();
        let (underscore, cb1) = recorder();
        let (nested, cb2) = recorder();
        let flat = Rc::new(Tag::new(".a_b"));
        let deep = Rc::new(Tag::new(".a.b"));
        let c1 = fx.bindings.bind_widget(&flat, "ButtonPress", cb1).unwrap();
        let c2 = fx.bindings.bind_widget(&deep, "ButtonPress", cb2).unwrap();
        assert_eq!(c1, "tkbridge_bind__a_b_ButtonPress");
        assert_ne!(c1, c2);

        fx.interp.eval("event generate .a_b <ButtonPress> -x 1 -y 2").unwrap();
        assert_eq!(underscore.borrow().len(), 1);
        assert!(nested.borrow().is_empty());

        // Rebinding keeps the command the key already owns.
        let (_, cb3) = recorder();
        assert_eq!(fx.bindings.bind_widget(&deep, "<ButtonPress>", cb3).unwrap(), c2);

        assert!(fx.bindings.unbind_widget(deep.as_ref(), "ButtonPress").unwrap());
        fx.interp.eval("event generate .a_b <ButtonPress> -x 1 -y 2").unwrap();
        assert_eq!(underscore.borrow().len(), 2);
        assert!(fx.registry.contains(&c1));
        fx.bindings.dispose().unwrap();
    }

    #[test]
    fn failed_rebind_forgets_the_binding() {
        let fx = Fixture::new();
        fx.interp.eval("canvas .c").unwrap();
        let canvas = Rc::new(Tag::new(".c"));
        let command = fx.bindings.bind_widget(&canvas, "Motion", |_, _| Ok(String::new())).unwrap();
        fx.interp.eval("destroy .c").unwrap();
        assert!(fx.bindings.bind_widget(&canvas, "Motion", |_, _| Ok(String::new())).is_err());
        assert!(!fx.bindings.is_bound(".c", "Motion"));
        assert!(!fx.registry.contains(&command));
        assert!(fx.interp.eval(&command).is_err());
        assert!(!fx.bindings.unbind_widget(canvas.as_ref(), "Motion").unwrap());
    }

    #[test]
    fn unbind_after_destroy_still_detaches() {
        let fx = Fixture::new();
        fx.interp.eval("canvas .c").unwrap();
        let canvas = Rc::new(Tag::new(".c"));
        let command = fx.bindings.bind_widget(&canvas, "Motion", |_, _| Ok(String::new())).unwrap();
        fx.interp.eval("destroy .c").unwrap();
        assert!(fx.bindings.unbind_widget(canvas.as_ref(), "Motion").unwrap());
        assert!(fx.interp.eval(&command).is_err());
        assert!(!fx.registry.contains(&command));
        assert!(fx.bindings.is_empty());
    }

    #[test]
    fn dispose_sweeps_every_command() {
        let fx = Fixture::new();
        fx.interp.eval("canvas .c").unwrap();
        let root = Rc::new(Tag::root());
        let canvas = Rc::new(Tag::new(".c"));
        let a = fx.bindings.bind_widget(&root, "Configure", |_, _| Ok(String::new())).unwrap();
        let b = fx.bindings.bind_widget(&canvas, "Motion", |_, _| Ok(String::new())).unwrap();
        fx.bindings.dispose().unwrap();
        assert!(fx.bindings.is_empty());
        assert!(fx.interp.eval(&a).is_err());
        assert!(fx.interp.eval(&b).is_err());
        assert!(!fx.registry.contains(&a));
    }
}

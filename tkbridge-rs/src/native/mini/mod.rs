//! In-process interpreter for a small Tcl/Tk subset.
//!
//! [`MiniTcl`] implements [`NativeApi`] without any shared library so the
//! whole bridge runs in tests and in the runner binary on machines without
//! Tcl.  It keeps Tcl's observable conventions: every value is a string,
//! failures leave their message in the interpreter result, host commands
//! receive the words after the command name, and `event generate -when tail`
//! queues the bound script until the next [`NativeApi::do_one_event`].
//!
//! Core commands:
//!
//! | Command        | Notes                                      |
//! |----------------|--------------------------------------------|
//! | `set`/`unset`  | scalars and `name(index)` array elements   |
//! | `list` …       | `list llength lindex lappend`              |
//! | `incr`/`append`|                                            |
//! | `puts`         | captured; see [`MiniTcl::take_output`]     |
//! | `error`        |                                            |
//! | `info exists`  |                                            |
//! | `rename`       | host commands only                         |
//! | `update`       | drains the event queue                     |
//! | `package`      | `package require Tcl|Tk|Ttk`               |
//!
//! Toolkit commands (after [`NativeApi::init_toolkit`]): `bind`,
//! `event generate`, `destroy`, `winfo exists`, `tk windowingsystem|scaling`,
//! `wm` on top-level windows, `font`, `image` (photos), `ttk::style theme
//! names|use`, the widget constructors `frame`, `canvas`, `toplevel`,
//! `label`, `button`, `entry`, and per-widget `cget`/`configure`/`canvasx`/
//! `canvasy`.

mod parse;
mod services;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::OnceLock;

use libc::c_int;
use regex::{Captures, Regex};
use tracing::{debug, warn};

use self::parse::{format_element, join_list, parse_script, split_list, Part};
use self::services::{Photo, WmState};
use super::{CommandFn, InterpPtr, NativeApi, ObjRef, Status, TCL_ERROR, TCL_OK};
use crate::value::format_float;

type Outcome = Result<String, String>;

const MAX_NESTING: usize = 1000;
const WIDGET_CLASSES: &[&str] = &["frame", "canvas", "toplevel", "label", "button", "entry"];

#[cfg(target_os = "macos")]
const WINDOWING_SYSTEM: &str = "aqua";
#[cfg(target_os = "windows")]
const WINDOWING_SYSTEM: &str = "win32";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const WINDOWING_SYSTEM: &str = "x11";

#[cfg(target_os = "macos")]
const PLATFORM_THEMES: &[&str] = &["aqua"];
#[cfg(target_os = "windows")]
const PLATFORM_THEMES: &[&str] = &["winnative", "xpnative", "vista"];
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const PLATFORM_THEMES: &[&str] = &[];

const CORE_THEMES: &[&str] = &["clam", "alt", "default", "classic"];

enum Var {
    Scalar(String),
    Array(BTreeMap<String, String>),
}

struct WidgetState {
    class: String,
    options: BTreeMap<String, String>,
    /// Present on top-level windows only.
    wm: Option<WmState>,
}

impl WidgetState {
    fn new(class: &str) -> Self {
        let wm = (class == "toplevel").then(|| WmState::new(String::new()));
        Self { class: class.to_owned(), options: BTreeMap::new(), wm }
    }
}

struct Interp {
    vars: HashMap<String, Var>,
    commands: HashMap<String, CommandFn>,
    result: String,
    initialized: bool,
    toolkit: bool,
    bindings: BTreeMap<(String, String), String>,
    widgets: BTreeMap<String, WidgetState>,
    theme: String,
    scaling: f64,
    images: BTreeMap<String, Photo>,
    next_image: u32,
}

impl Interp {
    fn new() -> Self {
        Self {
            vars: HashMap::new(),
            commands: HashMap::new(),
            result: String::new(),
            initialized: false,
            toolkit: false,
            bindings: BTreeMap::new(),
            widgets: BTreeMap::new(),
            theme: "default".to_owned(),
            scaling: 96.0 / 72.0,
            images: BTreeMap::new(),
            next_image: 0,
        }
    }

    fn read_var(&self, name: &str, index: Option<&str>) -> Outcome {
        let (name, index) = split_var_name(name, index);
        let shown = display_name(&name, index.as_deref());
        match (self.vars.get(&name), index) {
            (None, _) => Err(format!("can't read \"{shown}\": no such variable")),
            (Some(Var::Scalar(v)), None) => Ok(v.clone()),
            (Some(Var::Scalar(_)), Some(_)) => {
                Err(format!("can't read \"{shown}\": variable isn't array"))
            }
            (Some(Var::Array(_)), None) => Err(format!("can't read \"{shown}\": variable is array")),
            (Some(Var::Array(a)), Some(i)) => a
                .get(&i)
                .cloned()
                .ok_or_else(|| format!("can't read \"{shown}\": no such element in array")),
        }
    }

    fn write_var(&mut self, name: &str, index: Option<&str>, value: String) -> Outcome {
        let (name, index) = split_var_name(name, index);
        let shown = display_name(&name, index.as_deref());
        match index {
            None => match self.vars.get_mut(&name) {
                Some(Var::Array(_)) => Err(format!("can't set \"{shown}\": variable is array")),
                Some(Var::Scalar(v)) => {
                    *v = value.clone();
                    Ok(value)
                }
                None => {
                    self.vars.insert(name, Var::Scalar(value.clone()));
                    Ok(value)
                }
            },
            Some(i) => match self.vars.entry(name).or_insert_with(|| Var::Array(BTreeMap::new())) {
                Var::Scalar(_) => Err(format!("can't set \"{shown}\": variable isn't array")),
                Var::Array(a) => {
                    a.insert(i, value.clone());
                    Ok(value)
                }
            },
        }
    }

    fn remove_var(&mut self, name: &str, index: Option<&str>) -> Result<(), String> {
        let (name, index) = split_var_name(name, index);
        let shown = display_name(&name, index.as_deref());
        let missing = || format!("can't unset \"{shown}\": no such variable");
        match index {
            None => self.vars.remove(&name).map(|_| ()).ok_or_else(missing),
            Some(i) => match self.vars.get_mut(&name) {
                Some(Var::Array(a)) => a.remove(&i).map(|_| ()).ok_or_else(|| {
                    format!("can't unset \"{shown}\": no such element in array")
                }),
                Some(Var::Scalar(_)) => {
                    Err(format!("can't unset \"{shown}\": variable isn't array"))
                }
                None => Err(missing()),
            },
        }
    }

    fn var_exists(&self, name: &str) -> bool {
        self.read_var(name, None).is_ok()
            || matches!(self.vars.get(&split_var_name(name, None).0), Some(Var::Array(_)))
    }

    fn widget_exists(&self, path: &str) -> bool {
        self.toolkit && self.widgets.contains_key(path)
    }

    /// Remove `path` and its descendants with their bindings.
    fn destroy_widget(&mut self, path: &str) {
        if path == "." {
            self.widgets.clear();
            self.bindings.clear();
            return;
        }
        let prefix = format!("{path}.");
        self.widgets.retain(|p, _| p != path && !p.starts_with(&prefix));
        self.bindings.retain(|(tag, _), _| tag != path && !tag.starts_with(&prefix));
    }
}

/// `::a(i)` → (`a`, `Some("i")`); an explicit index wins.
fn split_var_name(name: &str, index: Option<&str>) -> (String, Option<String>) {
    let name = name.strip_prefix("::").unwrap_or(name);
    if let Some(i) = index {
        return (name.to_owned(), Some(i.to_owned()));
    }
    match (name.find('('), name.ends_with(')')) {
        (Some(open), true) if open > 0 => {
            (name[..open].to_owned(), Some(name[open + 1..name.len() - 1].to_owned()))
        }
        _ => (name.to_owned(), None),
    }
}

fn display_name(name: &str, index: Option<&str>) -> String {
    match index {
        Some(i) => format!("{name}({i})"),
        None => name.to_owned(),
    }
}

fn command_name(name: &str) -> &str {
    name.strip_prefix("::").unwrap_or(name)
}

fn wrong_args(usage: &str) -> Outcome {
    Err(format!("wrong # args: should be \"{usage}\""))
}

fn parse_int(s: &str) -> Result<i64, String> {
    s.trim().parse().map_err(|_| format!("expected integer but got \"{s}\""))
}

fn parse_double(s: &str) -> Result<f64, String> {
    s.trim().parse().map_err(|_| format!("expected floating-point number but got \"{s}\""))
}

fn parse_bool(s: &str) -> Result<bool, String> {
    let t = s.trim();
    if let Ok(n) = t.parse::<i64>() {
        return Ok(n != 0);
    }
    match t.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Ok(true),
        "false" | "no" | "off" => Ok(false),
        _ => Err(format!("expected boolean value but got \"{s}\"")),
    }
}

fn percent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%([xywhW%])").expect("valid percent pattern"))
}

/// Event fields available to `%` substitution in binding scripts.
struct EventFields<'a> {
    window: &'a str,
    x: &'a str,
    y: &'a str,
    width: &'a str,
    height: &'a str,
}

impl EventFields<'_> {
    fn substitute(&self, script: &str) -> String {
        percent_regex()
            .replace_all(script, |caps: &Captures<'_>| match &caps[1] {
                "x" => self.x.to_owned(),
                "y" => self.y.to_owned(),
                "w" => self.width.to_owned(),
                "h" => self.height.to_owned(),
                "W" => self.window.to_owned(),
                _ => "%".to_owned(),
            })
            .into_owned()
    }
}

struct Pending {
    interp: usize,
    script: String,
}

#[derive(Default)]
struct State {
    objs: Vec<String>,
    interps: HashMap<usize, Interp>,
    next_interp: usize,
    pending: VecDeque<Pending>,
    output: String,
    background_errors: Vec<String>,
}

impl State {
    fn new_obj(&mut self, s: String) -> ObjRef {
        self.objs.push(s);
        ObjRef::from_raw(self.objs.len() - 1)
    }
}

/// The in-process backend.
///
/// Objects are kept in an arena for the lifetime of the backend; they are
/// small strings and the arena is dropped with it.
#[derive(Default)]
pub struct MiniTcl {
    state: RefCell<State>,
    depth: Cell<usize>,
    echo: bool,
}

impl MiniTcl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also print `puts` output on stdout.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Drain everything written with `puts` so far.
    pub fn take_output(&self) -> String {
        std::mem::take(&mut self.state.borrow_mut().output)
    }

    /// Drain errors raised by binding scripts run outside an evaluation.
    pub fn take_background_errors(&self) -> Vec<String> {
        std::mem::take(&mut self.state.borrow_mut().background_errors)
    }

    /// Number of queued events.
    pub fn pending_events(&self) -> usize {
        self.state.borrow().pending.len()
    }

    fn with_interp<R>(&self, id: usize, f: impl FnOnce(&mut Interp) -> R) -> Result<R, String> {
        let mut state = self.state.borrow_mut();
        state.interps.get_mut(&id).map(f).ok_or_else(|| "invalid interpreter".to_owned())
    }

    fn set_result(&self, id: usize, result: String) {
        let _ = self.with_interp(id, |i| i.result = result);
    }

    fn background_error(&self, message: String) {
        warn!(%message, "background error");
        self.state.borrow_mut().background_errors.push(message);
    }

    // ── Evaluation ────────────────────────────────────────────────────────

    fn eval_script(&self, id: usize, script: &str) -> Outcome {
        if self.depth.get() >= MAX_NESTING {
            return Err("too many nested evaluations (infinite loop?)".to_owned());
        }
        self.depth.set(self.depth.get() + 1);
        let outcome = self.eval_commands(id, script);
        self.depth.set(self.depth.get() - 1);
        outcome
    }

    fn eval_commands(&self, id: usize, script: &str) -> Outcome {
        let mut result = String::new();
        for command in parse_script(script)? {
            let words = command
                .iter()
                .map(|w| self.substitute(id, w))
                .collect::<Result<Vec<_>, _>>()?;
            result = self.invoke(id, &words)?;
        }
        Ok(result)
    }

    fn substitute(&self, id: usize, word: &[Part]) -> Outcome {
        let mut out = String::new();
        for part in word {
            match part {
                Part::Lit(s) => out.push_str(s),
                Part::Var { name, index } => {
                    let index = match index {
                        Some(parts) => Some(self.substitute(id, parts)?),
                        None => None,
                    };
                    out.push_str(&self.with_interp(id, |i| i.read_var(name, index.as_deref()))??);
                }
                Part::Cmd(script) => out.push_str(&self.eval_script(id, script)?),
            }
        }
        Ok(out)
    }

    fn invoke(&self, id: usize, words: &[String]) -> Outcome {
        let Some((name, args)) = words.split_first() else { return Ok(String::new()) };
        let name = command_name(name);
        // Clone the closure out so no borrow is held while it runs.
        let host = self.with_interp(id, |i| i.commands.get(name).cloned())?;
        if let Some(proc_) = host {
            return proc_(args);
        }
        self.builtin(id, name, args)
    }

    fn builtin(&self, id: usize, name: &str, args: &[String]) -> Outcome {
        match name {
            "set" => self.cmd_set(id, args),
            "unset" => self.cmd_unset(id, args),
            "list" => Ok(join_list(args)),
            "llength" => match args {
                [list] => Ok(split_list(list)?.len().to_string()),
                _ => wrong_args("llength list"),
            },
            "lindex" => cmd_lindex(args),
            "lappend" => self.cmd_lappend(id, args),
            "incr" => self.cmd_incr(id, args),
            "append" => self.cmd_append(id, args),
            "puts" => self.cmd_puts(args),
            "error" => match args {
                [message, ..] => Err(message.clone()),
                [] => wrong_args("error message ?errorInfo? ?errorCode?"),
            },
            "info" => match args {
                [sub, var] if sub == "exists" => {
                    let exists = self.with_interp(id, |i| i.var_exists(var))?;
                    Ok(if exists { "1" } else { "0" }.to_owned())
                }
                [sub, ..] => Err(format!("unknown or ambiguous subcommand \"{sub}\": must be exists")),
                [] => wrong_args("info subcommand ?arg ...?"),
            },
            "rename" => self.cmd_rename(id, args),
            "update" => {
                while self.do_one_event(0) {}
                Ok(String::new())
            }
            "package" => self.cmd_package(id, args),
            _ => self.toolkit_builtin(id, name, args),
        }
    }

    fn toolkit_builtin(&self, id: usize, name: &str, args: &[String]) -> Outcome {
        let invalid = || Err(format!("invalid command name \"{name}\""));
        if !self.with_interp(id, |i| i.toolkit)? {
            return invalid();
        }
        let is_widget = name.starts_with('.') && self.with_interp(id, |i| i.widget_exists(name))?;
        match name {
            "bind" => self.cmd_bind(id, args),
            "event" => self.cmd_event(id, args),
            "destroy" => {
                self.with_interp(id, |i| {
                    for path in args {
                        i.destroy_widget(path);
                    }
                })?;
                Ok(String::new())
            }
            "winfo" => match args {
                [sub, path] if sub == "exists" => {
                    let exists = self.with_interp(id, |i| i.widget_exists(path))?;
                    Ok(if exists { "1" } else { "0" }.to_owned())
                }
                [sub, ..] => Err(format!("bad option \"{sub}\": must be exists")),
                [] => wrong_args("winfo option ?arg ...?"),
            },
            "tk" => self.cmd_tk(id, args),
            "wm" => self.cmd_wm(id, args),
            "font" => services::font(args, self.with_interp(id, |i| i.scaling)?),
            "image" => self.with_interp(id, |i| services::image(i, args))?,
            "ttk::style" => self.cmd_style(id, args),
            class if WIDGET_CLASSES.contains(&class) => self.create_widget(id, class, args),
            path if is_widget => self.widget_command(id, path, args),
            _ => invalid(),
        }
    }

    // ── Core commands ─────────────────────────────────────────────────────

    fn cmd_set(&self, id: usize, args: &[String]) -> Outcome {
        match args {
            [name] => self.with_interp(id, |i| i.read_var(name, None))?,
            [name, value] => self.with_interp(id, |i| i.write_var(name, None, value.clone()))?,
            _ => wrong_args("set varName ?newValue?"),
        }
    }

    fn cmd_unset(&self, id: usize, args: &[String]) -> Outcome {
        let mut names = args;
        let mut complain = true;
        if names.first().map(String::as_str) == Some("-nocomplain") {
            complain = false;
            names = &names[1..];
        }
        if names.first().map(String::as_str) == Some("--") {
            names = &names[1..];
        }
        for name in names {
            let removed = self.with_interp(id, |i| i.remove_var(name, None))?;
            if let Err(message) = removed {
                if complain {
                    return Err(message);
                }
            }
        }
        Ok(String::new())
    }

    fn cmd_lappend(&self, id: usize, args: &[String]) -> Outcome {
        let Some((name, values)) = args.split_first() else {
            return wrong_args("lappend varName ?value value ...?");
        };
        self.with_interp(id, |i| {
            let mut list = i.read_var(name, None).unwrap_or_default();
            for value in values {
                if !list.is_empty() {
                    list.push(' ');
                }
                list.push_str(&format_element(value));
            }
            i.write_var(name, None, list)
        })?
    }

    fn cmd_incr(&self, id: usize, args: &[String]) -> Outcome {
        let (name, step) = match args {
            [name] => (name, 1),
            [name, step] => (name, parse_int(step)?),
            _ => return wrong_args("incr varName ?increment?"),
        };
        self.with_interp(id, |i| {
            let current = match i.read_var(name, None) {
                Ok(v) => parse_int(&v)?,
                Err(_) => 0,
            };
            i.write_var(name, None, (current + step).to_string())
        })?
    }

    fn cmd_append(&self, id: usize, args: &[String]) -> Outcome {
        let Some((name, values)) = args.split_first() else {
            return wrong_args("append varName ?value value ...?");
        };
        self.with_interp(id, |i| {
            let mut s = i.read_var(name, None).unwrap_or_default();
            values.iter().for_each(|v| s.push_str(v));
            i.write_var(name, None, s)
        })?
    }

    fn cmd_puts(&self, args: &[String]) -> Outcome {
        let (newline, rest) = match args.first().map(String::as_str) {
            Some("-nonewline") => (false, &args[1..]),
            _ => (true, args),
        };
        let text = match rest {
            [text] | [_, text] => text,
            _ => return wrong_args("puts ?-nonewline? ?channelId? string"),
        };
        let line = if newline { format!("{text}\n") } else { text.clone() };
        if self.echo {
            print!("{line}");
        }
        self.state.borrow_mut().output.push_str(&line);
        Ok(String::new())
    }

    fn cmd_rename(&self, id: usize, args: &[String]) -> Outcome {
        let [old, new] = args else { return wrong_args("rename oldName newName") };
        let (old, new) = (command_name(old), command_name(new));
        self.with_interp(id, |i| {
            let Some(proc_) = i.commands.remove(old) else {
                return Err(format!("can't rename \"{old}\": command doesn't exist"));
            };
            if !new.is_empty() {
                i.commands.insert(new.to_owned(), proc_);
            }
            Ok(String::new())
        })?
    }

    fn cmd_package(&self, id: usize, args: &[String]) -> Outcome {
        let [sub, rest @ ..] = args else { return wrong_args("package option ?arg ...?") };
        if sub != "require" {
            return Err(format!("bad option \"{sub}\": must be require"));
        }
        let Some(package) = rest.iter().find(|a| !a.starts_with('-')) else {
            return wrong_args("package require ?-exact? package ?version?");
        };
        let toolkit = self.with_interp(id, |i| i.toolkit)?;
        match package.as_str() {
            "Tcl" => Ok("8.6".to_owned()),
            "Tk" | "Ttk" if toolkit => Ok("8.6".to_owned()),
            _ => Err(format!("can't find package {package}")),
        }
    }

    // ── Toolkit commands ──────────────────────────────────────────────────

    fn cmd_bind(&self, id: usize, args: &[String]) -> Outcome {
        self.with_interp(id, |i| match args {
            [tag, ..] if tag.starts_with('.') && !i.widget_exists(tag) => {
                Err(format!("bad window path name \"{tag}\""))
            }
            [tag] => {
                let events: Vec<&str> = i
                    .bindings
                    .keys()
                    .filter(|(t, _)| t == tag)
                    .map(|(_, e)| e.as_str())
                    .collect();
                Ok(join_list(&events))
            }
            [tag, event] => {
                Ok(i.bindings.get(&(tag.clone(), event.clone())).cloned().unwrap_or_default())
            }
            [tag, event, script] => {
                let key = (tag.clone(), event.clone());
                if script.is_empty() {
                    i.bindings.remove(&key);
                } else if let Some(extra) = script.strip_prefix('+') {
                    let entry = i.bindings.entry(key).or_default();
                    if !entry.is_empty() {
                        entry.push('\n');
                    }
                    entry.push_str(extra);
                } else {
                    i.bindings.insert(key, script.clone());
                }
                Ok(String::new())
            }
            _ => wrong_args("bind window ?pattern? ?command?"),
        })?
    }

    fn cmd_event(&self, id: usize, args: &[String]) -> Outcome {
        let [sub, window, event, options @ ..] = args else {
            return wrong_args("event generate window event ?-option value ...?");
        };
        if sub != "generate" {
            return Err(format!("bad option \"{sub}\": must be generate"));
        }
        if options.len() % 2 != 0 {
            return Err(format!("value for \"{}\" missing", options[options.len() - 1]));
        }
        let mut fields = [("-x", "0"), ("-y", "0"), ("-width", "0"), ("-height", "0")];
        let mut when = "now";
        for pair in options.chunks(2) {
            let (key, value) = (pair[0].as_str(), pair[1].as_str());
            match fields.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None if key == "-when" => when = value,
                None => return Err(format!("bad option \"{key}\"")),
            }
        }
        let script = self.with_interp(id, |i| {
            if !i.widget_exists(window) {
                return Err(format!("bad window path name \"{window}\""));
            }
            Ok(i.bindings.get(&(window.clone(), event.clone())).cloned())
        })??;
        let Some(script) = script else { return Ok(String::new()) };
        let script = EventFields {
            window,
            x: fields[0].1,
            y: fields[1].1,
            width: fields[2].1,
            height: fields[3].1,
        }
        .substitute(&script);

        match when {
            "now" => {
                if let Err(message) = self.eval_script(id, &script) {
                    self.background_error(message);
                }
            }
            "tail" | "mark" => {
                self.state.borrow_mut().pending.push_back(Pending { interp: id, script })
            }
            "head" => self.state.borrow_mut().pending.push_front(Pending { interp: id, script }),
            other => return Err(format!("bad -when value \"{other}\"")),
        }
        Ok(String::new())
    }

    fn cmd_tk(&self, id: usize, args: &[String]) -> Outcome {
        match args {
            [sub] if sub == "windowingsystem" => Ok(WINDOWING_SYSTEM.to_owned()),
            [sub, rest @ ..] if sub == "scaling" => {
                let rest = match rest {
                    [flag, _window, tail @ ..] if flag == "-displayof" => tail,
                    _ => rest,
                };
                match rest {
                    [] => Ok(self.with_interp(id, |i| i.scaling)?.to_string()),
                    [value] => {
                        let scaling = parse_double(value)?;
                        self.with_interp(id, |i| i.scaling = scaling)?;
                        Ok(String::new())
                    }
                    _ => wrong_args("tk scaling ?-displayof window? ?factor?"),
                }
            }
            [sub, ..] => Err(format!("bad option \"{sub}\": must be scaling or windowingsystem")),
            [] => wrong_args("tk subcommand ?arg ...?"),
        }
    }

    fn cmd_wm(&self, id: usize, args: &[String]) -> Outcome {
        let [sub, window, rest @ ..] = args else { return wrong_args("wm option window ?arg ...?") };
        self.with_interp(id, |i| {
            let Some(widget) = i.widgets.get_mut(window.as_str()) else {
                return Err(format!("bad window path name \"{window}\""));
            };
            let Some(wm) = widget.wm.as_mut() else {
                return Err(format!("window \"{window}\" isn't a top-level window"));
            };
            services::wm(wm, sub, rest, &i.images)
        })?
    }

    fn cmd_style(&self, id: usize, args: &[String]) -> Outcome {
        match args {
            [theme, names] if theme == "theme" && names == "names" => {
                let all: Vec<&str> =
                    PLATFORM_THEMES.iter().chain(CORE_THEMES.iter()).copied().collect();
                Ok(join_list(&all))
            }
            [theme, use_] if theme == "theme" && use_ == "use" => {
                self.with_interp(id, |i| i.theme.clone())
            }
            [theme, use_, name] if theme == "theme" && use_ == "use" => {
                if !PLATFORM_THEMES.contains(&name.as_str()) && !CORE_THEMES.contains(&name.as_str())
                {
                    return Err(format!("theme \"{name}\" doesn't exist"));
                }
                self.with_interp(id, |i| i.theme = name.clone())?;
                Ok(String::new())
            }
            _ => wrong_args("ttk::style theme names|use ?theme?"),
        }
    }

    fn create_widget(&self, id: usize, class: &str, args: &[String]) -> Outcome {
        let Some((path, options)) = args.split_first() else {
            return wrong_args(&format!("{class} pathName ?-option value ...?"));
        };
        let parent = match path.rfind('.') {
            Some(0) => ".",
            Some(n) => &path[..n],
            None => return Err(format!("bad window path name \"{path}\"")),
        };
        let mut widget = WidgetState::new(class);
        apply_options(&mut widget.options, options)?;
        self.with_interp(id, |i| {
            if path == "." || !i.widget_exists(parent) {
                return Err(format!("bad window path name \"{path}\""));
            }
            if i.widgets.contains_key(path.as_str()) {
                return Err(format!("window name \"{path}\" already exists"));
            }
            i.widgets.insert(path.clone(), widget);
            Ok(path.clone())
        })?
    }

    fn widget_command(&self, id: usize, path: &str, args: &[String]) -> Outcome {
        let Some((sub, rest)) = args.split_first() else {
            return wrong_args(&format!("{path} option ?arg ...?"));
        };
        self.with_interp(id, |i| {
            let Some(widget) = i.widgets.get_mut(path) else {
                return Err(format!("invalid command name \"{path}\""));
            };
            match (sub.as_str(), rest) {
                ("cget", [option]) => Ok(widget.options.get(option).cloned().unwrap_or_default()),
                ("configure", []) => {
                    let pairs: Vec<&str> = widget
                        .options
                        .iter()
                        .flat_map(|(k, v)| [k.as_str(), v.as_str()])
                        .collect();
                    Ok(join_list(&pairs))
                }
                ("configure", [option]) => {
                    Ok(widget.options.get(option).cloned().unwrap_or_default())
                }
                ("configure", options) => {
                    apply_options(&mut widget.options, options)?;
                    Ok(String::new())
                }
                ("canvasx" | "canvasy", [coord, ..]) if widget.class == "canvas" => {
                    Ok(format_float(parse_double(coord)?))
                }
                (other, _) => Err(format!("bad option \"{other}\"")),
            }
        })?
    }
}

fn apply_options(target: &mut BTreeMap<String, String>, options: &[String]) -> Result<(), String> {
    if options.len() % 2 != 0 {
        return Err(format!("value for \"{}\" missing", options[options.len() - 1]));
    }
    for pair in options.chunks(2) {
        if !pair[0].starts_with('-') {
            return Err(format!("unknown option \"{}\"", pair[0]));
        }
        target.insert(pair[0].clone(), pair[1].clone());
    }
    Ok(())
}

fn cmd_lindex(args: &[String]) -> Outcome {
    let (list, index) = match args {
        [list] => return Ok(list.clone()),
        [list, index] => (list, index),
        _ => return wrong_args("lindex list ?index?"),
    };
    let items = split_list(list)?;
    let last = items.len() as i64 - 1;
    let position = match index.as_str() {
        "end" => last,
        s => match s.strip_prefix("end-") {
            Some(offset) => last - parse_int(offset)?,
            None => parse_int(s)?,
        },
    };
    if position < 0 {
        return Ok(String::new());
    }
    Ok(items.get(position as usize).cloned().unwrap_or_default())
}

// ── NativeApi ─────────────────────────────────────────────────────────────────

impl NativeApi for MiniTcl {
    fn name(&self) -> &str {
        "mini"
    }

    fn create_interp(&self) -> Option<InterpPtr> {
        let mut state = self.state.borrow_mut();
        state.next_interp += 1;
        let id = state.next_interp;
        state.interps.insert(id, Interp::new());
        Some(InterpPtr::from_raw(id))
    }

    fn init_interp(&self, interp: InterpPtr) -> Status {
        match self.with_interp(interp.as_raw(), |i| i.initialized = true) {
            Ok(()) => TCL_OK,
            Err(_) => TCL_ERROR,
        }
    }

    fn init_toolkit(&self, interp: InterpPtr) -> Status {
        let outcome = self.with_interp(interp.as_raw(), |i| {
            if !i.initialized {
                i.result = "Tcl is not initialized".to_owned();
                return false;
            }
            let argv = i.read_var("argv", None).unwrap_or_default();
            let args = split_list(&argv).unwrap_or_default();
            let title = args
                .iter()
                .position(|a| a == "-name")
                .and_then(|n| args.get(n + 1))
                .cloned()
                .unwrap_or_else(|| "mini".to_owned());
            let mut root = WidgetState::new("toplevel");
            root.wm = Some(WmState::new(title));
            i.widgets.insert(".".to_owned(), root);
            i.toolkit = true;
            true
        });
        match outcome {
            Ok(true) => TCL_OK,
            _ => TCL_ERROR,
        }
    }

    fn delete_interp(&self, interp: InterpPtr) {
        let id = interp.as_raw();
        // Host closures are dropped outside the borrow; they may own
        // handles back into this backend.
        let removed = {
            let mut state = self.state.borrow_mut();
            state.pending.retain(|p| p.interp != id);
            state.interps.remove(&id)
        };
        debug!(interp = id, found = removed.is_some(), "mini interpreter deleted");
        drop(removed);
    }

    fn eval(&self, interp: InterpPtr, script: &str) -> Status {
        let id = interp.as_raw();
        match self.eval_script(id, script) {
            Ok(result) => {
                self.set_result(id, result);
                TCL_OK
            }
            Err(message) => {
                self.set_result(id, message);
                TCL_ERROR
            }
        }
    }

    fn obj_result(&self, interp: InterpPtr) -> ObjRef {
        let result = self
            .with_interp(interp.as_raw(), |i| i.result.clone())
            .unwrap_or_else(|e| e);
        self.state.borrow_mut().new_obj(result)
    }

    fn do_one_event(&self, _flags: c_int) -> bool {
        let next = self.state.borrow_mut().pending.pop_front();
        let Some(event) = next else { return false };
        if let Err(message) = self.eval_script(event.interp, &event.script) {
            self.background_error(message);
        }
        true
    }

    fn create_command(&self, interp: InterpPtr, name: &str, proc_: CommandFn) -> bool {
        let name = command_name(name).to_owned();
        // Any command being replaced is dropped after the borrow ends.
        let replaced = self.with_interp(interp.as_raw(), |i| i.commands.insert(name, proc_));
        let created = replaced.is_ok();
        drop(replaced);
        created
    }

    fn delete_command(&self, interp: InterpPtr, name: &str) -> Status {
        let name = command_name(name);
        let removed = self.with_interp(interp.as_raw(), |i| i.commands.remove(name));
        match removed {
            Ok(Some(_)) => TCL_OK,
            _ => -1,
        }
    }

    fn get_var(&self, interp: InterpPtr, name: &str, index: Option<&str>) -> Option<ObjRef> {
        let id = interp.as_raw();
        match self.with_interp(id, |i| i.read_var(name, index)).ok()? {
            Ok(value) => Some(self.state.borrow_mut().new_obj(value)),
            Err(message) => {
                self.set_result(id, message);
                None
            }
        }
    }

    fn set_var(
        &self,
        interp: InterpPtr,
        name: &str,
        index: Option<&str>,
        value: ObjRef,
    ) -> Option<ObjRef> {
        let id = interp.as_raw();
        let value = self.get_string(value);
        match self.with_interp(id, |i| i.write_var(name, index, value)).ok()? {
            Ok(stored) => Some(self.state.borrow_mut().new_obj(stored)),
            Err(message) => {
                self.set_result(id, message);
                None
            }
        }
    }

    fn unset_var(&self, interp: InterpPtr, name: &str, index: Option<&str>) -> Status {
        let id = interp.as_raw();
        match self.with_interp(id, |i| i.remove_var(name, index)) {
            Ok(Ok(())) => TCL_OK,
            Ok(Err(message)) => {
                self.set_result(id, message);
                TCL_ERROR
            }
            Err(_) => TCL_ERROR,
        }
    }

    fn new_string_obj(&self, s: &str) -> ObjRef {
        self.state.borrow_mut().new_obj(s.to_owned())
    }

    fn new_int_obj(&self, n: i64) -> ObjRef {
        self.state.borrow_mut().new_obj(n.to_string())
    }

    fn new_double_obj(&self, x: f64) -> ObjRef {
        self.state.borrow_mut().new_obj(format_float(x))
    }

    fn new_boolean_obj(&self, b: bool) -> ObjRef {
        self.state.borrow_mut().new_obj(if b { "1" } else { "0" }.to_owned())
    }

    fn get_string(&self, obj: ObjRef) -> String {
        self.state.borrow().objs.get(obj.as_raw()).cloned().unwrap_or_default()
    }

    fn get_long(&self, interp: InterpPtr, obj: ObjRef) -> Option<i64> {
        self.convert(interp, obj, parse_int)
    }

    fn get_boolean(&self, interp: InterpPtr, obj: ObjRef) -> Option<bool> {
        self.convert(interp, obj, parse_bool)
    }

    fn get_double(&self, interp: InterpPtr, obj: ObjRef) -> Option<f64> {
        self.convert(interp, obj, parse_double)
    }

    fn list_length(&self, interp: InterpPtr, obj: ObjRef) -> Option<usize> {
        self.convert(interp, obj, |s| split_list(s).map(|items| items.len()))
    }

    fn list_index(&self, interp: InterpPtr, obj: ObjRef, index: usize) -> Option<ObjRef> {
        let item = self.convert(interp, obj, |s| split_list(s).map(|items| items.get(index).cloned()))??;
        Some(self.state.borrow_mut().new_obj(item))
    }
}

impl MiniTcl {
    /// Parse an object's string form; a failure leaves its message as the
    /// interpreter result.
    fn convert<T>(
        &self,
        interp: InterpPtr,
        obj: ObjRef,
        parse: impl FnOnce(&str) -> Result<T, String>,
    ) -> Option<T> {
        match parse(&self.get_string(obj)) {
            Ok(v) => Some(v),
            Err(message) => {
                self.set_result(interp.as_raw(), message);
                None
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

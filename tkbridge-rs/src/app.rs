//! Application context.
//!
//! [`Application`] owns one interpreter session together with everything
//! hanging off it: the callback registry and its dispatch command, the
//! variable cache, widget bindings, timers and the event loop.  Widget code
//! talks to the bridge only through this type.
//!
//! Teardown is explicit.  [`Application::shutdown`] runs every step even when
//! an earlier one fails and reports the first failure:
//!
//! ```text
//!   stop loop → drop timers → sweep bindings → release variables
//!             → clear registry → delete dispatch command → delete interpreter
//! ```

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bind::Bindings;
use crate::config::Settings;
use crate::dispatch::CallbackRegistry;
use crate::error::{BridgeError, Result};
use crate::event_loop::{EventLoop, LoopControl, LoopTick, DEFAULT_IDLE};
use crate::font::FontManager;
use crate::image::ImageFactory;
use crate::interp::Interpreter;
use crate::native::{self, NativeApi};
use crate::options::ToplevelOptions;
use crate::quote::{compose, quote_string};
use crate::theme::ThemeManager;
use crate::timer::{TimerId, TimerQueue};
use crate::value::{format_float, Value};
use crate::var::{VarCache, Variable};
use crate::widget::{Toplevel, Widget};
use crate::wm::WindowManager;

/// Windowing system reported by the toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuiType {
    X11,
    Win32,
    Aqua,
}

impl fmt::Display for GuiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GuiType::X11 => "x11",
            GuiType::Win32 => "win32",
            GuiType::Aqua => "aqua",
        })
    }
}

impl std::str::FromStr for GuiType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x11" => Ok(GuiType::X11),
            "win32" => Ok(GuiType::Win32),
            "aqua" => Ok(GuiType::Aqua),
            other => {
                Err(BridgeError::Conversion { kind: "windowing system", source_repr: other.to_owned() })
            }
        }
    }
}

pub struct Application {
    app_name: String,
    interp: Rc<Interpreter>,
    registry: Rc<CallbackRegistry>,
    vars: VarCache,
    bindings: Bindings,
    timers: Rc<TimerQueue>,
    event_loop: EventLoop,
    themes: Option<ThemeManager>,
    fonts: FontManager,
    images: ImageFactory,
    next_window: Cell<u32>,
}

impl Application {
    /// Create the session and install the dispatch command.  The interpreter
    /// is not initialised yet; call [`init`](Self::init).
    pub fn new(api: Rc<dyn NativeApi>, app_name: &str) -> Result<Self> {
        Self::with_idle(api, app_name, DEFAULT_IDLE)
    }

    pub fn with_idle(api: Rc<dyn NativeApi>, app_name: &str, idle: Duration) -> Result<Self> {
        let interp = Rc::new(Interpreter::create(api)?);
        let registry = CallbackRegistry::new();
        registry.install(&interp)?;
        let timers = Rc::new(TimerQueue::new());
        Ok(Self {
            app_name: app_name.to_owned(),
            vars: VarCache::new(interp.clone()),
            bindings: Bindings::new(interp.clone(), registry.clone()),
            event_loop: EventLoop::new(interp.clone(), timers.clone(), idle),
            fonts: FontManager::new(interp.clone()),
            images: ImageFactory::new(interp.clone()),
            interp,
            registry,
            timers,
            themes: None,
            next_window: Cell::new(0),
        })
    }

    /// Open the configured backend, initialise everything and apply the
    /// configured theme.  A theme that cannot be applied is logged.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api = native::open(settings)?;
        let mut app = Self::with_idle(api, &settings.app_name, settings.idle())?;
        app.init()?;
        if let Some(themes) = &app.themes {
            let theme = settings.theme_name();
            if let Err(e) = themes.use_theme(theme) {
                warn!(theme, error = %e, "theme not applied");
            }
        }
        Ok(app)
    }

    /// Initialise the interpreter, then the toolkit under the application
    /// name, then ttk.  Without ttk the application still works but has no
    /// theme manager.
    pub fn init(&mut self) -> Result<()> {
        self.interp.init()?;
        let argv = format!("-name {}", quote_string(&self.app_name));
        self.interp.set_var("argv", None, &Value::from(argv))?;
        self.interp.init_toolkit()?;
        match self.interp.eval("package require Ttk") {
            Ok(_) => self.themes = Some(ThemeManager::new(self.interp.clone())),
            Err(e) => warn!(error = %e, "ttk unavailable"),
        }
        info!(app = %self.app_name, backend = self.interp.api().name(), "application initialised");
        Ok(())
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn interpreter(&self) -> Rc<Interpreter> {
        self.interp.clone()
    }

    pub fn registry(&self) -> &Rc<CallbackRegistry> {
        &self.registry
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn timers(&self) -> &Rc<TimerQueue> {
        &self.timers
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    /// Compose `args` into one instruction and evaluate it.  Native handles
    /// among the arguments are replaced by their string form.
    pub fn eval(&self, args: &[Value]) -> Result<String> {
        let resolved: Vec<Value> = args.iter().map(|a| self.resolve(a)).collect();
        self.interp.eval(&compose(&resolved))
    }

    pub fn eval_script(&self, script: &str) -> Result<String> {
        self.interp.eval(script)
    }

    fn resolve(&self, arg: &Value) -> Value {
        match arg {
            Value::Handle(obj) => Value::Str(self.interp.get_string(*obj)),
            Value::List(items) => Value::List(items.iter().map(|i| self.resolve(i)).collect()),
            other => other.clone(),
        }
    }

    // ── Callbacks ─────────────────────────────────────────────────────────────

    /// Register a callback owned by `owner` and return the fragment that
    /// triggers it.  `discriminator` tells apart several callbacks of one
    /// widget.
    pub fn register_callback<W, F>(
        &self,
        owner: &Rc<W>,
        callback: F,
        extra_args: &[Value],
        discriminator: Option<&str>,
    ) -> String
    where
        W: Widget + 'static,
        F: Fn(&dyn Widget, &[String]) -> Result<String> + 'static,
    {
        let token = CallbackRegistry::token_for(owner.path(), discriminator);
        self.registry.register(&token, owner, callback, extra_args)
    }

    pub fn unregister_callback(&self, owner: &dyn Widget, discriminator: Option<&str>) -> bool {
        self.registry.unregister(&CallbackRegistry::token_for(owner.path(), discriminator))
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    pub fn register_var(&self, name: &str) -> Result<Rc<Variable>> {
        self.vars.register(name)
    }

    pub fn register_array_var(&self, name: &str, index: &str) -> Result<Rc<Variable>> {
        self.vars.register_element(name, index)
    }

    pub fn unregister_var(&self, name: &str) -> Result<()> {
        self.vars.unregister(name)
    }

    pub fn unregister_array_var(&self, name: &str, index: &str) -> Result<()> {
        self.vars.unregister_element(name, index)
    }

    // ── Bindings ──────────────────────────────────────────────────────────────

    pub fn bind_widget<W, F>(&self, owner: &Rc<W>, event: &str, callback: F) -> Result<String>
    where
        W: Widget + 'static,
        F: Fn(&dyn Widget, &[String]) -> Result<String> + 'static,
    {
        self.bindings.bind_widget(owner, event, callback)
    }

    pub fn unbind_widget(&self, owner: &dyn Widget, event: &str) -> Result<bool> {
        self.bindings.unbind_widget(owner, event)
    }

    // ── Timers and loop ───────────────────────────────────────────────────────

    pub fn add_timeout<F>(&self, ms: u64, callback: F) -> TimerId
    where
        F: Fn() -> Result<()> + 'static,
    {
        self.timers.add_timeout(Duration::from_millis(ms), callback)
    }

    pub fn add_interval<F>(&self, ms: u64, callback: F) -> TimerId
    where
        F: Fn() -> Result<()> + 'static,
    {
        self.timers.add_interval(Duration::from_millis(ms), callback)
    }

    pub fn cancel_timer(&self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }

    pub fn run_once(&self) -> Result<LoopTick> {
        self.event_loop.run_once()
    }

    pub async fn run(&self) -> Result<()> {
        self.event_loop.run().await
    }

    pub fn loop_control(&self) -> LoopControl {
        self.event_loop.control()
    }

    /// Destroy the root window and stop the loop.
    pub fn quit(&self) -> Result<()> {
        self.event_loop.control().stop();
        self.interp.eval("destroy .")?;
        Ok(())
    }

    // ── Toolkit ───────────────────────────────────────────────────────────────

    /// Next unused top-level path: `.w0`, `.w1`, …
    pub fn next_window_path(&self) -> String {
        let n = self.next_window.get();
        self.next_window.set(n + 1);
        format!(".w{n}")
    }

    pub fn create_toplevel(&self, options: &ToplevelOptions) -> Result<Rc<Toplevel>> {
        let path = self.next_window_path();
        let mut args = vec![Value::from("toplevel"), Value::from(path.as_str())];
        args.extend(options.to_args());
        self.eval(&args)?;
        debug!(path = %path, "toplevel created");
        Ok(Rc::new(Toplevel::new(path)))
    }

    pub fn gui_type(&self) -> Result<GuiType> {
        self.interp.eval("tk windowingsystem")?.parse()
    }

    /// Pixels per point.
    pub fn scaling(&self) -> Result<f64> {
        self.interp.eval("tk scaling")?;
        let obj = self.interp.obj_result()?;
        self.interp.get_float(obj)
    }

    pub fn set_scaling(&self, factor: f64) -> Result<()> {
        self.interp.eval(&format!("tk scaling {}", format_float(factor)))?;
        Ok(())
    }

    pub fn has_ttk(&self) -> bool {
        self.themes.is_some()
    }

    pub fn theme_manager(&self) -> Result<&ThemeManager> {
        self.themes
            .as_ref()
            .ok_or_else(|| BridgeError::Toolkit("ttk is not available in this interpreter".into()))
    }

    pub fn font_manager(&self) -> &FontManager {
        &self.fonts
    }

    pub fn image_factory(&self) -> &ImageFactory {
        &self.images
    }

    /// Window-manager requests for `window`, which must be a top-level
    /// window or the root.
    pub fn window_manager(&self, window: &dyn Widget) -> WindowManager {
        WindowManager::new(self.interp.clone(), window.path())
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Tear everything down in order.  Every step runs; the first error is
    /// returned.
    pub fn shutdown(self) -> Result<()> {
        self.event_loop.control().stop();
        self.timers.clear();

        let mut first: Option<BridgeError> = None;
        let mut note = |step: &'static str, outcome: Result<()>| {
            if let Err(e) = outcome {
                warn!(step, error = %e, "shutdown step failed");
                first.get_or_insert(e);
            }
        };
        note("bindings", self.bindings.dispose());
        note("variables", self.vars.release_all());
        self.registry.clear();
        note("dispatch command", self.registry.uninstall(&self.interp));
        note("interpreter", self.interp.delete());

        info!(app = %self.app_name, "application shut down");
        first.map_or(Ok(()), Err)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::mini::MiniTcl;
    use crate::widget::Tag;

    fn app() -> Application {
        let mut app = Application::new(Rc::new(MiniTcl::new()), "test app").unwrap();
        app.init().unwrap();
        app
    }

    #[test]
    fn init_names_the_root_window() {
        let app = app();
        assert_eq!(app.eval_script("wm title .").unwrap(), "test app");
        assert!(app.has_ttk());
        app.shutdown().unwrap();
    }

    #[test]
    fn eval_composes_arguments() {
        let app = app();
        app.eval(&[Value::from("set"), Value::from("greeting"), Value::from("hello world")]).unwrap();
        assert_eq!(app.eval_script("set greeting").unwrap(), "hello world");
        let obj = app.interpreter().to_obj(&Value::Int(7)).unwrap();
        assert_eq!(app.eval(&[Value::from("set"), Value::from("n"), Value::Handle(obj)]).unwrap(), "7");
        app.shutdown().unwrap();
    }

    #[test]
    fn window_paths_are_sequential() {
        let app = app();
        assert_eq!(app.next_window_path(), ".w0");
        let top = app.create_toplevel(&ToplevelOptions::default().width(120)).unwrap();
        assert_eq!(top.path(), ".w1");
        assert_eq!(app.eval_script(".w1 cget -width").unwrap(), "120");
        app.shutdown().unwrap();
    }

    #[test]
    fn gui_type_and_scaling() {
        let app = app();
        let gui = app.gui_type().unwrap();
        assert_eq!(gui.to_string(), app.eval_script("tk windowingsystem").unwrap());
        app.set_scaling(2.0).unwrap();
        assert_eq!(app.scaling().unwrap(), 2.0);
        app.shutdown().unwrap();
    }

    #[test]
    fn unknown_windowing_system_is_a_conversion_error() {
        assert!("wayland".parse::<GuiType>().unwrap_err().is_conversion());
    }

    #[test]
    fn theme_manager_missing_without_ttk() {
        let app = Application::new(Rc::new(MiniTcl::new()), "bare").unwrap();
        assert!(!app.has_ttk());
        assert!(matches!(app.theme_manager(), Err(BridgeError::Toolkit(_))));
        app.shutdown().unwrap();
    }

    #[test]
    fn services_share_the_interpreter() {
        let app = app();
        let root = Tag::root();
        app.window_manager(&root).set_title("renamed").unwrap();
        assert_eq!(app.eval_script("wm title .").unwrap(), "renamed");
        let top = app.create_toplevel(&ToplevelOptions::default()).unwrap();
        app.window_manager(top.as_ref()).set_size(320, 240).unwrap();
        assert_eq!(app.eval_script("wm geometry .w0").unwrap(), "320x240+0+0");
        assert!(!app.font_manager().families().unwrap().is_empty());
        let icon = app.image_factory().from_bytes(b"GIF87a\x01\x00\x01\x00").unwrap();
        app.window_manager(&root).set_icon(&[&icon]).unwrap();
        app.shutdown().unwrap();
    }

    #[test]
    fn quit_stops_the_loop_and_destroys_root() {
        let app = app();
        app.quit().unwrap();
        assert!(app.loop_control().is_stopped());
        assert_eq!(app.eval_script("winfo exists .").unwrap(), "0");
        app.shutdown().unwrap();
    }

    #[test]
    fn shutdown_releases_everything() {
        let app = app();
        let root = Rc::new(Tag::root());
        app.register_callback(&root, |_, _| Ok(String::new()), &[], Some("click"));
        app.bind_widget(&root, "<Configure>", |_, _| Ok(String::new())).unwrap();
        let var = app.register_var("state").unwrap();
        app.add_interval(10, || Ok(()));
        let interp = app.interpreter();
        app.shutdown().unwrap();
        assert!(interp.is_deleted());
        assert!(var.is_released());
        // The session slot is free again.
        let again = Application::new(Rc::new(MiniTcl::new()), "again").unwrap();
        again.shutdown().unwrap();
    }
}

//! Embedded Tcl/Tk interpreter bridge.
//!
//! The bridge owns one native interpreter per thread and lets host code
//! evaluate scripts, exchange typed values, register callbacks that scripts
//! can invoke, share variables, bind window events and run timers on a
//! cooperative event loop.
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use tkbridge::native::mini::MiniTcl;
//! use tkbridge::{script_args, Application, Tag};
//!
//! let mut app = Application::new(Rc::new(MiniTcl::new()), "demo")?;
//! app.init()?;
//!
//! let clicks = Rc::new(Cell::new(0));
//! let seen = clicks.clone();
//! let root = Rc::new(Tag::root());
//! let fragment = app.register_callback(
//!     &root,
//!     move |_, _| {
//!         seen.set(seen.get() + 1);
//!         Ok("clicked".into())
//!     },
//!     &[],
//!     Some("click"),
//! );
//! assert_eq!(app.eval_script(&fragment)?, "clicked");
//! assert_eq!(clicks.get(), 1);
//!
//! app.eval(&script_args!["set", "greeting", "hello world"])?;
//! let greeting = app.register_var("greeting")?;
//! assert_eq!(greeting.as_string()?, "hello world");
//!
//! app.shutdown()?;
//! # Ok::<(), tkbridge::BridgeError>(())
//! ```

pub mod app;
pub mod bind;
pub mod cli;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event_loop;
pub mod font;
pub mod image;
pub mod interp;
pub mod native;
pub mod options;
pub mod quote;
pub mod theme;
pub mod timer;
pub mod value;
pub mod var;
pub mod widget;
pub mod wm;

pub use app::{Application, GuiType};
pub use config::{Backend, Settings};
pub use error::{BridgeError, Result};
pub use event_loop::{EventLoop, LoopControl, LoopTick};
pub use font::{Font, FontManager, FontMetrics};
pub use image::{Image, ImageFactory};
pub use interp::Interpreter;
pub use options::ToplevelOptions;
pub use timer::TimerId;
pub use value::Value;
pub use var::Variable;
pub use widget::{Tag, Toplevel, Widget};
pub use wm::{Geometry, WindowManager, WindowState};

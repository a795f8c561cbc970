//! Window-manager requests for one top-level window.
//!
//! Every call maps onto `wm <request> <path> ?args?`.  Sizes and positions
//! are in pixels; geometry is read back in the `WxH+X+Y` form the toolkit
//! reports.

use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{BridgeError, Result};
use crate::image::Image;
use crate::interp::Interpreter;
use crate::quote::{compose, quote_string, str_to_option};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Normal,
    Iconic,
    Withdrawn,
    Zoomed,
}

impl fmt::Display for WindowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WindowState::Normal => "normal",
            WindowState::Iconic => "iconic",
            WindowState::Withdrawn => "withdrawn",
            WindowState::Zoomed => "zoomed",
        })
    }
}

impl std::str::FromStr for WindowState {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "normal" => Ok(WindowState::Normal),
            "iconic" => Ok(WindowState::Iconic),
            "withdrawn" => Ok(WindowState::Withdrawn),
            "zoomed" => Ok(WindowState::Zoomed),
            other => {
                Err(BridgeError::Conversion { kind: "window state", source_repr: other.to_owned() })
            }
        }
    }
}

/// Size and position of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: i64,
    pub height: i64,
    pub x: i64,
    pub y: i64,
}

impl std::str::FromStr for Geometry {
    type Err = BridgeError;

    /// `300x200+10+20`; offsets may be negative (`+-5`) or taken from the
    /// far edge (`-5`).
    fn from_str(s: &str) -> Result<Self> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"^(\d+)x(\d+)([+-]-?\d+)([+-]-?\d+)$").expect("valid geometry pattern")
        });
        let invalid = || BridgeError::Conversion { kind: "geometry", source_repr: s.to_owned() };
        let caps = re.captures(s).ok_or_else(invalid)?;
        let num = |i: usize| -> Result<i64> {
            let text = caps.get(i).map_or("", |m| m.as_str());
            // `+-5` is a plain negative offset.
            text.strip_prefix('+').unwrap_or(text).parse().map_err(|_| invalid())
        };
        Ok(Geometry { width: num(1)?, height: num(2)?, x: num(3)?, y: num(4)? })
    }
}

pub struct WindowManager {
    interp: Rc<Interpreter>,
    path: String,
}

impl WindowManager {
    pub(crate) fn new(interp: Rc<Interpreter>, path: &str) -> Self {
        Self { interp, path: path.to_owned() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn request(&self, request: &str, args: &[Value]) -> Result<String> {
        let mut words = vec![Value::from("wm"), Value::from(request), Value::from(self.path.as_str())];
        words.extend_from_slice(args);
        self.interp.eval(&compose(&words))
    }

    fn size_pair(&self, request: &str) -> Result<(i64, i64)> {
        let reply = self.request(request, &[])?;
        let invalid = || BridgeError::Conversion { kind: "size", source_repr: reply.clone() };
        let (w, h) = reply.split_once(' ').ok_or_else(invalid)?;
        Ok((w.parse().map_err(|_| invalid())?, h.parse().map_err(|_| invalid())?))
    }

    pub fn set_title(&self, title: &str) -> Result<()> {
        self.request("title", &[Value::from(quote_string(title))])?;
        Ok(())
    }

    pub fn title(&self) -> Result<String> {
        self.request("title", &[])
    }

    pub fn set_state(&self, state: WindowState) -> Result<()> {
        self.request("state", &[Value::from(state.to_string())])?;
        Ok(())
    }

    pub fn state(&self) -> Result<WindowState> {
        self.request("state", &[])?.parse()
    }

    pub fn iconify(&self) -> Result<()> {
        self.request("iconify", &[])?;
        Ok(())
    }

    pub fn deiconify(&self) -> Result<()> {
        self.request("deiconify", &[])?;
        Ok(())
    }

    pub fn withdraw(&self) -> Result<()> {
        self.request("withdraw", &[])?;
        Ok(())
    }

    pub fn set_min_size(&self, width: i64, height: i64) -> Result<()> {
        self.request("minsize", &[Value::from(width), Value::from(height)])?;
        Ok(())
    }

    pub fn min_size(&self) -> Result<(i64, i64)> {
        self.size_pair("minsize")
    }

    pub fn set_max_size(&self, width: i64, height: i64) -> Result<()> {
        self.request("maxsize", &[Value::from(width), Value::from(height)])?;
        Ok(())
    }

    pub fn max_size(&self) -> Result<(i64, i64)> {
        self.size_pair("maxsize")
    }

    pub fn geometry(&self) -> Result<Geometry> {
        self.request("geometry", &[])?.parse()
    }

    pub fn set_size(&self, width: i64, height: i64) -> Result<()> {
        self.request("geometry", &[Value::from(format!("{width}x{height}"))])?;
        Ok(())
    }

    pub fn size(&self) -> Result<(i64, i64)> {
        let g = self.geometry()?;
        Ok((g.width, g.height))
    }

    /// Move the window; coordinates are from the screen's top-left corner.
    pub fn set_pos(&self, x: i64, y: i64) -> Result<()> {
        self.request("geometry", &[Value::from(format!("+{x}+{y}"))])?;
        Ok(())
    }

    pub fn pos(&self) -> Result<(i64, i64)> {
        let g = self.geometry()?;
        Ok((g.x, g.y))
    }

    /// Set a platform attribute such as `alpha` or `topmost`.
    pub fn set_attribute(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let mut words = vec![
            Value::from("wm"),
            Value::from("attributes"),
            Value::from(self.path.as_str()),
            Value::from(str_to_option(name)),
        ];
        words.push(value.into());
        self.interp.eval(&compose(&words))?;
        Ok(())
    }

    pub fn attribute(&self, name: &str) -> Result<String> {
        self.request("attributes", &[Value::from(str_to_option(name))])
    }

    pub fn set_fullscreen(&self, on: bool) -> Result<()> {
        self.set_attribute("fullscreen", on)
    }

    /// Ask the window manager to leave the window undecorated.
    pub fn set_override_redirect(&self, on: bool) -> Result<()> {
        self.request("overrideredirect", &[Value::from(on)])?;
        Ok(())
    }

    pub fn override_redirect(&self) -> Result<bool> {
        self.request("overrideredirect", &[])?;
        self.interp.get_bool(self.interp.obj_result()?)
    }

    /// Window icon; the first image that fits is used.
    pub fn set_icon(&self, icons: &[&Image]) -> Result<()> {
        let names: Vec<Value> = icons.iter().map(|i| Value::from(i.name())).collect();
        self.request("iconphoto", &names)?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

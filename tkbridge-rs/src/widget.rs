//! What the bridge needs to know about a widget: its path.
//!
//! Concrete widget classes live outside the bridge.  They hand themselves to
//! the callback registry as owners and to the binding manager as tags.

use std::fmt;

pub trait Widget {
    /// Hierarchical path name (`.`, `.w0`, `.w0.canvas`).
    fn path(&self) -> &str;
}

/// A bare tag: a widget path, a class name or `all`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The root window `.`.
    pub fn root() -> Self {
        Self(".".to_owned())
    }

    pub fn is_root(&self) -> bool {
        self.0 == "."
    }
}

impl Widget for Tag {
    fn path(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A top-level window created through the application.
#[derive(Debug)]
pub struct Toplevel {
    path: String,
}

impl Toplevel {
    pub(crate) fn new(path: String) -> Self {
        Self { path }
    }
}

impl Widget for Toplevel {
    fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_tag() {
        let root = Tag::root();
        assert!(root.is_root());
        assert_eq!(root.path(), ".");
        assert!(!Tag::new(".w0").is_root());
        assert_eq!(Tag::new("Canvas").to_string(), "Canvas");
    }
}

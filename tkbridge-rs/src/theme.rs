//! ttk theme selection.

use std::rc::Rc;

use tracing::debug;

use crate::error::Result;
use crate::interp::Interpreter;
use crate::quote::enclose_str;

/// Available once the ttk package has been loaded.
pub struct ThemeManager {
    interp: Rc<Interpreter>,
}

impl ThemeManager {
    pub(crate) fn new(interp: Rc<Interpreter>) -> Self {
        Self { interp }
    }

    /// Names of every installed theme.
    pub fn themes(&self) -> Result<Vec<String>> {
        self.interp.eval("ttk::style theme names")?;
        self.interp.list_result()
    }

    pub fn use_theme(&self, name: &str) -> Result<()> {
        self.interp.eval(&format!("ttk::style theme use {}", enclose_str(name)))?;
        debug!(theme = name, "theme applied");
        Ok(())
    }

    pub fn current_theme(&self) -> Result<String> {
        self.interp.eval("ttk::style theme use")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::native::mini::MiniTcl;

    fn setup() -> (Rc<Interpreter>, ThemeManager) {
        let interp = Rc::new(Interpreter::create(Rc::new(MiniTcl::new())).unwrap());
        interp.init().unwrap();
        interp.init_toolkit().unwrap();
        interp.eval("package require Ttk").unwrap();
        let themes = ThemeManager::new(interp.clone());
        (interp, themes)
    }

    #[test]
    fn lists_and_switches_themes() {
        let (interp, themes) = setup();
        let names = themes.themes().unwrap();
        assert!(names.iter().any(|n| n == "clam"));
        themes.use_theme("clam").unwrap();
        assert_eq!(themes.current_theme().unwrap(), "clam");
        interp.delete().unwrap();
    }

    #[test]
    fn unknown_theme_is_an_eval_error() {
        let (interp, themes) = setup();
        let before = themes.current_theme().unwrap();
        assert!(matches!(themes.use_theme("no-such-theme"), Err(BridgeError::Eval { .. })));
        assert_eq!(themes.current_theme().unwrap(), before);
        interp.delete().unwrap();
    }
}

//! Settings file and environment overrides.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. built-in defaults (per operating system for library paths and theme),
//! 2. a TOML file (`<config dir>/tkbridge.toml`, or an explicit path),
//! 3. environment variables.
//!
//! | Variable                   | Setting        |
//! |----------------------------|----------------|
//! | `LINUX_LIB_TCL` etc.       | `tcl_library`  |
//! | `LINUX_LIB_TK` etc.        | `tk_library`   |
//! | `APP_NAME`                 | `app_name`     |
//! | `THEME`                    | `theme`        |
//! | `DEBUG`                    | `debug`        |
//! | `TKBRIDGE_BACKEND`         | `backend`      |
//!
//! The library prefix is `LINUX`, `DARWIN` or `WINDOWS` for the running OS.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BridgeError, Result};

const CONFIG_FILE: &str = "tkbridge.toml";

/// Which native implementation to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Tcl/Tk shared libraries.
    #[default]
    Tcl,
    /// In-process interpreter.
    Mini,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcl" => Ok(Backend::Tcl),
            "mini" => Ok(Backend::Mini),
            other => Err(format!("unknown backend `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    Darwin,
    Windows,
}

impl OsFamily {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            OsFamily::Darwin
        } else if cfg!(windows) {
            OsFamily::Windows
        } else {
            OsFamily::Linux
        }
    }

    /// Prefix of the library-path environment variables.
    pub fn env_prefix(self) -> &'static str {
        match self {
            OsFamily::Linux => "LINUX",
            OsFamily::Darwin => "DARWIN",
            OsFamily::Windows => "WINDOWS",
        }
    }

    pub fn default_tcl_library(self) -> &'static str {
        match self {
            OsFamily::Linux => "libtcl8.6.so",
            OsFamily::Darwin => "libtcl8.6.dylib",
            OsFamily::Windows => "tcl86t.dll",
        }
    }

    pub fn default_tk_library(self) -> &'static str {
        match self {
            OsFamily::Linux => "libtk8.6.so",
            OsFamily::Darwin => "libtk8.6.dylib",
            OsFamily::Windows => "tk86t.dll",
        }
    }

    pub fn default_theme(self) -> &'static str {
        match self {
            OsFamily::Linux => "clam",
            OsFamily::Darwin => "aqua",
            OsFamily::Windows => "vista",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Passed to the toolkit as `-name`.
    pub app_name: String,
    pub backend: Backend,
    pub tcl_library: Option<PathBuf>,
    pub tk_library: Option<PathBuf>,
    /// ttk theme; `auto` picks the platform default.
    pub theme: String,
    pub debug: bool,
    /// Event-loop yield between iterations, in milliseconds.
    pub idle_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "tkbridge".to_owned(),
            backend: Backend::Tcl,
            tcl_library: None,
            tk_library: None,
            theme: "auto".to_owned(),
            debug: false,
            idle_ms: 1,
        }
    }
}

impl Settings {
    pub fn tcl_library(&self) -> PathBuf {
        self.tcl_library
            .clone()
            .unwrap_or_else(|| PathBuf::from(OsFamily::current().default_tcl_library()))
    }

    pub fn tk_library(&self) -> PathBuf {
        self.tk_library
            .clone()
            .unwrap_or_else(|| PathBuf::from(OsFamily::current().default_tk_library()))
    }

    /// Theme to apply, with `auto` resolved.
    pub fn theme_name(&self) -> &str {
        if self.theme == "auto" {
            OsFamily::current().default_theme()
        } else {
            &self.theme
        }
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    /// Parse a TOML document; `origin` names it in errors.
    pub fn load_str(s: &str, origin: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BridgeError::Config {
            path: origin.to_owned(),
            message: e.message().to_owned(),
        })
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let origin = path.display().to_string();
        let data = fs::read_to_string(path)
            .map_err(|e| BridgeError::Config { path: origin.clone(), message: e.to_string() })?;
        let settings = Self::load_str(&data, &origin)?;
        debug!(path = %origin, "settings loaded");
        Ok(settings)
    }

    /// `<config dir>/tkbridge.toml`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tkbridge").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load an explicit file, or the default file if it exists, or defaults;
    /// then apply the process environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut settings = match explicit {
            Some(path) => Self::load_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::load_file(&path)?,
                _ => Self::default(),
            },
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Apply overrides looked up through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = OsFamily::current().env_prefix();
        if let Some(path) = var(&format!("{prefix}_LIB_TCL")) {
            self.tcl_library = Some(PathBuf::from(path));
        }
        if let Some(path) = var(&format!("{prefix}_LIB_TK")) {
            self.tk_library = Some(PathBuf::from(path));
        }
        if let Some(name) = var("APP_NAME") {
            self.app_name = name;
        }
        if let Some(theme) = var("THEME") {
            self.theme = theme;
        }
        if let Some(flag) = var("DEBUG") {
            self.debug = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(backend) = var("TKBRIDGE_BACKEND") {
            self.backend = backend
                .parse()
                .map_err(|message| BridgeError::Config { path: "TKBRIDGE_BACKEND".into(), message })?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

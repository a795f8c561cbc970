//! Fonts: installed families, the standard named fonts and text
//! measurement.
//!
//! A [`Font`] is always what the toolkit reports back from `font actual`, so
//! families and sizes reflect what will really be drawn rather than what was
//! asked for.

use std::fmt;
use std::rc::Rc;

use crate::error::{BridgeError, Result};
use crate::interp::Interpreter;
use crate::quote::{array_to_list, compose, quote_string};
use crate::value::Value;

/// Named font used by widgets that set none.
pub const DEFAULT_FONT: &str = "TkDefaultFont";
/// Named monospace font.
pub const FIXED_FONT: &str = "TkFixedFont";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Font {
    pub family: String,
    /// Points when positive, pixels when negative.
    pub size: i64,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub overstrike: bool,
}

impl Font {
    pub fn new(family: impl Into<String>, size: i64) -> Self {
        Self {
            family: family.into(),
            size,
            bold: false,
            italic: false,
            underline: false,
            overstrike: false,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub fn underline(mut self) -> Self {
        self.underline = true;
        self
    }

    pub fn overstrike(mut self) -> Self {
        self.overstrike = true;
        self
    }

    /// Build from the `-family … -size … -weight …` list `font actual`
    /// returns.  Unknown options are skipped; `-family` is required.
    pub fn from_options(list: &[String]) -> Result<Self> {
        let invalid = || BridgeError::Conversion {
            kind: "font description",
            source_repr: list.join(" "),
        };
        if list.len() % 2 != 0 {
            return Err(invalid());
        }
        let mut family = None;
        let mut font = Font::new("", 0);
        for pair in list.chunks(2) {
            let value = pair[1].as_str();
            match pair[0].as_str() {
                "-family" => family = Some(value.to_owned()),
                "-size" => font.size = value.parse().map_err(|_| invalid())?,
                "-weight" => font.bold = value == "bold",
                "-slant" => font.italic = value == "italic",
                "-underline" => font.underline = value == "1",
                "-overstrike" => font.overstrike = value == "1",
                _ => {}
            }
        }
        font.family = family.ok_or_else(invalid)?;
        Ok(font)
    }

    /// List form understood by every font option:
    /// `{{DejaVu Sans} {9} {bold}}`.
    pub fn description(&self) -> String {
        let mut words = vec![self.family.clone(), self.size.to_string()];
        let styles = [
            (self.bold, "bold"),
            (self.italic, "italic"),
            (self.underline, "underline"),
            (self.overstrike, "overstrike"),
        ];
        words.extend(styles.iter().filter(|(on, _)| *on).map(|(_, s)| s.to_string()));
        array_to_list(&words)
    }
}

impl fmt::Display for Font {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Vertical metrics in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontMetrics {
    pub ascent: i64,
    pub descent: i64,
    pub linespace: i64,
    pub fixed: bool,
}

pub struct FontManager {
    interp: Rc<Interpreter>,
}

impl FontManager {
    pub(crate) fn new(interp: Rc<Interpreter>) -> Self {
        Self { interp }
    }

    /// Every installed font family.
    pub fn families(&self) -> Result<Vec<String>> {
        self.interp.eval("font families")?;
        self.interp.list_result()
    }

    pub fn default_font(&self) -> Result<Font> {
        self.actual(DEFAULT_FONT)
    }

    pub fn fixed_font(&self) -> Result<Font> {
        self.actual(FIXED_FONT)
    }

    /// Resolve a named font or a description such as
    /// `{{Noto Sans} 72 bold italic}` to the font that would be used.
    pub fn actual(&self, spec: &str) -> Result<Font> {
        self.interp.eval(&compose(&[
            Value::from("font"),
            Value::from("actual"),
            Value::from(quote_string(spec)),
        ]))?;
        Font::from_options(&self.interp.list_result()?)
    }

    /// Horizontal extent of `text` in pixels.
    pub fn text_width(&self, text: &str, font: &Font) -> Result<i64> {
        self.interp.eval(&compose(&[
            Value::from("font"),
            Value::from("measure"),
            Value::from(font.description()),
            Value::from(quote_string(text)),
        ]))?;
        self.interp.get_int(self.interp.obj_result()?)
    }

    pub fn metrics(&self, font: &Font) -> Result<FontMetrics> {
        self.interp.eval(&compose(&[
            Value::from("font"),
            Value::from("metrics"),
            Value::from(font.description()),
        ]))?;
        let list = self.interp.list_result()?;
        let invalid = || BridgeError::Conversion {
            kind: "font metrics",
            source_repr: list.join(" "),
        };
        let field = |name: &str| -> Result<i64> {
            let at = list.iter().position(|w| w == name).ok_or_else(invalid)?;
            list.get(at + 1).and_then(|v| v.parse().ok()).ok_or_else(invalid)
        };
        Ok(FontMetrics {
            ascent: field("-ascent")?,
            descent: field("-descent")?,
            linespace: field("-linespace")?,
            fixed: field("-fixed")? != 0,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::mini::MiniTcl;

    fn setup() -> (Rc<Interpreter>, FontManager) {
        let interp = Rc::new(Interpreter::create(Rc::new(MiniTcl::new())).unwrap());
        interp.init().unwrap();
        interp.init_toolkit().unwrap();
        let fonts = FontManager::new(interp.clone());
        (interp, fonts)
    }

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn description_lists_styles() {
        let font = Font::new("Noto Sans", 72).bold().italic();
        assert_eq!(font.description(), "{{Noto Sans} {72} {bold} {italic}}");
        assert_eq!(Font::new("Times", -12).to_string(), "{{Times} {-12}}");
    }

    #[test]
    fn parses_actual_options() {
        let list = words(&[
            "-family", "DejaVu Sans", "-size", "9", "-weight", "bold", "-slant", "roman",
            "-underline", "1", "-overstrike", "0",
        ]);
        let font = Font::from_options(&list).unwrap();
        assert_eq!(font, Font::new("DejaVu Sans", 9).bold().underline());
        assert!(Font::from_options(&words(&["-size", "9"])).unwrap_err().is_conversion());
        assert!(Font::from_options(&words(&["-family"])).unwrap_err().is_conversion());
    }

    #[test]
    fn named_fonts_resolve() {
        let (interp, fonts) = setup();
        assert!(fonts.families().unwrap().iter().any(|f| f == "DejaVu Sans Mono"));
        let fixed = fonts.fixed_font().unwrap();
        assert_eq!(fixed.family, "DejaVu Sans Mono");
        assert!(fonts.metrics(&fixed).unwrap().fixed);
        assert!(!fonts.metrics(&fonts.default_font().unwrap()).unwrap().fixed);
        let spec = fonts.actual("{Helvetica} 14 bold").unwrap();
        assert_eq!((spec.family.as_str(), spec.size, spec.bold), ("Helvetica", 14, true));
        interp.delete().unwrap();
    }

    #[test]
    fn text_width_grows_with_text() {
        let (interp, fonts) = setup();
        let font = fonts.default_font().unwrap();
        let short = fonts.text_width("ab", &font).unwrap();
        assert!(short > 0);
        assert_eq!(fonts.text_width("ab ab", &font).unwrap(), short * 5 / 2);
        let m = fonts.metrics(&font).unwrap();
        assert_eq!(m.linespace, m.ascent + m.descent);
        interp.delete().unwrap();
    }
}

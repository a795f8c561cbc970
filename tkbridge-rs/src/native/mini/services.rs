//! `wm`, `font` and `image` for the in-process interpreter.
//!
//! Window-manager state lives on every top-level widget.  Fonts are resolved
//! against a fixed family list with a simple proportional metric.  Photos
//! record only their size, sniffed from PNG, GIF or PPM headers.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;

use super::parse::{join_list, split_list};
use super::{parse_bool, parse_double, parse_int, wrong_args, Interp, Outcome};
use crate::value::format_float;

/// Screen size; the ceiling of `wm maxsize`.
const SCREEN: (i64, i64) = (1920, 1080);

const WM_COMMANDS: &str = "attributes, deiconify, geometry, iconify, iconphoto, maxsize, \
                           minsize, overrideredirect, state, title, or withdraw";
const WM_STATES: &[&str] = &["normal", "iconic", "withdrawn", "zoomed"];

// ── Window manager ────────────────────────────────────────────────────────────

pub(super) struct WmState {
    pub(super) title: String,
    state: &'static str,
    min_size: (i64, i64),
    max_size: (i64, i64),
    size: (i64, i64),
    pos: (i64, i64),
    attributes: BTreeMap<&'static str, String>,
    override_redirect: bool,
    icons: Vec<String>,
}

impl WmState {
    pub(super) fn new(title: String) -> Self {
        let attributes = [
            ("-alpha", "1.0"),
            ("-fullscreen", "0"),
            ("-topmost", "0"),
            ("-type", ""),
            ("-zoomed", "0"),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_owned()))
        .collect();
        Self {
            title,
            state: "normal",
            min_size: (1, 1),
            max_size: SCREEN,
            size: (200, 200),
            pos: (0, 0),
            attributes,
            override_redirect: false,
            icons: Vec::new(),
        }
    }

    fn geometry(&self) -> String {
        format!("{}x{}+{}+{}", self.size.0, self.size.1, self.pos.0, self.pos.1)
    }

    /// Sizes are held inside the min/max bounds.
    fn resize(&mut self, width: i64, height: i64) {
        let clamp = |v: i64, lo: i64, hi: i64| v.max(lo).min(hi.max(lo));
        self.size = (
            clamp(width, self.min_size.0, self.max_size.0),
            clamp(height, self.min_size.1, self.max_size.1),
        );
    }

    fn set_geometry(&mut self, spec: &str) -> Outcome {
        if spec.is_empty() {
            return Ok(String::new());
        }
        let caps = geometry_regex()
            .captures(spec)
            .ok_or_else(|| format!("bad geometry specifier \"{spec}\""))?;
        if let (Some(w), Some(h)) = (caps.get(1), caps.get(2)) {
            self.resize(parse_int(w.as_str())?, parse_int(h.as_str())?);
        }
        let offsets = (caps.get(3), caps.get(4), caps.get(5), caps.get(6));
        if let (Some(sx), Some(x), Some(sy), Some(y)) = offsets {
            let offset = |sign: &str, v: i64, extent: i64, screen: i64| {
                if sign == "-" {
                    screen - extent - v
                } else {
                    v
                }
            };
            self.pos = (
                offset(sx.as_str(), parse_int(x.as_str())?, self.size.0, SCREEN.0),
                offset(sy.as_str(), parse_int(y.as_str())?, self.size.1, SCREEN.1),
            );
        }
        Ok(String::new())
    }

    fn attribute(&self, name: &str) -> Outcome {
        self.attributes.get(name).cloned().ok_or_else(|| bad_attribute(name))
    }

    fn set_attribute(&mut self, name: &str, value: &str) -> Result<(), String> {
        let Some((&key, slot)) = self.attributes.iter_mut().find(|(k, _)| **k == name) else {
            return Err(bad_attribute(name));
        };
        *slot = match key {
            "-alpha" => format_float(parse_double(value)?.clamp(0.0, 1.0)),
            "-type" => value.to_owned(),
            _ => bool_word(parse_bool(value)?),
        };
        Ok(())
    }
}

fn geometry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^=?(?:(\d+)x(\d+))?(?:([+-])(-?\d+)([+-])(-?\d+))?$")
            .expect("valid geometry pattern")
    })
}

fn bad_attribute(name: &str) -> String {
    format!("bad attribute \"{name}\": must be -alpha, -fullscreen, -topmost, -type, or -zoomed")
}

fn bool_word(b: bool) -> String {
    let word = if b { "1" } else { "0" };
    word.to_owned()
}

fn size_pair((w, h): (i64, i64)) -> String {
    format!("{w} {h}")
}

/// `wm <sub> <window> args...` on the window's state.
pub(super) fn wm(
    wm: &mut WmState,
    sub: &str,
    args: &[String],
    photos: &BTreeMap<String, Photo>,
) -> Outcome {
    let done = Ok(String::new());
    match (sub, args) {
        ("title", []) => Ok(wm.title.clone()),
        ("title", [title]) => {
            wm.title = title.clone();
            done
        }
        ("state", []) => Ok(wm.state.to_owned()),
        ("state", [state]) => {
            wm.state = WM_STATES.iter().find(|s| **s == state.as_str()).copied().ok_or_else(|| {
                format!("bad argument \"{state}\": must be normal, iconic, withdrawn, or zoomed")
            })?;
            done
        }
        ("iconify", []) => {
            wm.state = "iconic";
            done
        }
        ("deiconify", []) => {
            wm.state = "normal";
            done
        }
        ("withdraw", []) => {
            wm.state = "withdrawn";
            done
        }
        ("minsize", []) => Ok(size_pair(wm.min_size)),
        ("minsize", [w, h]) => {
            wm.min_size = (parse_int(w)?.max(1), parse_int(h)?.max(1));
            wm.resize(wm.size.0, wm.size.1);
            done
        }
        ("maxsize", []) => Ok(size_pair(wm.max_size)),
        ("maxsize", [w, h]) => {
            wm.max_size = (parse_int(w)?.clamp(1, SCREEN.0), parse_int(h)?.clamp(1, SCREEN.1));
            wm.resize(wm.size.0, wm.size.1);
            done
        }
        ("geometry", []) => Ok(wm.geometry()),
        ("geometry", [spec]) => wm.set_geometry(spec),
        ("attributes", []) => {
            let pairs: Vec<&str> =
                wm.attributes.iter().flat_map(|(k, v)| [*k, v.as_str()]).collect();
            Ok(join_list(&pairs))
        }
        ("attributes", [name]) => wm.attribute(name),
        ("attributes", pairs) if pairs.len() % 2 == 0 => {
            for pair in pairs.chunks(2) {
                wm.set_attribute(&pair[0], &pair[1])?;
            }
            done
        }
        ("attributes", pairs) => Err(format!("value for \"{}\" missing", pairs[pairs.len() - 1])),
        ("overrideredirect", []) => Ok(bool_word(wm.override_redirect)),
        ("overrideredirect", [flag]) => {
            wm.override_redirect = parse_bool(flag)?;
            done
        }
        ("iconphoto", []) => Ok(join_list(&wm.icons)),
        ("iconphoto", names) => {
            let names = match names {
                [flag, rest @ ..] if flag == "-default" => rest,
                _ => names,
            };
            if names.is_empty() {
                return wrong_args("wm iconphoto window ?-default? image1 ?image2 ...?");
            }
            if let Some(missing) = names.iter().find(|n| !photos.contains_key(n.as_str())) {
                return Err(format!("can't use \"{missing}\" as iconphoto: not a photo image"));
            }
            wm.icons = names.to_vec();
            done
        }
        (
            "title" | "state" | "iconify" | "deiconify" | "withdraw" | "minsize" | "maxsize"
            | "geometry" | "overrideredirect",
            _,
        ) => wrong_args(&format!("wm {sub} window ?arg ...?")),
        (other, _) => Err(format!("bad option \"{other}\": must be {WM_COMMANDS}")),
    }
}

// ── Fonts ─────────────────────────────────────────────────────────────────────

const FAMILIES: &[&str] = &["Courier", "DejaVu Sans", "DejaVu Sans Mono", "Helvetica", "Times"];
const FALLBACK_FAMILY: &str = "DejaVu Sans";
const DEFAULT_SIZE: i64 = 9;

/// Standard named fonts: name, family, size, bold.
const NAMED_FONTS: &[(&str, &str, i64, bool)] = &[
    ("TkDefaultFont", "DejaVu Sans", 9, false),
    ("TkTextFont", "DejaVu Sans", 9, false),
    ("TkFixedFont", "DejaVu Sans Mono", 9, false),
    ("TkMenuFont", "DejaVu Sans", 9, false),
    ("TkHeadingFont", "DejaVu Sans", 9, true),
    ("TkCaptionFont", "DejaVu Sans", 12, true),
    ("TkSmallCaptionFont", "DejaVu Sans", 8, false),
    ("TkIconFont", "DejaVu Sans", 9, false),
    ("TkTooltipFont", "DejaVu Sans", 8, false),
];

struct FontSpec {
    family: String,
    size: i64,
    bold: bool,
    italic: bool,
    underline: bool,
    overstrike: bool,
}

impl FontSpec {
    fn new(family: &str, size: i64) -> Self {
        let family = FAMILIES
            .iter()
            .find(|f| f.eq_ignore_ascii_case(family))
            .copied()
            .unwrap_or(FALLBACK_FAMILY);
        Self {
            family: family.to_owned(),
            size,
            bold: false,
            italic: false,
            underline: false,
            overstrike: false,
        }
    }

    /// A named font, `family ?size? ?style ...?` or `-option value ...`.
    fn resolve(spec: &str) -> Result<Self, String> {
        if let Some(&(_, family, size, bold)) = NAMED_FONTS.iter().find(|f| f.0 == spec) {
            let mut font = Self::new(family, size);
            font.bold = bold;
            return Ok(font);
        }
        let words = split_list(spec)?;
        match words.as_slice() {
            [] => Err("font \"\" doesn't exist".to_owned()),
            [first, ..] if first.starts_with('-') => Self::from_options(&words),
            [family, rest @ ..] => {
                let size = rest.first().map(|s| parse_int(s)).transpose()?.unwrap_or(DEFAULT_SIZE);
                let mut font = Self::new(family, size);
                for style in rest.iter().skip(1) {
                    match style.as_str() {
                        "normal" => font.bold = false,
                        "bold" => font.bold = true,
                        "roman" => font.italic = false,
                        "italic" => font.italic = true,
                        "underline" => font.underline = true,
                        "overstrike" => font.overstrike = true,
                        other => return Err(format!("unknown font style \"{other}\"")),
                    }
                }
                Ok(font)
            }
        }
    }

    fn from_options(words: &[String]) -> Result<Self, String> {
        if words.len() % 2 != 0 {
            return Err(format!("value for \"{}\" missing", words[words.len() - 1]));
        }
        let mut font = Self::new(FALLBACK_FAMILY, DEFAULT_SIZE);
        for pair in words.chunks(2) {
            let value = pair[1].as_str();
            match pair[0].as_str() {
                "-family" => font.family = Self::new(value, 0).family,
                "-size" => font.size = parse_int(value)?,
                "-weight" => font.bold = value == "bold",
                "-slant" => font.italic = value == "italic",
                "-underline" => font.underline = parse_bool(value)?,
                "-overstrike" => font.overstrike = parse_bool(value)?,
                other => return Err(format!("bad option \"{other}\"")),
            }
        }
        Ok(font)
    }

    fn options(&self) -> Vec<(&'static str, String)> {
        vec![
            ("-family", self.family.clone()),
            ("-size", self.size.to_string()),
            ("-weight", if self.bold { "bold" } else { "normal" }.to_owned()),
            ("-slant", if self.italic { "italic" } else { "roman" }.to_owned()),
            ("-underline", bool_word(self.underline)),
            ("-overstrike", bool_word(self.overstrike)),
        ]
    }

    /// Line height in pixels; negative sizes are already pixels.
    fn pixels(&self, scaling: f64) -> i64 {
        let px = if self.size < 0 {
            -self.size
        } else {
            ((self.size as f64) * scaling).round() as i64
        };
        px.max(1)
    }

    fn is_fixed(&self) -> bool {
        self.family.contains("Mono") || self.family == "Courier"
    }

    fn metrics(&self, scaling: f64) -> Vec<(&'static str, String)> {
        let ascent = self.pixels(scaling);
        let descent = (ascent + 3) / 4;
        vec![
            ("-ascent", ascent.to_string()),
            ("-descent", descent.to_string()),
            ("-linespace", (ascent + descent).to_string()),
            ("-fixed", bool_word(self.is_fixed())),
        ]
    }

    fn measure(&self, text: &str, scaling: f64) -> i64 {
        let mut advance = (self.pixels(scaling) * 3 + 2) / 5;
        if self.bold {
            advance += 1;
        }
        advance.max(1) * text.chars().count() as i64
    }
}

fn pick(pairs: Vec<(&'static str, String)>, option: Option<&String>) -> Outcome {
    match option {
        None => {
            let flat: Vec<&str> = pairs.iter().flat_map(|(k, v)| [*k, v.as_str()]).collect();
            Ok(join_list(&flat))
        }
        Some(option) => pairs
            .into_iter()
            .find(|(k, _)| *k == option.as_str())
            .map(|(_, v)| v)
            .ok_or_else(|| format!("bad option \"{option}\"")),
    }
}

/// `-displayof window` is accepted and ignored.
fn skip_displayof(args: &[String]) -> &[String] {
    match args {
        [flag, _window, rest @ ..] if flag == "-displayof" => rest,
        _ => args,
    }
}

/// `font families|names|actual|measure|metrics`.
pub(super) fn font(args: &[String], scaling: f64) -> Outcome {
    let Some((sub, rest)) = args.split_first() else {
        return wrong_args("font option ?arg?");
    };
    match sub.as_str() {
        "families" => Ok(join_list(FAMILIES)),
        "names" => {
            let names: Vec<&str> = NAMED_FONTS.iter().map(|f| f.0).collect();
            Ok(join_list(&names))
        }
        "actual" => match rest {
            [spec, tail @ ..] => match skip_displayof(tail) {
                [] => pick(FontSpec::resolve(spec)?.options(), None),
                [option] => pick(FontSpec::resolve(spec)?.options(), Some(option)),
                _ => wrong_args("font actual font ?-displayof window? ?option?"),
            },
            [] => wrong_args("font actual font ?-displayof window? ?option?"),
        },
        "measure" => match rest {
            [spec, tail @ ..] => match skip_displayof(tail) {
                [text] => Ok(FontSpec::resolve(spec)?.measure(text, scaling).to_string()),
                _ => wrong_args("font measure font ?-displayof window? text"),
            },
            [] => wrong_args("font measure font ?-displayof window? text"),
        },
        "metrics" => match rest {
            [spec, tail @ ..] => match skip_displayof(tail) {
                [] => pick(FontSpec::resolve(spec)?.metrics(scaling), None),
                [option] => pick(FontSpec::resolve(spec)?.metrics(scaling), Some(option)),
                _ => wrong_args("font metrics font ?-displayof window? ?option?"),
            },
            [] => wrong_args("font metrics font ?-displayof window? ?option?"),
        },
        other => Err(format!(
            "bad option \"{other}\": must be actual, families, measure, metrics, or names"
        )),
    }
}

// ── Images ────────────────────────────────────────────────────────────────────

pub(super) struct Photo {
    width: i64,
    height: i64,
}

/// Width and height from a PNG, GIF or PPM/PGM header.
fn sniff_size(data: &[u8]) -> Result<(i64, i64), String> {
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
    let unrecognized = || "couldn't recognize image data".to_owned();
    if data.starts_with(PNG) && data.len() >= 24 {
        let be = |at: usize| i64::from(u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]));
        return Ok((be(16), be(20)));
    }
    if (data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a")) && data.len() >= 10 {
        let le = |at: usize| i64::from(u16::from_le_bytes([data[at], data[at + 1]]));
        return Ok((le(6), le(8)));
    }
    if data.len() > 2 && data[0] == b'P' && matches!(data[1], b'2' | b'3' | b'5' | b'6') {
        // Header tokens are whitespace separated; `#` starts a comment line.
        let header = String::from_utf8_lossy(&data[2..data.len().min(512)]);
        let mut numbers = header
            .lines()
            .map(|l| l.split('#').next().unwrap_or(""))
            .flat_map(str::split_whitespace)
            .map(|t| t.parse::<i64>());
        if let (Some(Ok(w)), Some(Ok(h))) = (numbers.next(), numbers.next()) {
            return Ok((w, h));
        }
    }
    Err(unrecognized())
}

fn find_photo<'a>(i: &'a Interp, name: &str) -> Result<&'a Photo, String> {
    i.images.get(name).ok_or_else(|| format!("image \"{name}\" doesn't exist"))
}

fn create_photo(i: &mut Interp, args: &[String]) -> Outcome {
    let (name, options) = match args.split_first() {
        Some((name, rest)) if !name.starts_with('-') => (Some(name.clone()), rest),
        _ => (None, args),
    };
    if options.len() % 2 != 0 {
        return Err(format!("value for \"{}\" missing", options[options.len() - 1]));
    }
    let mut size = (0, 0);
    let mut explicit = (None, None);
    for pair in options.chunks(2) {
        let value = pair[1].as_str();
        match pair[0].as_str() {
            "-file" => {
                let bytes = std::fs::read(value).map_err(|e| {
                    format!("couldn't open \"{value}\": {}", e.to_string().to_lowercase())
                })?;
                size = sniff_size(&bytes)?;
            }
            "-data" => {
                let bytes = STANDARD.decode(value.trim()).map_err(|_| "couldn't recognize image data")?;
                size = sniff_size(&bytes)?;
            }
            "-width" => explicit.0 = Some(parse_int(value)?),
            "-height" => explicit.1 = Some(parse_int(value)?),
            "-format" | "-gamma" | "-palette" => {}
            other => return Err(format!("unknown option \"{other}\"")),
        }
    }
    let photo = Photo {
        width: explicit.0.unwrap_or(size.0),
        height: explicit.1.unwrap_or(size.1),
    };
    let name = name.unwrap_or_else(|| {
        i.next_image += 1;
        format!("image{}", i.next_image)
    });
    i.images.insert(name.clone(), photo);
    Ok(name)
}

/// `image create photo|width|height|type|names|delete`.
pub(super) fn image(i: &mut Interp, args: &[String]) -> Outcome {
    match args {
        [create, kind, rest @ ..] if create == "create" => {
            if kind != "photo" {
                return Err(format!("image type \"{kind}\" doesn't exist"));
            }
            create_photo(i, rest)
        }
        [sub, name] if sub == "width" => Ok(find_photo(i, name)?.width.to_string()),
        [sub, name] if sub == "height" => Ok(find_photo(i, name)?.height.to_string()),
        [sub, name] if sub == "type" => find_photo(i, name).map(|_| "photo".to_owned()),
        [sub] if sub == "names" => {
            let names: Vec<&str> = i.images.keys().map(String::as_str).collect();
            Ok(join_list(&names))
        }
        [sub, names @ ..] if sub == "delete" => {
            for name in names {
                find_photo(i, name)?;
                i.images.remove(name.as_str());
            }
            Ok(String::new())
        }
        [sub, ..] => Err(format!(
            "bad option \"{sub}\": must be create, delete, height, names, type, or width"
        )),
        [] => wrong_args("image option ?args?"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn png_header(w: u32, h: u32) -> Vec<u8> {
        let mut data = b"\x89PNG\r\n\x1a\n\0\0\0\x0dIHDR".to_vec();
        data.extend_from_slice(&w.to_be_bytes());
        data.extend_from_slice(&h.to_be_bytes());
        data
    }

    #[test]
    fn geometry_is_clamped_and_positioned() {
        let mut state = WmState::new("t".into());
        let none = BTreeMap::new();
        wm(&mut state, "minsize", &words(&["100", "50"]), &none).unwrap();
        wm(&mut state, "geometry", &words(&["40x400+10+20"]), &none).unwrap();
        assert_eq!(wm(&mut state, "geometry", &[], &none).unwrap(), "100x400+10+20");
        wm(&mut state, "geometry", &words(&["+-5+7"]), &none).unwrap();
        assert_eq!(state.pos, (-5, 7));
        assert!(wm(&mut state, "geometry", &words(&["big"]), &none).is_err());
    }

    #[test]
    fn attributes_are_normalised() {
        let mut state = WmState::new(String::new());
        let none = BTreeMap::new();
        wm(&mut state, "attributes", &words(&["-alpha", "2", "-topmost", "yes"]), &none).unwrap();
        assert_eq!(state.attribute("-alpha").unwrap(), "1.0");
        assert_eq!(state.attribute("-topmost").unwrap(), "1");
        assert!(wm(&mut state, "attributes", &words(&["-bogus", "1"]), &none).is_err());
    }

    #[test]
    fn font_specs_resolve() {
        let font = FontSpec::resolve("{dejavu sans mono} 12 bold italic").unwrap();
        assert_eq!(font.family, "DejaVu Sans Mono");
        assert_eq!((font.size, font.bold, font.italic), (12, true, true));
        assert!(font.is_fixed());
        assert_eq!(FontSpec::resolve("NoSuchFamily").unwrap().family, FALLBACK_FAMILY);
        assert!(FontSpec::resolve("Times 10 wobbly").is_err());
        let named = FontSpec::resolve("TkHeadingFont").unwrap();
        assert!(named.bold);
    }

    #[test]
    fn measure_scales_with_length() {
        let font = FontSpec::resolve("Helvetica 10").unwrap();
        let one = font.measure("ab", 1.0);
        assert!(one > 0);
        assert_eq!(font.measure("abcd", 1.0), 2 * one);
        assert_eq!(font.measure("", 1.0), 0);
    }

    #[test]
    fn sniffs_image_headers() {
        assert_eq!(sniff_size(&png_header(32, 16)).unwrap(), (32, 16));
        assert_eq!(sniff_size(b"GIF89a\x0a\x00\x05\x00rest").unwrap(), (10, 5));
        assert_eq!(sniff_size(b"P6\n# comment\n4 3\n255\n").unwrap(), (4, 3));
        assert!(sniff_size(b"not an image").is_err());
    }
}

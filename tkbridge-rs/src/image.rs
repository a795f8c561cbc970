//! Photo images.

use std::fmt;
use std::path::Path;
use std::rc::Rc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

use crate::error::Result;
use crate::interp::Interpreter;
use crate::quote::quote_string;

/// Creates photo images in the application's interpreter.
pub struct ImageFactory {
    interp: Rc<Interpreter>,
}

impl ImageFactory {
    pub(crate) fn new(interp: Rc<Interpreter>) -> Self {
        Self { interp }
    }

    /// Load a photo from an image file.
    pub fn from_file(&self, path: &Path) -> Result<Image> {
        let path = path.to_string_lossy();
        self.create(&format!("image create photo -file {}", quote_string(&path)))
    }

    /// Load a photo from encoded image bytes (PNG, GIF, PPM).
    pub fn from_bytes(&self, data: &[u8]) -> Result<Image> {
        let encoded = STANDARD.encode(data);
        self.create(&format!("image create photo -data {}", quote_string(&encoded)))
    }

    fn create(&self, script: &str) -> Result<Image> {
        let name = self.interp.eval(script)?;
        debug!(image = %name, "photo created");
        Ok(Image { interp: self.interp.clone(), name })
    }
}

/// A photo known to the interpreter by name.  Pass it wherever an image
/// option is expected.
#[derive(Clone)]
pub struct Image {
    interp: Rc<Interpreter>,
    name: String,
}

impl Image {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> Result<i64> {
        self.dimension("width")
    }

    pub fn height(&self) -> Result<i64> {
        self.dimension("height")
    }

    fn dimension(&self, which: &str) -> Result<i64> {
        self.interp.eval(&format!("image {which} {}", self.name))?;
        self.interp.get_int(self.interp.obj_result()?)
    }

    /// Free the image.  Widgets still showing it go blank.
    pub fn delete(self) -> Result<()> {
        self.interp.eval(&format!("image delete {}", self.name))?;
        Ok(())
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image").field("name", &self.name).finish()
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

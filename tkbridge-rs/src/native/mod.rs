//! Boundary with the native interpreter library.
//!
//! [`NativeApi`] lists the primitive operations the bridge needs from a
//! native library: interpreter lifecycle, script evaluation, object
//! construction and extraction, command registration and named variables.
//! Handles crossing the boundary are opaque copies ([`InterpPtr`],
//! [`ObjRef`]); a failing primitive leaves its message in the interpreter
//! result, the way Tcl does with `TCL_LEAVE_ERR_MSG`.
//!
//! | Backend            | Where the interpreter lives                        |
//! |--------------------|----------------------------------------------------|
//! | [`tcl::TclLibrary`] | Tcl/Tk shared libraries opened at runtime         |
//! | [`mini::MiniTcl`]   | in-process interpreter for a small Tcl/Tk subset  |

use std::fmt;
use std::rc::Rc;

use libc::c_int;

use crate::config::{Backend, Settings};
use crate::error::Result;

pub mod mini;
pub mod tcl;

/// Status returned by evaluation and most primitives.
pub type Status = c_int;

pub const TCL_OK: Status = 0;
pub const TCL_ERROR: Status = 1;
pub const TCL_RETURN: Status = 2;
pub const TCL_BREAK: Status = 3;
pub const TCL_CONTINUE: Status = 4;

/// `Tcl_DoOneEvent` flag: do not block when no event is pending.
pub const TCL_DONT_WAIT: c_int = 1 << 1;
/// `Tcl_DoOneEvent` flag: process every event source.
pub const TCL_ALL_EVENTS: c_int = !TCL_DONT_WAIT;

/// Opaque interpreter handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterpPtr(usize);

impl InterpPtr {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> usize {
        self.0
    }
}

/// Opaque native object handle.
///
/// Objects returned as results stay valid until the next evaluation on the
/// same interpreter; objects created by the codec are owned by whatever
/// native call consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(usize);

impl ObjRef {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{:x}", self.0)
    }
}

/// Host closure installed as a native command.
///
/// Receives the words after the command name; `Ok` becomes the command
/// result, `Err` becomes an error result carrying the message.
pub type CommandFn = Rc<dyn Fn(&[String]) -> std::result::Result<String, String>>;

/// Primitive operations of a native interpreter library.
pub trait NativeApi {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    fn create_interp(&self) -> Option<InterpPtr>;
    fn init_interp(&self, interp: InterpPtr) -> Status;
    /// Initialise the windowing toolkit on an initialised interpreter.
    fn init_toolkit(&self, interp: InterpPtr) -> Status;
    fn delete_interp(&self, interp: InterpPtr);

    fn eval(&self, interp: InterpPtr, script: &str) -> Status;
    fn obj_result(&self, interp: InterpPtr) -> ObjRef;
    /// Process at most one pending event; `true` when one was processed.
    fn do_one_event(&self, flags: c_int) -> bool;

    fn create_command(&self, interp: InterpPtr, name: &str, proc_: CommandFn) -> bool;
    /// Returns `0` on success and `-1` when no such command exists.
    fn delete_command(&self, interp: InterpPtr, name: &str) -> Status;

    fn get_var(&self, interp: InterpPtr, name: &str, index: Option<&str>) -> Option<ObjRef>;
    fn set_var(
        &self,
        interp: InterpPtr,
        name: &str,
        index: Option<&str>,
        value: ObjRef,
    ) -> Option<ObjRef>;
    fn unset_var(&self, interp: InterpPtr, name: &str, index: Option<&str>) -> Status;

    fn new_string_obj(&self, s: &str) -> ObjRef;
    fn new_int_obj(&self, n: i64) -> ObjRef;
    fn new_double_obj(&self, x: f64) -> ObjRef;
    fn new_boolean_obj(&self, b: bool) -> ObjRef;

    fn get_string(&self, obj: ObjRef) -> String;
    fn get_long(&self, interp: InterpPtr, obj: ObjRef) -> Option<i64>;
    fn get_boolean(&self, interp: InterpPtr, obj: ObjRef) -> Option<bool>;
    fn get_double(&self, interp: InterpPtr, obj: ObjRef) -> Option<f64>;

    fn list_length(&self, interp: InterpPtr, obj: ObjRef) -> Option<usize>;
    fn list_index(&self, interp: InterpPtr, obj: ObjRef, index: usize) -> Option<ObjRef>;
}

/// Open the backend selected by `settings`.
pub fn open(settings: &Settings) -> Result<Rc<dyn NativeApi>> {
    match settings.backend {
        // `puts` goes to stdout, as it would with the real library.
        Backend::Mini => Ok(Rc::new(mini::MiniTcl::new().with_echo(true))),
        Backend::Tcl => {
            let lib = tcl::TclLibrary::load(&settings.tcl_library(), &settings.tk_library())?;
            Ok(Rc::new(lib))
        }
    }
}

//! Tcl/Tk shared libraries opened at runtime.
//!
//! Every symbol is resolved once in [`TclLibrary::load`]; the copied function
//! pointers stay valid because the [`Library`] handles live in the same
//! struct and are dropped last (Tk before Tcl).
//!
//! Host commands go through one `extern "C"` trampoline.  The boxed
//! [`CommandFn`] is the command's client data and is freed by the delete
//! callback Tcl invokes when the command (or the whole interpreter) goes
//! away.  Host panics are caught at the boundary and reported as errors.

use std::ffi::{c_char, c_void, CString};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr;

use libc::c_int;
use libloading::Library;
use tracing::debug;

use super::{CommandFn, InterpPtr, NativeApi, ObjRef, Status, TCL_ERROR, TCL_OK};
use crate::error::{BridgeError, Result};

/// `TCL_LEAVE_ERR_MSG`: leave the failure message in the interpreter result.
const TCL_LEAVE_ERR_MSG: c_int = 0x200;

type RawInterp = *mut c_void;
type RawObj = *mut c_void;

type ObjCmdProc = unsafe extern "C" fn(*mut c_void, RawInterp, c_int, *const RawObj) -> c_int;
type CmdDeleteProc = unsafe extern "C" fn(*mut c_void);
type GetStringFn = unsafe extern "C" fn(RawObj, *mut c_int) -> *const c_char;
type NewStringFn = unsafe extern "C" fn(*const c_char, c_int) -> RawObj;
type SetResultFn = unsafe extern "C" fn(RawInterp, RawObj);

struct TclFns {
    find_executable: unsafe extern "C" fn(*const c_char),
    create_interp: unsafe extern "C" fn() -> RawInterp,
    init: unsafe extern "C" fn(RawInterp) -> c_int,
    delete_interp: unsafe extern "C" fn(RawInterp),
    eval_ex: unsafe extern "C" fn(RawInterp, *const c_char, c_int, c_int) -> c_int,
    get_obj_result: unsafe extern "C" fn(RawInterp) -> RawObj,
    set_obj_result: SetResultFn,
    do_one_event: unsafe extern "C" fn(c_int) -> c_int,
    create_obj_command: unsafe extern "C" fn(
        RawInterp,
        *const c_char,
        ObjCmdProc,
        *mut c_void,
        Option<CmdDeleteProc>,
    ) -> *mut c_void,
    delete_command: unsafe extern "C" fn(RawInterp, *const c_char) -> c_int,
    get_var2_ex: unsafe extern "C" fn(RawInterp, *const c_char, *const c_char, c_int) -> RawObj,
    set_var2_ex:
        unsafe extern "C" fn(RawInterp, *const c_char, *const c_char, RawObj, c_int) -> RawObj,
    unset_var2: unsafe extern "C" fn(RawInterp, *const c_char, *const c_char, c_int) -> c_int,
    new_string_obj: NewStringFn,
    new_wide_int_obj: unsafe extern "C" fn(i64) -> RawObj,
    new_double_obj: unsafe extern "C" fn(f64) -> RawObj,
    new_boolean_obj: unsafe extern "C" fn(c_int) -> RawObj,
    get_string_from_obj: GetStringFn,
    get_wide_int_from_obj: unsafe extern "C" fn(RawInterp, RawObj, *mut i64) -> c_int,
    get_boolean_from_obj: unsafe extern "C" fn(RawInterp, RawObj, *mut c_int) -> c_int,
    get_double_from_obj: unsafe extern "C" fn(RawInterp, RawObj, *mut f64) -> c_int,
    list_obj_length: unsafe extern "C" fn(RawInterp, RawObj, *mut c_int) -> c_int,
    list_obj_index: unsafe extern "C" fn(RawInterp, RawObj, c_int, *mut RawObj) -> c_int,
    tk_init: unsafe extern "C" fn(RawInterp) -> c_int,
}

/// Native API backed by the real Tcl and Tk libraries.
pub struct TclLibrary {
    fns: TclFns,
    _tk: Library,
    _tcl: Library,
}

/// Resolve `name` in `lib` and copy the function pointer out.
///
/// # Safety
/// `T` must match the C signature of the symbol.
unsafe fn symbol<T: Copy>(lib: &Library, path: &Path, name: &[u8]) -> Result<T> {
    lib.get::<T>(name)
        .map(|s| *s)
        .map_err(|source| BridgeError::Library { path: path.to_owned(), source })
}

impl TclLibrary {
    /// Open both libraries and resolve every primitive.
    pub fn load(tcl_path: &Path, tk_path: &Path) -> Result<Self> {
        debug!(tcl = %tcl_path.display(), tk = %tk_path.display(), "loading native libraries");
        // SAFETY: opening a shared library runs its initialisers; Tcl and Tk
        // have no initialisers with preconditions on the host.
        let tcl = unsafe { Library::new(tcl_path) }
            .map_err(|source| BridgeError::Library { path: tcl_path.to_owned(), source })?;
        let tk = unsafe { Library::new(tk_path) }
            .map_err(|source| BridgeError::Library { path: tk_path.to_owned(), source })?;

        // SAFETY: every type below mirrors the declaration in tcl.h / tk.h (8.6).
        let fns = unsafe {
            let p = tcl_path;
            TclFns {
                find_executable: symbol(&tcl, p, b"Tcl_FindExecutable\0")?,
                create_interp: symbol(&tcl, p, b"Tcl_CreateInterp\0")?,
                init: symbol(&tcl, p, b"Tcl_Init\0")?,
                delete_interp: symbol(&tcl, p, b"Tcl_DeleteInterp\0")?,
                eval_ex: symbol(&tcl, p, b"Tcl_EvalEx\0")?,
                get_obj_result: symbol(&tcl, p, b"Tcl_GetObjResult\0")?,
                set_obj_result: symbol(&tcl, p, b"Tcl_SetObjResult\0")?,
                do_one_event: symbol(&tcl, p, b"Tcl_DoOneEvent\0")?,
                create_obj_command: symbol(&tcl, p, b"Tcl_CreateObjCommand\0")?,
                delete_command: symbol(&tcl, p, b"Tcl_DeleteCommand\0")?,
                get_var2_ex: symbol(&tcl, p, b"Tcl_GetVar2Ex\0")?,
                set_var2_ex: symbol(&tcl, p, b"Tcl_SetVar2Ex\0")?,
                unset_var2: symbol(&tcl, p, b"Tcl_UnsetVar2\0")?,
                new_string_obj: symbol(&tcl, p, b"Tcl_NewStringObj\0")?,
                new_wide_int_obj: symbol(&tcl, p, b"Tcl_NewWideIntObj\0")?,
                new_double_obj: symbol(&tcl, p, b"Tcl_NewDoubleObj\0")?,
                new_boolean_obj: symbol(&tcl, p, b"Tcl_NewBooleanObj\0")?,
                get_string_from_obj: symbol(&tcl, p, b"Tcl_GetStringFromObj\0")?,
                get_wide_int_from_obj: symbol(&tcl, p, b"Tcl_GetWideIntFromObj\0")?,
                get_boolean_from_obj: symbol(&tcl, p, b"Tcl_GetBooleanFromObj\0")?,
                get_double_from_obj: symbol(&tcl, p, b"Tcl_GetDoubleFromObj\0")?,
                list_obj_length: symbol(&tcl, p, b"Tcl_ListObjLength\0")?,
                list_obj_index: symbol(&tcl, p, b"Tcl_ListObjIndex\0")?,
                tk_init: symbol(&tk, tk_path, b"Tk_Init\0")?,
            }
        };

        // Lets Tcl_Init locate its script library relative to the binary.
        unsafe { (fns.find_executable)(ptr::null()) };

        Ok(Self { fns, _tk: tk, _tcl: tcl })
    }

    fn raw(interp: InterpPtr) -> RawInterp {
        interp.as_raw() as RawInterp
    }

    fn obj(obj: ObjRef) -> RawObj {
        obj.as_raw() as RawObj
    }

    fn wrap(obj: RawObj) -> Option<ObjRef> {
        (!obj.is_null()).then(|| ObjRef::from_raw(obj as usize))
    }

    /// Put `msg` in the interpreter result so the session can report it.
    fn leave_message(&self, interp: InterpPtr, msg: &str) {
        unsafe {
            let obj = (self.fns.new_string_obj)(msg.as_ptr().cast(), msg.len() as c_int);
            (self.fns.set_obj_result)(Self::raw(interp), obj);
        }
    }

    fn c_name(&self, interp: InterpPtr, s: &str) -> Option<CString> {
        match CString::new(s) {
            Ok(c) => Some(c),
            Err(_) => {
                self.leave_message(interp, &format!("name contains NUL: {s:?}"));
                None
            }
        }
    }
}

/// Read the string representation of a Tcl object.
///
/// # Safety
/// `obj` must be a live Tcl object and `get` must be `Tcl_GetStringFromObj`.
unsafe fn obj_to_string(get: GetStringFn, obj: RawObj) -> String {
    if obj.is_null() {
        return String::new();
    }
    let mut len: c_int = 0;
    let ptr = get(obj, &mut len);
    if ptr.is_null() {
        return String::new();
    }
    let bytes = std::slice::from_raw_parts(ptr.cast::<u8>(), len.max(0) as usize);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Client data of every host command.
struct CommandSlot {
    proc_: CommandFn,
    get_string: GetStringFn,
    new_string: NewStringFn,
    set_result: SetResultFn,
}

unsafe extern "C" fn command_trampoline(
    client: *mut c_void,
    interp: RawInterp,
    objc: c_int,
    objv: *const RawObj,
) -> c_int {
    // Copy everything out of the slot first: the callback may delete its own
    // command, which frees the slot before we return.
    let (proc_, get_string, new_string, set_result) = {
        let slot = &*(client as *const CommandSlot);
        (slot.proc_.clone(), slot.get_string, slot.new_string, slot.set_result)
    };
    let args: Vec<String> = (1..objc.max(0) as usize)
        .map(|i| obj_to_string(get_string, *objv.add(i)))
        .collect();

    let (status, text) = match panic::catch_unwind(AssertUnwindSafe(|| proc_(&args))) {
        Ok(Ok(result)) => (TCL_OK, result),
        Ok(Err(message)) => (TCL_ERROR, message),
        Err(_) => (TCL_ERROR, "host command panicked".to_owned()),
    };
    let obj = new_string(text.as_ptr().cast(), text.len() as c_int);
    set_result(interp, obj);
    status
}

unsafe extern "C" fn command_delete(client: *mut c_void) {
    drop(Box::from_raw(client as *mut CommandSlot));
}

impl NativeApi for TclLibrary {
    fn name(&self) -> &str {
        "tcl"
    }

    fn create_interp(&self) -> Option<InterpPtr> {
        let raw = unsafe { (self.fns.create_interp)() };
        (!raw.is_null()).then(|| InterpPtr::from_raw(raw as usize))
    }

    fn init_interp(&self, interp: InterpPtr) -> Status {
        unsafe { (self.fns.init)(Self::raw(interp)) }
    }

    fn init_toolkit(&self, interp: InterpPtr) -> Status {
        unsafe { (self.fns.tk_init)(Self::raw(interp)) }
    }

    fn delete_interp(&self, interp: InterpPtr) {
        unsafe { (self.fns.delete_interp)(Self::raw(interp)) }
    }

    fn eval(&self, interp: InterpPtr, script: &str) -> Status {
        unsafe {
            (self.fns.eval_ex)(
                Self::raw(interp),
                script.as_ptr().cast(),
                script.len() as c_int,
                0,
            )
        }
    }

    fn obj_result(&self, interp: InterpPtr) -> ObjRef {
        let obj = unsafe { (self.fns.get_obj_result)(Self::raw(interp)) };
        ObjRef::from_raw(obj as usize)
    }

    fn do_one_event(&self, flags: c_int) -> bool {
        unsafe { (self.fns.do_one_event)(flags) != 0 }
    }

    fn create_command(&self, interp: InterpPtr, name: &str, proc_: CommandFn) -> bool {
        let Some(c_name) = self.c_name(interp, name) else { return false };
        let slot = Box::new(CommandSlot {
            proc_,
            get_string: self.fns.get_string_from_obj,
            new_string: self.fns.new_string_obj,
            set_result: self.fns.set_obj_result,
        });
        let client = Box::into_raw(slot).cast::<c_void>();
        let token = unsafe {
            (self.fns.create_obj_command)(
                Self::raw(interp),
                c_name.as_ptr(),
                command_trampoline,
                client,
                Some(command_delete),
            )
        };
        if token.is_null() {
            // Tcl never took ownership.
            unsafe { command_delete(client) };
            return false;
        }
        true
    }

    fn delete_command(&self, interp: InterpPtr, name: &str) -> Status {
        let Some(c_name) = self.c_name(interp, name) else { return -1 };
        unsafe { (self.fns.delete_command)(Self::raw(interp), c_name.as_ptr()) }
    }

    fn get_var(&self, interp: InterpPtr, name: &str, index: Option<&str>) -> Option<ObjRef> {
        let part1 = self.c_name(interp, name)?;
        let part2 = match index {
            Some(i) => Some(self.c_name(interp, i)?),
            None => None,
        };
        let obj = unsafe {
            (self.fns.get_var2_ex)(
                Self::raw(interp),
                part1.as_ptr(),
                part2.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
                TCL_LEAVE_ERR_MSG,
            )
        };
        Self::wrap(obj)
    }

    fn set_var(
        &self,
        interp: InterpPtr,
        name: &str,
        index: Option<&str>,
        value: ObjRef,
    ) -> Option<ObjRef> {
        let part1 = self.c_name(interp, name)?;
        let part2 = match index {
            Some(i) => Some(self.c_name(interp, i)?),
            None => None,
        };
        let obj = unsafe {
            (self.fns.set_var2_ex)(
                Self::raw(interp),
                part1.as_ptr(),
                part2.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
                Self::obj(value),
                TCL_LEAVE_ERR_MSG,
            )
        };
        Self::wrap(obj)
    }

    fn unset_var(&self, interp: InterpPtr, name: &str, index: Option<&str>) -> Status {
        let Some(part1) = self.c_name(interp, name) else { return TCL_ERROR };
        let part2 = match index {
            Some(i) => match self.c_name(interp, i) {
                Some(c) => Some(c),
                None => return TCL_ERROR,
            },
            None => None,
        };
        unsafe {
            (self.fns.unset_var2)(
                Self::raw(interp),
                part1.as_ptr(),
                part2.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
                TCL_LEAVE_ERR_MSG,
            )
        }
    }

    fn new_string_obj(&self, s: &str) -> ObjRef {
        let obj = unsafe { (self.fns.new_string_obj)(s.as_ptr().cast(), s.len() as c_int) };
        ObjRef::from_raw(obj as usize)
    }

    fn new_int_obj(&self, n: i64) -> ObjRef {
        ObjRef::from_raw(unsafe { (self.fns.new_wide_int_obj)(n) } as usize)
    }

    fn new_double_obj(&self, x: f64) -> ObjRef {
        ObjRef::from_raw(unsafe { (self.fns.new_double_obj)(x) } as usize)
    }

    fn new_boolean_obj(&self, b: bool) -> ObjRef {
        ObjRef::from_raw(unsafe { (self.fns.new_boolean_obj)(c_int::from(b)) } as usize)
    }

    fn get_string(&self, obj: ObjRef) -> String {
        unsafe { obj_to_string(self.fns.get_string_from_obj, Self::obj(obj)) }
    }

    fn get_long(&self, interp: InterpPtr, obj: ObjRef) -> Option<i64> {
        let mut out: i64 = 0;
        let status = unsafe {
            (self.fns.get_wide_int_from_obj)(Self::raw(interp), Self::obj(obj), &mut out)
        };
        (status == TCL_OK).then_some(out)
    }

    fn get_boolean(&self, interp: InterpPtr, obj: ObjRef) -> Option<bool> {
        let mut out: c_int = 0;
        let status = unsafe {
            (self.fns.get_boolean_from_obj)(Self::raw(interp), Self::obj(obj), &mut out)
        };
        (status == TCL_OK).then_some(out != 0)
    }

    fn get_double(&self, interp: InterpPtr, obj: ObjRef) -> Option<f64> {
        let mut out: f64 = 0.0;
        let status = unsafe {
            (self.fns.get_double_from_obj)(Self::raw(interp), Self::obj(obj), &mut out)
        };
        (status == TCL_OK).then_some(out)
    }

    fn list_length(&self, interp: InterpPtr, obj: ObjRef) -> Option<usize> {
        let mut len: c_int = 0;
        let status =
            unsafe { (self.fns.list_obj_length)(Self::raw(interp), Self::obj(obj), &mut len) };
        (status == TCL_OK).then_some(len.max(0) as usize)
    }

    fn list_index(&self, interp: InterpPtr, obj: ObjRef, index: usize) -> Option<ObjRef> {
        let mut elem: RawObj = ptr::null_mut();
        let status = unsafe {
            (self.fns.list_obj_index)(
                Self::raw(interp),
                Self::obj(obj),
                index as c_int,
                &mut elem,
            )
        };
        if status != TCL_OK {
            return None;
        }
        Self::wrap(elem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_is_a_library_error() {
        let err = TclLibrary::load(
            Path::new("/nonexistent/libtcl-missing.so"),
            Path::new("/nonexistent/libtk-missing.so"),
        )
        .err()
        .expect("load must fail");
        match err {
            BridgeError::Library { path, .. } => {
                assert_eq!(path, Path::new("/nonexistent/libtcl-missing.so"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}

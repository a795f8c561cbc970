//! Scalar marshaling between [`Value`] and native objects.
//!
//! Encoding is total for scalars and refuses composites.  Decoding never
//! guesses: the caller names the kind it expects through [`FromNative`].

use crate::error::{BridgeError, Result};
use crate::native::{InterpPtr, NativeApi, ObjRef};
use crate::value::Value;

/// Build the native object for `value`.
///
/// `Empty` becomes the empty string object and a `Handle` is returned as is.
pub fn encode(api: &dyn NativeApi, value: &Value) -> Result<ObjRef> {
    Ok(match value {
        Value::Empty => api.new_string_obj(""),
        Value::Str(s) => api.new_string_obj(s),
        Value::Int(n) => api.new_int_obj(*n),
        Value::Float(x) => api.new_double_obj(*x),
        Value::Bool(b) => api.new_boolean_obj(*b),
        Value::Handle(obj) => *obj,
        Value::List(_) => return Err(BridgeError::Composite(value.to_string())),
    })
}

/// A host type that can be extracted from a native object.
pub trait FromNative: Sized {
    /// Kind named in conversion errors.
    const KIND: &'static str;

    fn from_native(api: &dyn NativeApi, interp: InterpPtr, obj: ObjRef) -> Option<Self>;
}

impl FromNative for i64 {
    const KIND: &'static str = "integer";

    fn from_native(api: &dyn NativeApi, interp: InterpPtr, obj: ObjRef) -> Option<Self> {
        api.get_long(interp, obj)
    }
}

impl FromNative for bool {
    const KIND: &'static str = "boolean";

    fn from_native(api: &dyn NativeApi, interp: InterpPtr, obj: ObjRef) -> Option<Self> {
        api.get_boolean(interp, obj)
    }
}

impl FromNative for f64 {
    const KIND: &'static str = "float";

    fn from_native(api: &dyn NativeApi, interp: InterpPtr, obj: ObjRef) -> Option<Self> {
        api.get_double(interp, obj)
    }
}

impl FromNative for String {
    const KIND: &'static str = "string";

    fn from_native(api: &dyn NativeApi, _interp: InterpPtr, obj: ObjRef) -> Option<Self> {
        Some(api.get_string(obj))
    }
}

/// Extract a `T`, reporting the object's string form on failure.
pub fn decode<T: FromNative>(api: &dyn NativeApi, interp: InterpPtr, obj: ObjRef) -> Result<T> {
    T::from_native(api, interp, obj).ok_or_else(|| BridgeError::Conversion {
        kind: T::KIND,
        source_repr: api.get_string(obj),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::mini::MiniTcl;

    fn setup() -> (MiniTcl, InterpPtr) {
        let api = MiniTcl::new();
        let interp = api.create_interp().unwrap();
        (api, interp)
    }

    #[test]
    fn scalars_encode_to_their_string_form() {
        let (api, _) = setup();
        let cases = [
            (Value::from("hi there"), "hi there"),
            (Value::Int(-3), "-3"),
            (Value::Float(2.0), "2.0"),
            (Value::Bool(true), "1"),
            (Value::Empty, ""),
        ];
        for (value, expected) in cases {
            let obj = encode(&api, &value).unwrap();
            assert_eq!(api.get_string(obj), expected, "{value:?}");
        }
    }

    #[test]
    fn handle_passes_through() {
        let (api, _) = setup();
        let obj = api.new_string_obj("x");
        assert_eq!(encode(&api, &Value::Handle(obj)).unwrap(), obj);
    }

    #[test]
    fn composite_is_refused() {
        let (api, _) = setup();
        let err = encode(&api, &Value::from(vec!["a", "b"])).unwrap_err();
        assert!(matches!(err, BridgeError::Composite(_)));
        assert!(err.is_conversion());
    }

    #[test]
    fn decode_requested_kind() {
        let (api, interp) = setup();
        let obj = api.new_string_obj("12");
        assert_eq!(decode::<i64>(&api, interp, obj).unwrap(), 12);
        assert_eq!(decode::<f64>(&api, interp, obj).unwrap(), 12.0);
        assert!(decode::<bool>(&api, interp, obj).unwrap());
        assert_eq!(decode::<String>(&api, interp, obj).unwrap(), "12");
    }

    #[test]
    fn decode_failure_names_kind_and_source() {
        let (api, interp) = setup();
        let obj = api.new_string_obj("abc");
        match decode::<i64>(&api, interp, obj).unwrap_err() {
            BridgeError::Conversion { kind, source_repr } => {
                assert_eq!(kind, "integer");
                assert_eq!(source_repr, "abc");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}

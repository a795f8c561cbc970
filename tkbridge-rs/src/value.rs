//! Host-side value type handed to the bridge.
//!
//! The scalar variants mirror what the native library can build directly
//! (string, integer, float, boolean, an already-native object, empty).
//! [`Value::List`] only exists so a sequence can be passed as one script
//! argument; the codec refuses it because a list has no single native object
//! counterpart until it has been serialized to list syntax by the caller.

use std::fmt;

use crate::native::ObjRef;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Empty,
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// An object that already lives on the native side.
    Handle(ObjRef),
    List(Vec<Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Empty
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Str(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            Value::Handle(obj) => write!(f, "{obj}"),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

/// Render a float the way the interpreter does: integral values keep one
/// decimal so they still read back as floats.
pub fn format_float(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

impl Value {
    /// Name of the variant, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Str(_) => "string",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::Handle(_) => "object",
            Value::List(_) => "list",
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Value::List(_))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Str(s.clone())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<ObjRef> for Value {
    fn from(obj: ObjRef) -> Self {
        Value::Handle(obj)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Empty, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// Build a `Vec<Value>` from heterogeneous script arguments.
///
/// ```
/// use tkbridge::{script_args, Value};
/// let args = script_args!["set", "x", 5];
/// assert_eq!(args, vec![Value::from("set"), Value::from("x"), Value::Int(5)]);
/// ```
#[macro_export]
macro_rules! script_args {
    ($($arg:expr),* $(,)?) => {
        vec![$($crate::Value::from($arg)),*]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_scalars() {
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(3.25).to_string(), "3.25");
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::Bool(false).to_string(), "0");
        assert_eq!(Value::Empty.to_string(), "");
    }

    #[test]
    fn display_list_is_space_joined() {
        let v: Value = vec!["a", "b c", "d"].into();
        assert_eq!(v.to_string(), "a b c d");
        assert!(v.is_composite());
    }

    #[test]
    fn option_none_is_empty() {
        let v: Value = Option::<i64>::None.into();
        assert_eq!(v, Value::Empty);
        let v: Value = Some(3i64).into();
        assert_eq!(v, Value::Int(3));
    }

    #[test]
    fn kinds() {
        assert_eq!(Value::from("x").kind(), "string");
        assert_eq!(Value::from(1.5).kind(), "float");
        assert_eq!(Value::from(vec![1i64]).kind(), "list");
    }

    #[test]
    fn script_args_macro() {
        let args = script_args!["wm", "title", ".", 2.5, true];
        assert_eq!(args.len(), 5);
        assert_eq!(args[3], Value::Float(2.5));
        assert_eq!(args[4], Value::Bool(true));
    }
}

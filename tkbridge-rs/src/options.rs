//! Typed option records.
//!
//! Widget constructors take `-key value` pairs.  Rather than accepting any
//! key at runtime, each widget kind declares its recognised keys once with
//! [`options!`](crate::options!) and gets a plain struct with one
//! `Option<T>` field per key:
//!
//! ```
//! use tkbridge::options;
//!
//! options! {
//!     pub struct ButtonOptions {
//!         text: String,
//!         width: i64,
//!     }
//! }
//!
//! let opts = ButtonOptions::default().text("Go").width(8);
//! assert_eq!(ButtonOptions::KEYS, &["text", "width"]);
//! assert_eq!(tkbridge::quote::compose(&opts.to_args()), "-text Go -width 8");
//! ```
//!
//! Keys set through [`set`](ToplevelOptions::set) at runtime are checked
//! against the same list; an unknown key is [`BridgeError::UnknownOption`].

use crate::error::{BridgeError, Result};
use crate::value::Value;

/// A type an option field can hold.
pub trait OptionValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
    fn to_value(&self) -> Value;
}

fn mismatch(kind: &'static str, value: &Value) -> BridgeError {
    BridgeError::Conversion { kind, source_repr: value.to_string() }
}

impl OptionValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Str(s) => Ok(s),
            Value::Empty => Ok(String::new()),
            Value::Int(_) | Value::Float(_) | Value::Bool(_) => Ok(value.to_string()),
            other => Err(mismatch("string", &other)),
        }
    }

    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }
}

impl OptionValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Int(n) => Ok(*n),
            Value::Str(s) => s.trim().parse().map_err(|_| mismatch("integer", &value)),
            _ => Err(mismatch("integer", &value)),
        }
    }

    fn to_value(&self) -> Value {
        Value::Int(*self)
    }
}

impl OptionValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Float(x) => Ok(*x),
            Value::Int(n) => Ok(*n as f64),
            Value::Str(s) => s.trim().parse().map_err(|_| mismatch("float", &value)),
            _ => Err(mismatch("float", &value)),
        }
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl OptionValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Bool(b) => Ok(*b),
            Value::Int(n) => Ok(*n != 0),
            Value::Str(s) => match s.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(mismatch("boolean", &value)),
            },
            _ => Err(mismatch("boolean", &value)),
        }
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

/// Declare an option record.
///
/// Generates the struct (deriving `Debug`, `Clone`, `Default`, `PartialEq`),
/// a builder method named after each key, `KEYS`, `set` and `to_args`.
#[macro_export]
macro_rules! options {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$fmeta:meta])* $key:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        $vis struct $name {
            $( $(#[$fmeta])* pub $key: ::std::option::Option<$ty>, )*
        }

        impl $name {
            /// Recognised keys, in declaration order.
            pub const KEYS: &'static [&'static str] = &[$(stringify!($key)),*];

            $(
                pub fn $key(mut self, value: impl ::std::convert::Into<$ty>) -> Self {
                    self.$key = ::std::option::Option::Some(value.into());
                    self
                }
            )*

            /// Set a key by name; a leading `-` is accepted.
            pub fn set(&mut self, key: &str, value: $crate::Value) -> $crate::Result<()> {
                let bare = key.strip_prefix('-').unwrap_or(key);
                match bare {
                    $(
                        stringify!($key) => {
                            let v = <$ty as $crate::options::OptionValue>::from_value(value)?;
                            self.$key = ::std::option::Option::Some(v);
                            Ok(())
                        }
                    )*
                    _ => Err($crate::BridgeError::UnknownOption {
                        record: stringify!($name),
                        key: key.to_owned(),
                    }),
                }
            }

            /// `-key value` pairs for every key that has been set.
            pub fn to_args(&self) -> ::std::vec::Vec<$crate::Value> {
                #[allow(unused_mut)]
                let mut args = ::std::vec::Vec::new();
                $(
                    if let ::std::option::Option::Some(v) = &self.$key {
                        args.push($crate::Value::Str($crate::quote::str_to_option(stringify!($key))));
                        args.push($crate::options::OptionValue::to_value(v));
                    }
                )*
                args
            }
        }
    };
}

options! {
    /// Options accepted by [`Application::create_toplevel`](crate::app::Application::create_toplevel).
    pub struct ToplevelOptions {
        background: String,
        width: i64,
        height: i64,
        padx: i64,
        pady: i64,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::compose;

    options! {
        struct Probe {
            label: String,
            ratio: f64,
            visible: bool,
        }
    }

    #[test]
    fn builder_sets_only_named_keys() {
        let opts = ToplevelOptions::default().width(200).background("#fff");
        assert_eq!(opts.width, Some(200));
        assert_eq!(opts.height, None);
        assert_eq!(compose(&opts.to_args()), "-background #fff -width 200");
    }

    #[test]
    fn empty_record_has_no_args() {
        assert!(ToplevelOptions::default().to_args().is_empty());
    }

    #[test]
    fn set_by_name_with_or_without_dash() {
        let mut opts = ToplevelOptions::default();
        opts.set("padx", Value::Int(4)).unwrap();
        opts.set("-pady", Value::from("6")).unwrap();
        assert_eq!((opts.padx, opts.pady), (Some(4), Some(6)));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut opts = ToplevelOptions::default();
        match opts.set("colour", Value::from("red")).unwrap_err() {
            BridgeError::UnknownOption { record, key } => {
                assert_eq!(record, "ToplevelOptions");
                assert_eq!(key, "colour");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(opts, ToplevelOptions::default());
    }

    #[test]
    fn wrong_type_is_a_conversion_error() {
        let mut opts = ToplevelOptions::default();
        assert!(opts.set("width", Value::from("wide")).unwrap_err().is_conversion());
        let mut probe = Probe::default();
        assert!(probe.set("visible", Value::from("maybe")).unwrap_err().is_conversion());
    }

    #[test]
    fn values_render_like_script_words() {
        let mut probe = Probe::default().label("two words").ratio(2);
        probe.set("visible", Value::from("yes")).unwrap();
        assert_eq!(Probe::KEYS, &["label", "ratio", "visible"]);
        assert_eq!(compose(&probe.to_args()), "-label {two words} -ratio 2.0 -visible 1");
    }
}

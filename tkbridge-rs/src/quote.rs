//! Script quoting.
//!
//! Host code composes instructions from heterogeneous arguments; these helpers
//! decide how each argument is written into the script so the interpreter sees
//! it as one word.

use crate::value::Value;

/// Wrap `s` in one pair of braces, suppressing every substitution inside.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('{');
    out.push_str(s);
    out.push('}');
    out
}

/// Quote a single string argument.
///
/// * A leading `"`, `'`, `{` or `[` means the caller already quoted it.
/// * Without whitespace the string is already one word.
/// * Otherwise it is braced exactly once.
///
/// The empty string becomes `{}` so it still counts as a word.
pub fn enclose_str(s: &str) -> String {
    match s.chars().next() {
        None => "{}".to_owned(),
        Some('"' | '\'' | '{' | '[') => s.to_owned(),
        Some(_) if !s.contains(char::is_whitespace) => s.to_owned(),
        Some(_) => quote_string(s),
    }
}

/// Quote one argument of any kind.
///
/// Lists are joined with single spaces and braced as a whole; their
/// elements are not quoted individually.  `Empty` is the empty word `{}`.
pub fn enclose_arg(arg: &Value) -> String {
    match arg {
        Value::Empty => "{}".to_owned(),
        Value::Str(s) => enclose_str(s),
        Value::List(_) => quote_string(&arg.to_string()),
        other => other.to_string(),
    }
}

/// Join arguments into one instruction.
pub fn compose(args: &[Value]) -> String {
    args.iter().map(enclose_arg).collect::<Vec<_>>().join(" ")
}

/// Serialize a sequence to list syntax, bracing every element.
pub fn array_to_list<T: ToString>(items: &[T]) -> String {
    let inner: Vec<String> = items.iter().map(|i| quote_string(&i.to_string())).collect();
    quote_string(&inner.join(" "))
}

/// `Title` → `-title`.
pub fn str_to_option(name: &str) -> String {
    format!("-{}", name.to_lowercase())
}

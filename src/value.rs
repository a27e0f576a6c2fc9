use std::{collections::HashMap, sync::Arc};

type NativeFn = dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync;

/// A host function callable from expressions.
///
/// Functions receive their positional arguments and report failure as a plain
/// message; the evaluator wraps it into [`crate::Error::Call`].
#[derive(Clone)]
pub struct Function(Arc<NativeFn>);

impl Function {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, String> {
        (self.0)(args)
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<function>")
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

/// The runtime value domain of the expression language.
///
/// Derived equality is strict equality (`===`): `NaN` differs from itself,
/// containers compare structurally, functions by identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Mapping(HashMap<String, Value>),
    Callable(Function),
}

impl Value {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        Value::Callable(Function::new(f))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Undefined => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Mapping(_) | Value::Callable(_) => true,
        }
    }

    /// The tag `typeof` reports.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Callable(_) => "function",
            Value::Null | Value::Array(_) | Value::Mapping(_) => "object",
        }
    }

    /// A finer-grained name than `typeof`, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Array(_) => "an array",
            Value::Mapping(_) => "an object",
            Value::Callable(_) => "a function",
            other => other.type_of(),
        }
    }

    /// Numeric conversion for primitives; containers and functions have none.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Null => Some(0.0),
            Value::Undefined => Some(f64::NAN),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Some(*n),
            Value::String(s) => Some(string_to_number(s)),
            Value::Array(_) | Value::Mapping(_) | Value::Callable(_) => None,
        }
    }

    /// Abstract (`==`) equality over primitives. A container never loosely
    /// equals a primitive.
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null | Value::Undefined, Value::Null | Value::Undefined) => true,
            (Value::Null | Value::Undefined, _) | (_, Value::Null | Value::Undefined) => false,
            (Value::Number(a), Value::String(b)) => *a == string_to_number(b),
            (Value::String(a), Value::Number(b)) => string_to_number(a) == *b,
            (Value::Bool(a), _) => Value::Number(bool_to_number(*a)).loose_equals(other),
            (_, Value::Bool(b)) => self.loose_equals(&Value::Number(bool_to_number(*b))),
            _ => self == other,
        }
    }

    /// Reads a property or element. Only own entries of mappings, array
    /// elements, string characters and `length` are reachable.
    ///
    /// Strings are measured and indexed in UTF-16 code units. A lone
    /// surrogate reads as U+FFFD.
    pub(crate) fn member(&self, key: &Value) -> Result<Value, String> {
        let name = key.to_string();
        match self {
            Value::Null | Value::Undefined => {
                Err(format!("cannot read property '{name}' of {self}"))
            }
            Value::Mapping(map) => Ok(map.get(&name).cloned().unwrap_or(Value::Undefined)),
            Value::Array(items) => Ok(if name == "length" {
                Value::Number(items.len() as f64)
            } else {
                index_of(&name)
                    .and_then(|i| items.get(i))
                    .cloned()
                    .unwrap_or(Value::Undefined)
            }),
            Value::String(s) => Ok(if name == "length" {
                Value::Number(s.encode_utf16().count() as f64)
            } else {
                index_of(&name)
                    .and_then(|i| s.encode_utf16().nth(i))
                    .map(|unit| Value::String(String::from_utf16_lossy(&[unit])))
                    .unwrap_or(Value::Undefined)
            }),
            Value::Bool(_) | Value::Number(_) | Value::Callable(_) => Ok(Value::Undefined),
        }
    }
}

fn bool_to_number(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Canonical array index: `"3"` is one, `"03"` and `"3.0"` are not.
fn index_of(name: &str) -> Option<usize> {
    let index = name.parse::<usize>().ok()?;
    (index.to_string() == name).then_some(index)
}

pub(crate) fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    match s {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if s.chars().all(|c| matches!(c, '0'..='9' | '.' | 'e' | 'E' | '+' | '-')) => {
            s.parse().unwrap_or(f64::NAN)
        }
        _ => f64::NAN,
    }
}

pub(crate) fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

pub(crate) fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4294967296.0) as u32
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

/// JS `ToString`.
impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Undefined => write!(f, "undefined"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{s}"),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    match item {
                        Value::Null | Value::Undefined => {}
                        item => write!(f, "{item}")?,
                    }
                }
                Ok(())
            }
            Value::Mapping(_) => write!(f, "[object Object]"),
            Value::Callable(_) => write!(f, "function"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(map: HashMap<String, Value>) -> Self {
        Value::Mapping(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Mapping(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
        assert!(Value::Mapping(HashMap::new()).is_truthy());
    }

    #[test]
    fn test_type_of() {
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::Undefined.type_of(), "undefined");
        assert_eq!(Value::from(1).type_of(), "number");
        assert_eq!(Value::from("s").type_of(), "string");
        assert_eq!(Value::function(|_| Ok(Value::Null)).type_of(), "function");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("1e3"), 1000.0);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("12px").is_nan());
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
    }

    #[test]
    fn test_int32_wraps() {
        assert_eq!(to_int32(2147483648.0), -2147483648);
        assert_eq!(to_int32(-1.5), -1);
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_uint32(-1.0), 4294967295);
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.loose_equals(&Value::from(0)));
        assert!(Value::from(3).loose_equals(&Value::from("3")));
        assert!(Value::Bool(true).loose_equals(&Value::from(1)));
        assert!(Value::from("1").loose_equals(&Value::Bool(true)));
        assert!(!Value::Array(vec![]).loose_equals(&Value::from("")));
        assert!(!Value::Number(f64::NAN).loose_equals(&Value::Number(f64::NAN)));
    }

    #[test]
    fn test_display_follows_js_to_string() {
        assert_eq!(Value::from(3).to_string(), "3");
        assert_eq!(Value::from(-0.5).to_string(), "-0.5");
        assert_eq!(Value::Number(f64::INFINITY).to_string(), "Infinity");
        assert_eq!(Value::Number(1e20).to_string(), "100000000000000000000");
        assert_eq!(
            Value::Array(vec![Value::from(1), Value::Null, Value::from("a")]).to_string(),
            "1,,a"
        );
        assert_eq!(Value::Mapping(HashMap::new()).to_string(), "[object Object]");
    }

    #[test]
    fn test_member_access() {
        let obj = Value::from(serde_json::json!({"color": "green", "list": [1, 2]}));
        assert_eq!(obj.member(&Value::from("color")), Ok(Value::from("green")));
        assert_eq!(obj.member(&Value::from("constructor")), Ok(Value::Undefined));

        let list = Value::Array(vec![Value::from(10), Value::from(20)]);
        assert_eq!(list.member(&Value::from(1)), Ok(Value::from(20)));
        assert_eq!(list.member(&Value::from("length")), Ok(Value::from(2)));
        assert_eq!(list.member(&Value::from(1.5)), Ok(Value::Undefined));

        assert_eq!(Value::from("abc").member(&Value::from(2)), Ok(Value::from("c")));
        assert!(Value::Null.member(&Value::from("x")).is_err());
    }

    #[test]
    fn test_strings_count_utf16_units() {
        let length = Value::from("length");
        assert_eq!(Value::from("😀").member(&length), Ok(Value::from(2)));
        assert_eq!(Value::from("héllo").member(&length), Ok(Value::from(5)));
        assert_eq!(Value::from("a😀b").member(&Value::from(3)), Ok(Value::from("b")));
        assert_eq!(
            Value::from("😀").member(&Value::from(0)),
            Ok(Value::from("\u{FFFD}"))
        );
        assert_eq!(Value::from("😀").member(&Value::from(2)), Ok(Value::Undefined));
    }

    #[test]
    fn test_functions_compare_by_identity() {
        let f = Function::new(|_| Ok(Value::Null));
        let g = Function::new(|_| Ok(Value::Null));
        assert_eq!(f, f.clone());
        assert_ne!(f, g);
    }
}

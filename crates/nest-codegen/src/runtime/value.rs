//! Constant-pool values.
//!
//! Only the object kinds that can appear as literals or as assembled
//! functions live here; containers and iterators belong to the VM.

use super::function::Function;
use std::fmt;
use std::sync::Arc;

/// The built-in types of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// The type of types
    Type,
    /// 64-bit signed integer
    Int,
    /// 64-bit float
    Real,
    /// `true` or `false`
    Bool,
    /// The type of `null`
    Null,
    /// Immutable string
    Str,
    /// Fixed-size sequence
    Array,
    /// Growable sequence
    Vector,
    /// Hash map
    Map,
    /// Function
    Func,
    /// Iterator
    Iter,
    /// Unsigned 8-bit integer
    Byte,
    /// File handle
    IOFile,
}

impl Type {
    /// Every built-in type, in declaration order.
    pub const ALL: [Type; 13] = [
        Type::Type,
        Type::Int,
        Type::Real,
        Type::Bool,
        Type::Null,
        Type::Str,
        Type::Array,
        Type::Vector,
        Type::Map,
        Type::Func,
        Type::Iter,
        Type::Byte,
        Type::IOFile,
    ];

    /// Returns the name the type is bound to in the global scope.
    pub fn name(self) -> &'static str {
        match self {
            Type::Type => "Type",
            Type::Int => "Int",
            Type::Real => "Real",
            Type::Bool => "Bool",
            Type::Null => "Null",
            Type::Str => "Str",
            Type::Array => "Array",
            Type::Vector => "Vector",
            Type::Map => "Map",
            Type::Func => "Func",
            Type::Iter => "Iter",
            Type::Byte => "Byte",
            Type::IOFile => "IOFile",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value stored in a constant pool.
///
/// Cloning is cheap: strings and functions are reference counted, so the
/// pool, the instructions and the assembled bytecode all share them.
#[derive(Debug, Clone)]
pub enum Value {
    /// null
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer
    Int(i64),
    /// Real number
    Real(f64),
    /// Byte
    Byte(u8),
    /// String
    Str(Arc<str>),
    /// A type object
    Type(Type),
    /// An assembled function
    Func(Arc<Function>),
}

/// Identity-style equality used for constant-pool deduplication.
///
/// Values of different types are never equal, reals compare by bit
/// pattern and functions by pointer.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    /// Creates a string value.
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    /// Returns the type of the value.
    pub fn type_of(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Real(_) => Type::Real,
            Value::Byte(_) => Type::Byte,
            Value::Str(_) => Type::Str,
            Value::Type(_) => Type::Type,
            Value::Func(_) => Type::Func,
        }
    }

    /// Converts the value to a boolean the way `Bool` casts do.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Real(r) => *r != 0.0,
            Value::Byte(b) => *b != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Type(_) | Value::Func(_) => true,
        }
    }

    /// Returns true if the value can be used as a map key.
    pub fn is_hashable(&self) -> bool {
        !matches!(self, Value::Real(_) | Value::Func(_))
    }

    /// Returns the string if the value is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true if the value is the string `name`.
    pub fn is_str(&self, name: &str) -> bool {
        self.as_str() == Some(name)
    }

    /// Returns the source-like representation used by the disassembler.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('\'');
                for c in s.chars() {
                    match c {
                        '\'' => out.push_str("\\'"),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        '\r' => out.push_str("\\r"),
                        c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
                        c => out.push(c),
                    }
                }
                out.push('\'');
                out
            }
            Value::Byte(b) => format!("{b}b"),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Real(r) => {
                if r.is_nan() {
                    f.write_str("nan")
                } else if r.is_infinite() {
                    f.write_str(if *r > 0.0 { "inf" } else { "-inf" })
                } else if r.fract() == 0.0 && r.abs() < 1e16 {
                    write!(f, "{r:.1}")
                } else {
                    write!(f, "{r}")
                }
            }
            Value::Byte(b) => write!(f, "{b}"),
            Value::Str(s) => f.write_str(s),
            Value::Type(t) => write!(f, "{t}"),
            Value::Func(func) => write!(f, "<Func {} args>", func.arity()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Type> for Value {
    fn from(t: Type) -> Self {
        Value::Type(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_equality_is_type_strict() {
        assert_ne!(Value::Int(1), Value::Real(1.0));
        assert_ne!(Value::Int(1), Value::Byte(1));
        assert_eq!(Value::str("a"), Value::str("a"));
        assert_eq!(Value::Real(f64::NAN), Value::Real(f64::NAN));
        assert_ne!(Value::Real(0.0), Value::Real(-0.0));
        assert_eq!(Value::Type(Type::Int), Value::Type(Type::Int));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(-3).is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(Value::str("x").is_truthy());
        assert!(Value::Type(Type::Null).is_truthy());
        assert!(!Value::Byte(0).is_truthy());
    }

    #[test]
    fn test_display_and_repr() {
        assert_eq!(Value::Real(3.0).to_string(), "3.0");
        assert_eq!(Value::Real(0.5).to_string(), "0.5");
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::str("it's").repr(), "'it\\'s'");
        assert_eq!(Value::Byte(10).repr(), "10b");
        assert_eq!(Value::Type(Type::IOFile).to_string(), "IOFile");
    }
}

//! In-memory representation of object text.

use std::fmt::{self, Display, Write as _};

/// A scalar stored in a field.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Interprets a raw (unquoted) token, preferring booleans, then integers, then floats.
    ///
    /// Anything else is kept as text.
    pub fn infer(token: &str) -> Self {
        match token {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(value) = token.parse::<i64>() {
            return Self::Integer(value);
        }
        // Only accept floats that look numeric (rejects "inf", "NaN", ...)
        if token.chars().any(|c| c.is_ascii_digit()) {
            if let Ok(value) = token.parse::<f64>() {
                return Self::Float(value);
            }
        }
        Self::Text(token.to_string())
    }

    /// Name of the variant, used when reporting type mismatches.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value:?}"),
            Self::Text(value) => {
                f.write_char('"')?;
                for c in value.chars() {
                    if c == '"' || c == '\\' {
                        f.write_char('\\')?;
                    }
                    f.write_char(c)?;
                }
                f.write_char('"')
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Entry {
    Field(Value),
    Object(Object),
}

/// A named collection of fields and nested objects.
///
/// Entries keep their insertion order so that packing is stable. Setting an
/// existing name replaces the previous entry in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Object {
    entries: Vec<(String, Entry)>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field and returns `self` (builder style).
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_field(name, value);
        self
    }

    /// Adds a nested object and returns `self` (builder style).
    pub fn with_object(mut self, name: &str, object: Object) -> Self {
        self.set_object(name, object);
        self
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) {
        self.set(name, Entry::Field(value.into()));
    }

    pub fn set_object(&mut self, name: &str, object: Object) {
        self.set(name, Entry::Object(object));
    }

    fn set(&mut self, name: &str, entry: Entry) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = entry,
            None => self.entries.push((name.to_string(), entry)),
        }
    }

    /// Returns a mutable reference to the nested object `name`, creating it if needed.
    pub(crate) fn object_mut(&mut self, name: &str) -> &mut Object {
        let index = match self.entries.iter().position(|(n, _)| n == name) {
            Some(index) => {
                // Reopening an object extends it; a field of the same name is replaced
                if let Entry::Field(_) = self.entries[index].1 {
                    self.entries[index].1 = Entry::Object(Object::new());
                }
                index
            }
            None => {
                self.entries
                    .push((name.to_string(), Entry::Object(Object::new())));
                self.entries.len() - 1
            }
        };
        match &mut self.entries[index].1 {
            Entry::Object(object) => object,
            Entry::Field(_) => unreachable!("entry is always an object at this point"),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find_map(|(n, e)| match e {
            Entry::Field(value) if n == name => Some(value),
            _ => None,
        })
    }

    pub fn object(&self, name: &str) -> Option<&Object> {
        self.entries.iter().find_map(|(n, e)| match e {
            Entry::Object(object) if n == name => Some(object),
            _ => None,
        })
    }

    /// Iterates over the names of the fields (not nested objects) of this object.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|(n, e)| match e {
            Entry::Field(_) => Some(n.as_str()),
            Entry::Object(_) => None,
        })
    }

    /// Iterates over the names of the nested objects of this object.
    pub fn object_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|(n, e)| match e {
            Entry::Object(_) => Some(n.as_str()),
            Entry::Field(_) => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the object as `name{field:value;...}`.
    pub fn encode(&self, name: &str) -> String {
        let mut out = String::new();
        self.encode_into(name, &mut out);
        out
    }

    fn encode_into(&self, name: &str, out: &mut String) {
        out.push_str(name);
        out.push('{');
        self.encode_body(out);
        out.push('}');
    }

    pub(crate) fn encode_body(&self, out: &mut String) {
        for (name, entry) in &self.entries {
            match entry {
                Entry::Field(value) => {
                    // Writing to a String cannot fail
                    let _ = write!(out, "{name}:{value};");
                }
                Entry::Object(object) => object.encode_into(name, out),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer() {
        assert_eq!(Value::infer("true"), Value::Bool(true));
        assert_eq!(Value::infer("false"), Value::Bool(false));
        assert_eq!(Value::infer("-42"), Value::Integer(-42));
        assert_eq!(Value::infer("2.5"), Value::Float(2.5));
        assert_eq!(Value::infer("inf"), Value::Text("inf".into()));
        assert_eq!(Value::infer("OK"), Value::Text("OK".into()));
    }

    #[test]
    fn test_encode_preserves_order() {
        let object = Object::new().with("base", 263u32).with("prime", 4_294_967_291i64);
        assert_eq!(object.encode("exchange"), "exchange{base:263;prime:4294967291;}");
    }

    #[test]
    fn test_encode_escapes_text() {
        let object = Object::new().with("status", "say \"hi\"");
        assert_eq!(object.encode("end"), r#"end{status:"say \"hi\"";}"#);
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut object = Object::new().with("a", 1i64).with("b", 2i64);
        object.set_field("a", 3i64);
        assert_eq!(object.encode("x"), "x{a:3;b:2;}");
        assert_eq!(object.field_names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_nested() {
        let object = Object::new().with_object("network", Object::new().with("encryption", true));
        assert_eq!(object.encode("root"), "root{network{encryption:true;}}");
        assert!(object.field("network").is_none());
        assert_eq!(
            object.object("network").and_then(|o| o.field("encryption")),
            Some(&Value::Bool(true))
        );
    }
}

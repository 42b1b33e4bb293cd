//! Positional structured-list encoding used by request bodies and event batches.
//!
//! A message is a JSON array where field number `n` sits at index `n - 1`.
//! Absent fields are `null`, nested messages are nested arrays and repeated
//! fields are arrays. When the last element of an array is an object, its
//! decimal-string keys carry further field numbers.
//!
//! Containers (event batches, RPC responses) start with a type discriminator
//! such as `"cbu"`; decode them with [`FromStructuredList::decode_container`].

use serde_json::{Map, Value};

/// Prefix the server puts in front of JSON bodies to defeat script inclusion.
const ANTI_HIJACK_PREFIX: &str = ")]}'";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("expected a list, found {0}")]
    NotAList(&'static str),

    #[error("field {field}: expected {expected}")]
    WrongType {
        field: usize,
        expected: &'static str,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("body is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// A message that can be written in structured-list form.
pub trait StructuredList {
    fn to_fields(&self) -> FieldList;

    fn encode(&self) -> Value {
        self.to_fields().into_value()
    }
}

/// A message that can be read back from structured-list form.
pub trait FromStructuredList: Sized {
    fn from_fields(fields: &Fields<'_>) -> Result<Self, DecodeError>;

    fn decode(value: &Value) -> Result<Self, DecodeError> {
        Self::from_fields(&Fields::new(value)?)
    }

    /// Decode a container, discarding its leading discriminator.
    fn decode_container(value: &Value) -> Result<Self, DecodeError> {
        Self::from_fields(&Fields::skip_first(value)?)
    }
}

/// Builder for the positional form of one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldList {
    items: Vec<Value>,
}

impl FieldList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, number: usize, value: impl Into<Value>) -> Self {
        debug_assert!(number > 0, "field numbers start at 1");
        let index = number.saturating_sub(1);
        if self.items.len() <= index {
            self.items.resize(index + 1, Value::Null);
        }
        self.items[index] = value.into();
        self
    }

    pub fn set_opt<V: Into<Value>>(self, number: usize, value: Option<V>) -> Self {
        match value {
            Some(value) => self.set(number, value),
            None => self,
        }
    }

    pub fn message<M: StructuredList + ?Sized>(self, number: usize, message: &M) -> Self {
        self.set(number, message.encode())
    }

    pub fn message_opt<M: StructuredList>(self, number: usize, message: Option<&M>) -> Self {
        match message {
            Some(message) => self.message(number, message),
            None => self,
        }
    }

    /// Repeated message field. Empty collections leave the slot absent.
    pub fn repeated<'a, M, I>(self, number: usize, messages: I) -> Self
    where
        M: StructuredList + 'a,
        I: IntoIterator<Item = &'a M>,
    {
        let encoded: Vec<Value> = messages.into_iter().map(StructuredList::encode).collect();
        if encoded.is_empty() {
            self
        } else {
            self.set(number, Value::Array(encoded))
        }
    }

    pub fn into_value(mut self) -> Value {
        while matches!(self.items.last(), Some(Value::Null)) {
            self.items.pop();
        }
        Value::Array(self.items)
    }
}

impl StructuredList for FieldList {
    fn to_fields(&self) -> FieldList {
        self.clone()
    }
}

/// Read-only view over the fields of one decoded message.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    items: &'a [Value],
    extension: Option<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    pub fn new(value: &'a Value) -> Result<Self, DecodeError> {
        Ok(Self::from_items(as_list(value)?))
    }

    pub fn skip_first(value: &'a Value) -> Result<Self, DecodeError> {
        let items = as_list(value)?;
        Ok(Self::from_items(items.get(1..).unwrap_or_default()))
    }

    fn from_items(items: &'a [Value]) -> Self {
        match items.split_last() {
            Some((Value::Object(extension), rest)) => Self {
                items: rest,
                extension: Some(extension),
            },
            _ => Self {
                items,
                extension: None,
            },
        }
    }

    /// The raw value of a field; `null` counts as absent.
    pub fn get(&self, number: usize) -> Option<&'a Value> {
        let positional = number
            .checked_sub(1)
            .and_then(|index| self.items.get(index))
            .filter(|value| !value.is_null());
        positional.or_else(|| {
            self.extension
                .and_then(|extension| extension.get(&number.to_string()))
                .filter(|value| !value.is_null())
        })
    }

    pub fn string(&self, number: usize) -> Result<Option<String>, DecodeError> {
        match self.get(number) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(number, "string")),
        }
    }

    /// Integer field; 64-bit values may arrive as decimal strings.
    pub fn int(&self, number: usize) -> Result<Option<i64>, DecodeError> {
        match self.get(number) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
                .map(Some)
                .ok_or_else(|| wrong_type(number, "integer")),
            Some(Value::String(s)) => s
                .parse()
                .map(Some)
                .map_err(|_| wrong_type(number, "integer")),
            Some(_) => Err(wrong_type(number, "integer")),
        }
    }

    pub fn bool(&self, number: usize) -> Result<Option<bool>, DecodeError> {
        match self.get(number) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::Number(n)) => Ok(Some(n.as_i64() != Some(0))),
            Some(_) => Err(wrong_type(number, "boolean")),
        }
    }

    pub fn message<T: FromStructuredList>(&self, number: usize) -> Result<Option<T>, DecodeError> {
        self.get(number).map(T::decode).transpose()
    }

    pub fn repeated<T: FromStructuredList>(&self, number: usize) -> Result<Vec<T>, DecodeError> {
        match self.get(number) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items.iter().map(T::decode).collect(),
            Some(_) => Err(wrong_type(number, "repeated message")),
        }
    }

    pub fn strings(&self, number: usize) -> Result<Vec<String>, DecodeError> {
        match self.get(number) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_owned)
                        .ok_or_else(|| wrong_type(number, "repeated string"))
                })
                .collect(),
            Some(_) => Err(wrong_type(number, "repeated string")),
        }
    }

    /// All positional items, for passing a message through opaquely.
    pub fn to_vec(&self) -> Vec<Value> {
        let mut items = self.items.to_vec();
        if let Some(extension) = self.extension {
            items.push(Value::Object(extension.clone()));
        }
        items
    }
}

fn as_list(value: &Value) -> Result<&[Value], DecodeError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Err(DecodeError::NotAList("null")),
        Value::Bool(_) => Err(DecodeError::NotAList("a boolean")),
        Value::Number(_) => Err(DecodeError::NotAList("a number")),
        Value::String(_) => Err(DecodeError::NotAList("a string")),
        Value::Object(_) => Err(DecodeError::NotAList("an object")),
    }
}

fn wrong_type(field: usize, expected: &'static str) -> DecodeError {
    DecodeError::WrongType { field, expected }
}

/// Parse a response body into JSON.
///
/// Strips the anti-hijacking prefix and accepts elided array slots
/// (`[1,,3]`), which the server emits for absent fields.
pub fn parse_body(body: &[u8]) -> Result<Value, DecodeError> {
    let text = std::str::from_utf8(body)?.trim_start();
    let text = text.strip_prefix(ANTI_HIJACK_PREFIX).unwrap_or(text);
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(first) => serde_json::from_str(&fill_elisions(text)).map_err(|_| first.into()),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Last {
    Open,
    Comma,
    Other,
}

/// Insert `null` into elided array slots outside of string literals.
fn fill_elisions(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    let mut last = Last::Other;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                last = Last::Other;
            }
            '[' => last = Last::Open,
            ',' => {
                if last != Last::Other {
                    out.push_str("null");
                }
                last = Last::Comma;
            }
            ']' => {
                if last == Last::Comma {
                    out.push_str("null");
                }
                last = Last::Other;
            }
            c if c.is_whitespace() => {}
            _ => last = Last::Other,
        }
        out.push(c);
    }
    out
}

//! # Protobuf Encoding (`proto`)
//!
//! Caffe describes networks with protobuf messages: the network definition
//! is saved in text format (`.prototxt`) and the trained network in binary
//! wire format (`.caffemodel`). Both are produced from the same in-memory
//! [`Message`] tree, whose fields carry their text name and their field
//! number.

pub mod caffe;
pub mod text;
pub mod wire;

pub use text::TextMessage;

// --- Error Type ---
#[derive(thiserror::Error, Debug)]
pub enum ProtoError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unexpected end of input while reading {0}")]
    Truncated(&'static str),
    #[error("Varint is longer than 64 bits")]
    VarintOverflow,
    #[error("Unknown wire type {0}")]
    UnknownWireType(u32),
    #[error("Field {field} has wire type {got}, expected {expected}")]
    WireTypeMismatch { field: u32, expected: u32, got: u32 },
    #[error("String field is not valid UTF-8")]
    InvalidUtf8,
    #[error("Text format error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("Missing required field '{0}'")]
    MissingField(String),
    #[error("Invalid value '{value}' for field '{field}'")]
    InvalidValue { field: String, value: String },
}

// --- Message Tree ---

/// A field value. Repeated fields are stored as one [`Field`] per element,
/// except for the packed numeric arrays used by blob data.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Bool(bool),
    Float(f32),
    Str(String),
    /// Enum value: identifier for text format, number for wire format.
    Enum(&'static str, i32),
    Message(Message),
    PackedFloat(Vec<f32>),
    PackedInt64(Vec<i64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub number: u32,
    pub value: Value,
}

/// An ordered list of fields. Field order is preserved in both encodings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    fields: Vec<Field>,
}

impl Message {
    pub fn new() -> Self {
        Message { fields: Vec::new() }
    }

    /// Appends a field.
    pub fn push(&mut self, name: &'static str, number: u32, value: Value) -> &mut Self {
        self.fields.push(Field {
            name,
            number,
            value,
        });
        self
    }

    /// Builder-style variant of [`Message::push`].
    pub fn with(mut self, name: &'static str, number: u32, value: Value) -> Self {
        self.push(name, number, value);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the first field named `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Encodes the message in protobuf wire format.
    pub fn encode(&self) -> Vec<u8> {
        wire::encode_message(self)
    }

    /// Renders the message in protobuf text format.
    pub fn to_text(&self) -> String {
        text::render(self)
    }
}

//! Reader for the type-tagged object graph emitted by `xcresulttool`.
//!
//! Every node is a JSON object carrying a `_type` tag. The tag has a `_name`
//! and an optional `_supertype` chain:
//!
//! ```json
//! {
//!   "_type": {
//!     "_name": "ActionTestSummaryGroup",
//!     "_supertype": {
//!       "_name": "ActionTestSummaryIdentifiableObject",
//!       "_supertype": { "_name": "ActionAbstractTestSummary" }
//!     }
//!   },
//!   "name": { "_type": { "_name": "String" }, "_value": "LoginTests" }
//! }
//! ```
//!
//! Scalars (`String`, `Double`, `Int`, `Date`, ...) keep their payload in
//! `_value`; collections are `Array` nodes with `_values`. Record types are
//! matched by supertype compatibility: a node is acceptable as `T` when
//! `T::TYPE_NAME` appears anywhere in its chain.

use serde_json::Value;

/// Result type for graph decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Structural errors in the object graph.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("node is not an object carrying a _type tag")]
    MissingType,

    #[error("{type_name} is missing field {field:?}")]
    MissingField { type_name: String, field: String },

    #[error("expected {expected} node, found {actual}")]
    UnexpectedType { expected: String, actual: String },

    #[error("incompatible object type (actual={actual}, expected={expected:?})")]
    IncompatibleType { actual: String, expected: String },

    /// The type is not one this decoder understands.
    #[error("unknown object type {0:?}")]
    UnknownType(String),

    #[error("invalid {type_name} value {value:?}")]
    InvalidValue { type_name: String, value: String },
}

/// A borrowed view of one node in the graph.
#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    value: &'a Value,
    type_tag: &'a Value,
}

impl<'a> Node<'a> {
    pub fn new(value: &'a Value) -> DecodeResult<Self> {
        let type_tag = value.get("_type").ok_or(DecodeError::MissingType)?;
        if type_tag.get("_name").and_then(Value::as_str).is_none() {
            return Err(DecodeError::MissingType);
        }
        Ok(Self { value, type_tag })
    }

    /// The concrete (most specific) type name.
    pub fn type_name(&self) -> &'a str {
        self.type_tag
            .get("_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Type names from the concrete type up through every supertype.
    pub fn type_chain(&self) -> Vec<&'a str> {
        let mut chain = Vec::new();
        let mut current = Some(self.type_tag);
        while let Some(tag) = current {
            match tag.get("_name").and_then(Value::as_str) {
                Some(name) => chain.push(name),
                None => break,
            }
            current = tag.get("_supertype").filter(|t| t.is_object());
        }
        chain
    }

    pub fn is_compatible(&self, expected: &str) -> bool {
        self.type_chain().contains(&expected)
    }

    /// A child node, or `None` when the field is absent or null.
    pub fn field(&self, name: &str) -> DecodeResult<Option<Node<'a>>> {
        match self.value.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(child) => Node::new(child).map(Some),
        }
    }

    pub fn require(&self, name: &str) -> DecodeResult<Node<'a>> {
        self.field(name)?.ok_or_else(|| DecodeError::MissingField {
            type_name: self.type_name().to_string(),
            field: name.to_string(),
        })
    }

    fn expect_type(&self, expected: &str) -> DecodeResult<()> {
        if self.type_name() == expected {
            Ok(())
        } else {
            Err(DecodeError::UnexpectedType {
                expected: expected.to_string(),
                actual: self.type_name().to_string(),
            })
        }
    }

    fn raw_value(&self) -> DecodeResult<&'a str> {
        self.value
            .get("_value")
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeError::MissingField {
                type_name: self.type_name().to_string(),
                field: "_value".to_string(),
            })
    }

    pub fn as_string(&self) -> DecodeResult<&'a str> {
        self.expect_type("String")?;
        self.raw_value()
    }

    pub fn as_double(&self) -> DecodeResult<f64> {
        self.expect_type("Double")?;
        let raw = self.raw_value()?;
        raw.parse().map_err(|_| DecodeError::InvalidValue {
            type_name: "Double".to_string(),
            value: raw.to_string(),
        })
    }

    pub fn as_int(&self) -> DecodeResult<i64> {
        self.expect_type("Int")?;
        let raw = self.raw_value()?;
        raw.parse().map_err(|_| DecodeError::InvalidValue {
            type_name: "Int".to_string(),
            value: raw.to_string(),
        })
    }

    pub fn as_date(&self) -> DecodeResult<&'a str> {
        self.expect_type("Date")?;
        self.raw_value()
    }

    /// Elements of an `Array` node.
    pub fn items(&self) -> DecodeResult<Vec<Node<'a>>> {
        self.expect_type("Array")?;
        let values = self
            .value
            .get("_values")
            .and_then(Value::as_array)
            .ok_or_else(|| DecodeError::MissingField {
                type_name: "Array".to_string(),
                field: "_values".to_string(),
            })?;
        values.iter().map(Node::new).collect()
    }

    /// Decodes this node as `T` after checking supertype compatibility.
    pub fn decode<T: Decode>(&self) -> DecodeResult<T> {
        if !self.is_compatible(T::TYPE_NAME) {
            return Err(DecodeError::IncompatibleType {
                actual: self.type_chain().join(","),
                expected: T::TYPE_NAME.to_string(),
            });
        }
        T::decode(*self)
    }

    pub fn decode_array<T: Decode>(&self) -> DecodeResult<Vec<T>> {
        self.items()?.iter().map(|n| n.decode()).collect()
    }

    // Field shorthands used by record decoders.

    pub fn string(&self, name: &str) -> DecodeResult<String> {
        Ok(self.require(name)?.as_string()?.to_string())
    }

    pub fn opt_string(&self, name: &str) -> DecodeResult<Option<String>> {
        self.field(name)?
            .map(|n| n.as_string().map(str::to_string))
            .transpose()
    }

    pub fn opt_double(&self, name: &str) -> DecodeResult<Option<f64>> {
        self.field(name)?.map(|n| n.as_double()).transpose()
    }

    pub fn opt_int(&self, name: &str) -> DecodeResult<Option<i64>> {
        self.field(name)?.map(|n| n.as_int()).transpose()
    }

    pub fn opt_date(&self, name: &str) -> DecodeResult<Option<String>> {
        self.field(name)?
            .map(|n| n.as_date().map(str::to_string))
            .transpose()
    }

    pub fn opt_object<T: Decode>(&self, name: &str) -> DecodeResult<Option<T>> {
        self.field(name)?.map(|n| n.decode()).transpose()
    }

    /// A typed array field; absent means empty.
    pub fn array<T: Decode>(&self, name: &str) -> DecodeResult<Vec<T>> {
        match self.field(name)? {
            Some(node) => node.decode_array(),
            None => Ok(Vec::new()),
        }
    }
}

/// A record type that can be read from the graph.
pub trait Decode: Sized {
    /// The type name this record accepts (matched against the chain).
    const TYPE_NAME: &'static str;

    fn decode(node: Node<'_>) -> DecodeResult<Self>;
}

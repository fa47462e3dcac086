//! Node Model
//!
//! Every element of a schema document becomes one node in the containment
//! graph. The variant set is closed: objects, arrays and scalar leaves.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name given to the node built from the document itself.
pub const ROOT_NAME: &str = "root";

/// Keyword whose scalar leaves are reference indirections.
pub const REF_KEYWORD: &str = "$ref";

/// Scalar payload of a leaf node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    String(String),
    Number(serde_json::Number),
    Bool(bool),
    Null,
}

impl Scalar {
    /// String payload, if this is a string scalar
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Null => f.write_str("null"),
        }
    }
}

/// Node variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NodeKind {
    /// JSON object; one outgoing edge per key
    Object,
    /// JSON array; one outgoing edge per element
    Array,
    /// Scalar value; no outgoing edges
    Leaf(Scalar),
}

/// A node of the schema graph.
///
/// Identity is positional: two leaves with the same name and value at
/// different positions are different nodes. Only reference leaves that share
/// a reference identity are merged into one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Key under which the node appears in its parent (or the element's
    /// textual form for array members)
    pub name: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    pub fn object(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: NodeKind::Object }
    }

    pub fn array(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: NodeKind::Array }
    }

    pub fn leaf(name: impl Into<String>, value: Scalar) -> Self {
        Self { name: name.into(), kind: NodeKind::Leaf(value) }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, NodeKind::Array)
    }

    /// Scalar value of a leaf
    pub fn value(&self) -> Option<&Scalar> {
        match &self.kind {
            NodeKind::Leaf(value) => Some(value),
            _ => None,
        }
    }

    /// True for `$ref` leaves, whatever their payload type
    pub fn is_reference(&self) -> bool {
        self.name == REF_KEYWORD && self.is_leaf()
    }

    /// Textual form of a leaf value, used by keyword matching
    pub fn value_text(&self) -> Option<String> {
        self.value().map(|v| v.to_string())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Object => write!(f, "{} {{}}", self.name),
            NodeKind::Array => write!(f, "{} []", self.name),
            NodeKind::Leaf(value) => write!(f, "{} = {}", self.name, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_detection() {
        let r = Node::leaf(REF_KEYWORD, Scalar::String("#/definitions/a".into()));
        assert!(r.is_reference());

        let obj = Node::object(REF_KEYWORD);
        assert!(!obj.is_reference());

        let other = Node::leaf("type", Scalar::String("string".into()));
        assert!(!other.is_reference());
    }

    #[test]
    fn test_value_text() {
        let n = Node::leaf("minimum", Scalar::Number(3.into()));
        assert_eq!(n.value_text().as_deref(), Some("3"));
        assert_eq!(Node::leaf("x", Scalar::Null).value_text().as_deref(), Some("null"));
        assert_eq!(Node::array("items").value_text(), None);
    }
}

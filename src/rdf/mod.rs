//! Statement model for stream members
//!
//! Members carry an opaque set of statements. The engine never interprets them
//! beyond walking a predicate path from the member's entity to reach the values
//! a fragmentation strategy needs (e.g. a creation timestamp).
//!
//! - **Term**: subject/object of a statement (IRI, blank node or typed literal)
//! - **Statement**: one subject-predicate-object triple
//! - **codec**: compact, checksummed binary encoding for storage

pub mod codec;

pub use codec::{decode_statements, encode_statements};

use serde::{Deserialize, Serialize};

/// XML Schema `dateTime` datatype IRI
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

/// XML Schema `string` datatype IRI (default literal datatype)
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// Subject or object of a statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Term {
    /// A named node
    Iri { value: String },
    /// An anonymous node, scoped to the member
    Blank { value: String },
    /// A literal value with its datatype
    Literal {
        value: String,
        #[serde(default = "default_datatype")]
        datatype: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
}

fn default_datatype() -> String {
    XSD_STRING.to_string()
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri {
            value: value.into(),
        }
    }

    pub fn blank(value: impl Into<String>) -> Self {
        Term::Blank {
            value: value.into(),
        }
    }

    pub fn literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: datatype.into(),
            language: None,
        }
    }

    /// Shorthand for an `xsd:dateTime` literal
    pub fn date_time(value: impl Into<String>) -> Self {
        Self::literal(value, XSD_DATE_TIME)
    }

    /// Whether the term can be the subject of further statements
    pub fn is_node(&self) -> bool {
        !matches!(self, Term::Literal { .. })
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Iri { value } => write!(f, "<{}>", value),
            Term::Blank { value } => write!(f, "_:{}", value),
            Term::Literal {
                value,
                datatype,
                language: Some(lang),
            } if datatype == XSD_STRING => write!(f, "\"{}\"@{}", value, lang),
            Term::Literal {
                value, datatype, ..
            } => write!(f, "\"{}\"^^<{}>", value, datatype),
        }
    }
}

/// A single subject-predicate-object statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
}

impl Statement {
    pub fn new(subject: Term, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }
}

/// Follow a sequence of predicates starting at `start`
///
/// Returns every object reachable at the end of the path, in statement order.
/// Duplicates are kept; callers decide how to deduplicate.
pub fn objects_along_path<'a>(
    statements: &'a [Statement],
    start: &Term,
    path: &[String],
) -> Vec<&'a Term> {
    let mut current: Vec<&Term> = vec![start];
    let mut reached: Vec<&'a Term> = Vec::new();

    for (step, predicate) in path.iter().enumerate() {
        reached = statements
            .iter()
            .filter(|s| &s.predicate == predicate && current.contains(&&s.subject))
            .map(|s| &s.object)
            .collect();

        if step + 1 < path.len() {
            current = reached.iter().copied().filter(|t| t.is_node()).collect();
            if current.is_empty() {
                return Vec::new();
            }
        }
    }

    reached
}

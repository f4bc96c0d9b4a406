//! Member statement codec
//!
//! Members are stored as an opaque blob. Layout:
//!
//! ```text
//! [crc32 of payload: u32 LE][payload = LZ4(size-prefixed bincode(EncodedMember))]
//! ```
//!
//! Statements of one member repeat the same subject, predicates and datatypes
//! many times, so every string goes through an intern table first.

use crate::rdf::{Statement, Term};
use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const CHECKSUM_LEN: usize = 4;

/// Intermediate format for a member's statements
#[derive(Debug, Serialize, Deserialize)]
struct EncodedMember {
    /// String intern table
    strings: Vec<String>,
    /// Reverse lookup into `strings`, only filled while encoding
    #[serde(skip)]
    index: HashMap<String, u32>,
    /// One entry per statement
    statements: Vec<EncodedStatement>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncodedStatement {
    subject: EncodedTerm,
    predicate: u32,
    object: EncodedTerm,
}

#[derive(Debug, Serialize, Deserialize)]
enum EncodedTerm {
    Iri(u32),
    Blank(u32),
    Literal {
        value: u32,
        datatype: u32,
        language: Option<u32>,
    },
}

impl EncodedMember {
    fn new() -> Self {
        Self {
            strings: Vec::new(),
            index: HashMap::new(),
            statements: Vec::new(),
        }
    }

    /// Intern a string, returning its index
    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), idx);
        idx
    }

    fn encode_term(&mut self, term: &Term) -> EncodedTerm {
        match term {
            Term::Iri { value } => EncodedTerm::Iri(self.intern(value)),
            Term::Blank { value } => EncodedTerm::Blank(self.intern(value)),
            Term::Literal {
                value,
                datatype,
                language,
            } => EncodedTerm::Literal {
                value: self.intern(value),
                datatype: self.intern(datatype),
                language: language.as_deref().map(|l| self.intern(l)),
            },
        }
    }

    fn string(&self, idx: u32) -> StorageResult<String> {
        self.strings.get(idx as usize).cloned().ok_or_else(|| {
            StorageError::Corruption(format!("string index {} out of range", idx))
        })
    }

    fn decode_term(&self, term: &EncodedTerm) -> StorageResult<Term> {
        Ok(match term {
            EncodedTerm::Iri(idx) => Term::Iri {
                value: self.string(*idx)?,
            },
            EncodedTerm::Blank(idx) => Term::Blank {
                value: self.string(*idx)?,
            },
            EncodedTerm::Literal {
                value,
                datatype,
                language,
            } => Term::Literal {
                value: self.string(*value)?,
                datatype: self.string(*datatype)?,
                language: language.map(|l| self.string(l)).transpose()?,
            },
        })
    }
}

/// Encode a member's statements for storage
pub fn encode_statements(statements: &[Statement]) -> StorageResult<Vec<u8>> {
    let mut encoded = EncodedMember::new();
    for statement in statements {
        let subject = encoded.encode_term(&statement.subject);
        let predicate = encoded.intern(&statement.predicate);
        let object = encoded.encode_term(&statement.object);
        encoded.statements.push(EncodedStatement {
            subject,
            predicate,
            object,
        });
    }

    let serialized = bincode::serialize(&encoded)?;
    let compressed = lz4_flex::compress_prepend_size(&serialized);
    let checksum = crc32fast::hash(&compressed);

    let mut blob = Vec::with_capacity(CHECKSUM_LEN + compressed.len());
    blob.extend_from_slice(&checksum.to_le_bytes());
    blob.extend_from_slice(&compressed);
    Ok(blob)
}

/// Decode a blob produced by [`encode_statements`]
pub fn decode_statements(blob: &[u8]) -> StorageResult<Vec<Statement>> {
    if blob.len() < CHECKSUM_LEN {
        return Err(StorageError::Corruption(format!(
            "statement blob too short: {} bytes",
            blob.len()
        )));
    }

    let (header, payload) = blob.split_at(CHECKSUM_LEN);
    let stored = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let computed = crc32fast::hash(payload);
    if stored != computed {
        return Err(StorageError::Corruption(format!(
            "statement checksum mismatch: stored {:08x}, computed {:08x}",
            stored, computed
        )));
    }

    let serialized = lz4_flex::decompress_size_prepended(payload)
        .map_err(|e| StorageError::Compression(e.to_string()))?;
    let encoded: EncodedMember = bincode::deserialize(&serialized)?;

    encoded
        .statements
        .iter()
        .map(|s| {
            Ok(Statement {
                subject: encoded.decode_term(&s.subject)?,
                predicate: encoded.string(s.predicate)?,
                object: encoded.decode_term(&s.object)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::XSD_STRING;

    fn sample(count: usize) -> Vec<Statement> {
        (0..count)
            .map(|i| {
                Statement::new(
                    Term::iri("http://example.org/entity/1"),
                    format!("http://example.org/p{}", i % 4),
                    Term::literal(format!("value {}", i), XSD_STRING),
                )
            })
            .collect()
    }

    #[test]
    fn test_encode_decode() {
        let mut statements = sample(20);
        statements.push(Statement::new(
            Term::blank("b0"),
            "http://www.w3.org/2000/01/rdf-schema#label",
            Term::Literal {
                value: "bonjour".to_string(),
                datatype: XSD_STRING.to_string(),
                language: Some("fr".to_string()),
            },
        ));

        let blob = encode_statements(&statements).unwrap();
        assert_eq!(decode_statements(&blob).unwrap(), statements);
    }

    #[test]
    fn test_interning_shrinks_repeated_strings() {
        let statements = sample(200);
        let blob = encode_statements(&statements).unwrap();
        let naive: usize = statements
            .iter()
            .map(|s| s.predicate.len() + s.subject.to_string().len())
            .sum();
        assert!(blob.len() < naive);
    }

    #[test]
    fn test_intern_reuses_slots() {
        let mut encoded = EncodedMember::new();
        let ids: Vec<u32> = ["a", "b", "a", "c", "b"]
            .iter()
            .map(|s| encoded.intern(s))
            .collect();
        assert_eq!(ids, vec![0, 1, 0, 2, 1]);
        assert_eq!(encoded.strings, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_member() {
        let blob = encode_statements(&[]).unwrap();
        assert!(decode_statements(&blob).unwrap().is_empty());
    }

    #[test]
    fn test_detects_corruption() {
        let mut blob = encode_statements(&sample(5)).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xff;

        let err = decode_statements(&blob).unwrap_err();
        assert!(matches!(err, StorageError::Corruption(_)));
    }

    #[test]
    fn test_rejects_truncated_blob() {
        let err = decode_statements(&[1, 2]).unwrap_err();
        assert!(matches!(err, StorageError::Corruption(_)));
    }
}

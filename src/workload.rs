//! Synthetic documents and the two ways of writing them.
//!
//! Every trial writes copies of one fixed document. Its content is irrelevant
//! to the measurement; only its size and nesting matter, so it never changes
//! between runs.

use serde_json::{json, Value};

use crate::client::{DatabaseClient, DatabaseHandle};
use crate::error::ClientError;
use crate::InsertMode;

pub type Document = Value;

/// The benchmark payload: a small nested glossary entry.
pub fn build_document() -> Document {
    json!({
        "glossary": {
            "title": "example glossary",
            "GlossDiv": {
                "title": "S",
                "GlossList": {
                    "GlossEntry": {
                        "ID": "SGML",
                        "SortAs": "SGML",
                        "GlossTerm": "Standard Generalized Markup Language",
                        "Acronym": "SGML",
                        "Abbrev": "ISO 8879:1986",
                        "GlossDef": {
                            "para": "A meta-markup language, used to create markup languages such as DocBook.",
                            "GlossSeeAlso": ["GML", "XML"]
                        },
                        "GlossSee": "markup"
                    }
                }
            }
        }
    })
}

/// `count` copies of `template`, identified as `{id_prefix}{i}` for i in `0..count`.
pub fn build_batch(template: &Document, count: u64, id_prefix: &str) -> Vec<(String, Document)> {
    (0..count)
        .map(|i| (format!("{id_prefix}{i}"), template.clone()))
        .collect()
}

/// Writes `count` documents into `db` using `mode`.
///
/// Sequential mode issues one awaited write per document; bulk mode issues a
/// single request, or none when `count` is zero.
pub async fn insert_batch(
    client: &dyn DatabaseClient,
    db: &DatabaseHandle,
    template: &Document,
    count: u64,
    id_prefix: &str,
    mode: InsertMode,
) -> Result<(), ClientError> {
    match mode {
        InsertMode::Sequential => {
            for i in 0..count {
                let id = format!("{id_prefix}{i}");
                client.insert_document(db, template, &id).await?;
            }
            Ok(())
        }
        InsertMode::Bulk => {
            if count == 0 {
                return Ok(());
            }
            let batch = build_batch(template, count, id_prefix);
            client.bulk_insert(db, &batch).await
        }
    }
}

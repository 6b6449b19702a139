//! Validation of downloaded snapshots
//!
//! A snapshot is rejected as a whole when any record is malformed, so nothing
//! is written from a partially valid payload.

use super::{Result, TransferError};
use crate::corpus::Corpus;
use crate::embeddings::ChunkKind;
use crate::storage::{EmbeddedChunk, SourceDocument};
use serde_json::{Map, Value};

const OWNER_KEYS: &[&str] = &["ownerId", "artigoId", "precedenteId"];
const TEXT_KEYS: &[&str] = &["text", "texto"];
const KIND_KEYS: &[&str] = &["chunkKind", "type"];
const TAG_KEYS: &[&str] = &["corpusTag", "tag", "lei", "tribunal"];

/// Parse an embeddings snapshot into chunks.
///
/// Only `id` and `embedding` are mandatory. Known aliases for owner, text,
/// chunk kind and corpus tag are mapped onto [`EmbeddedChunk`] fields; every
/// other field is kept as metadata. Every embedding must be non-empty and of
/// the same length as the first one.
pub fn parse_embeddings(payload: &str, corpus: Corpus) -> Result<Vec<EmbeddedChunk>> {
    let root: Value = serde_json::from_str(payload)?;
    let Value::Array(items) = root else {
        return Err(TransferError::InvalidFormat(format!(
            "{} snapshot must be a JSON array",
            corpus.embeddings_file()
        )));
    };
    if items.is_empty() {
        return Err(TransferError::EmptyPayload);
    }

    let chunks = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| parse_chunk(index, item))
        .collect::<Result<Vec<_>>>()?;

    let dims = chunks[0].embedding.len();
    if let Some((index, chunk)) = chunks
        .iter()
        .enumerate()
        .find(|(_, c)| c.embedding.len() != dims)
    {
        return Err(invalid_record(
            index,
            &format!(
                "embedding has {} dimensions, expected {}",
                chunk.embedding.len(),
                dims
            ),
        ));
    }

    Ok(chunks)
}

fn parse_chunk(index: usize, item: Value) -> Result<EmbeddedChunk> {
    let Value::Object(mut fields) = item else {
        return Err(invalid_record(index, "record is not an object"));
    };

    let id = fields
        .remove("id")
        .and_then(id_string)
        .ok_or_else(|| invalid_record(index, "missing id"))?;

    let embedding = match fields.remove("embedding") {
        Some(Value::Array(values)) if values.is_empty() => {
            return Err(invalid_record(index, "embedding is empty"))
        }
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| invalid_record(index, "embedding contains non-numeric values"))?,
        Some(_) => return Err(invalid_record(index, "embedding is not an array")),
        None => return Err(invalid_record(index, "missing embedding")),
    };

    let owner_id = take_first(&mut fields, OWNER_KEYS)
        .and_then(id_string)
        .unwrap_or_else(|| id.clone());
    let text = take_first(&mut fields, TEXT_KEYS)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let corpus_tag = take_first(&mut fields, TAG_KEYS)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();

    // unrecognised kinds are domain data, not a chunking strategy
    let mut chunk_kind = ChunkKind::default();
    for key in KIND_KEYS {
        if let Some(kind) = fields.get(*key).and_then(Value::as_str).and_then(ChunkKind::parse) {
            chunk_kind = kind;
            fields.remove(*key);
            break;
        }
    }

    let chunk_index = fields
        .remove("chunkIndex")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as usize;
    let total_chunks = fields
        .remove("totalChunks")
        .and_then(|v| v.as_u64())
        .filter(|&n| n > 0)
        .unwrap_or(1) as usize;

    Ok(EmbeddedChunk {
        id,
        owner_id,
        corpus_tag,
        chunk_kind,
        text,
        embedding,
        chunk_index,
        total_chunks,
        metadata: fields,
    })
}

/// Parse a source-data snapshot, either a bare array or a `{"data": [...]}` envelope
pub fn parse_source_documents(payload: &str, corpus: Corpus) -> Result<Vec<SourceDocument>> {
    let root: Value = serde_json::from_str(payload)?;
    let items = match root {
        Value::Array(items) => items,
        Value::Object(mut envelope) => match envelope.remove("data") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(TransferError::InvalidFormat(format!(
                    "{} envelope has no data array",
                    corpus.data_file()
                )))
            }
        },
        _ => {
            return Err(TransferError::InvalidFormat(format!(
                "{} snapshot must be an array or a data envelope",
                corpus.data_file()
            )))
        }
    };
    if items.is_empty() {
        return Err(TransferError::EmptyPayload);
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, payload)| {
            let id = payload
                .get("id")
                .cloned()
                .and_then(id_string)
                .ok_or_else(|| invalid_record(index, "missing id"))?;
            Ok(SourceDocument { id, payload })
        })
        .collect()
}

fn take_first(fields: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter().find_map(|key| match fields.remove(*key) {
        Some(Value::Null) | None => None,
        Some(value) => Some(value),
    })
}

fn id_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn invalid_record(index: usize, reason: &str) -> TransferError {
    TransferError::InvalidFormat(format!("record {index}: {reason}"))
}

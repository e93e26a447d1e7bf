use chrono::{DateTime, Utc};
use picopitch_core::DocumentType;
use sqlx::PgPool;

use crate::{to_i32, DbError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DocumentRow {
    pub id: i64,
    pub opportunity_id: i64,
    #[sqlx(try_from = "String")]
    pub document_type: DocumentType,
    pub version: i32,
    pub content_markdown: String,
    pub local_file_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub opportunity_id: i64,
    pub document_type: DocumentType,
    pub version: i32,
    pub content_markdown: String,
    pub local_file_path: Option<String>,
}

/// Appends a document row. Documents are never updated in place.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails, including when the
/// `(opportunity_id, document_type, version)` triple already exists.
pub async fn insert_document(pool: &PgPool, doc: &NewDocument) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO documents \
             (opportunity_id, document_type, version, content_markdown, local_file_path) \
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(doc.opportunity_id)
    .bind(doc.document_type.as_str())
    .bind(doc.version)
    .bind(&doc.content_markdown)
    .bind(&doc.local_file_path)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Documents of one opportunity, optionally of one type, in insertion order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_documents(
    pool: &PgPool,
    opportunity_id: i64,
    document_type: Option<DocumentType>,
) -> Result<Vec<DocumentRow>, DbError> {
    let rows = sqlx::query_as::<_, DocumentRow>(
        "SELECT id, opportunity_id, document_type, version, content_markdown, \
                local_file_path, created_at \
         FROM documents \
         WHERE opportunity_id = $1 AND ($2::text IS NULL OR document_type = $2) \
         ORDER BY id",
    )
    .bind(opportunity_id)
    .bind(document_type.map(DocumentType::as_str))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Version the next document of `document_type` should carry: the number of
/// existing rows of that type plus one.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::OutOfRange`]
/// if the count does not fit the `version` column.
pub async fn next_document_version(
    pool: &PgPool,
    opportunity_id: i64,
    document_type: DocumentType,
) -> Result<i32, DbError> {
    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM documents WHERE opportunity_id = $1 AND document_type = $2",
    )
    .bind(opportunity_id)
    .bind(document_type.as_str())
    .fetch_one(pool)
    .await?;
    to_i32("version", existing + 1)
}

//! Document and grant storage for PostgreSQL.

use std::collections::BTreeMap;

use astral_cache::{Document, DocumentId, DocumentMap, NewDocument, UserId};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use crate::PgPool;
use crate::error::{PostgresError, PostgresResult, is_foreign_key_violation, is_unique_violation};

type DocumentRow = (i64, String, bool, String, i64, OffsetDateTime);

fn document_from_row(
    (id, filename, public, mime, owner, created): DocumentRow,
    grants: Vec<(UserId, String)>,
) -> Document {
    let (grant_ids, grant) = grants.into_iter().unzip();
    Document {
        id: DocumentId(id),
        filename,
        public,
        mime,
        owner: UserId(owner),
        created,
        grant_ids,
        grant,
    }
}

// =============================================================================
// Document Storage
// =============================================================================

/// Document storage operations.
pub struct DocumentStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> DocumentStorage<'a> {
    /// Create a new document storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Load every document with its grantees.
    ///
    /// Both reads run in one transaction so documents and grants come from
    /// the same database state.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn all_documents(&self) -> PostgresResult<DocumentMap> {
        let mut tx = self.pool.begin().await?;

        let rows: Vec<DocumentRow> = query_as(
            r#"
            SELECT id, filename, public, mime, owner_id, created
            FROM docs
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        let grant_rows: Vec<(i64, i64, String)> = query_as(
            r#"
            SELECT g.doc_id, g.user_id, u.login
            FROM users_docs_grant g
            JOIN users u ON u.id = g.user_id
            ORDER BY g.doc_id, g.user_id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut grants: BTreeMap<i64, Vec<(UserId, String)>> = BTreeMap::new();
        for (doc_id, user_id, login) in grant_rows {
            grants
                .entry(doc_id)
                .or_default()
                .push((UserId(user_id), login));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let doc_grants = grants.remove(&row.0).unwrap_or_default();
                let document = document_from_row(row, doc_grants);
                (document.filename.clone(), document)
            })
            .collect())
    }

    /// Load one document with its grantees.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, id: DocumentId) -> PostgresResult<Option<Document>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<DocumentRow> = query_as(
            r#"
            SELECT id, filename, public, mime, owner_id, created
            FROM docs
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let grants: Vec<(i64, String)> = query_as(
            r#"
            SELECT g.user_id, u.login
            FROM users_docs_grant g
            JOIN users u ON u.id = g.user_id
            WHERE g.doc_id = $1
            ORDER BY g.user_id
            "#,
        )
        .bind(id.0)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let grants = grants
            .into_iter()
            .map(|(user_id, login)| (UserId(user_id), login))
            .collect();
        Ok(Some(document_from_row(row, grants)))
    }

    /// Insert a document and its grant edges in one transaction.
    ///
    /// Grants are recorded only for private documents; the owner and logins
    /// that match no user are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the filename is taken, `InvalidInput` if it is
    /// empty and `NotFound` if the owner does not exist.
    pub async fn create(&self, document: NewDocument) -> PostgresResult<Document> {
        if document.filename.is_empty() {
            return Err(PostgresError::invalid_input("filename must not be empty"));
        }

        let mut tx = self.pool.begin().await?;

        let row: DocumentRow = query_as(
            r#"
            INSERT INTO docs (filename, public, mime, owner_id, created)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, filename, public, mime, owner_id, created
            "#,
        )
        .bind(&document.filename)
        .bind(document.public)
        .bind(&document.mime)
        .bind(document.owner.0)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return PostgresError::conflict(format!(
                    "document {} already exists",
                    document.filename
                ));
            }
            if is_foreign_key_violation(&e) {
                return PostgresError::not_found(format!("user {}", document.owner));
            }
            PostgresError::from(e)
        })?;

        let mut grants = Vec::new();
        if !document.public && !document.grant.is_empty() {
            let grantees: Vec<(i64, String)> = query_as(
                r#"
                SELECT id, login
                FROM users
                WHERE login = ANY($1) AND id != $2
                ORDER BY id
                "#,
            )
            .bind(&document.grant)
            .bind(document.owner.0)
            .fetch_all(&mut *tx)
            .await?;

            for (user_id, login) in grantees {
                query(
                    r#"
                    INSERT INTO users_docs_grant (doc_id, user_id)
                    VALUES ($1, $2)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(row.0)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

                grants.push((UserId(user_id), login));
            }
        }

        tx.commit().await?;

        Ok(document_from_row(row, grants))
    }

    /// Delete a document. Grant edges are removed by cascade.
    ///
    /// This operation is idempotent - deleting an unknown document succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete(&self, id: DocumentId) -> PostgresResult<()> {
        let mut tx = self.pool.begin().await?;

        query("DELETE FROM docs WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

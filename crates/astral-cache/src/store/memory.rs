//! In-memory backing store.
//!
//! Used by tests and by the `memory` storage backend for local development.
//! Each operation takes the table lock once, which gives the same
//! all-or-nothing behaviour as a per-operation transaction.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;

use super::{BackingStore, StoreError, StoreResult};
use crate::credentials::generate_token;
use crate::types::{
    Document, DocumentId, DocumentMap, IdentityMap, NewDocument, ResolvedIdentity, Token, User,
    UserId,
};

#[derive(Debug, Clone)]
struct DocumentRow {
    id: DocumentId,
    filename: String,
    public: bool,
    mime: String,
    owner: UserId,
    created: OffsetDateTime,
}

#[derive(Debug, Default)]
struct Tables {
    next_user_id: i64,
    next_document_id: i64,
    users: BTreeMap<UserId, User>,
    tokens: BTreeMap<String, UserId>,
    documents: BTreeMap<DocumentId, DocumentRow>,
    grants: BTreeSet<(DocumentId, UserId)>,
}

impl Tables {
    fn user_by_login(&self, login: &str) -> Option<&User> {
        self.users.values().find(|u| u.login == login)
    }

    /// Join a document row with its grantees, in user id order.
    fn document(&self, row: &DocumentRow) -> Document {
        let mut grant_ids = Vec::new();
        let mut grant = Vec::new();
        let edges = self
            .grants
            .range((row.id, UserId(i64::MIN))..=(row.id, UserId(i64::MAX)));
        for (_, user_id) in edges {
            if let Some(user) = self.users.get(user_id) {
                grant_ids.push(*user_id);
                grant.push(user.login.clone());
            }
        }

        Document {
            id: row.id,
            filename: row.filename.clone(),
            public: row.public,
            mime: row.mime.clone(),
            owner: row.owner,
            created: row.created,
            grant_ids,
            grant,
        }
    }
}

/// Backing store holding every table in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    identity_fetches: AtomicUsize,
    document_fetches: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with [`StoreError::Unavailable`]
    /// until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of completed `fetch_all_identities` calls.
    #[must_use]
    pub fn identity_fetches(&self) -> usize {
        self.identity_fetches.load(Ordering::SeqCst)
    }

    /// Number of completed `fetch_all_documents` calls.
    #[must_use]
    pub fn document_fetches(&self) -> usize {
        self.document_fetches.load(Ordering::SeqCst)
    }

    /// Number of live tokens held for `user_id`.
    #[must_use]
    pub fn token_count(&self, user_id: UserId) -> usize {
        self.tables
            .lock()
            .tokens
            .values()
            .filter(|owner| **owner == user_id)
            .count()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("memory store is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn fetch_all_identities(&self) -> StoreResult<IdentityMap> {
        self.check_available()?;

        let tables = self.tables.lock();
        let identities = tables
            .tokens
            .iter()
            .filter_map(|(token, user_id)| {
                tables
                    .users
                    .get(user_id)
                    .map(|user| (token.clone(), ResolvedIdentity::new(user, token.clone())))
            })
            .collect();
        drop(tables);

        self.identity_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(identities)
    }

    async fn fetch_all_documents(&self) -> StoreResult<DocumentMap> {
        self.check_available()?;

        let tables = self.tables.lock();
        let documents: DocumentMap = tables
            .documents
            .values()
            .map(|row| (row.filename.clone(), tables.document(row)))
            .collect();
        drop(tables);

        self.document_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(documents)
    }

    async fn create_user(&self, login: &str, password_hash: &str) -> StoreResult<User> {
        self.check_available()?;
        if login.is_empty() {
            return Err(StoreError::invalid_input("login must not be empty"));
        }

        let mut tables = self.tables.lock();
        if tables.user_by_login(login).is_some() {
            return Err(StoreError::conflict(format!("user {login} already exists")));
        }

        tables.next_user_id += 1;
        let user = User {
            id: UserId(tables.next_user_id),
            login: login.to_string(),
            password_hash: password_hash.to_string(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_login(&self, login: &str) -> StoreResult<Option<User>> {
        self.check_available()?;
        Ok(self.tables.lock().user_by_login(login).cloned())
    }

    async fn create_token(&self, user_id: UserId) -> StoreResult<Token> {
        self.check_available()?;

        let mut tables = self.tables.lock();
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::not_found(format!("user {user_id}")));
        }

        let token = generate_token();
        tables.tokens.insert(token.clone(), user_id);
        Ok(Token { user_id, token })
    }

    async fn delete_token(&self, token: &str) -> StoreResult<()> {
        self.check_available()?;
        self.tables.lock().tokens.remove(token);
        Ok(())
    }

    async fn create_document(&self, document: NewDocument) -> StoreResult<Document> {
        self.check_available()?;
        if document.filename.is_empty() {
            return Err(StoreError::invalid_input("filename must not be empty"));
        }

        let mut tables = self.tables.lock();
        if tables
            .documents
            .values()
            .any(|d| d.filename == document.filename)
        {
            return Err(StoreError::conflict(format!(
                "document {} already exists",
                document.filename
            )));
        }

        tables.next_document_id += 1;
        let row = DocumentRow {
            id: DocumentId(tables.next_document_id),
            filename: document.filename,
            public: document.public,
            mime: document.mime,
            owner: document.owner,
            created: OffsetDateTime::now_utc(),
        };

        let mut grantees: BTreeMap<UserId, String> = BTreeMap::new();
        if !row.public {
            for login in &document.grant {
                if let Some(user) = tables.user_by_login(login) {
                    if user.id != row.owner {
                        grantees.insert(user.id, user.login.clone());
                    }
                }
            }
        }
        for user_id in grantees.keys() {
            tables.grants.insert((row.id, *user_id));
        }
        tables.documents.insert(row.id, row.clone());

        Ok(Document {
            id: row.id,
            filename: row.filename,
            public: row.public,
            mime: row.mime,
            owner: row.owner,
            created: row.created,
            grant_ids: grantees.keys().copied().collect(),
            grant: grantees.into_values().collect(),
        })
    }

    async fn find_document(&self, id: DocumentId) -> StoreResult<Option<Document>> {
        self.check_available()?;

        let tables = self.tables.lock();
        Ok(tables.documents.get(&id).map(|row| tables.document(row)))
    }

    async fn delete_document(&self, id: DocumentId) -> StoreResult<()> {
        self.check_available()?;

        let mut tables = self.tables.lock();
        tables.documents.remove(&id);
        tables.grants.retain(|(doc_id, _)| *doc_id != id);
        Ok(())
    }
}

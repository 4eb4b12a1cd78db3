//! Read-only queries over the cache snapshot.
//!
//! Request handlers resolve tokens and look up documents here. Nothing in
//! this module touches the backing store; answers reflect the last
//! completed refresh of each category, and the two categories may be at
//! different points in time.

use std::sync::Arc;

use crate::snapshot::CacheSnapshot;
use crate::types::{Document, DocumentId, ResolvedIdentity, UserId};

/// Query surface over a [`CacheSnapshot`].
#[derive(Debug, Clone)]
pub struct AccessResolver {
    snapshot: Arc<CacheSnapshot>,
}

impl AccessResolver {
    #[must_use]
    pub fn new(snapshot: Arc<CacheSnapshot>) -> Self {
        Self { snapshot }
    }

    /// Resolve a bearer token to its identity.
    ///
    /// An entry whose stored token differs from the queried one is treated
    /// as absent.
    #[must_use]
    pub fn resolve_token(&self, token: &str) -> Option<ResolvedIdentity> {
        self.snapshot
            .identity(token)
            .filter(|identity| identity.token == token)
    }

    /// Find one identity for `user_id`.
    ///
    /// A user holding several tokens yields the entry with the lowest token
    /// value.
    #[must_use]
    pub fn resolve_user_by_user_id(&self, user_id: UserId) -> Option<ResolvedIdentity> {
        self.snapshot
            .identities()
            .values()
            .find(|identity| identity.user_id == user_id)
            .cloned()
    }

    /// Look up a document by filename.
    #[must_use]
    pub fn lookup_document_by_name(&self, filename: &str) -> Option<Document> {
        self.snapshot.document(filename)
    }

    /// Look up a document by id.
    #[must_use]
    pub fn lookup_document_by_id(&self, id: DocumentId) -> Option<Document> {
        self.snapshot
            .documents()
            .values()
            .find(|document| document.id == id)
            .cloned()
    }

    /// List documents in filename order with grantee logins resolved.
    ///
    /// `limit == 0` lists everything. Grantee ids are resolved through the
    /// identities snapshot; ids without a live token fall back to the login
    /// recorded when the documents were loaded, and ids unknown to both are
    /// left out.
    #[must_use]
    pub fn list_documents(&self, limit: usize) -> Vec<Document> {
        let documents = self.snapshot.documents();
        let identities = self.snapshot.identities();
        let take = if limit == 0 { usize::MAX } else { limit };

        documents
            .values()
            .take(take)
            .map(|document| {
                let mut resolved = document.clone();
                let mut grant_ids = Vec::with_capacity(document.grant_ids.len());
                let mut grant = Vec::with_capacity(document.grant_ids.len());

                for (index, user_id) in document.grant_ids.iter().enumerate() {
                    let login = identities
                        .values()
                        .find(|identity| identity.user_id == *user_id)
                        .map(|identity| identity.login.clone())
                        .or_else(|| document.grant.get(index).cloned())
                        .filter(|login| !login.is_empty());

                    if let Some(login) = login {
                        grant_ids.push(*user_id);
                        grant.push(login);
                    }
                }

                resolved.grant_ids = grant_ids;
                resolved.grant = grant;
                resolved
            })
            .collect()
    }

    /// The snapshot behind this resolver.
    #[must_use]
    pub fn snapshot(&self) -> &Arc<CacheSnapshot> {
        &self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentMap, IdentityMap};
    use time::OffsetDateTime;

    fn identity(user_id: i64, login: &str, token: &str) -> ResolvedIdentity {
        ResolvedIdentity {
            user_id: UserId(user_id),
            login: login.to_string(),
            password_hash: "hash".to_string(),
            token: token.to_string(),
        }
    }

    fn document(id: i64, filename: &str, grants: &[(i64, &str)]) -> Document {
        Document {
            id: DocumentId(id),
            filename: filename.to_string(),
            public: grants.is_empty(),
            mime: "text/plain".to_string(),
            owner: UserId(1),
            created: OffsetDateTime::UNIX_EPOCH,
            grant_ids: grants.iter().map(|(id, _)| UserId(*id)).collect(),
            grant: grants.iter().map(|(_, login)| login.to_string()).collect(),
        }
    }

    fn resolver_with(identities: Vec<ResolvedIdentity>, documents: Vec<Document>) -> AccessResolver {
        let snapshot = Arc::new(CacheSnapshot::new());
        snapshot.replace_identities(
            identities
                .into_iter()
                .map(|i| (i.token.clone(), i))
                .collect::<IdentityMap>(),
        );
        snapshot.replace_documents(
            documents
                .into_iter()
                .map(|d| (d.filename.clone(), d))
                .collect::<DocumentMap>(),
        );
        AccessResolver::new(snapshot)
    }

    #[test]
    fn unknown_token_is_not_found() {
        let resolver = resolver_with(vec![identity(1, "alice", "aaa")], vec![]);
        assert!(resolver.resolve_token("zzz").is_none());
        assert!(resolver.resolve_token("").is_none());
        assert_eq!(resolver.resolve_token("aaa").unwrap().user_id, UserId(1));
    }

    #[test]
    fn mismatched_entry_is_not_found() {
        let snapshot = Arc::new(CacheSnapshot::new());
        let mut map = IdentityMap::new();
        map.insert("aaa".to_string(), identity(1, "alice", "bbb"));
        snapshot.replace_identities(map);

        let resolver = AccessResolver::new(snapshot);
        assert!(resolver.resolve_token("aaa").is_none());
    }

    #[test]
    fn user_with_several_tokens_resolves_to_lowest_token() {
        let resolver = resolver_with(
            vec![
                identity(1, "alice", "ccc"),
                identity(2, "bob", "bbb"),
                identity(1, "alice", "aaa"),
            ],
            vec![],
        );

        for _ in 0..10 {
            assert_eq!(resolver.resolve_user_by_user_id(UserId(1)).unwrap().token, "aaa");
        }
        assert!(resolver.resolve_user_by_user_id(UserId(3)).is_none());
    }

    #[test]
    fn documents_by_name_and_id() {
        let resolver = resolver_with(
            vec![],
            vec![document(10, "a.txt", &[]), document(11, "b.txt", &[])],
        );

        assert_eq!(resolver.lookup_document_by_name("b.txt").unwrap().id, DocumentId(11));
        assert!(resolver.lookup_document_by_name("c.txt").is_none());
        assert_eq!(resolver.lookup_document_by_id(DocumentId(10)).unwrap().filename, "a.txt");
        assert!(resolver.lookup_document_by_id(DocumentId(12)).is_none());
    }

    #[test]
    fn list_documents_honours_limit_in_filename_order() {
        let documents = ["e", "c", "a", "d", "b"]
            .iter()
            .enumerate()
            .map(|(i, name)| document(i as i64, &format!("{name}.txt"), &[]))
            .collect();
        let resolver = resolver_with(vec![], documents);

        let two = resolver.list_documents(2);
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].filename, "a.txt");
        assert_eq!(two[1].filename, "b.txt");

        let all = resolver.list_documents(0);
        let names: Vec<_> = all.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"]);

        assert_eq!(resolver.list_documents(100).len(), 5);
    }

    #[test]
    fn list_documents_resolves_grant_logins() {
        let resolver = resolver_with(
            vec![identity(2, "alice-renamed", "aaa")],
            vec![document(1, "a.txt", &[(2, "alice"), (3, "bob"), (4, "")])],
        );

        let listed = resolver.list_documents(0);
        assert_eq!(listed[0].grant, vec!["alice-renamed", "bob"]);
        assert_eq!(listed[0].grant_ids, vec![UserId(2), UserId(3)]);
    }
}

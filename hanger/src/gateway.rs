//! Credential gateway: namespaced create/query/update/delete over a
//! [`SecureStore`].
//!
//! Each operation builds one typed request, makes exactly one store call,
//! and reshapes the answer. Every application identifier is sent to the store
//! as `"{prefix}.{application}"`.

use zeroize::Zeroizing;

use crate::model::{
    CredentialChanges, CredentialQuery, CredentialRecord, CredentialType, OperationResult,
};
use crate::status::Status;
use crate::store::{AddRequest, LookupRequest, MatchLimit, SecureStore, UpdateAttributes};

#[derive(Debug, Clone)]
pub struct CredentialGateway<S> {
    prefix: String,
    store: S,
}

impl<S: SecureStore> CredentialGateway<S> {
    pub fn new(prefix: impl Into<String>, store: S) -> Self {
        Self {
            prefix: prefix.into(),
            store,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Identifier an application is stored under.
    pub fn scoped_application(&self, application: &str) -> String {
        format!("{}.{}", self.prefix, application)
    }

    /// Create a record and return it as stored.
    ///
    /// `item` is `None` whenever the store did not hand a record back, which
    /// includes every failure status.
    pub fn save(
        &self,
        password: &str,
        username: Option<&str>,
        application: Option<&str>,
        kind: CredentialType,
    ) -> OperationResult<Option<CredentialRecord>> {
        let request = AddRequest::new(kind, password.as_bytes())
            .account(username.map(str::to_string))
            .server(application.map(|app| self.scoped_application(app)))
            .returning(true, true);

        let result = self.store.add(&request);
        tracing::debug!(
            backend = self.store.backend_name(),
            kind = kind.as_str(),
            status = result.status.code(),
            "Saved credential"
        );
        result.map(|item| item.map(CredentialRecord::new))
    }

    /// Fetch up to `limit` records matching `filter`.
    ///
    /// A single record and a list both come back as a list; `item` is `None`
    /// when the store returned nothing (not found, or a failure).
    pub fn query(
        &self,
        filter: &CredentialQuery,
        limit: MatchLimit,
        kind: CredentialType,
    ) -> OperationResult<Option<Vec<CredentialRecord>>> {
        let request = self
            .lookup_request(filter, kind)
            .limit(limit)
            .returning(true, true);

        let result = self.store.lookup(&request);
        tracing::debug!(
            backend = self.store.backend_name(),
            kind = kind.as_str(),
            limit = ?request.limit,
            status = result.status.code(),
            "Queried credentials"
        );
        result.map(|reply| {
            reply
                .into_items()
                .map(|items| items.into_iter().map(CredentialRecord::new).collect())
        })
    }

    /// Change the supplied fields on every record matching `filter`.
    ///
    /// The store status is returned as-is.
    pub fn update(
        &self,
        filter: &CredentialQuery,
        changes: &CredentialChanges,
        kind: CredentialType,
    ) -> Status {
        let request = self.lookup_request(filter, kind);
        let attributes = UpdateAttributes {
            account: changes.username.clone(),
            server: changes
                .application
                .as_deref()
                .map(|app| self.scoped_application(app)),
            data: changes
                .password
                .as_ref()
                .map(|pw| Zeroizing::new(pw.as_bytes().to_vec())),
        };

        let status = self.store.update(&request, &attributes);
        tracing::debug!(
            backend = self.store.backend_name(),
            kind = kind.as_str(),
            status = status.code(),
            "Updated credentials"
        );
        status
    }

    /// Remove every record matching `filter`, discarding the store status.
    pub fn delete(&self, filter: &CredentialQuery, kind: CredentialType) {
        let _ = self.delete_reporting(filter, kind);
    }

    /// Same as [`delete`](Self::delete), with the store status surfaced.
    pub fn delete_reporting(&self, filter: &CredentialQuery, kind: CredentialType) -> Status {
        let request = self.lookup_request(filter, kind);
        let status = self.store.remove(&request);
        tracing::debug!(
            backend = self.store.backend_name(),
            kind = kind.as_str(),
            status = status.code(),
            "Deleted credentials"
        );
        status
    }

    fn lookup_request(&self, filter: &CredentialQuery, kind: CredentialType) -> LookupRequest {
        LookupRequest::new(kind)
            .account(filter.username.clone())
            .server(
                filter
                    .application
                    .as_deref()
                    .map(|app| self.scoped_application(app)),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const KIND: CredentialType = CredentialType::InternetPassword;

    #[test]
    fn scoped_application_uses_dot_separator() {
        let gateway = CredentialGateway::new("com.example", MemoryStore::new());
        assert_eq!(gateway.scoped_application("mail"), "com.example.mail");
        assert_eq!(gateway.scoped_application(""), "com.example.");
    }

    #[test]
    fn save_without_application_stores_no_server() {
        let gateway = CredentialGateway::new("p", MemoryStore::new());
        let result = gateway.save("pw", Some("alice"), None, KIND);
        assert!(result.is_success());
        let record = result.item.unwrap();
        assert!(record.application().is_none());
        assert_eq!(record.username(), Some("alice"));
    }

    #[test]
    fn delete_is_silent_on_missing_records() {
        let gateway = CredentialGateway::new("p", MemoryStore::new());
        gateway.delete(&CredentialQuery::any().username("ghost"), KIND);
        assert_eq!(
            gateway.delete_reporting(&CredentialQuery::any().username("ghost"), KIND),
            Status::ITEM_NOT_FOUND
        );
    }
}

//! Caller-facing types: filters, change sets, records and results.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::status::Status;
use crate::store::StoreItem;

/// Credential class targeted by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// A password scoped to an account on a server.
    #[default]
    InternetPassword,
}

impl CredentialType {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialType::InternetPassword => "internet_password",
        }
    }
}

/// Filter selecting records. A `None` field leaves that attribute unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialQuery {
    pub username: Option<String>,
    pub application: Option<String>,
}

impl CredentialQuery {
    pub fn new(username: Option<String>, application: Option<String>) -> Self {
        Self {
            username,
            application,
        }
    }

    /// Matches every record of the requested type.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn application(mut self, application: impl Into<String>) -> Self {
        self.application = Some(application.into());
        self
    }
}

/// Fields to change on every record an update matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialChanges {
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub application: Option<String>,
}

impl CredentialChanges {
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    pub fn application(mut self, application: impl Into<String>) -> Self {
        self.application = Some(application.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none() && self.application.is_none()
    }
}

/// Read-only view over an item returned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    original: StoreItem,
}

impl CredentialRecord {
    pub(crate) fn new(original: StoreItem) -> Self {
        Self { original }
    }

    pub fn original(&self) -> &StoreItem {
        &self.original
    }

    pub fn into_original(self) -> StoreItem {
        self.original
    }

    pub fn kind(&self) -> CredentialType {
        self.original.attributes.class
    }

    pub fn username(&self) -> Option<&str> {
        self.original.attributes.account.as_deref()
    }

    /// Application identifier as stored, prefix included.
    pub fn application(&self) -> Option<&str> {
        self.original.attributes.server.as_deref()
    }

    /// Stored secret decoded as UTF-8; `None` when missing or not valid text.
    pub fn password(&self) -> Option<String> {
        let data = self.original.data.as_ref()?;
        String::from_utf8(data.to_vec()).ok()
    }
}

/// Store status paired with an optional payload.
///
/// A successful status does not guarantee a payload, so check both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult<T> {
    pub status: Status,
    pub item: T,
}

impl<T> OperationResult<T> {
    pub fn new(status: Status, item: T) -> Self {
        Self { status, item }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        OperationResult {
            status: self.status,
            item: f(self.item),
        }
    }
}

#[cfg(test)]
mod tests {
    use zeroize::Zeroizing;

    use super::*;
    use crate::store::ItemAttributes;

    fn item(data: Option<Vec<u8>>) -> StoreItem {
        StoreItem {
            attributes: ItemAttributes {
                class: CredentialType::InternetPassword,
                account: Some("alice".to_string()),
                server: Some("app.mail".to_string()),
            },
            data: data.map(Zeroizing::new),
        }
    }

    #[test]
    fn password_decodes_utf8() {
        let record = CredentialRecord::new(item(Some("pässwörd 🔑".as_bytes().to_vec())));
        assert_eq!(record.password().as_deref(), Some("pässwörd 🔑"));
        assert_eq!(record.username(), Some("alice"));
        assert_eq!(record.application(), Some("app.mail"));
    }

    #[test]
    fn password_missing_data() {
        let record = CredentialRecord::new(item(None));
        assert!(record.password().is_none());
    }

    #[test]
    fn password_invalid_utf8() {
        let record = CredentialRecord::new(item(Some(vec![0xff, 0xfe, 0x00])));
        assert!(record.password().is_none());
    }

    #[test]
    fn empty_password_is_present() {
        let record = CredentialRecord::new(item(Some(Vec::new())));
        assert_eq!(record.password().as_deref(), Some(""));
    }

    #[test]
    fn changes_builder() {
        let changes = CredentialChanges::default().password("new");
        assert!(!changes.is_empty());
        assert!(changes.username.is_none());
        assert_eq!(changes.password.as_deref().map(String::as_str), Some("new"));
        assert!(CredentialChanges::default().is_empty());
    }

    #[test]
    fn result_map_keeps_status() {
        let result = OperationResult::new(Status::ITEM_NOT_FOUND, Some(3)).map(|n| n.map(|n| n * 2));
        assert_eq!(result.status, Status::ITEM_NOT_FOUND);
        assert_eq!(result.item, Some(6));
    }
}

//! OS keychain store.
//!
//! Uses the `keyring` crate to reach the platform credential store:
//! - macOS: Keychain
//! - Linux: kernel keyutils
//! - Windows: Credential Manager
//!
//! Every item is one keyring entry under the configured service, whose user
//! name is the JSON encoding of the item's attributes. Keyrings cannot be
//! enumerated portably, so the attributes of every item are also kept in an
//! index, split over entries `(service, "__index__.0")`, `"__index__.1"`, ...
//! so no single secret outgrows the smallest platform limit.

use std::sync::{Mutex, PoisonError};

use keyring::Entry;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::model::OperationResult;
use crate::status::Status;
use crate::store::{
    AddRequest, ItemAttributes, LookupReply, LookupRequest, SecureStore, StoreItem,
    UpdateAttributes,
};

/// User names of the index chunks are `__index__.0`, `__index__.1`, ...
const INDEX_USER_PREFIX: &str = "__index__";

/// Upper bound for one serialized index chunk. Windows Credential Manager
/// caps a secret at 2560 bytes.
const INDEX_CHUNK_BYTES: usize = 2048;

/// Failures inside the keyring store, before they become a [`Status`].
#[derive(Debug, Error)]
enum BackendError {
    #[error("keyring: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("record index is corrupt: {0}")]
    Index(#[from] serde_json::Error),
}

impl BackendError {
    fn status(&self) -> Status {
        match self {
            BackendError::Keyring(e) => keyring_status(e),
            BackendError::Index(_) => Status::DECODE,
        }
    }
}

/// Map keyring errors into the store status space.
fn keyring_status(error: &keyring::Error) -> Status {
    match error {
        keyring::Error::NoEntry => Status::ITEM_NOT_FOUND,
        keyring::Error::BadEncoding(_) => Status::DECODE,
        keyring::Error::TooLong(..) | keyring::Error::Invalid(..) => Status::PARAM,
        keyring::Error::Ambiguous(_) => Status::DUPLICATE_ITEM,
        keyring::Error::NoStorageAccess(platform_err) => {
            let err_str = platform_err.to_string().to_lowercase();
            if err_str.contains("interaction not allowed") {
                Status::INTERACTION_NOT_ALLOWED
            } else if err_str.contains("denied") || err_str.contains("permission") {
                Status::AUTH_FAILED
            } else {
                Status::NOT_AVAILABLE
            }
        }
        keyring::Error::PlatformFailure(platform_err) => {
            let err_str = platform_err.to_string().to_lowercase();
            if err_str.contains("-25308") || err_str.contains("interaction not allowed") {
                Status::INTERACTION_NOT_ALLOWED
            } else if err_str.contains("-25293") || err_str.contains("authorization") {
                Status::AUTH_FAILED
            } else {
                Status::INTERNAL_COMPONENT
            }
        }
        _ => Status::INTERNAL_COMPONENT,
    }
}

fn index_user(chunk: usize) -> String {
    format!("{INDEX_USER_PREFIX}.{chunk}")
}

/// Split the index into JSON arrays of at most `max_bytes` each. An item too
/// large for any chunk gets a chunk of its own.
fn chunk_index(
    index: &[ItemAttributes],
    max_bytes: usize,
) -> Result<Vec<String>, serde_json::Error> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    // Brackets of the enclosing array.
    let mut current_len = 2;

    for attributes in index {
        let json = serde_json::to_string(attributes)?;
        let added = usize::from(!current.is_empty()) + json.len();
        if !current.is_empty() && current_len + added > max_bytes {
            chunks.push(format!("[{}]", current.join(",")));
            current.clear();
            current_len = 2 + json.len();
        } else {
            current_len += added;
        }
        current.push(json);
    }
    if !current.is_empty() {
        chunks.push(format!("[{}]", current.join(",")));
    }
    Ok(chunks)
}

/// Entries written by an update that is not committed yet.
#[derive(Default)]
struct StagedUpdate {
    /// Identities that received a moved secret.
    created: Vec<ItemAttributes>,
    /// Identities whose secret was overwritten, with the previous secret.
    overwritten: Vec<(ItemAttributes, Zeroizing<Vec<u8>>)>,
    /// Old identities to delete once the index is committed.
    moved_from: Vec<ItemAttributes>,
}

#[derive(Debug)]
pub struct KeyringStore {
    service: String,
    /// Serializes index read-modify-write within this process.
    index_lock: Mutex<()>,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            index_lock: Mutex::new(()),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, user: &str) -> Result<Entry, BackendError> {
        Ok(Entry::new(&self.service, user)?)
    }

    fn item_entry(&self, attributes: &ItemAttributes) -> Result<Entry, BackendError> {
        let user = serde_json::to_string(attributes)?;
        self.entry(&user)
    }

    /// Read every index chunk, stopping at the first missing one.
    fn load_index(&self) -> Result<Vec<ItemAttributes>, BackendError> {
        let mut index = Vec::new();
        for chunk in 0.. {
            match self.entry(&index_user(chunk))?.get_secret() {
                Ok(json) => {
                    let items: Vec<ItemAttributes> = serde_json::from_slice(&json)?;
                    index.extend(items);
                }
                Err(keyring::Error::NoEntry) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(index)
    }

    /// Write the index as consecutive chunks and drop the chunks left over
    /// from a longer index.
    fn save_index(&self, index: &[ItemAttributes]) -> Result<(), BackendError> {
        let chunks = chunk_index(index, INDEX_CHUNK_BYTES)?;
        for (n, json) in chunks.iter().enumerate() {
            self.entry(&index_user(n))?.set_secret(json.as_bytes())?;
        }
        for n in chunks.len().. {
            match self.entry(&index_user(n))?.delete_credential() {
                Ok(()) => {}
                Err(keyring::Error::NoEntry) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Secret of an indexed item; `None` when the entry vanished behind our back.
    fn read_secret(
        &self,
        attributes: &ItemAttributes,
    ) -> Result<Option<Zeroizing<Vec<u8>>>, BackendError> {
        match self.item_entry(attributes)?.get_secret() {
            Ok(secret) => Ok(Some(Zeroizing::new(secret))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_secret(&self, attributes: &ItemAttributes, data: &[u8]) -> Result<(), BackendError> {
        self.item_entry(attributes)?.set_secret(data)?;
        Ok(())
    }

    fn delete_secret(&self, attributes: &ItemAttributes) -> Result<(), BackendError> {
        match self.item_entry(attributes)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn try_add(
        &self,
        request: &AddRequest,
    ) -> Result<OperationResult<Option<StoreItem>>, BackendError> {
        let _guard = self.index_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let attributes = request.attributes();
        let mut index = self.load_index()?;
        if index.contains(&attributes) {
            return Ok(OperationResult::new(Status::DUPLICATE_ITEM, None));
        }

        self.write_secret(&attributes, &request.data)?;
        index.push(attributes.clone());
        if let Err(e) = self.save_index(&index) {
            let _ = self.delete_secret(&attributes);
            return Err(e);
        }

        let stored = StoreItem {
            attributes,
            data: Some(request.data.clone()),
        };
        Ok(OperationResult::new(Status::SUCCESS, request.reply(stored)))
    }

    fn try_lookup(
        &self,
        request: &LookupRequest,
    ) -> Result<OperationResult<LookupReply>, BackendError> {
        let _guard = self.index_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let cap = request.limit.cap().unwrap_or(usize::MAX);
        let mut matched = Vec::new();
        for attributes in self.load_index()? {
            if matched.len() == cap {
                break;
            }
            if !request.matches(&attributes) {
                continue;
            }
            let Some(data) = self.read_secret(&attributes)? else {
                tracing::debug!(service = %self.service, "Skipping index entry without a secret");
                continue;
            };
            matched.push(StoreItem {
                attributes,
                data: Some(data),
            });
        }
        Ok(request.reply(matched))
    }

    /// Apply an update in three steps: write every new secret, commit the
    /// index, then delete the entries the secrets moved away from. A failure
    /// before the commit restores every entry touched so far.
    fn try_update(
        &self,
        request: &LookupRequest,
        changes: &UpdateAttributes,
    ) -> Result<Status, BackendError> {
        if changes.is_empty() {
            return Ok(Status::PARAM);
        }

        let _guard = self.index_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut index = self.load_index()?;
        let targets: Vec<usize> = index
            .iter()
            .enumerate()
            .filter(|(_, attrs)| request.matches(attrs))
            .map(|(idx, _)| idx)
            .collect();
        if targets.is_empty() {
            return Ok(Status::ITEM_NOT_FOUND);
        }
        if changes.collides(&index, &targets) {
            return Ok(Status::DUPLICATE_ITEM);
        }

        let mut staged = StagedUpdate::default();
        let outcome = self
            .stage_update(&mut index, &targets, changes, &mut staged)
            .and_then(|()| self.save_index(&index));
        if let Err(e) = outcome {
            self.roll_back(staged);
            return Err(e);
        }

        for old in &staged.moved_from {
            if let Err(e) = self.delete_secret(old) {
                tracing::warn!(service = %self.service, error = %e, "Failed to delete moved credential entry");
            }
        }
        Ok(Status::SUCCESS)
    }

    /// Write the new secrets of every target and rewrite `index` in place.
    fn stage_update(
        &self,
        index: &mut [ItemAttributes],
        targets: &[usize],
        changes: &UpdateAttributes,
        staged: &mut StagedUpdate,
    ) -> Result<(), BackendError> {
        for &idx in targets {
            let old = index[idx].clone();
            let new = changes.apply(&old);
            if new == old {
                let Some(data) = &changes.data else { continue };
                let Some(previous) = self.read_secret(&old)? else {
                    continue;
                };
                self.write_secret(&old, data)?;
                staged.overwritten.push((old, previous));
            } else {
                let data = match &changes.data {
                    Some(data) => data.clone(),
                    None => match self.read_secret(&old)? {
                        Some(data) => data,
                        None => continue,
                    },
                };
                self.write_secret(&new, &data)?;
                staged.created.push(new.clone());
                staged.moved_from.push(old);
            }
            index[idx] = new;
        }
        Ok(())
    }

    fn roll_back(&self, staged: StagedUpdate) {
        for created in &staged.created {
            if let Err(e) = self.delete_secret(created) {
                tracing::warn!(service = %self.service, error = %e, "Failed to roll back moved credential");
            }
        }
        for (attributes, previous) in &staged.overwritten {
            if let Err(e) = self.write_secret(attributes, previous) {
                tracing::warn!(service = %self.service, error = %e, "Failed to restore credential secret");
            }
        }
    }

    /// Delete every match. When a delete fails part way, the index is rewritten
    /// without the entries already gone, so it never lists a missing secret.
    fn try_remove(&self, request: &LookupRequest) -> Result<Status, BackendError> {
        let _guard = self.index_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let index = self.load_index()?;
        let (matched, mut kept): (Vec<_>, Vec<_>) =
            index.into_iter().partition(|attrs| request.matches(attrs));
        if matched.is_empty() {
            return Ok(Status::ITEM_NOT_FOUND);
        }

        for (n, attributes) in matched.iter().enumerate() {
            if let Err(e) = self.delete_secret(attributes) {
                kept.extend(matched[n..].iter().cloned());
                self.save_index(&kept)?;
                return Err(e);
            }
        }
        self.save_index(&kept)?;
        Ok(Status::SUCCESS)
    }

    /// Turn a backend failure into the status-carrying answer of `operation`.
    fn settle<T>(
        &self,
        operation: &str,
        outcome: Result<T, BackendError>,
        failed: impl FnOnce(Status) -> T,
    ) -> T {
        outcome.unwrap_or_else(|e| {
            let status = e.status();
            tracing::warn!(
                service = %self.service,
                operation,
                status = status.code(),
                error = %e,
                "Keyring operation failed"
            );
            failed(status)
        })
    }
}

impl SecureStore for KeyringStore {
    fn add(&self, request: &AddRequest) -> OperationResult<Option<StoreItem>> {
        self.settle("add", self.try_add(request), |status| {
            OperationResult::new(status, None)
        })
    }

    fn lookup(&self, request: &LookupRequest) -> OperationResult<LookupReply> {
        self.settle("lookup", self.try_lookup(request), |status| {
            OperationResult::new(status, LookupReply::None)
        })
    }

    fn update(&self, request: &LookupRequest, changes: &UpdateAttributes) -> Status {
        self.settle("update", self.try_update(request, changes), |status| status)
    }

    fn remove(&self, request: &LookupRequest) -> Status {
        self.settle("remove", self.try_remove(request), |status| status)
    }

    fn backend_name(&self) -> &'static str {
        "keyring"
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::model::CredentialType;

    fn platform(msg: &str) -> Box<dyn std::error::Error + Send + Sync> {
        Box::new(io::Error::other(msg.to_string()))
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(keyring_status(&keyring::Error::NoEntry), Status::ITEM_NOT_FOUND);
        assert_eq!(
            keyring_status(&keyring::Error::BadEncoding(vec![0xff])),
            Status::DECODE
        );
        assert_eq!(
            keyring_status(&keyring::Error::TooLong("user".to_string(), 255)),
            Status::PARAM
        );
        assert_eq!(
            keyring_status(&keyring::Error::Invalid("service".to_string(), "empty".to_string())),
            Status::PARAM
        );
    }

    #[test]
    fn test_platform_error_mapping() {
        assert_eq!(
            keyring_status(&keyring::Error::PlatformFailure(platform(
                "OSStatus -25308: User interaction is not allowed."
            ))),
            Status::INTERACTION_NOT_ALLOWED
        );
        assert_eq!(
            keyring_status(&keyring::Error::PlatformFailure(platform("OSStatus -25293"))),
            Status::AUTH_FAILED
        );
        assert_eq!(
            keyring_status(&keyring::Error::PlatformFailure(platform("bus closed"))),
            Status::INTERNAL_COMPONENT
        );
        assert_eq!(
            keyring_status(&keyring::Error::NoStorageAccess(platform("permission denied"))),
            Status::AUTH_FAILED
        );
        assert_eq!(
            keyring_status(&keyring::Error::NoStorageAccess(platform("locked"))),
            Status::NOT_AVAILABLE
        );
    }

    #[test]
    fn test_corrupt_index_is_decode_error() {
        let err = serde_json::from_str::<Vec<ItemAttributes>>("not json").unwrap_err();
        assert_eq!(BackendError::from(err).status(), Status::DECODE);
    }

    fn attrs(account: &str) -> ItemAttributes {
        ItemAttributes {
            class: CredentialType::InternetPassword,
            account: Some(account.to_string()),
            server: Some("keychain-hanger.app".to_string()),
        }
    }

    #[test]
    fn test_index_chunks_stay_under_limit() {
        let index: Vec<_> = (0..200).map(|i| attrs(&format!("user-{i}"))).collect();
        let chunks = chunk_index(&index, INDEX_CHUNK_BYTES).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|chunk| chunk.len() <= INDEX_CHUNK_BYTES));

        let mut rebuilt = Vec::new();
        for chunk in &chunks {
            rebuilt.extend(serde_json::from_str::<Vec<ItemAttributes>>(chunk).unwrap());
        }
        assert_eq!(rebuilt, index);
    }

    #[test]
    fn test_index_chunks_for_small_index() {
        assert!(chunk_index(&[], INDEX_CHUNK_BYTES).unwrap().is_empty());

        let chunks = chunk_index(&[attrs("alice"), attrs("bob")], INDEX_CHUNK_BYTES).unwrap();
        assert_eq!(chunks.len(), 1);

        // An oversized item still gets written on its own
        let chunks = chunk_index(&[attrs("alice"), attrs("bob")], 10).unwrap();
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_index_user_names() {
        assert_eq!(index_user(0), "__index__.0");
        assert_eq!(index_user(12), "__index__.12");
    }

    #[test]
    fn test_entry_user_is_attribute_json() {
        let attributes = ItemAttributes {
            class: CredentialType::InternetPassword,
            account: Some("alice".to_string()),
            server: None,
        };
        assert_eq!(
            serde_json::to_string(&attributes).unwrap(),
            r#"{"class":"internet_password","account":"alice"}"#
        );
    }

    #[test]
    #[ignore] // Requires actual keychain access
    fn test_keyring_roundtrip() {
        let store = KeyringStore::new("keychain-hanger-test");
        let filter = LookupRequest::new(CredentialType::InternetPassword)
            .account(Some("roundtrip-user".to_string()))
            .returning(true, true);
        let _ = store.remove(&filter);

        let add = AddRequest::new(CredentialType::InternetPassword, "test-secret")
            .account(Some("roundtrip-user".to_string()));
        assert_eq!(store.add(&add).status, Status::SUCCESS);

        let items = store.lookup(&filter).item.into_items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].data.as_deref().map(Vec::as_slice),
            Some(&b"test-secret"[..])
        );

        assert_eq!(store.remove(&filter), Status::SUCCESS);
        assert_eq!(store.lookup(&filter).status, Status::ITEM_NOT_FOUND);
    }
}

//! The secure credential store boundary.
//!
//! A store exposes four primitives and reports every outcome as a [`Status`]:
//! - **add**: create one item, optionally returning it
//! - **lookup**: find items matching a filter, up to a limit
//! - **update**: change attributes or data of every matching item
//! - **remove**: delete every matching item
//!
//! Two stores ship with the crate: [`KeyringStore`] for the OS keychain and
//! [`MemoryStore`] for an in-process store with the same semantics.

pub mod keyring;
pub mod memory;

pub use self::keyring::KeyringStore;
pub use self::memory::MemoryStore;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::model::{CredentialType, OperationResult};
use crate::status::Status;

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Attributes identifying a stored item. Two items never share all three.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemAttributes {
    pub class: CredentialType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

/// An item as handed back by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreItem {
    pub attributes: ItemAttributes,
    /// Secret bytes; absent when the request did not ask for data.
    pub data: Option<Zeroizing<Vec<u8>>>,
}

impl StoreItem {
    /// Shape a stored item according to a request's return flags.
    fn project(self, return_attributes: bool, return_data: bool) -> Option<StoreItem> {
        if !return_attributes && !return_data {
            return None;
        }
        Some(StoreItem {
            attributes: self.attributes,
            data: if return_data { self.data } else { None },
        })
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Creation request for a single item.
#[derive(Debug, Clone)]
pub struct AddRequest {
    pub class: CredentialType,
    pub data: Zeroizing<Vec<u8>>,
    pub account: Option<String>,
    pub server: Option<String>,
    pub return_attributes: bool,
    pub return_data: bool,
}

impl AddRequest {
    pub fn new(class: CredentialType, data: impl Into<Vec<u8>>) -> Self {
        Self {
            class,
            data: Zeroizing::new(data.into()),
            account: None,
            server: None,
            return_attributes: false,
            return_data: false,
        }
    }

    pub fn account(mut self, account: Option<String>) -> Self {
        self.account = account;
        self
    }

    pub fn server(mut self, server: Option<String>) -> Self {
        self.server = server;
        self
    }

    pub fn returning(mut self, attributes: bool, data: bool) -> Self {
        self.return_attributes = attributes;
        self.return_data = data;
        self
    }

    pub fn attributes(&self) -> ItemAttributes {
        ItemAttributes {
            class: self.class,
            account: self.account.clone(),
            server: self.server.clone(),
        }
    }

    pub(crate) fn reply(&self, stored: StoreItem) -> Option<StoreItem> {
        stored.project(self.return_attributes, self.return_data)
    }
}

/// Maximum number of items a lookup may answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchLimit {
    /// A single item, answered as [`LookupReply::One`].
    One,
    /// Every match.
    #[default]
    All,
    /// At most `n` items. Zero is rejected with [`Status::PARAM`].
    Count(usize),
}

impl MatchLimit {
    pub(crate) fn cap(self) -> Option<usize> {
        match self {
            MatchLimit::One => Some(1),
            MatchLimit::All => None,
            MatchLimit::Count(n) => Some(n),
        }
    }
}

impl From<usize> for MatchLimit {
    fn from(n: usize) -> Self {
        MatchLimit::Count(n)
    }
}

/// Filter shared by lookup, update and remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub class: CredentialType,
    pub account: Option<String>,
    pub server: Option<String>,
    pub limit: MatchLimit,
    pub return_attributes: bool,
    pub return_data: bool,
}

impl LookupRequest {
    pub fn new(class: CredentialType) -> Self {
        Self {
            class,
            account: None,
            server: None,
            limit: MatchLimit::All,
            return_attributes: false,
            return_data: false,
        }
    }

    pub fn account(mut self, account: Option<String>) -> Self {
        self.account = account;
        self
    }

    pub fn server(mut self, server: Option<String>) -> Self {
        self.server = server;
        self
    }

    pub fn limit(mut self, limit: MatchLimit) -> Self {
        self.limit = limit;
        self
    }

    pub fn returning(mut self, attributes: bool, data: bool) -> Self {
        self.return_attributes = attributes;
        self.return_data = data;
        self
    }

    pub fn matches(&self, attributes: &ItemAttributes) -> bool {
        attributes.class == self.class
            && self
                .account
                .as_ref()
                .is_none_or(|account| attributes.account.as_ref() == Some(account))
            && self
                .server
                .as_ref()
                .is_none_or(|server| attributes.server.as_ref() == Some(server))
    }

    /// Build the lookup answer from every matching stored item, in store order.
    pub(crate) fn reply(&self, matched: Vec<StoreItem>) -> OperationResult<LookupReply> {
        if self.limit == MatchLimit::Count(0) {
            return OperationResult::new(Status::PARAM, LookupReply::None);
        }
        if matched.is_empty() {
            return OperationResult::new(Status::ITEM_NOT_FOUND, LookupReply::None);
        }
        let cap = self.limit.cap().unwrap_or(usize::MAX);
        let mut items: Vec<StoreItem> = matched
            .into_iter()
            .take(cap)
            .filter_map(|item| item.project(self.return_attributes, self.return_data))
            .collect();

        // Found, but nothing was asked to be returned.
        if items.is_empty() {
            return OperationResult::new(Status::SUCCESS, LookupReply::None);
        }
        let reply = match self.limit {
            MatchLimit::One => LookupReply::One(items.remove(0)),
            MatchLimit::All | MatchLimit::Count(_) => LookupReply::Many(items),
        };
        OperationResult::new(Status::SUCCESS, reply)
    }
}

/// Attribute and data changes applied by an update.
#[derive(Debug, Clone, Default)]
pub struct UpdateAttributes {
    pub account: Option<String>,
    pub server: Option<String>,
    pub data: Option<Zeroizing<Vec<u8>>>,
}

impl UpdateAttributes {
    pub fn is_empty(&self) -> bool {
        self.account.is_none() && self.server.is_none() && self.data.is_none()
    }

    /// Attributes an item ends up with once this update is applied.
    pub fn apply(&self, attributes: &ItemAttributes) -> ItemAttributes {
        ItemAttributes {
            class: attributes.class,
            account: self.account.clone().or_else(|| attributes.account.clone()),
            server: self.server.clone().or_else(|| attributes.server.clone()),
        }
    }

    /// Whether applying this update to `all[targets]` leaves two items with
    /// the same attributes.
    pub(crate) fn collides(&self, all: &[ItemAttributes], targets: &[usize]) -> bool {
        let mut identities: HashSet<ItemAttributes> = all
            .iter()
            .enumerate()
            .filter(|(idx, _)| !targets.contains(idx))
            .map(|(_, attrs)| attrs.clone())
            .collect();
        targets
            .iter()
            .any(|&idx| !identities.insert(self.apply(&all[idx])))
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Shape of a lookup answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupReply {
    /// Nothing was returned.
    None,
    /// A single item, for [`MatchLimit::One`].
    One(StoreItem),
    /// A list of items.
    Many(Vec<StoreItem>),
}

impl LookupReply {
    /// Flatten into a list; `None` when the store returned nothing.
    pub fn into_items(self) -> Option<Vec<StoreItem>> {
        match self {
            LookupReply::None => None,
            LookupReply::One(item) => Some(vec![item]),
            LookupReply::Many(items) => Some(items),
        }
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// A secure credential store.
///
/// Implementations synchronize internally; every call is blocking and
/// independent of the others.
pub trait SecureStore: Send + Sync {
    /// Create an item. Answers [`Status::DUPLICATE_ITEM`] when an item with the
    /// same attributes already exists.
    fn add(&self, request: &AddRequest) -> OperationResult<Option<StoreItem>>;

    /// Find the items matching `request`.
    fn lookup(&self, request: &LookupRequest) -> OperationResult<LookupReply>;

    /// Apply `changes` to every item matching `request`.
    fn update(&self, request: &LookupRequest, changes: &UpdateAttributes) -> Status;

    /// Delete every item matching `request`.
    fn remove(&self, request: &LookupRequest) -> Status;

    /// Name used in logs.
    fn backend_name(&self) -> &'static str;
}

impl<S: SecureStore + ?Sized> SecureStore for Box<S> {
    fn add(&self, request: &AddRequest) -> OperationResult<Option<StoreItem>> {
        (**self).add(request)
    }

    fn lookup(&self, request: &LookupRequest) -> OperationResult<LookupReply> {
        (**self).lookup(request)
    }

    fn update(&self, request: &LookupRequest, changes: &UpdateAttributes) -> Status {
        (**self).update(request, changes)
    }

    fn remove(&self, request: &LookupRequest) -> Status {
        (**self).remove(request)
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}

impl<S: SecureStore + ?Sized> SecureStore for Arc<S> {
    fn add(&self, request: &AddRequest) -> OperationResult<Option<StoreItem>> {
        (**self).add(request)
    }

    fn lookup(&self, request: &LookupRequest) -> OperationResult<LookupReply> {
        (**self).lookup(request)
    }

    fn update(&self, request: &LookupRequest, changes: &UpdateAttributes) -> Status {
        (**self).update(request, changes)
    }

    fn remove(&self, request: &LookupRequest) -> Status {
        (**self).remove(request)
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}

impl<S: SecureStore + ?Sized> SecureStore for &S {
    fn add(&self, request: &AddRequest) -> OperationResult<Option<StoreItem>> {
        (**self).add(request)
    }

    fn lookup(&self, request: &LookupRequest) -> OperationResult<LookupReply> {
        (**self).lookup(request)
    }

    fn update(&self, request: &LookupRequest, changes: &UpdateAttributes) -> Status {
        (**self).update(request, changes)
    }

    fn remove(&self, request: &LookupRequest) -> Status {
        (**self).remove(request)
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}

//! In-process credential store.
//!
//! Keeps items in insertion order behind a mutex and answers with the same
//! statuses as the keychain-backed store. Contents are lost on drop.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::model::OperationResult;
use crate::status::Status;
use crate::store::{
    AddRequest, ItemAttributes, LookupReply, LookupRequest, SecureStore, StoreItem,
    UpdateAttributes,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<Vec<StoreItem>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items currently held, across all classes.
    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Attributes of every stored item, in insertion order.
    pub fn attributes(&self) -> Vec<ItemAttributes> {
        self.items().iter().map(|i| i.attributes.clone()).collect()
    }

    fn items(&self) -> MutexGuard<'_, Vec<StoreItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SecureStore for MemoryStore {
    fn add(&self, request: &AddRequest) -> OperationResult<Option<StoreItem>> {
        let attributes = request.attributes();
        let mut items = self.items();
        if items.iter().any(|i| i.attributes == attributes) {
            return OperationResult::new(Status::DUPLICATE_ITEM, None);
        }

        let stored = StoreItem {
            attributes,
            data: Some(request.data.clone()),
        };
        items.push(stored.clone());
        OperationResult::new(Status::SUCCESS, request.reply(stored))
    }

    fn lookup(&self, request: &LookupRequest) -> OperationResult<LookupReply> {
        let matched = self
            .items()
            .iter()
            .filter(|i| request.matches(&i.attributes))
            .cloned()
            .collect();
        request.reply(matched)
    }

    fn update(&self, request: &LookupRequest, changes: &UpdateAttributes) -> Status {
        if changes.is_empty() {
            return Status::PARAM;
        }

        let mut items = self.items();
        let targets: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, i)| request.matches(&i.attributes))
            .map(|(idx, _)| idx)
            .collect();
        if targets.is_empty() {
            return Status::ITEM_NOT_FOUND;
        }

        let all: Vec<ItemAttributes> = items.iter().map(|i| i.attributes.clone()).collect();
        if changes.collides(&all, &targets) {
            return Status::DUPLICATE_ITEM;
        }

        for idx in targets {
            let item = &mut items[idx];
            item.attributes = changes.apply(&item.attributes);
            if let Some(data) = &changes.data {
                item.data = Some(data.clone());
            }
        }
        Status::SUCCESS
    }

    fn remove(&self, request: &LookupRequest) -> Status {
        let mut items = self.items();
        let before = items.len();
        items.retain(|i| !request.matches(&i.attributes));
        if items.len() == before {
            Status::ITEM_NOT_FOUND
        } else {
            Status::SUCCESS
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

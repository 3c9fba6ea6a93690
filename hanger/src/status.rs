//! Status codes reported by a secure credential store.
//!
//! The code space belongs to the store. The constants below are the values
//! `MemoryStore` and `KeyringStore` report; a custom store may return any
//! other `i32`, which is passed through untouched.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome signal of a single store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(i32);

impl Status {
    pub const SUCCESS: Status = Status(0);
    pub const PARAM: Status = Status(-50);
    pub const INTERNAL_COMPONENT: Status = Status(-2070);
    pub const NOT_AVAILABLE: Status = Status(-25291);
    pub const AUTH_FAILED: Status = Status(-25293);
    pub const DUPLICATE_ITEM: Status = Status(-25299);
    pub const ITEM_NOT_FOUND: Status = Status(-25300);
    pub const INTERACTION_NOT_ALLOWED: Status = Status(-25308);
    pub const DECODE: Status = Status(-26275);

    pub const fn from_code(code: i32) -> Self {
        Status(code)
    }

    pub const fn code(self) -> i32 {
        self.0
    }

    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Short human-readable description, `None` for codes outside the known set.
    pub fn message(self) -> Option<&'static str> {
        let msg = match self {
            Self::SUCCESS => "no error",
            Self::PARAM => "one or more parameters passed to the function were not valid",
            Self::INTERNAL_COMPONENT => "an internal component failed",
            Self::NOT_AVAILABLE => "no keychain is available",
            Self::AUTH_FAILED => "authorization or authentication failed",
            Self::DUPLICATE_ITEM => "the item already exists",
            Self::ITEM_NOT_FOUND => "the item cannot be found",
            Self::INTERACTION_NOT_ALLOWED => "user interaction is not allowed",
            Self::DECODE => "unable to decode the provided data",
            _ => return None,
        };
        Some(msg)
    }
}

impl From<i32> for Status {
    fn from(code: i32) -> Self {
        Status(code)
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(msg) => write!(f, "{msg} ({})", self.0),
            None => write!(f, "unknown status ({})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_zero() {
        assert!(Status::SUCCESS.is_success());
        assert_eq!(Status::SUCCESS.code(), 0);
        assert!(!Status::ITEM_NOT_FOUND.is_success());
    }

    #[test]
    fn unknown_codes_pass_through() {
        let status = Status::from(-9999);
        assert_eq!(status.code(), -9999);
        assert!(status.message().is_none());
        assert_eq!(status.to_string(), "unknown status (-9999)");
    }

    #[test]
    fn every_named_status_has_a_message() {
        let named = [
            Status::SUCCESS,
            Status::PARAM,
            Status::INTERNAL_COMPONENT,
            Status::NOT_AVAILABLE,
            Status::AUTH_FAILED,
            Status::DUPLICATE_ITEM,
            Status::ITEM_NOT_FOUND,
            Status::INTERACTION_NOT_ALLOWED,
            Status::DECODE,
        ];
        assert!(named.iter().all(|status| status.message().is_some()));
        // Codes no bundled store reports are left unnamed
        assert!(Status::from(-4).message().is_none());
    }

    #[test]
    fn display_includes_code() {
        assert_eq!(
            Status::ITEM_NOT_FOUND.to_string(),
            "the item cannot be found (-25300)"
        );
    }

    #[test]
    fn serializes_as_bare_integer() {
        let json = serde_json::to_string(&Status::DUPLICATE_ITEM).unwrap();
        assert_eq!(json, "-25299");
    }
}

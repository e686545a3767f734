use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::{Uuid, Version};

/// Opaque identifier correlating one mutating call with its ledger entry
///
/// Any string can be carried in a `TransactionId`; only identifiers that pass
/// [`TransactionId::is_valid`] are accepted by the mutating operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Issue a fresh identifier: a UUIDv7 (millisecond timestamp plus random bits)
    pub fn generate() -> Self {
        Self(Uuid::now_v7().hyphenated().to_string())
    }

    /// Structural check of the identifier format. Does not consult the audit log.
    pub fn is_valid(&self) -> bool {
        // Uuid::try_parse also accepts simple and braced forms, only the hyphenated one is issued
        self.0.len() == uuid::fmt::Hyphenated::LENGTH
            && Uuid::try_parse(&self.0)
                .is_ok_and(|id| id.get_version() == Some(Version::SortRand))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TransactionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_valid() {
        let id = TransactionId::generate();

        assert!(id.is_valid());
        assert_eq!(id.as_str().len(), 36);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: HashSet<_> = (0..1_000).map(|_| TransactionId::generate()).collect();

        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn test_rejects_malformed_ids() {
        assert!(!TransactionId::from("").is_valid());
        assert!(!TransactionId::from("tx-1").is_valid());
        assert!(!TransactionId::from("zzzzzzzz-zzzz-zzzz-zzzz-zzzzzzzzzzzz").is_valid());
    }

    #[test]
    fn test_rejects_other_uuid_versions() {
        // v4
        assert!(!TransactionId::from("67e55044-10b1-426f-9247-bb680e5fe0c8").is_valid());
    }

    #[test]
    fn test_rejects_non_hyphenated_form() {
        let simple = Uuid::now_v7().simple().to_string();

        assert!(!TransactionId::from(simple).is_valid());
    }
}

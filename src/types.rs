/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// Data-plane operations routed by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    List,
    Read,
    Create,
    Replace,
    Delete,
}

impl Operation {
    /// Create and full-replace writes are checked against the collection schema
    pub fn validates_payload(self) -> bool {
        matches!(self, Operation::Create | Operation::Replace)
    }

    /// Operations addressing a single document by its identifier
    pub fn targets_document(self) -> bool {
        matches!(self, Operation::Read | Operation::Replace | Operation::Delete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Replace => "replace",
            Operation::Delete => "delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_writes_validate() {
        assert!(Operation::Create.validates_payload());
        assert!(Operation::Replace.validates_payload());
        assert!(!Operation::Delete.validates_payload());
        assert!(!Operation::List.validates_payload());
    }

    #[test]
    fn document_targets() {
        assert!(!Operation::List.targets_document());
        assert!(!Operation::Create.targets_document());
        assert!(Operation::Read.targets_document());
    }
}

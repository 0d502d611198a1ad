//! Newtype identifiers for every Trellis entity.
//!
//! Ids are opaque strings (uuid v4 when generated here) so adapters can
//! round-trip externally assigned keys without loss.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn short(&self) -> &str {
                match self.0.char_indices().nth(8) {
                    Some((idx, _)) => &self.0[..idx],
                    None => self.0.as_str(),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// The isolation boundary; no query, mutation, or export crosses tenants
    TenantId
}

string_id! {
    /// A project owned by a tenant; instances are always bound to one
    ProjectId
}

string_id! {
    /// A user or system actor performing an operation
    ActorId
}

string_id! {
    /// An immutable published template revision
    TemplateVersionId
}

string_id! {
    /// One execution of a template version against a project
    WorkInstanceId
}

string_id! {
    /// One unit of work inside an instance
    StepId
}

string_id! {
    /// One immutable approval decision record
    ApprovalId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = WorkInstanceId::generate();
        let b = WorkInstanceId::generate();
        assert_ne!(a, b);
        assert!(!a.0.is_empty());
    }

    #[test]
    fn short_truncates_to_eight() {
        let id = TenantId::new("tenant-alpha-0001");
        assert_eq!(id.short(), "tenant-a");

        let tiny = TenantId::new("t1");
        assert_eq!(tiny.short(), "t1");
    }

    #[test]
    fn short_respects_char_boundaries() {
        let id = TenantId::new("zürich-office-01");
        assert_eq!(id.short(), "zürich-o");

        let exact = TenantId::new("überbaü8");
        assert_eq!(exact.short(), "überbaü8");
    }

    #[test]
    fn display_round_trips() {
        let id = StepId::new("step-1");
        assert_eq!(format!("{}", id), "step-1");
        assert_eq!(id.as_str(), "step-1");
    }
}

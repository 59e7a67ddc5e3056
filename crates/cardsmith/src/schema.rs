//! External schema validation hook.

use cardsmith_card::CardRecord;

/// Record-level rules owned by the caller.
///
/// An empty list means the record is accepted.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, record: &CardRecord) -> Vec<String>;
}

/// Accepts every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveSchema;

impl SchemaValidator for PermissiveSchema {
    fn validate(&self, _record: &CardRecord) -> Vec<String> {
        Vec::new()
    }
}

/// Requires a non-blank name.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireName;

impl SchemaValidator for RequireName {
    fn validate(&self, record: &CardRecord) -> Vec<String> {
        if record.name().trim().is_empty() {
            vec!["data.name: must not be empty".into()]
        } else {
            Vec::new()
        }
    }
}

//! 变更审计日志

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::{Actor, PageRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
    Sync,
    Import,
    Issue,
    Renew,
    Revoke,
    Deploy,
    Upload,
    RotateCredentials,
}

string_enum!(ChangeAction {
    Create => "create",
    Update => "update",
    Delete => "delete",
    Sync => "sync",
    Import => "import",
    Issue => "issue",
    Renew => "renew",
    Revoke => "revoke",
    Deploy => "deploy",
    Upload => "upload",
    RotateCredentials => "rotate_credentials",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Success,
    PartialSuccess,
    Failed,
}

string_enum!(ChangeStatus {
    Success => "success",
    PartialSuccess => "partial_success",
    Failed => "failed",
});

/// Resource kinds that show up in the audit trail.
pub mod resource {
    pub const ZONE: &str = "zone";
    pub const PROVIDER: &str = "provider";
    pub const RECORD: &str = "record";
    pub const CERTIFICATE: &str = "certificate";
    pub const DEPLOYMENT: &str = "certificate_deployment";
}

/// Append-only audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub id: String,
    pub tenant_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub action: ChangeAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    pub status: ChangeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub actor_id: String,
    pub client_ip: String,
    pub created_at: DateTime<Utc>,
}

impl ChangeLogEntry {
    pub fn new(
        actor: &Actor,
        resource_type: &str,
        resource_id: impl Into<String>,
        action: ChangeAction,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: actor.tenant_id.clone(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.into(),
            action,
            before: None,
            after: None,
            status: ChangeStatus::Success,
            description: None,
            actor_id: actor.id.clone(),
            client_ip: actor.client_ip.clone(),
            created_at: Utc::now(),
        }
    }

    /// Snapshot failures are swallowed; an audit row without a snapshot is still useful.
    #[must_use]
    pub fn before<T: Serialize>(mut self, value: &T) -> Self {
        self.before = serde_json::to_value(value).ok();
        self
    }

    #[must_use]
    pub fn after<T: Serialize>(mut self, value: &T) -> Self {
        self.after = serde_json::to_value(value).ok();
        self
    }

    #[must_use]
    pub fn status(mut self, status: ChangeStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogQuery {
    pub tenant_id: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub action: Option<ChangeAction>,
    #[serde(default)]
    pub page: PageRequest,
}

impl ChangeLogQuery {
    pub fn matches(&self, entry: &ChangeLogEntry) -> bool {
        entry.tenant_id == self.tenant_id
            && self
                .resource_type
                .as_deref()
                .is_none_or(|t| entry.resource_type == t)
            && self
                .resource_id
                .as_deref()
                .is_none_or(|id| entry.resource_id == id)
            && self.action.is_none_or(|a| entry.action == a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_copies_actor() {
        let actor = Actor::new("alice", "10.0.0.1", "t1");
        let entry = ChangeLogEntry::new(&actor, resource::ZONE, "z1", ChangeAction::Create)
            .after(&serde_json::json!({"name": "example.com"}))
            .status(ChangeStatus::PartialSuccess);

        assert_eq!(entry.tenant_id, "t1");
        assert_eq!(entry.client_ip, "10.0.0.1");
        assert_eq!(entry.after.unwrap()["name"], "example.com");
        assert_eq!(entry.status.as_str(), "partial_success");
    }
}

//! Device identity resolution
//!
//! Every server call is scoped to one device id. A child device id, when
//! provisioned, overrides the primary device id. An unprovisioned device is
//! a normal state, not an error.

use crate::GuardianConfig;
use parking_lot::RwLock;

/// Source of the identity used to scope server calls
pub trait IdentityResolver: Send + Sync {
    fn child_device_id(&self) -> Option<String>;

    fn device_id(&self) -> Option<String>;

    fn server_url(&self) -> String;

    /// Child device id if set, otherwise the primary device id
    fn resolve_device_id(&self) -> Option<String> {
        self.child_device_id()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| self.device_id().filter(|id| !id.trim().is_empty()))
    }
}

#[derive(Debug, Default, Clone)]
struct IdentityState {
    server_url: String,
    device_id: Option<String>,
    child_device_id: Option<String>,
}

/// In-process identity that can be provisioned after start-up
#[derive(Debug, Default)]
pub struct StaticIdentity {
    state: RwLock<IdentityState>,
}

impl StaticIdentity {
    pub fn new(
        server_url: impl Into<String>,
        device_id: Option<String>,
        child_device_id: Option<String>,
    ) -> Self {
        Self {
            state: RwLock::new(IdentityState {
                server_url: server_url.into(),
                device_id,
                child_device_id,
            }),
        }
    }

    pub fn from_config(config: &GuardianConfig) -> Self {
        Self::new(
            config.server_url.clone(),
            config.device_id.clone(),
            config.child_device_id.clone(),
        )
    }

    pub fn set_device_id(&self, device_id: Option<String>) {
        self.state.write().device_id = device_id;
    }

    pub fn set_child_device_id(&self, child_device_id: Option<String>) {
        self.state.write().child_device_id = child_device_id;
    }

    pub fn set_server_url(&self, server_url: impl Into<String>) {
        self.state.write().server_url = server_url.into();
    }
}

impl IdentityResolver for StaticIdentity {
    fn child_device_id(&self) -> Option<String> {
        self.state.read().child_device_id.clone()
    }

    fn device_id(&self) -> Option<String> {
        self.state.read().device_id.clone()
    }

    fn server_url(&self) -> String {
        self.state.read().server_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_device_id_takes_precedence() {
        let identity = StaticIdentity::new(
            "https://api.example.com",
            Some("device-1".to_string()),
            Some("child-1".to_string()),
        );
        assert_eq!(identity.resolve_device_id().as_deref(), Some("child-1"));
    }

    #[test]
    fn test_falls_back_to_device_id() {
        let identity =
            StaticIdentity::new("https://api.example.com", Some("device-1".to_string()), None);
        assert_eq!(identity.resolve_device_id().as_deref(), Some("device-1"));

        identity.set_child_device_id(Some("  ".to_string()));
        assert_eq!(identity.resolve_device_id().as_deref(), Some("device-1"));
    }

    #[test]
    fn test_unprovisioned_identity_resolves_to_none() {
        let identity = StaticIdentity::new("https://api.example.com", None, None);
        assert!(identity.resolve_device_id().is_none());

        identity.set_device_id(Some(String::new()));
        assert!(identity.resolve_device_id().is_none());

        identity.set_child_device_id(Some("child-9".to_string()));
        assert_eq!(identity.resolve_device_id().as_deref(), Some("child-9"));
    }
}

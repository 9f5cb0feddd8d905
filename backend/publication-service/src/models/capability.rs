use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A named permission an actor may hold, independent of how roles are stored
/// upstream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Admin,
    Moderator,
    Author,
    Reader,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Admin => "admin",
            Capability::Moderator => "moderator",
            Capability::Author => "author",
            Capability::Reader => "reader",
        }
    }

    /// Map an upstream role string onto a capability. Unknown roles are
    /// dropped rather than rejected.
    pub fn from_role(role: &str) -> Option<Self> {
        match role.trim().to_ascii_lowercase().as_str() {
            "admin" | "administrator" | "superadmin" => Some(Capability::Admin),
            "moderator" | "mod" => Some(Capability::Moderator),
            "author" | "writer" => Some(Capability::Author),
            "reader" | "user" | "student" => Some(Capability::Reader),
            _ => None,
        }
    }

    /// Capabilities that make an actor part of the moderation staff
    pub const STAFF: [Capability; 2] = [Capability::Admin, Capability::Moderator];
}

/// The authenticated caller, computed once at the authentication boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub capabilities: HashSet<Capability>,
    pub active: bool,
}

impl Actor {
    pub fn new(user_id: Uuid, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            user_id,
            capabilities: capabilities.into_iter().collect(),
            active: true,
        }
    }

    /// Normalise the singular `role` and plural `roles` claim shapes into one
    /// capability set.
    pub fn from_roles(user_id: Uuid, role: Option<&str>, roles: &[String]) -> Self {
        let capabilities = role
            .into_iter()
            .chain(roles.iter().map(String::as_str))
            .filter_map(Capability::from_role)
            .collect::<HashSet<_>>();

        Self {
            user_id,
            capabilities,
            active: true,
        }
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn is_admin(&self) -> bool {
        self.has(Capability::Admin)
    }

    pub fn is_moderator(&self) -> bool {
        self.has(Capability::Moderator)
    }

    /// Admin or moderator
    pub fn is_staff(&self) -> bool {
        self.is_admin() || self.is_moderator()
    }

    pub fn can_author(&self) -> bool {
        self.is_admin() || self.has(Capability::Author)
    }
}

/// Directory entry for a platform user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub display_name: String,
    pub capabilities: HashSet<Capability>,
    pub active: bool,
}

impl UserRecord {
    pub fn new(
        id: Uuid,
        display_name: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            capabilities: capabilities.into_iter().collect(),
            active: true,
        }
    }

    pub fn has_any(&self, capabilities: &[Capability]) -> bool {
        capabilities.iter().any(|c| self.capabilities.contains(c))
    }
}

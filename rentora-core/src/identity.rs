use serde::{Deserialize, Serialize};

/// Platform-wide roles, resolved once when the caller's token is verified.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Member,
    Admin,
    /// Internal callers such as the payment webhook or the reaper.
    System,
}

impl Role {
    /// Accepts the spellings identity providers hand out (`admin`, `ADMIN`, `is_admin`, `isAdmin`).
    pub fn from_claim(raw: &str) -> Option<Role> {
        let normalized: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "member" | "user" | "customer" | "renter" | "owner" => Some(Role::Member),
            "admin" | "isadmin" | "superadmin" => Some(Role::Admin),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

/// How an actor relates to one specific reservation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Party {
    Renter,
    Owner,
    Admin,
    System,
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn new(id: impl Into<String>, roles: Vec<Role>) -> Self {
        Self { id: id.into(), roles }
    }

    pub fn member(id: impl Into<String>) -> Self {
        Self::new(id, vec![Role::Member])
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, vec![Role::Admin])
    }

    pub fn system() -> Self {
        Self::new("system", vec![Role::System])
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// Every party this actor can act as for a reservation between `renter_id` and `owner_id`.
    pub fn parties(&self, renter_id: &str, owner_id: &str) -> Vec<Party> {
        let mut parties = Vec::new();
        if self.id == renter_id {
            parties.push(Party::Renter);
        }
        if self.id == owner_id {
            parties.push(Party::Owner);
        }
        if self.is_admin() {
            parties.push(Party::Admin);
        }
        if self.has_role(Role::System) {
            parties.push(Party::System);
        }
        parties
    }

    pub fn acts_as_any(&self, allowed: &[Party], renter_id: &str, owner_id: &str) -> bool {
        self.parties(renter_id, owner_id)
            .iter()
            .any(|p| allowed.contains(p))
    }
}

//! Actor identity and role types.
//!
//! Authentication and role resolution happen outside this core; operations receive an
//! already-verified [`Actor`]. The role determines which lifecycle gates an actor can
//! pass, never whether their identity is genuine.

use dcr_types::{CanonicalId, NonEmptyText};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The professional role attached to a verified identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Authors and edits records.
    Clinician,
    /// May clinically sign off a completed record.
    Reviewer,
    /// May perform privileged operations, including reopening signed-off records.
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Clinician => "clinician",
            Role::Reviewer => "reviewer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clinician" => Ok(Role::Clinician),
            "reviewer" => Ok(Role::Reviewer),
            "admin" => Ok(Role::Admin),
            other => Err(format!(
                "unknown role '{other}' (expected clinician, reviewer or admin)"
            )),
        }
    }
}

/// An authenticated identity performing an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identifier of the actor, canonical form.
    pub id: CanonicalId,
    /// Display name, used in commit authorship.
    pub name: NonEmptyText,
    /// Contact address, used in commit authorship.
    pub email: NonEmptyText,
    /// Verified role.
    pub role: Role,
}

impl Actor {
    pub fn new(id: CanonicalId, name: NonEmptyText, email: NonEmptyText, role: Role) -> Self {
        Self {
            id,
            name,
            email,
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True if the actor may clinically sign off a record.
    pub fn can_review(&self) -> bool {
        matches!(self.role, Role::Reviewer | Role::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role) -> Actor {
        Actor::new(
            CanonicalId::generate(),
            NonEmptyText::new("Dr Example").expect("name"),
            NonEmptyText::new("dr@example.test").expect("email"),
            role,
        )
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Admin".parse::<Role>().expect("parse"), Role::Admin);
        assert_eq!(" reviewer ".parse::<Role>().expect("parse"), Role::Reviewer);
        assert!("dentist".parse::<Role>().is_err());
    }

    #[test]
    fn review_gate_excludes_plain_clinicians() {
        assert!(!actor(Role::Clinician).can_review());
        assert!(actor(Role::Reviewer).can_review());
        assert!(actor(Role::Admin).can_review());
    }

    #[test]
    fn only_admins_are_admins() {
        assert!(actor(Role::Admin).is_admin());
        assert!(!actor(Role::Reviewer).is_admin());
    }
}

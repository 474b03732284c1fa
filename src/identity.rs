//! Participant identity: role-namespaced numeric ids and credential resolution.
//!
//! Identities travel on the wire (and in the database) as the numeric id with
//! a single trailing role discriminator: `"42c"` is customer 42, `"7v"` is
//! vendor 7. Internally they are always the structured [`Identity`] pair;
//! the suffix form exists only at the edges.

use crate::error::AuthError;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::fmt;

/// Participant role namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Customer,
    Vendor,
}

impl Role {
    /// Wire discriminator character for this role.
    pub fn discriminator(self) -> char {
        match self {
            Role::Customer => 'c',
            Role::Vendor => 'v',
        }
    }

    fn from_discriminator(c: char) -> Option<Self> {
        match c {
            'c' => Some(Role::Customer),
            'v' => Some(Role::Vendor),
            _ => None,
        }
    }
}

/// A namespaced participant key: role plus numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub role: Role,
    pub id: i64,
}

impl Identity {
    pub fn customer(id: i64) -> Self {
        Self {
            role: Role::Customer,
            id,
        }
    }

    pub fn vendor(id: i64) -> Self {
        Self {
            role: Role::Vendor,
            id,
        }
    }

    /// Parse the strict suffix form (`"42c"`, `"7v"`).
    ///
    /// The id part must be non-empty and all digits. Anything else is
    /// rejected; an id without a discriminator is never guessed into a role
    /// here (the router's vendor default is a separate, documented policy).
    pub fn parse_wire(s: &str) -> Option<Self> {
        // Split on chars, not bytes: the input is client-controlled and the
        // last character may be multi-byte.
        let mut chars = s.chars();
        let role = Role::from_discriminator(chars.next_back()?)?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let id = digits.parse().ok()?;
        Some(Self { role, id })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.id, self.role.discriminator())
    }
}

/// Claims carried by issued tokens. Field names are camelCase on the wire
/// because that is what existing tokens contain.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleClaims {
    #[serde(default)]
    customer_id: Option<i64>,
    #[serde(default)]
    vendor_id: Option<i64>,
}

/// Verifies opaque credentials into identities. Stateless and cheap to clone.
#[derive(Clone)]
pub struct IdentityResolver {
    key: DecodingKey,
    validation: Validation,
}

impl IdentityResolver {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Resolve a credential into exactly one identity.
    ///
    /// When a claim carries both a customer and a vendor id, the customer id
    /// wins. That precedence is load-bearing: stored rows were written under
    /// it, so changing it would re-route existing conversations.
    pub fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        // Tolerate an "Authorization: Bearer <jwt>" value passed through whole.
        let token = token.strip_prefix("Bearer ").unwrap_or(token);
        let data = decode::<RoleClaims>(token, &self.key, &self.validation)?;

        if let Some(id) = data.claims.customer_id {
            Ok(Identity::customer(id))
        } else if let Some(id) = data.claims.vendor_id {
            Ok(Identity::vendor(id))
        } else {
            Err(AuthError::MissingRoleId)
        }
    }
}

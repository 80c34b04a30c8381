use axum::http::HeaderMap;
use bson::Uuid;
use serde::Deserialize;

use crate::error::ReviewError;

/// Role of a user in the storefront.
#[derive(Debug, Deserialize, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

/// Authenticated identity forwarded by the gateway in the `Authorized-User` header.
///
/// Authentication itself happens upstream; the core trusts the forwarded
/// identity. The header value is a JSON object with `id`, `username` and
/// optional `roles`.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizedUserHeader {
    /// User UUID.
    pub id: Uuid,
    /// Current display name of the user, snapshotted into created reviews.
    pub username: String,
    /// Roles of the user.
    pub roles: Vec<Role>,
}

/// Wire shape of the header content, ids arrive as strings.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAuthorizedUser {
    id: String,
    username: String,
    #[serde(default)]
    roles: Vec<Role>,
}

impl AuthorizedUserHeader {
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

impl TryFrom<&HeaderMap> for AuthorizedUserHeader {
    type Error = ReviewError;

    /// Parses the JSON content of the `Authorized-User` header.
    fn try_from(header_map: &HeaderMap) -> Result<Self, Self::Error> {
        let header_value = header_map
            .get("Authorized-User")
            .ok_or(ReviewError::Unauthenticated)?;
        let json = header_value
            .to_str()
            .map_err(|_| ReviewError::Unauthenticated)?;
        let raw: RawAuthorizedUser =
            serde_json::from_str(json).map_err(|_| ReviewError::Unauthenticated)?;
        let id = Uuid::parse_str(&raw.id).map_err(|_| ReviewError::Unauthenticated)?;
        Ok(Self {
            id,
            username: raw.username,
            roles: raw.roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn header_map(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Authorized-User", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn parses_a_forwarded_identity() {
        let id = Uuid::new();
        let headers = header_map(&format!(
            "{{\"id\": \"{}\", \"username\": \"ada\", \"roles\": [\"customer\"]}}",
            id
        ));
        let user = AuthorizedUserHeader::try_from(&headers).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.username, "ada");
        assert!(!user.is_admin());
    }

    #[test]
    fn recognizes_the_admin_role() {
        let headers = header_map(&format!(
            "{{\"id\": \"{}\", \"username\": \"mod\", \"roles\": [\"customer\", \"admin\"]}}",
            Uuid::new()
        ));
        let user = AuthorizedUserHeader::try_from(&headers).unwrap();
        assert!(user.is_admin());
    }

    #[test]
    fn roles_default_to_empty() {
        let headers = header_map(&format!(
            "{{\"id\": \"{}\", \"username\": \"ada\"}}",
            Uuid::new()
        ));
        let user = AuthorizedUserHeader::try_from(&headers).unwrap();
        assert!(user.roles.is_empty());
    }

    #[test]
    fn missing_or_malformed_header_is_rejected() {
        assert!(AuthorizedUserHeader::try_from(&HeaderMap::new()).is_err());
        assert!(AuthorizedUserHeader::try_from(&header_map("not json")).is_err());
        assert!(
            AuthorizedUserHeader::try_from(&header_map(
                "{\"id\": \"not-a-uuid\", \"username\": \"ada\"}"
            ))
            .is_err()
        );
    }
}

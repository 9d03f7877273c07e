//! User-related models

use serde::{Deserialize, Serialize};

/// Platform role, as carried in the `role` claim and the profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Tutor,
    Admin,
    #[serde(other)]
    Unknown,
}

/// User profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_parses_known_and_unknown_roles() {
        let tutor: User =
            serde_json::from_str(r#"{"id":"u1","name":"Ada","email":null,"role":"TUTOR"}"#)
                .unwrap();
        assert_eq!(tutor.role, Some(Role::Tutor));
        assert_eq!(tutor.email, None);

        let other: User = serde_json::from_str(r#"{"id":"u2","role":"MODERATOR"}"#).unwrap();
        assert_eq!(other.role, Some(Role::Unknown));
        assert_eq!(other.name, None);
    }
}

use serde::{Deserialize, Serialize};

/// The logged-in user, as supplied by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_optional_fields_omitted() {
        let json = serde_json::to_string(&UserIdentity::new("u1")).unwrap();
        assert_eq!(json, r#"{"id":"u1"}"#);
    }

    #[test]
    fn test_identity_parses_profile() {
        let user: UserIdentity =
            serde_json::from_str(r#"{"id":"u1","name":"Ada","email":"ada@example.com","role":"x"}"#)
                .unwrap();
        assert_eq!(user.name.as_deref(), Some("Ada"));
        assert_eq!(user.email.as_deref(), Some("ada@example.com"));
    }
}

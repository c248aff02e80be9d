use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Roles allowed to operate the front desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Receptionist,
    Admin,
}

impl StaffRole {
    pub fn parse(role: &str) -> Option<Self> {
        match role.to_ascii_lowercase().as_str() {
            "receptionist" => Some(StaffRole::Receptionist),
            "admin" => Some(StaffRole::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn staff_role(&self) -> Option<StaffRole> {
        self.role.as_deref().and_then(StaffRole::parse)
    }

    pub fn is_staff(&self) -> bool {
        self.staff_role().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.staff_role() == Some(StaffRole::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_role(role: Option<&str>) -> User {
        User {
            id: "user-1".to_string(),
            email: None,
            role: role.map(str::to_string),
            metadata: None,
            created_at: None,
        }
    }

    #[test]
    fn test_staff_roles() {
        assert!(user_with_role(Some("receptionist")).is_staff());
        assert!(!user_with_role(Some("RECEPTIONIST")).is_admin());
        assert!(user_with_role(Some("ADMIN")).is_admin());
        assert!(!user_with_role(Some("patient")).is_staff());
        assert!(!user_with_role(None).is_staff());
    }
}

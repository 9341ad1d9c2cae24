use serde::{Deserialize, Serialize};

use crate::models::UserId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Moderator,
    Delivery,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// Plain-text demo credential, compared as-is on login.
    #[serde(default)]
    pub password: String,
    pub role: Role,
    pub name: String,
}

impl User {
    pub fn is_moderator(&self) -> bool {
        self.role == Role::Moderator
    }

    pub fn without_password(&self) -> User {
        User {
            password: String::new(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn matches(&self, user: &User) -> bool {
        user.username == self.username && user.password == self.password
    }
}

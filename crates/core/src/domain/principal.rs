use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipalId(pub String);

impl PrincipalId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Employee,
    FactoryManager,
    Director,
    Manager,
    Ceo,
    Admin,
    ReadOnly,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::FactoryManager => "factory_manager",
            Self::Director => "director",
            Self::Manager => "manager",
            Self::Ceo => "ceo",
            Self::Admin => "admin",
            Self::ReadOnly => "read_only",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "employee" | "user" => Some(Self::Employee),
            "factory_manager" => Some(Self::FactoryManager),
            "director" => Some(Self::Director),
            "manager" => Some(Self::Manager),
            "ceo" => Some(Self::Ceo),
            "admin" => Some(Self::Admin),
            "read_only" | "readonly" => Some(Self::ReadOnly),
            _ => None,
        }
    }

    /// Observer roles see every application but never act on one.
    pub fn sees_everything(&self) -> bool {
        matches!(self, Self::Admin | Self::ReadOnly)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An already-authenticated caller as handed over by the session layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub display_name: String,
    pub role: Role,
}

impl Principal {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self { id: PrincipalId::new(id), display_name: display_name.into(), role }
    }
}

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::order::{Actor, OrderError, Role};

// ============================================================================
// Actor Directory - username → role lookup
// ============================================================================

#[async_trait]
pub trait ActorDirectory: Send + Sync {
    async fn role_of(&self, username: &str) -> Option<Role>;

    async fn resolve(&self, username: &str) -> Result<Actor, OrderError> {
        match self.role_of(username).await {
            Some(role) => Ok(Actor::new(username, role)),
            None => Err(OrderError::UnknownActor(username.to_string())),
        }
    }
}

/// Fixed roster, built up front
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    roles: HashMap<String, Role>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, username: impl Into<String>, role: Role) -> Self {
        self.roles.insert(username.into(), role);
        self
    }
}

impl<S: Into<String>> FromIterator<(S, Role)> for StaticDirectory {
    fn from_iter<I: IntoIterator<Item = (S, Role)>>(iter: I) -> Self {
        Self {
            roles: iter.into_iter().map(|(name, role)| (name.into(), role)).collect(),
        }
    }
}

#[async_trait]
impl ActorDirectory for StaticDirectory {
    async fn role_of(&self, username: &str) -> Option<Role> {
        self.roles.get(username).copied()
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrderError;
use super::value_objects::{ActorId, ItemStatus, PrepRole};

// ============================================================================
// Preparer Claims
// ============================================================================
//
// One preparer slot per kitchen station. A slot is written at most once,
// inside the same order write that moves the first station item out of
// PENDING, and is never released or reassigned afterwards.
//
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preparers {
    pub chef: Option<ActorId>,
    pub barista: Option<ActorId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The slot was empty and now holds the caller
    Claimed,
    /// The slot already holds someone (possibly the caller); nothing changed
    Held(ActorId),
}

impl Preparers {
    pub fn get(&self, role: PrepRole) -> Option<&ActorId> {
        match role {
            PrepRole::Chef => self.chef.as_ref(),
            PrepRole::Barista => self.barista.as_ref(),
        }
    }

    pub fn is_claimed(&self, role: PrepRole) -> bool {
        self.get(role).is_some()
    }

    pub fn is_claimed_by(&self, role: PrepRole, actor: &ActorId) -> bool {
        self.get(role) == Some(actor)
    }

    /// Set the slot only if it is empty
    pub fn claim(&mut self, role: PrepRole, actor: &ActorId) -> ClaimOutcome {
        let slot = match role {
            PrepRole::Chef => &mut self.chef,
            PrepRole::Barista => &mut self.barista,
        };

        match slot {
            Some(holder) => ClaimOutcome::Held(holder.clone()),
            None => {
                *slot = Some(actor.clone());
                ClaimOutcome::Claimed
            }
        }
    }

    /// An item already under preparation may only be touched by the
    /// station's recorded preparer.
    pub fn check_owner(
        &self,
        role: PrepRole,
        actor: &ActorId,
        item_id: Uuid,
        item_status: ItemStatus,
    ) -> Result<(), OrderError> {
        if item_status != ItemStatus::InPreparation {
            return Ok(());
        }

        match self.get(role) {
            Some(owner) if owner != actor => Err(OrderError::NotOwner {
                item_id,
                owner: owner.clone(),
                actor: actor.clone(),
            }),
            _ => Ok(()),
        }
    }
}

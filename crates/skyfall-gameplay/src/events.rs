//! Encounter event bus for the render and audio bindings.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::warn;

use skyfall_common::{EntityId, Vec2};

use crate::enemy::EnemyState;

/// Outcome of a boss special skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialOutcome {
    /// Reinforcements were summoned.
    Reinforcements,
    /// Hazards were dropped.
    HazardRain,
}

/// Events emitted while an encounter runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EncounterEvent {
    /// Enemy spawned
    EnemySpawned {
        /// Enemy ID
        enemy: EntityId,
        /// Archetype key
        archetype: String,
        /// Spawn position
        position: Vec2,
    },
    /// Enemy changed state
    StateChanged {
        /// Enemy ID
        enemy: EntityId,
        /// Previous state
        from: EnemyState,
        /// New state
        to: EnemyState,
    },
    /// Enemy began an attack
    AttackStarted {
        /// Enemy ID
        enemy: EntityId,
        /// Animation key played
        animation: String,
    },
    /// Enemy fired a projectile
    ProjectileFired {
        /// Enemy ID
        enemy: EntityId,
        /// Launch position
        position: Vec2,
    },
    /// The player took damage
    PlayerHit {
        /// Source enemy
        source: EntityId,
        /// Damage dealt
        damage: f32,
    },
    /// Enemy took damage
    EnemyDamaged {
        /// Enemy ID
        enemy: EntityId,
        /// Damage dealt
        damage: f32,
        /// Health after the hit
        health: f32,
    },
    /// Enemy died (death animation started)
    EnemyDied {
        /// Enemy ID
        enemy: EntityId,
    },
    /// Enemy removed after its death animation
    EnemyDespawned {
        /// Enemy ID
        enemy: EntityId,
    },
    /// Suicide charge started
    ChargeStarted {
        /// Enemy ID
        enemy: EntityId,
    },
    /// Suicide charge abandoned
    ChargeAborted {
        /// Enemy ID
        enemy: EntityId,
    },
    /// Boss special skill started
    SpecialStarted {
        /// Boss ID
        enemy: EntityId,
    },
    /// Boss special skill resolved
    SpecialFinished {
        /// Boss ID
        enemy: EntityId,
        /// What the special did
        outcome: SpecialOutcome,
    },
    /// Reinforcements entered the encounter
    ReinforcementsSpawned {
        /// Summoning boss
        source: EntityId,
        /// New enemies
        spawned: Vec<EntityId>,
    },
}

/// Event bus for broadcasting encounter events.
#[derive(Debug)]
pub struct EventBus {
    /// Sender for broadcasting events
    sender: Sender<EncounterEvent>,
    /// Receiver for collecting events
    receiver: Receiver<EncounterEvent>,
    /// Channel capacity
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Publishes an event to the bus.
    pub fn publish(&self, event: EncounterEvent) {
        // Non-blocking send - if full, event is dropped
        if let Err(TrySendError::Full(event)) = self.sender.try_send(event) {
            warn!("Event bus full ({}), dropping {:?}", self.capacity, event);
        }
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<EncounterEvent> {
        self.receiver.try_iter().collect()
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a new sender handle for publishing events.
    #[must_use]
    pub fn sender(&self) -> Sender<EncounterEvent> {
        self.sender.clone()
    }
}

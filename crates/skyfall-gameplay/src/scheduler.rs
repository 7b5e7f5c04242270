//! One-shot delayed tasks on the game clock.
//!
//! Tasks cannot be cancelled. Each task carries the epoch of the enemy that
//! scheduled it; the encounter drops tasks whose epoch is stale when they
//! come due.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use skyfall_common::{EntityId, Millis};
use tracing::trace;

/// Work an enemy asked to run later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnemyTask {
    /// End of the attack window.
    FinishAttack,
    /// Mid-windup melee hitbox check.
    MeleeHitCheck,
    /// End of the hurt reaction.
    HurtRecovered,
    /// Death animation complete.
    DeathFinished,
    /// Retry pursuit after a wall collision.
    ChaseRetry {
        /// Token of the retry that scheduled this task.
        token: u64,
    },
    /// End of the boss special channel.
    SpecialFinished,
}

/// A task waiting in the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    /// Game time at which the task runs.
    pub due: Millis,
    /// Insertion sequence, breaks ties between equal due times.
    pub seq: u64,
    /// Enemy that owns the task.
    pub enemy: EntityId,
    /// Enemy epoch captured at scheduling time.
    pub epoch: u64,
    /// What to run.
    pub task: EnemyTask,
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of pending tasks ordered by due time, FIFO on ties.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<ScheduledTask>>,
    next_seq: u64,
}

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `task` to run `delay` milliseconds after `now`.
    pub fn schedule_once(
        &mut self,
        now: Millis,
        delay: Millis,
        enemy: EntityId,
        epoch: u64,
        task: EnemyTask,
    ) {
        let scheduled = ScheduledTask {
            due: now.saturating_add(delay),
            seq: self.next_seq,
            enemy,
            epoch,
            task,
        };
        self.next_seq += 1;
        trace!("Scheduled {:?} for {} at {}", task, enemy, scheduled.due);
        self.queue.push(Reverse(scheduled));
    }

    /// Pops the earliest task due at or before `now`.
    pub fn pop_due(&mut self, now: Millis) -> Option<ScheduledTask> {
        if self.queue.peek().is_some_and(|Reverse(t)| t.due <= now) {
            self.queue.pop().map(|Reverse(t)| t)
        } else {
            None
        }
    }

    /// Due time of the earliest pending task.
    #[must_use]
    pub fn next_due(&self) -> Option<Millis> {
        self.queue.peek().map(|Reverse(t)| t.due)
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drops every pending task.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_due_order() {
        let mut scheduler = Scheduler::new();
        let enemy = EntityId::new();
        scheduler.schedule_once(0, 300, enemy, 0, EnemyTask::HurtRecovered);
        scheduler.schedule_once(0, 100, enemy, 0, EnemyTask::MeleeHitCheck);
        scheduler.schedule_once(0, 200, enemy, 0, EnemyTask::FinishAttack);

        assert!(scheduler.pop_due(50).is_none());
        assert_eq!(scheduler.next_due(), Some(100));

        let tasks: Vec<EnemyTask> = std::iter::from_fn(|| scheduler.pop_due(1_000))
            .map(|t| t.task)
            .collect();
        assert_eq!(
            tasks,
            vec![
                EnemyTask::MeleeHitCheck,
                EnemyTask::FinishAttack,
                EnemyTask::HurtRecovered
            ]
        );
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_ties_are_fifo() {
        let mut scheduler = Scheduler::new();
        let a = EntityId::new();
        let b = EntityId::new();
        scheduler.schedule_once(10, 90, a, 0, EnemyTask::FinishAttack);
        scheduler.schedule_once(50, 50, b, 0, EnemyTask::FinishAttack);

        assert_eq!(scheduler.pop_due(100).map(|t| t.enemy), Some(a));
        assert_eq!(scheduler.pop_due(100).map(|t| t.enemy), Some(b));
    }

    #[test]
    fn test_epoch_is_carried() {
        let mut scheduler = Scheduler::new();
        let enemy = EntityId::new();
        scheduler.schedule_once(0, 0, enemy, 7, EnemyTask::ChaseRetry { token: 3 });
        let task = scheduler.pop_due(0).expect("due");
        assert_eq!(task.epoch, 7);
        assert_eq!(task.task, EnemyTask::ChaseRetry { token: 3 });
    }
}

//! Game-clock timestamps and cooldown helpers.
//!
//! All gameplay timing is expressed in whole milliseconds of game time.

/// A game-clock timestamp or duration in milliseconds.
pub type Millis = u64;

/// Returns true when `cooldown` has elapsed since `last`.
///
/// A `None` last-use time means the action has never happened and is ready.
#[must_use]
pub fn cooldown_ready(now: Millis, last: Option<Millis>, cooldown: Millis) -> bool {
    last.map_or(true, |at| now.saturating_sub(at) >= cooldown)
}

/// Milliseconds remaining until a cooldown is ready (0 when ready).
#[must_use]
pub fn cooldown_remaining(now: Millis, last: Option<Millis>, cooldown: Millis) -> Millis {
    last.map_or(0, |at| cooldown.saturating_sub(now.saturating_sub(at)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_never_used() {
        assert!(cooldown_ready(0, None, 1_000));
        assert_eq!(cooldown_remaining(0, None, 1_000), 0);
    }

    #[test]
    fn test_cooldown_boundary() {
        assert!(!cooldown_ready(999, Some(0), 1_000));
        assert!(cooldown_ready(1_000, Some(0), 1_000));
        assert_eq!(cooldown_remaining(400, Some(0), 1_000), 600);
    }
}

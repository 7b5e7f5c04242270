//! Headless motion integration for enemy bodies.
//!
//! Turns an enemy's velocity intent into motion against the tile layer and
//! map bounds, then refreshes the blocked-side flags the state machine reads.
//! There is no gravity: grounded archetypes never set a vertical velocity.

use skyfall_common::{Millis, Rect, Vec2};

use crate::enemy::{BodyContact, EnemyCore};
use crate::terrain::TerrainQuery;

/// Distance probed past each side of the body for contact flags.
pub const CONTACT_PROBE: f32 = 1.0;

fn shifted(rect: &Rect, offset: Vec2) -> Rect {
    Rect::new(
        rect.min_x + offset.x,
        rect.min_y + offset.y,
        rect.max_x + offset.x,
        rect.max_y + offset.y,
    )
}

fn outside(rect: &Rect, bounds: Option<Rect>) -> bool {
    bounds.is_some_and(|b| {
        rect.min_x < b.min_x || rect.max_x > b.max_x || rect.min_y < b.min_y || rect.max_y > b.max_y
    })
}

fn blocked(rect: &Rect, terrain: Option<&dyn TerrainQuery>, bounds: Option<Rect>) -> bool {
    outside(rect, bounds) || terrain.is_some_and(|t| t.rect_collides(rect))
}

/// Moves `core` by its velocity over `dt_ms`, one axis at a time.
///
/// A move that would overlap solid tiles or leave the bounds is dropped for
/// that axis. Contact flags are refreshed afterward.
pub fn integrate(
    core: &mut EnemyCore,
    dt_ms: Millis,
    terrain: Option<&dyn TerrainQuery>,
    bounds: Option<Rect>,
) {
    let dt = dt_ms as f32 / 1_000.0;
    let step = core.velocity * dt;

    if step.x != 0.0 {
        let moved = shifted(&core.body(), Vec2::new(step.x, 0.0));
        if !blocked(&moved, terrain, bounds) {
            core.position.x += step.x;
        }
    }

    if step.y != 0.0 {
        let moved = shifted(&core.body(), Vec2::new(0.0, step.y));
        if !blocked(&moved, terrain, bounds) {
            core.position.y += step.y;
        }
    }

    core.contact = probe_contact(&core.body(), terrain, bounds);
}

/// Checks for solids just past the left and right edges of `body`.
#[must_use]
pub fn probe_contact(
    body: &Rect,
    terrain: Option<&dyn TerrainQuery>,
    bounds: Option<Rect>,
) -> BodyContact {
    BodyContact {
        blocked_left: blocked(&shifted(body, Vec2::new(-CONTACT_PROBE, 0.0)), terrain, bounds),
        blocked_right: blocked(&shifted(body, Vec2::new(CONTACT_PROBE, 0.0)), terrain, bounds),
    }
}

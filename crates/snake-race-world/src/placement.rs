//! Free-cell search used when scattering and respawning features.
//!
//! Random probing is capped at twice the board area. If every probe lands
//! on an occupied cell, a single row-major sweep looks for any free cell, so
//! the search always terminates within `3 * area` membership checks. `None`
//! means the board is genuinely full.

use rand::Rng;
use snake_race_types::Position;

/// Number of random probes before falling back to a sweep.
pub fn probe_cap(width: i32, height: i32) -> u64 {
    let w = u64::try_from(width).unwrap_or(0);
    let h = u64::try_from(height).unwrap_or(0);
    w.saturating_mul(h).saturating_mul(2)
}

/// Find a cell for which `occupied` returns `false`.
pub fn random_empty<R, F>(rng: &mut R, width: i32, height: i32, occupied: F) -> Option<Position>
where
    R: Rng + ?Sized,
    F: Fn(Position) -> bool,
{
    if width <= 0 || height <= 0 {
        return None;
    }

    for _ in 0..probe_cap(width, height) {
        let candidate = Position::new(rng.random_range(0..width), rng.random_range(0..height));
        if !occupied(candidate) {
            return Some(candidate);
        }
    }

    (0..height)
        .flat_map(|y| (0..width).map(move |x| Position::new(x, y)))
        .find(|p| !occupied(*p))
}

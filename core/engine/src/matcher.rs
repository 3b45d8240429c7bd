//! Matches the draft form against the favorites list.

use curbside_protocol::Favorite;

use crate::normalize::{comparable_name, comparable_plate};

/// First favorite whose name and plate both equal the draft under comparison
/// normalization. A draft with a blank name or plate never matches.
pub fn matching_index(favorites: &[Favorite], draft_name: &str, draft_plate: &str) -> Option<usize> {
    let name = comparable_name(draft_name);
    let plate = comparable_plate(draft_plate);
    if name.is_empty() || plate.is_empty() {
        return None;
    }
    favorites
        .iter()
        .position(|favorite| favorite_matches(favorite, &name, &plate))
}

/// True when some favorite other than `selected` already holds the draft's
/// name and plate. Used to refuse updates that would collide with an existing
/// entry.
pub fn is_duplicate_of_other(
    favorites: &[Favorite],
    selected: usize,
    draft_name: &str,
    draft_plate: &str,
) -> bool {
    let name = comparable_name(draft_name);
    let plate = comparable_plate(draft_plate);
    if name.is_empty() || plate.is_empty() {
        return false;
    }
    favorites
        .iter()
        .enumerate()
        .any(|(index, favorite)| index != selected && favorite_matches(favorite, &name, &plate))
}

fn favorite_matches(favorite: &Favorite, name: &str, plate: &str) -> bool {
    comparable_name(&favorite.name) == name && comparable_plate(&favorite.license_plate) == plate
}

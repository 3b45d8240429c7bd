//! Comparison normalization for visitor names and license plates.
//!
//! Matching and duplicate checks always run on the normalized forms; the raw
//! text the user typed is preserved elsewhere for display and submission.

/// Canonical form of a visitor name: surrounding whitespace dropped, casefolded.
pub fn comparable_name(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Canonical form of a plate: upper-cased with everything outside `[A-Z0-9]`
/// removed, so `ab-12-cd`, `AB 12 CD` and `AB12CD` all compare equal.
pub fn comparable_plate(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_trims_and_casefolds() {
        assert_eq!(comparable_name("  Mom "), "mom");
        assert_eq!(comparable_name("MOM"), "mom");
    }

    #[test]
    fn plate_strips_separators_and_uppercases() {
        assert_eq!(comparable_plate("ab-12-cd"), "AB12CD");
        assert_eq!(comparable_plate(" AB 12 CD "), "AB12CD");
        assert_eq!(comparable_plate("AB12CD"), "AB12CD");
    }

    #[test]
    fn plate_drops_non_ascii() {
        assert_eq!(comparable_plate("ÄB-12"), "B12");
    }

    #[test]
    fn normalization_is_idempotent() {
        let name = comparable_name("  Mom ");
        assert_eq!(comparable_name(&name), name);
        let plate = comparable_plate("ab-12-cd");
        assert_eq!(comparable_plate(&plate), plate);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(comparable_name("   "), "");
        assert_eq!(comparable_plate(" -- "), "");
    }
}

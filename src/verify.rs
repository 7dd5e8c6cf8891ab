//! Sanity checks run on every compiled zone before it is kept.
//!
//! Transitions are walked forward from 1850 to 2050, then backward over the
//! same window. The forward walk rejects redundant transitions and unusable
//! name keys, and the backward walk has to land on exactly the instants the
//! forward walk found.

use core::fmt;

use alloc::{borrow::ToOwned, string::String, vec::Vec};

use crate::{compiled::CompiledZone, utils};

const WINDOW_START_YEAR: i64 = 1850;
const WINDOW_END_YEAR: i64 = 2050;

/// The reason a compiled zone failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    /// The compiled zone reports a different id than it was compiled under.
    IdMismatch { expected: String, found: String },
    /// Two adjacent transitions share both offset and name key.
    DuplicateTransition { at: i64, offset: i64, name_key: String },
    /// A name key is empty or shorter than three characters.
    InvalidNameKey { at: i64, name_key: String },
    /// Walking backward did not reproduce a forward transition.
    AsymmetricWalk { expected: i64, found: i64 },
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdMismatch { expected, found } => {
                write!(f, "compiled zone id \"{found}\" does not match \"{expected}\"")
            }
            Self::DuplicateTransition {
                at,
                offset,
                name_key,
            } => write!(
                f,
                "duplicate transition at {at} to offset {offset} ({name_key})"
            ),
            Self::InvalidNameKey { at, name_key } => {
                write!(f, "invalid name key \"{name_key}\" at {at}")
            }
            Self::AsymmetricWalk { expected, found } => write!(
                f,
                "previous transition {found} does not match {expected}"
            ),
        }
    }
}

impl core::error::Error for VerificationFailure {}

fn is_valid_name_key(name_key: &str) -> bool {
    name_key == "??" || name_key.chars().count() >= 3
}

/// Verifies that `zone` was compiled under `id` and that its transitions are
/// consistent between 1850 and 2050.
pub fn verify_zone<Z: CompiledZone + ?Sized>(
    id: &str,
    zone: &Z,
) -> Result<(), VerificationFailure> {
    if zone.id() != id {
        return Err(VerificationFailure::IdMismatch {
            expected: id.to_owned(),
            found: zone.id().to_owned(),
        });
    }

    let start = utils::epoch_millis_for_year(WINDOW_START_YEAR);
    let end = utils::epoch_millis_for_year(WINDOW_END_YEAR);

    let mut millis = start;
    let mut offset = zone.offset_at(millis);
    let mut name_key = zone.name_key_at(millis);
    let mut transitions = Vec::new();
    loop {
        let next = zone.next_transition(millis);
        if next == millis || next > end {
            break;
        }
        millis = next;
        let next_offset = zone.offset_at(millis);
        let next_name_key = zone.name_key_at(millis);
        if next_offset == offset && next_name_key == name_key {
            return Err(VerificationFailure::DuplicateTransition {
                at: millis,
                offset,
                name_key: name_key.to_owned(),
            });
        }
        if !is_valid_name_key(next_name_key) {
            return Err(VerificationFailure::InvalidNameKey {
                at: millis,
                name_key: next_name_key.to_owned(),
            });
        }
        transitions.push(millis);
        offset = next_offset;
        name_key = next_name_key;
    }

    let mut millis = end;
    for transition in transitions.iter().rev() {
        let previous = zone.previous_transition(millis);
        if previous == millis || previous < start {
            break;
        }
        millis = previous;
        if transition - 1 != millis {
            return Err(VerificationFailure::AsymmetricWalk {
                expected: transition - 1,
                found: millis,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled::{CompiledTimeZone, PrecalculatedZone, ZoneKind, ZoneTransition};
    use alloc::vec;

    // 1900-01-01T00:00Z and 1950-01-01T00:00Z
    const AT_1900: i64 = -2_208_988_800_000;
    const AT_1950: i64 = -631_152_000_000;

    fn transition(at: i64, name_key: &str, wall_offset: i64) -> ZoneTransition {
        ZoneTransition {
            at,
            name_key: name_key.to_owned(),
            wall_offset,
            standard_offset: wall_offset,
        }
    }

    fn table(id: &str, transitions: Vec<ZoneTransition>) -> CompiledTimeZone {
        CompiledTimeZone::new(
            id,
            ZoneKind::Precalculated(PrecalculatedZone::new(transitions, None)),
        )
    }

    #[test]
    fn accepts_consistent_zone() {
        let zone = table(
            "Test/Good",
            vec![
                transition(i64::MIN, "LMT", 1_050_000),
                transition(AT_1900, "CET", 3_600_000),
                transition(AT_1950, "WET", 0),
            ],
        );
        assert_eq!(verify_zone("Test/Good", &zone), Ok(()));
        let fixed = CompiledTimeZone::fixed("Etc/UTC", "UTC", 0, 0);
        assert_eq!(verify_zone("Etc/UTC", &fixed), Ok(()));
    }

    #[test]
    fn rejects_mismatched_id() {
        let zone = CompiledTimeZone::fixed("Etc/UTC", "UTC", 0, 0);
        assert_eq!(
            verify_zone("Etc/Zulu", &zone),
            Err(VerificationFailure::IdMismatch {
                expected: "Etc/Zulu".to_owned(),
                found: "Etc/UTC".to_owned()
            })
        );
    }

    #[test]
    fn rejects_duplicate_transition() {
        let zone = table(
            "Test/Duplicate",
            vec![
                transition(i64::MIN, "LMT", 1_050_000),
                transition(AT_1900, "CET", 3_600_000),
                transition(AT_1950, "CET", 3_600_000),
            ],
        );
        assert_eq!(
            verify_zone("Test/Duplicate", &zone),
            Err(VerificationFailure::DuplicateTransition {
                at: AT_1950,
                offset: 3_600_000,
                name_key: "CET".to_owned()
            })
        );
    }

    #[test]
    fn rejects_short_name_keys() {
        let zone = table(
            "Test/Short",
            vec![
                transition(i64::MIN, "LMT", 1_050_000),
                transition(AT_1900, "C", 3_600_000),
            ],
        );
        assert!(matches!(
            verify_zone("Test/Short", &zone),
            Err(VerificationFailure::InvalidNameKey { at: AT_1900, .. })
        ));
        let zone = table(
            "Test/Unknown",
            vec![
                transition(i64::MIN, "LMT", 1_050_000),
                transition(AT_1900, "??", 3_600_000),
                transition(AT_1950, "", 0),
            ],
        );
        assert_eq!(
            verify_zone("Test/Unknown", &zone),
            Err(VerificationFailure::InvalidNameKey {
                at: AT_1950,
                name_key: String::new()
            })
        );
    }

    /// A zone whose backward navigation skips a transition.
    struct Skewed(CompiledTimeZone);

    impl CompiledZone for Skewed {
        fn id(&self) -> &str {
            self.0.id()
        }
        fn offset_at(&self, instant: i64) -> i64 {
            self.0.offset_at(instant)
        }
        fn standard_offset_at(&self, instant: i64) -> i64 {
            self.0.standard_offset_at(instant)
        }
        fn name_key_at(&self, instant: i64) -> &str {
            self.0.name_key_at(instant)
        }
        fn next_transition(&self, instant: i64) -> i64 {
            self.0.next_transition(instant)
        }
        fn previous_transition(&self, instant: i64) -> i64 {
            self.0.previous_transition(instant) - 1
        }
    }

    #[test]
    fn rejects_asymmetric_walk() {
        let zone = Skewed(table(
            "Test/Skewed",
            vec![
                transition(i64::MIN, "LMT", 1_050_000),
                transition(AT_1900, "CET", 3_600_000),
            ],
        ));
        assert_eq!(
            verify_zone("Test/Skewed", &zone),
            Err(VerificationFailure::AsymmetricWalk {
                expected: AT_1900 - 1,
                found: AT_1900 - 2
            })
        );
    }
}

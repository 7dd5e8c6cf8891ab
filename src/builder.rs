//! Transition builders
//!
//! The zone resolver describes a zone to a [`TransitionBuilder`] as a
//! sequence of eras. Each era has a standard offset and either fixed savings
//! or a set of recurring savings rules, and each era but the last ends at a
//! cutover.
//!
//! [`ZoneBuilder`] is the default builder. It walks the eras in order,
//! computing each transition until the year 2100, and finishes the zone with
//! a recurring tail when the last era ends with exactly two rules that recur
//! indefinitely.

use core::fmt::Write;

use alloc::{borrow::ToOwned, string::String, vec::Vec};

use crate::{
    compiled::{
        CompiledTimeZone, CompiledZone, DstZone, FixedZone, PrecalculatedZone, Recurrence,
        ZoneCodecError, ZoneKind, ZoneTransition,
    },
    types::DateSpec,
    utils,
};

/// Transitions are precalculated up to, but not including, this year.
pub const YEAR_LIMIT: i64 = 2100;

/// Accumulates the eras of one zone and compiles them.
pub trait TransitionBuilder: Default {
    type Zone: CompiledZone + PartialEq;

    /// Sets the standard offset of the current era.
    fn set_standard_offset(&mut self, millis: i64);

    /// Gives the current era a fixed amount of savings.
    fn set_fixed_savings(&mut self, name_key: &str, save: i64);

    /// Adds a yearly recurring savings rule to the current era.
    fn add_recurring_savings(
        &mut self,
        name_key: &str,
        save: i64,
        from_year: i32,
        to_year: i32,
        date: &DateSpec,
    );

    /// Ends the current era at `date` in `year` and begins a new one.
    fn add_cutover(&mut self, year: i32, date: &DateSpec);

    fn to_compiled_zone(&self, id: &str) -> Self::Zone;

    /// Serializes the compiled zone.
    fn persist(&self, id: &str) -> Result<Vec<u8>, ZoneCodecError>;

    /// Reads a zone written by [`Self::persist`].
    fn load_from(bytes: &[u8], id: &str) -> Result<Self::Zone, ZoneCodecError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RecurringRule {
    recurrence: Recurrence,
    from_year: i32,
    to_year: i32,
}

impl RecurringRule {
    // The next occurrence of this rule after instant, or instant when the rule
    // has no further occurrences.
    fn next(&self, instant: i64, standard_offset: i64, save: i64) -> i64 {
        let wall_offset = standard_offset + save;
        let year = if instant == i64::MIN {
            i64::from(i32::MIN)
        } else {
            utils::year_for_epoch_millis(instant.saturating_add(wall_offset))
        };
        let test_instant = if year < i64::from(self.from_year) {
            utils::epoch_millis_for_year(i64::from(self.from_year))
                .saturating_sub(wall_offset)
                .saturating_sub(1)
        } else {
            instant
        };
        let next = self
            .recurrence
            .date
            .next(test_instant, standard_offset, save);
        if next > instant
            && utils::year_for_epoch_millis(next.saturating_add(wall_offset))
                > i64::from(self.to_year)
        {
            return instant;
        }
        next
    }
}

#[derive(Debug, Clone, Default)]
struct Era {
    standard_offset: i64,
    rules: Vec<RecurringRule>,
    fixed_savings: Option<(String, i64)>,
    upper_limit: Option<(i32, DateSpec)>,
}

impl Era {
    fn rule_transition(&self, at: i64, rule: &RecurringRule) -> ZoneTransition {
        let wall_offset = self.standard_offset + rule.recurrence.save;
        ZoneTransition {
            at,
            name_key: expand_numeric_format(&rule.recurrence.name_key, wall_offset),
            wall_offset,
            standard_offset: self.standard_offset,
        }
    }

    fn first_transition(&self, first_millis: i64) -> Option<ZoneTransition> {
        if let Some((name_key, save)) = &self.fixed_savings {
            let wall_offset = self.standard_offset + save;
            return Some(ZoneTransition {
                at: first_millis,
                name_key: expand_numeric_format(name_key, wall_offset),
                wall_offset,
                standard_offset: self.standard_offset,
            });
        }

        // Walk the rules up to first_millis and take the state in effect there.
        let mut scratch = self.clone();
        if first_millis > i64::MIN {
            // Only the year before the era and each rule's final year can
            // decide the state at first_millis.
            let seed_year = utils::year_for_epoch_millis(first_millis) - 1;
            for rule in &mut scratch.rules {
                let seed = seed_year.min(i64::from(rule.to_year));
                if let Ok(seed) = i32::try_from(seed) {
                    rule.from_year = rule.from_year.max(seed);
                }
            }
        }
        let mut millis = i64::MIN;
        let mut save = 0;
        let mut first: Option<ZoneTransition> = None;
        while let Some(next) = scratch.next_transition(millis, save) {
            millis = next.at;
            if millis == first_millis {
                return Some(ZoneTransition {
                    at: first_millis,
                    ..next
                });
            }
            if millis > first_millis {
                // Prefer a rule without savings for the name key.
                let first = first.or_else(|| {
                    self.rules
                        .iter()
                        .find(|rule| rule.recurrence.save == 0)
                        .map(|rule| self.rule_transition(first_millis, rule))
                });
                return Some(first.unwrap_or(ZoneTransition {
                    at: first_millis,
                    name_key: next.name_key,
                    wall_offset: self.standard_offset,
                    standard_offset: self.standard_offset,
                }));
            }
            save = next.wall_offset - next.standard_offset;
            first = Some(ZoneTransition {
                at: first_millis,
                ..next
            });
        }
        first
    }

    // Rules with no occurrence after instant are dropped.
    fn next_transition(&mut self, instant: i64, save: i64) -> Option<ZoneTransition> {
        let standard_offset = self.standard_offset;
        let mut best: Option<(i64, usize)> = None;
        let mut remaining = Vec::with_capacity(self.rules.len());
        for rule in core::mem::take(&mut self.rules) {
            let next = rule.next(instant, standard_offset, save);
            if next <= instant {
                continue;
            }
            // Ties go to the later rule.
            if best.is_none_or(|(millis, _)| next <= millis) {
                best = Some((next, remaining.len()));
            }
            remaining.push(rule);
        }
        self.rules = remaining;

        let (next_millis, index) = best?;
        if utils::year_for_epoch_millis(next_millis) >= YEAR_LIMIT {
            return None;
        }
        if next_millis >= self.upper_limit(save) {
            return None;
        }
        self.rules
            .get(index)
            .map(|rule| self.rule_transition(next_millis, rule))
    }

    fn upper_limit(&self, save: i64) -> i64 {
        match &self.upper_limit {
            Some((year, date)) => date.to_instant(i64::from(*year), self.standard_offset, save),
            None => i64::MAX,
        }
    }

    fn build_tail(&self) -> Option<DstZone> {
        let [start, end] = self.rules.as_slice() else {
            return None;
        };
        if start.to_year != i32::MAX || end.to_year != i32::MAX {
            return None;
        }
        let expand = |rule: &RecurringRule| Recurrence {
            name_key: expand_numeric_format(
                &rule.recurrence.name_key,
                self.standard_offset + rule.recurrence.save,
            ),
            ..rule.recurrence.clone()
        };
        Some(DstZone::new(
            self.standard_offset,
            expand(start),
            expand(end),
        ))
    }
}

/// The default [`TransitionBuilder`], compiling to a [`CompiledTimeZone`].
#[derive(Debug, Clone, Default)]
pub struct ZoneBuilder {
    eras: Vec<Era>,
}

impl ZoneBuilder {
    fn last_era(&mut self) -> &mut Era {
        if self.eras.is_empty() {
            self.eras.push(Era::default());
        }
        let last = self.eras.len() - 1;
        &mut self.eras[last]
    }

    fn compile_kind(&self) -> ZoneKind {
        let mut transitions = Vec::new();
        let mut tail = None;
        let mut millis = i64::MIN;
        let last_index = self.eras.len().saturating_sub(1);
        for (index, era) in self.eras.iter().enumerate() {
            let Some(first) = era.first_transition(millis) else {
                continue;
            };
            millis = first.at;
            let mut save = first.wall_offset - first.standard_offset;
            add_transition(&mut transitions, first);

            let mut era = era.clone();
            while let Some(next) = era.next_transition(millis, save) {
                let (next_millis, next_save) =
                    (next.at, next.wall_offset - next.standard_offset);
                // One transition past the start of the tail keeps the seam correct.
                if add_transition(&mut transitions, next) && tail.is_some() {
                    break;
                }
                millis = next_millis;
                save = next_save;
                if tail.is_none() && index == last_index {
                    tail = era.build_tail();
                }
            }
            millis = era.upper_limit(save);
        }

        match (transitions.len(), tail) {
            (0, Some(tail)) => ZoneKind::Dst(tail),
            (0, None) => fixed_kind("UTC", 0, 0),
            (1, None) => {
                let only = &transitions[0];
                fixed_kind(&only.name_key, only.wall_offset, only.standard_offset)
            }
            (_, tail) => ZoneKind::Precalculated(PrecalculatedZone::new(transitions, tail)),
        }
    }
}

impl TransitionBuilder for ZoneBuilder {
    type Zone = CompiledTimeZone;

    fn set_standard_offset(&mut self, millis: i64) {
        self.last_era().standard_offset = millis;
    }

    fn set_fixed_savings(&mut self, name_key: &str, save: i64) {
        self.last_era().fixed_savings = Some((name_key.to_owned(), save));
    }

    fn add_recurring_savings(
        &mut self,
        name_key: &str,
        save: i64,
        from_year: i32,
        to_year: i32,
        date: &DateSpec,
    ) {
        if from_year > to_year {
            return;
        }
        let rule = RecurringRule {
            recurrence: Recurrence {
                date: *date,
                name_key: name_key.to_owned(),
                save,
            },
            from_year,
            to_year,
        };
        let era = self.last_era();
        if !era.rules.contains(&rule) {
            era.rules.push(rule);
        }
    }

    fn add_cutover(&mut self, year: i32, date: &DateSpec) {
        if let Some(last) = self.eras.last_mut() {
            last.upper_limit = Some((year, *date));
        }
        self.eras.push(Era::default());
    }

    fn to_compiled_zone(&self, id: &str) -> CompiledTimeZone {
        CompiledTimeZone::new(id, self.compile_kind())
    }

    fn persist(&self, id: &str) -> Result<Vec<u8>, ZoneCodecError> {
        self.to_compiled_zone(id).to_bytes()
    }

    fn load_from(bytes: &[u8], id: &str) -> Result<CompiledTimeZone, ZoneCodecError> {
        CompiledTimeZone::from_bytes(bytes, id)
    }
}

fn fixed_kind(name_key: &str, wall_offset: i64, standard_offset: i64) -> ZoneKind {
    ZoneKind::Fixed(FixedZone {
        name_key: name_key.to_owned(),
        wall_offset,
        standard_offset,
    })
}

// A transition is only recorded when something changes. A transition landing
// on the same local time as the previous one replaces it.
fn add_transition(transitions: &mut Vec<ZoneTransition>, transition: ZoneTransition) -> bool {
    loop {
        let Some(last) = transitions.last() else {
            transitions.push(transition);
            return true;
        };
        let changes = transition.at > last.at
            && (transition.wall_offset != last.wall_offset
                || transition.standard_offset != last.standard_offset
                || transition.name_key != last.name_key);
        if !changes {
            return false;
        }
        let offset_for_last = transitions
            .len()
            .checked_sub(2)
            .map_or(0, |i| transitions[i].wall_offset);
        let last_local = last.at.saturating_add(offset_for_last);
        let new_local = transition.at.saturating_add(last.wall_offset);
        if new_local != last_local {
            transitions.push(transition);
            return true;
        }
        transitions.pop();
    }
}

/// Replaces `%z` with the numeric form of `wall_offset`, e.g. `+01` or `-0330`.
fn expand_numeric_format(name_key: &str, wall_offset: i64) -> String {
    if !name_key.contains("%z") {
        return name_key.to_owned();
    }
    let seconds = wall_offset.abs() / 1_000;
    let mut numeric = String::new();
    numeric.push(if wall_offset < 0 { '-' } else { '+' });
    let _ = write!(numeric, "{:02}", seconds / 3_600);
    let (minute, second) = (seconds / 60 % 60, seconds % 60);
    if minute != 0 || second != 0 {
        let _ = write!(numeric, "{minute:02}");
    }
    if second != 0 {
        let _ = write!(numeric, "{second:02}");
    }
    name_key.replace("%z", &numeric)
}

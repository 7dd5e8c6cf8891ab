//! Zone records and the resolution of a zone's eras into a transition builder.

use core::fmt;

use alloc::{borrow::ToOwned, string::String, vec, vec::Vec};

use hashbrown::HashMap;

use crate::{
    builder::TransitionBuilder,
    parser::{column, ContextParse, LineParseContext, ZoneInfoParseError},
    rule::RuleSet,
    types::{RulesReference, Time, UntilDateTime},
};

/// A zone era names a rule set that was never defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedRules {
    pub zone: String,
    pub rules: String,
}

impl fmt::Display for UnresolvedRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rules \"{}\" not found for zone {}", self.rules, self.zone)
    }
}

impl core::error::Error for UnresolvedRules {}

/// One line of a zone: `STDOFF RULES FORMAT [UNTIL]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneEra {
    pub standard_offset: Time,
    pub rules: RulesReference,
    pub format: String,
    pub until: Option<UntilDateTime>,
}

impl ZoneEra {
    pub fn parse_tokens(
        tokens: &[&str],
        ctx: &mut LineParseContext,
    ) -> Result<Self, ZoneInfoParseError> {
        let standard_offset = column(tokens, 0, ctx)?.context_parse::<Time>(ctx)?;
        let rules = column(tokens, 1, ctx)?.context_parse::<RulesReference>(ctx)?;
        let format = column(tokens, 2, ctx)?.to_owned();
        let until = match tokens.get(3..) {
            Some(rest) if !rest.is_empty() => Some(UntilDateTime::parse_tokens(rest, ctx)?),
            _ => None,
        };
        Ok(Self {
            standard_offset,
            rules,
            format,
            until,
        })
    }

    /// Registers this era's offset and savings with `builder`.
    fn add_to_builder<B: TransitionBuilder>(
        &self,
        zone: &str,
        builder: &mut B,
        rule_sets: &HashMap<String, RuleSet>,
    ) -> Result<(), UnresolvedRules> {
        builder.set_standard_offset(self.standard_offset.as_millis());
        match &self.rules {
            RulesReference::NoSavings => builder.set_fixed_savings(&self.format, 0),
            RulesReference::FixedSavings(savings) => {
                builder.set_fixed_savings(&self.format, savings.as_millis())
            }
            RulesReference::Named(name) => {
                let rule_set = rule_sets.get(name).ok_or_else(|| UnresolvedRules {
                    zone: zone.to_owned(),
                    rules: name.clone(),
                })?;
                rule_set.add_recurring(builder, &self.format);
            }
        }
        Ok(())
    }
}

/// A named zone and its eras in chronological order.
///
/// Every era but the last ends at its `[UNTIL]` date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRecord {
    name: String,
    eras: Vec<ZoneEra>,
}

impl ZoneRecord {
    pub fn new(name: String, first: ZoneEra) -> Self {
        Self {
            name,
            eras: vec![first],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn eras(&self) -> &[ZoneEra] {
        &self.eras
    }

    /// Whether the last era is unbounded, so no further era may follow.
    pub fn is_closed(&self) -> bool {
        self.eras.last().is_some_and(|era| era.until.is_none())
    }

    pub(crate) fn push(&mut self, era: ZoneEra) {
        self.eras.push(era);
    }

    /// Walks the eras in order, feeding each into `builder`.
    ///
    /// Each bounded era is followed by a cutover at its `[UNTIL]` date. The
    /// walk stops at the first unbounded era.
    pub fn add_to_builder<B: TransitionBuilder>(
        &self,
        builder: &mut B,
        rule_sets: &HashMap<String, RuleSet>,
    ) -> Result<(), UnresolvedRules> {
        for era in &self.eras {
            era.add_to_builder(&self.name, builder, rule_sets)?;
            let Some(until) = era.until else {
                break;
            };
            builder.add_cutover(until.year, &until.date);
        }
        Ok(())
    }
}

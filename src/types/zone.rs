//! Column values specific to a `Zone` line.

use alloc::{borrow::ToOwned, string::String};

use crate::{
    parser::{ContextParse, LineParseContext, TryFromStr, ZoneInfoParseError},
    types::{DateSpec, Time},
};

/// The value in the `RULES` column of a zone line.
///
/// The column is resolved once while parsing: `-` means no savings, a value
/// that reads as a signed time is a fixed amount of savings, and anything
/// else names a rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulesReference {
    NoSavings,
    FixedSavings(Time),
    Named(String),
}

impl TryFromStr<LineParseContext> for RulesReference {
    type Error = ZoneInfoParseError;
    fn try_from_str(s: &str, _: &mut LineParseContext) -> Result<Self, Self::Error> {
        if s == "-" {
            return Ok(Self::NoSavings);
        }
        // A numeric reading always wins over a rule set name.
        if let Some(savings) = Time::parse_prefix(s) {
            return Ok(Self::FixedSavings(savings));
        }
        Ok(Self::Named(s.to_owned()))
    }
}

/// The `[UNTIL]` column of a zone line: the year and date at which the
/// line stops applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UntilDateTime {
    pub year: i32,
    pub date: DateSpec,
}

impl UntilDateTime {
    /// Parses `YEAR [MONTH [DAY [TIME]]]`.
    pub fn parse_tokens(
        tokens: &[&str],
        ctx: &mut LineParseContext,
    ) -> Result<Self, ZoneInfoParseError> {
        ctx.enter("UntilDateTime");
        let Some((year, rest)) = tokens.split_first() else {
            return Err(ZoneInfoParseError::UnexpectedEndOfLine(
                ctx.line_number,
                ctx.span(),
            ));
        };
        let year = year
            .parse::<i32>()
            .map_err(|_| ZoneInfoParseError::InvalidYear(ctx.line_number, (*year).to_owned()))?;
        let date = DateSpec::parse_tokens(rest, ctx)?;
        ctx.exit();
        Ok(Self { year, date })
    }
}

impl TryFromStr<LineParseContext> for UntilDateTime {
    type Error = ZoneInfoParseError;
    fn try_from_str(s: &str, ctx: &mut LineParseContext) -> Result<Self, Self::Error> {
        let tokens = s.split_whitespace().collect::<alloc::vec::Vec<_>>();
        Self::parse_tokens(&tokens, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DayOfMonth, Month, QualifiedTimeKind, WeekDay};

    #[test]
    fn rules_reference() {
        let ctx = &mut LineParseContext::default();
        assert_eq!("-".context_parse::<RulesReference>(ctx).unwrap(), RulesReference::NoSavings);
        assert_eq!(
            "1:00".context_parse::<RulesReference>(ctx).unwrap(),
            RulesReference::FixedSavings(Time::from_millis(3_600_000))
        );
        assert_eq!(
            "-0:30".context_parse::<RulesReference>(ctx).unwrap(),
            RulesReference::FixedSavings(Time::from_millis(-1_800_000))
        );
        assert_eq!(
            "EU".context_parse::<RulesReference>(ctx).unwrap(),
            RulesReference::Named("EU".to_owned())
        );
    }

    #[test]
    fn until_date_time() {
        let ctx = &mut LineParseContext::default();
        let until = "1996".context_parse::<UntilDateTime>(ctx).unwrap();
        assert_eq!(until.year, 1996);
        assert_eq!(until.date, DateSpec::default());

        let until = "1979 Oct lastSun 1:00u".context_parse::<UntilDateTime>(ctx).unwrap();
        assert_eq!(until.year, 1979);
        assert_eq!(until.date.month, Month::Oct);
        assert_eq!(until.date.day, DayOfMonth::Last(WeekDay::Sun));
        assert_eq!(until.date.time, Time::from_millis(3_600_000));
        assert_eq!(until.date.kind, QualifiedTimeKind::Universal);

        assert!(matches!(
            "Oct".context_parse::<UntilDateTime>(ctx),
            Err(ZoneInfoParseError::InvalidYear(..))
        ));
    }
}

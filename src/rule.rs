//! Rule lines and rule sets.

use core::fmt;

use alloc::{borrow::ToOwned, string::String, vec, vec::Vec};

use crate::{
    builder::TransitionBuilder,
    parser::{column, ContextParse, LineParseContext, ZoneInfoParseError},
    types::{parse_optional, parse_year, DateSpec, Time},
};

/// An error in the rule model that is not a syntax error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A rule was added to a rule set with a different name.
    NameMismatch { expected: String, found: String },
    /// The `TO` year of a rule precedes its `FROM` year.
    InvalidYearRange { from: i32, to: i32 },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameMismatch { expected, found } => {
                write!(f, "rule name mismatch: expected \"{expected}\", found \"{found}\"")
            }
            Self::InvalidYearRange { from, to } => {
                write!(f, "rule ends in {to} before it starts in {from}")
            }
        }
    }
}

impl core::error::Error for ModelError {}

/// A single `Rule` line.
///
/// `Rule NAME FROM TO TYPE IN ON AT SAVE LETTER/S`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub from_year: i32,
    pub to_year: i32,
    pub rule_type: Option<String>,
    pub date: DateSpec,
    pub save: Time,
    pub letter: Option<String>,
}

impl Rule {
    /// Parses the columns of a rule line that follow the `Rule` keyword.
    pub fn parse_tokens(
        tokens: &[&str],
        ctx: &mut LineParseContext,
    ) -> Result<Self, ZoneInfoParseError> {
        let name = column(tokens, 0, ctx)?.to_owned();
        let from_year = parse_year(column(tokens, 1, ctx)?, 0, ctx)?;
        let to_year = parse_year(column(tokens, 2, ctx)?, from_year, ctx)?;
        if to_year < from_year {
            return Err(ZoneInfoParseError::Model(
                ctx.line_number,
                ModelError::InvalidYearRange {
                    from: from_year,
                    to: to_year,
                },
            ));
        }
        let rule_type = parse_optional(column(tokens, 3, ctx)?);
        // IN, ON, and AT are all required on a rule line.
        column(tokens, 6, ctx)?;
        let date = DateSpec::parse_tokens(&tokens[4..7], ctx)?;
        let save = column(tokens, 7, ctx)?.context_parse::<Time>(ctx)?;
        let letter = parse_optional(column(tokens, 8, ctx)?);
        Ok(Self {
            name,
            from_year,
            to_year,
            rule_type,
            date,
            save,
            letter,
        })
    }

    /// Formats the name key of this rule from a zone's `FORMAT` column.
    ///
    /// A `STD/DST` pair selects by whether the rule saves time, otherwise the
    /// first `%s` is replaced with the rule's letter.
    pub fn format_name(&self, format: &str) -> String {
        format_name(format, self.save.as_millis(), self.letter.as_deref())
    }

    /// Registers this rule with `builder` as recurring savings.
    pub fn add_recurring<B: TransitionBuilder>(&self, builder: &mut B, format: &str) {
        let name_key = self.format_name(format);
        builder.add_recurring_savings(
            &name_key,
            self.save.as_millis(),
            self.from_year,
            self.to_year,
            &self.date,
        );
    }
}

pub(crate) fn format_name(format: &str, save: i64, letter: Option<&str>) -> String {
    match format.find('/') {
        Some(index) if index > 0 => {
            if save == 0 {
                format[..index].to_owned()
            } else {
                format[index + 1..].to_owned()
            }
        }
        _ => format.replacen("%s", letter.unwrap_or(""), 1),
    }
}

/// All rules sharing one name, in the order they were read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    name: String,
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rule: Rule) -> Self {
        Self {
            name: rule.name.clone(),
            rules: vec![rule],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn add_rule(&mut self, rule: Rule) -> Result<(), ModelError> {
        if rule.name != self.name {
            return Err(ModelError::NameMismatch {
                expected: self.name.clone(),
                found: rule.name,
            });
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Replays every rule into `builder` in file order.
    pub fn add_recurring<B: TransitionBuilder>(&self, builder: &mut B, format: &str) {
        for rule in &self.rules {
            rule.add_recurring(builder, format);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DayOfMonth, Month, QualifiedTimeKind, WeekDay};

    fn parse_rule(line: &str) -> Rule {
        let tokens = line.split_whitespace().collect::<Vec<_>>();
        Rule::parse_tokens(&tokens, &mut LineParseContext::default()).unwrap()
    }

    #[test]
    fn rule_parse() {
        let rule = parse_rule("US 1967 2006 - Oct lastSun 2:00 0 S");
        assert_eq!(rule.name, "US");
        assert_eq!(rule.from_year, 1967);
        assert_eq!(rule.to_year, 2006);
        assert_eq!(rule.rule_type, None);
        assert_eq!(rule.date.month, Month::Oct);
        assert_eq!(rule.date.day, DayOfMonth::Last(WeekDay::Sun));
        assert_eq!(rule.date.time, Time::from_millis(7_200_000));
        assert_eq!(rule.date.kind, QualifiedTimeKind::Local);
        assert_eq!(rule.save, Time::ZERO);
        assert_eq!(rule.letter.as_deref(), Some("S"));

        let rule = parse_rule("Zion 1940 only odd Jun 1 0:00 1:00 D");
        assert_eq!(rule.to_year, 1940);
        assert_eq!(rule.rule_type.as_deref(), Some("odd"));

        let rule = parse_rule("Cyprus min max - Mar Sun>=25 0:00 1:00 -");
        assert_eq!(rule.from_year, i32::MIN);
        assert_eq!(rule.to_year, i32::MAX);
        assert_eq!(rule.letter, None);
    }

    #[test]
    fn rule_parse_errors() {
        let tokens = ["US", "1967", "2006", "-", "Oct", "lastSun"];
        assert!(matches!(
            Rule::parse_tokens(&tokens, &mut LineParseContext::default()),
            Err(ZoneInfoParseError::UnexpectedEndOfLine(..))
        ));
        let tokens = ["US", "2007", "1967", "-", "Oct", "lastSun", "2:00", "0", "S"];
        assert_eq!(
            Rule::parse_tokens(&tokens, &mut LineParseContext::default()),
            Err(ZoneInfoParseError::Model(
                1,
                ModelError::InvalidYearRange {
                    from: 2007,
                    to: 1967
                }
            ))
        );
    }

    #[test]
    fn name_formatting() {
        assert_eq!(format_name("GMT/BST", 0, Some("S")), "GMT");
        assert_eq!(format_name("GMT/BST", 3_600_000, Some("D")), "BST");
        assert_eq!(format_name("CE%sT", 3_600_000, Some("S")), "CEST");
        assert_eq!(format_name("CE%sT", 0, None), "CET");
        assert_eq!(format_name("LMT", 0, Some("S")), "LMT");
        // A leading slash is not a pair.
        assert_eq!(format_name("/X", 0, None), "/X");
    }

    #[test]
    fn rule_set_name_mismatch() {
        let mut set = RuleSet::new(parse_rule("EU 1981 max - Mar lastSun 1:00u 1:00 S"));
        for name in ["W-Eur", "eu", "EU2", ""] {
            let mut rule = parse_rule("EU 1996 max - Oct lastSun 1:00u 0 -");
            rule.name = name.to_owned();
            assert_eq!(
                set.add_rule(rule),
                Err(ModelError::NameMismatch {
                    expected: "EU".to_owned(),
                    found: name.to_owned()
                })
            );
        }
        set.add_rule(parse_rule("EU 1996 max - Oct lastSun 1:00u 0 -"))
            .unwrap();
        assert_eq!(set.rules().len(), 2);
        assert_eq!(set.name(), "EU");
    }
}

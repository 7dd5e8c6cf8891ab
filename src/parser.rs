//! Zoneinfo source parsing
//!
//! The parser is a small state machine over the lines of a zoneinfo source.
//! `Rule` lines are merged into their named rule set, `Zone` lines open a
//! zone whose eras are extended by indented continuation lines, and `Link`
//! lines are recorded for resolution after compilation.

use core::{fmt, str::Lines};

use alloc::{borrow::ToOwned, string::String, vec, vec::Vec};

use crate::{
    compiler::{CompilationSession, Diagnostic},
    rule::{ModelError, Rule, RuleSet},
    zone::{ZoneEra, ZoneRecord},
};

/// A fatal error encountered while parsing a zoneinfo source.
///
/// Every variant carries the line number it was raised on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneInfoParseError {
    UnexpectedEndOfLine(u32, &'static str),
    InvalidTime(u32, String),
    InvalidDateSpec(u32, String),
    InvalidYear(u32, String),
    MissingIdentifier(u32),
    Model(u32, ModelError),
}

impl ZoneInfoParseError {
    pub fn line_number(&self) -> u32 {
        match self {
            Self::UnexpectedEndOfLine(line, _)
            | Self::InvalidTime(line, _)
            | Self::InvalidDateSpec(line, _)
            | Self::InvalidYear(line, _)
            | Self::MissingIdentifier(line)
            | Self::Model(line, _) => *line,
        }
    }
}

impl fmt::Display for ZoneInfoParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEndOfLine(line, span) => {
                write!(f, "line {line}: unexpected end of line while parsing {span}")
            }
            Self::InvalidTime(line, s) => write!(f, "line {line}: invalid time \"{s}\""),
            Self::InvalidDateSpec(line, s) => {
                write!(f, "line {line}: invalid date specification \"{s}\"")
            }
            Self::InvalidYear(line, s) => write!(f, "line {line}: invalid year \"{s}\""),
            Self::MissingIdentifier(line) => write!(f, "line {line}: missing identifier"),
            Self::Model(line, e) => write!(f, "line {line}: {e}"),
        }
    }
}

impl core::error::Error for ZoneInfoParseError {}

pub trait TryFromStr<C>: Sized {
    type Error;
    fn try_from_str(s: &str, context: &mut C) -> Result<Self, Self::Error>;
}

#[derive(Debug, Clone)]
pub struct LineParseContext {
    pub line_number: u32,
    pub spans: Vec<&'static str>,
}

impl LineParseContext {
    pub fn enter(&mut self, name: &'static str) {
        self.spans.push(name);
    }

    pub fn span(&self) -> &'static str {
        self.spans.last().copied().unwrap_or("undefined")
    }

    pub fn exit(&mut self) {
        self.spans.pop();
    }
}

impl Default for LineParseContext {
    fn default() -> Self {
        Self {
            line_number: 1,
            spans: vec!["undefined"],
        }
    }
}

pub trait ContextParse {
    fn context_parse<T: TryFromStr<LineParseContext>>(
        &self,
        ctx: &mut LineParseContext,
    ) -> Result<T, <T as TryFromStr<LineParseContext>>::Error>;
}

impl ContextParse for &str {
    fn context_parse<T: TryFromStr<LineParseContext>>(
        &self,
        ctx: &mut LineParseContext,
    ) -> Result<T, <T as TryFromStr<LineParseContext>>::Error> {
        T::try_from_str(self, ctx)
    }
}

impl ContextParse for String {
    fn context_parse<T: TryFromStr<LineParseContext>>(
        &self,
        ctx: &mut LineParseContext,
    ) -> Result<T, <T as TryFromStr<LineParseContext>>::Error> {
        T::try_from_str(self, ctx)
    }
}

/// Returns the token at `index`, or an end of line error.
pub(crate) fn column<'a>(
    tokens: &[&'a str],
    index: usize,
    context: &LineParseContext,
) -> Result<&'a str, ZoneInfoParseError> {
    tokens
        .get(index)
        .copied()
        .ok_or(ZoneInfoParseError::UnexpectedEndOfLine(
            context.line_number,
            context.span(),
        ))
}

pub(crate) fn remove_comments(line: &str) -> &str {
    if let Some((cleaned, _comment)) = line.split_once('#') {
        cleaned
    } else {
        line
    }
}

#[non_exhaustive]
pub struct ZoneInfoParser<'data> {
    lines: Lines<'data>,
}

impl<'data> ZoneInfoParser<'data> {
    /// Creates a parser from a `&str`
    pub fn from_zoneinfo_str(source: &'data str) -> Self {
        Self {
            lines: source.lines(),
        }
    }

    /// Parses every line of the source into `session`.
    ///
    /// Rule sets, zones, and links are appended to whatever the session
    /// already holds, so multiple sources can be parsed into one session.
    pub fn parse_into(
        &mut self,
        session: &mut CompilationSession,
    ) -> Result<(), ZoneInfoParseError> {
        let mut context = LineParseContext::default();
        let mut open_zone: Option<ZoneRecord> = None;
        for line in self.lines.by_ref() {
            let cleaned = remove_comments(line);
            let tokens = cleaned.split_whitespace().collect::<Vec<_>>();
            if tokens.is_empty() {
                // Blank and comment only lines neither extend nor close a zone.
            } else if cleaned.starts_with(char::is_whitespace) {
                match open_zone.as_mut() {
                    Some(zone) if zone.is_closed() => {
                        let diagnostic = Diagnostic::UnexpectedContinuation {
                            line: context.line_number,
                            zone: zone.name().to_owned(),
                        };
                        log::warn!("{diagnostic}");
                        session.diagnostics.push(diagnostic);
                    }
                    Some(zone) => {
                        context.enter("ZoneEra");
                        zone.push(ZoneEra::parse_tokens(&tokens, &mut context)?);
                        context.exit();
                    }
                    None => log::debug!(
                        "Ignoring continuation line {} outside of a zone",
                        context.line_number
                    ),
                }
            } else {
                if let Some(zone) = open_zone.take() {
                    session.zones.push(zone);
                }
                open_zone = Self::parse_line(&tokens, session, &mut context)?;
            }
            context.line_number += 1;
        }
        if let Some(zone) = open_zone {
            session.zones.push(zone);
        }
        Ok(())
    }

    fn parse_line(
        tokens: &[&str],
        session: &mut CompilationSession,
        context: &mut LineParseContext,
    ) -> Result<Option<ZoneRecord>, ZoneInfoParseError> {
        let keyword = tokens[0];
        if keyword.eq_ignore_ascii_case("Rule") {
            context.enter("Rule");
            let rule = Rule::parse_tokens(&tokens[1..], context)?;
            context.exit();
            if let Some(rule_set) = session.rule_sets.get_mut(&rule.name) {
                rule_set
                    .add_rule(rule)
                    .map_err(|e| ZoneInfoParseError::Model(context.line_number, e))?;
            } else {
                session
                    .rule_sets
                    .insert(rule.name.clone(), RuleSet::new(rule));
            }
            Ok(None)
        } else if keyword.eq_ignore_ascii_case("Zone") {
            context.enter("Zone");
            let name = tokens
                .get(1)
                .ok_or(ZoneInfoParseError::MissingIdentifier(context.line_number))?;
            let era = ZoneEra::parse_tokens(&tokens[2..], context)?;
            context.exit();
            Ok(Some(ZoneRecord::new((*name).to_owned(), era)))
        } else if keyword.eq_ignore_ascii_case("Link") {
            context.enter("Link");
            let target = column(tokens, 1, context)?;
            let alias = column(tokens, 2, context)?;
            context.exit();
            session.links.push((target.to_owned(), alias.to_owned()));
            Ok(None)
        } else {
            let diagnostic = Diagnostic::UnknownLine {
                line: context.line_number,
                text: tokens.join(" "),
            };
            log::warn!("{diagnostic}");
            session.diagnostics.push(diagnostic);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QualifiedTimeKind, RulesReference, Time};

    const EU_SOURCE: &str = r#"
# Rule	NAME	FROM	TO	-	IN	ON	AT	SAVE	LETTER/S
Rule	EU	1977	1980	-	Apr	Sun>=1	 1:00u	1:00	S
Rule	EU	1977	only	-	Sep	lastSun	 1:00u	0	-
Rule	EU	1981	max	-	Mar	lastSun	 1:00u	1:00	S
Rule	EU	1996	max	-	Oct	lastSun	 1:00u	0	-

# Zone	NAME		STDOFF	RULES	FORMAT	[UNTIL]
Zone	Europe/Brussels	0:17:30 -	LMT	1880
			0:17:30	-	BMT	1892 May  1 00:17:30
			0:00	-	WET	1977
			1:00	EU	CE%sT
Link	Europe/Brussels	Europe/Amsterdam
"#;

    fn parse(source: &str) -> Result<CompilationSession, ZoneInfoParseError> {
        let mut session = CompilationSession::default();
        ZoneInfoParser::from_zoneinfo_str(source).parse_into(&mut session)?;
        Ok(session)
    }

    #[test]
    fn parse_eu_source() {
        let session = parse(EU_SOURCE).unwrap();
        let eu = session.rule_sets.get("EU").unwrap();
        assert_eq!(eu.rules().len(), 4);
        assert_eq!(eu.rules()[1].to_year, 1977);
        assert_eq!(eu.rules()[2].to_year, i32::MAX);
        assert_eq!(eu.rules()[0].date.kind, QualifiedTimeKind::Universal);

        assert_eq!(session.zones.len(), 1);
        let brussels = &session.zones[0];
        assert_eq!(brussels.name(), "Europe/Brussels");
        assert_eq!(brussels.eras().len(), 4);
        assert_eq!(
            brussels.eras()[1].standard_offset,
            Time::from_millis(17 * 60_000 + 30_000)
        );
        assert_eq!(brussels.eras()[1].until.unwrap().year, 1892);
        assert_eq!(
            brussels.eras()[3].rules,
            RulesReference::Named("EU".to_owned())
        );
        assert!(brussels.eras()[3].until.is_none());

        assert_eq!(
            session.links,
            vec![(
                "Europe/Brussels".to_owned(),
                "Europe/Amsterdam".to_owned()
            )]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let session = parse("zone Etc/UTC 0 - UTC\nLINK Etc/UTC Etc/Universal\n").unwrap();
        assert_eq!(session.zones.len(), 1);
        assert_eq!(session.links.len(), 1);
    }

    #[test]
    fn continuation_after_unbounded_era() {
        let source = "Zone Test/Zone 1:00 - TST\n\t2:00 - TST2\nLink Test/Zone Test/Alias\n";
        let session = parse(source).unwrap();
        assert_eq!(session.zones.len(), 1);
        assert_eq!(session.zones[0].eras().len(), 1);
        assert_eq!(session.links.len(), 1);
        assert_eq!(
            session.diagnostics,
            vec![Diagnostic::UnexpectedContinuation {
                line: 2,
                zone: "Test/Zone".to_owned()
            }]
        );
    }

    #[test]
    fn comment_lines_keep_zone_open() {
        let source = "Zone Test/Zone 1:00 - TST 2000\n    # indented comment\n\n\t2:00 - TST2\n";
        let session = parse(source).unwrap();
        assert_eq!(session.zones[0].eras().len(), 2);
    }

    #[test]
    fn stray_continuation_is_ignored() {
        let session = parse("\t1:00 - TST\nLink A B\n").unwrap();
        assert!(session.zones.is_empty());
        assert_eq!(session.links.len(), 1);
    }

    #[test]
    fn unknown_lines_are_diagnostics() {
        let session = parse("Leap 2016 Dec 31 23:59:60 + S\n").unwrap();
        assert_eq!(
            session.diagnostics,
            vec![Diagnostic::UnknownLine {
                line: 1,
                text: "Leap 2016 Dec 31 23:59:60 + S".to_owned()
            }]
        );
    }

    #[test]
    fn syntax_errors_are_fatal() {
        let err = parse("Rule X 1990 only - Foo lastSun 2:00 0 -\n").unwrap_err();
        assert!(matches!(err, ZoneInfoParseError::InvalidDateSpec(1, _)));
        let err = parse("\n\nRule X 1990 1980 - Oct lastSun 2:00 0 -\n").unwrap_err();
        assert!(matches!(
            err,
            ZoneInfoParseError::Model(3, ModelError::InvalidYearRange { .. })
        ));
        let err = parse("Zone\n").unwrap_err();
        assert_eq!(err, ZoneInfoParseError::MissingIdentifier(1));
        let err = parse("Link Europe/London\n").unwrap_err();
        assert!(matches!(err, ZoneInfoParseError::UnexpectedEndOfLine(1, "Link")));
    }
}

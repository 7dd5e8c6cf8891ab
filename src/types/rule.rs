//! Column values specific to a `Rule` line.

use alloc::{borrow::ToOwned, string::String};

use crate::parser::{LineParseContext, ZoneInfoParseError};

/// Parses a value of the `FROM` or `TO` column of a rule line.
///
/// "min"/"minimum" resolve to the smallest representable year, "max"/"maximum"
/// to the largest, and "only" resolves to `only`.
pub fn parse_year(s: &str, only: i32, ctx: &LineParseContext) -> Result<i32, ZoneInfoParseError> {
    let lower = s.to_ascii_lowercase();
    match lower.as_str() {
        "min" | "minimum" => Ok(i32::MIN),
        "max" | "maximum" => Ok(i32::MAX),
        "only" => Ok(only),
        _ => s
            .parse::<i32>()
            .map_err(|_| ZoneInfoParseError::InvalidYear(ctx.line_number, s.to_owned())),
    }
}

/// Parses an optional text column, where `-` designates no value.
pub fn parse_optional(s: &str) -> Option<String> {
    (s != "-").then(|| s.to_owned())
}

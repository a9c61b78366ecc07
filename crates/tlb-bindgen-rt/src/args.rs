//! Optional-argument matching for late-bound calls.
//!
//! Generated dispatch methods take their trailing optional parameters as a
//! slice of [`OptArg`]. Each method has a side table with the declared names of
//! those parameters in order, and [`match_optional_args`] turns the caller's
//! mix of positional and named arguments into the ordered values to send.

use crate::variant::Variant;
use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum OptArg {
    Positional(Variant),
    Named(String, Variant),
}

/// Positional optional argument.
pub fn opt(value: impl Into<Variant>) -> OptArg {
    OptArg::Positional(value.into())
}

/// Optional argument addressed by its declared name.
pub fn named(name: impl Into<String>, value: impl Into<Variant>) -> OptArg {
    OptArg::Named(name.into(), value.into())
}

/// Order `actuals` against the `declared` optional parameter names.
///
/// Positional arguments fill slots from the start and must precede named
/// ones. Names match case-insensitively. Unfilled slots before the last
/// supplied one are [`Variant::Empty`]; nothing is produced after it.
pub fn match_optional_args(declared: &[&str], actuals: &[OptArg]) -> Result<Vec<Variant>> {
    let mut slots: Vec<Option<Variant>> = vec![None; declared.len()];
    let mut seen_named = false;
    let mut position = 0;

    for (index, actual) in actuals.iter().enumerate() {
        match actual {
            OptArg::Positional(value) => {
                if seen_named {
                    return Err(Error::PositionalAfterNamed(index));
                }
                if position >= declared.len() {
                    return Err(Error::TooManyArguments {
                        declared: declared.len(),
                        supplied: actuals.len(),
                    });
                }
                slots[position] = Some(value.clone());
                position += 1;
            }
            OptArg::Named(name, value) => {
                seen_named = true;
                let slot = declared
                    .iter()
                    .position(|d| d.eq_ignore_ascii_case(name))
                    .ok_or_else(|| Error::UnknownArgument(name.clone()))?;
                if slots[slot].is_some() {
                    return Err(Error::DuplicateArgument(declared[slot].to_owned()));
                }
                slots[slot] = Some(value.clone());
            }
        }
    }

    let used = slots.iter().rposition(Option::is_some).map_or(0, |last| last + 1);
    slots.truncate(used);
    Ok(slots.into_iter().map(Option::unwrap_or_default).collect())
}

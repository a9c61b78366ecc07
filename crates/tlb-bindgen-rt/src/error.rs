use thiserror::Error;

use crate::abi::{GUID, HRESULT};

/// Errors raised by generated bindings and the support types they call into.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("cannot convert {found} variant to {expected}")]
    Conversion {
        expected: &'static str,
        found: &'static str,
    },

    #[error("value {value} does not fit in {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("missing argument #{0}")]
    MissingArgument(usize),

    #[error("unknown optional argument `{0}`")]
    UnknownArgument(String),

    #[error("optional argument `{0}` supplied more than once")]
    DuplicateArgument(String),

    #[error("positional argument #{0} follows a named argument")]
    PositionalAfterNamed(usize),

    #[error("too many arguments: {supplied} supplied, {declared} declared")]
    TooManyArguments { declared: usize, supplied: usize },

    #[error("null interface pointer")]
    NullPointer,

    #[error("no platform installed on this thread")]
    NoPlatform,

    #[error("interface {0} is not supported")]
    NoInterface(GUID),

    #[error("connection cookie {0} is not registered")]
    UnknownCookie(u32),

    #[error("member is not implemented")]
    NotImplemented,

    #[error("object is busy dispatching another call")]
    Busy,

    #[error("call failed with HRESULT {0}")]
    Failed(HRESULT),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

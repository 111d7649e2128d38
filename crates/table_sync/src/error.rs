use anyhow::Error as AnyError;
use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Outcome of a failed request.
#[derive(Debug)]
pub enum FetchError {
    /// Superseded by a newer request for the same element, or timed out.
    /// Callers stay silent on this variant.
    Aborted,
    /// Network, HTTP or decoding failure.
    Transport(AnyError),
}

impl FetchError {
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Aborted => write!(f, "AbortError: the request was aborted"),
            Self::Transport(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FetchError {}

impl From<AnyError> for FetchError {
    fn from(err: AnyError) -> Self {
        Self::Transport(err)
    }
}

/// Page configuration problems detected while enhancing a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Two filter forms declare the same field name, so ownership of the
    /// query-string key would be ambiguous.
    OverlappingFieldNames {
        field: String,
        first_form: String,
        second_form: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::OverlappingFieldNames {
                field,
                first_form,
                second_form,
            } => write!(
                f,
                "filter forms for tables {first_form:?} and {second_form:?} both declare field {field:?}"
            ),
        }
    }
}

impl Error for ConfigError {}

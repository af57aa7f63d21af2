//! Addressing of the data held by an actor output.
//!
//! Tokens such as `"merged"` or `"3"` are parsed once at the boundary into a
//! [`Selector`]; everything past the boundary matches on the enum.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Index of a simulation run.
pub type RunIndex = u32;

/// Which data of an output an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// The running aggregate across runs.
    Merged,
    /// Every retained run, in run order.
    AllRuns,
    /// Every retained run followed by the merged data.
    All,
    /// A single run.
    Run(RunIndex),
}

impl Selector {
    /// Returns the run index if this selector names a single run.
    #[must_use]
    pub const fn run_index(self) -> Option<RunIndex> {
        match self {
            Self::Run(index) => Some(index),
            _ => None,
        }
    }

    /// Narrows this selector to a single addressable data set.
    #[must_use]
    pub const fn as_identifier(self) -> Option<DataIdentifier> {
        match self {
            Self::Merged => Some(DataIdentifier::Merged),
            Self::Run(index) => Some(DataIdentifier::Run(index)),
            Self::AllRuns | Self::All => None,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merged => write!(f, "merged"),
            Self::AllRuns => write!(f, "all_runs"),
            Self::All => write!(f, "all"),
            Self::Run(index) => write!(f, "{index}"),
        }
    }
}

impl FromStr for Selector {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "merged" => Ok(Self::Merged),
            "all_runs" => Ok(Self::AllRuns),
            "all" => Ok(Self::All),
            other => other
                .parse::<RunIndex>()
                .map(Self::Run)
                .map_err(|_| ConfigurationError::InvalidSelector {
                    token: s.to_string(),
                }),
        }
    }
}

impl From<RunIndex> for Selector {
    fn from(index: RunIndex) -> Self {
        Self::Run(index)
    }
}

impl From<DataIdentifier> for Selector {
    fn from(id: DataIdentifier) -> Self {
        match id {
            DataIdentifier::Merged => Self::Merged,
            DataIdentifier::Run(index) => Self::Run(index),
        }
    }
}

/// Conversion into a [`Selector`] at an API boundary.
///
/// Implemented for already-parsed selectors, run indices and string tokens,
/// so callers can pass whichever they hold.
pub trait IntoSelector {
    /// Parses or converts `self` into a selector.
    fn into_selector(self) -> Result<Selector, ConfigurationError>;
}

impl IntoSelector for Selector {
    fn into_selector(self) -> Result<Selector, ConfigurationError> {
        Ok(self)
    }
}

impl IntoSelector for DataIdentifier {
    fn into_selector(self) -> Result<Selector, ConfigurationError> {
        Ok(self.into())
    }
}

impl IntoSelector for RunIndex {
    fn into_selector(self) -> Result<Selector, ConfigurationError> {
        Ok(Selector::Run(self))
    }
}

impl IntoSelector for &str {
    fn into_selector(self) -> Result<Selector, ConfigurationError> {
        self.parse()
    }
}

impl IntoSelector for String {
    fn into_selector(self) -> Result<Selector, ConfigurationError> {
        self.parse()
    }
}

impl IntoSelector for &String {
    fn into_selector(self) -> Result<Selector, ConfigurationError> {
        self.parse()
    }
}

/// Identifies one concrete data set: a run or the merged aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataIdentifier {
    Run(RunIndex),
    Merged,
}

impl fmt::Display for DataIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merged => write!(f, "merged"),
            Self::Run(index) => write!(f, "{index}"),
        }
    }
}

/// Suffix inserted into file names of per-run data, e.g. `run0003`.
///
/// Indices are zero-padded to four digits; wider indices keep all digits.
#[must_use]
pub fn run_suffix(run_index: RunIndex) -> String {
    format!("run{run_index:04}")
}

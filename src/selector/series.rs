//! Mapping from OS series codenames to release versions.

use std::collections::BTreeMap;

const UBUNTU_SERIES: &[(&str, &str)] = &[
    ("precise", "12.04"),
    ("quantal", "12.10"),
    ("raring", "13.04"),
    ("saucy", "13.10"),
    ("trusty", "14.04"),
    ("utopic", "14.10"),
    ("vivid", "15.04"),
    ("wily", "15.10"),
    ("xenial", "16.04"),
    ("yakkety", "16.10"),
    ("zesty", "17.04"),
    ("artful", "17.10"),
    ("bionic", "18.04"),
    ("cosmic", "18.10"),
    ("disco", "19.04"),
    ("eoan", "19.10"),
    ("focal", "20.04"),
    ("groovy", "20.10"),
    ("hirsute", "21.04"),
    ("impish", "21.10"),
    ("jammy", "22.04"),
    ("kinetic", "22.10"),
    ("lunar", "23.04"),
    ("mantic", "23.10"),
    ("noble", "24.04"),
];

/// Lookup table from series codename to release version.
///
/// The selector matches catalog products on the version this table gives
/// for the requested series. Series missing from the table match on the
/// product's `release` field instead.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SeriesTable {
    versions: BTreeMap<String, String>,
}

impl SeriesTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table of Ubuntu LTS and interim releases.
    #[must_use]
    pub fn ubuntu() -> Self {
        UBUNTU_SERIES
            .iter()
            .map(|(series, version)| (*series, *version))
            .collect()
    }

    /// Adds or replaces a mapping.
    #[must_use]
    pub fn with(mut self, series: impl Into<String>, version: impl Into<String>) -> Self {
        self.versions.insert(series.into(), version.into());
        self
    }

    /// Release version for `series`, if known.
    #[must_use]
    pub fn version(&self, series: &str) -> Option<&str> {
        self.versions.get(series).map(String::as_str)
    }
}

impl<S: Into<String>, V: Into<String>> FromIterator<(S, V)> for SeriesTable {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        Self {
            versions: iter
                .into_iter()
                .map(|(series, version)| (series.into(), version.into()))
                .collect(),
        }
    }
}

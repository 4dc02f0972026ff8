use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::catalog::SeriesKey;
use crate::errors::ValidationError;
use crate::resolver::Resolution;

/// Highest volume number accepted in a selection.
pub const MAX_VOLUME_NUMBER: u32 = 9999;

/// A set of volume numbers, parsed from lists and ranges like `1,2,5-7`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VolumeSelection(BTreeSet<u32>);

impl VolumeSelection {
    pub fn new(volumes: impl IntoIterator<Item = u32>) -> Self {
        Self(volumes.into_iter().collect())
    }

    pub fn range(first: u32, last: u32) -> Self {
        Self((first..=last).collect())
    }

    pub fn volumes(&self) -> &BTreeSet<u32> {
        &self.0
    }

    pub fn into_volumes(self) -> BTreeSet<u32> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn union(&mut self, other: &VolumeSelection) {
        self.0.extend(other.0.iter().copied());
    }
}

impl FromStr for VolumeSelection {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidVolumeSelection(s.to_string());
        let parse = |part: &str| -> Result<u32, ValidationError> {
            let number: u32 = part.trim().parse().map_err(|_| invalid())?;
            if number == 0 || number > MAX_VOLUME_NUMBER {
                return Err(invalid());
            }
            Ok(number)
        };

        let mut volumes = BTreeSet::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('-') {
                Some((first, last)) => {
                    let (first, last) = (parse(first)?, parse(last)?);
                    if first > last {
                        return Err(invalid());
                    }
                    volumes.extend(first..=last);
                }
                None => {
                    volumes.insert(parse(part)?);
                }
            }
        }

        if volumes.is_empty() {
            return Err(invalid());
        }
        Ok(Self(volumes))
    }
}

impl fmt::Display for VolumeSelection {
    /// Compact form: consecutive runs collapse to ranges.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        let mut iter = self.0.iter().copied().peekable();
        while let Some(start) = iter.next() {
            let mut end = start;
            while iter.peek() == Some(&(end + 1)) {
                end += 1;
                iter.next();
            }
            parts.push(if start == end {
                start.to_string()
            } else {
                format!("{}-{}", start, end)
            });
        }
        f.write_str(&parts.join(","))
    }
}

/// Answer to one series request.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesLookup {
    pub series_name: String,
    pub key: SeriesKey,
    /// Volumes the cache answered completely.
    pub cache_hits: BTreeSet<u32>,
    pub resolution: Resolution,
}

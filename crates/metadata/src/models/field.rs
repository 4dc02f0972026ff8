use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A recognised bibliographic field.
///
/// Completeness is measured against all of these, so adding a variant
/// changes every stored completeness score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Isbn,
    Publisher,
    CopyrightYear,
    Description,
    CoverUrl,
    Msrp,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Title,
        Field::Isbn,
        Field::Publisher,
        Field::CopyrightYear,
        Field::Description,
        Field::CoverUrl,
        Field::Msrp,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Isbn => "isbn",
            Field::Publisher => "publisher",
            Field::CopyrightYear => "copyright_year",
            Field::Description => "description",
            Field::CoverUrl => "cover_url",
            Field::Msrp => "msrp",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("unknown field '{}'", s))
    }
}

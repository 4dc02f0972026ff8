use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Field;

/// The nullable field set of one volume.
///
/// Providers fill whatever subset they know; the resolver merges several
/// of these into a single record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeFields {
    pub title: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub copyright_year: Option<i32>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub msrp: Option<Decimal>,
}

impl VolumeFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `field` currently holds a value.
    pub fn has(&self, field: Field) -> bool {
        match field {
            Field::Title => self.title.is_some(),
            Field::Isbn => self.isbn.is_some(),
            Field::Publisher => self.publisher.is_some(),
            Field::CopyrightYear => self.copyright_year.is_some(),
            Field::Description => self.description.is_some(),
            Field::CoverUrl => self.cover_url.is_some(),
            Field::Msrp => self.msrp.is_some(),
        }
    }

    pub fn present(&self) -> Vec<Field> {
        Field::ALL.into_iter().filter(|f| self.has(*f)).collect()
    }

    pub fn missing(&self) -> Vec<Field> {
        Field::ALL.into_iter().filter(|f| !self.has(*f)).collect()
    }

    pub fn filled_count(&self) -> usize {
        Field::ALL.iter().filter(|f| self.has(**f)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.filled_count() == 0
    }

    pub fn clear(&mut self, field: Field) {
        match field {
            Field::Title => self.title = None,
            Field::Isbn => self.isbn = None,
            Field::Publisher => self.publisher = None,
            Field::CopyrightYear => self.copyright_year = None,
            Field::Description => self.description = None,
            Field::CoverUrl => self.cover_url = None,
            Field::Msrp => self.msrp = None,
        }
    }

    /// Copy `field` from `other` if this side is null and `other` is not.
    ///
    /// Returns true when a value was taken. A present value is never
    /// replaced, which keeps merges monotonic.
    pub fn fill_from(&mut self, other: &VolumeFields, field: Field) -> bool {
        if self.has(field) || !other.has(field) {
            return false;
        }
        match field {
            Field::Title => self.title = other.title.clone(),
            Field::Isbn => self.isbn = other.isbn.clone(),
            Field::Publisher => self.publisher = other.publisher.clone(),
            Field::CopyrightYear => self.copyright_year = other.copyright_year,
            Field::Description => self.description = other.description.clone(),
            Field::CoverUrl => self.cover_url = other.cover_url.clone(),
            Field::Msrp => self.msrp = other.msrp,
        }
        true
    }

    /// Keep only the listed fields.
    pub fn retain(&mut self, fields: &[Field]) {
        for field in Field::ALL {
            if !fields.contains(&field) {
                self.clear(field);
            }
        }
    }

    /// Trim text fields and turn blanks into nulls.
    ///
    /// Adapters call this on everything they return so that an empty
    /// string never counts towards completeness.
    pub fn normalized(mut self) -> Self {
        fn clean(value: &mut Option<String>) {
            if let Some(text) = value.take() {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    *value = Some(trimmed.to_string());
                }
            }
        }

        clean(&mut self.title);
        clean(&mut self.isbn);
        clean(&mut self.publisher);
        clean(&mut self.description);
        clean(&mut self.cover_url);

        if let Some(isbn) = self.isbn.take() {
            let digits: String = isbn
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == 'X' || *c == 'x')
                .collect();
            if digits.len() == 10 || digits.len() == 13 {
                self.isbn = Some(digits.to_ascii_uppercase());
            }
        }
        if matches!(self.copyright_year, Some(year) if !(1000..=9999).contains(&year)) {
            self.copyright_year = None;
        }
        if matches!(self.msrp, Some(price) if price <= Decimal::ZERO) {
            self.msrp = None;
        }
        self
    }
}

//! Database models for the series cache.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use shelfmark_core::catalog::{CacheEntry, Provenance, SeriesKey, VolumeRecord};
use shelfmark_metadata::{Field, VolumeFields};

use crate::errors::StorageError;

#[derive(Queryable, Selectable, Insertable, AsChangeset, Identifiable, Debug, Clone)]
#[diesel(table_name = crate::schema::series_cache)]
#[diesel(primary_key(series_key))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SeriesRowDB {
    pub series_key: String,
    pub display_name: String,
    pub last_updated: String,
    pub last_attempted: Option<String>,
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Identifiable, Debug, Clone)]
#[diesel(table_name = crate::schema::volume_records)]
#[diesel(primary_key(series_key, volume_number))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct VolumeRowDB {
    pub series_key: String,
    pub volume_number: i32,
    pub title: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub copyright_year: Option<i32>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    /// Decimal as text, so prices round-trip exactly.
    pub msrp: Option<String>,
    /// JSON map of field to provenance.
    pub provenance: String,
    pub lookup_attempts: i32,
    /// JSON list of fields confirmed absent.
    pub unavailable: String,
    pub updated_at: String,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::SerializationError(format!("timestamp '{}': {}", value, e)))
}

fn to_i32(value: u32, what: &str) -> Result<i32, StorageError> {
    i32::try_from(value)
        .map_err(|_| StorageError::SerializationError(format!("{} {} out of range", what, value)))
}

impl From<&CacheEntry> for SeriesRowDB {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            series_key: entry.key.to_string(),
            display_name: entry.display_name.clone(),
            last_updated: entry.last_updated.to_rfc3339(),
            last_attempted: entry.last_attempted.map(|t| t.to_rfc3339()),
        }
    }
}

impl SeriesRowDB {
    /// Build an entry from this row and its volume rows.
    pub fn into_entry(self, volumes: Vec<VolumeRowDB>) -> Result<CacheEntry, StorageError> {
        let volumes = volumes
            .into_iter()
            .map(|row| row.into_record().map(|r| (r.volume_number, r)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(CacheEntry {
            key: SeriesKey::from_normalized(self.series_key),
            display_name: self.display_name,
            volumes,
            last_updated: parse_timestamp(&self.last_updated)?,
            last_attempted: self
                .last_attempted
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
        })
    }
}

impl VolumeRowDB {
    pub fn from_record(record: &VolumeRecord) -> Result<Self, StorageError> {
        let fields = &record.fields;
        Ok(Self {
            series_key: record.series_key.to_string(),
            volume_number: to_i32(record.volume_number, "volume number")?,
            title: fields.title.clone(),
            isbn: fields.isbn.clone(),
            publisher: fields.publisher.clone(),
            copyright_year: fields.copyright_year,
            description: fields.description.clone(),
            cover_url: fields.cover_url.clone(),
            msrp: fields.msrp.map(|m| m.to_string()),
            provenance: serde_json::to_string(&record.provenance)?,
            lookup_attempts: to_i32(record.lookup_attempts, "lookup attempts")?,
            unavailable: serde_json::to_string(&record.unavailable)?,
            updated_at: record.updated_at.to_rfc3339(),
        })
    }

    pub fn into_record(self) -> Result<VolumeRecord, StorageError> {
        let msrp = self
            .msrp
            .as_deref()
            .map(Decimal::from_str)
            .transpose()
            .map_err(|e| StorageError::SerializationError(format!("msrp: {}", e)))?;
        let provenance: BTreeMap<Field, Provenance> = serde_json::from_str(&self.provenance)?;
        let unavailable: BTreeSet<Field> = serde_json::from_str(&self.unavailable)?;

        Ok(VolumeRecord {
            series_key: SeriesKey::from_normalized(self.series_key),
            volume_number: u32::try_from(self.volume_number).map_err(|_| {
                StorageError::SerializationError(format!(
                    "negative volume number {}",
                    self.volume_number
                ))
            })?,
            fields: VolumeFields {
                title: self.title,
                isbn: self.isbn,
                publisher: self.publisher,
                copyright_year: self.copyright_year,
                description: self.description,
                cover_url: self.cover_url,
                msrp,
            },
            provenance,
            lookup_attempts: u32::try_from(self.lookup_attempts).unwrap_or_default(),
            unavailable,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

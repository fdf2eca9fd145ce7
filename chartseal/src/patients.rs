//! Patient chart operations over the encrypted store.
//!
//! Charts are linked to accounts by the hospital identifier and carry the
//! medical content fields: blood type, the structured history list, and the
//! attached narrative summary. Summary *generation* belongs to an external
//! collaborator; only the sealed storage and recovery of the text live
//! here.

use crate::codec::{FieldCodec, LegacyDisposition};
use crate::error::Error;
use crate::lookup::equality_filter;
use crate::migrate::migrate_record;
use crate::policy::{HOSPITAL_ID, PATIENTS};
use crate::store::{Document, FindOptions, Record, RecordId, RecordStore};
use serde_json::{json, Value};
use std::sync::Arc;

/// Decoded patient chart.
#[derive(Debug, Clone)]
pub struct PatientChart {
    /// Store-assigned identifier.
    pub id: RecordId,
    /// Hospital identifier, normalized.
    pub hospital_id: String,
    /// Blood type, when recorded.
    pub blood_type: Option<String>,
    /// Structured history entries; empty when unrecoverable.
    pub medical_history: Vec<Value>,
    /// Attached narrative summary, when present.
    pub ai_summary: Option<String>,
}

/// Partial chart update; absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ChartUpdate {
    /// New blood type.
    pub blood_type: Option<String>,
    /// Replacement history list.
    pub medical_history: Option<Vec<Value>>,
}

/// Chart lookup and maintenance operations.
pub struct PatientDirectory {
    store: Arc<dyn RecordStore>,
    codec: FieldCodec,
}

impl PatientDirectory {
    /// Creates a directory over a store and codec.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, codec: FieldCodec) -> Self {
        Self { store, codec }
    }

    /// Finds a chart by hospital identifier, matching any storage
    /// generation. A successful match is opportunistically migrated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] for backend failures.
    pub async fn find(&self, hospital_id: &str) -> Result<Option<PatientChart>, Error> {
        let Some(record) = self.find_record(hospital_id).await? else {
            return Ok(None);
        };
        migrate_record(&self.codec, &PATIENTS, self.store.as_ref(), &record).await;
        Ok(self.project(&record))
    }

    /// Lists every chart, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] for backend failures.
    pub async fn roster(&self) -> Result<Vec<PatientChart>, Error> {
        let records = self
            .store
            .find_many(
                PATIENTS.collection,
                None,
                FindOptions { limit: None, newest_first: true },
            )
            .await?;
        Ok(records.iter().filter_map(|record| self.project(record)).collect())
    }

    /// Applies a partial update to a chart, sealing the new values.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no chart matches, [`Error::Store`] for
    /// backend failures.
    pub async fn update_chart(
        &self,
        hospital_id: &str,
        update: ChartUpdate,
    ) -> Result<PatientChart, Error> {
        let record = self.find_record(hospital_id).await?.ok_or(Error::NotFound)?;

        let mut plain = Document::new();
        if let Some(blood_type) = update.blood_type {
            plain.insert("bloodType".to_string(), json!(blood_type));
        }
        if let Some(history) = update.medical_history {
            plain.insert("medicalHistory".to_string(), Value::Array(history));
        }
        if !plain.is_empty() {
            let changes = self.codec.encode_changes(&PATIENTS, &plain);
            self.store.update(PATIENTS.collection, &record.id, changes).await?;
        }

        let refreshed =
            self.find_record(hospital_id).await?.ok_or(Error::NotFound)?;
        self.project(&refreshed).ok_or(Error::NotFound)
    }

    /// Attaches (or replaces) the narrative summary on a chart.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no chart matches, [`Error::Store`] for
    /// backend failures.
    pub async fn attach_summary(&self, hospital_id: &str, summary: &str) -> Result<(), Error> {
        let record = self.find_record(hospital_id).await?.ok_or(Error::NotFound)?;
        let mut plain = Document::new();
        plain.insert("aiSummary".to_string(), json!(summary));
        let changes = self.codec.encode_changes(&PATIENTS, &plain);
        self.store.update(PATIENTS.collection, &record.id, changes).await?;
        Ok(())
    }

    /// Removes a chart.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no chart matches, [`Error::Store`] for
    /// backend failures.
    pub async fn remove(&self, hospital_id: &str) -> Result<(), Error> {
        let record = self.find_record(hospital_id).await?.ok_or(Error::NotFound)?;
        let deleted = self.store.delete(PATIENTS.collection, &record.id).await?;
        if deleted {
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }

    async fn find_record(&self, hospital_id: &str) -> Result<Option<Record>, Error> {
        let normalized = HOSPITAL_ID.normalize.apply(hospital_id);
        if normalized.is_empty() {
            return Ok(None);
        }
        let filter = equality_filter(&HOSPITAL_ID, &normalized)?;
        Ok(self.store.find_one(PATIENTS.collection, &filter).await?)
    }

    fn project(&self, record: &Record) -> Option<PatientChart> {
        let plain = self.codec.decode(&PATIENTS, &record.document);
        let hospital_id = plain.get("HospitalID")?.as_str()?.to_string();
        let medical_history = plain
            .get("medicalHistory")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Some(PatientChart {
            id: record.id.clone(),
            hospital_id,
            blood_type: plain.get("bloodType").and_then(Value::as_str).map(ToString::to_string),
            medical_history,
            ai_summary: plain.get("aiSummary").and_then(Value::as_str).map(ToString::to_string),
        })
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{PipelineError, Result};

pub const SCHEMA_VERSION: &str = "4.0";

/// Axis-aligned box: top-left (`x1`, `y1`) to bottom-right (`x2`, `y2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl From<(i32, i32, i32, i32)> for BoundingBox {
    fn from((x1, y1, x2, y2): (i32, i32, i32, i32)) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

/// One frame of detections in the minimal metadata schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub version: String,
    pub id: u64,
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    #[serde(rename = "sensorId")]
    pub sensor_id: String,
    /// `"id|x1|y1|x2|y2|label"` per object.
    pub objects: Vec<String>,
}

/// Builds detection records, numbering frames and objects as it goes.
#[derive(Debug, Clone)]
pub struct SchemaGenerator {
    sensor_id: String,
    frame_counter: u64,
    id_counter: u64,
}

impl Default for SchemaGenerator {
    fn default() -> Self {
        Self::new("1")
    }
}

impl SchemaGenerator {
    pub fn new(sensor_id: impl Into<String>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            frame_counter: 0,
            id_counter: 0,
        }
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    /// Serialized record for the current time with auto-assigned object ids.
    pub fn generate<S: AsRef<str>>(&mut self, objects: &[S], bboxes: &[BoundingBox]) -> Result<String> {
        let record = self.record(objects, bboxes, None, Utc::now())?;
        Ok(serde_json::to_string(&record)?)
    }

    /// Like [`generate`](Self::generate) with caller-supplied object ids (e.g. tracker ids).
    pub fn generate_with_ids<S: AsRef<str>>(
        &mut self,
        objects: &[S],
        bboxes: &[BoundingBox],
        object_ids: &[u64],
    ) -> Result<String> {
        let record = self.record(objects, bboxes, Some(object_ids), Utc::now())?;
        Ok(serde_json::to_string(&record)?)
    }

    pub fn record<S: AsRef<str>>(
        &mut self,
        objects: &[S],
        bboxes: &[BoundingBox],
        object_ids: Option<&[u64]>,
        timestamp: DateTime<Utc>,
    ) -> Result<FrameRecord> {
        if objects.len() != bboxes.len() {
            return Err(PipelineError::SchemaMismatch {
                objects: objects.len(),
                bboxes: bboxes.len(),
            });
        }
        if let Some(ids) = object_ids {
            if ids.len() != objects.len() {
                return Err(PipelineError::General(format!(
                    "{} object ids supplied for {} objects",
                    ids.len(),
                    objects.len()
                )));
            }
        }

        let frame_id = self.frame_counter;
        self.frame_counter += 1;

        let objects = objects
            .iter()
            .zip(bboxes)
            .enumerate()
            .map(|(i, (label, bbox))| {
                let object_id = match object_ids {
                    Some(ids) => ids[i],
                    None => {
                        let id = self.id_counter;
                        self.id_counter += 1;
                        id
                    }
                };
                format!(
                    "{}|{}|{}|{}|{}|{}",
                    object_id,
                    bbox.x1,
                    bbox.y1,
                    bbox.x2,
                    bbox.y2,
                    label.as_ref()
                )
            })
            .collect();

        Ok(FrameRecord {
            version: SCHEMA_VERSION.to_string(),
            id: frame_id,
            timestamp: format_timestamp(timestamp),
            sensor_id: self.sensor_id.clone(),
            objects,
        })
    }
}

/// ISO-8601 UTC with millisecond precision and a trailing `Z`.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::tree;
use crate::{Error, Result};

/// Root element the trigger wraps every payload in.
pub const ROOT_TAG: &str = "row";
/// Section holding the deleted (prior) images.
pub const OLD_VALUES: &str = "OldValues";
/// Section holding the inserted (new) images.
pub const NEW_VALUES: &str = "NewValues";

/// A column name to value map for one row image.
pub type RowImage = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

/// The change carried by one broker message, i.e. one trigger firing.
///
/// Each section holds one image per affected row, in the order the server
/// wrote them. A statement touching several rows yields several images per
/// section. The two sections are written independently, so the n-th old image
/// and the n-th new image need not describe the same row; match them on a key
/// column if the caller needs row-level pairs.
///
/// Column values are kept as the decoder produced them (text for every
/// non-NULL column; NULL columns are absent). Use [`crate::mapper`] to project
/// an image onto a typed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "OldValues", default, skip_serializing_if = "Vec::is_empty")]
    pub old_values: Vec<RowImage>,
    #[serde(rename = "NewValues", default, skip_serializing_if = "Vec::is_empty")]
    pub new_values: Vec<RowImage>,
    pub received_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// Insert when only new images are present, delete when only old ones
    /// are, update when both are. `None` for a statement that touched no rows.
    pub fn operation(&self) -> Option<ChangeOperation> {
        match (self.old_values.is_empty(), self.new_values.is_empty()) {
            (true, false) => Some(ChangeOperation::Insert),
            (false, false) => Some(ChangeOperation::Update),
            (false, true) => Some(ChangeOperation::Delete),
            (true, true) => None,
        }
    }

    /// Rows affected by the statement.
    pub fn row_count(&self) -> usize {
        self.old_values.len().max(self.new_values.len())
    }

    /// The old image when exactly one row was affected.
    pub fn old_row(&self) -> Option<&RowImage> {
        single(&self.old_values)
    }

    /// The new image when exactly one row was affected.
    pub fn new_row(&self) -> Option<&RowImage> {
        single(&self.new_values)
    }
}

fn single(images: &[RowImage]) -> Option<&RowImage> {
    match images {
        [image] => Some(image),
        _ => None,
    }
}

/// Transcode a change payload into its JSON-like shape,
/// `{"row": {"OldValues": …, "NewValues": …}}`.
pub fn transcode(body: &str) -> Result<Value> {
    Ok(tree::decode(body)?.to_document_value())
}

/// Decode a change payload into the record for its message.
///
/// `<row/>`, sent for a statement that touched no rows, decodes to a record
/// with both sections empty.
pub fn decode_change(body: &str) -> Result<ChangeRecord> {
    let document = transcode(body)?;

    let row = match document.get(ROOT_TAG) {
        Some(row) => row,
        None => {
            let found = document
                .as_object()
                .and_then(|map| map.keys().next().cloned())
                .unwrap_or_default();
            return Err(Error::InvalidMessage {
                message: format!("expected <{}> root, found <{}>", ROOT_TAG, found),
            });
        }
    };

    Ok(ChangeRecord {
        old_values: section_images(row, OLD_VALUES)?,
        new_values: section_images(row, NEW_VALUES)?,
        received_at: Utc::now(),
    })
}

fn section_images(row: &Value, section: &str) -> Result<Vec<RowImage>> {
    match row.get(section) {
        None => Ok(Vec::new()),
        Some(Value::Array(images)) => images
            .iter()
            .map(|image| columns(image, section))
            .collect(),
        Some(image) => Ok(vec![columns(image, section)?]),
    }
}

fn columns(image: &Value, section: &str) -> Result<RowImage> {
    match image {
        Value::Object(map) => Ok(map.clone()),
        // Every column NULL: FOR XML emits an empty element.
        Value::String(text) if text.is_empty() => Ok(Map::new()),
        _ => Err(Error::InvalidMessage {
            message: format!("<{}> holds text instead of columns", section),
        }),
    }
}

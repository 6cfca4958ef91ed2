//! Index document parsing.

use serde_json::Value;

use super::error::ParseError;
use super::json::{
    as_object, field_path, optional_array, optional_str, parse_document, required_object,
    required_str, required_string_array,
};

/// Datatype of index entries that describe image ids.
pub const IMAGE_IDS_DATATYPE: &str = "image-ids";

/// Format expected at the top of an index document.
pub const INDEX_FORMAT: &str = "index:1.0";

/// Region and endpoint served by an index entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloudEndpoint {
    /// Region name.
    pub region: String,
    /// Endpoint URL for the region.
    pub endpoint: String,
}

/// One entry of an index document.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexEntry {
    /// Content id naming the referenced products document.
    pub id: String,
    /// Kind of data described; image catalogs use `image-ids`.
    pub datatype: String,
    /// Format of the referenced document.
    pub format: String,
    /// Cloud the entry was published for.
    pub cloud_name: Option<String>,
    /// Time of last update, as published.
    pub updated: Option<String>,
    /// Path of the products document, relative to the store root.
    pub path: String,
    /// Product keys listed by the entry.
    pub products: Vec<String>,
    /// Regions the entry serves. Empty means every region.
    pub clouds: Vec<CloudEndpoint>,
}

impl IndexEntry {
    /// Returns `true` when the entry serves `region`.
    #[must_use]
    pub fn serves_region(&self, region: &str) -> bool {
        self.clouds.is_empty() || self.clouds.iter().any(|cloud| cloud.region == region)
    }
}

/// Parsed index document.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexDocument {
    /// Declared document format.
    pub format: String,
    /// Time of last update, as published.
    pub updated: Option<String>,
    /// Entries, ordered by id.
    pub entries: Vec<IndexEntry>,
}

/// Parses an index document.
///
/// Unknown fields are ignored.
///
/// # Errors
///
/// Returns [`ParseError`] naming the first missing or mistyped field.
pub fn parse_index(bytes: &[u8]) -> Result<IndexDocument, ParseError> {
    let document = parse_document(bytes)?;
    let root = as_object(&document, "")?;
    let format = required_str(root, "format", "")?;
    let updated = optional_str(root, "updated", "")?;
    let index = required_object(root, "index", "")?;

    let entries = index
        .iter()
        .map(|(id, value)| parse_entry(id, value))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(IndexDocument {
        format,
        updated,
        entries,
    })
}

fn parse_entry(id: &str, value: &Value) -> Result<IndexEntry, ParseError> {
    let path = field_path("index", id);
    let entry = as_object(value, &path)?;
    let clouds = optional_array(entry, "clouds", &path)?
        .iter()
        .enumerate()
        .map(|(position, cloud_value)| {
            let cloud_path = format!("{path}.clouds[{position}]");
            let cloud = as_object(cloud_value, &cloud_path)?;
            Ok(CloudEndpoint {
                region: required_str(cloud, "region", &cloud_path)?,
                endpoint: required_str(cloud, "endpoint", &cloud_path)?,
            })
        })
        .collect::<Result<Vec<_>, ParseError>>()?;

    Ok(IndexEntry {
        id: id.to_owned(),
        datatype: required_str(entry, "datatype", &path)?,
        format: required_str(entry, "format", &path)?,
        cloud_name: optional_str(entry, "cloudname", &path)?,
        updated: optional_str(entry, "updated", &path)?,
        path: required_str(entry, "path", &path)?,
        products: required_string_array(entry, "products", &path)?,
        clouds,
    })
}

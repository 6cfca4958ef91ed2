//! Products document parsing.

use std::collections::BTreeMap;

use serde_json::Value;

use super::error::{ParseError, ParseProblem};
use super::json::{
    Object, as_object, field_path, optional_str, parse_document, required_object, required_str,
};
use super::{Catalog, ImageMetadataRecord, ProductEntry, VersionEntry};

/// Format expected at the top of a products document.
pub const PRODUCTS_FORMAT: &str = "products:1.0";

/// Parses a products document into a [`Catalog`].
///
/// Unknown fields are ignored. Product keys must have the form
/// `<namespace>:server:<version>:<arch>` and agree with the product's
/// `arch` field.
///
/// # Errors
///
/// Returns [`ParseError`] naming the first missing, mistyped or
/// inconsistent field.
pub fn parse_products(bytes: &[u8]) -> Result<Catalog, ParseError> {
    let document = parse_document(bytes)?;
    let root = as_object(&document, "")?;
    let content_id = optional_str(root, "content_id", "")?.unwrap_or_default();
    let format = optional_str(root, "format", "")?;
    let products = required_object(root, "products", "")?
        .iter()
        .map(|(key, value)| parse_product(key, value).map(|product| (key.clone(), product)))
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(Catalog {
        content_id,
        format,
        products,
    })
}

fn product_key_arch(key: &str, path: &str) -> Result<String, ParseError> {
    let mut parts = key.rsplitn(4, ':');
    let arch = parts.next().unwrap_or_default();
    let version = parts.next().unwrap_or_default();
    let stream = parts.next().unwrap_or_default();
    let namespace = parts.next().unwrap_or_default();
    if stream != "server" || namespace.is_empty() || version.is_empty() || arch.is_empty() {
        return Err(ParseError::new(
            path,
            ParseProblem::Invalid(format!(
                "product key '{key}' is not of the form <namespace>:server:<version>:<arch>"
            )),
        ));
    }
    Ok(arch.to_owned())
}

fn parse_product(key: &str, value: &Value) -> Result<ProductEntry, ParseError> {
    let path = field_path("products", key);
    let key_arch = product_key_arch(key, &path)?;
    let product = as_object(value, &path)?;
    let release = required_str(product, "release", &path)?;
    let version = required_str(product, "version", &path)?;
    let arch = required_str(product, "arch", &path)?;
    if arch != key_arch {
        return Err(ParseError::new(
            field_path(&path, "arch"),
            ParseProblem::Invalid(format!(
                "architecture '{arch}' disagrees with product key architecture '{key_arch}'"
            )),
        ));
    }

    let versions_path = field_path(&path, "versions");
    let versions = required_object(product, "versions", &path)?
        .iter()
        .map(|(date, entry)| {
            let header = RecordHeader {
                release: &release,
                version: &version,
                arch: &arch,
                date,
            };
            parse_version(&header, entry, &field_path(&versions_path, date))
                .map(|parsed| (date.clone(), parsed))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(ProductEntry {
        release,
        version,
        arch,
        versions,
    })
}

struct RecordHeader<'a> {
    release: &'a str,
    version: &'a str,
    arch: &'a str,
    date: &'a str,
}

fn parse_version(
    header: &RecordHeader<'_>,
    value: &Value,
    path: &str,
) -> Result<VersionEntry, ParseError> {
    let entry = as_object(value, path)?;
    let pubname = optional_str(entry, "pubname", path)?;
    let label = optional_str(entry, "label", path)?;
    let items_path = field_path(path, "items");
    let items = required_object(entry, "items", path)?
        .iter()
        .map(|(item_id, item_value)| {
            let item_path = field_path(&items_path, item_id);
            let item = as_object(item_value, &item_path)?;
            parse_item(header, item_id, item, &item_path, pubname.as_deref(), label.as_deref())
                .map(|record| (item_id.clone(), record))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(VersionEntry {
        pubname,
        label,
        items,
    })
}

fn parse_item(
    header: &RecordHeader<'_>,
    item_id: &str,
    item: &Object,
    path: &str,
    pubname: Option<&str>,
    label: Option<&str>,
) -> Result<ImageMetadataRecord, ParseError> {
    Ok(ImageMetadataRecord {
        id: required_str(item, "id", path)?,
        item_id: item_id.to_owned(),
        region: required_str(item, "region", path)?,
        endpoint: optional_str(item, "endpoint", path)?,
        root_store: optional_str(item, "root_store", path)?,
        virt_type: optional_str(item, "virt", path)?,
        release: header.release.to_owned(),
        version: header.version.to_owned(),
        architecture: header.arch.to_owned(),
        date: header.date.to_owned(),
        pubname: pubname.map(str::to_owned),
        label: label.map(str::to_owned),
    })
}

//! Image catalog documents: index and products parsing, and region-scoped
//! loading from a [`CatalogStore`].
//!
//! An index names the products documents a publisher offers. Each products
//! document maps product keys (`<namespace>:server:<version>:<arch>`) to
//! dated versions, and each version lists one image per region.

use std::collections::BTreeMap;

use tracing::debug;

use crate::storage::CatalogStore;

mod error;
mod index;
mod json;
mod products;

pub use error::{CatalogError, ParseError, ParseProblem};
pub use index::{
    CloudEndpoint, IMAGE_IDS_DATATYPE, INDEX_FORMAT, IndexDocument, IndexEntry, parse_index,
};
pub use products::{PRODUCTS_FORMAT, parse_products};

/// One bootable image as published in a products document.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageMetadataRecord {
    /// Provider image identifier.
    pub id: String,
    /// Key of the item within its version.
    pub item_id: String,
    /// Release codename, e.g. `trusty`.
    pub release: String,
    /// Release version, e.g. `14.04`.
    pub version: String,
    /// Publication date of the version (`YYYYMMDD`).
    pub date: String,
    /// Architecture, e.g. `amd64`.
    pub architecture: String,
    /// Region the image lives in.
    pub region: String,
    /// Endpoint the image is served from, when published.
    pub endpoint: Option<String>,
    /// Root storage type, e.g. `ebs`.
    pub root_store: Option<String>,
    /// Virtualisation type, e.g. `pv` or `hvm`.
    pub virt_type: Option<String>,
    /// Publication name of the version.
    pub pubname: Option<String>,
    /// Label of the version, e.g. `release`.
    pub label: Option<String>,
}

/// Dated version of a product.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VersionEntry {
    /// Publication name.
    pub pubname: Option<String>,
    /// Publication label.
    pub label: Option<String>,
    /// Images keyed by item id.
    pub items: BTreeMap<String, ImageMetadataRecord>,
}

/// One product: a release on one architecture.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProductEntry {
    /// Release codename.
    pub release: String,
    /// Release version.
    pub version: String,
    /// Architecture.
    pub arch: String,
    /// Versions keyed by date.
    pub versions: BTreeMap<String, VersionEntry>,
}

/// Parsed products document.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Catalog {
    /// Content id of the document.
    pub content_id: String,
    /// Declared document format.
    pub format: Option<String>,
    /// Products keyed by product key.
    pub products: BTreeMap<String, ProductEntry>,
}

impl Catalog {
    /// Iterates over every image record in the catalog.
    pub fn records(&self) -> impl Iterator<Item = &ImageMetadataRecord> {
        self.products
            .values()
            .flat_map(|product| product.versions.values())
            .flat_map(|version| version.items.values())
    }

    /// Returns `true` when the catalog holds no products.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Loads the image catalog serving `region`.
///
/// Reads the index at `index_path`, picks the first `image-ids` entry whose
/// clouds include `region` (entries without clouds serve every region),
/// then reads and parses the products document it names.
///
/// # Errors
///
/// Returns [`CatalogError::Store`] when a document cannot be read,
/// [`CatalogError::Parse`] when one is malformed,
/// [`CatalogError::UnsupportedFormat`] for unknown document formats, and
/// [`CatalogError::NoIndexEntry`] when nothing serves the region.
pub fn load_catalog(
    store: &dyn CatalogStore,
    index_path: &str,
    region: &str,
) -> Result<Catalog, CatalogError> {
    let index_bytes = store.get(index_path)?;
    let index = parse_index(&index_bytes).map_err(|source| CatalogError::Parse {
        path: index_path.to_owned(),
        source,
    })?;
    if index.format != INDEX_FORMAT {
        return Err(CatalogError::UnsupportedFormat {
            path: index_path.to_owned(),
            format: index.format,
        });
    }

    let entry = index
        .entries
        .iter()
        .find(|entry| entry.datatype == IMAGE_IDS_DATATYPE && entry.serves_region(region))
        .ok_or_else(|| CatalogError::NoIndexEntry {
            region: region.to_owned(),
        })?;
    if entry.format != PRODUCTS_FORMAT {
        return Err(CatalogError::UnsupportedFormat {
            path: entry.path.clone(),
            format: entry.format.clone(),
        });
    }
    debug!(index = index_path, entry = %entry.id, products = %entry.path, region, "loading catalog");

    let products_bytes = store.get(&entry.path)?;
    parse_products(&products_bytes).map_err(|source| CatalogError::Parse {
        path: entry.path.clone(),
        source,
    })
}

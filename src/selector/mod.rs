//! Resolution of placement constraints into a concrete image and instance
//! type.
//!
//! Selection is a pure function of its inputs: the same constraint, catalog
//! and instance type table always produce the same [`InstanceSpec`].

use thiserror::Error;
use tracing::debug;

use crate::catalog::{Catalog, ImageMetadataRecord, ProductEntry};

mod constraint;
mod instance_types;
mod series;

pub use constraint::{InstanceConstraint, InstanceConstraintBuilder, ResourceConstraints};
pub use instance_types::{DEFAULT_MIN_MEM_MIB, InstanceType, matching_instance_types};
pub use series::SeriesTable;

/// Errors raised by instance spec selection.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SelectError {
    /// Raised when no catalog image matches series, architecture and
    /// region.
    #[error("no {series} images in region {region} for architectures {architectures}")]
    NoMatchingImages {
        /// Requested series.
        series: String,
        /// Requested region.
        region: String,
        /// Requested architectures, comma separated.
        architectures: String,
    },
    /// Raised when images match but no instance type can run any of them.
    ///
    /// Older candidate images are tried in preference order before this is
    /// returned, so the chosen image is not always the newest match.
    #[error("no instance type satisfies the constraint for {images} matching image(s)")]
    NoMatchingInstanceType {
        /// Number of candidate images that were tried.
        images: usize,
    },
    /// Raised when a constraint is malformed.
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),
}

impl SelectError {
    pub(crate) fn invalid(reason: &str) -> Self {
        Self::InvalidConstraint(reason.to_owned())
    }
}

/// Image and instance type chosen for a placement request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSpec {
    /// Provider image id to boot.
    pub image_id: String,
    /// Instance type name to launch.
    pub instance_type: String,
    /// Architecture of the image.
    pub architecture: String,
    /// Catalog record the image came from.
    pub image: ImageMetadataRecord,
    /// Instance type the spec was built from.
    pub instance_type_details: InstanceType,
}

/// Chooses images and instance types for placement constraints.
#[derive(Clone, Debug, Default)]
pub struct InstanceSpecSelector {
    series: SeriesTable,
}

impl InstanceSpecSelector {
    /// Creates a selector that maps series through `series`.
    #[must_use]
    pub const fn new(series: SeriesTable) -> Self {
        Self { series }
    }

    /// Picks the most recent matching image and the cheapest instance type
    /// able to run it.
    ///
    /// Candidate images are ordered by publication date (newest first),
    /// then item id, then architecture. When no instance type fits the
    /// first candidate the next one is tried.
    ///
    /// # Errors
    ///
    /// Returns [`SelectError::NoMatchingImages`] when no image matches, or
    /// [`SelectError::NoMatchingInstanceType`] when images match but no
    /// instance type does.
    pub fn select(
        &self,
        constraint: &InstanceConstraint,
        catalog: &Catalog,
        instance_types: &[InstanceType],
    ) -> Result<InstanceSpec, SelectError> {
        let candidates = self.candidate_images(constraint, catalog);
        if candidates.is_empty() {
            return Err(SelectError::NoMatchingImages {
                series: constraint.series().to_owned(),
                region: constraint.region().to_owned(),
                architectures: constraint
                    .architectures()
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(","),
            });
        }

        for image in &candidates {
            let types = matching_instance_types(
                instance_types,
                &image.architecture,
                image.virt_type.as_deref(),
                constraint.resources(),
            );
            let Some(chosen) = types.first() else {
                debug!(image = %image.id, date = %image.date, "no instance type fits image");
                continue;
            };
            debug!(
                image = %image.id,
                date = %image.date,
                arch = %image.architecture,
                instance_type = %chosen.name,
                "selected instance spec"
            );
            return Ok(InstanceSpec {
                image_id: image.id.clone(),
                instance_type: chosen.name.clone(),
                architecture: image.architecture.clone(),
                image: (*image).clone(),
                instance_type_details: (*chosen).clone(),
            });
        }

        Err(SelectError::NoMatchingInstanceType {
            images: candidates.len(),
        })
    }

    /// Images matching the constraint's series, architectures and region,
    /// in preference order.
    #[must_use]
    pub fn candidate_images<'a>(
        &self,
        constraint: &InstanceConstraint,
        catalog: &'a Catalog,
    ) -> Vec<&'a ImageMetadataRecord> {
        let mut candidates: Vec<&ImageMetadataRecord> = catalog
            .products
            .values()
            .filter(|product| self.product_matches(constraint, product))
            .flat_map(|product| product.versions.values())
            .flat_map(|version| version.items.values())
            .filter(|record| record.region == constraint.region())
            .collect();

        candidates.sort_by(|left, right| {
            right
                .date
                .cmp(&left.date)
                .then_with(|| left.item_id.cmp(&right.item_id))
                .then_with(|| left.architecture.cmp(&right.architecture))
        });
        candidates
    }

    fn product_matches(&self, constraint: &InstanceConstraint, product: &ProductEntry) -> bool {
        if !constraint.architectures().contains(&product.arch) {
            return false;
        }
        match self.series.version(constraint.series()) {
            Some(version) => product.version == version,
            None => product.release == constraint.series(),
        }
    }
}

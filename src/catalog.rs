//! Read-only listings catalog, grouped by location.
//!
//! The catalog is loaded once at start-up and shared by every search. Sites
//! keep the order in which their location first appears in the source file.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::{Listing, ValidationError};
use crate::types::{CellSize, Footprint};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read listings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("listings are not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    InvalidListing(#[from] ValidationError),
    #[error("duplicate listing id '{0}'")]
    DuplicateListing(String),
}

/// All listings of one location, in catalog order.
#[derive(Clone, Debug)]
pub struct SiteGroup {
    location_id: String,
    listings: Vec<Listing>,
}

impl SiteGroup {
    pub fn location_id(&self) -> &str {
        &self.location_id
    }

    pub fn listings(&self) -> &[Listing] {
        &self.listings
    }

    /// Total usable area of all listings in cells.
    pub fn capacity_cells(&self, cell: CellSize) -> u64 {
        self.listings.iter().map(|l| l.area_cells(cell)).sum()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    sites: Vec<SiteGroup>,
}

impl Catalog {
    /// Validates the listings and groups them by location.
    pub fn from_listings(listings: Vec<Listing>) -> Result<Self, CatalogError> {
        let mut seen_ids = HashSet::with_capacity(listings.len());
        let mut site_index: HashMap<String, usize> = HashMap::new();
        let mut sites: Vec<SiteGroup> = Vec::new();

        for listing in listings {
            listing.validate()?;
            if !seen_ids.insert(listing.id.clone()) {
                return Err(CatalogError::DuplicateListing(listing.id));
            }

            match site_index.get(&listing.location_id) {
                Some(&idx) => sites[idx].listings.push(listing),
                None => {
                    site_index.insert(listing.location_id.clone(), sites.len());
                    sites.push(SiteGroup {
                        location_id: listing.location_id.clone(),
                        listings: vec![listing],
                    });
                }
            }
        }

        Ok(Self { sites })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let listings: Vec<Listing> = serde_json::from_str(raw)?;
        Self::from_listings(listings)
    }

    /// Reads and parses a listings file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn sites(&self) -> &[SiteGroup] {
        &self.sites
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    pub fn listing_count(&self) -> usize {
        self.sites.iter().map(|s| s.listings.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"[
        {"id": "a", "location_id": "north", "length": 20, "width": 10, "price_in_cents": 500},
        {"id": "b", "location_id": "south", "length": 30, "width": 10, "price_in_cents": 900},
        {"id": "c", "location_id": "north", "length": 10, "width": 10, "price_in_cents": 300}
    ]"#;

    #[test]
    fn groups_by_location_in_first_seen_order() {
        let catalog = Catalog::from_json_str(SAMPLE).expect("valid catalog");
        assert_eq!(catalog.site_count(), 2);
        assert_eq!(catalog.listing_count(), 3);

        let north = &catalog.sites()[0];
        assert_eq!(north.location_id(), "north");
        let ids: Vec<_> = north.listings().iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert_eq!(north.capacity_cells(CellSize::default()), 3);

        assert_eq!(catalog.sites()[1].location_id(), "south");
    }

    #[test]
    fn rejects_duplicate_ids() {
        let raw = r#"[
            {"id": "a", "location_id": "x", "length": 20, "width": 10, "price_in_cents": 1},
            {"id": "a", "location_id": "y", "length": 20, "width": 10, "price_in_cents": 1}
        ]"#;
        assert!(matches!(
            Catalog::from_json_str(raw),
            Err(CatalogError::DuplicateListing(id)) if id == "a"
        ));
    }

    #[test]
    fn rejects_invalid_dimensions() {
        let raw = r#"[{"id": "a", "location_id": "x", "length": 0, "width": 10, "price_in_cents": 1}]"#;
        assert!(matches!(
            Catalog::from_json_str(raw),
            Err(CatalogError::InvalidListing(_))
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            Catalog::from_json_str("{not json"),
            Err(CatalogError::Parse(_))
        ));
        assert!(matches!(
            Catalog::from_json_str(r#"[{"id": "a"}]"#),
            Err(CatalogError::Parse(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(SAMPLE.as_bytes()).expect("write sample");

        let catalog = Catalog::load(file.path()).expect("load catalog");
        assert_eq!(catalog.listing_count(), 3);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = Catalog::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
        assert!(err.to_string().contains("missing.json"));
    }
}

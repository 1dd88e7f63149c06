//! Data models for the vehicle storage search.
//!
//! This module defines the fundamental data structures:
//! - `VehicleRequestItem`: one `{length, quantity}` pair of a search request
//! - `VehicleSet`: the validated, expanded multiset of vehicle lengths
//! - `Listing`: a rentable storage space at a location
//! - `Offer`: the cheapest feasible set of listings found for one location

use serde::{Deserialize, Deserializer, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::{CellSize, Footprint, validation};

/// Rejection of a search request before any search is attempted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("No vehicles requested.")]
    NoVehicles,
    #[error("Total quantity must be <= {max}.")]
    TooManyVehicles { total: u64, max: u32 },
    #[error("Invalid vehicle at position {index}: {reason}")]
    InvalidVehicle { index: usize, reason: String },
}

/// Invalid listing record in the catalog.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid dimension for listing {id}: {reason}")]
    InvalidDimension { id: String, reason: String },
}

/// One line of a search request.
///
/// # Fields
/// * `length` - Vehicle length in feet
/// * `quantity` - Number of vehicles with this length
#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[schema(example = json!({ "length": 20, "quantity": 2 }))]
pub struct VehicleRequestItem {
    pub length: u32,
    pub quantity: u32,
}

/// Validated multiset of vehicle lengths, sorted longest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VehicleSet {
    lengths: Vec<u32>,
}

impl VehicleSet {
    /// Validates a request and expands it into individual vehicles.
    ///
    /// The total quantity must lie in `1..=max_total`; every line with a
    /// positive quantity needs a positive length.
    ///
    /// # Examples
    /// ```
    /// use vehicle_search::model::{VehicleRequestItem, VehicleSet};
    ///
    /// let items = [
    ///     VehicleRequestItem { length: 20, quantity: 1 },
    ///     VehicleRequestItem { length: 30, quantity: 2 },
    /// ];
    /// let vehicles = VehicleSet::from_requests(&items, 5).unwrap();
    /// assert_eq!(vehicles.lengths(), &[30, 30, 20]);
    ///
    /// assert!(VehicleSet::from_requests(&[], 5).is_err());
    /// ```
    pub fn from_requests(items: &[VehicleRequestItem], max_total: u32) -> Result<Self, RequestError> {
        let total: u64 = items.iter().map(|item| u64::from(item.quantity)).sum();
        if total == 0 {
            return Err(RequestError::NoVehicles);
        }
        if total > u64::from(max_total) {
            return Err(RequestError::TooManyVehicles {
                total,
                max: max_total,
            });
        }

        for (index, item) in items.iter().enumerate() {
            if item.quantity == 0 {
                continue;
            }
            validation::validate_length(item.length, "Vehicle length")
                .map_err(|reason| RequestError::InvalidVehicle { index, reason })?;
        }

        Ok(Self::from_lengths(items.iter().flat_map(|item| {
            std::iter::repeat_n(item.length, item.quantity as usize)
        })))
    }

    /// Builds a set from already validated lengths. Does not enforce any cap.
    pub fn from_lengths(lengths: impl IntoIterator<Item = u32>) -> Self {
        let mut lengths: Vec<u32> = lengths.into_iter().collect();
        lengths.sort_unstable_by(|a, b| b.cmp(a));
        Self { lengths }
    }

    /// Vehicle lengths in feet, longest first.
    pub fn lengths(&self) -> &[u32] {
        &self.lengths
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Vehicle lengths in cells, longest first.
    pub fn cells(&self, cell: CellSize) -> Vec<u32> {
        self.lengths.iter().map(|&len| cell.cells(len)).collect()
    }
}

/// Identifier that may be stored as JSON string or number.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

/// A rentable storage space.
///
/// # Fields
/// * `id` - Unique listing identifier
/// * `location_id` - Location (site) the listing belongs to
/// * `length` - Length in feet
/// * `width` - Width in feet
/// * `price_in_cents` - Rental price
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Listing {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(deserialize_with = "id_as_string")]
    pub location_id: String,
    pub length: u32,
    pub width: u32,
    pub price_in_cents: u64,
}

impl Listing {
    /// Creates a listing after validating its dimensions.
    pub fn new(
        id: impl Into<String>,
        location_id: impl Into<String>,
        length: u32,
        width: u32,
        price_in_cents: u64,
    ) -> Result<Self, ValidationError> {
        let listing = Self {
            id: id.into(),
            location_id: location_id.into(),
            length,
            width,
            price_in_cents,
        };
        listing.validate()?;
        Ok(listing)
    }

    /// Checks that both dimensions are positive.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_length(self.length, "Length")
            .and_then(|_| validation::validate_length(self.width, "Width"))
            .map_err(|reason| ValidationError::InvalidDimension {
                id: self.id.clone(),
                reason,
            })
    }
}

impl Footprint for Listing {
    fn length(&self) -> u32 {
        self.length
    }

    fn width(&self) -> u32 {
        self.width
    }
}

/// Cheapest feasible combination of listings at one location.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[schema(example = json!({
    "location_id": "loc-1",
    "listing_ids": ["listing-7", "listing-9"],
    "total_price_in_cents": 25000
}))]
pub struct Offer {
    pub location_id: String,
    pub listing_ids: Vec<String>,
    pub total_price_in_cents: u64,
}

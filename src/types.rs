//! Common types for the discretized storage model.
//!
//! All packing decisions are made on an integer grid. Real-world lengths
//! (vehicles, listing length and width) are converted into cells of a fixed
//! size; any remainder is discarded.

use std::num::NonZeroU32;

/// Default edge length of one cell in feet.
pub const DEFAULT_CELL_SIZE_FEET: u32 = 10;

/// Fixed discretization unit used to convert lengths into cell counts.
///
/// # Examples
/// ```
/// use vehicle_search::types::CellSize;
///
/// let cell = CellSize::default();
/// assert_eq!(cell.cells(20), 2);
/// assert_eq!(cell.cells(29), 2);
/// assert_eq!(cell.cells(9), 0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellSize(NonZeroU32);

impl CellSize {
    /// Creates a cell size; returns `None` for zero.
    #[inline]
    pub const fn new(feet: u32) -> Option<Self> {
        match NonZeroU32::new(feet) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    /// Edge length of one cell in feet.
    #[inline]
    pub const fn feet(self) -> u32 {
        self.0.get()
    }

    /// Converts a length into whole cells (floor truncation).
    #[inline]
    pub const fn cells(self, length: u32) -> u32 {
        length / self.0.get()
    }
}

impl Default for CellSize {
    fn default() -> Self {
        match Self::new(DEFAULT_CELL_SIZE_FEET) {
            Some(cell) => cell,
            None => unreachable!(),
        }
    }
}

/// Trait for anything with a rectangular footprint (length × width).
pub trait Footprint {
    /// Length in feet.
    fn length(&self) -> u32;

    /// Width in feet.
    fn width(&self) -> u32;

    /// Length in whole cells.
    fn length_cells(&self, cell: CellSize) -> u32 {
        cell.cells(self.length())
    }

    /// Width in whole cells.
    fn width_cells(&self, cell: CellSize) -> u32 {
        cell.cells(self.width())
    }

    /// Usable area in cells after truncating both dimensions.
    fn area_cells(&self, cell: CellSize) -> u64 {
        u64::from(self.length_cells(cell)) * u64::from(self.width_cells(cell))
    }
}

/// Validation helpers shared by the catalog and request parsing.
pub mod validation {
    /// Validates a single length or width.
    ///
    /// # Returns
    /// `Ok(())` for positive values, otherwise error text
    pub fn validate_length(value: u32, name: &str) -> Result<(), String> {
        if value == 0 {
            return Err(format!("{} must be positive, got: {}", name, value));
        }
        Ok(())
    }
}

use crate::types::{Band, BoolGrid, RasterStack};
use ndarray::{Array2, Zip};

/// Per-pixel "usable" predicate of one scene.
///
/// A pixel is usable when its alpha band is positive and, if the scene carries
/// a cloud mask, the mask is positive as well. Only bands 6 and 7 are read.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityMask {
    grid: BoolGrid,
}

impl ValidityMask {
    /// Combine alpha and cloud mask. A missing cloud mask counts as all clear.
    pub fn from_stack(stack: &RasterStack) -> Self {
        let alpha = match stack.band(Band::Alpha) {
            Some(alpha) => alpha,
            None => {
                let (rows, cols) = stack.shape();
                return Self { grid: Array2::from_elem((rows, cols), false) };
            }
        };

        let grid = match stack.band(Band::CloudMask) {
            Some(cloud) => Zip::from(&alpha)
                .and(&cloud)
                .map_collect(|&a, &c| a > 0.0 && c > 0.0),
            None => alpha.mapv(|a| a > 0.0),
        };

        Self { grid }
    }

    /// Sensor validity only, ignoring any cloud mask
    pub fn alpha_only(stack: &RasterStack) -> Self {
        let grid = match stack.band(Band::Alpha) {
            Some(alpha) => alpha.mapv(|a| a > 0.0),
            None => {
                let (rows, cols) = stack.shape();
                Array2::from_elem((rows, cols), false)
            }
        };
        Self { grid }
    }

    #[inline]
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.grid.get((row, col)).copied().unwrap_or(false)
    }

    pub fn valid_count(&self) -> usize {
        self.grid.iter().filter(|&&v| v).count()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.grid.dim()
    }

    pub fn grid(&self) -> &BoolGrid {
        &self.grid
    }

    pub fn into_grid(self) -> BoolGrid {
        self.grid
    }
}

/// Convenience wrapper returning the bare boolean grid
pub fn valid_of(stack: &RasterStack) -> BoolGrid {
    ValidityMask::from_stack(stack).into_grid()
}

//! Arena geometry.
//!
//! The arena is a 34-row by 18-column grid split at the frontier row.
//! Red owns the top half (rows 0..=16), Blue the bottom half. Ground
//! units cross the frontier through one of the crossing cells.
//!
//! Tower footprints are flagged cells that ground units must walk around.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::components::Team;
use crate::math::{Fixed, GridPos};

/// Default number of rows.
pub const ROWS: u32 = 34;

/// Default number of columns.
pub const COLS: u32 = 18;

/// Default frontier row. Rows at or above it belong to Red.
pub const FRONTIER_ROW: i32 = 16;

/// Default crossing cells.
pub const CROSSINGS: [(i32, i32); 2] = [(16, 3), (16, 14)];

/// A unit within this many cells of its crossing counts as arrived.
pub const CROSSING_ARRIVAL: f64 = 0.5;

/// Grid dimensions and the frontier between the halves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Number of rows.
    pub rows: u32,
    /// Number of columns.
    pub cols: u32,
    /// Last row of Red's half.
    pub frontier_row: i32,
    /// Crossing cells as `(row, col)`.
    pub crossings: Vec<(i32, i32)>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            rows: ROWS,
            cols: COLS,
            frontier_row: FRONTIER_ROW,
            crossings: CROSSINGS.to_vec(),
        }
    }
}

impl GridConfig {
    /// Whether the integer cell lies on the grid.
    #[must_use]
    pub fn contains_cell(&self, row: i32, col: i32) -> bool {
        row >= 0
            && col >= 0
            && i64::from(row) < i64::from(self.rows)
            && i64::from(col) < i64::from(self.cols)
    }

    /// Whether `team` may deploy on the cell.
    ///
    /// Red deploys on rows `0..=frontier`, Blue on `frontier+1..rows`.
    #[must_use]
    pub fn is_legal_deploy(&self, team: Team, row: i32, col: i32) -> bool {
        if !self.contains_cell(row, col) {
            return false;
        }
        match team {
            Team::Red => row <= self.frontier_row,
            Team::Blue => row > self.frontier_row,
        }
    }

    /// Which half a position is on. The frontier row itself is Red's.
    #[must_use]
    pub fn side_of(&self, pos: GridPos) -> Team {
        if pos.row <= Fixed::from_num(self.frontier_row) {
            Team::Red
        } else {
            Team::Blue
        }
    }

    /// Whether a ground unit at `pos` still has to reach a crossing.
    #[must_use]
    pub fn needs_crossing(&self, team: Team, pos: GridPos) -> bool {
        let frontier = Fixed::from_num(self.frontier_row);
        match team {
            Team::Red => pos.row < frontier,
            Team::Blue => pos.row > frontier,
        }
    }

    /// Whether a unit has made it past the frontier into enemy territory.
    #[must_use]
    pub fn has_crossed(&self, team: Team, pos: GridPos) -> bool {
        let frontier = Fixed::from_num(self.frontier_row);
        match team {
            Team::Red => pos.row > frontier,
            Team::Blue => pos.row < frontier,
        }
    }

    /// Nearest crossing cell. Ties go to the first listed.
    #[must_use]
    pub fn nearest_crossing(&self, pos: GridPos) -> Option<GridPos> {
        let mut best: Option<(GridPos, Fixed)> = None;
        for &(row, col) in &self.crossings {
            let cell = GridPos::cell(row, col);
            let distance = pos.distance_squared(cell);
            match best {
                Some((_, best_distance)) if best_distance <= distance => {}
                _ => best = Some((cell, distance)),
            }
        }
        best.map(|(cell, _)| cell)
    }

    /// Clamp a position onto the grid.
    #[must_use]
    pub fn clamp(&self, pos: GridPos) -> GridPos {
        pos.clamped(self.rows, self.cols)
    }
}

/// Inclusive rectangle of cells occupied by a tower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footprint {
    /// First row.
    pub row_min: i32,
    /// Last row.
    pub row_max: i32,
    /// First column.
    pub col_min: i32,
    /// Last column.
    pub col_max: i32,
}

impl Footprint {
    /// Square footprint extending `before` cells up/left and `after` cells
    /// down/right of the anchor cell.
    #[must_use]
    pub const fn around(row: i32, col: i32, before: i32, after: i32) -> Self {
        Self {
            row_min: row - before,
            row_max: row + after,
            col_min: col - before,
            col_max: col + after,
        }
    }

    /// Whether the cell is inside the footprint.
    #[must_use]
    pub const fn contains(&self, row: i32, col: i32) -> bool {
        row >= self.row_min && row <= self.row_max && col >= self.col_min && col <= self.col_max
    }

    /// Whether the cell containing `pos`, or one of its four neighbours,
    /// lies inside the footprint.
    #[must_use]
    pub fn touches(&self, pos: GridPos) -> bool {
        let (row, col) = pos.floor_cell();
        self.touches_cell(row, col)
    }

    /// Whether the cell or one of its four neighbours lies inside the
    /// footprint.
    #[must_use]
    pub const fn touches_cell(&self, row: i32, col: i32) -> bool {
        self.contains(row, col)
            || self.contains(row - 1, col)
            || self.contains(row + 1, col)
            || self.contains(row, col - 1)
            || self.contains(row, col + 1)
    }

    /// All cells, row-major.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        (self.row_min..=self.row_max)
            .flat_map(move |row| (self.col_min..=self.col_max).map(move |col| (row, col)))
    }
}

/// Cells ground units may not enter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlaggedCells {
    cells: HashSet<(i32, i32)>,
}

impl FlaggedCells {
    /// Flag every cell of the given footprints.
    #[must_use]
    pub fn from_footprints<'a>(footprints: impl IntoIterator<Item = &'a Footprint>) -> Self {
        let cells = footprints.into_iter().flat_map(Footprint::cells).collect();
        Self { cells }
    }

    /// Whether an integer cell is flagged.
    #[must_use]
    pub fn is_flagged(&self, row: i32, col: i32) -> bool {
        self.cells.contains(&(row, col))
    }

    /// Whether the cell containing `pos` is flagged.
    #[must_use]
    pub fn blocks(&self, pos: GridPos) -> bool {
        let (row, col) = pos.floor_cell();
        self.is_flagged(row, col)
    }

    /// Number of flagged cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether nothing is flagged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Mean position of the flagged cells in the 5x5 block around `pos`.
    #[must_use]
    pub fn centroid_near(&self, pos: GridPos) -> Option<GridPos> {
        let (row, col) = pos.floor_cell();
        let mut count = 0i32;
        let mut sum_row = 0i32;
        let mut sum_col = 0i32;
        for d_row in -2..=2 {
            for d_col in -2..=2 {
                if self.is_flagged(row + d_row, col + d_col) {
                    count += 1;
                    sum_row += row + d_row;
                    sum_col += col + d_col;
                }
            }
        }
        if count == 0 {
            return None;
        }
        let count = Fixed::from_num(count);
        Some(GridPos::new(
            Fixed::from_num(sum_row) / count,
            Fixed::from_num(sum_col) / count,
        ))
    }
}

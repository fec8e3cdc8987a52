use rayon::prelude::*;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GridError {
    #[error("need to set either --width or --columns")]
    MissingHorizontal,

    #[error("need to set either --height or --rows")]
    MissingVertical,
}

/// Grid layout as requested on the command line. `0` means "derive from the image size".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridSpec {
    pub frame_width: u32,
    pub frame_height: u32,
    pub columns: u32,
    pub rows: u32,
}

impl GridSpec {
    pub const fn validate(&self) -> Result<(), GridError> {
        if self.frame_height == 0 && self.rows == 0 {
            return Err(GridError::MissingVertical);
        }

        if self.frame_width == 0 && self.columns == 0 {
            return Err(GridError::MissingHorizontal);
        }

        Ok(())
    }

    /// Resolve the missing half of each width/columns and height/rows pair
    /// against the dimensions of the source image.
    pub fn resolve(&self, (width, height): (u32, u32)) -> Result<Grid, GridError> {
        self.validate()?;

        if self.frame_width != 0 && self.columns != 0 {
            debug!("both frame width and column count given, using them as is");
        }

        if self.frame_height != 0 && self.rows != 0 {
            debug!("both frame height and row count given, using them as is");
        }

        // validate() guarantees the divisors below are nonzero
        Ok(Grid {
            frame_width: derive(self.frame_width, width, self.columns),
            frame_height: derive(self.frame_height, height, self.rows),
            columns: derive(self.columns, width, self.frame_width),
            rows: derive(self.rows, height, self.frame_height),
        })
    }
}

fn derive(explicit: u32, total: u32, other: u32) -> u32 {
    if explicit != 0 {
        explicit
    } else {
        total.checked_div(other).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub frame_width: u32,
    pub frame_height: u32,
    pub columns: u32,
    pub rows: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub row: u32,
    pub column: u32,
}

/// Clamped pixel rectangle of a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl Grid {
    pub const fn is_empty(&self) -> bool {
        self.frame_width == 0 || self.frame_height == 0 || self.columns == 0 || self.rows == 0
    }

    pub const fn frame_count(&self) -> u64 {
        self.columns as u64 * self.rows as u64
    }

    /// All cells, row by row. Rows are split across threads, cells are never collected up front.
    pub fn par_cells(&self) -> impl ParallelIterator<Item = Cell> {
        let columns = self.columns;
        (0..self.rows)
            .into_par_iter()
            .flat_map_iter(move |row| (0..columns).map(move |column| Cell { row, column }))
    }

    /// Rectangle covered by `cell`, cut down to fit into an image of the given size.
    ///
    /// Frames of a ragged last row / column come out smaller than the frame size,
    /// cells that lie entirely outside the image come out empty.
    pub fn frame_rect(&self, cell: Cell, (width, height): (u32, u32)) -> Rect {
        let (x, w) = clamp_span(cell.column, self.frame_width, width);
        let (y, h) = clamp_span(cell.row, self.frame_height, height);

        Rect {
            x,
            y,
            width: w,
            height: h,
        }
    }
}

fn clamp_span(index: u32, size: u32, limit: u32) -> (u32, u32) {
    let start = index.saturating_mul(size).min(limit);
    let end = start.saturating_add(size).min(limit);

    (start, end - start)
}

use std::path::{Path, PathBuf};

use crate::grid::{Cell, Grid};

/// Which way a written frame is facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The frame as found in the sprite map.
    Right,
    /// The horizontally flipped copy.
    Left,
}

impl Side {
    pub const fn marker(self) -> char {
        match self {
            Self::Right => 'r',
            Self::Left => 'l',
        }
    }
}

/// File name template shared by every frame of a run:
/// `<prefix>[-<l|r>]-<row>-<column>.png`
#[derive(Debug, Clone)]
pub struct FrameNaming {
    dir: PathBuf,
    prefix: String,
    row_digits: usize,
    column_digits: usize,
}

impl FrameNaming {
    /// Frames land in `output` if given, otherwise next to `source`.
    /// The prefix defaults to the file stem of `source`.
    pub fn new(source: &Path, output: Option<&Path>, prefix: Option<&str>, grid: &Grid) -> Self {
        let dir = output.map_or_else(
            || source.parent().map(Path::to_path_buf).unwrap_or_default(),
            Path::to_path_buf,
        );

        let prefix = prefix.map_or_else(
            || {
                source
                    .file_stem()
                    .map_or_else(|| "frame".to_owned(), |stem| stem.to_string_lossy().to_string())
            },
            str::to_owned,
        );

        Self {
            dir,
            prefix,
            row_digits: field_width(grid.rows),
            column_digits: field_width(grid.columns),
        }
    }

    pub fn file_name(&self, cell: Cell, side: Option<Side>) -> String {
        let prefix = &self.prefix;
        let row_digits = self.row_digits;
        let column_digits = self.column_digits;
        let Cell { row, column } = cell;

        match side {
            Some(side) => format!(
                "{prefix}-{}-{row:0row_digits$}-{column:0column_digits$}.png",
                side.marker()
            ),
            None => format!("{prefix}-{row:0row_digits$}-{column:0column_digits$}.png"),
        }
    }

    pub fn path(&self, cell: Cell, side: Option<Side>) -> PathBuf {
        self.dir.join(self.file_name(cell, side))
    }
}

/// Digits needed for the indices `0..count`, i.e. `ceil(log10(count))`,
/// but never less than one.
pub const fn field_width(count: u32) -> usize {
    match count.saturating_sub(1).checked_ilog10() {
        Some(digits) => digits as usize + 1,
        None => 1,
    }
}

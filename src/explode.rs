use std::{fs, io, ops::Add, path::PathBuf};

use clap::{ArgAction, Args};
use image::{EncodableLayout, GenericImageView as _, ImageBuffer, Pixel, PixelWithColorType};
use rayon::prelude::*;

use crate::{
    grid::{Cell, Grid, GridError, GridSpec},
    image_util::{self, ImageBufferExt as _, LoadError, PngCompression, PngOptions, SpriteMap},
    naming::{FrameNaming, Side},
};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Grid(#[from] GridError),

    #[error("{}: {source}", path.display())]
    Load { path: PathBuf, source: LoadError },

    #[error("output path is not a directory")]
    OutputPathNotDir,

    #[error("unable to create output folder: {0}")]
    OutputDir(#[source] io::Error),
}

impl CommandError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Grid(_) | Self::OutputPathNotDir | Self::OutputDir(_) => 1,
            Self::Load { source, .. } => match source {
                LoadError::Open(_) => 2,
                LoadError::Decode(_) => 3,
                LoadError::Unsupported(_) => 4,
            },
        }
    }
}

#[derive(Args, Debug)]
pub struct ExplodeArgs {
    /// The sprite map to split into individual frames.
    pub source: PathBuf,

    /// Frame width in pixels. 0 calculates it from the column count.
    #[clap(long, default_value_t = 0, value_name = "PX")]
    pub width: u32,

    /// Frame height in pixels. 0 calculates it from the row count.
    #[clap(long, default_value_t = 0, value_name = "PX")]
    pub height: u32,

    /// Number of columns. 0 calculates it from the frame width.
    #[clap(long, default_value_t = 0)]
    pub columns: u32,

    /// Number of rows. 0 calculates it from the frame height.
    #[clap(long, default_value_t = 0)]
    pub rows: u32,

    /// Duplicate every frame flipped on the y axis, i.e. facing left if it was facing right before.
    /// The file names are extended to <prefix>-<l|r>-<row>-<column>.png with r being the original.
    #[clap(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = false,
        default_missing_value = "true",
        verbatim_doc_comment
    )]
    pub mirror_left: bool,

    /// Output folder. Defaults to the folder of the sprite map.
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Prefix of the output file names. Defaults to the sprite map name without extension.
    #[clap(short, long)]
    pub prefix: Option<String>,

    /// Compression level of the png encoder.
    #[clap(long, default_value_t = PngCompression::Best)]
    pub compression: PngCompression,

    /// Run the written frames through oxipng (lossless).
    #[clap(long, action)]
    pub optimize: bool,
}

impl ExplodeArgs {
    pub const fn grid_spec(&self) -> GridSpec {
        GridSpec {
            frame_width: self.width,
            frame_height: self.height,
            columns: self.columns,
            rows: self.rows,
        }
    }

    const fn png_options(&self) -> PngOptions {
        PngOptions {
            compression: self.compression,
            optimize: self.optimize,
        }
    }
}

/// Frame counters of a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub written: u64,
    pub empty: u64,
    pub failed: u64,
}

impl Add for Summary {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            written: self.written + rhs.written,
            empty: self.empty + rhs.empty,
            failed: self.failed + rhs.failed,
        }
    }
}

pub fn explode(args: &ExplodeArgs) -> Result<Summary, CommandError> {
    let spec = args.grid_spec();
    spec.validate()?;

    let sprite_map =
        image_util::load_sprite_map(&args.source).map_err(|source| CommandError::Load {
            path: args.source.clone(),
            source,
        })?;

    let (width, height) = sprite_map.dimensions();
    let grid = spec.resolve((width, height))?;
    debug!(
        "{}: {width}x{height}px -> {}x{} grid, {} frames of {}x{}px",
        args.source.display(),
        grid.columns,
        grid.rows,
        grid.frame_count(),
        grid.frame_width,
        grid.frame_height
    );

    if grid.is_empty() {
        warn!(
            "{}: frames don't fit into {width}x{height}px, nothing to do",
            args.source.display()
        );
        return Ok(Summary::default());
    }

    if let Some(output) = &args.output {
        if output.exists() && !output.is_dir() {
            return Err(CommandError::OutputPathNotDir);
        }

        fs::create_dir_all(output).map_err(CommandError::OutputDir)?;
    }

    let naming = FrameNaming::new(
        &args.source,
        args.output.as_deref(),
        args.prefix.as_deref(),
        &grid,
    );

    let job = Job {
        grid: &grid,
        naming: &naming,
        mirror: args.mirror_left,
        png: args.png_options(),
    };

    let summary = match &sprite_map {
        SpriteMap::Rgba8(sheet) => job.run(sheet),
        SpriteMap::Rgba16(sheet) => job.run(sheet),
    };

    info!(
        "{}: wrote {} files, skipped {} empty frames",
        args.source.display(),
        summary.written,
        summary.empty
    );

    if summary.failed > 0 {
        warn!("{} files could not be written", summary.failed);
    }

    Ok(summary)
}

struct Job<'a> {
    grid: &'a Grid,
    naming: &'a FrameNaming,
    mirror: bool,
    png: PngOptions,
}

impl Job<'_> {
    fn run<P>(&self, sheet: &ImageBuffer<P, Vec<P::Subpixel>>) -> Summary
    where
        P: Pixel + PixelWithColorType + Send + Sync + 'static,
        P::Subpixel: Send + Sync + 'static,
        [P::Subpixel]: EncodableLayout,
    {
        self.grid
            .par_cells()
            .map(|cell| self.frame(sheet, cell))
            .reduce(Summary::default, Add::add)
    }

    fn frame<P>(&self, sheet: &ImageBuffer<P, Vec<P::Subpixel>>, cell: Cell) -> Summary
    where
        P: Pixel + PixelWithColorType + 'static,
        P::Subpixel: 'static,
        [P::Subpixel]: EncodableLayout,
    {
        let rect = self.grid.frame_rect(cell, sheet.dimensions());
        let view = sheet.view(rect.x, rect.y, rect.width, rect.height);

        if rect.is_empty() || image_util::is_transparent(&*view) {
            trace!("frame {}-{} is empty", cell.row, cell.column);
            return Summary {
                empty: 1,
                ..Summary::default()
            };
        }

        let frame = view.to_image();

        if self.mirror {
            self.save(&frame, cell, Some(Side::Right))
                + self.save(&image_util::mirror(&frame), cell, Some(Side::Left))
        } else {
            self.save(&frame, cell, None)
        }
    }

    fn save<P>(
        &self,
        frame: &ImageBuffer<P, Vec<P::Subpixel>>,
        cell: Cell,
        side: Option<Side>,
    ) -> Summary
    where
        P: Pixel + PixelWithColorType,
        [P::Subpixel]: EncodableLayout,
    {
        let path = self.naming.path(cell, side);

        match frame.save_png(&path, self.png) {
            Ok(()) => {
                debug!("wrote {}", path.display());
                Summary {
                    written: 1,
                    ..Summary::default()
                }
            }
            Err(err) => {
                error!("{}: {err}", path.display());
                Summary {
                    failed: 1,
                    ..Summary::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use image::{imageops, DynamicImage, Rgba, Rgba32FImage, RgbaImage};

    use super::*;

    fn args(source: impl Into<PathBuf>) -> ExplodeArgs {
        ExplodeArgs {
            source: source.into(),
            width: 0,
            height: 0,
            columns: 0,
            rows: 0,
            mirror_left: false,
            output: None,
            prefix: None,
            compression: PngCompression::Fast,
            optimize: false,
        }
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// 64x32 sheet, left frame has an arrow-ish pattern, right frame is empty.
    fn half_empty_sheet(dir: &Path) -> (PathBuf, RgbaImage) {
        let mut sheet = RgbaImage::new(64, 32);
        for y in 0..32 {
            for x in 0..(32 - y) {
                sheet.put_pixel(x, y, Rgba([200, x as u8, y as u8, 255]));
            }
        }

        let path = dir.join("sheet.png");
        sheet.save(&path).unwrap();

        let frame = imageops::crop_imm(&sheet, 0, 0, 32, 32).to_image();
        (path, frame)
    }

    fn open_rgba(path: impl AsRef<Path>) -> RgbaImage {
        image::open(path).unwrap().to_rgba8()
    }

    #[test]
    fn skips_empty_frames() {
        let dir = tempfile::tempdir().unwrap();
        let (source, frame) = half_empty_sheet(dir.path());

        let summary = explode(&ExplodeArgs {
            width: 32,
            height: 32,
            ..args(&source)
        })
        .unwrap();

        assert_eq!(
            summary,
            Summary {
                written: 1,
                empty: 1,
                failed: 0,
            }
        );
        assert_eq!(files_in(dir.path()), ["sheet-0-0.png", "sheet.png"]);
        assert_eq!(open_rgba(dir.path().join("sheet-0-0.png")), frame);
    }

    #[test]
    fn writes_mirrored_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let (source, frame) = half_empty_sheet(dir.path());

        let summary = explode(&ExplodeArgs {
            width: 32,
            height: 32,
            mirror_left: true,
            ..args(&source)
        })
        .unwrap();

        assert_eq!(summary.written, 2);
        assert_eq!(
            files_in(dir.path()),
            ["sheet-l-0-0.png", "sheet-r-0-0.png", "sheet.png"]
        );

        let right = open_rgba(dir.path().join("sheet-r-0-0.png"));
        let left = open_rgba(dir.path().join("sheet-l-0-0.png"));
        assert_eq!(right, frame);
        assert_eq!(left, imageops::flip_horizontal(&frame));
        assert_eq!(imageops::flip_horizontal(&left), right);
    }

    #[test]
    fn counts_derive_frame_size() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = RgbaImage::from_pixel(30, 20, Rgba([1, 2, 3, 255]));
        let source = dir.path().join("tiles.png");
        sheet.save(&source).unwrap();

        let out = dir.path().join("out");
        let summary = explode(&ExplodeArgs {
            columns: 3,
            rows: 2,
            output: Some(out.clone()),
            ..args(&source)
        })
        .unwrap();

        assert_eq!(summary.written, 6);
        assert_eq!(
            files_in(&out),
            [
                "tiles-0-0.png",
                "tiles-0-1.png",
                "tiles-0-2.png",
                "tiles-1-0.png",
                "tiles-1-1.png",
                "tiles-1-2.png",
            ]
        );
        assert_eq!(open_rgba(out.join("tiles-1-2.png")).dimensions(), (10, 10));
    }

    #[test]
    fn ragged_edges_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = RgbaImage::from_pixel(25, 10, Rgba([0, 0, 0, 255]));
        let source = dir.path().join("ragged.png");
        sheet.save(&source).unwrap();

        let summary = explode(&ExplodeArgs {
            width: 10,
            columns: 3,
            rows: 1,
            prefix: Some("r".to_owned()),
            ..args(&source)
        })
        .unwrap();

        assert_eq!(summary.written, 3);
        assert_eq!(open_rgba(dir.path().join("r-0-2.png")).dimensions(), (5, 10));
    }

    #[test]
    fn padded_names() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = RgbaImage::from_pixel(12, 1, Rgba([0, 0, 0, 255]));
        let source = dir.path().join("strip.png");
        sheet.save(&source).unwrap();

        let out = dir.path().join("out");
        explode(&ExplodeArgs {
            width: 1,
            rows: 1,
            output: Some(out.clone()),
            ..args(&source)
        })
        .unwrap();

        let names = files_in(&out);
        assert_eq!(names.len(), 12);
        assert_eq!(names.first().unwrap(), "strip-0-00.png");
        assert_eq!(names.last().unwrap(), "strip-0-11.png");
    }

    #[test]
    fn sixteen_bit_frames_keep_precision() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = ImageBuffer::from_pixel(4, 2, Rgba([1000u16, 2000, 3000, 40000]));
        let source = dir.path().join("deep.png");
        DynamicImage::ImageRgba16(sheet).save(&source).unwrap();

        let summary = explode(&ExplodeArgs {
            columns: 2,
            rows: 1,
            ..args(&source)
        })
        .unwrap();

        assert_eq!(summary.written, 2);
        let frame = image::open(dir.path().join("deep-0-1.png")).unwrap();
        assert_eq!(frame.to_rgba16().get_pixel(0, 0), &Rgba([1000, 2000, 3000, 40000]));
    }

    #[test]
    fn missing_grid_is_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let err = explode(&ExplodeArgs {
            width: 32,
            ..args(dir.path().join("missing.png"))
        })
        .unwrap_err();

        assert!(matches!(err, CommandError::Grid(GridError::MissingVertical)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = explode(&ExplodeArgs {
            columns: 1,
            rows: 1,
            ..args(dir.path().join("missing.png"))
        })
        .unwrap_err();

        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn undecodable_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.png");
        fs::write(&source, b"\x89PNG but not really").unwrap();

        let err = explode(&ExplodeArgs {
            columns: 1,
            rows: 1,
            ..args(&source)
        })
        .unwrap_err();

        assert_eq!(err.exit_code(), 3);
        assert_eq!(files_in(dir.path()), ["broken.png"]);
    }

    #[test]
    fn float_source_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("light.exr");
        DynamicImage::ImageRgba32F(Rgba32FImage::from_pixel(4, 4, Rgba([1.0, 0.5, 0.25, 1.0])))
            .save(&source)
            .unwrap();

        let err = explode(&ExplodeArgs {
            columns: 2,
            rows: 2,
            ..args(&source)
        })
        .unwrap_err();

        assert_eq!(err.exit_code(), 4);
        assert_eq!(files_in(dir.path()), ["light.exr"]);
    }

    #[test]
    fn output_path_must_be_a_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (source, _) = half_empty_sheet(dir.path());
        let out = dir.path().join("file");
        fs::write(&out, b"").unwrap();

        let err = explode(&ExplodeArgs {
            width: 32,
            height: 32,
            output: Some(out),
            ..args(&source)
        })
        .unwrap_err();

        assert!(matches!(err, CommandError::OutputPathNotDir));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn output_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let (source, _) = half_empty_sheet(dir.path());
        let out = dir.path().join("nested").join("frames");

        explode(&ExplodeArgs {
            width: 32,
            height: 32,
            output: Some(out.clone()),
            ..args(&source)
        })
        .unwrap();

        assert_eq!(files_in(&out), ["sheet-0-0.png"]);
    }

    #[test]
    fn unwritable_frames_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 255]));
        let source = dir.path().join("sheet.png");
        sheet.save(&source).unwrap();

        let summary = explode(&ExplodeArgs {
            columns: 2,
            rows: 1,
            mirror_left: true,
            prefix: Some("missing/x".to_owned()),
            ..args(&source)
        })
        .unwrap();

        assert_eq!(
            summary,
            Summary {
                written: 0,
                empty: 0,
                failed: 4,
            }
        );
        assert_eq!(files_in(dir.path()), ["sheet.png"]);
    }

    #[test]
    fn oversized_frames_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (source, _) = half_empty_sheet(dir.path());

        let summary = explode(&ExplodeArgs {
            width: 128,
            height: 128,
            output: Some(dir.path().join("out")),
            ..args(&source)
        })
        .unwrap();

        assert_eq!(summary, Summary::default());
        assert_eq!(files_in(dir.path()), ["sheet.png"]);
    }
}

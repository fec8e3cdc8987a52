use std::{
    fs,
    io::{self, BufReader, Write},
    ops::Deref,
    path::Path,
};

use clap::{builder::PossibleValue, ValueEnum};
use image::{
    codecs::png, imageops, ColorType, DynamicImage, EncodableLayout, GenericImageView,
    ImageBuffer, ImageEncoder, ImageReader, Pixel, PixelWithColorType, Primitive, Rgba,
    RgbaImage,
};
use strum::VariantArray;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot open: {0}")]
    Open(#[source] io::Error),

    #[error("cannot decode: {0}")]
    Decode(#[from] image::ImageError),

    #[error("{0:?} images can not be split into png frames")]
    Unsupported(ColorType),
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("cannot create file: {0}")]
    Create(#[source] io::Error),

    #[error("cannot encode image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("cannot optimize image: {0}")]
    Optimize(#[from] oxipng::PngError),

    #[error("cannot write file: {0}")]
    Write(#[source] io::Error),
}

pub type Rgba16Image = ImageBuffer<Rgba<u16>, Vec<u16>>;

/// A decoded sprite map that frames can be cut out of and stored as png without loss.
#[derive(Debug)]
pub enum SpriteMap {
    Rgba8(RgbaImage),
    Rgba16(Rgba16Image),
}

impl SpriteMap {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Rgba8(img) => img.dimensions(),
            Self::Rgba16(img) => img.dimensions(),
        }
    }
}

impl TryFrom<DynamicImage> for SpriteMap {
    type Error = LoadError;

    fn try_from(value: DynamicImage) -> Result<Self, Self::Error> {
        match value {
            DynamicImage::ImageRgba8(img) => Ok(Self::Rgba8(img)),
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageRgb8(_) => Ok(Self::Rgba8(value.to_rgba8())),
            DynamicImage::ImageRgba16(img) => Ok(Self::Rgba16(img)),
            DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_)
            | DynamicImage::ImageRgb16(_) => Ok(Self::Rgba16(value.to_rgba16())),
            // png has no floating point samples
            other => Err(LoadError::Unsupported(other.color())),
        }
    }
}

pub fn load_sprite_map(path: &Path) -> Result<SpriteMap, LoadError> {
    let file = fs::File::open(path).map_err(LoadError::Open)?;

    // the format is sniffed from the content, the extension doesn't matter
    let image = ImageReader::new(BufReader::new(file))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?
        .decode()?;

    SpriteMap::try_from(image)
}

/// `true` if no pixel of `img` has a nonzero alpha value.
pub fn is_transparent<I>(img: &I) -> bool
where
    I: GenericImageView,
{
    let zero = <<I::Pixel as Pixel>::Subpixel as Primitive>::DEFAULT_MIN_VALUE;

    !img.pixels().any(|(_, _, pxl)| pxl.to_rgba()[3] != zero)
}

/// Flip `img` around its vertical axis.
pub fn mirror<I>(img: &I) -> ImageBuffer<I::Pixel, Vec<<I::Pixel as Pixel>::Subpixel>>
where
    I: GenericImageView,
    I::Pixel: 'static,
{
    imageops::flip_horizontal(img)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, VariantArray)]
pub enum PngCompression {
    Fast,
    Default,
    #[default]
    Best,
}

impl std::fmt::Display for PngCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Default => write!(f, "default"),
            Self::Best => write!(f, "best"),
        }
    }
}

impl From<PngCompression> for png::CompressionType {
    fn from(value: PngCompression) -> Self {
        match value {
            PngCompression::Fast => Self::Fast,
            PngCompression::Default => Self::Default,
            PngCompression::Best => Self::Best,
        }
    }
}

impl ValueEnum for PngCompression {
    fn value_variants<'a>() -> &'a [Self] {
        Self::VARIANTS
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        Some(PossibleValue::new(match self {
            Self::Fast => "fast",
            Self::Default => "default",
            Self::Best => "best",
        }))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PngOptions {
    pub compression: PngCompression,
    pub optimize: bool,
}

pub trait ImageBufferExt<P, C> {
    /// Encode as png and write it to `path`.
    ///
    /// A file that was created but could not be completed is removed again.
    fn save_png(&self, path: impl AsRef<Path>, options: PngOptions) -> Result<(), SaveError>;

    fn encode_png(&self, options: PngOptions) -> Result<Vec<u8>, SaveError>;
}

impl<P, C> ImageBufferExt<P, C> for ImageBuffer<P, C>
where
    P: Pixel + PixelWithColorType,
    [P::Subpixel]: EncodableLayout,
    C: Deref<Target = [P::Subpixel]>,
{
    fn save_png(&self, path: impl AsRef<Path>, options: PngOptions) -> Result<(), SaveError> {
        let path = path.as_ref();
        let mut file = fs::File::create(path).map_err(SaveError::Create)?;

        let res = self.encode_png(options).and_then(|data| {
            file.write_all(&data)
                .and_then(|()| file.flush())
                .map_err(SaveError::Write)
        });

        if res.is_err() {
            drop(file);

            if let Err(err) = fs::remove_file(path) {
                warn!("{}: unable to remove incomplete file: {err}", path.display());
            }
        }

        res
    }

    fn encode_png(&self, options: PngOptions) -> Result<Vec<u8>, SaveError> {
        let mut data = Vec::new();

        let (width, height) = self.dimensions();
        png::PngEncoder::new_with_quality(
            &mut data,
            options.compression.into(),
            png::FilterType::default(),
        )
        .write_image(
            self.as_bytes(),
            width,
            height,
            <P as PixelWithColorType>::COLOR_TYPE,
        )?;

        if options.optimize {
            let optimized = oxipng::optimize_from_memory(&data, &oxipng::Options::from_preset(2))?;
            trace!("oxipng: {} -> {} bytes", data.len(), optimized.len());
            data = optimized;
        }

        Ok(data)
    }
}

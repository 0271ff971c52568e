use std::{borrow::Cow, io::Cursor};

use gltf::texture::{MinFilter, Sampler, WrappingMode};
use image::{guess_format, DynamicImage, GenericImageView, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};

use crate::error::{ImageSource, ImportError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMode {
    Point,
    #[default]
    Bilinear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WrapMode {
    #[default]
    Repeat,
    Clamp,
}

#[derive(Debug, Clone)]
pub struct Texture {
    pub name: String,
    pub image: DynamicImage,
    pub filter_mode: FilterMode,
    pub wrap_mode: WrapMode,
}

impl Texture {
    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Only an exact `NEAREST` minification filter gives point sampling,
    /// and only the S wrap mode is honored.
    pub fn apply_sampler(&mut self, sampler: &Sampler) {
        self.filter_mode = match sampler.min_filter() {
            Some(MinFilter::Nearest) => FilterMode::Point,
            _ => FilterMode::Bilinear,
        };
        self.wrap_mode = match sampler.wrap_s() {
            WrappingMode::ClampToEdge => WrapMode::Clamp,
            _ => WrapMode::Repeat,
        };
    }

    /// Image in a pixel format PNG can store.
    pub fn encodable_image(&self) -> Cow<'_, DynamicImage> {
        match &self.image {
            DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
                Cow::Owned(DynamicImage::ImageRgba16(self.image.to_rgba16()))
            }
            image => Cow::Borrowed(image),
        }
    }
}

/// Decodes image bytes. The declared mime type wins over sniffing.
pub fn decode_image(
    source: &ImageSource,
    data: &[u8],
    mime: Option<&str>,
) -> Result<DynamicImage, ImportError> {
    let format = match mime {
        Some(mime) => ImageFormat::from_mime_type(mime)
            .ok_or_else(|| ImportError::BadImageMime(source.clone(), mime.to_string()))?,
        None => guess_format(data).map_err(|error| ImportError::BadImage(source.clone(), error))?,
    };
    let mut reader = ImageReader::new(Cursor::new(data));
    reader.set_format(format);
    reader
        .decode()
        .map_err(|error| ImportError::BadImage(source.clone(), error))
}

#[cfg(test)]
pub(crate) mod test {
    use image::{Rgba, RgbaImage};

    use super::*;

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 255]));
        let mut data = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut data, ImageFormat::Png)
            .unwrap();
        data.into_inner()
    }

    #[test]
    fn decodes_png_with_and_without_mime() {
        let data = png_bytes(2, 3);
        let source = ImageSource::View(0);
        let image = decode_image(&source, &data, Some("image/png")).unwrap();
        assert_eq!(image.dimensions(), (2, 3));
        let image = decode_image(&source, &data, None).unwrap();
        assert_eq!(image.dimensions(), (2, 3));
    }

    #[test]
    fn rejects_unknown_mime() {
        let source = ImageSource::Uri("a.png".to_string());
        assert!(matches!(
            decode_image(&source, &png_bytes(1, 1), Some("image/x-unknown")),
            Err(ImportError::BadImageMime(_, _))
        ));
        assert!(matches!(
            decode_image(&source, b"garbage", None),
            Err(ImportError::BadImage(_, _))
        ));
    }
}

//! Page rasterization seam.

use bundle_intake_core::GrayImage;

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("page {index} out of range (document has {count} pages)")]
    PageOutOfRange { index: usize, count: usize },
    #[error("failed to render page {index}: {message}")]
    Backend { index: usize, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Turns an uploaded document into page rasters.
pub trait PageRenderer {
    fn page_count(&self) -> usize;
    fn page_image(&self, index: usize) -> Result<GrayImage, RenderError>;
}

/// Pages that are already rasters.
#[derive(Clone, Debug, Default)]
pub struct RasterPages {
    pub pages: Vec<GrayImage>,
}

impl RasterPages {
    pub fn new(pages: Vec<GrayImage>) -> Self {
        Self { pages }
    }
}

impl PageRenderer for RasterPages {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_image(&self, index: usize) -> Result<GrayImage, RenderError> {
        self.pages
            .get(index)
            .cloned()
            .ok_or(RenderError::PageOutOfRange {
                index,
                count: self.pages.len(),
            })
    }
}

#[cfg(feature = "image")]
pub use self::files::{gray_view, load_gray, save_gray, ImageFileRenderer};

#[cfg(feature = "image")]
mod files {
    use std::path::{Path, PathBuf};

    use bundle_intake_core::{GrayImage, GrayImageView};

    use super::{PageRenderer, RenderError};

    /// Convert an `image::GrayImage` into the lightweight core view type.
    pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
        GrayImageView {
            width: img.width() as usize,
            height: img.height() as usize,
            data: img.as_raw(),
        }
    }

    /// Decode any supported image file to 8-bit grayscale.
    pub fn load_gray(path: impl AsRef<Path>, index: usize) -> Result<GrayImage, RenderError> {
        let img = ::image::open(path.as_ref())
            .map_err(|err| RenderError::Backend {
                index,
                message: err.to_string(),
            })?
            .to_luma8();
        let (w, h) = (img.width() as usize, img.height() as usize);
        GrayImage::from_raw(w, h, img.into_raw()).ok_or(RenderError::Backend {
            index,
            message: "decoded buffer does not match its dimensions".to_string(),
        })
    }

    /// Write a raster as an image file; the format follows the extension.
    pub fn save_gray(img: &GrayImage, path: impl AsRef<Path>) -> Result<(), RenderError> {
        let out = ::image::GrayImage::from_raw(img.width as u32, img.height as u32, img.data.clone())
            .ok_or(RenderError::Backend {
                index: 0,
                message: "raster buffer does not match its dimensions".to_string(),
            })?;
        out.save(path.as_ref()).map_err(|err| RenderError::Backend {
            index: 0,
            message: err.to_string(),
        })
    }

    /// One image file per page.
    #[derive(Clone, Debug, Default)]
    pub struct ImageFileRenderer {
        pub paths: Vec<PathBuf>,
    }

    impl ImageFileRenderer {
        pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
            Self {
                paths: paths.into_iter().map(Into::into).collect(),
            }
        }
    }

    impl PageRenderer for ImageFileRenderer {
        fn page_count(&self) -> usize {
            self.paths.len()
        }

        fn page_image(&self, index: usize) -> Result<GrayImage, RenderError> {
            let path = self.paths.get(index).ok_or(RenderError::PageOutOfRange {
                index,
                count: self.paths.len(),
            })?;
            load_gray(path, index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raster_pages_render_by_index() {
        let pages = RasterPages::new(vec![GrayImage::filled(2, 2, 1), GrayImage::filled(3, 1, 2)]);
        assert_eq!(pages.page_count(), 2);
        assert_eq!(pages.page_image(1).expect("page").width, 3);
        assert!(matches!(
            pages.page_image(2),
            Err(RenderError::PageOutOfRange { index: 2, count: 2 })
        ));
    }

    #[cfg(feature = "image")]
    #[test]
    fn image_files_round_trip_through_png() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("page.png");
        let mut img = GrayImage::filled(4, 3, 10);
        img.data[5] = 200;
        save_gray(&img, &path).expect("save");

        let renderer = ImageFileRenderer::new([&path]);
        assert_eq!(renderer.page_image(0).expect("load"), img);
    }
}

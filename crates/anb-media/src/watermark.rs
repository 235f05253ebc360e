//! Watermark overlay configuration.
//!
//! Published videos carry the platform logo in the bottom-right corner.
//! Unlike optional branding, the logo is mandatory here: a missing asset
//! fails the watermark stage.

use std::path::{Path, PathBuf};

use crate::error::{MediaError, MediaResult};
use crate::filters::overlay_filter;

/// Logo file name inside the assets directory.
pub const WATERMARK_FILE_NAME: &str = "logo.png";

/// Default padding from the right and bottom edges (pixels).
pub const DEFAULT_WATERMARK_PADDING: u32 = 10;

/// Configuration for watermark overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkConfig {
    /// Path to watermark image (PNG with transparency)
    pub image_path: PathBuf,
    /// Horizontal offset from right edge (pixels)
    pub offset_x: u32,
    /// Vertical offset from bottom edge (pixels)
    pub offset_y: u32,
}

impl WatermarkConfig {
    /// Logo from `assets_dir` with the default padding.
    pub fn from_assets_dir(assets_dir: impl AsRef<Path>) -> Self {
        Self {
            image_path: assets_dir.as_ref().join(WATERMARK_FILE_NAME),
            offset_x: DEFAULT_WATERMARK_PADDING,
            offset_y: DEFAULT_WATERMARK_PADDING,
        }
    }

    /// Create config with custom image path.
    pub fn with_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = path.into();
        self
    }

    /// Set offset from bottom-right corner.
    pub fn with_offset(mut self, x: u32, y: u32) -> Self {
        self.offset_x = x;
        self.offset_y = y;
        self
    }

    /// Check if the watermark image exists.
    pub fn is_available(&self) -> bool {
        self.image_path.exists()
    }

    /// Fail when the watermark image is missing.
    pub fn validate(&self) -> MediaResult<()> {
        if !self.is_available() {
            return Err(MediaError::FileNotFound(self.image_path.clone()));
        }
        Ok(())
    }

    /// Filter graph placing the logo (input 1) over the video (input 0).
    pub fn overlay_filter(&self) -> String {
        overlay_filter(self.offset_x, self.offset_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_assets_dir() {
        let config = WatermarkConfig::from_assets_dir("./assets");
        assert_eq!(config.image_path, PathBuf::from("./assets/logo.png"));
        assert_eq!(config.offset_x, 10);
        assert_eq!(config.offset_y, 10);
    }

    #[test]
    fn test_config_builder_pattern() {
        let config = WatermarkConfig::from_assets_dir("./assets")
            .with_image_path("/srv/brand.png")
            .with_offset(30, 40);

        assert_eq!(config.image_path, PathBuf::from("/srv/brand.png"));
        assert!(config
            .overlay_filter()
            .ends_with("overlay=main_w-overlay_w-30:main_h-overlay_h-40"));
    }

    #[test]
    fn test_validate_fails_for_missing_asset() {
        let config = WatermarkConfig::from_assets_dir("/nonexistent/assets");
        assert!(!config.is_available());
        assert!(matches!(config.validate(), Err(MediaError::FileNotFound(_))));
    }
}

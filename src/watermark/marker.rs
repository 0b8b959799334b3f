//! Filename marker for watermarked assets.
//!
//! The typed `watermarked` flag on an asset is authoritative. The marker is
//! embedded in the display filename for the store's UI and is still honoured
//! when reading rows written before the flag existed.

use std::fmt;

/// Substring embedded in a watermarked asset's filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkMarker(String);

impl WatermarkMarker {
    pub fn new(marker: impl Into<String>) -> Self {
        Self(marker.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `filename` already carries the marker.
    pub fn matches(&self, filename: &str) -> bool {
        !self.0.is_empty() && filename.contains(&self.0)
    }

    /// Filename with the marker inserted before the extension.
    ///
    /// Returns `None` when the marker is already present, so renames are
    /// idempotent.
    pub fn apply(&self, filename: &str) -> Option<String> {
        if self.matches(filename) {
            return None;
        }

        match filename.rfind('.') {
            Some(dot) if dot > 0 => Some(format!(
                "{}{}{}",
                &filename[..dot],
                self.0,
                &filename[dot..]
            )),
            _ => Some(format!("{}{}", filename, self.0)),
        }
    }
}

impl Default for WatermarkMarker {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_WATERMARK_MARKER)
    }
}

impl fmt::Display for WatermarkMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

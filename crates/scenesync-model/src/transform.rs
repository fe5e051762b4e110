//! Partial scene item transform

use serde::{Deserialize, Serialize};

/// Partial transform of a scene item
///
/// Every field is optional; only the fields that are set are written to the
/// remote. No transform math happens here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds_alignment: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_top: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_bottom: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_left: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_right: Option<u32>,
}

impl Transform {
    /// Create an empty transform
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With position
    #[inline]
    #[must_use]
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position_x = Some(x);
        self.position_y = Some(y);
        self
    }

    /// With uniform or per-axis scale
    #[inline]
    #[must_use]
    pub fn with_scale(mut self, x: f64, y: f64) -> Self {
        self.scale_x = Some(x);
        self.scale_y = Some(y);
        self
    }

    /// With rotation in degrees
    #[inline]
    #[must_use]
    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation = Some(degrees);
        self
    }

    /// With bounding box
    #[inline]
    #[must_use]
    pub fn with_bounds(mut self, bounds_type: impl Into<String>, width: f64, height: f64) -> Self {
        self.bounds_type = Some(bounds_type.into());
        self.bounds_width = Some(width);
        self.bounds_height = Some(height);
        self
    }

    /// With crop on each edge (top, right, bottom, left)
    #[inline]
    #[must_use]
    pub fn with_crop(mut self, top: u32, right: u32, bottom: u32, left: u32) -> Self {
        self.crop_top = Some(top);
        self.crop_right = Some(right);
        self.crop_bottom = Some(bottom);
        self.crop_left = Some(left);
        self
    }

    /// True when no field is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

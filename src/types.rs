//! Core types shared across the trace ingestion and rendering layers.

use serde::{Deserialize, Serialize};

/// Sha1: content hash naming a payload under `resources/` in the archive
pub type Sha1 = String;

/// CallId: identity of one recorded action
pub type CallId = String;

/// PageId: identity of one page/tab inside a context
pub type PageId = String;

/// FrameId: identity of one frame inside a page
pub type FrameId = String;

/// Viewport size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

/// A point in page coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

use chrono::{DateTime, Utc};
use image::RgbImage;
use std::sync::Arc;
use uuid::Uuid;

use crate::common::geometry::Point;

/// A decoded video frame.
///
/// Cloning is cheap: the pixel buffer is shared behind an `Arc`.
#[derive(Clone)]
pub struct Frame {
    session_id: Uuid,
    image: Arc<RgbImage>,
    captured_at: DateTime<Utc>,
    frame_id: Uuid,
}

impl Frame {
    pub fn new(session_id: Uuid, image: RgbImage, captured_at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            image: Arc::new(image),
            captured_at,
            frame_id: Uuid::new_v4(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn frame_id(&self) -> Uuid {
        self.frame_id
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// The crosshair: geometric center of the frame, in pixels.
    pub fn crosshair(&self) -> Point {
        Point::new(self.width() as f32 / 2.0, self.height() as f32 / 2.0)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("frame_id", &self.frame_id)
            .field("session_id", &self.session_id)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

//! Bounding-box annotation rendering

use crate::error::VisionError;
use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::imgproc;
use opencv::prelude::*;
use warden_core::Detection;

const BOX_COLOR: (f64, f64, f64) = (0.0, 0.0, 255.0); // BGR red
const BOX_THICKNESS: i32 = 2;
const FONT_SCALE: f64 = 0.6;

/// Draw each detection's box and `category confidence` label onto the
/// frame in place.
pub fn draw_detections(frame: &mut Mat, detections: &[Detection]) -> Result<(), VisionError> {
    let color = Scalar::new(BOX_COLOR.0, BOX_COLOR.1, BOX_COLOR.2, 0.0);

    for det in detections {
        let rect = Rect::new(
            det.bbox.x as i32,
            det.bbox.y as i32,
            det.bbox.w as i32,
            det.bbox.h as i32,
        );
        if rect.width <= 0 || rect.height <= 0 {
            continue;
        }

        imgproc::rectangle(frame, rect, color, BOX_THICKNESS, imgproc::LINE_8, 0)
            .map_err(|e| VisionError::OpenCv(format!("Failed to draw box: {}", e)))?;

        let label = format!("{} {:.2}", det.category, det.confidence);
        // Keep the label inside the frame when the box touches the top edge
        let label_y = if rect.y >= 20 { rect.y - 6 } else { rect.y + 18 };
        imgproc::put_text(
            frame,
            &label,
            Point::new(rect.x, label_y),
            imgproc::FONT_HERSHEY_SIMPLEX,
            FONT_SCALE,
            color,
            1,
            imgproc::LINE_8,
            false,
        )
        .map_err(|e| VisionError::OpenCv(format!("Failed to draw label: {}", e)))?;
    }

    Ok(())
}

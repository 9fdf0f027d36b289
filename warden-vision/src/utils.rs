//! Frame conversion helpers

use crate::error::VisionError;
use opencv::core::Mat;
use opencv::prelude::*;

/// Convert an 8-bit BGR Mat into a CHW RGB float tensor normalized to
/// [0, 1]. The Mat must already be resized to the model input size.
pub fn mat_to_chw_tensor(mat: &Mat) -> Result<Vec<f32>, VisionError> {
    let (width, height) = (mat.cols(), mat.rows());
    if width <= 0 || height <= 0 {
        return Err(VisionError::Processing(
            "Invalid frame dimensions".to_string(),
        ));
    }

    let channels = mat.channels();
    if channels != 3 {
        return Err(VisionError::Processing(format!(
            "Expected 3-channel frame, got {}",
            channels
        )));
    }

    let total = (width as usize)
        .checked_mul(height as usize)
        .and_then(|p| p.checked_mul(3))
        .ok_or_else(|| VisionError::Processing("Frame too large".to_string()))?;

    let data = mat
        .data_bytes()
        .map_err(|e| VisionError::OpenCv(format!("Failed to read frame data: {}", e)))?;
    if data.len() < total {
        return Err(VisionError::Processing(format!(
            "Frame buffer too small: {} < {}",
            data.len(),
            total
        )));
    }

    let (w, h) = (width as usize, height as usize);
    let plane = w * h;
    let mut tensor = vec![0.0f32; total];

    for y in 0..h {
        for x in 0..w {
            let src = (y * w + x) * 3;
            let dst = y * w + x;
            // BGR byte order -> RGB channel planes
            tensor[dst] = data[src + 2] as f32 / 255.0;
            tensor[plane + dst] = data[src + 1] as f32 / 255.0;
            tensor[2 * plane + dst] = data[src] as f32 / 255.0;
        }
    }

    Ok(tensor)
}

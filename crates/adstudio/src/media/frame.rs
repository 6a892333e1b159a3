use std::path::Path;

use super::{MediaError, MediaTool};

/// Arguments that grab the final frame of `video` into an image file.
pub fn last_frame_args(video: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-sseof".to_string(),
        "-0.1".to_string(),
        "-i".to_string(),
        video.to_string_lossy().into_owned(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-update".to_string(),
        "1".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

pub async fn extract_last_frame(
    tool: &dyn MediaTool,
    video: &Path,
    output: &Path,
) -> Result<(), MediaError> {
    tool.run_ffmpeg(&last_frame_args(video, output)).await
}

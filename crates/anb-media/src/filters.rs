//! FFmpeg filter graph builders for the pipeline stages.

/// Scale into a `width`x`height` box preserving aspect ratio, then pad
/// with black bars to the exact frame size.
pub fn normalize_filter(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black",
        w = width,
        h = height
    )
}

/// Overlay input 1 on input 0 at the bottom-right corner.
pub fn overlay_filter(offset_x: u32, offset_y: u32) -> String {
    format!(
        "[0:v][1:v]overlay=main_w-overlay_w-{}:main_h-overlay_h-{}",
        offset_x, offset_y
    )
}

/// Output label of [`concat_filter`].
pub const CONCAT_OUTPUT_LABEL: &str = "[outv]";

/// Concatenate the video streams of `inputs` inputs into `[outv]`.
///
/// Every segment is conformed to the same frame size, sample aspect and
/// frame rate first; the concat filter rejects segments that differ.
pub fn concat_filter(inputs: usize, width: u32, height: u32, fps: u32) -> String {
    let mut chains: Vec<String> = (0..inputs)
        .map(|i| {
            format!(
                "[{i}:v]{},setsar=1,fps={fps}[v{i}]",
                normalize_filter(width, height)
            )
        })
        .collect();

    let labels: String = (0..inputs).map(|i| format!("[v{i}]")).collect();
    chains.push(format!(
        "{labels}concat=n={inputs}:v=1:a=0{CONCAT_OUTPUT_LABEL}"
    ));

    chains.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_filter() {
        assert_eq!(
            normalize_filter(1280, 720),
            "scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2:black"
        );
    }

    #[test]
    fn test_overlay_filter_bottom_right() {
        assert_eq!(
            overlay_filter(10, 10),
            "[0:v][1:v]overlay=main_w-overlay_w-10:main_h-overlay_h-10"
        );
    }

    #[test]
    fn test_concat_filter_three_segments() {
        let filter = concat_filter(3, 1280, 720, 30);
        assert!(filter.contains("[0:v]scale=1280:720"));
        assert!(filter.contains("fps=30[v2]"));
        assert!(filter.ends_with("[v0][v1][v2]concat=n=3:v=1:a=0[outv]"));
        assert_eq!(filter.split(';').count(), 4);
    }
}

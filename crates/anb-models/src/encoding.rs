//! Video encoding configuration.

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "medium";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 23;
/// Output frame rate forced by the pipeline
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Codec settings shared by every re-encoding stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingConfig {
    pub codec: String,
    pub preset: String,
    /// Constant Rate Factor (0-51, lower is better)
    pub crf: u8,
    pub frame_rate: u32,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            frame_rate: DEFAULT_FRAME_RATE,
        }
    }
}

impl EncodingConfig {
    pub fn with_crf(self, crf: u8) -> Self {
        Self { crf, ..self }
    }

    /// Video codec arguments (`-c:v`, `-crf`, `-preset`).
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        [
            ("-c:v", self.codec.clone()),
            ("-crf", self.crf.to_string()),
            ("-preset", self.preset.clone()),
        ]
        .into_iter()
        .flat_map(|(flag, value)| [flag.to_string(), value])
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EncodingConfig::default();
        assert_eq!(config.codec, "libx264");
        assert_eq!(config.crf, 23);
        assert_eq!(config.preset, "medium");
        assert_eq!(config.frame_rate, 30);
    }

    #[test]
    fn test_ffmpeg_args() {
        let args = EncodingConfig::default().with_crf(20).to_ffmpeg_args();
        assert_eq!(
            args,
            vec!["-c:v", "libx264", "-crf", "20", "-preset", "medium"]
        );
    }
}

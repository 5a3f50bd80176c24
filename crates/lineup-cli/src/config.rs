use std::path::PathBuf;

use lineup_detect::Backend;

/// An RGB color for annotation, parsed from a small named palette or a
/// `#rrggbb` hex triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const BLUE: Color = Color([0, 0, 255]);
    pub const WHITE: Color = Color([255, 255, 255]);
}

impl std::str::FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blue" => return Ok(Color::BLUE),
            "white" => return Ok(Color::WHITE),
            "black" => return Ok(Color([0, 0, 0])),
            "red" => return Ok(Color([255, 0, 0])),
            "green" => return Ok(Color([0, 128, 0])),
            "yellow" => return Ok(Color([255, 255, 0])),
            _ => {}
        }
        let hex = s
            .strip_prefix('#')
            .filter(|h| h.len() == 6)
            .ok_or_else(|| format!("unrecognized color {s:?}"))?;
        let parse = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| format!("unrecognized color {s:?}"))
        };
        Ok(Color([parse(0..2)?, parse(2..4)?, parse(4..6)?]))
    }
}

pub(crate) fn parse_backend(s: &str) -> Option<Backend> {
    match s {
        "hog" => Some(Backend::Hog),
        "cnn" => Some(Backend::Cnn),
        _ => None,
    }
}

/// Tool configuration, loaded from `LINEUP_*` environment variables with
/// defaults. All paths and tunables live here; nothing is process-global.
pub struct Config {
    /// Where the persisted gallery lives.
    pub gallery_path: PathBuf,
    /// Root of the labeled training corpus (one sub-directory per identity).
    pub training_root: PathBuf,
    /// Root of the validation corpus, walked recursively.
    pub validation_root: PathBuf,
    /// Where annotated output images are written.
    pub output_root: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// TTF font used for label text.
    pub font_path: PathBuf,
    pub box_color: Color,
    pub text_color: Color,
    /// Detector backend; the `-m` flag overrides this.
    pub backend: Backend,
    /// Maximum embedding distance for two faces to count as the same person.
    pub match_tolerance: f32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            gallery_path: env_path("LINEUP_GALLERY_PATH", "output/encodings.bin"),
            training_root: env_path("LINEUP_TRAINING_ROOT", "training"),
            validation_root: env_path("LINEUP_VALIDATION_ROOT", "validation"),
            output_root: env_path("LINEUP_OUTPUT_ROOT", "output"),
            model_dir: std::env::var("LINEUP_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| lineup_detect::default_model_dir()),
            font_path: env_path(
                "LINEUP_FONT_PATH",
                "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            ),
            box_color: env_color("LINEUP_BOX_COLOR", Color::BLUE),
            text_color: env_color("LINEUP_TEXT_COLOR", Color::WHITE),
            backend: std::env::var("LINEUP_BACKEND")
                .ok()
                .and_then(|v| parse_backend(&v))
                .unwrap_or(Backend::Hog),
            match_tolerance: env_f32("LINEUP_MATCH_TOLERANCE", lineup_core::DEFAULT_TOLERANCE),
        }
    }
}

/// Create the working directories if they do not exist yet. Idempotent;
/// called once at startup rather than as a hidden side effect.
pub fn ensure_directories(config: &Config) -> std::io::Result<()> {
    std::fs::create_dir_all(&config.training_root)?;
    std::fs::create_dir_all(&config.validation_root)?;
    std::fs::create_dir_all(&config.output_root)?;
    if let Some(parent) = config.gallery_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_color(key: &str, default: Color) -> Color {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

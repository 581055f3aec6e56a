//! Request/response messages exchanged with a computation unit.
//!
//! Every engine operation has one [`EngineRequest`] variant. Requests own
//! their buffers so they can be handed to the unit's thread without a
//! copy; results come back as an [`EngineResponse`].

use serde::Serialize;

use crate::engine::{Engine, GeneratedPalette};
use crate::error::EngineError;

/// Bytes per RGBA pixel.
pub const RGBA_CHANNELS: usize = 4;

/// Number of slots in the single-channel encoding.
pub const LUT_SLOTS: usize = 256;

/// A single operation to run on a computation unit.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineRequest {
    GenPalette {
        pixels: Vec<u8>,
        count: usize,
        seed: u64,
    },
    EncodeImage {
        palette: Vec<u8>,
        pixels: Vec<u8>,
    },
    DecodeImage {
        palette: Vec<u8>,
        encoded: Vec<u8>,
    },
    ComputeLoss {
        original: Vec<u8>,
        roundtripped: Vec<u8>,
    },
    BuildFullLut {
        palette: Vec<u8>,
    },
    SetCrossfadeTextures {
        textures: Vec<Vec<u8>>,
    },
    CrossfadeGenerate {
        width: usize,
        height: usize,
        threshold: f32,
        debug: bool,
    },
}

/// The result of a successfully executed [`EngineRequest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EngineResponse {
    Palette(GeneratedPalette),
    Bytes(Vec<u8>),
    Loss(f32),
    Done,
}

impl EngineRequest {
    /// Operation name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GenPalette { .. } => "gen_palette",
            Self::EncodeImage { .. } => "encode_image",
            Self::DecodeImage { .. } => "decode_image",
            Self::ComputeLoss { .. } => "compute_loss",
            Self::BuildFullLut { .. } => "build_full_lut",
            Self::SetCrossfadeTextures { .. } => "set_crossfade_textures",
            Self::CrossfadeGenerate { .. } => "crossfade_generate",
        }
    }

    /// Check buffer shapes before the request leaves the caller.
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            Self::GenPalette { pixels, count, .. } => {
                check_rgba("pixels", pixels)?;
                if *count == 0 {
                    return Err(EngineError::InvalidInput(
                        "palette color count must be at least 1".to_string(),
                    ));
                }
                if *count > LUT_SLOTS {
                    return Err(EngineError::InvalidInput(format!(
                        "palette color count must not exceed {LUT_SLOTS}"
                    )));
                }
                Ok(())
            }
            Self::EncodeImage { palette, pixels } => {
                check_palette(palette)?;
                check_rgba("pixels", pixels)
            }
            Self::DecodeImage { palette, .. } => check_palette(palette),
            Self::ComputeLoss {
                original,
                roundtripped,
            } => {
                check_rgba("original", original)?;
                check_rgba("roundtripped", roundtripped)?;
                if original.len() != roundtripped.len() {
                    return Err(EngineError::InvalidInput(format!(
                        "loss inputs differ in length ({} vs {})",
                        original.len(),
                        roundtripped.len()
                    )));
                }
                Ok(())
            }
            Self::BuildFullLut { palette } => check_palette(palette),
            Self::SetCrossfadeTextures { textures } => {
                for (i, texture) in textures.iter().enumerate() {
                    check_rgba(&format!("texture {i}"), texture)?;
                }
                Ok(())
            }
            Self::CrossfadeGenerate { width, height, .. } => {
                if *width == 0 || *height == 0 {
                    return Err(EngineError::InvalidInput(format!(
                        "crossfade output must be non-empty, got {width}x{height}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Run this request against an engine. Called on the unit's thread.
    pub fn execute(self, engine: &mut dyn Engine) -> Result<EngineResponse, EngineError> {
        match self {
            Self::GenPalette {
                pixels,
                count,
                seed,
            } => engine
                .gen_palette(&pixels, count, seed)
                .map(EngineResponse::Palette),
            Self::EncodeImage { palette, pixels } => engine
                .encode_image(&palette, &pixels)
                .map(EngineResponse::Bytes),
            Self::DecodeImage { palette, encoded } => engine
                .decode_image(&palette, &encoded)
                .map(EngineResponse::Bytes),
            Self::ComputeLoss {
                original,
                roundtripped,
            } => engine
                .compute_loss(&original, &roundtripped)
                .map(EngineResponse::Loss),
            Self::BuildFullLut { palette } => {
                engine.build_full_lut(&palette).map(EngineResponse::Bytes)
            }
            Self::SetCrossfadeTextures { textures } => engine
                .set_crossfade_textures(textures)
                .map(|()| EngineResponse::Done),
            Self::CrossfadeGenerate {
                width,
                height,
                threshold,
                debug,
            } => engine
                .crossfade_generate(width, height, threshold, debug)
                .map(EngineResponse::Bytes),
        }
    }
}

fn check_rgba(what: &str, buf: &[u8]) -> Result<(), EngineError> {
    if buf.len() % RGBA_CHANNELS != 0 {
        return Err(EngineError::InvalidInput(format!(
            "{what} must be RGBA (length {} is not a multiple of {RGBA_CHANNELS})",
            buf.len()
        )));
    }
    Ok(())
}

fn check_palette(palette: &[u8]) -> Result<(), EngineError> {
    check_rgba("palette", palette)?;
    if palette.is_empty() {
        return Err(EngineError::InvalidInput(
            "palette must contain at least one color".to_string(),
        ));
    }
    if palette.len() / RGBA_CHANNELS > LUT_SLOTS {
        return Err(EngineError::InvalidInput(format!(
            "palette must not exceed {LUT_SLOTS} colors"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn rejects_non_rgba_pixels() {
        let req = EngineRequest::GenPalette {
            pixels: vec![0; 7],
            count: 4,
            seed: 1,
        };
        assert_matches!(req.validate(), Err(EngineError::InvalidInput(_)));
    }

    #[test]
    fn rejects_zero_and_oversized_color_counts() {
        for count in [0, LUT_SLOTS + 1] {
            let req = EngineRequest::GenPalette {
                pixels: vec![0; 8],
                count,
                seed: 1,
            };
            assert_matches!(req.validate(), Err(EngineError::InvalidInput(_)));
        }
    }

    #[test]
    fn rejects_empty_palette() {
        let req = EngineRequest::BuildFullLut { palette: vec![] };
        assert_matches!(req.validate(), Err(EngineError::InvalidInput(msg)) if msg.contains("at least one"));
    }

    #[test]
    fn rejects_mismatched_loss_inputs() {
        let req = EngineRequest::ComputeLoss {
            original: vec![0; 8],
            roundtripped: vec![0; 4],
        };
        assert_matches!(req.validate(), Err(EngineError::InvalidInput(_)));
    }

    #[test]
    fn rejects_bad_texture_by_index() {
        let req = EngineRequest::SetCrossfadeTextures {
            textures: vec![vec![0; 4], vec![0; 5]],
        };
        assert_matches!(req.validate(), Err(EngineError::InvalidInput(msg)) if msg.contains("texture 1"));
    }

    #[test]
    fn rejects_empty_crossfade_output() {
        let req = EngineRequest::CrossfadeGenerate {
            width: 0,
            height: 4,
            threshold: 0.5,
            debug: false,
        };
        assert_matches!(req.validate(), Err(EngineError::InvalidInput(_)));
    }

    #[test]
    fn accepts_well_formed_requests() {
        let requests = [
            EngineRequest::EncodeImage {
                palette: vec![0; 16],
                pixels: vec![0; 64],
            },
            EngineRequest::DecodeImage {
                palette: vec![0; 16],
                encoded: vec![0; 3],
            },
            EngineRequest::SetCrossfadeTextures { textures: vec![] },
        ];
        for req in requests {
            assert!(req.validate().is_ok(), "{} should validate", req.name());
        }
    }
}

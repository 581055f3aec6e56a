//! The operation set a computation unit exposes.
//!
//! Real palette algorithms live outside this workspace; anything that
//! implements [`Engine`] can be hosted by a [`ComputeUnit`](crate::unit::ComputeUnit).
//! [`LoopbackEngine`] is a deterministic stand-in used for load driving
//! and tests.

use std::time::Duration;

use serde::Serialize;

use crate::error::EngineError;
use crate::protocol::{LUT_SLOTS, RGBA_CHANNELS};

/// Output of palette generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedPalette {
    /// RGBA palette, one 4-byte entry per color.
    pub palette: Vec<u8>,
    /// Clustering score reported by the engine (lower is better).
    pub score: f32,
}

/// Operations a computation unit can run.
///
/// Methods take `&mut self`: an engine is owned by exactly one unit thread
/// and may keep state between calls (e.g. crossfade textures).
pub trait Engine: Send + 'static {
    fn gen_palette(
        &mut self,
        pixels: &[u8],
        count: usize,
        seed: u64,
    ) -> Result<GeneratedPalette, EngineError>;

    fn encode_image(&mut self, palette: &[u8], pixels: &[u8]) -> Result<Vec<u8>, EngineError>;

    fn decode_image(&mut self, palette: &[u8], encoded: &[u8]) -> Result<Vec<u8>, EngineError>;

    fn compute_loss(&mut self, original: &[u8], roundtripped: &[u8]) -> Result<f32, EngineError>;

    fn build_full_lut(&mut self, palette: &[u8]) -> Result<Vec<u8>, EngineError>;

    /// Replace all crossfade textures held by this engine.
    fn set_crossfade_textures(&mut self, textures: Vec<Vec<u8>>) -> Result<(), EngineError>;

    fn crossfade_generate(
        &mut self,
        width: usize,
        height: usize,
        threshold: f32,
        debug: bool,
    ) -> Result<Vec<u8>, EngineError>;
}

/// Deterministic engine that does the minimum needed to produce
/// well-shaped outputs. Optionally sleeps to simulate compute latency.
#[derive(Debug, Default)]
pub struct LoopbackEngine {
    latency: Duration,
    textures: Vec<Vec<u8>>,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `latency` on every operation.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    fn simulate_work(&self) {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
    }
}

impl Engine for LoopbackEngine {
    /// Takes the first `count` pixels as the palette, repeating the last
    /// one when the image is smaller than the palette.
    fn gen_palette(
        &mut self,
        pixels: &[u8],
        count: usize,
        _seed: u64,
    ) -> Result<GeneratedPalette, EngineError> {
        self.simulate_work();
        if pixels.len() < RGBA_CHANNELS {
            return Err(EngineError::Engine(
                "cannot build a palette from an empty image".to_string(),
            ));
        }
        let colors: Vec<&[u8]> = pixels.chunks_exact(RGBA_CHANNELS).collect();
        let palette = (0..count)
            .flat_map(|i| colors[i.min(colors.len() - 1)].iter().copied())
            .collect();
        Ok(GeneratedPalette {
            palette,
            score: 0.0,
        })
    }

    /// Every pixel maps to slot 0.
    fn encode_image(&mut self, _palette: &[u8], pixels: &[u8]) -> Result<Vec<u8>, EngineError> {
        self.simulate_work();
        Ok(vec![0; pixels.len() / RGBA_CHANNELS])
    }

    /// Each encoded byte indexes the palette, clamped to its last color.
    fn decode_image(&mut self, palette: &[u8], encoded: &[u8]) -> Result<Vec<u8>, EngineError> {
        self.simulate_work();
        let colors = palette_colors(palette)?;
        let mut out = Vec::with_capacity(encoded.len() * RGBA_CHANNELS);
        for &slot in encoded {
            let ix = (slot as usize).min(colors - 1) * RGBA_CHANNELS;
            out.extend_from_slice(&palette[ix..ix + RGBA_CHANNELS]);
        }
        Ok(out)
    }

    /// Mean absolute byte difference.
    fn compute_loss(&mut self, original: &[u8], roundtripped: &[u8]) -> Result<f32, EngineError> {
        self.simulate_work();
        if original.is_empty() {
            return Ok(0.0);
        }
        let total: u64 = original
            .iter()
            .zip(roundtripped)
            .map(|(a, b)| a.abs_diff(*b) as u64)
            .sum();
        Ok(total as f32 / original.len() as f32)
    }

    /// Spreads palette colors evenly over the 256 slots, nearest-lower.
    fn build_full_lut(&mut self, palette: &[u8]) -> Result<Vec<u8>, EngineError> {
        self.simulate_work();
        let colors = palette_colors(palette)?;
        let mut lut = Vec::with_capacity(LUT_SLOTS * RGBA_CHANNELS);
        for slot in 0..LUT_SLOTS {
            let ix = slot * (colors - 1) / (LUT_SLOTS - 1) * RGBA_CHANNELS;
            lut.extend_from_slice(&palette[ix..ix + RGBA_CHANNELS]);
        }
        Ok(lut)
    }

    fn set_crossfade_textures(&mut self, textures: Vec<Vec<u8>>) -> Result<(), EngineError> {
        self.simulate_work();
        self.textures = textures;
        Ok(())
    }

    /// Tiles the first texture over the output.
    fn crossfade_generate(
        &mut self,
        width: usize,
        height: usize,
        _threshold: f32,
        _debug: bool,
    ) -> Result<Vec<u8>, EngineError> {
        self.simulate_work();
        let source = self
            .textures
            .iter()
            .find(|t| !t.is_empty())
            .ok_or_else(|| EngineError::Engine("no crossfade textures set".to_string()))?;
        Ok(source
            .iter()
            .copied()
            .cycle()
            .take(width * height * RGBA_CHANNELS)
            .collect())
    }
}

fn palette_colors(palette: &[u8]) -> Result<usize, EngineError> {
    match palette.len() / RGBA_CHANNELS {
        0 => Err(EngineError::Engine("palette is empty".to_string())),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn two_color_palette() -> Vec<u8> {
        [RED, BLUE].concat()
    }

    #[test]
    fn palette_repeats_last_color_when_image_is_small() {
        let mut engine = LoopbackEngine::new();
        let out = engine.gen_palette(&RED, 3, 7).unwrap();
        assert_eq!(out.palette, [RED, RED, RED].concat());
    }

    #[test]
    fn palette_from_empty_image_fails() {
        let mut engine = LoopbackEngine::new();
        assert!(engine.gen_palette(&[], 2, 0).is_err());
    }

    #[test]
    fn decode_clamps_out_of_range_slots() {
        let mut engine = LoopbackEngine::new();
        let decoded = engine
            .decode_image(&two_color_palette(), &[0, 1, 200])
            .unwrap();
        assert_eq!(decoded, [RED, BLUE, BLUE].concat());
    }

    #[test]
    fn lut_spans_palette_endpoints() {
        let mut engine = LoopbackEngine::new();
        let lut = engine.build_full_lut(&two_color_palette()).unwrap();
        assert_eq!(lut.len(), LUT_SLOTS * RGBA_CHANNELS);
        assert_eq!(&lut[..4], &RED);
        assert_eq!(&lut[lut.len() - 4..], &BLUE);
    }

    #[test]
    fn loss_is_mean_absolute_difference() {
        let mut engine = LoopbackEngine::new();
        let loss = engine.compute_loss(&[0, 0, 0, 0], &[4, 0, 0, 0]).unwrap();
        assert!((loss - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn crossfade_requires_textures() {
        let mut engine = LoopbackEngine::new();
        assert!(engine.crossfade_generate(2, 2, 0.5, false).is_err());

        engine.set_crossfade_textures(vec![RED.to_vec()]).unwrap();
        let out = engine.crossfade_generate(2, 2, 0.5, false).unwrap();
        assert_eq!(out, [RED, RED, RED, RED].concat());
    }
}

//! Waveform rasterizer.
//!
//! Draws a downsampled absolute-value waveform as vertical bars: each
//! column samples one value from the input, background above the bar,
//! signal color below it. Defaults to a 1024x64 canvas, white over green.

use image::{Rgba, RgbaImage};

pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 64;

const BACKGROUND: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);
const SIGNAL: Rgba<u8> = Rgba([0x00, 0xff, 0x00, 0xff]);

/// Rasterize `samples` into a bar waveform of the given size.
///
/// Column `x` shows `|samples[floor(x / width * len)]|`, clamped to 1.0.
/// An all-zero (or empty) input produces a fully background image.
pub fn render_waveform(samples: &[f32], width: u32, height: u32) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(width, height, BACKGROUND);
    if samples.is_empty() {
        return image;
    }

    for x in 0..width {
        let idx = ((x as f64 / width as f64) * samples.len() as f64) as usize;
        let amp = samples[idx.min(samples.len() - 1)].abs().min(1.0);
        let bar = (height as f32 * amp).round() as u32;
        for y in height - bar..height {
            image.put_pixel(x, y, SIGNAL);
        }
    }

    image
}

/// Rasterize with the demo's default canvas size.
pub fn render_waveform_default(samples: &[f32]) -> RgbaImage {
    render_waveform(samples, DEFAULT_WIDTH, DEFAULT_HEIGHT)
}

/// Encode a rendered waveform as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut out = std::io::Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal_pixels(image: &RgbaImage) -> usize {
        image.pixels().filter(|&&p| p == SIGNAL).count()
    }

    #[test]
    fn silence_draws_no_signal_bars() {
        let image = render_waveform(&[0.0; 512], 64, 32);
        assert_eq!(signal_pixels(&image), 0);
    }

    #[test]
    fn empty_input_is_all_background() {
        let image = render_waveform(&[], 64, 32);
        assert_eq!(signal_pixels(&image), 0);
        assert_eq!(image.dimensions(), (64, 32));
    }

    #[test]
    fn full_scale_sample_fills_its_column() {
        let image = render_waveform(&[1.0], 4, 8);
        // every column maps to the single sample
        assert_eq!(signal_pixels(&image), 4 * 8);
    }

    #[test]
    fn bar_height_tracks_amplitude() {
        // constant half-scale signal: every column gets a half-height bar
        let image = render_waveform(&[0.5; 16], 8, 32);
        assert_eq!(signal_pixels(&image), 8 * 16);
        // bars hang from the bottom edge
        assert_eq!(*image.get_pixel(0, 31), SIGNAL);
        assert_eq!(*image.get_pixel(0, 0), BACKGROUND);
    }

    #[test]
    fn amplitudes_above_one_are_clamped() {
        let image = render_waveform(&[4.0; 4], 4, 8);
        assert_eq!(signal_pixels(&image), 4 * 8);
    }

    #[test]
    fn encodes_png() {
        let image = render_waveform(&[0.25; 32], 16, 8);
        let png = encode_png(&image).expect("png");
        assert_eq!(&png[1..4], b"PNG");
    }
}

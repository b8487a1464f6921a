use super::OutputSink;
use anyhow::{Context, Result};
use image::{imageops, Rgb, RgbImage, RgbaImage};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, FourCC};

/// Presents the render target on a v4l2loopback device, so the overlay can be
/// picked up as a virtual camera.
pub struct V4L2Output {
    _device: Device,
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;

        let mut format = Output::format(&device).context("Failed to query output format")?;
        format.width = width;
        format.height = height;
        format.fourcc = FourCC::new(b"YUYV");
        let applied = Output::set_format(&device, &format).context("Failed to set output format")?;
        tracing::debug!(
            "Loopback format: {}x{} {}",
            applied.width,
            applied.height,
            applied.fourcc
        );

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            _device: device,
            file,
            width,
            height,
        })
    }

    /// Transparent regions of the render target present as black.
    fn flatten(frame: &RgbaImage) -> RgbImage {
        RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
            let p = frame.get_pixel(x, y);
            let a = p[3] as u16;
            let scale = |c: u8| ((c as u16 * a + 127) / 255) as u8;
            Rgb([scale(p[0]), scale(p[1]), scale(p[2])])
        })
    }

    /// Convert RGB frame to YUV422 (YUYV) format
    fn rgb_to_yuyv(rgb_image: &RgbImage) -> Vec<u8> {
        let (width, height) = rgb_image.dimensions();
        let mut yuyv = Vec::with_capacity((width * height * 2) as usize);

        for y in 0..height {
            for x in (0..width).step_by(2) {
                let pixel1 = rgb_image.get_pixel(x, y);
                let pixel2 = if x + 1 < width {
                    rgb_image.get_pixel(x + 1, y)
                } else {
                    pixel1
                };

                let (y1, u1, v1) = rgb_to_yuv(pixel1[0], pixel1[1], pixel1[2]);
                let (y2, u2, v2) = rgb_to_yuv(pixel2[0], pixel2[1], pixel2[2]);

                // Chroma is shared by each pixel pair
                let u = ((u1 as u16 + u2 as u16) / 2) as u8;
                let v = ((v1 as u16 + v2 as u16) / 2) as u8;

                yuyv.extend_from_slice(&[y1, u, y2, v]);
            }
        }

        yuyv
    }
}

/// Convert RGB to YUV color space
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl OutputSink for V4L2Output {
    fn present(&mut self, frame: &RgbaImage) -> Result<()> {
        let mut rgb = Self::flatten(frame);
        if rgb.dimensions() != (self.width, self.height) {
            rgb = imageops::resize(
                &rgb,
                self.width,
                self.height,
                imageops::FilterType::Triangle,
            );
        }

        let yuyv_data = Self::rgb_to_yuyv(&rgb);

        self.file
            .write_all(&yuyv_data)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn transparent_pixels_flatten_to_black() {
        let mut frame = RgbaImage::from_pixel(2, 1, Rgba([200, 100, 50, 255]));
        frame.put_pixel(1, 0, Rgba([200, 100, 50, 0]));

        let flat = V4L2Output::flatten(&frame);
        assert_eq!(flat.get_pixel(0, 0), &Rgb([200, 100, 50]));
        assert_eq!(flat.get_pixel(1, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn yuyv_packs_two_pixels_in_four_bytes() {
        let rgb = RgbImage::from_pixel(4, 2, Rgb([0, 0, 0]));
        let yuyv = V4L2Output::rgb_to_yuyv(&rgb);
        assert_eq!(yuyv.len(), 4 * 2 * 2);
        assert_eq!(&yuyv[..4], &[0, 128, 0, 128]);
    }

    #[test]
    fn white_has_full_luma() {
        let (y, _, _) = rgb_to_yuv(255, 255, 255);
        assert!(y >= 254);
    }
}

use anyhow::{bail, Context, Result};
use image::RgbImage;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

const RGB3: &[u8; 4] = b"RGB3";
const YUYV: &[u8; 4] = b"YUYV";
const MJPG: &[u8; 4] = b"MJPG";
const GREY: &[u8; 4] = b"GREY";

/// V4L2 capture device producing RGB frames. The device is released when the
/// camera is dropped.
pub struct Camera {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    fourcc: FourCC,
}

impl Camera {
    pub fn open(device: &str) -> Result<Self> {
        let dev = Device::with_path(device).with_context(|| format!("open camera {}", device))?;
        let mut fmt = dev.format().context("get format")?;
        // Prefer RGB, then YUYV, else keep whatever the driver gives us
        for preferred in [RGB3, YUYV] {
            if fmt.fourcc == FourCC::new(preferred) {
                break;
            }
            let desired = Format::new(fmt.width, fmt.height, FourCC::new(preferred));
            fmt = dev.set_format(&desired).unwrap_or(fmt);
        }
        log::debug!(
            "camera {}: {}x{} {:?}",
            device,
            fmt.width,
            fmt.height,
            fmt.fourcc
        );
        let stream = Stream::with_buffers(&dev, Type::VideoCapture, 4).context("stream")?;
        Ok(Self {
            stream,
            width: fmt.width,
            height: fmt.height,
            fourcc: fmt.fourcc,
        })
    }

    pub fn frame(&mut self) -> Result<RgbImage> {
        let (data, meta) = self.stream.next().context("capture frame")?;
        log::debug!(
            "captured frame: seq={} len={} fourcc={:?}",
            meta.sequence,
            data.len(),
            self.fourcc
        );
        convert_frame(self.fourcc, self.width, self.height, data)
    }
}

/// Convert a raw driver buffer into an RGB image.
pub fn convert_frame(fourcc: FourCC, width: u32, height: u32, data: &[u8]) -> Result<RgbImage> {
    if fourcc == FourCC::new(MJPG) {
        return Ok(image::load_from_memory(data)
            .context("decode MJPG frame")?
            .to_rgb8());
    }

    let mut buf = if fourcc == FourCC::new(RGB3) {
        data.to_vec()
    } else if fourcc == FourCC::new(YUYV) {
        yuyv_to_rgb(width, height, data)?
    } else if fourcc == FourCC::new(GREY) {
        grey_to_rgb(width, height, data)?
    } else {
        bail!("unsupported pixel format {:?}", fourcc);
    };

    let expected = (width * height * 3) as usize;
    if buf.len() < expected {
        bail!(
            "buffer too small: got {}, expected {} (fourcc {:?})",
            buf.len(),
            expected,
            fourcc
        );
    }
    buf.truncate(expected);
    RgbImage::from_raw(width, height, buf).context("failed to build image buffer")
}

fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        bail!("short YUYV buffer");
    }
    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0] as f32, chunk[2] as f32] {
            out.push(clamp(y + 1.402 * v));
            out.push(clamp(y - 0.344136 * u - 0.714136 * v));
            out.push(clamp(y + 1.772 * u));
        }
    }
    Ok(out)
}

fn clamp(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

fn grey_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height) as usize;
    if data.len() < expected {
        bail!("short GREY buffer");
    }
    Ok(data[..expected].iter().flat_map(|&y| [y, y, y]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_neutral_chroma_is_grey() {
        // Two pixels, Y=100 and Y=200, no chroma.
        let data = [100, 128, 200, 128];
        let img = convert_frame(FourCC::new(YUYV), 2, 1, &data).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [100, 100, 100]);
        assert_eq!(img.get_pixel(1, 0).0, [200, 200, 200]);
    }

    #[test]
    fn test_grey_expands_channels() {
        let img = convert_frame(FourCC::new(GREY), 2, 2, &[1, 2, 3, 4]).unwrap();
        assert_eq!(img.get_pixel(1, 1).0, [4, 4, 4]);
    }

    #[test]
    fn test_rgb_truncates_oversized_buffer() {
        let data = [9u8; 7];
        let img = convert_frame(FourCC::new(RGB3), 2, 1, &data).unwrap();
        assert_eq!(img.dimensions(), (2, 1));
    }

    #[test]
    fn test_short_buffer_is_error() {
        assert!(convert_frame(FourCC::new(RGB3), 4, 4, &[0; 10]).is_err());
        assert!(convert_frame(FourCC::new(YUYV), 4, 4, &[0; 10]).is_err());
    }

    #[test]
    fn test_unknown_format_is_error() {
        assert!(convert_frame(FourCC::new(b"H264"), 1, 1, &[0; 3]).is_err());
    }
}

// src/video.rs - Frame sources
use crate::error::{Result, TrackerError};
use image::{DynamicImage, RgbImage};
use std::time::{Duration, Instant};

/// One captured image and its position in the stream.
#[derive(Clone)]
pub struct Frame {
    pub image: DynamicImage,
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: DynamicImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    pub fn blank(width: u32, height: u32, sequence: u64) -> Self {
        Self::new(DynamicImage::ImageRgb8(RgbImage::new(width, height)), sequence)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Anything frames can be pulled from. A read error is a camera fault.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<Frame>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self) -> Result<Frame> {
        (**self).read_frame()
    }
}

/// Produces black frames at a steady rate. Pairs with
/// [`crate::detector::LandmarkReplay`] when no camera is attached.
pub struct BlankSource {
    width: u32,
    height: u32,
    interval: Option<Duration>,
    limit: Option<u64>,
    sequence: u64,
    last: Option<Instant>,
}

impl BlankSource {
    /// `fps` of zero disables pacing.
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            interval: (fps > 0).then(|| Duration::from_secs_f64(1.0 / fps as f64)),
            limit: None,
            sequence: 0,
            last: None,
        }
    }

    /// Fails like an unplugged camera after `frames` reads.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }
}

impl FrameSource for BlankSource {
    fn read_frame(&mut self) -> Result<Frame> {
        if self.limit.is_some_and(|limit| self.sequence >= limit) {
            return Err(TrackerError::CameraFault("end of stream".into()));
        }

        if let (Some(interval), Some(last)) = (self.interval, self.last) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last = Some(Instant::now());

        let frame = Frame::blank(self.width, self.height, self.sequence);
        self.sequence += 1;
        Ok(frame)
    }
}

#[cfg(feature = "camera")]
pub use native::Camera;

#[cfg(feature = "camera")]
mod native {
    use super::{Frame, FrameSource};
    use crate::error::{Result, TrackerError};
    use image::{DynamicImage, RgbImage};
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    };

    /// Native camera through nokhwa. Frames are mirrored so the user sees
    /// themselves as in a mirror.
    pub struct Camera {
        camera: nokhwa::Camera,
        sequence: u64,
    }

    impl Camera {
        pub fn open(index: u32, width: u32, height: u32, fps: u32) -> Result<Self> {
            tracing::debug!(index, width, height, fps, "opening camera");

            let format = CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, fps);
            let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

            let camera = nokhwa::Camera::new(CameraIndex::Index(index), requested)
                .map_err(|e| TrackerError::CameraFault(format!("failed to open camera {index}: {e}")))?;

            tracing::info!(index, name = %camera.info().human_name(), "camera opened");
            Ok(Self { camera, sequence: 0 })
        }

        pub fn resolution(&self) -> (u32, u32) {
            let resolution = self.camera.resolution();
            (resolution.width(), resolution.height())
        }
    }

    impl FrameSource for Camera {
        fn read_frame(&mut self) -> Result<Frame> {
            if !self.camera.is_stream_open() {
                self.camera
                    .open_stream()
                    .map_err(|e| TrackerError::CameraFault(format!("failed to open stream: {e}")))?;
            }

            let buffer = self
                .camera
                .frame()
                .map_err(|e| TrackerError::CameraFault(format!("failed to capture frame: {e}")))?;
            let decoded = buffer
                .decode_image::<RgbFormat>()
                .map_err(|e| TrackerError::CameraFault(format!("failed to decode frame: {e}")))?;

            let (width, height) = (decoded.width(), decoded.height());
            let image = RgbImage::from_raw(width, height, decoded.into_vec())
                .ok_or_else(|| TrackerError::CameraFault("frame buffer size mismatch".into()))?;
            let flipped = image::imageops::flip_horizontal(&image);

            let frame = Frame::new(DynamicImage::ImageRgb8(flipped), self.sequence);
            self.sequence += 1;
            Ok(frame)
        }
    }

    impl Drop for Camera {
        fn drop(&mut self) {
            let _ = self.camera.stop_stream();
        }
    }
}

use std::sync::Arc;
use std::time::SystemTime;

/// Sensor resolution in pixels
pub const FRAME_WIDTH: u32 = 160;
pub const FRAME_HEIGHT: u32 = 60;

/// Upper bound (exclusive) of a real distance reading in millimeters
pub const SENTINEL_LOW: u16 = 65000;
/// Pixel amplitude too low to measure
pub const LOW_AMPLITUDE: u16 = 65001;
/// Pixel saturated
pub const SATURATION: u16 = 65002;
/// ADC overflow on the pixel
pub const ADC_OVERFLOW: u16 = 65003;
/// Reading flagged invalid by the device
pub const INVALID_DATA: u16 = 65004;

/// Validity predicate applied to raw distance samples
pub trait PixelFilter: Send + Sync {
    fn is_valid(&self, raw: u16) -> bool;
}

impl<F> PixelFilter for F
where
    F: Fn(u16) -> bool + Send + Sync,
{
    fn is_valid(&self, raw: u16) -> bool {
        self(raw)
    }
}

/// Default predicate: a reading in (0, 65000) that is none of the sentinel codes
#[derive(Debug, Clone, Copy, Default)]
pub struct SentinelFilter;

impl PixelFilter for SentinelFilter {
    fn is_valid(&self, raw: u16) -> bool {
        raw > 0
            && raw < SENTINEL_LOW
            && raw != LOW_AMPLITUDE
            && raw != SATURATION
            && raw != ADC_OVERFLOW
            && raw != INVALID_DATA
    }
}

/// One full depth capture
#[derive(Debug, Clone)]
pub struct Frame {
    /// Capture generation, strictly increasing per sensor link
    pub id: u64,
    /// Timestamp when the frame was captured
    pub timestamp: SystemTime,
    /// Raw distance samples, row-major (shared ownership for cheap snapshots)
    pub data: Arc<Vec<u16>>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(id: u64, timestamp: SystemTime, data: Vec<u16>, width: u32, height: u32) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
        }
    }

    /// Frame of the given size with every pixel set to `value`
    pub fn filled(id: u64, width: u32, height: u32, value: u16) -> Self {
        Self::new(
            id,
            SystemTime::now(),
            vec![value; width as usize * height as usize],
            width,
            height,
        )
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether the buffer matches the declared dimensions
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_len()
    }

    /// Raw value at (x, y), `None` outside the frame
    pub fn pixel(&self, x: i64, y: i64) -> Option<u16> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Iterate `(x, y, raw)` over pixels accepted by `filter`, row-major
    pub fn valid_pixels<'a>(
        &'a self,
        filter: &'a dyn PixelFilter,
    ) -> impl Iterator<Item = (u32, u32, u16)> + 'a {
        let width = self.width.max(1);
        self.data
            .iter()
            .enumerate()
            .filter(move |(_, raw)| filter.is_valid(**raw))
            .map(move |(index, raw)| {
                let index = index as u32;
                (index % width, index / width, *raw)
            })
    }

    /// Seconds since the unix epoch at capture time
    pub fn unix_timestamp(&self) -> u64 {
        self.timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

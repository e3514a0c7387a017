use super::interface::{
    CaptureEvent, DepthSensor, RawCapture, SensorEvent, SensorEventHandler, SensorPort,
};
use crate::config::FilterSettings;
use crate::error::SensorError;
use crate::frame::{FRAME_HEIGHT, FRAME_WIDTH};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::Instant;

/// Scripted outcome of one capture
#[derive(Debug, Clone)]
pub enum MockCapture {
    Frame(Vec<u16>),
    Error(SensorError),
    /// Never completes; exercises the capture timeout
    Hang,
}

#[derive(Default)]
struct MockState {
    connected: bool,
    streaming: bool,
    unreachable: bool,
    connect_script: VecDeque<Result<(), SensorError>>,
    capture_script: VecDeque<MockCapture>,
    default_frame: Option<Vec<u16>>,
    handler: Option<SensorEventHandler>,
    connect_calls: u32,
    disconnect_calls: u32,
    start_calls: u32,
    stop_calls: u32,
    capture_times: Vec<Instant>,
    filters_applied: u32,
}

/// Scriptable in-memory sensor for exercising the acquisition path
pub struct MockSensor {
    state: Arc<Mutex<MockState>>,
}

/// Test-side view of a [`MockSensor`] moved into a link
#[derive(Clone)]
pub struct MockSensorHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockSensor {
    /// Sensor returning a full frame filled with `value` on every capture
    pub fn uniform(value: u16) -> (Self, MockSensorHandle) {
        let (sensor, handle) = Self::new();
        handle.set_default_frame(vec![value; (FRAME_WIDTH * FRAME_HEIGHT) as usize]);
        (sensor, handle)
    }

    /// Sensor with no default frame; unscripted captures fail
    pub fn new() -> (Self, MockSensorHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockSensorHandle { state },
        )
    }
}

impl MockSensorHandle {
    pub fn set_default_frame(&self, data: Vec<u16>) {
        self.state.lock().default_frame = Some(data);
    }

    /// Queue a capture outcome ahead of the default frame
    pub fn push_capture(&self, capture: MockCapture) {
        self.state.lock().capture_script.push_back(capture);
    }

    pub fn push_capture_errors(&self, count: usize) {
        let mut state = self.state.lock();
        for i in 0..count {
            state.capture_script.push_back(MockCapture::Error(SensorError::CaptureFailed {
                details: format!("scripted failure {}", i + 1),
            }));
        }
    }

    /// Queue a connect outcome; unscripted connects succeed unless unreachable
    pub fn push_connect(&self, result: Result<(), SensorError>) {
        self.state.lock().connect_script.push_back(result);
    }

    /// Make every connect fail and drop any open connection
    pub fn set_unreachable(&self, unreachable: bool) {
        let mut state = self.state.lock();
        state.unreachable = unreachable;
        if unreachable {
            state.connected = false;
            state.streaming = false;
        }
    }

    /// Simulate the device vanishing without an event
    pub fn drop_connection(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.streaming = false;
    }

    /// Invoke the registered callback as the driver would
    pub fn fire_event(&self, event: SensorEvent) {
        let handler = self.state.lock().handler.clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    pub fn connect_calls(&self) -> u32 {
        self.state.lock().connect_calls
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.state.lock().disconnect_calls
    }

    pub fn start_calls(&self) -> u32 {
        self.state.lock().start_calls
    }

    pub fn stop_calls(&self) -> u32 {
        self.state.lock().stop_calls
    }

    pub fn capture_calls(&self) -> usize {
        self.state.lock().capture_times.len()
    }

    /// Instants at which captures were attempted
    pub fn capture_times(&self) -> Vec<Instant> {
        self.state.lock().capture_times.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn is_streaming(&self) -> bool {
        self.state.lock().streaming
    }

    pub fn has_event_handler(&self) -> bool {
        self.state.lock().handler.is_some()
    }

    pub fn filters_applied(&self) -> u32 {
        self.state.lock().filters_applied
    }
}

#[async_trait]
impl DepthSensor for MockSensor {
    async fn connect(&mut self, port: &SensorPort) -> Result<(), SensorError> {
        let mut state = self.state.lock();
        state.connect_calls += 1;
        let result = match state.connect_script.pop_front() {
            Some(result) => result,
            None if state.unreachable => Err(SensorError::ConnectFailed {
                port: port.to_string(),
                details: "device unreachable".to_string(),
            }),
            None => Ok(()),
        };
        state.connected = result.is_ok();
        result
    }

    async fn disconnect(&mut self) -> Result<(), SensorError> {
        let mut state = self.state.lock();
        state.disconnect_calls += 1;
        state.connected = false;
        state.streaming = false;
        Ok(())
    }

    async fn start_streaming(&mut self) -> Result<(), SensorError> {
        let mut state = self.state.lock();
        state.start_calls += 1;
        if !state.connected {
            return Err(SensorError::NotConnected);
        }
        state.streaming = true;
        Ok(())
    }

    async fn stop_streaming(&mut self) -> Result<(), SensorError> {
        let mut state = self.state.lock();
        state.stop_calls += 1;
        state.streaming = false;
        Ok(())
    }

    async fn single_capture(&mut self) -> Result<RawCapture, SensorError> {
        let next = {
            let mut state = self.state.lock();
            state.capture_times.push(Instant::now());
            if !state.connected {
                return Err(SensorError::NotConnected);
            }
            match state.capture_script.pop_front() {
                Some(capture) => capture,
                None => match &state.default_frame {
                    Some(data) => MockCapture::Frame(data.clone()),
                    None => MockCapture::Error(SensorError::CaptureFailed {
                        details: "no frame scripted".to_string(),
                    }),
                },
            }
        };

        match next {
            MockCapture::Frame(data) => Ok(RawCapture {
                event: CaptureEvent::FullDepth,
                width: FRAME_WIDTH,
                height: FRAME_HEIGHT,
                data,
            }),
            MockCapture::Error(e) => Err(e),
            MockCapture::Hang => std::future::pending().await,
        }
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn device_version(&self) -> Option<String> {
        Some("mock 1.0".to_string())
    }

    fn serial_number(&self) -> Option<String> {
        Some("MOCK-0001".to_string())
    }

    async fn apply_filters(&mut self, _filters: &FilterSettings) -> Result<(), SensorError> {
        self.state.lock().filters_applied += 1;
        Ok(())
    }

    fn register_event_handler(&mut self, handler: SensorEventHandler) {
        self.state.lock().handler = Some(handler);
    }
}

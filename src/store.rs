use crate::frame::Frame;
use crate::sampler::{PointMeasurement, SamplePoint};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Latest frame and per-point measurements, guarded by one lock so readers
/// always see measurements paired with the frame they came from.
///
/// The acquisition loop is the only writer. The lock is held for the swap or
/// the copy only; sampling happens on a caller-owned frame outside it.
#[derive(Debug)]
pub struct MeasurementStore {
    inner: Mutex<StoreState>,
    commits: AtomicU64,
}

#[derive(Debug)]
struct StoreState {
    frame: Option<Frame>,
    measurements: Vec<PointMeasurement>,
}

/// Consistent copy of the store contents
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub frame: Option<Frame>,
    pub measurements: Vec<PointMeasurement>,
}

/// Exclusive write access; both fields become visible together on drop
pub struct StoreUpdate<'a> {
    state: MutexGuard<'a, StoreState>,
    commits: &'a AtomicU64,
}

impl StoreUpdate<'_> {
    /// Replace the frame wholesale
    pub fn replace_frame(&mut self, frame: Frame) {
        self.state.frame = Some(frame);
    }

    /// Replace the per-point measurements
    pub fn update_measurements(&mut self, measurements: Vec<PointMeasurement>) {
        self.state.measurements = measurements;
    }
}

impl Drop for StoreUpdate<'_> {
    fn drop(&mut self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }
}

impl MeasurementStore {
    /// Create a store with an unmeasured entry for every configured point
    pub fn new(points: &[SamplePoint]) -> Self {
        Self {
            inner: Mutex::new(StoreState {
                frame: None,
                measurements: points.iter().map(PointMeasurement::unmeasured).collect(),
            }),
            commits: AtomicU64::new(0),
        }
    }

    /// Lock the store for a combined frame + measurement update
    pub fn begin_update(&self) -> StoreUpdate<'_> {
        StoreUpdate {
            state: self.inner.lock(),
            commits: &self.commits,
        }
    }

    /// Publish one acquisition cycle's results atomically
    pub fn commit(&self, frame: Frame, measurements: Vec<PointMeasurement>) {
        let frame_id = frame.id;
        let mut update = self.begin_update();
        update.replace_frame(frame);
        update.update_measurements(measurements);
        drop(update);
        trace!("Committed frame {} to measurement store", frame_id);
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.inner.lock();
        StoreSnapshot {
            frame: state.frame.clone(),
            measurements: state.measurements.clone(),
        }
    }

    /// Copy of the current measurements only
    pub fn measurements(&self) -> Vec<PointMeasurement> {
        self.inner.lock().measurements.clone()
    }

    pub fn latest_frame(&self) -> Option<Frame> {
        self.inner.lock().frame.clone()
    }

    /// Number of completed updates
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FRAME_HEIGHT, FRAME_WIDTH};
    use std::sync::Arc;
    use std::thread;

    fn points() -> Vec<SamplePoint> {
        vec![
            SamplePoint::new("point_1", 40, 30),
            SamplePoint::new("point_2", 120, 30),
        ]
    }

    fn measurements_for(frame: &Frame, points: &[SamplePoint]) -> Vec<PointMeasurement> {
        points
            .iter()
            .map(|p| {
                let mut m = PointMeasurement::unmeasured(p);
                m.frame_id = frame.id;
                m.distance_mm = frame.data[0] as f64;
                m.valid = true;
                m
            })
            .collect()
    }

    #[test]
    fn test_new_store_has_unmeasured_points() {
        let store = MeasurementStore::new(&points());
        let snapshot = store.snapshot();

        assert!(snapshot.frame.is_none());
        assert_eq!(snapshot.measurements.len(), 2);
        assert!(snapshot.measurements.iter().all(|m| !m.valid));
        assert_eq!(store.commit_count(), 0);
    }

    #[test]
    fn test_commit_replaces_both() {
        let points = points();
        let store = MeasurementStore::new(&points);
        let frame = Frame::filled(5, FRAME_WIDTH, FRAME_HEIGHT, 1234);
        let measurements = measurements_for(&frame, &points);

        store.commit(frame, measurements);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.frame.as_ref().map(|f| f.id), Some(5));
        assert!(snapshot.measurements.iter().all(|m| m.frame_id == 5));
        assert_eq!(store.commit_count(), 1);
        assert_eq!(store.latest_frame().map(|f| f.id), Some(5));
    }

    #[test]
    fn test_snapshot_never_torn() {
        const ITERATIONS: u64 = 2_000;

        let points = Arc::new(points());
        let store = Arc::new(MeasurementStore::new(&points));

        let writer = {
            let store = Arc::clone(&store);
            let points = Arc::clone(&points);
            thread::spawn(move || {
                for generation in 1..=ITERATIONS {
                    let frame = Frame::filled(generation, 16, 4, generation as u16);
                    let measurements = measurements_for(&frame, &points);
                    store.commit(frame, measurements);
                }
            })
        };

        let reader = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut observed = 0u64;
                let mut last_generation = 0u64;
                while last_generation < ITERATIONS {
                    let snapshot = store.snapshot();
                    let Some(frame) = snapshot.frame else {
                        continue;
                    };
                    for m in &snapshot.measurements {
                        assert_eq!(m.frame_id, frame.id, "measurement from another frame");
                        assert_eq!(m.distance_mm, frame.data[0] as f64);
                    }
                    assert!(frame.id >= last_generation, "generation went backwards");
                    last_generation = frame.id;
                    observed += 1;
                }
                observed
            })
        };

        writer.join().unwrap();
        let observed = reader.join().unwrap();
        assert!(observed > 0);
        assert_eq!(store.commit_count(), ITERATIONS);
    }

    #[test]
    fn test_partial_update_visible_only_after_drop() {
        let points = points();
        let store = MeasurementStore::new(&points);

        let frame = Frame::filled(1, FRAME_WIDTH, FRAME_HEIGHT, 10);
        let measurements = measurements_for(&frame, &points);
        {
            let mut update = store.begin_update();
            update.replace_frame(frame);
            assert!(store.inner.try_lock().is_none());
            update.update_measurements(measurements);
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.frame.map(|f| f.id), Some(1));
        assert!(snapshot.measurements.iter().all(|m| m.frame_id == 1));
    }
}

//! Simulated DA source for dry runs and tests.
//!
//! Stands in for a real DA server: a small plant namespace with drifting
//! gauges, toggling booleans and writable setpoints. Real transports plug
//! in behind the same [`DaSource`] trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use dabridge_common::{Quality, Reading, TagPath, TagValue};
use dabridge_engine::{DaSource, ReadError, WriteError};

/// Chance that a read comes back with uncertain quality.
const UNCERTAIN_RATE: f64 = 0.02;

enum SimPoint {
    /// Numeric value drifting around its origin.
    Gauge { value: f64, origin: f64 },
    /// Boolean that occasionally flips.
    Toggle(bool),
    /// Fixed text value.
    Label(String),
    /// Writable value, returned as last written.
    Setpoint(TagValue),
}

struct SimInner {
    rng: SmallRng,
    points: HashMap<TagPath, SimPoint>,
}

/// In-process simulation of a DA tag server.
pub struct SimulatedSource {
    tags: Vec<TagPath>,
    inner: Mutex<SimInner>,
}

impl SimulatedSource {
    /// Build the simulated namespace under `root` (e.g. the ProgID).
    pub fn new(root: &str, seed: u64) -> Self {
        let mut points = HashMap::new();
        let mut tags = Vec::new();

        let mut add = |path: String, point: SimPoint| {
            let tag = TagPath::new(path).expect("simulated tag paths are non-empty");
            tags.push(tag.clone());
            points.insert(tag, point);
        };

        for line in ["line1", "line2"] {
            add(
                format!("{}/{}/temp", root, line),
                SimPoint::Gauge { value: 21.0, origin: 21.0 },
            );
            add(
                format!("{}/{}/pressure", root, line),
                SimPoint::Gauge { value: 4.2, origin: 4.2 },
            );
            add(
                format!("{}/{}/rpm", root, line),
                SimPoint::Gauge { value: 1480.0, origin: 1480.0 },
            );
            add(format!("{}/{}/running", root, line), SimPoint::Toggle(true));
            add(
                format!("{}/{}/temp_setpoint", root, line),
                SimPoint::Setpoint(TagValue::Number(22.0)),
            );
        }
        add(format!("{}/plant/mode", root), SimPoint::Label("auto".to_string()));

        Self {
            tags,
            inner: Mutex::new(SimInner {
                rng: SmallRng::seed_from_u64(seed),
                points,
            }),
        }
    }

    /// All tags in the namespace, in a stable order.
    pub fn tags(&self) -> &[TagPath] {
        &self.tags
    }
}

#[async_trait]
impl DaSource for SimulatedSource {
    async fn discover(&self, prefix: &str) -> Result<Vec<TagPath>, ReadError> {
        Ok(self
            .tags
            .iter()
            .filter(|t| t.as_str().starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn read(&self, tag: &TagPath) -> Result<Reading, ReadError> {
        let mut inner = self.inner.lock().unwrap();
        let inner = &mut *inner;

        let Some(point) = inner.points.get_mut(tag) else {
            return Err(ReadError::TagNotFound(tag.clone()));
        };

        let value = match point {
            SimPoint::Gauge { value, origin } => {
                // Random walk pulled gently back to the origin.
                let step = inner.rng.random_range(-0.5..0.5);
                *value += step + (*origin - *value) * 0.05;
                TagValue::Number((*value * 100.0).round() / 100.0)
            }
            SimPoint::Toggle(state) => {
                if inner.rng.random_bool(0.05) {
                    *state = !*state;
                }
                TagValue::Boolean(*state)
            }
            SimPoint::Label(text) => TagValue::Text(text.clone()),
            SimPoint::Setpoint(value) => value.clone(),
        };

        let quality = if inner.rng.random_bool(UNCERTAIN_RATE) {
            Quality::Uncertain
        } else {
            Quality::Good
        };

        Ok(Reading::new(tag.clone(), value, quality))
    }

    fn supports_write(&self) -> bool {
        true
    }

    async fn write(&self, tag: &TagPath, value: &TagValue) -> Result<(), WriteError> {
        let mut inner = self.inner.lock().unwrap();

        match inner.points.get_mut(tag) {
            Some(SimPoint::Setpoint(current)) => {
                if value.is_null() {
                    return Err(WriteError::Rejected("null is not a writable value".into()));
                }
                *current = value.clone();
                Ok(())
            }
            Some(_) => Err(WriteError::Rejected(format!(
                "tag '{}' is read-only on the source",
                tag
            ))),
            None => Err(WriteError::Rejected(format!("tag '{}' does not exist", tag))),
        }
    }
}

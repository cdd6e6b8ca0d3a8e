/// Latest-value magnitude tracking per sensor channel.

use crate::sensor::{Channel, Sample};

/// Euclidean norm of a 3-axis reading.
pub fn magnitude(x: f64, y: f64, z: f64) -> f64 {
    x.hypot(y).hypot(z)
}

/// Most recent magnitude seen on each channel, `None` until the first reading.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Magnitudes {
    pub accel: Option<f64>,
    pub gyro: Option<f64>,
}

#[derive(Debug, Default)]
pub struct Ingestor {
    latest: Magnitudes,
    accel_samples: u64,
    gyro_samples: u64,
    ignored: u64,
}

impl Ingestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the channel's magnitude with this reading.
    /// Returns the new magnitude, or `None` if the reading was unusable.
    pub fn ingest(&mut self, sample: &Sample) -> Option<f64> {
        if !(sample.x.is_finite() && sample.y.is_finite() && sample.z.is_finite()) {
            self.ignored += 1;
            return None;
        }

        let mag = magnitude(sample.x, sample.y, sample.z);
        if !mag.is_finite() {
            self.ignored += 1;
            return None;
        }
        match sample.channel {
            Channel::Accelerometer => {
                self.latest.accel = Some(mag);
                self.accel_samples += 1;
            }
            Channel::Gyroscope => {
                self.latest.gyro = Some(mag);
                self.gyro_samples += 1;
            }
        }
        Some(mag)
    }

    pub fn magnitudes(&self) -> Magnitudes {
        self.latest
    }

    /// (accelerometer, gyroscope, ignored) sample counts.
    pub fn counts(&self) -> (u64, u64, u64) {
        (self.accel_samples, self.gyro_samples, self.ignored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(channel: Channel, x: f64, y: f64, z: f64) -> Sample {
        Sample { channel, x, y, z }
    }

    #[test]
    fn magnitude_is_euclidean_norm() {
        assert_eq!(magnitude(3.0, 4.0, 0.0), 5.0);
        assert_eq!(magnitude(0.0, 0.0, -9.0), 9.0);
        assert_eq!(magnitude(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn channels_are_tracked_independently() {
        let mut ing = Ingestor::new();
        assert_eq!(ing.magnitudes(), Magnitudes::default());

        ing.ingest(&sample(Channel::Accelerometer, 3.0, 4.0, 0.0));
        ing.ingest(&sample(Channel::Gyroscope, 0.0, 1.0, 0.0));
        let m = ing.magnitudes();
        assert_eq!(m.accel, Some(5.0));
        assert_eq!(m.gyro, Some(1.0));
    }

    #[test]
    fn newer_reading_overwrites_older() {
        let mut ing = Ingestor::new();
        ing.ingest(&sample(Channel::Accelerometer, 30.0, 0.0, 0.0));
        ing.ingest(&sample(Channel::Accelerometer, 0.0, 9.8, 0.0));
        assert_eq!(ing.magnitudes().accel, Some(9.8));
        assert_eq!(ing.counts(), (2, 0, 0));
    }

    #[test]
    fn non_finite_reading_is_ignored() {
        let mut ing = Ingestor::new();
        ing.ingest(&sample(Channel::Accelerometer, 0.0, 9.8, 0.0));
        assert_eq!(
            ing.ingest(&sample(Channel::Accelerometer, f64::NAN, 0.0, 0.0)),
            None
        );
        assert_eq!(
            ing.ingest(&sample(Channel::Gyroscope, f64::INFINITY, 0.0, 0.0)),
            None
        );
        assert_eq!(ing.magnitudes().accel, Some(9.8));
        assert_eq!(ing.magnitudes().gyro, None);
        assert_eq!(ing.counts(), (1, 0, 2));
    }

    #[test]
    fn large_axes_do_not_overflow_to_infinity() {
        let m = magnitude(1e200, 1e200, 1e200);
        assert!(m.is_finite());
        assert!((m / 1e200 - 3f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn reading_whose_magnitude_overflows_is_ignored() {
        let mut ing = Ingestor::new();
        let huge = sample(Channel::Accelerometer, f64::MAX, f64::MAX, f64::MAX);
        assert_eq!(ing.ingest(&huge), None);
        assert_eq!(ing.magnitudes().accel, None);
        assert_eq!(ing.counts(), (0, 0, 1));
    }
}

//! Moving average of core temperature.

use std::collections::VecDeque;

use innertemp_types::{TemperatureColor, round_to};

/// Number of readings the average covers.
pub const WINDOW_SIZE: usize = 100;

/// Bounded FIFO of the most recent valid core temperatures.
///
/// Non-positive readings are treated as sensor noise and never enter the
/// window. The exposed average is rounded to one decimal.
///
/// ```
/// use innertemp_core::RunningAverage;
///
/// let mut avg = RunningAverage::new();
/// avg.update(36.0);
/// avg.update(37.0);
/// avg.update(0.0);
/// assert_eq!(avg.average(), 36.5);
/// assert_eq!(avg.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct RunningAverage {
    readings: VecDeque<f64>,
    capacity: usize,
    average: f64,
}

impl Default for RunningAverage {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::with_capacity(WINDOW_SIZE)
    }

    /// Window of `capacity` readings (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
            average: 0.0,
        }
    }

    /// Add a reading and return the new average.
    pub fn update(&mut self, core_temperature: f64) -> f64 {
        if core_temperature <= 0.0 || !core_temperature.is_finite() {
            return self.average;
        }
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(core_temperature);

        let sum: f64 = self.readings.iter().sum();
        self.average = round_to(sum / self.readings.len() as f64, 1);
        self.average
    }

    /// Current average, `0.0` before the first valid reading.
    pub fn average(&self) -> f64 {
        self.average
    }

    /// Classification of the current average.
    pub fn color(&self) -> TemperatureColor {
        TemperatureColor::for_temperature(self.average)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Forget every reading.
    pub fn reset(&mut self) {
        self.readings.clear();
        self.average = 0.0;
    }
}

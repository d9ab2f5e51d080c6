use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::CongestionConfig;

/// Traffic-light congestion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Color {
    #[default]
    Green = 0,
    Yellow = 1,
    Red = 2,
}

impl Color {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Color::Green),
            1 => Some(Color::Yellow),
            2 => Some(Color::Red),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Green => write!(f, "green"),
            Color::Yellow => write!(f, "yellow"),
            Color::Red => write!(f, "red"),
        }
    }
}

/// Maps mean queue occupancy onto a color and remembers the last one so
/// that only changes are reported.
#[derive(Debug, Clone)]
pub struct CongestionMonitor {
    yellow_threshold: f64,
    red_threshold: f64,
    current: Color,
}

impl CongestionMonitor {
    pub fn new(config: &CongestionConfig) -> Self {
        Self {
            yellow_threshold: config.yellow_threshold,
            red_threshold: config.red_threshold,
            current: Color::Green,
        }
    }

    pub fn classify(&self, occupancy: f64) -> Color {
        if occupancy >= self.red_threshold {
            Color::Red
        } else if occupancy >= self.yellow_threshold {
            Color::Yellow
        } else {
            Color::Green
        }
    }

    /// Returns the new color if it differs from the previous evaluation.
    pub fn evaluate(&mut self, occupancy: f64) -> Option<Color> {
        let color = self.classify(occupancy);
        if color == self.current {
            return None;
        }
        self.current = color;
        Some(color)
    }

    pub fn current(&self) -> Color {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_partition_occupancy() {
        let monitor = CongestionMonitor::new(&CongestionConfig::default());
        assert_eq!(monitor.classify(0.0), Color::Green);
        assert_eq!(monitor.classify(0.49), Color::Green);
        assert_eq!(monitor.classify(0.5), Color::Yellow);
        assert_eq!(monitor.classify(0.79), Color::Yellow);
        assert_eq!(monitor.classify(0.8), Color::Red);
        assert_eq!(monitor.classify(1.0), Color::Red);
    }

    #[test]
    fn only_changes_are_reported() {
        let mut monitor = CongestionMonitor::new(&CongestionConfig::default());
        assert_eq!(monitor.evaluate(0.1), None);
        assert_eq!(monitor.evaluate(0.9), Some(Color::Red));
        assert_eq!(monitor.evaluate(0.95), None);
        assert_eq!(monitor.evaluate(0.6), Some(Color::Yellow));
        assert_eq!(monitor.current(), Color::Yellow);
    }

    #[test]
    fn wire_values_are_stable() {
        for color in [Color::Green, Color::Yellow, Color::Red] {
            assert_eq!(Color::from_u8(color as u8), Some(color));
        }
        assert_eq!(Color::from_u8(3), None);
    }
}

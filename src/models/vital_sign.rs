use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Vital-sign channels tracked for trend analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalChannel {
    Temperature,
    HeartRate,
    OxygenSaturation,
}

impl VitalChannel {
    pub const ALL: [VitalChannel; 3] = [
        VitalChannel::Temperature,
        VitalChannel::HeartRate,
        VitalChannel::OxygenSaturation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VitalChannel::Temperature => "temperature",
            VitalChannel::HeartRate => "heart_rate",
            VitalChannel::OxygenSaturation => "oxygen_saturation",
        }
    }

    /// Default unit for this channel.
    pub fn default_unit(self) -> &'static str {
        match self {
            VitalChannel::Temperature => "°C",
            VitalChannel::HeartRate => "bpm",
            VitalChannel::OxygenSaturation => "%",
        }
    }

    /// Relative change of the recent mean over the baseline mean beyond which
    /// the channel is trending. Body temperature moves in a narrow band, so a
    /// 5% shift (about 1.8 °C) already counts.
    pub fn change_threshold(self) -> f64 {
        match self {
            VitalChannel::Temperature => 0.05,
            VitalChannel::HeartRate | VitalChannel::OxygenSaturation => 0.10,
        }
    }

    /// Whether a rise in this channel signals clinical deterioration.
    /// Temperature and heart rate worsen upwards; SpO2 worsens downwards.
    pub fn rise_is_adverse(self) -> bool {
        match self {
            VitalChannel::Temperature | VitalChannel::HeartRate => true,
            VitalChannel::OxygenSaturation => false,
        }
    }
}

/// A single recorded set of vital signs. Immutable once recorded.
///
/// Every measurement is optional: bedside readings are frequently partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalReading {
    pub timestamp: NaiveDateTime,
    #[serde(default)]
    pub temperature: Option<f64>,
    /// "systolic/diastolic", e.g. "120/80".
    #[serde(default)]
    pub blood_pressure: Option<String>,
    #[serde(default)]
    pub heart_rate: Option<f64>,
    #[serde(default)]
    pub oxygen_saturation: Option<f64>,
    #[serde(default)]
    pub respiratory_rate: Option<f64>,
}

impl VitalReading {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            temperature: None,
            blood_pressure: None,
            heart_rate: None,
            oxygen_saturation: None,
            respiratory_rate: None,
        }
    }

    /// Value recorded for a trend channel, if any.
    pub fn channel_value(&self, channel: VitalChannel) -> Option<f64> {
        match channel {
            VitalChannel::Temperature => self.temperature,
            VitalChannel::HeartRate => self.heart_rate,
            VitalChannel::OxygenSaturation => self.oxygen_saturation,
        }
    }

    /// Parse the blood pressure string into (systolic, diastolic).
    pub fn blood_pressure_values(&self) -> Option<(f64, f64)> {
        let raw = self.blood_pressure.as_deref()?;
        let (sys, dia) = raw.split_once('/')?;
        let systolic = sys.trim().parse::<f64>().ok()?;
        let diastolic = dia
            .trim()
            .trim_end_matches("mmHg")
            .trim()
            .parse::<f64>()
            .ok()?;
        if systolic <= 0.0 || diastolic <= 0.0 {
            return None;
        }
        Some((systolic, diastolic))
    }

    pub fn systolic(&self) -> Option<f64> {
        self.blood_pressure_values().map(|(sys, _)| sys)
    }
}

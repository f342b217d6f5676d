//! Raw authentication signals: session-scoped bundle with a fixed,
//! enumerated set of optional signal kinds. Immutable once received.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of signal kinds a bundle may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    IpGeo,
    Gps,
    WifiBssid,
    Tls,
    DevicePosture,
    UserBehavior,
}

impl SignalKind {
    pub const ALL: [SignalKind; 6] = [
        SignalKind::IpGeo,
        SignalKind::Gps,
        SignalKind::WifiBssid,
        SignalKind::Tls,
        SignalKind::DevicePosture,
        SignalKind::UserBehavior,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::IpGeo => "ip_geo",
            SignalKind::Gps => "gps",
            SignalKind::WifiBssid => "wifi_bssid",
            SignalKind::Tls => "tls",
            SignalKind::DevicePosture => "device_posture",
            SignalKind::UserBehavior => "user_behavior",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpGeoSignal {
    pub ip: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GpsSignal {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiSignal {
    pub bssid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsSignal {
    /// JA3 fingerprint of the client handshake
    pub ja3: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePostureSignal {
    pub device_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserBehaviorSignal {
    #[serde(default)]
    pub requests_per_minute: f64,
    #[serde(default)]
    pub failed_attempts: u32,
    #[serde(default)]
    pub privilege_change: bool,
}

/// One authentication request's raw signals. Any subset may be absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalBundle {
    pub session_id: String,
    /// Declared traffic label (dataset ground truth); absent reads as benign.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_geo: Option<IpGeoSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps: Option<GpsSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi_bssid: Option<WifiSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_posture: Option<DevicePostureSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_behavior: Option<UserBehaviorSignal>,
}

impl SignalBundle {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            label: None,
            ip_geo: None,
            gps: None,
            wifi_bssid: None,
            tls: None,
            device_posture: None,
            user_behavior: None,
        }
    }

    pub fn present(&self, kind: SignalKind) -> bool {
        match kind {
            SignalKind::IpGeo => self.ip_geo.is_some(),
            SignalKind::Gps => self.gps.is_some(),
            SignalKind::WifiBssid => self.wifi_bssid.is_some(),
            SignalKind::Tls => self.tls.is_some(),
            SignalKind::DevicePosture => self.device_posture.is_some(),
            SignalKind::UserBehavior => self.user_behavior.is_some(),
        }
    }

    /// Label defaults to benign when absent, matching the upstream dataset.
    pub fn is_benign(&self) -> bool {
        match &self.label {
            None => true,
            Some(l) => l.trim().eq_ignore_ascii_case("benign"),
        }
    }

    pub fn label_upper(&self) -> String {
        self.label.as_deref().unwrap_or("BENIGN").to_uppercase()
    }
}

//! Enrichment lookups: IP geolocation, BSSID coordinates, JA3 threat tags,
//! device posture. Loaded once into an immutable in-memory snapshot; a table
//! that fails to load simply answers "not found" for its signal.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub city: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiAp {
    pub ssid: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePosture {
    pub os: Option<String>,
    #[serde(default)]
    pub patched: bool,
    /// Endpoint protection product, if any
    pub edr: Option<String>,
}

/// Read-only lookup interface consumed by the validator. The engine does not
/// own this data; tests substitute small fixed tables.
pub trait EnrichmentLookup: Send + Sync {
    fn geo_for_ip(&self, ip: &IpAddr) -> Option<GeoInfo>;
    fn ap_for_bssid(&self, bssid: &str) -> Option<WifiAp>;
    fn tag_for_ja3(&self, ja3: &str) -> Option<String>;
    fn posture_for_device(&self, device_id: &str) -> Option<DevicePosture>;
}

/// Which tables actually loaded; missing tables degrade to lookup misses.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TableStatus {
    pub geo: bool,
    pub wifi: bool,
    pub tls: bool,
    pub device: bool,
}

/// JSON-file-backed snapshot of all four tables.
pub struct EnrichmentTables {
    geo: HashMap<IpAddr, GeoInfo>,
    wifi: HashMap<String, WifiAp>,
    tls: HashMap<String, String>,
    devices: HashMap<String, DevicePosture>,
    status: TableStatus,
}

fn load_table<T: serde::de::DeserializeOwned>(path: &Path) -> Option<HashMap<String, T>> {
    if !path.is_file() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str(&data) {
            Ok(map) => Some(map),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "enrichment table unparseable, skipping");
                None
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "enrichment table unreadable, skipping");
            None
        }
    }
}

impl EnrichmentTables {
    /// Load `geoip.json`, `wifi.json`, `tls.json`, `devices.json` from `dir`.
    /// Missing or malformed files are tolerated: the corresponding signal
    /// will validate as "missing" rather than blocking startup.
    pub fn load(dir: &Path) -> Self {
        let mut status = TableStatus::default();

        let geo: HashMap<IpAddr, GeoInfo> = load_table::<GeoInfo>(&dir.join("geoip.json"))
            .map(|m| {
                m.into_iter()
                    .filter_map(|(k, v)| k.parse::<IpAddr>().ok().map(|ip| (ip, v)))
                    .collect()
            })
            .map(|m| {
                status.geo = true;
                m
            })
            .unwrap_or_default();

        let wifi: HashMap<String, WifiAp> = load_table::<WifiAp>(&dir.join("wifi.json"))
            .map(|m| {
                status.wifi = true;
                m.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect()
            })
            .unwrap_or_default();

        let tls: HashMap<String, String> = load_table::<String>(&dir.join("tls.json"))
            .map(|m| {
                status.tls = true;
                m
            })
            .unwrap_or_default();

        let devices: HashMap<String, DevicePosture> =
            load_table::<DevicePosture>(&dir.join("devices.json"))
                .map(|m| {
                    status.device = true;
                    m
                })
                .unwrap_or_default();

        info!(
            geo = geo.len(),
            wifi = wifi.len(),
            tls = tls.len(),
            devices = devices.len(),
            "enrichment tables loaded"
        );
        Self {
            geo,
            wifi,
            tls,
            devices,
            status,
        }
    }

    /// Empty snapshot: every lookup misses. Used when no data dir exists.
    pub fn empty() -> Self {
        Self {
            geo: HashMap::new(),
            wifi: HashMap::new(),
            tls: HashMap::new(),
            devices: HashMap::new(),
            status: TableStatus::default(),
        }
    }

    pub fn status(&self) -> TableStatus {
        self.status
    }

    #[cfg(test)]
    pub fn with_entries(
        geo: Vec<(IpAddr, GeoInfo)>,
        wifi: Vec<(&str, WifiAp)>,
        tls: Vec<(&str, &str)>,
        devices: Vec<(&str, DevicePosture)>,
    ) -> Self {
        Self {
            geo: geo.into_iter().collect(),
            wifi: wifi
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
            tls: tls
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            devices: devices
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            status: TableStatus {
                geo: true,
                wifi: true,
                tls: true,
                device: true,
            },
        }
    }
}

impl EnrichmentLookup for EnrichmentTables {
    fn geo_for_ip(&self, ip: &IpAddr) -> Option<GeoInfo> {
        self.geo.get(ip).cloned()
    }

    fn ap_for_bssid(&self, bssid: &str) -> Option<WifiAp> {
        self.wifi.get(&bssid.to_lowercase()).cloned()
    }

    fn tag_for_ja3(&self, ja3: &str) -> Option<String> {
        self.tls.get(ja3).cloned()
    }

    fn posture_for_device(&self, device_id: &str) -> Option<DevicePosture> {
        self.devices.get(device_id).cloned()
    }
}

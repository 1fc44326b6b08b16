//! NVS persistence for station credentials.
//!
//! Credentials are stored in ESP32's Non-Volatile Storage (NVS) so they
//! persist across reboots. The byte layout is produced by
//! [`encode_candidates`] and is host-tested there.

use crate::config::{
    decode_candidates, encode_candidates, Candidate, ConfigError, MAX_PASSWORD_LEN, MAX_SSID_LEN,
    MAX_STORED_CANDIDATES,
};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_sys::EspError;
use log::warn;
use zeroize::Zeroize;

/// NVS namespace for WiFi configuration.
const NVS_NAMESPACE: &str = "wifi_config";

/// NVS key for the stored candidate list.
const NVS_KEY: &str = "candidates";

/// Count byte plus, per candidate, a length byte and
/// `[ssid_len:1][ssid:32][password_len:1][password:64]`.
const MAX_BUFFER_SIZE: usize = 1 + MAX_STORED_CANDIDATES * (1 + 1 + MAX_SSID_LEN + 1 + MAX_PASSWORD_LEN);

/// Load stored candidates.
///
/// Returns an empty list if nothing is stored or the entry is corrupted.
pub fn load_candidates(nvs: &EspNvs<NvsDefault>) -> Vec<Candidate> {
    let mut buf = [0u8; MAX_BUFFER_SIZE];
    let candidates = match nvs.get_raw(NVS_KEY, &mut buf) {
        Ok(Some(bytes)) => decode_candidates(bytes).unwrap_or_else(|e| {
            warn!("Ignoring stored WiFi credentials: {}", e);
            Vec::new()
        }),
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!("Failed to read WiFi credentials: {}", e);
            Vec::new()
        }
    };
    buf.zeroize();
    candidates
}

/// Replace the stored candidate list.
pub fn save_candidates(nvs: &mut EspNvs<NvsDefault>, candidates: &[Candidate]) -> Result<(), StorageError> {
    let mut bytes = encode_candidates(candidates)?;
    let result = nvs.set_raw(NVS_KEY, &bytes);
    bytes.zeroize();
    result?;
    Ok(())
}

/// Clear stored candidates.
pub fn clear_candidates(nvs: &mut EspNvs<NvsDefault>) -> Result<(), EspError> {
    nvs.remove(NVS_KEY)?;
    Ok(())
}

/// Open the WiFi namespace on the default partition.
pub fn init_nvs(partition: EspDefaultNvsPartition) -> Result<EspNvs<NvsDefault>, EspError> {
    EspNvs::new(partition, NVS_NAMESPACE, true)
}

/// Errors while saving credentials.
#[derive(Debug)]
pub enum StorageError {
    Config(ConfigError),
    Nvs(EspError),
}

impl From<ConfigError> for StorageError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<EspError> for StorageError {
    fn from(e: EspError) -> Self {
        Self::Nvs(e)
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid credentials: {}", e),
            Self::Nvs(e) => write!(f, "NVS error: {:?}", e),
        }
    }
}

impl std::error::Error for StorageError {}

use std::time::Duration;

use tracing::debug;

use crate::native::DeviceType;

/// Env var that selects the software reference rasterizer instead of the hardware device.
pub const REFERENCE_DEVICE_ENV: &str = "AERO_D3D9_REFERENCE_DEVICE";
/// Env var that skips the extended (loss-free) device variant even when the platform offers it.
pub const DISABLE_EXTENDED_DEVICE_ENV: &str = "AERO_D3D9_DISABLE_EXTENDED_DEVICE";
/// Env var overriding the adapter ordinal.
pub const ADAPTER_ENV: &str = "AERO_D3D9_ADAPTER";

fn env_var_truthy(name: &str) -> bool {
    let Ok(raw) = std::env::var(name) else {
        return false;
    };

    let v = raw.trim();
    v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
}

/// Construction-time configuration of a [`crate::RenderBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub adapter: u32,
    pub device_type: DeviceType,
    /// Try the extended device first and fall back to the standard one.
    pub prefer_extended_device: bool,
    /// How many times `initialize` re-reads device caps while the driver reports them unavailable.
    pub caps_probe_attempts: u32,
    pub caps_probe_retry_delay: Duration,
    /// Consecutive negative `test_device_resettable` polls before the device is declared
    /// unrecoverable.
    pub max_unresettable_polls: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            adapter: 0,
            device_type: DeviceType::Hardware,
            prefer_extended_device: true,
            caps_probe_attempts: 10,
            caps_probe_retry_delay: Duration::from_millis(100),
            max_unresettable_polls: 600,
        }
    }
}

impl BackendConfig {
    /// Defaults overlaid with the `AERO_D3D9_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if env_var_truthy(REFERENCE_DEVICE_ENV) {
            config.device_type = DeviceType::Reference;
        }
        if env_var_truthy(DISABLE_EXTENDED_DEVICE_ENV) {
            config.prefer_extended_device = false;
        }
        if let Ok(raw) = std::env::var(ADAPTER_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(adapter) => config.adapter = adapter,
                Err(_) => debug!(value = %raw, "ignoring unparsable {ADAPTER_ENV}"),
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_prefer_extended_hardware_device() {
        let config = BackendConfig::default();
        assert_eq!(config.adapter, 0);
        assert_eq!(config.device_type, DeviceType::Hardware);
        assert!(config.prefer_extended_device);
        assert_eq!(config.caps_probe_attempts, 10);
    }

    #[test]
    fn unset_env_var_is_not_truthy() {
        assert!(!env_var_truthy("AERO_D3D9_TEST_ENV_VAR_THAT_IS_NEVER_SET"));
    }
}

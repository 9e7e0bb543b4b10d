//! Context configuration.
//!
//! Defaults suit a single discrete or integrated GPU. `from_env` overlays:
//! - `WGK_BACKEND`: `vulkan`, `metal`, `dx12`, `gl`, `primary` or `all`
//! - `WGK_POWER_PREFERENCE`: `high`, `low` or `none`
//! - `WGK_FORCE_FALLBACK`: `1`/`true` to require a software adapter
//! - `WGK_LOG_SHADERS`: `1`/`true` to log templated shader text on kernel build

use tracing::warn;

#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    pub force_fallback_adapter: bool,
    pub device_label: String,
    pub required_limits: wgpu::Limits,
    /// Log the full shader source at debug level whenever a kernel is built.
    pub log_shader_source: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            device_label: "wgk-device".to_string(),
            required_limits: wgpu::Limits::default(),
            log_shader_source: false,
        }
    }
}

impl ContextOptions {
    /// Defaults overlaid with `WGK_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        if let Some(raw) = lookup("WGK_BACKEND") {
            match parse_backends(&raw) {
                Some(backends) => options.backends = backends,
                None => warn!("WGK_BACKEND='{}' not recognized; using all backends", raw),
            }
        }
        if let Some(raw) = lookup("WGK_POWER_PREFERENCE") {
            match parse_power_preference(&raw) {
                Some(pref) => options.power_preference = pref,
                None => warn!(
                    "WGK_POWER_PREFERENCE='{}' not recognized (expected high|low|none)",
                    raw
                ),
            }
        }
        if let Some(raw) = lookup("WGK_FORCE_FALLBACK") {
            match parse_flag(&raw) {
                Some(flag) => options.force_fallback_adapter = flag,
                None => warn!("WGK_FORCE_FALLBACK='{}' is not a boolean", raw),
            }
        }
        if let Some(raw) = lookup("WGK_LOG_SHADERS") {
            match parse_flag(&raw) {
                Some(flag) => options.log_shader_source = flag,
                None => warn!("WGK_LOG_SHADERS='{}' is not a boolean", raw),
            }
        }
        options
    }
}

fn parse_backends(raw: &str) -> Option<wgpu::Backends> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "vulkan" | "vk" => Some(wgpu::Backends::VULKAN),
        "metal" | "mtl" => Some(wgpu::Backends::METAL),
        "dx12" | "d3d12" => Some(wgpu::Backends::DX12),
        "gl" | "gles" | "opengl" => Some(wgpu::Backends::GL),
        "primary" => Some(wgpu::Backends::PRIMARY),
        "all" => Some(wgpu::Backends::all()),
        _ => None,
    }
}

fn parse_power_preference(raw: &str) -> Option<wgpu::PowerPreference> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "high" | "high-performance" => Some(wgpu::PowerPreference::HighPerformance),
        "low" | "low-power" => Some(wgpu::PowerPreference::LowPower),
        "none" => Some(wgpu::PowerPreference::None),
        _ => None,
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let options = ContextOptions::from_lookup(lookup(&[]));
        assert_eq!(options.backends, wgpu::Backends::all());
        assert_eq!(options.power_preference, wgpu::PowerPreference::HighPerformance);
        assert!(!options.force_fallback_adapter);
        assert!(!options.log_shader_source);
    }

    #[test]
    fn test_env_overlay() {
        let options = ContextOptions::from_lookup(lookup(&[
            ("WGK_BACKEND", "Vulkan"),
            ("WGK_POWER_PREFERENCE", "low"),
            ("WGK_FORCE_FALLBACK", "1"),
            ("WGK_LOG_SHADERS", "true"),
        ]));
        assert_eq!(options.backends, wgpu::Backends::VULKAN);
        assert_eq!(options.power_preference, wgpu::PowerPreference::LowPower);
        assert!(options.force_fallback_adapter);
        assert!(options.log_shader_source);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let options = ContextOptions::from_lookup(lookup(&[
            ("WGK_BACKEND", "glide"),
            ("WGK_POWER_PREFERENCE", "turbo"),
            ("WGK_FORCE_FALLBACK", "maybe"),
        ]));
        assert_eq!(options.backends, wgpu::Backends::all());
        assert_eq!(options.power_preference, wgpu::PowerPreference::HighPerformance);
        assert!(!options.force_fallback_adapter);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("ON"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag(""), None);
    }
}

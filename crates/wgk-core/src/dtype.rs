use std::fmt;
use std::str::FromStr;

use bytemuck::Pod;

use crate::error::GpuError;

/// Numeric precision of tensor elements and of templated shader code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NumType {
    /// 32-bit floating point.
    #[default]
    F32,
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    ///
    /// Shaders using it need `enable f16;` and a device with `SHADER_F16`.
    F16,
}

impl NumType {
    /// Returns the width in bytes of a single element.
    ///
    /// - F32: 4 bytes per element
    /// - F16: 2 bytes per element (using `half::f16`)
    pub fn size_in_bytes(&self) -> usize {
        match self {
            NumType::F32 => 4,
            NumType::F16 => 2,
        }
    }

    /// Numeric code used across the C boundary.
    pub fn code(&self) -> u32 {
        match self {
            NumType::F32 => 0,
            NumType::F16 => 1,
        }
    }

    /// Canonical WGSL spelling, slotted into `{{precision}}` placeholders.
    pub fn as_wgsl(&self) -> &'static str {
        match self {
            NumType::F32 => "f32",
            NumType::F16 => "f16",
        }
    }
}

impl TryFrom<u32> for NumType {
    type Error = GpuError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(NumType::F32),
            1 => Ok(NumType::F16),
            other => Err(GpuError::UnsupportedPrecision(format!("numeric code {other}"))),
        }
    }
}

impl FromStr for NumType {
    type Err = GpuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f32" => Ok(NumType::F32),
            "f16" => Ok(NumType::F16),
            other => Err(GpuError::UnsupportedPrecision(other.to_string())),
        }
    }
}

impl fmt::Display for NumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wgsl())
    }
}

/// Host scalar types that can be transferred to and from a tensor.
pub trait Element: Pod {
    const NUM_TYPE: NumType;
}

impl Element for f32 {
    const NUM_TYPE: NumType = NumType::F32;
}

impl Element for half::f16 {
    const NUM_TYPE: NumType = NumType::F16;
}

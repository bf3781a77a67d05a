use std::fmt::Display;
use std::str::FromStr;

use crate::error::LayoutError;

/// Supported dtypes.
///
/// Covers both the logical element types that matrix fragments are defined
/// over and the wider types used purely as packed storage containers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum DType {
    /// 16-bit float (5e10m)
    #[default]
    F16,
    /// 16-bit float (8e7m)
    Bf16,
    /// 8-bit signed integer
    I8,
    /// 8-bit unsigned integer
    U8,
    /// 8-bit float (4e3m)
    F8E4M3,
    /// 8-bit float (5e2m)
    F8E5M2,
    /// 32-bit signed integer
    I32,
    /// 32-bit unsigned integer
    U32,
    /// 32-bit float (8e23m)
    F32,
}

impl DType {
    pub fn bits(&self) -> usize {
        match self {
            DType::F16 | DType::Bf16 => 16,
            DType::I8 | DType::U8 | DType::F8E4M3 | DType::F8E5M2 => 8,
            DType::I32 | DType::U32 | DType::F32 => 32,
        }
    }

    pub fn sizeof(&self) -> usize {
        self.bits() / 8
    }

    /// Byte-wide fragment element types (8-bit integer and float8 formats).
    /// These get the wider 16x32 tensor-core fragment.
    pub fn is_byte_class(&self) -> bool {
        matches!(
            self,
            DType::I8 | DType::U8 | DType::F8E4M3 | DType::F8E5M2
        )
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            DType::F16 => "float16",
            DType::Bf16 => "bfloat16",
            DType::I8 => "int8",
            DType::U8 => "uint8",
            DType::F8E4M3 => "e4m3_float8",
            DType::F8E5M2 => "e5m2_float8",
            DType::I32 => "int32",
            DType::U32 => "uint32",
            DType::F32 => "float32",
        };
        write!(f, "{tag}")
    }
}

impl FromStr for DType {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float16" => Ok(DType::F16),
            "bfloat16" => Ok(DType::Bf16),
            "int8" => Ok(DType::I8),
            "uint8" => Ok(DType::U8),
            "e4m3_float8" => Ok(DType::F8E4M3),
            "e5m2_float8" => Ok(DType::F8E5M2),
            "int32" => Ok(DType::I32),
            "uint32" => Ok(DType::U32),
            "float32" => Ok(DType::F32),
            other => Err(LayoutError::UnsupportedDatatype(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_roundtrip() {
        for dt in [
            DType::F16,
            DType::Bf16,
            DType::I8,
            DType::U8,
            DType::F8E4M3,
            DType::F8E5M2,
            DType::I32,
            DType::U32,
            DType::F32,
        ] {
            assert_eq!(dt.to_string().parse::<DType>().unwrap(), dt);
        }
        assert!(matches!(
            "float4".parse::<DType>(),
            Err(LayoutError::UnsupportedDatatype(_))
        ));
    }

    #[test]
    fn test_bits() {
        assert_eq!(DType::F16.bits(), 16);
        assert_eq!(DType::I8.bits(), 8);
        assert_eq!(DType::U32.bits(), 32);
        assert_eq!(DType::I8.sizeof(), 1);
        assert!(DType::F8E4M3.is_byte_class());
        assert!(!DType::Bf16.is_byte_class());
    }
}

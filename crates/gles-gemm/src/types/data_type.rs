use std::fmt;

/// Element kind without the per-tensor fixed-point position.
///
/// Used wherever the fractional position is irrelevant, such as registry keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    F32,
    F16,
    Qs8,
    Qs16,
    S32,
}

impl ElementKind {
    /// Size of one element in bytes.
    pub const fn element_size(self) -> usize {
        match self {
            ElementKind::F32 | ElementKind::S32 => 4,
            ElementKind::F16 | ElementKind::Qs16 => 2,
            ElementKind::Qs8 => 1,
        }
    }

    /// Number of lanes in a 16-byte vector.
    pub const fn vector_width(self) -> usize {
        16 / self.element_size()
    }

    /// The data type of this kind at fractional position `frac_bits`.
    ///
    /// The position is ignored for non fixed-point kinds.
    pub const fn with_frac_bits(self, frac_bits: u8) -> DataType {
        match self {
            ElementKind::F32 => DataType::F32,
            ElementKind::F16 => DataType::F16,
            ElementKind::Qs8 => DataType::Qs8 { frac_bits },
            ElementKind::Qs16 => DataType::Qs16 { frac_bits },
            ElementKind::S32 => DataType::S32,
        }
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::F32 => "F32",
            ElementKind::F16 => "F16",
            ElementKind::Qs8 => "QS8",
            ElementKind::Qs16 => "QS16",
            ElementKind::S32 => "S32",
        }
    }
}

/// Data type of a tensor.
///
/// Fixed-point types carry the fractional position shared by every element
/// of the tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    F32,
    F16,
    Qs8 { frac_bits: u8 },
    Qs16 { frac_bits: u8 },
    S32,
}

impl DataType {
    /// Element kind, dropping the fractional position.
    pub const fn kind(self) -> ElementKind {
        match self {
            DataType::F32 => ElementKind::F32,
            DataType::F16 => ElementKind::F16,
            DataType::Qs8 { .. } => ElementKind::Qs8,
            DataType::Qs16 { .. } => ElementKind::Qs16,
            DataType::S32 => ElementKind::S32,
        }
    }

    /// Size of one element in bytes.
    pub const fn element_size(self) -> usize {
        self.kind().element_size()
    }

    /// Number of lanes in a 16-byte vector.
    pub const fn vector_width(self) -> usize {
        self.kind().vector_width()
    }

    /// Fractional bits of a fixed-point type, zero otherwise.
    pub const fn frac_bits(self) -> u8 {
        match self {
            DataType::Qs8 { frac_bits } | DataType::Qs16 { frac_bits } => frac_bits,
            _ => 0,
        }
    }

    pub const fn is_fixed_point(self) -> bool {
        matches!(self, DataType::Qs8 { .. } | DataType::Qs16 { .. })
    }

    pub const fn is_floating_point(self) -> bool {
        matches!(self, DataType::F32 | DataType::F16)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Qs8 { frac_bits } | DataType::Qs16 { frac_bits } => {
                write!(f, "{}(fp={})", self.kind().name(), frac_bits)
            }
            _ => f.write_str(self.kind().name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_width() {
        assert_eq!(DataType::F32.vector_width(), 4);
        assert_eq!(DataType::F16.vector_width(), 8);
        assert_eq!(DataType::Qs8 { frac_bits: 3 }.vector_width(), 16);
        assert_eq!(DataType::Qs16 { frac_bits: 7 }.vector_width(), 8);
    }

    #[test]
    fn test_display() {
        assert_eq!(DataType::F16.to_string(), "F16");
        assert_eq!(DataType::Qs8 { frac_bits: 5 }.to_string(), "QS8(fp=5)");
    }

    #[test]
    fn test_frac_bits_only_for_fixed_point() {
        assert_eq!(DataType::F32.frac_bits(), 0);
        assert_eq!(DataType::Qs16 { frac_bits: 12 }.frac_bits(), 12);
        assert!(DataType::Qs16 { frac_bits: 12 }.is_fixed_point());
        assert!(!DataType::S32.is_floating_point());
    }
}

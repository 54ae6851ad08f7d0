//! Item format codes for negotiated memory views
//!
//! Single-character codes identify the element type of a contiguous buffer,
//! following the usual struct-layout convention (lowercase signed, uppercase
//! unsigned).

/// Element format of an array view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Format {
    I8 = b'b',
    U8 = b'B',
    I16 = b'h',
    U16 = b'H',
    I32 = b'i',
    U32 = b'I',
    I64 = b'q',
    U64 = b'Q',
    F32 = b'f',
    F64 = b'd',
}

impl Format {
    /// Size of one item in bytes
    #[inline]
    pub const fn itemsize(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// Alignment requirement
    #[inline]
    pub const fn align(self) -> usize {
        self.itemsize()
    }

    /// Single-character format code
    #[inline]
    pub const fn code(self) -> char {
        self as u8 as char
    }

    /// Parse a single-character format code
    pub const fn from_code(c: char) -> Option<Self> {
        match c {
            'b' => Some(Self::I8),
            'B' => Some(Self::U8),
            'h' => Some(Self::I16),
            'H' => Some(Self::U16),
            'i' => Some(Self::I32),
            'I' => Some(Self::U32),
            'q' => Some(Self::I64),
            'Q' => Some(Self::U64),
            'f' => Some(Self::F32),
            'd' => Some(Self::F64),
            _ => None,
        }
    }

    /// Check if format is integral
    #[inline]
    pub const fn is_integral(self) -> bool {
        !self.is_float()
    }

    /// Check if format is floating point
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

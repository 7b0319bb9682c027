//! Memory allocation error type
//!
//! A unified error type for allocation operations with categorized kinds,
//! optional layout information and a static context message.

use core::alloc::Layout;
use core::fmt;

/// Result alias for allocation operations.
pub type AllocResult<T> = Result<T, AllocError>;

/// Allocation error kinds with detailed categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocErrorKind {
    /// General allocation failure (out of memory)
    OutOfMemory,
    /// Size overflow when calculating total allocation size
    SizeOverflow,
    /// Invalid alignment (not a power of two, or unsupported by the backing
    /// allocator)
    InvalidAlignment,
}

impl AllocErrorKind {
    /// Returns a static string describing the error
    pub const fn as_str(&self) -> &'static str {
        match self {
            AllocErrorKind::OutOfMemory => "out of memory",
            AllocErrorKind::SizeOverflow => "size overflow",
            AllocErrorKind::InvalidAlignment => "invalid alignment",
        }
    }
}

impl fmt::Display for AllocErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned by allocators in this crate
///
/// Carries the error kind plus, when available, the layout that failed and a
/// static message describing the failing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError {
    kind: AllocErrorKind,
    layout: Option<Layout>,
    message: Option<&'static str>,
}

impl AllocError {
    /// Creates a new error of the given kind without additional information.
    #[inline]
    pub const fn new(kind: AllocErrorKind) -> Self {
        Self {
            kind,
            layout: None,
            message: None,
        }
    }

    /// Creates a new error of the given kind carrying the failing layout.
    #[inline]
    pub const fn with_layout(kind: AllocErrorKind, layout: Layout) -> Self {
        Self {
            kind,
            layout: Some(layout),
            message: None,
        }
    }

    /// Out-of-memory error for a `size`/`align` request.
    ///
    /// The layout is attached when the pair forms a valid layout.
    pub fn allocation_failed(size: usize, align: usize) -> Self {
        match Layout::from_size_align(size, align) {
            Ok(layout) => Self::with_layout(AllocErrorKind::OutOfMemory, layout),
            Err(_) => Self::new(AllocErrorKind::OutOfMemory),
        }
    }

    /// Invalid-alignment error.
    #[inline]
    pub const fn invalid_alignment(_align: usize) -> Self {
        Self::new(AllocErrorKind::InvalidAlignment)
    }

    /// Size-overflow error with a static description.
    #[inline]
    pub const fn size_overflow(message: &'static str) -> Self {
        Self {
            kind: AllocErrorKind::SizeOverflow,
            layout: None,
            message: Some(message),
        }
    }

    /// Returns the error kind.
    #[inline]
    pub const fn kind(&self) -> AllocErrorKind {
        self.kind
    }

    /// Returns the layout that failed to allocate, if recorded.
    #[inline]
    pub const fn layout(&self) -> Option<Layout> {
        self.layout
    }

    /// Checks whether this is an out-of-memory error.
    #[inline]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self.kind, AllocErrorKind::OutOfMemory)
    }

    /// Checks whether this is an invalid-alignment error.
    #[inline]
    pub const fn is_invalid_alignment(&self) -> bool {
        matches!(self.kind, AllocErrorKind::InvalidAlignment)
    }

    /// Checks whether this is a size-overflow error.
    #[inline]
    pub const fn is_size_overflow(&self) -> bool {
        matches!(self.kind, AllocErrorKind::SizeOverflow)
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(layout) = self.layout {
            write!(
                f,
                " (size: {}, align: {})",
                layout.size(),
                layout.align()
            )?;
        }
        if let Some(message) = self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AllocError {}

//! Error types for Mach-O loading.

use alloc::string::String;
use thiserror::Error;

/// Errors that can occur while parsing and loading a Mach-O executable.
///
/// Segment-mapping failures are deliberately absent: they are logged and the
/// load continues, so a partial image can still be inspected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The file does not start with the Mach-O magic number
    #[error("bad magic number {found:#010x}")]
    BadMagic { found: u32 },
    /// The binary targets a CPU other than 32-bit x86
    #[error("unsupported cpu type {found}")]
    UnsupportedArchitecture { found: i32 },
    /// The file is not an executable
    #[error("unsupported file type {found:#x}")]
    UnsupportedFileType { found: u32 },
    /// An unrecognized load command under the fail-fast policy
    #[error("load command {tag:#04x} is not supported")]
    UnsupportedCommand { tag: u32 },
    /// A command's declared size steps past the end of the command buffer
    #[error("load command at offset {offset:#x} overruns the command buffer")]
    CommandOverrun { offset: usize },
    /// A record is smaller than its own fields require
    #[error("truncated {what}")]
    Truncated { what: &'static str },
    /// A thread command with a register-state flavor this loader cannot use
    #[error("unsupported thread-state flavor {flavor}")]
    UnsupportedThreadState { flavor: u32 },
    /// No unix-thread command, so no entry address to jump to
    #[error("missing unix-thread command: no entry point")]
    MissingEntryPoint,
    /// Symbol stubs are present but the link-edit tables are incomplete
    #[error("symbol stubs present but link-edit tables are incomplete")]
    MissingLinkEdit,
    /// The private stack region could not be allocated
    #[error("failed to allocate the stack")]
    StackAllocation,
    /// A stub references a name the host process does not export
    #[error("undefined symbol: {name}")]
    UnresolvedSymbol { name: String },
    /// The mapper refused a read or write at a live address
    #[error("memory access at {addr:#010x} failed")]
    Memory { addr: u32 },
    /// Arithmetic overflow
    #[error("arithmetic overflow")]
    Overflow,
}

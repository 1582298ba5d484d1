//! Mach-O binary loader module
//!
//! Provides functionality to load 32-bit x86 Mach-O executables into the
//! address space of the running process.
//!
//! The pipeline is generic over two host facilities so that everything up to
//! the final control transfer can be driven by substitutes in tests: a
//! [`MemoryMapper`] that owns the address-space side effects, and a
//! [`SymbolResolver`] that answers external-symbol lookups. The host binary
//! supplies `mmap`/`dlsym`-backed implementations of both.

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic, clippy::nursery)]
#![no_std]

extern crate alloc;

mod error;
mod loader;
pub mod commands;
pub mod header;
pub mod mapper;
pub mod resolver;
pub mod stack;
pub mod symbols;

pub use commands::{
    CommandReader, DysymtabCommand, LoadCommand, SegmentCommand, Section, SymtabCommand,
    ThreadCommand, X86ThreadState,
};
pub use error::LoadError;
pub use header::MachHeader;
pub use loader::{LoadOptions, LoadedImage, MachLoader, UnknownCommandPolicy};
pub use mapper::{MemoryMapper, VmProt};
pub use resolver::SymbolResolver;

/// Result type for loading operations
pub type Result<T> = core::result::Result<T, LoadError>;

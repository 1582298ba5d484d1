//! The load pipeline: walk the command list, map, stack, bind, frame.

use alloc::vec::Vec;

use log::{debug, info, warn};

use crate::commands::{CommandReader, LoadCommand, SegmentCommand};
use crate::header::MachHeader;
use crate::mapper::{MemoryMapper, VmProt};
use crate::resolver::SymbolResolver;
use crate::{Result, error::LoadError, stack, symbols};

/// How the command walker treats a tag it does not recognize.
///
/// The source history of this loader did both at different times; the choice
/// is now explicit, defaulting to the compatible one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownCommandPolicy {
    /// Log the tag and keep walking.
    #[default]
    Warn,
    /// Abort the whole load.
    Fail,
}

/// Knobs for a single load.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub unknown_commands: UnknownCommandPolicy,
}

/// Everything the host needs to start the program: where to jump and the
/// stack pointer to install first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedImage {
    /// Entry address recorded by the unix-thread command
    pub entry_point: u32,
    /// Initial stack pointer, aimed at the prepared startup frame
    pub initial_esp: u32,
    /// Highest address of the private stack region
    pub stack_top: u32,
}

/// Mach-O loader with pluggable memory mapper and symbol resolver.
pub struct MachLoader;

impl MachLoader {
    /// Run the pipeline up to (but not including) the control transfer.
    ///
    /// Stage order: a single walk of the command list maps each segment the
    /// moment its command is decoded, in command order, and records the
    /// symtab, dysymtab and thread commands; the link-edit tables are only
    /// dereferenced after the walk, once every segment mapping exists. Then
    /// the stack is allocated, the lazy stubs are bound and patched, and the
    /// startup frame is written.
    ///
    /// Segment-mapping failures are logged and skipped; every other failure
    /// aborts the load.
    ///
    /// # Errors
    ///
    /// Returns any [`LoadError`] encountered during parsing, stack
    /// allocation or stub binding.
    pub fn load<M: MemoryMapper, R: SymbolResolver>(
        header: &MachHeader,
        commands: &[u8],
        argv0: &str,
        mapper: &mut M,
        resolver: &mut R,
        options: LoadOptions,
    ) -> Result<LoadedImage> {
        let mut segments: Vec<SegmentCommand> = Vec::new();
        let mut symtab = None;
        let mut dysymtab = None;
        let mut thread = None;

        let mut reader = CommandReader::new(commands, header.ncmds);
        while let Some(command) = reader.next() {
            match command? {
                LoadCommand::Segment(segment) => {
                    Self::map_segment(mapper, &segment);
                    segments.push(segment);
                }
                LoadCommand::Symtab(command) => symtab = Some(command),
                LoadCommand::Dysymtab(command) => dysymtab = Some(command),
                LoadCommand::UnixThread(command) => thread = Some(command),
                LoadCommand::Dylinker { path } => debug!("dynamic linker: {path}"),
                LoadCommand::Dylib { name } => debug!("links against {name}"),
                LoadCommand::Uuid(uuid) => debug!("uuid: {uuid:02x?}"),
                LoadCommand::Unknown { tag, size } => match options.unknown_commands {
                    UnknownCommandPolicy::Warn => {
                        warn!("load command {tag:#04x} ({size} bytes) not supported, skipping");
                    }
                    UnknownCommandPolicy::Fail => {
                        return Err(LoadError::UnsupportedCommand { tag });
                    }
                },
            }
        }
        if reader.consumed() != commands.len() {
            debug!(
                "{} trailing bytes after the last load command",
                commands.len() - reader.consumed()
            );
        }

        let thread = thread.ok_or(LoadError::MissingEntryPoint)?;

        let stack_top = stack::allocate(mapper)?;

        let linkedit = segments.iter().find(|segment| segment.is_link_edit());
        symbols::bind_stub_sections(
            mapper,
            resolver,
            &segments,
            linkedit,
            symtab.as_ref(),
            dysymtab.as_ref(),
        )?;

        let initial_esp = stack::build_frame(mapper, stack_top, argv0)?;

        Ok(LoadedImage {
            entry_point: thread.state.eip,
            initial_esp,
            stack_top,
        })
    }

    fn map_segment<M: MemoryMapper>(mapper: &mut M, segment: &SegmentCommand) {
        let prot = VmProt::from_initprot(segment.initprot);
        info!(
            "segment {:<16} prot {:#04x} vmaddr {:#010x} filesize {:#07x} fileoff {:#07x}",
            segment.name(),
            segment.initprot,
            segment.vmaddr,
            segment.filesize,
            segment.fileoff,
        );

        let mapped = if segment.is_page_zero() {
            mapper.map_zero(segment.vmsize, prot)
        } else {
            mapper.map_file(segment.vmaddr, segment.filesize, segment.fileoff, prot)
        };
        if mapped.is_err() {
            // Non-fatal on purpose: a partial image is still worth walking.
            warn!("failed to map segment {}", segment.name());
        }

        for section in &segment.sections {
            debug!(" - section {}", section.name());
        }
    }
}

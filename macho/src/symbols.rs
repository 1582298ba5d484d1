//! Lazy-stub binding: resolve external names and patch the stub slots.

use alloc::string::String;
use alloc::vec::Vec;

use log::debug;

use crate::commands::{DysymtabCommand, SegmentCommand, Section, SymtabCommand};
use crate::mapper::{MemoryMapper, VmProt};
use crate::resolver::SymbolResolver;
use crate::{Result, error::LoadError};

/// On-disk size of one symbol table entry.
pub const NLIST_LEN: usize = 12;
/// The only stub size this loader can patch: `jmp rel32`.
pub const JMP_STUB_LEN: u32 = 5;

const JMP_REL32: u8 = 0xE9;
const CSTR_CHUNK: u32 = 32;

/// One symbol table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nlist {
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub n_value: u32,
}

impl Nlist {
    #[must_use]
    pub const fn parse(bytes: &[u8; NLIST_LEN]) -> Self {
        Self {
            n_strx: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            n_type: bytes[4],
            n_sect: bytes[5],
            n_desc: u16::from_le_bytes([bytes[6], bytes[7]]),
            n_value: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }
}

/// Live addresses of the link-edit tables.
///
/// Valid only because every segment is mapped at its file-declared address:
/// a single translation constant converts any file-relative offset into a
/// mapped address.
struct LinkEditTables {
    strings: u32,
    strsize: u32,
    symbols: u32,
    nsyms: u32,
    indirect: u32,
}

impl LinkEditTables {
    fn locate(
        linkedit: &SegmentCommand,
        symtab: &SymtabCommand,
        dysymtab: &DysymtabCommand,
    ) -> Self {
        let translation = linkedit.vmaddr.wrapping_sub(linkedit.fileoff);
        Self {
            strings: translation.wrapping_add(symtab.stroff),
            strsize: symtab.strsize,
            symbols: translation.wrapping_add(symtab.symoff),
            nsyms: symtab.nsyms,
            indirect: translation.wrapping_add(dysymtab.indirectsymoff),
        }
    }
}

/// Bind every eligible stub section of every segment.
///
/// A section qualifies when its type is symbol-stubs, its flags mark it
/// self-modifying and its declared stub size is exactly [`JMP_STUB_LEN`].
/// Each section is opened for patching, bound slot by slot, then sealed back
/// to the owning segment's declared protection.
pub(crate) fn bind_stub_sections<M: MemoryMapper, R: SymbolResolver>(
    mapper: &mut M,
    resolver: &mut R,
    segments: &[SegmentCommand],
    linkedit: Option<&SegmentCommand>,
    symtab: Option<&SymtabCommand>,
    dysymtab: Option<&DysymtabCommand>,
) -> Result<()> {
    let stubbed: Vec<(&SegmentCommand, &Section)> = segments
        .iter()
        .flat_map(|segment| segment.sections.iter().map(move |section| (segment, section)))
        .filter(|(_, section)| {
            section.is_self_modifying_stubs() && section.reserved2 == JMP_STUB_LEN
        })
        .collect();
    if stubbed.is_empty() {
        return Ok(());
    }

    let (Some(linkedit), Some(symtab), Some(dysymtab)) = (linkedit, symtab, dysymtab) else {
        return Err(LoadError::MissingLinkEdit);
    };
    let tables = LinkEditTables::locate(linkedit, symtab, dysymtab);

    for (segment, section) in stubbed {
        mapper
            .open_for_patch(section.addr, section.size)
            .map_err(|()| LoadError::Memory { addr: section.addr })?;

        let outcome = patch_section(mapper, resolver, &tables, section);

        mapper
            .seal(section.addr, section.size, VmProt::from_initprot(segment.initprot))
            .map_err(|()| LoadError::Memory { addr: section.addr })?;

        outcome?;
    }
    Ok(())
}

fn patch_section<M: MemoryMapper, R: SymbolResolver>(
    mapper: &mut M,
    resolver: &mut R,
    tables: &LinkEditTables,
    section: &Section,
) -> Result<()> {
    let end = section
        .addr
        .checked_add(section.size)
        .ok_or(LoadError::Overflow)?;

    let mut slot = section.addr;
    let mut index_in_section: u32 = 0;
    loop {
        let next = slot.checked_add(JMP_STUB_LEN).ok_or(LoadError::Overflow)?;
        if next > end {
            break;
        }

        let entry = section
            .reserved1
            .checked_add(index_in_section)
            .ok_or(LoadError::Overflow)?;
        let entry_addr = entry
            .checked_mul(4)
            .and_then(|offset| tables.indirect.checked_add(offset))
            .ok_or(LoadError::Overflow)?;
        let symbol_index = read_u32(mapper, entry_addr)?;
        if symbol_index >= tables.nsyms {
            // End-of-valid-stubs marker, not an error.
            break;
        }

        let nlist_addr = symbol_index
            .checked_mul(NLIST_LEN as u32)
            .and_then(|offset| tables.symbols.checked_add(offset))
            .ok_or(LoadError::Overflow)?;
        let mut raw = [0_u8; NLIST_LEN];
        mapper
            .read(nlist_addr, &mut raw)
            .map_err(|()| LoadError::Memory { addr: nlist_addr })?;
        let symbol = Nlist::parse(&raw);

        let name_addr = tables
            .strings
            .checked_add(symbol.n_strx)
            .ok_or(LoadError::Overflow)?;
        let name = read_cstr(mapper, name_addr, tables.strsize.saturating_sub(symbol.n_strx))?;

        // The assembler prefixes every external name; lookups drop the
        // first character unconditionally.
        let bare = name.get(1..).unwrap_or_default();
        let Some(target) = resolver.resolve(bare) else {
            return Err(LoadError::UnresolvedSymbol { name });
        };

        let displacement = target.wrapping_sub(next);
        let mut patch = [0_u8; JMP_STUB_LEN as usize];
        patch[0] = JMP_REL32;
        patch[1..].copy_from_slice(&displacement.to_le_bytes());
        mapper
            .write(slot, &patch)
            .map_err(|()| LoadError::Memory { addr: slot })?;

        debug!("bound {name} at {slot:#010x} -> {target:#010x}");

        slot = next;
        index_in_section += 1;
    }
    Ok(())
}

fn read_u32<M: MemoryMapper>(mapper: &M, addr: u32) -> Result<u32> {
    let mut bytes = [0_u8; 4];
    mapper
        .read(addr, &mut bytes)
        .map_err(|()| LoadError::Memory { addr })?;
    Ok(u32::from_le_bytes(bytes))
}

/// Read a NUL-terminated name out of the mapped string table, at most `max`
/// bytes (the remaining extent of the table).
fn read_cstr<M: MemoryMapper>(mapper: &M, addr: u32, max: u32) -> Result<String> {
    let mut collected = Vec::new();
    let mut pos = addr;
    let mut remaining = max;
    while remaining > 0 {
        let chunk = remaining.min(CSTR_CHUNK);
        let mut buf = [0_u8; CSTR_CHUNK as usize];
        let window = &mut buf[..chunk as usize];
        mapper
            .read(pos, window)
            .map_err(|()| LoadError::Memory { addr: pos })?;
        if let Some(nul) = window.iter().position(|&b| b == 0) {
            collected.extend_from_slice(&window[..nul]);
            return Ok(String::from_utf8_lossy(&collected).into_owned());
        }
        collected.extend_from_slice(window);
        pos = pos.checked_add(chunk).ok_or(LoadError::Overflow)?;
        remaining -= chunk;
    }
    // Unterminated within the table; use what is there.
    Ok(String::from_utf8_lossy(&collected).into_owned())
}

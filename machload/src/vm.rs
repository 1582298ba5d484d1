//! The live address space: `mmap`-backed implementation of [`MemoryMapper`].
//!
//! Every mapping here is destructive and irreversible; segments land at the
//! exact addresses the binary declares, on top of whatever was there.

use std::fs::File;
use std::os::fd::AsRawFd;

use macho::{MemoryMapper, VmProt};

const PAGE_SIZE: u32 = 4096;

/// Owns the open input file and maps segments straight out of it.
pub struct HostMapper {
    file: File,
}

impl HostMapper {
    #[must_use]
    pub const fn new(file: File) -> Self {
        Self { file }
    }

    const fn mmap_prot(prot: VmProt) -> i32 {
        let mut bits = libc::PROT_NONE;
        if prot.is_readable() {
            bits |= libc::PROT_READ;
        }
        if prot.is_writable() {
            bits |= libc::PROT_WRITE;
        }
        if prot.is_executable() {
            bits |= libc::PROT_EXEC;
        }
        bits
    }

    /// `mprotect` over the page-aligned extent of `[addr, addr + size)`.
    fn protect(addr: u32, size: u32, prot: i32) -> Result<(), ()> {
        let start = addr & !(PAGE_SIZE - 1);
        let span = u64::from(addr - start) + u64::from(size);
        let len = usize::try_from(span.next_multiple_of(u64::from(PAGE_SIZE))).map_err(|_| ())?;
        let rc = unsafe { libc::mprotect(start as usize as *mut libc::c_void, len, prot) };
        if rc == 0 { Ok(()) } else { Err(()) }
    }
}

impl MemoryMapper for HostMapper {
    fn map_file(
        &mut self,
        vmaddr: u32,
        filesize: u32,
        fileoff: u32,
        prot: VmProt,
    ) -> Result<(), ()> {
        let offset = libc::off_t::try_from(fileoff).map_err(|_| ())?;
        let mapped = unsafe {
            libc::mmap(
                vmaddr as usize as *mut libc::c_void,
                filesize as usize,
                Self::mmap_prot(prot),
                libc::MAP_FIXED | libc::MAP_PRIVATE,
                self.file.as_raw_fd(),
                offset,
            )
        };
        if mapped == libc::MAP_FAILED {
            Err(())
        } else {
            Ok(())
        }
    }

    fn map_zero(&mut self, vmsize: u32, prot: VmProt) -> Result<(), ()> {
        // Anonymous pages come back zero-filled; clobbering whatever is
        // already at address 0 is the point.
        let mapped = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                vmsize as usize,
                Self::mmap_prot(prot),
                libc::MAP_FIXED | libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if mapped == libc::MAP_FAILED {
            Err(())
        } else {
            Ok(())
        }
    }

    fn map_stack(&mut self, size: u32) -> Result<u32, ()> {
        let mapped = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                size as usize,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if mapped == libc::MAP_FAILED {
            return Err(());
        }
        // The loaded program addresses 32 bits; a stack outside that range
        // is useless to it.
        u32::try_from(mapped as usize).map_err(|_| ())
    }

    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), ()> {
        unsafe {
            core::ptr::copy_nonoverlapping(addr as usize as *const u8, buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    fn write(&mut self, addr: u32, bytes: &[u8]) -> Result<(), ()> {
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as usize as *mut u8, bytes.len());
        }
        Ok(())
    }

    fn open_for_patch(&mut self, addr: u32, size: u32) -> Result<(), ()> {
        // Stubs must stay executable while gaining write permission.
        Self::protect(
            addr,
            size,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        )
    }

    fn seal(&mut self, addr: u32, size: u32, prot: VmProt) -> Result<(), ()> {
        Self::protect(addr, size, Self::mmap_prot(prot))
    }
}

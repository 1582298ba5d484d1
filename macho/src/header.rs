//! The fixed-size container header.

use crate::{Result, error::LoadError};

/// Magic number of a 32-bit little-endian Mach-O file
pub const MH_MAGIC: u32 = 0xfeed_face;
/// Demand-paged executable file
pub const MH_EXECUTE: u32 = 0x2;
/// 32-bit x86, the single target this loader is built for
pub const CPU_TYPE_X86: i32 = 7;

/// Mach-O file header.
///
/// Seven little-endian 4-byte fields; everything after the first
/// [`MachHeader::LEN`] bytes of the file is the load-command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachHeader {
    pub magic: u32,
    pub cputype: i32,
    pub cpusubtype: i32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
}

impl MachHeader {
    /// On-disk size of the header in bytes.
    pub const LEN: usize = 28;

    /// Parse and validate the header.
    ///
    /// Checks run in order: magic, CPU type, file type. A wrong CPU type is
    /// therefore reported before any load command is ever looked at.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::BadMagic`], [`LoadError::UnsupportedArchitecture`]
    /// or [`LoadError::UnsupportedFileType`] on a file this loader cannot
    /// handle, and [`LoadError::Truncated`] if fewer than [`Self::LEN`] bytes
    /// are available.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::LEN {
            return Err(LoadError::Truncated { what: "header" });
        }

        let word = |index: usize| {
            let offset = index * 4;
            [
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ]
        };

        let header = Self {
            magic: u32::from_le_bytes(word(0)),
            cputype: i32::from_le_bytes(word(1)),
            cpusubtype: i32::from_le_bytes(word(2)),
            filetype: u32::from_le_bytes(word(3)),
            ncmds: u32::from_le_bytes(word(4)),
            sizeofcmds: u32::from_le_bytes(word(5)),
            flags: u32::from_le_bytes(word(6)),
        };

        if header.magic != MH_MAGIC {
            return Err(LoadError::BadMagic {
                found: header.magic,
            });
        }
        if header.cputype != CPU_TYPE_X86 {
            return Err(LoadError::UnsupportedArchitecture {
                found: header.cputype,
            });
        }
        if header.filetype != MH_EXECUTE {
            return Err(LoadError::UnsupportedFileType {
                found: header.filetype,
            });
        }

        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::{CPU_TYPE_X86, MH_EXECUTE, MH_MAGIC, MachHeader};
    use crate::error::LoadError;

    fn header_bytes(magic: u32, cputype: i32, filetype: u32) -> [u8; MachHeader::LEN] {
        let mut bytes = [0_u8; MachHeader::LEN];
        bytes[0..4].copy_from_slice(&magic.to_le_bytes());
        bytes[4..8].copy_from_slice(&cputype.to_le_bytes());
        bytes[12..16].copy_from_slice(&filetype.to_le_bytes());
        bytes[16..20].copy_from_slice(&2_u32.to_le_bytes()); // ncmds
        bytes[20..24].copy_from_slice(&0x100_u32.to_le_bytes()); // sizeofcmds
        bytes
    }

    #[test]
    fn parses_a_valid_header() {
        let header = MachHeader::parse(&header_bytes(MH_MAGIC, CPU_TYPE_X86, MH_EXECUTE)).unwrap();
        assert_eq!(header.ncmds, 2);
        assert_eq!(header.sizeofcmds, 0x100);
    }

    #[test]
    fn rejects_bad_magic() {
        let err = MachHeader::parse(&header_bytes(0, CPU_TYPE_X86, MH_EXECUTE)).unwrap_err();
        assert_eq!(err, LoadError::BadMagic { found: 0 });
    }

    #[test]
    fn rejects_wrong_cpu_before_file_type() {
        // Both fields are wrong; the CPU type must win.
        let err = MachHeader::parse(&header_bytes(MH_MAGIC, 12, 0x6)).unwrap_err();
        assert_eq!(err, LoadError::UnsupportedArchitecture { found: 12 });
    }

    #[test]
    fn rejects_non_executables() {
        let err = MachHeader::parse(&header_bytes(MH_MAGIC, CPU_TYPE_X86, 0x6)).unwrap_err();
        assert_eq!(err, LoadError::UnsupportedFileType { found: 0x6 });
    }

    #[test]
    fn rejects_short_input() {
        let err = MachHeader::parse(&[0_u8; 12]).unwrap_err();
        assert_eq!(err, LoadError::Truncated { what: "header" });
    }
}

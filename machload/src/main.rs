//! User-space loader for 32-bit x86 Mach-O executables.
//!
//! Parses the binary, maps its segments into this process, binds its lazy
//! symbol stubs against the host's dynamic linker, builds the startup stack
//! frame and jumps to the entry point. On success this process *becomes* the
//! loaded program; control never comes back.

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic, clippy::nursery)]

mod dl;
mod exec;
mod logging;
mod vm;

use std::fs::File;
use std::io::Read;
use std::process::ExitCode;

use log::error;
use macho::{LoadOptions, LoadedImage, MachHeader, MachLoader, UnknownCommandPolicy};
use thiserror::Error;

#[derive(Debug, Error)]
enum Failure {
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Load(#[from] macho::LoadError),
}

fn main() -> ExitCode {
    logging::init();

    let Some(invocation) = Invocation::from_args() else {
        eprintln!("usage: machload [--strict] <binary>");
        return ExitCode::FAILURE;
    };

    match run(&invocation) {
        Ok(image) => {
            // Point of no return.
            unsafe { exec::transfer(image.entry_point, image.initial_esp) }
        }
        Err(failure) => {
            error!("{failure}");
            ExitCode::FAILURE
        }
    }
}

struct Invocation {
    path: String,
    options: LoadOptions,
}

impl Invocation {
    /// One required positional argument, the binary path. `--strict` makes
    /// unrecognized load commands fatal. Anything after the path is ignored.
    fn from_args() -> Option<Self> {
        let mut options = LoadOptions::default();
        let mut path = None;
        for arg in std::env::args().skip(1) {
            if arg == "--strict" {
                options.unknown_commands = UnknownCommandPolicy::Fail;
            } else if path.is_none() {
                path = Some(arg);
            }
        }
        Some(Self {
            path: path?,
            options,
        })
    }
}

fn run(invocation: &Invocation) -> Result<LoadedImage, Failure> {
    let path = &invocation.path;
    let mut file = File::open(path).map_err(|source| Failure::Open {
        path: path.clone(),
        source,
    })?;

    let mut header_bytes = [0_u8; MachHeader::LEN];
    file.read_exact(&mut header_bytes)
        .map_err(|source| Failure::Read {
            path: path.clone(),
            source,
        })?;
    let header = MachHeader::parse(&header_bytes)?;

    let mut commands = vec![0_u8; header.sizeofcmds as usize];
    file.read_exact(&mut commands)
        .map_err(|source| Failure::Read {
            path: path.clone(),
            source,
        })?;

    let mut mapper = vm::HostMapper::new(file);
    let mut resolver = dl::DlResolver::new();

    Ok(MachLoader::load(
        &header,
        &commands,
        path,
        &mut mapper,
        &mut resolver,
        invocation.options,
    )?)
}

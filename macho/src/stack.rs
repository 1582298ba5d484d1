//! The private stack region and the initial ABI frame.

use alloc::vec::Vec;

use crate::mapper::MemoryMapper;
use crate::{Result, error::LoadError};

/// Size of the loaded program's private stack.
pub const STACK_SIZE: u32 = 8192 * 1024;

const WORD: u32 = 4;

/// Allocate the stack region and return its highest address.
///
/// # Errors
///
/// Allocation failure is fatal, there is no fallback.
pub(crate) fn allocate<M: MemoryMapper>(mapper: &mut M) -> Result<u32> {
    let base = mapper
        .map_stack(STACK_SIZE)
        .map_err(|()| LoadError::StackAllocation)?;
    base.checked_add(STACK_SIZE)
        .ok_or(LoadError::StackAllocation)
}

/// Write the startup frame below `stack_top` and return the initial stack
/// pointer.
///
/// argv[0] (a copy of the input path) goes at the very top, NUL-terminated.
/// Below it, the seven words the target's C runtime startup stub expects,
/// written in the order they would be pushed: argc, argv[0], a terminator,
/// the environment pointer (NULL, the single element of an empty
/// environment), a terminator, argv[0] again, and a final terminator.
pub(crate) fn build_frame<M: MemoryMapper>(
    mapper: &mut M,
    stack_top: u32,
    argv0: &str,
) -> Result<u32> {
    let mut cstr = Vec::with_capacity(argv0.len() + 1);
    cstr.extend_from_slice(argv0.as_bytes());
    cstr.push(0);

    let len = u32::try_from(cstr.len()).map_err(|_| LoadError::Overflow)?;
    let str_addr = stack_top.checked_sub(len).ok_or(LoadError::Overflow)? & !(WORD - 1);
    mapper
        .write(str_addr, &cstr)
        .map_err(|()| LoadError::Memory { addr: str_addr })?;

    let argc = 1_u32;
    let env0 = 0_u32;
    let pushed = [argc, str_addr, 0, env0, 0, str_addr, 0];

    let mut esp = str_addr;
    for word in pushed {
        esp = esp.checked_sub(WORD).ok_or(LoadError::Overflow)?;
        mapper
            .write(esp, &word.to_le_bytes())
            .map_err(|()| LoadError::Memory { addr: esp })?;
    }
    Ok(esp)
}

//! Symbol resolution through the host's dynamic linker.

use std::ffi::CString;

use macho::SymbolResolver;

/// Resolves names against the running process itself.
///
/// The `dlopen(NULL)` handle is opened on first use and cached for every
/// later lookup of the same load. Owned by the pipeline run rather than
/// process-global, so loads never share resolver state.
pub struct DlResolver {
    handle: Option<*mut libc::c_void>,
}

impl DlResolver {
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    fn handle(&mut self) -> *mut libc::c_void {
        *self
            .handle
            .get_or_insert_with(|| unsafe { libc::dlopen(core::ptr::null(), libc::RTLD_LAZY) })
    }
}

impl Default for DlResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolResolver for DlResolver {
    fn resolve(&mut self, name: &str) -> Option<u32> {
        let name = CString::new(name).ok()?;
        let handle = self.handle();
        let address = unsafe { libc::dlsym(handle, name.as_ptr()) };
        if address.is_null() {
            None
        } else {
            u32::try_from(address as usize).ok()
        }
    }
}

impl Drop for DlResolver {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_null() {
                unsafe { libc::dlclose(handle) };
            }
        }
    }
}

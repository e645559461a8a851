//! Kernel modules and the path-keyed shader library.

use crate::error::{Result, RuntimeError};
use crate::handle::{Device, Owned};
use crate::spirv;
use ash::vk;
use std::collections::HashMap;
use std::ffi::CStr;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the entry point every kernel must export.
pub const ENTRY_POINT: &CStr = c"main";

/// A compiled kernel module loaded from a SPIR-V file.
pub struct ShaderModule {
    module: Owned<vk::ShaderModule>,
    local_size: Option<[u32; 3]>,
    path: PathBuf,
}

impl ShaderModule {
    /// Read `path` fully and hand the words to the driver.
    ///
    /// # Errors
    /// `ShaderLoad` if the file cannot be read or is not a SPIR-V word stream;
    /// `Vulkan` if the driver rejects the module.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub(crate) fn load(device: &Arc<Device>, path: &Path) -> Result<Self> {
        let shader_load = |source| RuntimeError::ShaderLoad {
            path: path.to_path_buf(),
            source,
        };
        let bytes = std::fs::read(path).map_err(shader_load)?;
        let words = ash::util::read_spv(&mut Cursor::new(&bytes)).map_err(shader_load)?;
        let local_size = spirv::local_size(&words, ENTRY_POINT);

        let info = vk::ShaderModuleCreateInfo::default().code(&words);
        // SAFETY: `read_spv` checked the word alignment and fixed endianness.
        let raw = unsafe { device.create_shader_module(&info, None) }
            .map_err(RuntimeError::vulkan("vkCreateShaderModule"))?;

        tracing::debug!(words = words.len(), ?local_size, "Loaded kernel module");
        Ok(Self {
            module: Owned::new(device, raw),
            local_size,
            path: path.to_path_buf(),
        })
    }

    pub(crate) fn raw(&self) -> vk::ShaderModule {
        self.module.raw()
    }

    /// Workgroup size declared by the kernel's `main` entry point.
    pub fn local_size(&self) -> Option<[u32; 3]> {
        self.local_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderModule")
            .field("path", &self.path)
            .field("local_size", &self.local_size)
            .finish_non_exhaustive()
    }
}

/// Path-keyed table of loaded kernel modules.
///
/// Duplicate inserts, unreadable kernel files and removals of absent paths
/// are logged and ignored.
#[derive(Debug)]
pub struct ShaderLibrary<M = ShaderModule> {
    modules: HashMap<PathBuf, M>,
}

impl<M> ShaderLibrary<M> {
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Load and insert a module unless `path` is already present.
    ///
    /// Returns `Ok(false)` for a duplicate without calling `load`, and for a
    /// kernel file that cannot be read (`ShaderLoad`), which is logged.
    ///
    /// # Errors
    /// Any other error from `load`, such as the driver rejecting the module.
    pub fn insert_with<F>(&mut self, path: impl AsRef<Path>, load: F) -> Result<bool>
    where
        F: FnOnce(&Path) -> Result<M>,
    {
        let path = path.as_ref();
        if self.modules.contains_key(path) {
            tracing::warn!(path = %path.display(), "Shader already loaded, ignoring");
            return Ok(false);
        }
        let module = match load(path) {
            Ok(module) => module,
            Err(e @ RuntimeError::ShaderLoad { .. }) => {
                tracing::error!("{e}");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        self.modules.insert(path.to_path_buf(), module);
        Ok(true)
    }

    pub fn remove(&mut self, path: impl AsRef<Path>) -> Option<M> {
        let path = path.as_ref();
        let removed = self.modules.remove(path);
        if removed.is_none() {
            tracing::warn!(path = %path.display(), "No shader loaded at this path");
        }
        removed
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&M> {
        self.modules.get(path.as_ref())
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.modules.contains_key(path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.modules.keys().map(PathBuf::as_path)
    }
}

impl<M> Default for ShaderLibrary<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_insert_and_remove() {
        let mut library = ShaderLibrary::new();
        assert!(library.is_empty());

        let inserted = library
            .insert_with("kernels/copy.spv", |p| Ok(p.display().to_string()))
            .unwrap();
        assert!(inserted);
        assert!(library.contains("kernels/copy.spv"));
        assert_eq!(library.get("kernels/copy.spv").unwrap(), "kernels/copy.spv");

        assert_eq!(library.remove("kernels/copy.spv").as_deref(), Some("kernels/copy.spv"));
        assert!(!library.contains("kernels/copy.spv"));
        assert!(library.is_empty());
    }

    #[test]
    fn test_duplicate_insert_skips_loader() {
        let calls = Cell::new(0);
        let mut library = ShaderLibrary::new();
        let load = |_: &Path| {
            calls.set(calls.get() + 1);
            Ok(7u32)
        };

        assert!(library.insert_with("a.spv", load).unwrap());
        assert!(!library.insert_with("a.spv", load).unwrap());
        assert_eq!(calls.get(), 1);
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn test_remove_absent_is_harmless() {
        let mut library: ShaderLibrary<u32> = ShaderLibrary::new();
        library.insert_with("a.spv", |_| Ok(1)).unwrap();
        assert_eq!(library.remove("b.spv"), None);
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn test_unreadable_kernel_is_logged_not_fatal() {
        let mut library: ShaderLibrary<u32> = ShaderLibrary::new();
        let inserted = library
            .insert_with("missing.spv", |p| {
                Err(RuntimeError::ShaderLoad {
                    path: p.to_path_buf(),
                    source: std::io::ErrorKind::NotFound.into(),
                })
            })
            .unwrap();
        assert!(!inserted);
        assert!(!library.contains("missing.spv"));
    }

    #[test]
    fn test_failed_load_leaves_library_unchanged() {
        let mut library: ShaderLibrary<u32> = ShaderLibrary::new();
        let result = library.insert_with("missing.spv", |_| Err(RuntimeError::NoSuitableDevice));
        assert!(result.is_err());
        assert!(library.is_empty());
        assert_eq!(library.paths().count(), 0);
    }
}

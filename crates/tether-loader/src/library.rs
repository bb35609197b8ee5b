//! Thin wrapper over a dynamically loaded glue module.

use std::fmt;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

/// A loaded shared object.
///
/// Function pointers copied out of it are only valid while it is alive;
/// callers keep an `Arc<NativeLibrary>` next to every such pointer.
pub struct NativeLibrary {
    library: Library,
    path: PathBuf,
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl NativeLibrary {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, libloading::Error> {
        let path = path.as_ref();
        // Safety: loading runs the module's initializers. Generated glue has
        // none; the linked native library is trusted by the bind caller.
        let library = unsafe { Library::new(path) }?;
        Ok(NativeLibrary {
            library,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve `name` and copy the symbol out.
    ///
    /// # Safety
    ///
    /// `F` must match the symbol's actual type, and the returned value must
    /// not outlive `self`.
    pub unsafe fn symbol<F: Copy>(&self, name: &str) -> Result<F, libloading::Error> {
        let symbol: Symbol<'_, F> = unsafe { self.library.get(name.as_bytes()) }?;
        Ok(*symbol)
    }
}

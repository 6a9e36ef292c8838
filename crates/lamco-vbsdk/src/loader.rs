//! SDK library discovery and loading
//!
//! The vendor library ships next to the application:
//!
//! | Platform | Library | Search order |
//! |----------|---------|--------------|
//! | Linux | `libtsvb.so` | executable directory, then the system search path |
//! | macOS | `libtsvb.dylib` | `<bundle>/Contents/Frameworks`, then the system search path |
//! | Windows | `tsvb.dll` | system search path (which starts at the executable directory) |
//!
//! Setting `LAMCO_VBSDK_PATH` to a file path skips discovery entirely.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use tracing::{debug, info, warn};

use crate::abi::{CreateSdkFactoryFn, CREATE_SDK_FACTORY_SYMBOL};
use crate::engine::SdkFactory;
use crate::error::{FilterError, Result};
use crate::native::{NativeSdkFactory, Owned};

/// Environment variable overriding library discovery
pub const SDK_PATH_ENV: &str = "LAMCO_VBSDK_PATH";

/// File name of the vendor library on this platform
#[cfg(target_os = "linux")]
pub const LIBRARY_NAME: &str = "libtsvb.so";
#[cfg(target_os = "macos")]
pub const LIBRARY_NAME: &str = "libtsvb.dylib";
#[cfg(target_os = "windows")]
pub const LIBRARY_NAME: &str = "tsvb.dll";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub const LIBRARY_NAME: &str = "libtsvb.so";

/// A loaded SDK library with its factory entry point resolved
pub struct SdkLibrary {
    library: Arc<Library>,
    create_factory: CreateSdkFactoryFn,
    path: PathBuf,
}

impl SdkLibrary {
    /// Locate and load the library using the platform search order
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(SDK_PATH_ENV) {
            return Self::load_from(PathBuf::from(path));
        }

        let mut last_error = format!("{LIBRARY_NAME} not found");
        for candidate in candidate_paths() {
            if candidate.is_absolute() && !candidate.exists() {
                debug!("No SDK library at {}", candidate.display());
                continue;
            }
            match Self::load_from(&candidate) {
                Ok(library) => return Ok(library),
                Err(e) => {
                    warn!("Failed to load SDK library from {}: {}", candidate.display(), e);
                    last_error = e.to_string();
                }
            }
        }

        Err(FilterError::LibraryNotFound(last_error))
    }

    /// Load the library from an explicit path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // SAFETY: loading runs the library's initializers; the SDK has no
        // initialization side effects beyond its own globals.
        let library = unsafe { Library::new(path) }
            .map_err(|e| FilterError::LibraryNotFound(format!("{}: {e}", path.display())))?;

        // SAFETY: `createSDKFactory` has the signature declared in the
        // vendor headers. The copied pointer stays valid while `library` is
        // alive, which `Self` guarantees.
        let create_factory = unsafe { library.get::<CreateSdkFactoryFn>(CREATE_SDK_FACTORY_SYMBOL) }
            .map(|symbol| *symbol)
            .map_err(|e| FilterError::symbol_missing("createSDKFactory", e))?;

        info!("Loaded SDK library from: {}", path.display());

        Ok(Self {
            library: Arc::new(library),
            create_factory,
            path: path.to_path_buf(),
        })
    }

    /// Where the library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Call the factory entry point
    ///
    /// The factory and everything it creates keep the library loaded.
    pub fn create_factory(&self) -> Result<Box<dyn SdkFactory>> {
        // SAFETY: the entry point takes no arguments and returns a new
        // factory reference or null.
        let raw = unsafe { (self.create_factory)() };
        // SAFETY: `raw` is null or an `ISDKFactory` owned by us.
        let owned = unsafe { Owned::from_raw(raw, &self.library) }.ok_or(FilterError::FactoryCreation("SDK factory"))?;
        Ok(Box::new(NativeSdkFactory::new(owned)))
    }
}

impl std::fmt::Debug for SdkLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkLibrary").field("path", &self.path).finish_non_exhaustive()
    }
}

/// Candidate locations in the order they are tried
///
/// A bare file name means "let the dynamic loader search".
pub fn candidate_paths() -> Vec<PathBuf> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    candidates_for(exe_dir.as_deref())
}

fn candidates_for(exe_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2);

    if cfg!(target_os = "macos") {
        // <bundle>/Contents/MacOS/<exe> -> <bundle>/Contents/Frameworks
        if let Some(contents) = exe_dir.and_then(Path::parent) {
            candidates.push(contents.join("Frameworks").join(LIBRARY_NAME));
        }
    } else if !cfg!(target_os = "windows") {
        if let Some(dir) = exe_dir {
            candidates.push(dir.join(LIBRARY_NAME));
        }
    }

    candidates.push(PathBuf::from(LIBRARY_NAME));
    candidates
}

//! Mounting loaded modules

use std::fmt;

use crate::module::loader::cache::LoadedModule;
use crate::module::traits::{BlockError, MountCleanup};

/// A block mounted into a container
///
/// The module's cleanup runs on `unmount`, or on drop if it was never
/// unmounted explicitly.
pub struct MountedBlock {
    block_id: String,
    container: String,
    cleanup: Option<MountCleanup>,
}

impl MountedBlock {
    pub fn block_id(&self) -> &str {
        &self.block_id
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn has_cleanup(&self) -> bool {
        self.cleanup.is_some()
    }

    pub fn unmount(mut self) {
        self.run_cleanup();
    }

    fn run_cleanup(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl Drop for MountedBlock {
    fn drop(&mut self) {
        self.run_cleanup();
    }
}

impl fmt::Debug for MountedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountedBlock")
            .field("block_id", &self.block_id)
            .field("container", &self.container)
            .field("has_cleanup", &self.cleanup.is_some())
            .finish()
    }
}

/// Mount a loaded module
///
/// A failing mount is reported with the block identifier; the loader cache
/// is not touched, the module itself loaded fine.
pub fn mount_module(
    handle: &LoadedModule,
    container: &str,
    props: &serde_json::Value,
) -> Result<MountedBlock, BlockError> {
    let cleanup = handle
        .module
        .mount(container, props)
        .map_err(|message| BlockError::MountFailed {
            block_id: handle.block_id.clone(),
            message,
        })?;

    Ok(MountedBlock {
        block_id: handle.block_id.clone(),
        container: container.to_string(),
        cleanup,
    })
}

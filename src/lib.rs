//! Declarative architecture descriptions and weight-name resolution.
//!
//! A model family is described once as a JSON template; given a concrete
//! model config the crate enumerates every named weight tensor of that
//! model, in checkpoint order, together with the alignment spaces used by
//! matching-based merge methods.

pub mod arch;
pub mod config;
pub mod error;
pub mod mapping;
pub mod registry;
pub mod template;

use once_cell::sync::OnceCell;

pub use arch::{
    Architecture, ArchitectureInfo, ConfiguredArchitecture, ProceduralSpaceInfo, SpaceKind,
    WeightInfo, WeightOverrides,
};
pub use config::ModelConfig;
pub use error::{Error, Result};
pub use mapping::Mapping;
pub use registry::Registry;

static REGISTRY: OnceCell<Result<Registry>> = OnceCell::new();

/// Builds the process-wide registry from the bundled definitions. Only the
/// first call does any work; a failed build is remembered and returned to
/// every later caller.
pub fn init() -> Result<&'static Registry> {
    init_in(&REGISTRY, Registry::bundled)
}

/// The registry built by [`init`], if it succeeded.
pub fn registry() -> Option<&'static Registry> {
    registry_in(&REGISTRY)
}

fn init_in(
    cell: &OnceCell<Result<Registry>>,
    build: impl FnOnce() -> Result<Registry>,
) -> Result<&Registry> {
    cell.get_or_init(build).as_ref().map_err(Clone::clone)
}

fn registry_in(cell: &OnceCell<Result<Registry>>) -> Option<&Registry> {
    cell.get().and_then(|res| res.as_ref().ok())
}

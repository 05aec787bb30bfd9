#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Define-driven shader variant cache for Myth materials.
//!
//! Each frame, every drawable is asked whether it is ready. The answer
//! comes from a pipeline of four parts:
//!
//! - [`DefineSet`] / [`DirtyTracker`]: shader capability flags per drawable,
//!   recomputed only for partitions whose inputs changed
//! - [`VariantCompiler`]: compiled programs cached by define key
//! - [`ReadinessGate`]: the per-drawable state machine tying them together
//! - [`UniformBindingSession`]: skips redundant uniform uploads between draws
//!
//! [`BackgroundMaterial`] is the material built on top of them.

pub mod errors;
pub mod material;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod utils;

pub use errors::{CompileError, CompileErrorKind, Result, VariantError};
pub use material::{BackgroundMaterial, BackgroundMaterialDescriptor, FeatureBlock, MaterialId};
pub use renderer::{
    BackendCaps, CompilerSettings, Drawable, FrameContext, GraphicsBackend, MeshInfo,
    ReadinessGate, ReadinessState, UniformBindingSession, VariantCompiler, VariantStatus,
};
pub use resources::{
    DefineKey, DefineSet, DirtyTracker, ImageProcessingConfiguration, Partition, ShaderDefines,
    TextureRef, TextureSource,
};
pub use scene::{Light, SceneContext};
pub use utils::interner;

//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! Two families of failure exist:
//!
//! - [`CompileError`]: the graphics backend (or the template stage in front of
//!   it) rejected a shader variant. It is reported to the owning material and
//!   cached per variant key, it never aborts a frame.
//! - [`VariantError`]: misuse of the crate API, such as writing a uniform that
//!   the current layout does not contain.
//!
//! Resources that are still loading are **not** errors: readiness checks
//! report them as `false` / [`VariantStatus::Pending`] and are retried on the
//! next frame.
//!
//! [`VariantStatus::Pending`]: crate::renderer::pipeline::VariantStatus::Pending

use thiserror::Error;

/// Why a backend refused to build a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileErrorKind {
    /// A platform limit was exceeded (uniform vectors, samplers, varyings…).
    /// Fallbacks may reduce the requirements and retry.
    LimitExceeded,
    /// The generated source failed validation.
    Validation,
    /// The shader template could not be expanded.
    Template,
    /// No source is registered for the requested shader.
    MissingSource,
}

/// A shader variant failed to compile.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?} compiling shader `{shader}`: {message}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub shader: String,
    pub message: String,
}

impl CompileError {
    #[must_use]
    pub fn new(kind: CompileErrorKind, shader: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            shader: shader.into(),
            message: message.into(),
        }
    }

    /// Returns `true` when reducing optional features could make the variant fit.
    #[inline]
    #[must_use]
    pub fn is_limit_exceeded(&self) -> bool {
        self.kind == CompileErrorKind::LimitExceeded
    }
}

/// The main error type of the crate.
#[derive(Error, Debug)]
pub enum VariantError {
    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// A shader variant could not be compiled.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Template expansion failed.
    #[error("Shader template error: {0}")]
    Template(#[from] minijinja::Error),

    // ========================================================================
    // Uniform Errors
    // ========================================================================
    /// The uniform is not part of the current layout.
    #[error("Uniform `{0}` is not part of the uniform layout")]
    UnknownUniform(String),

    /// The written value does not cover the whole uniform slot.
    #[error("Uniform `{name}` expects {expected} floats, got {actual}")]
    UniformMismatch {
        /// Name of the uniform
        name: String,
        /// Slot size in floats
        expected: usize,
        /// Supplied value size in floats
        actual: usize,
    },

    /// The uniform buffer has no layout yet.
    #[error("Uniform buffer `{0}` has not been created")]
    UniformBufferNotCreated(String),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The drawable has no resolved variant (bind called before readiness).
    #[error("Drawable {0} has no resolved shader variant")]
    NoVariant(u64),
}

/// Alias for `Result<T, VariantError>`.
pub type Result<T> = std::result::Result<T, VariantError>;

//! Shader Source Library
//!
//! Resolves a [`ShaderId`] to template source. Sources come from, in order:
//!
//! 1. runtime registrations ([`ShaderLibrary::register`]),
//! 2. deferred registrations: a future that yields the source later
//!    ([`ShaderLibrary::register_deferred`]),
//! 3. an optional directory on disk (native only, handy for hot reload),
//! 4. templates embedded in the binary from `src/shaders`.
//!
//! Deferred sources are never awaited. [`ShaderLibrary::poll_source`] polls
//! them with a no-op waker and reports [`SourceStatus::Pending`] until they
//! resolve, which keeps the requesting variant in its compiling state.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use rust_embed::RustEmbed;
use rustc_hash::FxHashMap;

use super::variant_key::ShaderId;
use crate::errors::{CompileError, CompileErrorKind};

#[derive(RustEmbed)]
#[folder = "src/shaders"]
struct ShaderAssets;

/// Future resolving to a shader source, or to a load error message.
pub type SourceFuture = BoxFuture<'static, Result<String, String>>;

enum SourceSlot {
    Ready(Arc<str>),
    Deferred(SourceFuture),
    Failed(CompileError),
}

/// Result of a source lookup.
#[derive(Debug, Clone)]
pub enum SourceStatus {
    Ready(Arc<str>),
    Pending,
    Failed(CompileError),
}

pub struct ShaderLibrary {
    sources: FxHashMap<ShaderId, SourceSlot>,
    shader_dir: Option<PathBuf>,
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ShaderLibrary {
    #[must_use]
    pub fn new(shader_dir: Option<PathBuf>) -> Self {
        Self {
            sources: FxHashMap::default(),
            shader_dir,
        }
    }

    /// Registers (or replaces) a source.
    pub fn register(&mut self, shader: ShaderId, source: impl Into<Arc<str>>) {
        self.sources.insert(shader, SourceSlot::Ready(source.into()));
    }

    /// Registers a source that becomes available once `future` resolves.
    pub fn register_deferred(&mut self, shader: ShaderId, future: SourceFuture) {
        self.sources.insert(shader, SourceSlot::Deferred(future));
    }

    /// Forgets a resolved source so the next lookup reloads it.
    pub fn invalidate(&mut self, shader: ShaderId) {
        self.sources.remove(&shader);
    }

    #[must_use]
    pub fn contains(&self, shader: ShaderId) -> bool {
        self.sources.contains_key(&shader) || Self::embedded(shader).is_some()
    }

    /// Resolves the source of `shader` without blocking.
    pub fn poll_source(&mut self, shader: ShaderId) -> SourceStatus {
        if !self.sources.contains_key(&shader) {
            let slot = match self.load_static(shader) {
                Some(Ok(source)) => SourceSlot::Ready(source.into()),
                Some(Err(error)) => SourceSlot::Failed(error),
                None => SourceSlot::Failed(CompileError::new(
                    CompileErrorKind::MissingSource,
                    shader.name(),
                    "no source registered or embedded",
                )),
            };
            self.sources.insert(shader, slot);
        }

        let Some(slot) = self.sources.get_mut(&shader) else {
            return SourceStatus::Pending;
        };

        if let SourceSlot::Deferred(future) = slot {
            let mut cx = Context::from_waker(futures::task::noop_waker_ref());
            match future.poll_unpin(&mut cx) {
                Poll::Pending => return SourceStatus::Pending,
                Poll::Ready(Ok(source)) => {
                    log::debug!("Deferred shader source `{shader}` resolved");
                    *slot = SourceSlot::Ready(source.into());
                }
                Poll::Ready(Err(message)) => {
                    log::error!("Deferred shader source `{shader}` failed: {message}");
                    *slot = SourceSlot::Failed(CompileError::new(
                        CompileErrorKind::MissingSource,
                        shader.name(),
                        message,
                    ));
                }
            }
        }

        match slot {
            SourceSlot::Ready(source) => SourceStatus::Ready(source.clone()),
            SourceSlot::Failed(error) => SourceStatus::Failed(error.clone()),
            SourceSlot::Deferred(_) => SourceStatus::Pending,
        }
    }

    fn file_name(shader: ShaderId) -> Cow<'static, str> {
        let name = shader.name();
        if std::path::Path::new(name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wgsl"))
        {
            Cow::Borrowed(name)
        } else {
            Cow::Owned(format!("{name}.wgsl"))
        }
    }

    fn embedded(shader: ShaderId) -> Option<String> {
        let file = ShaderAssets::get(&Self::file_name(shader))?;
        std::str::from_utf8(file.data.as_ref())
            .ok()
            .map(str::to_owned)
    }

    fn load_static(&self, shader: ShaderId) -> Option<Result<String, CompileError>> {
        #[cfg(not(target_arch = "wasm32"))]
        if let Some(dir) = &self.shader_dir {
            let path = dir.join(Self::file_name(shader).as_ref());
            if path.exists() {
                return Some(std::fs::read_to_string(&path).map_err(|e| {
                    CompileError::new(
                        CompileErrorKind::MissingSource,
                        shader.name(),
                        format!("Failed to read {}: {e}", path.display()),
                    )
                }));
            }
        }

        Self::embedded(shader).map(Ok)
    }
}

/// Loads template includes (`{$ include "chunk" $}`) from the embedded assets.
pub(crate) fn embedded_include_loader(name: &str) -> Result<Option<String>, minijinja::Error> {
    let file_name = if name.ends_with(".wgsl") {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.wgsl"))
    };
    Ok(ShaderAssets::get(&file_name)
        .and_then(|file| std::str::from_utf8(file.data.as_ref()).ok().map(str::to_owned)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_background_template_is_found() {
        let mut library = ShaderLibrary::default();
        let status = library.poll_source(ShaderId::new("background"));
        assert!(matches!(status, SourceStatus::Ready(_)));
    }

    #[test]
    fn unknown_shader_is_missing() {
        let mut library = ShaderLibrary::default();
        match library.poll_source(ShaderId::new("does_not_exist")) {
            SourceStatus::Failed(e) => assert_eq!(e.kind, CompileErrorKind::MissingSource),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn deferred_source_stays_pending_until_resolved() {
        let (tx, rx) = futures::channel::oneshot::channel::<String>();
        let mut library = ShaderLibrary::default();
        let shader = ShaderId::new("deferred_test_shader");
        library.register_deferred(
            shader,
            Box::pin(async move { rx.await.map_err(|e| e.to_string()) }),
        );

        assert!(matches!(library.poll_source(shader), SourceStatus::Pending));
        assert!(matches!(library.poll_source(shader), SourceStatus::Pending));

        tx.send("fn main() {}".to_owned()).unwrap();
        match library.poll_source(shader) {
            SourceStatus::Ready(source) => assert_eq!(&*source, "fn main() {}"),
            other => panic!("unexpected status {other:?}"),
        }
    }
}

//! Variant Compiler
//!
//! Central owner of every compiled shader variant. Variants are addressed by
//! a structured [`VariantKey`] (base shader + canonical define key) and handed
//! out as shared [`Arc<CompiledVariant>`]s.
//!
//! # Compile lifecycle
//!
//! ```text
//!  miss ──► AwaitingSource ──► create_program ──► Linking ──► Ready
//!                 ▲                   │               │
//!                 └── fallback ◄──────┴─ LimitExceeded┘
//!                                     │               │
//!                                     └──► Failed ◄───┘
//! ```
//!
//! - At most one compile is in flight per key; every later request for the
//!   same key joins it and observes the same result.
//! - A failed key stays failed. It is only retried through
//!   [`VariantCompiler::force_recompile`], so a permanently broken define
//!   combination costs one compile, not one per frame.
//! - Limit rejections reduce the define set through the request's
//!   [`FallbackList`] and retry, up to
//!   [`CompilerSettings::max_fallback_attempts`] times.
//! - Keys whose expanded source and interface hash equal share one backend
//!   program. Programs are reference counted and released with their last
//!   variant.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::Xxh3;

use super::fallbacks::FallbackList;
use super::shader_gen::ShaderGenerator;
use super::shader_library::{ShaderLibrary, SourceStatus};
use super::variant_key::{ShaderId, VariantKey};
use crate::errors::{CompileError, Result};
use crate::renderer::backend::{GraphicsBackend, ProgramHandle, ProgramRequest, ProgramStatus};
use crate::renderer::settings::CompilerSettings;
use crate::resources::shader_defines::{DefineKey, ShaderDefines};

// ─── Public Types ────────────────────────────────────────────────────────────

/// An immutable, linked shader variant.
#[derive(Debug)]
pub struct CompiledVariant {
    pub shader: ShaderId,
    /// Key the variant was requested with (before fallbacks).
    pub key: DefineKey,
    /// Defines the program was actually built with.
    pub defines: ShaderDefines,
    pub program: ProgramHandle,
    pub attributes: Vec<&'static str>,
    pub uniforms: Vec<&'static str>,
    pub samplers: Vec<&'static str>,
    /// Defines removed by fallback reduction, in removal order.
    pub fallbacks_applied: Vec<&'static str>,
    /// Skinning was moved off the GPU to fit platform limits.
    pub uses_cpu_skinning: bool,
    /// xxh3-128 of the expanded source and its attribute, uniform and
    /// sampler lists. Variants with equal hashes share `program`.
    pub source_hash: u128,
}

impl CompiledVariant {
    #[must_use]
    pub fn variant_key(&self) -> VariantKey {
        VariantKey::new(self.shader, self.key.clone())
    }
}

/// Everything needed to build a variant on a cache miss.
#[derive(Debug, Clone, Copy)]
pub struct VariantRequest<'a> {
    pub shader: ShaderId,
    pub define_key: &'a DefineKey,
    pub defines: &'a ShaderDefines,
    pub attributes: &'a [&'static str],
    pub uniforms: &'a [&'static str],
    pub samplers: &'a [&'static str],
    pub fallbacks: &'a FallbackList,
    /// WGSL declaration of the material uniform block.
    pub binding_code: &'a str,
}

/// Outcome of a variant lookup.
#[derive(Debug, Clone)]
pub enum VariantStatus {
    /// Source loading or program linking still in progress.
    Pending,
    Ready(Arc<CompiledVariant>),
    Failed(CompileError),
}

impl VariantStatus {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

// ─── Internal State ──────────────────────────────────────────────────────────

/// Owned copy of a request, kept while the compile is in flight.
struct PendingCompile {
    defines: ShaderDefines,
    attributes: Vec<&'static str>,
    uniforms: Vec<&'static str>,
    samplers: Vec<&'static str>,
    fallbacks: FallbackList,
    binding_code: String,
    applied: Vec<&'static str>,
    cpu_skinning: bool,
    attempts: u32,
    source_hash: u128,
}

enum CacheEntry {
    AwaitingSource(PendingCompile),
    Linking(ProgramHandle, PendingCompile),
    Ready(Arc<CompiledVariant>),
    Failed(CompileError),
}

// ─── Variant Compiler ────────────────────────────────────────────────────────

pub struct VariantCompiler {
    settings: CompilerSettings,
    library: ShaderLibrary,
    generator: ShaderGenerator,
    entries: FxHashMap<VariantKey, CacheEntry>,
    /// Replaced variants that drawables may still reference.
    retired: Vec<Arc<CompiledVariant>>,
    /// Users of each live program (ready, linking and retired variants).
    program_users: FxHashMap<ProgramHandle, u32>,
    /// Reusable program per source hash.
    programs_by_source: FxHashMap<u128, ProgramHandle>,
    compile_count: u64,
}

impl VariantCompiler {
    pub fn new(settings: CompilerSettings) -> Result<Self> {
        if settings.preload_common_defines {
            crate::utils::interner::preload_common_defines();
        }
        Ok(Self {
            library: ShaderLibrary::new(settings.shader_dir.clone()),
            generator: ShaderGenerator::new(settings.debug_print_shaders)?,
            settings,
            entries: FxHashMap::default(),
            retired: Vec::new(),
            program_users: FxHashMap::default(),
            programs_by_source: FxHashMap::default(),
            compile_count: 0,
        })
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn library(&self) -> &ShaderLibrary {
        &self.library
    }

    #[inline]
    pub fn library_mut(&mut self) -> &mut ShaderLibrary {
        &mut self.library
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    /// Returns the variant for `request`, compiling it on a miss.
    pub fn get_or_compile(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        request: &VariantRequest<'_>,
    ) -> VariantStatus {
        let key = VariantKey::new(request.shader, request.define_key.clone());

        match self.entries.get(&key) {
            Some(CacheEntry::Ready(variant)) => return VariantStatus::Ready(variant.clone()),
            Some(CacheEntry::Failed(error)) => return VariantStatus::Failed(error.clone()),
            Some(_) => {}
            None => {
                log::debug!(
                    "Variant miss for `{}` ({:?}), scheduling compile",
                    request.shader,
                    request.define_key
                );
                self.entries.insert(
                    key.clone(),
                    CacheEntry::AwaitingSource(PendingCompile {
                        defines: request.defines.clone(),
                        attributes: request.attributes.to_vec(),
                        uniforms: request.uniforms.to_vec(),
                        samplers: request.samplers.to_vec(),
                        fallbacks: request.fallbacks.clone(),
                        binding_code: request.binding_code.to_owned(),
                        applied: Vec::new(),
                        cpu_skinning: false,
                        attempts: 0,
                        source_hash: 0,
                    }),
                );
            }
        }

        self.advance(backend, &key)
    }

    /// Polls a previously requested variant. `None` if it was never requested.
    pub fn poll(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        key: &VariantKey,
    ) -> Option<VariantStatus> {
        match self.entries.get(key)? {
            CacheEntry::Ready(variant) => Some(VariantStatus::Ready(variant.clone())),
            CacheEntry::Failed(error) => Some(VariantStatus::Failed(error.clone())),
            _ => Some(self.advance(backend, key)),
        }
    }

    /// Returns a ready variant without side effects.
    #[must_use]
    pub fn get(&self, key: &VariantKey) -> Option<&Arc<CompiledVariant>> {
        match self.entries.get(key) {
            Some(CacheEntry::Ready(variant)) => Some(variant),
            _ => None,
        }
    }

    /// Drives an in-flight entry as far as it can go without blocking.
    fn advance(&mut self, backend: &mut dyn GraphicsBackend, key: &VariantKey) -> VariantStatus {
        let Some(entry) = self.entries.remove(key) else {
            return VariantStatus::Pending;
        };

        let (entry, status) = match entry {
            CacheEntry::AwaitingSource(pending) => self.start_compile(backend, key, pending),
            CacheEntry::Linking(program, pending) => self.check_link(backend, key, program, pending),
            CacheEntry::Ready(variant) => {
                let status = VariantStatus::Ready(variant.clone());
                (CacheEntry::Ready(variant), status)
            }
            CacheEntry::Failed(error) => {
                let status = VariantStatus::Failed(error.clone());
                (CacheEntry::Failed(error), status)
            }
        };

        self.entries.insert(key.clone(), entry);
        status
    }

    fn start_compile(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        key: &VariantKey,
        mut pending: PendingCompile,
    ) -> (CacheEntry, VariantStatus) {
        let template = match self.library.poll_source(key.shader) {
            SourceStatus::Pending => {
                return (CacheEntry::AwaitingSource(pending), VariantStatus::Pending);
            }
            SourceStatus::Failed(error) => return self.fail(key, error),
            SourceStatus::Ready(template) => template,
        };

        loop {
            let source = match self.generator.generate(
                key.shader,
                &template,
                &pending.defines,
                &pending.binding_code,
            ) {
                Ok(source) => source,
                Err(error) => return self.fail(key, error),
            };
            pending.source_hash = program_hash(&source, &pending);

            if let Some(&program) = self.programs_by_source.get(&pending.source_hash) {
                log::debug!(
                    "Variant `{}` {:?} reuses {program:?} (identical source)",
                    key.shader,
                    key.defines
                );
                self.acquire(program);
                return self.check_link(backend, key, program, pending);
            }

            let request = ProgramRequest {
                shader: key.shader.name(),
                define_key: &key.defines,
                defines: &pending.defines,
                source: &source,
                attributes: &pending.attributes,
                uniforms: &pending.uniforms,
                samplers: &pending.samplers,
                fallbacks: &pending.fallbacks,
            };

            self.compile_count += 1;
            match backend.create_program(&request) {
                Ok(program) => {
                    self.acquire(program);
                    self.programs_by_source.insert(pending.source_hash, program);
                    return self.check_link(backend, key, program, pending);
                }
                Err(error) => {
                    if !self.try_fallback(key, &mut pending, &error) {
                        return self.fail(key, error);
                    }
                }
            }
        }
    }

    fn check_link(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        key: &VariantKey,
        program: ProgramHandle,
        mut pending: PendingCompile,
    ) -> (CacheEntry, VariantStatus) {
        match backend.program_status(program) {
            ProgramStatus::Linking => (CacheEntry::Linking(program, pending), VariantStatus::Pending),
            ProgramStatus::Ready => {
                let variant = Arc::new(CompiledVariant {
                    shader: key.shader,
                    key: key.defines.clone(),
                    defines: pending.defines,
                    program,
                    attributes: pending.attributes,
                    uniforms: pending.uniforms,
                    samplers: pending.samplers,
                    fallbacks_applied: pending.applied,
                    uses_cpu_skinning: pending.cpu_skinning,
                    source_hash: pending.source_hash,
                });
                log::debug!("Variant `{}` {:?} ready ({program:?})", key.shader, key.defines);
                (CacheEntry::Ready(variant.clone()), VariantStatus::Ready(variant))
            }
            ProgramStatus::Failed(error) => {
                // A reduced retry must not land on the same failing program.
                self.detach(pending.source_hash, program);
                self.release(backend, program);
                if self.try_fallback(key, &mut pending, &error) {
                    self.start_compile(backend, key, pending)
                } else {
                    self.fail(key, error)
                }
            }
        }
    }

    /// Reduces `pending` after a limit rejection. `false` if no retry is possible.
    fn try_fallback(
        &self,
        key: &VariantKey,
        pending: &mut PendingCompile,
        error: &CompileError,
    ) -> bool {
        if !error.is_limit_exceeded() || pending.attempts >= self.settings.max_fallback_attempts {
            return false;
        }

        while let Some(reduction) = pending.fallbacks.reduce(&mut pending.defines) {
            pending.attempts += 1;
            if reduction.removed.is_empty() && !reduction.cpu_skinning {
                continue;
            }
            log::warn!(
                "Variant `{}` exceeded platform limits, retrying without {:?}{}",
                key.shader,
                reduction.removed,
                if reduction.cpu_skinning { " (CPU skinning)" } else { "" }
            );
            pending.applied.extend(reduction.removed);
            pending.cpu_skinning |= reduction.cpu_skinning;
            return true;
        }
        false
    }

    fn fail(&self, key: &VariantKey, error: CompileError) -> (CacheEntry, VariantStatus) {
        log::error!("Failed to compile variant `{}` {:?}: {error}", key.shader, key.defines);
        (CacheEntry::Failed(error.clone()), VariantStatus::Failed(error))
    }

    // ── Invalidation ─────────────────────────────────────────────────────────

    /// Drops the cached result for `key` so the next request compiles again.
    ///
    /// Returns `true` if an entry existed.
    pub fn force_recompile(&mut self, backend: &mut dyn GraphicsBackend, key: &VariantKey) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        self.retire(backend, entry);
        true
    }

    /// Drops every variant of `shader` and forgets its source (hot reload).
    pub fn invalidate_shader(&mut self, backend: &mut dyn GraphicsBackend, shader: ShaderId) -> usize {
        let keys: Vec<VariantKey> = self
            .entries
            .keys()
            .filter(|k| k.shader == shader)
            .cloned()
            .collect();
        for key in &keys {
            if let Some(entry) = self.entries.remove(key) {
                self.retire(backend, entry);
            }
        }
        self.library.invalidate(shader);
        log::debug!("Invalidated {} variant(s) of `{shader}`", keys.len());
        keys.len()
    }

    /// Moves an entry out of service. Its program is no longer handed out
    /// for new requests.
    fn retire(&mut self, backend: &mut dyn GraphicsBackend, entry: CacheEntry) {
        match entry {
            CacheEntry::Ready(variant) => {
                self.detach(variant.source_hash, variant.program);
                self.retired.push(variant);
            }
            CacheEntry::Linking(program, pending) => {
                self.detach(pending.source_hash, program);
                self.release(backend, program);
            }
            CacheEntry::AwaitingSource(_) | CacheEntry::Failed(_) => {}
        }
    }

    /// Drops variants no drawable references anymore and releases programs
    /// left without users. Returns the number of variants dropped.
    pub fn collect_unused(&mut self, backend: &mut dyn GraphicsBackend) -> usize {
        let mut unused = Vec::new();

        self.retired.retain(|variant| {
            if Arc::strong_count(variant) == 1 {
                unused.push(variant.program);
                false
            } else {
                true
            }
        });

        self.entries.retain(|_, entry| match entry {
            CacheEntry::Ready(variant) if Arc::strong_count(variant) == 1 => {
                unused.push(variant.program);
                false
            }
            _ => true,
        });

        for &program in &unused {
            self.release(backend, program);
        }
        if !unused.is_empty() {
            log::debug!("Dropped {} unused shader variant(s)", unused.len());
        }
        unused.len()
    }

    // ── Program sharing ──────────────────────────────────────────────────────

    fn acquire(&mut self, program: ProgramHandle) {
        *self.program_users.entry(program).or_insert(0) += 1;
    }

    /// Drops one user of `program`; the last one releases it on the backend.
    fn release(&mut self, backend: &mut dyn GraphicsBackend, program: ProgramHandle) {
        if let Some(users) = self.program_users.get_mut(&program) {
            *users -= 1;
            if *users > 0 {
                return;
            }
            self.program_users.remove(&program);
        }
        self.programs_by_source.retain(|_, p| *p != program);
        backend.release_program(program);
    }

    /// Stops handing out `program` for new requests with `hash`. Current
    /// users keep it.
    fn detach(&mut self, hash: u128, program: ProgramHandle) {
        if self.programs_by_source.get(&hash) == Some(&program) {
            self.programs_by_source.remove(&hash);
        }
    }

    // ── Statistics ───────────────────────────────────────────────────────────

    /// Number of ready variants.
    #[must_use]
    pub fn variant_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, CacheEntry::Ready(_)))
            .count()
    }

    /// Number of compiles still in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, CacheEntry::AwaitingSource(_) | CacheEntry::Linking(..)))
            .count()
    }

    /// Number of backend programs currently alive.
    #[must_use]
    pub fn program_count(&self) -> usize {
        self.program_users.len()
    }

    /// Total number of `create_program` calls issued so far.
    #[inline]
    #[must_use]
    pub fn compile_count(&self) -> u64 {
        self.compile_count
    }
}

/// Identity of a backend program: its source plus the interface it is
/// created with.
fn program_hash(source: &str, pending: &PendingCompile) -> u128 {
    let mut hasher = Xxh3::new();
    hasher.update(source.as_bytes());
    for list in [&pending.attributes, &pending.uniforms, &pending.samplers] {
        hasher.update(&[0xff]);
        for name in list {
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
        }
    }
    hasher.digest128()
}

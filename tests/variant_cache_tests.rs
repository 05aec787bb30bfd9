//! Variant compiler tests: cache law, in-flight joins, failure caching,
//! fallbacks, deferred sources and cleanup.

mod common;

use std::sync::Arc;

use common::MockBackend;
use myth_variants::errors::CompileErrorKind;
use myth_variants::renderer::{
    CompilerSettings, FallbackList, ShaderId, VariantCompiler, VariantKey, VariantRequest,
    VariantStatus,
};
use myth_variants::resources::{DefineKey, ShaderDefines};

const TEMPLATE: &str = "\
$$ if FOG
fog
$$ endif
$$ if POINTSIZE
point_size
$$ endif
$$ if LIGHT0
lights={{ LIGHT0 }}
$$ endif
{{ binding_code }}
";

fn compiler_with(shader: &str) -> (VariantCompiler, ShaderId) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut compiler = VariantCompiler::new(CompilerSettings::default()).expect("compiler");
    let id = ShaderId::new(shader);
    compiler.library_mut().register(id, TEMPLATE);
    (compiler, id)
}

fn defines(names: &[&str]) -> ShaderDefines {
    let mut defines = ShaderDefines::new();
    for name in names {
        defines.set_bool(name, true);
    }
    defines
}

fn request<'a>(
    shader: ShaderId,
    key: &'a DefineKey,
    defines: &'a ShaderDefines,
    fallbacks: &'a FallbackList,
) -> VariantRequest<'a> {
    VariantRequest {
        shader,
        define_key: key,
        defines,
        attributes: &["position"],
        uniforms: &["vPrimaryColor"],
        samplers: &[],
        fallbacks,
        binding_code: "struct Material { vPrimaryColor: vec4<f32> };",
    }
}

fn compile(
    compiler: &mut VariantCompiler,
    backend: &mut MockBackend,
    shader: ShaderId,
    defines: &ShaderDefines,
) -> VariantStatus {
    let key = defines.to_key();
    let fallbacks = FallbackList::standard(defines, 4);
    compiler.get_or_compile(backend, &request(shader, &key, defines, &fallbacks))
}

fn ready(status: VariantStatus) -> Arc<myth_variants::renderer::CompiledVariant> {
    match status {
        VariantStatus::Ready(variant) => variant,
        other => panic!("expected a ready variant, got {other:?}"),
    }
}

// ============================================================================
// Cache law
// ============================================================================

#[test]
fn equal_keys_share_one_compiled_variant() {
    let (mut compiler, shader) = compiler_with("cache_law");
    let mut backend = MockBackend::new();
    let set = defines(&["FOG", "LIGHT0"]);

    let first = ready(compile(&mut compiler, &mut backend, shader, &set));
    let second = ready(compile(&mut compiler, &mut backend, shader, &set));

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(backend.create_count(), 1);
    assert_eq!(compiler.compile_count(), 1);
    assert_eq!(compiler.variant_count(), 1);
}

#[test]
fn insertion_order_does_not_change_the_key() {
    let (mut compiler, shader) = compiler_with("cache_order");
    let mut backend = MockBackend::new();

    let mut a = ShaderDefines::new();
    a.set_bool("POINTSIZE", true);
    a.set_bool("FOG", true);
    let mut b = ShaderDefines::new();
    b.set_bool("FOG", true);
    b.set_bool("POINTSIZE", true);
    b.set_bool("LOGARITHMICDEPTH", false);

    assert_eq!(a.to_key(), b.to_key());
    let first = ready(compile(&mut compiler, &mut backend, shader, &a));
    let second = ready(compile(&mut compiler, &mut backend, shader, &b));
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(backend.create_count(), 1);
}

#[test]
fn different_shaders_never_share_variants() {
    let (mut compiler, first_shader) = compiler_with("cache_shader_a");
    let second_shader = ShaderId::new("cache_shader_b");
    compiler.library_mut().register(second_shader, TEMPLATE);
    let mut backend = MockBackend::new();
    let set = defines(&["FOG"]);

    let a = ready(compile(&mut compiler, &mut backend, first_shader, &set));
    let b = ready(compile(&mut compiler, &mut backend, second_shader, &set));
    assert_ne!(a.program, b.program);
    assert_eq!(backend.create_count(), 2);
}

#[test]
fn generated_source_follows_the_defines() {
    let (mut compiler, shader) = compiler_with("cache_source");
    let mut backend = MockBackend::new();

    let mut set = defines(&["FOG"]);
    set.set_int("LIGHT0", 1);
    let variant = ready(compile(&mut compiler, &mut backend, shader, &set));

    let source = &backend.last_program().source;
    assert!(source.contains("fog"));
    assert!(!source.contains("point_size"));
    assert!(source.contains("lights=1"));
    assert!(source.contains("struct Material"));
    assert_eq!(backend.last_program().define_key, set.to_key().as_str());
    assert_ne!(variant.source_hash, 0);
}

// ============================================================================
// In-flight compiles
// ============================================================================

#[test]
fn linking_programs_stay_pending_and_are_joined() {
    let (mut compiler, shader) = compiler_with("cache_linking");
    let mut backend = MockBackend::new();
    backend.link_delay = 2;
    let set = defines(&["FOG"]);

    assert!(compile(&mut compiler, &mut backend, shader, &set).is_pending());
    assert_eq!(compiler.pending_count(), 1);
    assert!(compile(&mut compiler, &mut backend, shader, &set).is_pending());
    assert!(compile(&mut compiler, &mut backend, shader, &set).is_ready());

    assert_eq!(backend.create_count(), 1);
    assert_eq!(compiler.pending_count(), 0);
}

#[test]
fn poll_advances_without_a_request() {
    let (mut compiler, shader) = compiler_with("cache_poll");
    let mut backend = MockBackend::new();
    backend.link_delay = 1;
    let set = defines(&["POINTSIZE"]);
    let key = VariantKey::new(shader, set.to_key());

    assert!(compiler.poll(&mut backend, &key).is_none());
    assert!(compile(&mut compiler, &mut backend, shader, &set).is_pending());
    assert!(compiler.get(&key).is_none());

    let status = compiler.poll(&mut backend, &key).expect("requested");
    assert!(status.is_ready());
    assert!(compiler.get(&key).is_some());
}

#[test]
fn deferred_source_keeps_the_variant_compiling() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut compiler = VariantCompiler::new(CompilerSettings::default()).expect("compiler");
    let mut backend = MockBackend::new();
    let shader = ShaderId::new("cache_deferred");

    let (sender, receiver) = futures::channel::oneshot::channel::<String>();
    compiler.library_mut().register_deferred(
        shader,
        Box::pin(async move { receiver.await.map_err(|e| e.to_string()) }),
    );

    let set = defines(&["FOG"]);
    assert!(compile(&mut compiler, &mut backend, shader, &set).is_pending());
    assert!(compile(&mut compiler, &mut backend, shader, &set).is_pending());
    assert_eq!(backend.create_count(), 0);

    sender.send(TEMPLATE.to_owned()).expect("receiver alive");
    assert!(compile(&mut compiler, &mut backend, shader, &set).is_ready());
    assert_eq!(backend.create_count(), 1);
}

#[test]
fn dropped_deferred_source_fails_the_variant() {
    let mut compiler = VariantCompiler::new(CompilerSettings::default()).expect("compiler");
    let mut backend = MockBackend::new();
    let shader = ShaderId::new("cache_deferred_dropped");

    let (sender, receiver) = futures::channel::oneshot::channel::<String>();
    compiler.library_mut().register_deferred(
        shader,
        Box::pin(async move { receiver.await.map_err(|e| e.to_string()) }),
    );
    drop(sender);

    match compile(&mut compiler, &mut backend, shader, &defines(&[])) {
        VariantStatus::Failed(error) => assert_eq!(error.kind, CompileErrorKind::MissingSource),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn unknown_shader_fails_with_missing_source() {
    let mut compiler = VariantCompiler::new(CompilerSettings::default()).expect("compiler");
    let mut backend = MockBackend::new();

    match compile(&mut compiler, &mut backend, ShaderId::new("no_such_shader"), &defines(&[])) {
        VariantStatus::Failed(error) => assert_eq!(error.kind, CompileErrorKind::MissingSource),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(backend.create_count(), 0);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn failed_keys_are_not_retried_until_forced() {
    let (mut compiler, shader) = compiler_with("cache_failed");
    let mut backend = MockBackend::new();
    backend.reject_all = true;
    let set = defines(&["FOG"]);
    let key = VariantKey::new(shader, set.to_key());

    assert!(matches!(
        compile(&mut compiler, &mut backend, shader, &set),
        VariantStatus::Failed(_)
    ));
    assert!(matches!(
        compile(&mut compiler, &mut backend, shader, &set),
        VariantStatus::Failed(_)
    ));
    assert_eq!(backend.create_count(), 1);

    backend.reject_all = false;
    assert!(compiler.force_recompile(&mut backend, &key));
    assert!(compile(&mut compiler, &mut backend, shader, &set).is_ready());
    assert_eq!(backend.create_count(), 2);
}

#[test]
fn a_failed_key_does_not_poison_other_keys() {
    let (mut compiler, shader) = compiler_with("cache_isolated_failure");
    let mut backend = MockBackend::new();
    backend.limit_defines = vec!["LOGARITHMICDEPTH"];

    // No fallback can remove LOGARITHMICDEPTH.
    let broken = defines(&["LOGARITHMICDEPTH"]);
    match compile(&mut compiler, &mut backend, shader, &broken) {
        VariantStatus::Failed(error) => assert!(error.is_limit_exceeded()),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(compile(&mut compiler, &mut backend, shader, &defines(&["FOG"])).is_ready());
}

#[test]
fn template_errors_are_reported_as_failures() {
    let mut compiler = VariantCompiler::new(CompilerSettings::default()).expect("compiler");
    let mut backend = MockBackend::new();
    let shader = ShaderId::new("cache_bad_template");
    compiler.library_mut().register(shader, "$$ if FOG\nunterminated\n");

    match compile(&mut compiler, &mut backend, shader, &defines(&["FOG"])) {
        VariantStatus::Failed(error) => assert_eq!(error.kind, CompileErrorKind::Template),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(backend.create_count(), 0);
}

// ============================================================================
// Program sharing
// ============================================================================

#[test]
fn identical_sources_share_one_program() {
    let (mut compiler, shader) = compiler_with("cache_shared");
    let mut backend = MockBackend::new();
    // NORMAL is not read by the template, so both keys expand to one source
    let plain = defines(&["FOG"]);
    let with_normal = defines(&["FOG", "NORMAL"]);
    assert_ne!(plain.to_key(), with_normal.to_key());

    let a = ready(compile(&mut compiler, &mut backend, shader, &plain));
    let b = ready(compile(&mut compiler, &mut backend, shader, &with_normal));

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.program, b.program);
    assert_eq!(a.source_hash, b.source_hash);
    assert_eq!(backend.create_count(), 1);
    assert_eq!(compiler.compile_count(), 1);
    assert_eq!(compiler.variant_count(), 2);
    assert_eq!(compiler.program_count(), 1);
}

#[test]
fn shared_programs_are_released_with_their_last_variant() {
    let (mut compiler, shader) = compiler_with("cache_shared_release");
    let mut backend = MockBackend::new();

    let a = ready(compile(&mut compiler, &mut backend, shader, &defines(&["FOG"])));
    let b = ready(compile(&mut compiler, &mut backend, shader, &defines(&["FOG", "NORMAL"])));
    let program = a.program;

    drop(a);
    assert_eq!(compiler.collect_unused(&mut backend), 1);
    assert!(backend.released_programs.is_empty());
    assert_eq!(compiler.program_count(), 1);

    drop(b);
    assert_eq!(compiler.collect_unused(&mut backend), 1);
    assert_eq!(backend.released_programs, vec![program]);
    assert_eq!(compiler.program_count(), 0);
}

#[test]
fn sharing_joins_a_program_that_is_still_linking() {
    let (mut compiler, shader) = compiler_with("cache_shared_linking");
    let mut backend = MockBackend::new();
    backend.link_delay = 1;
    let plain = defines(&["FOG"]);
    let with_normal = defines(&["FOG", "NORMAL"]);

    assert!(compile(&mut compiler, &mut backend, shader, &plain).is_pending());
    let b = ready(compile(&mut compiler, &mut backend, shader, &with_normal));
    let a = ready(compile(&mut compiler, &mut backend, shader, &plain));

    assert_eq!(a.program, b.program);
    assert_eq!(backend.create_count(), 1);
}

#[test]
fn different_interfaces_do_not_share_programs() {
    let (mut compiler, shader) = compiler_with("cache_shared_interface");
    let mut backend = MockBackend::new();
    let set = defines(&["FOG"]);
    let key = set.to_key();
    let fallbacks = FallbackList::standard(&set, 4);

    let plain = ready(compiler.get_or_compile(&mut backend, &request(shader, &key, &set, &fallbacks)));

    let other = defines(&["FOG", "NORMAL"]);
    let other_key = other.to_key();
    let other_fallbacks = FallbackList::standard(&other, 4);
    let with_normals = VariantRequest {
        attributes: &["position", "normal"],
        ..request(shader, &other_key, &other, &other_fallbacks)
    };
    let normals = ready(compiler.get_or_compile(&mut backend, &with_normals));

    assert_ne!(plain.program, normals.program);
    assert_eq!(backend.create_count(), 2);
}

// ============================================================================
// Fallbacks
// ============================================================================

#[test]
fn limit_errors_drop_the_lowest_rank_first() {
    let (mut compiler, shader) = compiler_with("cache_fallback_rank");
    let mut backend = MockBackend::new();
    backend.limit_defines = vec!["FOG"];
    let set = defines(&["FOG", "POINTSIZE"]);

    let variant = ready(compile(&mut compiler, &mut backend, shader, &set));
    assert_eq!(variant.fallbacks_applied, vec!["FOG"]);
    assert!(!variant.defines.is_enabled("FOG"));
    assert!(variant.defines.is_enabled("POINTSIZE"));
    // Cached under the requested key, not the reduced one
    assert_eq!(variant.key, set.to_key());
    assert_eq!(backend.create_count(), 2);
    assert!(!backend.last_program().source.contains("\nfog\n"));
}

#[test]
fn fallbacks_walk_shadows_before_extra_lights() {
    let (mut compiler, shader) = compiler_with("cache_fallback_lights");
    let mut backend = MockBackend::new();
    backend.limit_defines = vec!["LIGHT1"];
    let set = defines(&[
        "FOG", "LIGHT0", "DIRLIGHT0", "LIGHT1", "POINTLIGHT1", "SHADOW0", "SHADOWS",
    ]);

    let variant = ready(compile(&mut compiler, &mut backend, shader, &set));
    let applied = &variant.fallbacks_applied;
    assert_eq!(applied.first(), Some(&"FOG"));
    let shadow = applied.iter().position(|d| *d == "SHADOW0").expect("shadow dropped");
    let light = applied.iter().position(|d| *d == "LIGHT1").expect("light dropped");
    assert!(shadow < light);

    assert!(variant.defines.is_enabled("LIGHT0"));
    assert!(variant.defines.is_enabled("DIRLIGHT0"));
    assert!(!variant.defines.is_enabled("POINTLIGHT1"));
    assert_eq!(backend.create_count(), 4);
}

#[test]
fn exhausted_fallbacks_fail() {
    let (mut compiler, shader) = compiler_with("cache_fallback_exhausted");
    let mut backend = MockBackend::new();
    backend.limit_defines = vec!["LIGHT0"];

    match compile(&mut compiler, &mut backend, shader, &defines(&["FOG", "LIGHT0"])) {
        VariantStatus::Failed(error) => assert!(error.is_limit_exceeded()),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(backend.create_count(), 2);
}

// ============================================================================
// Invalidation & cleanup
// ============================================================================

#[test]
fn invalidate_shader_drops_only_that_shader() {
    let (mut compiler, shader) = compiler_with("cache_invalidate_a");
    let other = ShaderId::new("cache_invalidate_b");
    compiler.library_mut().register(other, TEMPLATE);
    let mut backend = MockBackend::new();

    let _ = compile(&mut compiler, &mut backend, shader, &defines(&["FOG"]));
    let _ = compile(&mut compiler, &mut backend, shader, &defines(&["POINTSIZE"]));
    let _ = compile(&mut compiler, &mut backend, other, &defines(&["FOG"]));

    assert_eq!(compiler.invalidate_shader(&mut backend, shader), 2);
    assert_eq!(compiler.variant_count(), 1);
}

#[test]
fn collect_unused_keeps_referenced_variants() {
    let (mut compiler, shader) = compiler_with("cache_collect");
    let mut backend = MockBackend::new();

    let held = ready(compile(&mut compiler, &mut backend, shader, &defines(&["FOG"])));
    let dropped = ready(compile(&mut compiler, &mut backend, shader, &defines(&["POINTSIZE"])));
    let dropped_program = dropped.program;
    drop(dropped);

    assert_eq!(compiler.collect_unused(&mut backend), 1);
    assert_eq!(backend.released_programs, vec![dropped_program]);
    assert_eq!(compiler.variant_count(), 1);
    assert!(Arc::strong_count(&held) > 1);
}

#[test]
fn forced_recompile_retires_variants_still_in_use() {
    let (mut compiler, shader) = compiler_with("cache_retire");
    let mut backend = MockBackend::new();
    let set = defines(&["FOG"]);
    let key = VariantKey::new(shader, set.to_key());

    let old = ready(compile(&mut compiler, &mut backend, shader, &set));
    assert!(compiler.force_recompile(&mut backend, &key));
    let new = ready(compile(&mut compiler, &mut backend, shader, &set));
    assert_ne!(old.program, new.program);

    // The retired program is held by `old` and survives collection
    assert_eq!(compiler.collect_unused(&mut backend), 0);
    let old_program = old.program;
    drop(old);
    assert_eq!(compiler.collect_unused(&mut backend), 1);
    assert_eq!(backend.released_programs, vec![old_program]);
}

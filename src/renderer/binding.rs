//! Uniform Binding Session
//!
//! Remembers what the last draw bound and decides whether the next draw of
//! a material must rebind its uniforms ("must rebind"). The decision is a
//! performance heuristic, not a correctness contract: a rebind is requested
//! whenever any of the following differs from the previous bind.
//!
//! | Input               | Changes when                                     |
//! |---------------------|--------------------------------------------------|
//! | scene render id     | camera moved, frame target changed, cache reset  |
//! | material id         | another material was bound in between            |
//! | mesh id             | another mesh drew with the same material         |
//! | program             | the drawable switched variant                    |
//! | visibility          | mesh visibility (alpha multiplier) changed       |
//! | material version    | a binding-only material property was set         |
//! | layout generation   | the uniform block layout was rebuilt             |
//! | force flag          | backend resources were recreated                 |
//!
//! Texture bindings are not covered: they are issued on every draw.

use crate::material::MaterialId;
use crate::renderer::backend::ProgramHandle;

/// Identity of one bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindState {
    pub render_id: u64,
    pub material: MaterialId,
    pub mesh: u64,
    pub program: ProgramHandle,
    /// `f32::to_bits` of the mesh visibility.
    pub visibility_bits: u32,
    /// Bumped by every material property setter.
    pub material_version: u64,
    pub layout_generation: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingStats {
    pub binds: u64,
    pub rebinds: u64,
}

#[derive(Debug, Default)]
pub struct UniformBindingSession {
    cached: Option<BindState>,
    stats: BindingStats,
}

impl UniformBindingSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the cached bind; the next draw rebinds.
    pub fn reset(&mut self) {
        self.cached = None;
    }

    #[must_use]
    pub fn must_rebind(&self, state: &BindState, force: bool) -> bool {
        force || self.cached.as_ref() != Some(state)
    }

    /// Records a bind and returns whether it must rebind.
    pub fn begin_bind(&mut self, state: BindState, force: bool) -> bool {
        let must_rebind = self.must_rebind(&state, force);
        self.cached = Some(state);
        self.stats.binds += 1;
        if must_rebind {
            self.stats.rebinds += 1;
        }
        must_rebind
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> BindingStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> BindState {
        BindState {
            render_id: 1,
            material: MaterialId(1),
            mesh: 7,
            program: ProgramHandle(3),
            visibility_bits: 1.0f32.to_bits(),
            material_version: 0,
            layout_generation: 1,
        }
    }

    #[test]
    fn identical_binds_do_not_rebind() {
        let mut session = UniformBindingSession::new();
        assert!(session.begin_bind(state(), false));
        assert!(!session.begin_bind(state(), false));
        assert_eq!(session.stats(), BindingStats { binds: 2, rebinds: 1 });
    }

    #[test]
    fn any_input_change_rebinds() {
        let mut session = UniformBindingSession::new();
        session.begin_bind(state(), false);

        let changes = [
            BindState { render_id: 2, ..state() },
            BindState { material: MaterialId(2), ..state() },
            BindState { mesh: 8, ..state() },
            BindState { program: ProgramHandle(4), ..state() },
            BindState { visibility_bits: 0.5f32.to_bits(), ..state() },
            BindState { material_version: 1, ..state() },
            BindState { layout_generation: 2, ..state() },
        ];
        for changed in changes {
            session.begin_bind(state(), false);
            assert!(session.must_rebind(&changed, false), "{changed:?}");
        }
        assert!(session.must_rebind(&state(), true));
    }
}

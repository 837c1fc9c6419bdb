use glam::Mat4;
use rasterscene_common::FilteringMethod;
use rasterscene_render::{
    Gpu, PassBindings, RenderError, ResourceFactory, ShaderProgram, SlotId, SlotKind,
    TechniqueId, slots, techniques,
};
use std::fmt;

/// How the active filtering tier reaches the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRealization {
    /// One technique per tier with the sampler state baked in.
    TechniqueSwap {
        point: TechniqueId,
        linear: TechniqueId,
        anisotropic: TechniqueId,
    },
    /// A single technique whose sampler is rebuilt on every tier change.
    SamplerRebuild { technique: TechniqueId },
}

#[derive(Debug, Clone, Copy, Default)]
struct Slots {
    world: Option<SlotId>,
    world_view_proj: Option<SlotId>,
    view_inverse: Option<SlotId>,
    diffuse_map: Option<SlotId>,
    normal_map: Option<SlotId>,
    specular_map: Option<SlotId>,
    glossiness_map: Option<SlotId>,
    sampler: Option<SlotId>,
}

impl Slots {
    fn get(&self, name: &str) -> Option<SlotId> {
        match name {
            slots::WORLD => self.world,
            slots::WORLD_VIEW_PROJ => self.world_view_proj,
            slots::VIEW_INVERSE => self.view_inverse,
            slots::DIFFUSE_MAP => self.diffuse_map,
            slots::NORMAL_MAP => self.normal_map,
            slots::SPECULAR_MAP => self.specular_map,
            slots::GLOSSINESS_MAP => self.glossiness_map,
            slots::SAMPLER => self.sampler,
            _ => None,
        }
    }
}

/// A shader program plus the parameter values it is drawn with.
///
/// Owns its program, textures and sampler; dropping the material releases
/// all of them. Writes to a slot the program does not expose are dropped.
pub struct Material<G: Gpu> {
    name: String,
    program: G::Program,
    slots: Slots,
    realization: FilterRealization,
    filtering: FilteringMethod,
    world: Mat4,
    world_view_proj: Mat4,
    view_inverse: Mat4,
    diffuse_map: Option<G::Texture>,
    normal_map: Option<G::Texture>,
    specular_map: Option<G::Texture>,
    glossiness_map: Option<G::Texture>,
    sampler: Option<G::Sampler>,
}

impl<G: ResourceFactory> Material<G> {
    /// Resolve slots against `program` and enter the `filtering` tier.
    pub fn new(
        factory: &G,
        name: impl Into<String>,
        program: G::Program,
        filtering: FilteringMethod,
    ) -> Self {
        let name = name.into();
        let realization = choose_realization(&program, &name);

        let resolve = |slot: &str, kind: SlotKind| {
            let id = program.slot(slot, kind);
            let expected = match realization {
                FilterRealization::TechniqueSwap { .. } => kind != SlotKind::Sampler,
                FilterRealization::SamplerRebuild { .. } => true,
            };
            if id.is_none() && expected {
                tracing::warn!(material = %name, slot, "shader parameter not found");
            }
            id
        };
        let slots = Slots {
            world: resolve(slots::WORLD, SlotKind::Matrix),
            world_view_proj: resolve(slots::WORLD_VIEW_PROJ, SlotKind::Matrix),
            view_inverse: resolve(slots::VIEW_INVERSE, SlotKind::Matrix),
            diffuse_map: resolve(slots::DIFFUSE_MAP, SlotKind::Texture),
            normal_map: resolve(slots::NORMAL_MAP, SlotKind::Texture),
            specular_map: resolve(slots::SPECULAR_MAP, SlotKind::Texture),
            glossiness_map: resolve(slots::GLOSSINESS_MAP, SlotKind::Texture),
            sampler: resolve(slots::SAMPLER, SlotKind::Sampler),
        };

        let mut material = Self {
            name,
            program,
            slots,
            realization,
            filtering,
            world: Mat4::IDENTITY,
            world_view_proj: Mat4::IDENTITY,
            view_inverse: Mat4::IDENTITY,
            diffuse_map: None,
            normal_map: None,
            specular_map: None,
            glossiness_map: None,
            sampler: None,
        };
        if let Err(err) = material.rebuild_sampler(factory) {
            tracing::warn!(material = %material.name, %err, "material starts without a sampler");
        }
        material
    }

    /// Switch to `filtering`.
    ///
    /// The tier changes even when the sampler cannot be rebuilt; the
    /// material then draws without a bound sampler and the error is returned.
    pub fn activate(
        &mut self,
        filtering: FilteringMethod,
        factory: &G,
    ) -> Result<FilteringMethod, RenderError> {
        self.filtering = filtering;
        self.rebuild_sampler(factory)?;
        tracing::debug!(material = %self.name, %filtering, "filtering activated");
        Ok(filtering)
    }

    /// Advance to the next filtering tier and report it. The new tier is
    /// reported even when its sampler could not be built.
    pub fn toggle_filtering_method(&mut self, factory: &G) -> Result<FilteringMethod, RenderError> {
        let result = self.activate(self.filtering.next(), factory);
        tracing::info!(material = %self.name, "filtering method: {}", self.filtering.label());
        result
    }

    fn rebuild_sampler(&mut self, factory: &G) -> Result<(), RenderError> {
        if !matches!(self.realization, FilterRealization::SamplerRebuild { .. })
            || self.slots.sampler.is_none()
        {
            return Ok(());
        }
        self.sampler = None;
        self.sampler = Some(factory.create_sampler(self.filtering)?);
        Ok(())
    }
}

impl<G: Gpu> Material<G> {
    pub fn set_world_matrix(&mut self, world: Mat4) {
        self.world = world;
    }

    pub fn set_world_view_proj_matrix(&mut self, world_view_proj: Mat4) {
        self.world_view_proj = world_view_proj;
    }

    pub fn set_inverse_view_matrix(&mut self, view_inverse: Mat4) {
        self.view_inverse = view_inverse;
    }

    pub fn set_diffuse_map(&mut self, texture: G::Texture) {
        if self.slots.diffuse_map.is_some() {
            self.diffuse_map = Some(texture);
        }
    }

    pub fn set_normal_map(&mut self, texture: G::Texture) {
        if self.slots.normal_map.is_some() {
            self.normal_map = Some(texture);
        }
    }

    pub fn set_specular_map(&mut self, texture: G::Texture) {
        if self.slots.specular_map.is_some() {
            self.specular_map = Some(texture);
        }
    }

    pub fn set_glossiness_map(&mut self, texture: G::Texture) {
        if self.slots.glossiness_map.is_some() {
            self.glossiness_map = Some(texture);
        }
    }

    /// Technique for the current tier and its pass count.
    pub fn active_technique(&self) -> (TechniqueId, u32) {
        let technique = match self.realization {
            FilterRealization::TechniqueSwap {
                point,
                linear,
                anisotropic,
            } => match self.filtering {
                FilteringMethod::Point => point,
                FilteringMethod::Linear => linear,
                FilteringMethod::Anisotropic => anisotropic,
            },
            FilterRealization::SamplerRebuild { technique } => technique,
        };
        (technique, self.program.pass_count(technique))
    }

    /// Current parameter values for every resolved slot.
    pub fn bindings(&self) -> PassBindings<'_, G> {
        let mut bindings = PassBindings::default();
        for (slot, value) in [
            (self.slots.world, self.world),
            (self.slots.world_view_proj, self.world_view_proj),
            (self.slots.view_inverse, self.view_inverse),
        ] {
            if let Some(slot) = slot {
                bindings.matrices.push((slot, value));
            }
        }
        for (slot, texture) in [
            (self.slots.diffuse_map, &self.diffuse_map),
            (self.slots.normal_map, &self.normal_map),
            (self.slots.specular_map, &self.specular_map),
            (self.slots.glossiness_map, &self.glossiness_map),
        ] {
            if let (Some(slot), Some(texture)) = (slot, texture) {
                bindings.textures.push((slot, texture));
            }
        }
        bindings.sampler = self.slots.sampler.zip(self.sampler.as_ref());
        bindings
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &G::Program {
        &self.program
    }

    pub fn filtering(&self) -> FilteringMethod {
        self.filtering
    }

    pub fn realization(&self) -> FilterRealization {
        self.realization
    }

    pub fn has_slot(&self, name: &str) -> bool {
        self.slots.get(name).is_some()
    }
}

impl<G: Gpu> fmt::Debug for Material<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Material")
            .field("name", &self.name)
            .field("realization", &self.realization)
            .field("filtering", &self.filtering)
            .finish_non_exhaustive()
    }
}

fn choose_realization(program: &impl ShaderProgram, name: &str) -> FilterRealization {
    let swap = (
        program.technique(techniques::for_filtering(FilteringMethod::Point)),
        program.technique(techniques::for_filtering(FilteringMethod::Linear)),
        program.technique(techniques::for_filtering(FilteringMethod::Anisotropic)),
    );
    if let (Some(point), Some(linear), Some(anisotropic)) = swap {
        return FilterRealization::TechniqueSwap {
            point,
            linear,
            anisotropic,
        };
    }

    let technique = program.technique(techniques::DEFAULT).unwrap_or_else(|| {
        if program.techniques().is_empty() {
            tracing::warn!(material = %name, "shader program exposes no techniques");
        }
        TechniqueId(0)
    });
    FilterRealization::SamplerRebuild { technique }
}

use crate::RenderError;
use crate::backend::{
    ClearValues, DrawContext, Gpu, PassBindings, Presenter, ResourceFactory, ShaderProgram,
    SlotId, SlotKind, TechniqueDesc, TechniqueId, slots, techniques,
};
use glam::Mat4;
use rasterscene_common::FilteringMethod;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Identifier the recording backend assigns to every resource it creates.
pub type ResourceId = u32;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateVertexBuffer {
        id: ResourceId,
        label: String,
        bytes: usize,
    },
    CreateIndexBuffer {
        id: ResourceId,
        label: String,
        indices: usize,
    },
    CreateTexture {
        id: ResourceId,
        path: PathBuf,
    },
    CreateSampler {
        id: ResourceId,
        filter: FilteringMethod,
    },
    LoadProgram {
        id: ResourceId,
        path: PathBuf,
    },
    /// A resource was dropped.
    Release {
        id: ResourceId,
    },
    Clear(ClearValues),
    BindGeometry {
        vertex_buffer: ResourceId,
        index_buffer: ResourceId,
        stride: u32,
    },
    ApplyPass {
        program: ResourceId,
        technique: String,
        pass: u32,
        matrices: Vec<(String, Mat4)>,
        textures: Vec<(String, ResourceId)>,
        sampler: Option<FilteringMethod>,
    },
    DrawIndexed {
        index_count: u32,
    },
    Present,
}

#[derive(Debug, Default)]
struct Recorder {
    next_id: ResourceId,
    commands: Vec<Command>,
}

impl Recorder {
    fn allocate(&mut self) -> ResourceId {
        self.next_id += 1;
        self.next_id
    }
}

type SharedRecorder = Rc<RefCell<Recorder>>;

/// Records a `Release` when the owning resource is dropped.
#[derive(Debug)]
struct Tracked {
    id: ResourceId,
    recorder: SharedRecorder,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.recorder
            .borrow_mut()
            .commands
            .push(Command::Release { id: self.id });
    }
}

#[derive(Debug)]
pub struct RecordedBuffer {
    tracked: Tracked,
    contents: Vec<u8>,
}

impl RecordedBuffer {
    pub fn id(&self) -> ResourceId {
        self.tracked.id
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    pub fn byte_len(&self) -> usize {
        self.contents.len()
    }
}

#[derive(Debug)]
pub struct RecordedTexture {
    tracked: Tracked,
    path: PathBuf,
}

impl RecordedTexture {
    pub fn id(&self) -> ResourceId {
        self.tracked.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug)]
pub struct RecordedSampler {
    tracked: Tracked,
    filter: FilteringMethod,
}

impl RecordedSampler {
    pub fn id(&self) -> ResourceId {
        self.tracked.id
    }

    pub fn filter(&self) -> FilteringMethod {
        self.filter
    }
}

/// Slots and techniques a recorded program pretends to expose.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramDesc {
    slots: Vec<(String, SlotKind)>,
    techniques: Vec<TechniqueDesc>,
}

impl ProgramDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(mut self, name: impl Into<String>, kind: SlotKind) -> Self {
        self.slots.push((name.into(), kind));
        self
    }

    pub fn technique(mut self, name: impl Into<String>, passes: u32) -> Self {
        self.techniques.push(TechniqueDesc::new(name, passes));
        self
    }

    /// Every standard slot and a single-pass `default` technique.
    pub fn standard() -> Self {
        Self::with_standard_matrices_and_maps()
            .slot(slots::SAMPLER, SlotKind::Sampler)
            .technique(techniques::DEFAULT, 1)
    }

    /// Standard matrices and maps, with one technique per filtering tier
    /// instead of a sampler slot.
    pub fn per_filter_techniques() -> Self {
        Self::with_standard_matrices_and_maps()
            .technique(techniques::POINT, 1)
            .technique(techniques::LINEAR, 1)
            .technique(techniques::ANISOTROPIC, 1)
    }

    /// Matrices, a diffuse map and a sampler under one blended
    /// `transparent` technique.
    pub fn transparent() -> Self {
        Self::new()
            .slot(slots::WORLD, SlotKind::Matrix)
            .slot(slots::WORLD_VIEW_PROJ, SlotKind::Matrix)
            .slot(slots::VIEW_INVERSE, SlotKind::Matrix)
            .slot(slots::DIFFUSE_MAP, SlotKind::Texture)
            .slot(slots::SAMPLER, SlotKind::Sampler)
            .technique(techniques::TRANSPARENT, 1)
    }

    fn with_standard_matrices_and_maps() -> Self {
        Self::new()
            .slot(slots::WORLD, SlotKind::Matrix)
            .slot(slots::WORLD_VIEW_PROJ, SlotKind::Matrix)
            .slot(slots::VIEW_INVERSE, SlotKind::Matrix)
            .slot(slots::DIFFUSE_MAP, SlotKind::Texture)
            .slot(slots::NORMAL_MAP, SlotKind::Texture)
            .slot(slots::SPECULAR_MAP, SlotKind::Texture)
            .slot(slots::GLOSSINESS_MAP, SlotKind::Texture)
    }
}

#[derive(Debug)]
pub struct RecordedProgram {
    tracked: Tracked,
    path: PathBuf,
    desc: ProgramDesc,
}

impl RecordedProgram {
    pub fn id(&self) -> ResourceId {
        self.tracked.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn slot_name(&self, slot: SlotId) -> String {
        self.desc
            .slots
            .get(slot.0 as usize)
            .map_or_else(|| format!("#{}", slot.0), |(name, _)| name.clone())
    }
}

impl ShaderProgram for RecordedProgram {
    fn slot(&self, name: &str, kind: SlotKind) -> Option<SlotId> {
        self.desc
            .slots
            .iter()
            .position(|(n, k)| n == name && *k == kind)
            .map(|i| SlotId(i as u32))
    }

    fn techniques(&self) -> &[TechniqueDesc] {
        &self.desc.techniques
    }
}

/// Read access to the command log; outlives the backend that wrote it.
#[derive(Debug, Clone)]
pub struct Journal(SharedRecorder);

impl Journal {
    pub fn commands(&self) -> Vec<Command> {
        self.0.borrow().commands.clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().commands.clear();
    }

    /// Commands grouped per frame, from each `Clear` through its `Present`.
    pub fn frames(&self) -> Vec<Vec<Command>> {
        let mut frames = Vec::new();
        let mut current: Option<Vec<Command>> = None;
        for command in self.0.borrow().commands.iter() {
            match command {
                Command::Clear(_) => current = Some(vec![command.clone()]),
                Command::Present => {
                    if let Some(mut frame) = current.take() {
                        frame.push(Command::Present);
                        frames.push(frame);
                    }
                }
                _ => {
                    if let Some(frame) = current.as_mut() {
                        frame.push(command.clone());
                    }
                }
            }
        }
        frames
    }

    /// Index counts of every indexed draw, in submission order.
    pub fn draws(&self) -> Vec<u32> {
        self.0
            .borrow()
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawIndexed { index_count } => Some(*index_count),
                _ => None,
            })
            .collect()
    }

    /// Ids of every released resource, in release order.
    pub fn released(&self) -> Vec<ResourceId> {
        self.0
            .borrow()
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::Release { id } => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Human-readable rendering of the most recent complete frame.
    pub fn summary(&self) -> String {
        let frames = self.frames();
        let Some(frame) = frames.last() else {
            return "=== No frame presented ===\n".to_string();
        };

        let passes = frame
            .iter()
            .filter(|c| matches!(c, Command::ApplyPass { .. }))
            .count();
        let draws = frame
            .iter()
            .filter(|c| matches!(c, Command::DrawIndexed { .. }))
            .count();

        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== Frame {} (passes={passes}, draws={draws}) ===",
            frames.len()
        );
        for command in frame {
            match command {
                Command::Clear(v) => {
                    let _ = writeln!(
                        out,
                        "clear color=({:.2}, {:.2}, {:.2}, {:.2}) depth={:.1} stencil={}",
                        v.color[0], v.color[1], v.color[2], v.color[3], v.depth, v.stencil
                    );
                }
                Command::BindGeometry {
                    vertex_buffer,
                    index_buffer,
                    stride,
                } => {
                    let _ = writeln!(
                        out,
                        "  bind vb=#{vertex_buffer} ib=#{index_buffer} stride={stride}"
                    );
                }
                Command::ApplyPass {
                    program,
                    technique,
                    pass,
                    matrices,
                    textures,
                    sampler,
                } => {
                    let sampler = sampler.map_or_else(|| "-".to_string(), |f| f.to_string());
                    let _ = writeln!(
                        out,
                        "  pass program=#{program} technique={technique}[{pass}] \
                         matrices={} textures={} sampler={sampler}",
                        matrices.len(),
                        textures.len()
                    );
                }
                Command::DrawIndexed { index_count } => {
                    let _ = writeln!(out, "  draw indices={index_count}");
                }
                Command::Present => {
                    let _ = writeln!(out, "present");
                }
                _ => {}
            }
        }
        out
    }
}

/// A backend that records every call instead of talking to a GPU.
///
/// Resources are real owned values: dropping one appends a `Release`
/// command, so ownership-driven cleanup is observable.
#[derive(Debug)]
pub struct RecordingBackend {
    recorder: SharedRecorder,
    programs: HashMap<PathBuf, ProgramDesc>,
    missing_textures: HashSet<PathBuf>,
    fail_buffers: bool,
    fail_samplers: bool,
    ready: bool,
    frame_open: bool,
    size: (u32, u32),
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            recorder: SharedRecorder::default(),
            programs: HashMap::new(),
            missing_textures: HashSet::new(),
            fail_buffers: false,
            fail_samplers: false,
            ready: true,
            frame_open: false,
            size: (0, 0),
        }
    }

    /// Make `load_program(path)` succeed with the given description.
    pub fn with_program(mut self, path: impl Into<PathBuf>, desc: ProgramDesc) -> Self {
        self.programs.insert(path.into(), desc);
        self
    }

    /// Make `create_texture_view(path)` fail.
    pub fn with_missing_texture(mut self, path: impl Into<PathBuf>) -> Self {
        self.missing_textures.insert(path.into());
        self
    }

    /// Report the device as not initialized.
    pub fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Make every subsequent buffer creation fail (or succeed again).
    pub fn set_fail_buffers(&mut self, fail: bool) {
        self.fail_buffers = fail;
    }

    /// Make every subsequent sampler creation fail (or succeed again).
    pub fn set_fail_samplers(&mut self, fail: bool) {
        self.fail_samplers = fail;
    }

    pub fn journal(&self) -> Journal {
        Journal(self.recorder.clone())
    }

    pub fn commands(&self) -> Vec<Command> {
        self.journal().commands()
    }

    /// Last size passed to [`Presenter::resize`].
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    fn record(&self, command: Command) {
        self.recorder.borrow_mut().commands.push(command);
    }

    fn track(&self) -> Tracked {
        let id = self.recorder.borrow_mut().allocate();
        Tracked {
            id,
            recorder: self.recorder.clone(),
        }
    }

    fn create_buffer(
        &self,
        kind: &'static str,
        label: &str,
        contents: Vec<u8>,
    ) -> Result<RecordedBuffer, RenderError> {
        if self.fail_buffers {
            return Err(RenderError::BufferCreation {
                kind,
                label: label.to_string(),
                reason: "buffer creation disabled".to_string(),
            });
        }
        if contents.is_empty() {
            return Err(RenderError::BufferCreation {
                kind,
                label: label.to_string(),
                reason: "zero-sized buffer".to_string(),
            });
        }
        Ok(RecordedBuffer {
            tracked: self.track(),
            contents,
        })
    }
}

impl Gpu for RecordingBackend {
    type Buffer = RecordedBuffer;
    type Texture = RecordedTexture;
    type Sampler = RecordedSampler;
    type Program = RecordedProgram;
}

impl ResourceFactory for RecordingBackend {
    fn create_vertex_buffer(
        &self,
        label: &str,
        contents: &[u8],
    ) -> Result<RecordedBuffer, RenderError> {
        let buffer = self.create_buffer("vertex", label, contents.to_vec())?;
        self.record(Command::CreateVertexBuffer {
            id: buffer.id(),
            label: label.to_string(),
            bytes: contents.len(),
        });
        Ok(buffer)
    }

    fn create_index_buffer(
        &self,
        label: &str,
        indices: &[u32],
    ) -> Result<RecordedBuffer, RenderError> {
        let bytes = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        let buffer = self.create_buffer("index", label, bytes)?;
        self.record(Command::CreateIndexBuffer {
            id: buffer.id(),
            label: label.to_string(),
            indices: indices.len(),
        });
        Ok(buffer)
    }

    fn create_texture_view(&self, path: &Path) -> Result<RecordedTexture, RenderError> {
        if self.missing_textures.contains(path) {
            return Err(RenderError::TextureLoad {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            });
        }
        let texture = RecordedTexture {
            tracked: self.track(),
            path: path.to_path_buf(),
        };
        self.record(Command::CreateTexture {
            id: texture.id(),
            path: path.to_path_buf(),
        });
        Ok(texture)
    }

    fn create_sampler(&self, filter: FilteringMethod) -> Result<RecordedSampler, RenderError> {
        if self.fail_samplers {
            return Err(RenderError::SamplerCreation {
                filter,
                reason: "sampler creation disabled".to_string(),
            });
        }
        let sampler = RecordedSampler {
            tracked: self.track(),
            filter,
        };
        self.record(Command::CreateSampler {
            id: sampler.id(),
            filter,
        });
        Ok(sampler)
    }

    fn load_program(&self, path: &Path) -> Result<RecordedProgram, RenderError> {
        let desc = self
            .programs
            .get(path)
            .cloned()
            .ok_or_else(|| RenderError::ProgramLoad {
                path: path.to_path_buf(),
                reason: "no program registered for this path".to_string(),
            })?;
        let program = RecordedProgram {
            tracked: self.track(),
            path: path.to_path_buf(),
            desc,
        };
        self.record(Command::LoadProgram {
            id: program.id(),
            path: path.to_path_buf(),
        });
        Ok(program)
    }
}

impl DrawContext for RecordingBackend {
    fn bind_geometry(&mut self, vertices: &RecordedBuffer, stride: u32, indices: &RecordedBuffer) {
        self.record(Command::BindGeometry {
            vertex_buffer: vertices.id(),
            index_buffer: indices.id(),
            stride,
        });
    }

    fn apply_pass(
        &mut self,
        program: &RecordedProgram,
        technique: TechniqueId,
        pass: u32,
        bindings: &PassBindings<'_, Self>,
    ) {
        let technique = program
            .techniques()
            .get(technique.0 as usize)
            .map_or_else(|| format!("#{}", technique.0), |t| t.name.clone());
        self.record(Command::ApplyPass {
            program: program.id(),
            technique,
            pass,
            matrices: bindings
                .matrices
                .iter()
                .map(|(slot, m)| (program.slot_name(*slot), *m))
                .collect(),
            textures: bindings
                .textures
                .iter()
                .map(|(slot, t)| (program.slot_name(*slot), t.id()))
                .collect(),
            sampler: bindings.sampler.map(|(_, s)| s.filter()),
        });
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.record(Command::DrawIndexed { index_count });
    }
}

impl Presenter for RecordingBackend {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn clear(&mut self, values: &ClearValues) -> Result<(), RenderError> {
        if !self.ready {
            return Err(RenderError::Surface("device not initialized".to_string()));
        }
        if self.frame_open {
            tracing::warn!("clear issued while a frame was still open");
        }
        self.frame_open = true;
        self.record(Command::Clear(*values));
        Ok(())
    }

    fn present(&mut self) -> Result<(), RenderError> {
        if !self.frame_open {
            return Err(RenderError::NoFrame);
        }
        self.frame_open = false;
        self.record(Command::Present);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> RecordingBackend {
        RecordingBackend::new().with_program("mesh.fx", ProgramDesc::standard())
    }

    #[test]
    fn buffers_hold_exact_contents() {
        let backend = backend();
        let vb = backend.create_vertex_buffer("vb", &[1, 2, 3, 4]).unwrap();
        let ib = backend.create_index_buffer("ib", &[0, 1, 2]).unwrap();
        assert_eq!(vb.byte_len(), 4);
        assert_eq!(ib.byte_len(), 12);
        assert!(matches!(
            backend.commands()[1],
            Command::CreateIndexBuffer { indices: 3, .. }
        ));
    }

    #[test]
    fn failing_buffers_report_errors() {
        let mut backend = backend();
        backend.set_fail_buffers(true);
        let err = backend.create_vertex_buffer("vb", &[0; 8]).unwrap_err();
        assert!(err.to_string().contains("vertex buffer `vb`"));
    }

    #[test]
    fn failing_samplers_record_nothing() {
        let mut backend = backend();
        backend.set_fail_samplers(true);
        let err = backend.create_sampler(FilteringMethod::Linear).unwrap_err();
        assert!(matches!(
            err,
            RenderError::SamplerCreation {
                filter: FilteringMethod::Linear,
                ..
            }
        ));
        assert!(backend.commands().is_empty());

        backend.set_fail_samplers(false);
        assert!(backend.create_sampler(FilteringMethod::Linear).is_ok());
    }

    #[test]
    fn unknown_program_fails_to_load() {
        let backend = backend();
        assert!(backend.load_program(Path::new("other.fx")).is_err());
        let program = backend.load_program(Path::new("mesh.fx")).unwrap();
        assert!(program.slot(slots::WORLD, SlotKind::Matrix).is_some());
        assert!(program.slot(slots::WORLD, SlotKind::Texture).is_none());
        assert_eq!(program.technique(techniques::DEFAULT), Some(TechniqueId(0)));
        assert_eq!(program.pass_count(TechniqueId(0)), 1);
    }

    #[test]
    fn missing_texture_fails() {
        let backend = backend().with_missing_texture("gone.png");
        assert!(backend.create_texture_view(Path::new("gone.png")).is_err());
        assert!(backend.create_texture_view(Path::new("here.png")).is_ok());
    }

    #[test]
    fn dropping_resources_records_release() {
        let backend = backend();
        let journal = backend.journal();
        let texture = backend.create_texture_view(Path::new("a.png")).unwrap();
        let id = texture.id();
        drop(texture);
        assert_eq!(journal.released(), vec![id]);
    }

    #[test]
    fn present_requires_open_frame() {
        let mut backend = backend();
        assert!(matches!(backend.present(), Err(RenderError::NoFrame)));
        backend.clear(&ClearValues::default()).unwrap();
        backend.draw_indexed(6);
        backend.present().unwrap();

        let journal = backend.journal();
        assert_eq!(journal.frames().len(), 1);
        assert_eq!(journal.draws(), vec![6]);
        let summary = journal.summary();
        assert!(summary.contains("=== Frame 1 (passes=0, draws=1) ==="));
        assert!(summary.contains("draw indices=6"));
    }

    #[test]
    fn not_ready_backend_refuses_to_clear() {
        let mut backend = RecordingBackend::new().not_ready();
        assert!(!backend.is_ready());
        assert!(backend.clear(&ClearValues::default()).is_err());
    }

    #[test]
    fn empty_journal_summary() {
        assert!(backend().journal().summary().contains("No frame"));
    }
}

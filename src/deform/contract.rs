use std::collections::HashMap;

use smallvec::SmallVec;

use crate::deform::grid::GridDeformer;
use crate::deform::mesh_group::MeshGroupDeformer;
use crate::deform::path::PathDeformer;
use crate::foundation::core::{Affine, DeformerId, TargetId, Vec2Array};
use crate::foundation::math::{affine_is_finite, linear_part};

/// Hook stage of mesh-group deformers; lower stages run first.
pub const MESH_GROUP_STAGE: u8 = 0;
/// Hook stage of grid deformers.
pub const GRID_STAGE: u8 = 1;
/// Hook stage of path deformers.
pub const PATH_STAGE: u8 = 2;

/// Why a target's state changed.
///
/// Only [`NotifyReason::StructureChanged`] (reparent, topology edit) drops per-target caches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotifyReason {
    /// Identity or topology of the target changed.
    StructureChanged,
    /// The target moved.
    TransformChanged,
    /// Some other attribute changed.
    AttributeChanged,
}

/// What kind of node a deformer is asked to deform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    /// A drawable with its own vertex buffer.
    Deformable,
    /// A plain node; only its translation can be carried along.
    Node,
    /// A composite that propagates a mesh group to its children.
    PropagatingComposite,
    /// A nested path deformer.
    PathDeformer {
        /// Whether the nested deformer's physics is enabled.
        physics_enabled: bool,
    },
    /// A nested grid deformer.
    GridDeformer,
    /// A nested mesh-group deformer.
    MeshGroup,
}

impl TargetKind {
    /// `true` if the target owns vertices that can be offset individually.
    pub fn is_deformable(self) -> bool {
        !matches!(self, Self::Node | Self::PropagatingComposite)
    }
}

/// Identity and kind of a deform target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetInfo {
    /// Stable target identity.
    pub id: TargetId,
    /// Target kind.
    pub kind: TargetKind,
}

impl TargetInfo {
    /// Target of the given identity and kind.
    pub fn new(id: TargetId, kind: TargetKind) -> Self {
        Self { id, kind }
    }

    /// A plain drawable target.
    pub fn deformable(id: u32) -> Self {
        Self::new(TargetId(id), TargetKind::Deformable)
    }
}

/// Result of one `deform` call.
///
/// Non-empty `offsets` are the target's full deformation: its existing deformation with this
/// deformer's contribution added. Empty offsets mean "unchanged, keep the caller's deformation".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeformOutcome {
    /// New deformation of the target, or empty.
    pub offsets: Vec2Array,
    /// Optional transform override for the target.
    pub transform: Option<Affine>,
    /// Whether anything moved.
    pub changed: bool,
}

impl DeformOutcome {
    /// The "keep what you have" outcome.
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// A changed outcome carrying the target's new deformation.
    pub fn changed(offsets: Vec2Array) -> Self {
        Self {
            offsets,
            transform: None,
            changed: true,
        }
    }

    /// `true` if the caller should keep its deformation.
    pub fn is_unchanged(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Whether a hook runs before or after the target computes its own shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookPhase {
    /// Before the target's own deformation (default).
    Pre,
    /// After it ("dynamic" mode).
    Post,
}

/// Shared operations every deformer exposes to the host.
pub trait Deformer {
    /// Stable identity used to de-duplicate hooks.
    fn id(&self) -> DeformerId;

    /// Hook stage of this deformer kind.
    fn stage(&self) -> u8;

    /// Current world transform of the deformer.
    fn world_transform(&self) -> Affine;

    /// Replace the world transform; the host calls this once per frame before deforming.
    fn set_world_transform(&mut self, world: Affine);

    /// Deform a target given in its own local space.
    fn deform(
        &mut self,
        target: TargetInfo,
        vertices: &Vec2Array,
        deformation: &Vec2Array,
        transform: Affine,
    ) -> DeformOutcome;

    /// React to a change of one target.
    fn notify(&mut self, target: TargetId, reason: NotifyReason);

    /// Phase this deformer hooks a target of `kind` at, or `None` if it opts out.
    fn hook_phase(&self, kind: TargetKind) -> Option<HookPhase>;

    /// Number of entries the parameter-driven payload must have.
    fn payload_len(&self) -> usize;

    /// Install a parameter-driven payload. Payloads of the wrong length are ignored.
    fn apply_payload(&mut self, offsets: &Vec2Array);
}

/// A deformer of any supported kind.
#[derive(Clone, Debug)]
pub enum AnyDeformer {
    /// Curve-relative deformer.
    Path(Box<PathDeformer>),
    /// Bilinear-grid deformer.
    Grid(GridDeformer),
    /// Triangle-affine deformer.
    MeshGroup(MeshGroupDeformer),
}

macro_rules! dispatch {
    ($self:expr, $d:ident => $body:expr) => {
        match $self {
            AnyDeformer::Path($d) => $body,
            AnyDeformer::Grid($d) => $body,
            AnyDeformer::MeshGroup($d) => $body,
        }
    };
}

impl Deformer for AnyDeformer {
    fn id(&self) -> DeformerId {
        dispatch!(self, d => d.id())
    }

    fn stage(&self) -> u8 {
        dispatch!(self, d => d.stage())
    }

    fn world_transform(&self) -> Affine {
        dispatch!(self, d => d.world_transform())
    }

    fn set_world_transform(&mut self, world: Affine) {
        dispatch!(self, d => d.set_world_transform(world))
    }

    fn deform(
        &mut self,
        target: TargetInfo,
        vertices: &Vec2Array,
        deformation: &Vec2Array,
        transform: Affine,
    ) -> DeformOutcome {
        dispatch!(self, d => d.deform(target, vertices, deformation, transform))
    }

    fn notify(&mut self, target: TargetId, reason: NotifyReason) {
        dispatch!(self, d => d.notify(target, reason))
    }

    fn hook_phase(&self, kind: TargetKind) -> Option<HookPhase> {
        dispatch!(self, d => d.hook_phase(kind))
    }

    fn payload_len(&self) -> usize {
        dispatch!(self, d => d.payload_len())
    }

    fn apply_payload(&mut self, offsets: &Vec2Array) {
        dispatch!(self, d => d.apply_payload(offsets))
    }
}

impl From<PathDeformer> for AnyDeformer {
    fn from(d: PathDeformer) -> Self {
        Self::Path(Box::new(d))
    }
}

impl From<GridDeformer> for AnyDeformer {
    fn from(d: GridDeformer) -> Self {
        Self::Grid(d)
    }
}

impl From<MeshGroupDeformer> for AnyDeformer {
    fn from(d: MeshGroupDeformer) -> Self {
        Self::MeshGroup(d)
    }
}

/// One registered filter hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilterHook {
    /// Numeric stage; hooks are kept in installation order.
    pub stage: u8,
    /// Deformer the hook calls into.
    pub deformer: DeformerId,
}

#[derive(Clone, Debug, Default)]
struct HookLists {
    pre: SmallVec<[FilterHook; 4]>,
    post: SmallVec<[FilterHook; 4]>,
}

impl HookLists {
    fn list(&self, phase: HookPhase) -> &[FilterHook] {
        match phase {
            HookPhase::Pre => &self.pre,
            HookPhase::Post => &self.post,
        }
    }

    fn retain(&mut self, mut keep: impl FnMut(&FilterHook) -> bool) {
        self.pre.retain(|h| keep(h));
        self.post.retain(|h| keep(h));
    }

    fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }
}

/// Per-target pre/post hook registry kept on behalf of the scene-graph host.
#[derive(Clone, Debug, Default)]
pub struct TargetFilters {
    targets: HashMap<TargetId, HookLists>,
}

impl TargetFilters {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook. Any hook with the same `(stage, deformer)` is replaced, in either phase.
    pub fn install(&mut self, target: TargetId, phase: HookPhase, hook: FilterHook) {
        let lists = self.targets.entry(target).or_default();
        lists.retain(|h| !(h.stage == hook.stage && h.deformer == hook.deformer));
        match phase {
            HookPhase::Pre => lists.pre.push(hook),
            HookPhase::Post => lists.post.push(hook),
        }
    }

    /// Drop every hook `deformer` installed on `target`.
    pub fn remove(&mut self, target: TargetId, deformer: DeformerId) {
        if let Some(lists) = self.targets.get_mut(&target) {
            lists.retain(|h| h.deformer != deformer);
            if lists.is_empty() {
                self.targets.remove(&target);
            }
        }
    }

    /// Drop every hook of `deformer` on every target.
    pub fn remove_deformer(&mut self, deformer: DeformerId) {
        for lists in self.targets.values_mut() {
            lists.retain(|h| h.deformer != deformer);
        }
        self.targets.retain(|_, l| !l.is_empty());
    }

    /// Hooks of one target and phase, in run order.
    pub fn hooks(&self, target: TargetId, phase: HookPhase) -> &[FilterHook] {
        self.targets.get(&target).map_or(&[], |l| l.list(phase))
    }

    /// Hook `target` according to the deformer's policy for its kind, or release it if the
    /// deformer opts out.
    pub fn setup_target(&mut self, deformer: &dyn Deformer, target: TargetInfo) {
        let hook = FilterHook {
            stage: deformer.stage(),
            deformer: deformer.id(),
        };
        match deformer.hook_phase(target.kind) {
            Some(phase) => self.install(target.id, phase, hook),
            None => self.remove(target.id, hook.deformer),
        }
    }

    /// Unhook `target` and let the deformer drop its caches.
    pub fn release_target(&mut self, deformer: &mut dyn Deformer, target: TargetId) {
        self.remove(target, deformer.id());
        deformer.notify(target, NotifyReason::StructureChanged);
    }

    /// Run one phase of a target's hooks.
    ///
    /// Hooks run in order and each sees the deformation produced by the previous one. Hooks whose
    /// deformer is missing from `deformers` are skipped. Returns whether any hook changed the
    /// deformation.
    pub fn run_filters(
        &self,
        phase: HookPhase,
        target: TargetInfo,
        vertices: &Vec2Array,
        deformation: &mut Vec2Array,
        transform: Affine,
        deformers: &mut [AnyDeformer],
    ) -> bool {
        let mut changed = false;
        for hook in self.hooks(target.id, phase) {
            let Some(d) = deformers.iter_mut().find(|d| d.id() == hook.deformer) else {
                continue;
            };
            let out = d.deform(target, vertices, deformation, transform);
            if !out.is_unchanged() {
                *deformation = out.offsets;
                changed |= out.changed;
            }
        }
        changed
    }
}

/// Mapping between a target's local space and a deformer's local space.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LocalFrame {
    center: Affine,
    back: Affine,
}

impl LocalFrame {
    /// `inverse(world) · target`, or `None` if either side or the result is not finite or
    /// not invertible.
    pub(crate) fn new(world: Affine, target: Affine) -> Option<Self> {
        if !affine_is_finite(world) || !affine_is_finite(target) || world.determinant() == 0.0 {
            return None;
        }
        let center = world.inverse() * target;
        if !affine_is_finite(center) || center.determinant() == 0.0 {
            return None;
        }
        let back = linear_part(center.inverse());
        if !affine_is_finite(back) {
            return None;
        }
        Some(Self { center, back })
    }

    pub(crate) fn center(&self) -> Affine {
        self.center
    }

    /// Target vertices in deformer space, with the deformation added as a displacement.
    pub(crate) fn sample(&self, vertices: &Vec2Array, deformation: Option<&Vec2Array>) -> Vec2Array {
        let mut out = vertices.transformed(self.center);
        if let Some(d) = deformation {
            out.add_transformed_linear(d, self.center);
        }
        out
    }

    /// Map deformer-space offsets back and add them to the target's existing deformation.
    pub(crate) fn emit(&self, existing: &Vec2Array, offsets: &Vec2Array) -> Vec2Array {
        let mut out = existing.clone();
        if out.len() < offsets.len() {
            out.resize(offsets.len());
        }
        out.add_transformed_linear(offsets, self.back);
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/deform/contract.rs"]
mod tests;

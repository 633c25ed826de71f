//! Curve-relative deformation driven by parameters and chain physics.
//!
//! A path deformer keeps three curves over the same control points:
//!
//! - the *original* curve (the rest shape),
//! - the *deformed* curve (rest shape plus the current deformation),
//! - the *previous* curve (the deformed curve of the last frame).
//!
//! A target vertex's curve parameter is found on the previous curve and memoized. At that
//! parameter the vertex is expressed in the (tangent, normal) frame of the original curve and
//! re-expressed in the frame of the deformed curve.

use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::deform::contract::{
    DeformOutcome, Deformer, HookPhase, LocalFrame, NotifyReason, PATH_STAGE, TargetInfo,
    TargetKind,
};
use crate::deform::curve::{Curve, CurveType};
use crate::deform::physics::{ChainDriver, PhysicsState, PhysicsType};
use crate::foundation::core::{Affine, DeformerId, TargetId, Vec2, Vec2Array};
use crate::foundation::diag::{Diagnostics, InvalidRecord};
use crate::foundation::error::{DeformError, DeformResult};
use crate::foundation::fingerprint::{StableHasher, StateFingerprint};
use crate::foundation::math::{TANGENT_EPSILON, affine_is_finite, normalize_checked, rotation_of};

/// Deformer bending its targets along a curve through its control points.
#[derive(Clone, Debug)]
pub struct PathDeformer {
    id: DeformerId,
    config: EngineConfig,
    world: Affine,
    curve_type: CurveType,
    physics_type: PhysicsType,
    /// Weight of the physics offsets in the deformation.
    pub strength: f64,
    /// Hook plain nodes so their translation follows the curve.
    pub translate_children: bool,
    /// Hook deformables post-transform.
    pub dynamic_deformation: bool,
    /// Ignore parameter-driven offsets; only physics moves the curve.
    pub physics_only: bool,
    physics_enabled: bool,
    control_points: Vec2Array,
    param_offsets: Vec2Array,
    physics_offsets: Vec2Array,
    deformation: Vec2Array,
    original: Curve,
    deformed: Curve,
    prev: Curve,
    degenerate: bool,
    driver: Option<ChainDriver>,
    prev_root: Option<Vec2>,
    t_cache: HashMap<TargetId, Vec<f64>>,
    emitted: HashMap<TargetId, StateFingerprint>,
    epoch: u64,
    breaker: Option<(String, u32)>,
    diag: Diagnostics,
}

impl PathDeformer {
    /// Deformer without control points.
    pub fn new(id: DeformerId, config: &EngineConfig) -> Self {
        let curve_type = CurveType::default();
        let empty = Curve::new(curve_type, Vec2Array::new());
        Self {
            id,
            config: config.clone(),
            world: Affine::IDENTITY,
            curve_type,
            physics_type: PhysicsType::default(),
            strength: 1.0,
            translate_children: true,
            dynamic_deformation: false,
            physics_only: false,
            physics_enabled: true,
            control_points: Vec2Array::new(),
            param_offsets: Vec2Array::new(),
            physics_offsets: Vec2Array::new(),
            deformation: Vec2Array::new(),
            original: empty.clone(),
            deformed: empty.clone(),
            prev: empty,
            degenerate: false,
            driver: None,
            prev_root: None,
            t_cache: HashMap::new(),
            emitted: HashMap::new(),
            epoch: 0,
            breaker: None,
            diag: Diagnostics::new(config.debug_trace),
        }
    }

    /// Control points in deformer space.
    pub fn control_points(&self) -> &Vec2Array {
        &self.control_points
    }

    /// Current per-control-point deformation.
    pub fn deformation(&self) -> &Vec2Array {
        &self.deformation
    }

    /// Rest curve.
    pub fn original_curve(&self) -> &Curve {
        &self.original
    }

    /// Rest curve plus deformation.
    pub fn deformed_curve(&self) -> &Curve {
        &self.deformed
    }

    /// Deformed curve of the previous frame.
    pub fn previous_curve(&self) -> &Curve {
        &self.prev
    }

    /// Curve form.
    pub fn curve_type(&self) -> CurveType {
        self.curve_type
    }

    /// Integrator kind.
    pub fn physics_type(&self) -> PhysicsType {
        self.physics_type
    }

    /// Whether the deformer is switched on.
    pub fn physics_enabled(&self) -> bool {
        self.physics_enabled
    }

    /// `true` when two adjacent control points coincide.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// `true` while a physics driver is integrating.
    pub fn physics_active(&self) -> bool {
        self.driver.is_some()
    }

    /// `true` after too many consecutive invalid frames; cleared by [`Self::reset_physics`].
    pub fn physics_tripped(&self) -> bool {
        self.breaker.is_some()
    }

    /// The failure that tripped the circuit breaker, if any.
    pub fn breaker_error(&self) -> Option<DeformError> {
        self.breaker
            .as_ref()
            .map(|(context, frames)| DeformError::ConsecutiveFailure {
                context: context.clone(),
                frames: *frames,
            })
    }

    /// Number of consecutive frames with at least one invalid value.
    pub fn consecutive_invalid_frames(&self) -> u32 {
        self.diag.consecutive_invalid_frames()
    }

    /// Recent invalid values seen by this deformer.
    pub fn invalid_records(&self) -> impl Iterator<Item = &InvalidRecord> {
        self.diag.records()
    }

    /// Memoized curve parameters of one target.
    pub fn cached_params(&self, target: TargetId) -> Option<&[f64]> {
        self.t_cache.get(&target).map(Vec::as_slice)
    }

    fn make_driver(&self) -> Option<ChainDriver> {
        let usable = self.physics_enabled
            && !self.degenerate
            && self.breaker.is_none()
            && self.control_points.len() >= 2;
        usable.then(|| ChainDriver::new(self.physics_type, &self.config.physics))
    }

    fn rebuild_deformed(&mut self) {
        self.deformed = Curve::new(
            self.curve_type,
            self.control_points.added(&self.deformation),
        );
        self.epoch += 1;
    }

    fn clear_caches(&mut self) {
        self.t_cache.clear();
        self.emitted.clear();
    }

    /// Replace the control points. Deformation, caches and physics start over.
    #[tracing::instrument(skip(self, points), fields(deformer = self.id.0, points = points.len()))]
    pub fn rebuffer(&mut self, points: &Vec2Array) {
        let n = points.len();
        self.control_points = points.clone();
        self.param_offsets = Vec2Array::zeros(n);
        self.physics_offsets = Vec2Array::zeros(n);
        self.deformation = Vec2Array::zeros(n);

        let curve = Curve::new(self.curve_type, points.clone());
        self.original = curve.clone();
        self.prev = curve.clone();
        self.deformed = curve;

        self.degenerate = points.first_non_finite().is_some()
            || (1..n).any(|i| points.at(i) == points.at(i - 1));
        if self.degenerate {
            tracing::warn!(
                deformer = self.id.0,
                "degenerate control points, physics disabled"
            );
        }
        self.clear_caches();
        self.prev_root = None;
        self.driver = self.make_driver();
        self.epoch += 1;
    }

    /// Change the curve form, keeping points and deformation.
    pub fn set_curve_type(&mut self, curve_type: CurveType) {
        if curve_type == self.curve_type {
            return;
        }
        self.curve_type = curve_type;
        self.original = Curve::new(curve_type, self.control_points.clone());
        self.prev = Curve::new(curve_type, self.prev.points().clone());
        self.rebuild_deformed();
        self.clear_caches();
    }

    /// Change the integrator; the new one starts from rest.
    pub fn set_physics_type(&mut self, physics_type: PhysicsType) {
        self.physics_type = physics_type;
        self.physics_offsets = Vec2Array::zeros(self.control_points.len());
        self.prev_root = None;
        self.driver = self.make_driver();
    }

    /// Install the parameter-driven offsets (one per control point) and rebuild the deformed
    /// curve. Offsets of the wrong length are ignored.
    pub fn apply_deformation(&mut self, offsets: &Vec2Array) {
        if offsets.len() != self.control_points.len() {
            tracing::debug!(
                deformer = self.id.0,
                got = offsets.len(),
                want = self.control_points.len(),
                "path payload length mismatch ignored"
            );
            return;
        }
        self.param_offsets = offsets.clone();
        self.param_offsets.zero_non_finite();
        self.refresh_deformation();
        self.rebuild_deformed();
    }

    fn refresh_deformation(&mut self) {
        let n = self.control_points.len();
        let mut physics = self.physics_offsets.clone();
        physics.resize(n);
        physics.scale(self.strength);
        let mut deformation = if self.physics_only {
            physics
        } else {
            let mut d = self.param_offsets.clone();
            d.resize(n);
            d.add_assign(&physics);
            d
        };
        for (i, v) in deformation.iter().enumerate() {
            if !v.is_finite() {
                self.diag.record("path:deformationNaN", i, v);
            }
        }
        deformation.zero_non_finite();
        self.deformation = deformation;
    }

    /// Start a new frame: close the previous diagnostic frame (tripping the circuit breaker if
    /// needed) and allow every target to receive fresh offsets.
    pub fn next_frame(&mut self) {
        self.close_frame();
        self.diag.begin_frame();
        self.epoch += 1;
    }

    fn close_frame(&mut self) {
        self.diag.end_frame();
        let frames = self.diag.consecutive_invalid_frames();
        if self.breaker.is_none() && frames > self.config.invalid_disable_threshold {
            let context = self.diag.last_context().unwrap_or("unknown").to_string();
            let err = DeformError::ConsecutiveFailure {
                context: context.clone(),
                frames,
            };
            tracing::warn!(deformer = self.id.0, error = %err, "physics driver disabled");
            self.breaker = Some((context, frames));
            self.driver = None;
            self.physics_offsets = Vec2Array::zeros(self.control_points.len());
            self.prev_root = None;
        }
    }

    fn soft_reset_driver(&mut self) {
        if let Some(driver) = self.driver.as_mut() {
            driver.reset();
        }
        self.prev_root = None;
        self.physics_offsets = Vec2Array::zeros(self.control_points.len());
    }

    /// Advance one frame by `dt` seconds.
    ///
    /// From the second frame on, the displacement of the chain root is fed to the driver as an
    /// external force before integrating.
    pub fn step(&mut self, dt: f64) {
        self.next_frame();
        self.integrate_physics(dt);
        self.refresh_deformation();
        self.prev = self.deformed.clone();
        self.rebuild_deformed();
    }

    fn integrate_physics(&mut self, dt: f64) {
        if self.driver.is_none() || self.control_points.len() < 2 {
            return;
        }
        if !affine_is_finite(self.world) {
            self.diag.record("path:transformInvalid", 0, Vec2::ZERO);
            self.soft_reset_driver();
            return;
        }
        let root_local = self.control_points.at(0) + self.deformation.at(0);
        let root = (self.world * root_local.to_point()).to_vec2();
        if !root.is_finite() {
            self.diag.record("path:rootNaN", 0, root);
            self.soft_reset_driver();
            return;
        }
        let Some(prev_root) = self.prev_root.replace(root) else {
            return;
        };
        let angle = rotation_of(self.world);
        let Some(driver) = self.driver.as_mut() else {
            return;
        };
        let result = match driver.enforce(root - prev_root) {
            Ok(()) => {
                driver.rotate(angle);
                driver.step(dt, &self.control_points)
            }
            Err(fault) => Err(fault),
        };
        match result {
            Ok(mut offsets) => {
                for (i, v) in offsets.iter().enumerate() {
                    if !v.is_finite() {
                        self.diag.record("path:physicsNaN", i, v);
                    }
                }
                offsets.zero_non_finite();
                self.physics_offsets = offsets;
            }
            Err(fault) => {
                self.diag.record(fault.context(), 0, Vec2::ZERO);
                self.soft_reset_driver();
            }
        }
    }

    /// Enable or disable the deformer. Disabling zeroes the deformation.
    pub fn switch_physics(&mut self, enabled: bool) {
        self.physics_enabled = enabled;
        self.clear_caches();
        self.prev_root = None;
        self.physics_offsets = Vec2Array::zeros(self.control_points.len());
        if !enabled {
            self.param_offsets = Vec2Array::zeros(self.control_points.len());
        }
        self.driver = self.make_driver();
        self.refresh_deformation();
        self.rebuild_deformed();
    }

    /// Clear the circuit breaker and restart physics from rest.
    pub fn reset_physics(&mut self) {
        self.breaker = None;
        self.diag.reset();
        self.prev_root = None;
        self.physics_offsets = Vec2Array::zeros(self.control_points.len());
        self.driver = self.make_driver();
        self.refresh_deformation();
        self.rebuild_deformed();
    }

    /// Snapshot of the physics driver, if one is active.
    pub fn physics_state(&self) -> Option<PhysicsState> {
        self.driver.as_ref().map(ChainDriver::state)
    }

    /// Restore a driver snapshot; ignored without an active driver of the same kind.
    pub fn set_physics_state(&mut self, state: &PhysicsState) {
        if let Some(driver) = self.driver.as_mut() {
            driver.set_state(state);
        }
    }

    fn fingerprint(&self, vertices: &Vec2Array, transform: Affine) -> StateFingerprint {
        let mut h = StableHasher::new();
        h.write_u64(self.epoch);
        h.write_u8(self.curve_type.into());
        h.write_vec2_array(self.deformed.points());
        for c in self.world.as_coeffs().into_iter().chain(transform.as_coeffs()) {
            h.write_f64(c);
        }
        h.write_vec2_array(vertices);
        h.finish()
    }

    fn deform_inner(
        &mut self,
        target: TargetInfo,
        vertices: &Vec2Array,
        deformation: &Vec2Array,
        transform: Affine,
    ) -> DeformOutcome {
        if !self.physics_enabled
            || self.degenerate
            || self.control_points.len() < 2
            || vertices.is_empty()
            || deformation.len() < vertices.len()
        {
            return DeformOutcome::unchanged();
        }
        let Some(frame) = LocalFrame::new(self.world, transform) else {
            self.diag.record("path:centerMatrix", 0, Vec2::ZERO);
            self.soft_reset_driver();
            return DeformOutcome::unchanged();
        };

        let mut input = deformation.clone();
        for (i, v) in input.iter().enumerate() {
            if !v.is_finite() {
                self.diag.record("path:sanitize", i, v);
            }
        }
        input.zero_non_finite();

        let sample = frame.sample(vertices, Some(&input));
        if let Some(i) = sample.first_non_finite() {
            self.diag.record("path:sampleNaN", i, sample.at(i));
            return DeformOutcome::unchanged();
        }

        let fp = self.fingerprint(vertices, transform);
        if self.emitted.get(&target.id) == Some(&fp) {
            return DeformOutcome::unchanged();
        }

        let stale = self
            .t_cache
            .get(&target.id)
            .is_none_or(|ts| ts.len() != sample.len());
        if stale {
            let basis = if self.prev.points().len() >= 2 {
                &self.prev
            } else {
                &self.original
            };
            let samples = self.config.closest_point_samples;
            let ts: Vec<f64> = sample.iter().map(|p| basis.closest_t(p, samples)).collect();
            self.t_cache.insert(target.id, ts);
        }
        let ts = self.t_cache.get(&target.id).map(Vec::as_slice).unwrap_or(&[]);
        let base_points = self.original.points_at(ts);
        let base_tangents = self.original.derivatives_at(ts);
        let live_points = self.deformed.points_at(ts);
        let live_tangents = self.deformed.derivatives_at(ts);

        let mut offsets = Vec2Array::zeros(sample.len());
        for (i, s) in sample.iter().enumerate() {
            let tb = normalize_checked(base_tangents.at(i), TANGENT_EPSILON)
                .unwrap_or(Vec2::new(1.0, 0.0));
            let td = normalize_checked(live_tangents.at(i), TANGENT_EPSILON).unwrap_or(tb);
            let nb = Vec2::new(-tb.y, tb.x);
            let nd = Vec2::new(-td.y, td.x);
            let rel = s - base_points.at(i);
            let rebuilt = live_points.at(i) + td * rel.dot(tb) + nd * rel.dot(nb);
            let offset = rebuilt - s;
            if offset.is_finite() {
                offsets.set(i, offset);
            } else {
                self.diag.record("path:offsetNaN", i, offset);
            }
        }
        if offsets.is_all_zero() {
            return DeformOutcome::unchanged();
        }

        let mut out = frame.emit(&input, &offsets);
        for (i, v) in out.iter().enumerate() {
            if !v.is_finite() {
                self.diag.record("path:resultNaN", i, v);
            }
        }
        out.zero_non_finite();
        self.emitted.insert(target.id, fp);
        DeformOutcome::changed(out)
    }
}

impl Deformer for PathDeformer {
    fn id(&self) -> DeformerId {
        self.id
    }

    fn stage(&self) -> u8 {
        PATH_STAGE
    }

    fn world_transform(&self) -> Affine {
        self.world
    }

    fn set_world_transform(&mut self, world: Affine) {
        self.world = world;
    }

    fn deform(
        &mut self,
        target: TargetInfo,
        vertices: &Vec2Array,
        deformation: &Vec2Array,
        transform: Affine,
    ) -> DeformOutcome {
        let opened = self.diag.begin_frame();
        let out = self.deform_inner(target, vertices, deformation, transform);
        if opened {
            self.close_frame();
        }
        out
    }

    fn notify(&mut self, target: TargetId, reason: NotifyReason) {
        if reason == NotifyReason::StructureChanged {
            self.t_cache.remove(&target);
            self.emitted.remove(&target);
        }
    }

    fn hook_phase(&self, kind: TargetKind) -> Option<HookPhase> {
        match kind {
            TargetKind::PropagatingComposite => None,
            k if k.is_deformable() => Some(if self.dynamic_deformation {
                HookPhase::Post
            } else {
                HookPhase::Pre
            }),
            _ => self.translate_children.then_some(HookPhase::Pre),
        }
    }

    fn payload_len(&self) -> usize {
        self.control_points.len()
    }

    fn apply_payload(&mut self, offsets: &Vec2Array) {
        self.apply_deformation(offsets);
    }
}

fn default_true() -> bool {
    true
}

fn default_strength() -> f64 {
    1.0
}

#[derive(serde::Serialize, serde::Deserialize)]
struct PathDoc {
    #[serde(rename = "physicsEnabled", default = "default_true")]
    physics_enabled: bool,
    #[serde(default = "default_strength")]
    strength: f64,
    #[serde(rename = "translateChildren", default = "default_true")]
    translate_children: bool,
    #[serde(rename = "curveType", default)]
    curve_type: CurveType,
    #[serde(rename = "physicsType", default)]
    physics_type: PhysicsType,
    #[serde(default)]
    physics_only: bool,
    #[serde(default)]
    dynamic_deformation: bool,
    #[serde(rename = "controlPoints", default)]
    control_points: Vec2Array,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    physics: Option<PhysicsState>,
}

impl PathDeformer {
    /// Persist as a key/value document.
    pub fn to_document(&self) -> DeformResult<serde_json::Value> {
        let doc = PathDoc {
            physics_enabled: self.physics_enabled,
            strength: self.strength,
            translate_children: self.translate_children,
            curve_type: self.curve_type,
            physics_type: self.physics_type,
            physics_only: self.physics_only,
            dynamic_deformation: self.dynamic_deformation,
            control_points: self.control_points.clone(),
            physics: self.physics_state(),
        };
        Ok(serde_json::to_value(doc)?)
    }

    /// Restore from a document.
    pub fn from_document(
        value: &serde_json::Value,
        id: DeformerId,
        config: &EngineConfig,
    ) -> DeformResult<Self> {
        let doc: PathDoc = serde_json::from_value(value.clone())?;
        if !doc.strength.is_finite() {
            return Err(DeformError::validation("path strength must be finite"));
        }
        if let Some(i) = doc.control_points.first_non_finite() {
            return Err(DeformError::validation(format!(
                "control point {i} is not finite"
            )));
        }
        let mut path = Self::new(id, config);
        path.physics_enabled = doc.physics_enabled;
        path.strength = doc.strength;
        path.translate_children = doc.translate_children;
        path.curve_type = doc.curve_type;
        path.physics_type = doc.physics_type;
        path.physics_only = doc.physics_only;
        path.dynamic_deformation = doc.dynamic_deformation;
        path.rebuffer(&doc.control_points);
        if let Some(state) = &doc.physics {
            path.set_physics_state(state);
        }
        Ok(path)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/deform/path.rs"]
mod tests;

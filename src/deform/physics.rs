//! Chain physics feeding the path deformer.
//!
//! Physics space is y-up: `physics_y = -screen_y`. Both integrators run semi-implicit Euler in
//! fixed sub-steps; the time of one call is capped so a stalled host cannot trigger a runaway
//! catch-up.

use crate::config::PhysicsConfig;
use crate::foundation::core::{Vec2, Vec2Array};
use crate::foundation::math::{LENGTH_EPSILON, clamp_angle};

/// Integrator kind of a path deformer. Documents store it as `0` (Pendulum) or `1` (SpringPendulum).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PhysicsType {
    /// Rigid links swinging around their joints.
    #[default]
    Pendulum,
    /// Points connected by Hooke springs.
    SpringPendulum,
}

impl From<PhysicsType> for u8 {
    fn from(t: PhysicsType) -> Self {
        match t {
            PhysicsType::Pendulum => 0,
            PhysicsType::SpringPendulum => 1,
        }
    }
}

impl TryFrom<u8> for PhysicsType {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Pendulum),
            1 => Ok(Self::SpringPendulum),
            _ => Err(format!("unknown physics type {v}")),
        }
    }
}

/// Reason an integration frame was aborted.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhysicsFault {
    /// Two adjacent control points coincide.
    #[error("degenerate segment")]
    DegenerateSegment,
    /// A link length is zero or not finite.
    #[error("zero link length")]
    ZeroLength,
    /// Angular acceleration became NaN or infinite.
    #[error("non-finite torque")]
    TorqueNaN,
    /// Angular velocity became NaN or infinite.
    #[error("non-finite angular velocity")]
    VelocityNaN,
    /// Angle became NaN or infinite.
    #[error("non-finite angle")]
    AngleNaN,
    /// Two spring endpoints collapsed onto each other.
    #[error("zero spring length")]
    ZeroSpringDiff,
    /// The external force is not finite.
    #[error("non-finite external force")]
    NonFiniteForce,
    /// A position, velocity or acceleration is not finite.
    #[error("non-finite position")]
    NonFinitePosition,
}

impl PhysicsFault {
    /// Diagnostic context tag.
    pub fn context(self) -> &'static str {
        match self {
            Self::DegenerateSegment => "physics:degenerateSegment",
            Self::ZeroLength => "physics:zeroLength",
            Self::TorqueNaN => "physics:torqueNaN",
            Self::VelocityNaN => "physics:velocityNaN",
            Self::AngleNaN => "physics:angleNaN",
            Self::ZeroSpringDiff => "physics:zeroDiff",
            Self::NonFiniteForce => "physics:externalForce",
            Self::NonFinitePosition => "physics:position",
        }
    }
}

/// Serializable integrator state.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicsState {
    /// Integrator kind.
    #[serde(rename = "type")]
    pub kind: PhysicsType,
    /// Link angles (pendulum).
    #[serde(default)]
    pub angles: Vec<f64>,
    /// Link angular velocities (pendulum).
    #[serde(default)]
    pub angular_velocities: Vec<f64>,
    /// Link rest lengths.
    #[serde(default)]
    pub lengths: Vec<f64>,
    /// Chain anchor in physics space (pendulum).
    pub base: Vec2,
    /// External force currently applied.
    pub external_force: Vec2,
    /// Velocity damping.
    pub damping: f64,
    /// Restoring constant towards the rest shape.
    pub restore: f64,
    /// Sub-step length in seconds.
    pub time_step: f64,
    /// Gravity magnitude (pendulum).
    pub gravity: f64,
    /// Scale applied to enforced forces (pendulum).
    pub input_scale: f64,
    /// Rotation of the world frame (pendulum).
    pub world_angle: f64,
    /// Attenuation of the external torque from link to link (pendulum).
    pub propagate_scale: f64,
    /// Hooke constant (spring pendulum).
    pub spring_constant: f64,
    /// Restoring constant towards the rest positions (spring pendulum).
    pub restoration_constant: f64,
    /// Uniform gravity in physics space (spring pendulum).
    pub gravity_vec: Vec2,
}

// Screen and physics space differ by the sign of y, so the mapping is its own inverse.
fn flip_y(p: Vec2) -> Vec2 {
    Vec2::new(p.x, -p.y)
}

fn finite(v: Vec2, fault: PhysicsFault) -> Result<Vec2, PhysicsFault> {
    if v.is_finite() { Ok(v) } else { Err(fault) }
}

/// Splits `dt` (capped at `max_catch_up_secs`) into full sub-steps plus a trailing partial one.
fn sub_steps(cfg: &PhysicsConfig, dt: f64) -> impl Iterator<Item = f64> + use<> {
    let step = if cfg.sub_step > 0.0 { cfg.sub_step } else { 0.01 };
    let mut h = if dt.is_finite() {
        dt.clamp(0.0, cfg.max_catch_up_secs.max(0.0))
    } else {
        0.0
    };
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        if h > step {
            h -= step;
            Some(step)
        } else {
            done = true;
            (h > 0.0).then_some(h)
        }
    })
}

/// Chain of rigid links, each swinging around the end of the previous one.
#[derive(Clone, Debug, PartialEq)]
pub struct PendulumDriver {
    /// Angular velocity damping.
    pub damping: f64,
    /// Spring constant pulling each link back to its rest angle.
    pub restore: f64,
    /// Gravity magnitude.
    pub gravity: f64,
    /// Scale applied by [`PendulumDriver::enforce`].
    pub input_scale: f64,
    /// Fraction of a link's reaction passed on to the next link.
    pub propagate_scale: f64,
    physics: PhysicsConfig,
    world_angle: f64,
    external_force: Vec2,
    base: Vec2,
    angles: Vec<f64>,
    initial_angles: Vec<f64>,
    angular_velocities: Vec<f64>,
    lengths: Vec<f64>,
}

impl PendulumDriver {
    /// Driver with default constants; the chain is set up lazily on the first step.
    pub fn new(physics: &PhysicsConfig) -> Self {
        Self {
            damping: 1.0,
            restore: 300.0,
            gravity: 9.8,
            input_scale: 0.01,
            propagate_scale: 0.2,
            physics: physics.clone(),
            world_angle: 0.0,
            external_force: Vec2::ZERO,
            base: Vec2::ZERO,
            angles: Vec::new(),
            initial_angles: Vec::new(),
            angular_velocities: Vec::new(),
            lengths: Vec::new(),
        }
    }

    /// Current link angles (0 = hanging straight down).
    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    /// Rest angles of the links.
    pub fn initial_angles(&self) -> &[f64] {
        &self.initial_angles
    }

    /// Forget the chain and the external force.
    pub fn reset(&mut self) {
        self.external_force = Vec2::ZERO;
        self.angles.clear();
        self.initial_angles.clear();
        self.angular_velocities.clear();
        self.lengths.clear();
    }

    /// Apply a root displacement as external force, scaled by `input_scale`.
    pub fn enforce(&mut self, force: Vec2) -> Result<(), PhysicsFault> {
        let scaled = finite(force, PhysicsFault::NonFiniteForce)? * self.input_scale;
        self.external_force = finite(scaled, PhysicsFault::NonFiniteForce)?;
        Ok(())
    }

    /// Tell the chain the world is rotated by `angle`.
    pub fn rotate(&mut self, angle: f64) {
        self.world_angle = clamp_angle(-angle);
    }

    /// Recompute rest angles and lengths from screen-space control points.
    pub fn update_default_shape(&mut self, control: &Vec2Array) -> Result<(), PhysicsFault> {
        self.initial_angles.clear();
        self.lengths.clear();
        let mut degenerate = false;
        for i in 1..control.len() {
            let d = flip_y(control.at(i)) - flip_y(control.at(i - 1));
            let len = d.hypot();
            self.initial_angles.push(d.x.atan2(-d.y));
            self.lengths.push(len);
            degenerate |= !len.is_finite() || len <= LENGTH_EPSILON;
        }
        if degenerate {
            return Err(PhysicsFault::DegenerateSegment);
        }
        Ok(())
    }

    fn setup(&mut self, control: &Vec2Array) -> Result<(), PhysicsFault> {
        let force = self.external_force;
        self.reset();
        self.external_force = force;
        if control.len() < 2 {
            return Ok(());
        }
        self.update_default_shape(control)?;
        self.angles = self.initial_angles.clone();
        self.angular_velocities = vec![0.0; self.angles.len()];
        self.base = finite(flip_y(control.at(0)), PhysicsFault::NonFinitePosition)?;
        Ok(())
    }

    fn integrate(&mut self, h: f64) -> Result<(), PhysicsFault> {
        let Some(&first) = self.lengths.first() else {
            return Ok(());
        };
        let mut torque = self.external_force.x * h * first;
        for i in 0..self.angles.len() {
            let len = self.lengths[i];
            if !len.is_finite() || len <= LENGTH_EPSILON {
                return Err(PhysicsFault::ZeroLength);
            }
            let a = self.angles[i];
            let restore = -(1.0 / h).min(self.restore) * (a - self.initial_angles[i]);
            let damping = -self.damping * self.angular_velocities[i];
            let gravity = -self.gravity * (a + self.world_angle).sin();
            let acc = restore + damping + gravity + torque;
            if !acc.is_finite() {
                return Err(PhysicsFault::TorqueNaN);
            }
            self.angular_velocities[i] += acc * h;
            if !self.angular_velocities[i].is_finite() {
                return Err(PhysicsFault::VelocityNaN);
            }
            self.angles[i] += self.angular_velocities[i] * h;
            if !self.angles[i].is_finite() {
                return Err(PhysicsFault::AngleNaN);
            }
            torque += -acc * self.angles[i].sin() * h * len * self.propagate_scale;
        }
        Ok(())
    }

    /// Advance by `dt` seconds and return per-control-point screen offsets.
    pub fn step(&mut self, dt: f64, control: &Vec2Array) -> Result<Vec2Array, PhysicsFault> {
        if self.angles.is_empty() || self.lengths.is_empty() {
            self.setup(control)?;
        }
        if self.angles.is_empty() {
            return Ok(Vec2Array::zeros(control.len()));
        }
        finite(self.external_force, PhysicsFault::NonFiniteForce)?;
        for h in sub_steps(&self.physics, dt) {
            self.integrate(h)?;
        }

        let mut out = Vec2Array::zeros(control.len());
        let mut p = self.base;
        out.set(0, flip_y(p) - control.at(0));
        let links = self.angles.iter().zip(&self.lengths);
        for (i, (&a, &len)) in links.enumerate().take(control.len().saturating_sub(1)) {
            p.x += len * a.sin();
            p.y -= len * a.cos();
            out.set(i + 1, flip_y(p) - control.at(i + 1));
        }
        Ok(out)
    }

    /// Snapshot of the integrator.
    pub fn state(&self) -> PhysicsState {
        PhysicsState {
            kind: PhysicsType::Pendulum,
            angles: self.angles.clone(),
            angular_velocities: self.angular_velocities.clone(),
            lengths: self.lengths.clone(),
            base: self.base,
            external_force: self.external_force,
            damping: self.damping,
            restore: self.restore,
            time_step: self.physics.sub_step,
            gravity: self.gravity,
            input_scale: self.input_scale,
            world_angle: self.world_angle,
            propagate_scale: self.propagate_scale,
            spring_constant: 0.0,
            restoration_constant: 0.0,
            gravity_vec: Vec2::ZERO,
        }
    }

    /// Restore a snapshot taken by [`PendulumDriver::state`].
    pub fn set_state(&mut self, state: &PhysicsState) {
        self.angles = state.angles.clone();
        self.angular_velocities = state.angular_velocities.clone();
        self.angular_velocities.resize(self.angles.len(), 0.0);
        self.lengths = state.lengths.clone();
        if self.initial_angles.len() != self.angles.len() {
            self.initial_angles = self.angles.clone();
        }
        self.base = state.base;
        self.external_force = state.external_force;
        self.damping = state.damping;
        self.restore = state.restore;
        if state.time_step > 0.0 {
            self.physics.sub_step = state.time_step;
        }
        self.gravity = state.gravity;
        self.input_scale = state.input_scale;
        self.world_angle = state.world_angle;
        self.propagate_scale = state.propagate_scale;
    }
}

/// Chain of point masses joined by Hooke springs; the first point is pinned.
#[derive(Clone, Debug, PartialEq)]
pub struct SpringPendulumDriver {
    /// Velocity damping.
    pub damping: f64,
    /// Hooke constant of the links.
    pub spring_constant: f64,
    /// Pull of every point towards its rest position.
    pub restoration_constant: f64,
    /// Uniform gravity in physics space.
    pub gravity_vec: Vec2,
    physics: PhysicsConfig,
    external_force: Vec2,
    positions: Vec2Array,
    velocities: Vec2Array,
    initial_positions: Vec2Array,
    lengths: Vec<f64>,
}

impl SpringPendulumDriver {
    /// Driver with default constants; the chain is set up lazily on the first step.
    pub fn new(physics: &PhysicsConfig) -> Self {
        Self {
            damping: 0.3,
            spring_constant: 10.0,
            restoration_constant: 0.0,
            gravity_vec: Vec2::new(0.0, -9.8),
            physics: physics.clone(),
            external_force: Vec2::ZERO,
            positions: Vec2Array::new(),
            velocities: Vec2Array::new(),
            initial_positions: Vec2Array::new(),
            lengths: Vec::new(),
        }
    }

    /// Current point positions in physics space.
    pub fn positions(&self) -> &Vec2Array {
        &self.positions
    }

    /// Forget the chain and the external force.
    pub fn reset(&mut self) {
        self.external_force = Vec2::ZERO;
        self.positions.clear();
        self.velocities.clear();
        self.initial_positions.clear();
        self.lengths.clear();
    }

    /// Apply a root displacement as external force.
    pub fn enforce(&mut self, force: Vec2) -> Result<(), PhysicsFault> {
        self.external_force = finite(force, PhysicsFault::NonFiniteForce)?;
        Ok(())
    }

    /// Spring chains ignore world rotation.
    pub fn rotate(&mut self, _angle: f64) {}

    /// Recompute rest positions from screen-space control points.
    pub fn update_default_shape(&mut self, control: &Vec2Array) -> Result<(), PhysicsFault> {
        self.initial_positions.clear();
        let rest: Vec2Array = control.iter().map(flip_y).collect();
        if rest.first_non_finite().is_some() {
            return Err(PhysicsFault::NonFinitePosition);
        }
        self.initial_positions = rest;
        Ok(())
    }

    fn setup(&mut self, control: &Vec2Array) -> Result<(), PhysicsFault> {
        let force = self.external_force;
        self.reset();
        self.external_force = force;
        self.update_default_shape(control)?;
        self.positions = self.initial_positions.clone();
        self.velocities = Vec2Array::zeros(self.positions.len());
        let mut lengths = Vec::with_capacity(self.positions.len().saturating_sub(1));
        for i in 1..self.positions.len() {
            let len = (self.positions.at(i) - self.positions.at(i - 1)).hypot();
            if !len.is_finite() || len <= LENGTH_EPSILON {
                return Err(PhysicsFault::DegenerateSegment);
            }
            lengths.push(len);
        }
        self.lengths = lengths;
        Ok(())
    }

    fn hooke(&self, diff: Vec2, rest: f64) -> Result<Vec2, PhysicsFault> {
        let diff = finite(diff, PhysicsFault::NonFinitePosition)?;
        let len = diff.hypot();
        if !len.is_finite() || len <= LENGTH_EPSILON {
            return Err(PhysicsFault::ZeroSpringDiff);
        }
        Ok(diff * (-self.spring_constant * (len - rest) / len))
    }

    fn integrate(&mut self, h: f64) -> Result<(), PhysicsFault> {
        let n = self.positions.len();
        for i in 1..n {
            let cur = self.positions.at(i);
            // The external force displaces the pinned end of the first link.
            let shift = if i == 1 {
                self.external_force * h
            } else {
                Vec2::ZERO
            };
            let mut spring = self.hooke(cur - (self.positions.at(i - 1) + shift), self.lengths[i - 1])?;
            if i + 1 < n {
                spring += self.hooke(cur - self.positions.at(i + 1), self.lengths[i])?;
            }
            let restoration = (cur - self.initial_positions.at(i)) * -self.restoration_constant;
            let damping = self.velocities.at(i) * -self.damping;
            let acc = finite(
                spring + damping + restoration + self.gravity_vec,
                PhysicsFault::NonFinitePosition,
            )?;
            let vel = finite(self.velocities.at(i) + acc * h, PhysicsFault::NonFinitePosition)?;
            self.velocities.set(i, vel);
            let pos = finite(cur + vel * h, PhysicsFault::NonFinitePosition)?;
            self.positions.set(i, pos);
        }
        Ok(())
    }

    /// Advance by `dt` seconds and return per-control-point screen offsets.
    pub fn step(&mut self, dt: f64, control: &Vec2Array) -> Result<Vec2Array, PhysicsFault> {
        if self.lengths.is_empty() {
            self.setup(control)?;
        }
        if self.lengths.is_empty() {
            return Ok(Vec2Array::zeros(control.len()));
        }
        finite(self.external_force, PhysicsFault::NonFiniteForce)?;
        for h in sub_steps(&self.physics, dt) {
            self.integrate(h)?;
        }
        let mut out = Vec2Array::zeros(control.len());
        for (i, p) in self.positions.iter().enumerate().take(control.len()) {
            out.set(i, flip_y(p) - control.at(i));
        }
        Ok(out)
    }

    /// Snapshot of the integrator constants and links.
    pub fn state(&self) -> PhysicsState {
        PhysicsState {
            kind: PhysicsType::SpringPendulum,
            angles: Vec::new(),
            angular_velocities: Vec::new(),
            lengths: self.lengths.clone(),
            base: Vec2::ZERO,
            external_force: self.external_force,
            damping: self.damping,
            restore: self.restoration_constant,
            time_step: self.physics.sub_step,
            gravity: 0.0,
            input_scale: 0.0,
            world_angle: 0.0,
            propagate_scale: 0.0,
            spring_constant: self.spring_constant,
            restoration_constant: self.restoration_constant,
            gravity_vec: self.gravity_vec,
        }
    }

    /// Restore a snapshot; a zero `restoration_constant` falls back to `restore`.
    pub fn set_state(&mut self, state: &PhysicsState) {
        self.lengths = state.lengths.clone();
        self.external_force = state.external_force;
        self.damping = state.damping;
        self.restoration_constant = if state.restoration_constant == 0.0 {
            state.restore
        } else {
            state.restoration_constant
        };
        if state.time_step > 0.0 {
            self.physics.sub_step = state.time_step;
        }
        self.gravity_vec = state.gravity_vec;
        self.spring_constant = state.spring_constant;
        // Positions are not persisted; rebuild them on the next step.
        if self.positions.len() != self.lengths.len() + 1 {
            self.lengths.clear();
        }
    }
}

/// The integrator owned by a path deformer.
#[derive(Clone, Debug, PartialEq)]
pub enum ChainDriver {
    /// Rigid-link pendulum.
    Pendulum(PendulumDriver),
    /// Spring chain.
    SpringPendulum(SpringPendulumDriver),
}

impl ChainDriver {
    /// Fresh driver of the given kind.
    pub fn new(kind: PhysicsType, physics: &PhysicsConfig) -> Self {
        match kind {
            PhysicsType::Pendulum => Self::Pendulum(PendulumDriver::new(physics)),
            PhysicsType::SpringPendulum => Self::SpringPendulum(SpringPendulumDriver::new(physics)),
        }
    }

    /// Integrator kind.
    pub fn kind(&self) -> PhysicsType {
        match self {
            Self::Pendulum(_) => PhysicsType::Pendulum,
            Self::SpringPendulum(_) => PhysicsType::SpringPendulum,
        }
    }

    /// See [`PendulumDriver::reset`].
    pub fn reset(&mut self) {
        match self {
            Self::Pendulum(d) => d.reset(),
            Self::SpringPendulum(d) => d.reset(),
        }
    }

    /// See [`PendulumDriver::enforce`].
    pub fn enforce(&mut self, force: Vec2) -> Result<(), PhysicsFault> {
        match self {
            Self::Pendulum(d) => d.enforce(force),
            Self::SpringPendulum(d) => d.enforce(force),
        }
    }

    /// See [`PendulumDriver::rotate`].
    pub fn rotate(&mut self, angle: f64) {
        match self {
            Self::Pendulum(d) => d.rotate(angle),
            Self::SpringPendulum(d) => d.rotate(angle),
        }
    }

    /// See [`PendulumDriver::step`].
    pub fn step(&mut self, dt: f64, control: &Vec2Array) -> Result<Vec2Array, PhysicsFault> {
        match self {
            Self::Pendulum(d) => d.step(dt, control),
            Self::SpringPendulum(d) => d.step(dt, control),
        }
    }

    /// Snapshot of the integrator.
    pub fn state(&self) -> PhysicsState {
        match self {
            Self::Pendulum(d) => d.state(),
            Self::SpringPendulum(d) => d.state(),
        }
    }

    /// Restore a snapshot of the same kind; other kinds are ignored.
    pub fn set_state(&mut self, state: &PhysicsState) {
        match self {
            Self::Pendulum(d) if state.kind == PhysicsType::Pendulum => d.set_state(state),
            Self::SpringPendulum(d) if state.kind == PhysicsType::SpringPendulum => {
                d.set_state(state)
            }
            _ => tracing::debug!(kind = ?state.kind, "physics state kind mismatch ignored"),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/deform/physics.rs"]
mod tests;

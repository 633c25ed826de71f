//! Marionette is a parametric deformation engine for 2D rigged puppets.
//!
//! A host scene graph drives it through three pieces:
//!
//! - [`Parameter`]s hold keyed values in [`Binding`]s and interpolate them over a keypoint grid
//! - Deformers ([`PathDeformer`], [`GridDeformer`], [`MeshGroupDeformer`]) turn a payload of
//!   control-point offsets into per-vertex offsets of their targets
//! - [`TargetFilters`] keeps the per-target hook lists and runs them in order
//!
//! Path deformers can additionally animate their control points with a [`ChainDriver`].
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod deform;
mod foundation;
mod param;

pub use crate::config::{EngineConfig, PhysicsConfig};
pub use crate::foundation::core::{Affine, DeformerId, Point, TargetId, Vec2, Vec2Array};
pub use crate::foundation::diag::InvalidRecord;
pub use crate::foundation::error::{DeformError, DeformResult};

pub use crate::param::binding::{
    AnyBinding, Binding, BoundValue, DEFORM_BINDING_NAME, DeformBinding, ValueBinding,
};
pub use crate::param::grid::{BindingGrid, GridIndex, InterpolateMode};
pub use crate::param::parameter::{MergeMode, ParamAxes, Parameter};
pub use crate::param::value::{DeformSlot, GridValue, ValueAxis};

pub use crate::deform::bake::transfer_to_binding;
pub use crate::deform::contract::{
    AnyDeformer, DeformOutcome, Deformer, FilterHook, GRID_STAGE, HookPhase, MESH_GROUP_STAGE,
    NotifyReason, PATH_STAGE, TargetFilters, TargetInfo, TargetKind,
};
pub use crate::deform::curve::{Curve, CurveType};
pub use crate::deform::grid::{
    AXIS_TOLERANCE, BOUNDARY_TOLERANCE, GridCell, GridDeformer, GridFormation, normalize_axis,
};
pub use crate::deform::mesh_group::MeshGroupDeformer;
pub use crate::deform::path::PathDeformer;
pub use crate::deform::physics::{
    ChainDriver, PendulumDriver, PhysicsFault, PhysicsState, PhysicsType, SpringPendulumDriver,
};

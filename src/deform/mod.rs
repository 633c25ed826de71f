//! Deformers and the filter contract through which a host drives them.
//!
//! Mesh-group deformers run first, then grids, then paths. Every deformer works in its own local
//! space and hands offsets back in the target's space.

pub(crate) mod bake;
pub(crate) mod contract;
pub(crate) mod curve;
pub(crate) mod grid;
pub(crate) mod mesh_group;
pub(crate) mod path;
pub(crate) mod physics;

//! Parameters, their keypoint grids and the bindings that map a parameter position to values.

pub(crate) mod binding;
pub(crate) mod grid;
pub(crate) mod parameter;
pub(crate) mod value;

#![doc = include_str!("../../../readme.md")]

pub mod assemble;
mod bounding_box;
mod config;
pub mod context;
pub mod geometry;
mod grid;
pub mod grouping;
pub(crate) mod math;
mod mesh;
pub mod obscuration;
mod pipeline;
pub mod polygon;
pub mod pool;
mod triangle;
pub mod triangulate;
mod trimesh;

#[cfg(test)]
mod test_util;

pub use bounding_box::BoundingBox;
pub use config::{ConfigError, GeneratorConfig, GeneratorConfigBuilder};
pub use context::Diagnostics;
pub use grid::{Bucket, GRID_RESOLUTION, GridError, TriGrid};
pub use math::{Aabb3d, Tolerances};
pub use mesh::{Mesh, NavMesh, SourceId};
pub use pipeline::{GenerateError, NavOutput, Scene, SceneMesh, generate, generate_on};
pub use pool::{PoolConfig, WorkerPool};
pub use triangle::{Triangle, TriangleState, VertexFlags};
pub use trimesh::{MeshError, TriMesh};

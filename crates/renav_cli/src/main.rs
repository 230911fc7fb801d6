//! Generates navigation meshes for a scene stored as JSON.
//!
//! ```text
//! renav <scene.json> [--config <config.json>] [--output <navmeshes.json>]
//! ```
//!
//! Without `--output`, the result is written to stdout. Set `RUST_LOG` to control logging.

use std::{
    fs,
    io::{self, Write as _},
    path::{Path, PathBuf},
};

use anyhow::{Context as _, bail};
use glam::{Affine3A, Quat, Vec3, Vec3A};
use renav::{Diagnostics, GeneratorConfigBuilder, NavMesh, Scene, SceneMesh, SourceId, TriMesh};
use serde::{Deserialize, Serialize};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    let scene: SceneFile = read_json(&args.scene)?;
    let config = match &args.config {
        Some(path) => read_json::<GeneratorConfigBuilder>(path)?,
        None => GeneratorConfigBuilder::default(),
    }
    .build()
    .context("invalid configuration")?;

    let scene = scene.into_scene();
    tracing::info!(
        "Loaded {} meshes and {} bounds volumes from {}",
        scene.meshes.len(),
        scene.bounds_volumes.len(),
        args.scene.display()
    );
    let output = renav::generate(&scene, &config).context("generation failed")?;

    let file = OutputFile {
        partial: output.is_partial(),
        navmeshes: output.navmeshes.iter().map(NavMeshRecord::from).collect(),
        diagnostics: DiagnosticsRecord::from(&output.diagnostics),
    };
    let json = serde_json::to_string_pretty(&file)?;
    match &args.output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => writeln!(io::stdout().lock(), "{json}")?,
    }
    Ok(())
}

#[derive(Debug, PartialEq)]
struct Args {
    scene: PathBuf,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut scene = None;
        let mut config = None;
        let mut output = None;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    config = Some(args.next().context("--config needs a path")?.into());
                }
                "--output" | "-o" => {
                    output = Some(args.next().context("--output needs a path")?.into());
                }
                flag if flag.starts_with('-') => bail!("unknown flag {flag}"),
                path if scene.is_none() => scene = Some(path.into()),
                path => bail!("unexpected argument {path}"),
            }
        }
        Ok(Self {
            scene: scene.context(
                "usage: renav <scene.json> [--config <config.json>] [--output <navmeshes.json>]",
            )?,
            config,
            output,
        })
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> anyhow::Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

#[derive(Debug, Deserialize)]
struct SceneFile {
    bounds_volumes: Vec<MeshRecord>,
    #[serde(default)]
    meshes: Vec<MeshRecord>,
}

impl SceneFile {
    fn into_scene(self) -> Scene {
        Scene {
            bounds_volumes: self
                .bounds_volumes
                .into_iter()
                .map(MeshRecord::into_scene_mesh)
                .collect(),
            meshes: self
                .meshes
                .into_iter()
                .map(MeshRecord::into_scene_mesh)
                .collect(),
        }
    }
}

/// A mesh with its transform split into parts, as exported by most editors.
#[derive(Debug, Deserialize)]
struct MeshRecord {
    id: u64,
    #[serde(flatten)]
    geometry: TriMesh,
    #[serde(default)]
    translation: Vec3,
    #[serde(default)]
    rotation: Quat,
    #[serde(default = "unit_scale")]
    scale: Vec3,
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

impl MeshRecord {
    fn into_scene_mesh(self) -> SceneMesh {
        SceneMesh {
            source: SourceId(self.id),
            transform: Affine3A::from_scale_rotation_translation(
                self.scale,
                self.rotation,
                self.translation,
            ),
            geometry: self.geometry,
        }
    }
}

#[derive(Debug, Serialize)]
struct OutputFile {
    partial: bool,
    navmeshes: Vec<NavMeshRecord>,
    diagnostics: DiagnosticsRecord,
}

#[derive(Debug, Serialize)]
struct NavMeshRecord {
    sources: Vec<SourceId>,
    vertices: Vec<Vec3A>,
    indices: Vec<[u32; 3]>,
    normals: Vec<Vec3A>,
}

impl From<&NavMesh> for NavMeshRecord {
    fn from(navmesh: &NavMesh) -> Self {
        Self {
            sources: navmesh.sources.clone(),
            vertices: navmesh.vertices.clone(),
            indices: navmesh.indices.iter().map(|i| i.to_array()).collect(),
            normals: navmesh.normals.clone(),
        }
    }
}

/// The diagnostics in a form a viewer can draw.
#[derive(Debug, Serialize)]
struct DiagnosticsRecord {
    culled_triangles: Vec<[Vec3A; 3]>,
    problem_triangles: Vec<ProblemRecord>,
    failed_polygons: Vec<ProblemPolygonRecord>,
    rejected_meshes: Vec<RejectedRecord>,
    failed_groups: Vec<RejectedGroupRecord>,
}

#[derive(Debug, Serialize)]
struct ProblemRecord {
    source: SourceId,
    positions: [Vec3A; 3],
    reason: String,
}

#[derive(Debug, Serialize)]
struct ProblemPolygonRecord {
    source: SourceId,
    vertices: Vec<Vec3A>,
    error: String,
}

#[derive(Debug, Serialize)]
struct RejectedRecord {
    source: SourceId,
    error: String,
}

#[derive(Debug, Serialize)]
struct RejectedGroupRecord {
    sources: Vec<SourceId>,
    reason: String,
}

impl From<&Diagnostics> for DiagnosticsRecord {
    fn from(diagnostics: &Diagnostics) -> Self {
        Self {
            culled_triangles: diagnostics
                .culled_triangles
                .iter()
                .map(|culled| culled.positions)
                .collect(),
            problem_triangles: diagnostics
                .problem_triangles
                .iter()
                .map(|problem| ProblemRecord {
                    source: problem.source,
                    positions: problem.positions,
                    reason: problem.reason.to_string(),
                })
                .collect(),
            failed_polygons: diagnostics
                .failed_polygons
                .iter()
                .map(|failed| ProblemPolygonRecord {
                    source: failed.source,
                    vertices: failed.vertices.clone(),
                    error: failed.error.to_string(),
                })
                .collect(),
            rejected_meshes: diagnostics
                .rejected_meshes
                .iter()
                .map(|rejected| RejectedRecord {
                    source: rejected.source,
                    error: rejected.error.to_string(),
                })
                .collect(),
            failed_groups: diagnostics
                .failed_groups
                .iter()
                .map(|failed| RejectedGroupRecord {
                    sources: failed.sources.clone(),
                    reason: failed.reason.to_string(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(args: &[&str]) -> anyhow::Result<Args> {
        Args::parse(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn parses_paths_and_flags() {
        let parsed = args(&["scene.json", "--config", "c.json", "-o", "out.json"]).unwrap();
        assert_eq!(
            parsed,
            Args {
                scene: "scene.json".into(),
                config: Some("c.json".into()),
                output: Some("out.json".into()),
            }
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(args(&[]).is_err());
        assert!(args(&["scene.json", "--verbose"]).is_err());
        assert!(args(&["scene.json", "--config"]).is_err());
        assert!(args(&["a.json", "b.json"]).is_err());
    }

    #[test]
    fn mesh_records_default_to_identity() {
        let record: MeshRecord = serde_json::from_str(
            r#"{
                "id": 7,
                "vertices": [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                "indices": [[0, 1, 2]],
                "translation": [0.0, 0.0, 2.0]
            }"#,
        )
        .unwrap();
        let mesh = record.into_scene_mesh();
        assert_eq!(mesh.source, SourceId(7));
        assert_eq!(mesh.geometry.indices.len(), 1);
        assert_eq!(
            mesh.transform.transform_point3(Vec3::X),
            Vec3::new(1.0, 0.0, 2.0)
        );
    }
}

//! Container image inspection.
//!
//! For each image variant the inspector walks the multi-platform manifest
//! list, sums the layer sizes of every Linux platform image, and optionally
//! runs the image to read the version it reports about itself.
//!
//! Registry access goes through `crane manifest`, the container runtime
//! through `docker run`, both via [`CommandRunner`].

mod manifest;

pub use manifest::{Descriptor, ImageManifest, ManifestEntry, ManifestIndex, Platform};

use crate::config::{Timeouts, Tools};
use crate::error::{CommandError, InspectError};
use crate::exec::CommandRunner;
use crate::model::{format_size_mb, Detection, ImageVariant};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// What was learned about one image variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageInspection {
    /// Total layer bytes per architecture.
    pub architectures: BTreeMap<String, u64>,
    pub detected_version: Option<String>,
}

pub struct ImageInspector {
    runner: Arc<dyn CommandRunner>,
    crane: String,
    docker: String,
    registry_timeout: Duration,
    run_timeout: Duration,
}

impl ImageInspector {
    pub fn new(runner: Arc<dyn CommandRunner>, tools: &Tools, timeouts: &Timeouts) -> Self {
        Self {
            runner,
            crane: tools.crane.clone(),
            docker: tools.docker.clone(),
            registry_timeout: timeouts.registry(),
            run_timeout: timeouts.run(),
        }
    }

    /// Inspects one image variant.
    ///
    /// # Errors
    ///
    /// Fails only when the manifest list cannot be fetched or parsed.
    /// Per-architecture and version-detection failures are logged and the
    /// affected entries left out.
    pub async fn inspect_image(&self, image: &ImageVariant) -> Result<ImageInspection, InspectError> {
        let architectures = self.architecture_sizes(&image.image).await?;

        let detected_version = match &image.detection {
            Some(detection) => match self.detect_version(&image.image, detection).await {
                Ok(version) => {
                    tracing::info!("Detected version in {}: {}", image.image, version);
                    Some(version)
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    None
                }
            },
            None => None,
        };

        Ok(ImageInspection {
            architectures,
            detected_version,
        })
    }

    /// Returns the manifest-list entries for `reference`.
    pub async fn manifest_list(&self, reference: &str) -> Result<Vec<ManifestEntry>, InspectError> {
        tracing::info!("Fetching manifest list for {}", reference);

        let manifest_err = |reason: String| InspectError::Manifest {
            reference: reference.to_string(),
            reason,
        };

        let raw = self
            .crane_manifest(reference)
            .await
            .map_err(|e| manifest_err(e.to_string()))?;

        let index: ManifestIndex =
            serde_json::from_slice(&raw).map_err(|e| manifest_err(e.to_string()))?;

        match index.manifests {
            Some(manifests) => Ok(manifests),
            None => {
                tracing::warn!("{} is not a multi-platform manifest list", reference);
                Ok(Vec::new())
            }
        }
    }

    /// Sums the layer sizes of every Linux platform image of `reference`.
    ///
    /// Platforms whose manifest cannot be read are skipped.
    pub async fn architecture_sizes(
        &self,
        reference: &str,
    ) -> Result<BTreeMap<String, u64>, InspectError> {
        let mut sizes = BTreeMap::new();

        for entry in self.manifest_list(reference).await? {
            if !entry.is_linux() {
                continue;
            }

            let arch = &entry.platform.architecture;
            tracing::info!("Reading image for arch '{}' with digest {}", arch, entry.digest);

            match self.platform_size(reference, &entry.digest).await {
                Ok(bytes) => {
                    tracing::info!("Image size for arch '{}': {} MB", arch, format_size_mb(bytes));
                    sizes.insert(arch.clone(), bytes);
                }
                Err(e) => tracing::warn!("{}", e),
            }
        }

        Ok(sizes)
    }

    /// Total layer bytes of the platform image `reference@digest`.
    pub async fn platform_size(&self, reference: &str, digest: &str) -> Result<u64, InspectError> {
        let platform_ref = format!("{}@{}", reference, digest);
        let manifest_err = |reason: String| InspectError::Manifest {
            reference: platform_ref.clone(),
            reason,
        };

        let raw = self
            .crane_manifest(&platform_ref)
            .await
            .map_err(|e| manifest_err(e.to_string()))?;

        let manifest: ImageManifest =
            serde_json::from_slice(&raw).map_err(|e| manifest_err(e.to_string()))?;

        Ok(manifest.total_layer_size())
    }

    /// Runs the image with the detection command and extracts the version.
    pub async fn detect_version(
        &self,
        reference: &str,
        detection: &Detection,
    ) -> Result<String, InspectError> {
        let extraction_err = |reason: String| InspectError::VersionExtraction {
            reference: reference.to_string(),
            reason,
        };

        let mut args = vec!["run".to_string(), "--rm".to_string(), reference.to_string()];
        args.extend(detection.command.iter().cloned());

        let output = self
            .runner
            .run(&self.docker, &args, self.run_timeout)
            .await
            .map_err(|e| extraction_err(e.to_string()))?;

        let text = output.combined();
        output
            .into_stdout(&self.docker)
            .map_err(|e| extraction_err(e.to_string()))?;

        detection
            .regex
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| extraction_err(format!("no match for /{}/", detection.regex)))
    }

    async fn crane_manifest(&self, reference: &str) -> Result<Vec<u8>, CommandError> {
        let args = vec!["manifest".to_string(), reference.to_string()];
        self.runner
            .run(&self.crane, &args, self.registry_timeout)
            .await?
            .into_stdout(&self.crane)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRunner;
    use crate::exec::CommandOutput;
    use crate::model::Variant;
    use regex::Regex;

    const REF: &str = "docker.io/bitnami/nginx:latest";

    const INDEX: &str = r#"{
        "manifests": [
            {"digest": "sha256:amd", "platform": {"architecture": "amd64", "os": "linux"}},
            {"digest": "sha256:arm", "platform": {"architecture": "arm64", "os": "linux"}},
            {"digest": "sha256:att", "platform": {"architecture": "unknown", "os": "unknown"}}
        ]
    }"#;

    fn inspector(runner: ScriptedRunner) -> ImageInspector {
        ImageInspector::new(Arc::new(runner), &Tools::default(), &Timeouts::default())
    }

    fn variant(detection: Option<Detection>) -> ImageVariant {
        ImageVariant {
            variant: Variant::Bitnami,
            image: REF.to_string(),
            detection,
        }
    }

    #[tokio::test]
    async fn test_sizes_per_linux_architecture() {
        let runner = ScriptedRunner::new()
            .ok(&format!("crane manifest {REF}"), INDEX)
            .ok(
                &format!("crane manifest {REF}@sha256:amd"),
                r#"{"layers": [{"size": 1048576}, {"size": 2097152}, {"size": 524288}]}"#,
            )
            .ok(
                &format!("crane manifest {REF}@sha256:arm"),
                r#"{"layers": [{"size": 1048576}]}"#,
            );
        let inspector = inspector(runner);

        let inspection = inspector.inspect_image(&variant(None)).await.unwrap();

        assert_eq!(inspection.architectures.len(), 2);
        assert_eq!(inspection.architectures["amd64"], 3_670_016);
        assert_eq!(inspection.architectures["arm64"], 1_048_576);
        assert!(inspection.detected_version.is_none());
    }

    #[tokio::test]
    async fn test_failed_architecture_is_omitted() {
        let runner = ScriptedRunner::new()
            .ok(&format!("crane manifest {REF}"), INDEX)
            .ok(
                &format!("crane manifest {REF}@sha256:amd"),
                r#"{"layers": [{"size": 10}]}"#,
            )
            .exit(&format!("crane manifest {REF}@sha256:arm"), 1, "MANIFEST_UNKNOWN");
        let inspector = inspector(runner);

        let sizes = inspector.architecture_sizes(REF).await.unwrap();

        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes["amd64"], 10);
    }

    #[tokio::test]
    async fn test_manifest_list_failure() {
        let runner =
            ScriptedRunner::new().exit(&format!("crane manifest {REF}"), 1, "UNAUTHORIZED");
        let err = inspector(runner)
            .inspect_image(&variant(None))
            .await
            .unwrap_err();
        assert!(matches!(err, InspectError::Manifest { .. }));
    }

    #[tokio::test]
    async fn test_manifest_list_parse_failure() {
        let runner = ScriptedRunner::new().ok(&format!("crane manifest {REF}"), "not json");
        let err = inspector(runner).manifest_list(REF).await.unwrap_err();
        assert!(matches!(err, InspectError::Manifest { .. }));
    }

    #[tokio::test]
    async fn test_single_platform_reference_has_no_sizes() {
        let runner = ScriptedRunner::new().ok(
            &format!("crane manifest {REF}"),
            r#"{"schemaVersion": 2, "layers": [{"size": 5}]}"#,
        );
        let sizes = inspector(runner).architecture_sizes(REF).await.unwrap();
        assert!(sizes.is_empty());
    }

    fn detection() -> Detection {
        Detection {
            command: vec!["nginx".to_string(), "-v".to_string()],
            regex: Regex::new(r"nginx/(\d+\.\d+\.\d+)").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_detect_version_from_stderr() {
        let runner = ScriptedRunner::new().output(
            &format!("docker run --rm {REF} nginx -v"),
            CommandOutput {
                code: Some(0),
                stdout: Vec::new(),
                stderr: b"nginx version: nginx/1.27.3\n".to_vec(),
            },
        );
        let inspector = inspector(runner);

        let version = inspector.detect_version(REF, &detection()).await.unwrap();
        assert_eq!(version, "1.27.3");
    }

    #[tokio::test]
    async fn test_detect_version_no_match() {
        let runner = ScriptedRunner::new().ok(&format!("docker run --rm {REF} nginx -v"), "hello");
        let err = inspector(runner)
            .detect_version(REF, &detection())
            .await
            .unwrap_err();
        assert!(matches!(err, InspectError::VersionExtraction { .. }));
    }

    #[tokio::test]
    async fn test_detect_version_command_failure() {
        let runner = ScriptedRunner::new().exit(
            &format!("docker run --rm {REF} nginx -v"),
            127,
            "nginx/1.0.0 exec: not found",
        );
        let err = inspector(runner)
            .detect_version(REF, &detection())
            .await
            .unwrap_err();
        assert!(matches!(err, InspectError::VersionExtraction { .. }));
    }

    #[tokio::test]
    async fn test_detection_failure_keeps_sizes() {
        let runner = ScriptedRunner::new()
            .ok(
                &format!("crane manifest {REF}"),
                r#"{"manifests": [{"digest": "sha256:amd", "platform": {"architecture": "amd64", "os": "linux"}}]}"#,
            )
            .ok(
                &format!("crane manifest {REF}@sha256:amd"),
                r#"{"layers": [{"size": 2048}]}"#,
            )
            .timeout(&format!("docker run --rm {REF} nginx -v"));

        let inspection = inspector(runner)
            .inspect_image(&variant(Some(detection())))
            .await
            .unwrap();

        assert_eq!(inspection.architectures["amd64"], 2048);
        assert!(inspection.detected_version.is_none());
    }
}

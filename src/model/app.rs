use crate::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The fixed set of image distributions tracked per application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Bitnami,
    BitnamiSecure,
    Cg,
}

impl Variant {
    /// All variants, in processing order.
    pub const ALL: [Variant; 3] = [Variant::Bitnami, Variant::BitnamiSecure, Variant::Cg];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Bitnami => "bitnami",
            Variant::BitnamiSecure => "bitnamisecure",
            Variant::Cg => "cg",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How to read a version string out of a running container.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Arguments appended to `run --rm <image>`.
    pub command: Vec<String>,
    /// Pattern whose first capture group is the version.
    pub regex: Regex,
}

/// One image distribution of a tracked application.
#[derive(Debug, Clone)]
pub struct ImageVariant {
    pub variant: Variant,
    pub image: String,
    pub detection: Option<Detection>,
}

/// A validated application entry, ready to be processed.
#[derive(Debug, Clone)]
pub struct TrackedApp {
    pub name: String,
    pub url: String,
    pub regex: Regex,
    /// Variants with a non-empty image reference, in [`Variant::ALL`] order.
    pub variants: Vec<ImageVariant>,
}

/// An application entry as written in the apps file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppEntry {
    pub url: String,
    pub regex: String,
    #[serde(default)]
    pub bitnami: Option<VariantEntry>,
    #[serde(default)]
    pub bitnamisecure: Option<VariantEntry>,
    #[serde(default)]
    pub cg: Option<VariantEntry>,
}

/// A variant is either a bare image reference or a detailed entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum VariantEntry {
    Image(String),
    Detailed(ImageEntry),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageEntry {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
}

impl AppEntry {
    fn variant(&self, variant: Variant) -> Option<&VariantEntry> {
        match variant {
            Variant::Bitnami => self.bitnami.as_ref(),
            Variant::BitnamiSecure => self.bitnamisecure.as_ref(),
            Variant::Cg => self.cg.as_ref(),
        }
    }
}

impl TrackedApp {
    /// Validates an apps-file entry and compiles its patterns.
    pub fn from_entry(name: &str, entry: &AppEntry) -> Result<Self, ConfigError> {
        validate_name(name)?;

        if entry.url.trim().is_empty() {
            return Err(invalid(name, "url must not be empty"));
        }

        let regex = compile_with_group(name, "regex", &entry.regex)?;

        let mut variants = Vec::new();
        for variant in Variant::ALL {
            let Some(spec) = entry.variant(variant) else {
                continue;
            };

            let detailed = match spec {
                VariantEntry::Image(image) => ImageEntry {
                    image: image.clone(),
                    ..Default::default()
                },
                VariantEntry::Detailed(detailed) => detailed.clone(),
            };

            let image = detailed.image.trim();
            if image.is_empty() {
                tracing::debug!("Skipping empty image reference for {}/{}", name, variant);
                continue;
            }

            let command = detailed.command.filter(|c| !c.trim().is_empty());
            let pattern = detailed.regex.filter(|r| !r.is_empty());

            let detection = match (command, pattern) {
                (Some(command), Some(pattern)) => Some(Detection {
                    command: command.split_whitespace().map(str::to_string).collect(),
                    regex: compile_with_group(name, &format!("{}.regex", variant), &pattern)?,
                }),
                (None, None) => None,
                (Some(_), None) => {
                    return Err(invalid(
                        name,
                        &format!("{}: command is set but regex is missing", variant),
                    ))
                }
                (None, Some(_)) => {
                    return Err(invalid(
                        name,
                        &format!("{}: regex is set but command is missing", variant),
                    ))
                }
            };

            variants.push(ImageVariant {
                variant,
                image: image.to_string(),
                detection,
            });
        }

        Ok(Self {
            name: name.to_string(),
            url: entry.url.trim().to_string(),
            regex,
            variants,
        })
    }
}

/// App names become file names, so they must stay a single path component.
fn validate_name(name: &str) -> Result<(), ConfigError> {
    let unsafe_name = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);

    if unsafe_name {
        return Err(invalid(name, "name must be a plain file name"));
    }
    Ok(())
}

fn compile_with_group(app: &str, field: &str, pattern: &str) -> Result<Regex, ConfigError> {
    let regex = Regex::new(pattern).map_err(|source| ConfigError::Regex {
        app: app.to_string(),
        field: field.to_string(),
        source,
    })?;

    // captures_len counts the implicit whole-match group
    if regex.captures_len() < 2 {
        return Err(invalid(
            app,
            &format!("{} must contain a capture group", field),
        ));
    }

    Ok(regex)
}

fn invalid(app: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        app: app.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(yaml: &str) -> AppEntry {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_shorthand_and_detailed_variants() {
        let app = TrackedApp::from_entry(
            "nginx",
            &entry(
                r#"
url: https://example.com/tags
regex: 'release-(\d+\.\d+\.\d+)'
bitnami: docker.io/bitnami/nginx:latest
cg:
  image: cgr.dev/chainguard/nginx:latest
  command: nginx -v
  regex: 'nginx/(\S+)'
"#,
            ),
        )
        .unwrap();

        assert_eq!(app.variants.len(), 2);
        assert_eq!(app.variants[0].variant, Variant::Bitnami);
        assert!(app.variants[0].detection.is_none());

        let cg = &app.variants[1];
        assert_eq!(cg.variant, Variant::Cg);
        let detection = cg.detection.as_ref().unwrap();
        assert_eq!(detection.command, vec!["nginx", "-v"]);
    }

    #[test]
    fn test_empty_image_is_dropped() {
        let app = TrackedApp::from_entry(
            "redis",
            &entry(
                r#"
url: https://example.com
regex: '(\d+\.\d+\.\d+)'
bitnami: ""
bitnamisecure:
  image: ""
  command: redis-server --version
  regex: 'v=(\S+)'
"#,
            ),
        )
        .unwrap();

        assert!(app.variants.is_empty());
    }

    #[test]
    fn test_lone_command_rejected() {
        let err = TrackedApp::from_entry(
            "redis",
            &entry(
                r#"
url: https://example.com
regex: '(\d+)'
bitnami:
  image: bitnami/redis
  command: redis-server --version
"#,
            ),
        )
        .unwrap_err();

        assert!(err.to_string().contains("regex is missing"));
    }

    #[test]
    fn test_lone_regex_rejected() {
        let err = TrackedApp::from_entry(
            "redis",
            &entry(
                r#"
url: https://example.com
regex: '(\d+)'
bitnami:
  image: bitnami/redis
  regex: 'v=(\S+)'
"#,
            ),
        )
        .unwrap_err();

        assert!(err.to_string().contains("command is missing"));
    }

    #[test]
    fn test_regex_without_group_rejected() {
        let err = TrackedApp::from_entry(
            "redis",
            &entry("url: https://example.com\nregex: '\\d+\\.\\d+'\n"),
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_bad_regex_rejected() {
        let err = TrackedApp::from_entry(
            "redis",
            &entry("url: https://example.com\nregex: '(unclosed'\n"),
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Regex { .. }));
    }

    #[test]
    fn test_unsafe_names_rejected() {
        let ok = entry("url: https://example.com\nregex: '(\\d+)'\n");
        for name in ["", "..", "a/b", "a\\b"] {
            assert!(TrackedApp::from_entry(name, &ok).is_err(), "{name:?}");
        }
        assert!(TrackedApp::from_entry("my-app.v2", &ok).is_ok());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result: Result<AppEntry, _> =
            serde_yaml::from_str("url: x\nregex: '(x)'\nbitnamii: foo\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_variant_keys() {
        assert_eq!(Variant::BitnamiSecure.as_str(), "bitnamisecure");
        assert_eq!(
            serde_json::to_string(&Variant::BitnamiSecure).unwrap(),
            "\"bitnamisecure\""
        );
    }
}

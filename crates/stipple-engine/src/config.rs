use std::env;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use stipple_contracts::artifacts::{ArtifactNamer, NamingPolicy};
use stipple_contracts::{GatewayError, GatewayResult};

pub const DEFAULT_API_BASE: &str = "https://api.stability.ai";
pub const DEFAULT_SPEECH_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_SPEECH_MODEL: &str = "whisper-1";
pub const DEFAULT_IMAGE_DIR: &str = "./static/images";
pub const DEFAULT_WEB_ROOT: &str = "./static";
pub const DEFAULT_EVENTS_PATH: &str = "./events.jsonl";
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_SPEECH_API_BASE.to_string(),
            model: DEFAULT_SPEECH_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub image_dir: PathBuf,
    pub events_path: PathBuf,
    pub naming: NamingPolicy,
    pub upstream_timeout: Duration,
    pub speech: SpeechConfig,
    pub ffmpeg: PathBuf,
    pub web_root: PathBuf,
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            events_path: PathBuf::from(DEFAULT_EVENTS_PATH),
            naming: NamingPolicy::default(),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            speech: SpeechConfig::default(),
            ffmpeg: PathBuf::from("ffmpeg"),
            web_root: PathBuf::from(DEFAULT_WEB_ROOT),
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> GatewayResult<Self> {
        Self::from_lookup(non_empty_env)
    }

    /// Builds the configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> GatewayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let naming = match get("STIPPLE_ARTIFACT_NAMING") {
            Some(raw) => raw.parse()?,
            None => defaults.naming,
        };
        let upstream_timeout = match get("STIPPLE_UPSTREAM_TIMEOUT_SECS") {
            Some(raw) => parse_timeout(&raw)?,
            None => defaults.upstream_timeout,
        };

        Ok(Self {
            api_key: get("STABILITY_API_KEY").or_else(|| get("STABLE_DIFFUSION_API_KEY")),
            api_base: get("STABILITY_API_BASE")
                .map(|value| trim_base(&value))
                .unwrap_or(defaults.api_base),
            image_dir: get("STIPPLE_IMAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.image_dir),
            events_path: get("STIPPLE_EVENTS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.events_path),
            naming,
            upstream_timeout,
            speech: SpeechConfig {
                api_key: get("SPEECH_API_KEY").or_else(|| get("OPENAI_API_KEY")),
                api_base: get("SPEECH_API_BASE")
                    .map(|value| trim_base(&value))
                    .unwrap_or(defaults.speech.api_base),
                model: get("SPEECH_MODEL").unwrap_or(defaults.speech.model),
            },
            ffmpeg: get("STIPPLE_FFMPEG")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg),
            web_root: get("STIPPLE_WEB_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.web_root),
            bind: get("STIPPLE_BIND").unwrap_or(defaults.bind),
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_base(mut self, api_base: impl AsRef<str>) -> Self {
        self.api_base = trim_base(api_base.as_ref());
        self
    }

    pub fn with_image_dir(mut self, image_dir: impl Into<PathBuf>) -> Self {
        self.image_dir = image_dir.into();
        self
    }

    pub fn with_events_path(mut self, events_path: impl Into<PathBuf>) -> Self {
        self.events_path = events_path.into();
        self
    }

    pub fn with_naming(mut self, naming: NamingPolicy) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn with_web_root(mut self, web_root: impl Into<PathBuf>) -> Self {
        self.web_root = web_root.into();
        self
    }

    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    pub fn speech_enabled(&self) -> bool {
        self.speech.api_key.is_some()
    }

    pub fn namer(&self) -> ArtifactNamer {
        ArtifactNamer::new(&self.image_dir, self.naming)
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// The activity log carries prompts and must never be reachable through the static mount.
    pub fn check_events_path(&self) -> GatewayResult<()> {
        let inside = lexical(&self.events_path).starts_with(lexical(&self.web_root))
            || canonical_parent(&self.events_path)
                .zip(self.web_root.canonicalize().ok())
                .is_some_and(|(parent, root)| parent.starts_with(root));
        if inside {
            return Err(GatewayError::Config(format!(
                "STIPPLE_EVENTS_PATH {} must live outside the web root {}",
                self.events_path.display(),
                self.web_root.display()
            )));
        }
        Ok(())
    }

    pub fn ensure_image_dir(&self) -> GatewayResult<&Path> {
        std::fs::create_dir_all(&self.image_dir).map_err(|err| {
            GatewayError::Storage(format!(
                "failed to create output directory {}: {err}",
                self.image_dir.display()
            ))
        })?;
        Ok(self.image_dir.as_path())
    }
}

/// Loads `.env` from the working directory or its parents, returning the file used.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenv::dotenv().ok()
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn lexical(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

fn canonical_parent(path: &Path) -> Option<PathBuf> {
    let parent = path.parent().filter(|parent| !parent.as_os_str().is_empty())?;
    parent.canonicalize().ok()
}

fn trim_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn parse_timeout(raw: &str) -> GatewayResult<Duration> {
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(GatewayError::Config(format!(
            "STIPPLE_UPSTREAM_TIMEOUT_SECS must be a positive number of seconds, got '{raw}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use stipple_contracts::artifacts::NamingPolicy;
    use stipple_contracts::GatewayError;

    use super::{GatewayConfig, DEFAULT_API_BASE, DEFAULT_SPEECH_MODEL};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() -> anyhow::Result<()> {
        let config = GatewayConfig::from_lookup(lookup(&[]))?;
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.speech.model, DEFAULT_SPEECH_MODEL);
        assert_eq!(config.naming, NamingPolicy::Unique);
        assert!(!config.speech_enabled());
        Ok(())
    }

    #[test]
    fn reads_keys_aliases_and_overrides() -> anyhow::Result<()> {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("STABLE_DIFFUSION_API_KEY", "sk-legacy"),
            ("STABILITY_API_BASE", "http://127.0.0.1:9000/ "),
            ("STIPPLE_IMAGE_DIR", "/var/lib/stipple"),
            ("STIPPLE_EVENTS_PATH", "/var/log/stipple/events.jsonl"),
            ("STIPPLE_ARTIFACT_NAMING", "fixed"),
            ("STIPPLE_UPSTREAM_TIMEOUT_SECS", "15"),
            ("OPENAI_API_KEY", "sk-speech"),
        ]))?;
        assert_eq!(config.api_key.as_deref(), Some("sk-legacy"));
        assert_eq!(config.api_base, "http://127.0.0.1:9000");
        assert_eq!(config.image_dir, PathBuf::from("/var/lib/stipple"));
        assert_eq!(config.events_path(), Path::new("/var/log/stipple/events.jsonl"));
        assert_eq!(config.naming, NamingPolicy::FixedSlot);
        assert_eq!(config.upstream_timeout, Duration::from_secs(15));
        assert_eq!(config.speech.api_key.as_deref(), Some("sk-speech"));
        Ok(())
    }

    #[test]
    fn primary_key_wins_over_alias() -> anyhow::Result<()> {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("STABILITY_API_KEY", "sk-new"),
            ("STABLE_DIFFUSION_API_KEY", "sk-legacy"),
            ("SPEECH_API_KEY", " "),
        ]))?;
        assert_eq!(config.api_key.as_deref(), Some("sk-new"));
        assert_eq!(config.speech.api_key, None);
        Ok(())
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let timeout = GatewayConfig::from_lookup(lookup(&[("STIPPLE_UPSTREAM_TIMEOUT_SECS", "0")]));
        assert!(matches!(timeout, Err(GatewayError::Config(_))));

        let naming = GatewayConfig::from_lookup(lookup(&[("STIPPLE_ARTIFACT_NAMING", "sequential")]));
        assert!(matches!(naming, Err(GatewayError::Config(_))));
    }

    #[test]
    fn ensure_image_dir_creates_nested_directories() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = GatewayConfig::new().with_image_dir(temp.path().join("static").join("images"));
        let dir = config.ensure_image_dir()?;
        assert!(dir.is_dir());
        Ok(())
    }

    #[test]
    fn default_events_path_sits_outside_the_web_root() -> anyhow::Result<()> {
        let config = GatewayConfig::default();
        assert!(!config.events_path().starts_with(&config.image_dir));
        config.check_events_path()?;
        Ok(())
    }

    #[test]
    fn events_path_under_the_web_root_is_rejected() -> anyhow::Result<()> {
        let lexically_inside = GatewayConfig::new()
            .with_web_root("./static")
            .with_events_path("static/images/events.jsonl");
        assert!(matches!(
            lexically_inside.check_events_path(),
            Err(GatewayError::Config(_))
        ));

        let temp = tempfile::tempdir()?;
        let web_root = temp.path().join("site");
        std::fs::create_dir_all(web_root.join("images"))?;
        let through_dotdot = GatewayConfig::new()
            .with_web_root(&web_root)
            .with_events_path(temp.path().join("site").join("images").join("..").join("events.jsonl"));
        assert!(matches!(
            through_dotdot.check_events_path(),
            Err(GatewayError::Config(_))
        ));

        let outside = GatewayConfig::new()
            .with_web_root(&web_root)
            .with_events_path(temp.path().join("events.jsonl"));
        outside.check_events_path()?;
        Ok(())
    }
}

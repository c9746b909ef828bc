//! Pack manifest parsing
//!
//! Parses pack.toml and turns it into build inputs.

use anyhow::{Context, Result};
use opz_drum::{
    ContainerFormat, DEFAULT_NAME, DrumMetadata, DrumVersion, MAX_DURATION_SECONDS, MAX_SLICES,
    ParameterTable, PositionCodec, Reverse, SlotParams,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::pack::PackOptions;
use crate::params::normalize_parameters;
use crate::transcode::{
    DEFAULT_SILENCE_THRESHOLD_DB, NormalizeMode, TranscodeOptions, TranscoderKind,
};

/// Root manifest structure
#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub pack: PackConfig,
    #[serde(default)]
    pub slices: Vec<SliceEntry>,
    /// Directory relative paths resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct PackConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub octave: i32,
    #[serde(default = "default_drum_version")]
    pub drum_version: u8,
    #[serde(default)]
    pub format: ContainerFormat,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default = "default_max_duration")]
    pub max_duration: f64,
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f64,
    #[serde(default)]
    pub normalize: NormalizeMode,
    #[serde(default)]
    pub transcoder: TranscoderKind,
    #[serde(default = "default_position_scale")]
    pub position_scale: u32,
    /// Loose parameter document (JSON), applied before per-slice overrides
    #[serde(default)]
    pub params: Option<PathBuf>,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            octave: 0,
            drum_version: default_drum_version(),
            format: ContainerFormat::default(),
            output: None,
            max_duration: default_max_duration(),
            silence_threshold: default_silence_threshold(),
            normalize: NormalizeMode::default(),
            transcoder: TranscoderKind::default(),
            position_scale: default_position_scale(),
            params: None,
        }
    }
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_drum_version() -> u8 {
    u8::from(DrumVersion::default())
}

fn default_max_duration() -> f64 {
    MAX_DURATION_SECONDS
}

fn default_silence_threshold() -> f64 {
    DEFAULT_SILENCE_THRESHOLD_DB
}

fn default_position_scale() -> u32 {
    opz_drum::DEFAULT_POSITION_SCALE
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SliceEntry {
    Simple(PathBuf),
    Detailed {
        path: PathBuf,
        #[serde(default)]
        volume: Option<f64>,
        #[serde(default)]
        pitch: Option<f64>,
        #[serde(default)]
        reverse: Option<bool>,
        #[serde(default)]
        playmode: Option<f64>,
    },
}

impl SliceEntry {
    pub fn path(&self) -> &Path {
        match self {
            SliceEntry::Simple(p) => p,
            SliceEntry::Detailed { path, .. } => path,
        }
    }

    /// Apply this entry's explicit parameters over `base`.
    fn apply(&self, base: SlotParams) -> SlotParams {
        match self {
            SliceEntry::Simple(_) => base,
            SliceEntry::Detailed {
                volume,
                pitch,
                reverse,
                playmode,
                ..
            } => SlotParams {
                pitch: pitch.unwrap_or(base.pitch),
                playmode: playmode.unwrap_or(base.playmode),
                reverse: reverse.map(Reverse::from).unwrap_or(base.reverse),
                volume: volume.unwrap_or(base.volume),
            },
        }
    }
}

impl Manifest {
    /// Resolve a manifest-relative path.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn slice_paths(&self) -> Vec<PathBuf> {
        self.slices.iter().map(|s| self.resolve(s.path())).collect()
    }

    /// Output file: configured path, or `<name>.aif` next to the manifest.
    pub fn output_path(&self) -> PathBuf {
        match &self.pack.output {
            Some(path) => self.resolve(path),
            None => self
                .base_dir
                .join(format!("{}.{}", self.pack.name, self.pack.format.extension())),
        }
    }

    /// Per-slot parameters: the params document first, then slice overrides.
    pub fn parameter_table(&self) -> Result<ParameterTable> {
        let base = match &self.pack.params {
            Some(path) => {
                let path = self.resolve(path);
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read params: {:?}", path))?;
                let document: serde_json::Value = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse params: {:?}", path))?;
                normalize_parameters(&document)
            }
            None => ParameterTable::default(),
        };

        let slots = self
            .slices
            .iter()
            .enumerate()
            .map(|(slot, entry)| entry.apply(base.slot(slot)));
        Ok(ParameterTable::from_slots(slots))
    }

    pub fn pack_options(&self) -> Result<PackOptions> {
        let drum_version = DrumVersion::try_from(self.pack.drum_version)?;
        Ok(PackOptions {
            transcode: TranscodeOptions {
                silence_threshold_db: self.pack.silence_threshold,
                max_duration: self.pack.max_duration,
                normalize: self.pack.normalize,
            },
            metadata: DrumMetadata {
                name: self.pack.name.clone(),
                octave: self.pack.octave,
                drum_version,
                params: self.parameter_table()?,
            },
            format: self.pack.format,
            codec: PositionCodec::new(self.pack.position_scale),
        })
    }
}

/// Load and parse a manifest file
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {:?}", path))?;
    let mut manifest: Manifest = toml::from_str(&content)
        .with_context(|| format!("Failed to parse manifest: {:?}", path))?;
    manifest.base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    Ok(manifest)
}

/// Validate a manifest without building
pub fn validate(manifest: &Manifest) -> Result<()> {
    if manifest.slices.is_empty() {
        anyhow::bail!("Manifest has no slices");
    }
    if manifest.slices.len() > MAX_SLICES {
        anyhow::bail!(
            "Manifest has {} slices, a drum pack holds at most {}",
            manifest.slices.len(),
            MAX_SLICES
        );
    }
    for (slot, entry) in manifest.slices.iter().enumerate() {
        let path = manifest.resolve(entry.path());
        if !path.exists() {
            anyhow::bail!("Slice {} source not found: {:?}", slot + 1, path);
        }
    }

    DrumVersion::try_from(manifest.pack.drum_version)?;

    if !(manifest.pack.max_duration.is_finite() && manifest.pack.max_duration > 0.0) {
        anyhow::bail!(
            "max_duration must be a positive number of seconds, got {}",
            manifest.pack.max_duration
        );
    }
    if manifest.pack.max_duration > MAX_DURATION_SECONDS {
        tracing::warn!(
            "max_duration {}s exceeds the device limit of {}s",
            manifest.pack.max_duration,
            MAX_DURATION_SECONDS
        );
    }
    if manifest.pack.position_scale == 0 {
        anyhow::bail!("position_scale must be positive");
    }
    if let Some(params) = &manifest.pack.params {
        let path = manifest.resolve(params);
        if !path.exists() {
            anyhow::bail!("Params file not found: {:?}", path);
        }
    }

    // Surfaces non-finite overrides before any audio work
    manifest.pack_options()?.metadata.params.encode()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_manifest(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("pack.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let manifest: Manifest = toml::from_str("slices = [\"kick.wav\"]").unwrap();
        assert_eq!(manifest.pack.name, "op-done");
        assert_eq!(manifest.pack.drum_version, 3);
        assert_eq!(manifest.pack.format, ContainerFormat::Aiff);
        assert_eq!(manifest.pack.max_duration, 12.0);
        assert_eq!(manifest.pack.silence_threshold, -35.0);
        assert_eq!(manifest.pack.transcoder, TranscoderKind::Wav);
        assert_eq!(manifest.pack.position_scale, 4096);
        assert_eq!(manifest.slices[0].path(), Path::new("kick.wav"));
    }

    #[test]
    fn test_full_manifest() {
        let manifest: Manifest = toml::from_str(
            r#"
            [pack]
            name = "breaks"
            octave = -1
            drum_version = 2
            format = "aifc"
            transcoder = "ffmpeg"
            normalize = "peak"
            position_scale = 4058

            [[slices]]
            path = "kick.wav"
            volume = 16383
            reverse = true

            [[slices]]
            path = "snare.wav"
            "#,
        )
        .unwrap();

        let options = manifest.pack_options().unwrap();
        assert_eq!(options.metadata.name, "breaks");
        assert_eq!(options.metadata.octave, -1);
        assert_eq!(options.metadata.drum_version, DrumVersion::V2);
        assert_eq!(options.format, ContainerFormat::Aifc);
        assert_eq!(options.codec.scale(), 4058);
        assert_eq!(options.transcode.normalize, NormalizeMode::Peak);
        assert_eq!(manifest.pack.transcoder, TranscoderKind::Ffmpeg);

        let params = options.metadata.params;
        assert_eq!(params.volume, vec![16383.0, 8192.0]);
        assert_eq!(params.reverse, vec![Reverse::Reversed, Reverse::Forward]);
    }

    #[test]
    fn test_relative_paths_resolve_against_manifest() {
        let dir = tempdir().unwrap();
        let path = write_manifest(dir.path(), "slices = [\"a.wav\", \"/abs/b.wav\"]\n");
        let manifest = load_manifest(&path).unwrap();

        assert_eq!(
            manifest.slice_paths(),
            vec![dir.path().join("a.wav"), PathBuf::from("/abs/b.wav")]
        );
        assert_eq!(manifest.output_path(), dir.path().join("op-done.aif"));
    }

    #[test]
    fn test_params_file_then_overrides() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("params.json"),
            r#"{"params": {"volume": [100, 200], "pitch": [5, 6]}}"#,
        )
        .unwrap();
        let path = write_manifest(
            dir.path(),
            r#"
            [pack]
            params = "params.json"

            [[slices]]
            path = "a.wav"
            pitch = -3

            [[slices]]
            path = "b.wav"
            "#,
        );
        let manifest = load_manifest(&path).unwrap();
        let table = manifest.parameter_table().unwrap();
        assert_eq!(table.volume, vec![100.0, 200.0]);
        assert_eq!(table.pitch, vec![-3.0, 6.0]);
    }

    #[test]
    fn test_validate() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.wav"), b"").unwrap();

        let ok = load_manifest(&write_manifest(dir.path(), "slices = [\"a.wav\"]")).unwrap();
        assert!(validate(&ok).is_ok());

        let missing = load_manifest(&write_manifest(dir.path(), "slices = [\"nope.wav\"]")).unwrap();
        let err = validate(&missing).unwrap_err().to_string();
        assert!(err.contains("source not found"), "{err}");

        let empty = load_manifest(&write_manifest(dir.path(), "[pack]\nname = \"x\"\n")).unwrap();
        assert!(validate(&empty).is_err());

        let bad_version = load_manifest(&write_manifest(
            dir.path(),
            "slices = [\"a.wav\"]\n[pack]\ndrum_version = 7\n",
        ))
        .unwrap();
        let err = validate(&bad_version).unwrap_err().to_string();
        assert!(err.contains("drum version"), "{err}");

        let too_many = format!("slices = [{}]\n", vec!["\"a.wav\""; 25].join(", "));
        let too_many = load_manifest(&write_manifest(dir.path(), &too_many)).unwrap();
        assert!(validate(&too_many).is_err());

        let bad_duration = load_manifest(&write_manifest(
            dir.path(),
            "slices = [\"a.wav\"]\n[pack]\nmax_duration = 0\n",
        ))
        .unwrap();
        assert!(validate(&bad_duration).is_err());
    }
}

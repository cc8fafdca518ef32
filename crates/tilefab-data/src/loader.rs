//! Config loading: format detection, file discovery, and turning a
//! [`GameConfig`] into a ready-to-run [`Simulation`].
//!
//! RON, TOML and JSON are all accepted; the format is picked from the file
//! extension.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tilefab_core::generate::generate;
use tilefab_core::grid::GridError;
use tilefab_core::registry::{Recipe, RegistryBuilder, RegistryError};
use tilefab_core::sim::Simulation;

use crate::schema::GameConfig;

/// Base name of the game config file inside a data directory.
pub const GAME_CONFIG: &str = "game";

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during config loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A recipe override was rejected.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The world section names an impossible map.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name (without extension).
///
/// Looks for `{base_name}.ron`, `{base_name}.toml`, and `{base_name}.json`.
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Parse `content` in the given format. `file` only labels errors.
pub fn deserialize_str<T: DeserializeOwned>(
    content: &str,
    format: Format,
    file: &Path,
) -> Result<T, DataLoadError> {
    let parse = |detail: String| DataLoadError::Parse {
        file: file.to_path_buf(),
        detail,
    };
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| parse(e.to_string())),
        Format::Json => serde_json::from_str(content).map_err(|e| parse(e.to_string())),
        Format::Toml => toml::from_str(content).map_err(|e| parse(e.to_string())),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    deserialize_str(&content, format, path)
}

// ===========================================================================
// Game config
// ===========================================================================

/// Load a game config from an explicit file.
pub fn load_game_config(path: &Path) -> Result<GameConfig, DataLoadError> {
    deserialize_file(path)
}

/// Load `game.{ron,toml,json}` from a data directory. A directory without
/// one yields the defaults.
pub fn load_game_config_dir(dir: &Path) -> Result<GameConfig, DataLoadError> {
    match find_data_file(dir, GAME_CONFIG)? {
        Some(path) => load_game_config(&path),
        None => Ok(GameConfig::default()),
    }
}

/// Generate the configured world and wrap it with the stock registry plus
/// any recipe overrides.
pub fn build_simulation(config: &GameConfig) -> Result<Simulation, DataLoadError> {
    let mut builder = RegistryBuilder::with_defaults(&config.sim);
    for recipe in &config.recipes {
        builder.set_recipe(
            recipe.kind,
            Recipe::new(recipe.inputs.clone(), recipe.output, recipe.duration_ms),
        )?;
    }
    let registry = builder.build()?;
    let grid = generate(config.world.width, config.world.height, config.world.seed.clone())?;
    Ok(Simulation::new(grid, registry, config.sim.clone()))
}

// ===========================================================================
// Tests
// ===========================================================================

use serde::Deserialize;
use std::path::PathBuf;

fn default_precision() -> u32 {
    4
}
fn default_crs() -> String {
    "3395".to_string()
}
fn default_verbose() -> bool {
    false
}

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    /// Directory layer files, mesh buffers and join documents live in
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// Decimal places mesh coordinates are rounded to
    #[serde(default = "default_precision")]
    pub precision: u32,
    /// CRS code WKT input coordinates are given in
    #[serde(default = "default_crs")]
    pub crs: String,
    #[serde(default = "default_verbose")]
    pub verbose: bool,
}

impl FileConfig {
    pub fn load() -> Option<Self> {
        let config_paths = get_config_paths();

        for path in config_paths {
            if path.exists()
                && let Ok(contents) = std::fs::read_to_string(&path)
            {
                match toml::from_str(&contents) {
                    Ok(config) => return Some(config),
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config file {:?}: {}", path, e);
                    }
                }
            }
        }
        None
    }
}

fn get_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("urbanmesh.toml"));
    paths.push(PathBuf::from(".urbanmesh.toml"));

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("urbanmesh").join("config.toml"));
        paths.push(config_dir.join("urbanmesh.toml"));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".urbanmesh.toml"));
        paths.push(home.join(".config").join("urbanmesh").join("config.toml"));
    }

    paths
}

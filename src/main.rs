use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use urbanmesh::codec;
use urbanmesh::config::FileConfig;
use urbanmesh::domain::{AbstractLayerFile, Dimension, Layer, LayerFile};
use urbanmesh::geometry::WorldMercator;
use urbanmesh::join::{Aggregation, JoinOptions, Level, SpatialRelation};
use urbanmesh::mesh::layer_from_wkt;
use urbanmesh::session::Session;

/// Join urban data layers spatially and pack their meshes into binary
/// buffers
///
/// Examples:
///   # Triangulate a WKT polygon file into a packed mesh layer
///   urbanmesh mesh parks.wkt --id parks --work-dir ./scene
///
///   # Pack an existing layer file's arrays into .data buffers
///   urbanmesh pack buildings.json --work-dir ./scene
///
///   # Restore the inline form of a packed layer
///   urbanmesh unpack buildings --work-dir ./scene -o buildings.json
///
///   # Fold sensor readings onto the buildings that contain them
///   urbanmesh join buildings.json readings.json --abstract \
///       --relation intersects --left-level objects --operation avg \
///       --work-dir ./scene
#[derive(Parser, Debug)]
#[command(name = "urbanmesh")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to config file (optional, auto-searches urbanmesh.toml if not provided)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory layer files and join documents live in
    #[arg(short = 'w', long)]
    work_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pack a layer's numeric arrays into sidecar .data files
    Pack {
        /// Layer JSON file with inline arrays
        layer: PathBuf,
    },
    /// Resolve a packed layer back to its inline JSON form
    Unpack {
        /// Id of a packed layer in the working directory
        id: String,
        /// Output file (stdout if omitted)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
    /// Triangulate WKT polygons into a packed mesh layer
    Mesh {
        /// Input file with one WKT geometry per line
        input: PathBuf,
        /// Id of the produced layer
        #[arg(long)]
        id: String,
        /// CRS code of the input coordinates
        #[arg(long)]
        crs: Option<String>,
        /// Render style tags of the produced layer
        #[arg(long, default_value = "FLAT_COLOR")]
        render_style: Vec<String>,
        /// Attribute the renderer colors the layer by
        #[arg(long, default_value = "surface")]
        style_key: String,
    },
    /// Join two layers and fold the result into the left layer's join
    /// document
    Join {
        /// Left (physical) layer JSON file
        left: PathBuf,
        /// Right layer JSON file
        right: PathBuf,
        /// Parse the right layer as an abstract scalar field
        #[arg(long)]
        r#abstract: bool,
        #[arg(long, value_enum, default_value = "intersects")]
        relation: SpatialRelation,
        #[arg(long, value_enum, default_value = "objects")]
        left_level: Level,
        #[arg(long, value_enum, default_value = "coordinates")]
        right_level: Level,
        /// How matched scalars collapse in an abstract join
        #[arg(long, value_enum, default_value = "avg")]
        operation: Aggregation,
        /// Bound for NEAREST joins, in layer units
        #[arg(long)]
        max_distance: Option<f64>,
        /// Value unmatched features resolve to in an abstract join
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        default_value: f64,
        /// Components per vertex in the flat coordinate arrays
        #[arg(long, default_value = "2", value_parser = clap::value_parser!(u8).range(2..=3))]
        dim: u8,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let file_config = if let Some(ref config_path) = args.config {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .context(format!("Failed to read config file: {:?}", config_path))?;
            Some(toml::from_str(&contents).context("Failed to parse config file")?)
        } else {
            bail!("Config file not found: {:?}", config_path);
        }
    } else {
        FileConfig::load()
    };

    let verbose = args.verbose || file_config.as_ref().map(|c| c.verbose).unwrap_or(false);
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if verbose { "debug" } else { "warn" }),
    )
    .init();

    let work_dir = args
        .work_dir
        .clone()
        .or_else(|| file_config.as_ref().and_then(|c| c.work_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("."));

    match args.command {
        Command::Pack { layer } => {
            let mut layer = read_layer(&layer)?;
            codec::encode_layer(&mut layer, &work_dir)
                .context("Failed to pack the layer's arrays")?;
            println!(
                "Packed layer {} ({} features) into {}",
                layer.id,
                layer.data.len(),
                work_dir.display()
            );
        }
        Command::Unpack { id, output } => {
            let layer = codec::decode_layer(&work_dir, &id)
                .context(format!("Failed to unpack layer {id}"))?;
            let json = serde_json::to_string(&layer)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .context(format!("Failed to write {}", path.display()))?;
                    println!("Unpacked layer {} to {}", id, path.display());
                }
                None => println!("{json}"),
            }
        }
        Command::Mesh {
            input,
            id,
            crs,
            render_style,
            style_key,
        } => {
            let crs = crs
                .or_else(|| file_config.as_ref().map(|c| c.crs.clone()))
                .unwrap_or_else(|| "3395".to_string());
            let contents = std::fs::read_to_string(&input)
                .context(format!("Failed to read {}", input.display()))?;
            let records: Vec<&str> = contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect();
            if records.is_empty() {
                bail!("No geometries found in {}", input.display());
            }

            let mut layer = layer_from_wkt(&id, &records, &crs, &WorldMercator)
                .context("Failed to triangulate the input geometries")?;
            let feature_count = layer.data.len();
            layer.render_style = render_style;
            layer.style_key = style_key;
            codec::encode_layer(&mut layer, &work_dir)
                .context("Failed to pack the meshed layer")?;
            println!(
                "Meshed {} geometries into layer {} under {}",
                feature_count,
                id,
                work_dir.display()
            );
        }
        Command::Join {
            left,
            right,
            r#abstract,
            relation,
            left_level,
            right_level,
            operation,
            max_distance,
            default_value,
            dim,
        } => {
            let dim = if dim == 3 { Dimension::Three } else { Dimension::Two };
            let left_layer = Layer::physical(read_layer(&left)?, dim)?;
            let right_layer = if r#abstract {
                let contents = std::fs::read_to_string(&right)
                    .context(format!("Failed to read {}", right.display()))?;
                let file: AbstractLayerFile =
                    serde_json::from_str(&contents).context("Failed to parse abstract layer")?;
                Layer::abstract_field(file, Some(dim))?
            } else {
                Layer::physical(read_layer(&right)?, dim)?
            };

            let left_id = left_layer.id().to_string();
            let right_id = right_layer.id().to_string();

            let mut session = Session::new();
            session.set_work_dir(work_dir.clone())?;
            session.add_layer(left_layer)?;
            session.add_layer(right_layer)?;

            let table = session.attach_layers(
                &left_id,
                &right_id,
                JoinOptions {
                    relation,
                    left_level,
                    right_level,
                    abstract_join: r#abstract,
                    operation,
                    max_distance,
                    default_value,
                },
            )?;

            let matched = table.pairs.iter().filter(|p| p.right_id.is_some()).count();
            println!(
                "Joined {left_id} with {right_id}: {matched} of {} pairs matched",
                table.pairs.len()
            );
            println!(
                "Join document: {}",
                work_dir.join(format!("{left_id}_joined.json")).display()
            );
        }
    }

    Ok(())
}

fn read_layer(path: &Path) -> Result<LayerFile> {
    let contents =
        std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).context(format!("Failed to parse layer {}", path.display()))
}

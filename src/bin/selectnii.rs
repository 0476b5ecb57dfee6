//! Quick commandline utility to run a bucket fill selection on a nifti file.
//!
//! The seed is given either as voxel coordinates or as a point in one of
//! the display spaces. The size and bounding box of the resulting selection
//! are printed; nothing is written to disk.

use clap::Parser;
use nalgebra::Point3;
use std::path::Path;

use editnii::{
    Connectivity, DisplaySpace, Image, ImageSource, Region, SearchRadius, Selection, Space,
    ValueSearch,
};

// use clap to create commandline interface
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// the input nifti file
    #[arg(short, long)]
    input: String,

    /// seed voxel, e.g. `--seed 10,20,30`
    #[arg(short, long, value_delimiter = ',', num_args = 3, conflicts_with = "point")]
    seed: Option<Vec<usize>>,

    /// seed location in display space, e.g. `--point 1.5,-20,30`
    #[arg(short, long, value_delimiter = ',', num_args = 3, allow_hyphen_values = true)]
    point: Option<Vec<f64>>,

    /// display space used for `--point`:
    ///     id, pixdim, pixdim-flip, affine
    #[arg(long, default_value = "pixdim")]
    space: String,

    /// voxels closer than this to the seed value are selected.
    /// 0 selects only voxels equal to the seed value.
    #[arg(long, default_value_t = 0.0)]
    precision: f64,

    /// only search within this many voxels of the seed
    #[arg(short, long)]
    radius: Option<f64>,

    /// only select voxels connected to the seed
    #[arg(short, long, default_value_t = false)]
    local: bool,

    /// with `--local`, only follow face neighbours instead of all 26
    #[arg(long, default_value_t = false)]
    faces: bool,

    /// volume to search in a 4D image
    #[arg(short, long, default_value_t = 0)]
    volume: usize,
}

fn seed_voxel(cli: &Args, image: &Image) -> Result<[usize; 3], String> {
    if let Some(seed) = &cli.seed {
        return Ok([seed[0], seed[1], seed[2]]);
    }
    let Some(point) = &cli.point else {
        return Err("one of --seed or --point is required".to_string());
    };
    let space: Space = cli.space.parse().map_err(|e| format!("{}", e))?;
    let display = DisplaySpace::with_space(image.geometry().clone(), space);
    let xyz = Point3::new(point[0], point[1], point[2]);
    display
        .voxel_index(xyz)
        .ok_or_else(|| format!("point {} is outside of the image", xyz))
}

/// Main function that parses commandline arguments and runs the program.
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Args::parse();
    let input_filepath = Path::new(&cli.input);

    let mut image = Image::from_nifti(input_filepath).unwrap_or_else(|e| {
        eprintln!("Error! {}", e);
        std::process::exit(-2);
    });
    if image.is_4d() {
        image.set_active_volume(cli.volume).unwrap_or_else(|e| {
            eprintln!("Error! {}", e);
            std::process::exit(-2);
        });
    }

    let seed = seed_voxel(&cli, &image).unwrap_or_else(|e| {
        eprintln!("Error! {}", e);
        std::process::exit(-2);
    });

    let connectivity = if cli.faces {
        Connectivity::Faces
    } else {
        Connectivity::Full
    };
    let mut search = ValueSearch::new()
        .precision(cli.precision)
        .local(cli.local)
        .connectivity(connectivity);
    if let Some(r) = cli.radius {
        search = search.radius(SearchRadius::Uniform(r));
    }

    let mut selection = Selection::for_image(&image).unwrap_or_else(|e| {
        eprintln!("Error! {}", e);
        std::process::exit(-2);
    });
    selection
        .select_by_value(&image, seed, &search)
        .unwrap_or_else(|e| {
            eprintln!("Error! {}", e);
            std::process::exit(-2);
        });

    println!("Seed voxel: {:?}", seed);
    println!("Selected voxels: {}", selection.get_selection_size());
    let (block, offset) = selection.get_bounded_selection();
    let (x, y, z) = block.dim();
    let bounds = Region::from_offset(offset, [x, y, z]);
    if bounds.is_empty() {
        println!("Bounding box: none");
    } else {
        println!("Bounding box: {}", bounds);
    }
}

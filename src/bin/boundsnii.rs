//! Quick commandline utility to print the display bounds of nifti files in
//! each coordinate space.
//!
//! Optionally maps a display location to the voxel containing it.

use clap::Parser;
use glob::glob;
use nalgebra::Point3;
use std::path::{Path, PathBuf};

use editnii::{DisplaySpace, Image, ImageSource, Space};

// use clap to create commandline interface
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// the input directory containing the nifti files
    #[arg(short, long, default_value = "./")]
    input_dir: String,

    /// a string to select nifti files in the input directory based on the start of
    /// their file names
    #[arg(short, long, default_value = "*")]
    start_string: String,

    /// a display location to map to a voxel in every space, e.g. `--point 0,0,0`
    #[arg(short, long, value_delimiter = ',', num_args = 3, allow_hyphen_values = true)]
    point: Option<Vec<f64>>,
}

fn find_files(input_dir: &Path, start_string: &str) -> Vec<PathBuf> {
    let pattern = input_dir.join(format!("{}.nii*", start_string));
    let pattern = pattern.to_str().unwrap_or_else(|| {
        eprintln!("Error! Could not parse input directory.");
        std::process::exit(-2);
    });
    let mut files: Vec<PathBuf> = glob(pattern)
        .unwrap_or_else(|e| {
            eprintln!("Error! {}", e);
            std::process::exit(-2);
        })
        .filter_map(|entry| entry.ok())
        .collect();
    files.sort();
    files
}

fn report(path: &Path, point: Option<Point3<f64>>) {
    let image = match Image::from_nifti(path) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error! {}: {}", path.display(), e);
            return;
        }
    };
    println!("{} {:?}", path.display(), image.shape());
    let mut display = DisplaySpace::new(image.geometry().spatial());
    for space in Space::ALL {
        if space == Space::Custom {
            continue;
        }
        display.set_space(space);
        let b = display.bounds();
        print!(
            "  {:<12} x [{:.2}, {:.2}] y [{:.2}, {:.2}] z [{:.2}, {:.2}]",
            space.name(),
            b.lo[0],
            b.hi[0],
            b.lo[1],
            b.hi[1],
            b.lo[2],
            b.hi[2]
        );
        match point.map(|p| display.voxel_index(p)) {
            Some(Some(v)) => println!("  voxel {:?}", v),
            Some(None) => println!("  outside"),
            None => println!(),
        }
    }
}

/// Main function that parses commandline arguments and runs the program.
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Args::parse();
    let input_dir = Path::new(&cli.input_dir);
    let point = cli.point.map(|p| Point3::new(p[0], p[1], p[2]));

    let files = find_files(input_dir, &cli.start_string);
    if files.is_empty() {
        eprintln!("Error! No nifti files found in {}", input_dir.display());
        std::process::exit(-2);
    }
    for file in files {
        report(&file, point);
    }
}

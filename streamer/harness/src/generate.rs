//! Package generation for the harness.
//!
//! `generate` makes random solid-colour textures and packs each one alone;
//! `pack` does the same for existing PNG files. Either way slot `N` streams
//! `NN.bundle`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use streamer_core::PackageBuilder;

/// Arguments for `generate`
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Directory to write packages into (created if missing)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output: PathBuf,

    /// Number of packages
    #[arg(short = 'n', long, default_value_t = 32)]
    pub count: usize,

    /// Texture edge length in pixels
    #[arg(short = 's', long, default_value_t = 128)]
    pub size: u32,

    /// Digits in package file names; must match the pool's id width
    #[arg(long, default_value_t = 2)]
    pub id_width: usize,

    /// Seed for reproducible colours
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Arguments for `pack`
#[derive(Args, Debug)]
pub struct PackArgs {
    /// Directory of PNG files
    #[arg(short = 'i', long, value_name = "DIR")]
    pub input: PathBuf,

    /// Directory to write packages into (created if missing)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output: PathBuf,

    /// Digits in package file names; must match the pool's id width
    #[arg(long, default_value_t = 2)]
    pub id_width: usize,
}

fn package_path(dir: &Path, index: usize, id_width: usize) -> PathBuf {
    dir.join(format!("{index:0id_width$}.bundle"))
}

fn encode_solid(size: u32, rgba: [u8; 4]) -> Result<Vec<u8>> {
    let image = image::RgbaImage::from_pixel(size, size, image::Rgba(rgba));
    let mut out = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(out.into_inner())
}

fn write_package(path: &Path, asset: String, encoded: Vec<u8>) -> Result<()> {
    let bytes = PackageBuilder::new()
        .add_texture(asset, encoded)
        .build()
        .context("Failed to build package")?;
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

/// Write `count` single-texture packages; returns how many were written
///
/// # Errors
///
/// Fails if the output directory or a package cannot be written.
pub fn generate(args: &GenerateArgs) -> Result<usize> {
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    for index in 0..args.count {
        let rgba = [rng.gen(), rng.gen(), rng.gen(), 255];
        let encoded = encode_solid(args.size, rgba)?;
        let path = package_path(&args.output, index, args.id_width);
        write_package(&path, format!("texture_{index:02}.png"), encoded)?;
        debug!(path = %path.display(), ?rgba, "Wrote package");
    }

    Ok(args.count)
}

/// Pack every PNG in `input`, sorted by file name; returns how many were packed
///
/// # Errors
///
/// Fails if a directory or file cannot be read or written.
pub fn pack(args: &PackArgs) -> Result<usize> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && matches!(image::ImageFormat::from_path(path), Ok(image::ImageFormat::Png))
        })
        .collect();
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    for (index, source) in images.iter().enumerate() {
        let encoded = std::fs::read(source)
            .with_context(|| format!("Failed to read {}", source.display()))?;
        let asset = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("texture_{index:02}.png"));
        let path = package_path(&args.output, index, args.id_width);
        write_package(&path, asset, encoded)?;
        debug!(source = %source.display(), path = %path.display(), "Packed image");
    }

    Ok(images.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamer_core::{LatencyRange, PackageDecoder};

    fn generate_args(output: &Path, seed: u64) -> GenerateArgs {
        GenerateArgs {
            output: output.to_path_buf(),
            count: 3,
            size: 8,
            id_width: 2,
            seed: Some(seed),
        }
    }

    #[tokio::test]
    async fn test_generate_writes_decodable_solid_textures() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(generate(&generate_args(dir.path(), 7)).unwrap(), 3);

        let bytes = std::fs::read(dir.path().join("02.bundle")).unwrap();
        let resource = PackageDecoder::new(LatencyRange::none())
            .decode(bytes)
            .await
            .unwrap();
        let texture = resource.texture();
        assert_eq!(texture.name(), "texture_02.png");
        assert_eq!((texture.width(), texture.height()), (8, 8));

        let corner = texture.pixel(0, 0).unwrap();
        assert_eq!(corner[3], 255);
        assert_eq!(texture.pixel(7, 7), Some(corner));
    }

    #[test]
    fn test_generate_is_reproducible_with_seed() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        generate(&generate_args(a.path(), 42)).unwrap();
        generate(&generate_args(b.path(), 42)).unwrap();

        for name in ["00.bundle", "01.bundle", "02.bundle"] {
            assert_eq!(
                std::fs::read(a.path().join(name)).unwrap(),
                std::fs::read(b.path().join(name)).unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_pack_sorts_by_file_name_and_skips_non_png() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        std::fs::write(input.path().join("b.png"), encode_solid(2, [0, 0, 255, 255]).unwrap())
            .unwrap();
        std::fs::write(input.path().join("a.png"), encode_solid(2, [255, 0, 0, 255]).unwrap())
            .unwrap();
        std::fs::write(input.path().join("notes.txt"), b"not an image").unwrap();

        let args = PackArgs {
            input: input.path().to_path_buf(),
            output: output.path().to_path_buf(),
            id_width: 2,
        };
        assert_eq!(pack(&args).unwrap(), 2);
        assert!(!output.path().join("02.bundle").exists());

        let bytes = std::fs::read(output.path().join("00.bundle")).unwrap();
        let resource = PackageDecoder::new(LatencyRange::none())
            .decode(bytes)
            .await
            .unwrap();
        assert_eq!(resource.texture().name(), "a.png");
        assert_eq!(resource.texture().pixel(1, 1), Some([255, 0, 0, 255]));
    }
}

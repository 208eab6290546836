use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use lline_core::{Anchor, Exporter, FaceRegion, IconResolver, LanguageEntry, LayoutEngine, NoIcons};
use lline_engine::{Config, LanguageInput, Pipeline, RenderRequest};
use lline_sources::{CachedStatsSource, CdnIconResolver, GitHubStatsSource, LanguageStatsSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "lline", about = "Connect a portrait to the languages you write", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render language markers over a portrait and save the result
    #[command(group(ArgGroup::new("source").required(true).args(["user", "languages"])))]
    Render {
        /// Portrait photo (any format the image crate decodes)
        #[arg(short, long)]
        image: PathBuf,
        /// GitHub login whose public repositories supply the languages
        #[arg(short, long)]
        user: Option<String>,
        /// Explicit languages, e.g. "rust:60,go:40"
        #[arg(short, long)]
        languages: Option<String>,
        /// Face region as JSON; skips detection
        #[arg(long)]
        face: Option<String>,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
        /// Draw initials instead of fetching icons
        #[arg(long)]
        no_icons: bool,
    },
    /// Print a GitHub user's language breakdown as JSON
    Languages {
        #[arg(short, long)]
        user: String,
    },
    /// Detect faces in a photo and print them with the derived anchor
    Detect {
        #[arg(short, long)]
        image: PathBuf,
    },
    /// List the embedded icon catalog
    Icons,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Render {
            image,
            user,
            languages,
            face,
            out,
            no_icons,
        } => {
            let languages = match (user, languages) {
                (Some(user), _) => LanguageInput::User(user),
                (None, Some(list)) => LanguageInput::Entries(parse_languages(&list)?),
                (None, None) => bail!("either --user or --languages is required"),
            };
            let face = face.as_deref().map(parse_face).transpose()?;
            let path = render(&config, &image, languages, face, &out, no_icons).await?;
            println!("{}", path.display());
        }
        Commands::Languages { user } => {
            let source = GitHubStatsSource::new(config.github())?;
            let entries = source.fetch(&user).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Commands::Detect { image } => {
            let bytes = read_image(&image)?;
            let decoded = lline_engine::decode_image(&bytes)?;
            let engine = lline_engine::spawn_scrfd(&config.scrfd_model_path())?;
            let rgb = image::DynamicImage::ImageRgba8(decoded.pixels).into_rgb8();
            let faces = engine.detect(rgb).await?;

            let anchor = match faces.as_slice() {
                [only] => Anchor::from_face(only).map(|a| a.point()),
                _ => None,
            };
            let report = serde_json::json!({
                "width": decoded.width,
                "height": decoded.height,
                "faces": faces,
                "anchor": anchor,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Icons => {
            for entry in lline_sources::catalog::catalog() {
                let aliases = if entry.altnames.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", entry.altnames.join(", "))
                };
                println!("{}{aliases}: {}", entry.name, entry.variants.join(", "));
            }
        }
    }

    Ok(())
}

async fn render(
    config: &Config,
    image: &Path,
    languages: LanguageInput,
    face: Option<FaceRegion>,
    out: &Path,
    no_icons: bool,
) -> Result<PathBuf> {
    let bytes = read_image(image)?;

    // Supplied faces never touch the model.
    let engine = match face {
        Some(_) => None,
        None => Some(lline_engine::spawn_scrfd(&config.scrfd_model_path())?),
    };

    let icons: Arc<dyn IconResolver> = if no_icons {
        Arc::new(NoIcons)
    } else {
        Arc::new(CdnIconResolver::new(config.icon_source())?)
    };
    let stats = Arc::new(CachedStatsSource::new(
        GitHubStatsSource::new(config.github())?,
        config.stats_cache_ttl(),
    ));

    let pipeline = Pipeline::new(
        LayoutEngine::new(config.marker_diameter).with_icon_variant(config.icon_variant.clone()),
        Exporter::new(config.jpeg_quality),
        stats,
        icons,
        engine,
    );

    let outcome = pipeline
        .run(RenderRequest {
            image: bytes.into(),
            face,
            languages,
        })
        .await?;
    tracing::info!(
        snapshot = %outcome.snapshot,
        languages = outcome.languages.len(),
        markers = outcome.markers.len(),
        "render finished"
    );

    let exported = pipeline.export(chrono::Local::now().date_naive())?;
    std::fs::create_dir_all(out)
        .with_context(|| format!("cannot create output directory {}", out.display()))?;
    let path = out.join(&exported.filename);
    std::fs::write(&path, &exported.bytes)
        .with_context(|| format!("cannot write {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        mime = exported.format.mime_type(),
        bytes = exported.bytes.len(),
        "image saved"
    );
    Ok(path)
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("cannot read image {}", path.display()))
}

fn parse_face(json: &str) -> Result<FaceRegion> {
    serde_json::from_str(json).context("invalid --face JSON")
}

/// Parse `id:percent` pairs separated by commas.
fn parse_languages(list: &str) -> Result<Vec<LanguageEntry>> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (id, pct) = item
                .rsplit_once(':')
                .with_context(|| format!("expected id:percent, got {item:?}"))?;
            let id = id.trim();
            if id.is_empty() {
                bail!("missing language in {item:?}");
            }
            let pct: f32 = pct
                .trim()
                .parse()
                .with_context(|| format!("invalid percentage in {item:?}"))?;
            if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
                bail!("percentage out of range 0-100 in {item:?}");
            }
            let id = id.to_lowercase();
            let name = lline_sources::stats::display_name(&id);
            Ok(LanguageEntry::new(id, name, pct))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_languages() {
        let entries = parse_languages("Rust:60, go:30.5,c++:9.5").unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].identifier, "rust");
        assert_eq!(entries[0].display_name, "Rust");
        assert_eq!(entries[1].usage_percent, 30.5);
        assert_eq!(entries[2].identifier, "c++");
    }

    #[test]
    fn test_parse_languages_rejects_garbage() {
        assert!(parse_languages("rust").is_err());
        assert!(parse_languages("rust:lots").is_err());
        assert!(parse_languages(":10").is_err());
    }

    #[test]
    fn test_parse_languages_bounds_percentages() {
        for bad in ["rust:500", "rust:inf", "rust:-3", "rust:NaN", "rust:100.5"] {
            let err = parse_languages(bad).unwrap_err().to_string();
            assert!(err.contains("out of range"), "{bad}: {err}");
        }
        assert_eq!(parse_languages("rust:0,go:100").unwrap().len(), 2);
        assert!(parse_languages("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_face() {
        let face = parse_face(
            r#"{"box":{"x":1,"y":2,"width":3,"height":4},
                "keypoints":[{"x":5,"y":6,"role":"leftEye"}]}"#,
        )
        .unwrap();
        assert_eq!(face.bbox.height, 4.0);
        assert_eq!(face.confidence, 1.0);
        assert!(parse_face("{}").is_err());
    }
}

//! Export pipeline: ticket documents (PDF) and grid/view captures (PNG).
//!
//! Every export renders a scene off-screen on a blocking worker thread,
//! waits for that render to finish, then encodes the bitmap. Exports only
//! read the raffle they are given; they never change application state.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use ab_glyph::FontVec;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;
use image::RgbaImage;
use regex::Regex;
use rifas_models::Raffle;
use tracing::{debug, info};

mod document;
mod layout;
mod render;

pub use document::single_page_pdf;
pub use layout::{BoardScene, GridScene, TicketScene, cell_colors, grid_width};
pub use render::{Canvas, RenderOptions, Scene, encode_png, load_font, rasterize};

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern compiles"));

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("ticket {0} does not exist")]
    UnknownTicket(String),
    #[error("ticket {0} has no participant")]
    NoParticipant(String),
    #[error("cannot read font {}: {source}", .path.display())]
    FontIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a usable font", .path.display())]
    FontInvalid { path: PathBuf },
    #[error("item image cannot be decoded: {0}")]
    Image(String),
    #[error("rendering failed: {0}")]
    Render(String),
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("document generation failed: {0}")]
    Document(String),
}

/// A finished export, ready to be downloaded or written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn write_to(&self, dir: &Path) -> io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

// --- File names ---

/// Raffle title with every whitespace run replaced by `_`.
pub fn title_slug(title: &str) -> String {
    WHITESPACE.replace_all(title, "_").into_owned()
}

pub fn ticket_file_name(title: &str, number: &str) -> String {
    format!("boleto_rifa_{}_{number}.pdf", title_slug(title))
}

pub fn grid_file_name(title: &str, date: NaiveDate) -> String {
    format!("estado_rifa_{}_{}.png", title_slug(title), date.format("%Y-%m-%d"))
}

/// Prefix for captures of the participate view.
pub fn board_prefix(title: &str) -> String {
    let slug = title_slug(title.trim());
    if slug.is_empty() {
        "vista_rifa_general_".to_string()
    } else {
        format!("vista_rifa_{slug}_")
    }
}

pub fn board_file_name(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix}{}.png", date.format("%Y-%m-%d"))
}

// --- Item image ---

/// Decodes a `data:<mime>;base64,<payload>` image. Remote URLs are not
/// fetched and yield `None`.
pub fn decode_item_image(source: &str) -> Result<Option<RgbaImage>, ExportError> {
    let Some(rest) = source.strip_prefix("data:") else {
        debug!("Item image is not embedded, drawing an empty frame");
        return Ok(None);
    };
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ExportError::Image("data URL without payload".to_string()))?;
    if !meta.ends_with(";base64") {
        return Err(ExportError::Image(format!("unsupported data URL encoding {meta:?}")));
    }
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ExportError::Image(e.to_string()))?;
    let picture = image::load_from_memory(&bytes).map_err(|e| ExportError::Image(e.to_string()))?;
    Ok(Some(picture.to_rgba8()))
}

/// Embeds raw image bytes as a `data:` URL once they are recognized as an
/// image format.
pub fn image_data_url(bytes: &[u8]) -> Result<String, ExportError> {
    let format = image::guess_format(bytes).map_err(|e| ExportError::Image(e.to_string()))?;
    Ok(format!("data:{};base64,{}", format.to_mime_type(), STANDARD.encode(bytes)))
}

// --- Pipeline ---

#[derive(Debug, Clone)]
pub struct Exporter {
    font_path: PathBuf,
}

impl Exporter {
    pub fn new(font_path: impl Into<PathBuf>) -> Self {
        Self {
            font_path: font_path.into(),
        }
    }

    pub fn font_path(&self) -> &Path {
        &self.font_path
    }

    /// Printable ticket for a reserved or paid number.
    pub async fn ticket_pdf(&self, raffle: &Raffle, number: &str) -> Result<Artifact, ExportError> {
        let ticket = raffle
            .ticket(number)
            .ok_or_else(|| ExportError::UnknownTicket(number.to_string()))?;
        let participant = ticket
            .participant()
            .cloned()
            .ok_or_else(|| ExportError::NoParticipant(number.to_string()))?;
        let owned = raffle.clone();
        let number = ticket.number.clone();
        let scene = move || -> Result<TicketScene, ExportError> {
            let picture = match owned.item_image.as_deref() {
                Some(source) => decode_item_image(source)?,
                None => None,
            };
            Ok(TicketScene {
                raffle: owned,
                number,
                participant,
                picture,
            })
        };
        let bytes = self
            .render(scene, RenderOptions::SHARP, |bitmap| single_page_pdf(&bitmap))
            .await?;
        Ok(self.finish(
            ticket_file_name(&raffle.title, &ticket.number),
            "application/pdf",
            bytes,
        ))
    }

    /// PNG of the ticket grid as it stands.
    pub async fn grid_png(&self, raffle: &Raffle, today: NaiveDate) -> Result<Artifact, ExportError> {
        let raffle_for_scene = raffle.clone();
        let scene = move || Ok::<_, ExportError>(GridScene { raffle: raffle_for_scene });
        let bytes = self
            .render(scene, RenderOptions::SHARP, |bitmap| encode_png(&bitmap))
            .await?;
        Ok(self.finish(grid_file_name(&raffle.title, today), "image/png", bytes))
    }

    /// PNG of the whole participate view.
    pub async fn board_png(&self, raffle: &Raffle, today: NaiveDate) -> Result<Artifact, ExportError> {
        let raffle_for_scene = raffle.clone();
        let scene = move || Ok::<_, ExportError>(BoardScene { raffle: raffle_for_scene });
        let bytes = self
            .render(scene, RenderOptions::PAGE, |bitmap| encode_png(&bitmap))
            .await?;
        let prefix = board_prefix(&raffle.title);
        Ok(self.finish(board_file_name(&prefix, today), "image/png", bytes))
    }

    /// Builds the scene, rasterizes it and encodes the bitmap, all on a
    /// blocking worker. Awaiting the worker is the render-complete signal.
    async fn render<S, B, F>(
        &self,
        build: B,
        options: RenderOptions,
        encode: F,
    ) -> Result<Vec<u8>, ExportError>
    where
        S: Scene,
        B: FnOnce() -> Result<S, ExportError> + Send + 'static,
        F: FnOnce(RgbaImage) -> Result<Vec<u8>, ExportError> + Send + 'static,
    {
        let font_path = self.font_path.clone();
        let worker = tokio::task::spawn_blocking(move || {
            let scene = build()?;
            let font: FontVec = load_font(&font_path)?;
            let bitmap = rasterize(&scene, &options, &font)?;
            debug!("Rendered {}x{} bitmap", bitmap.width(), bitmap.height());
            encode(bitmap)
        });
        worker
            .await
            .map_err(|e| ExportError::Render(format!("render task failed: {e}")))?
    }

    fn finish(&self, file_name: String, content_type: &'static str, bytes: Vec<u8>) -> Artifact {
        info!("Exported {file_name} ({} bytes)", bytes.len());
        Artifact {
            file_name,
            content_type,
            bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use rifas_models::{Participant, RaffleAction, reduce};
    use std::io::Cursor;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn png_data_url() -> String {
        let mut bytes = Vec::new();
        RgbaImage::from_pixel(4, 2, Rgba([200, 10, 10, 255]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(bytes))
    }

    fn reserved_raffle() -> Raffle {
        let raffle = Raffle {
            title: "Gran   Rifa\tNavideña".into(),
            item_image: Some(png_data_url()),
            ..Raffle::default()
        };
        reduce(
            &raffle,
            RaffleAction::Reserve {
                number: "07".into(),
                participant: Participant {
                    name: "Ana".into(),
                    phone: "3001234567".into(),
                    email: "ana@example.com".into(),
                },
            },
        )
        .unwrap()
    }

    /// A font shipped with common Linux distributions, when present.
    fn system_font() -> Option<PathBuf> {
        [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
        ]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }

    #[test]
    fn file_names_follow_patterns() {
        assert_eq!(title_slug("Gran   Rifa\tNavideña"), "Gran_Rifa_Navideña");
        assert_eq!(ticket_file_name("Gran Rifa", "07"), "boleto_rifa_Gran_Rifa_07.pdf");
        assert_eq!(grid_file_name("Gran Rifa", date()), "estado_rifa_Gran_Rifa_2026-10-19.png");
        assert_eq!(board_prefix("Gran Rifa"), "vista_rifa_Gran_Rifa_");
        assert_eq!(board_prefix("  "), "vista_rifa_general_");
        assert_eq!(
            board_file_name(&board_prefix("Gran Rifa"), date()),
            "vista_rifa_Gran_Rifa_2026-10-19.png"
        );
    }

    #[test]
    fn data_url_images_are_decoded() {
        let picture = decode_item_image(&png_data_url()).unwrap().unwrap();
        assert_eq!(picture.dimensions(), (4, 2));

        assert!(decode_item_image("https://picsum.photos/600/400").unwrap().is_none());
        assert!(matches!(
            decode_item_image("data:image/png;base64,@@@"),
            Err(ExportError::Image(_))
        ));
        assert!(matches!(
            decode_item_image("data:text/plain,hola"),
            Err(ExportError::Image(_))
        ));
    }

    #[test]
    fn uploaded_bytes_become_data_urls() {
        let url = png_data_url();
        let payload = url.split_once(',').unwrap().1;
        let bytes = STANDARD.decode(payload).unwrap();
        assert_eq!(image_data_url(&bytes).unwrap(), url);
        assert!(matches!(image_data_url(b"plain text"), Err(ExportError::Image(_))));
    }

    #[tokio::test]
    async fn ticket_export_needs_a_participant() {
        let exporter = Exporter::new("/nonexistent/font.ttf");
        let raffle = reserved_raffle();
        assert!(matches!(
            exporter.ticket_pdf(&raffle, "08").await,
            Err(ExportError::NoParticipant(n)) if n == "08"
        ));
        assert!(matches!(
            exporter.ticket_pdf(&raffle, "100").await,
            Err(ExportError::UnknownTicket(_))
        ));
    }

    #[tokio::test]
    async fn broken_item_image_is_reported_by_the_render_worker() {
        let exporter = Exporter::new("/nonexistent/font.ttf");
        let mut raffle = reserved_raffle();
        raffle.item_image = Some("data:image/png;base64,@@@".into());
        assert!(matches!(
            exporter.ticket_pdf(&raffle, "07").await,
            Err(ExportError::Image(_))
        ));
    }

    #[tokio::test]
    async fn missing_font_fails_without_touching_the_raffle() {
        let exporter = Exporter::new("/nonexistent/font.ttf");
        let raffle = reserved_raffle();
        let before = raffle.clone();

        assert!(matches!(
            exporter.ticket_pdf(&raffle, "07").await,
            Err(ExportError::FontIo { .. })
        ));
        assert!(exporter.grid_png(&raffle, date()).await.is_err());
        assert!(exporter.board_png(&raffle, date()).await.is_err());
        assert_eq!(raffle, before);
    }

    #[tokio::test]
    async fn exports_render_with_a_system_font() {
        let Some(font) = system_font() else {
            eprintln!("no system font found, skipping render test");
            return;
        };
        let exporter = Exporter::new(font);
        let raffle = reserved_raffle();

        let ticket = exporter.ticket_pdf(&raffle, "07").await.unwrap();
        assert_eq!(ticket.file_name, "boleto_rifa_Gran_Rifa_Navideña_07.pdf");
        assert_eq!(ticket.content_type, "application/pdf");
        assert!(ticket.bytes.starts_with(b"%PDF"));

        let grid = exporter.grid_png(&raffle, date()).await.unwrap();
        let bitmap = image::load_from_memory(&grid.bytes).unwrap();
        assert_eq!(bitmap.width(), (grid_width(&raffle) * 2.0).ceil() as u32);

        let board = exporter.board_png(&raffle, date()).await.unwrap();
        assert!(board.file_name.starts_with("vista_rifa_Gran_Rifa_Navideña_"));
    }

    #[test]
    fn long_description_grows_the_ticket_instead_of_cropping_it() {
        let Some(font) = system_font() else {
            eprintln!("no system font found, skipping render test");
            return;
        };
        let font = load_font(&font).unwrap();
        let mut raffle = reserved_raffle();
        raffle.description = "palabra ".repeat(3000);
        let ticket = raffle.ticket("07").unwrap();
        let scene = TicketScene {
            number: ticket.number.clone(),
            participant: ticket.participant().cloned().unwrap(),
            picture: None,
            raffle: raffle.clone(),
        };
        let options = RenderOptions::SHARP;

        let painted = scene.paint(&mut Canvas::measuring(&options, &font)).unwrap();
        let bitmap = rasterize(&scene, &options, &font).unwrap();
        assert!(painted > 2400.0);
        assert!(bitmap.height() as f32 >= painted * options.scale);

        // The frame's bottom edge is the last thing painted.
        let bottom = bitmap.get_pixel(bitmap.width() / 2, bitmap.height() - 2);
        assert_eq!(*bottom, Rgba([0x33, 0x33, 0x33, 255]));
    }

    #[test]
    fn artifact_written_under_its_name() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = Artifact {
            file_name: "estado_rifa_x_2026-10-19.png".into(),
            content_type: "image/png",
            bytes: vec![1, 2, 3],
        };
        let path = artifact.write_to(&dir.path().join("out")).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), vec![1, 2, 3]);
    }
}

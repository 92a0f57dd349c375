use image::{Rgba, RgbaImage};
use rifas_models::{APP_TITLE, GRID_COLS, Participant, Raffle, TicketStatus};

use crate::ExportError;
use crate::render::{Canvas, Scene, WHITE, rgb};

const INK: Rgba<u8> = rgb(0x000000);
const PRIMARY: Rgba<u8> = rgb(0x1D4ED8);
const ACCENT: Rgba<u8> = rgb(0x10B981);
const MUTED: Rgba<u8> = rgb(0x555555);
const FAINT: Rgba<u8> = rgb(0x777777);
const RULE: Rgba<u8> = rgb(0xCCCCCC);
const FRAME: Rgba<u8> = rgb(0x333333);
const CELL_BORDER: Rgba<u8> = rgb(0xD1D5DB);

const GRID_PADDING: f32 = 16.0;
const GRID_GAP: f32 = 6.0;

/// Background and text colors of a grid cell.
pub fn cell_colors(status: TicketStatus) -> (Rgba<u8>, Rgba<u8>) {
    match status {
        TicketStatus::Available => (rgb(0xDCFCE7), rgb(0x1E3A8A)),
        TicketStatus::Reserved => (rgb(0xDC2626), rgb(0xFDE047)),
        TicketStatus::Paid => (rgb(0x7E22CE), WHITE),
    }
}

// --- Ticket document ---

/// Printable ticket handed to a participant.
pub struct TicketScene {
    pub raffle: Raffle,
    pub number: String,
    pub participant: Participant,
    /// Decoded prize image; `None` draws an empty frame.
    pub picture: Option<RgbaImage>,
}

impl TicketScene {
    const WIDTH: f32 = 400.0;
    const PADDING: f32 = 20.0;
}

impl Scene for TicketScene {
    fn width(&self) -> f32 {
        Self::WIDTH
    }

    fn paint(&self, c: &mut Canvas<'_>) -> Result<f32, ExportError> {
        let left = Self::PADDING;
        let inner = Self::WIDTH - 2.0 * Self::PADDING;
        let center = Self::WIDTH / 2.0;
        let mut y = Self::PADDING;

        c.text_centered(center, y, 24.0, PRIMARY, "¡BOLETO DE RIFA!");
        y += 34.0;
        c.hline(left, y, inner, RULE);
        y += 15.0;

        match &self.picture {
            Some(picture) => c.picture_contained(picture, left, y, inner, 150.0),
            None => c.stroke_rect(left + inner / 4.0, y, inner / 2.0, 150.0, 1.0, rgb(0xEEEEEE)),
        }
        y += 160.0;

        y += c.paragraph_centered(center, y, inner, 18.0, ACCENT, &self.raffle.title) + 6.0;
        y += c.paragraph_centered(center, y, inner, 12.0, MUTED, &self.raffle.description) + 15.0;

        let box_h = 80.0;
        c.fill_rect(left, y, inner, box_h, rgb(0xFFFBEB));
        c.dashed_rect(left, y, inner, box_h, 2.0, rgb(0xFBBF24));
        c.text_centered(center, y + 10.0, 14.0, INK, "Número Elegido:");
        c.text_centered(center, y + 30.0, 36.0, PRIMARY, &self.number);
        y += box_h + 15.0;

        let line = 18.0;
        for text in [
            format!("Comprador/a: {}", self.participant.name),
            format!("Celular: {}", self.participant.phone),
            format!("Correo: {}", self.participant.email),
        ] {
            c.text(left, y, 12.0, INK, &text);
            y += line;
        }
        y += 6.0;
        c.hline(left, y, inner, RULE);
        y += 10.0;

        for text in [
            format!("Precio del Boleto: {}", self.raffle.formatted_price()),
            format!("Fecha del Sorteo: {}", self.raffle.formatted_date()),
            format!("Juega con: {}", self.raffle.lottery_name),
        ] {
            c.text(left, y, 12.0, INK, &text);
            y += line;
        }
        y += 12.0;

        c.text_centered(center, y, 10.0, FAINT, "¡Mucha suerte! Conserva este boleto.");
        y += 14.0 + Self::PADDING;

        c.stroke_rect(0.0, 0.0, Self::WIDTH, y, 2.0, FRAME);
        Ok(y)
    }
}

// --- Ticket grid ---

/// The 10x10 board of numbers, colored by status.
pub struct GridScene {
    pub raffle: Raffle,
}

pub fn grid_width(raffle: &Raffle) -> f32 {
    let cell = raffle.grid_size_preset.cell_px() as f32;
    2.0 * GRID_PADDING + GRID_COLS as f32 * cell + (GRID_COLS - 1) as f32 * GRID_GAP
}

/// Paints the grid with its top-left corner at (`x`, `y`) and returns its height.
fn paint_grid(c: &mut Canvas<'_>, x: f32, y: f32, raffle: &Raffle) -> f32 {
    let tickets = &raffle.tickets;
    let preset = raffle.grid_size_preset;
    let cell = preset.cell_px() as f32;
    let font = preset.font_px() as f32;
    let step = cell + GRID_GAP;

    for (i, ticket) in tickets.iter().enumerate() {
        let col = (i % GRID_COLS) as f32;
        let row = (i / GRID_COLS) as f32;
        let cx = x + GRID_PADDING + col * step;
        let cy = y + GRID_PADDING + row * step;
        let (background, ink) = cell_colors(ticket.status());
        c.fill_rect(cx, cy, cell, cell, background);
        c.stroke_rect(cx, cy, cell, cell, 1.0, CELL_BORDER);
        c.text_centered(cx + cell / 2.0, cy + (cell - font) / 2.0 - 1.0, font, ink, &ticket.number);
    }

    let rows = tickets.len().div_ceil(GRID_COLS) as f32;
    2.0 * GRID_PADDING + rows * cell + (rows - 1.0).max(0.0) * GRID_GAP
}

impl Scene for GridScene {
    fn width(&self) -> f32 {
        grid_width(&self.raffle)
    }

    fn paint(&self, c: &mut Canvas<'_>) -> Result<f32, ExportError> {
        if self.raffle.tickets.is_empty() {
            return Err(ExportError::Render("no tickets to draw".to_string()));
        }
        Ok(paint_grid(c, 0.0, 0.0, &self.raffle))
    }
}

// --- Participate view ---

/// The participate view as one image: raffle details, legend and grid.
pub struct BoardScene {
    pub raffle: Raffle,
}

impl BoardScene {
    const MARGIN: f32 = 24.0;
    const MIN_WIDTH: f32 = 560.0;
}

impl Scene for BoardScene {
    fn width(&self) -> f32 {
        (grid_width(&self.raffle) + 2.0 * Self::MARGIN).max(Self::MIN_WIDTH)
    }

    fn paint(&self, c: &mut Canvas<'_>) -> Result<f32, ExportError> {
        let width = self.width();
        let center = width / 2.0;
        let inner = width - 2.0 * Self::MARGIN;
        let raffle = &self.raffle;
        let mut y = Self::MARGIN;

        c.text_centered(center, y, 26.0, PRIMARY, APP_TITLE);
        y += 44.0;
        y += c.paragraph_centered(center, y, inner, 22.0, PRIMARY, &raffle.title) + 8.0;
        y += c.paragraph_centered(center, y, inner, 13.0, MUTED, &raffle.description) + 14.0;

        let counts = raffle.counts();
        for text in [
            format!("Precio del Boleto: {}", raffle.formatted_price()),
            format!("Boletos Totales: {}", raffle.tickets.len()),
            format!("Fecha del Sorteo: {}", raffle.formatted_date()),
            format!("Juega con: {}", raffle.lottery_name),
            format!(
                "Disponibles: {}  ·  Reservados: {}  ·  Pagados: {}",
                counts.available, counts.reserved, counts.paid
            ),
        ] {
            c.text(Self::MARGIN, y, 13.0, INK, &text);
            y += 20.0;
        }
        y += 8.0;

        let mut x = Self::MARGIN;
        for status in TicketStatus::ALL {
            let (background, _) = cell_colors(status);
            c.fill_rect(x, y, 14.0, 14.0, background);
            c.stroke_rect(x, y, 14.0, 14.0, 1.0, CELL_BORDER);
            c.text(x + 20.0, y, 12.0, INK, status.label());
            x += 20.0 + c.text_width(12.0, status.label()) + 24.0;
        }
        y += 26.0;

        let grid_x = (width - grid_width(raffle)) / 2.0;
        y += paint_grid(c, grid_x, y, raffle);
        Ok(y + Self::MARGIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rifas_models::GridPreset;

    #[test]
    fn grid_width_follows_preset() {
        let compact = Raffle::default();
        assert_eq!(grid_width(&compact), 2.0 * 16.0 + 10.0 * 44.0 + 9.0 * 6.0);

        let large = Raffle {
            grid_size_preset: GridPreset::Large,
            ..Raffle::default()
        };
        assert!(grid_width(&large) > grid_width(&compact));
    }

    #[test]
    fn board_is_never_narrower_than_minimum() {
        let scene = BoardScene { raffle: Raffle::default() };
        assert!(scene.width() >= BoardScene::MIN_WIDTH);
    }

    #[test]
    fn statuses_have_distinct_cell_colors() {
        let colors: Vec<_> = TicketStatus::ALL.iter().map(|s| cell_colors(*s).0).collect();
        assert_ne!(colors[0], colors[1]);
        assert_ne!(colors[1], colors[2]);
        assert_ne!(colors[0], colors[2]);
    }
}

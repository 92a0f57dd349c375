//! Server-rendered pages: participate view, reservation form, administer
//! view, and notices.

use rifas_models::validation::field;
use rifas_models::{
    APP_TITLE, GridPreset, Raffle, RaffleDraft, ParticipantDraft, Ticket, TicketStatus,
    ValidationErrors,
};

const STYLE: &str = r#"
body { font-family: sans-serif; background: #f0f9ff; color: #1f2937; margin: 0; }
nav { background: #1d4ed8; padding: 12px 24px; display: flex; gap: 24px; align-items: center; }
nav a { color: #fff; text-decoration: none; font-weight: bold; }
main { max-width: 1100px; margin: 0 auto; padding: 24px; }
h1 { color: #1d4ed8; text-align: center; }
.card { background: #fff; border-radius: 12px; padding: 20px; margin-bottom: 24px; box-shadow: 0 4px 12px rgba(0,0,0,.1); }
.card img { max-width: 100%; max-height: 240px; object-fit: contain; display: block; margin: 0 auto; }
.grid { display: grid; grid-template-columns: repeat(10, var(--cell)); gap: 6px; padding: 16px; justify-content: center; }
.cell { width: var(--cell); height: var(--cell); font-size: var(--font); display: flex; align-items: center; justify-content: center; border: 1px solid #d1d5db; border-radius: 6px; font-weight: bold; text-decoration: none; }
.available { background: #dcfce7; color: #1e3a8a; }
.reserved { background: #dc2626; color: #fde047; }
.paid { background: #7e22ce; color: #fff; }
.legend span.swatch { display: inline-block; width: 14px; height: 14px; border: 1px solid #d1d5db; margin: 0 6px 0 16px; vertical-align: middle; }
.error { color: #dc2626; font-size: 12px; margin: 4px 0 0; }
.notice { border-left: 4px solid #10b981; }
.notice.failure { border-left-color: #dc2626; }
label { display: block; font-weight: bold; margin-top: 12px; }
input, textarea, select { width: 100%; padding: 8px; box-sizing: border-box; }
.button { display: inline-block; background: #10b981; color: #fff; padding: 8px 16px; border: 0; border-radius: 6px; text-decoration: none; cursor: pointer; }
table { width: 100%; border-collapse: collapse; }
th, td { padding: 8px; text-align: left; border-bottom: 1px solid #e5e7eb; }
"#;

/// Escapes text for use in element content and quoted attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"es\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{} | {}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <nav><strong style=\"color:#fff\">{}</strong><a href=\"/\">Participar</a><a href=\"/admin\">Administrar</a></nav>\n\
         <main>\n{body}\n</main>\n</body>\n</html>\n",
        escape(title),
        escape(APP_TITLE),
        escape(APP_TITLE),
    )
}

fn status_class(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Available => "available",
        TicketStatus::Reserved => "reserved",
        TicketStatus::Paid => "paid",
    }
}

fn field_error(errors: Option<&ValidationErrors>, name: &str) -> String {
    errors
        .and_then(|e| e.get(name))
        .map(|message| format!("<p class=\"error\">{}</p>", escape(message)))
        .unwrap_or_default()
}

// --- Shared pieces ---

fn details_card(raffle: &Raffle) -> String {
    let image = match raffle.item_image.as_deref() {
        Some(src) => format!("<img src=\"{}\" alt=\"{}\">", escape(src), escape(&raffle.title)),
        None => String::new(),
    };
    format!(
        "<section class=\"card\">{image}<h2>{}</h2><p>{}</p><ul>\
         <li>Precio del Boleto: <strong>{}</strong></li>\
         <li>Boletos Totales: <strong>{}</strong></li>\
         <li>Fecha del Sorteo: <strong>{}</strong></li>\
         <li>Juega con: <strong>{}</strong></li></ul></section>",
        escape(&raffle.title),
        escape(&raffle.description),
        escape(&raffle.formatted_price()),
        raffle.tickets.len(),
        escape(&raffle.formatted_date()),
        escape(&raffle.lottery_name),
    )
}

fn legend() -> String {
    let mut html = String::from("<p class=\"legend\"><strong>Leyenda:</strong>");
    for status in TicketStatus::ALL {
        html.push_str(&format!(
            "<span class=\"swatch {}\"></span>{}",
            status_class(status),
            status.label()
        ));
    }
    html.push_str("</p>");
    html
}

/// The 10-column grid. With `selectable`, available numbers link to the
/// reservation form.
fn grid(raffle: &Raffle, selectable: bool) -> String {
    let preset = raffle.grid_size_preset;
    let mut html = format!(
        "<div class=\"grid\" style=\"--cell:{}px;--font:{}px\">",
        preset.cell_px(),
        preset.font_px()
    );
    for ticket in &raffle.tickets {
        let class = status_class(ticket.status());
        let title = ticket.status().label();
        if selectable && ticket.is_available() {
            html.push_str(&format!(
                "<a class=\"cell {class}\" href=\"/reserve/{0}\" title=\"{title}\">{0}</a>",
                ticket.number
            ));
        } else {
            html.push_str(&format!(
                "<span class=\"cell {class}\" title=\"{title}\">{}</span>",
                ticket.number
            ));
        }
    }
    html.push_str("</div>");
    html
}

// --- Participate view ---

pub fn participate_page(raffle: &Raffle, reserved: Option<&Ticket>) -> String {
    let mut body = String::from(
        "<h1>Participa en Nuestra Rifa</h1>\
         <p style=\"text-align:center\">¡Elige tu número de la suerte y gana!</p>\
         <p style=\"text-align:right\"><a class=\"button\" href=\"/board.png\" \
         title=\"Capturar vista actual de la página como imagen PNG\">Capturar Vista Actual</a></p>",
    );
    body.push_str(&details_card(raffle));

    if let Some(ticket) = reserved {
        if let Some(participant) = ticket.participant() {
            body.push_str(&format!(
                "<section class=\"card notice\"><h3>¡Boleto #{0} Reservado!</h3>\
                 <p>Gracias, {1}.</p>\
                 <a class=\"button\" href=\"/tickets/{0}/pdf\">Descargar Boleta</a></section>",
                ticket.number,
                escape(&participant.name),
            ));
        }
    }

    body.push_str("<section class=\"card\"><h3>Selecciona tus Números</h3>");
    body.push_str(&grid(raffle, true));
    body.push_str(&legend());
    body.push_str("</section>");
    page("Participar", &body)
}

// --- Reservation form ---

pub fn reserve_page(
    raffle: &Raffle,
    number: &str,
    draft: &ParticipantDraft,
    errors: Option<&ValidationErrors>,
) -> String {
    let body = format!(
        "<section class=\"card\"><h1>Reservar Boleto #{number}</h1>\
         <p>Estás a punto de reservar el boleto para la rifa: <strong>{title}</strong>.</p>\
         <form method=\"post\" action=\"/reserve/{number}\">\
         <label for=\"name\">Nombre Completo</label>\
         <input type=\"text\" name=\"name\" id=\"name\" value=\"{name}\" placeholder=\"Ej: Ana Pérez\">{name_error}\
         <label for=\"phone\">Número de Celular</label>\
         <input type=\"tel\" name=\"phone\" id=\"phone\" value=\"{phone}\" placeholder=\"Ej: 3001234567\">{phone_error}\
         <label for=\"email\">Correo Electrónico</label>\
         <input type=\"email\" name=\"email\" id=\"email\" value=\"{email}\" placeholder=\"Ej: ana@correo.com\">{email_error}\
         <p><button class=\"button\" type=\"submit\">Confirmar Reserva</button> <a href=\"/\">Cancelar</a></p>\
         </form></section>",
        title = escape(&raffle.title),
        name = escape(&draft.name),
        phone = escape(&draft.phone),
        email = escape(&draft.email),
        name_error = field_error(errors, field::NAME),
        phone_error = field_error(errors, field::PHONE),
        email_error = field_error(errors, field::EMAIL),
    );
    page(&format!("Reservar #{number}"), &body)
}

// --- Administer view ---

fn raffle_form(draft: &RaffleDraft, errors: Option<&ValidationErrors>) -> String {
    let selected = draft.grid_size_preset.unwrap_or_default();
    let options: String = GridPreset::ALL
        .iter()
        .map(|preset| {
            format!(
                "<option value=\"{}\"{}>{}</option>",
                preset.key(),
                if *preset == selected { " selected" } else { "" },
                preset.label()
            )
        })
        .collect();
    let preview = match draft.item_image.as_deref() {
        Some(src) if !src.is_empty() => {
            format!("<img src=\"{}\" alt=\"Vista previa\" style=\"height:128px\">", escape(src))
        }
        _ => String::new(),
    };

    format!(
        "<section class=\"card\"><h2>Crear o Editar Rifa</h2>\
         <form method=\"post\" action=\"/admin/raffle\" enctype=\"multipart/form-data\">\
         <label for=\"title\">Título de la Rifa</label>\
         <input type=\"text\" name=\"title\" id=\"title\" value=\"{title}\">{title_error}\
         <label for=\"description\">Descripción</label>\
         <textarea name=\"description\" id=\"description\" rows=\"3\">{description}</textarea>{description_error}\
         <label for=\"ticketPrice\">Precio por Boleto ($)</label>\
         <input type=\"number\" step=\"any\" name=\"ticketPrice\" id=\"ticketPrice\" value=\"{price}\" placeholder=\"Ej: 5\">{price_error}\
         <label for=\"raffleDate\">Fecha del Sorteo</label>\
         <input type=\"date\" name=\"raffleDate\" id=\"raffleDate\" value=\"{date}\">{date_error}\
         <label for=\"lotteryName\">Juega con Lotería</label>\
         <input type=\"text\" name=\"lotteryName\" id=\"lotteryName\" value=\"{lottery}\" placeholder=\"Ej: Lotería Nacional\">{lottery_error}\
         <label for=\"gridSizePreset\">Tamaño de Cuadrícula</label>\
         <select name=\"gridSizePreset\" id=\"gridSizePreset\">{options}</select>\
         <label for=\"itemImage\">Imagen del Artículo</label>\
         <input type=\"file\" name=\"itemImage\" id=\"itemImage\" accept=\"image/*\">{preview}{image_error}\
         <p><button class=\"button\" type=\"submit\" name=\"intent\" value=\"update\">Actualizar Rifa</button> \
         <button class=\"button\" type=\"submit\" name=\"intent\" value=\"create\">Crear Nueva Rifa</button></p>\
         </form></section>",
        title = escape(&draft.title),
        description = escape(&draft.description),
        price = escape(&draft.ticket_price),
        date = escape(&draft.raffle_date),
        lottery = escape(&draft.lottery_name),
        title_error = field_error(errors, field::TITLE),
        description_error = field_error(errors, field::DESCRIPTION),
        image_error = field_error(errors, field::ITEM_IMAGE),
        price_error = field_error(errors, field::TICKET_PRICE),
        date_error = field_error(errors, field::RAFFLE_DATE),
        lottery_error = field_error(errors, field::LOTTERY_NAME),
    )
}

fn report(raffle: &Raffle) -> String {
    let tickets = raffle.participant_tickets();
    let mut html = String::from(
        "<section class=\"card\"><h2>Reporte de Participantes y Pagos</h2>",
    );
    if tickets.is_empty() {
        html.push_str("<p>No hay boletos reservados o pagados aún.</p></section>");
        return html;
    }
    html.push_str(
        "<table><thead><tr><th># Boleto</th><th>Nombre</th><th>Celular</th>\
         <th>Correo</th><th>Estado</th><th>Acciones</th></tr></thead><tbody>",
    );
    for ticket in tickets {
        let Some(participant) = ticket.participant() else {
            continue;
        };
        let action = match ticket.status() {
            TicketStatus::Reserved => format!(
                "<form method=\"post\" action=\"/admin/tickets/{}/pay\">\
                 <button class=\"button\" type=\"submit\">Marcar Pagado y Descargar</button></form>",
                ticket.number
            ),
            _ => format!(
                "✓ Pagado <a href=\"/tickets/{}/pdf\">Descargar</a>",
                ticket.number
            ),
        };
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td><span class=\"cell-label {}\">{}</span></td><td>{action}</td></tr>",
            ticket.number,
            escape(&participant.name),
            escape(&participant.phone),
            escape(&participant.email),
            status_class(ticket.status()),
            ticket.status().label(),
        ));
    }
    html.push_str("</tbody></table></section>");
    html
}

pub fn admin_page(raffle: &Raffle, draft: &RaffleDraft, errors: Option<&ValidationErrors>) -> String {
    let counts = raffle.counts();
    let mut body = String::from(
        "<h1>Panel de Administración de Rifas</h1>\
         <p style=\"text-align:center\">Gestiona los detalles de la rifa y visualiza el estado de los boletos.</p>",
    );
    body.push_str(&raffle_form(draft, errors));
    body.push_str(&details_card(raffle));
    body.push_str(&format!(
        "<section class=\"card\"><h3>Estado General de Boletos</h3>\
         <p>Disponibles: <strong>{}</strong></p>\
         <p>Reservados: <strong>{}</strong></p>\
         <p>Pagados: <strong>{}</strong></p>\
         <a class=\"button\" href=\"/grid.png\">Generar Imagen de Cuadrícula</a>\
         <p><small>La imagen se generará a partir de la cuadrícula de abajo.</small></p></section>",
        counts.available, counts.reserved, counts.paid
    ));
    body.push_str(&report(raffle));
    body.push_str("<section class=\"card\"><h2>Visualización de la Cuadrícula (Admin)</h2>");
    body.push_str(&grid(raffle, false));
    body.push_str(&legend());
    body.push_str("</section>");
    page("Administrar", &body)
}

// --- Notices ---

/// Blocking notice shown when an action cannot go through.
pub fn notice_page(title: &str, message: &str, back: &str) -> String {
    let body = format!(
        "<section class=\"card notice failure\"><h2>{}</h2><p>{}</p>\
         <a class=\"button\" href=\"{}\">Volver</a></section>",
        escape(title),
        escape(message),
        escape(back),
    );
    page(title, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rifas_models::{Participant, RaffleAction, reduce};

    fn reserved(raffle: &Raffle, number: &str) -> Raffle {
        reduce(
            raffle,
            RaffleAction::Reserve {
                number: number.into(),
                participant: Participant {
                    name: "Ana <Pérez>".into(),
                    phone: "3001234567".into(),
                    email: "ana@example.com".into(),
                },
            },
        )
        .unwrap()
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn only_available_cells_link_to_the_form() {
        let raffle = reserved(&Raffle::default(), "07");
        let html = participate_page(&raffle, None);
        assert!(html.contains("href=\"/reserve/08\""));
        assert!(!html.contains("href=\"/reserve/07\""));
        assert!(html.contains("<span class=\"cell reserved\" title=\"Reservado\">07</span>"));
    }

    #[test]
    fn reservation_confirmation_offers_the_ticket() {
        let raffle = reserved(&Raffle::default(), "07");
        let html = participate_page(&raffle, raffle.ticket("07"));
        assert!(html.contains("¡Boleto #07 Reservado!"));
        assert!(html.contains("Gracias, Ana &lt;Pérez&gt;."));
        assert!(html.contains("/tickets/07/pdf"));
    }

    #[test]
    fn report_lists_actions_by_status() {
        let raffle = reserved(&reserved(&Raffle::default(), "07"), "03");
        let raffle = reduce(&raffle, RaffleAction::MarkPaid { number: "07".into() }).unwrap();
        let html = admin_page(&raffle, &RaffleDraft::from_raffle(&raffle), None);

        assert!(html.contains("/admin/tickets/03/pay"));
        assert!(!html.contains("/admin/tickets/07/pay"));
        assert!(html.contains("href=\"/tickets/07/pdf\""));
        assert!(html.find("<td>03</td>") < html.find("<td>07</td>"));
        assert!(html.contains("Disponibles: <strong>98</strong>"));
    }

    #[test]
    fn form_errors_render_inline() {
        let mut errors = ValidationErrors::default();
        errors.errors.insert(field::PHONE, "Número de celular inválido.".into());
        let draft = ParticipantDraft {
            name: "Ana".into(),
            phone: "123".into(),
            email: "ana@example.com".into(),
        };
        let html = reserve_page(&Raffle::default(), "07", &draft, Some(&errors));
        assert!(html.contains("<p class=\"error\">Número de celular inválido.</p>"));
        assert!(html.contains("value=\"123\""));
    }
}

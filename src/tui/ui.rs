//! UI rendering for the TUI

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Cell, Paragraph, Row, Table, Widget, Wrap},
    Frame,
};

use super::app::App;
use crate::api::{Listing, ListingsPage};
use crate::dashboard::{fit_width, View};

const TITLE_COLUMN_MIN: u16 = 20;

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    // Layout: header (1 line) + main content + status bar (1 line)
    let [header_area, main_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    let buf = frame.buffer_mut();
    render_header(header_area, buf, app);

    let state = app.dashboard.state();
    match app.dashboard.view() {
        View::Idle => render_message(main_area, buf, "Checking eBay connection...", Color::Gray),
        View::ConnectPrompt => render_connect(main_area, buf, app),
        View::Loading => render_message(main_area, buf, "Loading listings...", Color::Gray),
        View::Error => {
            let error = state.listings_error.as_deref().unwrap_or("Unknown error");
            render_message(
                main_area,
                buf,
                &format!("Failed to load listings: {}  [r] retry", error),
                Color::Red,
            )
        }
        View::Listings => match &state.listings {
            Some(page) => render_listings(main_area, buf, page, state.page),
            None => render_message(main_area, buf, "No listings loaded", Color::Gray),
        },
    }

    render_status(status_area, buf, app);
}

fn render_header(area: Rect, buf: &mut Buffer, app: &App) {
    let title = Span::styled(
        " eBay Seller Dashboard ",
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );

    let seller = app
        .dashboard
        .user()
        .map(|u| u.name.clone().unwrap_or_else(|| u.id.clone()))
        .unwrap_or_else(|| "not signed in".to_string());
    let (indicator, color) = if app.dashboard.state().ebay_token.is_some() {
        ("*", Color::Green)
    } else {
        ("o", Color::Red)
    };

    let right = format!("{} ", seller);
    let pad = (area.width as usize)
        .saturating_sub(title.width() + right.len() + 2)
        .max(1);

    let header = Line::from(vec![
        title,
        Span::raw(" ".repeat(pad)),
        Span::styled(format!("{} ", indicator), Style::default().fg(color)),
        Span::styled(right, Style::default().fg(Color::Cyan)),
    ]);
    Paragraph::new(header)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

fn render_message(area: Rect, buf: &mut Buffer, text: &str, color: Color) {
    Paragraph::new(text.to_string())
        .style(Style::default().fg(color))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::bordered())
        .render(area, buf);
}

fn render_connect(area: Rect, buf: &mut Buffer, app: &App) {
    let lines = vec![
        Line::from(""),
        Line::styled(
            "No eBay account connected",
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Line::from(""),
        Line::from(app.connect_hint()),
    ];
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::bordered().title(" Connect "))
        .render(area, buf);
}

fn listing_row(listing: &Listing, title_width: usize) -> Row<'_> {
    let price = listing
        .price
        .as_ref()
        .map(|p| format!("{} {}", p.value, p.currency))
        .unwrap_or_else(|| "-".to_string());
    let quantity = listing
        .quantity_available
        .map(|q| q.to_string())
        .unwrap_or_else(|| "-".to_string());

    Row::new(vec![
        Cell::from(fit_width(&listing.title, title_width)),
        Cell::from(price),
        Cell::from(quantity),
        Cell::from(listing.item_id.as_str()),
    ])
}

fn render_listings(area: Rect, buf: &mut Buffer, listings: &ListingsPage, page: u32) {
    let widths = [
        Constraint::Min(TITLE_COLUMN_MIN),
        Constraint::Length(16),
        Constraint::Length(6),
        Constraint::Length(16),
    ];
    // Borders, the fixed columns and the gaps between them
    let title_width = (area.width as usize).saturating_sub(2 + 16 + 6 + 16 + 3);

    let header = Row::new(vec!["Title", "Price", "Qty", "Item ID"])
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    let rows = listings
        .listings
        .iter()
        .map(|l| listing_row(l, title_width.max(TITLE_COLUMN_MIN as usize)));

    let footer = format!(
        " Page {} of {} ({} listings) ",
        page,
        listings.page_count(),
        listings.total
    );
    let block = Block::bordered()
        .title(" Active Listings ")
        .title_bottom(Line::from(footer).right_aligned());

    if listings.listings.is_empty() {
        Paragraph::new("No active listings")
            .alignment(Alignment::Center)
            .block(block)
            .render(area, buf);
        return;
    }

    Widget::render(Table::new(rows, widths).header(header).block(block), area, buf);
}

fn render_status(area: Rect, buf: &mut Buffer, app: &App) {
    let hints = match app.dashboard.view() {
        View::ConnectPrompt => "c: connect  q: quit",
        _ => "n/p: page  r: reload  q: quit",
    };

    let mut spans = vec![Span::styled(
        format!(" {} ", hints),
        Style::default().fg(Color::Gray),
    )];
    if let Some(notice) = &app.notice {
        spans.push(Span::styled(
            format!("| {}", notice),
            Style::default().fg(Color::Red),
        ));
    } else if let Some(line) = &app.last_log {
        spans.push(Span::styled(
            format!("| {}", line),
            Style::default().fg(Color::DarkGray),
        ));
    }

    Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::Black))
        .render(area, buf);
}

use crate::app::App;
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::Paragraph,
    Frame,
};
use std::borrow::Cow;

const KEY_HINTS: &str = "[j/k]move [space]skip [g]top [r/R]efresh [h]ydrate [o]pen [c]ache [q]uit";

/// Render the status bar
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    if area.width < 1 || area.height < 1 {
        return;
    }

    let (text, style): (Cow<'_, str>, Style) = if let Some((msg, _)) = &app.status_message {
        (Cow::Borrowed(msg.as_ref()), base_style())
    } else if let Some(err) = app.feed.error() {
        (
            Cow::Owned(format!("Error: {err} | {KEY_HINTS}")),
            base_style().bg(Color::Red),
        )
    } else {
        (Cow::Owned(summary(app)), base_style())
    };

    f.render_widget(Paragraph::new(text).style(style), area);
}

fn base_style() -> Style {
    Style::default().bg(Color::DarkGray).fg(Color::White)
}

fn summary(app: &App) -> String {
    let feed = &app.feed;
    let state = if feed.initial_loading() {
        "loading feed..."
    } else if feed.loading() {
        "loading more..."
    } else if feed.has_more() {
        "more available"
    } else {
        "end of feed"
    };
    let count = feed.items().len();
    let position = if count == 0 {
        0
    } else {
        app.viewport.active_index() + 1
    };
    format!("{position}/{count} | {state} | {KEY_HINTS}")
}

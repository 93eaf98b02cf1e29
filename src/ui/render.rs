//! Render functions for the TUI.
//!
//! The screen is a column of cards for the viewport's visible window
//! (active card plus neighbours) above a one-line status bar.

use crate::app::App;
use chrono::{DateTime, Utc};
use flick::feed::{FeedItem, MediaKind, PlaybackState};
use flick::util::{format_count, format_duration, strip_control_chars, truncate_to_width};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use super::status;

pub(super) const MIN_WIDTH: u16 = 40;
pub(super) const MIN_HEIGHT: u16 = 8;

pub(super) fn render(f: &mut Frame, app: &App) {
    let area = f.area();
    if area.width < 1 || area.height < 1 {
        return;
    }
    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        let msg = Paragraph::new(format!(
            "Terminal too small\nMinimum: {MIN_WIDTH}x{MIN_HEIGHT}"
        ))
        .alignment(Alignment::Center);
        f.render_widget(msg, area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    render_feed(f, app, chunks[0]);
    status::render(f, app, chunks[1]);
}

fn render_feed(f: &mut Frame, app: &App, area: Rect) {
    let feed = &app.feed;
    if feed.items().is_empty() {
        let text = if feed.initial_loading() {
            "Loading feed...".to_string()
        } else if let Some(err) = feed.error() {
            format!("Could not load the feed\n\n{err}\n\nPress r to try again")
        } else {
            "Nothing here yet\n\nPress r to refresh".to_string()
        };
        f.render_widget(Paragraph::new(text).alignment(Alignment::Center), area);
        return;
    }

    let card_height = (app.viewport.item_height() as u16).max(3);
    let mut y = area.y;
    for index in app.viewport.visible_range() {
        let Some(item) = feed.items().get(index) else {
            break;
        };
        let remaining = area.bottom().saturating_sub(y);
        if remaining < 3 {
            break;
        }
        let card = Rect::new(area.x, y, area.width, card_height.min(remaining));
        render_card(f, item, app.viewport.playback_state(index), card);
        y += card.height;
    }

    let at_end = app.viewport.active_index() + 1 == feed.items().len();
    if at_end && y < area.bottom() {
        let footer = if feed.loading() {
            "Loading more..."
        } else if feed.has_more() {
            ""
        } else {
            "You're all caught up"
        };
        let line = Rect::new(area.x, y, area.width, 1);
        f.render_widget(
            Paragraph::new(footer)
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::DarkGray)),
            line,
        );
    }
}

fn render_card(f: &mut Frame, item: &FeedItem, playback: PlaybackState, area: Rect) {
    let active = playback == PlaybackState::Playing;
    let border = if active {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let author = strip_control_chars(item.author());
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(format!(" @{} ", truncate_to_width(&author, 30)));

    let inner_width = area.width.saturating_sub(2) as usize;
    let lines = card_lines(item, playback, inner_width, Utc::now());
    f.render_widget(Paragraph::new(lines).block(block), area);
}

/// Text content of one card, each line fitted to `width` columns.
pub(super) fn card_lines(
    item: &FeedItem,
    playback: PlaybackState,
    width: usize,
    now: DateTime<Utc>,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    let caption = strip_control_chars(item.caption());
    lines.push(Line::from(Span::styled(
        truncate_to_width(&caption, width).into_owned(),
        Style::default().add_modifier(Modifier::BOLD),
    )));

    if let Some(media) = item.media() {
        let marker = match playback {
            PlaybackState::Playing => "▶ playing",
            PlaybackState::Paused => "⏸ paused",
            PlaybackState::Unloaded => "· idle",
        };
        let text = match media.kind {
            MediaKind::Video => {
                let length = media.duration_secs.map(format_duration).unwrap_or_default();
                format!("{marker}  video {length}")
            }
            MediaKind::Image => "image".to_string(),
        };
        lines.push(Line::from(Span::styled(
            truncate_to_width(text.trim_end(), width).into_owned(),
            Style::default().fg(Color::Magenta),
        )));
    }

    match item {
        FeedItem::Lightweight(preview) => {
            if let Some(option) = &preview.top_option {
                let label = strip_control_chars(&option.label);
                let text = format!("Top answer: {label} ({})", format_count(option.votes));
                lines.push(Line::from(truncate_to_width(&text, width).into_owned()));
            }
            lines.push(Line::from(Span::styled(
                "loading details...",
                Style::default().fg(Color::DarkGray),
            )));
        }
        FeedItem::Full(full) => {
            let total = full.total_votes();
            for option in &full.options {
                let label = strip_control_chars(&option.label);
                let pct = if total == 0 {
                    0
                } else {
                    option.votes * 100 / total
                };
                let text = format!("{pct:>3}%  {label}");
                lines.push(Line::from(truncate_to_width(&text, width).into_owned()));
            }
            let stats = format!(
                "♥ {}  💬 {}  ↗ {}  · {}",
                format_count(full.like_count),
                format_count(full.comment_count),
                format_count(full.share_count),
                relative_time(full.created_at, now)
            );
            lines.push(Line::from(Span::styled(
                truncate_to_width(&stats, width).into_owned(),
                Style::default().fg(Color::Gray),
            )));
        }
    }
    lines
}

/// Age as `5m`, `3h`, `2d`, or a date past a week.
fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds();
    match secs {
        i64::MIN..=59 => "now".to_string(),
        60..=3_599 => format!("{}m", secs / 60),
        3_600..=86_399 => format!("{}h", secs / 3_600),
        86_400..=604_799 => format!("{}d", secs / 86_400),
        _ => at.format("%b %d").to_string(),
    }
}

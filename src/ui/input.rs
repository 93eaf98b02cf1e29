//! Keyboard and mouse handling.

use crate::app::{App, WHEEL_ROWS};
use crossterm::event::{KeyCode, KeyModifiers, MouseEventKind};
use flick::util::validate_share_url;

use super::loop_runner::Action;

/// Cards skipped by Space / PageDown.
const PAGE_STEP: isize = 3;

pub(super) fn handle_key(app: &mut App, code: KeyCode, modifiers: KeyModifiers) -> Action {
    app.needs_redraw = true;
    match (code, modifiers) {
        (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => return Action::Quit,
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => return Action::Quit,
        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => app.step(1),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => app.step(-1),
        (KeyCode::Char(' '), _) | (KeyCode::PageDown, _) => app.step(PAGE_STEP),
        (KeyCode::PageUp, _) => app.step(-PAGE_STEP),
        (KeyCode::Char('g'), _) | (KeyCode::Home, _) => app.jump_to_top(),
        (KeyCode::Char('r'), _) => app.refresh(false),
        (KeyCode::Char('R'), _) => app.refresh(true),
        (KeyCode::Char('h'), _) => app.hydrate_active(),
        (KeyCode::Char('c'), _) => app.show_cache_stats(),
        (KeyCode::Char('o'), _) => open_active(app),
        _ => {}
    }
    Action::Continue
}

pub(super) fn handle_mouse(app: &mut App, kind: MouseEventKind) {
    match kind {
        MouseEventKind::ScrollDown => app.scroll_by(WHEEL_ROWS),
        MouseEventKind::ScrollUp => app.scroll_by(-WHEEL_ROWS),
        _ => {}
    }
}

/// Opens the active item's share link in the system browser.
fn open_active(app: &mut App) {
    let Some(raw) = app.active_share_url().map(str::to_string) else {
        app.set_status("No share link yet (press h to load details)");
        return;
    };
    // Validate before open::that() so a hostile link cannot launch another handler.
    match validate_share_url(&raw) {
        Ok(url) => match open::that(url.as_str()) {
            Ok(()) => app.set_status("Opened in browser"),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open share link");
                app.set_status(format!("Failed to open browser: {e}"));
            }
        },
        Err(e) => app.set_status(format!("Refusing to open link: {e}")),
    }
}

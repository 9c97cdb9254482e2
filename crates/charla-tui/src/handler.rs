use charla_core::{Config, Controller};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use tracing::{info, warn};

use crate::app::App;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, controller: &mut Controller, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, controller, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => app.scroll_to_bottom(),
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Controller(event) => controller.handle_event(event, app),
        AppEvent::Permission(request) => {
            // Only one question at a time; a newer one replaces (and denies) the old.
            if let Some(previous) = app.permission_request.replace(request) {
                previous.respond(false);
            }
        }
    }
}

fn handle_key(app: &mut App, controller: &mut Controller, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.permission_request.is_some() {
        handle_permission_key(app, key);
        return;
    }

    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            // Record
            KeyCode::Char('r') => controller.capture_voice_input(),
            // Theme
            KeyCode::Char('t') => {
                let theme = app.toggle_theme();
                if let Err(e) = Config::save_theme(theme) {
                    warn!(error = %e, "Could not save theme");
                }
            }
            KeyCode::Char('u') => {
                app.input.clear();
                app.input_cursor = 0;
            }
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Esc => app.should_quit = true,
        KeyCode::Enter => {
            let prompt = app.take_input();
            let result = controller.submit(&prompt, app);
            app.submit_result(prompt, result);
        }
        KeyCode::F(2) => controller.capture_voice_input(),
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::PageUp => app.scroll_up(app.chat_height.max(1) / 2),
        KeyCode::PageDown => app.scroll_down(app.chat_height.max(1) / 2),
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
            app.input_error = None;
        }
        _ => {}
    }
}

fn handle_permission_key(app: &mut App, key: KeyEvent) {
    let granted = match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => true,
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => false,
        _ => return,
    };

    if let Some(request) = app.permission_request.take() {
        request.respond(granted);
        info!(granted, "Microphone permission answered");
        if let Err(e) = Config::save_microphone_allowed(granted) {
            warn!(error = %e, "Could not save microphone permission");
        }
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use charla_core::{
        ChatError, CommandVoiceCapture, ConversationService, PermissionGate, SqliteStore, Theme,
    };
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct Echo;

    #[async_trait]
    impl ConversationService for Echo {
        async fn generate(&self, prompt: &str) -> Result<Option<String>, ChatError> {
            Ok(Some(format!("re: {}", prompt)))
        }
    }

    async fn setup() -> (App, Controller, mpsc::UnboundedReceiver<charla_core::ControllerEvent>) {
        let (gate, _prompts) = PermissionGate::new(true);
        let voice = Arc::new(CommandVoiceCapture::new(None, gate));
        let (mut controller, mut rx) =
            Controller::new(Box::new(SqliteStore::in_memory().unwrap()), Arc::new(Echo), voice, 8).unwrap();
        let mut app = App::new(Theme::Dark, "Test", "echo");

        controller.load_history();
        let event = rx.recv().await.unwrap();
        handle_event(&mut app, &mut controller, AppEvent::Controller(event));
        (app, controller, rx)
    }

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, controller: &mut Controller, text: &str) {
        for c in text.chars() {
            handle_event(app, controller, key(KeyCode::Char(c)));
        }
    }

    #[tokio::test]
    async fn test_enter_on_blank_input_shows_error() {
        let (mut app, mut controller, _rx) = setup().await;
        type_text(&mut app, &mut controller, "   ");
        handle_event(&mut app, &mut controller, key(KeyCode::Enter));

        assert!(app.input.is_empty());
        assert_eq!(app.input_error.as_deref(), Some("message cannot be empty"));
        assert!(app.messages.is_empty());
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_enter_sends_and_reply_arrives() {
        let (mut app, mut controller, mut rx) = setup().await;
        type_text(&mut app, &mut controller, "hola");
        handle_event(&mut app, &mut controller, key(KeyCode::Enter));

        assert!(app.input.is_empty());
        assert!(app.loading);
        assert_eq!(app.messages.len(), 1);

        while controller.is_busy() {
            let event = rx.recv().await.unwrap();
            handle_event(&mut app, &mut controller, AppEvent::Controller(event));
        }

        assert!(!app.loading);
        let texts: Vec<&str> = app.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["hola", "re: hola"]);
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_cursor_editing() {
        let (mut app, mut controller, _rx) = setup().await;
        type_text(&mut app, &mut controller, "helo");
        handle_event(&mut app, &mut controller, key(KeyCode::Left));
        type_text(&mut app, &mut controller, "l");
        assert_eq!(app.input, "hello");

        handle_event(&mut app, &mut controller, key(KeyCode::Home));
        handle_event(&mut app, &mut controller, key(KeyCode::Delete));
        assert_eq!(app.input, "ello");

        handle_event(&mut app, &mut controller, key(KeyCode::End));
        handle_event(&mut app, &mut controller, key(KeyCode::Backspace));
        assert_eq!(app.input, "ell");
        assert_eq!(app.input_cursor, 3);
        controller.shutdown().await;
    }

    #[test]
    fn test_char_to_byte_index_handles_multibyte() {
        let s = "añb";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 1), 1);
        assert_eq!(char_to_byte_index(s, 2), 3);
        assert_eq!(char_to_byte_index(s, 3), 4);
        assert_eq!(char_to_byte_index(s, 10), 4);
    }
}

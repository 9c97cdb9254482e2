use charla_core::{ChatError, ChatView, Message, PermissionRequest, Theme};

pub struct App {
    pub should_quit: bool,

    // Input field
    pub input: String,
    pub input_cursor: usize, // cursor position in input, in chars
    pub input_error: Option<String>,

    // Mirror of the controller's conversation, kept current through ChatView
    pub messages: Vec<Message>,
    pub loading: bool,
    pub history_loaded: bool,

    // Chat scrolling
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub theme: Theme,
    pub provider_label: String,
    pub model: String,

    // Open microphone permission question, answered with y/n
    pub permission_request: Option<PermissionRequest>,
}

impl App {
    pub fn new(theme: Theme, provider_label: &str, model: &str) -> Self {
        Self {
            should_quit: false,
            input: String::new(),
            input_cursor: 0,
            input_error: None,
            messages: Vec::new(),
            loading: false,
            history_loaded: false,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            theme,
            provider_label: provider_label.to_string(),
            model: model.to_string(),
            permission_request: None,
        }
    }

    /// Take the current input for sending. The field is cleared either way.
    pub fn take_input(&mut self) -> String {
        self.input_cursor = 0;
        std::mem::take(&mut self.input)
    }

    /// Record the outcome of a submit. Rejections that are not the user's
    /// fault put the text back so it is not lost.
    pub fn submit_result(&mut self, prompt: String, result: Result<(), ChatError>) {
        match result {
            Ok(()) => self.input_error = None,
            Err(e) => {
                if matches!(
                    e,
                    ChatError::RequestInFlight | ChatError::HistoryLoading | ChatError::Persistence(_)
                ) {
                    self.input_cursor = prompt.chars().count();
                    self.input = prompt;
                }
                self.input_error = Some(e.to_string());
            }
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.max_scroll());
    }

    /// Scroll chat to bottom so the newest message (or "Thinking...") is visible
    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_scroll();
    }

    fn max_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.total_chat_lines().saturating_sub(visible_height)
    }

    fn total_chat_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };

        let mut total_lines: u16 = 0;
        for msg in &self.messages {
            total_lines = total_lines.saturating_add(1); // Sender line ("You:" or "Bot:")
            for line in msg.text.lines() {
                // Character count, not byte length, for UTF-8 text
                let char_count = line.chars().count();
                let wrapped = if char_count == 0 { 1 } else { (char_count / wrap_width) + 1 };
                total_lines = total_lines.saturating_add(wrapped as u16);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.loading {
            total_lines = total_lines.saturating_add(2); // "Bot:" + "Thinking..."
        }
        total_lines
    }
}

impl ChatView for App {
    fn reset(&mut self, messages: &[Message]) {
        self.messages = messages.to_vec();
        self.history_loaded = true;
        self.scroll_to_bottom();
    }

    fn inserted(&mut self, index: usize, message: &Message) {
        debug_assert_eq!(index, self.messages.len());
        self.messages.push(message.clone());
        self.scroll_to_bottom();
    }

    fn busy(&mut self, busy: bool) {
        self.loading = busy;
        if !busy {
            self.animation_frame = 0;
        }
        self.scroll_to_bottom();
    }

    fn input_replaced(&mut self, text: &str) {
        self.input = text.to_string();
        self.input_cursor = self.input.chars().count();
        self.input_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new(Theme::Dark, "Gemini", "gemini-2.0-flash")
    }

    #[test]
    fn test_inserted_appends_in_order() {
        let mut app = app();
        app.reset(&[Message::user("hi")]);
        app.inserted(1, &Message::bot("hello"));
        let texts: Vec<&str> = app.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["hi", "hello"]);
        assert!(app.history_loaded);
    }

    #[test]
    fn test_input_replaced_moves_cursor_to_end() {
        let mut app = app();
        app.input = "old".to_string();
        app.input_error = Some("message cannot be empty".to_string());
        app.input_replaced("¿dónde está?");
        assert_eq!(app.input, "¿dónde está?");
        assert_eq!(app.input_cursor, 12);
        assert!(app.input_error.is_none());
    }

    #[test]
    fn test_empty_prompt_error_clears_field() {
        let mut app = app();
        app.input = "   ".to_string();
        let prompt = app.take_input();
        app.submit_result(prompt, Err(ChatError::EmptyPrompt));
        assert!(app.input.is_empty());
        assert_eq!(app.input_error.as_deref(), Some("message cannot be empty"));
    }

    #[test]
    fn test_in_flight_rejection_restores_text() {
        let mut app = app();
        app.input = "second question".to_string();
        let prompt = app.take_input();
        app.submit_result(prompt, Err(ChatError::RequestInFlight));
        assert_eq!(app.input, "second question");
        assert_eq!(app.input_cursor, 15);
        assert!(app.input_error.is_some());
    }

    #[test]
    fn test_store_rejection_restores_text() {
        let mut app = app();
        app.input = "later".to_string();
        let prompt = app.take_input();
        app.submit_result(prompt, Err(ChatError::Persistence("store queue is full".to_string())));
        assert_eq!(app.input, "later");
        assert_eq!(app.input_cursor, 5);
    }

    #[test]
    fn test_scroll_to_bottom_follows_long_history() {
        let mut app = app();
        app.chat_height = 5;
        app.chat_width = 20;
        let messages: Vec<Message> = (0..10).map(|i| Message::user(format!("m{}", i))).collect();
        app.reset(&messages);
        // 10 messages * 3 lines each, minus 5 visible
        assert_eq!(app.chat_scroll, 25);

        app.scroll_up(10);
        assert_eq!(app.chat_scroll, 15);
        app.scroll_down(100);
        assert_eq!(app.chat_scroll, 25);
    }

    #[test]
    fn test_tick_only_animates_while_loading() {
        let mut app = app();
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);
        app.busy(true);
        app.tick_animation();
        app.tick_animation();
        assert_eq!(app.animation_frame, 2);
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);
    }
}

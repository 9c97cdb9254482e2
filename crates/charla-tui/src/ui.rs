use charla_core::{Sender, Theme};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use crate::app::App;

/// Colors for one theme
struct Palette {
    background: Color,
    text: Color,
    muted: Color,
    user: Color,
    bot: Color,
    bar: Color,
    bar_text: Color,
}

fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Dark => Palette {
            background: Color::Reset,
            text: Color::White,
            muted: Color::DarkGray,
            user: Color::Cyan,
            bot: Color::Yellow,
            bar: Color::DarkGray,
            bar_text: Color::White,
        },
        Theme::Light => Palette {
            background: Color::White,
            text: Color::Black,
            muted: Color::Gray,
            user: Color::Blue,
            bot: Color::Magenta,
            bar: Color::Gray,
            bar_text: Color::Black,
        },
    }
}

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after_open = &rest[start + 2..];
        match after_open.find("**") {
            Some(end) if end > 0 => {
                if start > 0 {
                    spans.push(Span::raw(rest[..start].to_string()));
                }
                spans.push(Span::styled(
                    after_open[..end].to_string(),
                    Style::default().add_modifier(Modifier::BOLD),
                ));
                rest = &after_open[end + 2..];
            }
            // No closing **, treat the remainder as literal
            _ => break,
        }
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    let colors = palette(app.theme);

    frame.render_widget(
        Block::default().style(Style::default().bg(colors.background).fg(colors.text)),
        area,
    );

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, &colors, frame, header_area);
    render_chat(app, &colors, frame, chat_area);
    render_input(app, &colors, frame, input_area);
    render_footer(&colors, frame, footer_area);

    if app.permission_request.is_some() {
        render_permission_prompt(&colors, frame, area);
    }
}

fn render_header(app: &App, colors: &Palette, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" charla ", Style::default().fg(colors.user).bold()),
        Span::styled(
            format!("{}: {} ", app.provider_label, app.model),
            Style::default().fg(colors.bar_text),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(colors.muted),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(colors.bar));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, colors: &Palette, frame: &mut Frame, area: Rect) {
    // Inner size minus borders, for scroll calculations
    let size_changed = app.chat_height != area.height.saturating_sub(2)
        || app.chat_width != area.width.saturating_sub(2);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);
    if size_changed {
        app.scroll_to_bottom();
    }

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(colors.muted))
        .title(" Conversation ");

    let chat_text = if !app.history_loaded {
        Text::from(Span::styled("Loading history...", Style::default().fg(colors.muted)))
    } else if app.messages.is_empty() && !app.loading {
        Text::from(Span::styled(
            "Type a message below, or press F2 to speak.",
            Style::default().fg(colors.muted),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in &app.messages {
            let (label, color) = match msg.sender {
                Sender::User => ("You:", colors.user),
                Sender::Bot => ("Bot:", colors.bot),
            };
            lines.push(Line::from(Span::styled(
                label,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )));
            match msg.sender {
                Sender::User => {
                    for line in msg.text.lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                }
                Sender::Bot => {
                    for line in msg.text.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
            }
            lines.push(Line::default());
        }

        if app.loading {
            lines.push(Line::from(Span::styled(
                "Bot:",
                Style::default().fg(colors.bot).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(colors.muted).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, colors: &Palette, frame: &mut Frame, area: Rect) {
    let (border_color, title) = match &app.input_error {
        Some(error) => (Color::Red, format!(" {} ", error)),
        None => (colors.bot, " Message (Enter to send) ".to_string()),
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    // Horizontal scroll offset that keeps the cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(colors.user))
        .block(input_block);

    frame.render_widget(input, area);

    if app.permission_request.is_none() {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(colors: &Palette, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(colors.bar).fg(colors.bar_text);

    let hints = vec![
        Span::styled(" Enter ", key_style),
        Span::styled(" send ", label_style),
        Span::styled(" F2 ", key_style),
        Span::styled(" speak ", label_style),
        Span::styled(" ↑/↓ ", key_style),
        Span::styled(" scroll ", label_style),
        Span::styled(" ^T ", key_style),
        Span::styled(" theme ", label_style),
        Span::styled(" Esc ", key_style),
        Span::styled(" quit ", label_style),
    ];

    let footer = Paragraph::new(Line::from(hints)).style(Style::default().bg(colors.bar));
    frame.render_widget(footer, area);
}

/// Centered popup, never larger than `area`.
fn popup_area(area: Rect) -> Rect {
    let popup_width = 50.min(area.width.saturating_sub(4));
    let popup_height = 5.min(area.height);

    let popup_x = area.x + (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = area.y + (area.height.saturating_sub(popup_height)) / 2;

    Rect::new(popup_x, popup_y, popup_width, popup_height)
}

fn render_permission_prompt(colors: &Palette, frame: &mut Frame, area: Rect) {
    let popup_area = popup_area(area);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .style(Style::default().bg(colors.background).fg(colors.text))
        .title(" Microphone ");

    let text = Text::from(vec![
        Line::from("Allow charla to record audio for voice input?"),
        Line::default(),
        Line::from(vec![
            Span::styled(" y ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(" allow   "),
            Span::styled(" n ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(" deny"),
        ]),
    ]);

    let prompt = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
    frame.render_widget(prompt, popup_area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(line: &Line) -> Vec<(String, bool)> {
        line.spans
            .iter()
            .map(|s| {
                (
                    s.content.to_string(),
                    s.style.add_modifier.contains(Modifier::BOLD),
                )
            })
            .collect()
    }

    #[test]
    fn test_bold_markdown_is_styled() {
        let line = parse_markdown_line("a **bold** move");
        assert_eq!(
            plain(&line),
            vec![
                ("a ".to_string(), false),
                ("bold".to_string(), true),
                (" move".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_unclosed_bold_is_literal() {
        let line = parse_markdown_line("2 ** 3");
        assert_eq!(plain(&line), vec![("2 ** 3".to_string(), false)]);
    }

    #[test]
    fn test_popup_fits_short_terminal() {
        let area = Rect::new(0, 0, 80, 3);
        let popup = popup_area(area);
        assert_eq!(popup.height, 3);
        assert_eq!(area.union(popup), area);

        let tall = popup_area(Rect::new(0, 0, 80, 24));
        assert_eq!((tall.width, tall.height), (50, 5));
    }

    #[test]
    fn test_empty_line() {
        assert!(parse_markdown_line("").spans.is_empty());
    }
}

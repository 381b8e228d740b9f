//! Rendering of outbound notifications.

use chrono::{DateTime, Local};

pub const DEFAULT_TITLE: &str = "No title";

/// A titled notification before it is wrapped for delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Local>,
}

impl Notification {
    pub fn new(title: &str, body: impl Into<String>, created_at: DateTime<Local>) -> Self {
        let title = if title.is_empty() { DEFAULT_TITLE } else { title };
        Self { title: title.to_owned(), body: body.into(), created_at }
    }

    /// `<code>## title ##\n\nbody\n\ntimestamp</code>`, with angle brackets in
    /// the title and body escaped so the text is safe for HTML parse mode.
    pub fn render(&self) -> String {
        let heading = format!("## {} ##", self.title);
        let message =
            if self.body.is_empty() { heading } else { format!("{heading}\n\n{}", self.body) };

        format!("<code>{}\n\n{}</code>", escape_angle_brackets(&message), timestamp(&self.created_at))
    }
}

pub fn escape_angle_brackets(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}

fn timestamp(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};

    use super::{escape_angle_brackets, Notification};

    fn at() -> chrono::DateTime<Local> {
        Local.with_ymd_and_hms(2025, 2, 20, 12, 38, 14).single().expect("unambiguous local time")
    }

    #[test]
    fn renders_title_body_and_timestamp_inside_code_block() {
        let notification = Notification::new("search started", "a\nb\n", at());
        assert_eq!(
            notification.render(),
            "<code>## search started ##\n\na\nb\n\n\n2025-02-20 12:38:14.000000</code>"
        );
    }

    #[test]
    fn empty_body_renders_heading_only() {
        let notification = Notification::new("program started", "", at());
        assert_eq!(
            notification.render(),
            "<code>## program started ##\n\n2025-02-20 12:38:14.000000</code>"
        );
    }

    #[test]
    fn empty_title_falls_back_to_default() {
        let notification = Notification::new("", "body", at());
        assert_eq!(notification.title, "No title");
    }

    #[test]
    fn escapes_angle_brackets_but_keeps_wrapper_tags() {
        let rendered = Notification::new("<b>", "Vec<Slot> -> ok", at()).render();
        assert!(rendered.starts_with("<code>## &lt;b&gt; ##\n\nVec&lt;Slot&gt; -&gt; ok"));
        assert!(rendered.ends_with("</code>"));
        assert_eq!(escape_angle_brackets("a & b"), "a & b");
    }
}

//! Text rendering of the journal screens.
//!
//! Posts and comments are listed with a short index (`#1`, `#2`, ...) that
//! the shell accepts in place of the full id.

use chrono::{Local, TimeZone};
use std::fmt::Write;

use super::{JournalApp, Screen};
use crate::storage::{Comment, Post};

/// Timestamp in local time, e.g. `2024.03.09 21:05`
pub fn format_date(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.format("%Y.%m.%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}

/// Render whatever screen the app is on
pub fn render(app: &JournalApp) -> String {
    let mut out = String::new();

    match app.screen() {
        Screen::Login => render_login(&mut out),
        Screen::Loading => out.push_str("로딩중...\n"),
        Screen::List => render_list(&mut out, app),
        Screen::Comments => render_comments(&mut out, app),
    }

    if let Some(confirmation) = app.pending_confirmation() {
        let _ = writeln!(out, "\n? {} [y/n]", confirmation.prompt());
    }

    if !app.notices().is_empty() {
        out.push('\n');
        for (i, notice) in app.notices().iter().enumerate() {
            let _ = writeln!(out, "! [{}] {}", i + 1, notice.message);
        }
    }

    out
}

fn render_login(out: &mut String) {
    out.push_str("♥ Keepsake\n");
    out.push_str("소중한 공간에 오신 것을 환영해요\n");
}

fn render_list(out: &mut String, app: &JournalApp) {
    let user = app
        .session()
        .map(|s| s.display_name.as_str())
        .unwrap_or_default();
    let live = if app.is_live() { " · live" } else { "" };
    let _ = writeln!(out, "♥ Keepsake · {} ({}{})", user, app.store_kind(), live);
    out.push('\n');

    if app.posts().is_empty() {
        out.push_str("첫 번째 글을 남겨보세요!\n");
        return;
    }

    for (i, post) in app.posts().iter().enumerate() {
        render_post(out, i + 1, post);
    }
}

fn render_post(out: &mut String, index: usize, post: &Post) {
    let _ = writeln!(
        out,
        "#{} {} · {}",
        index,
        post.author,
        format_date(post.created_at)
    );
    for line in post.content.lines() {
        let _ = writeln!(out, "   {}", line);
    }
    let _ = writeln!(out, "   💬 {}", post.comment_count);
}

fn render_comments(out: &mut String, app: &JournalApp) {
    let Some(modal) = app.modal() else {
        return;
    };

    let _ = writeln!(out, "댓글 · {}", modal.post.author);
    for line in modal.post.content.lines() {
        let _ = writeln!(out, "  {}", line);
    }
    out.push('\n');

    if modal.comments.is_empty() {
        out.push_str("  (no comments yet)\n");
    }
    for (i, comment) in modal.comments.iter().enumerate() {
        render_comment(out, i + 1, comment);
    }
}

fn render_comment(out: &mut String, index: usize, comment: &Comment) {
    let _ = writeln!(
        out,
        "  #{} {} · {}: {}",
        index,
        comment.author,
        format_date(comment.created_at),
        comment.content
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialTable;
    use crate::config::AuthConfig;
    use crate::storage::LocalStore;
    use std::sync::Arc;

    #[test]
    fn test_format_date_shape() {
        let formatted = format_date(1_700_000_000_000);
        assert_eq!(formatted.len(), "2023.11.14 22:13".len());
        assert_eq!(&formatted[4..5], ".");
        assert_eq!(format_date(i64::MAX), "-");
    }

    #[tokio::test]
    async fn test_render_screens() {
        let credentials = CredentialTable::from_config(&AuthConfig::default());
        let mut app = JournalApp::new(Arc::new(LocalStore::in_memory()), credentials);
        assert!(render(&app).contains("Keepsake"));

        app.login("소영", "000521").await.unwrap();
        assert!(render(&app).contains("첫 번째 글을 남겨보세요!"));

        let post = app.create_post("hello\nworld").await.unwrap();
        let screen = render(&app);
        assert!(screen.contains("#1 소영"));
        assert!(screen.contains("   world"));

        app.open_comments(&post.id).await.unwrap();
        app.add_comment("hi").await.unwrap();
        assert!(render(&app).contains("#1 소영"));
        assert!(render(&app).contains(": hi"));
    }
}

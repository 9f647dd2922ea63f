use async_trait::async_trait;
use std::io::{self, Write};
use std::sync::Mutex;
use tracing::info;
use tweetfeed_core::{MatchedPost, Result};

/// Where matched posts end up.
#[async_trait]
pub trait FeedEmitter: Send + Sync {
    async fn emit(&self, matched: &MatchedPost) -> Result<()>;
}

/// Writes one line per post to stdout (or any writer) and logs it.
pub struct ConsoleEmitter<W = io::Stdout> {
    out: Mutex<W>,
}

impl ConsoleEmitter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleEmitter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

/// `[2024-05-01 12:00:00 UTC] Display Name (@handle): text`
pub fn format_post(matched: &MatchedPost) -> String {
    let author = &matched.author;
    let who = match &author.username {
        Some(username) => format!("{} (@{})", author.display_name, username),
        None => author.display_name.clone(),
    };
    // Keep one post per line.
    let text = matched.post.text.replace(['\r', '\n'], " ");

    format!(
        "[{}] {}: {}",
        matched.post.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        who,
        text
    )
}

#[async_trait]
impl<W: Write + Send> FeedEmitter for ConsoleEmitter<W> {
    async fn emit(&self, matched: &MatchedPost) -> Result<()> {
        let line = format_post(matched);
        {
            let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
            writeln!(out, "{}", line)?;
            out.flush()?;
        }

        info!(
            account_id = %matched.author.id,
            post_id = %matched.post.id,
            "Emitted post from {}",
            matched.author.display_name
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tweetfeed_core::{Account, Post};

    fn matched(username: Option<&str>, text: &str) -> MatchedPost {
        let mut author = Account::new("2244994945", "Twitter Dev");
        author.username = username.map(str::to_string);
        MatchedPost {
            author,
            post: Post {
                id: "1460323737035677698".to_string(),
                author_id: "2244994945".to_string(),
                text: text.to_string(),
                created_at: Utc.with_ymd_and_hms(2021, 11, 15, 19, 8, 5).unwrap(),
            },
        }
    }

    #[test]
    fn test_format_post() {
        assert_eq!(
            format_post(&matched(Some("TwitterDev"), "Introducing a new era")),
            "[2021-11-15 19:08:05 UTC] Twitter Dev (@TwitterDev): Introducing a new era"
        );
        assert_eq!(
            format_post(&matched(None, "line one\nline two")),
            "[2021-11-15 19:08:05 UTC] Twitter Dev: line one line two"
        );
    }

    #[test]
    fn test_console_emitter_writes_lines() {
        let emitter = ConsoleEmitter::new(Vec::new());
        tokio_test::block_on(async {
            emitter.emit(&matched(Some("a"), "first")).await.unwrap();
            emitter.emit(&matched(Some("a"), "second")).await.unwrap();
        });

        let written = String::from_utf8(emitter.into_inner()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("second"));
    }
}

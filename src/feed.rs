//! Offset pagination and the post/comment listings built on it.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::models::{CommentOut, PostOut, User};
use crate::error::{AppError, AppResult};
use crate::rating::RATING_SQL;

pub const PER_PAGE: i64 = 10;

/// Character budget of post text in list views.
pub const FEED_TEXT_LIMIT: usize = 400;

/// Marker appended to truncated text.
pub const ELLIPSIS: &str = " ...";

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: i64,
    pub per_page: i64,
}

impl PageParams {
    pub fn new(page: Option<i64>) -> AppResult<Self> {
        let page = page.unwrap_or(1);
        if page < 1 {
            return Err(AppError::BadRequest("page must be 1 or greater".into()));
        }
        Ok(PageParams {
            page,
            per_page: PER_PAGE,
        })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    pub fn wrap<T>(&self, total: i64, data: Vec<T>) -> Page<T> {
        Page {
            total,
            page: self.page,
            per_page: self.per_page,
            data,
        }
    }
}

impl TryFrom<PageQuery> for PageParams {
    type Error = AppError;

    fn try_from(query: PageQuery) -> AppResult<Self> {
        PageParams::new(query.page)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub data: Vec<T>,
}

/// Shorten `text` to at most `max_chars` characters for list display.
///
/// Text within budget comes back unchanged. Longer text is cut so the
/// result including [`ELLIPSIS`] fits the budget, and the trailing partial
/// word is dropped. A budget too small for the marker yields whole words
/// only, without it.
pub fn cut_string(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let marker_len = ELLIPSIS.chars().count();
    if max_chars < marker_len {
        // No room for the marker: keep whole words only
        let head: String = text.chars().take(max_chars).collect();
        let next_is_break = text.chars().nth(max_chars) == Some(' ');
        return match head.rfind(' ') {
            _ if next_is_break => head,
            Some(idx) => head[..idx].to_string(),
            None => String::new(),
        };
    }

    let head: String = text.chars().take(max_chars - marker_len).collect();
    let kept = match head.rfind(' ') {
        Some(idx) => &head[..idx],
        None => "",
    };
    format!("{}{}", kept, ELLIPSIS)
}

const POST_SELECT: &str = "SELECT p.id, p.title, p.text, p.created_at, p.preview";

fn post_out_from_row(row: &Row<'_>) -> rusqlite::Result<PostOut> {
    Ok(PostOut {
        id: row.get(0)?,
        title: row.get(1)?,
        text: row.get(2)?,
        created_at: row.get(3)?,
        preview: row.get(4)?,
        rating: row.get(5)?,
        author: User::from_row_at(row, 6)?,
    })
}

/// Full post with author and rating, for the detail view.
pub fn post_detail(conn: &Connection, post_id: i64) -> AppResult<PostOut> {
    let sql = format!(
        "{}, {} AS rating, {} FROM posts p JOIN users u ON u.id = p.user_id WHERE p.id = ?1",
        POST_SELECT,
        RATING_SQL,
        User::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![post_id], post_out_from_row)?;
    match rows.next() {
        Some(post) => Ok(post?),
        None => Err(AppError::not_found("Post")),
    }
}

/// A page of posts, newest first, optionally limited to one author. Text is
/// truncated for list display.
pub fn post_feed(
    conn: &Connection,
    author_id: Option<i64>,
    page: PageParams,
) -> AppResult<Page<PostOut>> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM posts WHERE ?1 IS NULL OR user_id = ?1",
        params![author_id],
        |row| row.get(0),
    )?;

    let sql = format!(
        "{}, {} AS rating, {} FROM posts p JOIN users u ON u.id = p.user_id
         WHERE ?1 IS NULL OR p.user_id = ?1
         ORDER BY p.created_at DESC, p.id ASC
         LIMIT ?2 OFFSET ?3",
        POST_SELECT,
        RATING_SQL,
        User::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map(
            params![author_id, page.per_page, page.offset()],
            post_out_from_row,
        )?
        .map(|post| {
            post.map(|mut post| {
                post.text = post.text.map(|t| cut_string(&t, FEED_TEXT_LIMIT));
                post
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(page.wrap(total, posts))
}

/// A page of comments on a post, newest first.
pub fn comment_page(
    conn: &Connection,
    post_id: i64,
    page: PageParams,
) -> AppResult<Page<CommentOut>> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT c.id, c.post_id, c.text, c.created_at, {}
         FROM comments c JOIN users u ON u.id = c.user_id
         WHERE c.post_id = ?1
         ORDER BY c.created_at DESC, c.id ASC
         LIMIT ?2 OFFSET ?3",
        User::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let comments = stmt
        .query_map(params![post_id, page.per_page, page.offset()], |row| {
            Ok(CommentOut {
                id: row.get(0)?,
                post_id: row.get(1)?,
                text: row.get(2)?,
                created_at: row.get(3)?,
                user: User::from_row_at(row, 4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(page.wrap(total, comments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::{Duration, Utc};

    fn insert_user(conn: &Connection, username: &str) -> i64 {
        conn.execute(
            "INSERT INTO users (username, email, password) VALUES (?1, ?2, 'digest')",
            params![username, format!("{}@example.com", username)],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn insert_post_at(conn: &Connection, user_id: i64, title: &str, minutes_ago: i64) -> i64 {
        conn.execute(
            "INSERT INTO posts (user_id, title, text, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                user_id,
                title,
                format!("{} text", title),
                Utc::now() - Duration::minutes(minutes_ago)
            ],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn cut_string_keeps_short_text() {
        assert_eq!(cut_string("short", 10), "short");
        assert_eq!(cut_string("exactly10!", 10), "exactly10!");
    }

    #[test]
    fn cut_string_drops_partial_word_and_appends_marker() {
        let cut = cut_string("the quick brown fox", 10);
        assert_eq!(cut, "the ...");
        assert!(cut.chars().count() <= 10);
    }

    #[test]
    fn cut_string_never_splits_words() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        for budget in 5..text.len() {
            let cut = cut_string(text, budget);
            assert!(cut.chars().count() <= budget, "budget {}: {:?}", budget, cut);
            let body = cut.strip_suffix(ELLIPSIS).unwrap();
            for word in body.split(' ').filter(|w| !w.is_empty()) {
                assert!(text.split(' ').any(|w| w == word), "split word {:?}", word);
            }
        }
    }

    #[test]
    fn cut_string_is_idempotent() {
        let text = "word ".repeat(200);
        let once = cut_string(&text, FEED_TEXT_LIMIT);
        assert!(once.chars().count() <= FEED_TEXT_LIMIT);
        assert_eq!(cut_string(&once, FEED_TEXT_LIMIT), once);

        let fox = cut_string("the quick brown fox", 10);
        assert_eq!(cut_string(&fox, 10), fox);
    }

    #[test]
    fn cut_string_respects_budgets_smaller_than_marker() {
        assert_eq!(cut_string("hello world", 3), "");
        assert_eq!(cut_string("hi there", 3), "hi");
        assert_eq!(cut_string("a b c", 3), "a b");
        assert_eq!(cut_string("anything", 0), "");
        for budget in 0..ELLIPSIS.len() {
            let cut = cut_string("the quick brown fox", budget);
            assert!(cut.chars().count() <= budget, "budget {}: {:?}", budget, cut);
        }
    }

    #[test]
    fn cut_string_counts_characters_not_bytes() {
        let text = "пельмени со сметаной и укропом";
        let cut = cut_string(text, 16);
        assert_eq!(cut, "пельмени со ...");
    }

    #[test]
    fn page_params_validate_and_offset() {
        assert_eq!(PageParams::new(None).unwrap().page, 1);
        assert_eq!(PageParams::new(Some(1)).unwrap().offset(), 0);
        assert_eq!(PageParams::new(Some(3)).unwrap().offset(), 20);
        assert!(PageParams::new(Some(0)).is_err());
        assert!(PageParams::new(Some(-2)).is_err());
    }

    #[test]
    fn empty_feed_has_zero_total() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let page = post_feed(&conn, None, PageParams::new(Some(1)).unwrap()).unwrap();
        assert_eq!(page.total, 0);
        assert!(page.data.is_empty());
        assert_eq!(page.per_page, PER_PAGE);
    }

    #[test]
    fn feed_pages_cover_every_post_once_newest_first() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        let expected: Vec<i64> = (0..23)
            .map(|i| insert_post_at(&conn, alice, &format!("post{}", i), 100 - i))
            .rev()
            .collect();

        let mut seen = Vec::new();
        for page in 1..=3 {
            let result = post_feed(&conn, None, PageParams::new(Some(page)).unwrap()).unwrap();
            assert_eq!(result.total, 23);
            seen.extend(result.data.iter().map(|p| p.id));
        }
        assert_eq!(seen, expected);

        let past_end = post_feed(&conn, None, PageParams::new(Some(4)).unwrap()).unwrap();
        assert!(past_end.data.is_empty());
        assert_eq!(past_end.total, 23);
    }

    #[test]
    fn equal_timestamps_fall_back_to_insertion_order() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        let at = Utc::now();
        let ids: Vec<i64> = (0..3)
            .map(|i| {
                conn.execute(
                    "INSERT INTO posts (user_id, title, created_at) VALUES (?1, ?2, ?3)",
                    params![alice, format!("t{}", i), at],
                )
                .unwrap();
                conn.last_insert_rowid()
            })
            .collect();

        let page = post_feed(&conn, None, PageParams::new(None).unwrap()).unwrap();
        let got: Vec<i64> = page.data.iter().map(|p| p.id).collect();
        assert_eq!(got, ids);
    }

    #[test]
    fn author_feed_is_filtered_and_truncated() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        let bob = insert_user(&conn, "bob");
        insert_post_at(&conn, bob, "bobs", 1);
        let long = "lorem ipsum ".repeat(100);
        conn.execute(
            "INSERT INTO posts (user_id, title, text, created_at) VALUES (?1, 'long', ?2, ?3)",
            params![alice, long, Utc::now()],
        )
        .unwrap();
        let long_id = conn.last_insert_rowid();

        let page = post_feed(&conn, Some(alice), PageParams::new(None).unwrap()).unwrap();
        assert_eq!(page.total, 1);
        let post = &page.data[0];
        assert_eq!(post.author.username, "alice");
        let text = post.text.as_deref().unwrap();
        assert!(text.chars().count() <= FEED_TEXT_LIMIT);
        assert!(text.ends_with(ELLIPSIS));

        // Detail view keeps the full text
        let detail = post_detail(&conn, long_id).unwrap();
        assert_eq!(detail.text.as_deref(), Some(long.as_str()));
    }

    #[test]
    fn feed_rating_matches_likes() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        let bob = insert_user(&conn, "bob");
        let post = insert_post_at(&conn, alice, "pie", 0);
        crate::rating::rate_post(&conn, alice, post, true).unwrap();
        crate::rating::rate_post(&conn, bob, post, true).unwrap();

        let page = post_feed(&conn, None, PageParams::new(None).unwrap()).unwrap();
        assert_eq!(page.data[0].rating, 2);
        assert_eq!(post_detail(&conn, post).unwrap().rating, 2);
    }

    #[test]
    fn missing_post_detail_is_404() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        assert!(matches!(post_detail(&conn, 7), Err(AppError::NotFound(_))));
    }

    #[test]
    fn comment_pages_are_per_post() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        let post = insert_post_at(&conn, alice, "pie", 0);
        let other = insert_post_at(&conn, alice, "cake", 0);
        for i in 0..12 {
            conn.execute(
                "INSERT INTO comments (user_id, post_id, text, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![alice, post, format!("c{}", i), Utc::now() + Duration::seconds(i)],
            )
            .unwrap();
        }
        conn.execute(
            "INSERT INTO comments (user_id, post_id, text, created_at) VALUES (?1, ?2, 'elsewhere', ?3)",
            params![alice, other, Utc::now()],
        )
        .unwrap();

        let first = comment_page(&conn, post, PageParams::new(Some(1)).unwrap()).unwrap();
        assert_eq!(first.total, 12);
        assert_eq!(first.data.len(), 10);
        assert_eq!(first.data[0].text, "c11");
        assert_eq!(first.data[0].user.username, "alice");

        let second = comment_page(&conn, post, PageParams::new(Some(2)).unwrap()).unwrap();
        assert_eq!(second.data.len(), 2);
        assert_eq!(second.data[1].text, "c0");
    }
}

//! Post rating: one +1/-1 vote per user and post, summed into a score.
//!
//! The score has two evaluation paths that must agree: [`RATING_SQL`] for
//! queries that list posts, and [`sum_likes`] for likes already loaded.
//! Both compute `sum(value)` with 0 for a post nobody has rated.

use rusqlite::{params, Connection};

use crate::db::models::{Post, PostLike};
use crate::error::{AppError, AppResult};

/// Rating of the post aliased as `p` in the surrounding query.
pub const RATING_SQL: &str =
    "COALESCE((SELECT SUM(l.value) FROM post_likes l WHERE l.post_id = p.id), 0)";

/// Record a vote. Re-rating overwrites the caller's previous vote.
/// Returns the stored value.
pub fn rate_post(conn: &Connection, user_id: i64, post_id: i64, liked: bool) -> AppResult<i64> {
    if !Post::exists(conn, post_id)? {
        return Err(AppError::not_found("Post"));
    }

    let value: i64 = if liked { 1 } else { -1 };
    conn.execute(
        "INSERT INTO post_likes (user_id, post_id, value) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id, post_id) DO UPDATE SET value = excluded.value",
        params![user_id, post_id, value],
    )?;

    tracing::debug!(user_id, post_id, value, "Post rated");
    Ok(value)
}

/// Live rating of a single post.
pub fn post_rating(conn: &Connection, post_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        &format!("SELECT {} FROM posts p WHERE p.id = ?1", RATING_SQL),
        params![post_id],
        |row| row.get(0),
    )
}

/// Rating computed from likes already in memory.
pub fn sum_likes(likes: &[PostLike]) -> i64 {
    likes.iter().map(|l| l.value).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::Utc;

    fn insert_user(conn: &Connection, username: &str) -> i64 {
        conn.execute(
            "INSERT INTO users (username, email, password) VALUES (?1, ?2, 'digest')",
            params![username, format!("{}@example.com", username)],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn insert_post(conn: &Connection, user_id: i64) -> i64 {
        conn.execute(
            "INSERT INTO posts (user_id, title, created_at) VALUES (?1, 'stew', ?2)",
            params![user_id, Utc::now()],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn like_rows(conn: &Connection, user_id: i64, post_id: i64) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM post_likes WHERE user_id = ?1 AND post_id = ?2",
            params![user_id, post_id],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn unrated_post_scores_zero() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        let post = insert_post(&conn, alice);

        assert_eq!(post_rating(&conn, post).unwrap(), 0);
        assert_eq!(sum_likes(&PostLike::for_post(&conn, post).unwrap()), 0);
    }

    #[test]
    fn votes_from_distinct_users_are_summed() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let author = insert_user(&conn, "author");
        let post = insert_post(&conn, author);
        let a = insert_user(&conn, "a");
        let b = insert_user(&conn, "b");
        let c = insert_user(&conn, "c");

        rate_post(&conn, a, post, true).unwrap();
        rate_post(&conn, b, post, true).unwrap();
        rate_post(&conn, c, post, false).unwrap();

        assert_eq!(post_rating(&conn, post).unwrap(), 1);
    }

    #[test]
    fn re_rating_updates_the_single_row() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        let post = insert_post(&conn, alice);

        for liked in [true, false, true, false, false] {
            rate_post(&conn, alice, post, liked).unwrap();
            assert_eq!(like_rows(&conn, alice, post), 1);
        }
        assert_eq!(post_rating(&conn, post).unwrap(), -1);

        assert_eq!(rate_post(&conn, alice, post, true).unwrap(), 1);
        assert_eq!(post_rating(&conn, post).unwrap(), 1);
    }

    #[test]
    fn rating_a_missing_post_is_404() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");

        assert!(matches!(
            rate_post(&conn, alice, 404, true),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn sql_and_in_memory_ratings_agree() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let author = insert_user(&conn, "author");
        let post = insert_post(&conn, author);
        let other = insert_post(&conn, author);

        for (i, liked) in [true, false, false, true, false].iter().enumerate() {
            let voter = insert_user(&conn, &format!("voter{}", i));
            rate_post(&conn, voter, post, *liked).unwrap();
            rate_post(&conn, voter, other, true).unwrap();
        }

        let likes = PostLike::for_post(&conn, post).unwrap();
        assert_eq!(likes.len(), 5);
        assert_eq!(sum_likes(&likes), post_rating(&conn, post).unwrap());
        assert_eq!(sum_likes(&likes), -1);
    }
}

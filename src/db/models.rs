use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub avatar: Option<String>,
    pub is_admin: bool,
    pub email_confirmed: bool,
}

impl User {
    pub const COLUMNS: &'static str =
        "u.id, u.username, u.email, u.password, u.name, u.surname, u.avatar, u.is_admin, u.email_confirmed";

    /// Number of columns in [`User::COLUMNS`].
    pub const WIDTH: usize = 9;

    /// Read a user from `row`, starting at column `start`. Queries select
    /// [`User::COLUMNS`] from an `users u` alias.
    pub fn from_row_at(row: &Row<'_>, start: usize) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(start)?,
            username: row.get(start + 1)?,
            email: row.get(start + 2)?,
            password: row.get(start + 3)?,
            name: row.get(start + 4)?,
            surname: row.get(start + 5)?,
            avatar: row.get(start + 6)?,
            is_admin: row.get(start + 7)?,
            email_confirmed: row.get(start + 8)?,
        })
    }

    pub fn find(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
        conn.query_row(
            &format!("SELECT {} FROM users u WHERE u.id = ?1", Self::COLUMNS),
            params![id],
            |row| User::from_row_at(row, 0),
        )
        .optional()
    }

    pub fn find_by_username(conn: &Connection, username: &str) -> rusqlite::Result<Option<User>> {
        conn.query_row(
            &format!("SELECT {} FROM users u WHERE u.username = ?1", Self::COLUMNS),
            params![username],
            |row| User::from_row_at(row, 0),
        )
        .optional()
    }

    /// Look a user up by either username or email, as the login form allows.
    pub fn find_by_login(conn: &Connection, username_or_email: &str) -> rusqlite::Result<Option<User>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM users u WHERE u.username = ?1 OR u.email = ?1 ORDER BY u.id LIMIT 1",
                Self::COLUMNS
            ),
            params![username_or_email],
            |row| User::from_row_at(row, 0),
        )
        .optional()
    }

    pub fn list(conn: &Connection) -> rusqlite::Result<Vec<User>> {
        let mut stmt = conn.prepare(&format!("SELECT {} FROM users u ORDER BY u.id", Self::COLUMNS))?;
        let users = stmt
            .query_map([], |row| User::from_row_at(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Filenames stored on behalf of this user: the avatar plus every post
    /// preview. Used to clean up storage after the cascade delete.
    pub fn owned_files(&self, conn: &Connection) -> rusqlite::Result<Vec<String>> {
        let mut stmt =
            conn.prepare("SELECT preview FROM posts WHERE user_id = ?1 AND preview IS NOT NULL")?;
        let mut files = stmt
            .query_map(params![self.id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        files.extend(self.avatar.clone());
        Ok(files)
    }
}

/// Public view of a user, without email or flags.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: i64,
    pub username: String,
    pub avatar: Option<String>,
    pub name: Option<String>,
    pub surname: Option<String>,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Profile {
            id: user.id,
            username: user.username,
            avatar: user.avatar,
            name: user.name,
            surname: user.surname,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub preview: Option<String>,
}

impl Post {
    pub fn find(conn: &Connection, id: i64) -> rusqlite::Result<Option<Post>> {
        conn.query_row(
            "SELECT id, user_id, title, text, created_at, preview FROM posts WHERE id = ?1",
            params![id],
            |row| {
                Ok(Post {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    text: row.get(3)?,
                    created_at: row.get(4)?,
                    preview: row.get(5)?,
                })
            },
        )
        .optional()
    }

    pub fn exists(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
    }
}

/// A post as the API returns it: with its author and aggregated rating.
#[derive(Debug, Clone, Serialize)]
pub struct PostOut {
    pub id: i64,
    pub title: String,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub preview: Option<String>,
    pub rating: i64,
    pub author: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn find(conn: &Connection, id: i64) -> rusqlite::Result<Option<Comment>> {
        conn.query_row(
            "SELECT id, user_id, post_id, text, created_at FROM comments WHERE id = ?1",
            params![id],
            |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    post_id: row.get(2)?,
                    text: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentOut {
    pub id: i64,
    pub user: User,
    pub post_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostLike {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    pub value: i64,
}

impl PostLike {
    pub fn for_post(conn: &Connection, post_id: i64) -> rusqlite::Result<Vec<PostLike>> {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, post_id, value FROM post_likes WHERE post_id = ?1 ORDER BY id",
        )?;
        let likes = stmt
            .query_map(params![post_id], |row| {
                Ok(PostLike {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    post_id: row.get(2)?,
                    value: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(likes)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSession {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TempCode {
    pub id: i64,
    pub code: String,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub expires_at: DateTime<Utc>,
}

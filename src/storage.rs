use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

use crate::models::{Comment, Follow, Group, Post, User};

const POST_COLUMNS: &str = "p.id, p.text, p.pub_date, p.author_id, \
     u.username AS author_username, p.group_id, g.slug AS group_slug, p.image";

// Async storage layer over a SQLx connection pool. Referential integrity
// (author/post cascades, group SET NULL, follow uniqueness) is enforced by
// the engine, not by application logic.
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database exists per connection; pin the pool to a
        // single connection so every query sees the same schema.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        Ok(Storage { pool })
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS groups (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY,
                text TEXT NOT NULL,
                pub_date TEXT NOT NULL,
                author_id INTEGER NOT NULL
                    REFERENCES users(id) ON DELETE CASCADE,
                group_id INTEGER
                    REFERENCES groups(id) ON DELETE SET NULL,
                image TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY,
                text TEXT NOT NULL,
                created TEXT NOT NULL,
                post_id INTEGER NOT NULL
                    REFERENCES posts(id) ON DELETE CASCADE,
                author_id INTEGER NOT NULL
                    REFERENCES users(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS follows (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL
                    REFERENCES users(id) ON DELETE CASCADE,
                author_id INTEGER NOT NULL
                    REFERENCES users(id) ON DELETE CASCADE,
                UNIQUE(user_id, author_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        // Listings are always newest-first
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_pub_date ON posts(pub_date)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_group ON posts(group_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // --- users ---

    pub async fn create_user(&self, username: &str) -> Result<User> {
        let result = sqlx::query("INSERT INTO users (username) VALUES (?)")
            .bind(username)
            .execute(&self.pool)
            .await?;

        Ok(User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
        })
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT id, username FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn delete_user(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // --- groups ---

    pub async fn create_group(&self, title: &str, slug: &str, description: &str) -> Result<Group> {
        let result = sqlx::query("INSERT INTO groups (title, slug, description) VALUES (?, ?, ?)")
            .bind(title)
            .bind(slug)
            .bind(description)
            .execute(&self.pool)
            .await?;

        Ok(Group {
            id: result.last_insert_rowid(),
            title: title.to_string(),
            slug: slug.to_string(),
            description: description.to_string(),
        })
    }

    pub async fn get_group_by_slug(&self, slug: &str) -> Result<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT id, title, slug, description FROM groups WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    pub async fn delete_group(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM groups WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // --- posts ---

    pub async fn create_post(
        &self,
        author_id: i64,
        text: &str,
        group_id: Option<i64>,
        image: Option<&str>,
    ) -> Result<Post> {
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO posts (text, pub_date, author_id, group_id, image) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(text)
        .bind(now)
        .bind(author_id)
        .bind(group_id)
        .bind(image)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_post_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("post {} vanished after insert", id))
    }

    /// Updates text and group; the stored image is replaced only when a new
    /// one is supplied.
    pub async fn update_post(
        &self,
        post_id: i64,
        text: &str,
        group_id: Option<i64>,
        image: Option<&str>,
    ) -> Result<()> {
        if let Some(image) = image {
            sqlx::query("UPDATE posts SET text = ?, group_id = ?, image = ? WHERE id = ?")
                .bind(text)
                .bind(group_id)
                .bind(image)
                .bind(post_id)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("UPDATE posts SET text = ?, group_id = ? WHERE id = ?")
                .bind(text)
                .bind(group_id)
                .bind(post_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn get_post_by_id(&self, id: i64) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "SELECT {} FROM posts p
             JOIN users u ON u.id = p.author_id
             LEFT JOIN groups g ON g.id = p.group_id
             WHERE p.id = ?",
            POST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    /// Lookup used by the single-post routes: the id must belong to the
    /// username in the path, otherwise the post does not exist there.
    pub async fn get_post(&self, username: &str, post_id: i64) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "SELECT {} FROM posts p
             JOIN users u ON u.id = p.author_id
             LEFT JOIN groups g ON g.id = p.group_id
             WHERE p.id = ? AND u.username = ?",
            POST_COLUMNS
        ))
        .bind(post_id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    pub async fn delete_post(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_posts(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("cnt"))
    }

    pub async fn list_posts(&self, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {} FROM posts p
             JOIN users u ON u.id = p.author_id
             LEFT JOIN groups g ON g.id = p.group_id
             ORDER BY p.pub_date DESC, p.id DESC LIMIT ? OFFSET ?",
            POST_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    pub async fn count_group_posts(&self, group_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM posts WHERE group_id = ?")
            .bind(group_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("cnt"))
    }

    pub async fn list_group_posts(
        &self,
        group_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {} FROM posts p
             JOIN users u ON u.id = p.author_id
             LEFT JOIN groups g ON g.id = p.group_id
             WHERE p.group_id = ?
             ORDER BY p.pub_date DESC, p.id DESC LIMIT ? OFFSET ?",
            POST_COLUMNS
        ))
        .bind(group_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    pub async fn count_author_posts(&self, author_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM posts WHERE author_id = ?")
            .bind(author_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("cnt"))
    }

    pub async fn list_author_posts(
        &self,
        author_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {} FROM posts p
             JOIN users u ON u.id = p.author_id
             LEFT JOIN groups g ON g.id = p.group_id
             WHERE p.author_id = ?
             ORDER BY p.pub_date DESC, p.id DESC LIMIT ? OFFSET ?",
            POST_COLUMNS
        ))
        .bind(author_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    // --- feed ---

    pub async fn count_feed_posts(&self, user_id: i64) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM posts p
             JOIN follows f ON f.author_id = p.author_id
             WHERE f.user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("cnt"))
    }

    /// Posts whose authors the given user follows, newest first.
    pub async fn list_feed_posts(&self, user_id: i64, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {} FROM posts p
             JOIN users u ON u.id = p.author_id
             LEFT JOIN groups g ON g.id = p.group_id
             JOIN follows f ON f.author_id = p.author_id
             WHERE f.user_id = ?
             ORDER BY p.pub_date DESC, p.id DESC LIMIT ? OFFSET ?",
            POST_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    // --- comments ---

    pub async fn create_comment(&self, post_id: i64, author_id: i64, text: &str) -> Result<Comment> {
        let now = Utc::now();

        let result =
            sqlx::query("INSERT INTO comments (text, created, post_id, author_id) VALUES (?, ?, ?, ?)")
                .bind(text)
                .bind(now)
                .bind(post_id)
                .bind(author_id)
                .execute(&self.pool)
                .await?;

        let id = result.last_insert_rowid();
        let comment = sqlx::query_as::<_, Comment>(
            "SELECT c.id, c.text, c.created, c.post_id, c.author_id,
                    u.username AS author_username
             FROM comments c JOIN users u ON u.id = c.author_id
             WHERE c.id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(comment)
    }

    pub async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT c.id, c.text, c.created, c.post_id, c.author_id,
                    u.username AS author_username
             FROM comments c JOIN users u ON u.id = c.author_id
             WHERE c.post_id = ? ORDER BY c.created ASC, c.id ASC",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    pub async fn count_comments(&self, post_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM comments WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("cnt"))
    }

    // --- follows ---

    /// Idempotent: the UNIQUE(user_id, author_id) constraint makes a second
    /// writer a no-op rather than a duplicate. Returns whether a row was
    /// actually inserted.
    pub async fn follow(&self, user_id: i64, author_id: i64) -> Result<bool> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO follows (user_id, author_id) VALUES (?, ?)")
                .bind(user_id)
                .bind(author_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn unfollow(&self, user_id: i64, author_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE user_id = ? AND author_id = ?")
            .bind(user_id)
            .bind(author_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_follow(&self, user_id: i64, author_id: i64) -> Result<Option<Follow>> {
        let follow = sqlx::query_as::<_, Follow>(
            "SELECT id, user_id, author_id FROM follows WHERE user_id = ? AND author_id = ?",
        )
        .bind(user_id)
        .bind(author_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(follow)
    }

    pub async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool> {
        Ok(self.get_follow(user_id, author_id).await?.is_some())
    }

    pub async fn following_count(&self, user_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM follows WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("cnt"))
    }
}

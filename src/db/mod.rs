use crate::error::{Error, Result};
use crate::models::{Choice, Poll, PollSummary, PollVotes, Tally};
use chrono::{DateTime, Utc};
use log::info;
use sqlx::{migrate::MigrateDatabase, sqlite::{SqlitePool, SqlitePoolOptions}, Row, Sqlite};

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::connect(db_url, 5).await
    }

    // An in-memory database lives in a single connection, so callers using
    // `sqlite::memory:` must pass `max_connections = 1`.
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            info!("Creating database at {}", db_url);
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT NOT NULL,
                pub_date TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS choices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                poll_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                text TEXT NOT NULL,
                votes INTEGER NOT NULL DEFAULT 0,
                UNIQUE (poll_id, position),
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Insert a poll with zero-vote choices in the given order.
    pub async fn create_poll(&self, question: &str, choices: &[&str]) -> Result<Poll> {
        let pub_date = Utc::now();
        let mut tx = self.pool.begin().await?;

        let poll_id = sqlx::query("INSERT INTO polls (question, pub_date) VALUES (?, ?)")
            .bind(question)
            .bind(pub_date.to_rfc3339())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        let mut stored = Vec::with_capacity(choices.len());
        for (i, text) in choices.iter().enumerate() {
            let id = sqlx::query(
                r#"
                INSERT INTO choices (poll_id, position, text, votes)
                VALUES (?, ?, ?, 0)
                "#,
            )
            .bind(poll_id)
            .bind(i as i64)
            .bind(*text)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            stored.push(Choice {
                id,
                poll_id,
                position: i as i64,
                text: text.to_string(),
                votes: 0,
            });
        }

        tx.commit().await?;

        Ok(Poll {
            id: poll_id,
            question: question.to_string(),
            pub_date,
            choices: stored,
        })
    }

    pub async fn get_poll(&self, poll_id: i64) -> Result<Option<Poll>> {
        let poll_row = sqlx::query("SELECT id, question, pub_date FROM polls WHERE id = ?")
            .bind(poll_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(poll_row) = poll_row else {
            return Ok(None);
        };

        let choices = self.get_choices(poll_id).await?;

        Ok(Some(Poll {
            id: poll_row.get::<i64, _>("id"),
            question: poll_row.get::<String, _>("question"),
            pub_date: parse_timestamp(&poll_row.get::<String, _>("pub_date"))?,
            choices,
        }))
    }

    pub async fn get_choices(&self, poll_id: i64) -> Result<Vec<Choice>> {
        let choices = sqlx::query(
            r#"
            SELECT id, poll_id, position, text, votes
            FROM choices
            WHERE poll_id = ?
            ORDER BY position
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| Choice {
            id: row.get::<i64, _>("id"),
            poll_id: row.get::<i64, _>("poll_id"),
            position: row.get::<i64, _>("position"),
            text: row.get::<String, _>("text"),
            votes: row.get::<i64, _>("votes"),
        })
        .collect();

        Ok(choices)
    }

    pub async fn list_polls(&self) -> Result<Vec<PollSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, question, pub_date
            FROM polls
            ORDER BY pub_date DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(PollSummary {
                    id: row.get("id"),
                    question: row.get("question"),
                    pub_date: parse_timestamp(&row.get::<String, _>("pub_date"))?,
                })
            })
            .collect()
    }

    /// Overwrite vote counts by position. Tallies without a matching choice
    /// are skipped and choices without a tally keep their count. Returns the
    /// number of choices updated.
    pub async fn apply_tallies(&self, poll_id: i64, tallies: &[Tally]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;

        for tally in tallies {
            let result = sqlx::query(
                r#"
                UPDATE choices
                SET votes = ?
                WHERE poll_id = ? AND position = ?
                "#,
            )
            .bind(tally.count)
            .bind(poll_id)
            .bind(tally.position as i64)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(updated)
    }

    pub async fn poll_votes(&self, poll_id: i64) -> Result<PollVotes> {
        let mut votes = PollVotes::default();
        for choice in self.get_choices(poll_id).await? {
            votes.choices.push(choice.text);
            votes.votes.push(choice.votes);
        }
        Ok(votes)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Database(sqlx::Error::Decode(Box::new(e))))
}

#[cfg(test)]
pub(crate) async fn memory_database() -> Database {
    Database::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory database")
}

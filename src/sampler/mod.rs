use crate::db::Database;
use crate::device::VoteSource;
use crate::error::{Error, Result};
use crate::models::{PollVotes, Tally};
use log::{debug, info, warn};
use std::sync::Arc;

/// Split a device line into positional tallies. Every token must be an
/// integer (negative and zero included); a single bad token rejects the line.
pub fn parse_tallies(line: &str) -> Result<Vec<Tally>> {
    line.trim_end()
        .split(',')
        .enumerate()
        .map(|(position, token)| {
            token
                .trim()
                .parse::<i64>()
                .map(|count| Tally { position, count })
                .map_err(|_| {
                    Error::Parse(format!("token {} ('{}') is not an integer", position, token))
                })
        })
        .collect()
}

/// Reads live tallies from the device and reconciles them into stored
/// vote counts.
pub struct Sampler {
    database: Arc<Database>,
    source: Arc<dyn VoteSource>,
    min_tallies: usize,
}

impl Sampler {
    pub fn new(database: Arc<Database>, source: Arc<dyn VoteSource>, min_tallies: usize) -> Self {
        Self {
            database,
            source,
            min_tallies,
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Sample the device once for `poll_id` and return the stored votes.
    ///
    /// Device and parse failures are logged and only skip the write; the
    /// stored counts are still returned. A line with fewer than
    /// `min_tallies` tokens is left unapplied. An unknown poll is
    /// `Error::PollNotFound`.
    pub async fn sample(&self, poll_id: i64) -> Result<PollVotes> {
        let tallies = match self.read_tallies().await {
            Ok(tallies) => Some(tallies),
            Err(e) if e.is_soft() => {
                warn!("Skipping vote update for poll {}: {}", poll_id, e);
                None
            }
            Err(e) => return Err(e),
        };

        let poll = self
            .database
            .get_poll(poll_id)
            .await?
            .ok_or(Error::PollNotFound(poll_id))?;

        match tallies {
            Some(tallies) if tallies.len() >= self.min_tallies => {
                if tallies.len() != poll.choices.len() {
                    debug!(
                        "Poll {} has {} choices but the device sent {} tallies",
                        poll_id,
                        poll.choices.len(),
                        tallies.len()
                    );
                }
                let updated = self.database.apply_tallies(poll_id, &tallies).await?;
                info!("Updated {} choice(s) of poll {} from device", updated, poll_id);
            }
            Some(tallies) => {
                debug!(
                    "Device sent {} tallies for poll {}, need at least {}; counts untouched",
                    tallies.len(),
                    poll_id,
                    self.min_tallies
                );
            }
            None => {}
        }

        self.database.poll_votes(poll_id).await
    }

    async fn read_tallies(&self) -> Result<Vec<Tally>> {
        let line = self.source.read_line().await?;
        debug!("Device line: {:?}", line);
        parse_tallies(&line)
    }
}

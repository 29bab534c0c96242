use super::message::decode_frame;
use crate::error::ScreenerError;
use crate::models::Tick;
use chrono::{DateTime, Utc};
use std::io::BufRead;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayStats {
    pub frames: u64,
    pub ticks: u64,
    pub malformed: u64,
    /// Earliest and latest tick timestamps seen
    pub first_tick: Option<DateTime<Utc>>,
    pub last_tick: Option<DateTime<Utc>>,
}

impl ReplayStats {
    /// Decode one line, updating the counters; `None` for blank or malformed lines
    fn decode_line(&mut self, line: &str) -> Option<Vec<Tick>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        self.frames += 1;
        match decode_frame(line) {
            Ok(ticks) => Some(ticks),
            Err(e) => {
                self.malformed += 1;
                tracing::warn!("Skipping frame {}: {}", self.frames, e);
                None
            }
        }
    }

    fn record(&mut self, tick: &Tick) {
        let ts = tick.timestamp;
        self.first_tick = Some(self.first_tick.map_or(ts, |first| first.min(ts)));
        self.last_tick = Some(self.last_tick.map_or(ts, |last| last.max(ts)));
        self.ticks += 1;
    }
}

/// Feed source replaying recorded socket frames, one JSON frame per line
pub struct ReplayFeed {
    path: PathBuf,
    pace: Option<Duration>,
}

impl ReplayFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pace: None,
        }
    }

    /// Sleep this long between frames instead of replaying as fast as possible
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    pub async fn run(
        &self,
        tx: mpsc::Sender<Tick>,
        cancel: CancellationToken,
    ) -> crate::Result<ReplayStats> {
        let file = File::open(&self.path).await?;
        tracing::info!("▶️  Replaying frames from {}", self.path.display());

        replay_frames(BufReader::new(file), tx, cancel, self.pace).await
    }
}

/// Decode frames line by line and push their ticks into the channel
///
/// Malformed frames are logged and skipped. Blank lines are ignored.
pub async fn replay_frames<R>(
    reader: R,
    tx: mpsc::Sender<Tick>,
    cancel: CancellationToken,
    pace: Option<Duration>,
) -> crate::Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ReplayStats::default();
    let mut lines = AsyncBufReadExt::lines(reader);

    while let Some(line) = lines.next_line().await? {
        if cancel.is_cancelled() {
            break;
        }

        let Some(ticks) = stats.decode_line(&line) else {
            continue;
        };

        for tick in ticks {
            stats.record(&tick);
            tx.send(tick).await.map_err(|_| ScreenerError::ChannelClosed)?;
        }

        if let Some(pace) = pace {
            sleep(pace).await;
        }
    }

    tracing::info!(
        "⏹️  Replay finished: {} frames, {} ticks, {} malformed",
        stats.frames,
        stats.ticks,
        stats.malformed
    );

    Ok(stats)
}

/// Read frames from a blocking reader on a detached OS thread
///
/// The thread is never joined, so a read that never returns (an idle stdin)
/// cannot hold up shutdown. It ends at EOF, when the channel closes, or at
/// the first line read after cancellation.
pub fn spawn_frame_reader<R>(
    reader: R,
    tx: mpsc::Sender<Tick>,
    cancel: CancellationToken,
) -> std::io::Result<()>
where
    R: BufRead + Send + 'static,
{
    std::thread::Builder::new()
        .name("frame-reader".to_string())
        .spawn(move || {
            let mut stats = ReplayStats::default();

            for line in BufRead::lines(reader) {
                if cancel.is_cancelled() {
                    break;
                }

                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::error!("Feed reader failed: {}", e);
                        break;
                    }
                };

                let Some(ticks) = stats.decode_line(&line) else {
                    continue;
                };

                for tick in ticks {
                    stats.record(&tick);
                    if tx.blocking_send(tick).is_err() {
                        tracing::debug!("Tick channel closed, stopping frame reader");
                        return;
                    }
                }
            }

            tracing::info!(
                "⏹️  Frame reader finished: {} frames, {} ticks, {} malformed",
                stats.frames,
                stats.ticks,
                stats.malformed
            );
        })?;

    Ok(())
}

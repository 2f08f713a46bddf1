//! Follows a growing log file from its current end and hands each appended line to the
//! coordinator.
//!
//! A tailer binds to one file for its whole life. If the game server rotates the chat log onto a
//! new file the tailer keeps watching the old one; there is no reopen or retry after an I/O error.

use std::{
    io,
    path::{
        Path,
        PathBuf,
    },
    time::{
        Duration,
        SystemTime,
    },
};

use futures::{
    Stream,
    StreamExt,
};
use tokio::{
    fs::File,
    io::{
        AsyncBufReadExt,
        AsyncSeekExt,
        BufReader,
    },
};

use crate::{
    coordinator::CoordinatorHandle,
    events::LogSource,
};

struct TailState {
    reader: BufReader<File>,
    /// Holds a line that has been partially written so far
    pending: Vec<u8>,
    poll_interval: Duration,
    failed: bool,
}

/// Opens `path`, seeks to the end and yields every non-blank line appended after that. At EOF the
/// stream waits `poll_interval` before trying again. The first I/O error is yielded and then the
/// stream ends.
pub async fn tail_lines(
    path: impl AsRef<Path>,
    poll_interval: Duration,
) -> io::Result<impl Stream<Item = io::Result<String>>> {
    let mut file = File::open(path.as_ref()).await?;
    file.seek(io::SeekFrom::End(0)).await?;

    let state = TailState {
        reader: BufReader::new(file),
        pending: Vec::new(),
        poll_interval,
        failed: false,
    };
    Ok(futures::stream::unfold(state, |mut state| async move {
        if state.failed {
            return None;
        }
        match next_line(&mut state).await {
            Ok(line) => Some((Ok(line), state)),
            Err(e) => {
                state.failed = true;
                Some((Err(e), state))
            }
        }
    }))
}

async fn next_line(state: &mut TailState) -> io::Result<String> {
    loop {
        let read = state.reader.read_until(b'\n', &mut state.pending).await?;
        if read == 0 {
            tokio::time::sleep(state.poll_interval).await;
            continue;
        }
        if state.pending.last() != Some(&b'\n') {
            // Writer hasn't finished the line yet
            continue;
        }
        let raw = std::mem::take(&mut state.pending);
        // Player names are not guaranteed to be valid UTF-8
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches(['\r', '\n']);
        if !line.trim().is_empty() {
            return Ok(line.to_string());
        }
    }
}

/// The most recently modified regular file in `dir`
pub fn latest_file_in(dir: impl AsRef<Path>) -> io::Result<PathBuf> {
    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified()?;
        if latest.as_ref().map_or(true, |(best, _)| modified > *best) {
            latest = Some((modified, entry.path()));
        }
    }
    latest.map(|(_, path)| path).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no log files in {}", dir.as_ref().display()),
        )
    })
}

/// Classifies every line from `lines` and forwards the events. Returns when the stream fails or
/// the coordinator is gone; either way only this tailer stops.
pub async fn run_tailer<S>(source: LogSource, lines: S, handle: CoordinatorHandle)
where
    S: Stream<Item = io::Result<String>>,
{
    futures::pin_mut!(lines);
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed reading {}: {}; tailer stopping", source, e);
                return;
            }
        };
        tracing::trace!("{}: {}", source, line);
        for event in source.classify(&line) {
            if handle.send(event).await.is_err() {
                tracing::warn!("Coordinator shut down; {} tailer stopping", source);
                return;
            }
        }
    }
}

/// Opens `path` and runs a tailer on it until it fails
pub async fn follow(
    source: LogSource,
    path: PathBuf,
    poll_interval: Duration,
    handle: CoordinatorHandle,
) {
    tracing::info!("Tailing {} at {}", source, path.display());
    match tail_lines(&path, poll_interval).await {
        Ok(lines) => run_tailer(source, lines, handle).await,
        Err(e) => tracing::error!("Failed to open {} {}: {}", source, path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tokio::sync::mpsc;

    use super::*;
    use crate::events::LogEvent;

    const POLL: Duration = Duration::from_millis(10);

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file.flush().unwrap();
    }

    #[tokio::test]
    async fn yields_only_lines_written_after_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        std::fs::write(&path, "old line\n").unwrap();

        let lines = tail_lines(&path, POLL).await.unwrap();
        futures::pin_mut!(lines);

        append(&path, "\n\nfirst\r\n   \nsec");
        let next = tokio::time::timeout(Duration::from_secs(5), lines.next()).await.unwrap();
        assert_eq!(next.unwrap().unwrap(), "first");

        append(&path, "ond\n");
        let next = tokio::time::timeout(Duration::from_secs(5), lines.next()).await.unwrap();
        assert_eq!(next.unwrap().unwrap(), "second");
    }

    #[tokio::test]
    async fn missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(tail_lines(dir.path().join("nope.log"), POLL).await.is_err());
    }

    #[test]
    fn picks_the_newest_file() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("chat-1.log");
        let new = dir.path().join("chat-2.log");
        std::fs::write(&old, "").unwrap();
        std::fs::write(&new, "").unwrap();
        std::fs::create_dir(dir.path().join("archive")).unwrap();

        let earlier = SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(earlier)
            .unwrap();

        assert_eq!(latest_file_in(dir.path()).unwrap(), new);
    }

    #[test]
    fn empty_dir_has_no_latest_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = latest_file_in(dir.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn forwards_classified_events_and_stops_on_error() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = CoordinatorHandle::from_sender(tx);
        let lines = futures::stream::iter(vec![
            Ok("LogWorld: SeamlessTravel to: Narva".to_string()),
            Ok("LogNet: nothing to see".to_string()),
            Err(io::Error::new(io::ErrorKind::Other, "disk gone")),
            Ok("LogWorld: SeamlessTravel to: Gorodok".to_string()),
        ]);

        run_tailer(LogSource::Server, lines, handle).await;

        assert_eq!(rx.recv().await, Some(LogEvent::RoundTransition));
        assert_eq!(rx.recv().await, None);
    }
}

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use log::debug;
use std::io::{ErrorKind, Read};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Anything that can hand the sampler one line of comma-separated tallies.
#[async_trait]
pub trait VoteSource: Send + Sync {
    async fn read_line(&self) -> Result<String>;
}

/// Opens the device at `(path, baud_rate, timeout)` for one read.
type PortOpener = dyn Fn(&str, u32, Duration) -> Result<Box<dyn Read + Send>> + Send + Sync;

/// The Arduino on a serial port. The port is opened for each read and closed
/// when the read finishes. The lock is held by the blocking reader itself, so
/// a caller that gives up early cannot let the next one open the device
/// while the previous read is still using it.
pub struct SerialVoteSource {
    path: String,
    baud_rate: u32,
    timeout: Duration,
    lock: Arc<Mutex<()>>,
    opener: Arc<PortOpener>,
}

impl SerialVoteSource {
    pub fn new(path: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            timeout,
            lock: Arc::new(Mutex::new(())),
            opener: Arc::new(open_serial),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.serial_port.clone(), config.baud_rate, config.read_timeout)
    }

    #[cfg(test)]
    fn with_opener<F>(timeout: Duration, opener: F) -> Self
    where
        F: Fn(&str, u32, Duration) -> Result<Box<dyn Read + Send>> + Send + Sync + 'static,
    {
        Self {
            opener: Arc::new(opener),
            ..Self::new("/dev/ttyTEST0", 115200, timeout)
        }
    }
}

fn open_serial(path: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn Read + Send>> {
    let port = serialport::new(path, baud_rate).timeout(timeout).open()?;
    debug!("Opened serial port {} at {} baud", path, baud_rate);
    Ok(Box::new(port))
}

#[async_trait]
impl VoteSource for SerialVoteSource {
    async fn read_line(&self) -> Result<String> {
        let lock = Arc::clone(&self.lock);
        let opener = Arc::clone(&self.opener);
        let path = self.path.clone();
        let baud_rate = self.baud_rate;
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            let _guard = lock
                .lock()
                .map_err(|_| Error::Device("serial port lock poisoned".to_string()))?;
            let mut port = opener(&path, baud_rate, timeout)?;
            read_line_from(&mut port, timeout)
            // port closes before the guard is released
        })
        .await
        .map_err(|e| Error::Device(format!("serial reader task failed: {}", e)))?
    }
}

/// Read up to and including the first `\n`, giving up once `budget` has
/// elapsed or the reader times out. Whatever was read by then is returned
/// with trailing whitespace removed, so a silent device yields `""`.
pub fn read_line_from<R: Read + ?Sized>(reader: &mut R, budget: Duration) -> Result<String> {
    let deadline = Instant::now() + budget;
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
        if Instant::now() >= deadline {
            break;
        }
    }

    let text = String::from_utf8(line)
        .map_err(|e| Error::Device(format!("device sent invalid UTF-8: {}", e)))?;
    Ok(text.trim_end().to_string())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BUDGET: Duration = Duration::from_secs(1);

    /// Port double that decrements the open count when closed.
    struct TrackedPort {
        data: Cursor<Vec<u8>>,
        open: Arc<AtomicUsize>,
    }

    impl Read for TrackedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.data.read(buf)
        }
    }

    impl Drop for TrackedPort {
        fn drop(&mut self) {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct Tracked {
        source: Arc<SerialVoteSource>,
        opens: Arc<AtomicUsize>,
        overlaps: Arc<AtomicUsize>,
    }

    // Each open takes `hold` before the port answers.
    fn tracked_source(hold: Duration) -> Tracked {
        let open = Arc::new(AtomicUsize::new(0));
        let opens = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let (open_c, opens_c, overlaps_c) = (open.clone(), opens.clone(), overlaps.clone());
        let source = SerialVoteSource::with_opener(BUDGET, move |_, _, _| {
            opens_c.fetch_add(1, Ordering::SeqCst);
            if open_c.fetch_add(1, Ordering::SeqCst) > 0 {
                overlaps_c.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(hold);
            let port = TrackedPort {
                data: Cursor::new(b"1,2,3,4,5\n".to_vec()),
                open: open_c.clone(),
            };
            Ok(Box::new(port) as Box<dyn Read + Send>)
        });

        Tracked {
            source: Arc::new(source),
            opens,
            overlaps,
        }
    }

    struct TimesOutAfter {
        data: Cursor<Vec<u8>>,
    }

    impl Read for TimesOutAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(ErrorKind::TimedOut, "timed out")),
                n => Ok(n),
            }
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::BrokenPipe, "device unplugged"))
        }
    }

    #[test]
    fn reads_a_single_line_and_strips_it() {
        let mut input = Cursor::new(b"1,2,3,4,5\r\n6,7,8\n".to_vec());
        assert_eq!(read_line_from(&mut input, BUDGET).unwrap(), "1,2,3,4,5");
        assert_eq!(read_line_from(&mut input, BUDGET).unwrap(), "6,7,8");
    }

    #[test]
    fn timeout_returns_partial_line() {
        let mut input = TimesOutAfter {
            data: Cursor::new(b"10,20".to_vec()),
        };
        assert_eq!(read_line_from(&mut input, BUDGET).unwrap(), "10,20");
    }

    #[test]
    fn silent_device_yields_empty_line() {
        let mut input = TimesOutAfter {
            data: Cursor::new(Vec::new()),
        };
        assert_eq!(read_line_from(&mut input, BUDGET).unwrap(), "");
    }

    #[test]
    fn read_failure_is_a_device_error() {
        let err = read_line_from(&mut Broken, BUDGET).unwrap_err();
        assert!(matches!(err, Error::Device(_)));
    }

    #[test]
    fn invalid_utf8_is_a_device_error() {
        let mut input = Cursor::new(vec![0xff, 0xfe, b'\n']);
        assert!(matches!(read_line_from(&mut input, BUDGET), Err(Error::Device(_))));
    }

    #[tokio::test]
    async fn missing_serial_port_is_a_device_error() {
        let source =
            SerialVoteSource::new("/dev/voteino-does-not-exist", 115200, Duration::from_millis(10));
        let err = source.read_line().await.unwrap_err();
        assert!(matches!(err, Error::Device(_)), "unexpected error: {:?}", err);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_reads_take_turns() {
        let tracked = tracked_source(Duration::from_millis(50));

        let (first, second) =
            tokio::join!(tracked.source.read_line(), tracked.source.read_line());
        assert_eq!(first.unwrap(), "1,2,3,4,5");
        assert_eq!(second.unwrap(), "1,2,3,4,5");
        assert_eq!(tracked.opens.load(Ordering::SeqCst), 2);
        assert_eq!(tracked.overlaps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandoned_read_holds_the_port_until_it_finishes() {
        let tracked = tracked_source(Duration::from_millis(100));

        let source = Arc::clone(&tracked.source);
        let first = tokio::spawn(async move { source.read_line().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        first.abort();

        assert_eq!(tracked.source.read_line().await.unwrap(), "1,2,3,4,5");
        assert_eq!(tracked.opens.load(Ordering::SeqCst), 2);
        assert_eq!(tracked.overlaps.load(Ordering::SeqCst), 0);
    }
}

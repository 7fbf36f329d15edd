use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Size at which the log file is rotated.
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
/// Number of rotated log files kept next to the live one.
pub const LOG_BACKUPS: usize = 3;

/// How logging is set up for one run. Built once from the command line and
/// installed with `init` before any work starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogConfig {
    pub level: Level,
    /// `None` means console only.
    pub file: Option<PathBuf>,
    pub max_bytes: u64,
    pub backups: usize,
}

impl LogConfig {
    pub fn new(verbose: bool, file: Option<PathBuf>) -> Self {
        Self {
            level: if verbose { Level::DEBUG } else { Level::INFO },
            file,
            max_bytes: MAX_LOG_BYTES,
            backups: LOG_BACKUPS,
        }
    }

    /// Builds the subscriber: human readable lines on stderr, plus the rotating
    /// log file when one is configured. Without `--verbose`, `RUST_LOG` may
    /// still override the default level.
    pub fn subscriber(&self) -> Result<impl Subscriber + Send + Sync + 'static, anyhow::Error> {
        let filter = if self.level == Level::DEBUG {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        };
        let file_layer = match &self.file {
            Some(path) => {
                let file = RotatingFile::open(path, self.max_bytes, self.backups)?;
                Some(
                    fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
            }
            None => None,
        };
        Ok(tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr))
            .with(file_layer))
    }

    /// Installs `subscriber` as the global default.
    pub fn init(&self) -> Result<(), anyhow::Error> {
        self.subscriber()?.try_init()?;
        Ok(())
    }
}

/// Log file name derived from the program name, e.g. `loan-aggregate.log`.
pub(crate) fn default_log_file() -> PathBuf {
    let program = std::env::args_os()
        .next()
        .as_deref()
        .map(Path::new)
        .and_then(Path::file_stem)
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from(env!("CARGO_PKG_NAME")));
    let mut name = program;
    name.push(".log");
    PathBuf::from(name)
}

/// Append-only file that rolls over once it would grow past `max_bytes`:
/// `app.log` becomes `app.log.1`, `app.log.1` becomes `app.log.2` and so on,
/// the oldest backup being dropped. A `max_bytes` of zero disables rotation.
#[derive(Debug)]
pub(crate) struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    backups: usize,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            written,
            max_bytes,
            backups,
        })
    }

    fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups > 0 {
            for n in (1..self.backups).rev() {
                let src = self.backup_path(n);
                if src.exists() {
                    fs::rename(&src, self.backup_path(n + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
        }
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.max_bytes > 0
            && self.written > 0
            && self.written + buf.len() as u64 > self.max_bytes
        {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

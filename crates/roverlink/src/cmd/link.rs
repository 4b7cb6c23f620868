//! Setup shared by the `rover` and `station` commands.

use std::path::Path;
use std::time::{Duration, Instant};

use roverlink_link::{LinkConfig, LinkContext};
use roverlink_transport::{CancelToken, LinkStream, TcpEndpoint, TransportError};
use tracing::info;

use crate::cmd::{ConnectLinkArgs, ListenLinkArgs};
use crate::exit::{link_error, transport_error, CliError, CliResult, INTERNAL, TIMEOUT, USAGE};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn load_config(path: Option<&Path>, default: LinkConfig) -> CliResult<LinkConfig> {
    match path {
        Some(path) => {
            let config = LinkConfig::load(path)
                .map_err(|err| link_error(&format!("load {}", path.display()), err))?;
            info!(path = %path.display(), topics = config.topics.len(), "config loaded");
            Ok(config)
        }
        None => Ok(default),
    }
}

pub fn open_listen(args: &ListenLinkArgs, read_timeout: Duration) -> CliResult<LinkStream> {
    if let Some(path) = &args.serial {
        return open_serial(path, args.baud, read_timeout);
    }
    let addr = args
        .listen
        .ok_or_else(|| CliError::new(USAGE, "either --listen or --serial is required"))?;
    TcpEndpoint::listen(addr).map_err(|err| transport_error("listen", err))
}

pub fn open_connect(args: &ConnectLinkArgs, read_timeout: Duration) -> CliResult<LinkStream> {
    if let Some(path) = &args.serial {
        return open_serial(path, args.baud, read_timeout);
    }
    let addr = args
        .connect
        .ok_or_else(|| CliError::new(USAGE, "either --connect or --serial is required"))?;
    let timeout = parse_duration(&args.connect_timeout)?;

    let start = Instant::now();
    loop {
        match TcpEndpoint::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                if !is_retryable_connect_error(&err) {
                    return Err(transport_error("connect failed", err));
                }
                if start.elapsed() >= timeout {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("connect to {addr} timed out after {timeout:?}"),
                    ));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

fn is_retryable_connect_error(err: &TransportError) -> bool {
    match err {
        TransportError::Connect { source, .. } => {
            source.kind() == std::io::ErrorKind::ConnectionRefused
                || source.kind() == std::io::ErrorKind::NotFound
        }
        _ => false,
    }
}

#[cfg(feature = "serial")]
fn open_serial(path: &str, baud: u32, read_timeout: Duration) -> CliResult<LinkStream> {
    roverlink_transport::SerialEndpoint::open(path, baud, read_timeout)
        .map_err(|err| transport_error("serial", err))
}

#[cfg(not(feature = "serial"))]
fn open_serial(path: &str, _baud: u32, _read_timeout: Duration) -> CliResult<LinkStream> {
    Err(CliError::new(
        USAGE,
        format!("cannot open {path}: built without the `serial` feature"),
    ))
}

pub fn install_ctrlc_handler(cancel: CancelToken) -> CliResult<()> {
    ctrlc::set_handler(move || cancel.cancel()).map_err(|err| {
        CliError::new(INTERNAL, format!("failed to install Ctrl-C handler: {err}"))
    })
}

/// Block until the link stops or `limit` elapses, then stop the link.
pub fn wait_for_shutdown(context: &LinkContext, limit: Option<Duration>) {
    let start = Instant::now();
    while context.is_running() {
        if limit.is_some_and(|limit| start.elapsed() >= limit) {
            info!("run duration elapsed");
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    context.shutdown();
}

/// Parse "5s", "150ms" or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_duration_millis() {
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_duration_invalid() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("bad").unwrap_err().code, USAGE);
        assert_eq!(parse_duration(" ").unwrap_err().code, USAGE);
    }

    #[test]
    fn refused_connect_is_retried() {
        let err = TransportError::Connect {
            addr: "127.0.0.1:1".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert!(is_retryable_connect_error(&err));
        assert!(!is_retryable_connect_error(&TransportError::Shutdown));
    }

    #[test]
    fn missing_config_file_fails() {
        let err = load_config(
            Some(Path::new("/nonexistent/roverlink.json")),
            LinkConfig::station(),
        )
        .unwrap_err();
        assert_ne!(err.code, 0);
    }

    #[cfg(not(feature = "serial"))]
    #[test]
    fn serial_without_feature_is_usage_error() {
        let args = ListenLinkArgs {
            listen: None,
            serial: Some("/dev/ttyUSB0".into()),
            baud: 57_600,
        };
        let err = open_listen(&args, Duration::from_millis(100)).unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}

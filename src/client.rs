//! Sensor-stream ingestion.
//!
//! The GPS/Flarm source is a TCP line stream (a serial bridge or a
//! Bluetooth daemon exposing the dataport). The client owns the only
//! blocking operation in the core: it reads lines with a timeout and
//! hands them to the caller synchronously, so all downstream evaluation
//! stays on one thread. Connection loss is never fatal; it surfaces as a
//! device-health event and the client reconnects with exponential
//! backoff until the bounded retry budget is spent.

use anyhow::{Result, anyhow};
use chrono::Utc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use chrono::DateTime;

/// Result type for connection attempts
enum ConnectionResult {
    /// Connection failed immediately (couldn't establish connection)
    ConnectionFailed(anyhow::Error),
    /// Connection was established but failed or ended during operation
    OperationFailed(anyhow::Error),
}

/// Device-health transitions for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Could not reach the device; a reconnect attempt follows
    Unreachable { error: String },
    /// A connection is up again after at least one failure
    Reconnected,
    /// The stream ended mid-session: the bridge daemon went away
    DaemonCrashed,
}

/// Configuration for the sensor-stream client
#[derive(Debug, Clone)]
pub struct DeviceClientConfig {
    pub host: String,
    pub port: u16,
    /// No line for this long counts as a dead connection
    pub read_timeout: Duration,
    /// Initial delay between reconnection attempts (exponential backoff)
    pub retry_delay_seconds: u64,
    /// Cap for the exponential backoff
    pub max_retry_delay_seconds: u64,
    /// Consecutive failed connection attempts before giving up
    pub max_retries: u32,
}

impl Default for DeviceClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4353,
            read_timeout: Duration::from_secs(10),
            retry_delay_seconds: 1,
            max_retry_delay_seconds: 60,
            max_retries: 30,
        }
    }
}

impl DeviceClientConfig {
    pub fn from_config(device: &crate::config::DeviceConfig) -> Self {
        Self {
            host: device.host.clone(),
            port: device.port,
            read_timeout: Duration::from_secs(device.read_timeout_seconds),
            retry_delay_seconds: device.retry_delay_seconds,
            max_retry_delay_seconds: device.max_retry_delay_seconds,
            max_retries: device.max_retries,
        }
    }
}

/// TCP client feeding raw sentences into the instrument core
pub struct DeviceClient {
    config: DeviceClientConfig,
}

impl DeviceClient {
    pub fn new(config: DeviceClientConfig) -> Self {
        Self { config }
    }

    /// Connect and run until the retry budget is spent. Every complete
    /// line is passed to `on_line` with its receive timestamp; health
    /// transitions go to `on_event`.
    pub async fn run<L, E>(&self, mut on_line: L, mut on_event: E) -> Result<()>
    where
        L: FnMut(&str, DateTime<Utc>),
        E: FnMut(DeviceEvent),
    {
        let mut retry_count: u32 = 0;
        let mut current_delay = self.config.retry_delay_seconds;
        let mut had_failure = false;

        loop {
            if retry_count == 0 {
                info!(
                    "Connecting to sensor device at {}:{}",
                    self.config.host, self.config.port
                );
            } else {
                info!(
                    "Reconnecting to sensor device at {}:{} (retry attempt {})",
                    self.config.host, self.config.port, retry_count
                );
            }

            let result = self
                .connect_and_run(&mut on_line, &mut on_event, had_failure)
                .await;

            match result {
                ConnectionResult::ConnectionFailed(e) => {
                    warn!("Device connection failed: {e}");
                    metrics::counter!("vario.device.connection_failed_total").increment(1);
                    on_event(DeviceEvent::Unreachable {
                        error: e.to_string(),
                    });
                    retry_count += 1;
                    had_failure = true;
                }
                ConnectionResult::OperationFailed(e) => {
                    warn!("Device stream ended: {e}");
                    metrics::counter!("vario.device.stream_failed_total").increment(1);
                    // A stream that was up and died means the bridge went
                    // away, not that the device is out of range
                    on_event(DeviceEvent::DaemonCrashed);
                    retry_count = 1;
                    current_delay = self.config.retry_delay_seconds;
                    had_failure = true;
                }
            }

            if retry_count > self.config.max_retries {
                return Err(anyhow!(
                    "giving up on {}:{} after {} attempts",
                    self.config.host,
                    self.config.port,
                    self.config.max_retries
                ));
            }

            if current_delay > 0 {
                debug!("Waiting {current_delay} seconds before retry");
                tokio::time::sleep(Duration::from_secs(current_delay)).await;
                current_delay = std::cmp::min(current_delay * 2, self.config.max_retry_delay_seconds);
            }
        }
    }

    async fn connect_and_run<L, E>(
        &self,
        on_line: &mut L,
        on_event: &mut E,
        had_failure: bool,
    ) -> ConnectionResult
    where
        L: FnMut(&str, DateTime<Utc>),
        E: FnMut(DeviceEvent),
    {
        let address = format!("{}:{}", self.config.host, self.config.port);

        // Resolve and try every address, preferring IPv4; the Bluetooth
        // bridges we talk to rarely bind v6
        let socket_addrs = match tokio::net::lookup_host(&address).await {
            Ok(addrs) => {
                let all_addrs: Vec<_> = addrs.collect();
                if all_addrs.is_empty() {
                    return ConnectionResult::ConnectionFailed(anyhow!(
                        "DNS resolution returned no addresses for {address}"
                    ));
                }
                let ipv4: Vec<_> = all_addrs.iter().filter(|a| a.is_ipv4()).cloned().collect();
                if ipv4.is_empty() { all_addrs } else { ipv4 }
            }
            Err(e) => {
                return ConnectionResult::ConnectionFailed(anyhow!(
                    "DNS resolution failed for {address}: {e}"
                ));
            }
        };

        let mut shuffled_addrs = socket_addrs;
        {
            use rand::seq::SliceRandom;
            let mut rng = rand::rng();
            shuffled_addrs.shuffle(&mut rng);
        }

        let mut last_error = None;
        for addr in &shuffled_addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    info!("Connected to sensor device at {addr}");
                    metrics::counter!("vario.device.connection_established_total").increment(1);
                    if had_failure {
                        on_event(DeviceEvent::Reconnected);
                    }
                    return self.process_connection(stream, on_line).await;
                }
                Err(e) => {
                    debug!("Failed to connect to {addr}: {e}");
                    last_error = Some(e);
                }
            }
        }

        ConnectionResult::ConnectionFailed(anyhow!(
            "failed to connect to any resolved address for {address}: {last_error:?}"
        ))
    }

    async fn process_connection<L>(&self, stream: TcpStream, on_line: &mut L) -> ConnectionResult
    where
        L: FnMut(&str, DateTime<Utc>),
    {
        let mut reader = BufReader::new(stream);
        let mut line_buffer = Vec::new();

        loop {
            line_buffer.clear();

            let read_result = timeout(
                self.config.read_timeout,
                reader.read_until(b'\n', &mut line_buffer),
            )
            .await;

            match read_result {
                Ok(Ok(0)) => {
                    return ConnectionResult::OperationFailed(anyhow!(
                        "connection closed by the device bridge"
                    ));
                }
                Ok(Ok(_)) => {
                    // Receive time is captured here so downstream staleness
                    // checks see when the line actually arrived
                    let received_at = Utc::now();
                    metrics::counter!("vario.device.lines_received_total").increment(1);

                    let line = match std::str::from_utf8(&line_buffer) {
                        Ok(line) => line,
                        Err(_) => {
                            debug!("Invalid UTF-8 on the sensor stream, skipping line");
                            continue;
                        }
                    };

                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    trace!("Received: {trimmed}");
                    on_line(trimmed, received_at);
                }
                Ok(Err(e)) => {
                    return ConnectionResult::OperationFailed(anyhow!("read error: {e}"));
                }
                Err(_) => {
                    return ConnectionResult::OperationFailed(anyhow!(
                        "no data for {:?}, device considered dead",
                        self.config.read_timeout
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_lines_reach_the_handler() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"$PGRMZ,1000,f,3*2D\r\n$GPXXX,noise*00\r\n")
                .await
                .unwrap();
            socket.flush().await.unwrap();
            // Dropping the socket ends the stream
        });

        let client = DeviceClient::new(DeviceClientConfig {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
            read_timeout: Duration::from_secs(2),
            retry_delay_seconds: 0,
            max_retry_delay_seconds: 0,
            max_retries: 0,
            ..Default::default()
        });

        let mut lines = Vec::new();
        let mut events = Vec::new();
        let result = client
            .run(
                |line, _at| lines.push(line.to_string()),
                |event| events.push(event),
            )
            .await;

        // The stream ended and the retry budget (0) is spent
        assert!(result.is_err());
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("$PGRMZ"));
        assert_eq!(events, vec![DeviceEvent::DaemonCrashed]);
    }

    #[tokio::test]
    async fn test_unreachable_device_surfaces_event_and_gives_up() {
        // Port 1 on localhost is essentially guaranteed closed
        let client = DeviceClient::new(DeviceClientConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            read_timeout: Duration::from_secs(1),
            retry_delay_seconds: 0,
            max_retry_delay_seconds: 0,
            max_retries: 2,
            ..Default::default()
        });

        let mut events = Vec::new();
        let result = client.run(|_, _| {}, |event| events.push(event)).await;

        assert!(result.is_err());
        assert_eq!(events.len(), 3); // initial attempt + 2 retries
        assert!(matches!(events[0], DeviceEvent::Unreachable { .. }));
    }
}

#[cfg(target_os = "linux")]
use std::fs;
#[cfg(target_os = "linux")]
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpConnectionCounts {
    pub established: usize,
    pub listening: usize,
}

const TCP_ESTABLISHED: &str = "01";
const TCP_LISTEN: &str = "0A";

#[cfg(target_os = "linux")]
pub fn count_tcp_connections() -> TcpConnectionCounts {
    let mut counts = TcpConnectionCounts::default();
    for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
        match fs::read_to_string(table) {
            Ok(text) => {
                let parsed = parse_tcp_table(&text);
                counts.established += parsed.established;
                counts.listening += parsed.listening;
            }
            Err(err) => debug!(table, error = %err, "tcp table unavailable"),
        }
    }
    counts
}

#[cfg(not(target_os = "linux"))]
pub fn count_tcp_connections() -> TcpConnectionCounts {
    TcpConnectionCounts::default()
}

/// Counts socket states in the `/proc/net/tcp` format. States other than
/// established and listen are ignored.
pub fn parse_tcp_table(text: &str) -> TcpConnectionCounts {
    let mut counts = TcpConnectionCounts::default();
    for line in text.lines().skip(1) {
        let Some(state) = line.split_whitespace().nth(3) else {
            continue;
        };
        if state.eq_ignore_ascii_case(TCP_ESTABLISHED) {
            counts.established += 1;
        } else if state.eq_ignore_ascii_case(TCP_LISTEN) {
            counts.listening += 1;
        }
    }
    counts
}

//! Command-line arguments.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use toolcall_http::{LimitsConfig, TimeoutConfig, TlsConfig};

/// Talk to an MCP server over HTTP/SSE or a child process.
#[derive(Parser, Debug)]
#[command(
    name = "toolcall",
    version,
    about = "Minimal MCP client - list and call tools over SSE or stdio",
    long_about = "Connects to an MCP server, runs the initialize handshake and issues one command.\n\n\
                  SECURITY WARNINGS:\n\
                  - --command executes a program on your system; only run trusted servers\n\
                  - Tokens passed via --auth or TOOLCALL_AUTH may end up in shell history"
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) action: Commands,

    #[command(flatten)]
    pub(crate) conn: Connection,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    pub(crate) verbose: bool,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Show the server identity and capabilities
    Info,

    /// Round-trip a ping
    Ping,

    /// List available tools
    Tools,

    /// Call a tool
    Call {
        /// Tool name
        name: String,

        /// Arguments as JSON object
        #[arg(long, short = 'a', default_value = "{}")]
        arguments: String,
    },
}

/// Where the server lives.
#[derive(Args, Debug)]
pub(crate) struct Connection {
    /// SSE stream URL
    #[arg(long, env = "TOOLCALL_URL", default_value = "http://localhost:8080/sse", global = true)]
    pub(crate) url: String,

    /// Server command for stdio transport (overrides --url)
    #[arg(long, env = "TOOLCALL_COMMAND", global = true)]
    pub(crate) command: Option<String>,

    /// Bearer token sent on every SSE request
    #[arg(long, env = "TOOLCALL_AUTH", global = true)]
    pub(crate) auth: Option<String>,

    /// Timeout profile
    #[arg(long, value_enum, default_value = "default", global = true)]
    pub(crate) timeouts: TimeoutPreset,

    /// Request timeout in seconds (overrides the profile)
    #[arg(long, global = true)]
    pub(crate) timeout: Option<u64>,

    /// Accept TLS 1.2 servers
    #[arg(long, global = true)]
    pub(crate) tls12: bool,

    /// Skip certificate validation (also needs TOOLCALL_ALLOW_INSECURE_TLS=1)
    #[arg(long, global = true)]
    pub(crate) insecure: bool,

    /// Do not bound message sizes
    #[arg(long, global = true)]
    pub(crate) no_limits: bool,
}

impl Connection {
    pub(crate) fn timeouts(&self) -> TimeoutConfig {
        let mut timeouts = match self.timeouts {
            TimeoutPreset::Default => TimeoutConfig::default(),
            TimeoutPreset::Fast => TimeoutConfig::fast(),
            TimeoutPreset::Patient => TimeoutConfig::patient(),
            TimeoutPreset::Unlimited => TimeoutConfig::unlimited(),
        };
        if let Some(secs) = self.timeout {
            timeouts.request = Some(Duration::from_secs(secs));
        }
        timeouts
    }

    pub(crate) fn tls(&self) -> TlsConfig {
        if self.insecure {
            TlsConfig::insecure()
        } else if self.tls12 {
            TlsConfig::compatible()
        } else {
            TlsConfig::default()
        }
    }

    pub(crate) fn limits(&self) -> LimitsConfig {
        if self.no_limits {
            LimitsConfig::unlimited()
        } else {
            LimitsConfig::default()
        }
    }
}

/// Timeout profiles
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub(crate) enum TimeoutPreset {
    /// 30s connect, 60s per request
    Default,
    /// Short timeouts, idle streams are reconnected after 30s
    Fast,
    /// Five minutes per request, for slow tools
    Patient,
    /// Requests never time out
    Unlimited,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_call_arguments() {
        let cli = Cli::try_parse_from([
            "toolcall",
            "--command",
            "weather-server --stdio",
            "call",
            "forecast",
            "-a",
            r#"{"city":"Oslo"}"#,
        ])
        .unwrap();
        assert_eq!(cli.conn.command.as_deref(), Some("weather-server --stdio"));
        let Commands::Call { name, arguments } = cli.action else {
            panic!("expected call, got {:?}", cli.action);
        };
        assert_eq!(name, "forecast");
        assert_eq!(arguments, r#"{"city":"Oslo"}"#);
    }

    #[test]
    fn test_connection_presets() {
        let cli = Cli::try_parse_from([
            "toolcall",
            "--timeouts",
            "patient",
            "--tls12",
            "--no-limits",
            "tools",
        ])
        .unwrap();
        assert_eq!(cli.conn.timeouts(), TimeoutConfig::patient());
        assert_eq!(cli.conn.tls(), TlsConfig::compatible());
        assert_eq!(cli.conn.limits(), LimitsConfig::unlimited());

        let cli =
            Cli::try_parse_from(["toolcall", "--timeouts", "fast", "--timeout", "5", "--insecure", "ping"])
                .unwrap();
        assert_eq!(cli.conn.timeouts().request, Some(Duration::from_secs(5)));
        assert_eq!(cli.conn.timeouts().connect, TimeoutConfig::fast().connect);
        assert!(cli.conn.tls().is_insecure());

        let cli = Cli::try_parse_from(["toolcall", "--timeouts", "unlimited", "info"]).unwrap();
        assert_eq!(cli.conn.timeouts().request, None);
        assert_eq!(cli.conn.limits(), LimitsConfig::default());
    }
}

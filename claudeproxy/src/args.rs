use clap::Parser;

/// Local translation proxy: Anthropic messages in, chat completions out
#[derive(Debug, Parser)]
#[command(name = "claudeproxy", version, about = "Claude Code proxy for xAI and Groq backends")]
pub struct Args {
    /// Backend adapter to run
    #[arg(long, env = "CLAUDEPROXY_ADAPTER")]
    pub adapter: String,

    /// Loopback port to listen on (default 5000 for xai, 5003 for groq)
    #[arg(long, env = "CLAUDEPROXY_PORT")]
    pub port: Option<u16>,
}

use clap::Parser;
use hevc_rtsp::{OverflowStrategy, Server, ServerConfig};
use std::io;

#[derive(Parser)]
#[command(
    name = "hevc-rtsp-server",
    about = "Standalone RTSP server for H.265 streams"
)]
struct Args {
    /// RTSP control port
    #[arg(long, short, default_value_t = 8554)]
    port: u16,

    /// Stream path to publish under
    #[arg(long, default_value = "live")]
    path: String,

    /// Disable UDP media delivery
    #[arg(long)]
    no_udp: bool,

    /// Disable interleaved TCP media delivery
    #[arg(long)]
    no_tcp: bool,

    /// Maximum concurrent viewers per path
    #[arg(long, default_value_t = 100)]
    max_clients: usize,

    /// Admission behavior at the viewer limit: reject, kick-oldest, ignore
    #[arg(long, default_value = "reject", value_parser = parse_strategy)]
    overflow: OverflowStrategy,

    /// Server name announced in responses
    #[arg(long, default_value = "hevc-rtsp/0.1")]
    server_name: String,

    /// Log full RTSP request/response text
    #[arg(long)]
    protocol_log: bool,
}

fn parse_strategy(value: &str) -> Result<OverflowStrategy, String> {
    match value {
        "reject" => Ok(OverflowStrategy::Reject),
        "kick-oldest" => Ok(OverflowStrategy::KickOldest),
        "ignore" => Ok(OverflowStrategy::Ignore),
        other => Err(format!(
            "unknown strategy {:?} (expected reject, kick-oldest, or ignore)",
            other
        )),
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = ServerConfig {
        port: args.port,
        udp_enable: !args.no_udp,
        tcp_enable: !args.no_tcp,
        protocol_log: args.protocol_log,
        max_clients_per_path: args.max_clients,
        overflow_strategy: args.overflow,
        server_name: args.server_name,
    };

    let mut server = Server::new(config);
    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return;
    }
    server.add_stream(&args.path);

    println!(
        "RTSP server on rtsp://0.0.0.0:{}/{} — press Enter to stop",
        args.port, args.path
    );
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();

    server.stop();
}

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use log::LevelFilter;
use simplelog::{Config, TermLogger, TerminalMode};

use chit_voice_signaling_server::router;
use chit_voice_signaling_server::voice::ServerState;

#[tokio::main]
async fn main() {
    TermLogger::init(
        LevelFilter::Debug,
        Config::default(),
        TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .expect("failed to initialize logger");

    let address = env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9003".to_string());
    let address = SocketAddr::from_str(&address).expect("invalid listen address provided");

    let router = router::create(ServerState::default());
    axum::Server::bind(&address)
        .serve(router.into_make_service())
        .await
        .expect("server failed");
}

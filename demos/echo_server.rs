//! Echo server - answers every frame on every connection.
//!
//! This example demonstrates:
//! - Binding a listener to a free port and printing the port it got
//! - Negotiating heartbeats from a `CONNECT` frame
//! - Replying through a `FrameContext`
//!
//! # Running
//!
//! ```text
//! RUST_LOG=debug cargo run --example echo_server
//! cargo run --example client -- 127.0.0.1:<port>
//! ```

use stompwire::protocol::{commands, headers};
use stompwire::{Frame, FrameContext, HeartbeatValues, Listener, Transport};
use tracing_subscriber::EnvFilter;

/// What this server offers: send every 10s, expect something every 10s.
const SERVER_HEARTBEAT: HeartbeatValues = HeartbeatValues {
    outgoing: 10_000,
    incoming: 10_000,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut listener = Listener::new();
    let bound = listener.bind("127.0.0.1:0").await?;
    println!("echo server listening on {}", bound);

    while let Some(transport) = listener.accept().await {
        tokio::spawn(serve(transport));
    }
    Ok(())
}

async fn serve(mut transport: Transport) {
    let peer = transport.peer_addr();
    while let Some(ctx) = transport.next_context().await {
        if ctx.frame().is_heartbeat() {
            continue;
        }
        match ctx.command() {
            Some(commands::CONNECT) | Some(commands::STOMP) => {
                let agreed = SERVER_HEARTBEAT
                    .combine(&HeartbeatValues::parse(ctx.header(headers::HEART_BEAT)));
                if let Some(interval) = agreed.outgoing_interval() {
                    transport.start_heartbeat(interval);
                }
                let _ = ctx
                    .reply(
                        Frame::new(commands::CONNECTED)
                            .with_header(headers::VERSION, "1.2")
                            .with_header(headers::HEART_BEAT, agreed.to_string()),
                    )
                    .await;
            }
            Some(commands::DISCONNECT) => {
                let _ = ctx.receipt().await;
                transport.shutdown().await;
            }
            _ => {
                if let Err(e) = echo(&ctx).await {
                    eprintln!("{:?}: echo failed: {}", peer, e);
                }
            }
        }
    }
    println!("{:?} disconnected", peer);
}

async fn echo(ctx: &FrameContext) -> stompwire::Result<()> {
    let mut reply = Frame::new(commands::MESSAGE).with_body(ctx.frame().body_bytes());
    if let Some(destination) = ctx.header(headers::DESTINATION) {
        reply.set_header(headers::DESTINATION, destination);
    }
    ctx.reply(reply).await?;
    ctx.receipt().await?;
    Ok(())
}

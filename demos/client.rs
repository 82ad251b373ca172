//! Client - connects, handshakes, sends a few frames and disconnects.
//!
//! # Running
//!
//! ```text
//! cargo run --example client -- 127.0.0.1:<port>
//! ```

use std::time::Duration;

use stompwire::protocol::{commands, headers};
use stompwire::{ClientConnector, Frame, HeartbeatValues, TransportEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:61613".to_string());

    let mut transport = ClientConnector::new(addr)
        .retry_interval(Duration::from_millis(500))
        .connect();
    let ours = HeartbeatValues::new(5_000, 5_000);

    while let Some(event) = transport.next_event().await {
        match event {
            TransportEvent::ConnectionChanged(true) => {
                transport
                    .send(
                        Frame::new(commands::CONNECT)
                            .with_header(headers::ACCEPT_VERSION, "1.2")
                            .with_header(headers::HEART_BEAT, ours.to_string()),
                    )
                    .await?;
            }
            TransportEvent::ConnectionChanged(false) => println!("disconnected"),
            TransportEvent::Error(e) => eprintln!("transport error: {}", e),
            TransportEvent::FrameArrived(frame) if frame.is_heartbeat() => {}
            TransportEvent::FrameArrived(frame) => match frame.command() {
                Some(commands::CONNECTED) => {
                    let peer = HeartbeatValues::parse(frame.header(headers::HEART_BEAT));
                    let agreed = ours.combine(&peer);
                    println!("connected, heartbeat {}", agreed);
                    if let Some(interval) = agreed.outgoing_interval() {
                        transport.start_heartbeat(interval);
                    }

                    for i in 0..3 {
                        transport
                            .send(
                                Frame::new(commands::SEND)
                                    .with_header(headers::DESTINATION, "/queue/demo")
                                    .with_body(format!("hello {}", i)),
                            )
                            .await?;
                    }
                    let disconnect =
                        Frame::new(commands::DISCONNECT).with_header(headers::RECEIPT, "bye");
                    transport.send(disconnect).await?;
                }
                Some(commands::RECEIPT) => {
                    let id = frame.header(headers::RECEIPT_ID).unwrap_or("?");
                    println!("receipt {}", id);
                    transport.shutdown().await;
                }
                _ => println!("{:?}: {:?}", frame.command(), frame.body_str()),
            },
        }
    }
    Ok(())
}

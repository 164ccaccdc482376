//! Socket.IO Session Integration Tests
//!
//! Runs the real WebSocket transport against a local Engine.IO v3 server
//! scripted frame by frame.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_test::{assert_err, assert_ok};

use coincap_stream::infrastructure::coincap::SessionSettings;
use coincap_stream::{
    Control, SocketIoTransport, StreamSettings, SubscribeError, Subscriber, TRADES_CHANNEL,
    Trade, TransportError, TransportFailure, decode_trade,
};

const WAIT: Duration = Duration::from_secs(5);

fn handshake(ping_interval_ms: u64) -> String {
    format!(
        r#"0{{"sid":"test-sid","upgrades":[],"pingInterval":{ping_interval_ms},"pingTimeout":60000}}"#
    )
}

fn trade_frame(coin: &str, price: f64) -> String {
    format!(
        r#"42["trades",{{"coin":"{coin}","message":{{"coin":"{coin}","exchange_id":"bitfinex","market_id":"{coin}_USD","msg":{{"short":"{coin}","price":{price}}}}},"trade":{{"data":{{"exchange_id":"bitfinex","market_id":"{coin}_USD","price":{price},"timestamp_ms":1514764800000}}}}}}]"#
    )
}

/// How the scripted server ends the connection.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Ending {
    /// Keep reading until the client closes.
    WaitForClient,
    /// Send a WebSocket close frame after the script.
    CloseFrame,
}

struct ScriptedServer {
    url: String,
    /// Text frames sent by the client.
    received: mpsc::UnboundedReceiver<String>,
}

async fn serve(frames: Vec<String>, ending: Ending) -> ScriptedServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (received_tx, received) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        for frame in frames {
            ws.send(Message::Text(frame.into())).await.unwrap();
        }

        if ending == Ending::CloseFrame {
            let _ = ws.close(None).await;
        }

        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) => {
                    let text = text.to_string();
                    if text == "2" {
                        let _ = ws.send(Message::Text("3".to_string().into())).await;
                    }
                    let _ = received_tx.send(text);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let settings = StreamSettings {
        endpoint: "127.0.0.1".to_string(),
        use_secure_transport: false,
        port: Some(port),
        ..StreamSettings::default()
    };

    ScriptedServer {
        url: settings.url(),
        received,
    }
}

fn subscriber(url: &str) -> Subscriber<SocketIoTransport> {
    let settings = SessionSettings {
        handshake_timeout: Duration::from_secs(2),
        close_timeout: Duration::from_millis(500),
        ..SessionSettings::default()
    };
    Subscriber::new(SocketIoTransport::new(settings), url)
}

async fn run_trades(
    url: String,
    sink: mpsc::Sender<Trade>,
    control: mpsc::Receiver<Control>,
) -> tokio::task::JoinHandle<Result<(), SubscribeError>> {
    tokio::spawn(async move {
        subscriber(&url)
            .subscribe(TRADES_CHANNEL, decode_trade, sink, control)
            .await
    })
}

async fn wait_for_text(received: &mut mpsc::UnboundedReceiver<String>, expected: &str) {
    timeout(WAIT, async {
        while let Some(text) = received.recv().await {
            if text == expected {
                return;
            }
        }
        panic!("server connection ended before {expected:?} arrived");
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {expected:?}"));
}

#[test]
fn url_targets_engine_io_v3() {
    let settings = StreamSettings {
        endpoint: "127.0.0.1".to_string(),
        use_secure_transport: false,
        port: Some(8080),
        ..StreamSettings::default()
    };
    assert_eq!(
        settings.url(),
        "ws://127.0.0.1:8080/socket.io/?EIO=3&transport=websocket"
    );
}

#[tokio::test]
async fn trades_are_decoded_in_order_and_stop_closes_cleanly() {
    let mut server = serve(
        vec![
            handshake(25_000),
            "40".to_string(),
            trade_frame("BTC", 6231.2),
            r#"42["global",{"dom":51.3}]"#.to_string(),
            trade_frame("ETH", 712.5),
            trade_frame("LTC", 230.1),
        ],
        Ending::WaitForClient,
    )
    .await;

    let (sink, mut rx) = mpsc::channel(8);
    let (control_tx, control_rx) = mpsc::channel(1);
    let handle = run_trades(server.url.clone(), sink, control_rx).await;

    let mut coins = Vec::new();
    for _ in 0..3 {
        let trade = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        coins.push(trade.msg.coin);
    }
    assert_eq!(coins, ["BTC", "ETH", "LTC"]);

    control_tx.send(Control::Stop).await.unwrap();
    assert_ok!(timeout(WAIT, handle).await.unwrap().unwrap());

    // Engine.IO close sent on the way out.
    wait_for_text(&mut server.received, "1").await;
}

#[tokio::test]
async fn server_pings_are_answered() {
    let mut server = serve(
        vec![handshake(25_000), "40".to_string(), "2".to_string()],
        Ending::WaitForClient,
    )
    .await;

    let (sink, _rx) = mpsc::channel(1);
    let (control_tx, control_rx) = mpsc::channel(1);
    let handle = run_trades(server.url.clone(), sink, control_rx).await;

    wait_for_text(&mut server.received, "3").await;

    control_tx.send(Control::Stop).await.unwrap();
    assert_ok!(timeout(WAIT, handle).await.unwrap().unwrap());
}

#[tokio::test]
async fn client_pings_on_the_advertised_interval() {
    let mut server = serve(vec![handshake(50), "40".to_string()], Ending::WaitForClient).await;

    let (sink, _rx) = mpsc::channel(1);
    let (control_tx, control_rx) = mpsc::channel(1);
    let handle = run_trades(server.url.clone(), sink, control_rx).await;

    wait_for_text(&mut server.received, "2").await;

    control_tx.send(Control::Stop).await.unwrap();
    assert_ok!(timeout(WAIT, handle).await.unwrap().unwrap());
}

#[tokio::test]
async fn close_frame_is_a_disconnect() {
    let server = serve(
        vec![handshake(25_000), "40".to_string(), trade_frame("BTC", 1.0)],
        Ending::CloseFrame,
    )
    .await;

    let (sink, mut rx) = mpsc::channel(8);
    let (_control_tx, control_rx) = mpsc::channel(1);
    let handle = run_trades(server.url.clone(), sink, control_rx).await;

    let result = timeout(WAIT, handle).await.unwrap().unwrap();
    let err = assert_err!(result);
    match err {
        SubscribeError::Transport(TransportFailure::Disconnected { session, .. }) => {
            assert_eq!(session, "test-sid");
        }
        other => panic!("expected disconnect, got {other:?}"),
    }

    // The event that preceded the close was still delivered.
    assert_eq!(rx.recv().await.unwrap().msg.coin, "BTC");
}

#[tokio::test]
async fn engine_close_packet_is_a_disconnect() {
    let server = serve(
        vec![handshake(25_000), "40".to_string(), "1".to_string()],
        Ending::WaitForClient,
    )
    .await;

    let (sink, _rx) = mpsc::channel(1);
    let (_control_tx, control_rx) = mpsc::channel(1);
    let handle = run_trades(server.url.clone(), sink, control_rx).await;

    let err = assert_err!(timeout(WAIT, handle).await.unwrap().unwrap());
    assert!(matches!(
        err,
        SubscribeError::Transport(TransportFailure::Disconnected { .. })
    ));
}

#[tokio::test]
async fn namespace_error_is_a_protocol_failure() {
    let server = serve(
        vec![handshake(25_000), r#"44"not authorized""#.to_string()],
        Ending::WaitForClient,
    )
    .await;

    let (sink, _rx) = mpsc::channel(1);
    let (_control_tx, control_rx) = mpsc::channel(1);
    let handle = run_trades(server.url.clone(), sink, control_rx).await;

    let err = assert_err!(timeout(WAIT, handle).await.unwrap().unwrap());
    match err {
        SubscribeError::Transport(TransportFailure::Protocol { reason, .. }) => {
            assert!(reason.contains("not authorized"), "{reason}");
        }
        other => panic!("expected protocol failure, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_handshake_is_a_connect_error() {
    let server = serve(Vec::new(), Ending::CloseFrame).await;

    let (sink, _rx) = mpsc::channel(1);
    let (_control_tx, control_rx) = mpsc::channel(1);
    let handle = run_trades(server.url.clone(), sink, control_rx).await;

    let err = assert_err!(timeout(WAIT, handle).await.unwrap().unwrap());
    assert!(err.is_connect());
    assert!(matches!(
        err,
        SubscribeError::Connect(TransportError::Handshake(_))
    ));
}

#[tokio::test]
async fn refused_connection_is_a_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let url = StreamSettings {
        endpoint: "127.0.0.1".to_string(),
        use_secure_transport: false,
        port: Some(port),
        ..StreamSettings::default()
    }
    .url();

    let (sink, _rx) = mpsc::channel(1);
    let (_control_tx, control_rx) = mpsc::channel(1);
    let handle = run_trades(url, sink, control_rx).await;

    let err = assert_err!(timeout(WAIT, handle).await.unwrap().unwrap());
    assert!(matches!(err, SubscribeError::Connect(TransportError::Dial(_))));
}

#[tokio::test]
async fn reset_opens_a_second_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (accepted_tx, mut accepted) = mpsc::unbounded_channel::<usize>();

    tokio::spawn(async move {
        for n in 1..=2_usize {
            let (stream, _) = listener.accept().await.unwrap();
            let accepted_tx = accepted_tx.clone();
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let open = format!(
                    r#"0{{"sid":"sid-{n}","upgrades":[],"pingInterval":25000,"pingTimeout":60000}}"#
                );
                ws.send(Message::Text(open.into())).await.unwrap();
                ws.send(Message::Text(trade_frame("BTC", n as f64).into()))
                    .await
                    .unwrap();
                let _ = accepted_tx.send(n);
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_close() {
                        break;
                    }
                }
            });
        }
    });

    let url = StreamSettings {
        endpoint: "127.0.0.1".to_string(),
        use_secure_transport: false,
        port: Some(port),
        ..StreamSettings::default()
    }
    .url();

    let (sink, mut rx) = mpsc::channel(8);
    let (control_tx, control_rx) = mpsc::channel(1);
    let handle = run_trades(url, sink, control_rx).await;

    let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    control_tx.send(Control::Reset).await.unwrap();
    let second = timeout(WAIT, rx.recv()).await.unwrap().unwrap();

    assert_eq!(accepted.recv().await, Some(1));
    assert_eq!(accepted.recv().await, Some(2));
    assert_ne!(first.data.price, second.data.price);

    control_tx.send(Control::Stop).await.unwrap();
    assert_ok!(timeout(WAIT, handle).await.unwrap().unwrap());
}

#[tokio::test]
async fn stop_cancels_a_reader_blocked_on_a_full_sink() {
    let mut server = serve(
        vec![
            handshake(25_000),
            "40".to_string(),
            trade_frame("BTC", 1.0),
            trade_frame("ETH", 2.0),
            trade_frame("LTC", 3.0),
        ],
        Ending::WaitForClient,
    )
    .await;

    let close_timeout = Duration::from_secs(2);
    let subscriber = Subscriber::new(
        SocketIoTransport::new(SessionSettings {
            handshake_timeout: Duration::from_secs(2),
            close_timeout,
            ..SessionSettings::default()
        }),
        server.url.clone(),
    );

    // Capacity 1 and never drained: the second trade blocks the reader.
    let (sink, _rx) = mpsc::channel::<Trade>(1);
    let (control_tx, control_rx) = mpsc::channel(1);
    let handle = tokio::spawn(async move {
        subscriber
            .subscribe(TRADES_CHANNEL, decode_trade, sink, control_rx)
            .await
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!handle.is_finished());

    let stopped_at = Instant::now();
    control_tx.send(Control::Stop).await.unwrap();
    assert_ok!(timeout(WAIT, handle).await.unwrap().unwrap());
    assert!(
        stopped_at.elapsed() < close_timeout,
        "close waited out its timeout: {:?}",
        stopped_at.elapsed()
    );

    // Only a reader that exited through cancellation sends the engine close.
    wait_for_text(&mut server.received, "1").await;
}

#[tokio::test]
async fn consumer_stall_longer_than_ping_timeout_keeps_the_session() {
    let open = r#"0{"sid":"test-sid","upgrades":[],"pingInterval":50,"pingTimeout":100}"#;
    let mut server = serve(
        vec![
            open.to_string(),
            "40".to_string(),
            trade_frame("BTC", 1.0),
            trade_frame("ETH", 2.0),
            trade_frame("LTC", 3.0),
        ],
        Ending::WaitForClient,
    )
    .await;

    let (sink, mut rx) = mpsc::channel(1);
    let (control_tx, control_rx) = mpsc::channel(1);
    let handle = run_trades(server.url.clone(), sink, control_rx).await;

    // Several ping timeouts pass while the reader is blocked on the sink.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!handle.is_finished());

    let mut coins = Vec::new();
    for _ in 0..3 {
        coins.push(timeout(WAIT, rx.recv()).await.unwrap().unwrap().msg.coin);
    }
    assert_eq!(coins, ["BTC", "ETH", "LTC"]);

    // Pings resume and are answered once dispatch is unblocked.
    wait_for_text(&mut server.received, "2").await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!handle.is_finished(), "session ended after the stall");

    control_tx.send(Control::Stop).await.unwrap();
    assert_ok!(timeout(WAIT, handle).await.unwrap().unwrap());
}

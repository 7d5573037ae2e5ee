//! Device sessions against a scripted controller on loopback TCP

use std::sync::{Arc, Mutex};
use std::time::Duration;

use devlink::device::{AckPolicy, ButtonSpec, DeviceIdentity, DeviceSession, OutputKind, SessionOptions, SessionState};
use devlink::protocol::Message;
use devlink::Error;
use futures::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

/// Controller end of one accepted connection
struct Controller {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Controller {
    async fn accept(listener: TcpListener) -> Self {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, writer) = socket.into_split();
        Controller {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn recv(&mut self) -> Value {
        let line = self.lines.next_line().await.unwrap().expect("connection closed");
        serde_json::from_str(&line).unwrap()
    }

    async fn send(&mut self, record: &str) {
        self.writer.write_all(record.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }
}

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

fn lamp() -> DeviceIdentity {
    DeviceIdentity::new("lamp-1", Some(OutputKind::Light)).with_button(ButtonSpec::push("push"))
}

fn awaiting(timeout: Duration) -> SessionOptions {
    SessionOptions {
        ack: AckPolicy::Await(timeout),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_channel_updates_arrive_in_wire_order() {
    let (listener, addr) = listen().await;
    let controller = tokio::spawn(async move {
        let mut c = Controller::accept(listener).await;
        let mut seen = vec![c.recv().await];
        seen.push(c.recv().await);
        c.send(r#"{"message":"channel","index":0,"value":10}"#).await;
        seen.push(c.recv().await);
        c.send(r#"{"message":"channel","index":1,"value":20.5}"#).await;
        seen.push(c.recv().await);
        seen
    });

    let session = DeviceSession::open(&addr, SessionOptions::default()).await.unwrap();
    session.register(lamp()).await.unwrap();
    assert_eq!(session.state(), SessionState::Registered);

    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);
    let handler = session
        .on_channel_update(move |ch| sink.lock().unwrap().push((ch.index, ch.value)))
        .unwrap();

    for _ in 0..3 {
        session.send_button_event(0, 200).await.unwrap();
    }

    let records = controller.await.unwrap();
    assert_eq!(records[0]["message"], "init");
    assert_eq!(records[0]["uniqueid"], "lamp-1");
    assert_eq!(records[0]["output"], "light");
    for button in &records[1..] {
        assert_eq!(button["message"], "button");
        assert_eq!(button["index"], 0);
        assert_eq!(button["value"], 200);
    }

    // the controller task dropped its socket
    tokio::time::timeout(Duration::from_secs(5), session.closed()).await.unwrap();
    assert_eq!(handler.await.unwrap(), 2);
    assert_eq!(*updates.lock().unwrap(), vec![(0, 10.0), (1, 20.5)]);
}

#[tokio::test]
async fn test_events_require_registration() {
    let (listener, addr) = listen().await;
    let _controller = tokio::spawn(async move {
        let mut c = Controller::accept(listener).await;
        let _ = c.lines.next_line().await;
    });

    let session = DeviceSession::open(&addr, SessionOptions::default()).await.unwrap();
    assert!(matches!(session.send_button_event(0, 100).await, Err(Error::NotRegistered)));
    assert!(matches!(session.send_synced().await, Err(Error::NotRegistered)));

    session.register(lamp()).await.unwrap();
    assert!(matches!(session.register(lamp()).await, Err(Error::AlreadyRegistered)));
    assert_eq!(session.identity().unwrap().unique_id, "lamp-1");
}

#[tokio::test]
async fn test_operations_after_close() {
    let (listener, addr) = listen().await;
    let controller = tokio::spawn(async move {
        let mut c = Controller::accept(listener).await;
        let init = c.recv().await;
        let eof = c.lines.next_line().await.unwrap();
        (init, eof)
    });

    let session = DeviceSession::open(&addr, SessionOptions::default()).await.unwrap();
    session.register(lamp()).await.unwrap();
    session.close().await.unwrap();

    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(session.close().await, Err(Error::ClosedSession)));
    assert!(matches!(session.send_sensor(0, 21.5).await, Err(Error::ClosedSession)));
    assert!(matches!(session.register(lamp()).await, Err(Error::ClosedSession)));

    let (init, eof) = controller.await.unwrap();
    assert_eq!(init["message"], "init");
    assert_eq!(eof, None);
}

#[tokio::test]
async fn test_bye_is_last_record() {
    let (listener, addr) = listen().await;
    let controller = tokio::spawn(async move {
        let mut c = Controller::accept(listener).await;
        let mut tags = Vec::new();
        while let Ok(Some(line)) = c.lines.next_line().await {
            let record: Value = serde_json::from_str(&line).unwrap();
            tags.push(record["message"].as_str().unwrap().to_string());
        }
        tags
    });

    let session = DeviceSession::open(&addr, SessionOptions::default()).await.unwrap();
    session.register(lamp()).await.unwrap();
    session.send_input(2, true).await.unwrap();
    session.bye().await.unwrap();

    assert_eq!(controller.await.unwrap(), vec!["init", "input", "bye"]);
    assert!(matches!(session.bye().await, Err(Error::ClosedSession)));
}

#[tokio::test]
async fn test_init_acknowledged() {
    let (listener, addr) = listen().await;
    let _controller = tokio::spawn(async move {
        let mut c = Controller::accept(listener).await;
        c.recv().await;
        c.send(r#"{"message":"status","status":"ok"}"#).await;
        let _ = c.lines.next_line().await;
    });

    let session = DeviceSession::open(&addr, awaiting(Duration::from_secs(5))).await.unwrap();
    session.register(lamp()).await.unwrap();
    assert_eq!(session.state(), SessionState::Registered);

    // the acknowledgement is still delivered to the consumer
    let mut messages = session.messages().unwrap();
    match messages.next().await {
        Some(Message::Status(report)) => assert!(report.is_ok()),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_init_rejected() {
    let (listener, addr) = listen().await;
    let _controller = tokio::spawn(async move {
        let mut c = Controller::accept(listener).await;
        c.recv().await;
        c.send(r#"{"message":"error","status":"error","errorcode":500,"errormessage":"duplicate uniqueid"}"#)
            .await;
        let _ = c.lines.next_line().await;
    });

    let session = DeviceSession::open(&addr, awaiting(Duration::from_secs(5))).await.unwrap();
    match session.register(lamp()).await {
        Err(Error::Rejected { code, message }) => {
            assert_eq!(code, 500);
            assert_eq!(message, "duplicate uniqueid");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_init_ack_timeout() {
    let (listener, addr) = listen().await;
    let _controller = tokio::spawn(async move {
        let mut c = Controller::accept(listener).await;
        c.recv().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let session = DeviceSession::open(&addr, awaiting(Duration::from_millis(100))).await.unwrap();
    assert!(matches!(session.register(lamp()).await, Err(Error::Timeout(_))));
}

#[tokio::test]
async fn test_connect_refused() {
    let (listener, addr) = listen().await;
    drop(listener);

    match DeviceSession::open(&addr, SessionOptions::default()).await {
        Err(e @ Error::Connect { .. }) => assert!(e.is_connection_error()),
        Err(e) => panic!("unexpected error {:?}", e),
        Ok(_) => panic!("connected to a closed port"),
    }
}

#[tokio::test]
async fn test_peer_drop_closes_session() {
    let (listener, addr) = listen().await;
    let controller = tokio::spawn(async move {
        let mut c = Controller::accept(listener).await;
        c.recv().await;
        c.send(r#"{"message":"sync"}"#).await;
        c.send(r#"{"message":"log","text":"going away"}"#).await;
    });

    let session = DeviceSession::open(&addr, SessionOptions::default()).await.unwrap();
    let mut messages = session.messages().unwrap();
    assert!(session.messages().is_err());
    session.register(lamp()).await.unwrap();
    controller.await.unwrap();

    assert_eq!(messages.next().await, Some(Message::Sync));
    match messages.next().await {
        Some(Message::Unknown(unknown)) => {
            assert_eq!(unknown.tag, "log");
            assert_eq!(unknown.get("text"), Some(&Value::from("going away")));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(messages.next().await, None);

    tokio::time::timeout(Duration::from_secs(5), session.closed()).await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_hangup_during_ack_wait() {
    let (listener, addr) = listen().await;
    let _controller = tokio::spawn(async move {
        let mut c = Controller::accept(listener).await;
        c.recv().await;
    });

    let session = DeviceSession::open(&addr, awaiting(Duration::from_secs(5))).await.unwrap();
    let started = std::time::Instant::now();
    assert!(matches!(session.register(lamp()).await, Err(Error::ClosedSession)));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_close_interrupts_ack_wait() {
    let (listener, addr) = listen().await;
    let _controller = tokio::spawn(async move {
        let mut c = Controller::accept(listener).await;
        c.recv().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let session = DeviceSession::open(&addr, awaiting(Duration::from_secs(5))).await.unwrap();
    let started = std::time::Instant::now();
    let (registered, closed) = tokio::join!(session.register(lamp()), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.close().await
    });

    assert!(matches!(registered, Err(Error::ClosedSession)));
    assert!(closed.is_ok());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_unread_messages_do_not_hide_close() {
    let (listener, addr) = listen().await;
    let controller = tokio::spawn(async move {
        let mut c = Controller::accept(listener).await;
        c.recv().await;
        for i in 0..100 {
            c.send(&format!(r#"{{"message":"channel","index":0,"value":{}}}"#, i)).await;
        }
    });

    let options = SessionOptions {
        incoming_capacity: 8,
        ..Default::default()
    };
    let session = DeviceSession::open(&addr, options).await.unwrap();
    session.register(lamp()).await.unwrap();
    controller.await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), session.closed()).await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);

    // the buffered head survives; the overflow was dropped
    let buffered: Vec<Message> = session.messages().unwrap().collect().await;
    assert_eq!(buffered.len(), 8);
    assert_eq!(buffered[0], Message::channel(0, 0.0));
    assert_eq!(buffered[7], Message::channel(0, 7.0));
}

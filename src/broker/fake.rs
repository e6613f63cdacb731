//! A scripted in-process MQTT 3.1.1 broker for tests

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::{TcpListener, TcpStream},
    task::{spawn, JoinHandle},
};

const CONNECT: u8 = 1;
const SUBSCRIBE: u8 = 8;
const PINGREQ: u8 = 12;
const DISCONNECT: u8 = 14;

/// What the broker does with one client connection
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Reject the subscription with a failure return code
    pub reject: bool,
    /// Payloads published on the subscribed topic once the subscription is granted
    pub publish: Vec<Vec<u8>>,
    /// Close the connection after publishing
    pub hang_up: bool,
}

/// Accepts connections and plays one [`Session`] per connection, in order
///
/// Connections beyond the scripted sessions are closed right away.
pub struct FakeBroker {
    pub addr: String,
    subscriptions: Arc<Mutex<Vec<String>>>,
    server: JoinHandle<()>,
}

impl FakeBroker {
    pub async fn start(sessions: Vec<Session>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let subscriptions = Arc::new(Mutex::new(Vec::new()));

        let server = spawn({
            let subscriptions = Arc::clone(&subscriptions);
            let mut sessions = VecDeque::from(sessions);
            async move {
                loop {
                    let (stream, _) = listener.accept().await.unwrap();
                    let Some(session) = sessions.pop_front() else {
                        continue;
                    };
                    serve(stream, session, &subscriptions).await;
                }
            }
        });

        Self {
            addr,
            subscriptions,
            server,
        }
    }

    /// Topic filters subscribed to so far, one entry per `SUBSCRIBE`
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }
}

impl Drop for FakeBroker {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn serve(mut stream: TcpStream, session: Session, subscriptions: &Mutex<Vec<String>>) {
    let Some((CONNECT, _)) = read_packet(&mut stream).await else {
        return;
    };
    stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

    while let Some((kind, body)) = read_packet(&mut stream).await {
        match kind {
            SUBSCRIBE => {
                let topic_len = usize::from(u16::from_be_bytes([body[2], body[3]]));
                let topic = String::from_utf8(body[4..4 + topic_len].to_vec()).unwrap();
                subscriptions.lock().unwrap().push(topic.clone());

                let code = if session.reject { 0x80 } else { 0x00 };
                stream
                    .write_all(&[0x90, 0x03, body[0], body[1], code])
                    .await
                    .unwrap();
                if session.reject {
                    continue;
                }

                for payload in &session.publish {
                    stream.write_all(&publish(&topic, payload)).await.unwrap();
                }
                if session.hang_up {
                    return;
                }
            }
            PINGREQ => stream.write_all(&[0xD0, 0x00]).await.unwrap(),
            DISCONNECT => return,
            _ => {}
        }
    }
}

/// Read one control packet, returning its type and body, or `None` once the client is gone
async fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let header = stream.read_u8().await.ok()?;
    let mut len = 0;
    for shift in (0..28).step_by(7) {
        let byte = stream.read_u8().await.ok()?;
        len |= usize::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            break;
        }
    }
    let mut body = vec![0; len];
    stream.read_exact(&mut body).await.ok()?;
    Some((header >> 4, body))
}

/// Encode a QoS 0 `PUBLISH`
fn publish(topic: &str, payload: &[u8]) -> Vec<u8> {
    let topic_len = u16::try_from(topic.len()).unwrap();
    let mut len = 2 + topic.len() + payload.len();

    let mut packet = vec![0x30];
    loop {
        let byte = (len & 0x7F) as u8;
        len >>= 7;
        if len == 0 {
            packet.push(byte);
            break;
        }
        packet.push(byte | 0x80);
    }
    packet.extend_from_slice(&topic_len.to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(payload);
    packet
}

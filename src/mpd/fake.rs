//! A scripted in-process MPD server for tests

use std::sync::{Arc, Mutex};

use tokio::{
    io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader},
    net::TcpListener,
    task::{spawn, JoinHandle},
};

/// Player state served by [`FakeMpd`]
#[derive(Debug, Clone)]
pub struct FakeState {
    pub state: String,
    pub volume: Option<i32>,
    /// Drop the connection instead of answering the next command
    pub hang_up: bool,
}

impl FakeState {
    pub fn new(state: &str, volume: Option<i32>) -> Self {
        Self {
            state: state.to_owned(),
            volume,
            hang_up: false,
        }
    }
}

/// Accepts a single connection and answers it like an MPD server, recording every command
pub struct FakeMpd {
    pub addr: String,
    pub state: Arc<Mutex<FakeState>>,
    pub commands: Arc<Mutex<Vec<String>>>,
    server: JoinHandle<()>,
}

impl FakeMpd {
    pub async fn start(state: FakeState) -> Self {
        Self::start_with_greeting(state, "OK MPD 0.23.5").await
    }

    pub async fn start_with_greeting(state: FakeState, greeting: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(Mutex::new(state));
        let commands = Arc::new(Mutex::new(Vec::new()));
        let greeting = format!("{greeting}\n");

        let server = spawn({
            let state = Arc::clone(&state);
            let commands = Arc::clone(&commands);
            async move {
                let (stream, _) = listener.accept().await.unwrap();
                let mut stream = BufReader::new(stream);
                stream.write_all(greeting.as_bytes()).await.unwrap();

                let mut line = String::new();
                loop {
                    line.clear();
                    if stream.read_line(&mut line).await.unwrap() == 0 {
                        return;
                    }
                    let command = line.trim_end().to_owned();
                    let reply = {
                        let mut state = state.lock().unwrap();
                        if state.hang_up {
                            return;
                        }
                        commands.lock().unwrap().push(command.clone());
                        respond(&mut state, &command)
                    };
                    stream.write_all(reply.as_bytes()).await.unwrap();
                }
            }
        });

        Self {
            addr,
            state,
            commands,
            server,
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn set(&self, state: &str, volume: Option<i32>) {
        let mut current = self.state.lock().unwrap();
        current.state = state.to_owned();
        current.volume = volume;
    }

    pub fn hang_up(&self) {
        self.state.lock().unwrap().hang_up = true;
    }
}

impl Drop for FakeMpd {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn respond(state: &mut FakeState, command: &str) -> String {
    let (name, arg) = command.split_once(' ').unwrap_or((command, ""));
    match (name, arg) {
        ("status", "") => {
            let mut reply = String::from("repeat: 0\nrandom: 0\n");
            if let Some(volume) = state.volume {
                reply.push_str(&format!("volume: {volume}\n"));
            }
            reply.push_str(&format!("state: {}\nOK\n", state.state));
            reply
        }
        ("play", "") => {
            state.state = "play".to_owned();
            "OK\n".to_owned()
        }
        ("pause", "1") => {
            state.state = "pause".to_owned();
            "OK\n".to_owned()
        }
        ("next" | "previous", "") => "OK\n".to_owned(),
        ("setvol", volume) => match volume.parse::<i32>() {
            Ok(volume) if (0..=100).contains(&volume) => {
                state.volume = Some(volume);
                "OK\n".to_owned()
            }
            _ => "ACK [2@0] {setvol} Invalid volume value\n".to_owned(),
        },
        _ => format!("ACK [5@0] {{{name}}} unknown command \"{name}\"\n"),
    }
}

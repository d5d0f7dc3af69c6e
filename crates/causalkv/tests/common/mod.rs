//! Scripted in-process server speaking the length-framed tagged protocol,
//! shared by the integration suites.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use prost::Message;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use causalkv::frame::{read_frame, write_frame};
use causalkv::proto::{self, MessageCode};

/// What the scripted server does with one decoded request.
pub enum Reply {
    /// Respond with this code and encoded body.
    Message(MessageCode, Vec<u8>),
    /// Respond after a delay.
    Delayed(Duration, MessageCode, Vec<u8>),
    /// Respond with a raw frame payload, tag byte included.
    Raw(Vec<u8>),
    /// Close the connection without responding.
    Hangup,
}

/// Per-request hook: receives the tag byte and the protobuf body.
pub type Script = Arc<dyn Fn(u8, Vec<u8>) -> Reply + Send + Sync>;

/// A loopback TCP server running the given script.
pub struct TestServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(session(stream, Arc::clone(&script)));
            }
        });
        Self { addr, accepted, accept_task }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Number of TCP connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn session(mut stream: TcpStream, script: Script) {
    let mut buf = Vec::new();
    loop {
        if read_frame(&mut stream, &mut buf).await.is_err() {
            return;
        }
        let (tag, body) = match buf.split_first() {
            Some((&tag, body)) => (tag, body.to_vec()),
            None => (u8::MAX, Vec::new()),
        };
        let frame = match script(tag, body) {
            Reply::Message(code, body) => tagged(code, &body),
            Reply::Delayed(delay, code, body) => {
                tokio::time::sleep(delay).await;
                tagged(code, &body)
            }
            Reply::Raw(frame) => frame,
            Reply::Hangup => return,
        };
        if write_frame(&mut stream, &frame).await.is_err() {
            return;
        }
    }
}

fn tagged(code: MessageCode, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + body.len());
    frame.push(code as u8);
    frame.extend_from_slice(body);
    frame
}

/// Builds a reply from a prost message.
pub fn reply<M: Message>(code: MessageCode, message: &M) -> Reply {
    Reply::Message(code, message.encode_to_vec())
}

/// Builds a server-error reply.
pub fn error_reply(text: &str) -> Reply {
    reply(
        MessageCode::ErrorResp,
        &proto::ErrorResponse { errmsg: text.as_bytes().to_vec(), errcode: 0 },
    )
}

/// A minimal in-memory store: real get/put/del semantics with generated
/// causal clocks, for end-to-end round trips.
pub fn memory_store_script() -> Script {
    let data: Arc<Mutex<HashMap<(Vec<u8>, Vec<u8>), (Vec<u8>, proto::Content)>>> =
        Arc::new(Mutex::new(HashMap::new()));
    let clock = Arc::new(AtomicU64::new(1));
    Arc::new(move |tag, body| {
        let mut data = data.lock().unwrap();
        match MessageCode::from_u8(tag) {
            Some(MessageCode::GetReq) => {
                let request = proto::GetRequest::decode(body.as_slice()).unwrap();
                match data.get(&(request.bucket, request.key)) {
                    Some((vclock, content)) => reply(
                        MessageCode::GetResp,
                        &proto::GetResponse {
                            content: vec![content.clone()],
                            vclock: Some(vclock.clone()),
                            unchanged: None,
                        },
                    ),
                    None => reply(MessageCode::GetResp, &proto::GetResponse::default()),
                }
            }
            Some(MessageCode::PutReq) => {
                let request = proto::PutRequest::decode(body.as_slice()).unwrap();
                let vclock =
                    format!("clock-{}", clock.fetch_add(1, Ordering::SeqCst)).into_bytes();
                let content = request.content.unwrap_or_default();
                data.insert((request.bucket, request.key), (vclock.clone(), content));
                let head = request.return_head.unwrap_or(false);
                reply(
                    MessageCode::PutResp,
                    &proto::PutResponse {
                        content: Vec::new(),
                        vclock: head.then_some(vclock),
                        key: None,
                    },
                )
            }
            Some(MessageCode::DelReq) => {
                let request = proto::DelRequest::decode(body.as_slice()).unwrap();
                data.remove(&(request.bucket, request.key));
                reply(MessageCode::DelResp, &proto::DelResponse::default())
            }
            _ => error_reply("unsupported request"),
        }
    })
}

// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::protocol::{encode, EchoReply, EchoRequest, MAX_FRAME_LEN};
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Echo server that numbers every accepted connection
pub struct EchoServer {
    listener: TcpListener,
    connections: Arc<AtomicUsize>,
    cancellation_token: CancellationToken,
}

impl EchoServer {
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            connections: Arc::new(AtomicUsize::new(0)),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of connections accepted so far
    pub fn connections(&self) -> Arc<AtomicUsize> {
        self.connections.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub async fn run(self) {
        let token = self.cancellation_token;
        let connections = self.connections;
        let mut incoming = TcpListenerStream::new(self.listener);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                next = incoming.next() => match next {
                    Some(Ok(socket)) => {
                        let id = connections.fetch_add(1, Ordering::SeqCst);
                        debug!("Accepted connection {} from {:?}", id, socket.peer_addr().ok());
                        tokio::spawn(serve(id, socket, token.clone()));
                    }
                    Some(Err(e)) => {
                        warn!("Accept failed: {}", e);
                    }
                    None => break,
                },
            }
        }

        info!(
            "Echo server stopped after {} connections",
            connections.load(Ordering::SeqCst)
        );
    }
}

async fn serve(id: usize, mut socket: TcpStream, token: CancellationToken) {
    let mut sequence = 0;
    loop {
        let request = tokio::select! {
            _ = token.cancelled() => return,
            request = read_request(&mut socket) => match request {
                Some(request) => request,
                None => break,
            },
        };

        sequence += 1;
        let reply = EchoReply {
            connection: id,
            sequence,
            echoed: request.message.repeat(request.repeat),
        };

        let frame = match encode(&reply) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Connection {}: cannot encode reply: {:#}", id, e);
                return;
            }
        };
        if socket.write_all(&frame).await.is_err() {
            return;
        }
    }
    debug!("Connection {} closed after {} requests", id, sequence);
}

async fn read_request(socket: &mut TcpStream) -> Option<EchoRequest> {
    let mut len_bytes = [0u8; 4];
    socket.read_exact(&mut len_bytes).await.ok()?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return None;
    }

    let mut buffer = vec![0u8; len];
    socket.read_exact(&mut buffer).await.ok()?;
    serde_json::from_slice(&buffer).ok()
}

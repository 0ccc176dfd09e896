// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::protocol::{read_frame, write_frame, EchoReply, EchoRequest};
use anyhow::Context;
use log::debug;
use session_pool_core::{current_worker, FactoryArgs};
use socket2::{SockRef, TcpKeepalive};
use std::net::TcpStream;
use std::time::Duration;

const KEEPALIVE_IDLE: Duration = Duration::from_secs(30);

/// One keep-alive connection to the echo server, reused for every request
/// of a worker task
pub struct EchoSession {
    stream: TcpStream,
    requests: usize,
}

impl EchoSession {
    /// Resource factory: expects a named `addr` and an optional `timeout_ms`
    pub fn connect(args: &FactoryArgs) -> anyhow::Result<Self> {
        let addr: String = args.named("addr")?;
        let timeout_ms: u64 = args.named_or("timeout_ms", 2_000)?;

        let stream =
            TcpStream::connect(&addr).with_context(|| format!("connecting to {}", addr))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(Duration::from_millis(timeout_ms)))?;
        SockRef::from(&stream)
            .set_tcp_keepalive(&TcpKeepalive::new().with_time(KEEPALIVE_IDLE))
            .context("enabling keep-alive")?;

        debug!(
            "Worker {:?} opened session to {} from {}",
            current_worker(),
            addr,
            stream.local_addr()?
        );
        Ok(Self {
            stream,
            requests: 0,
        })
    }

    pub fn echo(&mut self, message: &str, repeat: usize) -> anyhow::Result<EchoReply> {
        write_frame(
            &mut self.stream,
            &EchoRequest {
                message: message.to_string(),
                repeat,
            },
        )?;
        let reply = read_frame(&mut self.stream)
            .with_context(|| format!("awaiting reply to request {}", self.requests + 1))?;
        self.requests += 1;
        Ok(reply)
    }
}

/// `map` target: echoes each message once
pub fn echo_once(message: String, session: &mut EchoSession) -> anyhow::Result<EchoReply> {
    session.echo(&message, 1)
}

/// `starmap` target: echoes `message` repeated `repeat` times
pub fn echo_repeated(
    message: String,
    repeat: usize,
    session: &mut EchoSession,
) -> anyhow::Result<EchoReply> {
    session.echo(&message, repeat)
}

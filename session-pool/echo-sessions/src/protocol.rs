// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Length-prefixed JSON frames: a 4-byte big-endian length, then the body.

use anyhow::{bail, Context};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

pub const MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoRequest {
    pub message: String,
    pub repeat: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoReply {
    /// Server-side id of the connection that carried the request
    pub connection: usize,
    /// Requests served on this connection so far, this one included
    pub sequence: usize,
    pub echoed: String,
}

pub fn encode<T: Serialize>(value: &T) -> anyhow::Result<Vec<u8>> {
    let body = serde_json::to_vec(value)?;
    if body.len() > MAX_FRAME_LEN {
        bail!("frame of {} bytes exceeds {}", body.len(), MAX_FRAME_LEN);
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

pub fn write_frame<T: Serialize>(stream: &mut impl Write, value: &T) -> anyhow::Result<()> {
    stream.write_all(&encode(value)?)?;
    stream.flush()?;
    Ok(())
}

pub fn read_frame<T: DeserializeOwned>(stream: &mut impl Read) -> anyhow::Result<T> {
    let mut len_bytes = [0u8; 4];
    stream
        .read_exact(&mut len_bytes)
        .context("reading frame length")?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        bail!("frame of {} bytes exceeds {}", len, MAX_FRAME_LEN);
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).context("reading frame body")?;
    Ok(serde_json::from_slice(&body)?)
}

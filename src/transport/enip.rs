//! EtherNet/IP explicit messaging client for Logix-class controllers.
//!
//! Only what the writer needs: register a session, write one BOOL tag per
//! request through an Unconnected Send routed to the CPU slot, unregister.
//! Every request waits for its reply before the next one is sent.

use anyhow::{anyhow, Context, Result};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::transport::{ControllerEndpoint, ControllerLink};

pub const ENCAP_HEADER_LEN: usize = 24;

pub const CMD_REGISTER_SESSION: u16 = 0x0065;
pub const CMD_UNREGISTER_SESSION: u16 = 0x0066;
pub const CMD_SEND_RR_DATA: u16 = 0x006F;

const ITEM_NULL_ADDRESS: u16 = 0x0000;
const ITEM_UNCONNECTED_DATA: u16 = 0x00B2;

const SERVICE_UNCONNECTED_SEND: u8 = 0x52;
pub const SERVICE_WRITE_TAG: u8 = 0x4D;
/// Class 0x06 (Connection Manager), instance 1.
const CONNECTION_MANAGER_PATH: [u8; 4] = [0x20, 0x06, 0x24, 0x01];
const PRIORITY_TICK_TIME: u8 = 0x0A;
const TIMEOUT_TICKS: u8 = 0x0E;
const BACKPLANE_PORT: u8 = 0x01;
const SYMBOLIC_SEGMENT: u8 = 0x91;
pub const CIP_TYPE_BOOL: u16 = 0x00C1;

/// Offset of the CIP general status byte in a SendRRData reply.
const REPLY_GENERAL_STATUS: usize = ENCAP_HEADER_LEN + 18;
/// Largest reply body accepted; anything bigger is a framing error.
const MAX_REPLY_LEN: usize = 4096;

/// Decoded encapsulation header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncapHeader {
    pub command: u16,
    pub length: u16,
    pub session: u32,
    pub status: u32,
    pub context: [u8; 8],
}

impl EncapHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ENCAP_HEADER_LEN {
            return Err(anyhow!(
                "short encapsulation header: {} bytes",
                bytes.len()
            ));
        }
        let mut context = [0u8; 8];
        context.copy_from_slice(&bytes[12..20]);
        Ok(Self {
            command: u16::from_le_bytes([bytes[0], bytes[1]]),
            length: u16::from_le_bytes([bytes[2], bytes[3]]),
            session: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            status: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            context,
        })
    }
}

/// Frame `data` behind a 24-byte encapsulation header.
pub fn encapsulate(command: u16, session: u32, context: [u8; 8], data: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(ENCAP_HEADER_LEN + data.len());
    packet.extend_from_slice(&command.to_le_bytes());
    packet.extend_from_slice(&(data.len() as u16).to_le_bytes());
    packet.extend_from_slice(&session.to_le_bytes());
    packet.extend_from_slice(&0u32.to_le_bytes());
    packet.extend_from_slice(&context);
    packet.extend_from_slice(&0u32.to_le_bytes());
    packet.extend_from_slice(data);
    packet
}

/// ANSI symbolic path for a (possibly dotted) tag name.
pub fn symbolic_path(tag: &str) -> Result<Vec<u8>> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(anyhow!("tag name is empty"));
    }
    let mut path = Vec::new();
    for part in tag.split('.') {
        if part.is_empty() || part.len() > 255 {
            return Err(anyhow!("invalid tag name '{}'", tag));
        }
        path.push(SYMBOLIC_SEGMENT);
        path.push(part.len() as u8);
        path.extend_from_slice(part.as_bytes());
        if part.len() % 2 == 1 {
            path.push(0);
        }
    }
    Ok(path)
}

/// CIP Write Tag request for one BOOL element.
pub fn write_bool_request(tag: &str, value: bool) -> Result<Vec<u8>> {
    let path = symbolic_path(tag)?;
    let mut request = Vec::with_capacity(path.len() + 8);
    request.push(SERVICE_WRITE_TAG);
    request.push((path.len() / 2) as u8);
    request.extend_from_slice(&path);
    request.extend_from_slice(&CIP_TYPE_BOOL.to_le_bytes());
    request.extend_from_slice(&1u16.to_le_bytes());
    request.push(if value { 0xFF } else { 0x00 });
    Ok(request)
}

/// Wrap a Message Router request in an Unconnected Send routed to `slot`.
pub fn unconnected_send(embedded: &[u8], slot: u8) -> Vec<u8> {
    let mut message = Vec::with_capacity(embedded.len() + 16);
    message.push(SERVICE_UNCONNECTED_SEND);
    message.push((CONNECTION_MANAGER_PATH.len() / 2) as u8);
    message.extend_from_slice(&CONNECTION_MANAGER_PATH);
    message.push(PRIORITY_TICK_TIME);
    message.push(TIMEOUT_TICKS);
    message.extend_from_slice(&(embedded.len() as u16).to_le_bytes());
    message.extend_from_slice(embedded);
    if embedded.len() % 2 == 1 {
        message.push(0);
    }
    // Route path: one word, reserved byte, then port/link.
    message.push(0x01);
    message.push(0x00);
    message.push(BACKPLANE_PORT);
    message.push(slot);
    message
}

/// SendRRData command body carrying one unconnected message.
pub fn send_rr_data(message: &[u8], timeout_s: u16) -> Vec<u8> {
    let mut data = Vec::with_capacity(message.len() + 16);
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&timeout_s.to_le_bytes());
    data.extend_from_slice(&2u16.to_le_bytes());
    data.extend_from_slice(&ITEM_NULL_ADDRESS.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&ITEM_UNCONNECTED_DATA.to_le_bytes());
    data.extend_from_slice(&(message.len() as u16).to_le_bytes());
    data.extend_from_slice(message);
    data
}

/// EtherNet/IP [`ControllerLink`] over a blocking TCP socket.
pub struct EnipLink {
    io_timeout: Duration,
    stream: Option<TcpStream>,
    session: u32,
    slot: u8,
    sequence: u64,
}

impl EnipLink {
    pub fn new(io_timeout: Duration) -> Self {
        Self {
            io_timeout,
            stream: None,
            session: 0,
            slot: 0,
            sequence: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn session(&self) -> u32 {
        self.session
    }

    fn next_context(&mut self) -> [u8; 8] {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence.to_le_bytes()
    }

    /// Send one encapsulated request and read the full reply.
    fn transact(&mut self, command: u16, data: &[u8]) -> Result<(EncapHeader, Vec<u8>)> {
        let context = self.next_context();
        let packet = encapsulate(command, self.session, context, data);
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("enip session not open"))?;
        stream.write_all(&packet).context("send enip request")?;

        let mut header_bytes = [0u8; ENCAP_HEADER_LEN];
        stream
            .read_exact(&mut header_bytes)
            .context("read enip reply header")?;
        let header = EncapHeader::parse(&header_bytes)?;
        let len = header.length as usize;
        if len > MAX_REPLY_LEN {
            return Err(anyhow!("enip reply too large: {} bytes", len));
        }
        let mut reply = header_bytes.to_vec();
        reply.resize(ENCAP_HEADER_LEN + len, 0);
        stream
            .read_exact(&mut reply[ENCAP_HEADER_LEN..])
            .context("read enip reply body")?;

        if header.command != command {
            return Err(anyhow!(
                "enip reply command mismatch: sent 0x{:04X}, got 0x{:04X}",
                command,
                header.command
            ));
        }
        if header.status != 0 {
            return Err(anyhow!(
                "enip encapsulation status 0x{:08X}",
                header.status
            ));
        }
        Ok((header, reply))
    }
}

impl ControllerLink for EnipLink {
    fn connect(&mut self, endpoint: &ControllerEndpoint) -> Result<()> {
        self.close();
        let addr = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .with_context(|| format!("resolve controller {}", endpoint))?
            .next()
            .ok_or_else(|| anyhow!("controller {} resolved to no address", endpoint))?;
        let stream = TcpStream::connect_timeout(&addr, self.io_timeout)
            .with_context(|| format!("connect to controller {}", endpoint))?;
        stream.set_read_timeout(Some(self.io_timeout))?;
        stream.set_write_timeout(Some(self.io_timeout))?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        self.slot = endpoint.slot;

        // Protocol version 1, no options.
        match self.transact(CMD_REGISTER_SESSION, &[0x01, 0x00, 0x00, 0x00]) {
            Ok((header, _)) => {
                self.session = header.session;
                log::debug!("enip: registered session 0x{:08X} with {}", self.session, endpoint);
                Ok(())
            }
            Err(err) => {
                self.drop_stream();
                Err(err.context("register enip session"))
            }
        }
    }

    fn write_bool(&mut self, tag: &str, value: bool) -> Result<()> {
        let request = write_bool_request(tag, value)?;
        let message = unconnected_send(&request, self.slot);
        let timeout_s = self.io_timeout.as_secs().clamp(1, u16::MAX as u64) as u16;
        let (_, reply) = self
            .transact(CMD_SEND_RR_DATA, &send_rr_data(&message, timeout_s))
            .with_context(|| format!("write tag {}", tag))?;

        let status = *reply
            .get(REPLY_GENERAL_STATUS)
            .ok_or_else(|| anyhow!("write tag {}: truncated CIP reply", tag))?;
        if status != 0 {
            return Err(anyhow!(
                "write tag {}: CIP general status 0x{:02X}",
                tag,
                status
            ));
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.is_none() {
            return;
        }
        if self.session != 0 {
            let packet = encapsulate(CMD_UNREGISTER_SESSION, self.session, self.next_context(), &[]);
            if let Some(stream) = self.stream.as_mut() {
                // No reply is sent for UnRegisterSession.
                let _ = stream.write_all(&packet);
            }
        }
        self.drop_stream();
    }
}

impl EnipLink {
    fn drop_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.session = 0;
    }
}

impl Drop for EnipLink {
    fn drop(&mut self) {
        self.close();
    }
}

//! Minimal Source RCON client, enough to run admin commands on the game server.
//!
//! Packet layout (all integers little-endian i32):
//! `size | id | type | body bytes | 0x00 | 0x00`, where `size` counts everything after itself.

use std::{
    net::SocketAddr,
    time::Duration,
};

use bytes::{
    Buf,
    BufMut,
    BytesMut,
};
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio_stream::StreamExt;
use tokio_util::codec::{
    Decoder,
    Encoder,
    Framed,
};

use crate::error::RconError;

pub const SERVERDATA_AUTH: i32 = 3;
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// id + type + two terminators
const MIN_PACKET_SIZE: usize = 10;
/// Generous upper bound; Squad splits long responses well below this
const MAX_PACKET_SIZE: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct RconCodec;

impl Decoder for RconCodec {
    type Item = Packet;
    type Error = RconError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, RconError> {
        if src.len() < 4 {
            return Ok(None);
        }
        let size = i32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        let size = usize::try_from(size)
            .ok()
            .filter(|size| (MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(size))
            .ok_or_else(|| RconError::Malformed(format!("packet size {}", size)))?;
        if src.len() < 4 + size {
            src.reserve(4 + size - src.len());
            return Ok(None);
        }

        src.advance(4);
        let mut packet = src.split_to(size);
        let id = packet.get_i32_le();
        let kind = packet.get_i32_le();
        let body_len = packet.iter().position(|b| *b == 0).unwrap_or(packet.len());
        let body = String::from_utf8_lossy(&packet[..body_len]).into_owned();
        Ok(Some(Packet { id, kind, body }))
    }
}

impl Encoder<Packet> for RconCodec {
    type Error = RconError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), RconError> {
        let size = MIN_PACKET_SIZE + packet.body.len();
        if size > MAX_PACKET_SIZE {
            return Err(RconError::Malformed(format!("body of {} bytes", packet.body.len())));
        }
        dst.reserve(4 + size);
        dst.put_i32_le(size as i32);
        dst.put_i32_le(packet.id);
        dst.put_i32_le(packet.kind);
        dst.put_slice(packet.body.as_bytes());
        dst.put_u8(0);
        dst.put_u8(0);
        Ok(())
    }
}

type RconFrame = Framed<TcpStream, RconCodec>;

/// An authenticated connection that is opened on first use and reopened after a failure
pub struct RconClient {
    addr: SocketAddr,
    password: String,
    timeout: Duration,
    conn: Option<RconFrame>,
    next_id: i32,
}

impl RconClient {
    pub fn new(addr: SocketAddr, password: String, timeout: Duration) -> Self {
        Self {
            addr,
            password,
            timeout,
            conn: None,
            next_id: 1,
        }
    }

    /// Runs `command`, retrying once on a fresh connection if the current one has gone bad.
    /// Returns the first response body.
    pub async fn execute(&mut self, command: &str) -> Result<String, RconError> {
        match self.execute_once(command).await {
            Ok(resp) => Ok(resp),
            Err(RconError::AuthRejected) => Err(RconError::AuthRejected),
            Err(e) => {
                tracing::warn!("RCON command failed ({}); reconnecting to {}", e, self.addr);
                self.conn = None;
                self.execute_once(command).await
            }
        }
    }

    async fn execute_once(&mut self, command: &str) -> Result<String, RconError> {
        let timeout = self.timeout;
        let res = tokio::time::timeout(timeout, self.exchange(command)).await;
        let res = res.unwrap_or(Err(RconError::Timeout));
        if res.is_err() {
            self.conn = None;
        }
        res
    }

    async fn exchange(&mut self, command: &str) -> Result<String, RconError> {
        if self.conn.is_none() {
            self.conn = Some(self.connect().await?);
        }
        let id = self.request_id();
        let Some(conn) = self.conn.as_mut() else {
            return Err(RconError::Closed);
        };

        conn.send(Packet {
            id,
            kind: SERVERDATA_EXECCOMMAND,
            body: command.to_string(),
        })
        .await?;
        loop {
            let packet = conn.next().await.ok_or(RconError::Closed)??;
            if packet.id == id && packet.kind == SERVERDATA_RESPONSE_VALUE {
                return Ok(packet.body);
            }
            tracing::trace!("Skipping unsolicited RCON packet {:?}", packet);
        }
    }

    async fn connect(&mut self) -> Result<RconFrame, RconError> {
        tracing::debug!("Connecting to RCON at {}", self.addr);
        let sock = TcpStream::connect(self.addr).await?;
        let mut conn = Framed::new(sock, RconCodec);

        let id = self.request_id();
        conn.send(Packet {
            id,
            kind: SERVERDATA_AUTH,
            body: self.password.clone(),
        })
        .await?;
        loop {
            let packet = conn.next().await.ok_or(RconError::Closed)??;
            if packet.kind != SERVERDATA_AUTH_RESPONSE {
                // Servers send an empty RESPONSE_VALUE ahead of the auth result
                continue;
            }
            if packet.id == -1 {
                return Err(RconError::AuthRejected);
            }
            tracing::info!("Authenticated with RCON at {}", self.addr);
            return Ok(conn);
        }
    }

    fn request_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).unwrap_or(1);
        id
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn decodes_split_packets() {
        let mut buf = BytesMut::new();
        RconCodec
            .encode(
                Packet {
                    id: 42,
                    kind: SERVERDATA_RESPONSE_VALUE,
                    body: "ok".into(),
                },
                &mut buf,
            )
            .unwrap();
        assert_eq!(&buf[..4], &12i32.to_le_bytes());

        let mut partial = buf.split_to(7);
        assert_eq!(RconCodec.decode(&mut partial).unwrap(), None);
        partial.unsplit(buf);
        let packet = RconCodec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(packet.id, 42);
        assert_eq!(packet.body, "ok");
        assert!(partial.is_empty());
    }

    #[test]
    fn rejects_nonsense_sizes() {
        let mut buf = BytesMut::from(&(-5i32).to_le_bytes()[..]);
        assert!(matches!(
            RconCodec.decode(&mut buf),
            Err(RconError::Malformed(_))
        ));
    }

    /// Accepts one connection, checks the password and answers every command with `echo:<cmd>`.
    /// Returns the received commands when the client disconnects.
    pub(crate) async fn fake_server(
        password: &'static str,
    ) -> (SocketAddr, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            let mut conn = Framed::new(sock, RconCodec);
            let mut commands = Vec::new();
            while let Some(Ok(packet)) = conn.next().await {
                match packet.kind {
                    SERVERDATA_AUTH => {
                        let id = if packet.body == password { packet.id } else { -1 };
                        let empty = Packet {
                            id: packet.id,
                            kind: SERVERDATA_RESPONSE_VALUE,
                            body: String::new(),
                        };
                        let auth = Packet {
                            id,
                            kind: SERVERDATA_AUTH_RESPONSE,
                            body: String::new(),
                        };
                        conn.send(empty).await.unwrap();
                        conn.send(auth).await.unwrap();
                    }
                    _ => {
                        commands.push(packet.body.clone());
                        let resp = Packet {
                            id: packet.id,
                            kind: SERVERDATA_RESPONSE_VALUE,
                            body: format!("echo:{}", packet.body),
                        };
                        conn.send(resp).await.unwrap();
                    }
                }
            }
            commands
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn authenticates_then_runs_commands() {
        let (addr, server) = fake_server("hunter2").await;
        let mut client = RconClient::new(addr, "hunter2".into(), Duration::from_secs(5));

        assert_eq!(
            client.execute("AdminBroadcast hi").await.unwrap(),
            "echo:AdminBroadcast hi"
        );
        assert_eq!(
            client.execute("ListPlayers").await.unwrap(),
            "echo:ListPlayers"
        );
        drop(client);

        assert_eq!(
            server.await.unwrap(),
            vec!["AdminBroadcast hi", "ListPlayers"]
        );
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let (addr, _server) = fake_server("hunter2").await;
        let mut client = RconClient::new(addr, "letmein".into(), Duration::from_secs(5));
        assert!(matches!(
            client.execute("ListPlayers").await,
            Err(RconError::AuthRejected)
        ));
    }
}

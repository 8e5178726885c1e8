//! Socket plumbing for the portal. The session only sees the traits here, so
//! the same loop drives std sockets on the host, lwIP sockets on the ESP32,
//! and in-memory fakes in tests.

use std::{
    io::{self, Write},
    net::{Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, TcpListener, TcpStream, UdpSocket},
    time::Duration,
};

use log::{debug, warn};

use crate::{
    dns::{answer_query, MAX_DNS_PACKET},
    error::RequestError,
    http::{read_request, Request, Responder, Response},
};

pub const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(2);
const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

pub trait DnsTransport {
    /// Answers at most one pending query without blocking. Returns whether a
    /// packet was consumed.
    fn process_next_request(&mut self) -> io::Result<bool>;
}

pub trait HttpTransport {
    type Client: Responder;

    /// Accepts at most one pending connection and reads its request.
    /// Connections whose request could not be parsed are answered or dropped
    /// here and surface as `Ok(None)`.
    fn next_request(&mut self) -> io::Result<Option<(Request, Self::Client)>>;
}

/// Opens the listeners a session serves from.
pub trait Transports {
    type Dns: DnsTransport;
    type Http: HttpTransport;

    fn start_dns(&mut self, port: u16, answer_ip: Ipv4Addr) -> io::Result<Self::Dns>;

    fn start_http(&mut self, port: u16) -> io::Result<Self::Http>;
}

#[derive(Debug, Clone)]
pub struct StdTransports {
    bind_ip: Ipv4Addr,
}

impl StdTransports {
    pub fn new(bind_ip: Ipv4Addr) -> Self {
        Self { bind_ip }
    }
}

impl Default for StdTransports {
    fn default() -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED)
    }
}

impl Transports for StdTransports {
    type Dns = WildcardDns;
    type Http = HttpListener;

    fn start_dns(&mut self, port: u16, answer_ip: Ipv4Addr) -> io::Result<WildcardDns> {
        let socket = UdpSocket::bind(SocketAddrV4::new(self.bind_ip, port))?;
        socket.set_nonblocking(true)?;
        debug!("dns responder bound to {}", socket.local_addr()?);
        Ok(WildcardDns { socket, answer_ip })
    }

    fn start_http(&mut self, port: u16) -> io::Result<HttpListener> {
        let listener = TcpListener::bind(SocketAddrV4::new(self.bind_ip, port))?;
        listener.set_nonblocking(true)?;
        debug!("http listener bound to {}", listener.local_addr()?);
        Ok(HttpListener { listener })
    }
}

pub struct WildcardDns {
    socket: UdpSocket,
    answer_ip: Ipv4Addr,
}

impl WildcardDns {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl DnsTransport for WildcardDns {
    fn process_next_request(&mut self) -> io::Result<bool> {
        let mut packet = [0_u8; MAX_DNS_PACKET];
        let (len, peer) = match self.socket.recv_from(&mut packet) {
            Ok(received) => received,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(err) => return Err(err),
        };

        let Some((question, response)) = answer_query(&packet[..len], self.answer_ip) else {
            debug!("dropping unparseable dns packet from {peer}");
            return Ok(true);
        };

        debug!(
            "dns {} (type {}) from {peer} -> {}",
            question.name, question.qtype, self.answer_ip
        );
        if let Err(err) = self.socket.send_to(&response, peer) {
            warn!("failed to send dns response to {peer}: {err}");
        }
        Ok(true)
    }
}

pub struct HttpListener {
    listener: TcpListener,
}

impl HttpListener {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl HttpTransport for HttpListener {
    type Client = TcpClient;

    fn next_request(&mut self) -> io::Result<Option<(Request, TcpClient)>> {
        let (stream, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(err) => return Err(err),
        };

        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(CLIENT_READ_TIMEOUT))?;
        stream.set_write_timeout(Some(CLIENT_WRITE_TIMEOUT))?;

        let mut client = TcpClient { stream, peer };
        match read_request(&mut client.stream) {
            Ok(request) => {
                debug!("{} {} from {peer}", request.method.as_str(), request.path);
                Ok(Some((request, client)))
            }
            Err(err) => {
                warn!("rejecting request from {peer}: {err}");
                let response = match err {
                    RequestError::BodyTooLarge(_) => Response::text(413, "Payload Too Large"),
                    RequestError::Malformed(_) | RequestError::HeadersTooLarge(_) => {
                        Response::bad_request()
                    }
                    RequestError::Incomplete | RequestError::Io(_) => return Ok(None),
                };
                if let Err(err) = client.send(&response) {
                    debug!("failed to send error response to {peer}: {err}");
                }
                Ok(None)
            }
        }
    }
}

pub struct TcpClient {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Responder for TcpClient {
    fn send(&mut self, response: &Response) -> io::Result<()> {
        self.stream.write_all(&response.encode())?;
        self.stream.flush()?;
        // the bytes are out even when the peer already hung up
        if let Err(err) = self.stream.shutdown(Shutdown::Both) {
            debug!("shutdown of {} failed: {err}", self.peer);
        }
        Ok(())
    }
}

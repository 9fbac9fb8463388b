//! Listener socket construction
//!
//! Every listener gets the same base options: SO_REUSEADDR so restarts do
//! not trip over lingering sockets, SO_REUSEPORT on unix, and dual-stack
//! v6 sockets that also accept v4 clients.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::{TcpListener, UdpSocket};

fn domain_for(addr: SocketAddr) -> Domain {
    if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    }
}

/// Bound, nonblocking UDP socket for the classic DNS listener.
pub fn udp_socket(addr: SocketAddr) -> anyhow::Result<UdpSocket> {
    Ok(UdpSocket::from_std(std_udp_socket(addr)?)?)
}

/// Bound, nonblocking std UDP socket. The QUIC endpoint drives the socket
/// itself, so it takes the std form rather than the tokio wrapper.
pub fn std_udp_socket(addr: SocketAddr) -> anyhow::Result<std::net::UdpSocket> {
    let socket = Socket::new(domain_for(addr), Type::DGRAM, Some(Protocol::UDP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_recv_buffer_size(512 * 1024)?;
    socket.set_send_buffer_size(512 * 1024)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

pub fn tcp_listener(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let socket = Socket::new(domain_for(addr), Type::STREAM, Some(Protocol::TCP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener)?)
}

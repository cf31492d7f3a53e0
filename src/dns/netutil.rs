//! Multicast socket setup

use std::io::Result;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// The mDNS port
pub const MDNS_PORT: u16 = 5353;

/// IPv4 mDNS group (224.0.0.251)
pub const MDNS_IPV4_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// IPv6 link-local mDNS group (ff02::fb)
pub const MDNS_IPV6_GROUP: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

/// Bind a socket on the wildcard address at the group's port and join the
/// group on the default interface.
///
/// Address and port reuse are enabled so other mDNS responders on the host
/// can share the port.
pub fn bind_multicast(group: SocketAddr) -> Result<UdpSocket> {
    let socket = match group.ip() {
        IpAddr::V4(addr) => {
            let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
            prepare(&socket)?;

            let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), group.port());
            socket.bind(&bind_addr.into())?;

            socket.join_multicast_v4(&addr, &Ipv4Addr::UNSPECIFIED)?;
            socket.set_multicast_loop_v4(true)?;
            socket.set_multicast_ttl_v4(255)?;
            socket
        }
        IpAddr::V6(addr) => {
            let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
            prepare(&socket)?;
            socket.set_only_v6(true)?;

            let bind_addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), group.port());
            socket.bind(&bind_addr.into())?;

            socket.join_multicast_v6(&addr, 0)?;
            socket.set_multicast_loop_v6(true)?;
            socket
        }
    };

    let std_socket: std::net::UdpSocket = socket.into();
    std_socket.set_nonblocking(true)?;
    UdpSocket::from_std(std_socket)
}

fn prepare(socket: &Socket) -> Result<()> {
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    Ok(())
}

/// Default group address for the family of `ip`
pub fn default_group(ip: IpAddr) -> SocketAddr {
    match ip {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(MDNS_IPV4_GROUP), MDNS_PORT),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(MDNS_IPV6_GROUP), MDNS_PORT),
    }
}

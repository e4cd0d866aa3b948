//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! Multicast socket option helpers and receive-side ancillary data recovery
//! for IPv6 link-local multicast, per §6 and §4.3 of the topology
//! specification.

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::os::raw::{c_int, c_void};
use std::os::unix::io::AsRawFd;

pub use tokio::net::UdpSocket;

type Result<T> = std::io::Result<T>;

/// Extension methods shared by every socket kind.
pub trait SocketExt: Sized + AsRawFd {
    /// Sets `IPV6_MULTICAST_IF`: the outgoing interface for multicast
    /// datagrams sent on this socket.
    fn set_multicast_ifindex_v6(&self, ifindex: u32) -> Result<()> {
        let optval = ifindex as c_int;
        setsockopt(
            self,
            libc::IPPROTO_IPV6,
            libc::IPV6_MULTICAST_IF,
            &optval as *const _ as *const c_void,
            std::mem::size_of::<c_int>() as libc::socklen_t,
        )
    }

    /// Sets `IPV6_MULTICAST_HOPS`.
    fn set_ipv6_multicast_hops(&self, hops: u8) -> Result<()> {
        let optval = hops as c_int;
        setsockopt(
            self,
            libc::IPPROTO_IPV6,
            libc::IPV6_MULTICAST_HOPS,
            &optval as *const _ as *const c_void,
            std::mem::size_of::<c_int>() as libc::socklen_t,
        )
    }

    /// Sets `IPV6_RECVPKTINFO` so the receive path can recover the
    /// destination address and receiving interface of each datagram.
    fn set_ipv6_pktinfo(&self, value: bool) -> Result<()> {
        let optval = value as c_int;
        setsockopt(
            self,
            libc::IPPROTO_IPV6,
            libc::IPV6_RECVPKTINFO,
            &optval as *const _ as *const c_void,
            std::mem::size_of::<c_int>() as libc::socklen_t,
        )
    }

    /// Joins the IPv6 multicast group `addr` on the interface `ifindex`.
    fn join_multicast_v6(&self, addr: &Ipv6Addr, ifindex: u32) -> Result<()> {
        let mreq = libc::ipv6_mreq {
            ipv6mr_multiaddr: libc::in6_addr {
                s6_addr: addr.octets(),
            },
            ipv6mr_interface: ifindex,
        };
        setsockopt(
            self,
            libc::IPPROTO_IPV6,
            libc::IPV6_ADD_MEMBERSHIP,
            &mreq as *const _ as *const c_void,
            std::mem::size_of::<libc::ipv6_mreq>() as libc::socklen_t,
        )
    }

    /// Leaves the IPv6 multicast group `addr` on the interface `ifindex`.
    fn leave_multicast_v6(&self, addr: &Ipv6Addr, ifindex: u32) -> Result<()> {
        let mreq = libc::ipv6_mreq {
            ipv6mr_multiaddr: libc::in6_addr {
                s6_addr: addr.octets(),
            },
            ipv6mr_interface: ifindex,
        };
        setsockopt(
            self,
            libc::IPPROTO_IPV6,
            libc::IPV6_DROP_MEMBERSHIP,
            &mreq as *const _ as *const c_void,
            std::mem::size_of::<libc::ipv6_mreq>() as libc::socklen_t,
        )
    }
}

/// Extension methods for creating and binding UDP sockets.
pub trait UdpSocketExt: SocketExt {
    /// Creates an IPv6 UDP socket bound to `addr` with `SO_REUSEADDR` set,
    /// so multiple interfaces (or test processes on the same host) can bind
    /// the same multicast port.
    fn bind_reuseaddr(addr: SocketAddr) -> Result<UdpSocket>;

    /// Binds the socket to a specific network device (`SO_BINDTODEVICE`),
    /// scoping unicast sends/receives to a single interface.
    fn bind_device(&self, ifname: &str) -> Result<()>;
}

impl SocketExt for UdpSocket {}

impl UdpSocketExt for UdpSocket {
    fn bind_reuseaddr(addr: SocketAddr) -> Result<UdpSocket> {
        use socket2::{Domain, Socket, Type};

        let domain = match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::DGRAM, None)?;
        socket.set_nonblocking(true)?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        UdpSocket::from_std(socket.into())
    }

    fn bind_device(&self, ifname: &str) -> Result<()> {
        setsockopt(
            self,
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            ifname.as_ptr() as *const c_void,
            ifname.len() as libc::socklen_t,
        )
    }
}

/// Ancillary data recovered alongside a received datagram: the destination
/// address the kernel delivered it to, and the ifindex it arrived on.
#[derive(Clone, Copy, Debug)]
pub struct PktInfo {
    pub addr: Ipv6Addr,
    pub ifindex: u32,
}

/// Receives one datagram on `socket`, returning the payload, the source
/// address, and the ancillary `IPV6_PKTINFO` data (destination address and
/// receiving ifindex) if the kernel supplied it.
///
/// This is the mechanism by which the receiver recovers the receiving
/// interface identity required by §4.3, even though the socket is joined
/// to the multicast group on every active interface simultaneously.
pub async fn recv_with_pktinfo(
    socket: &UdpSocket,
    buf: &mut [u8],
) -> std::io::Result<(usize, SocketAddrV6, Option<PktInfo>)> {
    use std::io::IoSliceMut;
    use std::os::fd::AsRawFd;

    use nix::sys::socket::{self, ControlMessageOwned, SockaddrStorage};

    loop {
        let mut iov = [IoSliceMut::new(buf)];
        let mut cmsgspace = nix::cmsg_space!(libc::in6_pktinfo);

        match socket
            .async_io(tokio::io::Interest::READABLE, || {
                let msg = socket::recvmsg::<SockaddrStorage>(
                    socket.as_raw_fd(),
                    &mut iov,
                    Some(&mut cmsgspace),
                    socket::MsgFlags::empty(),
                )
                .map_err(std::io::Error::from)?;

                let src = msg
                    .address
                    .as_ref()
                    .and_then(|sa| sa.as_sockaddr_in6())
                    .map(|sa| SocketAddrV6::from(*sa));
                let cmsgs: Vec<ControlMessageOwned> =
                    msg.cmsgs().map_err(std::io::Error::from)?.collect();

                Ok((msg.bytes, src, cmsgs))
            })
            .await
        {
            Ok((bytes, src, cmsgs)) => {
                let src = src.ok_or_else(|| {
                    std::io::Error::other("received datagram without a source address")
                })?;

                let mut pktinfo = None;
                for cmsg in cmsgs {
                    if let ControlMessageOwned::Ipv6PacketInfo(info) = cmsg {
                        pktinfo = Some(PktInfo {
                            addr: Ipv6Addr::from(info.ipi6_addr.s6_addr),
                            ifindex: info.ipi6_ifindex as u32,
                        });
                    }
                }

                return Ok((bytes, src, pktinfo));
            }
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {
                continue;
            }
            Err(error) => return Err(error),
        }
    }
}

fn setsockopt<F: AsRawFd>(
    sock: &F,
    level: c_int,
    optname: c_int,
    optval: *const c_void,
    optlen: libc::socklen_t,
) -> Result<()> {
    let ret = unsafe {
        libc::setsockopt(sock.as_raw_fd(), level, optname, optval, optlen)
    };
    if ret == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

//! Network interface helpers for the Matter stack.
//!
//! The bridge advertises and binds on exactly one configured interface. On a
//! Thread border router host the default UnixNetifs would also report mesh
//! addresses reflected over mDNS, so diagnostics are filtered to that interface.

use std::ffi::CString;
use std::net::{Ipv4Addr, Ipv6Addr};

use nix::ifaddrs::getifaddrs;
use nix::net::if_::{InterfaceFlags, if_nametoindex};
use nix::sys::socket::{AddressFamily, SockaddrLike};

use rs_matter::dm::clusters::gen_diag::{InterfaceTypeEnum, NetifDiag, NetifInfo};
use rs_matter::dm::networks::NetChangeNotif;
use rs_matter::error::{Error, ErrorCode};

/// Addresses of one interface, link-local IPv6 excluded.
#[derive(Debug, Clone, Default)]
pub struct InterfaceAddresses {
    pub index: u32,
    pub ipv4: Vec<Ipv4Addr>,
    pub ipv6: Vec<Ipv6Addr>,
}

impl InterfaceAddresses {
    /// Look up `interface_name`, failing if it has no index.
    pub fn lookup(interface_name: &str) -> Result<Self, Error> {
        let cname = CString::new(interface_name).map_err(|_| {
            log::error!("Invalid interface name: {}", interface_name);
            Error::from(ErrorCode::MdnsError)
        })?;
        let index = if_nametoindex(cname.as_c_str()).map_err(|e| {
            log::error!(
                "Failed to get interface index for '{}': {:?}",
                interface_name,
                e
            );
            Error::from(ErrorCode::MdnsError)
        })?;
        let addrs = getifaddrs().map_err(|e| {
            log::error!("Failed to get interface addresses: {:?}", e);
            Error::from(ErrorCode::MdnsError)
        })?;

        let mut found = Self {
            index,
            ..Self::default()
        };
        for ifaddr in addrs {
            if ifaddr.interface_name != interface_name {
                continue;
            }
            if let Some(addr) = ifaddr.address
                && let Some(family) = addr.family()
            {
                match family {
                    AddressFamily::Inet => {
                        if let Some(sockaddr) = addr.as_sockaddr_in() {
                            found.ipv4.push(sockaddr.ip());
                        }
                    }
                    AddressFamily::Inet6 => {
                        if let Some(sockaddr) = addr.as_sockaddr_in6()
                            && !is_link_local(&sockaddr.ip())
                        {
                            found.ipv6.push(sockaddr.ip());
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(found)
    }
}

/// fe80::/10
fn is_link_local(ip: &Ipv6Addr) -> bool {
    let octets = ip.octets();
    octets[0] == 0xfe && (octets[1] & 0xc0) == 0x80
}

/// Network diagnostics limited to a single interface.
#[derive(Clone, Copy)]
pub struct FilteredNetifs {
    /// The interface name to filter to (e.g., "enp14s0", "eth0")
    interface_name: &'static str,
}

impl FilteredNetifs {
    /// Create a new FilteredNetifs that only reports addresses from the given interface.
    pub const fn new(interface_name: &'static str) -> Self {
        Self { interface_name }
    }
}

impl NetifDiag for FilteredNetifs {
    fn netifs(&self, f: &mut dyn FnMut(&NetifInfo) -> Result<(), Error>) -> Result<(), Error> {
        // Get all interfaces from the system
        let Ok(addrs) = getifaddrs() else {
            return Ok(());
        };

        let mut ipv4_addrs: Vec<Ipv4Addr> = Vec::new();
        let mut ipv6_addrs: Vec<Ipv6Addr> = Vec::new();
        let mut hw_addr = [0u8; 8];
        let mut operational = false;
        let mut found = false;
        let mut netif_index = 0u32;

        for ifaddr in addrs {
            let name = &ifaddr.interface_name;
            if name != self.interface_name {
                continue;
            }

            found = true;

            // Get interface index
            if netif_index == 0
                && let Ok(cname) = CString::new(name.as_str())
                && let Ok(idx) = if_nametoindex(cname.as_c_str())
            {
                netif_index = idx;
            }

            // Check operational status
            if ifaddr.flags.contains(InterfaceFlags::IFF_RUNNING) {
                operational = true;
            }

            // Extract addresses
            if let Some(addr) = ifaddr.address
                && let Some(family) = addr.family()
            {
                match family {
                    AddressFamily::Inet => {
                        if let Some(sockaddr) = addr.as_sockaddr_in() {
                            ipv4_addrs.push(sockaddr.ip());
                        }
                    }
                    AddressFamily::Inet6 => {
                        if let Some(sockaddr) = addr.as_sockaddr_in6()
                            && !is_link_local(&sockaddr.ip())
                        {
                            ipv6_addrs.push(sockaddr.ip());
                        }
                    }
                    AddressFamily::Packet => {
                        if let Some(link_addr) = addr.as_link_addr()
                            && let Some(mac) = link_addr.addr()
                        {
                            let len = mac.len().min(8);
                            hw_addr[..len].copy_from_slice(&mac[..len]);
                        }
                    }
                    _ => {}
                }
            }
        }

        if !found {
            log::warn!(
                "FilteredNetifs: interface '{}' not found",
                self.interface_name
            );
            return Ok(());
        }

        log::debug!(
            "FilteredNetifs: '{}' has {} IPv4 and {} IPv6 addresses",
            self.interface_name,
            ipv4_addrs.len(),
            ipv6_addrs.len()
        );

        let info = NetifInfo {
            name: self.interface_name,
            operational,
            offprem_svc_reachable_ipv4: None,
            offprem_svc_reachable_ipv6: None,
            hw_addr: &hw_addr,
            ipv4_addrs: &ipv4_addrs,
            ipv6_addrs: &ipv6_addrs,
            netif_type: InterfaceTypeEnum::Ethernet,
            netif_index,
        };

        f(&info)
    }
}

impl NetChangeNotif for FilteredNetifs {
    async fn wait_changed(&self) {
        // Address changes are not tracked; the interface is fixed at startup
        core::future::pending().await
    }
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::VirtualHost;

/// One listening address and the virtual hosts that share it, in
/// declaration order.
#[derive(Debug)]
pub struct Binding {
    addr: SocketAddr,
    hosts: Vec<Arc<VirtualHost>>,
}

impl Binding {
    /// Groups hosts by address:port. Bindings keep the order in which their
    /// first host was declared.
    pub fn group(servers: &[VirtualHost]) -> Vec<Binding> {
        let mut bindings: Vec<Binding> = Vec::new();
        for host in servers {
            let addr = host.socket_addr();
            match bindings.iter_mut().find(|b| b.addr == addr) {
                Some(binding) => binding.hosts.push(Arc::new(host.clone())),
                None => bindings.push(Binding {
                    addr,
                    hosts: vec![Arc::new(host.clone())],
                }),
            }
        }
        bindings
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn hosts(&self) -> &[Arc<VirtualHost>] {
        &self.hosts
    }

    /// The host whose `server_name` matches the `Host` header, or the
    /// first declared one.
    pub fn select(&self, host_header: &str) -> &Arc<VirtualHost> {
        self.hosts
            .iter()
            .find(|h| h.answers_to(host_header))
            .unwrap_or(&self.hosts[0])
    }

    pub fn default_host(&self) -> &Arc<VirtualHost> {
        &self.hosts[0]
    }

    /// Idle timeout for connections on this address, taken from the
    /// default host since the `Host` header is not known yet.
    pub fn timeout(&self) -> Duration {
        self.default_host().timeout()
    }

    /// Body cap for the parser: the largest any host here may accept.
    pub fn body_cap(&self) -> usize {
        self.hosts
            .iter()
            .map(|h| h.largest_body_limit())
            .max()
            .unwrap_or_default() as usize
    }
}

//! Host port availability checks run before install.

use std::net::{Ipv4Addr, TcpListener};

pub trait PortProbe {
    /// True when something on the host already holds `port`.
    fn in_use(&self, port: u16) -> bool;
}

/// Probes by trying to bind the port on all interfaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

impl PortProbe for TcpProbe {
    fn in_use(&self, port: u16) -> bool {
        TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_err()
    }
}

/// Every port in `ports` that is already bound, in order.
pub fn busy_ports(probe: &dyn PortProbe, ports: &[u16]) -> Vec<u16> {
    ports.iter().copied().filter(|&p| probe.in_use(p)).collect()
}

#[cfg(test)]
pub mod fake {
    use std::cell::RefCell;
    use std::collections::BTreeSet;

    use super::PortProbe;

    /// Fixed set of busy ports; records every port asked about.
    #[derive(Debug, Default)]
    pub struct FakeProbe {
        busy: BTreeSet<u16>,
        asked: RefCell<Vec<u16>>,
    }

    impl FakeProbe {
        pub fn busy(ports: &[u16]) -> Self {
            Self {
                busy: ports.iter().copied().collect(),
                asked: RefCell::default(),
            }
        }

        pub fn asked(&self) -> Vec<u16> {
            self.asked.borrow().clone()
        }
    }

    impl PortProbe for FakeProbe {
        fn in_use(&self, port: u16) -> bool {
            self.asked.borrow_mut().push(port);
            self.busy.contains(&port)
        }
    }
}

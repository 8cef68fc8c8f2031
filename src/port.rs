// GAUNTLET PORT ALLOCATOR
// ASKS THE OS FOR AN EPHEMERAL PORT AT CALL TIME. PORTS HANDED OUT TO A
// TRIAL STAY CLAIMED UNTIL THAT TRIAL'S CLEANUP RELEASES THEM, SO A
// REUSED EPHEMERAL PORT IS REJECTED AND RE-DRAWN.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, TcpListener};

use crate::error::LaunchError;

const MAX_ATTEMPTS: usize = 16;

pub trait PortSource {
    fn allocate(&mut self) -> Result<u16, LaunchError>;
    fn release(&mut self, port: u16);
}

pub struct PortAllocator {
    bind_addr: IpAddr,
    claimed: HashSet<u16>,
}

impl PortAllocator {
    pub fn new(bind_addr: IpAddr) -> Self {
        Self {
            bind_addr,
            claimed: HashSet::new(),
        }
    }

    pub fn is_claimed(&self, port: u16) -> bool {
        self.claimed.contains(&port)
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl PortSource for PortAllocator {
    fn allocate(&mut self) -> Result<u16, LaunchError> {
        let mut last_err = None;
        for _ in 0..MAX_ATTEMPTS {
            // LISTENER DROPS AT END OF SCOPE; THE SCHEME REBINDS IT
            let port = match TcpListener::bind((self.bind_addr, 0)).and_then(|l| l.local_addr()) {
                Ok(addr) => addr.port(),
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };
            if self.claimed.insert(port) {
                return Ok(port);
            }
            tracing::debug!(port, "ephemeral port still claimed by a live trial, redrawing");
        }
        Err(LaunchError::NoFreePort {
            attempts: MAX_ATTEMPTS,
            source: last_err,
        })
    }

    fn release(&mut self, port: u16) {
        self.claimed.remove(&port);
    }
}

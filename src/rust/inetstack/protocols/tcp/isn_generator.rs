// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::inetstack::protocols::tcp::SeqNumber;
use ::std::{
    net::{
        IpAddr,
        SocketAddr,
    },
    num::Wrapping,
};

/// Initial sequence numbers: a hash of the four-tuple keyed by a per-boot secret, plus an offset that moves forward on
/// every call (RFC 6528).
pub struct IsnGenerator {
    nonce: u32,
    counter: Wrapping<u32>,
}

impl IsnGenerator {
    /// Offset added per generated ISN.
    const INCREMENT: u32 = 64000;

    pub fn new(nonce: u32) -> Self {
        Self {
            nonce,
            counter: Wrapping(0),
        }
    }

    pub fn generate(&mut self, local: &SocketAddr, remote: &SocketAddr) -> SeqNumber {
        let crc: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_CKSUM);
        let mut digest = crc.digest();
        Self::update_addr(&mut digest, remote);
        Self::update_addr(&mut digest, local);
        digest.update(&self.nonce.to_be_bytes());
        let digest: u32 = digest.finalize();
        let isn: SeqNumber = SeqNumber::from(digest.wrapping_add(self.counter.0));
        self.counter += Wrapping(Self::INCREMENT);
        isn
    }

    fn update_addr(digest: &mut crc::Digest<'_, u32>, addr: &SocketAddr) {
        match addr.ip() {
            IpAddr::V4(ip) => digest.update(&ip.octets()),
            IpAddr::V6(ip) => digest.update(&ip.octets()),
        }
        digest.update(&addr.port().to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::IsnGenerator;
    use crate::inetstack::protocols::tcp::SeqNumber;
    use ::anyhow::Result;
    use ::std::net::{
        Ipv4Addr,
        SocketAddr,
    };

    #[test]
    fn isn_depends_on_tuple_and_secret() -> Result<()> {
        let local: SocketAddr = SocketAddr::new(Ipv4Addr::new(10, 0, 0, 1).into(), 80);
        let remote: SocketAddr = SocketAddr::new(Ipv4Addr::new(10, 0, 0, 2).into(), 50000);
        let other: SocketAddr = SocketAddr::new(Ipv4Addr::new(10, 0, 0, 2).into(), 50001);

        let first: SeqNumber = IsnGenerator::new(1).generate(&local, &remote);
        crate::ensure_eq!(IsnGenerator::new(1).generate(&local, &remote), first);
        crate::ensure_neq!(IsnGenerator::new(2).generate(&local, &remote), first);
        crate::ensure_neq!(IsnGenerator::new(1).generate(&local, &other), first);

        // The same tuple moves forward over time.
        let mut generator: IsnGenerator = IsnGenerator::new(1);
        let a: SeqNumber = generator.generate(&local, &remote);
        let b: SeqNumber = generator.generate(&local, &remote);
        crate::ensure_eq!(a < b, true);
        Ok(())
    }
}

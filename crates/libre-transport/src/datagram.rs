use std::net::SocketAddr;

/// Result of a layered helper looking at an inbound datagram: it may consume
/// the datagram entirely (STUN-in-media demultiplexing), pass it through
/// unmodified, or hand back decrypted bytes (DTLS unwrapping).
pub enum Inbound {
    Consumed,
    PassThrough(Vec<u8>),
}

/// A helper that intercepts both directions of a datagram transport. STUN
/// connectivity checks and DTLS both multiplex onto the same 5-tuple as
/// media, so the datagram path is a chain of these rather than one handler.
pub trait DatagramHelper {
    /// Inspect/transform an outbound datagram before it reaches the socket.
    /// Returning `None` drops the send (e.g. the helper queued it itself).
    fn outbound(&mut self, peer: SocketAddr, bytes: Vec<u8>) -> Option<Vec<u8>> {
        Some(bytes)
    }

    /// Inspect an inbound datagram before it reaches the next helper/media sink.
    fn inbound(&mut self, peer: SocketAddr, bytes: Vec<u8>) -> Inbound {
        Inbound::PassThrough(bytes)
    }
}

/// A chain of [`DatagramHelper`]s shared by one datagram socket, applied
/// outermost-first on send and outermost-first on receive (the layer nearest
/// the wire sees raw bytes last on the way out, first on the way in).
#[derive(Default)]
pub struct DatagramPipeline {
    helpers: Vec<Box<dyn DatagramHelper>>,
}

impl DatagramPipeline {
    pub fn new() -> Self {
        Self { helpers: Vec::new() }
    }

    pub fn push(&mut self, helper: Box<dyn DatagramHelper>) {
        self.helpers.push(helper);
    }

    /// Run `bytes` through every helper outbound-hook in order; `None` means
    /// some helper swallowed the send (it'll emit its own bytes later).
    pub fn send(&mut self, peer: SocketAddr, mut bytes: Vec<u8>) -> Option<Vec<u8>> {
        for helper in &mut self.helpers {
            bytes = helper.outbound(peer, bytes)?;
        }
        Some(bytes)
    }

    /// Run inbound `bytes` through every helper in order; stops and reports
    /// consumption as soon as one helper claims the datagram.
    pub fn recv(&mut self, peer: SocketAddr, mut bytes: Vec<u8>) -> Inbound {
        for helper in &mut self.helpers {
            match helper.inbound(peer, bytes) {
                Inbound::Consumed => return Inbound::Consumed,
                Inbound::PassThrough(b) => bytes = b,
            }
        }
        Inbound::PassThrough(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uppercase;
    impl DatagramHelper for Uppercase {
        fn outbound(&mut self, _peer: SocketAddr, bytes: Vec<u8>) -> Option<Vec<u8>> {
            Some(bytes.to_ascii_uppercase())
        }
        fn inbound(&mut self, _peer: SocketAddr, bytes: Vec<u8>) -> Inbound {
            Inbound::PassThrough(bytes.to_ascii_lowercase())
        }
    }

    struct Swallow;
    impl DatagramHelper for Swallow {
        fn inbound(&mut self, _peer: SocketAddr, _bytes: Vec<u8>) -> Inbound {
            Inbound::Consumed
        }
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:1".parse().unwrap()
    }

    #[test]
    fn helpers_transform_outbound_and_inbound() {
        let mut pipeline = DatagramPipeline::new();
        pipeline.push(Box::new(Uppercase));

        let sent = pipeline.send(addr(), b"hi".to_vec()).unwrap();
        assert_eq!(sent, b"HI");

        let recv = pipeline.recv(addr(), b"HI".to_vec());
        match recv {
            Inbound::PassThrough(b) => assert_eq!(b, b"hi"),
            Inbound::Consumed => panic!("should pass through"),
        }
    }

    #[test]
    fn a_helper_can_consume_an_inbound_datagram() {
        let mut pipeline = DatagramPipeline::new();
        pipeline.push(Box::new(Swallow));
        pipeline.push(Box::new(Uppercase));

        match pipeline.recv(addr(), b"x".to_vec()) {
            Inbound::Consumed => {}
            Inbound::PassThrough(_) => panic!("should have been consumed upstream"),
        }
    }
}

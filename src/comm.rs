//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are tagged, contiguous byte payloads. Sends and receives block
//! from the protocol's point of view. Two guarantees matter to the farm:
//!
//! * messages between one pair of ranks arrive in the order they were sent;
//! * [`Communicator::recv_any`] returns whichever peer's message is ready
//!   first, with no ordering across peers.

use crate::farm_error::FarmError;
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

/// A received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub source: usize,
    pub tag: u16,
    pub payload: Bytes,
}

/// Blocking point-to-point communication interface (minimal by design).
pub trait Communicator {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn send(&self, peer: usize, tag: u16, payload: Bytes) -> Result<(), FarmError>;
    /// Next message from any peer, any tag.
    fn recv_any(&self) -> Result<Envelope, FarmError>;
    /// Next message from `peer`, any tag.
    fn recv_from(&self, peer: usize) -> Result<Envelope, FarmError>;
}

// --- LocalComm: intra-process / one thread per rank ---

/// In-process communicator: one inbound channel per rank.
///
/// Each rank owns the receiving end of its inbox and a sender into every
/// other rank's inbox. A rank holds no sender to itself, so once every
/// other rank has dropped its endpoint a blocked receive fails with
/// [`FarmError::Comm`] instead of hanging.
pub struct LocalComm {
    rank: usize,
    peers: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    // messages from other peers set aside by `recv_from`
    stash: RefCell<VecDeque<Envelope>>,
}

impl LocalComm {
    /// Endpoints for ranks `0..size`, in rank order.
    pub fn world(size: usize) -> Vec<LocalComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| mpsc::channel::<Envelope>()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalComm {
                rank,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(peer, tx)| (peer != rank).then(|| tx.clone()))
                    .collect(),
                inbox,
                stash: RefCell::new(VecDeque::new()),
            })
            .collect()
    }

    fn disconnected(&self) -> FarmError {
        FarmError::Comm {
            peer: self.rank,
            reason: "all peers hung up".into(),
        }
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, peer: usize, tag: u16, payload: Bytes) -> Result<(), FarmError> {
        let tx = self
            .peers
            .get(peer)
            .and_then(Option::as_ref)
            .ok_or_else(|| FarmError::Comm {
                peer,
                reason: format!("rank {} has no route to rank {peer}", self.rank),
            })?;
        tx.send(Envelope {
            source: self.rank,
            tag,
            payload,
        })
        .map_err(|_| FarmError::Comm {
            peer,
            reason: "peer endpoint dropped".into(),
        })
    }

    fn recv_any(&self) -> Result<Envelope, FarmError> {
        if let Some(env) = self.stash.borrow_mut().pop_front() {
            return Ok(env);
        }
        self.inbox.recv().map_err(|_| self.disconnected())
    }

    fn recv_from(&self, peer: usize) -> Result<Envelope, FarmError> {
        {
            let mut stash = self.stash.borrow_mut();
            if let Some(pos) = stash.iter().position(|e| e.source == peer) {
                if let Some(env) = stash.remove(pos) {
                    return Ok(env);
                }
            }
        }
        loop {
            let env = self.inbox.recv().map_err(|_| self.disconnected())?;
            if env.source == peer {
                return Ok(env);
            }
            self.stash.borrow_mut().push_back(env);
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// MPI world communicator; rank 0 is the coordinator.
    pub struct MpiComm {
        pub world: SimpleCommunicator,
        rank: usize,
        size: usize,
        // finalizes MPI on drop; keep last
        _universe: Universe,
    }

    impl MpiComm {
        /// Initialize MPI. Fails if MPI was already initialized in this process.
        pub fn new() -> Result<Self, FarmError> {
            let universe = mpi::initialize().ok_or_else(|| FarmError::Comm {
                peer: 0,
                reason: "MPI initialization failed (already initialized?)".into(),
            })?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world,
                rank,
                size,
                _universe: universe,
            })
        }

        fn envelope(data: Vec<u8>, status: mpi::point_to_point::Status) -> Envelope {
            Envelope {
                source: status.source_rank() as usize,
                tag: status.tag() as u16,
                payload: Bytes::from(data),
            }
        }
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn send(&self, peer: usize, tag: u16, payload: Bytes) -> Result<(), FarmError> {
            if peer >= self.size {
                return Err(FarmError::Comm {
                    peer,
                    reason: format!("rank out of range (world size {})", self.size),
                });
            }
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(&payload[..], i32::from(tag));
            Ok(())
        }

        fn recv_any(&self) -> Result<Envelope, FarmError> {
            let (data, status) = self.world.any_process().receive_vec::<u8>();
            Ok(Self::envelope(data, status))
        }

        fn recv_from(&self, peer: usize) -> Result<Envelope, FarmError> {
            let (data, status) = self.world.process_at_rank(peer as i32).receive_vec::<u8>();
            Ok(Self::envelope(data, status))
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_round_trip_two_ranks() {
        let mut world = LocalComm::world(2);
        let c1 = world.pop().unwrap();
        let c0 = world.pop().unwrap();
        c0.send(1, 7, Bytes::from_static(&[1, 2, 3, 4])).unwrap();
        let env = c1.recv_from(0).unwrap();
        assert_eq!(env.source, 0);
        assert_eq!(env.tag, 7);
        assert_eq!(&env.payload[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn per_peer_fifo_order() {
        let mut world = LocalComm::world(2);
        let c1 = world.pop().unwrap();
        let c0 = world.pop().unwrap();
        for i in 0..10u8 {
            c0.send(1, 1, Bytes::copy_from_slice(&[i])).unwrap();
        }
        let got: Vec<u8> = (0..10).map(|_| c1.recv_from(0).unwrap().payload[0]).collect();
        assert_eq!(got, (0u8..10).collect::<Vec<_>>());
    }

    #[test]
    fn recv_from_sets_other_peers_aside() {
        let world = LocalComm::world(3);
        world[2].send(0, 5, Bytes::from_static(b"late")).unwrap();
        world[1].send(0, 5, Bytes::from_static(b"wanted")).unwrap();
        assert_eq!(&world[0].recv_from(1).unwrap().payload[..], b"wanted");
        let next = world[0].recv_any().unwrap();
        assert_eq!((next.source, &next.payload[..]), (2, &b"late"[..]));
    }

    #[test]
    fn no_route_to_self() {
        let world = LocalComm::world(2);
        assert!(matches!(
            world[0].send(0, 1, Bytes::new()),
            Err(FarmError::Comm { peer: 0, .. })
        ));
    }

    #[test]
    fn receive_fails_once_peers_are_gone() {
        let mut world = LocalComm::world(2);
        let c1 = world.pop().unwrap();
        drop(world);
        assert!(matches!(c1.recv_any(), Err(FarmError::Comm { .. })));
    }
}

//! Inter-process transport: the collective operations the merger (§4.6)
//! needs, abstracted behind a trait so the core never links a real MPI
//! binding — binding a `Transport` to `PMPI_*` calls is an external
//! collaborator's job, exactly like the injected [`crate::clock::Clock`].

use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender};

pub trait Transport: Send + Sync {
    fn rank(&self) -> i32;
    fn size(&self) -> i32;

    /// Point-to-point send of a length-prefixed byte message.
    fn send(&self, to: i32, data: Vec<u8>);

    /// Blocking point-to-point receive.
    fn recv(&self, from: i32) -> Vec<u8>;

    /// Broadcasts `data` (required on `root`, ignored elsewhere) to every
    /// rank, root included.
    fn broadcast_from_root(&self, root: i32, data: Option<Vec<u8>>) -> Vec<u8> {
        if self.rank() == root {
            let payload = data.expect("root must supply the broadcast payload");
            for to in 0..self.size() {
                if to != root {
                    self.send(to, payload.clone());
                }
            }
            payload
        } else {
            self.recv(root)
        }
    }
}

/// Blocks every rank until all ranks have called `barrier` (§4.5's "all
/// ranks rendezvous" before the collective `recorder.ts` write). A no-op
/// when there is only one rank.
pub fn barrier(transport: &dyn Transport) {
    let rank = transport.rank();
    let size = transport.size();
    if size <= 1 {
        return;
    }
    if rank == 0 {
        for r in 1..size {
            transport.recv(r);
        }
        for r in 1..size {
            transport.send(r, Vec::new());
        }
    } else {
        transport.send(0, Vec::new());
        transport.recv(0);
    }
}

/// The single-rank fallback used whenever `RECORDER_WITH_NON_MPI` disables
/// the collective (§6). Every collective collapses to the identity.
pub struct SingleProcessTransport;

impl Transport for SingleProcessTransport {
    fn rank(&self) -> i32 {
        0
    }

    fn size(&self) -> i32 {
        1
    }

    fn send(&self, _to: i32, _data: Vec<u8>) {
        unreachable!("single-process transport has no peers to send to")
    }

    fn recv(&self, _from: i32) -> Vec<u8> {
        unreachable!("single-process transport has no peers to receive from")
    }

    fn broadcast_from_root(&self, _root: i32, data: Option<Vec<u8>>) -> Vec<u8> {
        data.expect("single-process broadcast requires a payload")
    }
}

/// An in-memory, multi-rank transport backed by one `crossbeam-channel`
/// per ordered rank pair. Used by the test suite to exercise the real
/// recursive-doubling merge protocol across simulated ranks without
/// linking MPI.
pub struct ChannelTransport {
    rank: i32,
    size: i32,
    senders: Vec<Option<Sender<Vec<u8>>>>,
    receivers: Vec<Option<Receiver<Vec<u8>>>>,
}

impl ChannelTransport {
    /// Builds one handle per rank in `0..size`, fully interconnected.
    pub fn cluster(size: i32) -> Vec<ChannelTransport> {
        let n = size as usize;
        let mut senders: HashMap<(usize, usize), Sender<Vec<u8>>> = HashMap::new();
        let mut receivers: HashMap<(usize, usize), Receiver<Vec<u8>>> = HashMap::new();
        for from in 0..n {
            for to in 0..n {
                if from == to {
                    continue;
                }
                let (tx, rx) = crossbeam_channel::unbounded();
                senders.insert((from, to), tx);
                receivers.insert((from, to), rx);
            }
        }

        (0..n)
            .map(|r| {
                let mut my_senders = vec![None; n];
                let mut my_receivers = vec![None; n];
                for to in 0..n {
                    if to != r {
                        my_senders[to] = senders.remove(&(r, to));
                    }
                }
                for from in 0..n {
                    if from != r {
                        my_receivers[from] = receivers.remove(&(from, r));
                    }
                }
                ChannelTransport {
                    rank: r as i32,
                    size,
                    senders: my_senders,
                    receivers: my_receivers,
                }
            })
            .collect()
    }
}

impl Transport for ChannelTransport {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn size(&self) -> i32 {
        self.size
    }

    fn send(&self, to: i32, data: Vec<u8>) {
        self.senders[to as usize]
            .as_ref()
            .expect("no channel to that rank")
            .send(data)
            .expect("peer transport dropped");
    }

    fn recv(&self, from: i32) -> Vec<u8> {
        self.receivers[from as usize]
            .as_ref()
            .expect("no channel from that rank")
            .recv()
            .expect("peer transport dropped")
    }
}

//! Coordinator/worker messages
//!
//! Each island worker is connected to the coordinator by a pair of
//! `std::sync::mpsc` channels: multiple-producer single-consumer with FIFO
//! ordering per producer, which is exactly the ordering guarantee the
//! island protocol needs.

use std::sync::mpsc::{channel, Receiver, Sender};

use crate::delta::RegistryDelta;

/// Messages sent from the coordinator to an island worker.
#[derive(Debug)]
pub enum CoordinatorMessage {
    /// Import these entities/components into the worker registry.
    Delta(RegistryDelta),
    /// Pause or resume stepping.
    SetPaused(bool),
    /// Perform exactly one step while paused.
    StepSimulation,
    /// Wake a sleeping island.
    WakeUpIsland,
}

/// Messages sent from an island worker to the coordinator.
#[derive(Debug)]
pub enum WorkerMessage {
    /// State produced by the worker since its last sync.
    Delta(RegistryDelta),
    /// The worker's interaction graph is no longer a single connected
    /// component; the coordinator should consider splitting the island.
    SplitIsland,
}

/// Coordinator-side endpoints for one worker.
pub struct CoordinatorChannels {
    pub tx: Sender<CoordinatorMessage>,
    pub rx: Receiver<WorkerMessage>,
}

/// Worker-side endpoints.
pub struct WorkerChannels {
    pub rx: Receiver<CoordinatorMessage>,
    pub tx: Sender<WorkerMessage>,
}

/// Create the channel pair connecting the coordinator with one worker.
pub fn island_channels() -> (CoordinatorChannels, WorkerChannels) {
    let (to_worker, from_coordinator) = channel();
    let (to_coordinator, from_worker) = channel();
    (
        CoordinatorChannels {
            tx: to_worker,
            rx: from_worker,
        },
        WorkerChannels {
            rx: from_coordinator,
            tx: to_coordinator,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_pair_routes_both_ways() {
        let (coord, worker) = island_channels();

        coord.tx.send(CoordinatorMessage::SetPaused(true)).unwrap();
        match worker.rx.try_recv().unwrap() {
            CoordinatorMessage::SetPaused(paused) => assert!(paused),
            other => panic!("unexpected message {other:?}"),
        }

        worker.tx.send(WorkerMessage::SplitIsland).unwrap();
        assert!(matches!(
            coord.rx.try_recv().unwrap(),
            WorkerMessage::SplitIsland
        ));
    }

    #[test]
    fn test_fifo_per_producer() {
        let (coord, worker) = island_channels();
        coord.tx.send(CoordinatorMessage::SetPaused(true)).unwrap();
        coord.tx.send(CoordinatorMessage::StepSimulation).unwrap();
        coord.tx.send(CoordinatorMessage::SetPaused(false)).unwrap();

        assert!(matches!(
            worker.rx.try_recv().unwrap(),
            CoordinatorMessage::SetPaused(true)
        ));
        assert!(matches!(
            worker.rx.try_recv().unwrap(),
            CoordinatorMessage::StepSimulation
        ));
        assert!(matches!(
            worker.rx.try_recv().unwrap(),
            CoordinatorMessage::SetPaused(false)
        ));
    }
}

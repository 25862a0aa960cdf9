//! Background thread applying graph updates.

use crate::graph::{GraphSpec, SharedGraph};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Receives [`GraphSpec`] updates and stages them on a shared graph.
///
/// Every accepted update raises the reconfigure flag; the worker checks it
/// at the next batch boundary. The thread exits once every sender of the
/// update queue is dropped, or when [`GraphListener::join`] is called.
#[derive(Debug)]
pub struct GraphListener {
    handle: JoinHandle<usize>,
    shutdown: Sender<()>,
}

impl GraphListener {
    /// Spawns the listener thread.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn spawn(
        name: &str,
        graph: SharedGraph,
        reconfigure: Arc<AtomicBool>,
        updates: Receiver<GraphSpec>,
    ) -> std::io::Result<Self> {
        let (shutdown, stop) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(format!("{name}-graph"))
            .spawn(move || {
                let mut applied = 0;
                let mut stage = |spec: GraphSpec| match graph.lock().update(spec) {
                    Ok(()) => {
                        reconfigure.store(true, Ordering::Release);
                        applied += 1;
                        debug!("graph update {} staged", applied);
                    }
                    Err(e) => warn!("rejected graph update: {}", e),
                };
                loop {
                    select! {
                        recv(updates) -> spec => match spec {
                            Ok(spec) => stage(spec),
                            Err(_) => break,
                        },
                        recv(stop) -> _ => {
                            updates.try_iter().for_each(&mut stage);
                            break;
                        }
                    }
                }
                applied
            })?;
        Ok(Self { handle, shutdown })
    }

    /// Stops the thread once queued updates are staged, returning the number
    /// of applied updates.
    ///
    /// Returns `None` if the thread panicked.
    pub fn join(self) -> Option<usize> {
        let Self { handle, shutdown } = self;
        drop(shutdown);
        handle.join().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{shared, AccumulateGraph, Reduce};
    use crossbeam_channel::unbounded;

    #[test]
    fn updates_raise_flag() {
        let graph = shared(AccumulateGraph::default());
        let flag = Arc::new(AtomicBool::new(false));
        let (tx, rx) = unbounded();
        let listener =
            GraphListener::spawn("test", Arc::clone(&graph), Arc::clone(&flag), rx).unwrap();

        tx.send(GraphSpec::default().node("a", "b", Reduce::Sum)).unwrap();
        tx.send(GraphSpec::default().node("x", "x", Reduce::Sum)).unwrap();
        drop(tx);

        assert_eq!(listener.join(), Some(1));
        assert!(flag.load(Ordering::Acquire));
    }

    #[test]
    fn join_stops_while_senders_alive() {
        let graph = shared(AccumulateGraph::default());
        let flag = Arc::new(AtomicBool::new(false));
        let (tx, rx) = unbounded();
        let listener =
            GraphListener::spawn("test", Arc::clone(&graph), Arc::clone(&flag), rx).unwrap();

        tx.send(GraphSpec::default().node("a", "b", Reduce::Count)).unwrap();
        assert_eq!(listener.join(), Some(1));
        assert!(tx.send(GraphSpec::default()).is_err());
    }
}

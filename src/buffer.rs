//! The only processor that introduces parallelism: a bounded FIFO queue
//! between a producer thread (calling `handle`) and a consumer thread that
//! `Buffer` itself spawns to replay the same events on its own downstream
//! (spec §5 "Concurrency & Resource Model", grounded on `tests/buffer.cpp`
//! and `buffer.hpp`'s introspection/naming conventions).
//!
//! `Item` is expected to be whatever [`crate::variant_or_single`] produced
//! for the event set flowing through this point in the graph: a tagged
//! union when more than one event type must be queued, or the bare event
//! type when there is only one.
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::JoinHandle;

use crate::error::{Error, Result};
use crate::processor::{Flush, HandleEvent, Introspect, NodeInfo};

enum Message<Item> {
    Event(Item),
    End,
}

/// A bounded producer/consumer queue. `handle_owned`/`handle_ref` run on
/// the producer thread and block when the queue is full; a dedicated
/// consumer thread drains it and calls the matching method on `downstream`.
/// Because the consumer runs asynchronously, a downstream error does not
/// surface until `flush()` joins the consumer thread — the producer side
/// of `handle_owned` only reports a full queue that can never drain (the
/// consumer thread having already exited, e.g. after a prior flush).
pub struct Buffer<Item> {
    sender: SyncSender<Message<Item>>,
    consumer: Option<JoinHandle<Result<()>>>,
}

/// Spawn a [`Buffer`] of the given capacity, consumed by `downstream` on
/// its own thread.
pub fn buffer<Item, D>(capacity: usize, mut downstream: D) -> Buffer<Item>
where
    Item: Send + 'static,
    D: HandleEvent<Item> + Flush + Send + 'static,
{
    let (sender, receiver): (SyncSender<Message<Item>>, Receiver<Message<Item>>) = sync_channel(capacity.max(1));
    let consumer = std::thread::Builder::new()
        .name("tcspc-buffer".into())
        .spawn(move || -> Result<()> {
            loop {
                match receiver.recv() {
                    Ok(Message::Event(item)) => downstream.handle_owned(item)?,
                    Ok(Message::End) | Err(_) => break,
                }
            }
            downstream.flush()
        })
        .expect("failed to spawn buffer consumer thread");
    Buffer {
        sender,
        consumer: Some(consumer),
    }
}

impl<Item> Buffer<Item> {
    fn send(&self, message: Message<Item>) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| Error::unexpected("buffer consumer thread has already exited"))
    }
}

impl<Item: Send + 'static> Flush for Buffer<Item> {
    fn flush(&mut self) -> Result<()> {
        // Errors sending `End` are ignored: a consumer that already exited
        // has already run (or will run, via the join below) its own flush
        // and reported whatever it had to report.
        let _ = self.send(Message::End);
        match self.consumer.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| Err(Error::unexpected("buffer consumer thread panicked"))),
            None => Err(Error::unexpected("buffer flushed more than once")),
        }
    }
}

impl<Item> Introspect for Buffer<Item> {
    fn introspect_node(&self) -> NodeInfo {
        crate::processor::node_info_of(self, "buffer")
    }
    fn introspect_graph(&self) -> crate::processor::Graph {
        vec![self.introspect_node()]
    }
}

impl<Item: Clone + Send + 'static> HandleEvent<Item> for Buffer<Item> {
    fn handle_ref(&mut self, event: &Item) -> Result<()> {
        self.send(Message::Event(event.clone()))
    }
    fn handle_owned(&mut self, event: Item) -> Result<()> {
        self.send(Message::Event(event))
    }
}

/// Single-threaded stand-in for [`Buffer`]: accumulates up to `capacity`
/// items, then replays all of them to `downstream` in one batch, amortizing
/// per-event call overhead without introducing a second thread (spec §5,
/// "`process_in_batches`, which just decouples loop bodies").
pub struct SingleThreadedBuffer<Item, D> {
    capacity: usize,
    pending: Vec<Item>,
    downstream: D,
}

/// Build a [`SingleThreadedBuffer`] of the given capacity.
pub fn single_threaded_buffer<Item, D>(capacity: usize, downstream: D) -> SingleThreadedBuffer<Item, D> {
    SingleThreadedBuffer {
        capacity: capacity.max(1),
        pending: Vec::new(),
        downstream,
    }
}

/// Alias kept for the name used in the concurrency model description: same
/// construct as [`single_threaded_buffer`].
pub fn process_in_batches<Item, D>(capacity: usize, downstream: D) -> SingleThreadedBuffer<Item, D> {
    single_threaded_buffer(capacity, downstream)
}

impl<Item, D> SingleThreadedBuffer<Item, D> {
    fn drain(&mut self) -> Result<()>
    where
        D: HandleEvent<Item>,
    {
        for item in self.pending.drain(..) {
            self.downstream.handle_owned(item)?;
        }
        Ok(())
    }
}

impl<Item, D: Flush> Flush for SingleThreadedBuffer<Item, D>
where
    D: HandleEvent<Item>,
{
    fn flush(&mut self) -> Result<()> {
        self.drain()?;
        self.downstream.flush()
    }
}

impl<Item, D: Introspect> Introspect for SingleThreadedBuffer<Item, D> {
    fn introspect_node(&self) -> NodeInfo {
        crate::processor::node_info_of(self, "single_threaded_buffer")
    }
    fn introspect_graph(&self) -> crate::processor::Graph {
        let mut g = self.downstream.introspect_graph();
        g.insert(0, self.introspect_node());
        g
    }
}

impl<Item: Clone, D: HandleEvent<Item>> HandleEvent<Item> for SingleThreadedBuffer<Item, D> {
    fn handle_ref(&mut self, event: &Item) -> Result<()> {
        self.handle_owned(event.clone())
    }
    fn handle_owned(&mut self, event: Item) -> Result<()> {
        self.pending.push(event);
        if self.pending.len() >= self.capacity {
            self.drain()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct Collector(Arc<Mutex<Vec<i32>>>);
    impl Flush for Collector {
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }
    impl HandleEvent<i32> for Collector {
        fn handle_ref(&mut self, event: &i32) -> Result<()> {
            self.0.lock().unwrap().push(*event);
            Ok(())
        }
        fn handle_owned(&mut self, event: i32) -> Result<()> {
            self.0.lock().unwrap().push(event);
            Ok(())
        }
    }

    #[test]
    fn buffer_preserves_fifo_order_across_threads() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let mut buf = buffer(4, Collector(received.clone()));
        for value in 0..20 {
            buf.handle_owned(value).unwrap();
        }
        buf.flush().unwrap();
        assert_eq!(*received.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn buffer_double_flush_is_rejected() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let mut buf = buffer(4, Collector(received));
        buf.flush().unwrap();
        let err = buf.flush().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unexpected);
    }

    #[test]
    fn single_threaded_buffer_batches_then_flushes_remainder() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let mut buf = single_threaded_buffer(3, Collector(received.clone()));
        buf.handle_owned(1).unwrap();
        buf.handle_owned(2).unwrap();
        assert!(received.lock().unwrap().is_empty());
        buf.handle_owned(3).unwrap();
        assert_eq!(*received.lock().unwrap(), vec![1, 2, 3]);
        buf.handle_owned(4).unwrap();
        buf.flush().unwrap();
        assert_eq!(*received.lock().unwrap(), vec![1, 2, 3, 4]);
    }
}

/// Fans every event out to all live subscribers over unbounded channels.
///
/// Subscribers whose receiving end has been dropped are pruned on the next
/// [`Broadcaster::send`].
#[derive(Debug)]
pub struct Broadcaster<T> {
    senders: Vec<crossbeam_channel::Sender<T>>,
}

impl<T> Default for Broadcaster<T> {
    fn default() -> Self {
        Self {
            senders: Vec::new(),
        }
    }
}

impl<T: Clone> Broadcaster<T> {
    pub fn subscribe(&mut self) -> crossbeam_channel::Receiver<T> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.senders.push(tx);

        rx
    }

    pub fn send(&mut self, event: &T) {
        let before = self.senders.len();

        self.senders.retain(|tx| tx.send(event.clone()).is_ok());

        let dropped = before - self.senders.len();
        if dropped > 0 {
            tracing::debug!(dropped, "pruned disconnected subscribers");
        }
    }

    /// Drops every sender; receivers observe a disconnected channel once
    /// they have drained what was already sent.
    pub fn close(&mut self) {
        self.senders.clear();
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.senders.len()
    }
}
